//! Spectrum memory subsystem.
//!
//! The 64K address space is four 16K windows. A [`Topology`] says what each
//! window shows: a fixed ROM page, a fixed RAM bank, whichever page the
//! paging latches select, or nothing. The [`PagingUnit`] owns the ROM and RAM
//! and resolves addresses through the current map; it knows nothing about
//! timing, which is the bus's business.

#![allow(clippy::cast_possible_truncation)] // Intentional: bank numbers fit in u8.

use emu_core::{Observable, SaveState, SectionReader, SectionWriter, SnapshotError, Value};
use log::debug;

use crate::error::ConfigError;
use crate::peripherals::Peripheral;

/// Size of one window, ROM page or RAM bank.
pub const BANK_SIZE: usize = 0x4000;

/// What a window shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Rom(u8),
    Ram(u8),
    /// ROM page chosen by the paging latches.
    LatchedRom,
    /// RAM bank chosen by bits 0-2 of port $7FFD.
    LatchedRam,
    /// Reads float high, writes vanish.
    Unmapped,
}

/// Which paging ports the model decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingPorts {
    None,
    /// $7FFD only.
    Sinclair128,
    /// $7FFD and $1FFD.
    Plus3,
}

/// Bank layout of one model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub name: &'static str,
    pub windows: [Selector; 4],
    pub rom_pages: u8,
    pub ram_banks: u8,
    /// Bit n set: RAM bank n shares the bus with the ULA.
    pub contended: u8,
    pub paging: PagingPorts,
    /// RAM bank the ULA displays.
    pub screen: u8,
    /// RAM bank displayed when bit 3 of $7FFD is set.
    pub shadow_screen: u8,
}

impl Topology {
    pub const SPECTRUM_16K: Self = Self {
        name: "16k",
        windows: [Selector::Rom(0), Selector::Ram(0), Selector::Unmapped, Selector::Unmapped],
        rom_pages: 1,
        ram_banks: 1,
        contended: 0x01,
        paging: PagingPorts::None,
        screen: 0,
        shadow_screen: 0,
    };

    pub const SPECTRUM_48K: Self = Self {
        name: "48k",
        windows: [Selector::Rom(0), Selector::Ram(0), Selector::Ram(1), Selector::Ram(2)],
        rom_pages: 1,
        ram_banks: 3,
        contended: 0x01,
        paging: PagingPorts::None,
        screen: 0,
        shadow_screen: 0,
    };

    pub const SPECTRUM_128K: Self = Self {
        name: "128k",
        windows: [Selector::LatchedRom, Selector::Ram(5), Selector::Ram(2), Selector::LatchedRam],
        rom_pages: 2,
        ram_banks: 8,
        contended: 0xAA,
        paging: PagingPorts::Sinclair128,
        screen: 5,
        shadow_screen: 7,
    };

    pub const SPECTRUM_PLUS3: Self = Self {
        name: "plus3",
        windows: [Selector::LatchedRom, Selector::Ram(5), Selector::Ram(2), Selector::LatchedRam],
        rom_pages: 4,
        ram_banks: 8,
        contended: 0xF0,
        paging: PagingPorts::Plus3,
        screen: 5,
        shadow_screen: 7,
    };
}

/// +3 all-RAM configurations, indexed by $1FFD bits 1-2.
/// Each entry is the bank at $0000/$4000/$8000/$C000.
const SPECIAL_CONFIGS: [[u8; 4]; 4] = [
    [0, 1, 2, 3],
    [4, 5, 6, 7],
    [4, 5, 6, 3],
    [4, 7, 6, 3],
];

/// A window resolved against the current latches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Rom(u8),
    Ram(u8),
    Unmapped,
}

/// ROM, RAM and the paging latches.
#[derive(Debug, Clone)]
pub struct PagingUnit {
    topology: Topology,
    rom: Box<[u8]>,
    ram: Box<[u8]>,
    port_7ffd: u8,
    port_1ffd: u8,
    /// Set by bit 5 of $7FFD; freezes both latches until reset.
    locked: bool,
    map: [Page; 4],
}

impl PagingUnit {
    /// Build the paging unit with RAM cleared.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RomSize`] unless `rom` holds exactly
    /// `rom_pages` pages.
    pub fn new(topology: Topology, rom: &[u8]) -> Result<Self, ConfigError> {
        let expected = usize::from(topology.rom_pages) * BANK_SIZE;
        if rom.len() != expected {
            return Err(ConfigError::RomSize {
                model: topology.name,
                expected,
                found: rom.len(),
            });
        }
        let mut unit = Self {
            topology,
            rom: rom.into(),
            ram: vec![0; usize::from(topology.ram_banks) * BANK_SIZE].into_boxed_slice(),
            port_7ffd: 0,
            port_1ffd: 0,
            locked: false,
            map: [Page::Unmapped; 4],
        };
        unit.remap();
        Ok(unit)
    }

    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Read through the current map. No side effects.
    #[must_use]
    pub fn read_bus(&self, addr: u16) -> u8 {
        let offset = usize::from(addr) & (BANK_SIZE - 1);
        match self.map[usize::from(addr >> 14)] {
            Page::Rom(page) => self.rom[usize::from(page) * BANK_SIZE + offset],
            Page::Ram(bank) => self.ram[usize::from(bank) * BANK_SIZE + offset],
            Page::Unmapped => 0xFF,
        }
    }

    /// Write through the current map. ROM and unmapped windows discard it.
    pub fn write_bus(&mut self, addr: u16, value: u8) {
        let offset = usize::from(addr) & (BANK_SIZE - 1);
        if let Page::Ram(bank) = self.map[usize::from(addr >> 14)] {
            self.ram[usize::from(bank) * BANK_SIZE + offset] = value;
        }
    }

    /// RAM bank behind `addr`, if the window holds RAM.
    #[must_use]
    pub fn ram_bank_at(&self, addr: u16) -> Option<u8> {
        match self.map[usize::from(addr >> 14)] {
            Page::Ram(bank) => Some(bank),
            Page::Rom(_) | Page::Unmapped => None,
        }
    }

    /// Is `addr` in a bank the ULA contends?
    #[must_use]
    pub fn is_contended(&self, addr: u16) -> bool {
        self.ram_bank_at(addr)
            .is_some_and(|bank| self.topology.contended & (1 << bank) != 0)
    }

    /// RAM bank the ULA is displaying.
    #[must_use]
    pub fn screen_bank(&self) -> u8 {
        if self.topology.paging != PagingPorts::None && self.port_7ffd & 0x08 != 0 {
            self.topology.shadow_screen
        } else {
            self.topology.screen
        }
    }

    /// Read the displayed screen bank. `offset` is relative to the bank start.
    #[must_use]
    pub fn screen_peek(&self, offset: u16) -> u8 {
        let offset = usize::from(offset) & (BANK_SIZE - 1);
        self.ram[usize::from(self.screen_bank()) * BANK_SIZE + offset]
    }

    /// Copy an image into the start of a RAM bank.
    ///
    /// # Errors
    ///
    /// Fails if the bank does not exist or the image is larger than a bank.
    pub fn load_ram_bank(&mut self, bank: usize, data: &[u8]) -> Result<(), ConfigError> {
        let banks = usize::from(self.topology.ram_banks);
        if bank >= banks {
            return Err(ConfigError::RamBank { bank, banks });
        }
        if data.len() > BANK_SIZE {
            return Err(ConfigError::RamBankSize(data.len()));
        }
        let start = bank * BANK_SIZE;
        self.ram[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Contents of a RAM bank.
    #[must_use]
    pub fn ram_bank(&self, bank: usize) -> Option<&[u8]> {
        if bank >= usize::from(self.topology.ram_banks) {
            return None;
        }
        let start = bank * BANK_SIZE;
        Some(&self.ram[start..start + BANK_SIZE])
    }

    /// Write the $7FFD latch.
    pub fn write_7ffd(&mut self, value: u8) {
        if self.topology.paging == PagingPorts::None {
            return;
        }
        if self.locked {
            debug!("paging locked, ignoring $7FFD <- {value:#04X}");
            return;
        }
        self.port_7ffd = value;
        self.locked = value & 0x20 != 0;
        self.remap();
        debug!(
            "$7FFD <- {value:#04X}: ram {} rom {} screen {}{}",
            value & 0x07,
            self.rom_page(),
            self.screen_bank(),
            if self.locked { " (locked)" } else { "" }
        );
    }

    /// Write the +3 $1FFD latch.
    pub fn write_1ffd(&mut self, value: u8) {
        if self.topology.paging != PagingPorts::Plus3 {
            return;
        }
        if self.locked {
            debug!("paging locked, ignoring $1FFD <- {value:#04X}");
            return;
        }
        self.port_1ffd = value;
        self.remap();
        debug!("$1FFD <- {value:#04X}: map {:?}", self.map);
    }

    #[must_use]
    pub fn port_7ffd(&self) -> u8 {
        self.port_7ffd
    }

    #[must_use]
    pub fn port_1ffd(&self) -> u8 {
        self.port_1ffd
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// +3 disk motor, $1FFD bit 3.
    #[must_use]
    pub fn disk_motor(&self) -> bool {
        self.port_1ffd & 0x08 != 0
    }

    /// +3 printer strobe, $1FFD bit 4.
    #[must_use]
    pub fn printer_strobe(&self) -> bool {
        self.port_1ffd & 0x10 != 0
    }

    /// Clear the latches. RAM survives.
    pub fn reset(&mut self) {
        self.port_7ffd = 0;
        self.port_1ffd = 0;
        self.locked = false;
        self.remap();
    }

    fn rom_page(&self) -> u8 {
        let low = (self.port_7ffd >> 4) & 1;
        match self.topology.paging {
            PagingPorts::None => 0,
            PagingPorts::Sinclair128 => low,
            PagingPorts::Plus3 => ((self.port_1ffd >> 1) & 0x02) | low,
        }
    }

    fn special_mode(&self) -> bool {
        self.topology.paging == PagingPorts::Plus3 && self.port_1ffd & 0x01 != 0
    }

    fn remap(&mut self) {
        if self.special_mode() {
            let config = SPECIAL_CONFIGS[usize::from((self.port_1ffd >> 1) & 0x03)];
            self.map = config.map(Page::Ram);
            return;
        }
        let rom = self.rom_page();
        let ram = self.port_7ffd & 0x07;
        self.map = self.topology.windows.map(|selector| match selector {
            Selector::Rom(page) => Page::Rom(page),
            Selector::Ram(bank) => Page::Ram(bank),
            Selector::LatchedRom => Page::Rom(rom),
            Selector::LatchedRam => Page::Ram(ram),
            Selector::Unmapped => Page::Unmapped,
        });
    }
}

impl Peripheral for PagingUnit {
    fn name(&self) -> &'static str {
        "paging"
    }

    /// 128K: A15 and A1 low. +3: A15 low, A14 high, A1 low for $7FFD;
    /// A15-A12 = 0001, A1 low for $1FFD. Only odd ports, so the ULA keeps
    /// every even address.
    fn claims_port(&self, port: u16) -> bool {
        if port & 0x0001 == 0 {
            return false;
        }
        match self.topology.paging {
            PagingPorts::None => false,
            PagingPorts::Sinclair128 => port & 0x8002 == 0,
            PagingPorts::Plus3 => port & 0xC002 == 0x4000 || port & 0xF002 == 0x1000,
        }
    }

    fn read_port(&mut self, _port: u16) -> Option<u8> {
        None
    }

    fn write_port(&mut self, port: u16, value: u8) {
        if self.topology.paging == PagingPorts::Plus3 && port & 0xF002 == 0x1000 {
            self.write_1ffd(value);
        } else {
            self.write_7ffd(value);
        }
    }
}

impl Observable for PagingUnit {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "port_7ffd" => Some(self.port_7ffd.into()),
            "port_1ffd" => Some(self.port_1ffd.into()),
            "locked" => Some(self.locked.into()),
            "rom_page" => Some(self.rom_page().into()),
            "ram_page" => Some((self.port_7ffd & 0x07).into()),
            "screen_bank" => Some(self.screen_bank().into()),
            "special" => Some(self.special_mode().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "port_7ffd",
            "port_1ffd",
            "locked",
            "rom_page",
            "ram_page",
            "screen_bank",
            "special",
        ]
    }
}

impl SaveState for PagingUnit {
    fn save_state(&self, out: &mut SectionWriter) {
        out.bytes("ram", &self.ram);
        out.u8("port_7ffd", self.port_7ffd);
        out.u8("port_1ffd", self.port_1ffd);
        out.bool("locked", self.locked);
    }

    fn load_state(&mut self, src: &mut SectionReader<'_>) -> Result<(), SnapshotError> {
        src.bytes_into("ram", &mut self.ram)?;
        self.port_7ffd = src.u8("port_7ffd")?;
        self.port_1ffd = src.u8("port_1ffd")?;
        self.locked = src.bool("locked")?;
        self.remap();
        Ok(())
    }
}
