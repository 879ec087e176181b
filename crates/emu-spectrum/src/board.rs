//! Bank-switch boards on the expansion port.
//!
//! A board claims an address window and sees every access to it before the
//! paging unit does. Outside its window it is invisible.

use std::fmt::Debug;

use emu_core::{SaveState, SectionReader, SectionWriter, SnapshotError};
use log::debug;

use crate::config::{BoardConfig, BoardKind};
use crate::error::ConfigError;
use crate::memory::BANK_SIZE;
use crate::peripherals::Peripheral;

/// A board plugged into the expansion port.
///
/// Boards may also decode I/O ports through [`Peripheral`].
pub trait Board: Peripheral + SaveState + Debug {
    fn kind(&self) -> BoardKind;

    /// Does the board answer for `addr`?
    fn claims_address(&self, addr: u16) -> bool;

    /// Read inside the claimed window. No side effects.
    fn read(&self, addr: u16) -> u8;

    /// Write inside the claimed window.
    fn write(&mut self, addr: u16, value: u8);

    /// Power-on state. ROM contents survive.
    fn reset(&mut self);

    fn box_clone(&self) -> Box<dyn Board>;

    fn as_peripheral(&mut self) -> &mut dyn Peripheral;
}

impl Clone for Box<dyn Board> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Build the board a configuration asks for.
///
/// # Errors
///
/// Returns [`ConfigError::BoardRomSize`] if the ROM is not 1 to 4 whole banks.
pub fn build(config: &BoardConfig) -> Result<Box<dyn Board>, ConfigError> {
    match config.kind {
        BoardKind::XorProtection => Ok(Box::new(XorBoard::new(&config.rom)?)),
    }
}

/// Protection table: the value XORed into each protected register write,
/// indexed by the protection index register.
#[rustfmt::skip]
const XOR_TABLE: [u8; 256] = [
    0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x49, 0x19, 0x09, 0x59, 0x49, 0x19, 0x09,
    0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x51, 0x41, 0x11, 0x01, 0x51, 0x41, 0x11, 0x01,
    0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x49, 0x19, 0x09, 0x59, 0x49, 0x19, 0x09,
    0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x51, 0x41, 0x11, 0x01, 0x51, 0x41, 0x11, 0x01,
    0x00, 0x10, 0x40, 0x50, 0x00, 0x10, 0x40, 0x50, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x08, 0x18, 0x48, 0x58, 0x08, 0x18, 0x48, 0x58, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x10, 0x40, 0x50, 0x00, 0x10, 0x40, 0x50, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x08, 0x18, 0x48, 0x58, 0x08, 0x18, 0x48, 0x58, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x58, 0x48, 0x18, 0x08, 0x58, 0x48, 0x18, 0x08,
    0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x50, 0x40, 0x10, 0x00, 0x50, 0x40, 0x10, 0x00,
    0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x58, 0x48, 0x18, 0x08, 0x58, 0x48, 0x18, 0x08,
    0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x50, 0x40, 0x10, 0x00, 0x50, 0x40, 0x10, 0x00,
    0x01, 0x11, 0x41, 0x51, 0x01, 0x11, 0x41, 0x51, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x09, 0x19, 0x49, 0x59, 0x09, 0x19, 0x49, 0x59, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x11, 0x41, 0x51, 0x01, 0x11, 0x41, 0x51, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x09, 0x19, 0x49, 0x59, 0x09, 0x19, 0x49, 0x59, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Banked ROM cartridge with XOR-protected registers.
///
/// Replaces the system ROM at $0000-$3FFF:
///
/// | Range       | Write                                   | Read        |
/// |-------------|-----------------------------------------|-------------|
/// | $0800-$0FFF | bank = `(v & 1) \| ((v >> 3) & 2)`      | ROM         |
/// | $2800-$2FFF | same as $0800                           | ROM         |
/// | $3000-$37FF | protection index = v                    | ROM         |
/// | $3800-$3FFF | `reg[addr & 3] = v ^ XOR_TABLE[index]`  | `reg[addr & 3]` |
/// | elsewhere   | discarded                               | ROM         |
///
/// The board decodes no ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XorBoard {
    rom: Box<[u8]>,
    banks: u8,
    bank: u8,
    index: u8,
    regs: [u8; 4],
}

impl XorBoard {
    /// # Errors
    ///
    /// Returns [`ConfigError::BoardRomSize`] unless `rom` is 1 to 4 banks of 16K.
    pub fn new(rom: &[u8]) -> Result<Self, ConfigError> {
        let banks = rom.len() / BANK_SIZE;
        if rom.is_empty() || rom.len() % BANK_SIZE != 0 || banks > 4 {
            return Err(ConfigError::BoardRomSize(rom.len()));
        }
        Ok(Self {
            rom: rom.into(),
            banks: u8::try_from(banks).map_err(|_| ConfigError::BoardRomSize(rom.len()))?,
            bank: 0,
            index: 0,
            regs: [0; 4],
        })
    }

    #[must_use]
    pub fn bank(&self) -> u8 {
        self.bank
    }

    #[must_use]
    pub fn index(&self) -> u8 {
        self.index
    }

    #[must_use]
    pub fn registers(&self) -> [u8; 4] {
        self.regs
    }
}

impl Board for XorBoard {
    fn kind(&self) -> BoardKind {
        BoardKind::XorProtection
    }

    fn claims_address(&self, addr: u16) -> bool {
        addr < 0x4000
    }

    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x3800..=0x3FFF => self.regs[usize::from(addr & 3)],
            _ => self.rom[usize::from(self.bank) * BANK_SIZE + (usize::from(addr) & (BANK_SIZE - 1))],
        }
    }

    fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0x0800..=0x0FFF | 0x2800..=0x2FFF => {
                self.bank = ((value & 1) | ((value >> 3) & 2)) % self.banks;
                debug!("xor board: bank {}", self.bank);
            }
            0x3000..=0x37FF => {
                self.index = value;
                debug!("xor board: index {value:#04X}");
            }
            0x3800..=0x3FFF => {
                let reg = usize::from(addr & 3);
                self.regs[reg] = value ^ XOR_TABLE[usize::from(self.index)];
                debug!("xor board: reg {reg} <- {:#04X}", self.regs[reg]);
            }
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.bank = 0;
        self.index = 0;
        self.regs = [0; 4];
    }

    fn box_clone(&self) -> Box<dyn Board> {
        Box::new(self.clone())
    }

    fn as_peripheral(&mut self) -> &mut dyn Peripheral {
        self
    }
}

impl Peripheral for XorBoard {
    fn name(&self) -> &'static str {
        "xor-protection"
    }

    fn claims_port(&self, _port: u16) -> bool {
        false
    }

    fn read_port(&mut self, _port: u16) -> Option<u8> {
        None
    }

    fn write_port(&mut self, _port: u16, _value: u8) {}
}

impl SaveState for XorBoard {
    fn save_state(&self, out: &mut SectionWriter) {
        out.u8("bank", self.bank);
        out.u8("index", self.index);
        out.bytes("regs", &self.regs);
    }

    fn load_state(&mut self, src: &mut SectionReader<'_>) -> Result<(), SnapshotError> {
        let bank = src.u8("bank")?;
        if bank >= self.banks {
            return Err(src.invalid("bank"));
        }
        self.bank = bank;
        self.index = src.u8("index")?;
        src.bytes_into("regs", &mut self.regs)?;
        Ok(())
    }
}
