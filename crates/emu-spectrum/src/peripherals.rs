//! Port-mapped peripherals.
//!
//! Every device on the I/O bus implements [`Peripheral`]: it says which
//! ports it decodes and answers reads and writes for them. Devices that only
//! listen (the border latch, the beeper) implement [`PortObserver`] instead
//! and see every write, claimed or not.

use emu_core::{SaveState, SectionReader, SectionWriter, SnapshotError};
use sinclair_ula::Ula;

use crate::keyboard::KeyboardMatrix;

/// A device on the port bus.
pub trait Peripheral {
    fn name(&self) -> &'static str;

    /// Does this device decode `port`?
    fn claims_port(&self, port: u16) -> bool;

    /// Answer a read. `None` means the device does not drive the data bus
    /// and the bus floats.
    fn read_port(&mut self, port: u16) -> Option<u8>;

    fn write_port(&mut self, port: u16, value: u8);

    /// Read-only devices let writes pass to the next claimant.
    fn accepts_writes(&self) -> bool {
        true
    }
}

/// A passive listener on port writes.
pub trait PortObserver {
    /// `cycle` is the absolute T-state of the write.
    fn observe_write(&mut self, port: u16, value: u8, cycle: u64);
}

/// Kempston joystick bits, active high.
pub mod kempston {
    pub const RIGHT: u8 = 0x01;
    pub const LEFT: u8 = 0x02;
    pub const DOWN: u8 = 0x04;
    pub const UP: u8 = 0x08;
    pub const FIRE: u8 = 0x10;
}

/// Kempston joystick interface. Decodes only A5, so it answers on every
/// port with A5 low.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Kempston {
    buttons: u8,
}

impl Kempston {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_buttons(&mut self, buttons: u8) {
        self.buttons = buttons & 0x1F;
    }

    #[must_use]
    pub fn buttons(&self) -> u8 {
        self.buttons
    }
}

impl Peripheral for Kempston {
    fn name(&self) -> &'static str {
        "kempston"
    }

    fn claims_port(&self, port: u16) -> bool {
        port & 0x0020 == 0
    }

    fn read_port(&mut self, _port: u16) -> Option<u8> {
        Some(self.buttons)
    }

    fn write_port(&mut self, _port: u16, _value: u8) {}

    fn accepts_writes(&self) -> bool {
        false
    }
}

impl SaveState for Kempston {
    fn save_state(&self, out: &mut SectionWriter) {
        out.u8("kempston", self.buttons);
    }

    fn load_state(&mut self, src: &mut SectionReader<'_>) -> Result<(), SnapshotError> {
        let buttons = src.u8("kempston")?;
        if buttons & !0x1F != 0 {
            return Err(src.invalid("kempston"));
        }
        self.buttons = buttons;
        Ok(())
    }
}

/// Bits each AY register actually stores.
const AY_REGISTER_MASKS: [u8; 16] = [
    0xFF, 0x0F, 0xFF, 0x0F, 0xFF, 0x0F, // tone periods
    0x1F, // noise period
    0xFF, // mixer
    0x1F, 0x1F, 0x1F, // amplitudes
    0xFF, 0xFF, // envelope period
    0x0F, // envelope shape
    0xFF, 0xFF, // I/O ports
];

/// AY-3-8912 register file as seen from the 128K port bus.
///
/// $FFFD selects a register and reads it back; $BFFD writes it. Sound
/// generation is out of scope: this only holds what the CPU wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AyRegisters {
    regs: [u8; 16],
    selected: u8,
}

impl AyRegisters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_register(&mut self, reg: u8) {
        self.selected = reg & 0x0F;
    }

    pub fn write_data(&mut self, value: u8) {
        let reg = usize::from(self.selected);
        self.regs[reg] = value & AY_REGISTER_MASKS[reg];
    }

    #[must_use]
    pub fn read_data(&self) -> u8 {
        self.regs[usize::from(self.selected)]
    }

    #[must_use]
    pub fn selected(&self) -> u8 {
        self.selected
    }

    #[must_use]
    pub fn registers(&self) -> &[u8; 16] {
        &self.regs
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn is_select_port(port: u16) -> bool {
        port & 0xC002 == 0xC000
    }
}

impl Peripheral for AyRegisters {
    fn name(&self) -> &'static str {
        "ay"
    }

    fn claims_port(&self, port: u16) -> bool {
        port & 0x0001 != 0 && (Self::is_select_port(port) || port & 0xC002 == 0x8000)
    }

    fn read_port(&mut self, port: u16) -> Option<u8> {
        Self::is_select_port(port).then(|| self.read_data())
    }

    fn write_port(&mut self, port: u16, value: u8) {
        if Self::is_select_port(port) {
            self.select_register(value);
        } else {
            self.write_data(value);
        }
    }
}

impl SaveState for AyRegisters {
    fn save_state(&self, out: &mut SectionWriter) {
        out.u8("ay_selected", self.selected);
        out.bytes("ay_regs", &self.regs);
    }

    fn load_state(&mut self, src: &mut SectionReader<'_>) -> Result<(), SnapshotError> {
        let selected = src.u8("ay_selected")?;
        if selected > 0x0F {
            return Err(src.invalid("ay_selected"));
        }
        let mut regs = [0; 16];
        src.bytes_into("ay_regs", &mut regs)?;
        if regs.iter().zip(AY_REGISTER_MASKS).any(|(&value, mask)| value & !mask != 0) {
            return Err(src.invalid("ay_regs"));
        }
        self.selected = selected;
        self.regs = regs;
        Ok(())
    }
}

/// The ULA's port: keyboard in, border/MIC/beeper out. Every even port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UlaPort {
    keyboard: KeyboardMatrix,
    last_write: u8,
}

impl UlaPort {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn keyboard(&self) -> &KeyboardMatrix {
        &self.keyboard
    }

    pub fn keyboard_mut(&mut self) -> &mut KeyboardMatrix {
        &mut self.keyboard
    }

    #[must_use]
    pub fn last_write(&self) -> u8 {
        self.last_write
    }
}

impl Peripheral for UlaPort {
    fn name(&self) -> &'static str {
        "ula"
    }

    fn claims_port(&self, port: u16) -> bool {
        port & 0x0001 == 0
    }

    /// Bits 0-4 keyboard (0 = pressed), bit 6 EAR from the MIC loopback,
    /// bits 5 and 7 high.
    fn read_port(&mut self, port: u16) -> Option<u8> {
        let keys = !self.keyboard.scan(port.to_be_bytes()[0]) & 0x1F;
        let ear = (self.last_write & 0x08) << 3;
        Some(keys | 0xA0 | ear)
    }

    fn write_port(&mut self, _port: u16, value: u8) {
        self.last_write = value;
    }
}

impl SaveState for UlaPort {
    fn save_state(&self, out: &mut SectionWriter) {
        out.u8("ula_last_write", self.last_write);
        out.bytes("keyboard", &self.keyboard.rows());
    }

    fn load_state(&mut self, src: &mut SectionReader<'_>) -> Result<(), SnapshotError> {
        self.last_write = src.u8("ula_last_write")?;
        let mut rows = [0; 8];
        src.bytes_into("keyboard", &mut rows)?;
        if rows.iter().any(|&keys| keys & !0x1F != 0) {
            return Err(src.invalid("keyboard"));
        }
        self.keyboard.set_rows(rows);
        Ok(())
    }
}

impl PortObserver for Ula {
    fn observe_write(&mut self, port: u16, value: u8, _cycle: u64) {
        if port & 0x0001 == 0 {
            self.set_border(value & 0x07);
        }
    }
}

/// Beeper line: bit 4 of every ULA port write.
///
/// Records each level change with its absolute cycle so an audio back end
/// can rebuild the square wave.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Beeper {
    level: bool,
    transitions: Vec<(u64, bool)>,
}

impl Beeper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn level(&self) -> bool {
        self.level
    }

    /// Drain the level changes recorded since the last call.
    pub fn take_transitions(&mut self) -> Vec<(u64, bool)> {
        std::mem::take(&mut self.transitions)
    }
}

impl PortObserver for Beeper {
    fn observe_write(&mut self, port: u16, value: u8, cycle: u64) {
        if port & 0x0001 != 0 {
            return;
        }
        let level = value & 0x10 != 0;
        if level != self.level {
            self.level = level;
            self.transitions.push((cycle, level));
        }
    }
}

impl SaveState for Beeper {
    fn save_state(&self, out: &mut SectionWriter) {
        out.bool("beeper", self.level);
    }

    fn load_state(&mut self, src: &mut SectionReader<'_>) -> Result<(), SnapshotError> {
        self.level = src.bool("beeper")?;
        self.transitions.clear();
        Ok(())
    }
}
