//! Shared machine builders for the integration tests.

#![allow(dead_code)]

use emu_spectrum::{MachineConfig, Spectrum, SpectrumModel};

/// 128K program that touches contended RAM, pages banks, writes the border
/// and reads a floating port, with IM 1 interrupts enabled.
pub const BUSY_LOOP: &[u8] = &[
    0x31, 0x00, 0x80, // LD SP,$8000
    0xED, 0x56, // IM 1
    0xFB, // EI
    0x21, 0x00, 0x40, // LD HL,$4000
    0x01, 0xFD, 0x7F, // LD BC,$7FFD
    0x34, // loop: INC (HL)
    0x23, // INC HL
    0x7C, // LD A,H
    0xE6, 0x07, // AND 7
    0xED, 0x79, // OUT (C),A
    0xD3, 0xFE, // OUT ($FE),A
    0xDB, 0x1F, // IN A,($1F)
    0x18, 0xF3, // JR loop
];

/// Interrupt handler at $0038: `EI ; RET`.
pub const HANDLER: &[u8] = &[0xFB, 0xC9];

pub fn rom_with(size: usize, code: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; size];
    rom[..code.len()].copy_from_slice(code);
    rom
}

pub fn busy_config() -> MachineConfig {
    let mut rom = rom_with(SpectrumModel::Spectrum128K.rom_size(), BUSY_LOOP);
    rom[0x38..0x38 + HANDLER.len()].copy_from_slice(HANDLER);
    MachineConfig::new(SpectrumModel::Spectrum128K, rom)
}

pub fn busy_machine() -> Spectrum {
    Spectrum::new(busy_config()).expect("valid config")
}

pub fn run(spectrum: &mut Spectrum, ticks: u32) {
    for _ in 0..ticks {
        spectrum.step();
    }
}
