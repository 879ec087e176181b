//! Whole-machine scenarios driven by small ROM programs.

use std::cell::Cell;
use std::rc::Rc;

use emu_core::{Bus, Cpu, IoBus};
use emu_spectrum::{
    AutofireController, AutofirePattern, BoardConfig, ControllerState, MachineConfig, Spectrum, SpectrumModel,
};

fn rom_with(size: usize, code: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; size];
    rom[..code.len()].copy_from_slice(code);
    rom
}

fn machine(model: SpectrumModel, code: &[u8]) -> Spectrum {
    Spectrum::new(MachineConfig::new(model, rom_with(model.rom_size(), code))).expect("valid config")
}

fn run(spectrum: &mut Spectrum, ticks: u32) {
    for _ in 0..ticks {
        spectrum.step();
    }
}

#[test]
fn decrement_and_jump_follows_the_timing_table() {
    // DEC A (4) ; JP 0 (10)
    let mut spectrum = machine(SpectrumModel::Spectrum16K, &[0x3D, 0xC3, 0x00, 0x00]);
    assert_eq!(spectrum.cpu().regs().a, 0xFF);

    run(&mut spectrum, 10);
    assert_eq!(spectrum.cpu().regs().a, 0xFE);

    run(&mut spectrum, 4);
    assert_eq!(spectrum.cpu().pc(), 0x0000);
    assert!(spectrum.cpu().at_boundary());

    run(&mut spectrum, 14 * 9);
    assert_eq!(spectrum.cpu().regs().a, 0xF5);
    assert_eq!(spectrum.bus().wait_states(), 0);
}

#[test]
fn bank_switch_through_the_control_port() {
    // LD A,3 ; LD BC,$7FFD ; OUT (C),A ; LD A,($C000) ; HALT
    let code = [0x3E, 0x03, 0x01, 0xFD, 0x7F, 0xED, 0x79, 0x3A, 0x00, 0xC0, 0x76];
    let mut spectrum = machine(SpectrumModel::Spectrum128K, &code);
    spectrum.load_ram_bank(0, &[0x00]).expect("bank 0");
    spectrum.load_ram_bank(3, &[0x33]).expect("bank 3");

    run(&mut spectrum, 60);
    assert!(spectrum.cpu().is_halted());
    assert_eq!(spectrum.cpu().regs().a, 0x33);
    assert_eq!(spectrum.bus().paging().port_7ffd(), 0x03);
}

#[test]
fn paging_lock_survives_until_reset() {
    // LD BC,$7FFD ; LD A,$21 ; OUT (C),A ; LD A,$04 ; OUT (C),A ; HALT
    let code = [0x01, 0xFD, 0x7F, 0x3E, 0x21, 0xED, 0x79, 0x3E, 0x04, 0xED, 0x79, 0x76];
    let mut spectrum = machine(SpectrumModel::Spectrum128K, &code);
    run(&mut spectrum, 80);
    assert!(spectrum.bus().paging().is_locked());
    assert_eq!(spectrum.bus().paging().port_7ffd(), 0x21);
}

#[test]
fn unclaimed_port_floats_high_outside_the_display() {
    // LD A,0 ; IN A,($FF) ; HALT
    let mut spectrum = machine(SpectrumModel::Spectrum48K, &[0x3E, 0x00, 0xDB, 0xFF, 0x76]);
    run(&mut spectrum, 30);
    assert!(spectrum.frame_cycle() < 14_000);
    assert_eq!(spectrum.cpu().regs().a, 0xFF);
}

#[test]
fn unclaimed_port_sees_the_screen_fetch() {
    let mut spectrum = machine(SpectrumModel::Spectrum48K, &[0x76]);
    let bus = spectrum.bus_mut();
    bus.write(0x4000, 0x5A);
    bus.ula.set_frame_cycle(14_338);
    assert_eq!(bus.floating_bus(), 0x5A);
}

#[test]
fn rom_writes_do_not_stick() {
    // LD A,$99 ; LD ($0000),A ; LD ($8000),A ; HALT
    let code = [0x3E, 0x99, 0x32, 0x00, 0x00, 0x32, 0x00, 0x80, 0x76];
    let mut spectrum = machine(SpectrumModel::Spectrum48K, &code);
    run(&mut spectrum, 50);
    assert_eq!(spectrum.peek(0x0000), 0x3E);
    assert_eq!(spectrum.peek(0x8000), 0x99);
}

#[test]
fn kempston_shadows_lower_priority_ports() {
    let rom = rom_with(0x4000, &[0x76]);
    let mut with = Spectrum::new(MachineConfig::new(SpectrumModel::Spectrum48K, rom.clone()).with_kempston(true))
        .expect("valid config");
    let mut without = Spectrum::new(MachineConfig::new(SpectrumModel::Spectrum48K, rom)).expect("valid config");

    let input = ControllerState::new().with("P1 Button").with("P1 Up");
    with.apply_input(&input);
    without.apply_input(&input);

    // $1E is even, so the ULA would answer it too.
    assert_eq!(with.bus_mut().read_io(0x001E), 0x18);
    assert_eq!(without.bus_mut().read_io(0x001E) & 0x1F, 0x1F);
    // $1F is odd: Kempston or nothing.
    assert_eq!(with.bus_mut().read_io(0x001F), 0x18);
    assert_eq!(without.bus_mut().read_io(0x001F), 0xFF);
}

#[test]
fn keyboard_rows_reach_the_cpu() {
    // LD A,$FD ; IN A,($FE) ; HALT   (row 1: A S D F G)
    let mut spectrum = machine(SpectrumModel::Spectrum48K, &[0x3E, 0xFD, 0xDB, 0xFE, 0x76]);
    spectrum.apply_input(&ControllerState::new().with("Key S"));
    run(&mut spectrum, 30);
    assert_eq!(spectrum.cpu().regs().a & 0x1F, 0x1D);
}

#[test]
fn xor_board_transforms_protected_writes() {
    // LD A,$42 ; LD ($3000),A ; LD A,$55 ; LD ($3800),A ; LD ($8000),A ; HALT
    let code = [
        0x3E, 0x42, 0x32, 0x00, 0x30, 0x3E, 0x55, 0x32, 0x00, 0x38, 0x32, 0x00, 0x80, 0x76,
    ];
    let mut board_rom = rom_with(0x8000, &code);
    board_rom[0x3000] = 0xEE;
    board_rom[0x4000 + 0x3000] = 0xDD;
    let config = MachineConfig::new(SpectrumModel::Spectrum48K, vec![0x76; 0x4000])
        .with_board(BoardConfig::xor_protection(board_rom));
    let mut spectrum = Spectrum::new(config).expect("valid config");

    run(&mut spectrum, 100);
    assert!(spectrum.cpu().is_halted());
    // Index $42 selects $40 from the protection table.
    assert_eq!(spectrum.peek(0x3800), 0x15);
    assert_eq!(spectrum.peek(0x3000), 0xEE);
    // Outside the window the write is untouched.
    assert_eq!(spectrum.peek(0x8000), 0x55);

    spectrum.bus_mut().write(0x0800, 0x01);
    assert_eq!(spectrum.peek(0x3000), 0xDD);
}

#[test]
fn interrupt_mode_one_runs_once_per_frame() {
    // 0000: IM 1 ; EI ; HALT ; JR -3
    // 0038: INC B ; EI ; RET
    let mut rom = rom_with(0x4000, &[0xED, 0x56, 0xFB, 0x76, 0x18, 0xFD]);
    rom[0x38..0x3B].copy_from_slice(&[0x04, 0xFB, 0xC9]);
    let mut spectrum = Spectrum::new(MachineConfig::new(SpectrumModel::Spectrum48K, rom)).expect("valid config");

    let input = ControllerState::new();
    for _ in 0..3 {
        spectrum.run_frame(&input);
    }
    // EI lands inside the first INT window, so the first frame counts.
    assert_eq!(spectrum.cpu().regs().b, 3);
    assert_eq!(spectrum.frame_count(), 3);
}

#[test]
fn banks_are_isolated() {
    let mut spectrum = machine(SpectrumModel::Spectrum128K, &[0x76]);
    let bus = spectrum.bus_mut();
    bus.write_io(0x7FFD, 0x03);
    bus.write(0xC000, 0xAA);
    bus.write_io(0x7FFD, 0x04);
    assert_eq!(bus.read(0xC000), 0x00);
    bus.write(0xC000, 0xBB);

    assert_eq!(spectrum.ram_bank(3).map(|bank| bank[0]), Some(0xAA));
    assert_eq!(spectrum.ram_bank(4).map(|bank| bank[0]), Some(0xBB));
    // Bank 5 is always at $4000 and untouched by the $C000 window.
    assert_eq!(spectrum.peek(0x4000), 0x00);
    assert_eq!(spectrum.ram_bank(8), None);
}

/// `LD A,$10 ; OUT ($FE),A ; XOR A ; OUT ($FE),A ; JR loop`
const BEEPER_LOOP: [u8; 9] = [0x3E, 0x10, 0xD3, 0xFE, 0xAF, 0xD3, 0xFE, 0x18, 0xF7];

#[test]
fn beeper_edges_are_drained_every_step() {
    let mut spectrum = machine(SpectrumModel::Spectrum48K, &BEEPER_LOOP);
    let input = ControllerState::new();
    for _ in 0..10 {
        spectrum.run_frame(&input);
        assert!(spectrum.bus_mut().beeper.take_transitions().is_empty());
    }

    let edges = Rc::new(Cell::new(0u64));
    let last = Rc::new(Cell::new(0u64));
    let (count, stamp) = (Rc::clone(&edges), Rc::clone(&last));
    spectrum.set_audio_observer(move |cycle: u64, _level: bool| {
        assert!(cycle >= stamp.get());
        stamp.set(cycle);
        count.set(count.get() + 1);
    });
    for _ in 0..10 {
        spectrum.run_frame(&input);
        assert!(spectrum.bus_mut().beeper.take_transitions().is_empty());
    }
    // Two edges per 45 T-state pass of the loop.
    assert!(edges.get() > 10 * 2_500);
}

#[test]
fn frames_without_input_reads_are_lag_frames() {
    let input = ControllerState::new();

    // HALT forever: nothing reads the keyboard.
    let mut idle = machine(SpectrumModel::Spectrum48K, &[0x76]);
    idle.run_frame(&input);
    idle.run_frame(&input);
    assert!(idle.is_lag_frame());
    assert_eq!(idle.lag_count(), 2);

    // IN A,($FE) ; JR -4
    let mut polling = machine(SpectrumModel::Spectrum48K, &[0xDB, 0xFE, 0x18, 0xFC]);
    polling.run_frame(&input);
    assert!(!polling.is_lag_frame());
    assert_eq!(polling.lag_count(), 0);

    // IN A,($1F) ; JR -4 reads the joystick only when one is fitted.
    let rom = rom_with(0x4000, &[0xDB, 0x1F, 0x18, 0xFC]);
    let config = MachineConfig::new(SpectrumModel::Spectrum48K, rom);
    let mut joystick = Spectrum::new(config.clone().with_kempston(true)).expect("valid config");
    let mut floating = Spectrum::new(config).expect("valid config");
    joystick.run_frame(&input);
    floating.run_frame(&input);
    assert!(!joystick.is_lag_frame());
    assert!(floating.is_lag_frame());

    let image = idle.save();
    let mut copy = machine(SpectrumModel::Spectrum48K, &[0x76]);
    copy.restore(&image).expect("restore");
    assert!(copy.is_lag_frame());
    assert_eq!(copy.lag_count(), 2);
}

#[test]
fn lag_frames_hold_autofire() {
    // Reads the keyboard only while B is odd: INC B ; BIT 0,B ; JR Z,+2 ;
    // IN A,($FE) ; HALT ; JR -10, with IM 1 waking the HALT each frame.
    let code = [0xED, 0x56, 0xFB, 0x04, 0xCB, 0x40, 0x28, 0x02, 0xDB, 0xFE, 0x76, 0x18, 0xF6];
    let mut rom = rom_with(0x4000, &code);
    rom[0x38..0x3A].copy_from_slice(&[0xFB, 0xC9]);
    let mut spectrum = Spectrum::new(MachineConfig::new(SpectrumModel::Spectrum48K, rom)).expect("valid config");

    let held = ControllerState::new().with("P1 Button");
    let mut autofire = AutofireController::new();
    autofire.set_pattern("P1 Button", AutofirePattern::alternating(1, 1, true));
    let mut lags = Vec::new();
    for _ in 0..6 {
        spectrum.run_frame(&autofire.apply(&held));
        autofire.advance(spectrum.is_lag_frame());
        lags.push(spectrum.is_lag_frame());
    }
    assert!(lags.contains(&true));
    assert!(lags.contains(&false));
    assert_eq!(spectrum.lag_count(), lags.iter().filter(|&&lag| lag).count() as u64);
}
