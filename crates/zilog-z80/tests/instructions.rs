//! Instruction semantics: small programs run to HALT on a flat bus.

use emu_core::{Cpu, SimpleBus};
use zilog_z80::{CF, HF, NF, PF, SF, ZF, Z80};

fn run_to_halt(code: &[u8], setup: impl FnOnce(&mut SimpleBus)) -> (Z80, SimpleBus) {
    let mut bus = SimpleBus::new();
    bus.load(0x0000, code);
    setup(&mut bus);
    let mut cpu = Z80::new();
    for _ in 0..10_000 {
        cpu.tick(&mut bus);
        if cpu.is_halted() {
            return (cpu, bus);
        }
    }
    panic!("program never halted; PC={:04X}", cpu.pc());
}

fn run(code: &[u8]) -> (Z80, SimpleBus) {
    run_to_halt(code, |_| {})
}

#[test]
fn add_and_sub_set_flags() {
    // LD A,0x0F; ADD A,1; HALT
    let (cpu, _) = run(&[0x3E, 0x0F, 0xC6, 0x01, 0x76]);
    assert_eq!(cpu.regs().a, 0x10);
    assert_ne!(cpu.regs().f & HF, 0);
    assert_eq!(cpu.regs().f & (CF | NF | ZF), 0);

    // LD A,0x10; SUB 0x20; HALT
    let (cpu, _) = run(&[0x3E, 0x10, 0xD6, 0x20, 0x76]);
    assert_eq!(cpu.regs().a, 0xF0);
    assert_ne!(cpu.regs().f & CF, 0);
    assert_ne!(cpu.regs().f & NF, 0);
    assert_ne!(cpu.regs().f & SF, 0);
}

#[test]
fn daa_corrects_bcd_addition() {
    // LD A,0x15; ADD A,0x27; DAA; HALT
    let (cpu, _) = run(&[0x3E, 0x15, 0xC6, 0x27, 0x27, 0x76]);
    assert_eq!(cpu.regs().a, 0x42);
    assert_eq!(cpu.regs().f & CF, 0);
}

#[test]
fn neg_negates_accumulator() {
    // LD A,1; NEG; HALT
    let (cpu, _) = run(&[0x3E, 0x01, 0xED, 0x44, 0x76]);
    assert_eq!(cpu.regs().a, 0xFF);
    assert_ne!(cpu.regs().f & CF, 0);
    assert_ne!(cpu.regs().f & NF, 0);
}

#[test]
fn sbc_hl_borrows_carry() {
    // LD HL,0x1000; LD BC,1; SCF; SBC HL,BC; HALT
    let (cpu, _) = run(&[0x21, 0x00, 0x10, 0x01, 0x01, 0x00, 0x37, 0xED, 0x42, 0x76]);
    assert_eq!(cpu.regs().hl(), 0x0FFE);
    assert_ne!(cpu.regs().f & NF, 0);
    assert_eq!(cpu.regs().f & (CF | ZF), 0);
}

#[test]
fn push_pop_moves_pairs_through_stack() {
    // LD SP,0x8000; LD BC,0x1234; PUSH BC; POP DE; HALT
    let (cpu, bus) = run(&[0x31, 0x00, 0x80, 0x01, 0x34, 0x12, 0xC5, 0xD1, 0x76]);
    assert_eq!(cpu.regs().de(), 0x1234);
    assert_eq!(cpu.regs().sp, 0x8000);
    assert_eq!(&bus.ram[0x7FFE..0x8000], &[0x34, 0x12]);
}

#[test]
fn call_and_return() {
    let mut code = vec![0u8; 0x20];
    code[..7].copy_from_slice(&[0x31, 0x00, 0x80, 0xCD, 0x10, 0x00, 0x76]);
    code[0x10..0x13].copy_from_slice(&[0x3E, 0x55, 0xC9]);
    let (cpu, _) = run(&code);
    assert_eq!(cpu.regs().a, 0x55);
    assert_eq!(cpu.pc(), 0x0007);
    assert_eq!(cpu.regs().sp, 0x8000);
}

#[test]
fn djnz_loops_b_times() {
    // LD B,5; LD A,0; loop: INC A; DJNZ loop; HALT
    let (cpu, _) = run(&[0x06, 0x05, 0x3E, 0x00, 0x3C, 0x10, 0xFD, 0x76]);
    assert_eq!(cpu.regs().a, 5);
    assert_eq!(cpu.regs().b, 0);
}

#[test]
fn ex_sp_hl_swaps_with_stack_top() {
    // LD SP,0x8000; LD HL,0x1234; EX (SP),HL; HALT
    let (cpu, bus) = run_to_halt(&[0x31, 0x00, 0x80, 0x21, 0x34, 0x12, 0xE3, 0x76], |bus| {
        bus.load(0x8000, &[0x78, 0x56]);
    });
    assert_eq!(cpu.regs().hl(), 0x5678);
    assert_eq!(&bus.ram[0x8000..0x8002], &[0x34, 0x12]);
    assert_eq!(cpu.regs().wz, 0x5678);
}

#[test]
fn exchanges_swap_banks() {
    // LD BC,0x1111; EXX; LD BC,0x2222; LD A,7; EX AF,AF'; LD A,9; HALT
    let (cpu, _) = run(&[
        0x01, 0x11, 0x11, 0xD9, 0x01, 0x22, 0x22, 0x3E, 0x07, 0x08, 0x3E, 0x09, 0x76,
    ]);
    assert_eq!(cpu.regs().bc(), 0x2222);
    assert_eq!(cpu.regs().bc_alt(), 0x1111);
    assert_eq!(cpu.regs().a, 9);
    assert_eq!(cpu.regs().af_alt() >> 8, 7);
}

#[test]
fn ldir_copies_block() {
    // LD HL,0x9000; LD DE,0xA000; LD BC,4; LDIR; HALT
    let code = [0x21, 0x00, 0x90, 0x11, 0x00, 0xA0, 0x01, 0x04, 0x00, 0xED, 0xB0, 0x76];
    let (cpu, bus) = run_to_halt(&code, |bus| bus.load(0x9000, &[1, 2, 3, 4]));
    assert_eq!(&bus.ram[0xA000..0xA004], &[1, 2, 3, 4]);
    assert_eq!(cpu.regs().bc(), 0);
    assert_eq!(cpu.regs().hl(), 0x9004);
    assert_eq!(cpu.regs().de(), 0xA004);
    assert_eq!(cpu.regs().f & PF, 0);
    assert_eq!(cpu.pc(), 0x000C);
}

#[test]
fn cpir_stops_on_match() {
    // LD HL,0x9000; LD BC,0x10; LD A,0x33; CPIR; HALT
    let code = [0x21, 0x00, 0x90, 0x01, 0x10, 0x00, 0x3E, 0x33, 0xED, 0xB1, 0x76];
    let (cpu, _) = run_to_halt(&code, |bus| bus.load(0x9000, &[0x11, 0x22, 0x33, 0x44]));
    assert_eq!(cpu.regs().hl(), 0x9003);
    assert_eq!(cpu.regs().bc(), 0x000D);
    assert_ne!(cpu.regs().f & ZF, 0);
    assert_ne!(cpu.regs().f & PF, 0);
}

#[test]
fn rld_rotates_nibbles_through_memory() {
    // LD HL,0x9000; LD A,0x12; RLD; HALT
    let (cpu, bus) = run_to_halt(&[0x21, 0x00, 0x90, 0x3E, 0x12, 0xED, 0x6F, 0x76], |bus| {
        bus.load(0x9000, &[0x34]);
    });
    assert_eq!(cpu.regs().a, 0x13);
    assert_eq!(bus.ram[0x9000], 0x42);
}

#[test]
fn indexed_memory_operands() {
    let code = [
        0xDD, 0x21, 0x00, 0x90, // LD IX,0x9000
        0xDD, 0x36, 0x05, 0x7F, // LD (IX+5),0x7F
        0xDD, 0x34, 0x05, // INC (IX+5)
        0xDD, 0x7E, 0x05, // LD A,(IX+5)
        0xFD, 0x21, 0x10, 0x90, // LD IY,0x9010
        0xFD, 0x46, 0xFF, // LD B,(IY-1)
        0x76,
    ];
    let (cpu, bus) = run_to_halt(&code, |bus| bus.load(0x900F, &[0xAB]));
    assert_eq!(bus.ram[0x9005], 0x80);
    assert_eq!(cpu.regs().a, 0x80);
    assert_ne!(cpu.regs().f & PF, 0, "0x7F + 1 overflows");
    assert_ne!(cpu.regs().f & SF, 0);
    assert_eq!(cpu.regs().b, 0xAB);
    assert_eq!(cpu.regs().wz, 0x900F);
}

#[test]
fn indexed_bit_ops_copy_result_to_register() {
    let code = [
        0xDD, 0x21, 0x00, 0x90, // LD IX,0x9000
        0xDD, 0xCB, 0x02, 0xDE, // SET 3,(IX+2)
        0xDD, 0xCB, 0x02, 0x00, // RLC (IX+2),B
        0x76,
    ];
    let (cpu, bus) = run_to_halt(&code, |bus| bus.load(0x9002, &[0x81]));
    assert_eq!(bus.ram[0x9002], 0x13);
    assert_eq!(cpu.regs().b, 0x13);
    assert_ne!(cpu.regs().f & CF, 0);
}

#[test]
fn index_halves_are_addressable() {
    // LD IX,0x1234; LD A,IXH; LD IXL,A; HALT
    let (cpu, _) = run(&[0xDD, 0x21, 0x34, 0x12, 0xDD, 0x7C, 0xDD, 0x6F, 0x76]);
    assert_eq!(cpu.regs().a, 0x12);
    assert_eq!(cpu.regs().ix, 0x1212);
    assert_eq!(cpu.regs().hl(), 0, "HL untouched by indexed forms");
}

#[test]
fn prefixes_bump_refresh_counter() {
    // NOP; LD IX,0; HALT
    let (cpu, _) = run(&[0x00, 0xDD, 0x21, 0x00, 0x00, 0x76]);
    assert_eq!(cpu.regs().r, 4);
}

#[test]
fn io_instructions_drive_port_address() {
    // LD A,0x12; OUT (0xFE),A; LD BC,0x7FFD; OUT (C),A; IN A,(0xFE); HALT
    let code = [0x3E, 0x12, 0xD3, 0xFE, 0x01, 0xFD, 0x7F, 0xED, 0x79, 0xDB, 0xFE, 0x76];
    let (cpu, bus) = run_to_halt(&code, |bus| bus.io_input = 0xBF);
    assert_eq!(bus.io_writes, vec![(0x12FE, 0x12), (0x7FFD, 0x12)]);
    assert_eq!(cpu.regs().a, 0xBF);
}

#[test]
fn in_r_c_sets_flags_from_value() {
    // LD BC,0x00FE; IN D,(C); HALT
    let (cpu, _) = run_to_halt(&[0x01, 0xFE, 0x00, 0xED, 0x50, 0x76], |bus| bus.io_input = 0x00);
    assert_eq!(cpu.regs().d, 0);
    assert_ne!(cpu.regs().f & ZF, 0);
    assert_ne!(cpu.regs().f & PF, 0);
}
