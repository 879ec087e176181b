//! Z80 micro-op sequencer.

use std::mem;

use emu_core::{Cpu, IoBus, Observable, SaveState, SectionReader, SectionWriter, SnapshotError, Ticks, Value};
use log::{debug, trace};

use crate::alu;
use crate::decode::program;
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, flag_if, sz53, sz53p};
use crate::interrupts::{InterruptController, InterruptKind};
use crate::microcode::{Addr, BlockOp, Cond, DispatchKind, Exchange, MicroOp, Port, ProgramId, Reg8, Reg16, Table};
use crate::registers::Registers;

/// Silicon variant. Only the undocumented corners differ.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Z80Variant {
    /// Original NMOS part: `OUT (C),0` drives 0, and `LD A,I`/`LD A,R`
    /// report P/V clear when an interrupt is taken straight after.
    #[default]
    Nmos,
    /// CMOS part: `OUT (C),0` drives 0xFF.
    Cmos,
}

impl Z80Variant {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Z80Variant::Nmos => "nmos",
            Z80Variant::Cmos => "cmos",
        }
    }
}

/// Z80 CPU.
///
/// The CPU does not own the bus. The bus is passed to `tick()` on every
/// T-state, so the machine can share it with the ULA and peripherals.
/// Each tick retires exactly one micro-op from the current program; when
/// the program is exhausted the tick is an opcode boundary.
#[derive(Debug, Clone)]
pub struct Z80 {
    regs: Registers,
    variant: Z80Variant,
    interrupts: InterruptController,

    program_id: ProgramId,
    program: &'static [MicroOp],
    cursor: u8,
    /// Table for the next opcode fetch, set by prefixes.
    table: Table,
    /// Last opcode byte fetched.
    opcode: u8,
    /// Temporary latch `Th:Tl`.
    temp: u16,
    /// Target latched into WZ at the dispatch checkpoint.
    vector: u16,

    ei_shadow: bool,
    /// An `LD A,I`/`LD A,R` has just retired.
    air_race: bool,
    reset_pending: bool,

    ticks: Ticks,
}

impl Z80 {
    /// NMOS Z80 with the standard NMI/INT pins.
    #[must_use]
    pub fn new() -> Self {
        Self::with_variant(Z80Variant::Nmos)
    }

    #[must_use]
    pub fn with_variant(variant: Z80Variant) -> Self {
        Self::with_interrupts(variant, InterruptController::standard())
    }

    /// A CPU whose interrupt sources are `interrupts`.
    #[must_use]
    pub fn with_interrupts(variant: Z80Variant, interrupts: InterruptController) -> Self {
        let mut cpu = Self {
            regs: Registers::power_on(),
            variant,
            interrupts,
            program_id: ProgramId::Empty,
            program: &[],
            cursor: 0,
            table: Table::Main,
            opcode: 0,
            temp: 0,
            vector: 0,
            ei_shadow: false,
            air_race: false,
            reset_pending: false,
            ticks: Ticks::ZERO,
        };
        cpu.reset();
        cpu
    }

    #[must_use]
    pub const fn variant(&self) -> Z80Variant {
        self.variant
    }

    /// Total T-states elapsed since creation.
    #[must_use]
    pub const fn total_ticks(&self) -> Ticks {
        self.ticks
    }

    #[must_use]
    pub const fn regs(&self) -> &Registers {
        &self.regs
    }

    #[must_use]
    pub const fn interrupts(&self) -> &InterruptController {
        &self.interrupts
    }

    /// Lines are driven from here. IFF1 stays under CPU control.
    pub fn interrupts_mut(&mut self) -> &mut InterruptController {
        &mut self.interrupts
    }

    #[must_use]
    pub const fn program_id(&self) -> ProgramId {
        self.program_id
    }

    #[must_use]
    pub const fn cursor(&self) -> u8 {
        self.cursor
    }

    /// True if the next tick starts a new instruction (or interrupt entry).
    #[must_use]
    pub fn at_boundary(&self) -> bool {
        usize::from(self.cursor) >= self.program.len()
    }

    /// Reset at the next opcode boundary. Micro-ops already retired stay.
    pub fn request_reset(&mut self) {
        self.reset_pending = true;
    }

    #[must_use]
    pub const fn is_reset_pending(&self) -> bool {
        self.reset_pending
    }

    /// Set the program counter.
    ///
    /// Only available in test builds.
    #[cfg(feature = "test-utils")]
    pub fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
    }

    /// Mutable register access for test setup.
    ///
    /// Only available in test builds. IFF1 changes made here are not seen by
    /// the interrupt controller until the next DI/EI.
    #[cfg(feature = "test-utils")]
    pub fn regs_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    fn set_iff1(&mut self, enabled: bool) {
        self.regs.iff1 = enabled;
        self.interrupts.set_master_enable(enabled);
    }

    fn load(&mut self, id: ProgramId) {
        self.program_id = id;
        self.program = program(id);
        self.cursor = 0;
    }

    fn retire<B: IoBus>(&mut self, bus: &mut B) {
        let op = self.program[usize::from(self.cursor)];
        self.cursor += 1;
        self.execute(op, bus);
    }

    fn boundary<B: IoBus>(&mut self, bus: &mut B) {
        if self.program_id.is_dispatch() {
            self.interrupts.complete();
        }
        let shadow = mem::take(&mut self.ei_shadow);
        let air_race = mem::take(&mut self.air_race);

        if self.reset_pending {
            debug!("deferred reset applied at PC {:04X}", self.regs.pc);
            self.reset();
            return;
        }
        if self.table == Table::Main && !shadow {
            if let Some((_, kind)) = self.interrupts.begin_dispatch() {
                self.accept(kind, air_race, bus);
                return;
            }
        }
        self.fetch(bus);
    }

    /// M1 opcode fetch. While halted the byte at PC is read but PC holds and
    /// a NOP runs instead.
    fn fetch<B: IoBus>(&mut self, bus: &mut B) {
        let table = mem::replace(&mut self.table, Table::Main);
        let opcode = bus.read(self.regs.pc);
        self.regs.inc_r();
        if self.regs.halted {
            self.load(ProgramId::Op(Table::Main, 0x00));
            return;
        }
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.opcode = opcode;
        self.load(ProgramId::Op(table, opcode));
    }

    /// Start an entry sequence. Its first micro-op retires on this tick.
    fn accept<B: IoBus>(&mut self, kind: InterruptKind, air_race: bool, bus: &mut B) {
        let dispatch = match kind {
            InterruptKind::NonMaskable => {
                self.regs.iff2 = self.regs.iff1;
                self.vector = 0x0066;
                DispatchKind::Nmi
            }
            InterruptKind::Maskable => {
                self.regs.iff2 = false;
                if air_race && self.variant == Z80Variant::Nmos {
                    self.regs.f &= !PF;
                }
                match self.regs.im {
                    1 => {
                        self.vector = 0x0038;
                        DispatchKind::Restart
                    }
                    2 => {
                        let data = bus.interrupt_data();
                        self.vector = u16::from(self.regs.i) << 8 | u16::from(data);
                        DispatchKind::Vectored
                    }
                    _ => {
                        // IM 0 executes the byte on the bus; only RST is modelled.
                        let data = bus.interrupt_data();
                        self.vector = if data & 0xC7 == 0xC7 { u16::from(data & 0x38) } else { 0x0038 };
                        DispatchKind::Restart
                    }
                }
            }
        };
        trace!("entering {dispatch:?} from PC {:04X}", self.regs.pc);
        self.set_iff1(false);
        self.regs.halted = false;
        self.regs.inc_r();
        self.load(ProgramId::Dispatch(dispatch));
        self.retire(bus);
    }

    fn checkpoint(&mut self) {
        if self.interrupts.checkpoint() {
            self.regs.wz = self.vector;
        } else if let ProgramId::Dispatch(kind) = self.program_id {
            trace!("{kind:?} entry cancelled, resuming at {:04X}", self.regs.pc);
            let cursor = self.cursor;
            self.load(ProgramId::Cancelled(kind));
            self.cursor = cursor;
        }
    }

    fn get8(&self, r: Reg8) -> u8 {
        let regs = &self.regs;
        match r {
            Reg8::A => regs.a,
            Reg8::F => regs.f,
            Reg8::B => regs.b,
            Reg8::C => regs.c,
            Reg8::D => regs.d,
            Reg8::E => regs.e,
            Reg8::H => regs.h,
            Reg8::L => regs.l,
            Reg8::Ixh => (regs.ix >> 8) as u8,
            Reg8::Ixl => regs.ix as u8,
            Reg8::Iyh => (regs.iy >> 8) as u8,
            Reg8::Iyl => regs.iy as u8,
            Reg8::I => regs.i,
            Reg8::R => regs.r,
            Reg8::W => (regs.wz >> 8) as u8,
            Reg8::Z => regs.wz as u8,
            Reg8::Tl => self.temp as u8,
            Reg8::Th => (self.temp >> 8) as u8,
            Reg8::PcHi => (regs.pc >> 8) as u8,
            Reg8::PcLo => regs.pc as u8,
            Reg8::SpHi => (regs.sp >> 8) as u8,
            Reg8::SpLo => regs.sp as u8,
        }
    }

    fn set8(&mut self, r: Reg8, value: u8) {
        fn high(pair: &mut u16, value: u8) {
            *pair = (*pair & 0x00FF) | u16::from(value) << 8;
        }
        fn low(pair: &mut u16, value: u8) {
            *pair = (*pair & 0xFF00) | u16::from(value);
        }
        let regs = &mut self.regs;
        match r {
            Reg8::A => regs.a = value,
            Reg8::F => regs.f = value,
            Reg8::B => regs.b = value,
            Reg8::C => regs.c = value,
            Reg8::D => regs.d = value,
            Reg8::E => regs.e = value,
            Reg8::H => regs.h = value,
            Reg8::L => regs.l = value,
            Reg8::Ixh => high(&mut regs.ix, value),
            Reg8::Ixl => low(&mut regs.ix, value),
            Reg8::Iyh => high(&mut regs.iy, value),
            Reg8::Iyl => low(&mut regs.iy, value),
            Reg8::I => regs.i = value,
            Reg8::R => regs.r = value,
            Reg8::W => high(&mut regs.wz, value),
            Reg8::Z => low(&mut regs.wz, value),
            Reg8::Tl => low(&mut self.temp, value),
            Reg8::Th => high(&mut self.temp, value),
            Reg8::PcHi => high(&mut regs.pc, value),
            Reg8::PcLo => low(&mut regs.pc, value),
            Reg8::SpHi => high(&mut regs.sp, value),
            Reg8::SpLo => low(&mut regs.sp, value),
        }
    }

    fn get16(&self, r: Reg16) -> u16 {
        match r {
            Reg16::Af => self.regs.af(),
            Reg16::Bc => self.regs.bc(),
            Reg16::De => self.regs.de(),
            Reg16::Hl => self.regs.hl(),
            Reg16::Ix => self.regs.ix,
            Reg16::Iy => self.regs.iy,
            Reg16::Sp => self.regs.sp,
            Reg16::Pc => self.regs.pc,
            Reg16::Wz => self.regs.wz,
            Reg16::T => self.temp,
        }
    }

    fn set16(&mut self, r: Reg16, value: u16) {
        match r {
            Reg16::Af => self.regs.set_af(value),
            Reg16::Bc => self.regs.set_bc(value),
            Reg16::De => self.regs.set_de(value),
            Reg16::Hl => self.regs.set_hl(value),
            Reg16::Ix => self.regs.ix = value,
            Reg16::Iy => self.regs.iy = value,
            Reg16::Sp => self.regs.sp = value,
            Reg16::Pc => self.regs.pc = value,
            Reg16::Wz => self.regs.wz = value,
            Reg16::T => self.temp = value,
        }
    }

    /// Resolve a memory operand, applying any post-increment.
    fn address(&mut self, addr: Addr) -> u16 {
        let (pair, advance) = match addr {
            Addr::Pc => (Reg16::Pc, true),
            Addr::Sp => (Reg16::Sp, true),
            Addr::At(pair) => (pair, false),
            Addr::AtInc(pair) => (pair, true),
        };
        let value = self.get16(pair);
        if advance {
            self.set16(pair, value.wrapping_add(1));
        }
        value
    }

    fn port(&self, port: Port) -> u16 {
        match port {
            Port::Bc => self.regs.bc(),
            Port::AccImm => u16::from(self.regs.a) << 8 | (self.temp & 0x00FF),
        }
    }

    fn condition(&self, cond: Cond) -> bool {
        let f = self.regs.f;
        match cond {
            Cond::Nz => f & ZF == 0,
            Cond::Z => f & ZF != 0,
            Cond::Nc => f & CF == 0,
            Cond::C => f & CF != 0,
            Cond::Po => f & PF == 0,
            Cond::Pe => f & PF != 0,
            Cond::P => f & SF == 0,
            Cond::M => f & SF != 0,
            Cond::BNonZero => self.regs.b != 0,
            Cond::BcNonZero => self.regs.bc() != 0,
            Cond::BlockCompare => self.regs.bc() != 0 && f & ZF == 0,
        }
    }

    fn execute<B: IoBus>(&mut self, op: MicroOp, bus: &mut B) {
        match op {
            MicroOp::Idle => {}
            MicroOp::Read(addr, dst) => {
                let address = self.address(addr);
                let value = bus.read(address);
                self.set8(dst, value);
            }
            MicroOp::Write(addr, src) => {
                let address = self.address(addr);
                bus.write(address, self.get8(src));
            }
            MicroOp::In(port, dst) => {
                let address = self.port(port);
                let value = bus.read_io(address);
                self.set8(dst, value);
                self.regs.wz = address.wrapping_add(1);
            }
            MicroOp::InFlags(r) => self.regs.f = (self.regs.f & CF) | sz53p(self.get8(r)),
            MicroOp::Out(port, src) => {
                let address = self.port(port);
                bus.write_io(address, self.get8(src));
                self.regs.wz = match port {
                    Port::Bc => address.wrapping_add(1),
                    Port::AccImm => (address & 0xFF00) | (address.wrapping_add(1) & 0x00FF),
                };
            }
            MicroOp::OutZero => {
                let value = match self.variant {
                    Z80Variant::Nmos => 0x00,
                    Z80Variant::Cmos => 0xFF,
                };
                let address = self.regs.bc();
                bus.write_io(address, value);
                self.regs.wz = address.wrapping_add(1);
            }
            MicroOp::Ld8(dst, src) => self.set8(dst, self.get8(src)),
            MicroOp::Ld16(dst, src) => self.set16(dst, self.get16(src)),
            MicroOp::Inc16(r) => self.set16(r, self.get16(r).wrapping_add(1)),
            MicroOp::Dec16(r) => self.set16(r, self.get16(r).wrapping_sub(1)),
            MicroOp::Alu(alu_op, src) => {
                let result = alu::alu8(alu_op, self.regs.a, self.get8(src), self.regs.f);
                self.regs.a = result.value;
                self.regs.f = result.flags;
            }
            MicroOp::Inc8(r) => {
                let result = alu::inc8(self.get8(r), self.regs.f);
                self.set8(r, result.value);
                self.regs.f = result.flags;
            }
            MicroOp::Dec8(r) => {
                let result = alu::dec8(self.get8(r), self.regs.f);
                self.set8(r, result.value);
                self.regs.f = result.flags;
            }
            MicroOp::Shift(shift, r) => {
                let result = alu::shift(shift, self.get8(r), self.regs.f);
                self.set8(r, result.value);
                self.regs.f = result.flags;
            }
            MicroOp::Bit(n, r) => {
                let value = self.get8(r);
                self.regs.f = alu::bit(n, value, value, self.regs.f);
            }
            MicroOp::BitMem(n) => {
                self.regs.f = alu::bit(n, self.temp as u8, (self.regs.wz >> 8) as u8, self.regs.f);
            }
            MicroOp::Res(n, r) => self.set8(r, self.get8(r) & !(1 << n)),
            MicroOp::Set(n, r) => self.set8(r, self.get8(r) | (1 << n)),
            MicroOp::Acc(acc_op) => {
                let result = alu::acc(acc_op, self.regs.a, self.regs.f);
                self.regs.a = result.value;
                self.regs.f = result.flags;
            }
            MicroOp::Add16(dst, src) => {
                let a = self.get16(dst);
                let (value, flags) = alu::add16(a, self.get16(src), self.regs.f);
                self.set16(dst, value);
                self.regs.f = flags;
                self.regs.wz = a.wrapping_add(1);
            }
            MicroOp::Adc16(src) | MicroOp::Sbc16(src) => {
                let hl = self.regs.hl();
                let operand = self.get16(src);
                let (value, flags) = if matches!(op, MicroOp::Adc16(_)) {
                    alu::adc16(hl, operand, self.regs.f)
                } else {
                    alu::sbc16(hl, operand, self.regs.f)
                };
                self.regs.set_hl(value);
                self.regs.f = flags;
                self.regs.wz = hl.wrapping_add(1);
            }
            MicroOp::Exchange(Exchange::AfAf) => self.regs.swap_af(),
            MicroOp::Exchange(Exchange::DeHl) => self.regs.swap_de_hl(),
            MicroOp::Exchange(Exchange::Exx) => self.regs.exx(),
            MicroOp::Di => {
                self.regs.iff2 = false;
                self.set_iff1(false);
            }
            MicroOp::Ei => {
                self.regs.iff2 = true;
                self.set_iff1(true);
                self.ei_shadow = true;
            }
            MicroOp::Im(mode) => self.regs.im = mode,
            MicroOp::Halt => self.regs.halted = true,
            MicroOp::Retn => self.set_iff1(self.regs.iff2),
            MicroOp::LdAir(src) => {
                let value = self.get8(src);
                self.regs.a = value;
                self.regs.f = (self.regs.f & CF) | sz53(value) | flag_if(self.regs.iff2, PF);
                self.air_race = true;
            }
            MicroOp::Rld | MicroOp::Rrd => {
                let memory = self.temp as u8;
                let a = self.regs.a;
                let (memory, a) = if op == MicroOp::Rld {
                    ((memory << 4) | (a & 0x0F), (a & 0xF0) | (memory >> 4))
                } else {
                    ((a << 4) | (memory >> 4), (a & 0xF0) | (memory & 0x0F))
                };
                self.set8(Reg8::Tl, memory);
                self.regs.a = a;
                self.regs.f = (self.regs.f & CF) | sz53p(a);
                self.regs.wz = self.regs.hl().wrapping_add(1);
            }
            MicroOp::Block(block) => self.block(block),
            MicroOp::DecB => self.regs.b = self.regs.b.wrapping_sub(1),
            MicroOp::IndexAddr(base) => {
                let displacement = i16::from(self.temp as u8 as i8);
                self.regs.wz = self.get16(base).wrapping_add_signed(displacement);
            }
            MicroOp::JumpRel => {
                let displacement = i16::from(self.temp as u8 as i8);
                self.regs.pc = self.regs.pc.wrapping_add_signed(displacement);
                self.regs.wz = self.regs.pc;
            }
            MicroOp::JumpIf(cond) => {
                if self.condition(cond) {
                    self.regs.pc = self.regs.wz;
                }
            }
            MicroOp::Jump(target) => {
                self.regs.pc = target;
                self.regs.wz = target;
            }
            MicroOp::EndUnless(cond) => {
                if !self.condition(cond) {
                    self.cursor = self.program.len() as u8;
                }
            }
            MicroOp::RepeatBlock => {
                self.regs.pc = self.regs.pc.wrapping_sub(2);
                self.regs.wz = self.regs.pc.wrapping_add(1);
            }
            MicroOp::FetchIndexed => {
                self.opcode = bus.read(self.regs.pc);
                self.regs.pc = self.regs.pc.wrapping_add(1);
            }
            MicroOp::Decode(table) => self.load(ProgramId::Op(table, self.opcode)),
            MicroOp::Checkpoint => self.checkpoint(),
            MicroOp::Prefix(table) => self.table = table,
        }
    }

    /// Pointer and counter updates plus flags for block instructions. The
    /// byte moved is in `Tl`.
    fn block(&mut self, op: BlockOp) {
        let step: u16 = if op.is_decrement() { 0xFFFF } else { 1 };
        let value = self.temp as u8;
        self.regs.set_hl(self.regs.hl().wrapping_add(step));
        match op {
            BlockOp::Ldi | BlockOp::Ldd => {
                self.regs.set_de(self.regs.de().wrapping_add(step));
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);
                self.regs.f = alu::ldi_flags(self.regs.f, self.regs.a, value, bc);
            }
            BlockOp::Cpi | BlockOp::Cpd => {
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);
                self.regs.wz = self.regs.wz.wrapping_add(step);
                self.regs.f = alu::cpi_flags(self.regs.f, self.regs.a, value, bc);
            }
            BlockOp::Ini | BlockOp::Ind => {
                let c = self.regs.c.wrapping_add(step as u8);
                self.regs.b = self.regs.b.wrapping_sub(1);
                let k = u16::from(value) + u16::from(c);
                self.regs.f = alu::io_block_flags(self.regs.b, value, k);
            }
            BlockOp::Outi | BlockOp::Outd => {
                let k = u16::from(value) + u16::from(self.regs.l);
                self.regs.f = alu::io_block_flags(self.regs.b, value, k);
            }
        }
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu for Z80 {
    type Registers = Registers;

    fn tick<B: IoBus>(&mut self, bus: &mut B) {
        self.ticks += Ticks::new(1);
        if self.at_boundary() {
            self.boundary(bus);
        } else {
            self.retire(bus);
        }
    }

    fn pc(&self) -> u16 {
        self.regs.pc
    }

    fn registers(&self) -> Registers {
        self.regs
    }

    fn is_halted(&self) -> bool {
        self.regs.halted
    }

    /// Power-on reset: PC, I, R, IM and the interrupt flip-flops clear; AF and
    /// SP read all ones. The elapsed tick count is kept.
    fn reset(&mut self) {
        self.regs = Registers::power_on();
        self.interrupts.reset();
        self.program_id = ProgramId::Empty;
        self.program = &[];
        self.cursor = 0;
        self.table = Table::Main;
        self.opcode = 0;
        self.temp = 0;
        self.vector = 0;
        self.ei_shadow = false;
        self.air_race = false;
        self.reset_pending = false;
    }
}

const Z80_QUERY_PATHS: &[&str] = &[
    // Main registers
    "a", "f", "b", "c", "d", "e", "h", "l",
    "af", "bc", "de", "hl",
    // Alternate registers
    "af'", "bc'", "de'", "hl'",
    // Index and special registers
    "ix", "iy", "ixh", "ixl", "iyh", "iyl",
    "sp", "pc", "i", "r", "wz",
    // Flags
    "flags.s", "flags.z", "flags.y", "flags.h",
    "flags.x", "flags.p", "flags.n", "flags.c",
    // Interrupt state
    "iff1", "iff2", "im", "ei_shadow", "interrupts.state",
    // Sequencer state
    "halted", "ticks", "opcode", "program", "cursor", "table",
];

impl Observable for Z80 {
    fn query(&self, path: &str) -> Option<Value> {
        let regs = &self.regs;
        let flag = |bit: u8| Some(Value::Bool(regs.f & bit != 0));
        match path {
            "a" => Some(regs.a.into()),
            "f" => Some(regs.f.into()),
            "b" => Some(regs.b.into()),
            "c" => Some(regs.c.into()),
            "d" => Some(regs.d.into()),
            "e" => Some(regs.e.into()),
            "h" => Some(regs.h.into()),
            "l" => Some(regs.l.into()),
            "af" => Some(regs.af().into()),
            "bc" => Some(regs.bc().into()),
            "de" => Some(regs.de().into()),
            "hl" => Some(regs.hl().into()),
            "af'" => Some(regs.af_alt().into()),
            "bc'" => Some(regs.bc_alt().into()),
            "de'" => Some(regs.de_alt().into()),
            "hl'" => Some(regs.hl_alt().into()),
            "ix" => Some(regs.ix.into()),
            "iy" => Some(regs.iy.into()),
            "ixh" => Some(self.get8(Reg8::Ixh).into()),
            "ixl" => Some(self.get8(Reg8::Ixl).into()),
            "iyh" => Some(self.get8(Reg8::Iyh).into()),
            "iyl" => Some(self.get8(Reg8::Iyl).into()),
            "sp" => Some(regs.sp.into()),
            "pc" => Some(regs.pc.into()),
            "i" => Some(regs.i.into()),
            "r" => Some(regs.r.into()),
            "wz" => Some(regs.wz.into()),
            "flags.s" => flag(SF),
            "flags.z" => flag(ZF),
            "flags.y" => flag(YF),
            "flags.h" => flag(HF),
            "flags.x" => flag(XF),
            "flags.p" => flag(PF),
            "flags.n" => flag(NF),
            "flags.c" => flag(CF),
            "iff1" => Some(regs.iff1.into()),
            "iff2" => Some(regs.iff2.into()),
            "im" => Some(regs.im.into()),
            "ei_shadow" => Some(self.ei_shadow.into()),
            "interrupts.state" => Some(format!("{:?}", self.interrupts.state()).into()),
            "halted" => Some(regs.halted.into()),
            "ticks" => Some(self.ticks.get().into()),
            "opcode" => Some(self.opcode.into()),
            "program" => Some(self.program_id.to_string().into()),
            "cursor" => Some(self.cursor.into()),
            "table" => Some(self.table.name().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        Z80_QUERY_PATHS
    }
}

impl SaveState for Z80 {
    fn save_state(&self, out: &mut SectionWriter) {
        let regs = &self.regs;
        out.str("variant", self.variant.name());
        out.u16("af", regs.af());
        out.u16("bc", regs.bc());
        out.u16("de", regs.de());
        out.u16("hl", regs.hl());
        out.u16("af_alt", regs.af_alt());
        out.u16("bc_alt", regs.bc_alt());
        out.u16("de_alt", regs.de_alt());
        out.u16("hl_alt", regs.hl_alt());
        out.u16("ix", regs.ix);
        out.u16("iy", regs.iy);
        out.u16("sp", regs.sp);
        out.u16("pc", regs.pc);
        out.u8("i", regs.i);
        out.u8("r", regs.r);
        out.u16("wz", regs.wz);
        out.bool("iff1", regs.iff1);
        out.bool("iff2", regs.iff2);
        out.u8("im", regs.im);
        out.bool("halted", regs.halted);

        let (kind, which, opcode) = self.program_id.to_parts();
        out.u8("program_kind", kind);
        out.u8("program_table", which);
        out.u8("program_opcode", opcode);
        out.u8("cursor", self.cursor);
        out.u8("table", self.table.index() as u8);
        out.u8("opcode", self.opcode);
        out.u16("temp", self.temp);
        out.u16("vector", self.vector);
        out.bool("ei_shadow", self.ei_shadow);
        out.bool("air_race", self.air_race);
        out.bool("reset_pending", self.reset_pending);
        out.u64("ticks", self.ticks.get());
    }

    fn load_state(&mut self, input: &mut SectionReader<'_>) -> Result<(), SnapshotError> {
        if input.str("variant")? != self.variant.name() {
            return Err(input.invalid("variant"));
        }
        let mut regs = Registers::default();
        regs.set_af(input.u16("af")?);
        regs.set_bc(input.u16("bc")?);
        regs.set_de(input.u16("de")?);
        regs.set_hl(input.u16("hl")?);
        let mut alt = Registers::default();
        alt.set_af(input.u16("af_alt")?);
        alt.set_bc(input.u16("bc_alt")?);
        alt.set_de(input.u16("de_alt")?);
        alt.set_hl(input.u16("hl_alt")?);
        regs.a_alt = alt.a;
        regs.f_alt = alt.f;
        regs.b_alt = alt.b;
        regs.c_alt = alt.c;
        regs.d_alt = alt.d;
        regs.e_alt = alt.e;
        regs.h_alt = alt.h;
        regs.l_alt = alt.l;
        regs.ix = input.u16("ix")?;
        regs.iy = input.u16("iy")?;
        regs.sp = input.u16("sp")?;
        regs.pc = input.u16("pc")?;
        regs.i = input.u8("i")?;
        regs.r = input.u8("r")?;
        regs.wz = input.u16("wz")?;
        regs.iff1 = input.bool("iff1")?;
        regs.iff2 = input.bool("iff2")?;
        regs.im = input.u8("im")?;
        if regs.im > 2 {
            return Err(input.invalid("im"));
        }
        regs.halted = input.bool("halted")?;

        let kind = input.u8("program_kind")?;
        let which = input.u8("program_table")?;
        let opcode = input.u8("program_opcode")?;
        let program_id = ProgramId::from_parts(kind, which, opcode).ok_or_else(|| input.invalid("program_kind"))?;
        let cursor = input.u8("cursor")?;
        if usize::from(cursor) > program(program_id).len() {
            return Err(input.invalid("cursor"));
        }
        let table = Table::from_index(input.u8("table")?).ok_or_else(|| input.invalid("table"))?;
        let latch_opcode = input.u8("opcode")?;
        let temp = input.u16("temp")?;
        let vector = input.u16("vector")?;
        let ei_shadow = input.bool("ei_shadow")?;
        let air_race = input.bool("air_race")?;
        let reset_pending = input.bool("reset_pending")?;
        let ticks = input.u64("ticks")?;

        self.regs = regs;
        self.load(program_id);
        self.cursor = cursor;
        self.table = table;
        self.opcode = latch_opcode;
        self.temp = temp;
        self.vector = vector;
        self.ei_shadow = ei_shadow;
        self.air_race = air_race;
        self.reset_pending = reset_pending;
        self.ticks = Ticks::new(ticks);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::SimpleBus;

    fn run(cpu: &mut Z80, bus: &mut SimpleBus, ticks: u64) {
        for _ in 0..ticks {
            cpu.tick(bus);
        }
    }

    #[test]
    fn nop_is_four_ticks() {
        let mut bus = SimpleBus::new();
        let mut cpu = Z80::new();
        run(&mut cpu, &mut bus, 4);
        assert!(cpu.at_boundary());
        assert_eq!(cpu.pc(), 1);
        assert_eq!(cpu.regs().r, 1);
    }

    #[test]
    fn reset_request_waits_for_boundary() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0x3E, 0x42]); // LD A,0x42
        let mut cpu = Z80::new();
        run(&mut cpu, &mut bus, 2);
        cpu.request_reset();
        run(&mut cpu, &mut bus, 5);
        assert_eq!(cpu.regs().a, 0x42);
        assert_eq!(cpu.pc(), 2);
        assert!(cpu.is_reset_pending());

        cpu.tick(&mut bus);
        assert_eq!(cpu.pc(), 0);
        assert_eq!(cpu.regs().a, 0xFF);
        assert!(!cpu.is_reset_pending());
    }

    #[test]
    fn halt_refetches_without_advancing() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0x76]);
        let mut cpu = Z80::new();
        run(&mut cpu, &mut bus, 4);
        assert!(cpu.is_halted());
        run(&mut cpu, &mut bus, 40);
        assert_eq!(cpu.pc(), 1);
        assert_eq!(cpu.regs().r, 11);
    }

    #[test]
    fn cmos_out_c_zero_drives_ff() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0xED, 0x71]);
        let mut cpu = Z80::with_variant(Z80Variant::Cmos);
        run(&mut cpu, &mut bus, 12);
        assert_eq!(bus.io_writes, vec![(0x0000, 0xFF)]);
    }
}
