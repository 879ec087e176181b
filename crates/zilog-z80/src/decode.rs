//! Declarative opcode tables.
//!
//! Every program is built once from the x/y/z/p/q fields of its opcode and
//! cached for the life of the process. The implicit first T-state of every
//! instruction is the M1 fetch performed by the sequencer, so a program for a
//! 4 T-state instruction holds three micro-ops.

use std::sync::LazyLock;

use crate::microcode::{
    AccOp, Addr, AluOp, BlockOp, Cond, DispatchKind, Exchange, MicroOp, Port, ProgramId, Reg8,
    Reg16, ShiftOp, Table,
};

use MicroOp::Idle;

/// Interrupt mode selected by `ED 46/4E/56/5E/66/6E/76/7E`.
const IM_MODES: [u8; 8] = [0, 0, 1, 2, 0, 0, 1, 2];

struct Program {
    ops: Vec<MicroOp>,
}

impl Program {
    fn empty() -> Self {
        Self { ops: Vec::new() }
    }

    /// Remainder of a 4 T-state opcode fetch.
    fn m1() -> Self {
        Self::empty().idle(3)
    }

    fn op(mut self, op: MicroOp) -> Self {
        self.ops.push(op);
        self
    }

    fn idle(mut self, n: usize) -> Self {
        self.ops.extend(std::iter::repeat_n(Idle, n));
        self
    }

    /// Retire `op` on the final T-state of the current machine cycle.
    fn then(mut self, op: MicroOp) -> Self {
        match self.ops.last_mut() {
            Some(last) if *last == Idle => *last = op,
            _ => self.ops.push(op),
        }
        self
    }

    /// 3 T-state memory read.
    fn read(self, addr: Addr, dst: Reg8) -> Self {
        self.op(MicroOp::Read(addr, dst)).idle(2)
    }

    /// 3 T-state memory write.
    fn write(self, addr: Addr, src: Reg8) -> Self {
        self.op(MicroOp::Write(addr, src)).idle(2)
    }

    /// 4 T-state port read.
    fn input(self, port: Port, dst: Reg8) -> Self {
        self.op(MicroOp::In(port, dst)).idle(3)
    }

    /// 4 T-state port write.
    fn output(self, port: Port, src: Reg8) -> Self {
        self.op(MicroOp::Out(port, src)).idle(3)
    }

    /// Push PC: SP has already been decremented once.
    fn push_pc(self) -> Self {
        self.write(Addr::At(Reg16::Sp), Reg8::PcHi)
            .then(MicroOp::Dec16(Reg16::Sp))
            .write(Addr::At(Reg16::Sp), Reg8::PcLo)
    }

    fn build(self) -> Box<[MicroOp]> {
        self.ops.into_boxed_slice()
    }
}

/// Which register plays the part of HL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Index {
    Hl,
    Ix,
    Iy,
}

impl Index {
    fn pair(self) -> Reg16 {
        match self {
            Index::Hl => Reg16::Hl,
            Index::Ix => Reg16::Ix,
            Index::Iy => Reg16::Iy,
        }
    }

    fn high(self) -> Reg8 {
        match self {
            Index::Hl => Reg8::H,
            Index::Ix => Reg8::Ixh,
            Index::Iy => Reg8::Iyh,
        }
    }

    fn low(self) -> Reg8 {
        match self {
            Index::Hl => Reg8::L,
            Index::Ix => Reg8::Ixl,
            Index::Iy => Reg8::Iyl,
        }
    }

    fn cb_table(self) -> Table {
        match self {
            Index::Hl => Table::Cb,
            Index::Ix => Table::DdCb,
            Index::Iy => Table::FdCb,
        }
    }

    /// Append the cycles that form the `(HL)` or `(IX+d)` operand address.
    fn memory(self, program: Program) -> (Program, Addr) {
        match self {
            Index::Hl => (program, Addr::At(Reg16::Hl)),
            _ => (
                program
                    .read(Addr::Pc, Reg8::Tl)
                    .idle(4)
                    .op(MicroOp::IndexAddr(self.pair())),
                Addr::At(Reg16::Wz),
            ),
        }
    }
}

/// Register operand for the 3-bit `r` field. The `(HL)` slot maps to the
/// memory operand latch.
fn reg(r: u8, index: Index) -> Reg8 {
    match r {
        0 => Reg8::B,
        1 => Reg8::C,
        2 => Reg8::D,
        3 => Reg8::E,
        4 => index.high(),
        5 => index.low(),
        6 => Reg8::Tl,
        _ => Reg8::A,
    }
}

/// `rp` table: BC, DE, HL, SP.
fn rp(p: u8, index: Index) -> Reg16 {
    match p {
        0 => Reg16::Bc,
        1 => Reg16::De,
        2 => index.pair(),
        _ => Reg16::Sp,
    }
}

/// `rp2` table: BC, DE, HL, AF.
fn rp2(p: u8, index: Index) -> Reg16 {
    match p {
        3 => Reg16::Af,
        _ => rp(p, index),
    }
}

/// High and low halves of a pair.
fn halves(pair: Reg16) -> (Reg8, Reg8) {
    match pair {
        Reg16::Af => (Reg8::A, Reg8::F),
        Reg16::Bc => (Reg8::B, Reg8::C),
        Reg16::De => (Reg8::D, Reg8::E),
        Reg16::Hl => (Reg8::H, Reg8::L),
        Reg16::Ix => (Reg8::Ixh, Reg8::Ixl),
        Reg16::Iy => (Reg8::Iyh, Reg8::Iyl),
        Reg16::Sp => (Reg8::SpHi, Reg8::SpLo),
        Reg16::Pc => (Reg8::PcHi, Reg8::PcLo),
        Reg16::Wz => (Reg8::W, Reg8::Z),
        Reg16::T => (Reg8::Th, Reg8::Tl),
    }
}

fn fields(op: u8) -> (u8, u8, u8) {
    (op >> 6, (op >> 3) & 7, op & 7)
}

/// Unprefixed opcodes, or DD/FD opcodes when `index` is IX/IY.
fn main_op(op: u8, index: Index) -> Program {
    use MicroOp::{
        Acc, Alu, Dec8, Dec16, DecB, Di, Ei, EndUnless, Halt, Inc8, Inc16, JumpIf, JumpRel, Ld8,
        Ld16, Prefix, Write,
    };

    let (x, y, z) = fields(op);
    let (p, q) = (y >> 1, y & 1);
    let cond = Cond::FLAGS[usize::from(y)];
    let alu = AluOp::ALL[usize::from(y)];
    let hl = index.pair();

    match (x, z) {
        (0, 0) => match y {
            0 => Program::m1(),
            1 => Program::m1().then(MicroOp::Exchange(Exchange::AfAf)),
            2 => Program::m1()
                .op(DecB)
                .read(Addr::Pc, Reg8::Tl)
                .then(EndUnless(Cond::BNonZero))
                .idle(4)
                .op(JumpRel),
            3 => Program::m1().read(Addr::Pc, Reg8::Tl).idle(4).op(JumpRel),
            _ => Program::m1()
                .read(Addr::Pc, Reg8::Tl)
                .then(EndUnless(Cond::FLAGS[usize::from(y - 4)]))
                .idle(4)
                .op(JumpRel),
        },
        (0, 1) if q == 0 => {
            let (hi, lo) = halves(rp(p, index));
            Program::m1().read(Addr::Pc, lo).read(Addr::Pc, hi)
        }
        (0, 1) => Program::m1().idle(6).op(MicroOp::Add16(hl, rp(p, index))),
        (0, 2) => {
            let (hi, lo) = halves(hl);
            let direct = Program::m1().read(Addr::Pc, Reg8::Z).read(Addr::Pc, Reg8::W);
            match y {
                0 => Program::m1().write(Addr::At(Reg16::Bc), Reg8::A),
                1 => Program::m1().read(Addr::At(Reg16::Bc), Reg8::A),
                2 => Program::m1().write(Addr::At(Reg16::De), Reg8::A),
                3 => Program::m1().read(Addr::At(Reg16::De), Reg8::A),
                4 => direct
                    .write(Addr::AtInc(Reg16::Wz), lo)
                    .write(Addr::At(Reg16::Wz), hi),
                5 => direct
                    .read(Addr::AtInc(Reg16::Wz), lo)
                    .read(Addr::At(Reg16::Wz), hi),
                6 => direct
                    .op(Write(Addr::At(Reg16::Wz), Reg8::A))
                    .op(Inc16(Reg16::Wz))
                    .op(Ld8(Reg8::W, Reg8::A)),
                _ => direct.read(Addr::AtInc(Reg16::Wz), Reg8::A),
            }
        }
        (0, 3) => {
            let pair = rp(p, index);
            Program::m1()
                .idle(1)
                .op(if q == 0 { Inc16(pair) } else { Dec16(pair) })
        }
        (0, 4 | 5) => {
            let step = |r| if z == 4 { Inc8(r) } else { Dec8(r) };
            if y == 6 {
                let (program, addr) = index.memory(Program::m1());
                program
                    .read(addr, Reg8::Tl)
                    .op(step(Reg8::Tl))
                    .write(addr, Reg8::Tl)
            } else {
                Program::m1().then(step(reg(y, index)))
            }
        }
        (0, 6) => match (y, index) {
            (6, Index::Hl) => Program::m1()
                .read(Addr::Pc, Reg8::Tl)
                .write(Addr::At(Reg16::Hl), Reg8::Tl),
            (6, _) => Program::m1()
                .read(Addr::Pc, Reg8::Tl)
                .read(Addr::Pc, Reg8::Th)
                .idle(1)
                .op(MicroOp::IndexAddr(hl))
                .write(Addr::At(Reg16::Wz), Reg8::Th),
            _ => Program::m1().read(Addr::Pc, reg(y, index)),
        },
        (0, _) => Program::m1().then(Acc(AccOp::ROW[usize::from(y)])),
        (1, _) if y == 6 && z == 6 => Program::m1().then(Halt),
        (1, 6) => {
            let (program, addr) = index.memory(Program::m1());
            program.read(addr, reg(y, Index::Hl))
        }
        (1, _) if y == 6 => {
            let (program, addr) = index.memory(Program::m1());
            program.write(addr, reg(z, Index::Hl))
        }
        (1, _) => Program::m1().then(Ld8(reg(y, index), reg(z, index))),
        (2, 6) => {
            let (program, addr) = index.memory(Program::m1());
            program.read(addr, Reg8::Tl).then(Alu(alu, Reg8::Tl))
        }
        (2, _) => Program::m1().then(Alu(alu, reg(z, index))),
        (3, 0) => Program::m1()
            .op(EndUnless(cond))
            .read(Addr::Sp, Reg8::Z)
            .read(Addr::Sp, Reg8::W)
            .then(Ld16(Reg16::Pc, Reg16::Wz)),
        (3, 1) if q == 0 => {
            let (hi, lo) = halves(rp2(p, index));
            Program::m1().read(Addr::Sp, lo).read(Addr::Sp, hi)
        }
        (3, 1) => match p {
            0 => Program::m1()
                .read(Addr::Sp, Reg8::Z)
                .read(Addr::Sp, Reg8::W)
                .then(Ld16(Reg16::Pc, Reg16::Wz)),
            1 => Program::m1().then(MicroOp::Exchange(Exchange::Exx)),
            2 => Program::m1().then(Ld16(Reg16::Pc, hl)),
            _ => Program::m1().idle(1).op(Ld16(Reg16::Sp, hl)),
        },
        (3, 2) => Program::m1()
            .read(Addr::Pc, Reg8::Z)
            .read(Addr::Pc, Reg8::W)
            .then(JumpIf(cond)),
        (3, 3) => match y {
            0 => Program::m1()
                .read(Addr::Pc, Reg8::Z)
                .read(Addr::Pc, Reg8::W)
                .then(Ld16(Reg16::Pc, Reg16::Wz)),
            1 => Program::m1().then(Prefix(index.cb_table())),
            2 => Program::m1()
                .read(Addr::Pc, Reg8::Tl)
                .output(Port::AccImm, Reg8::A),
            3 => Program::m1()
                .read(Addr::Pc, Reg8::Tl)
                .input(Port::AccImm, Reg8::A),
            4 => {
                let (hi, lo) = halves(hl);
                Program::m1()
                    .then(Ld16(Reg16::T, Reg16::Sp))
                    .read(Addr::AtInc(Reg16::T), Reg8::Z)
                    .read(Addr::At(Reg16::T), Reg8::W)
                    .idle(1)
                    .write(Addr::At(Reg16::T), hi)
                    .then(Dec16(Reg16::T))
                    .write(Addr::At(Reg16::T), lo)
                    .idle(2)
                    .then(Ld16(hl, Reg16::Wz))
            }
            5 => Program::m1().then(MicroOp::Exchange(Exchange::DeHl)),
            6 => Program::m1().then(Di),
            _ => Program::m1().then(Ei),
        },
        (3, 4) => Program::m1()
            .read(Addr::Pc, Reg8::Z)
            .read(Addr::Pc, Reg8::W)
            .then(EndUnless(cond))
            .op(Dec16(Reg16::Sp))
            .push_pc()
            .then(Ld16(Reg16::Pc, Reg16::Wz)),
        (3, 5) if q == 0 => {
            let (hi, lo) = halves(rp2(p, index));
            Program::m1()
                .op(Dec16(Reg16::Sp))
                .write(Addr::At(Reg16::Sp), hi)
                .then(Dec16(Reg16::Sp))
                .write(Addr::At(Reg16::Sp), lo)
        }
        (3, 5) => match p {
            0 => Program::m1()
                .read(Addr::Pc, Reg8::Z)
                .read(Addr::Pc, Reg8::W)
                .op(Dec16(Reg16::Sp))
                .push_pc()
                .then(Ld16(Reg16::Pc, Reg16::Wz)),
            1 => Program::m1().then(Prefix(Table::Dd)),
            2 => Program::m1().then(Prefix(Table::Ed)),
            _ => Program::m1().then(Prefix(Table::Fd)),
        },
        (3, 6) => Program::m1().read(Addr::Pc, Reg8::Tl).then(Alu(alu, Reg8::Tl)),
        (3, _) => Program::m1()
            .op(Dec16(Reg16::Sp))
            .push_pc()
            .then(MicroOp::Jump(u16::from(y) * 8)),
        _ => unreachable!(), // x is two bits
    }
}

/// `CB xx`
fn cb_op(op: u8) -> Program {
    let (x, y, z) = fields(op);
    let action = |r| match x {
        0 => MicroOp::Shift(ShiftOp::ALL[usize::from(y)], r),
        1 => MicroOp::Bit(y, r),
        2 => MicroOp::Res(y, r),
        _ => MicroOp::Set(y, r),
    };
    let hl = Addr::At(Reg16::Hl);
    match (x, z) {
        (1, 6) => Program::m1().read(hl, Reg8::Tl).idle(1).then(MicroOp::BitMem(y)),
        (_, 6) => Program::m1()
            .read(hl, Reg8::Tl)
            .idle(1)
            .then(action(Reg8::Tl))
            .write(hl, Reg8::Tl),
        _ => Program::m1().then(action(reg(z, Index::Hl))),
    }
}

/// `DD CB`/`FD CB` after the CB fetch: displacement, then the opcode read as
/// data, then a decode into the indexed-CB table.
fn indexed_cb_prefix(index: Index) -> Program {
    Program::m1()
        .read(Addr::Pc, Reg8::Tl)
        .then(MicroOp::IndexAddr(index.pair()))
        .op(MicroOp::FetchIndexed)
        .idle(3)
        .op(MicroOp::Decode(index.cb_table()))
}

/// `DD CB d xx`. Results of the non-BIT forms are also copied to the
/// register named by z, unless z is 6.
fn indexed_cb_op(op: u8) -> Program {
    let (x, y, z) = fields(op);
    let at = Addr::At(Reg16::Wz);
    let action = match x {
        0 => MicroOp::Shift(ShiftOp::ALL[usize::from(y)], Reg8::Tl),
        1 => return Program::empty().read(at, Reg8::Tl).idle(1).then(MicroOp::BitMem(y)),
        2 => MicroOp::Res(y, Reg8::Tl),
        _ => MicroOp::Set(y, Reg8::Tl),
    };
    let program = Program::empty()
        .read(at, Reg8::Tl)
        .idle(1)
        .then(action)
        .write(at, Reg8::Tl);
    if z == 6 {
        program
    } else {
        program.then(MicroOp::Ld8(reg(z, Index::Hl), Reg8::Tl))
    }
}

/// `ED xx`. Undefined opcodes are 8 T-state no-ops.
fn ed_op(op: u8) -> Program {
    use MicroOp::{Block, EndUnless, Ld8, Ld16, RepeatBlock, Write};

    let (x, y, z) = fields(op);
    let (p, q) = (y >> 1, y & 1);
    let hl = Addr::At(Reg16::Hl);

    match (x, z) {
        (1, 0) => {
            let dst = reg(y, Index::Hl);
            Program::m1().input(Port::Bc, dst).then(MicroOp::InFlags(dst))
        }
        (1, 1) if y == 6 => Program::m1().op(MicroOp::OutZero).idle(3),
        (1, 1) => Program::m1().output(Port::Bc, reg(y, Index::Hl)),
        (1, 2) => {
            let pair = rp(p, Index::Hl);
            Program::m1()
                .idle(6)
                .op(if q == 0 { MicroOp::Sbc16(pair) } else { MicroOp::Adc16(pair) })
        }
        (1, 3) => {
            let (hi, lo) = halves(rp(p, Index::Hl));
            let direct = Program::m1().read(Addr::Pc, Reg8::Z).read(Addr::Pc, Reg8::W);
            if q == 0 {
                direct
                    .write(Addr::AtInc(Reg16::Wz), lo)
                    .write(Addr::At(Reg16::Wz), hi)
            } else {
                direct
                    .read(Addr::AtInc(Reg16::Wz), lo)
                    .read(Addr::At(Reg16::Wz), hi)
            }
        }
        (1, 4) => Program::m1().then(MicroOp::Acc(AccOp::Neg)),
        (1, 5) => Program::m1()
            .then(MicroOp::Retn)
            .read(Addr::Sp, Reg8::Z)
            .read(Addr::Sp, Reg8::W)
            .then(Ld16(Reg16::Pc, Reg16::Wz)),
        (1, 6) => Program::m1().then(MicroOp::Im(IM_MODES[usize::from(y)])),
        (1, 7) => match y {
            0 => Program::m1().op(Ld8(Reg8::I, Reg8::A)),
            1 => Program::m1().op(Ld8(Reg8::R, Reg8::A)),
            2 => Program::m1().op(MicroOp::LdAir(Reg8::I)),
            3 => Program::m1().op(MicroOp::LdAir(Reg8::R)),
            4 | 5 => Program::m1()
                .read(hl, Reg8::Tl)
                .idle(3)
                .op(if y == 4 { MicroOp::Rrd } else { MicroOp::Rld })
                .write(hl, Reg8::Tl),
            _ => Program::m1(),
        },
        (2, 0..=3) if y >= 4 => {
            let repeat = y >= 6;
            let down = y & 1 == 1;
            let pick = |up, dec| if down { dec } else { up };
            match z {
                0 => {
                    let op = pick(BlockOp::Ldi, BlockOp::Ldd);
                    let program = Program::m1().read(hl, Reg8::Tl);
                    if repeat {
                        program
                            .op(Write(Addr::At(Reg16::De), Reg8::Tl))
                            .idle(2)
                            .op(Block(op))
                            .op(EndUnless(Cond::BcNonZero))
                            .idle(4)
                            .op(RepeatBlock)
                    } else {
                        program
                            .write(Addr::At(Reg16::De), Reg8::Tl)
                            .idle(1)
                            .op(Block(op))
                    }
                }
                1 => {
                    let op = pick(BlockOp::Cpi, BlockOp::Cpd);
                    let program = Program::m1().read(hl, Reg8::Tl);
                    if repeat {
                        program
                            .idle(3)
                            .op(Block(op))
                            .op(EndUnless(Cond::BlockCompare))
                            .idle(4)
                            .op(RepeatBlock)
                    } else {
                        program.idle(4).op(Block(op))
                    }
                }
                2 => {
                    let op = pick(BlockOp::Ini, BlockOp::Ind);
                    let program = Program::m1()
                        .idle(1)
                        .input(Port::Bc, Reg8::Tl)
                        .op(Write(hl, Reg8::Tl))
                        .op(Block(op));
                    if repeat {
                        program
                            .op(EndUnless(Cond::BNonZero))
                            .idle(4)
                            .op(RepeatBlock)
                    } else {
                        program.idle(1)
                    }
                }
                _ => {
                    let op = pick(BlockOp::Outi, BlockOp::Outd);
                    let program = Program::m1()
                        .op(MicroOp::DecB)
                        .read(hl, Reg8::Tl)
                        .op(MicroOp::Out(Port::Bc, Reg8::Tl));
                    if repeat {
                        program
                            .idle(1)
                            .op(Block(op))
                            .op(EndUnless(Cond::BNonZero))
                            .idle(4)
                            .op(RepeatBlock)
                    } else {
                        program.idle(2).op(Block(op))
                    }
                }
            }
        }
        _ => Program::m1(),
    }
}

/// Interrupt entry. The checkpoint sits between the two stack writes; the
/// cancelled form is the same sequence with the jump and vector read removed.
fn dispatch(kind: DispatchKind, cancelled: bool) -> Program {
    use MicroOp::{Checkpoint, Dec16, Ld16, Write};

    let acknowledge = if kind == DispatchKind::Nmi { 4 } else { 6 };
    let program = Program::empty()
        .idle(acknowledge)
        .op(Dec16(Reg16::Sp))
        .op(Write(Addr::At(Reg16::Sp), Reg8::PcHi))
        .op(Checkpoint)
        .op(Dec16(Reg16::Sp))
        .write(Addr::At(Reg16::Sp), Reg8::PcLo);
    match (kind, cancelled) {
        (_, true) => program,
        (DispatchKind::Vectored, false) => program
            .read(Addr::AtInc(Reg16::Wz), Reg8::Tl)
            .read(Addr::At(Reg16::Wz), Reg8::Th)
            .then(Ld16(Reg16::Pc, Reg16::T)),
        (_, false) => program.then(Ld16(Reg16::Pc, Reg16::Wz)),
    }
}

struct Programs {
    tables: Vec<Vec<Box<[MicroOp]>>>,
    dispatch: Vec<Box<[MicroOp]>>,
    cancelled: Vec<Box<[MicroOp]>>,
}

impl Programs {
    fn build() -> Self {
        let table = |build: &dyn Fn(u8) -> Program| -> Vec<Box<[MicroOp]>> {
            (0..=255u8).map(|op| build(op).build()).collect()
        };
        let indexed = |index: Index| {
            move |op: u8| {
                if op == 0xCB {
                    indexed_cb_prefix(index)
                } else {
                    main_op(op, index)
                }
            }
        };
        let tables = Table::ALL
            .iter()
            .map(|t| match t {
                Table::Main => table(&|op| main_op(op, Index::Hl)),
                Table::Cb => table(&cb_op),
                Table::Ed => table(&ed_op),
                Table::Dd => table(&indexed(Index::Ix)),
                Table::Fd => table(&indexed(Index::Iy)),
                Table::DdCb | Table::FdCb => table(&indexed_cb_op),
            })
            .collect();
        Self {
            tables,
            dispatch: DispatchKind::ALL.iter().map(|&k| dispatch(k, false).build()).collect(),
            cancelled: DispatchKind::ALL.iter().map(|&k| dispatch(k, true).build()).collect(),
        }
    }
}

static PROGRAMS: LazyLock<Programs> = LazyLock::new(Programs::build);

/// The micro-op program for `id`.
#[must_use]
pub fn program(id: ProgramId) -> &'static [MicroOp] {
    let programs: &'static Programs = &PROGRAMS;
    match id {
        ProgramId::Empty => &[],
        ProgramId::Op(table, opcode) => &programs.tables[table.index()][usize::from(opcode)],
        ProgramId::Dispatch(kind) => &programs.dispatch[kind.index()],
        ProgramId::Cancelled(kind) => &programs.cancelled[kind.index()],
    }
}
