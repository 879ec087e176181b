//! Micro-operation definitions for cycle-stepped Z80 execution.
//!
//! Each instruction is a fixed program of micro-ops. Every micro-op retires
//! in exactly one T-state; bus transactions happen only when the micro-op
//! that names them retires. Multi-T-state machine cycles are spelled out as
//! an access followed by `Idle` padding.

use std::fmt;

/// 8-bit operand locations, including the internal latches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg8 {
    A,
    F,
    B,
    C,
    D,
    E,
    H,
    L,
    Ixh,
    Ixl,
    Iyh,
    Iyl,
    I,
    R,
    /// High byte of MEMPTR.
    W,
    /// Low byte of MEMPTR.
    Z,
    /// Temporary latch, low byte. Holds displacements and memory operands.
    Tl,
    /// Temporary latch, high byte.
    Th,
    PcHi,
    PcLo,
    SpHi,
    SpLo,
}

/// 16-bit operand locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg16 {
    Af,
    Bc,
    De,
    Hl,
    Ix,
    Iy,
    Sp,
    Pc,
    Wz,
    /// The temporary latch pair `Th:Tl`.
    T,
}

/// Memory addressing for read and write micro-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addr {
    /// Operand fetch at PC, post-increment.
    Pc,
    /// Stack pop at SP, post-increment.
    Sp,
    /// Address held in a register pair.
    At(Reg16),
    /// Address held in a register pair, which is incremented afterwards.
    AtInc(Reg16),
}

/// Port addressing for I/O micro-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    /// Port in BC.
    Bc,
    /// `A` on the high byte, the immediate in `Tl` on the low byte.
    AccImm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Nz,
    Z,
    Nc,
    C,
    Po,
    Pe,
    P,
    M,
    /// `DJNZ`, and the `INIR`/`OTIR` family: B is non-zero.
    BNonZero,
    /// `LDIR`/`LDDR`: BC is non-zero.
    BcNonZero,
    /// `CPIR`/`CPDR`: BC is non-zero and the last compare missed.
    BlockCompare,
}

impl Cond {
    /// The eight flag conditions in opcode order.
    pub const FLAGS: [Cond; 8] = [
        Cond::Nz,
        Cond::Z,
        Cond::Nc,
        Cond::C,
        Cond::Po,
        Cond::Pe,
        Cond::P,
        Cond::M,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

impl AluOp {
    pub const ALL: [AluOp; 8] = [
        AluOp::Add,
        AluOp::Adc,
        AluOp::Sub,
        AluOp::Sbc,
        AluOp::And,
        AluOp::Xor,
        AluOp::Or,
        AluOp::Cp,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    /// Undocumented: shift left, set bit 0.
    Sll,
    Srl,
}

impl ShiftOp {
    pub const ALL: [ShiftOp; 8] = [
        ShiftOp::Rlc,
        ShiftOp::Rrc,
        ShiftOp::Rl,
        ShiftOp::Rr,
        ShiftOp::Sla,
        ShiftOp::Sra,
        ShiftOp::Sll,
        ShiftOp::Srl,
    ];
}

/// Single-byte operations on the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccOp {
    Rlca,
    Rrca,
    Rla,
    Rra,
    Daa,
    Cpl,
    Scf,
    Ccf,
    Neg,
}

impl AccOp {
    /// `x=0, z=7` row of the main table.
    pub const ROW: [AccOp; 8] = [
        AccOp::Rlca,
        AccOp::Rrca,
        AccOp::Rla,
        AccOp::Rra,
        AccOp::Daa,
        AccOp::Cpl,
        AccOp::Scf,
        AccOp::Ccf,
    ];
}

/// Bookkeeping half of a block instruction. The transfer itself is done by
/// ordinary read/write/I/O micro-ops earlier in the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOp {
    Ldi,
    Ldd,
    Cpi,
    Cpd,
    Ini,
    Ind,
    Outi,
    Outd,
}

impl BlockOp {
    /// True for the decrementing forms.
    #[must_use]
    pub const fn is_decrement(self) -> bool {
        matches!(self, BlockOp::Ldd | BlockOp::Cpd | BlockOp::Ind | BlockOp::Outd)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    AfAf,
    DeHl,
    Exx,
}

/// Opcode tables, one per prefix combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Main,
    Cb,
    Ed,
    Dd,
    Fd,
    DdCb,
    FdCb,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Main,
        Table::Cb,
        Table::Ed,
        Table::Dd,
        Table::Fd,
        Table::DdCb,
        Table::FdCb,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Table::Main => "main",
            Table::Cb => "cb",
            Table::Ed => "ed",
            Table::Dd => "dd",
            Table::Fd => "fd",
            Table::DdCb => "ddcb",
            Table::FdCb => "fdcb",
        }
    }
}

/// Interrupt entry sequences, chosen by interrupt kind and mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    /// Non-maskable: 11 T-states to 0x0066.
    Nmi,
    /// IM 0 / IM 1 restart: 13 T-states.
    Restart,
    /// IM 2 vector table: 19 T-states.
    Vectored,
}

impl DispatchKind {
    pub const ALL: [DispatchKind; 3] = [DispatchKind::Nmi, DispatchKind::Restart, DispatchKind::Vectored];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }
}

/// Identity of the program the sequencer is running. Programs are static,
/// so this is all a snapshot needs to find one again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramId {
    /// Nothing in flight; the next tick is an opcode boundary.
    Empty,
    Op(Table, u8),
    Dispatch(DispatchKind),
    /// Entry sequence whose request was withdrawn at the checkpoint.
    Cancelled(DispatchKind),
}

impl ProgramId {
    #[must_use]
    pub const fn is_dispatch(self) -> bool {
        matches!(self, ProgramId::Dispatch(_) | ProgramId::Cancelled(_))
    }

    /// Flatten to `(kind, table or dispatch kind, opcode)` for snapshots.
    #[must_use]
    pub const fn to_parts(self) -> (u8, u8, u8) {
        match self {
            ProgramId::Empty => (0, 0, 0),
            ProgramId::Op(table, opcode) => (1, table as u8, opcode),
            ProgramId::Dispatch(kind) => (2, kind as u8, 0),
            ProgramId::Cancelled(kind) => (3, kind as u8, 0),
        }
    }

    #[must_use]
    pub fn from_parts(kind: u8, which: u8, opcode: u8) -> Option<Self> {
        match kind {
            0 => Some(ProgramId::Empty),
            1 => Table::from_index(which).map(|t| ProgramId::Op(t, opcode)),
            2 => DispatchKind::from_index(which).map(ProgramId::Dispatch),
            3 => DispatchKind::from_index(which).map(ProgramId::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramId::Empty => f.write_str("boundary"),
            ProgramId::Op(table, opcode) => write!(f, "{}:{opcode:02X}", table.name()),
            ProgramId::Dispatch(kind) => write!(f, "dispatch:{kind:?}"),
            ProgramId::Cancelled(kind) => write!(f, "cancelled:{kind:?}"),
        }
    }
}

/// A single T-state of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroOp {
    /// Internal cycle or bus padding.
    Idle,
    Read(Addr, Reg8),
    Write(Addr, Reg8),
    In(Port, Reg8),
    /// Set S/Z/P from a byte just read with `IN r,(C)`.
    InFlags(Reg8),
    Out(Port, Reg8),
    /// Undocumented `OUT (C),0`: drives 0 on NMOS parts and 0xFF on CMOS.
    OutZero,
    Ld8(Reg8, Reg8),
    Ld16(Reg16, Reg16),
    Inc16(Reg16),
    Dec16(Reg16),
    Alu(AluOp, Reg8),
    Inc8(Reg8),
    Dec8(Reg8),
    Shift(ShiftOp, Reg8),
    Bit(u8, Reg8),
    /// `BIT n,(HL)` on the byte in `Tl`, X/Y from MEMPTR.
    BitMem(u8),
    Res(u8, Reg8),
    Set(u8, Reg8),
    Acc(AccOp),
    Add16(Reg16, Reg16),
    Adc16(Reg16),
    Sbc16(Reg16),
    Exchange(Exchange),
    Di,
    Ei,
    Im(u8),
    Halt,
    /// `IFF1 = IFF2` on return from an interrupt handler.
    Retn,
    /// `LD A,I` / `LD A,R`.
    LdAir(Reg8),
    Rld,
    Rrd,
    Block(BlockOp),
    DecB,
    /// `WZ = rr + (Tl as i8)`.
    IndexAddr(Reg16),
    /// `PC += Tl as i8`.
    JumpRel,
    /// `PC = WZ` if the condition holds.
    JumpIf(Cond),
    /// `PC = WZ = target` (restarts).
    Jump(u16),
    /// End the program here unless the condition holds.
    EndUnless(Cond),
    /// Rewind PC onto a repeating block instruction.
    RepeatBlock,
    /// Non-M1 opcode read for `DDCB d op` / `FDCB d op`.
    FetchIndexed,
    /// Replace the running program with `table[opcode]`.
    Decode(Table),
    /// Interrupt cancellation checkpoint.
    Checkpoint,
    /// Select the table for the next opcode fetch.
    Prefix(Table),
}
