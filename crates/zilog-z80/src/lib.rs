//! Cycle-stepped Z80 CPU.
//!
//! Each call to `tick()` retires exactly one micro-op, one T-state. Opcodes
//! map to fixed micro-op programs built once from declarative tables; the
//! interrupt controller splices its own entry programs in at opcode
//! boundaries.

mod alu;
mod cpu;
mod decode;
mod flags;
pub mod interrupts;
pub mod microcode;
mod registers;

pub use cpu::{Z80, Z80Variant};
pub use decode::program;
pub use flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
pub use interrupts::{ControllerState, InterruptController, InterruptKind, InterruptSource, SourceId, Trigger};
pub use microcode::{DispatchKind, MicroOp, ProgramId, Table};
pub use registers::Registers;
