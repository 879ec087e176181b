//! CPU core trait.

use crate::IoBus;

/// A CPU core.
///
/// CPUs take the bus by reference on every tick instead of owning it, so the
/// machine that owns the bus can share it with video and I/O devices.
pub trait Cpu {
    /// The type used for register inspection.
    type Registers;

    /// Advance the CPU by exactly one clock tick.
    ///
    /// Any timing penalty for a bus access is the bus's business: the CPU
    /// retires one step per call regardless.
    fn tick<B: IoBus>(&mut self, bus: &mut B);

    /// Returns the current program counter.
    fn pc(&self) -> u16;

    /// Returns a copy of all registers for inspection.
    fn registers(&self) -> Self::Registers;

    /// Returns true while the CPU is in its halted (low-power) state.
    fn is_halted(&self) -> bool;

    /// Power-on reset, applied immediately.
    fn reset(&mut self);
}
