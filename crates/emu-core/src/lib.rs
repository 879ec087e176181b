//! Core traits and types for cycle-stepped emulation.
//!
//! Every machine advances one clock tick at a time. Components talk to each
//! other through the bus traits here, and every stateful component exposes
//! an ordered save/restore routine through [`SaveState`].

mod bus;
mod cpu;
mod observable;
pub mod snapshot;
mod timing;

pub use bus::{Bus, IoBus, SimpleBus};
pub use cpu::Cpu;
pub use observable::{Observable, Value};
pub use snapshot::{SaveState, SectionReader, SectionWriter, SnapshotError, StateReader, StateWriter};
pub use timing::{Tickable, Ticks};
