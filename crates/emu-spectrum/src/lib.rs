//! Cycle-stepped ZX Spectrum engine.
//!
//! The machine advances one CPU T-state per step. Memory goes through a
//! banked paging unit with ULA contention, ports through a priority
//! dispatcher with a floating bus, and an optional cartridge board can
//! overlay the ROM window. A whole machine saves to, and restores from, a
//! deterministic snapshot at any step, mid-instruction included.
//!
//! Supported models: 16K, 48K, 128K, +2 and +3.

mod autofire;
mod board;
mod bus;
mod config;
mod error;
mod input;
mod keyboard;
mod memory;
mod peripherals;
mod ports;
pub mod snapshot;
mod spectrum;

pub use autofire::{AnalogPattern, AutofireController, AutofirePattern, Pattern};
pub use board::{Board, XorBoard, build as build_board};
pub use bus::{Devices, ScreenWrite, SpectrumBus, Transaction};
pub use config::{BoardConfig, BoardKind, MachineConfig, SpectrumModel};
pub use error::{ConfigError, MachineError};
pub use input::ControllerState;
pub use keyboard::{KEY_NAMES, KeyboardMatrix, key_position};
pub use memory::{BANK_SIZE, PagingPorts, PagingUnit, Selector, Topology};
pub use peripherals::{AyRegisters, Beeper, Kempston, Peripheral, PortObserver, UlaPort, kempston};
pub use ports::{DeviceId, PortDevices, PortDispatcher};
pub use spectrum::{AudioObserver, ScreenObserver, Spectrum};
