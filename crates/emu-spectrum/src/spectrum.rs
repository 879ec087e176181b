//! Top-level Spectrum system.
//!
//! One call to [`Spectrum::step`] is one CPU T-state: the CPU retires one
//! micro-op, the ULA frame clock moves on, and the INT line follows the
//! ULA. Contended accesses inside the step push the frame clock further.
//!
//! # Frame loop
//!
//! [`Spectrum::run_frame`] applies the controller state, then steps until
//! the ULA frame clock wraps. One 48K frame is 69,888 T-states plus
//! whatever the ULA steals. A frame that never reads the keyboard or the
//! joystick is a lag frame.

use std::fmt;

use emu_core::{Cpu, Observable, Tickable, Value};
use log::{debug, info, warn};
use zilog_z80::{Z80, interrupts::INT};

use crate::bus::{ScreenWrite, SpectrumBus};
use crate::config::MachineConfig;
use crate::error::MachineError;
use crate::input::ControllerState;
use crate::snapshot;

/// Receives writes to the displayed screen bank as they happen.
pub trait ScreenObserver {
    fn screen_write(&mut self, write: ScreenWrite);
}

impl<F: FnMut(ScreenWrite)> ScreenObserver for F {
    fn screen_write(&mut self, write: ScreenWrite) {
        self(write);
    }
}

/// Receives beeper level changes, stamped with the bus clock.
pub trait AudioObserver {
    fn beeper_edge(&mut self, cycle: u64, level: bool);
}

impl<F: FnMut(u64, bool)> AudioObserver for F {
    fn beeper_edge(&mut self, cycle: u64, level: bool) {
        self(cycle, level);
    }
}

/// ZX Spectrum system.
pub struct Spectrum {
    config: MachineConfig,
    cpu: Z80,
    bus: SpectrumBus,
    screen_observer: Option<Box<dyn ScreenObserver>>,
    audio_observer: Option<Box<dyn AudioObserver>>,
}

impl Spectrum {
    /// Build a machine at power-on.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Config`] if a ROM image has the wrong size.
    pub fn new(config: MachineConfig) -> Result<Self, MachineError> {
        let bus = SpectrumBus::new(&config)?;
        let cpu = Z80::with_variant(config.cpu_variant);
        info!(
            "Spectrum {} ({} CPU, board {}, ports {:?})",
            config.model.name(),
            config.cpu_variant.name(),
            config.board_name(),
            bus.ports().priority()
        );
        Ok(Self {
            config,
            cpu,
            bus,
            screen_observer: None,
            audio_observer: None,
        })
    }

    #[must_use]
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Advance one T-state.
    pub fn step(&mut self) {
        self.sync_int();
        let reset_pending = self.cpu.is_reset_pending();
        self.cpu.tick(&mut self.bus);
        self.bus.advance(1);
        if reset_pending && !self.cpu.is_reset_pending() {
            self.bus.reset();
            debug!("machine reset");
        }
        let writes = self.bus.take_screen_writes();
        if let Some(observer) = &mut self.screen_observer {
            for write in writes {
                observer.screen_write(write);
            }
        }
        // Edges nobody listens for are dropped.
        let edges = self.bus.beeper.take_transitions();
        if let Some(observer) = &mut self.audio_observer {
            for (cycle, level) in edges {
                observer.beeper_edge(cycle, level);
            }
        }
    }

    /// Run one complete frame.
    ///
    /// Returns the T-states the frame took, wait states included.
    pub fn run_frame(&mut self, input: &ControllerState) -> u64 {
        self.apply_input(input);
        self.bus.ula.take_frame_complete();
        self.bus.begin_frame();
        let start = self.bus.clock();
        loop {
            self.step();
            if self.bus.ula.take_frame_complete() {
                break;
            }
        }
        if self.bus.end_frame() {
            debug!("lag frame {}", self.frame_count());
        }
        self.bus.clock() - start
    }

    /// Did the last [`run_frame`](Self::run_frame) go without reading the
    /// keyboard or joystick?
    #[must_use]
    pub fn is_lag_frame(&self) -> bool {
        self.bus.is_lag_frame()
    }

    /// Lag frames since power-on.
    #[must_use]
    pub fn lag_count(&self) -> u64 {
        self.bus.lag_count()
    }

    /// Latch controller state onto the keyboard and joystick.
    pub fn apply_input(&mut self, input: &ControllerState) {
        self.bus
            .devices
            .ula_port
            .keyboard_mut()
            .set_rows(input.keyboard().rows());
        if let Some(kempston) = &mut self.bus.devices.kempston {
            kempston.set_buttons(input.kempston());
        }
    }

    /// Serialise the whole machine. Only valid between steps, which is the
    /// only place a caller can be.
    #[must_use]
    pub fn save(&self) -> Vec<u8> {
        snapshot::save(&self.config, &self.cpu, &self.bus)
    }

    /// Restore a snapshot taken on an identically configured machine.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Snapshot`] for a malformed snapshot or one
    /// from a different configuration. The machine is unchanged on error.
    pub fn restore(&mut self, data: &[u8]) -> Result<(), MachineError> {
        let mut cpu = self.cpu.clone();
        let mut bus = self.bus.clone();
        if let Err(err) = snapshot::load(data, &self.config, &mut cpu, &mut bus) {
            warn!("snapshot rejected: {err}");
            return Err(err.into());
        }
        self.cpu = cpu;
        self.bus = bus;
        info!(
            "snapshot restored at frame {} cycle {}",
            self.frame_count(),
            self.frame_cycle()
        );
        Ok(())
    }

    /// Reset at the next opcode boundary. Paging latches and board
    /// registers reset with the CPU; RAM survives.
    pub fn request_reset(&mut self) {
        self.cpu.request_reset();
    }

    /// T-state within the current frame.
    #[must_use]
    pub fn frame_cycle(&self) -> u32 {
        self.bus.ula.frame_cycle()
    }

    /// Completed frames.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.bus.ula.frame_count()
    }

    /// Copy an image into a RAM bank.
    ///
    /// # Errors
    ///
    /// Fails if the bank does not exist or the image is over 16K.
    pub fn load_ram_bank(&mut self, bank: usize, data: &[u8]) -> Result<(), MachineError> {
        Ok(self.bus.devices.paging.load_ram_bank(bank, data)?)
    }

    #[must_use]
    pub fn ram_bank(&self, bank: usize) -> Option<&[u8]> {
        self.bus.paging().ram_bank(bank)
    }

    /// Read the displayed screen bank, for renderers.
    #[must_use]
    pub fn screen_peek(&self, offset: u16) -> u8 {
        self.bus.paging().screen_peek(offset)
    }

    /// Read memory as the CPU sees it, without side effects.
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        self.bus.peek(addr)
    }

    pub fn set_screen_observer(&mut self, observer: impl ScreenObserver + 'static) {
        self.screen_observer = Some(Box::new(observer));
    }

    pub fn clear_screen_observer(&mut self) {
        self.screen_observer = None;
    }

    pub fn set_audio_observer(&mut self, observer: impl AudioObserver + 'static) {
        self.audio_observer = Some(Box::new(observer));
    }

    pub fn clear_audio_observer(&mut self) {
        self.audio_observer = None;
    }

    #[must_use]
    pub fn cpu(&self) -> &Z80 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Z80 {
        &mut self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &SpectrumBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SpectrumBus {
        &mut self.bus
    }

    fn sync_int(&mut self) {
        let active = self.bus.ula.int_active();
        let interrupts = self.cpu.interrupts_mut();
        if active != interrupts.is_asserted(INT) {
            if active {
                interrupts.raise(INT);
            } else {
                interrupts.lower(INT);
            }
        }
    }
}

impl fmt::Debug for Spectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spectrum")
            .field("model", &self.config.model)
            .field("cpu", &self.cpu)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl Tickable for Spectrum {
    fn tick(&mut self) {
        self.step();
    }
}

impl Observable for Spectrum {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            return self.cpu.query(rest);
        }
        match path {
            "model" => Some(self.config.model.name().into()),
            "frame_cycle" => Some(self.frame_cycle().into()),
            "frame_count" => Some(self.frame_count().into()),
            _ => self.bus.query(path),
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "model",
            "frame_cycle",
            "frame_count",
            "cpu.<path>",
            "clock",
            "wait_states",
            "beeper",
            "floating_bus",
            "board.name",
            "input_read",
            "lag_frame",
            "lag_count",
            "memory.<path>",
            "ula.<path>",
        ]
    }
}
