//! Spectrum bus: memory and I/O routing.
//!
//! Every CPU transaction lands here. Memory goes to the board if it claims
//! the address, otherwise to the paging unit. Ports go through the
//! dispatcher; unclaimed reads see the floating bus.
//!
//! # Contention
//!
//! The CPU always retires one micro-op per tick. When the ULA holds the bus,
//! the wait states are charged by moving the frame clock forward before the
//! access, so later accesses in the same instruction see the later cycle.

use emu_core::{Bus, IoBus, Observable, SaveState, SectionReader, SectionWriter, SnapshotError, Value};
use sinclair_ula::{SCREEN_BYTES, Ula};

use crate::board::{self, Board};
use crate::config::MachineConfig;
use crate::error::ConfigError;
use crate::memory::PagingUnit;
use crate::peripherals::{AyRegisters, Beeper, Kempston, Peripheral, PortObserver, UlaPort};
use crate::ports::{DeviceId, PortDevices, PortDispatcher};

/// A write into the displayed screen bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenWrite {
    pub bank: u8,
    /// Offset into the bank, below $1B00.
    pub offset: u16,
    pub value: u8,
}

/// One bus transaction, as seen by the devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transaction {
    MemoryRead { addr: u16, value: u8 },
    MemoryWrite { addr: u16, value: u8 },
    PortRead { port: u16, value: u8 },
    PortWrite { port: u16, value: u8 },
}

/// Everything on the port bus, plus the paging unit and board.
#[derive(Debug, Clone)]
pub struct Devices {
    pub kempston: Option<Kempston>,
    pub ay: Option<AyRegisters>,
    pub ula_port: UlaPort,
    pub paging: PagingUnit,
    pub board: Option<Box<dyn Board>>,
}

impl PortDevices for Devices {
    fn device(&mut self, id: DeviceId) -> Option<&mut dyn Peripheral> {
        match id {
            DeviceId::Kempston => self.kempston.as_mut().map(|device| device as &mut dyn Peripheral),
            DeviceId::Paging => Some(&mut self.paging),
            DeviceId::Ay => self.ay.as_mut().map(|device| device as &mut dyn Peripheral),
            DeviceId::Ula => Some(&mut self.ula_port),
            DeviceId::Board => self.board.as_mut().map(|board| board.as_peripheral()),
        }
    }
}

/// The Spectrum bus, implementing `emu_core::IoBus`.
#[derive(Debug, Clone)]
pub struct SpectrumBus {
    pub devices: Devices,
    pub ula: Ula,
    pub beeper: Beeper,
    ports: PortDispatcher,
    /// T-states since power-on, wait states included.
    clock: u64,
    /// Wait states charged since power-on.
    wait_states: u64,
    /// The keyboard or joystick was read this frame.
    input_read: bool,
    /// The last completed frame read no input.
    lag_frame: bool,
    lag_count: u64,
    screen_writes: Vec<ScreenWrite>,
    log: Option<Vec<(u64, Transaction)>>,
}

impl SpectrumBus {
    /// Build the bus for a configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for a wrong-sized system or board ROM.
    pub fn new(config: &MachineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let paging = PagingUnit::new(config.model.topology(), &config.rom)?;
        let board = config.board.as_ref().map(board::build).transpose()?;
        Ok(Self {
            devices: Devices {
                kempston: config.kempston.then(Kempston::new),
                ay: config.model.has_ay().then(AyRegisters::new),
                ula_port: UlaPort::new(),
                paging,
                board,
            },
            ula: Ula::new(config.model.timing()),
            beeper: Beeper::new(),
            ports: PortDispatcher::new(config.port_priority()),
            clock: 0,
            wait_states: 0,
            input_read: false,
            lag_frame: false,
            lag_count: 0,
            screen_writes: Vec::new(),
            log: None,
        })
    }

    #[must_use]
    pub fn paging(&self) -> &PagingUnit {
        &self.devices.paging
    }

    #[must_use]
    pub fn board(&self) -> Option<&dyn Board> {
        self.devices.board.as_deref()
    }

    #[must_use]
    pub fn ports(&self) -> &PortDispatcher {
        &self.ports
    }

    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    #[must_use]
    pub fn wait_states(&self) -> u64 {
        self.wait_states
    }

    /// Has the keyboard or joystick been read since the frame began?
    #[must_use]
    pub fn input_read(&self) -> bool {
        self.input_read
    }

    /// Did the last completed frame run without reading any input?
    #[must_use]
    pub fn is_lag_frame(&self) -> bool {
        self.lag_frame
    }

    /// Lag frames since power-on.
    #[must_use]
    pub fn lag_count(&self) -> u64 {
        self.lag_count
    }

    pub(crate) fn begin_frame(&mut self) {
        self.input_read = false;
    }

    /// Close the frame's input record. Returns whether it lagged.
    pub(crate) fn end_frame(&mut self) -> bool {
        self.lag_frame = !self.input_read;
        if self.lag_frame {
            self.lag_count += 1;
        }
        self.lag_frame
    }

    /// Move the clock on by `cycles` T-states.
    pub fn advance(&mut self, cycles: u32) {
        self.ula.advance(cycles);
        self.clock += u64::from(cycles);
    }

    /// Read a byte as the CPU would see it, without timing or logging.
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        match self.board() {
            Some(board) if board.claims_address(addr) => board.read(addr),
            _ => self.devices.paging.read_bus(addr),
        }
    }

    /// Value an unclaimed port read returns now.
    #[must_use]
    pub fn floating_bus(&self) -> u8 {
        self.ula
            .floating_offset()
            .map_or(0xFF, |offset| self.devices.paging.screen_peek(offset))
    }

    /// Start or stop recording transactions. Stopping discards the record.
    pub fn record_transactions(&mut self, enabled: bool) {
        self.log = enabled.then(Vec::new);
    }

    /// Drain the recorded transactions, each with its clock value.
    pub fn take_transactions(&mut self) -> Vec<(u64, Transaction)> {
        self.log.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Drain the screen writes since the last call.
    pub fn take_screen_writes(&mut self) -> Vec<ScreenWrite> {
        std::mem::take(&mut self.screen_writes)
    }

    /// Latches, ULA port and board back to power-on. Memory survives.
    pub fn reset(&mut self) {
        self.devices.paging.reset();
        if let Some(ay) = &mut self.devices.ay {
            ay.reset();
        }
        if let Some(board) = &mut self.devices.board {
            board.reset();
        }
    }

    fn stall(&mut self, cycles: u32) {
        if cycles > 0 {
            self.advance(cycles);
            self.wait_states += u64::from(cycles);
        }
    }

    fn contend(&mut self, addr: u16) {
        if self.devices.paging.is_contended(addr) {
            let delay = self.ula.memory_delay();
            self.stall(u32::from(delay));
        }
    }

    fn record(&mut self, transaction: Transaction) {
        if let Some(log) = &mut self.log {
            log.push((self.clock, transaction));
        }
    }

    pub(crate) fn save_ports(&self, out: &mut SectionWriter) {
        out.u64("clock", self.clock);
        out.u64("wait_states", self.wait_states);
        out.bool("input_read", self.input_read);
        out.bool("lag_frame", self.lag_frame);
        out.u64("lag_count", self.lag_count);
        if let Some(kempston) = &self.devices.kempston {
            kempston.save_state(out);
        }
        if let Some(ay) = &self.devices.ay {
            ay.save_state(out);
        }
        self.devices.ula_port.save_state(out);
        self.beeper.save_state(out);
    }

    pub(crate) fn load_ports(&mut self, src: &mut SectionReader<'_>) -> Result<(), SnapshotError> {
        self.clock = src.u64("clock")?;
        self.wait_states = src.u64("wait_states")?;
        self.input_read = src.bool("input_read")?;
        self.lag_frame = src.bool("lag_frame")?;
        self.lag_count = src.u64("lag_count")?;
        if let Some(kempston) = &mut self.devices.kempston {
            kempston.load_state(src)?;
        }
        if let Some(ay) = &mut self.devices.ay {
            ay.load_state(src)?;
        }
        self.devices.ula_port.load_state(src)?;
        self.beeper.load_state(src)?;
        self.screen_writes.clear();
        Ok(())
    }
}

impl Bus for SpectrumBus {
    fn read(&mut self, addr: u16) -> u8 {
        self.contend(addr);
        let value = self.peek(addr);
        self.record(Transaction::MemoryRead { addr, value });
        value
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.contend(addr);
        self.record(Transaction::MemoryWrite { addr, value });
        if let Some(board) = &mut self.devices.board
            && board.claims_address(addr)
        {
            board.write(addr, value);
            return;
        }
        let paging = &mut self.devices.paging;
        let bank = paging.ram_bank_at(addr);
        paging.write_bus(addr, value);
        let offset = addr & 0x3FFF;
        if bank == Some(paging.screen_bank()) && offset < SCREEN_BYTES {
            self.screen_writes.push(ScreenWrite {
                bank: paging.screen_bank(),
                offset,
                value,
            });
        }
    }
}

impl IoBus for SpectrumBus {
    fn read_io(&mut self, port: u16) -> u8 {
        let delay = self.ula.io_delay(port, self.devices.paging.is_contended(port));
        self.stall(delay);
        if matches!(
            self.ports.claimant(&mut self.devices, port),
            Some(DeviceId::Ula | DeviceId::Kempston)
        ) {
            self.input_read = true;
        }
        let value = match self.ports.read(&mut self.devices, port) {
            Some(value) => value,
            None => self.floating_bus(),
        };
        self.record(Transaction::PortRead { port, value });
        value
    }

    fn write_io(&mut self, port: u16, value: u8) {
        let delay = self.ula.io_delay(port, self.devices.paging.is_contended(port));
        self.stall(delay);
        self.record(Transaction::PortWrite { port, value });
        self.ports.write(&mut self.devices, port, value);
        self.ula.observe_write(port, value, self.clock);
        self.beeper.observe_write(port, value, self.clock);
    }
}

impl Observable for SpectrumBus {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("memory.") {
            return self.devices.paging.query(rest);
        }
        if let Some(rest) = path.strip_prefix("ula.") {
            return self.ula.query(rest);
        }
        match path {
            "clock" => Some(self.clock.into()),
            "wait_states" => Some(self.wait_states.into()),
            "beeper" => Some(self.beeper.level().into()),
            "floating_bus" => Some(self.floating_bus().into()),
            "board.name" => Some(self.board().map_or("none", |board| board.kind().name()).into()),
            "input_read" => Some(self.input_read.into()),
            "lag_frame" => Some(self.lag_frame.into()),
            "lag_count" => Some(self.lag_count.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
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
