//! Memory and I/O bus interfaces.

/// Memory bus interface.
///
/// The CPU performs every memory transaction through this trait. The
/// implementation decodes the address, applies any access-timing penalty,
/// and routes to the backing storage.
pub trait Bus {
    /// Read a byte from the given address.
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte to the given address.
    fn write(&mut self, address: u16, value: u8);
}

/// A bus with a separate port-addressed I/O space (Z80 `IN`/`OUT`).
pub trait IoBus: Bus {
    /// Read a byte from an I/O port.
    fn read_io(&mut self, port: u16) -> u8;

    /// Write a byte to an I/O port.
    fn write_io(&mut self, port: u16, value: u8);

    /// Byte on the data bus during a maskable interrupt acknowledge.
    ///
    /// Most machines leave the bus pulled up, so the default is 0xFF.
    fn interrupt_data(&mut self) -> u8 {
        0xFF
    }
}

/// Flat 64 KiB RAM with a recorded I/O space.
///
/// Used by CPU tests: every address is writable and port reads return the
/// value last written to `io_input`. Port writes are appended to `io_writes`.
#[derive(Debug, Clone)]
pub struct SimpleBus {
    pub ram: Vec<u8>,
    pub io_input: u8,
    pub io_writes: Vec<(u16, u8)>,
    pub data_bus: u8,
}

impl SimpleBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ram: vec![0; 0x1_0000],
            io_input: 0xFF,
            io_writes: Vec::new(),
            data_bus: 0xFF,
        }
    }

    /// Copy `bytes` into memory starting at `address`, wrapping at 64 KiB.
    pub fn load(&mut self, address: u16, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.ram[usize::from(address.wrapping_add(i as u16))] = b;
        }
    }
}

impl Default for SimpleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SimpleBus {
    fn read(&mut self, address: u16) -> u8 {
        self.ram[usize::from(address)]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.ram[usize::from(address)] = value;
    }
}

impl IoBus for SimpleBus {
    fn read_io(&mut self, _port: u16) -> u8 {
        self.io_input
    }

    fn write_io(&mut self, port: u16, value: u8) {
        self.io_writes.push((port, value));
    }

    fn interrupt_data(&mut self) -> u8 {
        self.data_bus
    }
}
