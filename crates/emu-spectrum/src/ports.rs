//! Port dispatch.
//!
//! The Spectrum decodes I/O ports partially, so several devices can answer
//! the same address. The dispatcher offers each transaction to the fitted
//! devices in a fixed priority order taken from the machine configuration;
//! the first one that claims the port handles it.

use crate::peripherals::Peripheral;

/// Port devices a machine can fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceId {
    Kempston,
    Paging,
    Ay,
    Ula,
    Board,
}

/// Lookup from id to a fitted device.
pub trait PortDevices {
    /// `None` if the device is not fitted.
    fn device(&mut self, id: DeviceId) -> Option<&mut dyn Peripheral>;
}

/// Ordered list of port devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDispatcher {
    priority: Vec<DeviceId>,
}

impl PortDispatcher {
    #[must_use]
    pub fn new(priority: Vec<DeviceId>) -> Self {
        Self { priority }
    }

    #[must_use]
    pub fn priority(&self) -> &[DeviceId] {
        &self.priority
    }

    /// First fitted device that decodes `port`.
    pub fn claimant<D: PortDevices + ?Sized>(&self, devices: &mut D, port: u16) -> Option<DeviceId> {
        self.priority
            .iter()
            .copied()
            .find(|&id| devices.device(id).is_some_and(|device| device.claims_port(port)))
    }

    /// Read from the first claimant.
    ///
    /// `None` when nothing claims the port, or the claimant does not drive
    /// the bus; the caller supplies the floating-bus value.
    pub fn read<D: PortDevices + ?Sized>(&self, devices: &mut D, port: u16) -> Option<u8> {
        let id = self.claimant(devices, port)?;
        devices.device(id)?.read_port(port)
    }

    /// Write to the first claimant that accepts writes. Returns who took it.
    pub fn write<D: PortDevices + ?Sized>(&self, devices: &mut D, port: u16, value: u8) -> Option<DeviceId> {
        let id = self.priority.iter().copied().find(|&id| {
            devices
                .device(id)
                .is_some_and(|device| device.accepts_writes() && device.claims_port(port))
        })?;
        devices.device(id)?.write_port(port, value);
        Some(id)
    }
}
