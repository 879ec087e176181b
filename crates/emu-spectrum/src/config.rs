//! Spectrum model configuration.
//!
//! Everything a machine needs is passed in through [`MachineConfig`] at
//! construction. Model differences are data: a bank topology, a ULA timing
//! record and a port priority list.

use serde::{Deserialize, Serialize};
use sinclair_ula::UlaTiming;
use zilog_z80::Z80Variant;

use crate::error::ConfigError;
use crate::memory::{PagingPorts, Topology};
use crate::ports::DeviceId;

/// Supported Spectrum models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpectrumModel {
    #[serde(rename = "16k")]
    Spectrum16K,
    #[serde(rename = "48k")]
    Spectrum48K,
    #[serde(rename = "128k")]
    Spectrum128K,
    #[serde(rename = "plus2")]
    SpectrumPlus2,
    #[serde(rename = "plus3")]
    SpectrumPlus3,
}

impl SpectrumModel {
    pub const ALL: [Self; 5] = [
        Self::Spectrum16K,
        Self::Spectrum48K,
        Self::Spectrum128K,
        Self::SpectrumPlus2,
        Self::SpectrumPlus3,
    ];

    /// Short name, as used in configuration files and snapshots.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Spectrum16K => "16k",
            Self::Spectrum48K => "48k",
            Self::Spectrum128K => "128k",
            Self::SpectrumPlus2 => "plus2",
            Self::SpectrumPlus3 => "plus3",
        }
    }

    /// Look up a model by its short name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownModel`] for anything else.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        Self::ALL
            .into_iter()
            .find(|model| model.name() == name)
            .ok_or_else(|| ConfigError::UnknownModel(name.to_string()))
    }

    #[must_use]
    pub const fn topology(self) -> Topology {
        match self {
            Self::Spectrum16K => Topology::SPECTRUM_16K,
            Self::Spectrum48K => Topology::SPECTRUM_48K,
            Self::Spectrum128K | Self::SpectrumPlus2 => Topology::SPECTRUM_128K,
            Self::SpectrumPlus3 => Topology::SPECTRUM_PLUS3,
        }
    }

    #[must_use]
    pub const fn timing(self) -> UlaTiming {
        match self {
            Self::Spectrum16K | Self::Spectrum48K => UlaTiming::SINCLAIR_48K,
            Self::Spectrum128K | Self::SpectrumPlus2 => UlaTiming::SINCLAIR_128K,
            Self::SpectrumPlus3 => UlaTiming::AMSTRAD_PLUS3,
        }
    }

    /// ROM image size in bytes.
    #[must_use]
    pub const fn rom_size(self) -> usize {
        self.topology().rom_pages as usize * 0x4000
    }

    /// Whether the AY sound chip is fitted.
    #[must_use]
    pub const fn has_ay(self) -> bool {
        !matches!(self, Self::Spectrum16K | Self::Spectrum48K)
    }
}

/// Bank-switch boards that can be plugged into the expansion port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoardKind {
    /// Banked ROM cartridge with XOR-protected registers.
    XorProtection,
}

impl BoardKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::XorProtection => "xor-protection",
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBoard`] for an unrecognised name.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "xor-protection" => Ok(Self::XorProtection),
            _ => Err(ConfigError::UnknownBoard(name.to_string())),
        }
    }
}

/// A board and the ROM it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    pub kind: BoardKind,
    pub rom: Vec<u8>,
}

impl BoardConfig {
    #[must_use]
    pub fn xor_protection(rom: Vec<u8>) -> Self {
        Self {
            kind: BoardKind::XorProtection,
            rom,
        }
    }
}

/// Configuration for creating a Spectrum instance.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub model: SpectrumModel,
    /// System ROM. Must be exactly [`SpectrumModel::rom_size`] bytes.
    pub rom: Vec<u8>,
    pub cpu_variant: Z80Variant,
    /// Kempston joystick interface fitted.
    pub kempston: bool,
    pub board: Option<BoardConfig>,
}

impl MachineConfig {
    /// NMOS CPU, no joystick interface, no board.
    #[must_use]
    pub fn new(model: SpectrumModel, rom: Vec<u8>) -> Self {
        Self {
            model,
            rom,
            cpu_variant: Z80Variant::Nmos,
            kempston: false,
            board: None,
        }
    }

    #[must_use]
    pub fn with_cpu_variant(mut self, variant: Z80Variant) -> Self {
        self.cpu_variant = variant;
        self
    }

    #[must_use]
    pub fn with_kempston(mut self, fitted: bool) -> Self {
        self.kempston = fitted;
        self
    }

    #[must_use]
    pub fn with_board(mut self, board: BoardConfig) -> Self {
        self.board = Some(board);
        self
    }

    /// Check ROM sizes against the model and board.
    ///
    /// # Errors
    ///
    /// Returns the first size mismatch found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let expected = self.model.rom_size();
        if self.rom.len() != expected {
            return Err(ConfigError::RomSize {
                model: self.model.name(),
                expected,
                found: self.rom.len(),
            });
        }
        if let Some(board) = &self.board {
            let len = board.rom.len();
            if len == 0 || len % 0x4000 != 0 || len > 4 * 0x4000 {
                return Err(ConfigError::BoardRomSize(len));
            }
        }
        Ok(())
    }

    /// Name of the fitted board, or `"none"`.
    #[must_use]
    pub fn board_name(&self) -> &'static str {
        self.board.as_ref().map_or("none", |board| board.kind.name())
    }

    /// Port devices in the order they are offered each transaction.
    ///
    /// The Kempston interface decodes only A5 and shadows everything behind
    /// it, so it goes first.
    #[must_use]
    pub fn port_priority(&self) -> Vec<DeviceId> {
        let mut order = Vec::new();
        if self.kempston {
            order.push(DeviceId::Kempston);
        }
        if self.model.topology().paging != PagingPorts::None {
            order.push(DeviceId::Paging);
        }
        if self.model.has_ay() {
            order.push(DeviceId::Ay);
        }
        order.push(DeviceId::Ula);
        if self.board.is_some() {
            order.push(DeviceId::Board);
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_round_trip() {
        for model in SpectrumModel::ALL {
            assert_eq!(SpectrumModel::from_name(model.name()), Ok(model));
        }
        assert_eq!(
            SpectrumModel::from_name("pentagon"),
            Err(ConfigError::UnknownModel("pentagon".to_string()))
        );
    }

    #[test]
    fn models_deserialise_from_short_names() {
        let models: Vec<SpectrumModel> =
            serde_json::from_str(r#"["16k", "48k", "128k", "plus2", "plus3"]"#).expect("model list");
        assert_eq!(models, SpectrumModel::ALL);
        let board: BoardKind = serde_json::from_str(r#""xor-protection""#).expect("board kind");
        assert_eq!(board, BoardKind::XorProtection);
    }

    #[test]
    fn rom_sizes() {
        assert_eq!(SpectrumModel::Spectrum16K.rom_size(), 0x4000);
        assert_eq!(SpectrumModel::Spectrum48K.rom_size(), 0x4000);
        assert_eq!(SpectrumModel::Spectrum128K.rom_size(), 0x8000);
        assert_eq!(SpectrumModel::SpectrumPlus3.rom_size(), 0x10000);
    }

    #[test]
    fn validate_rejects_wrong_rom_size() {
        let config = MachineConfig::new(SpectrumModel::Spectrum128K, vec![0; 0x4000]);
        assert_eq!(
            config.validate(),
            Err(ConfigError::RomSize {
                model: "128k",
                expected: 0x8000,
                found: 0x4000
            })
        );
    }

    #[test]
    fn validate_rejects_bad_board_rom() {
        let base = MachineConfig::new(SpectrumModel::Spectrum48K, vec![0; 0x4000]);
        for len in [0, 0x1000, 5 * 0x4000] {
            let config = base.clone().with_board(BoardConfig::xor_protection(vec![0; len]));
            assert_eq!(config.validate(), Err(ConfigError::BoardRomSize(len)));
        }
        let config = base.with_board(BoardConfig::xor_protection(vec![0; 0x8000]));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn port_priority_puts_kempston_first() {
        let config = MachineConfig::new(SpectrumModel::Spectrum128K, vec![0; 0x8000]).with_kempston(true);
        assert_eq!(
            config.port_priority(),
            vec![DeviceId::Kempston, DeviceId::Paging, DeviceId::Ay, DeviceId::Ula]
        );

        let config = MachineConfig::new(SpectrumModel::Spectrum48K, vec![0; 0x4000])
            .with_board(BoardConfig::xor_protection(vec![0; 0x4000]));
        assert_eq!(config.port_priority(), vec![DeviceId::Ula, DeviceId::Board]);
    }
}
