//! Error types for machine construction and snapshots.

use emu_core::SnapshotError;
use thiserror::Error;

/// A machine configuration that cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown Spectrum model `{0}`")]
    UnknownModel(String),
    #[error("unknown board `{0}`")]
    UnknownBoard(String),
    #[error("{model} ROM must be exactly {expected} bytes, got {found}")]
    RomSize {
        model: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("board ROM must be 1 to 4 banks of 16384 bytes, got {0} bytes")]
    BoardRomSize(usize),
    #[error("RAM bank {bank} does not exist ({banks} banks fitted)")]
    RamBank { bank: usize, banks: usize },
    #[error("RAM bank image must be at most 16384 bytes, got {0}")]
    RamBankSize(usize),
}

/// Errors surfaced by [`crate::Spectrum`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
