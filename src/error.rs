//! Error types for the fallible subsystems.
//!
//! Gate and sequencer operations never fail (they absorb statistical edge
//! cases by flooring, per design); only the lattice store, ingest pipeline,
//! and configuration loading can fail, and each gets its own error enum.

use thiserror::Error;

/// Errors raised by [`crate::lattice::Lattice`] operations.
#[derive(Debug, Error)]
pub enum LatticeError {
    #[error("batch ingest failed: {0}")]
    BatchIngest(String),

    #[error("degree recomputation failed: {0}")]
    DegreeUpdate(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid snapshot format: {0}")]
    Format(String),
}

pub type LatticeResult<T> = std::result::Result<T, LatticeError>;

/// Errors raised while buffering or committing tokens through [`crate::ingest::Ingest`].
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("storage failure during commit: {0}")]
    Storage(#[from] LatticeError),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("TOML parse error")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error")]
    Serialize(#[from] toml::ser::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors surfaced at the crate boundary for argument validation.
///
/// Per the design, a negative codepoint outside the reserved sentinel range
/// is the only invalid-argument case; an empty decode input is valid and
/// simply returns an empty id list.
#[derive(Debug, Error)]
pub enum InvalidArgument {
    #[error("codepoint {0} is out of range [0, 0x10FFFF]")]
    CodepointOutOfRange(i64),
}
