//! Online unsupervised tokenizer: an LZ/MDL-gated sequencer that segments a
//! codepoint stream, stacked boundary/merge sequencers that reshape token
//! boundaries, and a persistent lattice with a Viterbi decoder and a
//! Kneser-Ney perplexity calculator for inference.

pub mod config;
pub mod error;
pub mod gate;
pub mod ingest;
pub mod key;
pub mod lattice;
pub mod perplexity;
pub mod sequencer;
pub mod tokenizer;

pub use config::EngineConfig;
pub use error::{ConfigError, IngestError, InvalidArgument, LatticeError};
pub use gate::{CapacityStatus, EmissionGate, LzGate, MdlGate};
pub use ingest::Ingest;
pub use key::KeyGenerator;
pub use lattice::{Edge, Lattice, LatticeStats, Token};
pub use perplexity::{Perplexity, PerplexityResult};
pub use sequencer::{BoundarySequencer, CodepointOrSentinel, IntSequencer, MergeSequencer, SequencerSymbol};
pub use tokenizer::{DecodedToken, Tokenizer};
