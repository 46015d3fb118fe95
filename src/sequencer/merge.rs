//! §4.4.2 `MergeSequencer`: packs short byte tokens from an upstream stage
//! into a single outer symbol, so the outer gate chain sees "is this short
//! token novel" rather than "is this individual byte novel".

use super::{IntSequencer, SequencerSymbol};
use crate::gate::EmissionGate;

/// Short byte runs (`len <= PACK_THRESHOLD`) are folded into one outer
/// symbol carrying the original bytes; longer runs are fed byte-by-byte so a
/// single outlier token can't blow up the outer candidate length unbounded.
const PACK_THRESHOLD: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeSymbol {
    Byte(u8),
    Packed(Vec<u8>),
}

impl MergeSymbol {
    fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Byte(b) => vec![b],
            Self::Packed(bytes) => bytes,
        }
    }
}

impl SequencerSymbol for MergeSymbol {
    fn hash_value(&self) -> u32 {
        match self {
            Self::Byte(b) => *b as u32,
            Self::Packed(bytes) => {
                let mut acc: u64 = 0;
                for &b in bytes {
                    acc = acc.wrapping_mul(256).wrapping_add(b as u64);
                }
                acc = acc.wrapping_mul(256).wrapping_add(bytes.len() as u64);
                acc as u32
            }
        }
    }
}

/// Re-cuts byte-token boundaries from an upstream stage through a second
/// gate chain, operating on packed short-token symbols instead of raw bytes.
pub struct MergeSequencer {
    outer: IntSequencer<MergeSymbol>,
}

impl MergeSequencer {
    pub fn new(gates: Vec<Box<dyn EmissionGate>>, key_seed: u32) -> Self {
        Self {
            outer: IntSequencer::new(gates, key_seed),
        }
    }

    fn symbols_for(token: &[u8]) -> Vec<MergeSymbol> {
        if token.len() <= PACK_THRESHOLD {
            vec![MergeSymbol::Packed(token.to_vec())]
        } else {
            token.iter().map(|&b| MergeSymbol::Byte(b)).collect()
        }
    }

    fn unpack(symbols: Vec<MergeSymbol>) -> Vec<u8> {
        symbols.into_iter().flat_map(MergeSymbol::into_bytes).collect()
    }

    /// Feed one upstream byte token through. A single packed token feeds the
    /// outer gate chain one symbol, but a long token unpacked into
    /// byte-by-byte symbols can trip the outer gate more than once per call;
    /// every completed token from every symbol is collected and returned in
    /// emission order, not just the last one.
    pub fn push(&mut self, token: &[u8]) -> Vec<Vec<u8>> {
        let mut emitted = Vec::new();
        for sym in Self::symbols_for(token) {
            if let Some(tok) = self.outer.push(sym) {
                emitted.push(Self::unpack(tok));
            }
        }
        emitted
    }

    pub fn flush(&mut self) -> Vec<u8> {
        Self::unpack(self.outer.flush())
    }

    pub fn reset(&mut self) {
        self.outer.reset();
    }
}
