//! §4.3 `IntSequencer` and §4.4 stacked sequencers (`BoundarySequencer`,
//! `MergeSequencer`).

mod boundary;
mod merge;

pub use boundary::{BoundarySequencer, CodepointOrSentinel};
pub use merge::MergeSequencer;

use crate::gate::EmissionGate;
use crate::key::KeyGenerator;

/// A value an [`IntSequencer`] can grow a candidate out of. Implementors
/// supply the u32 fed into the rolling hash for each symbol; this is what
/// lets `BoundarySequencer`'s sentinel-tagged symbols and plain codepoints
/// share the same sequencer machinery without sentinels colliding with
/// real codepoint values (REDESIGN FLAGS: tagged enum, not reserved
/// negative integers).
pub trait SequencerSymbol: Clone + std::fmt::Debug {
    fn hash_value(&self) -> u32;
}

impl SequencerSymbol for u32 {
    fn hash_value(&self) -> u32 {
        *self
    }
}

/// Drives candidate growth, consults its gate chain in order, and emits a
/// completed candidate the moment any gate declines to continue (§4.3).
pub struct IntSequencer<T: SequencerSymbol = u32> {
    candidate: Vec<T>,
    key_gen: KeyGenerator,
    gates: Vec<Box<dyn EmissionGate>>,
}

impl<T: SequencerSymbol> std::fmt::Debug for IntSequencer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntSequencer")
            .field("candidate_len", &self.candidate.len())
            .field("gates", &self.gates.len())
            .finish()
    }
}

impl<T: SequencerSymbol> IntSequencer<T> {
    pub fn new(gates: Vec<Box<dyn EmissionGate>>, key_seed: u32) -> Self {
        Self {
            candidate: Vec::new(),
            key_gen: KeyGenerator::new(key_seed),
            gates,
        }
    }

    /// Current (not yet emitted) candidate, for inspection/testing.
    pub fn candidate(&self) -> &[T] {
        &self.candidate
    }

    /// Push one symbol. Returns a completed token if any gate fired.
    pub fn push(&mut self, sym: T) -> Option<Vec<T>> {
        let previous_key = self.key_gen.value();
        self.candidate.push(sym.clone());
        let current_key = self.key_gen.update(sym.hash_value());

        for gate in self.gates.iter_mut() {
            if !gate.evaluate(current_key, previous_key) {
                // `sym` is the panic trigger: pop it back off, emit
                // everything that came before it, and reseed the next
                // candidate from the trigger alone.
                let trigger = self.candidate.pop().expect("just pushed");
                let emitted = std::mem::take(&mut self.candidate);
                self.candidate.push(trigger.clone());
                self.key_gen.recalculate(&[trigger.hash_value()]);
                // On the very first symbol of a stream the candidate
                // preceding the trigger is empty by construction (the
                // implicit empty-string root is always "already known").
                // That carries no information, so it is not surfaced as
                // an emission.
                if emitted.is_empty() {
                    return None;
                }
                return Some(emitted);
            }
        }

        None
    }

    /// Return the current (possibly empty) candidate as a final token,
    /// leaving the sequencer with an empty candidate.
    pub fn flush(&mut self) -> Vec<T> {
        std::mem::take(&mut self.candidate)
    }

    /// Reset all gates and the current candidate, as if freshly constructed.
    pub fn reset(&mut self) {
        self.candidate.clear();
        self.key_gen.reset();
        for gate in self.gates.iter_mut() {
            gate.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LzGateConfig;
    use crate::gate::LzGate;

    fn lz_sequencer() -> IntSequencer<u32> {
        IntSequencer::new(
            vec![Box::new(LzGate::new(&LzGateConfig { cache_max: 1024 }))],
            crate::key::DEFAULT_SEED,
        )
    }

    fn codepoints(s: &str) -> Vec<u32> {
        s.chars().map(|c| c as u32).collect()
    }

    /// §8 scenario 4: "ababab" through LZ-only emits exactly ["a","b","ab","ab"].
    #[test]
    fn lz_repetition_emits_exact_sequence() {
        let mut seq = lz_sequencer();
        let mut emissions: Vec<Vec<u32>> = Vec::new();
        for cp in codepoints("ababab") {
            if let Some(tok) = seq.push(cp) {
                emissions.push(tok);
            }
        }
        let tail = seq.flush();
        if !tail.is_empty() {
            emissions.push(tail);
        }

        let as_strings: Vec<String> = emissions
            .iter()
            .map(|t| t.iter().map(|&cp| char::from_u32(cp).unwrap()).collect())
            .collect();
        assert_eq!(as_strings, vec!["a", "b", "ab", "ab"]);
    }

    #[test]
    fn emission_order_preserves_concatenation() {
        let mut seq = lz_sequencer();
        let input = codepoints("the quick brown fox jumps over the lazy dog the quick brown fox");
        let mut reconstructed: Vec<u32> = Vec::new();
        for &cp in &input {
            if let Some(tok) = seq.push(cp) {
                reconstructed.extend(tok);
            }
        }
        reconstructed.extend(seq.flush());
        assert_eq!(reconstructed, input);
    }

    #[test]
    fn push_returns_at_most_one_token() {
        let mut seq = lz_sequencer();
        // Every push returns Option<Vec<T>>, never more than one token by
        // construction of the return type itself; this test just exercises
        // a long repetitive stream to make sure nothing panics.
        for cp in codepoints(&"ab".repeat(200)) {
            seq.push(cp);
        }
    }

    #[test]
    fn flush_on_fresh_sequencer_is_empty() {
        let mut seq = lz_sequencer();
        assert!(seq.flush().is_empty());
    }

    #[test]
    fn reset_clears_candidate_and_gates() {
        let mut seq = lz_sequencer();
        seq.push('a' as u32);
        seq.push('a' as u32);
        seq.reset();
        assert!(seq.candidate().is_empty());
        // Gate history forgotten: 'a' looks unseen again.
        assert!(seq.push('a' as u32).is_none());
    }
}
