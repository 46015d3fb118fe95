//! §4.4.1 `BoundarySequencer`: stacks an outer `IntSequencer` on top of an
//! inner one, bracketing each inner emission with sentinels so the outer
//! gate chain can re-cut boundaries the inner stage already committed to.

use std::collections::VecDeque;

use super::{IntSequencer, SequencerSymbol};
use crate::gate::EmissionGate;

/// A symbol fed to the outer sequencer: either a real codepoint carried up
/// from the inner stage, or one of two reserved brackets marking where an
/// inner token started and ended. Using a tagged enum rather than reserved
/// negative integers keeps sentinels from ever colliding with a real
/// codepoint value (codepoints only ever occupy `0..=0x10FFFF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodepointOrSentinel {
    Codepoint(u32),
    Open,
    Close,
}

impl SequencerSymbol for CodepointOrSentinel {
    fn hash_value(&self) -> u32 {
        match self {
            Self::Codepoint(cp) => *cp,
            Self::Open => u32::MAX,
            Self::Close => u32::MAX - 1,
        }
    }
}

/// Re-cuts inner-stage token boundaries through a second gate chain.
///
/// Each time the inner sequencer emits a token `T`, this feeds
/// `Open, t0, t1, ..., Close` to the outer sequencer in order. Because the
/// outer gate chain can cut mid-bracket, a single inner token's brackets can
/// fragment across more than one outer emission; each outer emission is
/// folded into the queue via the three-way merge rule (§4.4.1 step 2) rather
/// than enqueued verbatim, so a fragment left dangling open by one emission
/// gets stitched back onto the fragment that closes it. `push` drains the
/// queue before it ever looks at new input, since an inner emission can
/// cause the outer stage to emit more than one queued item's worth of
/// material and `push`'s contract only returns one token per call.
pub struct BoundarySequencer {
    inner: IntSequencer<u32>,
    outer: IntSequencer<CodepointOrSentinel>,
    queue: VecDeque<Vec<CodepointOrSentinel>>,
}

fn starts_with_open(item: &[CodepointOrSentinel]) -> bool {
    matches!(item.first(), Some(CodepointOrSentinel::Open))
}

fn ends_with_close(item: &[CodepointOrSentinel]) -> bool {
    matches!(item.last(), Some(CodepointOrSentinel::Close))
}

impl BoundarySequencer {
    pub fn new(
        inner_gates: Vec<Box<dyn EmissionGate>>,
        outer_gates: Vec<Box<dyn EmissionGate>>,
        key_seed: u32,
    ) -> Self {
        Self {
            inner: IntSequencer::new(inner_gates, key_seed),
            outer: IntSequencer::new(outer_gates, key_seed),
            queue: VecDeque::new(),
        }
    }

    /// §4.4.1 step 2's three-way merge rule for a new outer emission:
    /// - queue's last item ends with `Close` and doesn't start with `Open`
    ///   (a fragment that just closed something it didn't open): pop it,
    ///   fold it into the item before it, then push the new emission as its
    ///   own item.
    /// - else if the last item starts with `Open` and doesn't end with
    ///   `Close` (a fragment still waiting to close): fold the new emission
    ///   directly into it instead of queuing separately.
    /// - else: queue the new emission as its own item.
    fn enqueue_with_merge(&mut self, emission: Vec<CodepointOrSentinel>) {
        if let Some(last) = self.queue.back() {
            if ends_with_close(last) && !starts_with_open(last) {
                let closed = self.queue.pop_back().expect("just peeked");
                match self.queue.back_mut() {
                    Some(before) => before.extend(closed),
                    // No item precedes the popped one: there is nothing to
                    // fold it into, so put it back before queuing the new
                    // emission separately.
                    None => self.queue.push_back(closed),
                }
                self.queue.push_back(emission);
                return;
            }
            if starts_with_open(last) && !ends_with_close(last) {
                self.queue.back_mut().expect("just peeked").extend(emission);
                return;
            }
        }
        self.queue.push_back(emission);
    }

    fn feed_outer(&mut self, sym: CodepointOrSentinel) {
        if let Some(tok) = self.outer.push(sym) {
            self.enqueue_with_merge(tok);
        }
    }

    fn bracket_into_outer(&mut self, token: Vec<u32>) {
        self.feed_outer(CodepointOrSentinel::Open);
        for cp in token {
            self.feed_outer(CodepointOrSentinel::Codepoint(cp));
        }
        self.feed_outer(CodepointOrSentinel::Close);
    }

    /// Strip sentinels from queued outer tokens until a non-empty one is
    /// found (a token made up only of brackets, with no codepoints, carries
    /// no output and is skipped rather than surfaced as an empty emission).
    fn drain_queue(&mut self) -> Option<Vec<u32>> {
        while let Some(tok) = self.queue.pop_front() {
            let stripped: Vec<u32> = tok
                .into_iter()
                .filter_map(|s| match s {
                    CodepointOrSentinel::Codepoint(cp) => Some(cp),
                    CodepointOrSentinel::Open | CodepointOrSentinel::Close => None,
                })
                .collect();
            if !stripped.is_empty() {
                return Some(stripped);
            }
        }
        None
    }

    pub fn push(&mut self, cp: u32) -> Option<Vec<u32>> {
        if let Some(tok) = self.drain_queue() {
            return Some(tok);
        }
        if let Some(inner_tok) = self.inner.push(cp) {
            self.bracket_into_outer(inner_tok);
        }
        self.drain_queue()
    }

    /// Flush both stages and drain every remaining queued token, concatenated
    /// in order (the final call site is expected to treat this as the tail of
    /// the stream, not a sequence of discrete tokens).
    pub fn flush(&mut self) -> Vec<u32> {
        let inner_tail = self.inner.flush();
        if !inner_tail.is_empty() {
            self.bracket_into_outer(inner_tail);
        }
        let outer_tail = self.outer.flush();
        if !outer_tail.is_empty() {
            self.queue.push_back(outer_tail);
        }

        let mut result = Vec::new();
        while let Some(tok) = self.drain_queue() {
            result.extend(tok);
        }
        result
    }

    pub fn reset(&mut self) {
        self.inner.reset();
        self.outer.reset();
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LzGateConfig;
    use crate::gate::LzGate;

    fn sequencer() -> BoundarySequencer {
        BoundarySequencer::new(
            vec![Box::new(LzGate::new(&LzGateConfig { cache_max: 1024 }))],
            vec![Box::new(LzGate::new(&LzGateConfig { cache_max: 1024 }))],
            crate::key::DEFAULT_SEED,
        )
    }

    fn codepoints(s: &str) -> Vec<u32> {
        s.chars().map(|c| c as u32).collect()
    }

    #[test]
    fn concatenation_round_trips_through_both_stages() {
        let mut seq = sequencer();
        let input = codepoints("ababab ababab ababab");
        let mut reconstructed = Vec::new();
        for &cp in &input {
            if let Some(tok) = seq.push(cp) {
                reconstructed.extend(tok);
            }
        }
        reconstructed.extend(seq.flush());
        assert_eq!(reconstructed, input);
    }

    #[test]
    fn emitted_tokens_never_contain_bare_brackets() {
        // Regression guard: every token this type can ever hand back is a
        // `Vec<u32>` of real codepoints, so there is nothing to assert about
        // sentinel leakage beyond "it builds". This exercises a stream long
        // enough to cross several inner/outer emission boundaries.
        let mut seq = sequencer();
        for &cp in &codepoints(&"abcabcabc".repeat(50)) {
            seq.push(cp);
        }
        seq.flush();
    }

    #[test]
    fn reset_clears_both_stages_and_queue() {
        let mut seq = sequencer();
        for &cp in &codepoints("abababab") {
            seq.push(cp);
        }
        seq.reset();
        assert!(seq.queue.is_empty());
        assert!(seq.flush().is_empty());
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        let mut seq = sequencer();
        assert!(seq.flush().is_empty());
    }

    /// §4.4.1 step 2, branch 1: a queued fragment that already closed (ends
    /// with `Close`, didn't start with `Open`) gets folded into the item
    /// before it, and the new emission is queued as its own item.
    #[test]
    fn merge_folds_a_closed_fragment_into_its_predecessor() {
        use CodepointOrSentinel::{Close, Codepoint, Open};
        let mut seq = sequencer();
        seq.queue.push_back(vec![Codepoint('x' as u32)]);
        seq.queue.push_back(vec![Codepoint('y' as u32), Close]);

        seq.enqueue_with_merge(vec![Open, Codepoint('z' as u32)]);

        assert_eq!(seq.queue.len(), 2);
        assert_eq!(seq.queue[0], vec![Codepoint('x' as u32), Codepoint('y' as u32), Close]);
        assert_eq!(seq.queue[1], vec![Open, Codepoint('z' as u32)]);
    }

    /// §4.4.1 step 2, branch 2: a queued fragment still waiting to close
    /// (starts with `Open`, doesn't end with `Close`) absorbs the new
    /// emission directly instead of queuing it separately.
    #[test]
    fn merge_absorbs_into_a_still_open_fragment() {
        use CodepointOrSentinel::{Close, Codepoint, Open};
        let mut seq = sequencer();
        seq.queue.push_back(vec![Open, Codepoint('a' as u32)]);

        seq.enqueue_with_merge(vec![Codepoint('b' as u32), Close]);

        assert_eq!(seq.queue.len(), 1);
        assert_eq!(
            seq.queue[0],
            vec![Open, Codepoint('a' as u32), Codepoint('b' as u32), Close]
        );
    }

    /// §4.4.1 step 2, branch 3: neither special case applies (an empty
    /// queue, or a balanced last item), so the new emission is queued as its
    /// own item.
    #[test]
    fn merge_enqueues_separately_when_neither_special_case_applies() {
        use CodepointOrSentinel::Codepoint;
        let mut seq = sequencer();
        seq.enqueue_with_merge(vec![Codepoint('a' as u32)]);
        seq.enqueue_with_merge(vec![Codepoint('b' as u32)]);
        assert_eq!(seq.queue.len(), 2);
    }
}
