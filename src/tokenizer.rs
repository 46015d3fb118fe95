//! §4.7 `Tokenizer`: Viterbi decode over a [`Lattice`], the read-path
//! counterpart to `Ingest`'s write path. Node potential rewards frequently
//! observed, low-branching transitions; costs are accumulated as negative
//! log-weights so the shortest path is the most probable segmentation,
//! following the DP-plus-backpointers shape of `StatefulTokenizer` in the
//! dependency graph sudachi.rs exposes for its own Viterbi decode.

use std::cell::RefCell;
use std::num::NonZeroUsize;

use lru::LruCache;

use crate::config::TokenizerConfig;
use crate::lattice::Lattice;

/// One token in a decoded path, as a codepoint-index half-open range into
/// the original input plus the lattice id backing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedToken {
    pub token_id: u32,
    pub start: usize,
    pub end: usize,
}

/// `ln(1e-9)`, the floor applied to the transition log-probability when no
/// edge exists for a transition (an unseen predecessor->token pair). Not a
/// literal `-9.0`: the floor is a probability of `1e-9`, whose natural log
/// is this value.
const MISSING_EDGE_FLOOR: f64 = -20.723_265_836_946_414;

/// Codepoints looked ahead from each position before truncating the prefix
/// search window; keeps a single position's lookup bounded regardless of
/// how long the remaining input is.
const LOOKAHEAD_CODEPOINTS: usize = 64;

/// Codepoints used to disambiguate the prefix-search cache key at a given
/// position (§4.7 step 3: "LRU-cached by `(i, first 24 cp)`"). Two different
/// decode calls that land on the same position with different upcoming text
/// must not share a cache entry, so the key carries enough of the lookahead
/// to distinguish them while staying bounded in size.
const CACHE_KEY_CODEPOINTS: usize = 24;

/// Entries kept in the prefix-search cache, mirroring the Lattice's own
/// per-field caches (§5: "six LRU caches each ≤ 1000 entries").
const PREFIX_CACHE_SIZE: usize = 1000;

/// Tag marking a synthetic single-codepoint fallback id (§4.7 step 3's
/// `prefixSearch` fallback candidate), as opposed to a real `Token::id` the
/// lattice assigned. `decode` is a pure CPU function (§5: a Lattice is
/// mutated only via `batchIngest`/`updateTokenDegrees`), so an unseen
/// codepoint can't register a new token mid-call; it is instead encoded
/// directly into this reserved id space and resolved back to bytes without
/// ever touching the lattice's token table. Real ids are assigned
/// sequentially from 0, so tagging with the high bit rules out any
/// collision (a codepoint's own value never exceeds `0x10FFFF`).
const FALLBACK_TOKEN_TAG: u32 = 0x8000_0000;

fn fallback_token_id(codepoint: u32) -> u32 {
    FALLBACK_TOKEN_TAG | codepoint
}

fn fallback_token_codepoint(id: u32) -> Option<u32> {
    (id & FALLBACK_TOKEN_TAG != 0).then(|| id & !FALLBACK_TOKEN_TAG)
}

pub struct Tokenizer {
    config: TokenizerConfig,
    prefix_cache: RefCell<LruCache<(usize, Vec<u32>), Vec<(u32, usize)>>>,
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self {
        Self {
            config,
            prefix_cache: RefCell::new(LruCache::new(NonZeroUsize::new(PREFIX_CACHE_SIZE).unwrap())),
        }
    }

    /// Prefix-search candidates starting at codepoint position `i`, cached
    /// by `(i, first 24 codepoints from i)` so repeated decodes over
    /// overlapping or identical text reuse prior trie lookups.
    fn candidates_at(&self, lattice: &mut Lattice, input: &[u32], i: usize) -> Vec<(u32, usize)> {
        let window_end = (i + LOOKAHEAD_CODEPOINTS).min(input.len());
        let key_end = (i + CACHE_KEY_CODEPOINTS).min(input.len());
        let key = (i, input[i..key_end].to_vec());

        if let Some(hit) = self.prefix_cache.borrow_mut().get(&key) {
            return hit.clone();
        }

        let window_bytes = codepoints_to_utf8(&input[i..window_end]);
        let hits = lattice.prefix_search(&window_bytes);
        self.prefix_cache.borrow_mut().put(key, hits.clone());
        hits
    }

    /// §4.7 step 3's `logP` term: the log-probability of transitioning from
    /// `prev` into `token_id`, among `prev`'s top-K PMI-ranked refined
    /// transitions. `None` previous (start of input) scores 0.
    fn log_transition_prob(&self, lattice: &Lattice, prev_id: Option<u32>, token_id: u32) -> f64 {
        let Some(prev) = prev_id else {
            return 0.0;
        };
        let refined = lattice.refined_transitions_from(prev);
        let total: u64 = refined.iter().map(|e| e.count).sum();
        if total == 0 {
            return MISSING_EDGE_FLOOR;
        }
        match refined.iter().find(|e| e.to == token_id) {
            Some(edge) => (edge.count as f64 / total as f64).ln(),
            None => MISSING_EDGE_FLOOR,
        }
    }

    /// §4.7 step 3's `nodePot` term: a per-token bias toward high-frequency,
    /// low-ambiguity tokens, independent of which predecessor led here.
    fn node_potential(&self, lattice: &Lattice, token_id: u32) -> f64 {
        let strength = lattice.strength(token_id) as f64;
        let out_degree = lattice.out_degree(token_id).unwrap_or(0) as f64;
        self.config.beta * (strength + 1.0).ln() - self.config.gamma * (out_degree + 1.0).ln()
    }

    /// Decode `input` (a codepoint sequence) into the highest-score sequence
    /// of tokens (§4.7). `dp[i]` holds the best cumulative score of any
    /// segmentation reaching codepoint position `i`; ties are broken in
    /// favor of the longer token at the moment of comparison, which is
    /// equivalent to favoring the longer token overall since both paths
    /// share the same prefix score up to `i`. Any codepoint that matches no
    /// known token falls back to a synthetic single-codepoint candidate
    /// (`fallback_token_id`) so decoding always makes progress without
    /// registering a new token in the lattice.
    pub fn decode(&self, lattice: &mut Lattice, input: &[u32]) -> Vec<DecodedToken> {
        let n = input.len();
        if n == 0 {
            return Vec::new();
        }

        let mut dp = vec![f64::NEG_INFINITY; n + 1];
        let mut bp: Vec<Option<(usize, u32)>> = vec![None; n + 1];
        dp[0] = 0.0;

        for i in 0..n {
            if !dp[i].is_finite() {
                continue;
            }
            let mut candidates = self.candidates_at(lattice, input, i);

            if candidates.is_empty() {
                // No known token starts here at all: fall back to a
                // synthetic single-codepoint candidate rather than minting
                // one in the lattice. Scoring treats it like any other
                // never-observed token (`strength`/`out_degree`/`get_edge`
                // all return their absent-value defaults for an id past the
                // end of the lattice's token table).
                let single = codepoints_to_utf8(&input[i..i + 1]);
                candidates.push((fallback_token_id(input[i]), single.len()));
            }

            let prev_token = bp[i].map(|(_, tid)| tid);
            for (token_id, byte_len) in candidates {
                let codepoint_len = utf8_len_to_codepoint_len(&input[i..], byte_len);
                let j = i + codepoint_len;
                if j > n || codepoint_len == 0 {
                    continue;
                }
                let log_p = self.log_transition_prob(lattice, prev_token, token_id);
                let potential = self.node_potential(lattice, token_id);
                let score = dp[i] + log_p + potential;

                let better = score > dp[j]
                    || (score == dp[j]
                        && codepoint_len > bp[j].map(|(prev, _)| j - prev).unwrap_or(0));
                if better {
                    dp[j] = score;
                    bp[j] = Some((i, token_id));
                }
            }
        }

        // Reconstruct from `n` if reachable; otherwise from the farthest
        // reachable position (§4.7 step 4). Full-coverage registration of
        // unseen codepoints above means `n` is always reachable in
        // practice, but the fallback is kept for a lattice whose candidates
        // never manage to land exactly on `n` (unreachable without the
        // single-codepoint fallback, which this decoder always applies).
        let end = if bp[n].is_some() {
            n
        } else {
            (0..=n).rev().find(|&p| p == 0 || bp[p].is_some()).unwrap_or(0)
        };

        let mut path = Vec::new();
        let mut pos = end;
        while pos > 0 {
            let Some((prev, token_id)) = bp[pos] else {
                break;
            };
            path.push(DecodedToken {
                token_id,
                start: prev,
                end: pos,
            });
            pos = prev;
        }
        path.reverse();
        path
    }

    /// Decode and resolve each token to its UTF-8 string content.
    pub fn to_strings(&self, lattice: &mut Lattice, input: &[u32]) -> Vec<String> {
        let path = self.decode(lattice, input);
        path.into_iter()
            .filter_map(|t| {
                let bytes = self.get_token_bytes(lattice, t.token_id)?;
                String::from_utf8(bytes).ok()
            })
            .collect()
    }

    /// Resolve a token id to its byte content, whether it's a real lattice
    /// token or a `decode`-only fallback id for an unseen codepoint.
    pub fn get_token_bytes(&self, lattice: &mut Lattice, token_id: u32) -> Option<Vec<u8>> {
        if let Some(cp) = fallback_token_codepoint(token_id) {
            return Some(codepoints_to_utf8(&[cp]));
        }
        lattice.get_token_by_id(token_id).map(|t| t.bytes)
    }
}

fn codepoints_to_utf8(cps: &[u32]) -> Vec<u8> {
    let mut s = String::new();
    for &cp in cps {
        if let Some(c) = char::from_u32(cp) {
            s.push(c);
        }
    }
    s.into_bytes()
}

/// Given the codepoint slice a byte-prefix match started at, translate the
/// matched byte length back into a codepoint count.
fn utf8_len_to_codepoint_len(remaining: &[u32], byte_len: usize) -> usize {
    let mut consumed_bytes = 0;
    for (idx, &cp) in remaining.iter().enumerate() {
        if consumed_bytes >= byte_len {
            return idx;
        }
        consumed_bytes += char::from_u32(cp).map(|c| c.len_utf8()).unwrap_or(0);
    }
    remaining.len()
}
