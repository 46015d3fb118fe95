//! §4.5 Lattice: the persistent token/edge store behind tokenization and
//! training. Tokens are identified by their byte content; edges carry a
//! directed adjacency count between two token ids.
//!
//! Exact-match and prefix lookups go through a [`yada`] double-array trie,
//! rebuilt each time `batch_ingest` registers new token byte strings, since
//! the trie itself is immutable once built. Token bytes are hex-encoded
//! before insertion so an embedded NUL byte (a valid, if unusual, decoded
//! codepoint) can never be confused with a trie internal delimiter.

mod snapshot;

use std::collections::HashMap;
use std::num::NonZeroUsize;

use lru::LruCache;
use yada::builder::DoubleArrayBuilder;
use yada::DoubleArray;

use crate::config::LatticeConfig;
use crate::error::{LatticeError, LatticeResult};

pub use snapshot::{load_snapshot, save_snapshot};

/// A stored token: its byte content plus running statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub id: u32,
    pub bytes: Vec<u8>,
    pub frequency: u64,
    pub out_degree: u32,
}

/// A directed adjacency between two tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: u32,
    pub to: u32,
    pub count: u64,
}

/// Percentile summary over token frequency, returned by [`Lattice::stats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeStats {
    pub token_count: usize,
    pub edge_count: usize,
    pub frequency_p50: u64,
    pub frequency_p90: u64,
    pub frequency_p99: u64,
}

fn hex_encode(bytes: &[u8]) -> Vec<u8> {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = Vec::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX[(b >> 4) as usize]);
        out.push(HEX[(b & 0x0F) as usize]);
    }
    out
}

fn hex_decode(hex: &[u8]) -> Vec<u8> {
    fn nibble(b: u8) -> u8 {
        match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            _ => 0,
        }
    }
    hex.chunks_exact(2)
        .map(|pair| (nibble(pair[0]) << 4) | nibble(pair[1]))
        .collect()
}

/// The token/edge store. Exact-match and prefix search are served by a
/// double-array trie rebuilt on each `batch_ingest`; point lookups by id are
/// a direct vector index; point lookups by bytes are served by an exact
/// hashmap with a bounded LRU cache sitting in front of it for the hot path.
pub struct Lattice {
    config: LatticeConfig,
    tokens: Vec<Token>,
    by_bytes: HashMap<Vec<u8>, u32>,
    edges: HashMap<(u32, u32), Edge>,
    trie: Option<DoubleArray<Vec<u8>>>,
    bytes_cache: LruCache<Vec<u8>, u32>,
    id_cache: LruCache<u32, Token>,
}

impl Lattice {
    pub fn new(config: LatticeConfig) -> Self {
        let cap = NonZeroUsize::new(config.cache_size.max(1)).unwrap();
        Self {
            config,
            tokens: Vec::new(),
            by_bytes: HashMap::new(),
            edges: HashMap::new(),
            trie: None,
            bytes_cache: LruCache::new(cap),
            id_cache: LruCache::new(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Look up or register a token by its byte content, returning its id.
    pub fn get_or_create_token(&mut self, bytes: &[u8]) -> u32 {
        if let Some(&id) = self.by_bytes.get(bytes) {
            return id;
        }
        let id = self.tokens.len() as u32;
        self.tokens.push(Token {
            id,
            bytes: bytes.to_vec(),
            frequency: 0,
            out_degree: 0,
        });
        self.by_bytes.insert(bytes.to_vec(), id);
        self.trie = None; // stale until the next rebuild
        id
    }

    pub fn get_token_by_id(&mut self, id: u32) -> Option<Token> {
        if let Some(tok) = self.id_cache.get(&id) {
            return Some(tok.clone());
        }
        let tok = self.tokens.get(id as usize)?.clone();
        self.id_cache.put(id, tok.clone());
        Some(tok)
    }

    pub fn get_token_by_bytes(&mut self, bytes: &[u8]) -> Option<Token> {
        if let Some(&id) = self.bytes_cache.get(&bytes.to_vec()) {
            return self.get_token_by_id(id);
        }
        let &id = self.by_bytes.get(bytes)?;
        self.bytes_cache.put(bytes.to_vec(), id);
        self.get_token_by_id(id)
    }

    pub fn get_edge(&self, from: u32, to: u32) -> Option<Edge> {
        self.edges.get(&(from, to)).copied()
    }

    /// Token strength: total occurrences ever observed for this token across
    /// every committed batch (§3's `strength`, monotone non-decreasing).
    pub fn strength(&self, token_id: u32) -> u64 {
        self.tokens.get(token_id as usize).map(|t| t.frequency).unwrap_or(0)
    }

    /// Immutable out-degree lookup, for callers (like the tokenizer's node
    /// potential) that only need a read and shouldn't have to thread a
    /// mutable lattice reference through for cache bookkeeping.
    pub fn out_degree(&self, token_id: u32) -> Option<u32> {
        self.tokens.get(token_id as usize).map(|t| t.out_degree)
    }

    /// Number of distinct predecessors that have ever transitioned into `to`.
    pub fn count_predecessors(&self, to: u32) -> usize {
        self.edges.keys().filter(|&&(_, t)| t == to).count()
    }

    fn rebuild_trie(&mut self) {
        let mut keyset: Vec<(Vec<u8>, u32)> = self
            .tokens
            .iter()
            .map(|t| (hex_encode(&t.bytes), t.id))
            .collect();
        keyset.sort_by(|a, b| a.0.cmp(&b.0));
        let refs: Vec<(&[u8], u32)> = keyset.iter().map(|(k, v)| (k.as_slice(), *v)).collect();
        self.trie = DoubleArrayBuilder::build(&refs).map(DoubleArray::new);
    }

    fn ensure_trie(&mut self) {
        if self.trie.is_none() && !self.tokens.is_empty() {
            self.rebuild_trie();
        }
    }

    /// Longest-match-first search over every token whose bytes are a prefix
    /// of `input`. Returns `(token_id, matched_byte_len)` pairs.
    pub fn prefix_search(&mut self, input: &[u8]) -> Vec<(u32, usize)> {
        self.ensure_trie();
        let Some(trie) = &self.trie else {
            return Vec::new();
        };
        let hex = hex_encode(input);
        let mut hits: Vec<(u32, usize)> = trie
            .common_prefix_search(&hex)
            .map(|(value, hex_len)| (value, hex_len / 2))
            .collect();
        hits.sort_by(|a, b| b.1.cmp(&a.1));
        hits
    }

    /// Total observed outgoing count for a token (sum over all edges from it).
    fn total_out_count(&self, from: u32) -> u64 {
        self.edges
            .values()
            .filter(|e| e.from == from)
            .map(|e| e.count)
            .sum()
    }

    /// Same as `total_out_count`, exposed as `f64` for perplexity scoring.
    pub fn edge_total_from(&self, from: u32) -> f64 {
        self.total_out_count(from) as f64
    }

    /// Kneser-Ney continuation share of `token`: the fraction of all
    /// distinct edges in the lattice that terminate at `token`, used as the
    /// backoff distribution for never-observed continuations.
    pub fn continuation_share(&self, token: u32) -> f64 {
        if self.edges.is_empty() {
            return 0.0;
        }
        let distinct_in = self.edges.keys().filter(|&&(_, to)| to == token).count() as f64;
        distinct_in / self.edges.len() as f64
    }

    /// Top-8 successors of `from`, ranked by pointwise mutual information
    /// against the corpus-wide token frequency distribution.
    pub fn refined_transitions_from(&self, from: u32) -> Vec<Edge> {
        let total_edges: u64 = self.edges.values().map(|e| e.count).sum();
        if total_edges == 0 {
            return Vec::new();
        }
        let total_f = total_edges as f64;
        let from_total = self.total_out_count(from) as f64;

        let mut scored: Vec<(f64, Edge)> = self
            .edges
            .values()
            .filter(|e| e.from == from)
            .map(|&e| {
                let to_total: u64 = self.edges.values().filter(|x| x.to == e.to).map(|x| x.count).sum();
                let p_joint = e.count as f64 / total_f;
                let p_from = from_total / total_f;
                let p_to = to_total as f64 / total_f;
                let pmi = if p_from > 0.0 && p_to > 0.0 {
                    (p_joint / (p_from * p_to)).ln()
                } else {
                    f64::NEG_INFINITY
                };
                (pmi, e)
            })
            .collect();

        // Rank by PMI descending; ties (including NaN, which can't compare)
        // broken by raw weight descending, per §4.5.
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.count.cmp(&a.1.count))
        });
        scored.into_iter().take(8).map(|(_, e)| e).collect()
    }

    /// Recompute `out_degree` for each given token id from the edge table.
    pub fn update_token_degrees(&mut self, ids: &[u32]) {
        for &id in ids {
            let degree = self.edges.keys().filter(|&&(f, _)| f == id).count() as u32;
            if let Some(tok) = self.tokens.get_mut(id as usize) {
                tok.out_degree = degree;
            }
            self.id_cache.pop(&id);
        }
    }

    /// Aggregate a batch of token occurrences and `(from, to)` adjacency
    /// pairs and apply them atomically (§4.6 step 4): the whole batch is
    /// tallied in scratch tables first, then folded into token strength and
    /// the edge table in one pass, so a caller observing the lattice
    /// mid-call never sees a partially-applied batch.
    ///
    /// `occurrences` is one entry per drained token (duplicates expected and
    /// aggregated); it drives `Token::frequency` (§3's `strength`) directly,
    /// independent of whether that occurrence ever became the source or
    /// destination of an edge. `pairs` is the adjacency list within the
    /// batch; it drives edge weights and, transitively, `out_degree`.
    pub fn batch_ingest(&mut self, occurrences: &[u32], pairs: &[(u32, u32)]) -> LatticeResult<()> {
        if occurrences.is_empty() && pairs.is_empty() {
            return Ok(());
        }
        for &id in occurrences {
            if id as usize >= self.tokens.len() {
                return Err(LatticeError::BatchIngest(format!("unknown token id in occurrence {id}")));
            }
        }
        for &(from, to) in pairs {
            if from as usize >= self.tokens.len() || to as usize >= self.tokens.len() {
                return Err(LatticeError::BatchIngest(format!(
                    "unknown token id in pair ({from}, {to})"
                )));
            }
        }

        let mut occ_scratch: HashMap<u32, u64> = HashMap::new();
        for &id in occurrences {
            *occ_scratch.entry(id).or_insert(0) += 1;
        }
        for (&id, &delta) in &occ_scratch {
            self.tokens[id as usize].frequency = self.tokens[id as usize].frequency.saturating_add(delta);
            self.id_cache.pop(&id);
        }

        let mut edge_scratch: HashMap<(u32, u32), u64> = HashMap::new();
        for &(from, to) in pairs {
            *edge_scratch.entry((from, to)).or_insert(0) += 1;
        }

        let mut touched_from: Vec<u32> = Vec::new();
        for (&(from, to), &delta) in &edge_scratch {
            let entry = self.edges.entry((from, to)).or_insert(Edge { from, to, count: 0 });
            if entry.count == 0 {
                touched_from.push(from);
            }
            entry.count += delta;
        }

        touched_from.sort_unstable();
        touched_from.dedup();
        self.update_token_degrees(&touched_from);
        Ok(())
    }

    pub fn stats(&self) -> LatticeStats {
        let mut freqs: Vec<u64> = self.tokens.iter().map(|t| t.frequency).collect();
        freqs.sort_unstable();
        let percentile = |p: f64| -> u64 {
            if freqs.is_empty() {
                return 0;
            }
            let idx = ((freqs.len() as f64 - 1.0) * p).round() as usize;
            freqs[idx.min(freqs.len() - 1)]
        };
        LatticeStats {
            token_count: self.tokens.len(),
            edge_count: self.edges.len(),
            frequency_p50: percentile(0.50),
            frequency_p90: percentile(0.90),
            frequency_p99: percentile(0.99),
        }
    }

    pub fn save(&self, path: impl AsRef<std::path::Path>) -> LatticeResult<()> {
        snapshot::save_snapshot(self, path)
    }

    pub fn load(config: LatticeConfig, path: impl AsRef<std::path::Path>) -> LatticeResult<Self> {
        snapshot::load_snapshot(config, path)
    }
}
