use super::EmissionGate;
use crate::config::{MdlGateConfig, ZMode};

/// 20-bit mask applied to rolling-hash keys before indexing parent/edge
/// counters. Collisions are a deliberate memory/accuracy tradeoff (§4.2.2).
const INDEX_MASK: u32 = 0x000F_FFFF;
const INDEX_SPACE: usize = (INDEX_MASK as usize) + 1; // 2^20

/// Open-addressed `(from_idx, to_idx) -> count` table with linear probing,
/// power-of-two capacity, and a load factor cap of 0.7. Growth stops at
/// `max_slots`; beyond that, new keys are treated as unobserved (count 0)
/// rather than panicking or erroring, since gates must stay infallible.
struct EdgeCountTable {
    slots: Vec<Option<(u64, u32)>>,
    len: usize,
    max_slots: usize,
    capacity_exceeded: bool,
}

impl EdgeCountTable {
    fn new(max_slots: usize) -> Self {
        Self {
            slots: vec![None; 16],
            len: 0,
            max_slots: max_slots.next_power_of_two(),
            capacity_exceeded: false,
        }
    }

    fn combine(from_idx: u32, to_idx: u32) -> u64 {
        ((from_idx as u64) << 32) | to_idx as u64
    }

    fn probe_index(cap: usize, key: u64) -> usize {
        (key as usize).wrapping_mul(0x9E37_79B9_7F4A_7C15) & (cap - 1)
    }

    /// Return the current count for `(from_idx, to_idx)`, or 0 if absent.
    fn get(&self, from_idx: u32, to_idx: u32) -> u32 {
        let key = Self::combine(from_idx, to_idx);
        let cap = self.slots.len();
        let mut idx = Self::probe_index(cap, key);
        for _ in 0..cap {
            match &self.slots[idx] {
                Some((k, v)) if *k == key => return *v,
                None => return 0,
                _ => idx = (idx + 1) & (cap - 1),
            }
        }
        0
    }

    /// Increment the counter for `(from_idx, to_idx)`, growing the table if
    /// needed. Returns `true` if this pair was newly created (a new edge).
    fn increment(&mut self, from_idx: u32, to_idx: u32) -> bool {
        if self.len + 1 > self.slots.len() * 7 / 10 && self.slots.len() < self.max_slots {
            self.grow();
        }

        let key = Self::combine(from_idx, to_idx);
        let cap = self.slots.len();
        let mut idx = Self::probe_index(cap, key);
        let mut probes = 0;
        loop {
            match &mut self.slots[idx] {
                Some((k, v)) if *k == key => {
                    *v += 1;
                    return false;
                }
                None => {
                    if self.len >= self.max_slots {
                        // Table is at its hard cap and this is a brand-new
                        // key: drop the observation rather than overflow.
                        self.capacity_exceeded = true;
                        return true;
                    }
                    self.slots[idx] = Some((key, 1));
                    self.len += 1;
                    return true;
                }
                _ => {
                    idx = (idx + 1) & (cap - 1);
                    probes += 1;
                    if probes > cap {
                        self.capacity_exceeded = true;
                        return true;
                    }
                }
            }
        }
    }

    fn grow(&mut self) {
        let new_cap = (self.slots.len() * 2).min(self.max_slots.max(1));
        if new_cap <= self.slots.len() {
            return;
        }
        let old = std::mem::replace(&mut self.slots, vec![None; new_cap]);
        self.len = 0;
        for entry in old.into_iter().flatten() {
            let (key, count) = entry;
            let cap = self.slots.len();
            let mut idx = Self::probe_index(cap, key);
            while self.slots[idx].is_some() {
                idx = (idx + 1) & (cap - 1);
            }
            self.slots[idx] = Some((key, count));
            self.len += 1;
        }
    }
}

/// Whether the MDL gate's internal edge-count table has hit its configured
/// hard capacity. This is a diagnostic signal, not a propagated error:
/// gates stay infallible per the emission-gate contract, but a caller that
/// wants to detect "a hash that fails to mask as designed" (§7) can poll
/// this after a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityStatus {
    Ok,
    Exceeded { max_slots: usize },
}

/// MDL/statistical gate (§4.2.2): emits when the observed transition is
/// both a relative-surprise outlier and sufficiently high-entropy.
pub struct MdlGate {
    config: MdlGateConfig,
    parent_count: Vec<u32>,
    degree: Vec<u32>,
    edges: EdgeCountTable,
    p_mean: f64,
    p_sq_mean: f64,
    entropy_table: Vec<f64>,
}

impl std::fmt::Debug for MdlGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdlGate")
            .field("p_mean", &self.p_mean)
            .field("edges_len", &self.edges.len)
            .finish()
    }
}

impl MdlGate {
    pub fn new(config: MdlGateConfig) -> Self {
        let max_slots = config.max_degree_table.min(INDEX_SPACE * INDEX_SPACE).max(16);
        Self {
            parent_count: vec![0u32; INDEX_SPACE],
            degree: vec![0u32; INDEX_SPACE],
            edges: EdgeCountTable::new(max_slots),
            p_mean: 0.5,
            p_sq_mean: 0.25,
            entropy_table: vec![0.0],
            config,
        }
    }

    fn index(key: u32) -> usize {
        (key & INDEX_MASK) as usize
    }

    fn entropy_threshold(&mut self, z: u32) -> f64 {
        let z = z as usize;
        if z == 0 {
            return 0.0;
        }
        while self.entropy_table.len() <= z {
            let idx = self.entropy_table.len() as f64;
            self.entropy_table.push(idx.powf(-self.config.tau));
        }
        self.entropy_table[z]
    }

    /// Diagnostic: has the internal edge-count table hit its hard cap?
    pub fn capacity_status(&self) -> CapacityStatus {
        if self.edges.capacity_exceeded {
            CapacityStatus::Exceeded {
                max_slots: self.edges.max_slots,
            }
        } else {
            CapacityStatus::Ok
        }
    }
}

impl EmissionGate for MdlGate {
    fn evaluate(&mut self, current_key: u32, previous_key: u32) -> bool {
        let prev_idx = Self::index(previous_key) as u32;
        let cur_idx = Self::index(current_key) as u32;

        let degree_prev = self.degree[prev_idx as usize];
        let z = match self.config.z_mode {
            ZMode::ChildDegree => degree_prev.max(1),
            ZMode::Fixed => self.config.z_fixed.max(1),
        };

        let parent_count = self.parent_count[prev_idx as usize] as f64;
        let edge_count = self.edges.get(prev_idx, cur_idx) as f64;
        let alpha = self.config.alpha;

        let p_raw = (edge_count + alpha) / (parent_count + alpha * z as f64);
        let eps = 1e-9;
        let p_clamped = p_raw.clamp(eps, 1.0 - eps);

        let p_mean_prev = self.p_mean;
        self.p_mean = (1.0 - self.config.beta) * self.p_mean + self.config.beta * p_clamped;
        self.p_sq_mean =
            (1.0 - self.config.beta) * self.p_sq_mean + self.config.beta * p_clamped * p_clamped;
        let variance = (self.p_sq_mean - self.p_mean * self.p_mean).max(1e-12);

        let delta = p_mean_prev - p_clamped;
        let surprise_test = delta * delta >= self.config.c * self.config.c * variance && delta > 0.0;

        let threshold = self.entropy_threshold(z);
        let entropy_test = p_raw >= threshold;

        let cut_warranted = surprise_test && entropy_test;

        // Update counters with the observation now that the decision has
        // been made from the pre-update state.
        self.parent_count[prev_idx as usize] = self.parent_count[prev_idx as usize].saturating_add(1);
        let edge_is_new = self.edges.increment(prev_idx, cur_idx);
        if edge_is_new {
            self.degree[prev_idx as usize] = self.degree[prev_idx as usize].saturating_add(1);
        }

        !cut_warranted
    }

    fn reset(&mut self) {
        self.parent_count.iter_mut().for_each(|c| *c = 0);
        self.degree.iter_mut().for_each(|c| *c = 0);
        self.edges = EdgeCountTable::new(self.edges.max_slots);
        self.p_mean = 0.5;
        self.p_sq_mean = 0.25;
    }
}
