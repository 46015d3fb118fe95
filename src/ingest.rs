//! §4.6 `Ingest`: buffers a stream of token ids and commits adjacency pairs
//! into a [`Lattice`] in fixed-size batches.
//!
//! Adjacency is only recorded *within* a batch: the pair spanning the last
//! token of one batch and the first token of the next is never recorded.
//! This is a faithful property of the batch-then-commit design, not a bug to
//! paper over. A caller that needs every adjacency preserved must choose a
//! batch size at least as large as its longest run of interest.

use tracing::debug;

use crate::config::IngestConfig;
use crate::error::IngestResult;
use crate::lattice::Lattice;

pub struct Ingest {
    config: IngestConfig,
    buffer: Vec<u32>,
}

impl Ingest {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config,
            buffer: Vec::new(),
        }
    }

    /// Buffer one token id, auto-committing into `lattice` once the
    /// configured batch size is reached.
    pub fn buffer(&mut self, lattice: &mut Lattice, token_id: u32) -> IngestResult<()> {
        self.buffer.push(token_id);
        if self.buffer.len() >= self.config.batch_size {
            self.commit(lattice)?;
        }
        Ok(())
    }

    /// Commit whatever is currently buffered, regardless of batch size.
    ///
    /// Every drained token contributes one occurrence entry (§4.6 step 2),
    /// so a batch of a single token still registers its strength even
    /// though it forms no adjacency pair.
    pub fn commit(&mut self, lattice: &mut Lattice) -> IngestResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let occurrences = std::mem::take(&mut self.buffer);
        let pairs: Vec<(u32, u32)> = occurrences.windows(2).map(|w| (w[0], w[1])).collect();
        if self.config.log_progress {
            debug!(tokens = occurrences.len(), pairs = pairs.len(), "committing ingest batch");
        }
        lattice.batch_ingest(&occurrences, &pairs)?;
        Ok(())
    }

    /// Alias for `commit`, for call sites that think in terms of "flush
    /// whatever's left" rather than "commit now".
    pub fn flush(&mut self, lattice: &mut Lattice) -> IngestResult<()> {
        self.commit(lattice)
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LatticeConfig;

    fn setup(batch_size: usize) -> (Ingest, Lattice, Vec<u32>) {
        let mut lattice = Lattice::new(LatticeConfig::default());
        let ids: Vec<u32> = (b'A'..=b'E')
            .map(|b| lattice.get_or_create_token(&[b]))
            .collect();
        (
            Ingest::new(IngestConfig {
                batch_size,
                log_progress: false,
            }),
            lattice,
            ids,
        )
    }

    /// §8 scenario 6: with batchSize=3 over [A,B,A,B,C], the adjacency
    /// straddling the batch boundary (B -> C's predecessor pairing with
    /// the trailing A of the first batch) must not be recorded.
    #[test]
    fn cross_batch_adjacency_is_not_recorded() {
        let (mut ingest, mut lattice, ids) = setup(3);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        let stream = [a, b, a, b, c];
        for &id in &stream {
            ingest.buffer(&mut lattice, id).unwrap();
        }
        ingest.flush(&mut lattice).unwrap();

        // First batch [A,B,A] contributes edges A->B, B->A.
        assert_eq!(lattice.get_edge(a, b).unwrap().count, 1);
        assert_eq!(lattice.get_edge(b, a).unwrap().count, 1);
        // Second batch [B,C] contributes B->C.
        assert_eq!(lattice.get_edge(b, c).unwrap().count, 1);
        // The boundary pair A->B spanning batch 1's last token and batch
        // 2's first token is never recorded as a *second* A->B occurrence:
        // only the one from inside the first batch exists.
        assert_eq!(lattice.get_edge(a, b).unwrap().count, 1);

        // Strength tracks every occurrence regardless of batch boundaries:
        // A appears twice, B appears twice, C once.
        assert_eq!(lattice.strength(a), 2);
        assert_eq!(lattice.strength(b), 2);
        assert_eq!(lattice.strength(c), 1);
    }

    #[test]
    fn single_token_batch_creates_no_edges_but_registers_strength() {
        let (mut ingest, mut lattice, ids) = setup(10);
        ingest.buffer(&mut lattice, ids[0]).unwrap();
        ingest.commit(&mut lattice).unwrap();
        assert_eq!(lattice.stats().edge_count, 0);
        assert_eq!(lattice.strength(ids[0]), 1);
    }

    #[test]
    fn auto_commit_fires_at_batch_size() {
        let (mut ingest, mut lattice, ids) = setup(2);
        ingest.buffer(&mut lattice, ids[0]).unwrap();
        assert_eq!(ingest.buffered_len(), 1);
        ingest.buffer(&mut lattice, ids[1]).unwrap();
        assert_eq!(ingest.buffered_len(), 0);
        assert_eq!(lattice.stats().edge_count, 1);
    }
}
