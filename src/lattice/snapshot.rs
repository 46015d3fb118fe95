//! Binary snapshot persistence: a magic + version + length-prefixed-records
//! save/load convention so a trained lattice can be written to and restored
//! from disk without an external database.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::config::LatticeConfig;
use crate::error::{LatticeError, LatticeResult};

use super::{Edge, Lattice, Token};

const MAGIC: &[u8; 4] = b"SQLT";
const VERSION: u32 = 1;

pub fn save_snapshot(lattice: &Lattice, path: impl AsRef<Path>) -> LatticeResult<()> {
    let file = File::create(path.as_ref())?;
    let mut w = BufWriter::new(file);

    w.write_all(MAGIC)?;
    w.write_all(&VERSION.to_le_bytes())?;

    w.write_all(&(lattice.tokens.len() as u32).to_le_bytes())?;
    for tok in &lattice.tokens {
        w.write_all(&(tok.bytes.len() as u32).to_le_bytes())?;
        w.write_all(&tok.bytes)?;
        w.write_all(&tok.frequency.to_le_bytes())?;
        w.write_all(&tok.out_degree.to_le_bytes())?;
    }

    w.write_all(&(lattice.edges.len() as u32).to_le_bytes())?;
    for edge in lattice.edges.values() {
        w.write_all(&edge.from.to_le_bytes())?;
        w.write_all(&edge.to.to_le_bytes())?;
        w.write_all(&edge.count.to_le_bytes())?;
    }

    w.flush()?;
    Ok(())
}

pub fn load_snapshot(config: LatticeConfig, path: impl AsRef<Path>) -> LatticeResult<Lattice> {
    let file = File::open(path.as_ref())?;
    let mut r = BufReader::new(file);

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(LatticeError::Format("invalid magic: expected SQLT".to_string()));
    }

    let mut buf4 = [0u8; 4];
    r.read_exact(&mut buf4)?;
    let version = u32::from_le_bytes(buf4);
    if version != VERSION {
        return Err(LatticeError::Format(format!("unsupported version: {version}")));
    }

    r.read_exact(&mut buf4)?;
    let num_tokens = u32::from_le_bytes(buf4) as usize;
    const MAX_TOKENS: usize = 50_000_000;
    if num_tokens > MAX_TOKENS {
        return Err(LatticeError::Format(format!(
            "num_tokens too large: {num_tokens} (max {MAX_TOKENS})"
        )));
    }

    let mut tokens = Vec::with_capacity(num_tokens);
    let mut by_bytes = std::collections::HashMap::with_capacity(num_tokens);
    let mut buf8 = [0u8; 8];
    for id in 0..num_tokens {
        r.read_exact(&mut buf4)?;
        let len = u32::from_le_bytes(buf4) as usize;
        let mut bytes = vec![0u8; len];
        r.read_exact(&mut bytes)?;

        r.read_exact(&mut buf8)?;
        let frequency = u64::from_le_bytes(buf8);

        r.read_exact(&mut buf4)?;
        let out_degree = u32::from_le_bytes(buf4);

        by_bytes.insert(bytes.clone(), id as u32);
        tokens.push(Token {
            id: id as u32,
            bytes,
            frequency,
            out_degree,
        });
    }

    r.read_exact(&mut buf4)?;
    let num_edges = u32::from_le_bytes(buf4) as usize;
    const MAX_EDGES: usize = 200_000_000;
    if num_edges > MAX_EDGES {
        return Err(LatticeError::Format(format!(
            "num_edges too large: {num_edges} (max {MAX_EDGES})"
        )));
    }
    let mut edges = std::collections::HashMap::with_capacity(num_edges);
    for _ in 0..num_edges {
        r.read_exact(&mut buf4)?;
        let from = u32::from_le_bytes(buf4);
        r.read_exact(&mut buf4)?;
        let to = u32::from_le_bytes(buf4);
        r.read_exact(&mut buf8)?;
        let count = u64::from_le_bytes(buf8);
        edges.insert((from, to), Edge { from, to, count });
    }

    let cap = std::num::NonZeroUsize::new(config.cache_size.max(1)).unwrap();
    Ok(Lattice {
        config,
        tokens,
        by_bytes,
        edges,
        trie: None,
        bytes_cache: lru::LruCache::new(cap),
        id_cache: lru::LruCache::new(cap),
    })
}
