//! Seed partitioning for parallel tracking
//!
//! Seeds are split into contiguous chunks that are tracked independently;
//! per-chunk results are concatenated back in chunk order, so the final
//! streamline order matches the seed order.

use log::debug;

/// Split `seeds` into `n_chunks` contiguous, non-overlapping slices
///
/// When `n_chunks < seeds.len()` every slice holds `len / n_chunks` seeds and
/// the last one also takes the remainder. Otherwise (including an empty seed
/// list) the whole array is a single unit. `n_chunks == 0` behaves like 1.
pub fn partition_seeds<T>(seeds: &[T], n_chunks: usize) -> Vec<&[T]> {
    let n_chunks = n_chunks.max(1);
    if n_chunks >= seeds.len() {
        return vec![seeds];
    }

    let per_chunk = seeds.len() / n_chunks;
    let mut chunks = Vec::with_capacity(n_chunks);
    for c in 0..n_chunks {
        let start = c * per_chunk;
        let end = if c + 1 == n_chunks { seeds.len() } else { start + per_chunk };
        chunks.push(&seeds[start..end]);
    }
    debug!(
        "Partitioned {} seeds into {} chunks of {} (last chunk {})",
        seeds.len(),
        n_chunks,
        per_chunk,
        chunks.last().map_or(0, |c| c.len())
    );
    chunks
}

/// Concatenate per-chunk results, preserving chunk order
pub fn flatten_chunks<T>(chunks: Vec<Vec<T>>) -> Vec<T> {
    let total = chunks.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(total);
    for chunk in chunks {
        out.extend(chunk);
    }
    out
}
