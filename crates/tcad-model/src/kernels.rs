//! Elementwise vector kernels.
//!
//! Long vectors are split into contiguous, non-overlapping chunks and
//! processed on the rayon pool; short vectors run inline. No chunk
//! shares mutable state with another.

use rayon::prelude::*;
use tcad_core::{KernelConfig, Precision};

/// `dst[i] = op(dst[i], src[i])` for `i < min(dst.len(), src.len())`.
pub fn zip_with<T, F>(dst: &mut [T], src: &[T], cfg: &KernelConfig, op: F)
where
    T: Precision,
    F: Fn(T, T) -> T + Sync + Send,
{
    debug_assert_eq!(dst.len(), src.len());
    if cfg.is_parallel(dst.len()) {
        dst.par_chunks_mut(cfg.chunk_len)
            .zip(src.par_chunks(cfg.chunk_len))
            .for_each(|(d, s)| {
                for (a, &b) in d.iter_mut().zip(s) {
                    *a = op(*a, b);
                }
            });
    } else {
        for (a, &b) in dst.iter_mut().zip(src) {
            *a = op(*a, b);
        }
    }
}

/// `dst[i] = op(dst[i])`.
pub fn map_in_place<T, F>(dst: &mut [T], cfg: &KernelConfig, op: F)
where
    T: Precision,
    F: Fn(T) -> T + Sync + Send,
{
    if cfg.is_parallel(dst.len()) {
        dst.par_chunks_mut(cfg.chunk_len).for_each(|d| {
            for a in d {
                *a = op(*a);
            }
        });
    } else {
        for a in dst {
            *a = op(*a);
        }
    }
}

/// `out[i] = src[index[i]]`.
pub fn gather<T: Precision>(src: &[T], index: &[usize], cfg: &KernelConfig) -> Vec<T> {
    if cfg.is_parallel(index.len()) {
        index
            .par_chunks(cfg.chunk_len)
            .flat_map_iter(|c| c.iter().map(|&i| src[i]))
            .collect()
    } else {
        index.iter().map(|&i| src[i]).collect()
    }
}
