//! Parallel fan-out of pair scoring.
//!
//! The pair list is cut into balanced chunks (at least
//! [`CHUNKS_PER_WORKER`] per worker) and each chunk is scored independently
//! on a dedicated rayon pool. Workers only read the shared index and context
//! graph. A panicking chunk is contained: it is logged and contributes no
//! verdicts, the rest of the batch completes.

use std::panic::{self, AssertUnwindSafe};

use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::error::{Result, TagRelError};
use crate::index::TagId;

pub const CHUNKS_PER_WORKER: usize = 4;

pub type TagPair = (TagId, TagId);

/// Results of one fan-out, in pair order.
#[derive(Debug)]
pub struct DispatchOutcome<T> {
    pub results: Vec<T>,
    pub chunks: usize,
    pub failed_chunks: usize,
}

#[derive(Debug)]
pub struct ScoringPool {
    /// `None` scores on the calling thread.
    pool: Option<rayon::ThreadPool>,
    workers: usize,
}

impl ScoringPool {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        if !config.parallel {
            return Ok(Self::sequential());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_count)
            .thread_name(|i| format!("tagrel-score-{i}"))
            .build()
            .map_err(|e| TagRelError::WorkerPool(e.to_string()))?;
        Ok(Self {
            pool: Some(pool),
            workers: config.worker_count,
        })
    }

    pub fn sequential() -> Self {
        Self {
            pool: None,
            workers: 1,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Run `f` inside the pool so nested rayon work uses its threads.
    pub fn install<R, F>(&self, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }

    pub fn chunk_size(&self, pairs: usize) -> usize {
        chunk_size(pairs, self.workers)
    }

    /// Score every pair, dropping `None` verdicts.
    pub fn map_pairs<T, F>(&self, pairs: &[TagPair], score: F) -> DispatchOutcome<T>
    where
        T: Send,
        F: Fn(TagId, TagId) -> Option<T> + Sync,
    {
        if pairs.is_empty() {
            return DispatchOutcome {
                results: Vec::new(),
                chunks: 0,
                failed_chunks: 0,
            };
        }

        let size = self.chunk_size(pairs.len());
        let run_chunk = |chunk: &[TagPair]| -> Option<Vec<T>> {
            panic::catch_unwind(AssertUnwindSafe(|| {
                chunk
                    .iter()
                    .filter_map(|&(a, b)| score(a, b))
                    .collect::<Vec<T>>()
            }))
            .ok()
        };

        let per_chunk: Vec<Option<Vec<T>>> = match &self.pool {
            Some(pool) => pool.install(|| pairs.par_chunks(size).map(run_chunk).collect()),
            None => pairs.chunks(size).map(run_chunk).collect(),
        };

        let chunks = per_chunk.len();
        let mut failed_chunks = 0;
        let mut results = Vec::new();
        for (i, chunk) in per_chunk.into_iter().enumerate() {
            match chunk {
                Some(mut verdicts) => results.append(&mut verdicts),
                None => {
                    failed_chunks += 1;
                    let start = i * size;
                    let end = (start + size).min(pairs.len());
                    tracing::error!(
                        chunk = i,
                        pairs = end - start,
                        "scoring worker panicked; partition yields no verdicts"
                    );
                }
            }
        }

        DispatchOutcome {
            results,
            chunks,
            failed_chunks,
        }
    }
}

/// `ceil(pairs / (workers * CHUNKS_PER_WORKER))`, at least 1.
pub fn chunk_size(pairs: usize, workers: usize) -> usize {
    let target_chunks = workers.max(1) * CHUNKS_PER_WORKER;
    pairs.div_ceil(target_chunks).max(1)
}
