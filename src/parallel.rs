//! Generic ordered parallel map
//!
//! `parfor` applies a function to every item of a slice and returns the
//! results in input order. The engine picks serial or parallel execution and
//! the backend picks how parallel work is scheduled:
//!
//! - `rayon`: work-stealing on a dedicated rayon pool of `n_jobs` threads
//! - `threads`: `n_jobs` scoped std threads pulling items off a shared cursor
//!
//! Scheduler names from other tracking front ends are accepted as aliases:
//! the `dask` and `joblib` engines run in parallel, and the `threading` and
//! `multiprocessing` backends map to `threads`.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackingError};

/// Serial or parallel execution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Serial,
    #[default]
    #[serde(alias = "dask", alias = "joblib")]
    Parallel,
}

impl FromStr for Engine {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "serial" => Ok(Self::Serial),
            "parallel" | "dask" | "joblib" => Ok(Self::Parallel),
            _ => Err(TrackingError::UnknownEngine(s.to_string())),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

/// Scheduler used by the parallel engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Rayon,
    #[serde(alias = "threading", alias = "multiprocessing")]
    Threads,
}

impl FromStr for Backend {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rayon" => Ok(Self::Rayon),
            "threads" | "threading" | "multiprocessing" => Ok(Self::Threads),
            _ => Err(TrackingError::UnknownBackend(s.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rayon => write!(f, "rayon"),
            Self::Threads => write!(f, "threads"),
        }
    }
}

/// Number of logical CPUs, at least 1
pub fn cpu_count() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Resolve a job count: `-1` is every CPU, `-2` all but one, and so on
pub fn resolve_n_jobs(n_jobs: i32) -> Result<usize> {
    match n_jobs {
        0 => Err(TrackingError::invalid_parameter("n_jobs must be non-zero")),
        n if n > 0 => Ok(n as usize),
        n => {
            let cpus = cpu_count() as i64;
            Ok((cpus + 1 + n as i64).max(1) as usize)
        }
    }
}

/// Apply `func(index, item)` to every item, returning results in input order
///
/// If any call fails one of the errors is returned; the serial engine and
/// the threads backend return the first failing item's error.
pub fn parfor<T, R, F>(
    func: F,
    items: &[T],
    n_jobs: i32,
    engine: Engine,
    backend: Backend,
) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> Result<R> + Sync,
{
    let n_jobs = resolve_n_jobs(n_jobs)?;

    if engine == Engine::Serial || n_jobs == 1 || items.len() <= 1 {
        debug!("parfor: {} items serially", items.len());
        return items.iter().enumerate().map(|(i, t)| func(i, t)).collect();
    }

    debug!("parfor: {} items on {} {} workers", items.len(), n_jobs, backend);
    match backend {
        Backend::Rayon => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_jobs)
                .build()
                .map_err(|e| TrackingError::ThreadPool(e.to_string()))?;
            pool.install(|| {
                items
                    .par_iter()
                    .enumerate()
                    .map(|(i, t)| func(i, t))
                    .collect::<Result<Vec<R>>>()
            })
        }
        Backend::Threads => run_scoped_threads(&func, items, n_jobs),
    }
}

fn run_scoped_threads<T, R, F>(func: &F, items: &[T], n_jobs: usize) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> Result<R> + Sync,
{
    let cursor = AtomicUsize::new(0);
    let n_workers = n_jobs.min(items.len());

    let mut indexed: Vec<(usize, Result<R>)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..n_workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut local = Vec::new();
                    loop {
                        let i = cursor.fetch_add(1, Ordering::Relaxed);
                        if i >= items.len() {
                            break;
                        }
                        local.push((i, func(i, &items[i])));
                    }
                    local
                })
            })
            .collect();

        let mut all = Vec::with_capacity(items.len());
        for h in handles {
            match h.join() {
                Ok(local) => all.extend(local),
                Err(_) => all.push((usize::MAX, Err(TrackingError::ThreadPool("worker thread panicked".to_string())))),
            }
        }
        all
    });

    indexed.sort_by_key(|(i, _)| *i);
    indexed.into_iter().map(|(_, r)| r).collect()
}
