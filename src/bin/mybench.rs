//! Multithreaded trace-replay harness: reads an `oracleGeneral` trace and
//! drives `n_threads` OS threads of `get`-only load against one shared
//! [`cachecore::Cache`].

use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use cachecore::cache::{Cache, CacheConfig};
use cachecore::policy::PolicyKind;
use cachecore::trace::OracleGeneralReader;
use clap::Parser;

/// Replay a trace file against the cache core with one thread per
/// `n_threads`, reporting aggregate hit/miss counts.
#[derive(Parser, Debug)]
#[command(name = "mybench", about = "Trace-driven cache core benchmark")]
struct Cli {
    /// Path to an oracleGeneral-format trace file.
    trace_path: std::path::PathBuf,

    /// Cache size budget in megabytes.
    cache_size_mb: u64,

    /// log2 of the access index's bucket count.
    #[arg(default_value_t = 16)]
    hashpower: u32,

    /// Number of replay threads, each opening its own reader over the trace.
    #[arg(default_value_t = 1)]
    n_threads: u32,
}

#[derive(Default)]
struct ThreadStats {
    n_get: AtomicU64,
    n_get_miss: AtomicU64,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match CacheConfig::builder()
        .cache_size_bytes((cli.cache_size_mb as usize) * 1024 * 1024)
        .hash_buckets_power(cli.hashpower)
        .hash_locks_power(cli.hashpower.min(10))
        .policy(PolicyKind::S3Fifo)
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            log::error!("invalid cache configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cache = match Cache::new(config) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            log::error!("failed to build cache: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Fail fast if the trace can't even be opened once, matching the
    // original reader's "exit nonzero on I/O failure" contract.
    if let Err(e) = OracleGeneralReader::open(&cli.trace_path) {
        log::error!("unable to open trace '{}': {e}", cli.trace_path.display());
        return ExitCode::FAILURE;
    }

    let stats = Arc::new(ThreadStats::default());
    let start_barrier = Arc::new(Barrier::new(cli.n_threads as usize));

    let mut handles = Vec::with_capacity(cli.n_threads as usize);
    for thread_id in 0..cli.n_threads {
        let cache = Arc::clone(&cache);
        let stats = Arc::clone(&stats);
        let barrier = Arc::clone(&start_barrier);
        let trace_path = cli.trace_path.clone();

        handles.push(thread::spawn(move || {
            let mut reader = match OracleGeneralReader::open(&trace_path) {
                Ok(r) => r,
                Err(e) => {
                    log::error!("thread {thread_id} failed to open trace: {e}");
                    return;
                }
            };

            barrier.wait();

            while let Some(req) = reader.next_request() {
                cache.advance_clock(req.timestamp);
                stats.n_get.fetch_add(1, Ordering::Relaxed);
                if cache.find(req.key.as_bytes()).is_none() {
                    stats.n_get_miss.fetch_add(1, Ordering::Relaxed);
                    let _ = cache.allocate_and_insert(
                        req.key.as_bytes(),
                        req.val_len,
                        req.ttl,
                        req.timestamp,
                    );
                }
            }
        }));
    }

    for handle in handles {
        let _ = handle.join();
    }

    let n_get = stats.n_get.load(Ordering::Relaxed);
    let n_miss = stats.n_get_miss.load(Ordering::Relaxed);
    let hit_rate = if n_get == 0 {
        0.0
    } else {
        1.0 - (n_miss as f64 / n_get as f64)
    };
    let mem = cache.memory_stats();
    log::info!(
        "requests={n_get} misses={n_miss} hit_rate={hit_rate:.4} used_bytes={} budget_bytes={} keys={}",
        mem.used_bytes,
        mem.budget_bytes,
        mem.num_keys,
    );
    println!(
        "requests={n_get} misses={n_miss} hit_rate={hit_rate:.4} used_bytes={} budget_bytes={} keys={}",
        mem.used_bytes, mem.budget_bytes, mem.num_keys,
    );

    ExitCode::SUCCESS
}
