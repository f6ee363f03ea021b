//! Throughput comparison of the two locking variants.
//!
//! Generates `threads * size` pseudo-random keys, inserts them from a single
//! thread as a baseline, then from `threads` threads into a coarse and a fine
//! table. Each run reports its elapsed time and how many keys went missing.
//!
//! ```text
//! cargo run --release --example hash_table_tester -- --threads 8 --size 50000
//! ```

use bucket_table::logger::initialize_logger;
use bucket_table::{Coarse, Fine, Locking, Table};
use clap::Parser;
use log::info;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(about = "Compare coarse and per-bucket locking under concurrent inserts")]
struct Args {
    /// Number of inserting threads.
    #[arg(short, long, default_value_t = 4)]
    threads: usize,

    /// Keys inserted per thread.
    #[arg(short, long, default_value_t = 25_000)]
    size: usize,

    /// Bucket count of each table.
    #[arg(short, long, default_value_t = bucket_table::DEFAULT_CAPACITY)]
    capacity: usize,

    /// Seed for key generation.
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

struct Run {
    elapsed: Duration,
    missing: usize,
}

fn count_missing<L: Locking>(t: &Table<L>, keys: &[String]) -> usize {
    keys.iter()
        .enumerate()
        .filter(|(i, k)| t.get(k) != Some(*i as u32))
        .count()
}

fn run_sequential(capacity: usize, keys: &[String]) -> Run {
    let t: Table<Coarse> = Table::with_capacity(capacity);
    let start = Instant::now();
    for (i, k) in keys.iter().enumerate() {
        t.add_or_update(k, i as u32);
    }
    let elapsed = start.elapsed();
    let missing = count_missing(&t, keys);
    t.destroy();
    Run { elapsed, missing }
}

fn run_threaded<L: Locking>(capacity: usize, threads: usize, keys: &[String]) -> Run {
    let t: Table<L> = Table::with_capacity(capacity);
    let per = keys.len().div_ceil(threads.max(1)).max(1);
    let start = Instant::now();
    thread::scope(|s| {
        for (c, chunk) in keys.chunks(per).enumerate() {
            let t = &t;
            s.spawn(move || {
                for (i, k) in chunk.iter().enumerate() {
                    t.add_or_update(k, (c * per + i) as u32);
                }
            });
        }
    });
    let elapsed = start.elapsed();
    let missing = count_missing(&t, keys);
    let report = t.destroy();
    info!(
        "{} teardown released {} entries across {} locks",
        L::NAME,
        report.entries_released,
        report.locks_disposed
    );
    Run { elapsed, missing }
}

fn print_run(label: &str, run: &Run) {
    println!("{}: {} usec", label, run.elapsed.as_micros());
    println!("  - {} missing", run.missing);
}

fn main() {
    initialize_logger();
    let args = Args::parse();

    let start = Instant::now();
    // Distinct keys so the expected value of each is its position.
    let keys: Vec<String> = lcg(args.seed)
        .take(args.threads.max(1) * args.size)
        .enumerate()
        .map(|(i, x)| format!("{:08x}-{:016x}", i, x))
        .collect();
    println!("Generation: {} usec", start.elapsed().as_micros());
    info!(
        "generated {} keys for {} threads, capacity {}",
        keys.len(),
        args.threads,
        args.capacity
    );

    print_run("Hash table base", &run_sequential(args.capacity, &keys));
    print_run(
        "Hash table coarse",
        &run_threaded::<Coarse>(args.capacity, args.threads, &keys),
    );
    print_run(
        "Hash table fine",
        &run_threaded::<Fine>(args.capacity, args.threads, &keys),
    );
}
