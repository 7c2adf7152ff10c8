// Append benchmark and crash driver for pmwal
//
// Opens (and recovers) a log, starts the cleanup thread, appends "hello" at
// offset (i * 5) % 5120 for every operation, stops the cleanup thread and
// reports the time per operation. With a non-zero crash rate the cleanup
// thread kills the process at random; running the tool again recovers.
//
// Usage:
//   cargo run --bin pmwal_bench -- <CRASH_RATE> [--log nvmm.dat] [--out out.dat]
//   cargo run --bin pmwal_bench -- 0 --inspect

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use clap::Parser;

use pmwal::config::PmwalConfig;
use pmwal::crash_point::{CrashInjector, CrashMode};
use pmwal::log::{DurableLog, LogError, LogInspector};
use pmwal::target::{FileTarget, TargetTable};

const PAYLOAD: &[u8] = b"hello";
const TARGET_SPAN: u64 = 5120;

#[derive(Parser, Debug)]
#[command(name = "pmwal_bench")]
#[command(about = "Append benchmark and crash-recovery driver for pmwal", long_about = None)]
struct Args {
    /// Crash the cleanup thread with probability 1/N per entry (0 = never)
    #[arg(value_name = "CRASH_RATE")]
    crash_rate: u32,

    /// Backing file of the log region
    #[arg(long, default_value = "nvmm.dat")]
    log: PathBuf,

    /// Target file the entries are applied to
    #[arg(long, default_value = "out.dat")]
    out: PathBuf,

    /// Number of appends
    #[arg(long, default_value_t = 65536)]
    ops: u64,

    /// Number of producer threads
    #[arg(long, default_value_t = 1)]
    threads: u64,

    /// Number of slots (defaults to the configured capacity)
    #[arg(long)]
    capacity: Option<usize>,

    /// Only print the committed entries of the log file and exit
    #[arg(long)]
    inspect: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let result = if args.inspect {
        inspect(&args)
    } else {
        run(&args)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("pmwal_bench: {e}");
            ExitCode::FAILURE
        }
    }
}

fn inspect(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = LogInspector::read(&args.log)?;
    println!(
        "{}: capacity {}, version {}, durable tail {}",
        args.log.display(),
        snapshot.capacity,
        snapshot.version,
        snapshot.tail
    );
    for entry in &snapshot.committed {
        println!(
            "  slot {:>6}  {}  offset {:>8}  {} bytes",
            entry.slot,
            entry.target,
            entry.offset,
            entry.payload.len()
        );
    }
    println!("{} committed entries", snapshot.committed.len());
    Ok(())
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = PmwalConfig::load_from_env()?.to_log_config();
    config.path = Some(args.log.clone());
    if let Some(capacity) = args.capacity {
        config.capacity = capacity;
    }
    config.crash = CrashInjector::new(args.crash_rate, CrashMode::Exit);

    let mut targets = TargetTable::new();
    let out = targets.register(FileTarget::open(&args.out, true)?);

    let (log, report) = DurableLog::open(config, targets)?;
    println!(
        "recovered {} entries (tail was {})",
        report.replayed, report.start_tail
    );

    let log = Arc::new(log);
    let worker = log.start_cleanup()?;

    let threads = args.threads.max(1);
    let start = Instant::now();
    let producers: Vec<_> = (0..threads)
        .map(|t| {
            let log = Arc::clone(&log);
            let ops = args.ops;
            thread::spawn(move || -> Result<(), LogError> {
                let mut i = t;
                while i < ops {
                    log.append(out, PAYLOAD, (i * PAYLOAD.len() as u64) % TARGET_SPAN)?;
                    i += threads;
                }
                Ok(())
            })
        })
        .collect();

    for producer in producers {
        producer
            .join()
            .map_err(|_| "producer thread panicked")??;
    }
    let elapsed = start.elapsed();

    let stats = worker.stop()?;
    log.close()?;

    let ops = args.ops.max(1);
    println!(
        "{} appends in {:.3}s: {:.3} us/op",
        args.ops,
        elapsed.as_secs_f64(),
        elapsed.as_secs_f64() * 1e6 / ops as f64
    );
    println!("cleanup: {stats}");
    Ok(())
}
