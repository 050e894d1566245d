//! Command-line interface definitions for hashgen.
//!
//! Every service setting can also come from the config file or from
//! `HASHGEN_*` environment variables; flags given here win over both.
//!
//! # Example
//!
//! ```bash
//! # Serve on the default address with defaults from the config file
//! hashgen
//!
//! # Bind elsewhere, keep a smaller cache, and skip the artificial delay
//! hashgen --host 0.0.0.0 --port 9000 --capacity 100 --delay-ms 0
//!
//! # Verbose mode for debugging
//! hashgen -v --store ./results.jsonl
//! ```

use clap::Parser;
use std::path::PathBuf;

/// Asynchronous password digest service.
///
/// Accepts passwords over HTTP, computes SHA-512 digests in the background
/// (optionally salted), and serves the results by job id. Results are kept in
/// a bounded in-memory cache backed by an append-only log on disk.
#[derive(Debug, Parser)]
#[command(name = "hashgen")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print fatal errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,

    /// Path to a TOML config file
    ///
    /// Defaults to config.toml in the platform config directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Host name or address to listen on
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// TCP port to listen on
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Path of the append-only result log
    #[arg(long = "store", value_name = "PATH")]
    pub store_path: Option<PathBuf>,

    /// Maximum number of results kept in memory (0 = default)
    #[arg(long = "capacity", value_name = "N")]
    pub cache_capacity: Option<usize>,

    /// Artificial delay before each job computes its digest
    #[arg(long = "delay-ms", value_name = "MS")]
    pub job_delay_ms: Option<u64>,

    /// Salt bytes mixed in when a request asks for salt
    #[arg(long, value_name = "BYTES")]
    pub salt_length: Option<usize>,

    /// Sync the result log to disk after every append
    #[arg(long)]
    pub sync_writes: bool,
}
