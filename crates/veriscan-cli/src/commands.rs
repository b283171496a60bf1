use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "veriscan")]
#[command(about = "Forensic metadata and risk analysis over file sets", long_about = None)]
pub struct Cli {
    /// Configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze one or more files or directories
    Analyze {
        /// Root paths to analyze
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Override the configured per-session file cap
        #[arg(long)]
        max_files: Option<usize>,
    },
    /// List recent analysis sessions
    Sessions {
        /// Number of sessions to show
        #[arg(short, long, default_value_t = 10)]
        limit: i64,
    },
    /// Show one session in detail
    Details { session_id: String },
    /// List duplicate groups for a session
    Duplicates {
        session_id: String,

        /// Hash algorithm to group by (md5, sha1, sha256, sha512, blake3)
        #[arg(long, default_value = "sha256")]
        algorithm: String,
    },
    /// Show aggregate statistics for a session
    Stats { session_id: String },
    /// Export a session's results as JSON or CSV
    Report {
        session_id: String,

        /// Output format (json or csv)
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete sessions older than the given age
    Cleanup {
        /// Age in days
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// List supported file categories and extensions
    Formats,
    /// Print the effective configuration
    PrintConfig,
}
