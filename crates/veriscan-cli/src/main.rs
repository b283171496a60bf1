mod commands;
mod logging;
mod progress;
mod report;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;
use tracing::error;
use veriscan_core::classify::FileCategory;
use veriscan_core::hasher::HashAlgorithm;
use veriscan_core::storage::Database;
use veriscan_core::{AnalysisManager, AppConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    let config = match veriscan_core::config::load_configuration(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    match args.command {
        Some(Commands::Analyze { paths, max_files }) => {
            if let Err(err) = run_analyze(&config, paths, max_files) {
                error!("Error: {}", err);
                process::exit(1);
            }
        }
        Some(Commands::Sessions { limit }) => {
            if let Err(err) = run_sessions(&config, limit) {
                error!("Error: {}", err);
            }
        }
        Some(Commands::Details { session_id }) => {
            if let Err(err) = run_details(&config, &session_id) {
                error!("Error: {}", err);
            }
        }
        Some(Commands::Duplicates {
            session_id,
            algorithm,
        }) => {
            if let Err(err) = run_duplicates(&config, &session_id, &algorithm) {
                error!("Error: {}", err);
            }
        }
        Some(Commands::Stats { session_id }) => {
            if let Err(err) = run_stats(&config, &session_id) {
                error!("Error: {}", err);
            }
        }
        Some(Commands::Report {
            session_id,
            format,
            output,
        }) => {
            let db = Database::open(&config.database_path)?;
            if let Err(err) = report::export_session(&db, &session_id, &format, output.as_deref())
            {
                error!("Error: {}", err);
            }
        }
        Some(Commands::Cleanup { days }) => {
            match prompt_confirm(
                &format!("Delete all sessions older than {} days?", days),
                Some(false),
            ) {
                Ok(true) => {
                    let db = Database::open(&config.database_path)?;
                    match db.cleanup_old_sessions(days) {
                        Ok(removed) => println!("{} sessions removed", removed),
                        Err(err) => error!("Error cleaning up sessions: {}", err),
                    }
                }
                _ => process::exit(0),
            }
        }
        Some(Commands::Formats) => print_formats(),
        Some(Commands::PrintConfig) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn run_analyze(
    config: &AppConfig,
    paths: Vec<PathBuf>,
    max_files: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = config.clone();
    if let Some(cap) = max_files {
        config.max_files_per_analysis = cap;
    }

    let manager = AnalysisManager::new(config);
    let reporter = CliReporter::new();
    let summary = manager.run_session(&paths, &reporter)?;

    println!();
    println!(
        "Session {} {}",
        summary.session_id.bold(),
        summary.status.as_str().cyan()
    );
    println!(
        "  {} discovered, {} ok, {} failed, {} duplicate groups",
        summary.discovered_files,
        format!("{}", summary.successful_files).green(),
        format!("{}", summary.failed_files).red(),
        format!("{}", summary.duplicate_groups).yellow(),
    );
    println!(
        "  {} bytes in {:.2}s ({:.0} files/s)",
        summary.total_bytes,
        summary.duration.as_secs_f64(),
        summary.files_per_second,
    );
    for (category, count) in &summary.by_category {
        println!("    {:>10}: {}", category, count);
    }

    Ok(())
}

fn run_sessions(config: &AppConfig, limit: i64) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open(&config.database_path)?;
    let sessions = db.recent_sessions(limit)?;
    if sessions.is_empty() {
        println!("No sessions recorded yet.");
        return Ok(());
    }
    for session in sessions {
        println!(
            "{}  {}  {} files ({} failed)  {}",
            session.id.bold(),
            session.status.as_str(),
            session.processed_files,
            session.failed_files,
            session.started_at,
        );
    }
    Ok(())
}

fn run_details(config: &AppConfig, session_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open(&config.database_path)?;
    let Some(session) = db.get_session(session_id)? else {
        println!("Session {} not found", session_id);
        return Ok(());
    };
    println!("Session:   {}", session.id.bold());
    println!("Status:    {}", session.status.as_str());
    println!("Roots:     {}", session.root_paths.join(", "));
    println!("Started:   {}", session.started_at);
    println!(
        "Ended:     {}",
        session.ended_at.as_deref().unwrap_or("(running)")
    );
    println!(
        "Files:     {} total, {} ok, {} failed",
        session.total_files, session.successful_files, session.failed_files
    );
    if let Some(message) = &session.error_message {
        println!("Error:     {}", message.red());
    }
    Ok(())
}

fn run_duplicates(
    config: &AppConfig,
    session_id: &str,
    algorithm: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(algorithm) = HashAlgorithm::parse(algorithm) else {
        return Err(format!("unknown hash algorithm: {}", algorithm).into());
    };
    let db = Database::open(&config.database_path)?;
    let groups = db.find_duplicates(session_id, algorithm)?;
    if groups.is_empty() {
        println!("No duplicates found.");
        return Ok(());
    }
    for group in groups {
        println!(
            "{} {} ({} files)",
            group.algorithm.cyan(),
            group.digest,
            group.paths.len()
        );
        for path in &group.paths {
            println!("    {}", path);
        }
    }
    Ok(())
}

fn run_stats(config: &AppConfig, session_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open(&config.database_path)?;
    let stats = db.statistics(session_id)?;
    println!(
        "{} results: {} ok, {} failed ({:.1}% success)",
        stats.total_results,
        format!("{}", stats.successful).green(),
        format!("{}", stats.failed).red(),
        stats.success_rate,
    );
    println!(
        "{} bytes analyzed, {:.1} ms average per file, {} parse skips",
        stats.total_bytes, stats.average_duration_ms, stats.parse_skips
    );
    if !stats.by_category.is_empty() {
        println!("By category:");
        for (category, count) in &stats.by_category {
            println!("    {:>10}: {}", category, count);
        }
    }
    if !stats.largest_files.is_empty() {
        println!("Largest files:");
        for file in &stats.largest_files {
            println!("    {:>12}  {}", file.file_size, file.file_path);
        }
    }
    Ok(())
}

fn print_formats() {
    for category in [
        FileCategory::Image,
        FileCategory::Document,
        FileCategory::Media,
        FileCategory::Network,
        FileCategory::Security,
    ] {
        let extensions = category.extensions().join(", ");
        println!("{:>10}: {}", category.as_str().bold(), extensions);
    }
    println!(
        "{:>10}: everything else (basic metadata and digests only)",
        FileCategory::Generic.as_str().bold()
    );
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
