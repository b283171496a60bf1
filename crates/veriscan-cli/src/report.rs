use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use veriscan_core::storage::models::ResultFilter;
use veriscan_core::storage::Database;

/// Export a session's statistics and full result listing. Rendering beyond
/// structured JSON/CSV is left to downstream report tooling.
pub fn export_session(
    db: &Database,
    session_id: &str,
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    let results = db
        .get_results(session_id, &ResultFilter::default())
        .context("loading session results")?;
    let statistics = db.statistics(session_id).context("loading statistics")?;

    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(File::create(path).context("creating output file")?),
        None => Box::new(io::stdout()),
    };

    match format {
        "json" => {
            let document = serde_json::json!({
                "session_id": session_id,
                "statistics": statistics,
                "results": results,
            });
            serde_json::to_writer_pretty(&mut writer, &document)?;
            writeln!(writer)?;
        }
        "csv" => {
            let mut csv_writer = csv::Writer::from_writer(writer);
            csv_writer.write_record([
                "file_path",
                "file_name",
                "category",
                "status",
                "file_size",
                "duration_ms",
                "parse_skips",
                "digests",
                "error_message",
            ])?;
            for result in &results {
                let digests = result
                    .digests
                    .iter()
                    .map(|(algorithm, digest)| format!("{}={}", algorithm, digest))
                    .collect::<Vec<_>>()
                    .join(";");
                csv_writer.write_record([
                    result.file_path.as_str(),
                    result.file_name.as_str(),
                    result.category.as_str(),
                    result.status.as_str(),
                    &result.file_size.to_string(),
                    &result.duration_ms.to_string(),
                    &result.parse_skips.to_string(),
                    &digests,
                    result.error_message.as_deref().unwrap_or(""),
                ])?;
            }
            csv_writer.flush()?;
        }
        other => bail!("unsupported report format: {}", other),
    }

    Ok(())
}
