use super::models::*;
use super::sqlite::Database;
use crate::hasher::HashAlgorithm;
use rusqlite::{params, Result, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use tracing::debug;

impl Database {
    // ── Sessions ─────────────────────────────────────────────────

    pub fn create_session(
        &self,
        session_id: &str,
        root_paths: &[String],
        config_json: &str,
    ) -> Result<()> {
        let paths_json = serde_json::to_string(root_paths).unwrap_or_default();
        let now = chrono::Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO analysis_session (session_id, root_paths, config_json, started_at, status) \
                 VALUES (?1, ?2, ?3, ?4, 'running')",
                params![session_id, paths_json, config_json, now],
            )?;
            Ok(())
        })?;
        debug!("Created session {}", session_id);
        Ok(())
    }

    pub fn update_session_progress(
        &self,
        session_id: &str,
        total: i64,
        processed: i64,
        successful: i64,
        failed: i64,
    ) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE analysis_session SET total_files = ?1, processed_files = ?2, \
                 successful_files = ?3, failed_files = ?4 WHERE session_id = ?5",
                params![total, processed, successful, failed, session_id],
            )?;
            Ok(())
        })
    }

    /// Finalize a session. The status transition out of 'running' happens
    /// exactly once: a session already closed is left untouched.
    pub fn close_session(
        &self,
        session_id: &str,
        status: SessionStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            let changed = conn.execute(
                "UPDATE analysis_session SET status = ?1, ended_at = ?2, error_message = ?3 \
                 WHERE session_id = ?4 AND status = 'running'",
                params![status.as_str(), now, error_message, session_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, root_paths, config_json, started_at, ended_at, status, \
                        total_files, processed_files, successful_files, failed_files, error_message \
                 FROM analysis_session WHERE session_id = ?1",
            )?;
            let mut rows = stmt.query_map(params![session_id], session_from_row)?;
            rows.next().transpose()
        })
    }

    /// List sessions newest-first.
    pub fn recent_sessions(&self, limit: i64) -> Result<Vec<Session>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, root_paths, config_json, started_at, ended_at, status, \
                        total_files, processed_files, successful_files, failed_files, error_message \
                 FROM analysis_session ORDER BY started_at DESC LIMIT ?1",
            )?;
            let sessions = stmt
                .query_map(params![limit], session_from_row)?
                .collect::<Result<Vec<_>>>()?;
            Ok(sessions)
        })
    }

    /// Delete sessions older than `days_old` days. Results and digests go
    /// with them via cascade. Returns the number of sessions removed.
    pub fn cleanup_old_sessions(&self, days_old: i64) -> Result<usize> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(days_old)).to_rfc3339();
        let removed = self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM analysis_session WHERE started_at < ?1",
                params![cutoff],
            )
        })?;
        if removed > 0 {
            debug!("Removed {} sessions older than {} days", removed, days_old);
        }
        Ok(removed)
    }

    // ── Results ──────────────────────────────────────────────────

    /// Append one result row plus its digest rows in a single transaction.
    /// Safe for concurrent callers; rows for the same session never
    /// interleave within the transaction boundary.
    pub fn record_result(&self, result: &AnalysisResult) -> Result<i64> {
        let metadata_json = result.metadata.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO analysis_result \
                 (session_id, file_path, file_name, category, file_size, status, \
                  error_message, parse_skips, duration_ms, metadata_json, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    result.session_id,
                    result.file_path,
                    result.file_name,
                    result.category.as_str(),
                    result.file_size as i64,
                    result.status.as_str(),
                    result.error_message,
                    result.parse_skips as i64,
                    result.duration_ms as i64,
                    metadata_json,
                    now,
                ],
            )?;
            let result_id = tx.last_insert_rowid();
            {
                let mut digest_stmt = tx.prepare_cached(
                    "INSERT INTO result_digest (result_id, session_id, algorithm, digest) \
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for (algorithm, digest) in &result.digests {
                    digest_stmt.execute(params![result_id, result.session_id, algorithm, digest])?;
                }
            }
            tx.commit()?;
            Ok(result_id)
        })
    }

    pub fn get_results(&self, session_id: &str, filter: &ResultFilter) -> Result<Vec<StoredResult>> {
        let mut results = self.with_connection(|conn| {
            // ?2 is the empty string when no category filter applies.
            let mut query = String::from(
                "SELECT id, session_id, file_path, file_name, category, file_size, status, \
                        error_message, parse_skips, duration_ms, metadata_json, created_at \
                 FROM analysis_result \
                 WHERE session_id = ?1 AND (?2 = '' OR category = ?2)",
            );
            if filter.success_only {
                query.push_str(" AND status = 'success'");
            }
            query.push_str(" ORDER BY id LIMIT ?3 OFFSET ?4");

            let limit = filter.limit.unwrap_or(i64::MAX);
            let category = filter.category.map(|c| c.as_str()).unwrap_or("");

            let mut stmt = conn.prepare(&query)?;
            let rows = stmt
                .query_map(
                    params![session_id, category, limit, filter.offset],
                    stored_result_from_row,
                )?
                .collect::<Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        // Attach digests in one pass instead of one query per result.
        let digests = self.digests_for_session(session_id)?;
        for result in results.iter_mut() {
            if let Some(map) = digests.get(&result.id) {
                result.digests = map.clone();
            }
        }
        Ok(results)
    }

    fn digests_for_session(
        &self,
        session_id: &str,
    ) -> Result<BTreeMap<i64, BTreeMap<String, String>>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT result_id, algorithm, digest FROM result_digest WHERE session_id = ?1",
            )?;
            let mut grouped: BTreeMap<i64, BTreeMap<String, String>> = BTreeMap::new();
            let rows = stmt.query_map(params![session_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            for row in rows {
                let (result_id, algorithm, digest) = row?;
                grouped.entry(result_id).or_default().insert(algorithm, digest);
            }
            Ok(grouped)
        })
    }

    // ── Duplicates ───────────────────────────────────────────────

    /// Group successful results by the chosen algorithm's digest value.
    /// Failed rows carry no usable digest and are excluded. Only groups of
    /// two or more paths are returned.
    pub fn find_duplicates(
        &self,
        session_id: &str,
        algorithm: HashAlgorithm,
    ) -> Result<Vec<DuplicateGroup>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT rd.digest, ar.file_path \
                 FROM result_digest rd \
                 JOIN analysis_result ar ON ar.id = rd.result_id \
                 WHERE rd.session_id = ?1 AND rd.algorithm = ?2 AND ar.status = 'success' \
                 ORDER BY rd.digest, ar.file_path",
            )?;
            let rows = stmt
                .query_map(params![session_id, algorithm.as_str()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>>>()?;

            let mut groups: Vec<DuplicateGroup> = Vec::new();
            for (digest, path) in rows {
                match groups.last_mut() {
                    Some(group) if group.digest == digest => group.paths.push(path),
                    _ => groups.push(DuplicateGroup {
                        algorithm: algorithm.as_str().to_string(),
                        digest,
                        paths: vec![path],
                    }),
                }
            }
            groups.retain(|group| group.paths.len() > 1);
            Ok(groups)
        })
    }

    // ── Statistics ───────────────────────────────────────────────

    /// Aggregate counts, byte totals, per-category breakdown, and timing for
    /// a session. Read-only: calling it twice without new writes yields
    /// identical output.
    pub fn statistics(&self, session_id: &str) -> Result<SessionStatistics> {
        self.with_connection(|conn| {
            let (total_results, successful, failed, average_duration_ms, total_bytes, parse_skips) =
                conn.query_row(
                    "SELECT COUNT(*), \
                            COALESCE(SUM(CASE WHEN status != 'failed' THEN 1 ELSE 0 END), 0), \
                            COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0), \
                            COALESCE(AVG(duration_ms), 0.0), \
                            COALESCE(SUM(file_size), 0), \
                            COALESCE(SUM(parse_skips), 0) \
                     FROM analysis_result WHERE session_id = ?1",
                    params![session_id],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, f64>(3)?,
                            row.get::<_, i64>(4)?,
                            row.get::<_, i64>(5)?,
                        ))
                    },
                )?;

            let mut by_category = BTreeMap::new();
            let mut stmt = conn.prepare(
                "SELECT category, COUNT(*) FROM analysis_result \
                 WHERE session_id = ?1 GROUP BY category",
            )?;
            let rows = stmt.query_map(params![session_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (category, count) = row?;
                by_category.insert(category, count);
            }

            let mut stmt = conn.prepare(
                "SELECT file_path, file_size FROM analysis_result \
                 WHERE session_id = ?1 AND status != 'failed' \
                 ORDER BY file_size DESC, file_path LIMIT 10",
            )?;
            let largest_files = stmt
                .query_map(params![session_id], |row| {
                    Ok(LargestFile {
                        file_path: row.get(0)?,
                        file_size: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>>>()?;

            let success_rate = if total_results > 0 {
                successful as f64 / total_results as f64 * 100.0
            } else {
                0.0
            };

            Ok(SessionStatistics {
                total_results,
                successful,
                failed,
                success_rate,
                average_duration_ms,
                total_bytes,
                parse_skips,
                by_category,
                largest_files,
            })
        })
    }
}

fn session_from_row(row: &rusqlite::Row<'_>) -> Result<Session> {
    let status_raw: String = row.get(5)?;
    let root_paths_raw: String = row.get(1)?;
    Ok(Session {
        id: row.get(0)?,
        root_paths: serde_json::from_str(&root_paths_raw).unwrap_or_default(),
        config_json: row.get(2)?,
        started_at: row.get(3)?,
        ended_at: row.get(4)?,
        status: SessionStatus::parse(&status_raw).unwrap_or(SessionStatus::Failed),
        total_files: row.get(6)?,
        processed_files: row.get(7)?,
        successful_files: row.get(8)?,
        failed_files: row.get(9)?,
        error_message: row.get(10)?,
    })
}

fn stored_result_from_row(row: &rusqlite::Row<'_>) -> Result<StoredResult> {
    let metadata_raw: Option<String> = row.get(10)?;
    let metadata = metadata_raw
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or(serde_json::Value::Null);
    Ok(StoredResult {
        id: row.get(0)?,
        session_id: row.get(1)?,
        file_path: row.get(2)?,
        file_name: row.get(3)?,
        category: row.get(4)?,
        file_size: row.get(5)?,
        status: row.get(6)?,
        error_message: row.get(7)?,
        digests: BTreeMap::new(),
        metadata,
        parse_skips: row.get(8)?,
        duration_ms: row.get(9)?,
        created_at: row.get(11)?,
    })
}
