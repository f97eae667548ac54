use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::schemas::{ExecutionRecord, NewExecution, ToolOutcome, ToolResultRow};

use super::HistoryError;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS executions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts TEXT NOT NULL,
    request TEXT NOT NULL,

    tier TEXT,
    intent TEXT,
    creative BOOLEAN,
    multi_file BOOLEAN,
    expected_ops INTEGER,

    mode TEXT NOT NULL,
    model_primary TEXT,
    model_plan TEXT,
    model_exec TEXT,

    success BOOLEAN NOT NULL,
    duration_seconds REAL,
    error_kind TEXT,
    error_msg TEXT,

    tool_call_count INTEGER,
    swap_seconds REAL,
    tokens INTEGER,

    session_id TEXT,
    agent_version TEXT
);

CREATE TABLE IF NOT EXISTS tool_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    params_json TEXT,
    success BOOLEAN NOT NULL,
    duration_seconds REAL,
    error_msg TEXT,
    ts TEXT NOT NULL,

    FOREIGN KEY (execution_id) REFERENCES executions(id)
);

CREATE INDEX IF NOT EXISTS idx_executions_ts ON executions(ts);
CREATE INDEX IF NOT EXISTS idx_executions_tier ON executions(tier);
CREATE INDEX IF NOT EXISTS idx_executions_mode ON executions(mode);
CREATE INDEX IF NOT EXISTS idx_executions_success ON executions(success);
"#;

/// Per (mode, tier) routing statistics.
#[derive(Debug, Clone)]
pub struct RoutingStat {
    pub mode: String,
    pub tier: Option<String>,
    pub count: i64,
    pub success_rate: f64,
    pub avg_duration: f64,
}

/// A (tier, multi_file, mode) group whose success rate fell below the
/// misroute threshold.
#[derive(Debug, Clone)]
pub struct MisrouteGroup {
    pub tier: Option<String>,
    pub multi_file: bool,
    pub mode: String,
    pub total: i64,
    pub successes: i64,
    pub success_rate: f64,
    pub avg_duration: f64,
}

#[derive(Debug, Clone, Default)]
pub struct HistorySummary {
    pub total_executions: i64,
    pub success_rate: f64,
    pub avg_duration_seconds: f64,
    pub mode_counts: HashMap<String, i64>,
}

/// Append-only execution log backed by SQLite. Adaptive routing reads it;
/// only the orchestrator writes.
pub struct ExecutionHistory {
    pool: SqlitePool,
}

impl ExecutionHistory {
    /// Open (creating if missing) the store at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        log::info!("Execution history database initialized: {}", path.display());
        Ok(store)
    }

    /// Private in-memory store, used in tests and when history is
    /// disabled but still queried.
    pub async fn in_memory() -> Result<Self, HistoryError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), HistoryError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn log_execution(&self, execution: &NewExecution) -> Result<i64, HistoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO executions (
                ts, request,
                tier, intent, creative, multi_file, expected_ops,
                mode, model_primary, model_plan, model_exec,
                success, duration_seconds, error_kind, error_msg,
                tool_call_count, swap_seconds, tokens,
                session_id, agent_version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&execution.request)
        .bind(&execution.tier)
        .bind(&execution.intent)
        .bind(execution.creative)
        .bind(execution.multi_file)
        .bind(execution.expected_ops)
        .bind(&execution.mode)
        .bind(&execution.model_primary)
        .bind(&execution.model_plan)
        .bind(&execution.model_exec)
        .bind(execution.success)
        .bind(execution.duration_seconds)
        .bind(&execution.error_kind)
        .bind(&execution.error_msg)
        .bind(execution.tool_call_count)
        .bind(execution.swap_seconds)
        .bind(execution.tokens)
        .bind(&execution.session_id)
        .bind(AGENT_VERSION)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        log::info!(
            "Logged execution #{id}: {}, success={}",
            execution.mode,
            execution.success
        );
        Ok(id)
    }

    pub async fn log_tool_result(
        &self,
        execution_id: i64,
        outcome: &ToolOutcome,
    ) -> Result<(), HistoryError> {
        sqlx::query(
            r#"
            INSERT INTO tool_results (
                execution_id, name, params_json, success, duration_seconds, error_msg, ts
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(execution_id)
        .bind(&outcome.name)
        .bind(serde_json::to_string(&outcome.params).ok())
        .bind(outcome.success)
        .bind(outcome.duration.as_secs_f64())
        .bind(&outcome.error)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The most recent `limit` executions, in insertion order.
    pub async fn recent(&self, limit: i64) -> Result<Vec<ExecutionRecord>, HistoryError> {
        let rows = sqlx::query(
            "SELECT * FROM executions ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut records: Vec<ExecutionRecord> =
            rows.iter().map(row_to_record).collect::<Result<_, _>>()?;
        records.reverse();
        Ok(records)
    }

    /// The most recent failures carrying an error kind.
    pub async fn errors(&self, limit: i64) -> Result<Vec<ExecutionRecord>, HistoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM executions
            WHERE success = 0 AND error_kind IS NOT NULL
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect::<Result<_, _>>().map_err(Into::into)
    }

    pub async fn tool_results(
        &self,
        execution_id: i64,
    ) -> Result<Vec<ToolResultRow>, HistoryError> {
        let rows = sqlx::query(
            "SELECT * FROM tool_results WHERE execution_id = ? ORDER BY id",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ToolResultRow {
                    id: row.try_get("id")?,
                    execution_id: row.try_get("execution_id")?,
                    name: row.try_get("name")?,
                    params_json: row.try_get("params_json")?,
                    success: row.try_get("success")?,
                    duration_seconds: row.try_get("duration_seconds")?,
                    error_msg: row.try_get("error_msg")?,
                    ts: row.try_get("ts")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(Into::into)
    }

    pub async fn routing_stats(&self) -> Result<Vec<RoutingStat>, HistoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                mode,
                tier,
                COUNT(*) as count,
                AVG(CASE WHEN success = 1 THEN 1.0 ELSE 0.0 END) as success_rate,
                AVG(COALESCE(duration_seconds, 0.0)) as avg_duration
            FROM executions
            GROUP BY mode, tier
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(RoutingStat {
                    mode: row.try_get("mode")?,
                    tier: row.try_get("tier")?,
                    count: row.try_get("count")?,
                    success_rate: row.try_get("success_rate")?,
                    avg_duration: row.try_get("avg_duration")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(Into::into)
    }

    /// (tier, multi_file, mode) groups with at least `min_samples` rows
    /// and a success rate below `threshold`.
    pub async fn misroutes(
        &self,
        threshold: f64,
        min_samples: i64,
    ) -> Result<Vec<MisrouteGroup>, HistoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                tier,
                multi_file,
                mode,
                COUNT(*) as total,
                SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END) as successes,
                AVG(COALESCE(duration_seconds, 0.0)) as avg_duration
            FROM executions
            GROUP BY tier, multi_file, mode
            HAVING total >= ? AND (CAST(successes AS REAL) / total) < ?
            "#,
        )
        .bind(min_samples)
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let total: i64 = row.try_get("total")?;
                let successes: i64 = row.try_get("successes")?;
                Ok(MisrouteGroup {
                    tier: row.try_get("tier")?,
                    multi_file: row.try_get::<bool, _>("multi_file").unwrap_or(false),
                    mode: row.try_get("mode")?,
                    total,
                    successes,
                    success_rate: successes as f64 / total as f64,
                    avg_duration: row.try_get("avg_duration")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(Into::into)
    }

    pub async fn summary(&self) -> Result<HistorySummary, HistoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total,
                COALESCE(AVG(CASE WHEN success = 1 THEN 1.0 ELSE 0.0 END), 0.0) as success_rate,
                COALESCE(AVG(duration_seconds), 0.0) as avg_duration
            FROM executions
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let mode_rows = sqlx::query("SELECT mode, COUNT(*) as count FROM executions GROUP BY mode")
            .fetch_all(&self.pool)
            .await?;
        let mode_counts = mode_rows
            .iter()
            .map(|row| {
                Ok::<_, sqlx::Error>((row.try_get::<String, _>("mode")?, row.try_get("count")?))
            })
            .collect::<Result<_, _>>()?;

        Ok(HistorySummary {
            total_executions: row.try_get("total")?,
            success_rate: row.try_get("success_rate")?,
            avg_duration_seconds: row.try_get("avg_duration")?,
            mode_counts,
        })
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ExecutionRecord, sqlx::Error> {
    Ok(ExecutionRecord {
        id: row.try_get("id")?,
        ts: row.try_get("ts")?,
        request: row.try_get("request")?,
        tier: row.try_get("tier")?,
        intent: row.try_get("intent")?,
        creative: row.try_get::<bool, _>("creative").unwrap_or(false),
        multi_file: row.try_get::<bool, _>("multi_file").unwrap_or(false),
        expected_ops: row.try_get::<i64, _>("expected_ops").unwrap_or(0),
        mode: row.try_get("mode")?,
        model_primary: row.try_get("model_primary")?,
        model_plan: row.try_get("model_plan")?,
        model_exec: row.try_get("model_exec")?,
        success: row.try_get("success")?,
        duration_seconds: row.try_get::<f64, _>("duration_seconds").unwrap_or(0.0),
        error_kind: row.try_get("error_kind")?,
        error_msg: row.try_get("error_msg")?,
        tool_call_count: row.try_get::<i64, _>("tool_call_count").unwrap_or(0),
        swap_seconds: row.try_get::<f64, _>("swap_seconds").unwrap_or(0.0),
        tokens: row.try_get::<i64, _>("tokens").unwrap_or(0),
        session_id: row.try_get("session_id")?,
        agent_version: row.try_get("agent_version")?,
    })
}
