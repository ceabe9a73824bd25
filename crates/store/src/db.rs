use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::Connection;
use tracegraph_core::error::{Result, TracegraphError};
use tracegraph_core::query::StatusResponse;

use crate::schema::SCHEMA_SQL;

/// Handle to the trace database. Clones share one connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    db_path: String,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| TracegraphError::Io(format!("failed to create db dir: {e}")))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| TracegraphError::StoreUnavailable(format!("failed to open duckdb: {e}")))?;
        conn.execute_batch("PRAGMA threads=4;")
            .map_err(|e| TracegraphError::Store(format!("failed to set pragmas: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| TracegraphError::Store(format!("failed to initialize schema: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.display().to_string(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            TracegraphError::StoreUnavailable(format!("failed to open in-memory db: {e}"))
        })?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| TracegraphError::Store(format!("failed to initialize schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: ":memory:".to_string(),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TracegraphError::StoreUnavailable("store mutex poisoned".to_string()))
    }

    pub fn status(&self) -> Result<StatusResponse> {
        let conn = self.conn()?;

        let traces_count = scalar_usize(&conn, "SELECT COUNT(*) FROM traces")?;
        let graphs_count = scalar_usize(&conn, "SELECT COUNT(DISTINCT graph_id) FROM traces")?;

        let oldest_start_time = scalar_ts(&conn, "SELECT MIN(start_time) FROM traces")?;
        let newest_start_time = scalar_ts(&conn, "SELECT MAX(start_time) FROM traces")?;

        let db_size_bytes = if self.db_path == ":memory:" {
            0
        } else {
            fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StatusResponse {
            db_path: self.db_path.clone(),
            db_size_bytes,
            traces_count,
            graphs_count,
            oldest_start_time,
            newest_start_time,
        })
    }
}

fn scalar_usize(conn: &Connection, sql: &str) -> Result<usize> {
    conn.query_row(sql, [], |row| row.get::<_, i64>(0))
        .map(|v| v as usize)
        .map_err(|e| TracegraphError::Store(format!("query failed: {e}")))
}

fn scalar_ts(conn: &Connection, sql: &str) -> Result<Option<DateTime<Utc>>> {
    conn.query_row(sql, [], |row| row.get::<_, Option<NaiveDateTime>>(0))
        .map(|opt| opt.map(|dt| dt.and_utc()))
        .map_err(|e| TracegraphError::Store(format!("query failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_initializes() {
        let store = Store::open_in_memory().unwrap();
        let status = store.status().unwrap();
        assert_eq!(status.traces_count, 0);
        assert_eq!(status.graphs_count, 0);
        assert_eq!(status.oldest_start_time, None);
    }
}
