use chrono::Utc;
use duckdb::params;
use tracegraph_core::error::{Result, TracegraphError};
use tracegraph_core::ids::{GraphId, TraceId};
use tracegraph_core::model::trace::TraceInput;

use crate::Store;

fn validate(index: usize, trace: &TraceInput) -> Result<()> {
    if trace.key.trim().is_empty() {
        return Err(TracegraphError::InvalidArgument(format!(
            "trace {index}: empty operation key"
        )));
    }
    if !trace.duration_ns.is_finite() || trace.duration_ns < 0.0 {
        return Err(TracegraphError::InvalidArgument(format!(
            "trace {index}: duration must be a non-negative number"
        )));
    }
    if trace.end_time < trace.start_time {
        return Err(TracegraphError::InvalidArgument(format!(
            "trace {index}: end_time precedes start_time"
        )));
    }
    Ok(())
}

fn to_json(value: &serde_json::Value) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| TracegraphError::Internal(format!("encode payload failed: {e}")))
}

impl Store {
    /// Inserts a batch for one graph. Either every trace is stored or none is.
    /// Returned ids follow input order.
    pub fn insert_traces(&self, graph_id: &GraphId, traces: &[TraceInput]) -> Result<Vec<TraceId>> {
        if traces.is_empty() {
            return Ok(Vec::new());
        }
        for (i, trace) in traces.iter().enumerate() {
            validate(i, trace)?;
        }

        let created_at = Utc::now().to_rfc3339();
        let mut ids = Vec::with_capacity(traces.len());

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| TracegraphError::Store(format!("begin tx failed: {e}")))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO traces
                     (id, graph_id, operation_key, duration_ns, start_time, end_time, root, details,
                      client_name, client_version, schema_tag, has_errors, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .map_err(|e| TracegraphError::Store(format!("prepare insert traces failed: {e}")))?;

            for trace in traces {
                let id = TraceId::new();
                let details = trace.details.as_ref().map(to_json).transpose()?;
                stmt.execute(params![
                    id.to_string(),
                    graph_id.as_str(),
                    trace.key,
                    trace.duration_ns,
                    trace.start_time.to_rfc3339(),
                    trace.end_time.to_rfc3339(),
                    to_json(&trace.root)?,
                    details,
                    trace.client_name,
                    trace.client_version,
                    trace.schema_tag,
                    trace.has_errors,
                    created_at,
                ])
                .map_err(|e| TracegraphError::Store(format!("insert trace failed: {e}")))?;
                ids.push(id);
            }
        }

        tx.commit()
            .map_err(|e| TracegraphError::Store(format!("commit traces failed: {e}")))?;
        Ok(ids)
    }
}
