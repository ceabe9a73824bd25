use chrono::NaiveDateTime;
use duckdb::{Row, params, params_from_iter};
use tracegraph_core::aggregate;
use tracegraph_core::cursor::Cursor;
use tracegraph_core::error::{Result, TracegraphError};
use tracegraph_core::filter::{FilterField, OperationOrderField, OrderBy, TraceOrderField};
use tracegraph_core::ids::GraphId;
use tracegraph_core::model::operation::{LatencyBin, Operation, Stats, TraceFilterOptions};
use tracegraph_core::model::trace::{TraceListItem, TraceRecord};

use crate::Store;
use crate::builder::{self, Scope, SqlQuery};

fn parse_json(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw)
        .map_err(|e| TracegraphError::Store(format!("stored payload is not json: {e}")))
}

fn operation_from_row(row: &Row<'_>) -> duckdb::Result<Operation> {
    let key = row.get::<_, String>(0)?;
    let stats = Stats::from_counts(
        row.get::<_, Option<i64>>(3)?,
        row.get::<_, Option<i64>>(2)?,
        row.get::<_, Option<f64>>(1)?,
    );
    Ok(Operation {
        id: key.clone(),
        key,
        stats,
    })
}

impl Store {
    fn collect<T>(
        &self,
        what: &str,
        query: &SqlQuery,
        map: impl FnMut(&Row<'_>) -> duckdb::Result<T>,
    ) -> Result<Vec<T>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&query.sql)
            .map_err(|e| TracegraphError::Store(format!("prepare {what} failed: {e}")))?;
        let rows = stmt
            .query_map(params_from_iter(query.params.iter()), map)
            .map_err(|e| TracegraphError::Store(format!("query {what} failed: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| TracegraphError::Store(format!("map {what} row failed: {e}")))?);
        }
        Ok(out)
    }

    /// Up to `limit + 1` traces; the caller turns the extra row into a cursor.
    pub fn fetch_trace_page(
        &self,
        scope: &Scope,
        order: OrderBy<TraceOrderField>,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<TraceListItem>> {
        let query = builder::trace_list(scope, order, cursor, limit);
        self.collect("trace list", &query, |row| {
            Ok(TraceListItem {
                id: row.get::<_, String>(0)?,
                key: row.get::<_, String>(1)?,
                duration: row.get::<_, f64>(2)?,
                start_time: row.get::<_, NaiveDateTime>(3)?.and_utc(),
                end_time: row.get::<_, NaiveDateTime>(4)?.and_utc(),
                created_at: row.get::<_, NaiveDateTime>(5)?.and_utc(),
                has_errors: row.get::<_, bool>(6)?,
            })
        })
    }

    /// Up to `limit + 1` operation groups.
    pub fn fetch_operation_page(
        &self,
        scope: &Scope,
        order: OrderBy<OperationOrderField>,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<Operation>> {
        let query = builder::operation_list(scope, order, cursor, limit);
        self.collect("operation list", &query, operation_from_row)
    }

    /// Sparse `(bucket_start_ms, count, error_count)` rows, ascending.
    pub fn fetch_rpm_buckets(&self, scope: &Scope, bucket_ms: i64) -> Result<Vec<(i64, i64, i64)>> {
        let query = builder::rpm_buckets(scope, bucket_ms);
        self.collect("rpm", &query, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })
    }

    pub fn fetch_latency_bins(&self, scope: &Scope, bins: u32) -> Result<Vec<LatencyBin>> {
        let query = builder::latency_histogram(scope, bins);
        let rows = self.collect("latency histogram", &query, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;
        let width = rows.first().map(|(_, _, w)| *w).unwrap_or(1.0);
        let counts = rows
            .into_iter()
            .map(|(bin, count, _)| (bin, count))
            .collect::<Vec<_>>();
        Ok(aggregate::latency_bins(&counts, width))
    }

    pub fn fetch_stats(&self, scope: &Scope) -> Result<Stats> {
        let query = builder::scalar_stats(scope);
        let mut rows = self.collect("stats", &query, |row| {
            Ok(Stats::from_counts(
                row.get::<_, Option<i64>>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, Option<f64>>(2)?,
            ))
        })?;
        Ok(rows.pop().unwrap_or_default())
    }

    pub fn fetch_filter_options(&self, graph_id: &GraphId) -> Result<TraceFilterOptions> {
        let mut options = TraceFilterOptions {
            has_errors: vec!["true".to_string(), "false".to_string()],
            ..TraceFilterOptions::default()
        };
        for (field, slot) in [
            (FilterField::SchemaTag, &mut options.schema_tag),
            (FilterField::ClientName, &mut options.client_name),
            (FilterField::ClientVersion, &mut options.client_version),
        ] {
            if let Some(query) = builder::distinct_values(graph_id, field) {
                *slot = self.collect(field.name(), &query, |row| row.get::<_, String>(0))?;
            }
        }
        Ok(options)
    }

    pub fn get_trace(&self, trace_id: &str) -> Result<Option<TraceRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, graph_id, operation_key, duration_ns, start_time, end_time, created_at,
                        root, details, client_name, client_version, schema_tag, has_errors
                 FROM traces
                 WHERE id = ?",
            )
            .map_err(|e| TracegraphError::Store(format!("prepare trace failed: {e}")))?;

        let rows = stmt
            .query_map(params![trace_id], |row| {
                Ok((
                    TraceRecord {
                        id: row.get::<_, String>(0)?,
                        graph_id: row.get::<_, String>(1)?,
                        key: row.get::<_, String>(2)?,
                        duration: row.get::<_, f64>(3)?,
                        start_time: row.get::<_, NaiveDateTime>(4)?.and_utc(),
                        end_time: row.get::<_, NaiveDateTime>(5)?.and_utc(),
                        created_at: row.get::<_, NaiveDateTime>(6)?.and_utc(),
                        root: serde_json::Value::Null,
                        details: None,
                        client_name: row.get::<_, Option<String>>(9)?,
                        client_version: row.get::<_, Option<String>>(10)?,
                        schema_tag: row.get::<_, Option<String>>(11)?,
                        has_errors: row.get::<_, bool>(12)?,
                    },
                    row.get::<_, String>(7)?,
                    row.get::<_, Option<String>>(8)?,
                ))
            })
            .map_err(|e| TracegraphError::Store(format!("query trace failed: {e}")))?;

        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let (mut record, root, details) =
            row.map_err(|e| TracegraphError::Store(format!("map trace failed: {e}")))?;
        record.root = parse_json(&root)?;
        record.details = details.as_deref().map(parse_json).transpose()?;
        Ok(Some(record))
    }
}
