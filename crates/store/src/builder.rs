//! SQL for the five query shapes.
//!
//! Every statement is assembled from fixed fragments. Tenant scope, filters,
//! window bounds and cursor boundaries are bound parameters.

use duckdb::types::Value;
use tracegraph_core::cursor::{Boundary, Cursor};
use tracegraph_core::filter::{
    FilterClause, FilterField, OperationOrderField, OrderBy, TimeWindow, TraceOrderField,
};
use tracegraph_core::ids::GraphId;

use crate::predicate::{Predicate, column, ts_value};

#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// What every shape filters on: one tenant, optionally one operation, the
/// caller's clauses and a start-time window.
#[derive(Debug, Clone)]
pub struct Scope {
    pub graph_id: GraphId,
    pub operation_key: Option<String>,
    pub filters: Vec<FilterClause>,
    pub window: TimeWindow,
}

impl Scope {
    fn predicate(&self) -> Predicate {
        let mut predicate = Predicate::default();
        predicate.push_clause(&FilterClause::eq(FilterField::GraphId, self.graph_id.as_str()));
        if let Some(key) = &self.operation_key {
            predicate.push_clause(&FilterClause::eq(FilterField::OperationId, key));
        }
        for clause in &self.filters {
            predicate.push_clause(clause);
        }
        predicate.within(&self.window);
        predicate
    }
}

fn boundary_value(boundary: &Boundary) -> Value {
    match boundary {
        Boundary::Float(v) => Value::Double(*v),
        Boundary::Int(v) => Value::BigInt(*v),
        Boundary::Time(ts) => ts_value(*ts),
    }
}

/// Inclusive composite boundary on `(sort_col, tie_col)`.
fn keyset_condition(
    sort_col: &str,
    tie_col: &str,
    asc: bool,
    cursor: &Cursor,
) -> (String, Vec<Value>) {
    let (strict, tie) = if asc { (">", ">=") } else { ("<", "<=") };
    let v = boundary_value(&cursor.boundary);
    (
        format!("{sort_col} {strict} ? OR ({sort_col} = ? AND {tie_col} {tie} ?)"),
        vec![v.clone(), v, Value::Text(cursor.tie_break.clone())],
    )
}

fn direction(asc: bool) -> &'static str {
    if asc { "ASC" } else { "DESC" }
}

fn trace_order_column(field: TraceOrderField) -> &'static str {
    match field {
        TraceOrderField::Duration => "duration_ns",
        TraceOrderField::StartTime => "start_time",
    }
}

fn operation_order_column(field: OperationOrderField) -> &'static str {
    match field {
        OperationOrderField::Duration => "p95_duration",
        OperationOrderField::Count => "trace_count",
        OperationOrderField::ErrorCount => "error_count",
        OperationOrderField::ErrorPercent => "error_percent",
    }
}

pub fn trace_list(
    scope: &Scope,
    order: OrderBy<TraceOrderField>,
    cursor: Option<&Cursor>,
    limit: usize,
) -> SqlQuery {
    let mut predicate = scope.predicate();
    let sort_col = trace_order_column(order.field);
    if let Some(cursor) = cursor {
        let (sql, params) = keyset_condition(sort_col, "id", order.asc, cursor);
        predicate.and(sql, params);
    }
    let dir = direction(order.asc);
    let sql = format!(
        "SELECT id, operation_key, duration_ns, start_time, end_time, created_at, has_errors
         FROM traces
         WHERE {}
         ORDER BY {sort_col} {dir}, id {dir}
         LIMIT {}",
        predicate.sql(),
        limit + 1
    );
    SqlQuery {
        sql,
        params: predicate.into_params(),
    }
}

const OPERATION_GROUPS: &str = "SELECT operation_key,
                quantile_cont(duration_ns, 0.95) AS p95_duration,
                COUNT(CASE WHEN has_errors THEN 1 END) AS error_count,
                COUNT(*) AS trace_count,
                (100 * COUNT(CASE WHEN has_errors THEN 1 END)) // COUNT(*) AS error_percent
         FROM traces";

pub fn operation_list(
    scope: &Scope,
    order: OrderBy<OperationOrderField>,
    cursor: Option<&Cursor>,
    limit: usize,
) -> SqlQuery {
    let predicate = scope.predicate();
    let sort_col = operation_order_column(order.field);

    let mut outer = Predicate::default();
    if let Some(cursor) = cursor {
        let (sql, params) = keyset_condition(sort_col, "operation_key", order.asc, cursor);
        outer.and(sql, params);
    }

    let dir = direction(order.asc);
    let sql = format!(
        "SELECT operation_key, p95_duration, error_count, trace_count, error_percent
         FROM ({OPERATION_GROUPS} WHERE {} GROUP BY operation_key) ops
         WHERE {}
         ORDER BY {sort_col} {dir}, operation_key {dir}
         LIMIT {}",
        predicate.sql(),
        outer.sql(),
        limit + 1
    );
    let mut params = predicate.into_params();
    params.extend(outer.into_params());
    SqlQuery { sql, params }
}

pub fn rpm_buckets(scope: &Scope, bucket_ms: i64) -> SqlQuery {
    let predicate = scope.predicate();
    let sql = format!(
        "SELECT (epoch_ms(start_time) // ?) * ? AS bucket_ms,
                COUNT(*) AS trace_count,
                COUNT(CASE WHEN has_errors THEN 1 END) AS error_count
         FROM traces
         WHERE {}
         GROUP BY bucket_ms
         ORDER BY bucket_ms",
        predicate.sql()
    );
    let mut params = vec![Value::BigInt(bucket_ms), Value::BigInt(bucket_ms)];
    params.extend(predicate.into_params());
    SqlQuery { sql, params }
}

/// Bin index is `floor(duration / width)` clamped to `bins - 1`, so the maximum
/// lands in the last bin. Each row carries the width used.
pub fn latency_histogram(scope: &Scope, bins: u32) -> SqlQuery {
    let predicate = scope.predicate();
    let sql = format!(
        "WITH filtered AS (
             SELECT duration_ns FROM traces WHERE {}
         ),
         bounds AS (
             SELECT CASE WHEN MAX(duration_ns) > 0 THEN MAX(duration_ns) / ? ELSE 1.0 END AS width
             FROM filtered
         )
         SELECT LEAST(CAST(FLOOR(f.duration_ns / b.width) AS BIGINT), ?) AS bin,
                COUNT(*) AS trace_count,
                b.width
         FROM filtered f CROSS JOIN bounds b
         GROUP BY bin, b.width
         ORDER BY bin",
        predicate.sql()
    );
    let bins = bins.max(1);
    let mut params = predicate.into_params();
    params.push(Value::Double(f64::from(bins)));
    params.push(Value::BigInt(i64::from(bins) - 1));
    SqlQuery { sql, params }
}

pub fn scalar_stats(scope: &Scope) -> SqlQuery {
    let predicate = scope.predicate();
    let sql = format!(
        "SELECT COUNT(*), COUNT(CASE WHEN has_errors THEN 1 END), quantile_cont(duration_ns, 0.95)
         FROM traces
         WHERE {}",
        predicate.sql()
    );
    SqlQuery {
        sql,
        params: predicate.into_params(),
    }
}

/// Distinct non-null values of one text dimension across a whole graph.
pub fn distinct_values(graph_id: &GraphId, field: FilterField) -> Option<SqlQuery> {
    if !matches!(
        field,
        FilterField::SchemaTag | FilterField::ClientName | FilterField::ClientVersion
    ) {
        return None;
    }
    let col = column(field);
    Some(SqlQuery {
        sql: format!(
            "SELECT DISTINCT {col} FROM traces
             WHERE graph_id = ? AND {col} IS NOT NULL
             ORDER BY {col}"
        ),
        params: vec![Value::Text(graph_id.as_str().to_string())],
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tracegraph_core::filter::TraceFilter;

    use super::*;

    fn scope() -> Scope {
        Scope {
            graph_id: GraphId::parse("g1").unwrap(),
            operation_key: Some("op1".into()),
            filters: FilterClause::parse_all(&[TraceFilter::new("clientName", "ne", "web")])
                .unwrap(),
            window: TimeWindow {
                from: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                to: Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap(),
            },
        }
    }

    fn placeholders(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn scope_always_carries_tenant_and_operation() {
        let q = scalar_stats(&scope());
        assert!(q.sql.contains("(graph_id = ?) AND (operation_key = ?)"));
        assert_eq!(q.params[0], Value::Text("g1".into()));
        assert_eq!(q.params[1], Value::Text("op1".into()));
        assert_eq!(q.params[2], Value::Text("web".into()));
        assert_eq!(placeholders(&q.sql), q.params.len());
    }

    #[test]
    fn trace_list_overfetches_and_orders_with_tie_break() {
        let order = OrderBy {
            field: TraceOrderField::Duration,
            asc: false,
        };
        let q = trace_list(&scope(), order, None, 10);
        assert!(q.sql.contains("ORDER BY duration_ns DESC, id DESC"));
        assert!(q.sql.contains("LIMIT 11"));
        assert_eq!(placeholders(&q.sql), q.params.len());
    }

    #[test]
    fn trace_cursor_is_inclusive_composite() {
        let cursor = Cursor {
            boundary: Boundary::Float(12.5),
            tie_break: "abc".into(),
        };
        let asc = OrderBy {
            field: TraceOrderField::Duration,
            asc: true,
        };
        let q = trace_list(&scope(), asc, Some(&cursor), 10);
        assert!(
            q.sql
                .contains("(duration_ns > ? OR (duration_ns = ? AND id >= ?))")
        );
        let tail = &q.params[q.params.len() - 3..];
        assert_eq!(
            tail,
            &[
                Value::Double(12.5),
                Value::Double(12.5),
                Value::Text("abc".into())
            ]
        );
        assert_eq!(placeholders(&q.sql), q.params.len());
    }

    #[test]
    fn operation_list_params_follow_placeholder_order() {
        let cursor = Cursor {
            boundary: Boundary::Int(4),
            tie_break: "op9".into(),
        };
        let order = OrderBy {
            field: OperationOrderField::Count,
            asc: false,
        };
        let q = operation_list(&scope(), order, Some(&cursor), 7);
        assert!(
            q.sql
                .contains("(trace_count < ? OR (trace_count = ? AND operation_key <= ?))")
        );
        assert!(q.sql.contains("LIMIT 8"));
        assert_eq!(q.params.last(), Some(&Value::Text("op9".into())));
        assert_eq!(placeholders(&q.sql), q.params.len());
    }

    #[test]
    fn rpm_binds_bucket_before_filters() {
        let q = rpm_buckets(&scope(), 60_000);
        assert_eq!(q.params[0], Value::BigInt(60_000));
        assert_eq!(q.params[1], Value::BigInt(60_000));
        assert_eq!(q.params[2], Value::Text("g1".into()));
        assert_eq!(placeholders(&q.sql), q.params.len());
    }

    #[test]
    fn histogram_binds_bins_after_filters() {
        let q = latency_histogram(&scope(), 30);
        let n = q.params.len();
        assert_eq!(q.params[n - 2], Value::Double(30.0));
        assert_eq!(q.params[n - 1], Value::BigInt(29));
        assert_eq!(placeholders(&q.sql), n);
    }

    #[test]
    fn injected_text_never_reaches_sql() {
        let mut s = scope();
        s.operation_key = Some("op'; DELETE FROM traces; --".into());
        s.filters = FilterClause::parse_all(&[TraceFilter::new(
            "schemaTag",
            "eq",
            "1 OR 1=1",
        )])
        .unwrap();
        for q in [
            scalar_stats(&s),
            rpm_buckets(&s, 1000),
            latency_histogram(&s, 5),
        ] {
            assert!(!q.sql.contains("DELETE"));
            assert!(!q.sql.contains("1=1"));
        }
    }

    #[test]
    fn distinct_values_only_for_text_dimensions() {
        let g = GraphId::parse("g1").unwrap();
        assert!(distinct_values(&g, FilterField::ClientName).is_some());
        assert!(distinct_values(&g, FilterField::HasErrors).is_none());
        assert!(distinct_values(&g, FilterField::GraphId).is_none());
    }
}
