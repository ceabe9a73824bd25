//! Compiles typed filter clauses into a parameterized SQL condition.
//!
//! Column names come from a closed mapping over [`FilterField`]; every value is
//! bound as a parameter. Caller text never reaches the SQL string.

use chrono::{DateTime, Utc};
use duckdb::types::Value;
use tracegraph_core::filter::{FilterClause, FilterField, FilterOperator, FilterValue, TimeWindow};

pub(crate) fn column(field: FilterField) -> &'static str {
    match field {
        FilterField::SchemaTag => "schema_tag",
        FilterField::ClientName => "client_name",
        FilterField::ClientVersion => "client_version",
        FilterField::HasErrors => "has_errors",
        FilterField::GraphId => "graph_id",
        FilterField::OperationId => "operation_key",
    }
}

pub(crate) fn ts_value(ts: DateTime<Utc>) -> Value {
    Value::Text(ts.to_rfc3339())
}

/// Conjunction of conditions with their bound values, in placeholder order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    parts: Vec<String>,
    params: Vec<Value>,
}

impl Predicate {
    pub fn compile(clauses: &[FilterClause]) -> Self {
        let mut predicate = Self::default();
        for clause in clauses {
            predicate.push_clause(clause);
        }
        predicate
    }

    pub fn push_clause(&mut self, clause: &FilterClause) {
        // `IS DISTINCT FROM` keeps rows whose column is NULL on `ne`.
        let op = match clause.operator {
            FilterOperator::Eq => "=",
            FilterOperator::Ne => "IS DISTINCT FROM",
        };
        let value = match &clause.value {
            FilterValue::Text(v) => Value::Text(v.clone()),
            FilterValue::Bool(v) => Value::Boolean(*v),
        };
        self.and(format!("{} {op} ?", column(clause.field)), [value]);
    }

    pub fn within(&mut self, window: &TimeWindow) {
        self.and(
            "start_time >= ? AND start_time <= ?",
            [ts_value(window.from), ts_value(window.to)],
        );
    }

    pub fn and(&mut self, sql: impl Into<String>, params: impl IntoIterator<Item = Value>) {
        self.parts.push(sql.into());
        self.params.extend(params);
    }

    /// Condition text suitable for a `WHERE` clause. An empty predicate is `TRUE`.
    pub fn sql(&self) -> String {
        if self.parts.is_empty() {
            "TRUE".to_string()
        } else {
            self.parts
                .iter()
                .map(|p| format!("({p})"))
                .collect::<Vec<_>>()
                .join(" AND ")
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn into_params(self) -> Vec<Value> {
        self.params
    }
}
