use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TracegraphError};

/// Filter clause as it arrives over the wire. Nothing here is trusted until it
/// has been turned into a [`FilterClause`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraceFilter {
    pub field: String,
    pub operator: String,
    pub value: String,
}

impl TraceFilter {
    pub fn new(field: &str, operator: &str, value: &str) -> Self {
        Self {
            field: field.to_string(),
            operator: operator.to_string(),
            value: value.to_string(),
        }
    }

    /// Parses `field=value` / `field!=value` as written on the command line.
    pub fn parse(input: &str) -> Result<Self> {
        let (field, operator, value) = if let Some((f, v)) = input.split_once("!=") {
            (f, "ne", v)
        } else if let Some((f, v)) = input.split_once('=') {
            (f, "eq", v)
        } else {
            return Err(TracegraphError::InvalidFilter(format!(
                "expected field=value or field!=value, got {input}"
            )));
        };
        Ok(Self::new(field.trim(), operator, value.trim()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FilterField {
    SchemaTag,
    ClientName,
    ClientVersion,
    HasErrors,
    GraphId,
    OperationId,
}

impl FilterField {
    pub fn name(self) -> &'static str {
        match self {
            Self::SchemaTag => "schemaTag",
            Self::ClientName => "clientName",
            Self::ClientVersion => "clientVersion",
            Self::HasErrors => "hasErrors",
            Self::GraphId => "graphId",
            Self::OperationId => "operationId",
        }
    }
}

impl FromStr for FilterField {
    type Err = TracegraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "schemaTag" => Ok(Self::SchemaTag),
            "clientName" => Ok(Self::ClientName),
            "clientVersion" => Ok(Self::ClientVersion),
            "hasErrors" => Ok(Self::HasErrors),
            "graphId" => Ok(Self::GraphId),
            "operationId" => Ok(Self::OperationId),
            _ => Err(TracegraphError::InvalidFilter(format!("unknown field: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Eq,
    Ne,
}

impl FromStr for FilterOperator {
    type Err = TracegraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eq" => Ok(Self::Eq),
            "ne" => Ok(Self::Ne),
            _ => Err(TracegraphError::InvalidFilter(format!(
                "unknown operator: {s}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Bool(bool),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterClause {
    pub field: FilterField,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

impl FilterClause {
    pub fn eq(field: FilterField, value: &str) -> Self {
        Self {
            field,
            operator: FilterOperator::Eq,
            value: FilterValue::Text(value.to_string()),
        }
    }

    pub fn parse(input: &TraceFilter) -> Result<Self> {
        let field = FilterField::from_str(&input.field)?;
        let operator = FilterOperator::from_str(&input.operator)?;
        let value = match field {
            FilterField::HasErrors => match input.value.as_str() {
                "true" => FilterValue::Bool(true),
                "false" => FilterValue::Bool(false),
                other => {
                    return Err(TracegraphError::InvalidFilter(format!(
                        "hasErrors expects \"true\" or \"false\", got {other:?}"
                    )));
                }
            },
            _ => FilterValue::Text(input.value.clone()),
        };
        Ok(Self {
            field,
            operator,
            value,
        })
    }

    pub fn parse_all(inputs: &[TraceFilter]) -> Result<Vec<Self>> {
        inputs.iter().map(Self::parse).collect()
    }
}

/// Order request as it arrives over the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderByInput {
    pub field: String,
    pub asc: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TraceOrderField {
    Duration,
    StartTime,
}

impl FromStr for TraceOrderField {
    type Err = TracegraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "duration" => Ok(Self::Duration),
            "startTime" => Ok(Self::StartTime),
            _ => Err(TracegraphError::InvalidOrder(format!(
                "unknown trace order field: {s}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OperationOrderField {
    Duration,
    Count,
    ErrorCount,
    ErrorPercent,
}

impl FromStr for OperationOrderField {
    type Err = TracegraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "duration" => Ok(Self::Duration),
            "count" => Ok(Self::Count),
            "errorCount" => Ok(Self::ErrorCount),
            "errorPercent" => Ok(Self::ErrorPercent),
            _ => Err(TracegraphError::InvalidOrder(format!(
                "unknown operation order field: {s}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderBy<F> {
    pub field: F,
    pub asc: bool,
}

impl OrderBy<TraceOrderField> {
    pub fn resolve_traces(input: Option<&OrderByInput>) -> Result<Self> {
        match input {
            None => Ok(Self {
                field: TraceOrderField::Duration,
                asc: false,
            }),
            Some(o) => Ok(Self {
                field: o.field.parse()?,
                asc: o.asc,
            }),
        }
    }
}

impl OrderBy<OperationOrderField> {
    pub fn resolve_operations(input: Option<&OrderByInput>) -> Result<Self> {
        match input {
            None => Ok(Self {
                field: OperationOrderField::Count,
                asc: false,
            }),
            Some(o) => Ok(Self {
                field: o.field.parse()?,
                asc: o.asc,
            }),
        }
    }
}

/// Resolved query window over trace start times, inclusive on both ends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub const DEFAULT_SPAN_HOURS: i64 = 24;

    /// `to` defaults to `now`, then `from` defaults to `to - 24h`.
    pub fn resolve(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let to = to.unwrap_or(now);
        let from = from.unwrap_or(to - Duration::hours(Self::DEFAULT_SPAN_HOURS));
        if from > to {
            return Err(TracegraphError::InvalidArgument(format!(
                "window start {from} is after window end {to}"
            )));
        }
        Ok(Self { from, to })
    }
}
