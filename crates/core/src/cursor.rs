//! Opaque keyset-pagination tokens.
//!
//! A token carries the ordering field's value of the first row that did not fit
//! on the previous page, plus that row's unique tie-break key. Resuming with an
//! inclusive composite boundary `(value, key)` therefore never repeats or skips
//! rows, even when many rows share the same ordering value.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TracegraphError};
use crate::filter::{OperationOrderField, TraceOrderField};
use crate::model::operation::Operation;
use crate::model::trace::TraceListItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    Float,
    Int,
    Time,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Boundary {
    Float(f64),
    Int(i64),
    Time(DateTime<Utc>),
}

impl Boundary {
    fn render(&self) -> String {
        match self {
            // Display for f64 is the shortest string that parses back to the same bits.
            Self::Float(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Time(ts) => ts.timestamp_micros().to_string(),
        }
    }

    fn read(kind: BoundaryKind, raw: &str) -> Option<Self> {
        match kind {
            BoundaryKind::Float => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Self::Float),
            BoundaryKind::Int => raw.parse::<i64>().ok().map(Self::Int),
            BoundaryKind::Time => {
                let micros = raw.parse::<i64>().ok()?;
                let secs = micros.div_euclid(1_000_000);
                let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
                DateTime::from_timestamp(secs, nanos).map(Self::Time)
            }
        }
    }
}

/// Ordering field that can anchor a cursor.
pub trait SortKey: Copy {
    fn name(self) -> &'static str;
    fn kind(self) -> BoundaryKind;
}

impl SortKey for TraceOrderField {
    fn name(self) -> &'static str {
        match self {
            Self::Duration => "duration",
            Self::StartTime => "startTime",
        }
    }

    fn kind(self) -> BoundaryKind {
        match self {
            Self::Duration => BoundaryKind::Float,
            Self::StartTime => BoundaryKind::Time,
        }
    }
}

impl SortKey for OperationOrderField {
    fn name(self) -> &'static str {
        match self {
            Self::Duration => "duration",
            Self::Count => "count",
            Self::ErrorCount => "errorCount",
            Self::ErrorPercent => "errorPercent",
        }
    }

    fn kind(self) -> BoundaryKind {
        match self {
            Self::Duration => BoundaryKind::Float,
            Self::Count | Self::ErrorCount | Self::ErrorPercent => BoundaryKind::Int,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub boundary: Boundary,
    pub tie_break: String,
}

/// Rows that can produce a resume point for a given ordering field.
pub trait Keyset<F: SortKey> {
    fn cursor(&self, field: F) -> Cursor;
}

impl Keyset<TraceOrderField> for TraceListItem {
    fn cursor(&self, field: TraceOrderField) -> Cursor {
        let boundary = match field {
            TraceOrderField::Duration => Boundary::Float(self.duration),
            TraceOrderField::StartTime => Boundary::Time(self.start_time),
        };
        Cursor {
            boundary,
            tie_break: self.id.clone(),
        }
    }
}

impl Keyset<OperationOrderField> for Operation {
    fn cursor(&self, field: OperationOrderField) -> Cursor {
        let boundary = match field {
            OperationOrderField::Duration => Boundary::Float(self.stats.duration),
            OperationOrderField::Count => Boundary::Int(self.stats.count),
            OperationOrderField::ErrorCount => Boundary::Int(self.stats.error_count),
            OperationOrderField::ErrorPercent => Boundary::Int(self.stats.error_percent),
        };
        Cursor {
            boundary,
            tie_break: self.key.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Token {
    f: String,
    v: String,
    k: String,
    asc: bool,
}

pub fn encode<F, R>(row: &R, field: F, ascending: bool) -> Result<String>
where
    F: SortKey,
    R: Keyset<F>,
{
    let cursor = row.cursor(field);
    let token = Token {
        f: field.name().to_string(),
        v: cursor.boundary.render(),
        k: cursor.tie_break,
        asc: ascending,
    };
    let payload = serde_json::to_vec(&token)
        .map_err(|e| TracegraphError::Internal(format!("cursor encode failed: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(payload))
}

/// Absent or empty tokens mean "start from the beginning". Anything else must
/// decode cleanly and name the same ordering field as the current request.
pub fn decode<F: SortKey>(token: Option<&str>, field: F) -> Result<Option<Cursor>> {
    let raw = match token.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(raw) => raw,
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|_| TracegraphError::InvalidCursor("cursor is not valid base64".into()))?;
    let token: Token = serde_json::from_slice(&bytes)
        .map_err(|_| TracegraphError::InvalidCursor("cursor payload is malformed".into()))?;

    if token.f != field.name() {
        return Err(TracegraphError::InvalidCursor(format!(
            "cursor was issued for ordering by {}, request orders by {}",
            token.f,
            field.name()
        )));
    }

    let boundary = Boundary::read(field.kind(), &token.v).ok_or_else(|| {
        TracegraphError::InvalidCursor(format!("cursor boundary is not a valid {}", token.f))
    })?;

    Ok(Some(Cursor {
        boundary,
        tie_break: token.k,
    }))
}
