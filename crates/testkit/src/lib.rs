use chrono::{DateTime, Duration, TimeZone, Utc};
use tracegraph_core::model::trace::TraceInput;

/// Fixed instant all fixtures are laid out from.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
}

pub fn sample_trace(key: &str, duration_ns: f64, start_time: DateTime<Utc>) -> TraceInput {
    TraceInput {
        key: key.to_string(),
        duration_ns,
        start_time,
        end_time: start_time + Duration::nanoseconds(duration_ns as i64),
        root: serde_json::json!({
            "name": key,
            "children": [{"name": "resolver", "path": ["query", key]}],
        }),
        details: Some(serde_json::json!({"query": format!("query {key} {{ id }}")})),
        client_name: Some("ios".to_string()),
        client_version: Some("1.0.0".to_string()),
        schema_tag: Some("current".to_string()),
        has_errors: false,
    }
}

/// One trace per duration, one second apart starting at `base_time()`.
pub fn traces_with_durations(key: &str, durations: &[f64]) -> Vec<TraceInput> {
    durations
        .iter()
        .enumerate()
        .map(|(i, d)| sample_trace(key, *d, base_time() + Duration::seconds(i as i64)))
        .collect()
}

/// `total` traces of which the first `errors` are flagged.
pub fn traces_with_errors(key: &str, total: usize, errors: usize) -> Vec<TraceInput> {
    (0..total)
        .map(|i| {
            let mut t = sample_trace(key, 1_000.0, base_time() + Duration::seconds(i as i64));
            t.has_errors = i < errors;
            t
        })
        .collect()
}
