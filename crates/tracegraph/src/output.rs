use chrono::SecondsFormat;
use tracegraph_core::model::operation::{
    LatencyBin, Operation, RpmPoint, Stats, TraceFilterOptions,
};
use tracegraph_core::model::trace::{TraceListItem, TraceRecord};
use tracegraph_core::query::{Connection, DeleteGraphResponse, StatusResponse};

fn ms(duration_ns: f64) -> f64 {
    duration_ns / 1_000_000.0
}

fn print_cursor(cursor: &str) {
    if cursor.is_empty() {
        println!("-- end --");
    } else {
        println!("-- next: --after {cursor} --");
    }
}

pub fn print_traces_human(v: &Connection<TraceListItem>) {
    for item in &v.nodes {
        println!(
            "{} trace={} op={} duration={:.3}ms errors={}",
            item.start_time.to_rfc3339_opts(SecondsFormat::Millis, true),
            item.id,
            item.key,
            ms(item.duration),
            item.has_errors
        );
    }
    println!("-- {} traces --", v.nodes.len());
    print_cursor(&v.cursor);
}

pub fn print_operation_row(op: &Operation) {
    println!(
        "op={} count={} errors={} error%={} p95={:.3}ms",
        op.key,
        op.stats.count,
        op.stats.error_count,
        op.stats.error_percent,
        ms(op.stats.duration)
    );
}

pub fn print_operations_human(v: &Connection<Operation>) {
    for op in &v.nodes {
        print_operation_row(op);
    }
    println!("-- {} operations --", v.nodes.len());
    print_cursor(&v.cursor);
}

pub fn print_rpm_human(v: &Connection<RpmPoint>) {
    for point in &v.nodes {
        println!(
            "{} count={} errors={}",
            point.start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            point.count,
            point.error_count
        );
    }
}

pub fn print_latency_human(v: &Connection<LatencyBin>) {
    let widest = v.nodes.iter().map(|b| b.count).max().unwrap_or(0).max(1);
    for bin in &v.nodes {
        let bar = "#".repeat(((bin.count * 40) / widest).max(1) as usize);
        println!("{:>12.3}ms {:>8} {bar}", ms(bin.duration), bin.count);
    }
}

pub fn print_stats_human(v: &Stats) {
    println!(
        "count={} errors={} error%={} p95={:.3}ms",
        v.count,
        v.error_count,
        v.error_percent,
        ms(v.duration)
    );
}

pub fn print_filter_options_human(v: &TraceFilterOptions) {
    println!("schemaTag: {}", v.schema_tag.join(", "));
    println!("clientName: {}", v.client_name.join(", "));
    println!("clientVersion: {}", v.client_version.join(", "));
    println!("hasErrors: {}", v.has_errors.join(", "));
}

pub fn print_trace_human(v: &TraceRecord) {
    println!(
        "TRACE {} graph={} op={} duration={:.3}ms errors={}",
        v.id,
        v.graph_id,
        v.key,
        ms(v.duration),
        v.has_errors
    );
    println!(
        "start={} end={}",
        v.start_time.to_rfc3339_opts(SecondsFormat::Micros, true),
        v.end_time.to_rfc3339_opts(SecondsFormat::Micros, true)
    );
    println!(
        "client={} {} schema={}",
        v.client_name.as_deref().unwrap_or("-"),
        v.client_version.as_deref().unwrap_or("-"),
        v.schema_tag.as_deref().unwrap_or("-")
    );
    println!("root={}", v.root);
    if let Some(details) = &v.details {
        println!("details={details}");
    }
}

pub fn print_delete_human(v: &DeleteGraphResponse) {
    println!("graph={} deleted={}", v.graph_id, v.deleted);
}

pub fn print_status_human(v: &StatusResponse) {
    println!("db_path={}", v.db_path);
    println!("db_size_bytes={}", v.db_size_bytes);
    println!("traces={} graphs={}", v.traces_count, v.graphs_count);
    if let Some(oldest) = v.oldest_start_time {
        println!(
            "oldest={}",
            oldest.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
    }
    if let Some(newest) = v.newest_start_time {
        println!(
            "newest={}",
            newest.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
    }
}
