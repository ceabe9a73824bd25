use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use testkit::{base_time, sample_trace, traces_with_durations, traces_with_errors};
use tracegraph_core::aggregate;
use tracegraph_core::error::TracegraphError;
use tracegraph_core::filter::{OrderByInput, TraceFilter};
use tracegraph_core::model::trace::TraceListItem;
use tracegraph_core::query::{
    FilterOptionsRequest, OperationsRequest, ScopedRequest, TraceLookup, TracesRequest,
};
use tracegraph_store::{Gateway, Resolver, Store};

fn now() -> DateTime<Utc> {
    base_time() + chrono::Duration::hours(1)
}

fn resolver() -> Resolver {
    let store = Store::open_in_memory().unwrap();
    let gateway = Gateway::new(store, Duration::from_secs(10));
    Resolver::new(gateway, Duration::from_secs(60), 30).with_clock(Arc::new(now))
}

fn traces_req(graph: &str, order: Option<(&str, bool)>, after: &str) -> TracesRequest {
    TracesRequest {
        graph_id: graph.to_string(),
        order_by: order.map(|(field, asc)| OrderByInput {
            field: field.to_string(),
            asc,
        }),
        after: Some(after.to_string()),
        ..TracesRequest::default()
    }
}

fn scoped(graph: &str, op: Option<&str>) -> ScopedRequest {
    ScopedRequest {
        graph_id: graph.to_string(),
        operation_id: op.map(str::to_string),
        ..ScopedRequest::default()
    }
}

async fn drain_traces(r: &Resolver, graph: &str, order: (&str, bool)) -> Vec<TraceListItem> {
    let mut after = String::new();
    let mut seen = Vec::new();
    loop {
        let page = r.traces(&traces_req(graph, Some(order), &after)).await.unwrap();
        assert!(page.nodes.len() <= 10);
        seen.extend(page.nodes);
        if page.cursor.is_empty() {
            break;
        }
        after = page.cursor;
    }
    seen
}

#[tokio::test]
async fn fifteen_traces_make_one_operation() {
    let r = resolver();
    let durations = (1..=15).map(|i| i as f64 * 1_000.0).collect::<Vec<_>>();
    r.insert("g1", traces_with_durations("op1", &durations))
        .await
        .unwrap();

    let ops = r
        .operations(&OperationsRequest {
            graph_id: "g1".into(),
            ..OperationsRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(ops.nodes.len(), 1);
    assert_eq!(ops.nodes[0].id, "op1");
    assert_eq!(ops.nodes[0].key, "op1");
    assert_eq!(ops.nodes[0].stats.count, 15);
    assert_eq!(ops.cursor, "");
}

#[tokio::test]
async fn trace_pages_cover_everything_once_with_duplicate_durations() {
    let r = resolver();
    let durations = (0..27).map(|i| ((i % 4) * 10) as f64).collect::<Vec<_>>();
    r.insert("g1", traces_with_durations("op", &durations))
        .await
        .unwrap();

    for order in [
        ("duration", false),
        ("duration", true),
        ("startTime", true),
        ("startTime", false),
    ] {
        let seen = drain_traces(&r, "g1", order).await;
        assert_eq!(seen.len(), 27, "order {order:?}");
        let unique = seen.iter().map(|t| t.id.clone()).collect::<HashSet<_>>();
        assert_eq!(unique.len(), 27, "order {order:?}");
    }

    let desc = drain_traces(&r, "g1", ("duration", false)).await;
    assert!(desc.windows(2).all(|w| w[0].duration >= w[1].duration));
    let asc = drain_traces(&r, "g1", ("duration", true)).await;
    assert!(asc.windows(2).all(|w| w[0].duration <= w[1].duration));
}

#[tokio::test]
async fn trace_pages_cover_everything_once_with_equal_start_times() {
    let r = resolver();
    // Groups of four share a start time, so page edges fall inside ties.
    let batch = (0..23)
        .map(|i| {
            sample_trace(
                "op",
                (i * 7 % 5) as f64,
                base_time() + chrono::Duration::seconds(i / 4),
            )
        })
        .collect::<Vec<_>>();
    r.insert("g1", batch).await.unwrap();

    for asc in [true, false] {
        let seen = drain_traces(&r, "g1", ("startTime", asc)).await;
        assert_eq!(seen.len(), 23, "asc {asc}");
        let unique = seen.iter().map(|t| t.id.clone()).collect::<HashSet<_>>();
        assert_eq!(unique.len(), 23, "asc {asc}");
        if asc {
            assert!(seen.windows(2).all(|w| w[0].start_time <= w[1].start_time));
        } else {
            assert!(seen.windows(2).all(|w| w[0].start_time >= w[1].start_time));
        }
    }
}

#[tokio::test]
async fn repeated_requests_return_identical_pages() {
    let r = resolver();
    r.insert("g1", traces_with_durations("op", &[5.0; 12]))
        .await
        .unwrap();

    let a = r.traces(&traces_req("g1", None, "")).await.unwrap();
    let b = r.traces(&traces_req("g1", None, "")).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.nodes.len(), 10);
    assert!(!a.cursor.is_empty());
}

#[tokio::test]
async fn operation_pages_hold_seven() {
    let r = resolver();
    let mut batch = Vec::new();
    for i in 0..20 {
        batch.extend(traces_with_durations(&format!("op{i:02}"), &[1.0, 2.0]));
    }
    r.insert("g1", batch).await.unwrap();

    let mut after = None;
    let mut sizes = Vec::new();
    let mut keys = HashSet::new();
    loop {
        let page = r
            .operations(&OperationsRequest {
                graph_id: "g1".into(),
                after: after.clone(),
                ..OperationsRequest::default()
            })
            .await
            .unwrap();
        sizes.push(page.nodes.len());
        keys.extend(page.nodes.into_iter().map(|o| o.key));
        if page.cursor.is_empty() {
            break;
        }
        after = Some(page.cursor);
    }
    assert_eq!(sizes, vec![7, 7, 6]);
    assert_eq!(keys.len(), 20);
}

#[tokio::test]
async fn graphs_do_not_see_each_other() {
    let r = resolver();
    r.insert("a", traces_with_durations("shared", &[1.0, 2.0, 3.0]))
        .await
        .unwrap();
    r.insert("b", traces_with_durations("shared", &[4.0]))
        .await
        .unwrap();

    let stats = r.stats(&scoped("b", None)).await.unwrap();
    assert_eq!(stats.count, 1);

    // A user filter on graphId cannot widen the tenant scope.
    let mut req = scoped("b", None);
    req.trace_filters = Some(vec![TraceFilter::new("graphId", "eq", "a")]);
    assert_eq!(r.stats(&req).await.unwrap().count, 0);

    let page = r.traces(&traces_req("b", None, "")).await.unwrap();
    assert_eq!(page.nodes.len(), 1);
}

#[tokio::test]
async fn error_percent_and_empty_stats() {
    let r = resolver();
    r.insert("g1", traces_with_errors("op", 7, 3)).await.unwrap();

    let stats = r.stats(&scoped("g1", Some("op"))).await.unwrap();
    assert_eq!(stats.error_count, 3);
    assert_eq!(stats.error_percent, 42);

    let empty = r.stats(&scoped("g1", Some("missing"))).await.unwrap();
    assert_eq!(empty.count, 0);
    assert_eq!(empty.error_percent, 0);
    assert_eq!(empty.duration, 0.0);
    assert!(r.operation(&scoped("g1", Some("missing"))).await.unwrap().is_none());
}

#[tokio::test]
async fn operation_without_id_is_first_operations_row() {
    let r = resolver();
    let mut batch = traces_with_durations("op_a", &[1.0]);
    batch.extend(traces_with_durations("op_b", &[1.0, 2.0, 3.0]));
    batch.extend(traces_with_durations("op_c", &[1.0, 2.0]));
    r.insert("g1", batch).await.unwrap();

    let top = r.operation(&scoped("g1", None)).await.unwrap().unwrap();
    assert_eq!(top.key, "op_b");
    assert_eq!(top.stats.count, 3);

    let ops = r
        .operations(&OperationsRequest {
            graph_id: "g1".into(),
            ..OperationsRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(ops.nodes[0], top);

    assert!(r.operation(&scoped("empty", None)).await.unwrap().is_none());
}

#[tokio::test]
async fn wide_rpm_window_is_bounded() {
    let r = resolver();
    r.insert("g1", vec![sample_trace("op", 1.0, base_time())])
        .await
        .unwrap();

    let mut req = scoped("g1", None);
    req.from = Some(base_time() - chrono::Duration::days(3650));
    req.to = Some(now());
    let series = r.rpm(&req).await.unwrap();
    assert!(series.nodes.len() as i64 <= aggregate::MAX_RPM_POINTS + 1);
    assert_eq!(series.nodes.iter().map(|p| p.count).sum::<i64>(), 1);
}

#[tokio::test]
async fn p95_is_interpolated() {
    let r = resolver();
    let durations = (1..=100).map(|i| i as f64 * 10.0).collect::<Vec<_>>();
    r.insert("g1", traces_with_durations("op", &durations))
        .await
        .unwrap();
    let op = r.operation(&scoped("g1", Some("op"))).await.unwrap().unwrap();
    assert!((op.stats.duration - 950.5).abs() < 1e-9);
}

#[tokio::test]
async fn default_window_is_last_day() {
    let r = resolver();
    let old = sample_trace("op", 1.0, now() - chrono::Duration::hours(25));
    let fresh = sample_trace("op", 1.0, now() - chrono::Duration::hours(2));
    r.insert("g1", vec![old, fresh]).await.unwrap();

    assert_eq!(r.stats(&scoped("g1", None)).await.unwrap().count, 1);

    let mut wide = scoped("g1", None);
    wide.from = Some(now() - chrono::Duration::hours(48));
    assert_eq!(r.stats(&wide).await.unwrap().count, 2);

    let mut inverted = scoped("g1", None);
    inverted.from = Some(now());
    inverted.to = Some(now() - chrono::Duration::hours(1));
    assert!(matches!(
        r.stats(&inverted).await,
        Err(TracegraphError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn rejects_bad_inputs_before_running() {
    let r = resolver();

    let mut req = scoped("g1", None);
    req.trace_filters = Some(vec![TraceFilter::new("durationMs", "eq", "1")]);
    assert!(matches!(
        r.stats(&req).await,
        Err(TracegraphError::InvalidFilter(_))
    ));

    req.trace_filters = Some(vec![TraceFilter::new("hasErrors", "eq", "yes")]);
    assert!(matches!(
        r.stats(&req).await,
        Err(TracegraphError::InvalidFilter(_))
    ));

    assert!(matches!(
        r.traces(&traces_req("g1", Some(("name", true)), "")).await,
        Err(TracegraphError::InvalidOrder(_))
    ));
    assert!(matches!(
        r.traces(&traces_req("g1", None, "%%%")).await,
        Err(TracegraphError::InvalidCursor(_))
    ));
}

#[tokio::test]
async fn cursor_from_other_ordering_is_rejected() {
    let r = resolver();
    r.insert("g1", traces_with_durations("op", &[1.0; 11]))
        .await
        .unwrap();
    let page = r.traces(&traces_req("g1", None, "")).await.unwrap();
    assert!(!page.cursor.is_empty());

    let err = r
        .traces(&traces_req("g1", Some(("startTime", false)), &page.cursor))
        .await
        .unwrap_err();
    assert!(matches!(err, TracegraphError::InvalidCursor(_)));
}

#[tokio::test]
async fn rpm_series_is_gap_filled() {
    let r = resolver();
    let t0 = base_time();
    r.insert(
        "g1",
        vec![
            sample_trace("op", 1.0, t0),
            sample_trace("op", 1.0, t0 + chrono::Duration::minutes(5)),
        ],
    )
    .await
    .unwrap();

    let mut req = scoped("g1", None);
    req.from = Some(t0);
    req.to = Some(t0 + chrono::Duration::minutes(10));
    let series = r.rpm(&req).await.unwrap();
    assert_eq!(series.cursor, "");
    assert_eq!(series.nodes.len(), 11);
    assert_eq!(series.nodes[0].count, 1);
    assert_eq!(series.nodes[5].count, 1);
    assert_eq!(series.nodes.iter().map(|p| p.count).sum::<i64>(), 2);
}

#[tokio::test]
async fn latency_distribution_counts_every_trace() {
    let r = resolver();
    let durations = (0..=60).map(|i| i as f64).collect::<Vec<_>>();
    r.insert("g1", traces_with_durations("op", &durations))
        .await
        .unwrap();
    let hist = r.latency_distribution(&scoped("g1", None)).await.unwrap();
    assert_eq!(hist.cursor, "");
    assert!(hist.nodes.len() <= 30);
    assert_eq!(hist.nodes.iter().map(|b| b.count).sum::<i64>(), 61);
}

#[tokio::test]
async fn filter_options_and_trace_lookup() {
    let r = resolver();
    let mut android = sample_trace("op", 1.0, base_time());
    android.client_name = Some("android".into());
    android.schema_tag = None;
    let ids = r
        .insert("g1", vec![sample_trace("op", 1.0, base_time()), android])
        .await
        .unwrap();

    let options = r
        .trace_filter_options(&FilterOptionsRequest {
            graph_id: "g1".into(),
        })
        .await
        .unwrap();
    assert_eq!(options.client_name, vec!["android", "ios"]);
    assert_eq!(options.schema_tag, vec!["current"]);
    assert_eq!(options.has_errors, vec!["true", "false"]);

    let trace = r
        .trace(&TraceLookup {
            trace_id: ids[1].to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(trace.client_name.as_deref(), Some("android"));
    assert_eq!(trace.root["name"], "op");

    // `ne` keeps rows where the dimension is missing.
    let mut req = scoped("g1", None);
    req.trace_filters = Some(vec![TraceFilter::new("schemaTag", "ne", "current")]);
    assert_eq!(r.stats(&req).await.unwrap().count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn graph_and_operation_stats_run_side_by_side() {
    let r = resolver();
    r.insert("g1", traces_with_errors("a", 10, 1)).await.unwrap();
    r.insert("g1", traces_with_errors("b", 5, 5)).await.unwrap();

    let graph_req = scoped("g1", None);
    let op_req = scoped("g1", Some("b"));
    let (graph, op) = tokio::join!(r.stats(&graph_req), r.stats(&op_req));
    assert_eq!(graph.unwrap().count, 15);
    let op = op.unwrap();
    assert_eq!(op.count, 5);
    assert_eq!(op.error_percent, 100);
}
