mod client;
mod output;
mod protocol;
mod query_server;
mod telemetry;

use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracegraph_core::config::Config;
use tracegraph_core::filter::{OrderByInput, TraceFilter};
use tracegraph_core::query::{
    DeleteGraphRequest, FilterOptionsRequest, OperationsRequest, ScopedRequest, TraceLookup,
    TracesRequest,
};
use tracegraph_core::time::{parse_duration_str, parse_time_or_relative};
use tracegraph_ingest::IngestLimits;
use tracegraph_store::{Gateway, Resolver, Store};

use crate::client::QueryClient;
use crate::output::{
    print_delete_human, print_filter_options_human, print_latency_human, print_operation_row,
    print_operations_human, print_rpm_human, print_stats_human, print_status_human,
    print_trace_human, print_traces_human,
};
use crate::protocol::{ApiRequest, ApiResponse};
use crate::telemetry::{LogFormat, init_cli_tracing, init_run_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "tracegraph")]
#[command(about = "Trace analytics backend: ingest RPC traces and query operation stats")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    uds: Option<PathBuf>,

    #[arg(long, global = true)]
    addr: Option<String>,
}

/// Tenant, operation, window and filters shared by the aggregate commands.
#[derive(Args, Debug, Clone)]
struct ScopeArgs {
    graph: String,
    #[arg(long)]
    operation: Option<String>,
    #[arg(long, help = "RFC3339 time or duration ago (e.g. 15m)")]
    since: Option<String>,
    #[arg(long, help = "RFC3339 time or duration ago")]
    until: Option<String>,
    #[arg(long = "filter", help = "field=value or field!=value, repeatable")]
    filters: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct PageArgs {
    #[arg(long, help = "Ordering field")]
    order: Option<String>,
    #[arg(long)]
    asc: bool,
    #[arg(long, help = "Cursor returned by the previous page")]
    after: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run ingest and query servers")]
    Run {
        #[arg(long)]
        db_path: Option<PathBuf>,
        #[arg(long)]
        ingest_http_addr: Option<String>,
        #[arg(long)]
        query_tcp_addr: Option<String>,
        #[arg(long)]
        query_http_addr: Option<String>,
        #[arg(long)]
        query_uds_path: Option<PathBuf>,
        #[arg(long, help = "Per-query deadline, e.g. 10s")]
        query_timeout: Option<String>,
    },
    #[command(about = "List traces, one page at a time")]
    Traces {
        #[command(flatten)]
        scope: ScopeArgs,
        #[command(flatten)]
        page: PageArgs,
    },
    #[command(about = "List operations with their aggregate stats")]
    Operations {
        graph: String,
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        until: Option<String>,
        #[arg(long = "filter")]
        filters: Vec<String>,
        #[command(flatten)]
        page: PageArgs,
    },
    #[command(about = "Show one operation")]
    Operation {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    #[command(about = "Requests per bucket over the window")]
    Rpm {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    #[command(about = "Latency histogram over the window")]
    Latency {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    #[command(about = "Aggregate stats over the window")]
    Stats {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    #[command(about = "Distinct filter values seen in a graph")]
    FilterOptions { graph: String },
    #[command(about = "Show a stored trace with its payloads")]
    Trace { trace_id: String },
    #[command(about = "Delete every trace of a graph")]
    DeleteGraph { graph: String },
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            db_path,
            ingest_http_addr,
            query_tcp_addr,
            query_http_addr,
            query_uds_path,
            query_timeout,
        } => {
            let mut cfg = Config::load().context("load config")?;
            if let Some(v) = db_path {
                cfg.db_path = v;
            }
            if let Some(v) = ingest_http_addr {
                cfg.ingest_http_addr = v;
            }
            if let Some(v) = query_tcp_addr {
                cfg.query_tcp_addr = v;
            }
            if let Some(v) = query_http_addr {
                cfg.query_http_addr = v;
            }
            if let Some(v) = query_uds_path {
                cfg.uds_path = v;
            }
            if let Some(v) = query_timeout {
                cfg.query_timeout = parse_duration_str(&v)?;
            }
            cfg.validate().context("validate config")?;
            run_server(cfg).await
        }
        command => {
            init_cli_tracing();
            let cfg = Config::load().context("load config")?;
            let now = Utc::now();
            let req = build_request(command, now)?;
            let mut client = QueryClient::connect(cli.uds, cli.addr, &cfg).await?;
            let response = client.request(req).await?;
            print_response(response, cli.json)
        }
    }
}

fn build_request(command: Commands, now: DateTime<Utc>) -> anyhow::Result<ApiRequest> {
    let req = match command {
        Commands::Run { .. } => anyhow::bail!("run is not a query"),
        Commands::Traces { scope, page } => {
            let scoped = scope.into_request(now)?;
            ApiRequest::Traces(TracesRequest {
                graph_id: scoped.graph_id,
                operation_id: scoped.operation_id,
                order_by: page.order_by(),
                from: scoped.from,
                to: scoped.to,
                after: page.after,
                trace_filters: scoped.trace_filters,
            })
        }
        Commands::Operations {
            graph,
            since,
            until,
            filters,
            page,
        } => ApiRequest::Operations(OperationsRequest {
            graph_id: graph,
            order_by: page.order_by(),
            after: page.after,
            from: parse_time(since, now)?,
            to: parse_time(until, now)?,
            trace_filters: parse_filters(&filters)?,
        }),
        Commands::Operation { scope } => ApiRequest::Operation(scope.into_request(now)?),
        Commands::Rpm { scope } => ApiRequest::Rpm(scope.into_request(now)?),
        Commands::Latency { scope } => ApiRequest::LatencyDistribution(scope.into_request(now)?),
        Commands::Stats { scope } => ApiRequest::Stats(scope.into_request(now)?),
        Commands::FilterOptions { graph } => {
            ApiRequest::TraceFilterOptions(FilterOptionsRequest { graph_id: graph })
        }
        Commands::Trace { trace_id } => ApiRequest::Trace(TraceLookup { trace_id }),
        Commands::DeleteGraph { graph } => {
            ApiRequest::DeleteGraph(DeleteGraphRequest { graph_id: graph })
        }
        Commands::Status => ApiRequest::Status,
    };
    Ok(req)
}

impl ScopeArgs {
    fn into_request(self, now: DateTime<Utc>) -> anyhow::Result<ScopedRequest> {
        Ok(ScopedRequest {
            graph_id: self.graph,
            operation_id: self.operation,
            from: parse_time(self.since, now)?,
            to: parse_time(self.until, now)?,
            trace_filters: parse_filters(&self.filters)?,
        })
    }
}

impl PageArgs {
    fn order_by(&self) -> Option<OrderByInput> {
        self.order.as_ref().map(|field| OrderByInput {
            field: field.clone(),
            asc: self.asc,
        })
    }
}

fn parse_time(input: Option<String>, now: DateTime<Utc>) -> anyhow::Result<Option<DateTime<Utc>>> {
    Ok(input
        .map(|v| parse_time_or_relative(&v, now))
        .transpose()?)
}

fn parse_filters(inputs: &[String]) -> anyhow::Result<Option<Vec<TraceFilter>>> {
    if inputs.is_empty() {
        return Ok(None);
    }
    let filters = inputs
        .iter()
        .map(|f| TraceFilter::parse(f))
        .collect::<tracegraph_core::Result<Vec<_>>>()?;
    Ok(Some(filters))
}

async fn run_server(cfg: Config) -> anyhow::Result<()> {
    init_run_tracing(LogFormat::from_env());

    let store = Store::open(&cfg.db_path)
        .with_context(|| format!("open store {}", cfg.db_path.display()))?;
    let gateway = Gateway::new(store, cfg.query_timeout);
    let resolver = Resolver::new(gateway, cfg.rpm_bucket, cfg.latency_bins);

    eprintln!("tracegraph run");
    eprintln!("  db: {}", cfg.db_path.display());
    eprintln!("  ingest http: {}", cfg.ingest_http_addr);
    eprintln!("  query uds: {}", cfg.uds_path.display());
    eprintln!("  query tcp: {}", cfg.query_tcp_addr);
    eprintln!("  query http: {}", cfg.query_http_addr);

    let ingest_addr = cfg
        .ingest_http_addr
        .parse()
        .context("parse ingest http addr")?;
    let query_tcp_addr = cfg.query_tcp_addr.parse().context("parse query tcp addr")?;
    let query_http_addr = cfg
        .query_http_addr
        .parse()
        .context("parse query http addr")?;

    let ingest_task = tokio::spawn(tracegraph_ingest::run_ingest_server(
        resolver.clone(),
        ingest_addr,
        IngestLimits {
            max_batch_size: cfg.max_batch_size,
            max_body_bytes: cfg.max_body_bytes,
        },
    ));

    let query_task = tokio::spawn(query_server::run_query_server(
        resolver.clone(),
        cfg.uds_path.clone(),
        query_tcp_addr,
    ));

    let query_http_task = tokio::spawn(query_server::run_query_http_server(
        resolver,
        query_http_addr,
    ));

    tokio::select! {
        res = ingest_task => {
            res??;
        }
        res = query_task => {
            res??;
        }
        res = query_http_task => {
            res??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    shutdown_tracing();
    Ok(())
}

fn print_response(response: ApiResponse, json: bool) -> anyhow::Result<()> {
    if let ApiResponse::Error(e) = &response {
        anyhow::bail!("{e}");
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match response {
        ApiResponse::Traces(v) => print_traces_human(&v),
        ApiResponse::Operations(v) => print_operations_human(&v),
        ApiResponse::Operation(Some(v)) => print_operation_row(&v),
        ApiResponse::Operation(None) => println!("no traces for operation in window"),
        ApiResponse::Rpm(v) => print_rpm_human(&v),
        ApiResponse::LatencyDistribution(v) => print_latency_human(&v),
        ApiResponse::Stats(v) => print_stats_human(&v),
        ApiResponse::TraceFilterOptions(v) => print_filter_options_human(&v),
        ApiResponse::Trace(Some(v)) => print_trace_human(&v),
        ApiResponse::Trace(None) => println!("trace not found"),
        ApiResponse::DeleteGraph(v) => print_delete_human(&v),
        ApiResponse::Status(v) => print_status_human(&v),
        ApiResponse::Error(_) => {}
    }
    Ok(())
}
