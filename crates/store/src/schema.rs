pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS traces (
  id TEXT PRIMARY KEY,
  graph_id TEXT NOT NULL,
  operation_key TEXT NOT NULL,
  duration_ns DOUBLE NOT NULL,
  start_time TIMESTAMP NOT NULL,
  end_time TIMESTAMP NOT NULL,
  root TEXT NOT NULL,
  details TEXT,
  client_name TEXT,
  client_version TEXT,
  schema_tag TEXT,
  has_errors BOOLEAN NOT NULL,
  created_at TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_traces_graph_start ON traces(graph_id, start_time);
CREATE INDEX IF NOT EXISTS idx_traces_graph_key ON traces(graph_id, operation_key);
"#;
