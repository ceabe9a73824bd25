use duckdb::params;
use tracegraph_core::error::{Result, TracegraphError};
use tracegraph_core::ids::GraphId;

use crate::Store;

impl Store {
    /// Removes every trace of a graph. Returns the number of rows deleted.
    pub fn delete_graph(&self, graph_id: &GraphId) -> Result<usize> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM traces WHERE graph_id = ?",
            params![graph_id.as_str()],
        )
        .map_err(|e| TracegraphError::Store(format!("graph delete failed: {e}")))
    }
}
