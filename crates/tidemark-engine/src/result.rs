//! Result types for pipeline checks.

/// Outcome of `check_pipeline`: configuration is valid, and this is what
/// the warehouse said.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub pipeline: String,
    /// Warehouse target with secrets removed.
    pub warehouse: String,
    pub object_store: String,
    pub tasks: usize,
    /// Depth of the dependency graph.
    pub levels: usize,
    /// `Ok` when `SELECT 1` succeeded, otherwise the connection error.
    pub connectivity: Result<(), String>,
}

impl CheckReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.connectivity.is_ok()
    }
}
