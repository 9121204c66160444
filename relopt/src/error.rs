use thiserror::Error;

pub type OptResult<T> = anyhow::Result<T>;

/// Fatal optimizer errors.
///
/// Degraded outcomes, e.g. missing statistics or a disconnected join graph, are never reported
/// as errors. They only affect plan quality.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OptimizerError {
    /// Plan or expression nesting is deeper than the configured limit.
    #[error("nesting depth {depth} exceeds limit {limit}")]
    DepthExceeded { depth: usize, limit: usize },
    /// An expression references a column missing from its input schema.
    #[error("column {column} not found in {schema}")]
    ColumnNotFound { column: String, schema: String },
    /// A rewrite produced a plan violating a structural invariant, which is a bug in the rule.
    #[error("invariant violated by {rule} at [{node}]: {detail}")]
    InvariantViolation {
        rule: String,
        node: String,
        detail: String,
    },
}

impl OptimizerError {
    pub fn invariant<R: ToString, N: ToString, D: ToString>(
        rule: R,
        node: N,
        detail: D,
    ) -> Self {
        OptimizerError::InvariantViolation {
            rule: rule.to_string(),
            node: node.to_string(),
            detail: detail.to_string(),
        }
    }
}
