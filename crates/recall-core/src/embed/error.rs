use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error(
        "daily embedding budget exceeded: estimated ${estimated_usd:.6} >= budget ${budget_usd:.6}"
    )]
    BudgetExceeded {
        estimated_usd: f64,
        budget_usd: f64,
    },

    #[error("embedding provider error: {message}")]
    Provider { message: String, transient: bool },

    #[error("embedding provider returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EmbedError {
    /// Whether a retry inside the component could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EmbedError::Provider { transient: true, .. })
    }
}
