use thiserror::Error;

/// Budget tracker errors
#[derive(Debug, Error)]
pub enum BudgetError {
    /// Cost was negative, NaN or infinite
    #[error("invalid cost: {0}")]
    InvalidCost(f64),
}
