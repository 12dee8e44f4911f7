pub mod retention;

pub use retention::{RetentionBudget, select_evictions, select_evictions_by};
