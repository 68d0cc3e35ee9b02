//! Sampler execution with retry, backoff and structured repair.

pub mod resilient;
pub mod retry;
pub mod structured;

pub use resilient::{ExecutionOutput, RecoverySession, ResilientExecutor};
pub use retry::RetryConfig;
pub use structured::{extract_json, repair_feedback, strip_code_fence};
