/// Convergence pass budget in milliseconds
pub const DEFAULT_CONVERGE_BUDGET_MS: f64 = 200.0;
/// `auto` decision procedure budget in milliseconds
pub const DEFAULT_DECISION_BUDGET_MS: f64 = 0.5;
/// Upper bound accepted for either budget (one minute)
pub const MAX_BUDGET_MS: f64 = 60_000.0;

/// Write requests queued behind the lane before new ones are rejected
pub const DEFAULT_BACKLOG_CAPACITY: usize = 4096;
/// Backlog depth at which a pressure warning is logged
pub const DEFAULT_PRESSURE_THRESHOLD: usize = 64;
/// Minimum gap between two pressure warnings for one module
pub const DEFAULT_PRESSURE_COOLDOWN_MS: u64 = 1_000;

/// Committed transactions retained at `full` diagnostics
pub const DEFAULT_MAX_TXN_HISTORY: usize = 64;
