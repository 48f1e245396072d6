// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a runner does with an occurrence that arrives while another
/// invocation is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPolicy {
    /// Start a detached invocation, scoped only to the module
    Task,
    /// Start immediately; invocations are tracked as a group
    Parallel,
    /// Cancel the in-flight invocation, then start the new one
    Latest,
    /// Drop the new occurrence
    Exhaust,
}

impl TaskPolicy {
    /// Whether the runner cancels in-flight invocations when it stops.
    pub fn cancels_on_stop(&self) -> bool {
        matches!(self, TaskPolicy::Latest | TaskPolicy::Exhaust)
    }
}

impl fmt::Display for TaskPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPolicy::Task => write!(f, "task"),
            TaskPolicy::Parallel => write!(f, "parallel"),
            TaskPolicy::Latest => write!(f, "latest"),
            TaskPolicy::Exhaust => write!(f, "exhaust"),
        }
    }
}

impl FromStr for TaskPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" => Ok(TaskPolicy::Task),
            "parallel" => Ok(TaskPolicy::Parallel),
            "latest" => Ok(TaskPolicy::Latest),
            "exhaust" => Ok(TaskPolicy::Exhaust),
            other => Err(format!("unknown task policy '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_names_round_trip() {
        for policy in [TaskPolicy::Task, TaskPolicy::Parallel, TaskPolicy::Latest, TaskPolicy::Exhaust] {
            assert_eq!(policy.to_string().parse::<TaskPolicy>(), Ok(policy));
        }
        assert!("debounce".parse::<TaskPolicy>().is_err());
    }
}
