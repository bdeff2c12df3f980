use serde::Serialize;

/// Why a worker produced no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Connection refused, address unresolvable or otherwise not dialable
    Unreachable,
    /// Connect or write/read deadline expired
    Timeout,
    /// Write or read failed after the connection was established
    Io,
    /// The command could not be run on the worker
    ExecutionFailed,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Unreachable => write!(f, "unreachable"),
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::Io => write!(f, "io error"),
            FailureReason::ExecutionFailed => write!(f, "execution failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The worker answered. The text may be empty when the command printed nothing.
    Success(String),
    Failed(FailureReason),
}

/// One worker's answer to a dispatched query. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    /// Zero-based position of the worker in the dispatched list
    pub machine_index: usize,
    pub address: String,
    pub outcome: Outcome,
}

impl QueryResult {
    pub fn new(machine_index: usize, address: String, outcome: Outcome) -> Self {
        Self {
            machine_index,
            address,
            outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    /// Response text, or `""` for a failed worker
    pub fn output(&self) -> &str {
        match &self.outcome {
            Outcome::Success(output) => output,
            Outcome::Failed(_) => "",
        }
    }

    pub fn failure(&self) -> Option<FailureReason> {
        match self.outcome {
            Outcome::Success(_) => None,
            Outcome::Failed(reason) => Some(reason),
        }
    }

    /// `address | output` for display, or `None` when there is nothing to show
    pub fn display_line(&self) -> Option<String> {
        let output = self.output();
        if output.is_empty() {
            None
        } else {
            Some(format!("{} | {}", self.address, output))
        }
    }
}
