use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One observed or replayed resource access from the monitored program.
///
/// This is exactly the shape the Monitor emits, one JSON object per line:
/// `{"timestamp": "...", "pid": 4242, "operation": "write", "target": "..."}`.
/// `target` is kept as presented (relative, Windows-spelled, symlinked);
/// the canonical form lives on the audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessAttempt {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub pid: u32,
    pub operation: Operation,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
    Execute,
    Create,
    Delete,
    Connect,
    Bind,
    Ioctl,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::Read,
        Operation::Write,
        Operation::Execute,
        Operation::Create,
        Operation::Delete,
        Operation::Connect,
        Operation::Bind,
        Operation::Ioctl,
    ];

    /// Operations that change filesystem state.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Operation::Write | Operation::Create | Operation::Delete)
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Operation::Read | Operation::Execute)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Operation::Connect | Operation::Bind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Execute => "execute",
            Operation::Create => "create",
            Operation::Delete => "delete",
            Operation::Connect => "connect",
            Operation::Bind => "bind",
            Operation::Ioctl => "ioctl",
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.to_lowercase();
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == lowered)
            .ok_or_else(|| format!("unknown operation: {value}"))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
