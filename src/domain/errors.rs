//! Domain errors.
//!
//! None of these are fatal to the controller: callers log them and carry on.

use crate::domain::value_objects::{DatapathId, RuleId, RuleOwner};

/// Failure reported by, or while talking to, a switch or the management API.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SouthboundError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("southbound request timed out")]
    Timeout,
    #[error("malformed southbound response: {0}")]
    Decode(String),
    #[error("switch {0} is not connected")]
    UnknownSwitch(DatapathId),
}

/// Failure of a flow or group install.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InstallError {
    #[error(transparent)]
    Southbound(#[from] SouthboundError),
    #[error("{owner} installer refused rule {rule_id} from another identity space")]
    ForeignIdentity { owner: RuleOwner, rule_id: RuleId },
}
