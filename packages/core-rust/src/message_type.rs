//! AS4 message roles as they appear on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Envelope shape a constructed message must be serialized in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageWrapping {
    /// Sent as a bare `eb:UserMessage`.
    UserMessage,
    /// Must be nested inside an `eb:SignalMessage`.
    SignalMessage,
}

/// The basic message types of AS4 that can be sent or received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum As4MessageType {
    #[serde(rename = "user")]
    UserMessage,
    #[serde(rename = "pr")]
    PullRequest,
    #[serde(rename = "errormsg")]
    ErrorMessage,
    #[serde(rename = "receipt")]
    Receipt,
}

impl As4MessageType {
    pub const ALL: [As4MessageType; 4] = [
        As4MessageType::UserMessage,
        As4MessageType::PullRequest,
        As4MessageType::ErrorMessage,
        As4MessageType::Receipt,
    ];

    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            As4MessageType::UserMessage => "user",
            As4MessageType::PullRequest => "pr",
            As4MessageType::ErrorMessage => "errormsg",
            As4MessageType::Receipt => "receipt",
        }
    }

    /// Whether this message type must be wrapped in a signal message.
    #[must_use]
    pub const fn is_signal_message(self) -> bool {
        match self {
            As4MessageType::UserMessage => false,
            As4MessageType::PullRequest
            | As4MessageType::ErrorMessage
            | As4MessageType::Receipt => true,
        }
    }

    #[must_use]
    pub const fn wrapping(self) -> MessageWrapping {
        if self.is_signal_message() {
            MessageWrapping::SignalMessage
        } else {
            MessageWrapping::UserMessage
        }
    }

    /// Looks up a message type by its short ID. Blank or unknown IDs yield `None`.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        if id.trim().is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|t| t.id() == id)
    }
}

impl fmt::Display for As4MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
