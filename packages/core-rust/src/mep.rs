//! Message Exchange Patterns (MEPs) and MEP bindings.
//!
//! Both vocabularies are closed sets defined by the ebMS3 core specification.
//! Lookups by ID or URI are total: blank or unknown input yields `None`.
//!
//! # Wire format
//!
//! Both enums serialize as their short ID token (`"oneway"`, `"push"`, ...),
//! which is also the form stored in persisted PMode records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespace prefix shared by every ebMS3 MEP and MEP binding URI.
pub const EBMS3_CORE_NS: &str = "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/";

// ---------------------------------------------------------------------------
// Mep
// ---------------------------------------------------------------------------

/// A Message Exchange Pattern: how many user messages flow and in which directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mep {
    /// A single user message unit unrelated to other user messages.
    #[serde(rename = "oneway")]
    OneWay,
    /// Request and reply in opposite directions, the reply referencing the
    /// request via `eb:RefToMessageId`. Also known as Two-Way/Sync.
    #[serde(rename = "twoway")]
    TwoWay,
    /// Two One-Way/Push exchanges in opposite directions.
    #[serde(rename = "pushpush")]
    TwoWayPushPush,
    /// A One-Way/Push followed by a One-Way/Pull, both initiated by the same MSH.
    #[serde(rename = "pushpull")]
    TwoWayPushPull,
    /// A One-Way/Pull followed by a One-Way/Push, both initiated by the same MSH.
    #[serde(rename = "pullpush")]
    TwoWayPullPush,
}

impl Mep {
    /// Every MEP, in declaration order.
    pub const ALL: [Mep; 5] = [
        Mep::OneWay,
        Mep::TwoWay,
        Mep::TwoWayPushPush,
        Mep::TwoWayPushPull,
        Mep::TwoWayPullPush,
    ];

    /// Short unique token for this MEP.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Mep::OneWay => "oneway",
            Mep::TwoWay => "twoway",
            Mep::TwoWayPushPush => "pushpush",
            Mep::TwoWayPushPull => "pushpull",
            Mep::TwoWayPullPush => "pullpush",
        }
    }

    /// Number of user messages exchanged in one instance of this pattern.
    #[must_use]
    pub const fn message_count(self) -> u32 {
        match self {
            Mep::OneWay => 1,
            Mep::TwoWay | Mep::TwoWayPushPush | Mep::TwoWayPushPull | Mep::TwoWayPullPush => 2,
        }
    }

    /// Canonical ebMS3 URI of this MEP.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Mep::OneWay => "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/oneWay",
            Mep::TwoWay => "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/twoWay",
            Mep::TwoWayPushPush => {
                "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/pushAndPush"
            }
            Mep::TwoWayPushPull => {
                "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/pushAndPull"
            }
            Mep::TwoWayPullPush => {
                "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/pullAndPush"
            }
        }
    }

    #[must_use]
    pub const fn is_one_way(self) -> bool {
        self.message_count() == 1
    }

    #[must_use]
    pub const fn is_two_way(self) -> bool {
        self.message_count() == 2
    }

    /// Looks up a MEP by its short ID. Blank or unknown IDs yield `None`.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        if id.trim().is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|mep| mep.id() == id)
    }

    /// Looks up a MEP by exact match on its canonical URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        if uri.trim().is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|mep| mep.uri() == uri)
    }
}

impl fmt::Display for Mep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

// ---------------------------------------------------------------------------
// MepBinding
// ---------------------------------------------------------------------------

/// Transport-binding flavor of an exchange, orthogonal to the [`Mep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MepBinding {
    /// The sending MSH initiates the transfer.
    Push,
    /// The receiving MSH pulls the message with a pull request signal.
    Pull,
    /// The reply travels on the back-channel of the request connection.
    Sync,
}

impl MepBinding {
    /// Every binding, in declaration order.
    pub const ALL: [MepBinding; 3] = [MepBinding::Push, MepBinding::Pull, MepBinding::Sync];

    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            MepBinding::Push => "push",
            MepBinding::Pull => "pull",
            MepBinding::Sync => "sync",
        }
    }

    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            MepBinding::Push => "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/push",
            MepBinding::Pull => "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/pull",
            MepBinding::Sync => "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/sync",
        }
    }

    /// Looks up a binding by its short ID. Blank or unknown IDs yield `None`.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        if id.trim().is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|binding| binding.id() == id)
    }

    /// Looks up a binding by exact match on its canonical URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        if uri.trim().is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|binding| binding.uri() == uri)
    }
}

impl fmt::Display for MepBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
