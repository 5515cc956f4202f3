//! Registration lifecycle states

use serde::Serialize;

/// Where the node stands with respect to a registry
///
/// ```text
/// Idle -> Discovering -> Publishing -> Registered -> Deregistering -> Terminated
///             ^   |          |             |
///             |   |          +-- rejected -+-- heartbeat failed
///             +---+----------+-------------+
///                 +-- cancelled (nothing bound) --> Terminated
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationState {
    #[default]
    Idle,
    Discovering,
    Publishing,
    Registered,
    Deregistering,
    Terminated,
}

impl RegistrationState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Publishing => "publishing",
            Self::Registered => "registered",
            Self::Deregistering => "deregistering",
            Self::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
