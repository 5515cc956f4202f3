//! Version tokens
//!
//! NMOS resources carry a `"<seconds>:<nanoseconds>"` version that must grow
//! every time a published field changes. Tokens compare numerically.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Monotonic resource version token
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    seconds: u64,
    nanos: u32,
}

impl Version {
    /// Build a token from its two components
    ///
    /// # Errors
    ///
    /// Returns error if `nanos` is not below one second
    pub fn new(seconds: u64, nanos: u32) -> Result<Self> {
        if nanos >= NANOS_PER_SEC {
            return Err(Error::InvalidVersion(format!(
                "sub-second part {nanos} out of range"
            )));
        }
        Ok(Self { seconds, nanos })
    }

    /// Token for the current wall-clock time
    #[must_use]
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self {
            seconds: u64::try_from(now.timestamp()).unwrap_or_default(),
            nanos: now.timestamp_subsec_nanos().min(NANOS_PER_SEC - 1),
        }
    }

    /// Next token after `self`: the current time, or one nanosecond past
    /// `self` if the clock has not moved forward
    #[must_use]
    pub fn next(self) -> Self {
        let now = Self::now();
        if now > self { now } else { self.successor() }
    }

    const fn successor(self) -> Self {
        if self.nanos + 1 < NANOS_PER_SEC {
            Self {
                seconds: self.seconds,
                nanos: self.nanos + 1,
            }
        } else {
            Self {
                seconds: self.seconds + 1,
                nanos: 0,
            }
        }
    }

    #[must_use]
    pub const fn seconds(self) -> u64 {
        self.seconds
    }

    #[must_use]
    pub const fn nanos(self) -> u32 {
        self.nanos
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.seconds, self.nanos)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (seconds, nanos) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidVersion(s.to_string()))?;
        let seconds = seconds
            .parse()
            .map_err(|_| Error::InvalidVersion(s.to_string()))?;
        let nanos = nanos
            .parse()
            .map_err(|_| Error::InvalidVersion(s.to_string()))?;
        Self::new(seconds, nanos)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A resource whose published fields are tracked by a version token
pub trait Versioned {
    fn version(&self) -> Version;

    fn version_mut(&mut self) -> &mut Version;

    /// Recompute the version token after a published field changed
    fn bump_version(&mut self) {
        let next = self.version().next();
        *self.version_mut() = next;
    }
}
