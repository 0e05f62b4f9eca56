//! Artifact versions.
//!
//! A published database is identified by the UTC time it was built, written
//! as `yyyy/epochMs` (for example `2022/1655832359111`). The year component
//! only groups versions in the object store; ordering uses the timestamp.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A database version: build time in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    year: i32,
    millis: u64,
}

impl Version {
    /// Version for a build at `millis` since the epoch.
    pub fn from_millis(millis: u64) -> Result<Self> {
        let time = i64::try_from(millis)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| Error::InvalidVersion(millis.to_string()))?;
        Ok(Self {
            year: time.year(),
            millis,
        })
    }

    /// Version for a build happening now.
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            year: now.year(),
            millis: now.timestamp_millis().max(0) as u64,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// The bare timestamp.
    pub fn millis(&self) -> u64 {
        self.millis
    }

    /// Bare form, as used in download URLs.
    pub fn bare(&self) -> String {
        self.millis.to_string()
    }

    /// Whether the timestamp lies after the current time.
    pub fn is_in_future(&self) -> bool {
        self.millis > Utc::now().timestamp_millis().max(0) as u64
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.year, self.millis)
    }
}

impl FromStr for Version {
    type Err = Error;

    /// Accepts `yyyy/epochMs` or a bare `epochMs`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::InvalidVersion(s.to_string());

        match s.find('/') {
            Some(4) => {
                let (year, millis) = s.split_at(4);
                let year: i32 = year.parse().map_err(|_| invalid())?;
                let millis: u64 = millis[1..].parse().map_err(|_| invalid())?;
                let version = Self::from_millis(millis)?;
                if version.year != year {
                    return Err(invalid());
                }
                Ok(version)
            }
            Some(_) => Err(invalid()),
            None => Self::from_millis(s.parse::<u64>().map_err(|_| invalid())?),
        }
    }
}

impl TryFrom<String> for Version {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

/// Decide whether a client at `current` should fetch `latest`.
///
/// A missing version on either side always asks for an update.
pub fn should_update(latest: Option<&Version>, current: Option<&Version>) -> bool {
    match (latest, current) {
        (Some(latest), Some(current)) => latest.millis > current.millis,
        _ => true,
    }
}
