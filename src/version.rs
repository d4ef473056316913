//! Dotted numeric version comparison
//!
//! Only plain `major.minor.patch`-style versions are supported. Pre-release
//! and build-metadata suffixes (`4.4.9-rc1`, `1.0+build5`) are rejected
//! rather than guessed at.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{StewardError, StewardResult};

/// A parsed dotted numeric version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    segments: Vec<u64>,
}

impl Version {
    /// Parse `1`, `1.2`, `1.2.3`, ... with an optional leading `v`
    pub fn parse(s: &str) -> StewardResult<Self> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('v').unwrap_or(trimmed);

        if digits.is_empty() {
            return Err(StewardError::Version(format!("empty version string '{}'", s)));
        }

        let segments = digits
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(StewardError::Version(format!(
                        "'{}' is not a dotted numeric version",
                        s
                    )));
                }
                part.parse::<u64>().map_err(|e| {
                    StewardError::Version(format!("segment '{}' of '{}': {}", part, s, e))
                })
            })
            .collect::<StewardResult<Vec<_>>>()?;

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    fn segment(&self, i: usize) -> u64 {
        self.segments.get(i).copied().unwrap_or(0)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Missing trailing segments count as zero: 1.2 == 1.2.0
        let len = self.segments.len().max(other.segments.len());
        (0..len)
            .map(|i| self.segment(i).cmp(&other.segment(i)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(u64::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

impl FromStr for Version {
    type Err = StewardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = StewardError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

/// How a candidate version relates to the installed one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionChange {
    Same,
    Upgrade,
    Downgrade,
}

impl VersionChange {
    /// The relation seen from the other side
    pub fn inverse(self) -> Self {
        match self {
            Self::Same => Self::Same,
            Self::Upgrade => Self::Downgrade,
            Self::Downgrade => Self::Upgrade,
        }
    }
}

impl fmt::Display for VersionChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Same => "same",
            Self::Upgrade => "upgrade",
            Self::Downgrade => "downgrade",
        })
    }
}

/// Classify `candidate` relative to `installed`
pub fn classify(installed: &Version, candidate: &Version) -> VersionChange {
    match candidate.cmp(installed) {
        Ordering::Equal => VersionChange::Same,
        Ordering::Greater => VersionChange::Upgrade,
        Ordering::Less => VersionChange::Downgrade,
    }
}

/// Parse both strings and classify
pub fn compare(installed: &str, candidate: &str) -> StewardResult<VersionChange> {
    Ok(classify(&Version::parse(installed)?, &Version::parse(candidate)?))
}
