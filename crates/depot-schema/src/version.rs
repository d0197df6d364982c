//! Implementation versions and half-open version ranges.
//!
//! A version is a dotted list of integers, optionally followed by
//! `-modifier` segments, each of which may carry another dotted list:
//! `1.2`, `1.2-pre3`, `2.0-rc1`, `1.0-post`, `1.0-2`. Modifiers order as
//! `pre` < `rc` < (none) < `post`, so `1.0-pre1 < 1.0-rc1 < 1.0 < 1.0-post`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::SchemaError;

fn modifier_rank(modifier: &str) -> Option<i8> {
    match modifier {
        "pre" => Some(-2),
        "rc" => Some(-1),
        "" => Some(0),
        "post" => Some(1),
        _ => None,
    }
}

/// A parsed implementation version. Keeps the original text for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImplementationVersion {
    text: String,
    // Each dotted list paired with the modifier that follows it.
    parts: Vec<(Vec<u64>, i8)>,
}

impl ImplementationVersion {
    /// Parse a version string.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidVersion`] for empty input, unknown
    /// modifiers or non-numeric components.
    pub fn parse(text: &str) -> Result<Self, SchemaError> {
        let invalid = || SchemaError::InvalidVersion(text.to_string());
        let text = text.trim();
        if text.is_empty() {
            return Err(invalid());
        }

        let mut segments = text.split('-');
        let mut list = dotted(segments.next().unwrap_or_default()).ok_or_else(invalid)?;
        if list.is_empty() {
            return Err(invalid());
        }

        let mut parts = Vec::new();
        let mut trailing_modifier = false;
        for segment in segments {
            let split = segment
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(segment.len());
            let (modifier, rest) = segment.split_at(split);
            let rank = modifier_rank(modifier).ok_or_else(invalid)?;
            parts.push((std::mem::take(&mut list), rank));
            list = dotted(rest).ok_or_else(invalid)?;
            trailing_modifier = rest.is_empty();
        }
        // A version ending in a bare modifier (`1.0-pre`) has no final list.
        if !trailing_modifier || parts.is_empty() {
            parts.push((list, 0));
        }

        Ok(Self {
            text: text.to_string(),
            parts,
        })
    }

    /// The version exactly as written.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

fn dotted(s: &str) -> Option<Vec<u64>> {
    if s.is_empty() {
        return Some(Vec::new());
    }
    s.split('.').map(|n| n.parse().ok()).collect()
}

impl PartialEq for ImplementationVersion {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for ImplementationVersion {}

impl Hash for ImplementationVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parts.hash(state);
    }
}

impl PartialOrd for ImplementationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ImplementationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl fmt::Display for ImplementationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for ImplementationVersion {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ImplementationVersion {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ImplementationVersion> for String {
    fn from(version: ImplementationVersion) -> Self {
        version.text
    }
}

/// Half-open version interval `[not_before, before)`; either end may be open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VersionRange {
    /// Inclusive lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<ImplementationVersion>,
    /// Exclusive upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<ImplementationVersion>,
}

impl VersionRange {
    /// Range with no bounds.
    pub fn any() -> Self {
        Self::default()
    }

    /// Whether `version` lies inside the range.
    pub fn contains(&self, version: &ImplementationVersion) -> bool {
        self.not_before.as_ref().is_none_or(|low| version >= low)
            && self.before.as_ref().is_none_or(|high| version < high)
    }

    /// Whether neither end is bounded.
    pub fn is_unbounded(&self) -> bool {
        self.not_before.is_none() && self.before.is_none()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.not_before, &self.before) {
            (None, None) => f.write_str("any version"),
            (Some(low), None) => write!(f, ">= {low}"),
            (None, Some(high)) => write!(f, "< {high}"),
            (Some(low), Some(high)) => write!(f, ">= {low}, < {high}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> ImplementationVersion {
        s.parse().unwrap()
    }

    #[test]
    fn numeric_ordering() {
        assert!(v("1.0") < v("1.5"));
        assert!(v("1.5") < v("2.0"));
        assert!(v("1.10") > v("1.9"));
        assert!(v("1.2") < v("1.2.0"));
    }

    #[test]
    fn modifier_ordering() {
        assert!(v("1.0-pre1") < v("1.0-rc1"));
        assert!(v("1.0-rc1") < v("1.0"));
        assert!(v("1.0") < v("1.0-post"));
        assert!(v("1.0-pre") < v("1.0-pre1"));
        assert!(v("1.0-2") > v("1.0"));
        assert!(v("1.0-post") < v("1.0.1"));
    }

    #[test]
    fn equality_ignores_formatting_of_numbers() {
        assert_eq!(v("1.01"), v("1.1"));
        assert_eq!(v("1.01").to_string(), "1.01");
    }

    #[test]
    fn rejects_invalid() {
        for bad in ["", "abc", "1..2", "1.0-beta", "-pre"] {
            assert!(ImplementationVersion::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn range_is_half_open() {
        let range = VersionRange {
            not_before: Some(v("1.0")),
            before: Some(v("2.0")),
        };
        assert!(range.contains(&v("1.0")));
        assert!(range.contains(&v("1.5")));
        assert!(!range.contains(&v("2.0")));
        assert!(range.contains(&v("2.0-pre1")));
        assert!(!range.contains(&v("0.9")));
        assert!(VersionRange::any().contains(&v("99")));
    }

    #[test]
    fn serde_as_string() {
        let json = serde_json::to_string(&v("1.2-rc3")).unwrap();
        assert_eq!(json, "\"1.2-rc3\"");
        let back: ImplementationVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("1.2-rc3"));
    }
}
