use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use warden_core::{AppError, AppResult};

/// Pre-release channel of a provider version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreReleaseChannel {
    /// `alpha` builds.
    Alpha,
    /// `beta` builds.
    Beta,
    /// Release candidates.
    Rc,
}

impl PreReleaseChannel {
    fn parse(label: &str) -> Option<Self> {
        match label {
            "alpha" => Some(Self::Alpha),
            "beta" => Some(Self::Beta),
            "rc" => Some(Self::Rc),
            _ => None,
        }
    }
}

/// Pre-release tag such as `alpha1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PreRelease {
    /// Channel label.
    pub channel: PreReleaseChannel,
    /// Iteration within the channel, zero when absent.
    pub iteration: u64,
}

/// Parsed provider version.
///
/// Accepts `v1`, `v1.2`, `v1.2.3`, `v1alpha1`, `v2beta`, `v1.2.0-rc.1` and the
/// same forms without the leading `v`. A pre-release always orders below the
/// release with the same numeric components.
#[derive(Debug, Clone)]
pub struct ProviderVersion {
    raw: String,
    major: u64,
    minor: u64,
    patch: u64,
    pre_release: Option<PreRelease>,
}

impl ProviderVersion {
    /// Parses a version string.
    pub fn parse(value: &str) -> AppResult<Self> {
        let invalid = || AppError::Validation(format!("invalid provider version '{value}'"));
        let body = value.strip_prefix('v').unwrap_or(value);

        let numeric_len = body
            .find(|character: char| !(character.is_ascii_digit() || character == '.'))
            .unwrap_or(body.len());
        let (numeric, suffix) = body.split_at(numeric_len);
        if numeric.is_empty() || numeric.ends_with('.') {
            return Err(invalid());
        }

        let mut components = numeric.split('.').map(|part| {
            if part.is_empty() {
                return Err(invalid());
            }
            part.parse::<u64>().map_err(|_| invalid())
        });
        let major = components.next().ok_or_else(invalid)??;
        let minor = components.next().transpose()?.unwrap_or(0);
        let patch = components.next().transpose()?.unwrap_or(0);
        if components.next().is_some() {
            return Err(invalid());
        }

        let pre_release = if suffix.is_empty() {
            None
        } else {
            let tag = suffix.strip_prefix('-').unwrap_or(suffix);
            Some(parse_pre_release(tag).ok_or_else(invalid)?)
        };

        Ok(Self {
            raw: value.to_owned(),
            major,
            minor,
            patch,
            pre_release,
        })
    }

    /// Returns the version exactly as it was written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.raw.as_str()
    }

    /// Returns the major component.
    #[must_use]
    pub fn major(&self) -> u64 {
        self.major
    }

    /// Returns the pre-release tag, if any.
    #[must_use]
    pub fn pre_release(&self) -> Option<PreRelease> {
        self.pre_release
    }

    /// Returns true for pre-release versions.
    #[must_use]
    pub fn is_pre_release(&self) -> bool {
        self.pre_release.is_some()
    }
}

fn parse_pre_release(tag: &str) -> Option<PreRelease> {
    let label_len = tag
        .find(|character: char| !character.is_ascii_alphabetic())
        .unwrap_or(tag.len());
    let (label, rest) = tag.split_at(label_len);
    let channel = PreReleaseChannel::parse(label)?;
    let digits = rest.strip_prefix('.').unwrap_or(rest);

    let iteration = if digits.is_empty() {
        if rest.is_empty() { 0 } else { return None }
    } else {
        digits.parse::<u64>().ok()?
    };

    Some(PreRelease { channel, iteration })
}

/// Orders versions so that releases sort above pre-releases of the same number.
#[must_use]
pub fn compare_provider_versions(left: &ProviderVersion, right: &ProviderVersion) -> Ordering {
    (left.major, left.minor, left.patch)
        .cmp(&(right.major, right.minor, right.patch))
        .then_with(|| match (&left.pre_release, &right.pre_release) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(left), Some(right)) => left.cmp(right),
        })
}

impl PartialEq for ProviderVersion {
    fn eq(&self, other: &Self) -> bool {
        compare_provider_versions(self, other) == Ordering::Equal
    }
}

impl Eq for ProviderVersion {}

impl PartialOrd for ProviderVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProviderVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_provider_versions(self, other)
    }
}

impl FromStr for ProviderVersion {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Display for ProviderVersion {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.raw.as_str())
    }
}
