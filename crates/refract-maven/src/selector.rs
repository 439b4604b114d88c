//! Version selector grammar and candidate filtering.
//!
//! Selectors are validated when a recipe is constructed; an unparseable
//! pattern surfaces as `InvalidVersionSelector` and the recipe never runs.
//!
//! Recognized forms:
//!
//! | Pattern          | Meaning                                    |
//! |------------------|--------------------------------------------|
//! | `1.2.3`          | exactly that version                       |
//! | `latest.release` | newest stable release                      |
//! | `latest.patch`   | newest patch of the current major.minor    |
//! | `1.X`, `1.2.X`   | wildcard at trailing positions             |
//! | `[1.0,2.0)` etc. | interval with inclusive/exclusive bounds   |
//! | `~1.2.3`         | patch-level range `>=1.2.3 <1.3`           |
//! | `^1.2.3`         | compatible range `>=1.2.3 <2.0`            |
//!
//! Pre-release candidates are excluded by every form except explicit
//! intervals, which admit anything inside their bounds. An optional
//! metadata pattern (a regex) filters candidates before ordering.

use std::cmp::Ordering;

use regex::Regex;

use refract_util::errors::RefractError;

use crate::version::MavenVersion;

/// A bound of an interval range.
#[derive(Debug, Clone)]
pub struct Bound {
    pub version: MavenVersion,
    pub inclusive: bool,
}

/// A Maven interval range such as `[1.0,2.0)`, `[1.0,]`, `(,2.0)`, or the
/// exact form `[1.0]`.
#[derive(Debug, Clone)]
pub struct VersionRange {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

impl VersionRange {
    /// Parse an interval expression. Returns an error for anything that
    /// starts like a range but is malformed.
    pub fn parse(spec: &str) -> miette::Result<Self> {
        let s = spec.trim();
        let open_inclusive = match s.chars().next() {
            Some('[') => true,
            Some('(') => false,
            _ => return Err(invalid(spec, "ranges start with '[' or '('")),
        };
        let close_inclusive = match s.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(invalid(spec, "ranges end with ']' or ')'")),
        };
        let inner = &s[1..s.len() - 1];

        if let Some((lower, upper)) = inner.split_once(',') {
            let lower = lower.trim();
            let upper = upper.trim();
            Ok(VersionRange {
                lower: (!lower.is_empty()).then(|| Bound {
                    version: MavenVersion::parse(lower),
                    inclusive: open_inclusive,
                }),
                upper: (!upper.is_empty()).then(|| Bound {
                    version: MavenVersion::parse(upper),
                    inclusive: close_inclusive,
                }),
            })
        } else {
            // [1.0] pins exactly 1.0
            if inner.trim().is_empty() {
                return Err(invalid(spec, "empty range"));
            }
            if !(open_inclusive && close_inclusive) {
                return Err(invalid(spec, "a single-version range must use brackets"));
            }
            let version = MavenVersion::parse(inner.trim());
            Ok(VersionRange {
                lower: Some(Bound {
                    version: version.clone(),
                    inclusive: true,
                }),
                upper: Some(Bound {
                    version,
                    inclusive: true,
                }),
            })
        }
    }

    pub fn contains(&self, version: &MavenVersion) -> bool {
        if let Some(lower) = &self.lower {
            match version.cmp(&lower.version) {
                Ordering::Less => return false,
                Ordering::Equal if !lower.inclusive => return false,
                _ => {}
            }
        }
        if let Some(upper) = &self.upper {
            match version.cmp(&upper.version) {
                Ordering::Greater => return false,
                Ordering::Equal if !upper.inclusive => return false,
                _ => {}
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
enum Selector {
    Exact(MavenVersion),
    LatestRelease,
    LatestPatch,
    /// Leading numeric parts that must match; the `X` swallows the rest.
    Wildcard(Vec<u64>),
    Range(VersionRange),
    /// `>= base` and `< ceiling`.
    Tilde {
        base: MavenVersion,
        ceiling: Vec<u64>,
    },
    Caret {
        base: MavenVersion,
        ceiling: Vec<u64>,
    },
}

/// A validated version constraint plus an optional metadata filter.
#[derive(Debug, Clone)]
pub struct VersionComparator {
    pattern: String,
    selector: Selector,
    metadata: Option<Regex>,
}

impl VersionComparator {
    /// Parse and validate a selector pattern and optional metadata regex.
    pub fn build(pattern: &str, metadata_pattern: Option<&str>) -> miette::Result<Self> {
        let metadata = match metadata_pattern {
            Some(p) => Some(Regex::new(p).map_err(|e| RefractError::InvalidVersionSelector {
                selector: p.to_string(),
                message: format!("invalid metadata pattern: {e}"),
            })?),
            None => None,
        };
        let selector = parse_selector(pattern)?;
        Ok(Self {
            pattern: pattern.to_string(),
            selector,
            metadata,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether `candidate` satisfies the constraint, given the version
    /// currently in use (needed by `latest.patch`).
    pub fn is_valid(&self, current: Option<&str>, candidate: &str) -> bool {
        if let Some(metadata) = &self.metadata {
            if !metadata.is_match(candidate) {
                return false;
            }
        }
        let version = MavenVersion::parse(candidate);
        match &self.selector {
            Selector::Exact(exact) => version == *exact,
            Selector::LatestRelease => !version.is_prerelease(),
            Selector::LatestPatch => {
                let Some(current) = current.map(MavenVersion::parse) else {
                    return false;
                };
                !version.is_prerelease()
                    && version.major() == current.major()
                    && version.minor() == current.minor()
                    && version >= current
            }
            Selector::Wildcard(prefix) => {
                !version.is_prerelease()
                    && prefix
                        .iter()
                        .enumerate()
                        .all(|(i, n)| version.numeric_part(i) == Some(*n))
            }
            Selector::Range(range) => range.contains(&version),
            Selector::Tilde { base, ceiling } | Selector::Caret { base, ceiling } => {
                !version.is_prerelease()
                    && version >= *base
                    && version < MavenVersion::parse(&join_numeric(ceiling))
            }
        }
    }

    /// Total order over candidates; Maven precedence rules.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        MavenVersion::parse(a).cmp(&MavenVersion::parse(b))
    }

    /// The greatest valid candidate, if any.
    pub fn select<'a, I>(&self, current: Option<&str>, candidates: I) -> Option<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter(|c| self.is_valid(current, c))
            .max_by(|a, b| self.compare(a, b))
            .map(|s| s.to_string())
    }

    /// The greatest valid candidate strictly newer than `current`, if any.
    pub fn upgrade<'a, I>(&self, current: &str, candidates: I) -> Option<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let current_version = MavenVersion::parse(current);
        self.select(Some(current), candidates)
            .filter(|picked| MavenVersion::parse(picked) > current_version)
    }
}

fn parse_selector(pattern: &str) -> miette::Result<Selector> {
    let p = pattern.trim();
    if p.is_empty() {
        return Err(invalid(pattern, "empty selector"));
    }
    match p {
        "latest.release" => return Ok(Selector::LatestRelease),
        "latest.patch" => return Ok(Selector::LatestPatch),
        _ => {}
    }
    if p.starts_with('[') || p.starts_with('(') {
        return Ok(Selector::Range(VersionRange::parse(p)?));
    }
    if let Some(base) = p.strip_prefix('~') {
        let (base, ceiling) = compatible_bounds(pattern, base, true)?;
        return Ok(Selector::Tilde { base, ceiling });
    }
    if let Some(base) = p.strip_prefix('^') {
        let (base, ceiling) = compatible_bounds(pattern, base, false)?;
        return Ok(Selector::Caret { base, ceiling });
    }
    if p.split('.').any(|part| part.eq_ignore_ascii_case("x")) {
        return parse_wildcard(pattern, p).map(Selector::Wildcard);
    }
    Ok(Selector::Exact(MavenVersion::parse(p)))
}

/// `1.X` / `1.2.X`: numeric leading parts followed by a single trailing `X`.
fn parse_wildcard(pattern: &str, p: &str) -> miette::Result<Vec<u64>> {
    let parts: Vec<&str> = p.split('.').collect();
    let Some((last, prefix)) = parts.split_last() else {
        return Err(invalid(pattern, "empty selector"));
    };
    if !last.eq_ignore_ascii_case("x") || prefix.is_empty() {
        return Err(invalid(pattern, "wildcards are only allowed at trailing positions"));
    }
    prefix
        .iter()
        .map(|part| {
            part.parse::<u64>()
                .map_err(|_| invalid(pattern, "wildcards are only allowed at trailing positions"))
        })
        .collect()
}

/// Lower bound and exclusive numeric ceiling for tilde/caret ranges.
///
/// Tilde bumps the last-but-one given part (`~1.2.3` → `<1.3`); caret bumps
/// the first non-zero part (`^1.2.3` → `<2`, `^0.2.3` → `<0.3`).
fn compatible_bounds(
    pattern: &str,
    base: &str,
    patch_level: bool,
) -> miette::Result<(MavenVersion, Vec<u64>)> {
    let parsed = MavenVersion::parse(base);
    let mut numbers = Vec::new();
    let mut index = 0;
    while let Some(n) = parsed.numeric_part(index) {
        numbers.push(n);
        index += 1;
    }
    if numbers.is_empty() {
        return Err(invalid(pattern, "expected a numeric version after the operator"));
    }

    let ceiling = if patch_level {
        match numbers.len() {
            1 => vec![numbers[0] + 1],
            _ => vec![numbers[0], numbers[1] + 1],
        }
    } else {
        match numbers.iter().position(|&n| n != 0) {
            Some(i) => {
                let mut c = numbers[..i].to_vec();
                c.push(numbers[i] + 1);
                c
            }
            // ^0.0.0 and friends: nothing is compatible beyond the base
            None => {
                let mut c = numbers.clone();
                if let Some(last) = c.last_mut() {
                    *last += 1;
                }
                c
            }
        }
    };
    Ok((parsed, ceiling))
}

fn join_numeric(parts: &[u64]) -> String {
    parts
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

fn invalid(selector: &str, message: &str) -> miette::Report {
    RefractError::InvalidVersionSelector {
        selector: selector.to_string(),
        message: message.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(pattern: &str) -> VersionComparator {
        VersionComparator::build(pattern, None).unwrap()
    }

    #[test]
    fn exact_matches_only_itself() {
        let cmp = build("1.2.3");
        assert!(cmp.is_valid(None, "1.2.3"));
        assert!(!cmp.is_valid(None, "1.2.4"));
    }

    #[test]
    fn latest_release_excludes_prereleases() {
        let cmp = build("latest.release");
        assert!(cmp.is_valid(None, "2.4.0"));
        assert!(!cmp.is_valid(None, "3.0.0-M1"));
        assert!(!cmp.is_valid(None, "2.5.0-SNAPSHOT"));
        assert_eq!(
            cmp.select(None, ["2.4.0", "3.0.0-M1", "2.3.1"]),
            Some("2.4.0".to_string())
        );
    }

    #[test]
    fn latest_patch_stays_on_minor_line() {
        let cmp = build("latest.patch");
        assert!(cmp.is_valid(Some("2.3.0"), "2.3.1"));
        assert!(!cmp.is_valid(Some("2.3.0"), "2.4.0"));
        assert!(!cmp.is_valid(Some("2.3.1"), "2.3.0"));
        assert!(!cmp.is_valid(None, "2.3.1"));
    }

    #[test]
    fn wildcard_major() {
        let cmp = build("2.X");
        assert!(cmp.is_valid(None, "2.3.0"));
        assert!(cmp.is_valid(None, "2.4.0"));
        assert!(!cmp.is_valid(None, "3.0.0"));
        assert!(!cmp.is_valid(None, "3.0.0-M1"));
    }

    #[test]
    fn wildcard_major_minor() {
        let cmp = build("2.3.X");
        assert!(cmp.is_valid(None, "2.3.1"));
        assert!(!cmp.is_valid(None, "2.4.0"));
    }

    #[test]
    fn wildcard_only_at_trailing_positions() {
        assert!(VersionComparator::build("1.X.2", None).is_err());
        assert!(VersionComparator::build(".X", None).is_err());
    }

    #[test]
    fn interval_ranges() {
        let cmp = build("[1.0,2.0)");
        assert!(cmp.is_valid(None, "1.0"));
        assert!(cmp.is_valid(None, "1.9.9"));
        assert!(!cmp.is_valid(None, "2.0"));

        let pinned = build("[1.5]");
        assert!(pinned.is_valid(None, "1.5"));
        assert!(!pinned.is_valid(None, "1.6"));

        let open = build("(,2.0]");
        assert!(open.is_valid(None, "0.1"));
        assert!(open.is_valid(None, "2.0"));
        assert!(!open.is_valid(None, "2.1"));
    }

    #[test]
    fn malformed_range_is_invalid_selector() {
        assert!(VersionComparator::build("[1.0,2.0", None).is_err());
        assert!(VersionComparator::build("[]", None).is_err());
        assert!(VersionComparator::build("(1.0)", None).is_err());
    }

    #[test]
    fn tilde_is_patch_level() {
        let cmp = build("~1.2.3");
        assert!(cmp.is_valid(None, "1.2.3"));
        assert!(cmp.is_valid(None, "1.2.9"));
        assert!(!cmp.is_valid(None, "1.3.0"));
        assert!(!cmp.is_valid(None, "1.2.2"));
    }

    #[test]
    fn caret_is_compatible_with() {
        let cmp = build("^1.2.3");
        assert!(cmp.is_valid(None, "1.2.3"));
        assert!(cmp.is_valid(None, "1.9.0"));
        assert!(!cmp.is_valid(None, "2.0.0"));

        let zero = build("^0.2.3");
        assert!(zero.is_valid(None, "0.2.9"));
        assert!(!zero.is_valid(None, "0.3.0"));
    }

    #[test]
    fn metadata_pattern_filters_candidates() {
        let cmp = VersionComparator::build("latest.release", Some(r"-jre$")).unwrap();
        assert!(cmp.is_valid(None, "31.0-jre"));
        assert!(!cmp.is_valid(None, "31.0-android"));
        assert!(VersionComparator::build("latest.release", Some("[unclosed")).is_err());
    }

    #[test]
    fn select_returns_unique_max() {
        let cmp = build("2.X");
        let candidates = ["2.3.0", "2.3.1", "2.4.0", "3.0.0-M1"];
        assert_eq!(cmp.select(None, candidates), Some("2.4.0".to_string()));
    }

    #[test]
    fn upgrade_requires_strictly_newer() {
        let cmp = build("2.X");
        assert_eq!(
            cmp.upgrade("2.3.0", ["2.3.0", "2.3.1", "2.4.0", "3.0.0-M1"]),
            Some("2.4.0".to_string())
        );
        assert_eq!(cmp.upgrade("2.4.0", ["2.3.0", "2.4.0"]), None);

        let patch = build("2.3.X");
        assert_eq!(patch.upgrade("2.3.0", ["2.3.0"]), None);
    }

    #[test]
    fn compare_is_total_over_candidates() {
        let cmp = build("latest.release");
        assert_eq!(cmp.compare("1.0", "1.0.0"), Ordering::Equal);
        assert_eq!(cmp.compare("1.0", "2.0"), Ordering::Less);
        assert_eq!(cmp.compare("2.0", "1.0"), Ordering::Greater);
    }
}
