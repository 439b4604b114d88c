//! Maven version parsing and ordering.
//!
//! Maven versions do not follow semver: parts are split on `.` and `-` and
//! at letter/digit boundaries, numeric parts compare as numbers, and string
//! qualifiers carry a defined ladder
//! `alpha < beta < milestone < rc < snapshot < "" (release) < sp`.
//! Anything after `+` is build metadata: ignored for ordering, except as a
//! lexicographic tie-break when both versions carry it.

use std::cmp::Ordering;
use std::fmt;

/// A parsed version with comparable parts.
#[derive(Debug, Clone)]
pub struct MavenVersion {
    original: String,
    parts: Vec<Part>,
    build: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum Part {
    Number(u64),
    Qualifier(Qualifier),
    Text(String),
}

/// Well-known qualifiers, in precedence order.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
enum Qualifier {
    Alpha,
    Beta,
    Milestone,
    Rc,
    Snapshot,
    Release,
    Sp,
}

impl MavenVersion {
    pub fn parse(version: &str) -> Self {
        let (main, build) = match version.split_once('+') {
            Some((main, build)) => (main, Some(build.to_string())),
            None => (version, None),
        };
        Self {
            original: version.to_string(),
            parts: split_parts(main),
            build,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    pub fn is_snapshot(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::Qualifier(Qualifier::Snapshot)))
    }

    /// A version carrying a pre-release qualifier (alpha, beta, milestone,
    /// rc, or snapshot). Text qualifiers like `jre` do not count.
    pub fn is_prerelease(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::Qualifier(q) if *q < Qualifier::Release))
    }

    /// The n-th part, when numeric. `1.2.3-rc` has numeric parts `[1, 2, 3]`.
    pub fn numeric_part(&self, index: usize) -> Option<u64> {
        match self.parts.get(index) {
            Some(Part::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn major(&self) -> Option<u64> {
        self.numeric_part(0)
    }

    pub fn minor(&self) -> Option<u64> {
        self.numeric_part(1)
    }

    pub fn patch(&self) -> Option<u64> {
        self.numeric_part(2)
    }
}

impl fmt::Display for MavenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl PartialEq for MavenVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MavenVersion {}

impl Ord for MavenVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let ord = cmp_parts(self.parts.get(i), other.parts.get(i));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        // Build metadata breaks ties only when both versions carry it.
        match (&self.build, &other.build) {
            (Some(a), Some(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl PartialOrd for MavenVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare one part position; a missing part compares as an empty
/// (release) part, so `1.0` equals `1.0.0` and `1.0` ranks above `1.0-rc`.
fn cmp_parts(a: Option<&Part>, b: Option<&Part>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(part), None) => cmp_to_missing(part),
        (None, Some(part)) => cmp_to_missing(part).reverse(),
        (Some(a), Some(b)) => cmp_two(a, b),
    }
}

fn cmp_to_missing(part: &Part) -> Ordering {
    match part {
        Part::Number(0) => Ordering::Equal,
        Part::Number(_) => Ordering::Greater,
        Part::Qualifier(q) => q.cmp(&Qualifier::Release),
        Part::Text(_) => Ordering::Less,
    }
}

fn cmp_two(a: &Part, b: &Part) -> Ordering {
    match (a, b) {
        (Part::Number(a), Part::Number(b)) => a.cmp(b),
        (Part::Qualifier(a), Part::Qualifier(b)) => a.cmp(b),
        (Part::Number(_), _) => Ordering::Greater,
        (_, Part::Number(_)) => Ordering::Less,
        (Part::Text(a), Part::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Part::Qualifier(q), Part::Text(_)) => {
            if *q >= Qualifier::Release {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (Part::Text(_), Part::Qualifier(q)) => {
            if *q >= Qualifier::Release {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
    }
}

/// Split on `.` and `-`, then split each token again at letter/digit
/// boundaries so compact forms like `M1` or `rc2` become qualifier + number.
fn split_parts(version: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    for token in version.split(['.', '-']) {
        if token.is_empty() {
            continue;
        }
        let mut run = String::new();
        let mut run_is_digit = token.chars().next().is_some_and(|c| c.is_ascii_digit());
        for ch in token.chars() {
            if ch.is_ascii_digit() != run_is_digit {
                parts.push(classify(&run));
                run.clear();
                run_is_digit = !run_is_digit;
            }
            run.push(ch);
        }
        parts.push(classify(&run));
    }
    parts
}

fn classify(token: &str) -> Part {
    if let Ok(n) = token.parse::<u64>() {
        return Part::Number(n);
    }
    match token.to_lowercase().as_str() {
        "alpha" | "a" => Part::Qualifier(Qualifier::Alpha),
        "beta" | "b" => Part::Qualifier(Qualifier::Beta),
        "milestone" | "m" => Part::Qualifier(Qualifier::Milestone),
        "rc" | "cr" => Part::Qualifier(Qualifier::Rc),
        "snapshot" => Part::Qualifier(Qualifier::Snapshot),
        "ga" | "final" | "release" => Part::Qualifier(Qualifier::Release),
        "sp" => Part::Qualifier(Qualifier::Sp),
        _ => Part::Text(token.to_string()),
    }
}
