//! Version Range - 패키지 버전 제약
//!
//! 지원하는 표기:
//! - `""`, `"*"`: 모든 버전
//! - `"1.2.0"`: 최소 버전 (>= 1.2.0)
//! - `"[1.0,2.0)"`, `"(,2.0]"`, `"[1.0]"`: 구간 표기
//! - 그 외 `semver::VersionReq` 표현식 (`">=1.0, <2.0"`, `"^1.4"`)

use kiln_foundation::{Error, Result};
use semver::{BuildMetadata, Comparator, Op, Prerelease, Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 버전 범위
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    raw: String,
    req: VersionReq,
}

impl VersionRange {
    /// 모든 버전을 허용하는 범위
    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            req: VersionReq::STAR,
        }
    }

    /// 정확히 한 버전만 허용하는 범위
    pub fn exact(version: &Version) -> Self {
        let raw = format!("[{}]", version);
        let req = VersionReq {
            comparators: vec![Comparator {
                op: Op::Exact,
                major: version.major,
                minor: Some(version.minor),
                patch: Some(version.patch),
                pre: version.pre.clone(),
            }],
        };
        Self { raw, req }
    }

    /// 범위 문자열 파싱
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();

        if raw.is_empty() || raw == "*" {
            return Ok(Self::any());
        }

        let expression = if raw.starts_with('[') || raw.starts_with('(') {
            interval_to_req(raw)?
        } else if is_bare_version(raw) {
            format!(">={}", normalize_version(raw))
        } else {
            raw.to_string()
        };

        let req = VersionReq::parse(&expression)
            .map_err(|e| Error::InvalidInput(format!("invalid version range '{}': {}", raw, e)))?;

        Ok(Self {
            raw: raw.to_string(),
            req,
        })
    }

    /// 모든 버전을 허용하는지 여부
    pub fn is_any(&self) -> bool {
        self.req.comparators.is_empty()
    }

    /// 범위 자체가 프리릴리스를 명시하는지 여부
    pub fn mentions_prerelease(&self) -> bool {
        self.req.comparators.iter().any(|c| !c.pre.is_empty())
    }

    /// 버전이 범위를 만족하는지 확인
    ///
    /// 프리릴리스 버전은 `include_prerelease`가 true일 때만 매칭됩니다.
    /// 비교는 semver 전체 순서로 수행하므로 `>=1.0.0-beta`의 범위 안에 있는
    /// `1.0.0-rc.1`도 허용됩니다.
    pub fn matches(&self, version: &Version, include_prerelease: bool) -> bool {
        if !version.pre.is_empty() && !include_prerelease {
            return false;
        }

        let version = Version {
            build: BuildMetadata::EMPTY,
            ..version.clone()
        };

        self.req
            .comparators
            .iter()
            .all(|c| comparator_allows(c, &version))
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl TryFrom<String> for VersionRange {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<VersionRange> for String {
    fn from(range: VersionRange) -> Self {
        range.raw
    }
}

// ============================================================================
// 파싱 헬퍼
// ============================================================================

fn is_bare_version(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_digit())
        && !s.contains([',', ' ', '*', 'x', 'X'])
}

/// "1" / "1.2" 를 "1.0.0" / "1.2.0" 으로 확장 (프리릴리스/빌드 유지)
fn normalize_version(s: &str) -> String {
    let split = s.find(['-', '+']).unwrap_or(s.len());
    let (core, rest) = s.split_at(split);
    let parts = core.split('.').count();

    let mut normalized = core.to_string();
    for _ in parts..3 {
        normalized.push_str(".0");
    }
    normalized.push_str(rest);
    normalized
}

/// 구간 표기를 VersionReq 표현식으로 변환
fn interval_to_req(raw: &str) -> Result<String> {
    let invalid = || Error::InvalidInput(format!("invalid version interval '{}'", raw));

    let lower_inclusive = raw.starts_with('[');
    let upper_inclusive = raw.ends_with(']');
    if !(raw.ends_with(']') || raw.ends_with(')')) || raw.len() < 3 {
        return Err(invalid());
    }

    let inner = &raw[1..raw.len() - 1];

    let Some((lower, upper)) = inner.split_once(',') else {
        // [1.0] 형태만 허용
        if !(lower_inclusive && upper_inclusive) || inner.trim().is_empty() {
            return Err(invalid());
        }
        return Ok(format!("={}", normalize_version(inner.trim())));
    };

    let mut parts = Vec::new();
    let lower = lower.trim();
    let upper = upper.trim();

    if !lower.is_empty() {
        let op = if lower_inclusive { ">=" } else { ">" };
        parts.push(format!("{}{}", op, normalize_version(lower)));
    }
    if !upper.is_empty() {
        let op = if upper_inclusive { "<=" } else { "<" };
        parts.push(format!("{}{}", op, normalize_version(upper)));
    }

    if parts.is_empty() {
        Ok("*".to_string())
    } else {
        Ok(parts.join(", "))
    }
}

// ============================================================================
// Comparator 평가
// ============================================================================

struct Bound {
    version: Version,
    inclusive: bool,
}

fn inclusive(version: Version) -> Option<Bound> {
    Some(Bound {
        version,
        inclusive: true,
    })
}

fn exclusive(version: Version) -> Option<Bound> {
    Some(Bound {
        version,
        inclusive: false,
    })
}

/// Comparator를 (하한, 상한) 구간으로 변환
fn bounds(c: &Comparator) -> Option<(Option<Bound>, Option<Bound>)> {
    let base = Version {
        major: c.major,
        minor: c.minor.unwrap_or(0),
        patch: c.patch.unwrap_or(0),
        pre: c.pre.clone(),
        build: BuildMetadata::EMPTY,
    };
    let next_major = Version::new(c.major + 1, 0, 0);
    let next_minor = |minor: u64| Version::new(c.major, minor + 1, 0);

    let range = match c.op {
        Op::Exact | Op::Wildcard => match (c.minor, c.patch) {
            (Some(_), Some(_)) => (inclusive(base.clone()), inclusive(base)),
            (Some(minor), None) => (inclusive(base), exclusive(next_minor(minor))),
            (None, _) => (inclusive(base), exclusive(next_major)),
        },
        Op::Greater => match (c.minor, c.patch) {
            (Some(_), Some(_)) => (exclusive(base), None),
            (Some(minor), None) => (inclusive(next_minor(minor)), None),
            (None, _) => (inclusive(next_major), None),
        },
        Op::GreaterEq => (inclusive(base), None),
        Op::Less => (None, exclusive(base)),
        Op::LessEq => match (c.minor, c.patch) {
            (Some(_), Some(_)) => (None, inclusive(base)),
            (Some(minor), None) => (None, exclusive(next_minor(minor))),
            (None, _) => (None, exclusive(next_major)),
        },
        Op::Tilde => match c.minor {
            Some(minor) => (inclusive(base), exclusive(next_minor(minor))),
            None => (inclusive(base), exclusive(next_major)),
        },
        Op::Caret => {
            let upper = match (c.minor, c.patch) {
                _ if c.major > 0 => next_major,
                (Some(minor), Some(patch)) if minor == 0 => {
                    Version::new(0, 0, patch + 1)
                }
                (Some(minor), _) => next_minor(minor),
                (None, _) => next_major,
            };
            (inclusive(base), exclusive(upper))
        }
        _ => return None,
    };

    Some(range)
}

fn comparator_allows(c: &Comparator, version: &Version) -> bool {
    let Some((lower, upper)) = bounds(c) else {
        return false;
    };

    let above_lower = lower.map_or(true, |b| {
        version > &b.version || (b.inclusive && version == &b.version)
    });
    let below_upper = upper.map_or(true, |b| {
        version < &b.version || (b.inclusive && version == &b.version)
    });

    above_lower && below_upper
}

/// 프리릴리스 여부
pub fn is_prerelease(version: &Version) -> bool {
    version.pre != Prerelease::EMPTY
}
