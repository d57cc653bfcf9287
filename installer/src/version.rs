//! 게임 버전 비교 유틸리티 (외부 크레이트 없이)
//!
//! Minecraft 릴리스 ID("1.20.2", "1.21", "1.20.5-rc2", "1.21-pre1")를
//! major.minor[.patch][-prerelease] 로 파싱해 정렬에 사용한다. 카탈로그와
//! 파일 이름은 항상 원본 ID 문자열을 쓰고, 이 타입은 순서 비교 전용이다.

use std::cmp::Ordering;
use std::fmt;

/// 파싱된 게임 버전 (major.minor.patch[-prerelease])
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
}

impl GameVersion {
    /// "1.20.2", "v1.2.3", "1.21-pre1" 형식을 파싱
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.strip_prefix('v').unwrap_or(s);
        let (version_part, prerelease) = if let Some(idx) = s.find('-') {
            (&s[..idx], Some(s[idx + 1..].to_string()))
        } else {
            (s, None)
        };

        let parts: Vec<&str> = version_part.split('.').collect();
        if parts.len() < 2 {
            return None;
        }

        let major = parts[0].parse().ok()?;
        let minor = parts[1].parse().ok()?;
        let patch = parts.get(2).and_then(|p| p.parse().ok()).unwrap_or(0);

        Some(Self { major, minor, patch, prerelease })
    }

    /// 현재 버전보다 새로운 버전인지 확인
    pub fn is_newer_than(&self, other: &GameVersion) -> bool {
        self > other
    }

    /// 프리릴리스(-pre / -rc 등) 여부
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }
}

impl fmt::Display for GameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl Ord for GameVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.major.cmp(&other.major) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.minor.cmp(&other.minor) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.patch.cmp(&other.patch) {
            Ordering::Equal => {}
            ord => return ord,
        }
        // 프리릴리스가 있으면 정식 릴리스보다 낮음
        match (&self.prerelease, &other.prerelease) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater, // 정식 > 프리릴리스
            (Some(_), None) => Ordering::Less,    // 프리릴리스 < 정식
            (Some(a), Some(b)) => compare_prerelease(a, b),
        }
    }
}

impl PartialOrd for GameVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 프리릴리스 식별자 비교. 점으로 나눈 세그먼트별로, 숫자 접미사는
/// 숫자로 비교한다 ("rc2" < "rc10", "pre1" < "rc1", "beta.2" < "beta.10").
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare_segment(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_segment(a: &str, b: &str) -> Ordering {
    let (a_word, a_num) = split_numeric_suffix(a);
    let (b_word, b_num) = split_numeric_suffix(b);
    match a_word.cmp(b_word) {
        Ordering::Equal => a_num.cmp(&b_num),
        ord => ord,
    }
}

/// "rc10" -> ("rc", Some(10)), "7" -> ("", Some(7)), "beta" -> ("beta", None)
fn split_numeric_suffix(s: &str) -> (&str, Option<u64>) {
    let split = s
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let (word, digits) = s.split_at(split);
    (word, digits.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic() {
        let v = GameVersion::parse("1.20.2").unwrap();
        assert_eq!(v.major, 1);
        assert_eq!(v.minor, 20);
        assert_eq!(v.patch, 2);
        assert!(v.prerelease.is_none());
    }

    #[test]
    fn parse_two_component_release() {
        // "1.21" is a full release with implicit patch 0
        let v = GameVersion::parse("1.21").unwrap();
        assert_eq!(v.minor, 21);
        assert_eq!(v.patch, 0);
    }

    #[test]
    fn parse_with_v_prefix() {
        let v = GameVersion::parse("v0.1.0").unwrap();
        assert_eq!(v.major, 0);
        assert_eq!(v.minor, 1);
    }

    #[test]
    fn parse_prerelease() {
        let v = GameVersion::parse("1.20.5-rc2").unwrap();
        assert!(v.is_prerelease());
        assert_eq!(v.prerelease, Some("rc2".to_string()));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(GameVersion::parse("latest").is_none());
        assert!(GameVersion::parse("1").is_none());
        assert!(GameVersion::parse("a.b.c").is_none());
    }

    #[test]
    fn compare_versions() {
        let v1 = GameVersion::parse("1.20.1").unwrap();
        let v2 = GameVersion::parse("1.20.2").unwrap();
        assert!(v2.is_newer_than(&v1));

        let v3 = GameVersion::parse("1.21").unwrap();
        assert!(v3.is_newer_than(&v2));
    }

    #[test]
    fn prerelease_less_than_release() {
        let pre = GameVersion::parse("1.21-pre1").unwrap();
        let rel = GameVersion::parse("1.21").unwrap();
        assert!(rel.is_newer_than(&pre));
    }

    #[test]
    fn numeric_prerelease_ordering() {
        let rc2 = GameVersion::parse("1.21-rc2").unwrap();
        let rc10 = GameVersion::parse("1.21-rc10").unwrap();
        assert!(rc10.is_newer_than(&rc2));

        // pre-releases come before release candidates
        let pre3 = GameVersion::parse("1.21-pre3").unwrap();
        let rc1 = GameVersion::parse("1.21-rc1").unwrap();
        assert!(rc1.is_newer_than(&pre3));
    }

    #[test]
    fn dotted_prerelease_ordering() {
        let b2 = GameVersion::parse("1.0.0-beta.2").unwrap();
        let b10 = GameVersion::parse("1.0.0-beta.10").unwrap();
        assert!(b10.is_newer_than(&b2));
    }
}
