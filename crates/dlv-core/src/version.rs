use std::cmp::Ordering;

/// Version ordering used to pick the published version of a stage.
///
/// `1.2.3-rc1` sorts before `1.2.3`. Everything else compares naturally:
/// digit runs by numeric value, other characters case-insensitively with
/// punctuation before digits before letters, uppercase first on ties.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    if is_prerelease_of(a, b) {
        return Ordering::Less;
    }
    if is_prerelease_of(b, a) {
        return Ordering::Greater;
    }
    natural_cmp(a, b)
}

fn is_prerelease_of(candidate: &str, release: &str) -> bool {
    candidate
        .strip_prefix(release)
        .is_some_and(|rest| rest.starts_with('-'))
}

#[derive(Clone, Copy, Debug)]
enum Segment<'a> {
    Digits(&'a str),
    Char(char),
}

fn segments(s: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = s;
    while let Some(c) = rest.chars().next() {
        if c.is_ascii_digit() {
            let end = rest.find(|ch: char| !ch.is_ascii_digit()).unwrap_or(rest.len());
            out.push(Segment::Digits(&rest[..end]));
            rest = &rest[end..];
        } else {
            out.push(Segment::Char(c));
            rest = &rest[c.len_utf8()..];
        }
    }
    out
}

fn char_class(c: char) -> u8 {
    if c.is_ascii_digit() {
        1
    } else if c.is_alphabetic() {
        2
    } else {
        0
    }
}

fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn cmp_segment(a: Segment<'_>, b: Segment<'_>) -> Ordering {
    match (a, b) {
        (Segment::Digits(x), Segment::Digits(y)) => cmp_digits(x, y),
        (Segment::Digits(_), Segment::Char(c)) => 1.cmp(&char_class(c)),
        (Segment::Char(c), Segment::Digits(_)) => char_class(c).cmp(&1),
        (Segment::Char(x), Segment::Char(y)) => char_class(x)
            .cmp(&char_class(y))
            .then_with(|| x.to_lowercase().cmp(y.to_lowercase())),
    }
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (sa, sb) = (segments(a), segments(b));
    for (x, y) in sa.iter().zip(sb.iter()) {
        let ord = cmp_segment(*x, *y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    let by_len = sa.len().cmp(&sb.len());
    if by_len != Ordering::Equal {
        return by_len;
    }
    // uppercase first on case-only differences
    for (x, y) in a.chars().zip(b.chars()) {
        if x != y && x.is_uppercase() != y.is_uppercase() {
            return if x.is_uppercase() { Ordering::Less } else { Ordering::Greater };
        }
    }
    a.cmp(b)
}

/// Running maximum over candidate versions, starting from `0.0.0`.
pub fn max_version<'a>(versions: impl IntoIterator<Item = &'a str>) -> String {
    let mut best = "0.0.0";
    for v in versions {
        if compare_versions(v, best) == Ordering::Greater {
            best = v;
        }
    }
    best.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prerelease_sorts_before_release() {
        assert_eq!(compare_versions("1.2.3-rc1", "1.2.3"), Ordering::Less);
        assert_eq!(compare_versions("1.2.3", "1.2.3-rc1"), Ordering::Greater);
    }

    #[test]
    fn digit_runs_compare_numerically() {
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.02.0", "1.2.0"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0", "10.0.0"), Ordering::Less);
    }

    #[test]
    fn case_insensitive_with_uppercase_first() {
        assert_eq!(compare_versions("1.0.0-RC", "1.0.0-rc"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0-a", "1.0.0-B"), Ordering::Less);
    }

    #[test]
    fn equal_versions() {
        assert_eq!(compare_versions("3.1.4", "3.1.4"), Ordering::Equal);
    }

    #[test]
    fn max_starts_from_zero() {
        assert_eq!(max_version(["0.0.0", "2.0.0", "1.9.0"]), "2.0.0");
        assert_eq!(max_version(Vec::<&str>::new()), "0.0.0");
    }
}
