//! Shell-style matching of domain names against alias patterns.
//!
//! `*` matches any run of characters (dots included), `?` matches a single character and
//! `[...]` matches a character class (`[!...]` negates, `a-z` ranges). Comparison ignores ASCII
//! case and a trailing root dot. A pattern whose first label is `*` also matches its bare parent,
//! so `*.example.com` covers both `foo.example.com` and `example.com`.

pub fn matches(pattern: &str, name: &str) -> bool {
    let pattern = normalize(pattern);
    let name = normalize(name);

    if glob_match(pattern.as_bytes(), name.as_bytes()) {
        return true;
    }

    match pattern.strip_prefix("*.") {
        Some(parent) => glob_match(parent.as_bytes(), name.as_bytes()),
        None => false,
    }
}

fn normalize(name: &str) -> String {
    name.strip_suffix('.').unwrap_or(name).to_ascii_lowercase()
}

fn glob_match(pattern: &[u8], name: &[u8]) -> bool {
    let (mut p, mut n) = (0, 0);
    // Position of the last `*` seen and the name offset it is currently standing in for.
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        let step = match pattern.get(p) {
            Some(b'*') => {
                star = Some((p, n));
                p += 1;
                continue;
            }
            Some(b'?') => Some(1),
            Some(b'[') => match class(&pattern[p..], name[n]) {
                Some((len, true)) => Some(len),
                Some((_, false)) => None,
                // Unterminated class: the bracket is literal.
                None if name[n] == b'[' => Some(1),
                None => None,
            },
            Some(&c) if c == name[n] => Some(1),
            _ => None,
        };

        match (step, star) {
            (Some(len), _) => {
                p += len;
                n += 1;
            }
            (None, Some((star_p, star_n))) => {
                p = star_p + 1;
                n = star_n + 1;
                star = Some((star_p, star_n + 1));
            }
            (None, None) => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Matches `c` against the class opening `pattern`.
///
/// Returns the length of the class expression and whether it matched, or `None` when the class
/// has no closing bracket.
fn class(pattern: &[u8], c: u8) -> Option<(usize, bool)> {
    let mut i = 1;
    let negate = matches!(pattern.get(i), Some(b'!') | Some(b'^'));
    if negate {
        i += 1;
    }

    // A `]` right after the opening bracket is a member, not the terminator.
    let first = i;
    let mut matched = false;

    loop {
        let lo = *pattern.get(i)?;
        if lo == b']' && i > first {
            return Some((i + 1, matched != negate));
        }

        match (pattern.get(i + 1), pattern.get(i + 2)) {
            (Some(b'-'), Some(&hi)) if hi != b']' => {
                matched |= lo <= c && c <= hi;
                i += 3;
            }
            _ => {
                matched |= lo == c;
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wildcard_matches_subdomains() {
        assert!(matches("*.example.com", "foo.example.com"));
        assert!(matches("*.example.com", "a.b.example.com"));
    }

    #[test]
    fn leading_wildcard_label_matches_the_parent() {
        assert!(matches("*.example.com", "example.com"));
        assert!(!matches("*.example.com", "badexample.com.evil"));
        assert!(!matches("*.example.com", "com"));
    }

    #[test]
    fn star_inside_a_label_does_not_cover_the_parent() {
        assert!(matches("web*.example.com", "web01.example.com"));
        assert!(!matches("web*.example.com", "example.com"));
    }

    #[test]
    fn literal_pattern_matches_only_itself() {
        assert!(matches("foo.example.com", "foo.example.com"));
        assert!(!matches("foo.example.com", "bar.example.com"));
        assert!(!matches("foo.example.com", "foo.example.com.au"));
        assert!(!matches("foo.example.com", "a.foo.example.com"));
    }

    #[test]
    fn matching_ignores_case_and_root_dot() {
        assert!(matches("*.Example.COM", "FOO.example.com."));
        assert!(matches("foo.example.com.", "foo.example.com"));
    }

    #[test]
    fn question_mark_matches_one_character() {
        assert!(matches("host?.lan", "host1.lan"));
        assert!(!matches("host?.lan", "host12.lan"));
        assert!(!matches("host?.lan", "host.lan"));
    }

    #[test]
    fn character_classes_work() {
        assert!(matches("db[0-9].lan", "db7.lan"));
        assert!(!matches("db[0-9].lan", "dbx.lan"));
        assert!(matches("db[!0-9].lan", "dbx.lan"));
        assert!(matches("x[]]y", "x]y"));
        assert!(matches("odd[", "odd["));
    }

    #[test]
    fn backtracking_finds_later_matches() {
        assert!(matches("*.b.*.com", "a.b.c.b.d.com"));
        assert!(matches("*a*a*a", "aaaa"));
        assert!(!matches("*a*a*a", "aab"));
    }

    #[test]
    fn lone_star_matches_everything() {
        assert!(matches("*", "anything.at.all"));
        assert!(matches("*", ""));
    }
}
