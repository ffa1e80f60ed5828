//! LIKE pattern matching.
//!
//! Two wildcards are recognised:
//! - `%` matches zero or more characters
//! - `_` matches exactly one character
//!
//! A backslash escapes the following character, so `\%` matches a literal `%`.
//! Matching is case-sensitive and operates on Unicode scalar values.

/// One compiled pattern token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Token {
    Any,
    One,
    Char(char),
}

fn compile(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        let token = match ch {
            '%' => Token::Any,
            '_' => Token::One,
            '\\' => Token::Char(chars.next().unwrap_or('\\')),
            c => Token::Char(c),
        };
        // Runs of `%` collapse to one.
        if token == Token::Any && tokens.last() == Some(&Token::Any) {
            continue;
        }
        tokens.push(token);
    }
    tokens
}

/// LIKE pattern matching.
///
/// ```
/// use tessera_core::pattern_match::like;
/// assert!(like("hello", "h%o"));
/// assert!(like("hello", "_ello"));
/// assert!(like("100%", "100\\%"));
/// assert!(!like("hello", "world"));
/// ```
pub fn like(value: &str, pattern: &str) -> bool {
    let v: Vec<char> = value.chars().collect();
    let p = compile(pattern);

    // Greedy two-pointer match with backtracking to the last `%`.
    let (mut vi, mut pi) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while vi < v.len() {
        match p.get(pi) {
            Some(Token::Any) => {
                star = Some((pi, vi));
                pi += 1;
            }
            Some(Token::One) => {
                vi += 1;
                pi += 1;
            }
            Some(Token::Char(c)) if *c == v[vi] => {
                vi += 1;
                pi += 1;
            }
            _ => match star {
                Some((sp, sv)) => {
                    pi = sp + 1;
                    vi = sv + 1;
                    star = Some((sp, sv + 1));
                }
                None => return false,
            },
        }
    }
    p[pi..].iter().all(|t| *t == Token::Any)
}

/// Returns the literal prefix of a pattern (the characters before the first
/// wildcard), or None when the pattern starts with a wildcard.
pub fn literal_prefix(pattern: &str) -> Option<String> {
    let prefix: String = compile(pattern)
        .into_iter()
        .map_while(|t| match t {
            Token::Char(c) => Some(c),
            _ => None,
        })
        .collect();
    if prefix.is_empty() {
        None
    } else {
        Some(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_like_basic() {
        assert!(like("hello", "hello"));
        assert!(like("hello", "h%"));
        assert!(like("hello", "%o"));
        assert!(like("hello", "%ll%"));
        assert!(like("hello", "h_llo"));
        assert!(like("", "%"));
        assert!(!like("", "_"));
        assert!(!like("hello", "h_lo"));
        assert!(!like("hello", "Hello"));
    }

    #[test]
    fn test_like_backtracking() {
        assert!(like("abcabcabd", "%abd"));
        assert!(like("aaa", "%%a"));
        assert!(like("mississippi", "m%iss%ppi"));
        assert!(!like("mississippi", "m%iss%ppx"));
    }

    #[test]
    fn test_like_escape() {
        assert!(like("50%", "50\\%"));
        assert!(!like("500", "50\\%"));
        assert!(like("a_b", "a\\_b"));
        assert!(!like("axb", "a\\_b"));
    }

    #[test]
    fn test_like_unicode() {
        assert!(like("héllo", "h_llo"));
        assert!(like("日本語", "日%"));
    }

    #[test]
    fn test_literal_prefix() {
        assert_eq!(literal_prefix("abc%"), Some("abc".into()));
        assert_eq!(literal_prefix("a\\%b%"), Some("a%b".into()));
        assert_eq!(literal_prefix("%abc"), None);
        assert_eq!(literal_prefix("_x"), None);
    }

    proptest! {
        #[test]
        fn prop_literal_pattern_matches_itself(s in "[a-z0-9 ]{0,12}") {
            prop_assert!(like(&s, &s));
            let prefixed = format!("{}%", s);
            let extended = format!("{}xyz", s);
            prop_assert!(like(&extended, &prefixed));
        }
    }
}
