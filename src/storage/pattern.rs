use crate::core::{Result, StoreError};
use regex::Regex;

/// Converts a SQL LIKE pattern into an anchored regex source.
///
/// `%` matches any run of characters, `_` exactly one; `\` escapes the next
/// character.
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => regex.push_str(r"\\"),
            },
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }

    regex.push('$');
    regex
}

pub fn compile_like(pattern: &str) -> Result<Regex> {
    Regex::new(&like_to_regex(pattern))
        .map_err(|err| StoreError::ParseError(format!("invalid urn pattern '{}': {}", pattern, err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_match_like_sql() {
        let regex = compile_like("urn:li:dataset:%hive%").unwrap();
        assert!(regex.is_match("urn:li:dataset:(urn:li:dataPlatform:hive,db.t,PROD)"));
        assert!(!regex.is_match("urn:li:corpuser:hive"));

        let single = compile_like("urn:li:corpuser:user_").unwrap();
        assert!(single.is_match("urn:li:corpuser:user1"));
        assert!(!single.is_match("urn:li:corpuser:user12"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let regex = compile_like("urn:li:dataset:(x.y)").unwrap();
        assert!(regex.is_match("urn:li:dataset:(x.y)"));
        assert!(!regex.is_match("urn:li:dataset:(xzy)"));
        assert!(compile_like(r"a\%").unwrap().is_match("a%"));
    }
}
