//! Path-token scanning over container text and config file content
//!
//! A reference starts at the beginning of a line, after whitespace, a quote,
//! `=` (as in `--password-file=/path`) or the renderer's `secret://` scheme.
//! It runs until whitespace or one of `"` `'` `)` `` ` `` `;` `,`.
//!
//! Patterns use `(?m)`, so `^` and `$` match at every line of a config file.
//! A line start is already a boundary through `\s` matching the preceding
//! `\n`, so anchoring with `\A` instead would find the same references.

use regex::Regex;

use matrix_stack_common::{Error, Result};

const BOUNDARY: &str = r#"(?:^|[\s"'=]|secret://)"#;
const PATH_CHARS: &str = r#"[^\s"')`;,]"#;
const NON_PATH_CHAR: &str = r#"[\s"')`;,]"#;
const NOQA: &str = "noqa";

/// Whether `text` names exactly `key` somewhere
#[derive(Debug)]
pub struct KeyMatcher {
    regex: Regex,
}

impl KeyMatcher {
    /// Matcher for one fully-qualified key path
    pub fn new(key: &str) -> Result<Self> {
        let pattern = format!("(?m){BOUNDARY}{}(?:$|{NON_PATH_CHAR})", regex::escape(key));
        compile(&pattern).map(|regex| Self { regex })
    }

    /// Whether the key is referenced in `text`
    pub fn is_referenced_in(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Finds every `{parent}/{token}` reference in text
#[derive(Debug)]
pub struct ReferenceScanner {
    regex: Regex,
}

impl ReferenceScanner {
    /// Scanner for references under one mount directory
    pub fn new(parent: &str) -> Result<Self> {
        let pattern = format!(
            "(?m){BOUNDARY}({}/{PATH_CHARS}+)",
            regex::escape(parent.trim_end_matches('/'))
        );
        compile(&pattern).map(|regex| Self { regex })
    }

    /// Full reference paths found in `text`, skipping lines marked `noqa`
    /// after the reference
    pub fn references<'t>(&'t self, text: &'t str) -> impl Iterator<Item = &'t str> + 't {
        self.regex.captures_iter(text).filter_map(move |caps| {
            let reference = caps.get(1)?;
            let rest_of_line = text[reference.end()..].lines().next().unwrap_or_default();
            if rest_of_line.contains(NOQA) {
                None
            } else {
                Some(reference.as_str())
            }
        })
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::serialization(format!("invalid scan pattern: {e}")))
}

/// Everything before the final `/`: the directory a subPath mount lives in
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or_default()
}

/// Final path segment
pub fn basename(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::flag_value("--password-file=/db/password", true)]
    #[case::bare_arg("/db/password", true)]
    #[case::quoted("password_path: \"/db/password\"", true)]
    #[case::single_quoted("password_path: '/db/password'", true)]
    #[case::yaml_value("  password_path: /db/password\n", true)]
    #[case::secret_scheme("DB_PASSWORD=secret:///db/password", true)]
    #[case::in_parens("load(/db/password)", false)]
    #[case::longer_key("/db/password2", false)]
    #[case::sub_path("/db/password/old", false)]
    #[case::glued_prefix("x/db/password", false)]
    #[case::absent("--password-file=/db/other", false)]
    #[case::followed_by_comma("files: /db/password, /db/user", true)]
    fn test_key_matcher(#[case] text: &str, #[case] expected: bool) {
        let matcher = KeyMatcher::new("/db/password").unwrap();
        assert_eq!(matcher.is_referenced_in(text), expected, "{text}");
    }

    #[test]
    fn test_key_matcher_multiline_content() {
        let matcher = KeyMatcher::new("/secrets/synapse/SIGNING_KEY").unwrap();
        let content = "server_name: ess.localhost\nsigning_key_path: /secrets/synapse/SIGNING_KEY\nlog_config: /conf/log_config.yaml\n";
        assert!(matcher.is_referenced_in(content));
    }

    #[test]
    fn test_key_matcher_escapes_regex_metacharacters() {
        let matcher = KeyMatcher::new("/conf/a.b+c").unwrap();
        assert!(matcher.is_referenced_in("/conf/a.b+c"));
        assert!(!matcher.is_referenced_in("/conf/aXb+c"));
    }

    /// Story: config files mention several files in the same mount
    /// directory, and each one is reported so it can be checked against what
    /// is actually mounted
    #[test]
    fn story_reference_scanner_finds_every_sibling() {
        let scanner = ReferenceScanner::new("/secrets/synapse").unwrap();
        let content = "\
signing_key_path: /secrets/synapse/SIGNING_KEY
macaroon_secret_key_path: \"/secrets/synapse/MACAROON\"
registration_shared_secret_path: /secrets/synapse/REGISTRATION  # noqa
media_store_path: /media/media_store
";
        let found: Vec<_> = scanner.references(content).collect();
        assert_eq!(found, vec!["/secrets/synapse/SIGNING_KEY", "/secrets/synapse/MACAROON"]);
    }

    #[test]
    fn test_references_at_line_starts() {
        let scanner = ReferenceScanner::new("/conf").unwrap();
        let content = "/conf/first.yaml\nsecond:\n/conf/second.yaml\n";
        let found: Vec<_> = scanner.references(content).collect();
        assert_eq!(found, vec!["/conf/first.yaml", "/conf/second.yaml"]);
        assert!(KeyMatcher::new("/conf/second.yaml").unwrap().is_referenced_in(content));
    }

    #[test]
    fn test_reference_scanner_stops_at_delimiters() {
        let scanner = ReferenceScanner::new("/etc/foo/").unwrap();
        let found: Vec<_> = scanner
            .references("cat /etc/foo/a;cat '/etc/foo/b' `/etc/foo/c`")
            .collect();
        assert_eq!(found, vec!["/etc/foo/a", "/etc/foo/b"]);
    }

    #[rstest]
    #[case("/etc/app/config.yaml", "/etc/app", "config.yaml")]
    #[case("/config.yaml", "", "config.yaml")]
    #[case("config.yaml", "", "config.yaml")]
    fn test_path_helpers(#[case] path: &str, #[case] parent: &str, #[case] name: &str) {
        assert_eq!(parent_dir(path), parent);
        assert_eq!(basename(path), name);
    }
}
