//! `{tag}` placeholder substitution
//!
//! Placeholders are resolved against a local variable map first and the
//! process environment second. Tags are trimmed before lookup, so `{ dir }`
//! and `{dir}` are the same placeholder.

use regex::Regex;
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Resolve placeholders against `vars`, then the process environment.
///
/// Unknown tags are dropped, or kept verbatim when `keep_unknown` is set.
/// A malformed template (an unterminated `{`) is returned unchanged.
pub fn resolve(src: &str, vars: &HashMap<String, String>, keep_unknown: bool) -> String {
    resolve_with(src, vars, |key| std::env::var(key).ok(), keep_unknown).unwrap_or_else(|e| {
        tracing::debug!(template = src, error = %e, "Template left unresolved");
        src.to_string()
    })
}

/// Resolve every string in `items`
pub fn resolve_all(items: &[String], vars: &HashMap<String, String>, keep_unknown: bool) -> Vec<String> {
    items
        .iter()
        .map(|item| resolve(item, vars, keep_unknown))
        .collect()
}

/// Resolve placeholders with an explicit fallback lookup instead of the
/// process environment.
pub fn resolve_with<F>(
    src: &str,
    vars: &HashMap<String, String>,
    lookup: F,
    keep_unknown: bool,
) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let pattern = Regex::new(r"\{([^{}]*)\}")
        .map_err(|e| Error::config(format!("invalid placeholder pattern: {e}")))?;

    // A `{` outside a well-formed placeholder is never closed
    let literal = |from: usize, to: usize| match src[from..to].find('{') {
        Some(pos) => Err(Error::Template {
            input: src.to_string(),
            offset: from + pos,
        }),
        None => Ok(&src[from..to]),
    };

    let mut out = String::with_capacity(src.len());
    let mut last = 0;

    for cap in pattern.captures_iter(src) {
        let (Some(whole), Some(tag)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        out.push_str(literal(last, whole.start())?);

        let key = tag.as_str().trim();
        match vars.get(key).cloned().or_else(|| lookup(key)) {
            Some(value) => out.push_str(&value),
            None if keep_unknown => out.push_str(whole.as_str()),
            None => {}
        }
        last = whole.end();
    }

    out.push_str(literal(last, src.len())?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> HashMap<String, String> {
        HashMap::from([("dir".to_string(), "/srv/app".to_string())])
    }

    fn env(key: &str) -> Option<String> {
        match key {
            "PORT" => Some("8080".to_string()),
            "dir" => Some("/from/env".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn test_local_vars_win_over_env() {
        let out = resolve_with("{dir}/bin/server", &vars(), env, false).unwrap();
        assert_eq!(out, "/srv/app/bin/server");
    }

    #[test]
    fn test_env_fallback() {
        let out = resolve_with("--port={ PORT }", &vars(), env, false).unwrap();
        assert_eq!(out, "--port=8080");
    }

    #[test]
    fn test_empty_env_value_counts_as_found() {
        let out = resolve_with("[{EMPTY}]", &vars(), env, true).unwrap();
        assert_eq!(out, "[]");
    }

    #[test]
    fn test_unknown_tags_dropped_or_kept() {
        let dropped = resolve_with("a{missing}b", &vars(), env, false).unwrap();
        assert_eq!(dropped, "ab");

        let kept = resolve_with("a{ missing }b", &vars(), env, true).unwrap();
        assert_eq!(kept, "a{ missing }b");
    }

    #[test]
    fn test_unterminated_tag_is_an_error() {
        let err = resolve_with("x{dir}y{oops", &vars(), env, false).unwrap_err();
        assert!(matches!(err, Error::Template { offset: 7, .. }));
    }

    #[test]
    fn test_stray_brace_before_placeholder() {
        let err = resolve_with("{{dir}}", &vars(), env, false).unwrap_err();
        assert!(matches!(err, Error::Template { offset: 0, .. }));

        let err = resolve_with("a{b{dir}", &vars(), env, false).unwrap_err();
        assert!(matches!(err, Error::Template { offset: 1, .. }));
        assert_eq!(resolve("a{b{dir}", &vars(), false), "a{b{dir}");
    }

    #[test]
    fn test_resolve_falls_back_to_source() {
        assert_eq!(resolve("{unterminated", &vars(), false), "{unterminated");
    }

    #[test]
    fn test_no_placeholders() {
        assert_eq!(resolve_with("plain text", &vars(), env, false).unwrap(), "plain text");
        assert_eq!(resolve_with("}{dir}}", &vars(), env, false).unwrap(), "}/srv/app}");
    }

    #[test]
    fn test_resolve_all() {
        let args = vec!["{dir}".to_string(), "static".to_string()];
        assert_eq!(resolve_all(&args, &vars(), false), vec!["/srv/app", "static"]);
    }
}
