//! Change-set validator.
//!
//! Turns the model's raw text into a [`ProposedChangeSet`], failing closed
//! on any structural mismatch. The response must be bare JSON; Markdown
//! fences are not stripped.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::constants::DEFAULT_PR_TITLE;
use crate::models::{FileChange, ProposedChangeSet};

/// Maximum length of raw response text quoted in an error.
const PREVIEW_LEN: usize = 200;

/// Why a response could not become a change set.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("response is not valid JSON ({reason}): {preview}")]
    InvalidJson { reason: String, preview: String },

    #[error("response must be a JSON object, got {found}")]
    NotAnObject { found: &'static str },

    #[error("response has no `changes` object")]
    MissingChanges,

    #[error("`changes` must be an object keyed by path, got {found}")]
    ChangesNotAnObject { found: &'static str },

    #[error("entry for {path} must be an object, got {found}")]
    EntryNotAnObject { path: String, found: &'static str },

    #[error("entry for {path} is missing `{field}`")]
    MissingField { path: String, field: &'static str },

    #[error("entry for {path}: `{field}` must be {expected}")]
    InvalidField {
        path: String,
        field: &'static str,
        expected: &'static str,
    },

    #[error("`{field}` must be a string")]
    InvalidMetadata { field: &'static str },

    #[error("unsafe path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },
}

/// Parse and validate a raw completion.
pub fn parse_change_set(raw: &str) -> Result<ProposedChangeSet, SchemaError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| SchemaError::InvalidJson {
        reason: e.to_string(),
        preview: preview(raw),
    })?;

    let Value::Object(mut root) = value else {
        return Err(SchemaError::NotAnObject {
            found: kind_of(&value),
        });
    };

    let pr_title = optional_string(&root, "pr_title")?
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_PR_TITLE)
        .to_string();
    let pr_body = optional_string(&root, "pr_body")?
        .unwrap_or_default()
        .to_string();

    let changes = match root.remove("changes") {
        None | Some(Value::Null) => return Err(SchemaError::MissingChanges),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(SchemaError::ChangesNotAnObject {
                found: kind_of(&other),
            });
        }
    };

    let mut parsed = IndexMap::with_capacity(changes.len());
    for (path, entry) in changes {
        validate_path(&path)?;
        let change = parse_entry(&path, entry)?;
        parsed.insert(path, change);
    }

    Ok(ProposedChangeSet {
        pr_title,
        pr_body,
        changes: parsed,
    })
}

fn parse_entry(path: &str, entry: Value) -> Result<FileChange, SchemaError> {
    let Value::Object(fields) = entry else {
        return Err(SchemaError::EntryNotAnObject {
            path: path.to_string(),
            found: kind_of(&entry),
        });
    };

    let commit_message = required_string(path, &fields, "commit_message")?;
    if commit_message.trim().is_empty() {
        return Err(SchemaError::InvalidField {
            path: path.to_string(),
            field: "commit_message",
            expected: "a non-empty string",
        });
    }
    let updated_code = required_string(path, &fields, "updated_code")?;

    Ok(FileChange {
        commit_message: commit_message.to_string(),
        updated_code: updated_code.to_string(),
    })
}

fn required_string<'a>(
    path: &str,
    fields: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, SchemaError> {
    match fields.get(field) {
        None => Err(SchemaError::MissingField {
            path: path.to_string(),
            field,
        }),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(SchemaError::InvalidField {
            path: path.to_string(),
            field,
            expected: "a string",
        }),
    }
}

fn optional_string<'a>(
    root: &'a Map<String, Value>,
    field: &'static str,
) -> Result<Option<&'a str>, SchemaError> {
    match root.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(SchemaError::InvalidMetadata { field }),
    }
}

/// Reject paths that could escape the repository or address it oddly.
pub fn validate_path(path: &str) -> Result<(), SchemaError> {
    let fail = |reason| {
        Err(SchemaError::InvalidPath {
            path: path.to_string(),
            reason,
        })
    };

    if path.trim().is_empty() || path == "." {
        return fail("empty path");
    }
    if path.chars().any(|c| c == '\0' || c.is_control()) {
        return fail("contains control characters");
    }
    if path.starts_with('/') {
        return fail("absolute path");
    }
    if path.contains('\\') {
        return fail("contains a backslash");
    }
    if path.starts_with('~') {
        return fail("home-relative path");
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return fail("drive-letter path");
    }
    if path.ends_with('/') {
        return fail("names a directory");
    }
    for segment in path.split('/') {
        match segment {
            ".." => return fail("parent-directory segment"),
            "." => return fail("current-directory segment"),
            "" => return fail("empty segment"),
            _ => {}
        }
    }
    Ok(())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn preview(raw: &str) -> String {
    if raw.chars().count() <= PREVIEW_LEN {
        raw.to_string()
    } else {
        let cut: String = raw.chars().take(PREVIEW_LEN).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_full_change_set_in_order() {
        let raw = r#"{
            "pr_title": "Add MIT license",
            "pr_body": "Adds LICENSE",
            "changes": {
                "src/z.py": {"commit_message": "z", "updated_code": "Z"},
                "LICENSE": {"commit_message": "Add LICENSE", "updated_code": "MIT License\n"},
                "src/a.py": {"commit_message": "rm a", "updated_code": ""}
            }
        }"#;
        let set = parse_change_set(raw).unwrap();
        assert_eq!(set.pr_title, "Add MIT license");
        assert_eq!(set.pr_body, "Adds LICENSE");
        let paths: Vec<_> = set.changes.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["src/z.py", "LICENSE", "src/a.py"]);
        assert!(set.changes["src/a.py"].is_deletion());
        assert_eq!(set.changes["LICENSE"].updated_code, "MIT License\n");
    }

    #[test]
    fn defaults_title_and_body() {
        let set = parse_change_set(r#"{"changes": {}}"#).unwrap();
        assert_eq!(set.pr_title, DEFAULT_PR_TITLE);
        assert_eq!(set.pr_body, "");
        assert!(set.is_empty());
    }

    #[test]
    fn blank_title_falls_back_to_default() {
        let set = parse_change_set(r#"{"pr_title": "   ", "changes": {}}"#).unwrap();
        assert_eq!(set.pr_title, DEFAULT_PR_TITLE);
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_change_set("Sure! Here are the changes:").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidJson { .. }));
    }

    #[test]
    fn rejects_fenced_json() {
        let err = parse_change_set("```json\n{\"changes\": {}}\n```").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidJson { .. }));
    }

    #[test]
    fn rejects_non_object_root() {
        assert_eq!(
            parse_change_set("[]").unwrap_err(),
            SchemaError::NotAnObject { found: "an array" }
        );
    }

    #[test]
    fn rejects_missing_changes() {
        assert_eq!(
            parse_change_set(r#"{"pr_title": "x"}"#).unwrap_err(),
            SchemaError::MissingChanges
        );
    }

    #[test]
    fn rejects_changes_array() {
        assert_eq!(
            parse_change_set(r#"{"changes": []}"#).unwrap_err(),
            SchemaError::ChangesNotAnObject { found: "an array" }
        );
    }

    #[test]
    fn rejects_entry_that_is_not_object() {
        let err = parse_change_set(r#"{"changes": {"a.py": "code"}}"#).unwrap_err();
        assert!(matches!(err, SchemaError::EntryNotAnObject { ref path, .. } if path == "a.py"));
    }

    #[test]
    fn rejects_missing_commit_message() {
        let raw = r#"{"changes": {
            "a.py": {"commit_message": "ok", "updated_code": "A"},
            "b.py": {"updated_code": "B"}
        }}"#;
        assert_eq!(
            parse_change_set(raw).unwrap_err(),
            SchemaError::MissingField {
                path: "b.py".into(),
                field: "commit_message"
            }
        );
    }

    #[test]
    fn rejects_blank_commit_message() {
        let raw = r#"{"changes": {"a.py": {"commit_message": " ", "updated_code": "A"}}}"#;
        assert!(matches!(
            parse_change_set(raw).unwrap_err(),
            SchemaError::InvalidField { field: "commit_message", .. }
        ));
    }

    #[test]
    fn missing_updated_code_differs_from_empty() {
        let missing = r#"{"changes": {"a.py": {"commit_message": "m"}}}"#;
        assert_eq!(
            parse_change_set(missing).unwrap_err(),
            SchemaError::MissingField {
                path: "a.py".into(),
                field: "updated_code"
            }
        );
        let empty = r#"{"changes": {"a.py": {"commit_message": "m", "updated_code": ""}}}"#;
        assert!(parse_change_set(empty).is_ok());
    }

    #[test]
    fn rejects_null_updated_code() {
        let raw = r#"{"changes": {"a.py": {"commit_message": "m", "updated_code": null}}}"#;
        assert!(matches!(
            parse_change_set(raw).unwrap_err(),
            SchemaError::InvalidField { field: "updated_code", .. }
        ));
    }

    #[test]
    fn rejects_non_string_title() {
        assert_eq!(
            parse_change_set(r#"{"pr_title": 3, "changes": {}}"#).unwrap_err(),
            SchemaError::InvalidMetadata { field: "pr_title" }
        );
    }

    #[test]
    fn rejects_unsafe_paths() {
        for path in [
            "../etc/passwd",
            "/abs/file",
            "C:/x.py",
            "~/x",
            "src/./a.py",
            "src//a.py",
            "src/",
            "",
            "a\u{0}b",
            "src\\bot.py",
            "\\\\server\\share",
        ] {
            assert!(
                matches!(validate_path(path), Err(SchemaError::InvalidPath { .. })),
                "{path:?} should be rejected"
            );
        }
        assert!(validate_path("src/utils/helper.py").is_ok());
        assert!(validate_path(".github/workflows/ci.yml").is_ok());
    }

    #[test]
    fn preview_is_bounded() {
        let raw = "x".repeat(1000);
        let err = parse_change_set(&raw).unwrap_err();
        let SchemaError::InvalidJson { preview, .. } = err else {
            panic!("expected InvalidJson");
        };
        assert_eq!(preview.chars().count(), PREVIEW_LEN + 1);
    }
}
