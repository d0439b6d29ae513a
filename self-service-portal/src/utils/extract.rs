//! Pulling a payload out of JSON whose envelope varies between API versions.
//!
//! Every lookup follows one policy: walk an ordered list of candidate paths and
//! take the first value the predicate accepts; failing that, take the first
//! non-empty top-level field the predicate accepts.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Keys leading from the document root to a value. Empty means the root.
pub type FieldPath = &'static [&'static str];

pub const USER_LIST_PATHS: &[FieldPath] = &[&[], &["content"], &["data"]];

pub const INVITATION_ID_PATHS: &[FieldPath] = &[
    &["invitation", "invitationId"],
    &["invitation", "id"],
    &["invitationId"],
    &["id"],
    &["invitationDetails", "id"],
    &["rawResponse", "invitation", "invitationId"],
];

pub const ENROLLMENT_URL_PATHS: &[FieldPath] = &[
    &["enrollmentUrl"],
    &["enrollment_url"],
    &["url"],
    &["invitationUrl"],
    &["invitation_url"],
    &["invitation", "enrollmentUrl"],
    &["invitation", "url"],
];

/// SDO invitation ids: fixed prefix, alphanumeric, longer than 20 characters.
static INVITATION_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^018[A-Za-z0-9]{18,}$").expect("invitation id pattern"));

fn lookup<'a>(doc: &'a Value, path: FieldPath) -> Option<&'a Value> {
    path.iter().try_fold(doc, |value, key| value.get(*key))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

/// First value under `candidates` accepted by `accept`, else the first
/// non-empty accepted top-level field.
pub fn first_match<'a, F>(doc: &'a Value, candidates: &[FieldPath], accept: F) -> Option<&'a Value>
where
    F: Fn(&Value) -> bool,
{
    candidates
        .iter()
        .filter_map(|path| lookup(doc, path))
        .find(|value| accept(value))
        .or_else(|| {
            doc.as_object()?
                .values()
                .find(|value| !is_empty(value) && accept(value))
        })
}

pub fn is_array(value: &Value) -> bool {
    value.is_array()
}

pub fn is_invitation_id(value: &Value) -> bool {
    value.as_str().is_some_and(looks_like_invitation_id)
}

pub fn looks_like_invitation_id(candidate: &str) -> bool {
    INVITATION_ID.is_match(candidate)
}

pub fn is_http_url(value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| s.starts_with("https://") || s.starts_with("http://"))
}

/// Users from a directory search response; empty when none can be found.
pub fn extract_users(doc: &Value) -> Vec<Value> {
    first_match(doc, USER_LIST_PATHS, is_array)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

pub fn extract_invitation_id(doc: &Value) -> Option<String> {
    first_match(doc, INVITATION_ID_PATHS, is_invitation_id)
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub fn extract_enrollment_url(doc: &Value) -> Option<String> {
    first_match(doc, ENROLLMENT_URL_PATHS, is_http_url)
        .and_then(Value::as_str)
        .map(str::to_string)
}
