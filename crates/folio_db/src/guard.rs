//! Identifier allow-listing for convention-derived SQL.
//!
//! Table and column names in this crate are always derived from the content
//! naming convention, never from user input. The guard still rejects anything
//! that is not a plain lowercase identifier, so a malformed slug can never
//! reach an SQL string.

use crate::error::{DbError, Result};

const MAX_IDENT_LEN: usize = 128;

/// Validate an identifier against the allow-list.
///
/// Accepted: ASCII lowercase letters, digits and underscores, starting with a
/// letter, at most 128 bytes. Returns the input on success so call sites can
/// chain into formatting.
pub fn safe_ident(name: &str) -> Result<&str> {
    if name.is_empty() || name.len() > MAX_IDENT_LEN {
        return Err(DbError::BadIdentifier(name.to_string()));
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return Err(DbError::BadIdentifier(name.to_string())),
    }

    for c in chars {
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
            return Err(DbError::BadIdentifier(name.to_string()));
        }
    }

    Ok(name)
}

/// Quote a validated identifier for interpolation into SQL.
pub(crate) fn quote_ident(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 2);
    escaped.push('"');
    for ch in name.chars() {
        if ch == '"' {
            escaped.push('"');
        }
        escaped.push(ch);
    }
    escaped.push('"');
    escaped
}
