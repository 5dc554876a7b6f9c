// crates/ultimate-mcp-core/src/validation/idents.rs
// ============================================================================
// Module: Identifier and Path Validation
// Description: Shape checks for graph identifiers, properties, and paths.
// Purpose: Keep user-supplied names inside a strict grammar.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Graph keys, labels, and relationship types share one grammar: an ASCII
//! letter or underscore followed by up to 127 letters, digits, underscores,
//! colons, or dashes. Property values are scalars or flat sequences of
//! scalars. Paths must be relative, free of parent traversal, and bounded in
//! length. Checks are explicit character loops so rejections can name the
//! offending token.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::validation::InvalidInput;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum identifier length in characters.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;
/// Maximum path length in bytes.
pub const MAX_PATH_BYTES: usize = 1_024;

// ============================================================================
// SECTION: Identifier Checks
// ============================================================================

/// Validates an identifier against `^[A-Za-z_][A-Za-z0-9_:-]{0,127}$`.
///
/// # Errors
///
/// Returns [`InvalidInput`] naming the field when the shape is wrong.
pub fn validate_identifier(value: &str, field: &str) -> Result<(), InvalidInput> {
    if value.is_empty() {
        return Err(InvalidInput::new(format!("{field} must not be empty")));
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(InvalidInput::with_token(
            format!("{field} exceeds {MAX_IDENTIFIER_LENGTH} characters"),
            value,
        ));
    }
    let mut chars = value.chars();
    let first = chars.next().unwrap_or('\0');
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(InvalidInput::with_token(
            format!("{field} must start with a letter or underscore"),
            value,
        ));
    }
    for ch in chars {
        if !(ch.is_ascii_alphanumeric() || matches!(ch, '_' | ':' | '-')) {
            return Err(InvalidInput::with_token(
                format!("{field} contains disallowed character {ch:?}"),
                value,
            ));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Property Checks
// ============================================================================

/// Returns true for JSON scalars (null, bool, number, string).
const fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_))
}

/// Validates a property value: a scalar or a flat sequence of scalars.
///
/// # Errors
///
/// Returns [`InvalidInput`] for nested arrays and objects.
pub fn validate_property_value(key: &str, value: &Value) -> Result<(), InvalidInput> {
    if is_scalar(value) {
        return Ok(());
    }
    if let Value::Array(items) = value {
        if items.iter().all(is_scalar) {
            return Ok(());
        }
        return Err(InvalidInput::with_token(
            format!("property {key} must be a flat sequence of scalars"),
            key,
        ));
    }
    Err(InvalidInput::with_token(
        format!("property {key} must be a scalar or flat sequence"),
        key,
    ))
}

// ============================================================================
// SECTION: Path Checks
// ============================================================================

/// Validates a relative path: no parent traversal, no absolute or
/// drive-qualified roots, bounded byte length.
///
/// # Errors
///
/// Returns [`InvalidInput`] on any violation.
pub fn validate_relative_path(path: &str) -> Result<(), InvalidInput> {
    if path.is_empty() {
        return Err(InvalidInput::new("path must not be empty"));
    }
    if path.len() > MAX_PATH_BYTES {
        return Err(InvalidInput::new(format!("path exceeds {MAX_PATH_BYTES} bytes")));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(InvalidInput::with_token("path must be relative", path));
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return Err(InvalidInput::with_token("drive-qualified paths are not allowed", path));
    }
    for segment in path.split(['/', '\\']) {
        if segment == ".." {
            return Err(InvalidInput::with_token("path must not traverse parents", path));
        }
    }
    if path.contains('\0') {
        return Err(InvalidInput::with_token("path must not contain NUL", path));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
