// crates/ultimate-mcp-core/src/validation/query.rs
// ============================================================================
// Module: Graph Query Validation
// Description: Read-only gate for user-supplied graph queries.
// Purpose: Reject mutating clauses, admin procedures, and obfuscation.
// Dependencies: unicode-normalization
// ============================================================================

//! ## Overview
//! User query strings reach the database only through the read endpoint, and
//! only after this gate. Matching runs on a normalized form (Unicode NFKC,
//! case-folded, string literals masked), which closes the fullwidth and
//! quoted-keyword bypass classes. The scan is token-based so `deleted` as an
//! identifier does not trip the `delete` clause check. Parameters are always
//! bound separately; nothing here interpolates values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use unicode_normalization::UnicodeNormalization;

use crate::validation::InvalidInput;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted query length in bytes (after normalization).
pub const MAX_QUERY_BYTES: usize = 64 * 1024;

/// Clause keywords that mutate the graph.
const MUTATING_KEYWORDS: &[&str] =
    &["delete", "detach", "remove", "create", "merge", "set", "drop"];

/// Procedure prefixes reserved for database administration.
const ADMIN_PROCEDURE_PREFIXES: &[&str] = &["db.", "dbms.", "apoc."];

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates that a user query is read-only.
///
/// # Errors
///
/// Returns [`InvalidInput`] naming the first forbidden construct found.
pub fn validate_read_only_query(query: &str) -> Result<(), InvalidInput> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(InvalidInput::new("query must not be empty"));
    }

    // NFKC first: fullwidth letters fold to ASCII before any scan.
    let normalized: String = trimmed.nfkc().collect::<String>().to_lowercase();
    if normalized.len() > MAX_QUERY_BYTES {
        return Err(InvalidInput::new(format!("query exceeds {MAX_QUERY_BYTES} bytes")));
    }

    if normalized.contains(';') {
        return Err(InvalidInput::with_token("statement separators are not allowed", ";"));
    }
    if normalized.contains("//") || normalized.contains("/*") {
        return Err(InvalidInput::new("comment sequences are not allowed"));
    }

    let masked = mask_string_literals(&normalized);

    for token in masked.split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_' || ch == '.')) {
        if token.is_empty() {
            continue;
        }
        if MUTATING_KEYWORDS.contains(&token) {
            return Err(InvalidInput::with_token("mutating clauses are not allowed", token));
        }
        if token == "call" {
            return Err(InvalidInput::with_token("procedure calls are not allowed", token));
        }
        if ADMIN_PROCEDURE_PREFIXES.iter().any(|prefix| token.starts_with(prefix)) {
            return Err(InvalidInput::with_token(
                "administration procedures are not allowed",
                token,
            ));
        }
    }

    Ok(())
}

/// Replaces quoted string literal contents with spaces, honoring backslash
/// escapes, so literal text cannot hide or fabricate keywords.
fn mask_string_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for ch in text.chars() {
        match quote {
            Some(open) => {
                if escaped {
                    escaped = false;
                    out.push(' ');
                } else if ch == '\\' {
                    escaped = true;
                    out.push(' ');
                } else if ch == open {
                    quote = None;
                    out.push(' ');
                } else {
                    out.push(' ');
                }
            }
            None => {
                if ch == '\'' || ch == '"' || ch == '`' {
                    quote = Some(ch);
                    out.push(' ');
                } else {
                    out.push(ch);
                }
            }
        }
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::validate_read_only_query;

    #[test]
    fn plain_match_return_is_accepted() {
        validate_read_only_query(
            "MATCH (a:Svc)-[r:CALLS_OUT]->(b:Svc) RETURN a.name AS a, b.name AS b",
        )
        .unwrap();
        validate_read_only_query("MATCH (n) RETURN count(n) AS total").unwrap();
    }

    #[test]
    fn mutating_clauses_are_rejected() {
        for query in [
            "MATCH (n) DETACH DELETE n",
            "CREATE (n:Thing)",
            "MERGE (n {key: 'a'})",
            "MATCH (n) SET n.owned = true",
            "MATCH (n) REMOVE n.flag",
            "DROP CONSTRAINT a",
        ] {
            assert!(validate_read_only_query(query).is_err(), "{query}");
        }
    }

    #[test]
    fn fullwidth_obfuscation_is_rejected() {
        // Fullwidth DELETE folds to ascii under NFKC.
        assert!(validate_read_only_query("MATCH (n) ＤＥＴＡＣＨ ＤＥＬＥＴＥ n").is_err());
    }

    #[test]
    fn identifiers_containing_keywords_are_fine() {
        validate_read_only_query("MATCH (n:DeletedItem) RETURN n.undeleted_at AS ts").unwrap();
    }

    #[test]
    fn keywords_inside_string_literals_do_not_trip_the_scan() {
        validate_read_only_query("MATCH (n) WHERE n.note = 'please delete me' RETURN n.key")
            .unwrap();
    }

    #[test]
    fn separators_comments_and_procedures_are_rejected() {
        assert!(validate_read_only_query("MATCH (n) RETURN n; MATCH (m) RETURN m").is_err());
        assert!(validate_read_only_query("MATCH (n) RETURN n // trailing").is_err());
        assert!(validate_read_only_query("/* hidden */ MATCH (n) RETURN n").is_err());
        assert!(validate_read_only_query("CALL db.labels()").is_err());
        assert!(validate_read_only_query("CALL dbms.components()").is_err());
        assert!(validate_read_only_query("CALL { MATCH (n) RETURN n } RETURN 1").is_err());
    }

    #[test]
    fn empty_query_is_rejected() {
        assert!(validate_read_only_query("").is_err());
        assert!(validate_read_only_query("   ").is_err());
    }
}
