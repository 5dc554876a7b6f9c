// crates/ultimate-mcp-server/src/prompts.rs
// ============================================================================
// Module: Prompt Library
// Description: Static prompt records served by both transports.
// Purpose: Ship the platform's prompt catalog, loaded once, read-only.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Prompts are static records loaded at startup and never mutated. The HTTP
//! surface serves them under `/prompts`; the MCP surface advertises the same
//! catalog through `list_prompts` and `get_prompt`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One prompt record.
#[derive(Debug, Clone, Serialize)]
pub struct PromptRecord {
    /// Stable prompt identifier.
    pub id: &'static str,
    /// Display title.
    pub title: &'static str,
    /// Prompt body.
    pub body: &'static str,
}

/// Immutable prompt catalog.
pub struct PromptCatalog {
    /// Records in listing order.
    records: Vec<PromptRecord>,
}

impl PromptCatalog {
    /// Builds the built-in catalog.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            records: vec![
                PromptRecord {
                    id: "proceed",
                    title: "Proceed with the current plan",
                    body: "Continue with the approved plan. Lint and test every change \
                           before executing it, and persist results to the graph.",
                },
                PromptRecord {
                    id: "lint-first",
                    title: "Lint before execution",
                    body: "Always run lint_code on a snippet and review its findings \
                           before calling execute_code.",
                },
                PromptRecord {
                    id: "graph-notes",
                    title: "Record findings in the graph",
                    body: "Use graph_upsert to store entities you discover and \
                           graph_query to recall them. Keys must be stable identifiers.",
                },
                PromptRecord {
                    id: "test-loop",
                    title: "Red, green, refactor",
                    body: "Write a failing test with run_tests, make it pass with the \
                           smallest change, then clean up and re-run.",
                },
            ],
        }
    }

    /// Returns every record in listing order.
    #[must_use]
    pub fn list(&self) -> &[PromptRecord] {
        &self.records
    }

    /// Looks up one record by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PromptRecord> {
        self.records.iter().find(|record| record.id == id)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::PromptCatalog;

    #[test]
    fn catalog_contains_proceed() {
        let catalog = PromptCatalog::builtin();
        assert!(catalog.list().len() >= 2);
        assert_eq!(catalog.get("proceed").unwrap().id, "proceed");
        assert!(catalog.get("unknown").is_none());
    }
}
