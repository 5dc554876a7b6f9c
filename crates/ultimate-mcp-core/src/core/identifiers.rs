// crates/ultimate-mcp-core/src/core/identifiers.rs
// ============================================================================
// Module: Ultimate MCP Identifiers
// Description: Canonical opaque identifiers and the tool name enumeration.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical string-based identifiers used throughout
//! the platform. Identifiers are opaque and serialize as strings; shape
//! validation happens at request boundaries, not inside these wrappers.
//! `ToolName` enumerates the advertised tool surface shared by the HTTP and
//! MCP transports.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// User identifier carried in token claims and audit events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a new user identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Artifact identifier assigned to persisted tool results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Creates a new artifact identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ArtifactId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ArtifactId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Tool Names
// ============================================================================

/// Canonical tool identifiers advertised by both transports.
///
/// # Invariants
/// - Variants are stable; wire names never change for released tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Static analysis over supplied source.
    LintCode,
    /// Sandboxed code execution.
    ExecuteCode,
    /// Test harness execution.
    RunTests,
    /// Template-based code generation.
    GenerateCode,
    /// Graph node/relationship upsert.
    GraphUpsert,
    /// Read-only graph query.
    GraphQuery,
    /// Prompt catalog listing.
    ListPrompts,
    /// Single prompt lookup.
    GetPrompt,
}

impl ToolName {
    /// Parses a wire tool name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "lint_code" => Some(Self::LintCode),
            "execute_code" => Some(Self::ExecuteCode),
            "run_tests" => Some(Self::RunTests),
            "generate_code" => Some(Self::GenerateCode),
            "graph_upsert" => Some(Self::GraphUpsert),
            "graph_query" => Some(Self::GraphQuery),
            "list_prompts" => Some(Self::ListPrompts),
            "get_prompt" => Some(Self::GetPrompt),
            _ => None,
        }
    }

    /// Returns the stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LintCode => "lint_code",
            Self::ExecuteCode => "execute_code",
            Self::RunTests => "run_tests",
            Self::GenerateCode => "generate_code",
            Self::GraphUpsert => "graph_upsert",
            Self::GraphQuery => "graph_query",
            Self::ListPrompts => "list_prompts",
            Self::GetPrompt => "get_prompt",
        }
    }

    /// Returns every advertised tool in listing order.
    #[must_use]
    pub const fn all() -> [Self; 8] {
        [
            Self::LintCode,
            Self::ExecuteCode,
            Self::RunTests,
            Self::GenerateCode,
            Self::GraphUpsert,
            Self::GraphQuery,
            Self::ListPrompts,
            Self::GetPrompt,
        ]
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::ToolName;

    #[test]
    fn tool_name_round_trips_through_wire_form() {
        for tool in ToolName::all() {
            assert_eq!(ToolName::parse(tool.as_str()), Some(tool));
        }
    }

    #[test]
    fn tool_name_rejects_unknown_names() {
        assert_eq!(ToolName::parse("delete_everything"), None);
        assert_eq!(ToolName::parse(""), None);
        assert_eq!(ToolName::parse("LINT_CODE"), None);
    }
}
