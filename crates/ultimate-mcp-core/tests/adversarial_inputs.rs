// crates/ultimate-mcp-core/tests/adversarial_inputs.rs
// ============================================================================
// Module: Adversarial Input Tests
// Description: Bypass attempts against the validation subsystem.
// ============================================================================
//! ## Overview
//! Exercises the validators with the obfuscation and escalation patterns the
//! platform is designed to refuse: interpreter introspection chains, encoded
//! keywords, traversal paths, and malformed credentials.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;

use ultimate_mcp_core::CodeValidator;
use ultimate_mcp_core::CodeValidatorConfig;
use ultimate_mcp_core::RevocationStore;
use ultimate_mcp_core::Role;
use ultimate_mcp_core::TokenService;
use ultimate_mcp_core::UserId;
use ultimate_mcp_core::validate_identifier;
use ultimate_mcp_core::validate_read_only_query;
use ultimate_mcp_core::validate_relative_path;

// ============================================================================
// SECTION: Code Escapes
// ============================================================================

#[test]
fn interpreter_escape_chains_are_denied() {
    let validator = CodeValidator::new(CodeValidatorConfig::default());
    let escapes = [
        // Classic sandbox escape via type introspection.
        "().__class__.__bases__[0].__subclasses__()",
        // Function globals traversal.
        "(lambda: 0).__globals__",
        // Builtins through a subscript on globals().
        "globals()['__builtins__']['eval']('1+1')",
        // Reflection with a constant dunder.
        "getattr({}, '__class__')",
        // Reflection with a dynamic name must fail closed.
        "name = 'system'\ngetattr(object, name)",
        // Import machinery reached by name.
        "__import__('subprocess')",
        // Nested inside otherwise benign code.
        "def helper(x):\n    return x\n\nclass C:\n    def m(self):\n        import socket\n",
        // Code object access.
        "helper.__code__",
    ];
    for code in escapes {
        assert!(validator.validate(code, false).is_err(), "{code}");
    }
}

#[test]
fn deeply_nested_payloads_hit_the_budget() {
    let validator = CodeValidator::new(CodeValidatorConfig {
        max_ast_nodes: 200,
        ..CodeValidatorConfig::default()
    });
    let wide = (0..500).map(|index| format!("x{index} = {index}")).collect::<Vec<_>>().join("\n");
    assert!(validator.validate(&wide, false).is_err());
}

#[test]
fn validation_never_mutates_its_verdict() {
    let validator = CodeValidator::new(CodeValidatorConfig::default());
    for _ in 0..3 {
        assert!(validator.validate("import os", false).is_err());
        assert!(validator.validate("print('ok')", false).is_ok());
    }
}

// ============================================================================
// SECTION: Query Obfuscation
// ============================================================================

#[test]
fn unicode_and_case_tricks_do_not_reach_the_database() {
    let attacks = [
        "ＭＡＴＣＨ (n) ＤＥＬＥＴＥ n",
        "match (n) dElEtE n",
        "MATCH (n) RETURN n /* DELETE */",
        "MATCH (n) RETURN n; DROP DATABASE neo4j",
        "CALL dbms.shutdown()",
        "ＣＡＬＬ db.labels()",
    ];
    for attack in attacks {
        assert!(validate_read_only_query(attack).is_err(), "{attack}");
    }
}

#[test]
fn read_queries_with_keyword_like_identifiers_survive() {
    let benign = [
        "MATCH (n:Merged) RETURN n.created_by AS creator",
        "MATCH (s:Settings) WHERE s.recreate = false RETURN s.key",
        "MATCH (a)-[:CALLS_OUT]->(b) RETURN count(b) AS fanout",
    ];
    for query in benign {
        validate_read_only_query(query).unwrap_or_else(|err| panic!("{query}: {err}"));
    }
}

// ============================================================================
// SECTION: Identifier and Path Hardening
// ============================================================================

#[test]
fn traversal_and_injection_identifiers_are_rejected() {
    assert!(validate_identifier("`; DROP", "label").is_err());
    assert!(validate_identifier("has`tick", "label").is_err());
    assert!(validate_identifier("{brace}", "label").is_err());
    assert!(validate_relative_path("..\\..\\windows\\system32").is_err());
    assert!(validate_relative_path("a/b/../../etc/shadow").is_err());
    assert!(validate_relative_path(&"d/".repeat(600)).is_err());
}

// ============================================================================
// SECTION: Credential Hardening
// ============================================================================

#[test]
fn tampered_tokens_grant_nothing() {
    let tokens = TokenService::from_secret(
        "adversarial-suite-signing-secret",
        1,
        Arc::new(RevocationStore::new()),
    )
    .unwrap();
    let token = tokens.issue(&UserId::new("alice"), &[Role::Viewer], None).unwrap();

    // Flip one character of the signature segment.
    let mut tampered = token.clone();
    let last = tampered.pop().unwrap();
    tampered.push(if last == 'a' { 'b' } else { 'a' });
    assert!(tokens.verify(&tampered).is_err());

    // Splice the payload of one token onto the signature of another.
    let other = tokens.issue(&UserId::new("mallory"), &[Role::Admin], None).unwrap();
    let victim_parts: Vec<&str> = token.split('.').collect();
    let other_parts: Vec<&str> = other.split('.').collect();
    let spliced = format!("{}.{}.{}", victim_parts[0], other_parts[1], victim_parts[2]);
    assert!(tokens.verify(&spliced).is_err());
}
