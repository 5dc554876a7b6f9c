// crates/ultimate-mcp-core/src/validation/code.rs
// ============================================================================
// Module: Code Validation
// Description: AST-based dangerous-construct detection for submitted code.
// Purpose: Deny dangerous imports, calls, and introspection before execution.
// Dependencies: rustpython-parser
// ============================================================================

//! ## Overview
//! Submitted source is parsed to a real AST and walked; a pattern scan is
//! never the sole defense. The walk denies imports from the dangerous-module
//! set, calls to dangerous bare names, attribute access to interpreter
//! internals, and subscripts that reach them through constant strings. Source
//! size, tree depth, and node count are bounded so the validator itself
//! cannot be starved. Strict mode additionally denies network-I/O modules.
//!
//! The same parsed tree feeds the lint tool: [`SourceFacts`] extracts
//! function/class/import names in source order and a branch-count complexity
//! approximation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use rustpython_parser::Parse;
use rustpython_parser::ast;

use crate::validation::InvalidInput;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maximum source size in bytes.
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 100 * 1024;
/// Default maximum AST depth.
pub const DEFAULT_MAX_AST_DEPTH: usize = 96;
/// Default maximum AST node count.
pub const DEFAULT_MAX_AST_NODES: usize = 50_000;

/// Modules denied in every mode. Covers the OS, subprocess, socket,
/// filesystem, dynamic-loader, and ctypes families.
const DANGEROUS_MODULES: &[&str] = &[
    "os",
    "sys",
    "subprocess",
    "shutil",
    "socket",
    "ssl",
    "ctypes",
    "multiprocessing",
    "threading",
    "importlib",
    "builtins",
    "pty",
    "fcntl",
    "signal",
    "resource",
    "pickle",
    "marshal",
    "pathlib",
    "tempfile",
    "glob",
    "webbrowser",
];

/// Network-I/O modules additionally denied in strict mode.
const NETWORK_MODULES: &[&str] = &[
    "urllib",
    "http",
    "requests",
    "httpx",
    "aiohttp",
    "socketserver",
    "ftplib",
    "smtplib",
    "poplib",
    "imaplib",
    "telnetlib",
    "xmlrpc",
    "asyncio",
];

/// Bare callables denied outright.
const DANGEROUS_FUNCTIONS: &[&str] =
    &["eval", "exec", "compile", "__import__", "input", "help", "breakpoint", "vars"];

/// Reflection helpers whose attribute-name argument must be vetted.
const REFLECTION_FUNCTIONS: &[&str] = &["getattr", "setattr", "delattr"];

/// Interpreter-internal dunder names denied as attributes, names, and
/// constant subscript keys.
const DUNDER_DENYLIST: &[&str] = &[
    "__builtins__",
    "__globals__",
    "__import__",
    "__subclasses__",
    "__mro__",
    "__dict__",
    "__class__",
    "__bases__",
    "__code__",
    "__closure__",
    "__func__",
    "__self__",
];

/// File-open modes that imply writing.
const WRITE_MODE_CHARS: [char; 4] = ['w', 'a', 'x', '+'];

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Validator limits and denylists.
#[derive(Debug, Clone)]
pub struct CodeValidatorConfig {
    /// Maximum source size in bytes.
    pub max_source_bytes: usize,
    /// Maximum AST depth.
    pub max_ast_depth: usize,
    /// Maximum AST node count.
    pub max_ast_nodes: usize,
    /// Extra modules to deny beyond the built-in set.
    pub extra_denied_modules: Vec<String>,
}

impl Default for CodeValidatorConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            max_ast_depth: DEFAULT_MAX_AST_DEPTH,
            max_ast_nodes: DEFAULT_MAX_AST_NODES,
            extra_denied_modules: Vec::new(),
        }
    }
}

// ============================================================================
// SECTION: Validator
// ============================================================================

/// AST-based code validator.
pub struct CodeValidator {
    /// Limits and additional denied modules.
    config: CodeValidatorConfig,
    /// Full denied-module set (built-ins plus configured extras).
    denied_modules: BTreeSet<String>,
}

impl CodeValidator {
    /// Creates a validator from configuration.
    #[must_use]
    pub fn new(config: CodeValidatorConfig) -> Self {
        let mut denied_modules: BTreeSet<String> =
            DANGEROUS_MODULES.iter().map(|module| (*module).to_string()).collect();
        denied_modules.extend(config.extra_denied_modules.iter().cloned());
        Self {
            config,
            denied_modules,
        }
    }

    /// Parses source within the size limit.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInput`] on oversized input or a syntax error.
    pub fn parse(&self, source: &str) -> Result<ast::Suite, InvalidInput> {
        if source.len() > self.config.max_source_bytes {
            return Err(InvalidInput::new(format!(
                "source exceeds {} bytes",
                self.config.max_source_bytes
            )));
        }
        ast::Suite::parse(source, "<submitted>")
            .map_err(|err| InvalidInput::new(format!("syntax error: {err}")))
    }

    /// Parses and validates source in one step.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInput`] on the first dangerous construct found.
    pub fn validate(&self, source: &str, strict: bool) -> Result<ast::Suite, InvalidInput> {
        let suite = self.parse(source)?;
        self.validate_suite(&suite, strict)?;
        Ok(suite)
    }

    /// Validates an already parsed tree.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInput`] on the first dangerous construct found.
    pub fn validate_suite(&self, suite: &[ast::Stmt], strict: bool) -> Result<(), InvalidInput> {
        let mut walk = Walk {
            validator: self,
            strict,
            nodes: 0,
            depth: 0,
        };
        walk.stmts(suite)
    }

    /// Returns true when the module (or its root package) is denied.
    fn module_denied(&self, module: &str, strict: bool) -> bool {
        let root = module.split('.').next().unwrap_or(module);
        if self.denied_modules.contains(root) {
            return true;
        }
        strict && NETWORK_MODULES.contains(&root)
    }
}

// ============================================================================
// SECTION: AST Walk
// ============================================================================

/// Walk state: limits plus the active mode.
struct Walk<'a> {
    /// Owning validator (denylists and limits).
    validator: &'a CodeValidator,
    /// Strict mode flag.
    strict: bool,
    /// Nodes visited so far.
    nodes: usize,
    /// Current recursion depth.
    depth: usize,
}

impl Walk<'_> {
    /// Charges one node against the budget and tracks depth entry.
    fn enter(&mut self) -> Result<(), InvalidInput> {
        self.nodes += 1;
        if self.nodes > self.validator.config.max_ast_nodes {
            return Err(InvalidInput::new(format!(
                "source exceeds {} AST nodes",
                self.validator.config.max_ast_nodes
            )));
        }
        self.depth += 1;
        if self.depth > self.validator.config.max_ast_depth {
            return Err(InvalidInput::new(format!(
                "source exceeds AST depth {}",
                self.validator.config.max_ast_depth
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn stmts(&mut self, stmts: &[ast::Stmt]) -> Result<(), InvalidInput> {
        for stmt in stmts {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_lines, reason = "One arm per statement variant.")]
    fn stmt(&mut self, stmt: &ast::Stmt) -> Result<(), InvalidInput> {
        self.enter()?;
        let result = match stmt {
            ast::Stmt::Import(import) => {
                for alias in &import.names {
                    let module = alias.name.as_str();
                    if self.validator.module_denied(module, self.strict) {
                        return Err(InvalidInput::with_token(
                            format!("import of dangerous module {module}"),
                            module,
                        ));
                    }
                }
                Ok(())
            }
            ast::Stmt::ImportFrom(import) => {
                if let Some(module) = &import.module {
                    if self.validator.module_denied(module.as_str(), self.strict) {
                        return Err(InvalidInput::with_token(
                            format!("import from dangerous module {}", module.as_str()),
                            module.as_str(),
                        ));
                    }
                }
                Ok(())
            }
            ast::Stmt::FunctionDef(def) => {
                self.arguments(&def.args)?;
                self.exprs(&def.decorator_list)?;
                self.opt_expr(def.returns.as_deref())?;
                self.stmts(&def.body)
            }
            ast::Stmt::AsyncFunctionDef(def) => {
                self.arguments(&def.args)?;
                self.exprs(&def.decorator_list)?;
                self.opt_expr(def.returns.as_deref())?;
                self.stmts(&def.body)
            }
            ast::Stmt::ClassDef(def) => {
                self.exprs(&def.bases)?;
                for keyword in &def.keywords {
                    self.expr(&keyword.value)?;
                }
                self.exprs(&def.decorator_list)?;
                self.stmts(&def.body)
            }
            ast::Stmt::Return(ret) => self.opt_expr(ret.value.as_deref()),
            ast::Stmt::Delete(del) => self.exprs(&del.targets),
            ast::Stmt::Assign(assign) => {
                self.exprs(&assign.targets)?;
                self.expr(&assign.value)
            }
            ast::Stmt::AugAssign(assign) => {
                self.expr(&assign.target)?;
                self.expr(&assign.value)
            }
            ast::Stmt::AnnAssign(assign) => {
                self.expr(&assign.target)?;
                self.expr(&assign.annotation)?;
                self.opt_expr(assign.value.as_deref())
            }
            ast::Stmt::For(stmt) => {
                self.expr(&stmt.target)?;
                self.expr(&stmt.iter)?;
                self.stmts(&stmt.body)?;
                self.stmts(&stmt.orelse)
            }
            ast::Stmt::AsyncFor(stmt) => {
                self.expr(&stmt.target)?;
                self.expr(&stmt.iter)?;
                self.stmts(&stmt.body)?;
                self.stmts(&stmt.orelse)
            }
            ast::Stmt::While(stmt) => {
                self.expr(&stmt.test)?;
                self.stmts(&stmt.body)?;
                self.stmts(&stmt.orelse)
            }
            ast::Stmt::If(stmt) => {
                self.expr(&stmt.test)?;
                self.stmts(&stmt.body)?;
                self.stmts(&stmt.orelse)
            }
            ast::Stmt::With(stmt) => {
                for item in &stmt.items {
                    self.expr(&item.context_expr)?;
                    self.opt_expr(item.optional_vars.as_deref())?;
                }
                self.stmts(&stmt.body)
            }
            ast::Stmt::AsyncWith(stmt) => {
                for item in &stmt.items {
                    self.expr(&item.context_expr)?;
                    self.opt_expr(item.optional_vars.as_deref())?;
                }
                self.stmts(&stmt.body)
            }
            ast::Stmt::Match(stmt) => {
                self.expr(&stmt.subject)?;
                for case in &stmt.cases {
                    self.pattern(&case.pattern)?;
                    self.opt_expr(case.guard.as_deref())?;
                    self.stmts(&case.body)?;
                }
                Ok(())
            }
            ast::Stmt::Raise(stmt) => {
                self.opt_expr(stmt.exc.as_deref())?;
                self.opt_expr(stmt.cause.as_deref())
            }
            ast::Stmt::Try(stmt) => {
                self.stmts(&stmt.body)?;
                for handler in &stmt.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    self.opt_expr(handler.type_.as_deref())?;
                    self.stmts(&handler.body)?;
                }
                self.stmts(&stmt.orelse)?;
                self.stmts(&stmt.finalbody)
            }
            ast::Stmt::TryStar(stmt) => {
                self.stmts(&stmt.body)?;
                for handler in &stmt.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    self.opt_expr(handler.type_.as_deref())?;
                    self.stmts(&handler.body)?;
                }
                self.stmts(&stmt.orelse)?;
                self.stmts(&stmt.finalbody)
            }
            ast::Stmt::Assert(stmt) => {
                self.expr(&stmt.test)?;
                self.opt_expr(stmt.msg.as_deref())
            }
            ast::Stmt::Expr(stmt) => self.expr(&stmt.value),
            ast::Stmt::Global(_)
            | ast::Stmt::Nonlocal(_)
            | ast::Stmt::Pass(_)
            | ast::Stmt::Break(_)
            | ast::Stmt::Continue(_) => Ok(()),
            _ => Ok(()),
        };
        self.leave();
        result
    }

    fn exprs(&mut self, exprs: &[ast::Expr]) -> Result<(), InvalidInput> {
        for expr in exprs {
            self.expr(expr)?;
        }
        Ok(())
    }

    fn opt_expr(&mut self, expr: Option<&ast::Expr>) -> Result<(), InvalidInput> {
        match expr {
            Some(expr) => self.expr(expr),
            None => Ok(()),
        }
    }

    #[allow(clippy::too_many_lines, reason = "One arm per expression variant.")]
    fn expr(&mut self, expr: &ast::Expr) -> Result<(), InvalidInput> {
        self.enter()?;
        let result = match expr {
            ast::Expr::Call(call) => self.call(call),
            ast::Expr::Attribute(attribute) => {
                let attr = attribute.attr.as_str();
                if DUNDER_DENYLIST.contains(&attr) {
                    return Err(InvalidInput::with_token(
                        format!("access to interpreter internal {attr}"),
                        attr,
                    ));
                }
                self.expr(&attribute.value)
            }
            ast::Expr::Subscript(subscript) => {
                if let Some(key) = constant_str(&subscript.slice) {
                    if DUNDER_DENYLIST.contains(&key) {
                        return Err(InvalidInput::with_token(
                            format!("subscript access to interpreter internal {key}"),
                            key,
                        ));
                    }
                }
                self.expr(&subscript.value)?;
                self.expr(&subscript.slice)
            }
            ast::Expr::Name(name) => {
                let id = name.id.as_str();
                if DUNDER_DENYLIST.contains(&id) {
                    return Err(InvalidInput::with_token(
                        format!("reference to interpreter internal {id}"),
                        id,
                    ));
                }
                Ok(())
            }
            ast::Expr::BoolOp(op) => self.exprs(&op.values),
            ast::Expr::NamedExpr(named) => {
                self.expr(&named.target)?;
                self.expr(&named.value)
            }
            ast::Expr::BinOp(op) => {
                self.expr(&op.left)?;
                self.expr(&op.right)
            }
            ast::Expr::UnaryOp(op) => self.expr(&op.operand),
            ast::Expr::Lambda(lambda) => {
                self.arguments(&lambda.args)?;
                self.expr(&lambda.body)
            }
            ast::Expr::IfExp(expr) => {
                self.expr(&expr.test)?;
                self.expr(&expr.body)?;
                self.expr(&expr.orelse)
            }
            ast::Expr::Dict(dict) => {
                for key in dict.keys.iter().flatten() {
                    self.expr(key)?;
                }
                self.exprs(&dict.values)
            }
            ast::Expr::Set(set) => self.exprs(&set.elts),
            ast::Expr::ListComp(comp) => {
                self.expr(&comp.elt)?;
                self.comprehensions(&comp.generators)
            }
            ast::Expr::SetComp(comp) => {
                self.expr(&comp.elt)?;
                self.comprehensions(&comp.generators)
            }
            ast::Expr::DictComp(comp) => {
                self.expr(&comp.key)?;
                self.expr(&comp.value)?;
                self.comprehensions(&comp.generators)
            }
            ast::Expr::GeneratorExp(comp) => {
                self.expr(&comp.elt)?;
                self.comprehensions(&comp.generators)
            }
            ast::Expr::Await(expr) => self.expr(&expr.value),
            ast::Expr::Yield(expr) => self.opt_expr(expr.value.as_deref()),
            ast::Expr::YieldFrom(expr) => self.expr(&expr.value),
            ast::Expr::Compare(compare) => {
                self.expr(&compare.left)?;
                self.exprs(&compare.comparators)
            }
            ast::Expr::FormattedValue(value) => {
                self.expr(&value.value)?;
                self.opt_expr(value.format_spec.as_deref())
            }
            ast::Expr::JoinedStr(joined) => self.exprs(&joined.values),
            ast::Expr::Starred(starred) => self.expr(&starred.value),
            ast::Expr::List(list) => self.exprs(&list.elts),
            ast::Expr::Tuple(tuple) => self.exprs(&tuple.elts),
            ast::Expr::Slice(slice) => {
                self.opt_expr(slice.lower.as_deref())?;
                self.opt_expr(slice.upper.as_deref())?;
                self.opt_expr(slice.step.as_deref())
            }
            ast::Expr::Constant(_) => Ok(()),
        };
        self.leave();
        result
    }

    /// Checks a call expression against the callable denylist and the
    /// write-mode `open` rule, then recurses into callee and arguments.
    fn call(&mut self, call: &ast::ExprCall) -> Result<(), InvalidInput> {
        if let ast::Expr::Name(name) = call.func.as_ref() {
            let id = name.id.as_str();
            if DANGEROUS_FUNCTIONS.contains(&id) {
                return Err(InvalidInput::with_token(
                    format!("call to dangerous function {id}"),
                    id,
                ));
            }
            if REFLECTION_FUNCTIONS.contains(&id) {
                check_reflection_call(id, call)?;
            }
            if id == "open" {
                check_open_mode(call)?;
            }
        }
        self.expr(&call.func)?;
        self.exprs(&call.args)?;
        for keyword in &call.keywords {
            self.expr(&keyword.value)?;
        }
        Ok(())
    }

    fn comprehensions(&mut self, generators: &[ast::Comprehension]) -> Result<(), InvalidInput> {
        for generator in generators {
            self.expr(&generator.target)?;
            self.expr(&generator.iter)?;
            self.exprs(&generator.ifs)?;
        }
        Ok(())
    }

    fn arguments(&mut self, args: &ast::Arguments) -> Result<(), InvalidInput> {
        for arg in args.posonlyargs.iter().chain(&args.args).chain(&args.kwonlyargs) {
            if let Some(annotation) = &arg.def.annotation {
                self.expr(annotation)?;
            }
            if let Some(default) = &arg.default {
                self.expr(default)?;
            }
        }
        if let Some(vararg) = &args.vararg {
            if let Some(annotation) = &vararg.annotation {
                self.expr(annotation)?;
            }
        }
        if let Some(kwarg) = &args.kwarg {
            if let Some(annotation) = &kwarg.annotation {
                self.expr(annotation)?;
            }
        }
        Ok(())
    }

    fn pattern(&mut self, pattern: &ast::Pattern) -> Result<(), InvalidInput> {
        match pattern {
            ast::Pattern::MatchValue(value) => self.expr(&value.value),
            ast::Pattern::MatchSingleton(_) | ast::Pattern::MatchStar(_) => Ok(()),
            ast::Pattern::MatchSequence(sequence) => {
                for pattern in &sequence.patterns {
                    self.pattern(pattern)?;
                }
                Ok(())
            }
            ast::Pattern::MatchMapping(mapping) => {
                self.exprs(&mapping.keys)?;
                for pattern in &mapping.patterns {
                    self.pattern(pattern)?;
                }
                Ok(())
            }
            ast::Pattern::MatchClass(class) => {
                self.expr(&class.cls)?;
                for pattern in class.patterns.iter().chain(&class.kwd_patterns) {
                    self.pattern(pattern)?;
                }
                Ok(())
            }
            ast::Pattern::MatchAs(pattern) => match &pattern.pattern {
                Some(inner) => self.pattern(inner),
                None => Ok(()),
            },
            ast::Pattern::MatchOr(or) => {
                for pattern in &or.patterns {
                    self.pattern(pattern)?;
                }
                Ok(())
            }
        }
    }
}

/// Denies reflection calls whose attribute-name argument is a denied dunder
/// or is not a constant at all (fail closed on dynamic names).
fn check_reflection_call(id: &str, call: &ast::ExprCall) -> Result<(), InvalidInput> {
    let Some(name_arg) = call.args.get(1) else {
        return Ok(());
    };
    match constant_str(name_arg) {
        Some(name) if DUNDER_DENYLIST.contains(&name) => Err(InvalidInput::with_token(
            format!("{id} reaches interpreter internal {name}"),
            name,
        )),
        Some(_) => Ok(()),
        None => Err(InvalidInput::with_token(
            format!("{id} with a dynamic attribute name"),
            id,
        )),
    }
}

/// Rejects `open` calls whose mode argument implies writing, or whose mode is
/// not a constant string.
fn check_open_mode(call: &ast::ExprCall) -> Result<(), InvalidInput> {
    let mode_expr = call
        .args
        .get(1)
        .or_else(|| {
            call.keywords.iter().find_map(|keyword| {
                keyword.arg.as_ref().filter(|arg| arg.as_str() == "mode").map(|_| &keyword.value)
            })
        });
    let Some(mode_expr) = mode_expr else {
        // No mode argument: default "r" is read-only.
        return Ok(());
    };
    let Some(mode) = constant_str(mode_expr) else {
        return Err(InvalidInput::with_token("open with a dynamic mode", "open"));
    };
    if mode.chars().any(|ch| WRITE_MODE_CHARS.contains(&ch)) {
        return Err(InvalidInput::with_token(
            format!("open in write mode {mode:?}"),
            mode,
        ));
    }
    Ok(())
}

/// Returns the string payload of a constant-string expression.
fn constant_str(expr: &ast::Expr) -> Option<&str> {
    match expr {
        ast::Expr::Constant(constant) => match &constant.value {
            ast::Constant::Str(value) => Some(value.as_str()),
            _ => None,
        },
        _ => None,
    }
}

// ============================================================================
// SECTION: Source Facts
// ============================================================================

/// Structural facts extracted for the lint tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFacts {
    /// Function names in source order, deduplicated.
    pub functions: Vec<String>,
    /// Class names in source order, deduplicated.
    pub classes: Vec<String>,
    /// Imported module names in source order, deduplicated.
    pub imports: Vec<String>,
    /// Branch-forming node count plus one.
    pub complexity: u32,
}

impl SourceFacts {
    /// Extracts facts from a parsed tree.
    #[must_use]
    pub fn extract(suite: &[ast::Stmt]) -> Self {
        let mut facts = Self {
            functions: Vec::new(),
            classes: Vec::new(),
            imports: Vec::new(),
            complexity: 1,
        };
        facts.collect(suite);
        facts
    }

    fn collect(&mut self, stmts: &[ast::Stmt]) {
        for stmt in stmts {
            match stmt {
                ast::Stmt::FunctionDef(def) => {
                    push_unique(&mut self.functions, def.name.as_str());
                    self.collect(&def.body);
                }
                ast::Stmt::AsyncFunctionDef(def) => {
                    push_unique(&mut self.functions, def.name.as_str());
                    self.collect(&def.body);
                }
                ast::Stmt::ClassDef(def) => {
                    push_unique(&mut self.classes, def.name.as_str());
                    self.collect(&def.body);
                }
                ast::Stmt::Import(import) => {
                    for alias in &import.names {
                        push_unique(&mut self.imports, alias.name.as_str());
                    }
                }
                ast::Stmt::ImportFrom(import) => {
                    if let Some(module) = &import.module {
                        push_unique(&mut self.imports, module.as_str());
                    }
                }
                ast::Stmt::If(stmt) => {
                    self.complexity += 1;
                    self.collect(&stmt.body);
                    self.collect(&stmt.orelse);
                }
                ast::Stmt::For(stmt) => {
                    self.complexity += 1;
                    self.collect(&stmt.body);
                    self.collect(&stmt.orelse);
                }
                ast::Stmt::AsyncFor(stmt) => {
                    self.complexity += 1;
                    self.collect(&stmt.body);
                    self.collect(&stmt.orelse);
                }
                ast::Stmt::While(stmt) => {
                    self.complexity += 1;
                    self.collect(&stmt.body);
                    self.collect(&stmt.orelse);
                }
                ast::Stmt::Try(stmt) => {
                    self.complexity += 1;
                    self.collect(&stmt.body);
                    for handler in &stmt.handlers {
                        let ast::ExceptHandler::ExceptHandler(handler) = handler;
                        self.collect(&handler.body);
                    }
                    self.collect(&stmt.orelse);
                    self.collect(&stmt.finalbody);
                }
                ast::Stmt::With(stmt) => self.collect(&stmt.body),
                ast::Stmt::AsyncWith(stmt) => self.collect(&stmt.body),
                ast::Stmt::Match(stmt) => {
                    for case in &stmt.cases {
                        self.complexity += 1;
                        self.collect(&case.body);
                    }
                }
                _ => {}
            }
        }
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|existing| existing == name) {
        names.push(name.to_string());
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::CodeValidator;
    use super::CodeValidatorConfig;
    use super::SourceFacts;

    fn validator() -> CodeValidator {
        CodeValidator::new(CodeValidatorConfig::default())
    }

    #[test]
    fn benign_code_passes() {
        let validator = validator();
        for code in [
            "def add(a, b):\n    return a + b\n",
            "print('Hello, world!')",
            "x = [i**2 for i in range(10)]",
            "import json\nprint(json.dumps({'a': 1}))",
            "'__' + 'import__'",
        ] {
            validator.validate(code, false).unwrap_or_else(|err| panic!("{code}: {err}"));
        }
    }

    #[test]
    fn dangerous_imports_are_denied() {
        let validator = validator();
        for code in [
            "import os",
            "import os.path",
            "from subprocess import call",
            "import socket",
            "import ctypes",
            "def f():\n    import shutil\n",
        ] {
            assert!(validator.validate(code, false).is_err(), "{code}");
        }
    }

    #[test]
    fn dangerous_calls_are_denied() {
        let validator = validator();
        for code in [
            "eval('1+1')",
            "exec('x = 1')",
            "__import__('os').system('id')",
            "compile('x=1', '<string>', 'exec')",
            "input()",
            "help(str)",
        ] {
            assert!(validator.validate(code, false).is_err(), "{code}");
        }
    }

    #[test]
    fn dunder_access_is_denied() {
        let validator = validator();
        for code in [
            "x.__builtins__",
            "obj.__class__.__bases__",
            "func.__globals__",
            "getattr(x, '__import__')('os')",
            "globals()['__builtins__']",
            "().__class__.__mro__",
        ] {
            assert!(validator.validate(code, false).is_err(), "{code}");
        }
    }

    #[test]
    fn open_write_modes_are_denied() {
        let validator = validator();
        assert!(validator.validate("open('f', 'w')", false).is_err());
        assert!(validator.validate("open('f', mode='a')", false).is_err());
        assert!(validator.validate("open('f', m)", false).is_err());
        validator.validate("data = open('f').read()", false).unwrap();
        validator.validate("data = open('f', 'r').read()", false).unwrap();
    }

    #[test]
    fn strict_mode_denies_network_modules() {
        let validator = validator();
        validator.validate("import urllib", false).unwrap();
        assert!(validator.validate("import urllib", true).is_err());
        assert!(validator.validate("from http import client", true).is_err());
    }

    #[test]
    fn syntax_errors_are_invalid_input() {
        let validator = validator();
        assert!(validator.validate("def broken syntax here", false).is_err());
    }

    #[test]
    fn source_size_limit_is_enforced() {
        let validator = CodeValidator::new(CodeValidatorConfig {
            max_source_bytes: 16,
            ..CodeValidatorConfig::default()
        });
        assert!(validator.validate("x = 'aaaaaaaaaaaaaaaaaaaaaaaa'", false).is_err());
    }

    #[test]
    fn depth_limit_is_enforced() {
        let validator = CodeValidator::new(CodeValidatorConfig {
            max_ast_depth: 8,
            ..CodeValidatorConfig::default()
        });
        let nested = format!("x = {}1{}", "[".repeat(40), "]".repeat(40));
        assert!(validator.validate(&nested, false).is_err());
    }

    #[test]
    fn verdicts_are_deterministic() {
        let validator = validator();
        let code = "import os";
        let first = validator.validate(code, false).unwrap_err().reason;
        let second = validator.validate(code, false).unwrap_err().reason;
        assert_eq!(first, second);
    }

    #[test]
    fn facts_extract_names_in_source_order() {
        let validator = validator();
        let suite = validator
            .parse("import json\n\nclass B:\n    def method(self):\n        pass\n\ndef add(a, b):\n    return a + b\n")
            .unwrap();
        let facts = SourceFacts::extract(&suite);
        assert_eq!(facts.functions, vec!["method", "add"]);
        assert_eq!(facts.classes, vec!["B"]);
        assert_eq!(facts.imports, vec!["json"]);
        assert_eq!(facts.complexity, 1);
    }

    #[test]
    fn facts_count_branches() {
        let validator = validator();
        let suite = validator
            .parse(
                "def f(x):\n    if x:\n        return 1\n    for i in range(3):\n        while i:\n            i -= 1\n    try:\n        pass\n    except ValueError:\n        pass\n    return 0\n",
            )
            .unwrap();
        let facts = SourceFacts::extract(&suite);
        assert_eq!(facts.complexity, 5);
    }
}
