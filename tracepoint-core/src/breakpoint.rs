//! Breakpoint and exception-breakpoint records, and the plugin registry that
//! lets additional line-breakpoint kinds (e.g. template-language breakpoints)
//! be added without the store knowing about them.

use crate::ids::BreakpointId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendPolicy {
    Current,
    All,
}

/// Scope a line breakpoint is allowed to fire in. `Any` matches every frame
/// on the line (the literal string `"None"` in the client protocol), `Module`
/// matches only the top-level module frame (an empty function name), and
/// `Function` matches a single qualified function name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuncScope {
    Any,
    Module,
    Function(String),
}

impl FuncScope {
    #[must_use]
    pub fn matches(&self, current_function: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Module => current_function.is_empty() || current_function == "<module>",
            Self::Function(name) => name == current_function,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub kind: String,
    pub file: String,
    pub line: u32,
    pub func_scope: FuncScope,
    pub condition: Option<String>,
    pub log_expression: Option<String>,
    pub hit_condition: Option<String>,
    pub suspend_policy: SuspendPolicy,
    pub hit_count: u32,
}

impl Breakpoint {
    #[must_use]
    pub fn new(id: BreakpointId, kind: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            id,
            kind: kind.into(),
            file: file.into(),
            line,
            func_scope: FuncScope::Any,
            condition: None,
            log_expression: None,
            hit_condition: None,
            suspend_policy: SuspendPolicy::Current,
            hit_count: 0,
        }
    }

    #[must_use]
    pub const fn is_logpoint(&self) -> bool {
        self.log_expression.is_some()
    }

    pub fn record_hit(&mut self) {
        self.hit_count += 1;
    }
}

#[derive(Debug, Clone)]
pub struct ExceptionBreakpoint {
    pub qualified_name: String,
    pub condition: Option<String>,
    pub log_expression: Option<String>,
    pub notify_on_handled: bool,
    pub notify_on_unhandled: bool,
    pub notify_on_first_raise_only: bool,
    pub ignore_libraries: bool,
}

impl ExceptionBreakpoint {
    #[must_use]
    pub fn new(qualified_name: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            condition: None,
            log_expression: None,
            notify_on_handled: true,
            notify_on_unhandled: true,
            notify_on_first_raise_only: false,
            ignore_libraries: false,
        }
    }
}

/// Operations a breakpoint-kind plugin must provide so the store can treat
/// kinds it has never heard of (e.g. a templating-language line breakpoint)
/// uniformly with the built-in `"line"` kind.
pub trait BreakpointKindPlugin: Send + Sync {
    fn kind(&self) -> &str;
    /// Whether this plugin's breakpoints can ever match inside `file`. Used
    /// by the frame-scope skip cache to avoid invoking `matches` at all for
    /// files the plugin has no interest in.
    fn owns_file(&self, file: &str) -> bool;
    fn matches(&self, bp: &Breakpoint, file: &str, line: u32, function_name: &str) -> bool;
}

/// The built-in source-line breakpoint kind.
#[derive(Debug, Default)]
pub struct LineBreakpointPlugin;

impl BreakpointKindPlugin for LineBreakpointPlugin {
    fn kind(&self) -> &str {
        "line"
    }

    fn owns_file(&self, _file: &str) -> bool {
        true
    }

    fn matches(&self, bp: &Breakpoint, file: &str, line: u32, function_name: &str) -> bool {
        bp.file == file && bp.line == line && bp.func_scope.matches(function_name)
    }
}

/// Registry of breakpoint-kind plugins, keyed by kind string.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Box<dyn BreakpointKindPlugin>>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self { plugins: HashMap::new() };
        registry.register(Box::new(LineBreakpointPlugin));
        registry
    }

    pub fn register(&mut self, plugin: Box<dyn BreakpointKindPlugin>) {
        self.plugins.insert(plugin.kind().to_string(), plugin);
    }

    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&dyn BreakpointKindPlugin> {
        self.plugins.get(kind).map(std::convert::AsRef::as_ref)
    }

    #[must_use]
    pub fn is_known_kind(&self, kind: &str) -> bool {
        self.plugins.contains_key(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn func_scope_any_matches_every_function() {
        assert!(FuncScope::Any.matches("foo"));
        assert!(FuncScope::Any.matches(""));
    }

    #[test]
    fn func_scope_module_matches_only_top_level() {
        assert!(FuncScope::Module.matches(""));
        assert!(FuncScope::Module.matches("<module>"));
        assert!(!FuncScope::Module.matches("foo"));
    }

    #[test]
    fn func_scope_function_matches_exact_name() {
        let scope = FuncScope::Function("foo".to_string());
        assert!(scope.matches("foo"));
        assert!(!scope.matches("bar"));
    }

    #[test]
    fn registry_knows_builtin_line_kind_but_not_arbitrary_kinds() {
        let registry = PluginRegistry::new();
        assert!(registry.is_known_kind("line"));
        assert!(!registry.is_known_kind("django-line"));
    }

    #[test]
    fn logpoint_is_detected_by_presence_of_log_expression() {
        let mut bp = Breakpoint::new(BreakpointId::new(1), "line", "a.py", 10);
        assert!(!bp.is_logpoint());
        bp.log_expression = Some("x".to_string());
        assert!(bp.is_logpoint());
    }
}
