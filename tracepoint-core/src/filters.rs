//! "My code" vs. library code classification, and the debugger-internal file
//! exclusion used to keep the dispatcher's own bootstrap frames invisible to
//! the step engine.

use parking_lot::RwLock;

/// A single exclude/include rule. `is_path` distinguishes a literal path
/// prefix from a glob-ish module-name pattern; `include` lets a later rule
/// carve an exception back out of an earlier broad exclusion.
#[derive(Debug, Clone)]
pub struct ExcludeFilter {
    pub pattern: String,
    pub is_path: bool,
    pub include: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    User,
    DebuggerInternal,
}

/// The `(file_name, function_name)` pairs that mark a debugger bootstrap
/// frame (the frame that called into the dispatcher's own run loop). The
/// step engine ascends past these when a step lands on a `return` event.
const DEBUG_START_PAIRS: &[(&str, &str)] = &[("pydevd.py", "run"), ("_pydev_execfile.py", "execfile")];

#[derive(Debug, Default)]
struct FilterState {
    project_roots: Vec<String>,
    exclude_filters: Vec<ExcludeFilter>,
    use_libraries_filter: bool,
    dont_trace_patterns: Vec<(String, String)>,
}

/// Shared, single-writer/many-reader filter configuration. Mutated only
/// through the debugger API; read on every dispatch.
#[derive(Debug, Default)]
pub struct ProjectFilters {
    state: RwLock<FilterState>,
}

impl ProjectFilters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_project_roots(&self, roots: Vec<String>) {
        self.state.write().project_roots = roots.into_iter().map(normalize).collect();
    }

    pub fn set_exclude_filters(&self, filters: Vec<ExcludeFilter>) {
        self.state.write().exclude_filters = filters;
    }

    pub fn set_use_libraries_filter(&self, use_it: bool) {
        self.state.write().use_libraries_filter = use_it;
    }

    pub fn set_dont_trace_start_end_patterns(&self, patterns: Vec<(String, String)>) {
        self.state.write().dont_trace_patterns = patterns;
    }

    /// True iff `file` should be treated as excluded from stepping/stopping.
    ///
    /// `force_check_project_scope` mirrors the `_MY_CODE` step variants: even
    /// with `use_libraries_filter` off, an explicit my-code step still checks
    /// project-root membership.
    #[must_use]
    pub fn apply_files_filter(&self, file: &str, force_check_project_scope: bool) -> bool {
        let state = self.state.read();
        let file = normalize_ref(file);

        // Later rules override earlier ones, so a narrow `include` rule can
        // carve an exception back out of an earlier broad exclusion.
        if let Some(rule) = state.exclude_filters.iter().rev().find(|rule| {
            if rule.is_path {
                file.starts_with(rule.pattern.as_str())
            } else {
                file.contains(rule.pattern.as_str())
            }
        }) {
            return !rule.include;
        }

        if state.use_libraries_filter || force_check_project_scope {
            if state.project_roots.is_empty() {
                return false;
            }
            return !state
                .project_roots
                .iter()
                .any(|root| file.starts_with(root.as_str()));
        }

        false
    }

    #[must_use]
    pub fn file_type(&self, file: &str) -> FileType {
        let base = file.rsplit(['/', '\\']).next().unwrap_or(file);
        if DEBUG_START_PAIRS.iter().any(|(f, _)| *f == base) {
            FileType::DebuggerInternal
        } else {
            FileType::User
        }
    }

    #[must_use]
    pub fn is_debug_start_frame(file: &str, function_name: &str) -> bool {
        let base = file.rsplit(['/', '\\']).next().unwrap_or(file);
        DEBUG_START_PAIRS
            .iter()
            .any(|(f, func)| *f == base && *func == function_name)
    }

    #[must_use]
    pub fn dont_trace_external_files(&self, abs_path: &str) -> bool {
        let state = self.state.read();
        state
            .dont_trace_patterns
            .iter()
            .any(|(start, end)| abs_path.starts_with(start.as_str()) && abs_path.ends_with(end.as_str()))
    }
}

fn normalize(path: String) -> String {
    path.replace('\\', "/")
}

fn normalize_ref(path: &str) -> String {
    path.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_root_membership_gates_library_classification() {
        let filters = ProjectFilters::new();
        filters.set_project_roots(vec!["/app".to_string()]);
        filters.set_use_libraries_filter(true);

        assert!(!filters.apply_files_filter("/app/main.py", false));
        assert!(filters.apply_files_filter("/site/lib.py", false));
    }

    #[test]
    fn my_code_step_checks_project_scope_even_without_libraries_filter() {
        let filters = ProjectFilters::new();
        filters.set_project_roots(vec!["/app".to_string()]);
        filters.set_use_libraries_filter(false);

        assert!(!filters.apply_files_filter("/site/lib.py", false));
        assert!(filters.apply_files_filter("/site/lib.py", true));
    }

    #[test]
    fn include_rule_carves_exception_out_of_exclude_rule() {
        let filters = ProjectFilters::new();
        filters.set_exclude_filters(vec![
            ExcludeFilter { pattern: "/site".to_string(), is_path: true, include: false },
            ExcludeFilter { pattern: "/site/allowed".to_string(), is_path: true, include: true },
        ]);

        assert!(filters.apply_files_filter("/site/lib.py", false));
        assert!(!filters.apply_files_filter("/site/allowed/lib.py", false));
    }

    #[test]
    fn debug_start_frame_is_detected_by_file_and_function() {
        assert!(ProjectFilters::is_debug_start_frame("pydevd.py", "run"));
        assert!(!ProjectFilters::is_debug_start_frame("pydevd.py", "other"));
    }
}
