//! Build filter predicates.
//!
//! Filters are written in a CEL-like expression language and compiled once
//! at setup:
//!
//! ```text
//! build.status == Build.Status.FAILURE && build.substitutions['BRANCH_NAME'] == 'main'
//! status in [FAILURE, TIMEOUT]
//! build.tags.contains('prod') || build.log_url.startsWith('https://')
//! ```

mod eval;
mod lexer;
mod parser;

pub use eval::EvalError;

use tracing::warn;

use crate::build::Build;
use crate::error::FilterError;

/// Decides whether a build should produce a notification.
pub trait EventFilter: Send + Sync {
    fn apply(&self, build: &Build) -> bool;
}

/// A compiled CEL-like filter expression.
#[derive(Debug, Clone)]
pub struct CelPredicate {
    source: String,
    expr: eval::Expr,
}

impl CelPredicate {
    /// Parse and check `source`.
    ///
    /// # Errors
    ///
    /// Returns a [`FilterError`] for an empty or malformed expression, an
    /// unknown field, status name or method, or an invalid literal regular
    /// expression.
    pub fn compile(source: &str) -> Result<Self, FilterError> {
        let expr = parser::parse(source)?;
        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }

    /// The expression this predicate was compiled from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against `build`, surfacing type errors.
    ///
    /// # Errors
    ///
    /// Returns an [`EvalError`] when an operator or method has no overload
    /// for the runtime types, an index is out of range, or the result is
    /// not a bool.
    pub fn evaluate(&self, build: &Build) -> Result<bool, EvalError> {
        self.expr.eval_bool(build)
    }
}

impl EventFilter for CelPredicate {
    /// Evaluation errors count as "no match".
    fn apply(&self, build: &Build) -> bool {
        match self.evaluate(build) {
            Ok(matched) => matched,
            Err(e) => {
                warn!(
                    build_id = %build.id,
                    filter = %self.source,
                    error = %e,
                    "Filter evaluation failed, treating as no match"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildStatus;

    fn build(status: BuildStatus) -> Build {
        Build {
            id: "b1".to_string(),
            project_id: "p1".to_string(),
            status,
            ..Build::default()
        }
    }

    #[test]
    fn test_apply() {
        let filter = CelPredicate::compile("build.status == Build.Status.FAILURE").unwrap();
        assert!(filter.apply(&build(BuildStatus::Failure)));
        assert!(!filter.apply(&build(BuildStatus::Success)));
    }

    #[test]
    fn test_eval_error_is_no_match() {
        let filter = CelPredicate::compile("build.id == 7").unwrap();
        assert!(filter.evaluate(&build(BuildStatus::Failure)).is_err());
        assert!(!filter.apply(&build(BuildStatus::Failure)));
    }

    #[test]
    fn test_documented_tag_filter_matches() {
        let filter = CelPredicate::compile(
            "build.tags.contains('prod') || build.log_url.startsWith('https://')",
        )
        .unwrap();
        let mut tagged = build(BuildStatus::Failure);
        tagged.tags = vec!["prod".to_string()];
        assert_eq!(filter.evaluate(&tagged), Ok(true));
        assert!(!filter.apply(&build(BuildStatus::Failure)));
    }

    #[test]
    fn test_source_is_trimmed() {
        let filter = CelPredicate::compile("  status == SUCCESS \n").unwrap();
        assert_eq!(filter.source(), "status == SUCCESS");
    }

    #[test]
    fn test_compile_rejects_empty() {
        assert_eq!(CelPredicate::compile("").unwrap_err(), FilterError::Empty);
    }
}
