//! Checked expression tree and its evaluation against a build.

use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

use crate::build::{Build, BuildStatus};

/// Build fields addressable from a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Field {
    Id,
    ProjectId,
    Status,
    LogUrl,
    BuildTriggerId,
    Substitutions,
    Tags,
}

impl Field {
    /// Accepts both the snake_case and camelCase spellings.
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "id" => Self::Id,
            "project_id" | "projectId" => Self::ProjectId,
            "status" => Self::Status,
            "log_url" | "logUrl" => Self::LogUrl,
            "build_trigger_id" | "buildTriggerId" => Self::BuildTriggerId,
            "substitutions" => Self::Substitutions,
            "tags" => Self::Tags,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    StartsWith,
    EndsWith,
    Contains,
    Matches,
    Size,
}

impl Method {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "startsWith" => Self::StartsWith,
            "endsWith" => Self::EndsWith,
            "contains" => Self::Contains,
            "matches" => Self::Matches,
            "size" => Self::Size,
            _ => return None,
        })
    }

    pub(crate) const fn arity(self) -> usize {
        match self {
            Self::Size => 0,
            _ => 1,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Contains => "contains",
            Self::Matches => "matches",
            Self::Size => "size",
        }
    }
}

/// Runtime value produced while evaluating a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    Status(BuildStatus),
    List(Vec<Value>),
    Map(HashMap<String, String>),
}

impl Value {
    const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::Status(_) => "Build.Status",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Value),
    Field(Field),
    List(Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    In(Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Call {
        target: Box<Expr>,
        method: Method,
        args: Vec<Expr>,
    },
    /// `matches()` with a pattern compiled ahead of time.
    Matches(Box<Expr>, Regex),
}

/// Failure while evaluating a compiled filter against one build.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("no matching overload for {op} on ({lhs}, {rhs})")]
    NoOverload {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("expected bool, got {0}")]
    NotBool(&'static str),

    #[error("index {index} out of range for list of length {len}")]
    OutOfRange { index: i64, len: usize },

    #[error("invalid regular expression {0:?}")]
    InvalidRegex(String),
}

type EvalResult<T> = Result<T, EvalError>;

impl Expr {
    /// Evaluate to a boolean; any other result type is an error.
    pub(crate) fn eval_bool(&self, build: &Build) -> EvalResult<bool> {
        match self.eval(build)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::NotBool(other.type_name())),
        }
    }

    fn eval(&self, build: &Build) -> EvalResult<Value> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Field(field) => Ok(field_value(build, *field)),
            Self::List(items) => items
                .iter()
                .map(|item| item.eval(build))
                .collect::<EvalResult<Vec<_>>>()
                .map(Value::List),
            Self::Not(inner) => Ok(Value::Bool(!inner.eval_bool(build)?)),
            Self::And(lhs, rhs) => Ok(Value::Bool(
                lhs.eval_bool(build)? && rhs.eval_bool(build)?,
            )),
            Self::Or(lhs, rhs) => Ok(Value::Bool(
                lhs.eval_bool(build)? || rhs.eval_bool(build)?,
            )),
            Self::Eq(lhs, rhs) => equals(&lhs.eval(build)?, &rhs.eval(build)?).map(Value::Bool),
            Self::Ne(lhs, rhs) => {
                equals(&lhs.eval(build)?, &rhs.eval(build)?).map(|eq| Value::Bool(!eq))
            }
            Self::In(lhs, rhs) => contains(&rhs.eval(build)?, &lhs.eval(build)?).map(Value::Bool),
            Self::Index(target, index) => index_value(target.eval(build)?, &index.eval(build)?),
            Self::Call {
                target,
                method,
                args,
            } => {
                let target = target.eval(build)?;
                let args = args
                    .iter()
                    .map(|arg| arg.eval(build))
                    .collect::<EvalResult<Vec<_>>>()?;
                call(*method, &target, &args)
            }
            Self::Matches(target, regex) => match target.eval(build)? {
                Value::Str(s) => Ok(Value::Bool(regex.is_match(&s))),
                other => Err(no_overload("matches", &other, &Value::Str(String::new()))),
            },
        }
    }
}

fn field_value(build: &Build, field: Field) -> Value {
    match field {
        Field::Id => Value::Str(build.id.clone()),
        Field::ProjectId => Value::Str(build.project_id.clone()),
        Field::Status => Value::Status(build.status),
        Field::LogUrl => Value::Str(build.log_url.clone()),
        Field::BuildTriggerId => Value::Str(build.build_trigger_id.clone()),
        Field::Substitutions => Value::Map(build.substitutions.clone()),
        Field::Tags => Value::List(build.tags.iter().cloned().map(Value::Str).collect()),
    }
}

fn no_overload(op: &'static str, lhs: &Value, rhs: &Value) -> EvalError {
    EvalError::NoOverload {
        op,
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    }
}

/// Equality. A status compares equal to a string holding its wire name.
fn equals(lhs: &Value, rhs: &Value) -> EvalResult<bool> {
    match (lhs, rhs) {
        (Value::Status(status), Value::Str(name)) | (Value::Str(name), Value::Status(status)) => {
            Ok(status.as_str() == name)
        }
        (Value::List(a), Value::List(b)) => {
            if a.len() != b.len() {
                return Ok(false);
            }
            for (x, y) in a.iter().zip(b) {
                if !equals(x, y)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ if std::mem::discriminant(lhs) == std::mem::discriminant(rhs) => Ok(lhs == rhs),
        _ => Err(no_overload("==", lhs, rhs)),
    }
}

fn contains(container: &Value, needle: &Value) -> EvalResult<bool> {
    match container {
        Value::List(items) => Ok(items
            .iter()
            .any(|item| equals(item, needle).unwrap_or(false))),
        Value::Map(map) => match needle {
            Value::Str(key) => Ok(map.contains_key(key)),
            other => Err(no_overload("in", other, container)),
        },
        other => Err(no_overload("in", needle, other)),
    }
}

/// Missing map keys read as the empty string so `substitutions['X']` works
/// on builds that never set `X`.
fn index_value(target: Value, index: &Value) -> EvalResult<Value> {
    match (target, index) {
        (Value::Map(mut map), Value::Str(key)) => {
            Ok(Value::Str(map.remove(key).unwrap_or_default()))
        }
        (Value::List(mut items), Value::Int(i)) => {
            let len = items.len();
            usize::try_from(*i)
                .ok()
                .filter(|&idx| idx < len)
                .map(|idx| items.swap_remove(idx))
                .ok_or(EvalError::OutOfRange { index: *i, len })
        }
        (target, index) => Err(no_overload("[]", &target, index)),
    }
}

fn call(method: Method, target: &Value, args: &[Value]) -> EvalResult<Value> {
    match (method, target, args) {
        (Method::Size, Value::Str(s), []) => Ok(Value::Int(count(s.chars().count()))),
        (Method::Size, Value::List(items), []) => Ok(Value::Int(count(items.len()))),
        (Method::Size, Value::Map(map), []) => Ok(Value::Int(count(map.len()))),
        (Method::StartsWith, Value::Str(s), [Value::Str(prefix)]) => {
            Ok(Value::Bool(s.starts_with(prefix.as_str())))
        }
        (Method::EndsWith, Value::Str(s), [Value::Str(suffix)]) => {
            Ok(Value::Bool(s.ends_with(suffix.as_str())))
        }
        (Method::Contains, Value::Str(s), [Value::Str(needle)]) => {
            Ok(Value::Bool(s.contains(needle.as_str())))
        }
        (Method::Contains, Value::List(_), [needle]) => contains(target, needle).map(Value::Bool),
        (Method::Matches, Value::Str(s), [Value::Str(pattern)]) => {
            let regex =
                Regex::new(pattern).map_err(|_| EvalError::InvalidRegex(pattern.clone()))?;
            Ok(Value::Bool(regex.is_match(s)))
        }
        (method, target, [arg]) => Err(no_overload(method.name(), target, arg)),
        (method, target, _) => Err(no_overload(method.name(), target, target)),
    }
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;

    fn build() -> Build {
        Build {
            id: "b42".to_string(),
            project_id: "p1".to_string(),
            status: BuildStatus::Failure,
            log_url: "https://logs/b42".to_string(),
            build_trigger_id: "trigger-1".to_string(),
            substitutions: HashMap::from([("BRANCH_NAME".to_string(), "main".to_string())]),
            tags: vec!["deploy".to_string(), "prod".to_string()],
            ..Build::default()
        }
    }

    fn eval(expr: &str) -> EvalResult<bool> {
        parse(expr).unwrap().eval_bool(&build())
    }

    #[test]
    fn test_status_comparisons() {
        assert_eq!(eval("build.status == Build.Status.FAILURE"), Ok(true));
        assert_eq!(eval("status==FAILURE"), Ok(true));
        assert_eq!(eval("build.status != SUCCESS"), Ok(true));
        assert_eq!(eval("build.status == 'FAILURE'"), Ok(true));
        assert_eq!(
            eval("build.status in [Build.Status.TIMEOUT, Build.Status.FAILURE]"),
            Ok(true)
        );
        assert_eq!(eval("build.status in [SUCCESS, CANCELLED]"), Ok(false));
    }

    #[test]
    fn test_boolean_logic() {
        assert_eq!(
            eval("status == FAILURE && build.substitutions['BRANCH_NAME'] == 'main'"),
            Ok(true)
        );
        assert_eq!(eval("status == SUCCESS || build.id == 'b42'"), Ok(true));
        assert_eq!(eval("!(status == FAILURE)"), Ok(false));
        assert_eq!(eval("false && build.id"), Ok(false));
    }

    #[test]
    fn test_substitutions_and_tags() {
        assert_eq!(eval("build.substitutions.BRANCH_NAME == 'main'"), Ok(true));
        assert_eq!(eval("build.substitutions['MISSING'] == ''"), Ok(true));
        assert_eq!(eval("'BRANCH_NAME' in build.substitutions"), Ok(true));
        assert_eq!(eval("'prod' in build.tags"), Ok(true));
        assert_eq!(eval("'staging' in build.tags"), Ok(false));
        assert_eq!(eval("build.tags[0] == 'deploy'"), Ok(true));
        assert_eq!(eval("build.tags.size() == 2"), Ok(true));
        assert_eq!(eval("build.tags.contains('prod')"), Ok(true));
        assert_eq!(eval("build.tags.contains('staging')"), Ok(false));
        assert_eq!(eval("[FAILURE, TIMEOUT].contains(build.status)"), Ok(true));
    }

    #[test]
    fn test_not_binds_tighter_than_comparison() {
        // `(!status) == FAILURE`: negating a status is a type error.
        assert_eq!(
            eval("!status == FAILURE"),
            Err(EvalError::NotBool("Build.Status"))
        );
        assert_eq!(eval("!(status == FAILURE)"), Ok(false));
        assert_eq!(eval("!(status == SUCCESS)"), Ok(true));
        assert_eq!(eval("!false == true"), Ok(true));
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(eval("build.log_url.startsWith('https://')"), Ok(true));
        assert_eq!(eval("build.id.endsWith('42')"), Ok(true));
        assert_eq!(eval("build.buildTriggerId.contains('trig')"), Ok(true));
        assert_eq!(eval("build.id.matches('^b[0-9]+$')"), Ok(true));
        assert_eq!(eval("build.projectId.matches('^x')"), Ok(false));
    }

    #[test]
    fn test_type_errors() {
        assert!(matches!(
            eval("build.id == 1"),
            Err(EvalError::NoOverload { op: "==", .. })
        ));
        assert_eq!(eval("build.id"), Err(EvalError::NotBool("string")));
        assert!(matches!(
            eval("build.tags[5] == 'x'"),
            Err(EvalError::OutOfRange { index: 5, len: 2 })
        ));
        assert!(matches!(
            eval("build.tags.startsWith('x')"),
            Err(EvalError::NoOverload { op: "startsWith", .. })
        ));
    }
}
