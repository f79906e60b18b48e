//! Composable message predicates
//!
//! A [`Validator`] selects which inbound message satisfies a pending request
//! or a subscription filter. Evaluation is a pure function of the message
//! text. Custom predicates are external code, so a panic inside one is caught
//! here and reported as a [`ValidatorFault`] instead of unwinding into the
//! dispatcher.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use regex::Regex;

use crate::error::{ValidatorError, ValidatorFault};

/// Externally supplied `string -> bool` capability used by [`Validator::Custom`]
pub trait Predicate: Send + Sync {
    fn check(&self, message: &str) -> bool;
}

impl<F> Predicate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn check(&self, message: &str) -> bool {
        self(message)
    }
}

/// Result of evaluating a validator against one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Match,
    NoMatch,
    /// A custom predicate failed; the message counts as not matching
    Fault(ValidatorFault),
}

impl Evaluation {
    pub fn is_match(&self) -> bool {
        matches!(self, Evaluation::Match)
    }
}

#[derive(Clone, Default)]
pub enum Validator {
    /// Matches every message
    #[default]
    AcceptAll,
    Regex(Regex),
    StartsWith(String),
    EndsWith(String),
    Contains(String),
    Not(Box<Validator>),
    /// True iff every child matches (empty list matches everything)
    All(Vec<Validator>),
    /// True iff at least one child matches (empty list matches nothing)
    Any(Vec<Validator>),
    Custom(Arc<dyn Predicate>),
}

impl Validator {
    pub fn accept_all() -> Self {
        Validator::AcceptAll
    }

    pub fn regex(pattern: &str) -> Result<Self, ValidatorError> {
        Ok(Validator::Regex(Regex::new(pattern)?))
    }

    pub fn starts_with(prefix: impl Into<String>) -> Self {
        Validator::StartsWith(prefix.into())
    }

    pub fn ends_with(suffix: impl Into<String>) -> Self {
        Validator::EndsWith(suffix.into())
    }

    pub fn contains(pattern: impl Into<String>) -> Self {
        Validator::Contains(pattern.into())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(validator: Validator) -> Self {
        Validator::Not(Box::new(validator))
    }

    pub fn all(validators: Vec<Validator>) -> Self {
        Validator::All(validators)
    }

    pub fn any(validators: Vec<Validator>) -> Self {
        Validator::Any(validators)
    }

    pub fn custom(predicate: impl Predicate + 'static) -> Self {
        Validator::Custom(Arc::new(predicate))
    }

    /// Evaluate against a message, reporting custom predicate faults
    pub fn evaluate(&self, message: &str) -> Evaluation {
        match self.eval(message) {
            Ok(true) => Evaluation::Match,
            Ok(false) => Evaluation::NoMatch,
            Err(fault) => Evaluation::Fault(fault),
        }
    }

    /// Boolean view of [`Validator::evaluate`]; a fault is a non-match
    pub fn matches(&self, message: &str) -> bool {
        self.evaluate(message).is_match()
    }

    fn eval(&self, message: &str) -> Result<bool, ValidatorFault> {
        match self {
            Validator::AcceptAll => Ok(true),
            Validator::Regex(regex) => Ok(regex.is_match(message)),
            Validator::StartsWith(prefix) => Ok(message.starts_with(prefix.as_str())),
            Validator::EndsWith(suffix) => Ok(message.ends_with(suffix.as_str())),
            Validator::Contains(pattern) => Ok(message.contains(pattern.as_str())),
            Validator::Not(inner) => Ok(!inner.eval(message)?),
            Validator::All(children) => {
                for child in children {
                    if !child.eval(message)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Validator::Any(children) => {
                for child in children {
                    if child.eval(message)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Validator::Custom(predicate) => {
                panic::catch_unwind(AssertUnwindSafe(|| predicate.check(message)))
                    .map_err(|payload| ValidatorFault(panic_message(payload.as_ref())))
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "custom predicate panicked".to_string()
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::AcceptAll => write!(f, "AcceptAll"),
            Validator::Regex(regex) => f.debug_tuple("Regex").field(&regex.as_str()).finish(),
            Validator::StartsWith(p) => f.debug_tuple("StartsWith").field(p).finish(),
            Validator::EndsWith(p) => f.debug_tuple("EndsWith").field(p).finish(),
            Validator::Contains(p) => f.debug_tuple("Contains").field(p).finish(),
            Validator::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            Validator::All(children) => f.debug_tuple("All").field(children).finish(),
            Validator::Any(children) => f.debug_tuple("Any").field(children).finish(),
            Validator::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}
