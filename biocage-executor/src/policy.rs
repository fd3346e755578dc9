//! Failure classification and the teardown decision.
//!
//! Every execution result falls into exactly one [`FailureClass`]. Timeouts
//! and infrastructure failures always tear the container down; a user-code
//! failure does so only under [`FailurePolicy::Strict`].

use std::fmt;

use biocage_core::ExecutionResult;
use serde::{Deserialize, Serialize};

/// What kind of outcome an execution had.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum FailureClass {
    Success,
    /// The submitted code raised, exited non-zero, or wrote to stderr.
    UserCode,
    /// The execution machinery failed (`error` is set).
    Infrastructure,
    /// The wall-clock timeout fired.
    Timeout,
}

impl FailureClass {
    /// Classify a result. Checked in order: timeout, infrastructure, user code.
    #[must_use]
    pub fn of(result: &ExecutionResult) -> Self {
        if result.is_timeout() {
            Self::Timeout
        } else if result.error().is_some() {
            Self::Infrastructure
        } else if result.exit_code() != 0 || !result.stderr().trim().is_empty() {
            Self::UserCode
        } else {
            Self::Success
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::UserCode => "user_code",
            Self::Infrastructure => "infrastructure",
            Self::Timeout => "timeout",
        })
    }
}

/// Whether a user-code failure ends the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum FailurePolicy {
    /// Tear the container down after a failed user-code result.
    #[default]
    Strict,
    /// Keep the container and its session after user-code errors.
    Lenient,
}

impl FailurePolicy {
    #[must_use]
    pub fn from_shutdown_on_failure(shutdown: bool) -> Self {
        if shutdown {
            Self::Strict
        } else {
            Self::Lenient
        }
    }
}

/// Coarse category of a user-code error, recognised from stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCategory {
    Syntax,
    Name,
    ZeroDivision,
    Import,
    Indentation,
    Type,
    Key,
    Index,
    Unknown,
}

impl ErrorCategory {
    /// Patterns in match order. `IndentationError` subclasses
    /// `SyntaxError` but its traceback names only the former, so the order
    /// only matters for messages that mention both.
    const PATTERNS: [(&'static [&'static str], Self); 8] = [
        (&["syntaxerror"], Self::Syntax),
        (&["nameerror"], Self::Name),
        (&["zerodivisionerror"], Self::ZeroDivision),
        (&["importerror", "modulenotfounderror"], Self::Import),
        (&["indentationerror"], Self::Indentation),
        (&["typeerror"], Self::Type),
        (&["keyerror"], Self::Key),
        (&["indexerror"], Self::Index),
    ];

    /// Categorise stderr text, case-insensitively.
    #[must_use]
    pub fn from_stderr(stderr: &str) -> Self {
        let lowered = stderr.to_lowercase();
        Self::PATTERNS
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| lowered.contains(n)))
            .map_or(Self::Unknown, |(_, category)| *category)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Syntax => "syntax error",
            Self::Name => "name error",
            Self::ZeroDivision => "division by zero",
            Self::Import => "import error",
            Self::Indentation => "indentation error",
            Self::Type => "type error",
            Self::Key => "key error",
            Self::Index => "index error",
            Self::Unknown => "runtime error",
        }
    }

    /// One-line remediation hint for the caller.
    #[must_use]
    pub fn hint(self) -> &'static str {
        match self {
            Self::Syntax => {
                "check the code for syntax mistakes such as unbalanced brackets or missing colons"
            }
            Self::Name => "a name is used before it is defined; define it or check its spelling",
            Self::ZeroDivision => "guard the divisor against zero before dividing",
            Self::Import => {
                "the module is not installed in the sandbox image or the import path is wrong"
            }
            Self::Indentation => "fix the indentation so blocks line up consistently",
            Self::Type => "an operation received a value of the wrong type; check argument types",
            Self::Key => "the key is missing from the mapping; check it exists before indexing",
            Self::Index => "the index is out of range for the sequence",
            Self::Unknown => "inspect stderr for the full traceback",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The controller's verdict on one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct Assessment {
    pub class: FailureClass,
    /// Set for user-code failures only.
    pub category: Option<ErrorCategory>,
    /// Whether the container must be torn down.
    pub teardown: bool,
}

/// Decide what a result means and whether it ends the container.
///
/// A user-code result tears down under `Strict` only when it is not
/// `success()`: code that exits 0 but writes warnings to stderr keeps its
/// session.
#[must_use]
pub fn assess(result: &ExecutionResult, policy: FailurePolicy) -> Assessment {
    let class = FailureClass::of(result);
    let (category, teardown) = match class {
        FailureClass::Success => (None, false),
        FailureClass::Timeout | FailureClass::Infrastructure => (None, true),
        FailureClass::UserCode => (
            Some(ErrorCategory::from_stderr(result.stderr())),
            policy == FailurePolicy::Strict && !result.success(),
        ),
    };
    Assessment { class, category, teardown }
}
