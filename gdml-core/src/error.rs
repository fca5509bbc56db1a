use std::path::PathBuf;

use thiserror::Error;

use crate::diagnostic::Diagnostic;
use crate::span::Span;

/// Diagnostic codes attached to every error the front end can report.
pub mod codes {
    pub const UNEXPECTED_CHAR: &str = "E0001";
    pub const UNTERMINATED_STRING: &str = "E0002";
    pub const SYNTAX: &str = "E0100";
    pub const UNKNOWN_NAMESPACE: &str = "E0200";
    pub const UNDEFINED_IDENTIFIER: &str = "E0201";
    pub const NOT_A_NAMESPACE: &str = "E0202";
    pub const DUPLICATE_ENTITY: &str = "E0203";
    pub const TYPE_MISMATCH: &str = "E0300";
    pub const MISSING_REQUIRED_PROPS: &str = "E0301";
    pub const UNKNOWN_MEMBER: &str = "E0302";
    pub const CYCLIC_ALIAS: &str = "E0303";
    pub const CYCLIC_DEPENDENCY: &str = "E0304";
    pub const UNKNOWN_DEPENDENCY: &str = "E0305";
    pub const NOT_CALLABLE: &str = "E0306";
    pub const ARGUMENT_COUNT: &str = "E0307";
    pub const UNRESOLVED: &str = "E0308";
    pub const NOT_A_TYPE: &str = "E0309";
    pub const NOT_A_VALUE: &str = "E0310";
    pub const INTERNAL: &str = "E0900";
    pub const SOURCE_IO: &str = "E0901";
}

/// Failures of the driver itself, as opposed to problems in the compiled
/// program (those are reported as diagnostics).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("source root was not found at {0}")]
    MissingSource(PathBuf),
    #[error("compilation of {unit} failed with {errors} error(s)")]
    CompileFailed { unit: String, errors: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnexpectedToken,
    UnexpectedEof,
    InvalidSyntax,
    TooDeep,
}

/// A syntax error. Always carries the span it was detected at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
}

impl ParseError {
    pub fn expected(expected: &str, found: Option<&str>, span: Span) -> Self {
        let (kind, message) = match found {
            Some(found) => (
                ParseErrorKind::UnexpectedToken,
                format!("expected {expected}, found {found}"),
            ),
            None => (
                ParseErrorKind::UnexpectedEof,
                format!("expected {expected}, found end of input"),
            ),
        };
        Self {
            kind,
            span,
            message,
            hint: None,
        }
    }

    pub fn invalid(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: ParseErrorKind::InvalidSyntax,
            span,
            message: message.into(),
            hint: None,
        }
    }

    pub fn too_deep(limit: usize, span: Span) -> Self {
        Self {
            kind: ParseErrorKind::TooDeep,
            span,
            message: format!("expression nesting exceeds the limit of {limit}"),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(self.message.clone(), self.span).with_code(codes::SYNTAX);
        if let Some(hint) = &self.hint {
            diag = diag.with_hint(hint.clone());
        }
        diag
    }
}

/// The checked errors of name resolution and typechecking.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("unknown namespace \"{0}\"")]
    UnknownNamespace(String),
    #[error("identifier \"{0}\" is undefined")]
    UndefinedIdentifier(String),
    #[error("cannot add sub-entities to \"{0}\", which is not a namespace or function")]
    NotANamespace(String),
    #[error("type or variable \"{0}\" already exists in this scope")]
    DuplicateEntity(String),
    #[error("expected type `{expected}`, found `{found}`")]
    TypeMismatch { expected: String, found: String },
    #[error("missing required props for `{ty}`: {}", .missing.join(", "))]
    MissingRequiredProps { ty: String, missing: Vec<String> },
    #[error("type `{ty}` has no member named \"{member}\"")]
    UnknownMember { ty: String, member: String },
    #[error("type alias \"{0}\" refers to itself")]
    CyclicAlias(String),
    #[error("member \"{0}\" has a cyclic default dependency")]
    CyclicDependency(String),
    #[error("member \"{member}\" depends on \"{dependency}\", which is not a member")]
    UnknownDependency { member: String, dependency: String },
    #[error("expression of type `{0}` is not callable")]
    NotCallable(String),
    #[error("expected {expected} argument(s), found {found}")]
    ArgumentCount { expected: usize, found: usize },
    #[error("type of \"{0}\" could not be inferred")]
    Unresolved(String),
    #[error("\"{0}\" is not a type")]
    NotAType(String),
    #[error("\"{0}\" is not a value")]
    NotAValue(String),
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CheckError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownNamespace(_) => codes::UNKNOWN_NAMESPACE,
            Self::UndefinedIdentifier(_) => codes::UNDEFINED_IDENTIFIER,
            Self::NotANamespace(_) => codes::NOT_A_NAMESPACE,
            Self::DuplicateEntity(_) => codes::DUPLICATE_ENTITY,
            Self::TypeMismatch { .. } => codes::TYPE_MISMATCH,
            Self::MissingRequiredProps { .. } => codes::MISSING_REQUIRED_PROPS,
            Self::UnknownMember { .. } => codes::UNKNOWN_MEMBER,
            Self::CyclicAlias(_) => codes::CYCLIC_ALIAS,
            Self::CyclicDependency(_) => codes::CYCLIC_DEPENDENCY,
            Self::UnknownDependency { .. } => codes::UNKNOWN_DEPENDENCY,
            Self::NotCallable(_) => codes::NOT_CALLABLE,
            Self::ArgumentCount { .. } => codes::ARGUMENT_COUNT,
            Self::Unresolved(_) => codes::UNRESOLVED,
            Self::NotAType(_) => codes::NOT_A_TYPE,
            Self::NotAValue(_) => codes::NOT_A_VALUE,
            Self::Internal(_) => codes::INTERNAL,
        }
    }

    /// Internal errors abort the whole unit instead of being collected.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    pub fn at(self, span: Span) -> TypeError {
        TypeError {
            kind: self,
            span,
            hint: None,
            note: None,
        }
    }
}

/// A [`CheckError`] located in the source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct TypeError {
    pub kind: CheckError,
    pub span: Span,
    pub hint: Option<String>,
    pub note: Option<String>,
}

impl TypeError {
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(self.kind.to_string(), self.span).with_code(self.kind.code());
        if let Some(hint) = &self.hint {
            diag = diag.with_hint(hint.clone());
        }
        if let Some(note) = &self.note {
            diag = diag.with_note(note.clone());
        }
        diag
    }
}

pub type TypeCheckResult<T> = Result<T, TypeError>;
