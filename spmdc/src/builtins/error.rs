//! Errors raised while binding and linking builtins.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::library::LibraryKey;
use crate::diagnostics::{Diagnostic, ErrorCode};

/// Checkpoints of the link pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkStage {
    LinkStdlib,
    LinkCommonBuiltins,
    LinkTargetBuiltins,
    FinalizeLinkage,
    LinkDispatch,
}

impl LinkStage {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkStage::LinkStdlib => "LinkStdlib",
            LinkStage::LinkCommonBuiltins => "LinkCommonBuiltins",
            LinkStage::LinkTargetBuiltins => "LinkTargetBuiltins",
            LinkStage::FinalizeLinkage => "FinalizeLinkage",
            LinkStage::LinkDispatch => "LinkDispatch",
        }
    }
}

impl fmt::Display for LinkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A foreign function could not be given a source-level signature.
///
/// Recoverable: the function is merely uncallable from source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("return type not representable for intrinsic `{function}`")]
    UnrepresentableReturn { function: String, llvm_type: String },

    #[error("type of parameter {index} not representable for intrinsic `{function}`")]
    UnrepresentableParam {
        function: String,
        index: usize,
        llvm_type: String,
    },

    #[error("intrinsic `{function}` is not found")]
    UnknownIntrinsic { function: String },

    #[error("intrinsic `{function}` is overloaded and cannot be declared without type arguments")]
    OverloadedIntrinsic { function: String },
}

impl BindError {
    pub fn function(&self) -> &str {
        match self {
            BindError::UnrepresentableReturn { function, .. }
            | BindError::UnrepresentableParam { function, .. }
            | BindError::UnknownIntrinsic { function }
            | BindError::OverloadedIntrinsic { function } => function,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            BindError::UnrepresentableReturn { .. } => ErrorCode::UnrepresentableReturnType,
            BindError::UnrepresentableParam { .. } => ErrorCode::UnrepresentableParamType,
            BindError::UnknownIntrinsic { .. } => ErrorCode::UnknownIntrinsic,
            BindError::OverloadedIntrinsic { .. } => ErrorCode::OverloadedIntrinsic,
        }
    }
}

impl From<&BindError> for Diagnostic {
    fn from(error: &BindError) -> Self {
        let diagnostic = Diagnostic::error(error.to_string())
            .with_error_code(error.error_code())
            .with_subject(error.function());
        match error {
            BindError::UnrepresentableReturn { llvm_type, .. }
            | BindError::UnrepresentableParam { llvm_type, .. } => {
                diagnostic.with_note(format!("LLVM type is `{}`", llvm_type))
            }
            _ => diagnostic,
        }
    }
}

/// Fatal errors: the target being compiled cannot be finished.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no builtin library registered for {key}")]
    MissingLibrary { key: LibraryKey },

    #[error("builtin library `{library}` is malformed: {message}")]
    MalformedLibrary { library: String, message: String },

    #[error("failed to read builtin library `{library}` from {}", .path.display())]
    LibraryIo {
        library: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error linking builtin library `{library}`: {message}")]
    LinkConflict { library: String, message: String },

    #[error("intrinsic `{name}` is declared as `{declared}` but LLVM defines it as `{expected}`")]
    IntrinsicSignatureMismatch {
        name: String,
        declared: String,
        expected: String,
    },

    #[error("intrinsic `{name}` is not found")]
    IntrinsicIdUnresolved { name: String },

    #[error("{stage} failed: {source}")]
    Stage {
        stage: LinkStage,
        #[source]
        source: Box<LinkError>,
    },
}

impl LinkError {
    /// Attribute this error to a pipeline stage.
    pub fn in_stage(self, stage: LinkStage) -> Self {
        match self {
            already @ LinkError::Stage { .. } => already,
            other => LinkError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage the error was attributed to, if any.
    pub fn stage(&self) -> Option<LinkStage> {
        match self {
            LinkError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying error with stage attribution removed.
    pub fn root_cause(&self) -> &LinkError {
        match self {
            LinkError::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self.root_cause() {
            LinkError::MissingLibrary { .. } => ErrorCode::MissingLibrary,
            LinkError::MalformedLibrary { .. } => ErrorCode::MalformedLibrary,
            LinkError::LibraryIo { .. } => ErrorCode::LibraryIo,
            LinkError::IntrinsicSignatureMismatch { .. } => ErrorCode::IntrinsicSignatureMismatch,
            LinkError::IntrinsicIdUnresolved { .. } => ErrorCode::IntrinsicIdUnresolved,
            LinkError::LinkConflict { .. } | LinkError::Stage { .. } => ErrorCode::LinkConflict,
        }
    }

    fn subject(&self) -> String {
        match self.root_cause() {
            LinkError::MissingLibrary { key } => key.to_string(),
            LinkError::MalformedLibrary { library, .. }
            | LinkError::LibraryIo { library, .. }
            | LinkError::LinkConflict { library, .. } => library.clone(),
            LinkError::IntrinsicSignatureMismatch { name, .. }
            | LinkError::IntrinsicIdUnresolved { name } => name.clone(),
            LinkError::Stage { stage, .. } => stage.to_string(),
        }
    }
}

impl From<&LinkError> for Diagnostic {
    fn from(error: &LinkError) -> Self {
        let mut diagnostic = Diagnostic::error(error.to_string())
            .with_error_code(error.error_code())
            .with_subject(error.subject());
        if let LinkError::LibraryIo { source, .. } = error.root_cause() {
            diagnostic = diagnostic.with_note(source.to_string());
        }
        diagnostic
    }
}
