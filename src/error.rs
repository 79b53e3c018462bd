use thiserror::Error;

use crate::tpl::token::TokenKind;

/// Errors raised while scanning template text into tokens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    #[error("Expected '}}}}' after expression (tag opened at byte {position})")]
    UnclosedTag { position: usize },
    #[error("Unexpected character '{character}' at byte {position}")]
    UnexpectedCharacter { character: char, position: usize },
    #[error("Unknown keyword #{keyword} at byte {position}")]
    UnknownKeyword { keyword: String, position: usize },
}

impl TokenizeError {
    pub fn position(&self) -> usize {
        match self {
            TokenizeError::UnclosedTag { position }
            | TokenizeError::UnexpectedCharacter { position, .. }
            | TokenizeError::UnknownKeyword { position, .. } => *position,
        }
    }
}

/// Errors raised by the parser. The first failure aborts the parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{message} (expected {expected}, found {found} at byte {position})")]
    ExpectedToken {
        expected: TokenKind,
        found: TokenKind,
        message: &'static str,
        position: usize,
    },
    #[error("Unknown block tag #{keyword} at byte {position}")]
    UnknownBlockKeyword { keyword: TokenKind, position: usize },
    #[error("Expected closing tag for {construct} at byte {position}")]
    MissingClosingTag {
        construct: &'static str,
        position: usize,
    },
}

impl ParseError {
    pub fn position(&self) -> usize {
        match self {
            ParseError::ExpectedToken { position, .. }
            | ParseError::UnknownBlockKeyword { position, .. }
            | ParseError::MissingClosingTag { position, .. } => *position,
        }
    }
}

/// A compile-time failure: either the tokenizer or the parser rejected the source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl CompileError {
    /// Byte offset into the template source.
    pub fn position(&self) -> usize {
        match self {
            CompileError::Tokenize(e) => e.position(),
            CompileError::Parse(e) => e.position(),
        }
    }
}

/// Failure reported by a helper function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HelperError {
    #[error("expected at least {expected} argument(s), got {got}")]
    Arity { expected: usize, got: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Custom(String),
}

/// Errors raised while executing a compiled template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Missing `{0}`")]
    MissingValue(String),
    #[error("Unknown helper `{0}`")]
    UnknownHelper(String),
    #[error("`{path}` is not iterable (found {found})")]
    NonIterableEach { path: String, found: &'static str },
    #[error("Partial '{0}' not found or is not a string.")]
    PartialNotFound(String),
    #[error("Failed to resolve partial '{name}': {message}")]
    PartialResolve { name: String, message: String },
    #[error("Partial '{name}' exceeds the maximum inclusion depth of {depth}")]
    PartialDepthExceeded { name: String, depth: usize },
    #[error("Partial '{name}' failed to compile: {source}")]
    PartialCompile {
        name: String,
        #[source]
        source: CompileError,
    },
    #[error("Helper `{name}` failed: {source}")]
    Helper {
        name: String,
        #[source]
        source: HelperError,
    },
}

/// Errors raised while converting a `Serialize` type into a [`crate::Value`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("Value error: {0}")]
    Custom(String),
    #[error("Map keys must be strings, found {0}")]
    KeyMustBeString(&'static str),
}

impl serde::ser::Error for ValueError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        ValueError::Custom(msg.to_string())
    }
}

/// Top-level error returned by the rendering entry points.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    #[error(transparent)]
    Value(#[from] ValueError),
}

impl From<TokenizeError> for Error {
    fn from(e: TokenizeError) -> Self {
        Error::Compile(e.into())
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Compile(e.into())
    }
}
