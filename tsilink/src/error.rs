//! Error types for the tsilink export pipeline.
//!
//! One enum per concern, composed upward:
//!
//! - [`ExpressionError`] - expression syntax and evaluation errors
//! - [`MappingError`] - mapping file and per-record resolution errors
//! - [`ProviderError`] - row producer (CSV / Excel) errors
//! - [`TransportError`] - network-level failures reported by a sink
//! - [`ConfigError`] - invalid or missing run options
//! - [`PipelineError`] - top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Expression Errors
// =============================================================================

/// Errors while compiling or evaluating a leaf expression.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpressionError {
    /// The expression text could not be tokenized or parsed.
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    /// A call to a function that is not a built-in.
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    /// A built-in called with the wrong number of arguments.
    #[error("Function '{name}' expects {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    /// A date string that does not match its format pattern.
    #[error("Cannot parse date '{value}' with format '{format}'")]
    InvalidDate { value: String, format: String },
}

// =============================================================================
// Mapping Errors
// =============================================================================

/// Errors from loading a mapping file or resolving one record.
#[derive(Debug, Error)]
pub enum MappingError {
    /// A resolved leaf did not match its validation regex.
    #[error("Validation failed for field '{path}' value '{value}'")]
    Validation { path: String, value: String },

    /// The validation regex of a leaf does not compile.
    #[error("Invalid validation regex at '{path}': {source}")]
    InvalidRegex {
        path: String,
        #[source]
        source: regex::Error,
    },

    /// A leaf expression failed to compile or evaluate.
    #[error("Expression error at '{path}': {source}")]
    Expression {
        path: String,
        #[source]
        source: ExpressionError,
    },

    /// Failed to read the mapping file.
    #[error("Failed to read mapping file: {0}")]
    Load(#[from] std::io::Error),

    /// The mapping file is not valid JSON.
    #[error("Invalid mapping file: {0}")]
    Parse(#[from] serde_json::Error),
}

// =============================================================================
// Provider Errors
// =============================================================================

/// Errors from the row producers.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to read the input file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// A CSV record could not be decoded.
    #[error("Invalid CSV record at line {line}: {message}")]
    Csv { line: usize, message: String },

    /// The delimiter is not a single ASCII character.
    #[error("Invalid delimiter '{0}': must be a single ASCII character")]
    InvalidDelimiter(char),

    /// The workbook could not be opened or read.
    #[error("Cannot read workbook: {0}")]
    Workbook(String),

    /// The requested sheet does not exist in the workbook.
    #[error("Workbook sheet '{0}' does not exist")]
    SheetNotFound(String),

    /// The workbook has no sheets at all.
    #[error("Workbook contains no sheets")]
    EmptyWorkbook,

    /// Unknown provider name.
    #[error("The data provider specified '{0}' is not valid")]
    UnknownProvider(String),
}

// =============================================================================
// Transport Errors
// =============================================================================

/// A network-level failure sending one record.
///
/// HTTP error statuses are not transport errors; they arrive as a
/// [`crate::sink::SinkResponse`] with `status >= 400`.
#[derive(Debug, Clone, Error)]
#[error("problem with request: {message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(err.to_string())
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required option is missing.
    #[error("Missing option: {0}")]
    Missing(&'static str),

    /// An option has an unusable value.
    #[error("Invalid value for '{option}': {message}")]
    Invalid {
        option: &'static str,
        message: String,
    },

    /// The HTTP client could not be built.
    #[error("Cannot build HTTP client: {0}")]
    Client(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors returned by [`crate::pipeline::run`].
///
/// All of these abort the run before the first row is dispatched.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for expression operations.
pub type ExpressionResult<T> = Result<T, ExpressionError>;

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
