//! Error types for the PHS core.
//!
//! This module provides a unified error type [`PhsError`] that covers
//! all error conditions that can occur while describing a port-Hamiltonian
//! system, deriving its discrete-time method, compiling its expressions and
//! running a simulation.
//!
//! Non-convergence of the fixed-point loop is deliberately absent: an
//! iteration that hits `maxit` simply stops, and the outcome is reported
//! through [`crate::numerics::StepReport`].

use thiserror::Error;

/// Result type alias using [`PhsError`].
pub type Result<T> = std::result::Result<T, PhsError>;

/// Unified error type for all PHS operations.
#[derive(Error, Debug)]
pub enum PhsError {
    // ============ Description Language Errors ============
    /// Error during lexical analysis
    #[error("Lexer error at line {line}, column {column}: {message}")]
    LexerError {
        line: usize,
        column: usize,
        message: String,
    },

    /// Error during parsing
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    // ============ Symbolic Model Errors ============
    /// Symbolic model could not be finalized before compilation
    #[error("Build error: {message}")]
    BuildError { message: String },

    /// An expression references a symbol outside the canonical argument set
    #[error("Unresolved symbol '{symbol}' in expression '{expr}'")]
    UnresolvedSymbol { symbol: String, expr: String },

    /// A variable name was declared twice
    #[error("Duplicate symbol '{name}'")]
    DuplicateSymbol { name: String },

    /// Matrix is singular and cannot be inverted
    #[error("Singular matrix - no non-zero pivot in column {column}")]
    SingularMatrix { column: usize },

    // ============ Runtime Errors ============
    /// Unknown group or expression name
    #[error("Unknown field '{name}'")]
    UnknownField { name: String },

    /// Wrong vector length or non-numeric value
    #[error("Dimension error for '{what}': expected {expected}, got {actual}")]
    DimensionError {
        what: String,
        expected: String,
        actual: String,
    },

    // ============ Configuration Errors ============
    /// Invalid configuration value
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Configuration file could not be decoded
    #[error("Failed to parse configuration: {source}")]
    ConfigParse {
        #[source]
        source: serde_json::Error,
    },

    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },

    // ============ I/O Errors ============
    /// Error reading a model or configuration file
    #[error("Failed to read file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error reading or writing trajectory data
    #[error("Data I/O error on '{path}': {source}")]
    DataIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Trajectory row that is not a JSON array of numbers
    #[error("Malformed data row: {0}")]
    DataJson(#[from] serde_json::Error),

    /// Malformed trajectory data file
    #[error("Malformed data in '{path}' at row {row}: {message}")]
    DataFormat {
        path: String,
        row: usize,
        message: String,
    },

    /// Error reading audio input
    #[error("Audio input error: {message}")]
    AudioInputError { message: String },

    /// Error writing audio output
    #[error("Audio output error: {message}")]
    AudioOutputError { message: String },
}

impl PhsError {
    /// Create a lexer error
    pub fn lexer(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::LexerError {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            line,
            message: message.into(),
        }
    }

    /// Create a build error
    pub fn build(message: impl Into<String>) -> Self {
        Self::BuildError {
            message: message.into(),
        }
    }

    /// Create an unresolved symbol error
    pub fn unresolved(symbol: impl Into<String>, expr: impl Into<String>) -> Self {
        Self::UnresolvedSymbol {
            symbol: symbol.into(),
            expr: expr.into(),
        }
    }

    /// Create an unknown field error
    pub fn unknown_field(name: impl Into<String>) -> Self {
        Self::UnknownField { name: name.into() }
    }

    /// Create a dimension error for a length mismatch
    pub fn dimension(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::DimensionError {
            what: what.into(),
            expected: format!("length {}", expected),
            actual: format!("length {}", actual),
        }
    }

    /// Create an invalid configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
