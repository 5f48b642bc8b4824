//! Error Types
//!
//! One error enum per subsystem plus the [`Sys2Error`] umbrella.
//! Runtime proof failures (timeout, depth, step limit) are *values* carried
//! in `ProofResult { valid: false, reason }`, not errors; the enums here
//! cover parse, learn, configuration, and internal-consistency failures.

use thiserror::Error;

/// Parse errors carry the 1-based source line where they occurred.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Unexpected token
    #[error("line {line}: unexpected token '{found}', expected {expected}")]
    UnexpectedToken {
        line: usize,
        found: String,
        expected: String,
    },

    /// More than one `@` destination on a single statement
    #[error("line {line}: at most one '@' destination per statement")]
    MultipleDestinations { line: usize },

    /// String literal never closed
    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },

    /// Block comment never closed
    #[error("unterminated block comment starting at line {line}")]
    UnterminatedBlockComment { line: usize },

    /// A graph/theory/solve block missing its `end`
    #[error("unterminated {kind} block '{name}' starting at line {line}")]
    UnterminatedBlock {
        kind: String,
        name: String,
        line: usize,
    },

    /// List or compound never closed
    #[error("line {line}: unbalanced '{delimiter}'")]
    Unbalanced { line: usize, delimiter: char },

    /// Statement with no operator
    #[error("line {line}: statement has no operator")]
    EmptyStatement { line: usize },

    /// A `return` appearing outside a graph body, or a second one inside
    #[error("line {line}: misplaced 'return'")]
    MisplacedReturn { line: usize },

    /// Comment policy is `require` and a statement has no inline comment
    #[error("line {line}: statement requires an inline comment")]
    MissingComment { line: usize },

    /// Numeric literal that does not parse
    #[error("line {line}: invalid number '{text}'")]
    InvalidNumber { line: usize, text: String },
}

/// Session-level execution errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Reassigning an `@name` destination within one scope
    #[error("'@{name}' is already bound in this scope (destinations are single-assignment)")]
    SsaViolation { name: String },

    /// Referencing `$name` with no prior `@name`
    #[error("reference '${name}' has no prior '@{name}' binding")]
    UnresolvedReference { name: String },

    /// Learn refused because the batch would introduce a hard conflict
    #[error("learn rejected, batch would contradict the knowledge base: {details}")]
    ContradictionRejected { details: String },

    /// Attempt to raise an IMPOSSIBLE triple
    #[error("'{triple}' is marked IMPOSSIBLE; its existence cannot be upgraded")]
    ImpossibleAssertion { triple: String },

    /// Unknown graph or statement operator where one was required
    #[error("unknown graph '{name}'")]
    UnknownGraph { name: String },

    /// A graph was invoked with the wrong number of arguments
    #[error("graph '{name}' expects {expected} argument(s), got {got}")]
    GraphArity {
        name: String,
        expected: usize,
        got: usize,
    },

    /// Popping an empty theory stack
    #[error("theory stack is empty")]
    TheoryStackEmpty,

    /// A statement form that needs a destination did not have one
    #[error("operator '{operator}' requires an '@' destination")]
    DestinationRequired { operator: String },

    /// Malformed built-in statement (wrong arity, wrong argument kind)
    #[error("malformed '{operator}' statement: {details}")]
    MalformedStatement { operator: String, details: String },
}

/// Dimension-registry loading errors. A *missing* registry file is not an
/// error (the registry degrades to empty mappings); a present-but-broken
/// file is.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// I/O error reading the registry document
    #[error("failed to read registry document: {0}")]
    Io(#[from] std::io::Error),

    /// TOML syntax or shape error
    #[error("invalid registry document: {0}")]
    Toml(#[from] toml::de::Error),

    /// An axis referenced by a relation or property is not declared
    #[error("registry references undeclared axis '{axis}'")]
    UnknownAxis { axis: String },
}

/// Plugin evaluation errors. The engine degrades these to an UNKNOWN
/// verdict for the relation in question; they are surfaced here so the
/// registry can log them.
#[derive(Error, Debug)]
pub enum PluginError {
    /// No plugin registered under the name the registry maps the relation to
    #[error("no plugin registered under '{name}'")]
    NotFound { name: String },

    /// The plugin itself failed
    #[error("plugin '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

/// Vector algebra errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HdcError {
    /// Operands have different geometry
    #[error("geometry mismatch: {left} vs {right}")]
    GeometryMismatch { left: usize, right: usize },

    /// Operands come from different strategies
    #[error("strategy mismatch: {left} vs {right}")]
    StrategyMismatch { left: String, right: String },

    /// Bundle of an empty vector list
    #[error("cannot bundle an empty vector list")]
    EmptyBundle,
}

/// Internal store-consistency failure. Triggers an index rebuild.
#[derive(Error, Debug)]
#[error("index inconsistency: {details}")]
pub struct IndexInconsistency {
    pub details: String,
}

/// Umbrella error for the crate.
#[derive(Error, Debug)]
pub enum Sys2Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Hdc(#[from] HdcError),

    #[error(transparent)]
    Index(#[from] IndexInconsistency),
}

/// Result alias used across the crate.
pub type Sys2Result<T> = Result<T, Sys2Error>;
