//! # Sys2 Reasoning Engine
//!
//! A symbolic reasoning engine augmented with hyperdimensional computing.
//! Facts, rules, and graph macros are written in the triple-form Sys2DSL;
//! every concept and fact is stored both as a symbolic triple and as a
//! high-dimensional binary (or sparse-polynomial) vector. Queries are
//! answered by direct lookup (`ask`) or by goal proof (`prove`) via
//! backward chaining over rules, transitive closures, inheritance,
//! value-type inheritance, and negation-as-failure.
//!
//! ## Pipeline
//!
//! ```text
//! Sys2DSL Source
//!     ↓
//! [Parser]            → Statement / Graph / Theory / Solve nodes
//!     ↓
//! [Session]           → SSA bindings, theory stack, graph macros
//!     ↓
//! [Vocabulary]        → deterministic name → vector mapping
//!     ↓
//! [ConceptStore]      → interned concepts, indexed facts, existence levels
//!     ↓  (on ask / prove)
//! [Engine]            → KB indexes, rules, transitive closure,
//!                       inheritance, plugins, holographic fast path
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sys2::{Config, Session};
//!
//! let mut session = Session::new(Config::load()?)?;
//!
//! session.run("
//!     IS_A Dog Mammal
//!     IS_A Mammal Animal
//! ")?;
//!
//! let answer = session.ask("Dog IS_A Animal")?;
//! assert!(answer.found);   // derived through the IS_A chain
//! ```
//!
//! ## Semantics at a glance
//!
//! - **Open world**: `ask` on an unknown triple reports UNKNOWN, never
//!   false. Negation-as-failure only runs when the session's
//!   closed-world flag is set.
//! - **Existence levels**: every fact carries a level in
//!   {IMPOSSIBLE, UNPROVEN, POSSIBLE, DEMONSTRATED, CERTAIN}; assertion
//!   never lowers a level, derivation is capped at DEMONSTRATED.
//! - **Atomic learn**: a learn batch that would contradict the KB rolls
//!   back completely.
//! - **Determinism**: deterministic vector generation, insertion-ordered
//!   enumeration, and stable tie-breaking make identical inputs produce
//!   identical proofs.

// Vector layer
pub mod hdc;

// Knowledge store
pub mod store;

// Catalogs and capability registries
pub mod plugin;
pub mod registry;

// Language front end
pub mod ast;
pub mod parser;

// Reasoning
pub mod contradiction;
pub mod engine;

// Runtime
pub mod config;
pub mod session;

// Errors
pub mod error;

// Re-export the main entry points
pub use config::Config;
pub use session::{
    AbductionResult, BoundValue, ExecutionResult, Hypothesis, Mode, Session, SessionStats,
};

// Re-export core data types
pub use ast::{CompoundTree, Expr, PatternArg, Program, Statement, TriplePattern};
pub use engine::{
    EngineOptions, FailReason, ProofOptions, ProofResult, ProofStep, QueryResult, QuerySource,
    QueryStatus, Rule,
};
pub use error::{ParseError, RegistryError, SessionError, Sys2Error, Sys2Result};
pub use hdc::{Strategy, Vector};
pub use store::{existence, Concept, ConceptId, ConceptStore, Fact, FactId, Provenance};

// Re-export supporting pieces
pub use contradiction::{Contradiction, ContradictionDetector, ContradictionKind};
pub use plugin::{Plugin, PluginRegistry, TruthValue, Verdict};
pub use registry::{DimensionRegistry, RelationProperties};
