//! # Session and Graph Runtime
//!
//! A session owns every subsystem: vocabulary, concept store, dimension
//! registry, plugin registry, contradiction detector, rules, and graph
//! macros. It executes Sys2DSL programs, binds statement results to
//! `@destinations` (single-assignment per scope), resolves `$references`,
//! maintains the theory stack, and drives the reasoning engine.
//!
//! ## Modes
//!
//! `run` enters LEARNING mode and may mutate the knowledge base; `ask`
//! and `prove` enter QUERY mode and never do. A session is
//! single-threaded; distinct sessions may run in parallel.
//!
//! ## Statement semantics
//!
//! At top level, a plain `operator arg…` statement asserts a fact
//! (contradiction-checked, CERTAIN unless the operator forces a level)
//! and binds its `@destination`, when present, to the fact handle — a
//! later `$ref` resolves to the stored triple as a goal, or to its HDC
//! vector inside vector ops. `@name:persist` (or `@:name`) additionally
//! registers the name in the store's named-fact table, so the fact stays
//! addressable through [`ConceptStore::fact_by_name`] and is annotated
//! in exports. Built-in operators cover rules (`rule`), proving
//! (`prove`, `ask`), explicit existence control (`retract`, `forget`,
//! `setExistence`), and the HDC composition ops used inside graph bodies
//! (`vector`, `bind`, `bundle`, `unbind`, `similarity`). Inside a graph
//! body, plain statements with a destination bind triple *patterns*
//! instead of asserting facts, which is what lets `return And $x $y`
//! compose them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::ast::{
    number_label, CompoundTree, Dest, Expr, GraphDeclaration, Node, PatternArg, Program,
    SolveBlock, Statement, TheoryDeclaration, TriplePattern,
};
use crate::config::Config;
use crate::contradiction::ContradictionDetector;
use crate::engine::unify::{rename_apart, substitute, unify_patterns, Bindings};
use crate::engine::{
    Engine, EngineOptions, ProofOptions, ProofResult, QueryResult, QueryStatus, Rule,
};
use crate::error::{ParseError, SessionError, Sys2Error, Sys2Result};
use crate::hdc::vocabulary::Vocabulary;
use crate::hdc::Vector;
use crate::parser::{parse_program_with_policy, parse_statement};
use crate::plugin::{Plugin, PluginRegistry};
use crate::registry::DimensionRegistry;
use crate::store::{
    existence, AddOutcome, ConceptStore, FactId, Hook, HookEvent, NewFact, Provenance, UndoRecord,
};

/// Execution mode. The KB is only mutated in LEARNING mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Learning,
    Query,
}

/// A value bound to an `@destination`.
#[derive(Debug, Clone)]
pub enum BoundValue {
    Vector(Vector),
    Concept(String),
    Number(f64),
    Str(String),
    List(Vec<BoundValue>),
    Pattern(CompoundTree),
    /// An asserted fact, by id. `$refs` to it resolve to the stored
    /// triple (as a goal) or its HDC vector (in vector ops).
    Fact(FactId),
    Proof(Box<ProofResult>),
    Query(Box<QueryResult>),
}

/// Counters exposed by [`Session::stats`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub statements_executed: u64,
    pub facts_added: u64,
    pub proofs_attempted: u64,
    pub proofs_succeeded: u64,
    pub queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub contradictions_rejected: u64,
}

/// Summary of one `run` call.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub statements_executed: usize,
    pub facts_added: usize,
    pub warnings: Vec<String>,
    pub last_proof: Option<ProofResult>,
    pub last_query: Option<QueryResult>,
}

/// One abductive hypothesis: a rule that would explain the observation
/// plus the assumptions it requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    pub rule: String,
    pub assumptions: Vec<TriplePattern>,
    pub confidence: f64,
}

/// Result of [`Session::abduct`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AbductionResult {
    pub hypotheses: Vec<Hypothesis>,
}

/// A pushed theory layer: the facts and rules it contributed, undone on
/// pop.
#[derive(Debug)]
struct TheoryLayer {
    name: String,
    /// Triples asserted inside the layer, for retraction on pop.
    triples: Vec<(String, Vec<String>)>,
    /// Rule count before the layer was pushed.
    rules_before: usize,
}

/// Single-assignment binding scope.
#[derive(Debug, Default)]
struct Scope {
    values: HashMap<String, BoundValue>,
}

impl Scope {
    fn bind(&mut self, name: &str, value: BoundValue) -> Result<(), SessionError> {
        if self.values.contains_key(name) {
            return Err(SessionError::SsaViolation {
                name: name.to_string(),
            });
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    fn get(&self, name: &str) -> Option<&BoundValue> {
        self.values.get(name)
    }
}

/// Where a statement executes; controls assertion vs pattern-binding.
#[derive(Clone, Copy, PartialEq)]
enum ExecContext {
    TopLevel,
    GraphBody,
    SolveDecl,
}

const BUILTIN_OPERATORS: [&str; 12] = [
    "rule",
    "prove",
    "ask",
    "retract",
    "forget",
    "setExistence",
    "mode",
    "vector",
    "bind",
    "bundle",
    "unbind",
    "similarity",
];

/// A reasoning session.
pub struct Session {
    config: Config,
    vocabulary: Arc<Vocabulary>,
    store: ConceptStore,
    registry: DimensionRegistry,
    plugins: PluginRegistry,
    detector: ContradictionDetector,
    rules: Vec<Rule>,
    graphs: HashMap<String, GraphDeclaration>,
    theory_stack: Vec<TheoryLayer>,
    mode: Mode,
    globals: Scope,
    stats: SessionStats,
    derivation_cache: HashMap<String, (Instant, u64, QueryResult)>,
    rule_counter: usize,
}

impl Session {
    /// Create a session from configuration. The dimension registry is
    /// loaded from the configured path, degrading silently when the file
    /// is missing.
    pub fn new(config: Config) -> Sys2Result<Self> {
        let vocabulary = Arc::new(Vocabulary::new(config.hdc.strategy, config.hdc.geometry));
        let registry = DimensionRegistry::load_or_degraded(config.registry.path.as_deref())?;
        tracing::info!(
            strategy = %config.hdc.strategy,
            geometry = config.hdc.geometry,
            degraded_registry = registry.is_degraded(),
            "session initialized"
        );
        Ok(Self {
            store: ConceptStore::new(Arc::clone(&vocabulary)),
            vocabulary,
            registry,
            plugins: PluginRegistry::new(),
            detector: ContradictionDetector::new(),
            rules: Vec::new(),
            graphs: HashMap::new(),
            theory_stack: Vec::new(),
            mode: Mode::Learning,
            globals: Scope::default(),
            stats: SessionStats::default(),
            derivation_cache: HashMap::new(),
            config,
            rule_counter: 0,
        })
    }

    /// Session with default configuration.
    pub fn with_defaults() -> Sys2Result<Self> {
        Self::new(Config::default())
    }

    // --------------------------------------------------------------------
    // Accessors
    // --------------------------------------------------------------------

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn store(&self) -> &ConceptStore {
        &self.store
    }

    pub fn registry(&self) -> &DimensionRegistry {
        &self.registry
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Flip negation-as-failure on or off for this session.
    pub fn set_closed_world(&mut self, enabled: bool) {
        self.config.proof.closed_world_assumption = enabled;
    }

    /// Register a computable-relation plugin.
    pub fn register_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.register(plugin);
    }

    /// Register an event hook (fact-added, concept-created, reasoning
    /// steps, contradictions).
    pub fn register_hook(&mut self, hook: Hook) {
        self.store.register_hook(hook);
    }

    /// A bound value by destination name.
    pub fn binding(&self, name: &str) -> Option<&BoundValue> {
        self.globals.get(name)
    }

    fn proof_options(&self) -> ProofOptions {
        ProofOptions {
            timeout: Duration::from_millis(self.config.proof.timeout_ms),
            max_depth: self.config.proof.max_depth,
            max_steps: self.config.proof.max_steps,
        }
    }

    fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            closed_world: self.config.proof.closed_world_assumption,
            holographic: self.config.proof.holographic_fast_path,
            max_chain_depth: self.config.proof.max_chain_depth,
        }
    }

    fn engine(&self) -> Engine<'_> {
        Engine::new(
            &self.store,
            &self.registry,
            &self.plugins,
            &self.rules,
            self.engine_options(),
        )
    }

    // --------------------------------------------------------------------
    // Program execution
    // --------------------------------------------------------------------

    /// Parse and execute a DSL program in LEARNING mode. Each top-level
    /// statement is atomic; earlier statements survive a failure in a
    /// later one.
    pub fn run(&mut self, dsl: &str) -> Sys2Result<ExecutionResult> {
        self.set_mode(Mode::Learning);
        let program = parse_program_with_policy(dsl, self.config.parser.comment_policy)?;
        let mut result = ExecutionResult::default();
        self.execute_program(&program, &mut result)?;
        Ok(result)
    }

    fn execute_program(
        &mut self,
        program: &Program,
        result: &mut ExecutionResult,
    ) -> Sys2Result<()> {
        for node in &program.nodes {
            self.execute_node(node, result)?;
        }
        Ok(())
    }

    fn execute_node(&mut self, node: &Node, result: &mut ExecutionResult) -> Sys2Result<()> {
        match node {
            Node::Statement(statement) => {
                let facts_before = self.stats.facts_added;
                let value =
                    self.execute_statement(statement, ExecContext::TopLevel, None)?;
                result.statements_executed += 1;
                result.facts_added += (self.stats.facts_added - facts_before) as usize;
                match &value {
                    Some(BoundValue::Proof(proof)) => {
                        result.last_proof = Some((**proof).clone());
                    }
                    Some(BoundValue::Query(query)) => {
                        result.last_query = Some((**query).clone());
                    }
                    _ => {}
                }
                if let (Some(dest), Some(value)) = (&statement.dest, value) {
                    self.bind_dest(dest, value, None, statement.line)?;
                }
                Ok(())
            }
            Node::Graph(graph) => {
                self.graphs.insert(graph.name.clone(), graph.clone());
                tracing::debug!(name = %graph.name, params = graph.params.len(), "graph registered");
                Ok(())
            }
            Node::Theory(theory) => self.execute_theory(theory, result),
            Node::Solve(solve) => self.execute_solve(solve, result),
        }
    }

    /// A theory block pushes a named layer, loads its body into it, and
    /// leaves the layer on the stack for later `pop_theory`.
    fn execute_theory(
        &mut self,
        theory: &TheoryDeclaration,
        result: &mut ExecutionResult,
    ) -> Sys2Result<()> {
        self.push_theory(&theory.name);
        tracing::info!(name = %theory.name, deterministic = ?theory.deterministic, "theory loading");
        for node in &theory.body {
            self.execute_node(node, result)?;
        }
        Ok(())
    }

    /// A solve block binds patterns from its declarations, then proves
    /// the declaration named by the header. Side-effect free.
    fn execute_solve(&mut self, solve: &SolveBlock, result: &mut ExecutionResult) -> Sys2Result<()> {
        let mut local = Scope::default();
        for decl in &solve.decls {
            let value = self.execute_statement(decl, ExecContext::SolveDecl, Some(&local))?;
            if let (Some(dest), Some(value)) = (&decl.dest, value) {
                local.bind(&dest.name, value)?;
            }
        }
        let Some(BoundValue::Pattern(goal)) = local.get(&solve.goal).cloned() else {
            return Err(SessionError::UnresolvedReference {
                name: solve.goal.clone(),
            }
            .into());
        };
        let mode_before = self.mode;
        let proof = self.prove(&goal, None);
        self.set_mode(mode_before);
        result.last_proof = Some(proof.clone());
        result.statements_executed += 1;
        self.bind_dest(&solve.dest, BoundValue::Proof(Box::new(proof)), None, solve.line)?;
        Ok(())
    }

    fn bind_dest(
        &mut self,
        dest: &Dest,
        value: BoundValue,
        local: Option<&mut Scope>,
        line: usize,
    ) -> Sys2Result<()> {
        if dest.persist {
            // `@name:persist` / `@:name` registers the fact under its
            // name in the store, so it stays addressable via
            // `fact_by_name` and annotated in exports, beyond the
            // session binding.
            match &value {
                BoundValue::Fact(id) => {
                    self.store.set_fact_name(&dest.name, *id);
                    tracing::debug!(name = %dest.name, line, "fact persisted under name");
                }
                other => {
                    return Err(SessionError::MalformedStatement {
                        operator: format!("@{}:persist", dest.name),
                        details: format!(
                            "':persist' applies to asserted facts, not {}",
                            kind_of(other)
                        ),
                    }
                    .into());
                }
            }
        }
        match local {
            Some(scope) => scope.bind(&dest.name, value)?,
            None => self.globals.bind(&dest.name, value)?,
        }
        Ok(())
    }

    // --------------------------------------------------------------------
    // Statements
    // --------------------------------------------------------------------

    fn execute_statement(
        &mut self,
        statement: &Statement,
        context: ExecContext,
        local: Option<&Scope>,
    ) -> Sys2Result<Option<BoundValue>> {
        self.stats.statements_executed += 1;

        // Pre-check SSA so a failing statement never half-binds.
        if let Some(dest) = &statement.dest {
            let taken = match local {
                Some(scope) => scope.get(&dest.name).is_some(),
                None => self.globals.get(&dest.name).is_some(),
            };
            if taken {
                return Err(SessionError::SsaViolation {
                    name: dest.name.clone(),
                }
                .into());
            }
        }

        match &statement.operator {
            Expr::Ident(name) if BUILTIN_OPERATORS.contains(&name.as_str()) => {
                self.execute_builtin(name.clone().as_str(), statement, local)
            }
            Expr::Ident(name) if self.graphs.contains_key(name) => {
                let value = self.invoke_graph(name.clone().as_str(), &statement.args, local)?;
                Ok(Some(value))
            }
            Expr::Ident(_) => match context {
                ExecContext::TopLevel => {
                    let value = self.assert_statement(statement, local)?;
                    Ok(Some(value))
                }
                ExecContext::GraphBody | ExecContext::SolveDecl => {
                    // Graph and solve bodies define patterns, not facts.
                    let tree = self.statement_to_tree(statement, local)?;
                    Ok(Some(BoundValue::Pattern(tree)))
                }
            },
            Expr::Compound { .. } => {
                let tree = self.expr_to_tree(&statement.operator, local)?;
                Ok(Some(BoundValue::Pattern(tree)))
            }
            Expr::Reference(name) => {
                let value = self.lookup(name, local)?.clone();
                Ok(Some(value))
            }
            other => Err(SessionError::MalformedStatement {
                operator: other.to_string(),
                details: "operator must be an identifier, $reference, or compound".to_string(),
            }
            .into()),
        }
    }

    fn execute_builtin(
        &mut self,
        name: &str,
        statement: &Statement,
        local: Option<&Scope>,
    ) -> Sys2Result<Option<BoundValue>> {
        match name {
            "rule" => {
                if statement.args.len() != 2 {
                    return Err(SessionError::MalformedStatement {
                        operator: "rule".to_string(),
                        details: "expected a condition and a conclusion".to_string(),
                    }
                    .into());
                }
                let condition = self.expr_to_tree(&statement.args[0], local)?;
                let conclusion = match self.expr_to_tree(&statement.args[1], local)? {
                    CompoundTree::Leaf(pattern) => pattern,
                    other => {
                        return Err(SessionError::MalformedStatement {
                            operator: "rule".to_string(),
                            details: format!("conclusion must be a triple, got {other}"),
                        }
                        .into());
                    }
                };
                self.rule_counter += 1;
                let rule_name = statement
                    .dest
                    .as_ref()
                    .map_or_else(|| format!("rule{}", self.rule_counter), |d| d.name.clone());
                let rule = Rule::new(rule_name.clone(), condition, conclusion, &self.vocabulary);
                tracing::debug!(name = %rule_name, has_variables = rule.has_variables, "rule added");
                self.rules.push(rule);
                Ok(None)
            }
            "prove" => {
                let goal = self.goal_from_args(&statement.args, local)?;
                // A prove embedded in a program must not leave the
                // session stuck in QUERY mode for the statements after it.
                let mode_before = self.mode;
                let proof = self.prove(&goal, None);
                self.set_mode(mode_before);
                Ok(Some(BoundValue::Proof(Box::new(proof))))
            }
            "ask" => {
                // `ask A IS_A B` reads infix exactly like the string API,
                // so reinterpret the argument list as a query line.
                let pattern = match statement.args.split_first() {
                    Some((first, rest)) if !rest.is_empty() => {
                        let pseudo = Statement {
                            dest: None,
                            operator: first.clone(),
                            args: rest.to_vec(),
                            comment: None,
                            line: statement.line,
                        };
                        self.query_pattern(&pseudo)?
                    }
                    _ => {
                        let goal = self.goal_from_args(&statement.args, local)?;
                        match goal.as_leaf() {
                            Some(pattern) => pattern.clone(),
                            None => {
                                return Err(SessionError::MalformedStatement {
                                    operator: "ask".to_string(),
                                    details: "ask takes a single triple".to_string(),
                                }
                                .into());
                            }
                        }
                    }
                };
                let mode_before = self.mode;
                let query = self.ask_pattern(&pattern);
                self.set_mode(mode_before);
                Ok(Some(BoundValue::Query(Box::new(query))))
            }
            "retract" => {
                let (relation, args) = self.triple_labels(&statement.args, local)?;
                let refs: Vec<&str> = args.iter().map(String::as_str).collect();
                let removed = self
                    .store
                    .retract(&self.registry.canonical_operator(&relation), &refs);
                tracing::debug!(%relation, removed, "retract");
                Ok(None)
            }
            "forget" => {
                let labels = self.label_args(&statement.args, local)?;
                for label in labels {
                    let removed = self.store.forget(&label);
                    tracing::debug!(%label, removed, "forget");
                }
                Ok(None)
            }
            "setExistence" => {
                if statement.args.len() < 4 {
                    return Err(SessionError::MalformedStatement {
                        operator: "setExistence".to_string(),
                        details: "expected: setExistence relation subject object level".to_string(),
                    }
                    .into());
                }
                let (relation, rest) = self.triple_labels(&statement.args[..3], local)?;
                let level = self.existence_arg(&statement.args[3], local)?;
                let refs: Vec<&str> = rest.iter().map(String::as_str).collect();
                self.store.set_existence(
                    &self.registry.canonical_operator(&relation),
                    &refs,
                    level,
                );
                Ok(None)
            }
            "mode" => {
                let target = statement.args.first().and_then(Expr::as_ident);
                match target {
                    Some("LEARNING") | Some("learning") => self.set_mode(Mode::Learning),
                    Some("QUERY") | Some("query") => self.set_mode(Mode::Query),
                    other => {
                        return Err(SessionError::MalformedStatement {
                            operator: "mode".to_string(),
                            details: format!("unknown mode {other:?}"),
                        }
                        .into());
                    }
                }
                Ok(None)
            }
            "vector" => {
                let labels = self.label_args(&statement.args, local)?;
                let Some(label) = labels.first() else {
                    return Err(SessionError::MalformedStatement {
                        operator: "vector".to_string(),
                        details: "expected a concept name".to_string(),
                    }
                    .into());
                };
                Ok(Some(BoundValue::Vector(self.vocabulary.get_or_create(label))))
            }
            "bind" | "unbind" => {
                let vectors = self.vector_args(&statement.args, local)?;
                if vectors.len() != 2 {
                    return Err(SessionError::MalformedStatement {
                        operator: name.to_string(),
                        details: "expected exactly two vectors".to_string(),
                    }
                    .into());
                }
                let out = if name == "bind" {
                    vectors[0].bind(&vectors[1])
                } else {
                    vectors[0].unbind(&vectors[1])
                }
                .map_err(Sys2Error::Hdc)?;
                Ok(Some(BoundValue::Vector(out)))
            }
            "bundle" => {
                let vectors = self.vector_args(&statement.args, local)?;
                let refs: Vec<&Vector> = vectors.iter().collect();
                let out = Vector::bundle(&refs).map_err(Sys2Error::Hdc)?;
                Ok(Some(BoundValue::Vector(out)))
            }
            "similarity" => {
                let vectors = self.vector_args(&statement.args, local)?;
                if vectors.len() != 2 {
                    return Err(SessionError::MalformedStatement {
                        operator: "similarity".to_string(),
                        details: "expected exactly two vectors".to_string(),
                    }
                    .into());
                }
                let sim = vectors[0].similarity(&vectors[1]).map_err(Sys2Error::Hdc)?;
                Ok(Some(BoundValue::Number(sim)))
            }
            _ => unreachable!("caller matched a builtin"),
        }
    }

    // --------------------------------------------------------------------
    // Assertion
    // --------------------------------------------------------------------

    fn assert_statement(
        &mut self,
        statement: &Statement,
        local: Option<&Scope>,
    ) -> Sys2Result<BoundValue> {
        let Some(operator) = statement.operator_name() else {
            return Err(SessionError::MalformedStatement {
                operator: statement.operator.to_string(),
                details: "assertions need a named operator".to_string(),
            }
            .into());
        };
        let operator = operator.to_string();
        let args = self.label_args(&statement.args, local)?;
        let level = self.assertion_level(&operator, false);
        let outcome = self.assert_fact(
            &operator,
            &args,
            level,
            Provenance::at_line(statement.line),
            None,
        )?;
        Ok(BoundValue::Fact(outcome.fact_id()))
    }

    /// Existence level an assertion lands at: the operator's forced level
    /// when it has one, else CERTAIN for `run`, UNPROVEN for `learn`.
    fn assertion_level(&self, operator: &str, learning_default_unproven: bool) -> i8 {
        let canonical = self.registry.canonical_operator(operator);
        if learning_default_unproven && canonical == crate::registry::IS_A {
            // Plain IS_A carries no explicit epistemic commitment; learn
            // refuses to mint certainty from it.
            return existence::UNPROVEN;
        }
        if let Some(level) = self.registry.forced_existence(operator) {
            return level;
        }
        if learning_default_unproven {
            existence::UNPROVEN
        } else {
            existence::CERTAIN
        }
    }

    fn assert_fact(
        &mut self,
        operator: &str,
        args: &[String],
        level: i8,
        provenance: Provenance,
        undo: Option<&mut Vec<UndoRecord>>,
    ) -> Sys2Result<AddOutcome> {
        if self.mode != Mode::Learning {
            return Err(SessionError::MalformedStatement {
                operator: operator.to_string(),
                details: "assertions require LEARNING mode".to_string(),
            }
            .into());
        }
        let canonical = self.registry.canonical_operator(operator);

        let conflicts = self
            .detector
            .would_contradict(&self.store, &self.registry, &canonical, args);
        if !conflicts.is_empty() {
            self.stats.contradictions_rejected += 1;
            let details = conflicts
                .iter()
                .map(|c| c.message.clone())
                .collect::<Vec<_>>()
                .join("; ");
            self.store.emit(&HookEvent::Contradiction {
                kind: format!("{:?}", conflicts[0].kind),
                detail: details.clone(),
            });
            return Err(SessionError::ContradictionRejected { details }.into());
        }

        let outcome = self.store.add_fact(
            NewFact {
                operator: canonical.clone(),
                args: args.to_vec(),
                existence: level,
                provenance,
            },
            undo,
        )?;
        if outcome.mutated() {
            self.stats.facts_added += 1;
            if let Some(layer) = self.theory_stack.last_mut() {
                layer.triples.push((canonical, args.to_vec()));
            }
        }
        Ok(outcome)
    }

    // --------------------------------------------------------------------
    // learn / ask / prove / abduct
    // --------------------------------------------------------------------

    /// Learn one or more statements as an atomic batch. Facts default to
    /// UNPROVEN unless their operator forces an explicit level. If any
    /// statement would contradict the KB, the whole batch is rolled back
    /// and the KB is byte-identical to before the call.
    pub fn learn(&mut self, dsl: &str) -> Sys2Result<ExecutionResult> {
        self.set_mode(Mode::Learning);
        let program = parse_program_with_policy(dsl, self.config.parser.comment_policy)?;

        let version_before = self.store.kb_version();
        let mut undo: Vec<UndoRecord> = Vec::new();
        let mut result = ExecutionResult::default();

        for node in &program.nodes {
            let Node::Statement(statement) = node else {
                return Err(SessionError::MalformedStatement {
                    operator: "learn".to_string(),
                    details: "learn accepts plain statements only".to_string(),
                }
                .into());
            };
            let Some(operator) = statement.operator_name().map(str::to_string) else {
                return Err(SessionError::MalformedStatement {
                    operator: statement.operator.to_string(),
                    details: "learn accepts plain assertions only".to_string(),
                }
                .into());
            };
            let args = self.label_args(&statement.args, None)?;
            let level = self.assertion_level(&operator, true);
            let attempt = self.assert_fact(
                &operator,
                &args,
                level,
                Provenance::at_line(statement.line),
                Some(&mut undo),
            );
            match attempt {
                Ok(_) => {
                    result.statements_executed += 1;
                }
                Err(err) => {
                    // Atomic learn: every staged mutation is undone.
                    self.store.rollback(undo, version_before);
                    tracing::warn!(%err, "learn batch rolled back");
                    return Err(err);
                }
            }
        }
        result.facts_added = undo
            .iter()
            .filter(|record| matches!(record, UndoRecord::Inserted { .. }))
            .count();
        Ok(result)
    }

    /// Answer a query string. Accepts infix (`Dog IS_A Animal`) when the
    /// middle token is a known relation, otherwise prefix
    /// (`hasProperty Tea Cold`). Enters QUERY mode; never mutates the KB.
    pub fn ask(&mut self, query: &str) -> Sys2Result<QueryResult> {
        self.set_mode(Mode::Query);
        let statement = match parse_statement(query) {
            Ok(statement) => statement,
            Err(ParseError::EmptyStatement { .. }) => {
                return Ok(QueryResult {
                    status: Some(QueryStatus::ParseError),
                    ..QueryResult::unknown()
                });
            }
            Err(err) => {
                tracing::debug!(%err, "ask parse failed");
                return Ok(QueryResult {
                    status: Some(QueryStatus::ParseError),
                    explanation: Some(err.to_string()),
                    ..QueryResult::unknown()
                });
            }
        };
        let pattern = self.query_pattern(&statement)?;
        Ok(self.ask_pattern(&pattern))
    }

    /// Reinterpret a parsed query line: `A REL B` (infix) vs `rel A B`
    /// (prefix).
    fn query_pattern(&mut self, statement: &Statement) -> Sys2Result<TriplePattern> {
        if statement.args.len() == 2 {
            if let (Some(first), Some(middle)) = (
                statement.operator_name(),
                statement.args[0].as_ident(),
            ) {
                if self.is_relation_like(middle) && !self.is_relation_like(first) {
                    let object = self.expr_to_pattern_arg(&statement.args[1], None)?;
                    return Ok(TriplePattern {
                        operator: middle.to_string(),
                        args: vec![PatternArg::Atom(first.to_string()), object],
                    });
                }
            }
        }
        let Some(operator) = statement.operator_name() else {
            return Err(SessionError::MalformedStatement {
                operator: statement.operator.to_string(),
                details: "query operator must be an identifier".to_string(),
            }
            .into());
        };
        let mut args = Vec::with_capacity(statement.args.len());
        for arg in &statement.args {
            args.push(self.expr_to_pattern_arg(arg, None)?);
        }
        Ok(TriplePattern {
            operator: operator.to_string(),
            args,
        })
    }

    /// Whether a token reads as a relation name: an IS_A variant, a
    /// relation the registry knows, or an UPPER_SNAKE spelling.
    fn is_relation_like(&self, name: &str) -> bool {
        if self.registry.is_is_a_variant(name) {
            return true;
        }
        if self.registry.relation_properties(name) != Default::default() {
            return true;
        }
        name.len() > 2
            && name.contains('_')
            && name
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit())
    }

    fn ask_pattern(&mut self, pattern: &TriplePattern) -> QueryResult {
        self.set_mode(Mode::Query);
        self.stats.queries += 1;

        let canonical = TriplePattern {
            operator: self.registry.canonical_operator(&pattern.operator),
            args: pattern.args.clone(),
        };
        let cache_key = canonical.to_string();
        let ttl = Duration::from_millis(self.config.cache.derivation_ttl_ms);
        if let Some((at, version, cached)) = self.derivation_cache.get(&cache_key) {
            if *version == self.store.kb_version() && at.elapsed() < ttl {
                self.stats.cache_hits += 1;
                return cached.clone();
            }
        }
        self.stats.cache_misses += 1;

        let result = self.engine().ask(&canonical);
        self.derivation_cache.insert(
            cache_key,
            (Instant::now(), self.store.kb_version(), result.clone()),
        );
        result
    }

    /// Prove a goal tree. Enters QUERY mode; emits reasoning-step events
    /// after the proof completes (hook writes are buffered by contract).
    pub fn prove(&mut self, goal: &CompoundTree, opts: Option<ProofOptions>) -> ProofResult {
        self.set_mode(Mode::Query);
        self.stats.proofs_attempted += 1;
        let opts = opts.unwrap_or_else(|| self.proof_options());
        let result = self.engine().prove(goal, &opts);
        if result.valid {
            self.stats.proofs_succeeded += 1;
        }
        for step in &result.steps {
            self.store.emit(&HookEvent::ReasoningStep {
                operation: step.operation.clone(),
                detail: step
                    .rule
                    .clone()
                    .or_else(|| step.fact.map(|f| format!("{f:?}")))
                    .unwrap_or_default(),
            });
        }
        result
    }

    /// Abduce explanations for an observation: rules whose conclusion
    /// unifies with it, ranked by how few unproven assumptions they
    /// need.
    pub fn abduct(&mut self, observation: &TriplePattern, max_hypotheses: usize) -> AbductionResult {
        self.set_mode(Mode::Query);
        let canonical = TriplePattern {
            operator: self.registry.canonical_operator(&observation.operator),
            args: observation.args.clone(),
        };

        let mut hypotheses: Vec<Hypothesis> = Vec::new();
        for (index, rule) in self.rules.iter().enumerate() {
            let conclusion = rename_apart(&rule.conclusion, index + 1);
            let Some(bindings) = unify_patterns(&conclusion, &canonical, &Bindings::new()) else {
                continue;
            };
            let mut assumptions: Vec<TriplePattern> = Vec::new();
            collect_leaves(&rule.condition, index + 1, &bindings, &mut assumptions);

            // Leaves already supported by the KB are not assumptions.
            let engine = Engine::new(
                &self.store,
                &self.registry,
                &self.plugins,
                &[],
                self.engine_options(),
            );
            assumptions.retain(|leaf| !leaf.is_ground() || !engine.ask(leaf).found);

            let confidence = crate::hdc::consts::CONFIDENCE_DECAY.powi(assumptions.len() as i32);
            hypotheses.push(Hypothesis {
                rule: rule.name.clone(),
                assumptions,
                confidence,
            });
        }
        hypotheses.sort_by(|a, b| {
            a.assumptions
                .len()
                .cmp(&b.assumptions.len())
                .then_with(|| a.rule.cmp(&b.rule))
        });
        hypotheses.truncate(max_hypotheses);
        AbductionResult { hypotheses }
    }

    // --------------------------------------------------------------------
    // Theory stack
    // --------------------------------------------------------------------

    /// Push a named theory layer. Facts asserted while it is on top are
    /// retracted when it is popped.
    pub fn push_theory(&mut self, name: &str) {
        self.theory_stack.push(TheoryLayer {
            name: name.to_string(),
            triples: Vec::new(),
            rules_before: self.rules.len(),
        });
    }

    /// Pop the top theory layer, retracting its facts and rules.
    pub fn pop_theory(&mut self) -> Sys2Result<String> {
        let layer = self
            .theory_stack
            .pop()
            .ok_or(SessionError::TheoryStackEmpty)?;
        for (operator, args) in layer.triples.iter().rev() {
            let refs: Vec<&str> = args.iter().map(String::as_str).collect();
            self.store.retract(operator, &refs);
        }
        self.rules.truncate(layer.rules_before);
        tracing::info!(name = %layer.name, facts = layer.triples.len(), "theory popped");
        Ok(layer.name)
    }

    /// Names of the layers currently on the stack, bottom to top.
    pub fn theory_names(&self) -> Vec<&str> {
        self.theory_stack.iter().map(|l| l.name.as_str()).collect()
    }

    // --------------------------------------------------------------------
    // Export
    // --------------------------------------------------------------------

    /// Serialize the KB as canonical one-per-line triples, provenance as
    /// a trailing comment.
    pub fn export_facts(&self) -> String {
        let mut out = String::new();
        for fact in self.store.facts() {
            out.push_str(&fact.operator);
            for &arg in &fact.args {
                out.push(' ');
                out.push_str(self.store.label(arg));
            }
            out.push_str(&format!(
                "  # existence={}",
                existence::name(fact.existence)
            ));
            if let Some(line) = fact.provenance.line {
                out.push_str(&format!(" line={line}"));
            }
            if let Some(rule) = &fact.provenance.rule {
                out.push_str(&format!(" rule={rule}"));
            }
            if let Some(name) = self.store.fact_name(fact.id) {
                out.push_str(&format!(" name={name}"));
            }
            out.push('\n');
        }
        out
    }

    // --------------------------------------------------------------------
    // Expression evaluation
    // --------------------------------------------------------------------

    fn lookup<'s>(&'s self, name: &str, local: Option<&'s Scope>) -> Result<&'s BoundValue, SessionError> {
        if let Some(scope) = local {
            if let Some(value) = scope.get(name) {
                return Ok(value);
            }
        }
        self.globals
            .get(name)
            .ok_or_else(|| SessionError::UnresolvedReference {
                name: name.to_string(),
            })
    }

    /// Evaluate expressions to concept labels (assertion arguments).
    fn label_args(&self, exprs: &[Expr], local: Option<&Scope>) -> Sys2Result<Vec<String>> {
        exprs.iter().map(|e| self.expr_to_label(e, local)).collect()
    }

    fn expr_to_label(&self, expr: &Expr, local: Option<&Scope>) -> Sys2Result<String> {
        match expr {
            Expr::Ident(name) => Ok(name.clone()),
            Expr::Number(n) => Ok(number_label(*n)),
            Expr::Str(s) => Ok(s.clone()),
            Expr::Reference(name) => match self.lookup(name, local)? {
                BoundValue::Concept(label) => Ok(label.clone()),
                BoundValue::Str(s) => Ok(s.clone()),
                BoundValue::Number(n) => Ok(number_label(*n)),
                other => Err(SessionError::MalformedStatement {
                    operator: format!("${name}"),
                    details: format!("cannot use {} as a concept label", kind_of(other)),
                }
                .into()),
            },
            other => Err(SessionError::MalformedStatement {
                operator: other.to_string(),
                details: "expected a concept label".to_string(),
            }
            .into()),
        }
    }

    /// `(relation, [subject, object, …])` from builtin argument lists
    /// like `retract rel s o`.
    fn triple_labels(
        &self,
        exprs: &[Expr],
        local: Option<&Scope>,
    ) -> Sys2Result<(String, Vec<String>)> {
        let labels = self.label_args(exprs, local)?;
        let Some((relation, rest)) = labels.split_first() else {
            return Err(SessionError::MalformedStatement {
                operator: "retract".to_string(),
                details: "expected: relation subject object…".to_string(),
            }
            .into());
        };
        Ok((relation.clone(), rest.to_vec()))
    }

    fn existence_arg(&self, expr: &Expr, local: Option<&Scope>) -> Sys2Result<i8> {
        match expr {
            Expr::Number(n) => Ok((*n).clamp(-127.0, 127.0) as i8),
            Expr::Ident(name) => match name.to_ascii_uppercase().as_str() {
                "IMPOSSIBLE" => Ok(existence::IMPOSSIBLE),
                "UNPROVEN" => Ok(existence::UNPROVEN),
                "POSSIBLE" => Ok(existence::POSSIBLE),
                "DEMONSTRATED" => Ok(existence::DEMONSTRATED),
                "CERTAIN" => Ok(existence::CERTAIN),
                other => Err(SessionError::MalformedStatement {
                    operator: "setExistence".to_string(),
                    details: format!("unknown existence level {other}"),
                }
                .into()),
            },
            Expr::Reference(name) => match self.lookup(name, local)? {
                BoundValue::Number(n) => Ok((*n).clamp(-127.0, 127.0) as i8),
                other => Err(SessionError::MalformedStatement {
                    operator: "setExistence".to_string(),
                    details: format!("cannot use {} as a level", kind_of(other)),
                }
                .into()),
            },
            other => Err(SessionError::MalformedStatement {
                operator: "setExistence".to_string(),
                details: format!("bad level expression {other}"),
            }
            .into()),
        }
    }

    fn expr_to_pattern_arg(&self, expr: &Expr, local: Option<&Scope>) -> Sys2Result<PatternArg> {
        match expr {
            Expr::Hole(name) => Ok(PatternArg::Hole(name.clone())),
            other => Ok(PatternArg::Atom(self.expr_to_label(other, local)?)),
        }
    }

    /// Build a goal tree from `prove`/`ask` arguments: either a single
    /// compound/reference, or a bare `operator arg…` triple.
    fn goal_from_args(&self, args: &[Expr], local: Option<&Scope>) -> Sys2Result<CompoundTree> {
        match args {
            [] => Err(SessionError::MalformedStatement {
                operator: "prove".to_string(),
                details: "missing goal".to_string(),
            }
            .into()),
            [single] => self.expr_to_tree(single, local),
            [Expr::Ident(operator), rest @ ..] => {
                let mut pattern_args = Vec::with_capacity(rest.len());
                for arg in rest {
                    pattern_args.push(self.expr_to_pattern_arg(arg, local)?);
                }
                Ok(CompoundTree::Leaf(TriplePattern {
                    operator: operator.clone(),
                    args: pattern_args,
                }))
            }
            _ => Err(SessionError::MalformedStatement {
                operator: "prove".to_string(),
                details: "goal must be a triple or compound".to_string(),
            }
            .into()),
        }
    }

    /// Convert an expression to a condition tree. `And`/`Or`/`Not`
    /// compounds recurse; other compounds become leaves; references
    /// resolve to previously bound patterns.
    fn expr_to_tree(&self, expr: &Expr, local: Option<&Scope>) -> Sys2Result<CompoundTree> {
        match expr {
            Expr::Compound { operator, args } => {
                match operator.as_ident().map(str::to_ascii_lowercase).as_deref() {
                    Some("and") => {
                        let parts = args
                            .iter()
                            .map(|a| self.expr_to_tree(a, local))
                            .collect::<Sys2Result<Vec<_>>>()?;
                        Ok(CompoundTree::And(parts))
                    }
                    Some("or") => {
                        let parts = args
                            .iter()
                            .map(|a| self.expr_to_tree(a, local))
                            .collect::<Sys2Result<Vec<_>>>()?;
                        Ok(CompoundTree::Or(parts))
                    }
                    Some("not") => {
                        let [inner] = args.as_slice() else {
                            return Err(SessionError::MalformedStatement {
                                operator: "Not".to_string(),
                                details: "Not takes exactly one part".to_string(),
                            }
                            .into());
                        };
                        Ok(CompoundTree::Not(Box::new(self.expr_to_tree(inner, local)?)))
                    }
                    Some(_) => {
                        let Some(op_name) = operator.as_ident() else {
                            unreachable!("matched Some(ident) above");
                        };
                        let mut pattern_args = Vec::with_capacity(args.len());
                        for arg in args {
                            pattern_args.push(self.expr_to_pattern_arg(arg, local)?);
                        }
                        Ok(CompoundTree::Leaf(TriplePattern {
                            operator: op_name.to_string(),
                            args: pattern_args,
                        }))
                    }
                    None => Err(SessionError::MalformedStatement {
                        operator: operator.to_string(),
                        details: "compound operator must be an identifier".to_string(),
                    }
                    .into()),
                }
            }
            Expr::Reference(name) => match self.lookup(name, local)? {
                BoundValue::Pattern(tree) => Ok(tree.clone()),
                BoundValue::Fact(id) => {
                    let id = *id;
                    self.fact_as_pattern(name, id)
                }
                other => Err(SessionError::MalformedStatement {
                    operator: format!("${name}"),
                    details: format!("cannot use {} as a goal", kind_of(other)),
                }
                .into()),
            },
            other => Err(SessionError::MalformedStatement {
                operator: other.to_string(),
                details: "expected a compound goal or $reference".to_string(),
            }
            .into()),
        }
    }

    /// A bound fact read back as a ground goal pattern.
    fn fact_as_pattern(&self, name: &str, id: FactId) -> Sys2Result<CompoundTree> {
        let Some(fact) = self.store.fact(id) else {
            return Err(SessionError::MalformedStatement {
                operator: format!("${name}"),
                details: "references a retracted fact".to_string(),
            }
            .into());
        };
        Ok(CompoundTree::Leaf(TriplePattern {
            operator: fact.operator.clone(),
            args: fact
                .args
                .iter()
                .map(|&arg| PatternArg::Atom(self.store.label(arg).to_string()))
                .collect(),
        }))
    }

    /// A plain statement inside a graph/solve body read as a leaf
    /// pattern.
    fn statement_to_tree(
        &self,
        statement: &Statement,
        local: Option<&Scope>,
    ) -> Sys2Result<CompoundTree> {
        let Some(operator) = statement.operator_name() else {
            return Err(SessionError::MalformedStatement {
                operator: statement.operator.to_string(),
                details: "pattern statements need a named operator".to_string(),
            }
            .into());
        };
        let mut args = Vec::with_capacity(statement.args.len());
        for arg in &statement.args {
            args.push(self.expr_to_pattern_arg(arg, local)?);
        }
        Ok(CompoundTree::Leaf(TriplePattern {
            operator: operator.to_string(),
            args,
        }))
    }

    fn vector_args(&self, exprs: &[Expr], local: Option<&Scope>) -> Sys2Result<Vec<Vector>> {
        let mut out = Vec::with_capacity(exprs.len());
        for expr in exprs {
            out.push(self.expr_to_vector(expr, local)?);
        }
        Ok(out)
    }

    fn expr_to_vector(&self, expr: &Expr, local: Option<&Scope>) -> Sys2Result<Vector> {
        match expr {
            Expr::Ident(name) => Ok(self.vocabulary.get_or_create(name)),
            Expr::Str(s) => Ok(self.vocabulary.get_or_create(s)),
            Expr::Number(n) => Ok(self.vocabulary.get_or_create(&number_label(*n))),
            Expr::Reference(name) => match self.lookup(name, local)? {
                BoundValue::Vector(v) => Ok(v.clone()),
                BoundValue::Concept(label) => Ok(self.vocabulary.get_or_create(label)),
                BoundValue::Fact(id) => match self.store.fact(*id) {
                    Some(fact) => Ok(fact.vector.clone()),
                    None => Err(SessionError::MalformedStatement {
                        operator: format!("${name}"),
                        details: "references a retracted fact".to_string(),
                    }
                    .into()),
                },
                other => Err(SessionError::MalformedStatement {
                    operator: format!("${name}"),
                    details: format!("cannot use {} as a vector", kind_of(other)),
                }
                .into()),
            },
            other => Err(SessionError::MalformedStatement {
                operator: other.to_string(),
                details: "expected a vector expression".to_string(),
            }
            .into()),
        }
    }

    // --------------------------------------------------------------------
    // Graph invocation
    // --------------------------------------------------------------------

    fn invoke_graph(
        &mut self,
        name: &str,
        args: &[Expr],
        caller: Option<&Scope>,
    ) -> Sys2Result<BoundValue> {
        let graph = self
            .graphs
            .get(name)
            .cloned()
            .ok_or_else(|| SessionError::UnknownGraph {
                name: name.to_string(),
            })?;
        if args.len() != graph.params.len() {
            return Err(SessionError::GraphArity {
                name: name.to_string(),
                expected: graph.params.len(),
                got: args.len(),
            }
            .into());
        }

        let mut local = Scope::default();
        for (param, arg) in graph.params.iter().zip(args.iter()) {
            let value = self.eval_expr(arg, caller)?;
            local.bind(param, value)?;
        }

        for statement in &graph.body {
            let value = self.execute_statement(statement, ExecContext::GraphBody, Some(&local))?;
            if let (Some(dest), Some(value)) = (&statement.dest, value) {
                local.bind(&dest.name, value)?;
            }
        }

        match &graph.ret {
            Some(ret) => self.eval_expr_in_graph(ret, &local),
            None => Ok(BoundValue::Concept(name.to_string())),
        }
    }

    fn eval_expr(&mut self, expr: &Expr, local: Option<&Scope>) -> Sys2Result<BoundValue> {
        match expr {
            Expr::Ident(name) => Ok(BoundValue::Concept(name.clone())),
            Expr::Number(n) => Ok(BoundValue::Number(*n)),
            Expr::Str(s) => Ok(BoundValue::Str(s.clone())),
            Expr::Hole(name) => Ok(BoundValue::Pattern(CompoundTree::Leaf(TriplePattern {
                operator: "?".to_string(),
                args: vec![PatternArg::Hole(name.clone())],
            }))),
            Expr::Reference(name) => Ok(self.lookup(name, local)?.clone()),
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_expr(item, local)?);
                }
                Ok(BoundValue::List(out))
            }
            Expr::Compound { .. } => Ok(BoundValue::Pattern(self.expr_to_tree(expr, local)?)),
        }
    }

    /// Evaluate a graph `return` expression: vector ops compute, pattern
    /// compositions build trees.
    fn eval_expr_in_graph(&mut self, expr: &Expr, local: &Scope) -> Sys2Result<BoundValue> {
        if let Expr::Compound { operator, args } = expr {
            if let Some(op) = operator.as_ident() {
                match op {
                    "bind" | "unbind" | "bundle" | "similarity" | "vector" => {
                        let statement = Statement {
                            dest: None,
                            operator: Expr::Ident(op.to_string()),
                            args: args.clone(),
                            comment: None,
                            line: 0,
                        };
                        let value = self.execute_builtin(op, &statement, Some(local))?;
                        return value.ok_or_else(|| {
                            SessionError::MalformedStatement {
                                operator: op.to_string(),
                                details: "builtin returned nothing".to_string(),
                            }
                            .into()
                        });
                    }
                    _ => {}
                }
            }
            return Ok(BoundValue::Pattern(self.expr_to_tree(expr, Some(local))?));
        }
        self.eval_expr(expr, Some(local))
    }
}

/// Flatten a condition tree into instantiated assumption leaves. `Or`
/// contributes its first branch; `Not` contributes nothing (an absent
/// fact cannot be assumed into existence).
fn collect_leaves(
    tree: &CompoundTree,
    tag: usize,
    bindings: &Bindings,
    out: &mut Vec<TriplePattern>,
) {
    match tree {
        CompoundTree::Leaf(pattern) => {
            out.push(substitute(&rename_apart(pattern, tag), bindings));
        }
        CompoundTree::And(parts) => {
            for part in parts {
                collect_leaves(part, tag, bindings, out);
            }
        }
        CompoundTree::Or(parts) => {
            if let Some(first) = parts.first() {
                collect_leaves(first, tag, bindings, out);
            }
        }
        CompoundTree::Not(_) => {}
    }
}

fn kind_of(value: &BoundValue) -> &'static str {
    match value {
        BoundValue::Vector(_) => "a vector",
        BoundValue::Concept(_) => "a concept",
        BoundValue::Number(_) => "a number",
        BoundValue::Str(_) => "a string",
        BoundValue::List(_) => "a list",
        BoundValue::Pattern(_) => "a pattern",
        BoundValue::Fact(_) => "a fact",
        BoundValue::Proof(_) => "a proof result",
        BoundValue::Query(_) => "a query result",
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode)
            .field("facts", &self.store.fact_count())
            .field("rules", &self.rules.len())
            .field("graphs", &self.graphs.len())
            .field("theories", &self.theory_stack.len())
            .finish()
    }
}
