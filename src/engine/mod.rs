//! # Reasoning Engine
//!
//! The prover hub. `ask` answers direct queries with open-world
//! semantics (absence is UNKNOWN, never FALSE); `prove` runs backward
//! chaining over rules with unification, compound conditions,
//! backtracking, transitive and inheritance reasoning, bounded witness
//! search, and an opt-in holographic fast path.
//!
//! The engine borrows every subsystem immutably: a proof can never mutate
//! the knowledge base. Per-call state (step counters, visited set, memo
//! and match caches, trace) lives in [`ProofState`].
//!
//! ## Guard discipline
//!
//! Every prove/ask call carries a deadline, a depth cap, and a step cap.
//! [`ProofState::tick`] is polled at every KB scan iteration, recursion
//! entry, and backtrack boundary; exceeding any cap aborts the whole
//! proof with `{valid: false, reason}` — never a partial proof.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::ast::{CompoundTree, PatternArg, TriplePattern};
use crate::hdc::vocabulary::Vocabulary;
use crate::hdc::{consts, Vector};
use crate::plugin::PluginRegistry;
use crate::registry::DimensionRegistry;
use crate::store::{existence, ConceptStore, FactId};

pub mod conditions;
pub mod holographic;
pub mod inheritance;
pub mod transitive;
pub mod unify;

use unify::Bindings;

// ============================================================================
// Rules
// ============================================================================

/// A backward-chaining rule: prove `condition`, conclude `conclusion`.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub condition: CompoundTree,
    pub conclusion: TriplePattern,
    /// Compositional HDC encoding of the condition tree.
    pub condition_vector: Vector,
    /// HDC encoding of the conclusion pattern.
    pub conclusion_vector: Vector,
    pub has_variables: bool,
}

impl Rule {
    /// Build a rule, computing its HDC encodings from the vocabulary.
    pub fn new(
        name: impl Into<String>,
        condition: CompoundTree,
        conclusion: TriplePattern,
        vocabulary: &Vocabulary,
    ) -> Self {
        let has_variables = condition.has_variables() || !conclusion.is_ground();
        let condition_vector = encode_tree(&condition, vocabulary);
        let conclusion_vector = encode_pattern(&conclusion, vocabulary);
        Self {
            name: name.into(),
            condition,
            conclusion,
            condition_vector,
            conclusion_vector,
            has_variables,
        }
    }
}

/// Encode a pattern the same way facts are encoded; holes contribute the
/// deterministic vector of their `?name` spelling.
pub(crate) fn encode_pattern(pattern: &TriplePattern, vocabulary: &Vocabulary) -> Vector {
    let op_vec = vocabulary.get_or_create(&pattern.operator);
    let mut parts: Vec<Vector> = Vec::with_capacity(pattern.args.len() + 1);
    parts.push(vocabulary.positioned(&op_vec, 0));
    for (k, arg) in pattern.args.iter().enumerate() {
        let label = match arg {
            PatternArg::Atom(s) => s.clone(),
            PatternArg::Hole(s) => format!("?{s}"),
        };
        let arg_vec = vocabulary.get_or_create(&label);
        parts.push(vocabulary.positioned(&arg_vec, k + 1));
    }
    let refs: Vec<&Vector> = parts.iter().collect();
    Vector::bundle(&refs).expect("pattern encoding bundles at least the operator")
}

fn encode_tree(tree: &CompoundTree, vocabulary: &Vocabulary) -> Vector {
    match tree {
        CompoundTree::Leaf(p) => encode_pattern(p, vocabulary),
        CompoundTree::And(parts) | CompoundTree::Or(parts) => {
            let encoded: Vec<Vector> = parts.iter().map(|p| encode_tree(p, vocabulary)).collect();
            let refs: Vec<&Vector> = encoded.iter().collect();
            Vector::bundle(&refs).expect("compound trees are non-empty")
        }
        CompoundTree::Not(inner) => {
            let not_marker = vocabulary.get_or_create("\u{1}not");
            encode_tree(inner, vocabulary)
                .bind(&not_marker)
                .expect("marker shares the vocabulary shape")
        }
    }
}

// ============================================================================
// Options and results
// ============================================================================

/// Per-call resource limits.
#[derive(Debug, Clone)]
pub struct ProofOptions {
    pub timeout: Duration,
    pub max_depth: usize,
    pub max_steps: u64,
}

impl Default for ProofOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5_000),
            max_depth: 24,
            max_steps: 50_000,
        }
    }
}

/// Why a proof attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailReason {
    Timeout,
    Depth,
    Steps,
    ConditionNegated,
    NotProven,
}

/// One recorded reasoning step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofStep {
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fact: Option<FactId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bindings: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl ProofStep {
    pub(crate) fn op(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            fact: None,
            bindings: None,
            rule: None,
        }
    }

    pub(crate) fn with_fact(mut self, fact: FactId) -> Self {
        self.fact = Some(fact);
        self
    }

    pub(crate) fn with_rule(mut self, rule: &str) -> Self {
        self.rule = Some(rule.to_string());
        self
    }

    pub(crate) fn with_bindings(mut self, bindings: &Bindings) -> Self {
        let rendered = render_bindings(bindings);
        if !rendered.is_empty() {
            self.bindings = Some(rendered);
        }
        self
    }
}

/// Render user-visible bindings: internal renamed variables are dropped
/// and alias chains resolve to their final value.
fn render_bindings(bindings: &Bindings) -> BTreeMap<String, String> {
    bindings
        .keys()
        .filter(|name| !name.contains('\u{1}'))
        .map(|name| {
            let resolved =
                unify::resolve(bindings, &crate::ast::PatternArg::Hole(name.clone()));
            (name.clone(), resolved.to_string())
        })
        .collect()
}

/// Result of a `prove` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofResult {
    pub valid: bool,
    pub confidence: f64,
    pub steps: Vec<ProofStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailReason>,
    /// Variable assignments of the successful branch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bindings: Option<BTreeMap<String, String>>,
}

impl ProofResult {
    fn failed(reason: FailReason, steps: Vec<ProofStep>, depth: usize) -> Self {
        Self {
            valid: false,
            confidence: 0.0,
            steps,
            method: None,
            depth,
            reason: Some(reason),
            bindings: None,
        }
    }
}

/// Status of a failed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryStatus {
    Impossible,
    Unknown,
    ParseError,
}

/// How a successful query was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuerySource {
    Direct,
    Derived,
    Inherited,
}

/// Result of an `ask` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existence: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<QueryStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<QuerySource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<Vec<FactId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<FactId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl QueryResult {
    /// Open-world "we simply do not know".
    pub fn unknown() -> Self {
        Self {
            found: false,
            existence: None,
            status: Some(QueryStatus::Unknown),
            source: None,
            chain: None,
            conflicts: None,
            explanation: None,
        }
    }

    fn direct(existence_level: i8, fact: FactId) -> Self {
        Self {
            found: true,
            existence: Some(existence_level),
            status: None,
            source: Some(QuerySource::Direct),
            chain: Some(vec![fact]),
            conflicts: None,
            explanation: None,
        }
    }

    fn derived(existence_level: i8, chain: Vec<FactId>, source: QuerySource) -> Self {
        Self {
            found: true,
            existence: Some(existence_level),
            status: None,
            source: Some(source),
            chain: Some(chain),
            conflicts: None,
            explanation: None,
        }
    }

    fn impossible(conflicts: Vec<FactId>, explanation: String) -> Self {
        Self {
            found: false,
            existence: Some(existence::IMPOSSIBLE),
            status: Some(QueryStatus::Impossible),
            source: None,
            chain: None,
            conflicts: Some(conflicts),
            explanation: Some(explanation),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Engine-wide behavior switches.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Negation-as-failure is only sound under a closed world.
    pub closed_world: bool,
    /// Enable the holographic vector fast path.
    pub holographic: bool,
    /// Depth cap for transitive/IS_A graph walks.
    pub max_chain_depth: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            closed_world: false,
            holographic: false,
            max_chain_depth: 16,
        }
    }
}

/// The backward-chaining prover. Borrows all subsystems immutably.
pub struct Engine<'a> {
    pub(crate) store: &'a ConceptStore,
    pub(crate) registry: &'a DimensionRegistry,
    pub(crate) plugins: &'a PluginRegistry,
    pub(crate) rules: &'a [Rule],
    pub(crate) options: EngineOptions,
}

/// Bounded match-cache size; overflow clears the whole map (correctness
/// is insensitive to eviction).
const MATCHES_CACHE_CAP: usize = 5_000;

/// Key for the compound-condition match cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct MatchKey {
    pub pattern_fp: u64,
    pub bindings_fp: u64,
    pub depth: usize,
    pub kb_version: u64,
    pub rules_len: usize,
    pub cwa: bool,
    pub max_depth: usize,
}

/// Per-call mutable proof state.
pub(crate) struct ProofState {
    deadline: Instant,
    pub(crate) max_depth: usize,
    max_steps: u64,
    pub(crate) steps_taken: u64,
    pub(crate) visited: HashSet<u64>,
    /// Ground-goal memoization: fingerprint → proven confidence (None =
    /// exhausted without proof at this KB version).
    pub(crate) memo: HashMap<u64, Option<f64>>,
    pub(crate) matches_cache: HashMap<MatchKey, Vec<Bindings>>,
    pub(crate) trace: Vec<ProofStep>,
    pub(crate) method: Option<String>,
    pub(crate) negation_hit: bool,
    pub(crate) max_depth_seen: usize,
    rename_counter: usize,
}

impl ProofState {
    fn new(opts: &ProofOptions) -> Self {
        Self {
            deadline: Instant::now() + opts.timeout,
            max_depth: opts.max_depth,
            max_steps: opts.max_steps,
            steps_taken: 0,
            visited: HashSet::new(),
            memo: HashMap::new(),
            matches_cache: HashMap::new(),
            trace: Vec::new(),
            method: None,
            negation_hit: false,
            max_depth_seen: 0,
            rename_counter: 0,
        }
    }

    /// Fresh tag for renaming a rule's variables apart.
    pub(crate) fn next_rename(&mut self) -> usize {
        self.rename_counter += 1;
        self.rename_counter
    }

    /// Cooperative guard poll. Called at every scan iteration, recursion
    /// entry, and backtrack boundary.
    pub(crate) fn tick(&mut self, depth: usize) -> Result<(), FailReason> {
        self.steps_taken += 1;
        self.max_depth_seen = self.max_depth_seen.max(depth);
        if depth > self.max_depth {
            return Err(FailReason::Depth);
        }
        if self.steps_taken > self.max_steps {
            return Err(FailReason::Steps);
        }
        // Checking the clock every few steps keeps the poll cheap while
        // staying well inside any realistic deadline granularity.
        if self.steps_taken % 64 == 0 && Instant::now() > self.deadline {
            return Err(FailReason::Timeout);
        }
        Ok(())
    }

    pub(crate) fn record(&mut self, step: ProofStep) {
        self.trace.push(step);
    }

    pub(crate) fn cache_matches(&mut self, key: MatchKey, value: Vec<Bindings>) {
        if self.matches_cache.len() >= MATCHES_CACHE_CAP {
            self.matches_cache.clear();
        }
        self.matches_cache.insert(key, value);
    }
}

impl<'a> Engine<'a> {
    pub fn new(
        store: &'a ConceptStore,
        registry: &'a DimensionRegistry,
        plugins: &'a PluginRegistry,
        rules: &'a [Rule],
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            registry,
            plugins,
            rules,
            options,
        }
    }

    /// Canonicalize a pattern's operator through the registry aliases.
    pub(crate) fn canonical(&self, pattern: &TriplePattern) -> TriplePattern {
        TriplePattern {
            operator: self.registry.canonical_operator(&pattern.operator),
            args: pattern.args.clone(),
        }
    }

    // --------------------------------------------------------------------
    // ask: open-world direct query
    // --------------------------------------------------------------------

    /// Answer a ground query. Never mutates; absence of knowledge is
    /// UNKNOWN.
    pub fn ask(&self, query: &TriplePattern) -> QueryResult {
        let query = self.canonical(query);
        if !query.is_ground() {
            return QueryResult {
                explanation: Some("ask requires a ground triple".to_string()),
                ..QueryResult::unknown()
            };
        }
        let labels: Vec<&str> = query
            .args
            .iter()
            .map(|a| match a {
                PatternArg::Atom(s) => s.as_str(),
                PatternArg::Hole(_) => unreachable!("ground checked above"),
            })
            .collect();

        // 1. Direct lookup.
        if let Some(fact) = self.store.get_best_existence_fact(&query.operator, &labels) {
            if fact.existence == existence::IMPOSSIBLE {
                return QueryResult::impossible(
                    vec![fact.id],
                    format!("{query} is asserted IMPOSSIBLE"),
                );
            }
            return QueryResult::direct(fact.existence, fact.id);
        }

        if labels.len() == 2 {
            let (subject, object) = (labels[0], labels[1]);

            // 2. IS_A variant path.
            if self.registry.is_is_a_variant(&query.operator) {
                if let Some(chain) =
                    self.deduce_is_a(subject, object, self.options.max_chain_depth)
                {
                    return QueryResult::derived(
                        existence::cap_derived(chain.existence),
                        chain.facts,
                        QuerySource::Derived,
                    );
                }
                // 5. Impossibility: membership in a class disjoint with
                //    the queried one.
                if let Some(conflicts) = self.check_impossibility(subject, object) {
                    return QueryResult::impossible(
                        conflicts,
                        format!("{subject} belongs to a class disjoint with {object}"),
                    );
                }
            }
            // 3. Other transitive relations.
            else if self.registry.is_transitive(&query.operator) {
                if let Some(chain) = self.deduce_transitive(
                    &query.operator,
                    subject,
                    object,
                    self.options.max_chain_depth,
                ) {
                    return QueryResult::derived(
                        existence::cap_derived(chain.existence),
                        chain.facts,
                        QuerySource::Derived,
                    );
                }
            }

            // 4. Inheritance along IS_A.
            if self.registry.is_inheritable(&query.operator) {
                if let Some(chain) = self.deduce_with_inheritance(
                    &query.operator,
                    subject,
                    object,
                    self.options.max_chain_depth,
                ) {
                    return QueryResult::derived(
                        existence::cap_derived(chain.existence),
                        chain.facts,
                        QuerySource::Inherited,
                    );
                }
            }
        }

        // 6. Open world: not found is not false.
        QueryResult::unknown()
    }

    /// `subject IS_A t` (transitively) where `t DISJOINT_WITH object` (or
    /// the reverse) makes `subject IS_A object` impossible.
    fn check_impossibility(&self, subject: &str, object: &str) -> Option<Vec<FactId>> {
        let subject_id = self.store.concept_by_label(subject)?.id;
        for ancestor in self.ancestors_of(subject_id, self.options.max_chain_depth) {
            let t = self.store.label(ancestor.concept);
            for (a, b) in [(t, object), (object, t)] {
                if let Some(disjoint) = self
                    .store
                    .get_best_existence_fact("DISJOINT_WITH", &[a, b])
                {
                    if disjoint.existence > existence::IMPOSSIBLE {
                        let mut conflicts = ancestor.chain.clone();
                        conflicts.push(disjoint.id);
                        return Some(conflicts);
                    }
                }
            }
        }
        None
    }

    // --------------------------------------------------------------------
    // prove: backward chaining
    // --------------------------------------------------------------------

    /// Prove a goal by backward chaining. Resource limits abort with
    /// `{valid: false, reason}`; an unprovable goal reports `NotProven`
    /// (or `ConditionNegated` when an explicit negation blocked it).
    pub fn prove(&self, goal: &CompoundTree, opts: &ProofOptions) -> ProofResult {
        let mut state = ProofState::new(opts);
        tracing::debug!(goal = %goal, "prove start");
        let outcome = self.prove_goal(goal, &Bindings::new(), 0, &mut state);
        let depth = state.max_depth_seen;
        match outcome {
            Ok(Some((confidence, bindings))) => {
                tracing::debug!(confidence, steps = state.steps_taken, "prove succeeded");
                let rendered = render_bindings(&bindings);
                ProofResult {
                    valid: true,
                    confidence,
                    steps: state.trace,
                    method: state.method,
                    depth,
                    reason: None,
                    bindings: if rendered.is_empty() {
                        None
                    } else {
                        Some(rendered)
                    },
                }
            }
            Ok(None) => {
                let reason = if state.negation_hit {
                    FailReason::ConditionNegated
                } else {
                    FailReason::NotProven
                };
                ProofResult::failed(reason, state.trace, depth)
            }
            Err(reason) => {
                tracing::debug!(?reason, steps = state.steps_taken, "prove aborted");
                ProofResult::failed(reason, state.trace, depth)
            }
        }
    }

    /// Confidence floor used when combining chain evidence.
    pub(crate) fn decayed(confidence: f64, layers: u32) -> f64 {
        confidence * consts::CONFIDENCE_DECAY.powi(layers as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hdc::Strategy;
    use crate::store::{NewFact, Provenance};
    use std::sync::Arc;

    fn harness() -> (ConceptStore, DimensionRegistry, PluginRegistry) {
        let vocabulary = Arc::new(Vocabulary::new(Strategy::Dense, consts::GEOMETRY_TEST));
        (
            ConceptStore::new(vocabulary),
            DimensionRegistry::degraded(),
            PluginRegistry::new(),
        )
    }

    fn add(store: &mut ConceptStore, op: &str, args: &[&str], level: i8) {
        store
            .add_fact(
                NewFact {
                    operator: op.to_string(),
                    args: args.iter().map(|s| (*s).to_string()).collect(),
                    existence: level,
                    provenance: Provenance::now(),
                },
                None,
            )
            .expect("fact adds");
    }

    #[test]
    fn ask_direct_hit() {
        let (mut store, registry, plugins) = harness();
        add(&mut store, "IS_A", &["Dog", "Mammal"], existence::CERTAIN);
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        let result = engine.ask(&TriplePattern::ground("IS_A", &["Dog", "Mammal"]));
        assert!(result.found);
        assert_eq!(result.existence, Some(existence::CERTAIN));
        assert_eq!(result.source, Some(QuerySource::Direct));
    }

    #[test]
    fn ask_unknown_is_open_world() {
        let (store, registry, plugins) = harness();
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        let result = engine.ask(&TriplePattern::ground("IS_A", &["Unicorn", "Mammal"]));
        assert!(!result.found);
        assert_eq!(result.status, Some(QueryStatus::Unknown));
        assert!(result.conflicts.is_none());
    }

    #[test]
    fn ask_never_mutates() {
        let (mut store, registry, plugins) = harness();
        add(&mut store, "IS_A", &["Dog", "Mammal"], existence::CERTAIN);
        let version = store.kb_version();
        let count = store.fact_count();
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        let _ = engine.ask(&TriplePattern::ground("IS_A", &["Dog", "Animal"]));
        let _ = engine.ask(&TriplePattern::ground("nonsense", &["A", "B"]));
        assert_eq!(store.kb_version(), version);
        assert_eq!(store.fact_count(), count);
    }

    #[test]
    fn ask_isa_chain_caps_at_demonstrated() {
        let (mut store, registry, plugins) = harness();
        add(&mut store, "IS_A", &["Dog", "Mammal"], existence::CERTAIN);
        add(&mut store, "IS_A", &["Mammal", "Animal"], existence::CERTAIN);
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        let result = engine.ask(&TriplePattern::ground("IS_A", &["Dog", "Animal"]));
        assert!(result.found);
        assert_eq!(result.existence, Some(existence::DEMONSTRATED));
        assert_eq!(result.source, Some(QuerySource::Derived));
        assert_eq!(result.chain.expect("chain").len(), 2);
    }

    #[test]
    fn ask_disjoint_is_impossible() {
        let (mut store, registry, plugins) = harness();
        add(&mut store, "IS_A", &["Dog", "Mammal"], existence::CERTAIN);
        add(
            &mut store,
            "DISJOINT_WITH",
            &["Mammal", "Fish"],
            existence::CERTAIN,
        );
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        let result = engine.ask(&TriplePattern::ground("IS_A", &["Dog", "Fish"]));
        assert!(!result.found);
        assert_eq!(result.status, Some(QueryStatus::Impossible));
        assert_eq!(result.conflicts.expect("conflicts").len(), 2);
    }

    #[test]
    fn ask_min_existence_along_chain() {
        let (mut store, registry, plugins) = harness();
        add(&mut store, "IS_A", &["Dog", "Mammal"], existence::CERTAIN);
        add(&mut store, "IS_A_POSSIBLE", &["Mammal", "Animal"], existence::POSSIBLE);
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        let result = engine.ask(&TriplePattern::ground("IS_A", &["Dog", "Animal"]));
        assert!(result.found);
        assert_eq!(result.existence, Some(existence::POSSIBLE));
    }
}
