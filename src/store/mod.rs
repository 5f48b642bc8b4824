//! # Concept Store
//!
//! In-memory knowledge base: interned concepts (arena with stable ids),
//! facts with epistemic existence levels and provenance, secondary
//! indexes, and event hooks.
//!
//! ## Indexes
//!
//! Every fact is reachable through all of:
//!
//! - by operator → insertion-ordered fact list
//! - by (operator, arg0) → insertion-ordered fact list
//! - by subject concept → insertion-ordered fact list
//! - by existence level → sorted buckets
//! - the triple key map (operator + full args), holding the single best
//!   record per triple
//!
//! Index buckets are plain `Vec`s in insertion order; enumeration never
//! relies on hash-map iteration order, so every scan is deterministic.
//!
//! ## Existence discipline
//!
//! For a given triple only the highest-existence record is retained. An
//! assertion can upgrade a level but never lower it; `IMPOSSIBLE` is
//! terminal for assertions. Only the explicit [`ConceptStore::retract`],
//! [`ConceptStore::forget`], and [`ConceptStore::set_existence`] paths
//! may lower a level.
//!
//! ## Mutation protocol
//!
//! Every successful mutation bumps `kb_version`, which invalidates the
//! entity-domain cache and any derivation caches keyed on it. Mutations
//! append [`UndoRecord`]s when a batch log is supplied, so a learn batch
//! that turns out contradictory can be rolled back to the exact prior
//! state (atomic learn).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{IndexInconsistency, SessionError};
use crate::hdc::vocabulary::Vocabulary;
use crate::hdc::Vector;

/// Epistemic existence levels. Signed 8-bit, five named points.
pub mod existence {
    /// The triple can never hold; terminal for assertions.
    pub const IMPOSSIBLE: i8 = -127;
    /// Asserted but carrying no evidence.
    pub const UNPROVEN: i8 = -64;
    /// Neutral possibility.
    pub const POSSIBLE: i8 = 0;
    /// Derived or demonstrated; the cap for any derived fact.
    pub const DEMONSTRATED: i8 = 64;
    /// Axiomatic.
    pub const CERTAIN: i8 = 127;

    /// Human-readable name for a level (exact points only).
    pub fn name(level: i8) -> &'static str {
        match level {
            IMPOSSIBLE => "IMPOSSIBLE",
            UNPROVEN => "UNPROVEN",
            POSSIBLE => "POSSIBLE",
            DEMONSTRATED => "DEMONSTRATED",
            CERTAIN => "CERTAIN",
            _ => "OTHER",
        }
    }

    /// Cap a derived level at DEMONSTRATED (derivations never mint
    /// certainty).
    pub fn cap_derived(level: i8) -> i8 {
        level.min(DEMONSTRATED)
    }
}

/// Stable arena index of an interned concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConceptId(pub u32);

/// Monotonically increasing fact identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactId(pub u64);

/// How a concept came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreationSource {
    /// Named in a DSL statement.
    Dsl,
    /// Introduced by the engine (witness grounding, macro expansion).
    Derived,
    /// Built-in (position markers, IS_A family).
    System,
}

/// An interned concept. Concepts are never deleted during a session.
#[derive(Debug, Clone)]
pub struct Concept {
    pub id: ConceptId,
    pub label: String,
    pub vector: Vector,
    pub created_from: CreationSource,
}

/// Where a fact came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub created_at: DateTime<Utc>,
    /// Fact ids this record was derived from, when rule-derived.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_from: Vec<FactId>,
    /// Name of the rule that derived it, when rule-derived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl Provenance {
    /// Provenance for a fact asserted right now with no source location.
    pub fn now() -> Self {
        Self {
            source_file: None,
            line: None,
            created_at: Utc::now(),
            derived_from: Vec::new(),
            rule: None,
        }
    }

    /// Provenance pointing at a DSL source line.
    pub fn at_line(line: usize) -> Self {
        Self {
            line: Some(line),
            ..Self::now()
        }
    }
}

/// A stored triple (or n-ary) fact.
#[derive(Debug, Clone)]
pub struct Fact {
    pub id: FactId,
    /// Canonicalized operator name.
    pub operator: String,
    pub args: Vec<ConceptId>,
    /// `bundle(bind(op, Pos0), bind(args[k], Pos_{k+1})…)`. The existence
    /// level is deliberately not encoded here.
    pub vector: Vector,
    pub existence: i8,
    pub provenance: Provenance,
}

impl Fact {
    /// First argument, conventionally the subject.
    pub fn subject(&self) -> Option<ConceptId> {
        self.args.first().copied()
    }

    /// Second argument, conventionally the object.
    pub fn object(&self) -> Option<ConceptId> {
        self.args.get(1).copied()
    }
}

/// A fact about to be added (labels not yet interned).
#[derive(Debug, Clone)]
pub struct NewFact {
    pub operator: String,
    pub args: Vec<String>,
    pub existence: i8,
    pub provenance: Provenance,
}

/// Outcome of an assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A fresh triple was inserted.
    Inserted(FactId),
    /// An existing triple was upgraded to a higher existence level.
    Upgraded(FactId),
    /// The triple already existed at an equal or higher level.
    Unchanged(FactId),
}

impl AddOutcome {
    /// Id of the record now representing the triple.
    pub fn fact_id(self) -> FactId {
        match self {
            AddOutcome::Inserted(id) | AddOutcome::Upgraded(id) | AddOutcome::Unchanged(id) => id,
        }
    }

    /// Whether the store changed.
    pub fn mutated(self) -> bool {
        !matches!(self, AddOutcome::Unchanged(_))
    }
}

/// Undo record for batch rollback.
#[derive(Debug, Clone)]
pub enum UndoRecord {
    /// A fact was appended at this index.
    Inserted { index: usize },
    /// A fact at this index was upgraded; previous scalar state attached.
    Upgraded {
        index: usize,
        prev_existence: i8,
        prev_provenance: Provenance,
    },
}

/// Events delivered to hooks.
#[derive(Debug, Clone)]
pub enum HookEvent {
    FactAdded { fact: FactId },
    ConceptCreated { concept: ConceptId },
    ReasoningStep { operation: String, detail: String },
    Contradiction { kind: String, detail: String },
}

/// Per-hook wall-clock budget. Exceeding it is logged; the hook's writes
/// still apply (synchronous hooks cannot be preempted).
const HOOK_TIMEOUT_MS: u128 = 10_000;

/// A registered event hook. Returns facts to apply after dispatch (the
/// buffered-write contract) or an error message, which is logged while
/// the remaining hooks continue.
pub type Hook = Box<dyn FnMut(&HookEvent) -> Result<Vec<NewFact>, String> + Send>;

type TripleKey = (String, Vec<ConceptId>);

/// The in-memory knowledge base.
pub struct ConceptStore {
    vocabulary: Arc<Vocabulary>,

    concepts: Vec<Concept>,
    by_label: HashMap<String, ConceptId>,

    facts: Vec<Fact>,
    by_id: HashMap<FactId, usize>,
    by_triple: HashMap<TripleKey, usize>,
    by_operator: HashMap<String, Vec<usize>>,
    by_op_arg0: HashMap<(String, ConceptId), Vec<usize>>,
    by_subject: HashMap<ConceptId, Vec<usize>>,
    by_existence: BTreeMap<i8, Vec<usize>>,

    /// Persisted fact names (`@name:persist` destinations), both ways.
    fact_names: HashMap<String, FactId>,
    name_by_fact: HashMap<FactId, String>,

    next_fact_id: u64,
    kb_version: u64,

    /// Lazily built, version-stamped list of concepts appearing in facts.
    entity_domain: RwLock<Option<(u64, Vec<ConceptId>)>>,

    hooks: Vec<Hook>,
    dispatching: bool,
}

impl ConceptStore {
    /// Create a store over a shared vocabulary.
    pub fn new(vocabulary: Arc<Vocabulary>) -> Self {
        Self {
            vocabulary,
            concepts: Vec::new(),
            by_label: HashMap::new(),
            facts: Vec::new(),
            by_id: HashMap::new(),
            by_triple: HashMap::new(),
            by_operator: HashMap::new(),
            by_op_arg0: HashMap::new(),
            by_subject: HashMap::new(),
            by_existence: BTreeMap::new(),
            fact_names: HashMap::new(),
            name_by_fact: HashMap::new(),
            next_fact_id: 1,
            kb_version: 0,
            entity_domain: RwLock::new(None),
            hooks: Vec::new(),
            dispatching: false,
        }
    }

    /// The vocabulary backing this store.
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    // ------------------------------------------------------------------
    // Concepts
    // ------------------------------------------------------------------

    /// Intern `label`, returning the existing id when present.
    pub fn intern_concept(&mut self, label: &str, source: CreationSource) -> ConceptId {
        if let Some(&id) = self.by_label.get(label) {
            return id;
        }
        let id = ConceptId(self.concepts.len() as u32);
        let vector = self.vocabulary.get_or_create(label);
        self.concepts.push(Concept {
            id,
            label: label.to_string(),
            vector,
            created_from: source,
        });
        self.by_label.insert(label.to_string(), id);
        self.dispatch(&HookEvent::ConceptCreated { concept: id });
        id
    }

    /// Concept by id. Ids are arena indexes and always valid once issued.
    pub fn concept(&self, id: ConceptId) -> &Concept {
        &self.concepts[id.0 as usize]
    }

    /// Concept by label, without interning.
    pub fn concept_by_label(&self, label: &str) -> Option<&Concept> {
        self.by_label.get(label).map(|&id| self.concept(id))
    }

    /// Label of a concept id.
    pub fn label(&self, id: ConceptId) -> &str {
        &self.concepts[id.0 as usize].label
    }

    /// Number of interned concepts.
    pub fn concept_count(&self) -> usize {
        self.concepts.len()
    }

    // ------------------------------------------------------------------
    // Facts
    // ------------------------------------------------------------------

    /// Encode the HDC vector for a fact: operator bound to Pos0, argument
    /// `k` bound to `Pos_{k+1}`, all bundled.
    pub fn encode_fact_vector(&self, operator: &str, args: &[ConceptId]) -> Vector {
        let op_vec = self.vocabulary.get_or_create(operator);
        let mut parts: Vec<Vector> = Vec::with_capacity(args.len() + 1);
        parts.push(self.vocabulary.positioned(&op_vec, 0));
        for (k, &arg) in args.iter().enumerate() {
            parts.push(self.vocabulary.positioned(&self.concept(arg).vector, k + 1));
        }
        let refs: Vec<&Vector> = parts.iter().collect();
        Vector::bundle(&refs).expect("fact encoding bundles at least the operator")
    }

    /// Assert a fact, honoring the existence discipline. With `undo`
    /// supplied, the mutation is recorded for batch rollback.
    pub fn add_fact(
        &mut self,
        new: NewFact,
        undo: Option<&mut Vec<UndoRecord>>,
    ) -> Result<AddOutcome, SessionError> {
        let args: Vec<ConceptId> = new
            .args
            .iter()
            .map(|label| self.intern_concept(label, CreationSource::Dsl))
            .collect();
        let key: TripleKey = (new.operator.clone(), args.clone());

        if let Some(&index) = self.by_triple.get(&key) {
            let current = self.facts[index].existence;
            if current == existence::IMPOSSIBLE && new.existence > current {
                return Err(SessionError::ImpossibleAssertion {
                    triple: self.render_triple(&new.operator, &args),
                });
            }
            if new.existence <= current {
                return Ok(AddOutcome::Unchanged(self.facts[index].id));
            }
            // Upgrade in place: same fact id, new level and provenance.
            if let Some(log) = undo {
                log.push(UndoRecord::Upgraded {
                    index,
                    prev_existence: current,
                    prev_provenance: self.facts[index].provenance.clone(),
                });
            }
            self.reindex_existence(index, current, new.existence);
            self.facts[index].existence = new.existence;
            self.facts[index].provenance = new.provenance;
            self.bump_version();
            let id = self.facts[index].id;
            self.dispatch(&HookEvent::FactAdded { fact: id });
            return Ok(AddOutcome::Upgraded(id));
        }

        let vector = self.encode_fact_vector(&new.operator, &args);
        let id = FactId(self.next_fact_id);
        self.next_fact_id += 1;
        let index = self.facts.len();
        let fact = Fact {
            id,
            operator: new.operator.clone(),
            args: args.clone(),
            vector,
            existence: new.existence,
            provenance: new.provenance,
        };

        self.facts.push(fact);
        self.by_id.insert(id, index);
        self.by_triple.insert(key, index);
        self.by_operator
            .entry(new.operator.clone())
            .or_default()
            .push(index);
        if let Some(&arg0) = args.first() {
            self.by_op_arg0
                .entry((new.operator.clone(), arg0))
                .or_default()
                .push(index);
            self.by_subject.entry(arg0).or_default().push(index);
        }
        self.by_existence
            .entry(new.existence)
            .or_default()
            .push(index);
        if let Some(log) = undo {
            log.push(UndoRecord::Inserted { index });
        }
        self.bump_version();
        tracing::debug!(
            operator = %new.operator,
            existence = existence::name(new.existence),
            "fact added"
        );
        self.dispatch(&HookEvent::FactAdded { fact: id });
        Ok(AddOutcome::Inserted(id))
    }

    /// Remove a triple entirely. Returns whether anything was removed.
    pub fn retract(&mut self, operator: &str, args: &[&str]) -> bool {
        let Some(arg_ids) = self.resolve_args(args) else {
            return false;
        };
        let key: TripleKey = (operator.to_string(), arg_ids);
        let Some(&index) = self.by_triple.get(&key) else {
            return false;
        };
        self.facts.remove(index);
        self.rebuild_indexes();
        self.bump_version();
        true
    }

    /// Remove every fact mentioning `label` (as operator argument). The
    /// concept itself stays interned.
    pub fn forget(&mut self, label: &str) -> usize {
        let Some(&id) = self.by_label.get(label) else {
            return 0;
        };
        let before = self.facts.len();
        self.facts.retain(|f| !f.args.contains(&id));
        let removed = before - self.facts.len();
        if removed > 0 {
            self.rebuild_indexes();
            self.bump_version();
        }
        removed
    }

    /// Explicitly set the existence of a triple, upward or downward. The
    /// only sanctioned way to lower a level or leave IMPOSSIBLE.
    pub fn set_existence(&mut self, operator: &str, args: &[&str], level: i8) -> bool {
        let Some(arg_ids) = self.resolve_args(args) else {
            return false;
        };
        let key: TripleKey = (operator.to_string(), arg_ids);
        let Some(&index) = self.by_triple.get(&key) else {
            return false;
        };
        let prev = self.facts[index].existence;
        if prev == level {
            return true;
        }
        self.reindex_existence(index, prev, level);
        self.facts[index].existence = level;
        self.bump_version();
        true
    }

    fn resolve_args(&self, args: &[&str]) -> Option<Vec<ConceptId>> {
        args.iter()
            .map(|label| self.by_label.get(*label).copied())
            .collect()
    }

    fn reindex_existence(&mut self, index: usize, from: i8, to: i8) {
        if let Some(bucket) = self.by_existence.get_mut(&from) {
            bucket.retain(|&i| i != index);
            if bucket.is_empty() {
                self.by_existence.remove(&from);
            }
        }
        self.by_existence.entry(to).or_default().push(index);
    }

    fn bump_version(&mut self) {
        self.kb_version += 1;
        *self.entity_domain.write() = None;
    }

    fn render_triple(&self, operator: &str, args: &[ConceptId]) -> String {
        let mut out = operator.to_string();
        for &a in args {
            out.push(' ');
            out.push_str(self.label(a));
        }
        out
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// The single stored record for a triple (the store keeps only the
    /// best-existence version), or `None`.
    pub fn get_best_existence_fact(
        &self,
        operator: &str,
        args: &[&str],
    ) -> Option<&Fact> {
        let arg_ids = self.resolve_args(args)?;
        let key: TripleKey = (operator.to_string(), arg_ids);
        self.by_triple.get(&key).map(|&i| &self.facts[i])
    }

    /// Fact by id.
    pub fn fact(&self, id: FactId) -> Option<&Fact> {
        self.by_id.get(&id).map(|&i| &self.facts[i])
    }

    /// Persist a fact under a name, so it stays addressable independently
    /// of session bindings. Renaming moves the name to the new fact.
    pub fn set_fact_name(&mut self, name: &str, id: FactId) {
        if let Some(previous) = self.fact_names.insert(name.to_string(), id) {
            self.name_by_fact.remove(&previous);
        }
        self.name_by_fact.insert(id, name.to_string());
    }

    /// The fact persisted under `name`, if it is still alive.
    pub fn fact_by_name(&self, name: &str) -> Option<&Fact> {
        self.fact_names.get(name).and_then(|&id| self.fact(id))
    }

    /// The persisted name of a fact, if any.
    pub fn fact_name(&self, id: FactId) -> Option<&str> {
        self.name_by_fact.get(&id).map(String::as_str)
    }

    /// All facts in insertion order.
    pub fn facts(&self) -> impl Iterator<Item = &Fact> {
        self.facts.iter()
    }

    /// Facts with the given operator, insertion order.
    pub fn facts_by_operator<'a>(&'a self, operator: &str) -> impl Iterator<Item = &'a Fact> {
        self.by_operator
            .get(operator)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&i| &self.facts[i])
    }

    /// Facts with the given operator and first argument, insertion order.
    pub fn facts_by_op_arg0<'a>(
        &'a self,
        operator: &str,
        arg0: ConceptId,
    ) -> impl Iterator<Item = &'a Fact> {
        self.by_op_arg0
            .get(&(operator.to_string(), arg0))
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&i| &self.facts[i])
    }

    /// Facts whose subject (arg0) is the given concept, insertion order.
    pub fn facts_by_subject(&self, subject: ConceptId) -> impl Iterator<Item = &Fact> {
        self.by_subject
            .get(&subject)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&i| &self.facts[i])
    }

    /// Facts at exactly the given existence level.
    pub fn facts_by_existence(&self, level: i8) -> impl Iterator<Item = &Fact> {
        self.by_existence
            .get(&level)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&i| &self.facts[i])
    }

    /// Fanout estimate for condition reordering: number of candidate
    /// facts for an operator, optionally narrowed by a ground arg0.
    pub fn count_candidates(&self, operator: &str, arg0: Option<&str>) -> usize {
        match arg0.and_then(|l| self.by_label.get(l)) {
            Some(&id) => self
                .by_op_arg0
                .get(&(operator.to_string(), id))
                .map_or(0, Vec::len),
            None => self.by_operator.get(operator).map_or(0, Vec::len),
        }
    }

    /// Total number of stored facts.
    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }

    /// Monotonic mutation counter.
    pub fn kb_version(&self) -> u64 {
        self.kb_version
    }

    /// Concepts appearing as fact arguments, insertion order, capped.
    /// Cached until the next KB mutation.
    pub fn entity_domain(&self, cap: usize) -> Vec<ConceptId> {
        if let Some((version, domain)) = self.entity_domain.read().as_ref() {
            if *version == self.kb_version {
                return domain.iter().copied().take(cap).collect();
            }
        }
        let mut seen: Vec<ConceptId> = Vec::new();
        let mut present = vec![false; self.concepts.len()];
        for fact in &self.facts {
            for &arg in &fact.args {
                let slot = arg.0 as usize;
                if !present[slot] {
                    present[slot] = true;
                    seen.push(arg);
                }
            }
        }
        *self.entity_domain.write() = Some((self.kb_version, seen.clone()));
        seen.truncate(cap);
        seen
    }

    // ------------------------------------------------------------------
    // Batch rollback
    // ------------------------------------------------------------------

    /// Undo the mutations described by `log` (most recent last), restoring
    /// the version counter to `prev_version`.
    pub fn rollback(&mut self, log: Vec<UndoRecord>, prev_version: u64) {
        for record in log.into_iter().rev() {
            match record {
                UndoRecord::Inserted { index } => {
                    // Batch inserts are contiguous at the tail, so popping
                    // in reverse order removes exactly the staged facts.
                    debug_assert_eq!(index, self.facts.len() - 1);
                    self.facts.pop();
                }
                UndoRecord::Upgraded {
                    index,
                    prev_existence,
                    prev_provenance,
                } => {
                    self.facts[index].existence = prev_existence;
                    self.facts[index].provenance = prev_provenance;
                }
            }
        }
        self.rebuild_indexes();
        self.kb_version = prev_version;
        *self.entity_domain.write() = None;
    }

    // ------------------------------------------------------------------
    // Index maintenance
    // ------------------------------------------------------------------

    /// Rebuild every secondary index from the fact list.
    pub fn rebuild_indexes(&mut self) {
        self.by_id.clear();
        self.by_triple.clear();
        self.by_operator.clear();
        self.by_op_arg0.clear();
        self.by_subject.clear();
        self.by_existence.clear();
        for (index, fact) in self.facts.iter().enumerate() {
            self.by_id.insert(fact.id, index);
            self.by_triple
                .insert((fact.operator.clone(), fact.args.clone()), index);
            self.by_operator
                .entry(fact.operator.clone())
                .or_default()
                .push(index);
            if let Some(&arg0) = fact.args.first() {
                self.by_op_arg0
                    .entry((fact.operator.clone(), arg0))
                    .or_default()
                    .push(index);
                self.by_subject.entry(arg0).or_default().push(index);
            }
            self.by_existence
                .entry(fact.existence)
                .or_default()
                .push(index);
        }
        // Names of retracted or forgotten facts die with them.
        let by_id = &self.by_id;
        self.fact_names.retain(|_, id| by_id.contains_key(id));
        self.name_by_fact.retain(|id, _| by_id.contains_key(id));
    }

    /// Verify that every fact is present in each index that should hold
    /// it. On failure the caller should [`ConceptStore::rebuild_indexes`].
    pub fn check_index_consistency(&self) -> Result<(), IndexInconsistency> {
        for (index, fact) in self.facts.iter().enumerate() {
            let in_op = self
                .by_operator
                .get(&fact.operator)
                .is_some_and(|b| b.contains(&index));
            if !in_op {
                return Err(IndexInconsistency {
                    details: format!("fact {:?} missing from operator index", fact.id),
                });
            }
            if let Some(&arg0) = fact.args.first() {
                let in_oa = self
                    .by_op_arg0
                    .get(&(fact.operator.clone(), arg0))
                    .is_some_and(|b| b.contains(&index));
                let in_subj = self
                    .by_subject
                    .get(&arg0)
                    .is_some_and(|b| b.contains(&index));
                if !in_oa || !in_subj {
                    return Err(IndexInconsistency {
                        details: format!("fact {:?} missing from arg0/subject index", fact.id),
                    });
                }
            }
            let in_ex = self
                .by_existence
                .get(&fact.existence)
                .is_some_and(|b| b.contains(&index));
            if !in_ex {
                return Err(IndexInconsistency {
                    details: format!("fact {:?} missing from existence index", fact.id),
                });
            }
            if self.by_id.get(&fact.id) != Some(&index) {
                return Err(IndexInconsistency {
                    details: format!("fact {:?} id index stale", fact.id),
                });
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------

    /// Register an event hook.
    pub fn register_hook(&mut self, hook: Hook) {
        self.hooks.push(hook);
    }

    /// Emit an event produced outside the store's own mutation paths
    /// (reasoning steps, contradictions).
    pub fn emit(&mut self, event: &HookEvent) {
        self.dispatch(event);
    }

    /// Dispatch an event to all hooks. Further dispatch is suppressed
    /// while hooks run; writes hooks request are buffered and applied on
    /// exit. Hook errors are logged and remaining hooks continue.
    fn dispatch(&mut self, event: &HookEvent) {
        if self.dispatching || self.hooks.is_empty() {
            return;
        }
        self.dispatching = true;
        let mut buffered: Vec<NewFact> = Vec::new();
        let mut hooks = std::mem::take(&mut self.hooks);
        for hook in &mut hooks {
            let started = Instant::now();
            match hook(event) {
                Ok(writes) => buffered.extend(writes),
                Err(message) => {
                    tracing::warn!(%message, "event hook failed, continuing");
                }
            }
            if started.elapsed().as_millis() > HOOK_TIMEOUT_MS {
                tracing::warn!("event hook exceeded its 10s budget");
            }
        }
        self.hooks = hooks;
        // Buffered writes are applied with dispatch still suppressed, so
        // hook-generated facts cannot re-enter the hooks.
        for write in buffered {
            if let Err(err) = self.add_fact(write, None) {
                tracing::warn!(%err, "buffered hook write rejected");
            }
        }
        self.dispatching = false;
    }
}

impl std::fmt::Debug for ConceptStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConceptStore")
            .field("concepts", &self.concepts.len())
            .field("facts", &self.facts.len())
            .field("kb_version", &self.kb_version)
            .finish()
    }
}
