//! # Contradiction Detector
//!
//! On-demand consistency checks over the knowledge base:
//!
//! - **Disjointness**: an entity that is (transitively) a member of two
//!   classes declared `DISJOINT_WITH` each other, or matching a built-in
//!   list of biological/categorical disjoint pairs.
//! - **Functional relations**: relations like BORN_IN admit one object
//!   per subject unless the objects are linked via `EQUIVALENT_TO`.
//! - **Taxonomic cycles**: any back-edge in the IS_A graph.
//! - **Inherited disjointness**: descendants of two disjoint ancestors
//!   intersecting.
//! - **Cardinality**: registered per-relation `{min, max}` constraints.
//! - **Mutual exclusion**: `mutuallyExclusive rel A B` declarations
//!   forbid one subject holding `rel` to both values.
//!
//! Label comparison is case-insensitive and plural-tolerant (a trailing
//! `s` is trimmed when the label is longer than three characters and
//! does not end in `ss`).
//!
//! [`ContradictionDetector::would_contradict`] runs the same checks
//! speculatively against a candidate fact without mutating the store;
//! the session uses it to keep learn batches atomic.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::registry::DimensionRegistry;
use crate::store::{existence, ConceptId, ConceptStore, FactId};

/// Kind of detected inconsistency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContradictionKind {
    DisjointViolation,
    FunctionalViolation,
    TaxonomicCycle,
    InheritedDisjoint,
    CardinalityViolation,
    MutualExclusion,
}

/// One detected contradiction with its causing facts and resolution
/// suggestions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub kind: ContradictionKind,
    /// Entity or subject at the center of the conflict.
    pub entity: String,
    pub message: String,
    /// Facts that jointly cause the conflict (existing facts only; a
    /// speculative candidate is described in `message`).
    pub facts: Vec<FactId>,
    pub suggestions: Vec<String>,
}

/// Per-relation cardinality constraint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CardinalityConstraint {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

/// Case-insensitive, plural-tolerant normalization for class labels.
pub fn normalize(label: &str) -> String {
    let lowered = label.to_ascii_lowercase();
    if lowered.len() > 3 && lowered.ends_with('s') && !lowered.ends_with("ss") {
        lowered[..lowered.len() - 1].to_string()
    } else {
        lowered
    }
}

/// The detector. Holds the functional-relation set, built-in disjoint
/// pairs, and registered cardinality constraints.
#[derive(Debug, Clone)]
pub struct ContradictionDetector {
    functional: Vec<String>,
    builtin_disjoint: Vec<(String, String)>,
    cardinality: HashMap<String, CardinalityConstraint>,
}

impl Default for ContradictionDetector {
    fn default() -> Self {
        let builtin = [
            ("mammal", "fish"),
            ("mammal", "bird"),
            ("mammal", "reptile"),
            ("mammal", "insect"),
            ("bird", "fish"),
            ("animal", "plant"),
            ("living", "mineral"),
        ];
        Self {
            functional: vec![
                "BORN_IN".to_string(),
                "BIOLOGICAL_MOTHER".to_string(),
                "BIOLOGICAL_FATHER".to_string(),
            ],
            builtin_disjoint: builtin
                .iter()
                .map(|(a, b)| ((*a).to_string(), (*b).to_string()))
                .collect(),
            cardinality: HashMap::new(),
        }
    }
}

impl ContradictionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a relation functional (single object per subject).
    pub fn add_functional(&mut self, relation: impl Into<String>) {
        self.functional.push(relation.into());
    }

    /// Register a cardinality constraint for a relation.
    pub fn set_cardinality(&mut self, relation: impl Into<String>, constraint: CardinalityConstraint) {
        self.cardinality.insert(relation.into(), constraint);
    }

    fn is_functional(&self, relation: &str) -> bool {
        self.functional.iter().any(|f| f == relation)
    }

    fn builtin_disjoint(&self, a: &str, b: &str) -> bool {
        let (na, nb) = (normalize(a), normalize(b));
        self.builtin_disjoint
            .iter()
            .any(|(x, y)| (*x == na && *y == nb) || (*x == nb && *y == na))
    }

    /// Whether two class labels are declared or built-in disjoint.
    /// Returns the declaring fact when one exists.
    fn disjoint_between(
        &self,
        store: &ConceptStore,
        a: &str,
        b: &str,
    ) -> Option<Option<FactId>> {
        for (x, y) in [(a, b), (b, a)] {
            if let Some(fact) = store.get_best_existence_fact("DISJOINT_WITH", &[x, y]) {
                if fact.existence > existence::IMPOSSIBLE {
                    return Some(Some(fact.id));
                }
            }
        }
        if self.builtin_disjoint(a, b) {
            return Some(None);
        }
        None
    }

    // --------------------------------------------------------------------
    // Full-store detection
    // --------------------------------------------------------------------

    /// Run every check over the whole store.
    pub fn detect_all(
        &self,
        store: &ConceptStore,
        registry: &DimensionRegistry,
    ) -> Vec<Contradiction> {
        let mut out = Vec::new();
        // Disjointness covers inherited conflicts too (classified by
        // chain depth), so one pass suffices.
        out.extend(self.check_disjointness(store, registry));
        out.extend(self.check_functional(store));
        out.extend(self.check_taxonomic(store, registry));
        out.extend(self.check_cardinality(store));
        out.extend(self.check_mutual_exclusion(store));
        if !out.is_empty() {
            tracing::warn!(count = out.len(), "contradictions detected");
        }
        out
    }

    /// Disjointness: entity transitively in two disjoint classes.
    pub fn check_disjointness(
        &self,
        store: &ConceptStore,
        registry: &DimensionRegistry,
    ) -> Vec<Contradiction> {
        let mut out = Vec::new();
        for entity in entities_with_types(store, registry) {
            let types = type_closure(store, registry, entity);
            for i in 0..types.len() {
                for j in (i + 1)..types.len() {
                    let a = store.label(types[i].class);
                    let b = store.label(types[j].class);
                    if let Some(declared) = self.disjoint_between(store, a, b) {
                        // Membership reached through more than one hop is
                        // an inherited conflict.
                        let inherited =
                            types[i].chain.len() > 1 || types[j].chain.len() > 1;
                        let mut facts: Vec<FactId> = types[i].chain.clone();
                        facts.extend(types[j].chain.clone());
                        facts.extend(declared);
                        out.push(Contradiction {
                            kind: if inherited {
                                ContradictionKind::InheritedDisjoint
                            } else {
                                ContradictionKind::DisjointViolation
                            },
                            entity: store.label(entity).to_string(),
                            message: format!(
                                "{} is both {a} and {b}, which are disjoint",
                                store.label(entity)
                            ),
                            facts,
                            suggestions: vec![
                                format!("retract one of the IS_A chains placing {} in {a} or {b}",
                                    store.label(entity)),
                                format!("drop the DISJOINT_WITH declaration between {a} and {b}"),
                            ],
                        });
                    }
                }
            }
        }
        out
    }

    /// Functional relations: one object per subject.
    pub fn check_functional(&self, store: &ConceptStore) -> Vec<Contradiction> {
        let mut out = Vec::new();
        for relation in &self.functional {
            let mut by_subject: HashMap<ConceptId, Vec<(FactId, ConceptId)>> = HashMap::new();
            let mut subjects_in_order: Vec<ConceptId> = Vec::new();
            for fact in store.facts_by_operator(relation) {
                if fact.existence <= existence::IMPOSSIBLE {
                    continue;
                }
                if let (Some(subject), Some(object)) = (fact.subject(), fact.object()) {
                    if !by_subject.contains_key(&subject) {
                        subjects_in_order.push(subject);
                    }
                    by_subject.entry(subject).or_default().push((fact.id, object));
                }
            }
            for subject in subjects_in_order {
                let entries = &by_subject[&subject];
                for i in 0..entries.len() {
                    for j in (i + 1)..entries.len() {
                        let (fa, oa) = entries[i];
                        let (fb, ob) = entries[j];
                        if oa == ob || self.equivalent(store, oa, ob) {
                            continue;
                        }
                        out.push(Contradiction {
                            kind: ContradictionKind::FunctionalViolation,
                            entity: store.label(subject).to_string(),
                            message: format!(
                                "{} has two distinct {relation} objects: {} and {}",
                                store.label(subject),
                                store.label(oa),
                                store.label(ob)
                            ),
                            facts: vec![fa, fb],
                            suggestions: vec![format!(
                                "link {} and {} via EQUIVALENT_TO, or retract one fact",
                                store.label(oa),
                                store.label(ob)
                            )],
                        });
                    }
                }
            }
        }
        out
    }

    fn equivalent(&self, store: &ConceptStore, a: ConceptId, b: ConceptId) -> bool {
        let la = store.label(a).to_string();
        let lb = store.label(b).to_string();
        for (x, y) in [(&la, &lb), (&lb, &la)] {
            if store
                .get_best_existence_fact("EQUIVALENT_TO", &[x, y])
                .is_some_and(|f| f.existence > existence::IMPOSSIBLE)
            {
                return true;
            }
        }
        false
    }

    /// DFS over IS_A edges; any back-edge is a cycle.
    pub fn check_taxonomic(
        &self,
        store: &ConceptStore,
        registry: &DimensionRegistry,
    ) -> Vec<Contradiction> {
        let mut out = Vec::new();
        let mut done: HashSet<ConceptId> = HashSet::new();
        for entity in entities_with_types(store, registry) {
            if done.contains(&entity) {
                continue;
            }
            let mut on_path: Vec<ConceptId> = Vec::new();
            let mut chain: Vec<FactId> = Vec::new();
            if let Some(cycle) = dfs_cycle(store, registry, entity, &mut on_path, &mut chain, &mut done)
            {
                out.push(Contradiction {
                    kind: ContradictionKind::TaxonomicCycle,
                    entity: store.label(cycle).to_string(),
                    message: format!("IS_A cycle through {}", store.label(cycle)),
                    facts: chain,
                    suggestions: vec!["retract one IS_A edge on the cycle".to_string()],
                });
                // Every node on the detected path sits on (or feeds) this
                // cycle; marking them done reports each cycle once.
                done.extend(on_path.drain(..));
            }
        }
        out
    }

    /// Inherited disjointness: a concept reachable below two disjoint
    /// ancestors.
    pub fn check_inherited_disjoint(
        &self,
        store: &ConceptStore,
        registry: &DimensionRegistry,
    ) -> Vec<Contradiction> {
        // Disjointness over the transitive closure already classifies
        // multi-hop memberships as inherited; this view filters them out.
        self.check_disjointness(store, registry)
            .into_iter()
            .filter(|c| c.kind == ContradictionKind::InheritedDisjoint)
            .collect()
    }

    /// Cardinality constraints per relation.
    pub fn check_cardinality(&self, store: &ConceptStore) -> Vec<Contradiction> {
        let mut out = Vec::new();
        for (relation, constraint) in sorted_constraints(&self.cardinality) {
            let mut by_subject: HashMap<ConceptId, Vec<FactId>> = HashMap::new();
            let mut subjects_in_order: Vec<ConceptId> = Vec::new();
            for fact in store.facts_by_operator(relation) {
                if fact.existence <= existence::IMPOSSIBLE {
                    continue;
                }
                if let Some(subject) = fact.subject() {
                    if !by_subject.contains_key(&subject) {
                        subjects_in_order.push(subject);
                    }
                    by_subject.entry(subject).or_default().push(fact.id);
                }
            }
            for subject in subjects_in_order {
                let facts = &by_subject[&subject];
                let count = facts.len();
                let too_many = constraint.max.is_some_and(|max| count > max);
                let too_few = constraint.min.is_some_and(|min| count < min);
                if too_many || too_few {
                    out.push(Contradiction {
                        kind: ContradictionKind::CardinalityViolation,
                        entity: store.label(subject).to_string(),
                        message: format!(
                            "{} holds {relation} {count} time(s), outside [{}, {}]",
                            store.label(subject),
                            constraint.min.map_or("0".to_string(), |m| m.to_string()),
                            constraint.max.map_or("inf".to_string(), |m| m.to_string()),
                        ),
                        facts: facts.clone(),
                        suggestions: vec![format!("adjust {relation} facts for {}", store.label(subject))],
                    });
                }
            }
        }
        out
    }

    /// `mutuallyExclusive rel A B` declarations violated by stored facts.
    pub fn check_mutual_exclusion(&self, store: &ConceptStore) -> Vec<Contradiction> {
        let mut out = Vec::new();
        for decl in store.facts_by_operator("mutuallyExclusive") {
            if decl.args.len() != 3 || decl.existence <= existence::IMPOSSIBLE {
                continue;
            }
            let relation = store.label(decl.args[0]).to_string();
            let (va, vb) = (decl.args[1], decl.args[2]);
            let mut holders: HashMap<ConceptId, (Option<FactId>, Option<FactId>)> = HashMap::new();
            let mut order: Vec<ConceptId> = Vec::new();
            for fact in store.facts_by_operator(&relation) {
                if fact.existence <= existence::IMPOSSIBLE {
                    continue;
                }
                let (Some(subject), Some(object)) = (fact.subject(), fact.object()) else {
                    continue;
                };
                if object != va && object != vb {
                    continue;
                }
                if !holders.contains_key(&subject) {
                    order.push(subject);
                }
                let entry = holders.entry(subject).or_default();
                if object == va {
                    entry.0 = Some(fact.id);
                } else {
                    entry.1 = Some(fact.id);
                }
            }
            for subject in order {
                if let (Some(fa), Some(fb)) = holders[&subject] {
                    out.push(Contradiction {
                        kind: ContradictionKind::MutualExclusion,
                        entity: store.label(subject).to_string(),
                        message: format!(
                            "{} holds {relation} to both {} and {}, declared mutually exclusive",
                            store.label(subject),
                            store.label(va),
                            store.label(vb)
                        ),
                        facts: vec![fa, fb, decl.id],
                        suggestions: vec![format!(
                            "retract one {relation} fact for {}",
                            store.label(subject)
                        )],
                    });
                }
            }
        }
        out
    }

    // --------------------------------------------------------------------
    // Speculative detection
    // --------------------------------------------------------------------

    /// Report the contradictions that asserting `operator(args…)` would
    /// introduce, without mutating the store.
    pub fn would_contradict(
        &self,
        store: &ConceptStore,
        registry: &DimensionRegistry,
        operator: &str,
        args: &[String],
    ) -> Vec<Contradiction> {
        let mut out = Vec::new();
        let operator = registry.canonical_operator(operator);

        if args.len() == 2 {
            let subject = &args[0];
            let object = &args[1];

            if registry.is_is_a_variant(&operator) {
                out.extend(self.speculative_disjoint(store, registry, subject, object));
                out.extend(self.speculative_cycle(store, registry, subject, object));
            }

            if self.is_functional(&operator) {
                out.extend(self.speculative_functional(store, &operator, subject, object));
            }

            out.extend(self.speculative_mutual_exclusion(store, &operator, subject, object));
            out.extend(self.speculative_cardinality(store, &operator, subject));
        }
        out
    }

    fn speculative_disjoint(
        &self,
        store: &ConceptStore,
        registry: &DimensionRegistry,
        subject: &str,
        object: &str,
    ) -> Vec<Contradiction> {
        let mut out = Vec::new();
        // Classes the candidate would place the entity in: the object and
        // everything above it.
        let mut new_classes: Vec<(String, Vec<FactId>)> = vec![(object.to_string(), Vec::new())];
        if let Some(object_id) = store.concept_by_label(object).map(|c| c.id) {
            for up in type_closure(store, registry, object_id) {
                new_classes.push((store.label(up.class).to_string(), up.chain));
            }
        }
        // Classes the entity is already in.
        let existing: Vec<(String, Vec<FactId>)> = store
            .concept_by_label(subject)
            .map(|c| {
                type_closure(store, registry, c.id)
                    .into_iter()
                    .map(|t| (store.label(t.class).to_string(), t.chain))
                    .collect()
            })
            .unwrap_or_default();

        for (new_class, new_chain) in &new_classes {
            for (old_class, old_chain) in &existing {
                if let Some(declared) = self.disjoint_between(store, new_class, old_class) {
                    let mut facts = old_chain.clone();
                    facts.extend(new_chain.clone());
                    facts.extend(declared);
                    out.push(Contradiction {
                        kind: ContradictionKind::DisjointViolation,
                        entity: subject.to_string(),
                        message: format!(
                            "asserting {subject} IS_A {object} conflicts: {old_class} and {new_class} are disjoint"
                        ),
                        facts,
                        suggestions: vec![format!(
                            "retract the IS_A chain placing {subject} in {old_class} first"
                        )],
                    });
                }
            }
        }
        out
    }

    fn speculative_cycle(
        &self,
        store: &ConceptStore,
        registry: &DimensionRegistry,
        subject: &str,
        object: &str,
    ) -> Vec<Contradiction> {
        let (Some(subject_id), Some(object_id)) = (
            store.concept_by_label(subject).map(|c| c.id),
            store.concept_by_label(object).map(|c| c.id),
        ) else {
            return Vec::new();
        };
        if subject_id == object_id {
            return vec![Contradiction {
                kind: ContradictionKind::TaxonomicCycle,
                entity: subject.to_string(),
                message: format!("{subject} IS_A itself"),
                facts: Vec::new(),
                suggestions: vec!["drop the self-edge".to_string()],
            }];
        }
        // Would the new edge close a loop? Only if object already
        // reaches subject.
        for t in type_closure(store, registry, object_id) {
            if t.class == subject_id {
                return vec![Contradiction {
                    kind: ContradictionKind::TaxonomicCycle,
                    entity: subject.to_string(),
                    message: format!("{subject} IS_A {object} would close an IS_A cycle"),
                    facts: t.chain,
                    suggestions: vec!["retract one IS_A edge on the would-be cycle".to_string()],
                }];
            }
        }
        Vec::new()
    }

    fn speculative_functional(
        &self,
        store: &ConceptStore,
        relation: &str,
        subject: &str,
        object: &str,
    ) -> Vec<Contradiction> {
        let Some(subject_id) = store.concept_by_label(subject).map(|c| c.id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for fact in store.facts_by_op_arg0(relation, subject_id) {
            if fact.existence <= existence::IMPOSSIBLE {
                continue;
            }
            let Some(existing_object) = fact.object() else {
                continue;
            };
            let existing_label = store.label(existing_object);
            if existing_label == object {
                continue;
            }
            if let Some(object_id) = store.concept_by_label(object).map(|c| c.id) {
                if self.equivalent(store, existing_object, object_id) {
                    continue;
                }
            }
            out.push(Contradiction {
                kind: ContradictionKind::FunctionalViolation,
                entity: subject.to_string(),
                message: format!(
                    "{relation} is functional: {subject} already maps to {existing_label}, not {object}"
                ),
                facts: vec![fact.id],
                suggestions: vec![format!(
                    "link {existing_label} and {object} via EQUIVALENT_TO, or retract the old fact"
                )],
            });
        }
        out
    }

    fn speculative_mutual_exclusion(
        &self,
        store: &ConceptStore,
        relation: &str,
        subject: &str,
        object: &str,
    ) -> Vec<Contradiction> {
        let mut out = Vec::new();
        for decl in store.facts_by_operator("mutuallyExclusive") {
            if decl.args.len() != 3 || decl.existence <= existence::IMPOSSIBLE {
                continue;
            }
            if store.label(decl.args[0]) != relation {
                continue;
            }
            let (va, vb) = (store.label(decl.args[1]), store.label(decl.args[2]));
            let other = if object == va {
                vb
            } else if object == vb {
                va
            } else {
                continue;
            };
            if let Some(existing) = store.get_best_existence_fact(relation, &[subject, other]) {
                if existing.existence > existence::IMPOSSIBLE {
                    out.push(Contradiction {
                        kind: ContradictionKind::MutualExclusion,
                        entity: subject.to_string(),
                        message: format!(
                            "{subject} already holds {relation} {other}; {va} and {vb} are mutually exclusive"
                        ),
                        facts: vec![existing.id, decl.id],
                        suggestions: vec![format!("retract {relation} {subject} {other} first")],
                    });
                }
            }
        }
        out
    }

    fn speculative_cardinality(
        &self,
        store: &ConceptStore,
        relation: &str,
        subject: &str,
    ) -> Vec<Contradiction> {
        let Some(constraint) = self.cardinality.get(relation) else {
            return Vec::new();
        };
        let Some(max) = constraint.max else {
            return Vec::new();
        };
        let Some(subject_id) = store.concept_by_label(subject).map(|c| c.id) else {
            return Vec::new();
        };
        let facts: Vec<FactId> = store
            .facts_by_op_arg0(relation, subject_id)
            .filter(|f| f.existence > existence::IMPOSSIBLE)
            .map(|f| f.id)
            .collect();
        if facts.len() + 1 > max {
            return vec![Contradiction {
                kind: ContradictionKind::CardinalityViolation,
                entity: subject.to_string(),
                message: format!(
                    "{subject} already holds {relation} {} time(s); max is {max}",
                    facts.len()
                ),
                facts,
                suggestions: vec![format!("retract a {relation} fact for {subject}")],
            }];
        }
        Vec::new()
    }
}

// ----------------------------------------------------------------------------
// IS_A closure helpers (store-level, detector-local)
// ----------------------------------------------------------------------------

struct TypeEntry {
    class: ConceptId,
    chain: Vec<FactId>,
}

/// Concepts that appear as IS_A subjects, in insertion order.
fn entities_with_types(store: &ConceptStore, registry: &DimensionRegistry) -> Vec<ConceptId> {
    let mut seen: HashSet<ConceptId> = HashSet::new();
    let mut out = Vec::new();
    for fact in store.facts() {
        if fact.existence <= existence::IMPOSSIBLE || !registry.is_is_a_variant(&fact.operator) {
            continue;
        }
        if let Some(subject) = fact.subject() {
            if seen.insert(subject) {
                out.push(subject);
            }
        }
    }
    out
}

/// Transitive IS_A classes of an entity with their chains, breadth-first.
fn type_closure(
    store: &ConceptStore,
    registry: &DimensionRegistry,
    entity: ConceptId,
) -> Vec<TypeEntry> {
    let mut out = Vec::new();
    let mut visited: HashSet<ConceptId> = HashSet::new();
    visited.insert(entity);
    let mut frontier: Vec<TypeEntry> = vec![TypeEntry {
        class: entity,
        chain: Vec::new(),
    }];
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for node in &frontier {
            for fact in store.facts_by_subject(node.class) {
                if fact.args.len() != 2
                    || fact.existence <= existence::IMPOSSIBLE
                    || !registry.is_is_a_variant(&fact.operator)
                {
                    continue;
                }
                let Some(class) = fact.object() else { continue };
                if !visited.insert(class) {
                    continue;
                }
                let mut chain = node.chain.clone();
                chain.push(fact.id);
                out.push(TypeEntry {
                    class,
                    chain: chain.clone(),
                });
                next.push(TypeEntry { class, chain });
            }
        }
        frontier = next;
    }
    out
}

fn dfs_cycle(
    store: &ConceptStore,
    registry: &DimensionRegistry,
    node: ConceptId,
    on_path: &mut Vec<ConceptId>,
    chain: &mut Vec<FactId>,
    done: &mut HashSet<ConceptId>,
) -> Option<ConceptId> {
    if on_path.contains(&node) {
        return Some(node);
    }
    if done.contains(&node) {
        return None;
    }
    on_path.push(node);
    for fact in store.facts_by_subject(node) {
        if fact.args.len() != 2
            || fact.existence <= existence::IMPOSSIBLE
            || !registry.is_is_a_variant(&fact.operator)
        {
            continue;
        }
        let Some(target) = fact.object() else { continue };
        chain.push(fact.id);
        if let Some(cycle) = dfs_cycle(store, registry, target, on_path, chain, done) {
            return Some(cycle);
        }
        chain.pop();
    }
    on_path.pop();
    done.insert(node);
    None
}

fn sorted_constraints(
    map: &HashMap<String, CardinalityConstraint>,
) -> Vec<(&String, &CardinalityConstraint)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by_key(|(name, _)| name.clone());
    entries
}
