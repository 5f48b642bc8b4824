//! Transitive closure walks: the IS_A graph and registry-declared
//! transitive relations.
//!
//! All walks are breadth-first over insertion-ordered index buckets, so
//! the first chain found is the shortest and enumeration is
//! deterministic. Derived existence is the minimum along the chain,
//! capped at DEMONSTRATED; IMPOSSIBLE edges are never traversed.

use std::collections::HashSet;

use crate::store::{existence, ConceptId, Fact, FactId};

use super::Engine;

/// A derivation chain through the KB.
#[derive(Debug, Clone)]
pub struct Chain {
    /// Facts forming the chain, in walk order.
    pub facts: Vec<FactId>,
    /// Minimum existence along the chain, capped at DEMONSTRATED.
    pub existence: i8,
}

/// One reachable ancestor in the IS_A graph.
#[derive(Debug, Clone)]
pub(crate) struct Ancestor {
    pub concept: ConceptId,
    /// Minimum existence along the path, capped at DEMONSTRATED.
    pub existence: i8,
    /// IS_A facts from the start concept to this ancestor.
    pub chain: Vec<FactId>,
}

impl<'a> Engine<'a> {
    /// Usable IS_A-variant edges leaving `from` (any variant spelling,
    /// excluding IMPOSSIBLE assertions).
    fn isa_edges_from(&self, from: ConceptId) -> Vec<&Fact> {
        self.store
            .facts_by_subject(from)
            .filter(|f| {
                f.args.len() == 2
                    && f.existence > existence::IMPOSSIBLE
                    && self.registry.is_is_a_variant(&f.operator)
            })
            .collect()
    }

    /// All ancestors of `from` in the IS_A graph, breadth-first, each
    /// with its derivation chain. Cycles are cut by a visited set.
    pub(crate) fn ancestors_of(&self, from: ConceptId, max_depth: usize) -> Vec<Ancestor> {
        let mut out: Vec<Ancestor> = Vec::new();
        let mut visited: HashSet<ConceptId> = HashSet::new();
        visited.insert(from);
        let mut frontier: Vec<Ancestor> = vec![Ancestor {
            concept: from,
            existence: existence::CERTAIN,
            chain: Vec::new(),
        }];

        for _ in 0..max_depth {
            let mut next: Vec<Ancestor> = Vec::new();
            for node in &frontier {
                for edge in self.isa_edges_from(node.concept) {
                    let Some(target) = edge.object() else {
                        continue;
                    };
                    if !visited.insert(target) {
                        continue;
                    }
                    let mut chain = node.chain.clone();
                    chain.push(edge.id);
                    let reached = Ancestor {
                        concept: target,
                        existence: existence::cap_derived(node.existence.min(edge.existence)),
                        chain,
                    };
                    out.push(reached.clone());
                    next.push(reached);
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        out
    }

    /// Walk the IS_A graph from `from` to `to` across all variant
    /// spellings. Returns the shortest chain with its derived existence.
    pub(crate) fn deduce_is_a(
        &self,
        from: &str,
        to: &str,
        max_depth: usize,
    ) -> Option<Chain> {
        let from_id = self.store.concept_by_label(from)?.id;
        let to_id = self.store.concept_by_label(to)?.id;
        for ancestor in self.ancestors_of(from_id, max_depth) {
            if ancestor.concept == to_id {
                return Some(Chain {
                    facts: ancestor.chain,
                    existence: ancestor.existence,
                });
            }
        }
        None
    }

    /// BFS closure of an arbitrary transitive relation. Symmetric
    /// relations traverse edges in both directions.
    pub(crate) fn deduce_transitive(
        &self,
        operator: &str,
        from: &str,
        to: &str,
        max_depth: usize,
    ) -> Option<Chain> {
        let from_id = self.store.concept_by_label(from)?.id;
        let to_id = self.store.concept_by_label(to)?.id;
        let symmetric = self.registry.relation_properties(operator).symmetric;

        let mut visited: HashSet<ConceptId> = HashSet::new();
        visited.insert(from_id);
        let mut frontier: Vec<(ConceptId, Vec<FactId>, i8)> =
            vec![(from_id, Vec::new(), existence::CERTAIN)];

        for _ in 0..max_depth {
            let mut next: Vec<(ConceptId, Vec<FactId>, i8)> = Vec::new();
            for (current, chain, level) in &frontier {
                for edge in self.transitive_edges(operator, *current, symmetric) {
                    let Some(target) = self.edge_target(&edge, *current) else {
                        continue;
                    };
                    if !visited.insert(target) {
                        continue;
                    }
                    let mut facts = chain.clone();
                    facts.push(edge.id);
                    let derived = existence::cap_derived((*level).min(edge.existence));
                    if target == to_id {
                        return Some(Chain {
                            facts,
                            existence: derived,
                        });
                    }
                    next.push((target, facts, derived));
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        None
    }

    fn transitive_edges(
        &self,
        operator: &str,
        current: ConceptId,
        symmetric: bool,
    ) -> Vec<Fact> {
        let mut edges: Vec<Fact> = self
            .store
            .facts_by_op_arg0(operator, current)
            .filter(|f| f.args.len() == 2 && f.existence > existence::IMPOSSIBLE)
            .cloned()
            .collect();
        if symmetric {
            edges.extend(
                self.store
                    .facts_by_operator(operator)
                    .filter(|f| {
                        f.args.len() == 2
                            && f.existence > existence::IMPOSSIBLE
                            && f.object() == Some(current)
                    })
                    .cloned(),
            );
        }
        edges
    }

    fn edge_target(&self, edge: &Fact, current: ConceptId) -> Option<ConceptId> {
        if edge.subject() == Some(current) {
            edge.object()
        } else {
            edge.subject()
        }
    }
}
