//! Holographic fast path: shortlist KB facts by vector similarity, then
//! validate symbolically.
//!
//! The query vector is encoded exactly like fact vectors (operator bound
//! to Pos0, argument `k` to Pos_{k+1}, bundled), so a stored instance of
//! the goal sits at similarity 1.0 and near-instances score high. A
//! similarity hit is never accepted on its own: the candidate's metadata
//! must match the goal exactly after operator canonicalization. The path
//! is read-only by contract — validation never creates facts or
//! concepts in the store.

use crate::ast::{PatternArg, TriplePattern};
use crate::hdc::consts;
use crate::store::{existence, FactId};

use super::{encode_pattern, Engine};

impl<'a> Engine<'a> {
    /// Search the KB for a vector match of a ground goal. Returns the
    /// best symbolically-validated candidate.
    pub(crate) fn holographic_match(&self, goal: &TriplePattern) -> Option<FactId> {
        if !goal.is_ground() {
            return None;
        }
        let query_vector = encode_pattern(goal, self.store.vocabulary());

        let mut best: Option<(f64, FactId)> = None;
        for fact in self.store.facts() {
            if fact.existence <= existence::IMPOSSIBLE {
                continue;
            }
            let Ok(similarity) = query_vector.similarity(&fact.vector) else {
                continue;
            };
            if similarity <= consts::UNBIND_MIN_SIMILARITY {
                continue;
            }
            if !self.validates_symbolically(goal, fact) {
                continue;
            }
            let better = best.map_or(true, |(score, _)| similarity > score);
            if better {
                best = Some((similarity, fact.id));
            }
        }
        best.map(|(_, id)| id)
    }

    /// Exact metadata equality after canonicalization. The shortlist is
    /// holographic; acceptance is symbolic.
    fn validates_symbolically(&self, goal: &TriplePattern, fact: &crate::store::Fact) -> bool {
        if self.registry.canonical_operator(&fact.operator) != goal.operator {
            return false;
        }
        if fact.args.len() != goal.args.len() {
            return false;
        }
        goal.args.iter().zip(fact.args.iter()).all(|(arg, &id)| {
            matches!(arg, PatternArg::Atom(label) if label == self.store.label(id))
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::TriplePattern;
    use crate::engine::{Engine, EngineOptions, ProofOptions};
    use crate::hdc::vocabulary::Vocabulary;
    use crate::hdc::{consts, Strategy};
    use crate::plugin::PluginRegistry;
    use crate::registry::DimensionRegistry;
    use crate::store::{existence, ConceptStore, NewFact, Provenance};
    use std::sync::Arc;

    fn store_with(facts: &[(&str, &[&str], i8)]) -> ConceptStore {
        let mut store = ConceptStore::new(Arc::new(Vocabulary::new(
            Strategy::Dense,
            consts::GEOMETRY_TEST,
        )));
        for (op, args, level) in facts {
            store
                .add_fact(
                    NewFact {
                        operator: (*op).to_string(),
                        args: args.iter().map(|s| (*s).to_string()).collect(),
                        existence: *level,
                        provenance: Provenance::now(),
                    },
                    None,
                )
                .expect("adds");
        }
        store
    }

    #[test]
    fn finds_exact_fact_by_vector() {
        let store = store_with(&[
            ("IS_A", &["Dog", "Mammal"], existence::CERTAIN),
            ("IS_A", &["Cat", "Mammal"], existence::CERTAIN),
        ]);
        let registry = DimensionRegistry::degraded();
        let plugins = PluginRegistry::new();
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        let goal = TriplePattern::ground("IS_A", &["Dog", "Mammal"]);
        let hit = engine.holographic_match(&goal).expect("vector hit");
        let expected = store
            .get_best_existence_fact("IS_A", &["Dog", "Mammal"])
            .expect("stored")
            .id;
        assert_eq!(hit, expected);
    }

    #[test]
    fn similar_but_different_triple_is_rejected() {
        let store = store_with(&[("IS_A", &["Cat", "Mammal"], existence::CERTAIN)]);
        let registry = DimensionRegistry::degraded();
        let plugins = PluginRegistry::new();
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        // Shares operator and object with the stored fact; symbolic
        // validation must still reject it.
        let goal = TriplePattern::ground("IS_A", &["Dog", "Mammal"]);
        assert!(engine.holographic_match(&goal).is_none());
    }

    #[test]
    fn fast_path_never_mutates() {
        let store = store_with(&[("IS_A", &["Cat", "Mammal"], existence::CERTAIN)]);
        let registry = DimensionRegistry::degraded();
        let plugins = PluginRegistry::new();
        let version = store.kb_version();
        let concepts = store.concept_count();
        let engine = Engine::new(
            &store,
            &registry,
            &plugins,
            &[],
            EngineOptions {
                holographic: true,
                ..Default::default()
            },
        );
        let goal = crate::ast::CompoundTree::Leaf(TriplePattern::ground(
            "IS_A",
            &["Unicorn", "Mammal"],
        ));
        let _ = engine.prove(&goal, &ProofOptions::default());
        assert_eq!(store.kb_version(), version);
        assert_eq!(store.concept_count(), concepts);
    }
}
