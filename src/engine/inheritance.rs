//! Inheritance reasoning: property inheritance down the IS_A hierarchy
//! and value-type inheritance for possession operators.

use crate::store::existence;

use super::transitive::Chain;
use super::Engine;

/// Possession operators whose objects inherit through IS_A: proving
/// `has(s, Type)` succeeds when `has(s, z)` holds and `z IS_A Type`.
pub(crate) const POSSESSION_OPERATORS: [&str; 4] = ["has", "owns", "holds", "contains"];

impl<'a> Engine<'a> {
    /// If `relation` is inheritable, ascend the IS_A chain from `subject`
    /// looking for an ancestor that carries `relation(ancestor, object)`.
    pub(crate) fn deduce_with_inheritance(
        &self,
        relation: &str,
        subject: &str,
        object: &str,
        max_depth: usize,
    ) -> Option<Chain> {
        let subject_id = self.store.concept_by_label(subject)?.id;
        for ancestor in self.ancestors_of(subject_id, max_depth) {
            let ancestor_label = self.store.label(ancestor.concept).to_string();
            if let Some(fact) = self
                .store
                .get_best_existence_fact(relation, &[&ancestor_label, object])
            {
                if fact.existence <= existence::IMPOSSIBLE {
                    continue;
                }
                let mut facts = ancestor.chain;
                facts.push(fact.id);
                return Some(Chain {
                    existence: existence::cap_derived(ancestor.existence.min(fact.existence)),
                    facts,
                });
            }
        }
        None
    }

    /// Value-type inheritance: `op(subject, z)` plus `z IS_A object`
    /// (transitively) proves `op(subject, object)` for possession
    /// operators.
    pub(crate) fn value_type_inheritance(
        &self,
        operator: &str,
        subject: &str,
        object: &str,
        max_depth: usize,
    ) -> Option<Chain> {
        if !POSSESSION_OPERATORS.contains(&operator) {
            return None;
        }
        let subject_id = self.store.concept_by_label(subject)?.id;
        let held: Vec<_> = self
            .store
            .facts_by_op_arg0(operator, subject_id)
            .filter(|f| f.args.len() == 2 && f.existence > existence::IMPOSSIBLE)
            .map(|f| (f.id, f.existence, f.object()))
            .collect();
        for (fact_id, fact_existence, object_id) in held {
            let Some(z) = object_id else { continue };
            let z_label = self.store.label(z).to_string();
            if z_label == object {
                continue; // that would be a direct match, handled earlier
            }
            if let Some(isa) = self.deduce_is_a(&z_label, object, max_depth) {
                let mut facts = vec![fact_id];
                facts.extend(isa.facts);
                return Some(Chain {
                    existence: existence::cap_derived(fact_existence.min(isa.existence)),
                    facts,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{Engine, EngineOptions};
    use crate::hdc::vocabulary::Vocabulary;
    use crate::hdc::{consts, Strategy};
    use crate::plugin::PluginRegistry;
    use crate::registry::{DimensionRegistry, RegistryDocument};
    use crate::store::{existence, ConceptStore, NewFact, Provenance};
    use std::sync::Arc;

    fn store_with(facts: &[(&str, &str, &str, i8)]) -> ConceptStore {
        let mut store = ConceptStore::new(Arc::new(Vocabulary::new(
            Strategy::Dense,
            consts::GEOMETRY_TEST,
        )));
        for (op, s, o, level) in facts {
            store
                .add_fact(
                    NewFact {
                        operator: (*op).to_string(),
                        args: vec![(*s).to_string(), (*o).to_string()],
                        existence: *level,
                        provenance: Provenance::now(),
                    },
                    None,
                )
                .expect("adds");
        }
        store
    }

    fn inheritable_registry() -> DimensionRegistry {
        let doc: RegistryDocument = toml::from_str(
            r#"
            [relations.hasProperty]
            inheritable = true
            "#,
        )
        .expect("parses");
        DimensionRegistry::from_document(doc).expect("validates")
    }

    #[test]
    fn property_inherits_down_isa() {
        let store = store_with(&[
            ("IS_A", "Tea", "Beverage", existence::CERTAIN),
            ("IS_A", "Beverage", "Liquid", existence::CERTAIN),
            ("hasProperty", "Liquid", "Cold", existence::CERTAIN),
        ]);
        let registry = inheritable_registry();
        let plugins = PluginRegistry::new();
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        let chain = engine
            .deduce_with_inheritance("hasProperty", "Tea", "Cold", 8)
            .expect("inherits");
        assert_eq!(chain.facts.len(), 3);
        assert_eq!(chain.existence, existence::DEMONSTRATED);
    }

    #[test]
    fn value_type_inheritance_resolves_held_objects() {
        let store = store_with(&[
            ("has", "Alice", "Rex", existence::CERTAIN),
            ("IS_A", "Rex", "Dog", existence::CERTAIN),
            ("IS_A", "Dog", "Pet", existence::CERTAIN),
        ]);
        let registry = DimensionRegistry::degraded();
        let plugins = PluginRegistry::new();
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        let chain = engine
            .value_type_inheritance("has", "Alice", "Pet", 8)
            .expect("holds a pet");
        assert_eq!(chain.facts.len(), 3);
    }

    #[test]
    fn value_type_inheritance_is_possession_only() {
        let store = store_with(&[
            ("likes", "Alice", "Rex", existence::CERTAIN),
            ("IS_A", "Rex", "Dog", existence::CERTAIN),
        ]);
        let registry = DimensionRegistry::degraded();
        let plugins = PluginRegistry::new();
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        assert!(engine.value_type_inheritance("likes", "Alice", "Dog", 8).is_none());
    }
}
