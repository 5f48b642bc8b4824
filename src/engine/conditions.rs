//! Condition proving: simple leaves, leaves with unbound variables,
//! and compound And/Or/Not trees.
//!
//! - **Leaf, ground**: negation check, direct KB match (exact metadata,
//!   canonicalized), computable-plugin evaluation, transitive closure,
//!   inheritance, value-type inheritance, rule chaining, then the opt-in
//!   holographic fast path.
//! - **Leaf with holes**: KB enumeration through the best index produces
//!   candidate bindings; rule chaining covers derivable instances.
//! - **And**: parts are reordered by estimated fanout ascending (ties
//!   broken toward more-grounded parts), then proven with ordered
//!   backtracking over candidate bindings.
//! - **Or**: branches tried left to right, first success wins with
//!   decayed confidence.
//! - **Not**: negation-as-failure, only under the closed-world flag;
//!   unbound inner variables trigger a bounded existential witness
//!   search over the entity domain.

use crate::ast::{CompoundTree, PatternArg, TriplePattern};
use crate::hdc::consts;
use crate::store::existence;

use super::unify::{
    fingerprint_bindings, goal_fingerprint, rename_apart, substitute, unify_fact, unify_patterns,
    Bindings,
};
use super::{Engine, FailReason, MatchKey, ProofState, ProofStep};

/// Hard cap on the witness-search entity domain before budgeting.
const ENTITY_DOMAIN_CAP: usize = 200;

/// Fanout-scaled witness budgets: `(estimate floor, max_domain,
/// max_assignments)`, scanned top-down.
const WITNESS_BUDGETS: [(usize, usize, usize); 4] =
    [(10_000, 15, 40), (5_000, 20, 60), (2_000, 30, 80), (500, 40, 120)];

/// Budget when the fanout estimate is small.
const WITNESS_BUDGET_DEFAULT: (usize, usize) = (80, 200);

fn witness_budget(estimate: usize) -> (usize, usize) {
    for &(floor, domain, assignments) in &WITNESS_BUDGETS {
        if estimate >= floor {
            return (domain, assignments);
        }
    }
    WITNESS_BUDGET_DEFAULT
}

/// Rename every hole in a condition tree apart with the given tag.
fn rename_tree(tree: &CompoundTree, tag: usize) -> CompoundTree {
    match tree {
        CompoundTree::Leaf(p) => CompoundTree::Leaf(rename_apart(p, tag)),
        CompoundTree::And(parts) => {
            CompoundTree::And(parts.iter().map(|p| rename_tree(p, tag)).collect())
        }
        CompoundTree::Or(parts) => {
            CompoundTree::Or(parts.iter().map(|p| rename_tree(p, tag)).collect())
        }
        CompoundTree::Not(inner) => CompoundTree::Not(Box::new(rename_tree(inner, tag))),
    }
}

type Outcome = Result<Option<(f64, Bindings)>, FailReason>;

impl<'a> Engine<'a> {
    /// Prove any condition tree under the given bindings.
    pub(crate) fn prove_goal(
        &self,
        tree: &CompoundTree,
        bindings: &Bindings,
        depth: usize,
        state: &mut ProofState,
    ) -> Outcome {
        state.tick(depth)?;
        match tree {
            CompoundTree::Leaf(pattern) => self.prove_leaf(pattern, bindings, depth, state),
            CompoundTree::And(parts) => self.prove_and(parts, bindings, depth, state),
            CompoundTree::Or(parts) => self.prove_or(parts, bindings, depth, state),
            CompoundTree::Not(inner) => self.prove_not(inner, bindings, depth, state),
        }
    }

    // --------------------------------------------------------------------
    // Leaves
    // --------------------------------------------------------------------

    fn prove_leaf(
        &self,
        pattern: &TriplePattern,
        bindings: &Bindings,
        depth: usize,
        state: &mut ProofState,
    ) -> Outcome {
        let pattern = self.canonical(pattern);
        let current = substitute(&pattern, bindings);
        let fp = goal_fingerprint(&current, &Bindings::new());

        // Cycle guard: a goal already on the proof path cannot help
        // proving itself.
        if state.visited.contains(&fp) {
            return Ok(None);
        }
        if current.is_ground() {
            if let Some(memoized) = state.memo.get(&fp) {
                return Ok(memoized.map(|confidence| (confidence, bindings.clone())));
            }
        }

        state.visited.insert(fp);
        let outcome = self.prove_leaf_inner(&current, bindings, depth, state);
        state.visited.remove(&fp);

        if current.is_ground() {
            if let Ok(result) = &outcome {
                state
                    .memo
                    .insert(fp, result.as_ref().map(|(confidence, _)| *confidence));
            }
        }
        outcome
    }

    fn prove_leaf_inner(
        &self,
        current: &TriplePattern,
        bindings: &Bindings,
        depth: usize,
        state: &mut ProofState,
    ) -> Outcome {
        // Explicit negation blocks the goal outright.
        if current.is_ground() && self.negated_in_kb(current) {
            state.negation_hit = true;
            state.record(ProofStep::op("condition_negated"));
            return Ok(None);
        }

        // Direct KB match through the best index.
        for fact in self.leaf_candidates(current) {
            state.tick(depth)?;
            if fact.existence <= existence::IMPOSSIBLE {
                continue;
            }
            if let Some(extended) = unify_fact(current, fact, self.store, bindings) {
                state.record(
                    ProofStep::op("direct_match")
                        .with_fact(fact.id)
                        .with_bindings(&extended),
                );
                if depth == 0 && state.method.is_none() {
                    state.method = Some("direct".to_string());
                }
                return Ok(Some((consts::CONFIDENCE_DIRECT, extended)));
            }
        }

        // Ground binary goals unlock the derivation ladder.
        if current.is_ground() && current.args.len() == 2 {
            let subject = match &current.args[0] {
                PatternArg::Atom(s) => s.clone(),
                PatternArg::Hole(_) => unreachable!("ground checked above"),
            };
            let object = match &current.args[1] {
                PatternArg::Atom(s) => s.clone(),
                PatternArg::Hole(_) => unreachable!("ground checked above"),
            };

            // Computable relations consult their plugin.
            if let Some(plugin_name) = self.registry.computable_plugin(&current.operator) {
                if let (Some(s), Some(o)) = (
                    self.store.concept_by_label(&subject),
                    self.store.concept_by_label(&object),
                ) {
                    let verdict = self
                        .plugins
                        .evaluate(&plugin_name, &current.operator, s, o);
                    if verdict.truth.is_affirmative() {
                        state.record(ProofStep::op("plugin_evaluated"));
                        if depth == 0 && state.method.is_none() {
                            state.method = Some("plugin".to_string());
                        }
                        return Ok(Some((verdict.confidence, bindings.clone())));
                    }
                    if verdict.truth == crate::plugin::TruthValue::False {
                        state.record(ProofStep::op("plugin_refuted"));
                        return Ok(None);
                    }
                    // UNKNOWN / FALSE_LIKELY: keep reasoning symbolically.
                }
            }

            // Transitive closure (IS_A variants walk the whole family).
            let chain = if self.registry.is_is_a_variant(&current.operator) {
                self.deduce_is_a(&subject, &object, self.options.max_chain_depth)
            } else if self.registry.is_transitive(&current.operator) {
                self.deduce_transitive(
                    &current.operator,
                    &subject,
                    &object,
                    self.options.max_chain_depth,
                )
            } else {
                None
            };
            if let Some(chain) = chain {
                for fact in &chain.facts {
                    state.record(ProofStep::op("transitive_link").with_fact(*fact));
                }
                if depth == 0 && state.method.is_none() {
                    state.method = Some("transitive".to_string());
                }
                let hops = chain.facts.len().saturating_sub(1) as u32;
                return Ok(Some((
                    Self::decayed(consts::CONFIDENCE_DIRECT, hops),
                    bindings.clone(),
                )));
            }

            // Property inheritance down IS_A.
            if self.registry.is_inheritable(&current.operator) {
                if let Some(chain) = self.deduce_with_inheritance(
                    &current.operator,
                    &subject,
                    &object,
                    self.options.max_chain_depth,
                ) {
                    for fact in &chain.facts {
                        state.record(ProofStep::op("inherited_link").with_fact(*fact));
                    }
                    if depth == 0 && state.method.is_none() {
                        state.method = Some("inheritance".to_string());
                    }
                    let hops = chain.facts.len().saturating_sub(1) as u32;
                    return Ok(Some((
                        Self::decayed(consts::CONFIDENCE_DIRECT, hops),
                        bindings.clone(),
                    )));
                }
            }

            // Value-type inheritance for possession operators.
            if let Some(chain) = self.value_type_inheritance(
                &current.operator,
                &subject,
                &object,
                self.options.max_chain_depth,
            ) {
                for fact in &chain.facts {
                    state.record(ProofStep::op("value_type_link").with_fact(*fact));
                }
                if depth == 0 && state.method.is_none() {
                    state.method = Some("value_type".to_string());
                }
                let hops = chain.facts.len().saturating_sub(1) as u32;
                return Ok(Some((
                    Self::decayed(consts::CONFIDENCE_DIRECT, hops),
                    bindings.clone(),
                )));
            }
        }

        // Backward chain through rules whose conclusion unifies.
        if let Some(result) = self.chain_rules(current, bindings, depth, state)? {
            return Ok(Some(result));
        }

        // Opt-in holographic shortlist, validated symbolically.
        if self.options.holographic && current.is_ground() {
            if let Some(fact_id) = self.holographic_match(current) {
                state.record(ProofStep::op("holographic_match").with_fact(fact_id));
                if depth == 0 && state.method.is_none() {
                    state.method = Some("holographic".to_string());
                }
                return Ok(Some((consts::CONFIDENCE_DIRECT, bindings.clone())));
            }
        }

        Ok(None)
    }

    /// An explicit `NOT_<op>` fact over the same arguments blocks proof.
    fn negated_in_kb(&self, current: &TriplePattern) -> bool {
        let labels: Vec<&str> = current
            .args
            .iter()
            .filter_map(|a| match a {
                PatternArg::Atom(s) => Some(s.as_str()),
                PatternArg::Hole(_) => None,
            })
            .collect();
        if labels.len() != current.args.len() {
            return false;
        }
        let negated = format!("NOT_{}", current.operator);
        self.store
            .get_best_existence_fact(&negated, &labels)
            .is_some_and(|f| f.existence > existence::IMPOSSIBLE)
    }

    fn leaf_candidates(&self, pattern: &TriplePattern) -> Vec<&crate::store::Fact> {
        match pattern.ground_arg0() {
            Some(arg0) => match self.store.concept_by_label(arg0) {
                Some(concept) => self
                    .store
                    .facts_by_op_arg0(&pattern.operator, concept.id)
                    .collect(),
                None => Vec::new(),
            },
            None => self.store.facts_by_operator(&pattern.operator).collect(),
        }
    }

    /// Enumerate every KB binding for a leaf pattern (used by And
    /// backtracking). Results are cached per (pattern, bindings, depth,
    /// KB version, rule count, CWA, depth cap).
    pub(crate) fn find_all_matches(
        &self,
        pattern: &TriplePattern,
        bindings: &Bindings,
        depth: usize,
        state: &mut ProofState,
    ) -> Result<Vec<Bindings>, FailReason> {
        let pattern = self.canonical(pattern);
        let current = substitute(&pattern, bindings);
        let key = MatchKey {
            pattern_fp: goal_fingerprint(&current, &Bindings::new()),
            bindings_fp: fingerprint_bindings(bindings),
            depth,
            kb_version: self.store.kb_version(),
            rules_len: self.rules.len(),
            cwa: self.options.closed_world,
            max_depth: state.max_depth,
        };
        if let Some(cached) = state.matches_cache.get(&key) {
            return Ok(cached.clone());
        }

        let mut matches = Vec::new();
        let candidates = self.leaf_candidates(&current);
        for fact in candidates {
            state.tick(depth)?;
            if fact.existence <= existence::IMPOSSIBLE {
                continue;
            }
            if let Some(extended) = unify_fact(&current, fact, self.store, bindings) {
                matches.push(extended);
            }
        }
        state.cache_matches(key, matches.clone());
        Ok(matches)
    }

    // --------------------------------------------------------------------
    // Rule chaining
    // --------------------------------------------------------------------

    fn chain_rules(
        &self,
        goal: &TriplePattern,
        bindings: &Bindings,
        depth: usize,
        state: &mut ProofState,
    ) -> Outcome {
        for rule in self.rules {
            state.tick(depth)?;
            let tag = state.next_rename();
            let conclusion = rename_apart(&self.canonical(&rule.conclusion), tag);
            // Ground rules demand exact symbolic unification; there is no
            // fuzzy acceptance by vector similarity here.
            let Some(unified) = unify_patterns(&conclusion, goal, bindings) else {
                continue;
            };
            let condition = rename_tree(&rule.condition, tag);
            match self.prove_goal(&condition, &unified, depth + 1, state)? {
                Some((confidence, proven)) => {
                    state.record(
                        ProofStep::op("rule_applied")
                            .with_rule(&rule.name)
                            .with_bindings(&proven),
                    );
                    if depth == 0 && state.method.is_none() {
                        state.method = Some("rule_chain".to_string());
                    }
                    return Ok(Some((Self::decayed(confidence, 1), proven)));
                }
                None => continue,
            }
        }
        Ok(None)
    }

    // --------------------------------------------------------------------
    // Compounds
    // --------------------------------------------------------------------

    fn prove_and(
        &self,
        parts: &[CompoundTree],
        bindings: &Bindings,
        depth: usize,
        state: &mut ProofState,
    ) -> Outcome {
        // Reorder by estimated fanout ascending; compound parts sort
        // last, ties break toward more-grounded patterns. `Not` parts
        // also sort last so their variables arrive bound.
        let mut order: Vec<(usize, usize)> = parts
            .iter()
            .enumerate()
            .map(|(index, part)| (index, self.estimate_fanout(part, bindings)))
            .collect();
        order.sort_by(|&(ia, ea), &(ib, eb)| {
            ea.cmp(&eb)
                .then_with(|| {
                    let ga = grounded_rank(&parts[ia], bindings);
                    let gb = grounded_rank(&parts[ib], bindings);
                    gb.cmp(&ga)
                })
                .then(ia.cmp(&ib))
        });
        let ordered: Vec<&CompoundTree> = order.iter().map(|&(index, _)| &parts[index]).collect();
        self.prove_and_parts(&ordered, 0, bindings, 1.0, depth, state)
    }

    fn prove_and_parts(
        &self,
        parts: &[&CompoundTree],
        index: usize,
        bindings: &Bindings,
        confidence: f64,
        depth: usize,
        state: &mut ProofState,
    ) -> Outcome {
        if index == parts.len() {
            return Ok(Some((confidence, bindings.clone())));
        }
        let part = parts[index];
        match part {
            CompoundTree::Leaf(pattern) => {
                // KB candidates first: each one is a backtracking branch.
                let matches = self.find_all_matches(pattern, bindings, depth, state)?;
                for candidate in &matches {
                    state.tick(depth)?; // backtrack boundary
                    if let Some(result) = self.prove_and_parts(
                        parts,
                        index + 1,
                        candidate,
                        confidence * consts::CONFIDENCE_DIRECT,
                        depth,
                        state,
                    )? {
                        return Ok(Some(result));
                    }
                }
                // Derivation fallback (transitive, inheritance, rules)
                // for goals the KB does not hold directly.
                if let Some((leaf_confidence, extended)) =
                    self.prove_leaf(pattern, bindings, depth + 1, state)?
                {
                    if !matches.contains(&extended) {
                        if let Some(result) = self.prove_and_parts(
                            parts,
                            index + 1,
                            &extended,
                            confidence * leaf_confidence,
                            depth,
                            state,
                        )? {
                            return Ok(Some(result));
                        }
                    }
                }
                Ok(None)
            }
            compound => {
                if let Some((part_confidence, extended)) =
                    self.prove_goal(compound, bindings, depth + 1, state)?
                {
                    return self.prove_and_parts(
                        parts,
                        index + 1,
                        &extended,
                        confidence * part_confidence,
                        depth,
                        state,
                    );
                }
                Ok(None)
            }
        }
    }

    fn prove_or(
        &self,
        parts: &[CompoundTree],
        bindings: &Bindings,
        depth: usize,
        state: &mut ProofState,
    ) -> Outcome {
        for part in parts {
            state.tick(depth)?; // backtrack boundary between branches
            if let Some((confidence, extended)) =
                self.prove_goal(part, bindings, depth + 1, state)?
            {
                return Ok(Some((confidence * consts::CONFIDENCE_DECAY, extended)));
            }
        }
        Ok(None)
    }

    fn prove_not(
        &self,
        inner: &CompoundTree,
        bindings: &Bindings,
        depth: usize,
        state: &mut ProofState,
    ) -> Outcome {
        // Negation-as-failure is unsound in an open world: Not never
        // succeeds there.
        if !self.options.closed_world {
            state.record(ProofStep::op("not_skipped_open_world"));
            return Ok(None);
        }

        let unbound: Vec<String> = inner
            .variables()
            .into_iter()
            .filter(|name| {
                matches!(
                    super::unify::resolve(bindings, &PatternArg::Hole(name.clone())),
                    PatternArg::Hole(_)
                )
            })
            .collect();

        if unbound.is_empty() {
            return match self.prove_goal(inner, bindings, depth + 1, state)? {
                Some(_) => Ok(None),
                None => {
                    state.record(ProofStep::op("negation_as_failure"));
                    Ok(Some((consts::CONFIDENCE_DECAY, bindings.clone())))
                }
            };
        }

        // Existential witness search: find an assignment that makes the
        // inner goal unprovable.
        self.witness_search(inner, &unbound, bindings, depth, state)
    }

    fn witness_search(
        &self,
        inner: &CompoundTree,
        unbound: &[String],
        bindings: &Bindings,
        depth: usize,
        state: &mut ProofState,
    ) -> Outcome {
        if unbound.len() > 2 {
            // Grounding beyond two variables explodes; treat as
            // unprovable rather than guessing.
            return Ok(None);
        }

        let estimate = self.estimate_fanout(inner, bindings);
        let (mut max_domain, mut max_assignments) = witness_budget(estimate);
        if unbound.len() == 2 {
            max_domain /= 2;
            max_assignments = max_assignments.min(max_domain * 2);
        }

        let domain = self.store.entity_domain(ENTITY_DOMAIN_CAP);
        let domain: Vec<String> = domain
            .into_iter()
            .take(max_domain)
            .map(|id| self.store.label(id).to_string())
            .collect();
        if domain.is_empty() {
            return Ok(None);
        }

        let mut assignments_tried = 0usize;
        let mut try_assignment =
            |assignment: &[(&String, &String)], state: &mut ProofState| -> Outcome {
                let mut grounded = bindings.clone();
                for (var, value) in assignment {
                    grounded.insert((*var).clone(), PatternArg::Atom((*value).clone()));
                }
                match self.prove_goal(inner, &grounded, depth + 1, state)? {
                    Some(_) => Ok(None),
                    None => {
                        state.record(
                            ProofStep::op("not_witness").with_bindings(&grounded),
                        );
                        Ok(Some((consts::CONFIDENCE_DECAY, grounded)))
                    }
                }
            };

        if unbound.len() == 1 {
            let var = &unbound[0];
            for value in &domain {
                state.tick(depth)?;
                if assignments_tried >= max_assignments {
                    break;
                }
                assignments_tried += 1;
                if let Some(result) = try_assignment(&[(var, value)], state)? {
                    return Ok(Some(result));
                }
            }
        } else {
            let (va, vb) = (&unbound[0], &unbound[1]);
            'outer: for a in &domain {
                for b in &domain {
                    state.tick(depth)?;
                    if assignments_tried >= max_assignments {
                        break 'outer;
                    }
                    assignments_tried += 1;
                    if let Some(result) = try_assignment(&[(va, a), (vb, b)], state)? {
                        return Ok(Some(result));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Estimated KB fanout of a condition part under current bindings.
    /// Compound parts are unestimatable and sort last.
    fn estimate_fanout(&self, part: &CompoundTree, bindings: &Bindings) -> usize {
        match part {
            CompoundTree::Leaf(pattern) => {
                let current = substitute(&self.canonical(pattern), bindings);
                self.store
                    .count_candidates(&current.operator, current.ground_arg0())
            }
            _ => usize::MAX,
        }
    }
}

/// Number of ground argument slots under current bindings (reorder
/// tie-break: more grounded goes first).
fn grounded_rank(part: &CompoundTree, bindings: &Bindings) -> usize {
    match part {
        CompoundTree::Leaf(pattern) => substitute(pattern, bindings).ground_arity(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineOptions, ProofOptions, Rule};
    use crate::hdc::vocabulary::Vocabulary;
    use crate::hdc::{consts as hdc_consts, Strategy};
    use crate::plugin::PluginRegistry;
    use crate::registry::{DimensionRegistry, RegistryDocument};
    use crate::store::{ConceptStore, NewFact, Provenance};
    use std::sync::Arc;

    fn vocabulary() -> Arc<Vocabulary> {
        Arc::new(Vocabulary::new(Strategy::Dense, hdc_consts::GEOMETRY_TEST))
    }

    fn store_with(vocab: &Arc<Vocabulary>, facts: &[(&str, &[&str], i8)]) -> ConceptStore {
        let mut store = ConceptStore::new(Arc::clone(vocab));
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

    fn leaf(op: &str, args: &[&str]) -> CompoundTree {
        CompoundTree::Leaf(TriplePattern {
            operator: op.to_string(),
            args: args
                .iter()
                .map(|a| {
                    if let Some(name) = a.strip_prefix('?') {
                        PatternArg::Hole(name.to_string())
                    } else {
                        PatternArg::Atom((*a).to_string())
                    }
                })
                .collect(),
        })
    }

    #[test]
    fn proves_direct_fact() {
        let vocab = vocabulary();
        let store = store_with(&vocab, &[("IS_A", &["Dog", "Mammal"], existence::CERTAIN)]);
        let registry = DimensionRegistry::degraded();
        let plugins = PluginRegistry::new();
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        let result = engine.prove(&leaf("IS_A", &["Dog", "Mammal"]), &ProofOptions::default());
        assert!(result.valid);
        assert_eq!(result.method.as_deref(), Some("direct"));
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn proves_transitive_two_step_chain() {
        let vocab = vocabulary();
        let store = store_with(
            &vocab,
            &[
                ("before", &["Start", "Middle"], existence::CERTAIN),
                ("before", &["Middle", "End"], existence::CERTAIN),
            ],
        );
        let doc: RegistryDocument =
            toml::from_str("[relations.before]\ntransitive = true\n").expect("parses");
        let registry = DimensionRegistry::from_document(doc).expect("validates");
        let plugins = PluginRegistry::new();
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        let result = engine.prove(&leaf("before", &["Start", "End"]), &ProofOptions::default());
        assert!(result.valid);
        assert_eq!(result.method.as_deref(), Some("transitive"));
        assert_eq!(
            result
                .steps
                .iter()
                .filter(|s| s.operation == "transitive_link")
                .count(),
            2
        );
    }

    #[test]
    fn proves_inherited_property_three_step_chain() {
        let vocab = vocabulary();
        let store = store_with(
            &vocab,
            &[
                ("IS_A", &["Tea", "Beverage"], existence::CERTAIN),
                ("IS_A", &["Beverage", "Liquid"], existence::CERTAIN),
                ("hasProperty", &["Liquid", "Cold"], existence::CERTAIN),
            ],
        );
        let doc: RegistryDocument =
            toml::from_str("[relations.hasProperty]\ninheritable = true\n").expect("parses");
        let registry = DimensionRegistry::from_document(doc).expect("validates");
        let plugins = PluginRegistry::new();
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        let result = engine.prove(
            &leaf("hasProperty", &["Tea", "Cold"]),
            &ProofOptions::default(),
        );
        assert!(result.valid);
        assert_eq!(result.method.as_deref(), Some("inheritance"));
        assert_eq!(
            result
                .steps
                .iter()
                .filter(|s| s.operation == "inherited_link")
                .count(),
            3
        );
    }

    #[test]
    fn rule_chaining_binds_variables() {
        let vocab = vocabulary();
        let store = store_with(
            &vocab,
            &[
                ("IS_A", &["Rex", "Dog"], existence::CERTAIN),
                ("has", &["Rex", "Fur"], existence::CERTAIN),
            ],
        );
        let registry = DimensionRegistry::degraded();
        let plugins = PluginRegistry::new();
        let rule = Rule::new(
            "warm-blooded-things",
            CompoundTree::And(vec![leaf("IS_A", &["?x", "Dog"]), leaf("has", &["?x", "Fur"])]),
            TriplePattern {
                operator: "warmBlooded".to_string(),
                args: vec![PatternArg::Hole("x".to_string())],
            },
            &vocab,
        );
        let rules = vec![rule];
        let engine = Engine::new(&store, &registry, &plugins, &rules, EngineOptions::default());
        let result = engine.prove(&leaf("warmBlooded", &["Rex"]), &ProofOptions::default());
        assert!(result.valid);
        assert_eq!(result.method.as_deref(), Some("rule_chain"));
        assert!(result.confidence < 1.0);
    }

    #[test]
    fn and_backtracks_across_candidates() {
        let vocab = vocabulary();
        let store = store_with(
            &vocab,
            &[
                ("parentOf", &["Ann", "Bob"], existence::CERTAIN),
                ("parentOf", &["Ann", "Cid"], existence::CERTAIN),
                ("likes", &["Cid", "Music"], existence::CERTAIN),
            ],
        );
        let registry = DimensionRegistry::degraded();
        let plugins = PluginRegistry::new();
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        // First candidate Bob fails the second conjunct; Cid succeeds.
        let goal = CompoundTree::And(vec![
            leaf("parentOf", &["Ann", "?c"]),
            leaf("likes", &["?c", "Music"]),
        ]);
        let result = engine.prove(&goal, &ProofOptions::default());
        assert!(result.valid);
        let bindings = result.bindings.expect("bindings");
        assert_eq!(bindings.get("c").map(String::as_str), Some("Cid"));
    }

    #[test]
    fn or_takes_first_successful_branch() {
        let vocab = vocabulary();
        let store = store_with(&vocab, &[("IS_A", &["Rex", "Dog"], existence::CERTAIN)]);
        let registry = DimensionRegistry::degraded();
        let plugins = PluginRegistry::new();
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        let goal = CompoundTree::Or(vec![
            leaf("IS_A", &["Rex", "Cat"]),
            leaf("IS_A", &["Rex", "Dog"]),
        ]);
        let result = engine.prove(&goal, &ProofOptions::default());
        assert!(result.valid);
        assert!((result.confidence - consts::CONFIDENCE_DECAY).abs() < 1e-9);
    }

    #[test]
    fn not_fails_in_open_world() {
        let vocab = vocabulary();
        let store = store_with(&vocab, &[]);
        let registry = DimensionRegistry::degraded();
        let plugins = PluginRegistry::new();
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        let goal = CompoundTree::Not(Box::new(leaf("IS_A", &["Rex", "Cat"])));
        let result = engine.prove(&goal, &ProofOptions::default());
        assert!(!result.valid, "NAF must not fire without CWA");
    }

    #[test]
    fn not_succeeds_under_cwa_when_unprovable() {
        let vocab = vocabulary();
        let store = store_with(&vocab, &[("IS_A", &["Rex", "Dog"], existence::CERTAIN)]);
        let registry = DimensionRegistry::degraded();
        let plugins = PluginRegistry::new();
        let engine = Engine::new(
            &store,
            &registry,
            &plugins,
            &[],
            EngineOptions {
                closed_world: true,
                ..Default::default()
            },
        );
        let goal = CompoundTree::Not(Box::new(leaf("IS_A", &["Rex", "Cat"])));
        let result = engine.prove(&goal, &ProofOptions::default());
        assert!(result.valid);
        let provable = CompoundTree::Not(Box::new(leaf("IS_A", &["Rex", "Dog"])));
        assert!(!engine.prove(&provable, &ProofOptions::default()).valid);
    }

    #[test]
    fn witness_search_finds_unprovable_assignment() {
        let vocab = vocabulary();
        let store = store_with(
            &vocab,
            &[
                ("likes", &["Ann", "Music"], existence::CERTAIN),
                ("IS_A", &["Bob", "Person"], existence::CERTAIN),
            ],
        );
        let registry = DimensionRegistry::degraded();
        let plugins = PluginRegistry::new();
        let engine = Engine::new(
            &store,
            &registry,
            &plugins,
            &[],
            EngineOptions {
                closed_world: true,
                ..Default::default()
            },
        );
        // Somebody in the domain does not like music.
        let goal = CompoundTree::Not(Box::new(leaf("likes", &["?x", "Music"])));
        let result = engine.prove(&goal, &ProofOptions::default());
        assert!(result.valid);
        assert!(result
            .steps
            .iter()
            .any(|s| s.operation == "not_witness"));
    }

    #[test]
    fn explicit_negation_blocks_proof() {
        let vocab = vocabulary();
        let store = store_with(
            &vocab,
            &[
                ("flies", &["Penguin"], existence::CERTAIN),
                ("NOT_flies", &["Penguin"], existence::CERTAIN),
            ],
        );
        let registry = DimensionRegistry::degraded();
        let plugins = PluginRegistry::new();
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        let result = engine.prove(&leaf("flies", &["Penguin"]), &ProofOptions::default());
        assert!(!result.valid);
        assert_eq!(result.reason, Some(FailReason::ConditionNegated));
    }

    #[test]
    fn depth_guard_aborts_cleanly() {
        let vocab = vocabulary();
        let store = store_with(&vocab, &[("IS_A", &["A", "B"], existence::CERTAIN)]);
        let registry = DimensionRegistry::degraded();
        let plugins = PluginRegistry::new();
        // A rule that only recurses into itself.
        let rule = Rule::new(
            "self-loop",
            leaf("loops", &["?x"]),
            TriplePattern {
                operator: "loops".to_string(),
                args: vec![PatternArg::Hole("x".to_string())],
            },
            &vocab,
        );
        let rules = vec![rule];
        let engine = Engine::new(&store, &registry, &plugins, &rules, EngineOptions::default());
        let result = engine.prove(&leaf("loops", &["A"]), &ProofOptions::default());
        assert!(!result.valid);
        // The cycle guard or a resource guard stops it, never a hang.
    }

    #[test]
    fn proof_is_deterministic() {
        let vocab = vocabulary();
        let store = store_with(
            &vocab,
            &[
                ("parentOf", &["Ann", "Bob"], existence::CERTAIN),
                ("parentOf", &["Ann", "Cid"], existence::CERTAIN),
                ("likes", &["Cid", "Music"], existence::CERTAIN),
                ("likes", &["Bob", "Music"], existence::CERTAIN),
            ],
        );
        let registry = DimensionRegistry::degraded();
        let plugins = PluginRegistry::new();
        let engine = Engine::new(&store, &registry, &plugins, &[], EngineOptions::default());
        let goal = CompoundTree::And(vec![
            leaf("parentOf", &["Ann", "?c"]),
            leaf("likes", &["?c", "Music"]),
        ]);
        let a = engine.prove(&goal, &ProofOptions::default());
        let b = engine.prove(&goal, &ProofOptions::default());
        assert_eq!(a.valid, b.valid);
        assert_eq!(
            a.steps.iter().map(|s| s.operation.clone()).collect::<Vec<_>>(),
            b.steps.iter().map(|s| s.operation.clone()).collect::<Vec<_>>()
        );
        assert_eq!(a.bindings, b.bindings);
    }
}
