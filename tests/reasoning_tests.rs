//! End-to-end reasoning scenarios over full sessions.

use std::io::Write;

use sys2::engine::QuerySource;
use sys2::{existence, Config, QueryStatus, Session, Sys2Error};

/// Session with the test geometry and no registry document.
fn session() -> Session {
    Session::new(Config::for_tests()).expect("session builds")
}

/// Session whose dimension registry is loaded from the given TOML text.
fn session_with_registry(registry_toml: &str) -> Session {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(registry_toml.as_bytes()).expect("writes");
    let mut config = Config::for_tests();
    config.registry.path = Some(file.path().to_path_buf());
    let session = Session::new(config).expect("session builds");
    // The registry is loaded eagerly, so the file may go away now.
    drop(file);
    session
}

#[test]
fn scenario_isa_chain_is_derived_and_capped() {
    let mut s = session();
    s.run("IS_A Dog Mammal\nIS_A Mammal Animal").expect("runs");

    let result = s.ask("Dog IS_A Animal").expect("asks");
    assert!(result.found);
    assert_eq!(result.existence, Some(64));
    assert_eq!(result.source, Some(QuerySource::Derived));
    let chain = result.chain.expect("chain present");
    assert_eq!(chain.len(), 2);

    // The chain names the two supporting facts in walk order.
    let first = s.store().fact(chain[0]).expect("fact");
    let second = s.store().fact(chain[1]).expect("fact");
    assert_eq!(s.store().label(first.args[0]), "Dog");
    assert_eq!(s.store().label(second.args[1]), "Animal");
}

#[test]
fn scenario_disjointness_makes_membership_impossible() {
    let mut s = session();
    s.run("IS_A Dog Mammal\nDISJOINT_WITH Mammal Fish").expect("runs");

    let result = s.ask("Dog IS_A Fish").expect("asks");
    assert!(!result.found);
    assert_eq!(result.status, Some(QueryStatus::Impossible));
    let conflicts = result.conflicts.expect("conflicts present");
    assert_eq!(conflicts.len(), 2);
    let operators: Vec<String> = conflicts
        .iter()
        .map(|id| s.store().fact(*id).expect("fact").operator.clone())
        .collect();
    assert!(operators.contains(&"IS_A".to_string()));
    assert!(operators.contains(&"DISJOINT_WITH".to_string()));
}

#[test]
fn scenario_unknown_entity_is_open_world() {
    let mut s = session();
    let result = s.ask("Unicorn IS_A Mammal").expect("asks");
    assert!(!result.found);
    assert_eq!(result.status, Some(QueryStatus::Unknown));
    assert!(result.conflicts.is_none());
    assert!(result.existence.is_none());
}

#[test]
fn scenario_contradictory_batch_is_rejected_atomically() {
    let mut s = session();
    s.run("theory House {\n  mutuallyExclusive hasState Open Closed\n}")
        .expect("theory loads");
    s.learn("hasState Door Open").expect("learns");

    let err = s
        .learn("locatedIn Door Kitchen\nhasState Door Closed")
        .expect_err("batch must be rejected");
    assert!(matches!(err, Sys2Error::Session(_)));

    // First fact survives, nothing from the rejected batch does.
    assert!(s
        .store()
        .get_best_existence_fact("hasState", &["Door", "Open"])
        .is_some());
    assert!(s
        .store()
        .get_best_existence_fact("locatedIn", &["Door", "Kitchen"])
        .is_none());
    assert!(s
        .store()
        .get_best_existence_fact("hasState", &["Door", "Closed"])
        .is_none());
}

#[test]
fn scenario_transitive_proof_with_two_step_chain() {
    let mut s = session_with_registry("[relations.before]\ntransitive = true\n");
    s.run("before Start Middle\nbefore Middle End").expect("runs");

    let result = s.run("@p prove before Start End").expect("proves");
    let proof = result.last_proof.expect("proof recorded");
    assert!(proof.valid);
    assert_eq!(
        proof
            .steps
            .iter()
            .filter(|step| step.operation == "transitive_link")
            .count(),
        2
    );
}

#[test]
fn scenario_inherited_property_with_three_step_chain() {
    let mut s = session_with_registry("[relations.hasProperty]\ninheritable = true\n");
    s.run("isa Tea Beverage\nisa Beverage Liquid\nhasProperty Liquid Cold")
        .expect("runs");

    let result = s.run("@p prove hasProperty Tea Cold").expect("proves");
    let proof = result.last_proof.expect("proof recorded");
    assert!(proof.valid);
    assert_eq!(
        proof
            .steps
            .iter()
            .filter(|step| step.operation == "inherited_link")
            .count(),
        3
    );
}

// ----------------------------------------------------------------------------
// Invariants
// ----------------------------------------------------------------------------

#[test]
fn existence_monotonicity_through_session() {
    let mut s = session();
    s.run("IS_A Dog Mammal").expect("runs");
    // learn would assert at UNPROVEN; the CERTAIN record must win.
    s.learn("isa Dog Mammal").expect("learns");
    assert_eq!(
        s.store()
            .get_best_existence_fact("IS_A", &["Dog", "Mammal"])
            .expect("stored")
            .existence,
        existence::CERTAIN
    );
}

#[test]
fn open_world_purity_ask_never_mutates() {
    let mut s = session();
    s.run("IS_A Dog Mammal\nIS_A Mammal Animal").expect("runs");
    let version = s.store().kb_version();
    let count = s.store().fact_count();
    let concepts = s.store().concept_count();

    let _ = s.ask("Dog IS_A Animal").expect("asks");
    let _ = s.ask("Unicorn IS_A Dragon").expect("asks");
    let _ = s.ask("Dog IS_A Fish").expect("asks");

    assert_eq!(s.store().kb_version(), version);
    assert_eq!(s.store().fact_count(), count);
    assert_eq!(s.store().concept_count(), concepts);
}

#[test]
fn derived_results_never_exceed_demonstrated() {
    let mut s = session();
    s.run("IS_A_CERTAIN Dog Mammal\nIS_A_CERTAIN Mammal Animal\nIS_A_CERTAIN Animal LivingThing")
        .expect("runs");
    for query in ["Dog IS_A Animal", "Dog IS_A LivingThing", "Mammal IS_A LivingThing"] {
        let result = s.ask(query).expect("asks");
        assert!(result.found, "{query} should derive");
        assert!(
            result.existence.expect("existence") <= existence::DEMONSTRATED,
            "{query} exceeded the derived cap"
        );
    }
}

#[test]
fn index_consistency_after_mixed_mutations() {
    let mut s = session();
    s.run("IS_A Dog Mammal\nIS_A Cat Mammal\nhas Dog Tail\nhasState Door Open")
        .expect("runs");
    s.run("retract has Dog Tail").expect("runs");
    s.run("forget Door").expect("runs");
    s.run("IS_A Fish Animal").expect("runs");
    s.store().check_index_consistency().expect("indexes consistent");
}

#[test]
fn proofs_are_deterministic_across_runs() {
    let build = || {
        let mut s = session();
        s.run("parentOf Ann Bob\nparentOf Ann Cid\nlikes Cid Music\nlikes Bob Art")
            .expect("runs");
        s.run("@r rule (And (parentOf Ann ?c) (likes ?c Music)) (musicalChild ?c yes)")
            .expect("rule");
        let result = s.run("@p prove musicalChild ?who yes").expect("proves");
        result.last_proof.expect("proof recorded")
    };
    let a = build();
    let b = build();
    assert_eq!(a.valid, b.valid);
    assert_eq!(a.bindings, b.bindings);
    assert_eq!(
        a.steps.iter().map(|s| s.operation.clone()).collect::<Vec<_>>(),
        b.steps.iter().map(|s| s.operation.clone()).collect::<Vec<_>>(),
    );
}

#[test]
fn value_type_inheritance_proves_possession_of_type() {
    let mut s = session();
    s.run("has Alice Rex\nIS_A Rex Dog\nIS_A Dog Pet").expect("runs");
    let result = s.run("@p prove has Alice Pet").expect("proves");
    let proof = result.last_proof.expect("proof recorded");
    assert!(proof.valid);
    assert!(proof
        .steps
        .iter()
        .any(|step| step.operation == "value_type_link"));
}

#[test]
fn negation_as_failure_requires_closed_world() {
    let mut s = session();
    s.run("IS_A Rex Dog").expect("runs");
    s.run("@r rule (And (IS_A ?x Dog) (Not (dangerous ?x yes))) (pettable ?x yes)")
        .expect("rule");

    // Open world: the Not part cannot succeed.
    let open = s.run("@p1 prove pettable Rex yes").expect("proves");
    assert!(!open.last_proof.expect("proof").valid);

    // Closed world: unprovable danger means pettable.
    s.set_closed_world(true);
    let closed = s.run("@p2 prove pettable Rex yes").expect("proves");
    assert!(closed.last_proof.expect("proof").valid);
}

#[test]
fn rule_chain_falls_back_when_direct_lookup_misses() {
    let mut s = session();
    s.run("IS_A Socrates Human").expect("runs");
    s.run("@mortality rule (IS_A ?x Human) (mortal ?x yes)").expect("rule");
    let result = s.run("@p prove mortal Socrates yes").expect("proves");
    let proof = result.last_proof.expect("proof recorded");
    assert!(proof.valid);
    assert_eq!(proof.method.as_deref(), Some("rule_chain"));
    assert!(proof.confidence < 1.0, "rule chaining decays confidence");
}

#[test]
fn timeouts_return_invalid_not_partial() {
    use sys2::ProofOptions;
    use std::time::Duration;

    let mut s = session();
    // A self-recursive rule forces the prover to grind.
    s.run("@loop rule (chased ?x ?y) (chased ?y ?x)").expect("rule");
    s.run("chased Cat Mouse").expect("runs");
    let goal = sys2::CompoundTree::Leaf(sys2::TriplePattern::ground(
        "chased",
        &["Mouse", "Elephant"],
    ));
    let proof = s.prove(
        &goal,
        Some(ProofOptions {
            timeout: Duration::from_millis(0),
            max_depth: 64,
            max_steps: u64::MAX,
        }),
    );
    assert!(!proof.valid);
    assert!(proof.reason.is_some());
}
