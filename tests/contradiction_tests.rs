//! Contradiction detection over live sessions.

use sys2::contradiction::{CardinalityConstraint, ContradictionDetector, ContradictionKind};
use sys2::{Config, Session, SessionError, Sys2Error};

fn session() -> Session {
    Session::new(Config::for_tests()).expect("session builds")
}

#[test]
fn disjoint_assertion_is_rejected_up_front() {
    let mut s = session();
    s.run("IS_A Dog Mammal\nDISJOINT_WITH Mammal Fish").expect("runs");
    let err = s.run("IS_A Dog Fish").expect_err("must reject");
    match err {
        Sys2Error::Session(SessionError::ContradictionRejected { details }) => {
            assert!(details.contains("disjoint"), "details: {details}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(s.store().get_best_existence_fact("IS_A", &["Dog", "Fish"]).is_none());
}

#[test]
fn builtin_biological_pairs_apply_without_declarations() {
    let mut s = session();
    s.run("IS_A Flipper Mammal").expect("runs");
    let err = s.run("IS_A Flipper Fish").expect_err("must reject");
    assert!(matches!(
        err,
        Sys2Error::Session(SessionError::ContradictionRejected { .. })
    ));
}

#[test]
fn functional_relation_rejects_second_object() {
    let mut s = session();
    s.run("BORN_IN Ada London").expect("runs");
    let err = s.run("BORN_IN Ada Paris").expect_err("must reject");
    assert!(matches!(
        err,
        Sys2Error::Session(SessionError::ContradictionRejected { .. })
    ));

    // An EQUIVALENT_TO link makes the second object admissible.
    let mut s = session();
    s.run("BORN_IN Ada London\nEQUIVALENT_TO London TheBigSmoke").expect("runs");
    s.run("BORN_IN Ada TheBigSmoke").expect("equivalent objects are fine");
}

#[test]
fn taxonomic_cycles_are_rejected() {
    let mut s = session();
    s.run("IS_A A B\nIS_A B C").expect("runs");
    let err = s.run("IS_A C A").expect_err("closing the loop must fail");
    assert!(matches!(
        err,
        Sys2Error::Session(SessionError::ContradictionRejected { .. })
    ));
    let err = s.run("IS_A D D").expect_err("self-loop must fail");
    assert!(matches!(
        err,
        Sys2Error::Session(SessionError::ContradictionRejected { .. })
    ));
}

#[test]
fn detect_all_reports_existing_inconsistencies() {
    let mut s = session();
    // Assemble an inconsistent KB piecewise: each insert alone passes
    // the speculative check because the disjointness arrives last.
    s.run("IS_A Rex Dog\nIS_A Dog Mammal\nIS_A Rex Trout\nIS_A Trout Fish")
        .expect("runs");
    s.run("DISJOINT_WITH Dog Trout").expect("runs");

    let detector = ContradictionDetector::new();
    let found = detector.detect_all(s.store(), s.registry());
    assert!(!found.is_empty());
    // Rex is in Mammal and Fish (builtin pair) and in the declared
    // disjoint pair Dog/Trout.
    assert!(found.iter().any(|c| c.entity == "Rex"));
    assert!(found.iter().all(|c| !c.facts.is_empty() || !c.suggestions.is_empty()));
}

#[test]
fn cardinality_constraints_are_enforced_speculatively() {
    let mut s = session();
    let mut detector = ContradictionDetector::new();
    detector.set_cardinality(
        "hasWheel",
        CardinalityConstraint {
            min: None,
            max: Some(2),
        },
    );
    s.run("hasWheel Bike Front\nhasWheel Bike Rear").expect("runs");

    let conflicts = detector.would_contradict(
        s.store(),
        s.registry(),
        "hasWheel",
        &["Bike".to_string(), "Spare".to_string()],
    );
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].kind, ContradictionKind::CardinalityViolation);
}

#[test]
fn contradiction_reports_carry_causes_and_suggestions() {
    let mut s = session();
    s.run("IS_A Dog Mammal\nDISJOINT_WITH Mammal Fish").expect("runs");
    let detector = ContradictionDetector::new();
    let conflicts = detector.would_contradict(
        s.store(),
        s.registry(),
        "IS_A",
        &["Dog".to_string(), "Fish".to_string()],
    );
    assert!(!conflicts.is_empty());
    let c = &conflicts[0];
    assert!(!c.facts.is_empty(), "causing facts listed");
    assert!(!c.suggestions.is_empty(), "resolution suggested");
    assert_eq!(c.entity, "Dog");
}

#[test]
fn hook_fires_on_contradiction_rejection() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let mut s = session();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    s.register_hook(Box::new(move |event| {
        if matches!(event, sys2::store::HookEvent::Contradiction { .. }) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(vec![])
    }));
    s.run("IS_A Dog Mammal\nDISJOINT_WITH Mammal Fish").expect("runs");
    let _ = s.run("IS_A Dog Fish").expect_err("rejected");
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}
