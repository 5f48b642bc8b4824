//! Unification over triple patterns.
//!
//! Bindings map hole names to [`PatternArg`]s: an `Atom` value grounds the
//! variable, a `Hole` value aliases it to another variable (alias chains
//! are resolved on lookup). A `BTreeMap` keeps iteration and fingerprints
//! stable. Backtracking clones a fresh map per candidate branch, so no
//! undo bookkeeping is needed.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::ast::{PatternArg, TriplePattern};
use crate::store::{ConceptStore, Fact};

/// Variable bindings for one proof branch.
pub type Bindings = BTreeMap<String, PatternArg>;

/// Resolve an argument through the bindings, following alias chains.
pub fn resolve(bindings: &Bindings, arg: &PatternArg) -> PatternArg {
    let mut current = arg.clone();
    let mut hops = 0usize;
    while let PatternArg::Hole(name) = &current {
        match bindings.get(name) {
            Some(next) => {
                current = next.clone();
                hops += 1;
                // Alias cycles cannot ground; stop following.
                if hops > bindings.len() {
                    return current;
                }
            }
            None => break,
        }
    }
    current
}

/// Bind `var` to `value`, respecting existing bindings. Returns false on
/// conflict.
fn bind(bindings: &mut Bindings, var: &str, value: PatternArg) -> bool {
    match resolve(bindings, &PatternArg::Hole(var.to_string())) {
        PatternArg::Atom(existing) => match resolve(bindings, &value) {
            PatternArg::Atom(new) => existing == new,
            PatternArg::Hole(other) => {
                bindings.insert(other, PatternArg::Atom(existing));
                true
            }
        },
        PatternArg::Hole(end) => {
            let resolved = resolve(bindings, &value);
            if resolved == PatternArg::Hole(end.clone()) {
                return true;
            }
            bindings.insert(end, resolved);
            true
        }
    }
}

/// Unify two argument slots under the given bindings.
pub fn unify_args(a: &PatternArg, b: &PatternArg, bindings: &mut Bindings) -> bool {
    let ra = resolve(bindings, a);
    let rb = resolve(bindings, b);
    match (&ra, &rb) {
        (PatternArg::Atom(x), PatternArg::Atom(y)) => x == y,
        (PatternArg::Hole(var), _) => bind(bindings, var, rb),
        (_, PatternArg::Hole(var)) => bind(bindings, var, ra),
    }
}

/// Unify a goal pattern against a stored fact. Operators must already be
/// canonicalized by the caller. Returns the extended bindings on success.
pub fn unify_fact(
    pattern: &TriplePattern,
    fact: &Fact,
    store: &ConceptStore,
    base: &Bindings,
) -> Option<Bindings> {
    if pattern.operator != fact.operator || pattern.args.len() != fact.args.len() {
        return None;
    }
    let mut bindings = base.clone();
    for (arg, &fact_arg) in pattern.args.iter().zip(fact.args.iter()) {
        let fact_atom = PatternArg::Atom(store.label(fact_arg).to_string());
        if !unify_args(arg, &fact_atom, &mut bindings) {
            return None;
        }
    }
    Some(bindings)
}

/// Unify two patterns (e.g. a rule conclusion against a goal). Both sides
/// may contain holes; callers must rename one side's variables apart
/// first.
pub fn unify_patterns(
    a: &TriplePattern,
    b: &TriplePattern,
    base: &Bindings,
) -> Option<Bindings> {
    if a.operator != b.operator || a.args.len() != b.args.len() {
        return None;
    }
    let mut bindings = base.clone();
    for (x, y) in a.args.iter().zip(b.args.iter()) {
        if !unify_args(x, y, &mut bindings) {
            return None;
        }
    }
    Some(bindings)
}

/// Apply bindings to a pattern, resolving every argument.
pub fn substitute(pattern: &TriplePattern, bindings: &Bindings) -> TriplePattern {
    TriplePattern {
        operator: pattern.operator.clone(),
        args: pattern
            .args
            .iter()
            .map(|arg| resolve(bindings, arg))
            .collect(),
    }
}

/// Rename every hole in a pattern with a depth-scoped suffix so rule
/// variables cannot collide with goal variables.
pub fn rename_apart(pattern: &TriplePattern, tag: usize) -> TriplePattern {
    TriplePattern {
        operator: pattern.operator.clone(),
        args: pattern
            .args
            .iter()
            .map(|arg| match arg {
                PatternArg::Hole(name) => PatternArg::Hole(format!("{name}\u{1}{tag}")),
                ground => ground.clone(),
            })
            .collect(),
    }
}

/// Stable 64-bit fingerprint of the bindings content.
pub fn fingerprint_bindings(bindings: &Bindings) -> u64 {
    let mut hasher = Sha256::new();
    for (key, value) in bindings {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        match value {
            PatternArg::Atom(s) => {
                hasher.update([b'a']);
                hasher.update(s.as_bytes());
            }
            PatternArg::Hole(s) => {
                hasher.update([b'h']);
                hasher.update(s.as_bytes());
            }
        }
        hasher.update([1u8]);
    }
    digest_prefix(&hasher.finalize())
}

/// Fingerprint of a goal pattern under bindings (cycle detection and
/// memoization key).
pub fn goal_fingerprint(pattern: &TriplePattern, bindings: &Bindings) -> u64 {
    let substituted = substitute(pattern, bindings);
    let mut hasher = Sha256::new();
    hasher.update(substituted.operator.as_bytes());
    for arg in &substituted.args {
        hasher.update([0u8]);
        match arg {
            PatternArg::Atom(s) => {
                hasher.update([b'a']);
                hasher.update(s.as_bytes());
            }
            PatternArg::Hole(s) => {
                hasher.update([b'h']);
                hasher.update(s.as_bytes());
            }
        }
    }
    digest_prefix(&hasher.finalize())
}

fn digest_prefix(digest: &[u8]) -> u64 {
    u64::from_le_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hole(name: &str) -> PatternArg {
        PatternArg::Hole(name.to_string())
    }

    fn atom(name: &str) -> PatternArg {
        PatternArg::Atom(name.to_string())
    }

    #[test]
    fn unify_binds_holes_to_atoms() {
        let mut b = Bindings::new();
        assert!(unify_args(&hole("x"), &atom("Dog"), &mut b));
        assert_eq!(resolve(&b, &hole("x")), atom("Dog"));
        // Re-unifying with the same atom succeeds, a different one fails.
        assert!(unify_args(&hole("x"), &atom("Dog"), &mut b));
        assert!(!unify_args(&hole("x"), &atom("Cat"), &mut b));
    }

    #[test]
    fn alias_chains_resolve() {
        let mut b = Bindings::new();
        assert!(unify_args(&hole("x"), &hole("y"), &mut b));
        assert!(unify_args(&hole("y"), &atom("Dog"), &mut b));
        assert_eq!(resolve(&b, &hole("x")), atom("Dog"));
    }

    #[test]
    fn pattern_unification_respects_shared_variables() {
        let a = TriplePattern {
            operator: "parentOf".to_string(),
            args: vec![hole("x"), hole("x")],
        };
        let reflexive = TriplePattern::ground("parentOf", &["Ann", "Ann"]);
        assert!(unify_patterns(&a, &reflexive, &Bindings::new()).is_some());
        let differing = TriplePattern::ground("parentOf", &["Ann", "Bob"]);
        assert!(unify_patterns(&a, &differing, &Bindings::new()).is_none());
    }

    #[test]
    fn substitution_grounds_patterns() {
        let mut b = Bindings::new();
        assert!(unify_args(&hole("x"), &atom("Dog"), &mut b));
        let p = TriplePattern {
            operator: "isa".to_string(),
            args: vec![hole("x"), atom("Mammal")],
        };
        let s = substitute(&p, &b);
        assert!(s.is_ground());
        assert_eq!(s.to_string(), "isa Dog Mammal");
    }

    #[test]
    fn rename_apart_avoids_capture() {
        let p = TriplePattern {
            operator: "isa".to_string(),
            args: vec![hole("x"), atom("Mammal")],
        };
        let renamed = rename_apart(&p, 3);
        assert_ne!(renamed.args[0], p.args[0]);
        assert_eq!(renamed.args[1], p.args[1]);
    }

    #[test]
    fn fingerprints_are_stable_and_discriminating() {
        let mut b1 = Bindings::new();
        assert!(unify_args(&hole("x"), &atom("Dog"), &mut b1));
        let mut b2 = Bindings::new();
        assert!(unify_args(&hole("x"), &atom("Cat"), &mut b2));
        assert_ne!(fingerprint_bindings(&b1), fingerprint_bindings(&b2));
        assert_eq!(fingerprint_bindings(&b1), fingerprint_bindings(&b1.clone()));
    }
}
