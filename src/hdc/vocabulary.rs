//! Vocabulary: deterministic name→vector interning plus position markers.
//!
//! `get_or_create` maps a symbolic name to its strategy-local vector,
//! creating it deterministically on first use. The vocabulary also holds
//! the orthogonal position vectors `Pos0..Pos20` used to tag argument
//! slots (Pos0 is the operator slot). Both caches are keyed per
//! (strategy, geometry) by construction since a vocabulary is created for
//! exactly one of each; clearing is permitted only at session boundaries.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{consts, Strategy, Vector};

/// Reserved name prefix for position vectors. Kept out of the ordinary
/// name space so a DSL concept can never collide with a slot marker.
const POSITION_PREFIX: &str = "\u{1}pos";

/// Strategy-local vector vocabulary.
pub struct Vocabulary {
    strategy: Strategy,
    geometry: usize,
    names: RwLock<HashMap<String, Vector>>,
    positions: RwLock<HashMap<usize, Vector>>,
}

impl Vocabulary {
    /// Create an empty vocabulary for one strategy and geometry.
    pub fn new(strategy: Strategy, geometry: usize) -> Self {
        Self {
            strategy,
            geometry,
            names: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
        }
    }

    /// Vocabulary with the default dense geometry.
    pub fn default_dense() -> Self {
        Self::new(Strategy::Dense, consts::GEOMETRY_DEFAULT)
    }

    /// The strategy this vocabulary serves.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The geometry this vocabulary serves.
    pub fn geometry(&self) -> usize {
        self.geometry
    }

    /// Return the vector for `name`, creating it deterministically if
    /// absent. Two vocabularies with the same strategy and geometry
    /// always agree on the vector for a given name.
    pub fn get_or_create(&self, name: &str) -> Vector {
        if let Some(v) = self.names.read().get(name) {
            return v.clone();
        }
        let v = Vector::from_name(name, self.geometry, self.strategy);
        self.names
            .write()
            .entry(name.to_string())
            .or_insert(v)
            .clone()
    }

    /// Look up a name without creating it.
    pub fn get(&self, name: &str) -> Option<Vector> {
        self.names.read().get(name).cloned()
    }

    /// The position vector `Pos{index}`. Index 0 marks the operator slot;
    /// 1..=[`consts::POSITION_COUNT`] mark argument slots. Cached per
    /// index.
    pub fn position(&self, index: usize) -> Vector {
        debug_assert!(index <= consts::POSITION_COUNT, "position index {index} out of range");
        if let Some(v) = self.positions.read().get(&index) {
            return v.clone();
        }
        let v = Vector::from_name(
            &format!("{POSITION_PREFIX}{index}"),
            self.geometry,
            self.strategy,
        );
        self.positions.write().entry(index).or_insert(v).clone()
    }

    /// `bind(v, Pos_k)`: tag a vector with argument slot `k`.
    pub fn positioned(&self, v: &Vector, k: usize) -> Vector {
        // Position vectors share this vocabulary's strategy and geometry,
        // so the bind cannot fail.
        v.bind(&self.position(k))
            .expect("position vectors always match the vocabulary shape")
    }

    /// Number of interned names.
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// True when no names have been interned yet.
    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }

    /// Drop all cached vectors. Only valid at session boundaries or on
    /// strategy change; vectors handed out earlier remain valid values.
    pub fn clear(&self) {
        self.names.write().clear();
        self.positions.write().clear();
    }
}

impl std::fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vocabulary")
            .field("strategy", &self.strategy)
            .field("geometry", &self.geometry)
            .field("names", &self.names.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vocabulary {
        Vocabulary::new(Strategy::Dense, consts::GEOMETRY_TEST)
    }

    #[test]
    fn get_or_create_is_stable() {
        let v = vocab();
        let a = v.get_or_create("Dog");
        let b = v.get_or_create("Dog");
        assert_eq!(a, b);
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn two_vocabularies_agree() {
        let a = vocab().get_or_create("Dog");
        let b = vocab().get_or_create("Dog");
        assert_eq!(a, b);
    }

    #[test]
    fn positions_are_pairwise_orthogonal() {
        let v = vocab();
        for i in 1..=consts::POSITION_COUNT {
            for j in (i + 1)..=consts::POSITION_COUNT {
                let sim = v
                    .position(i)
                    .similarity(&v.position(j))
                    .unwrap();
                assert!(
                    sim.abs() < consts::ORTHOGONALITY_THRESHOLD,
                    "Pos{i} vs Pos{j}: sim={sim}"
                );
            }
        }
    }

    #[test]
    fn positioned_round_trips() {
        let v = vocab();
        let dog = v.get_or_create("Dog");
        let tagged = v.positioned(&dog, 3);
        assert_ne!(tagged, dog);
        let recovered = tagged.bind(&v.position(3)).unwrap();
        assert_eq!(recovered, dog);
    }

    #[test]
    fn position_names_cannot_collide_with_concepts() {
        let v = vocab();
        let pos1 = v.position(1);
        let near_miss = v.get_or_create("pos1");
        assert_ne!(pos1, near_miss);
    }

    #[test]
    fn clear_resets_cache() {
        let v = vocab();
        let before = v.get_or_create("Dog");
        v.clear();
        assert!(v.is_empty());
        // Deterministic generation: same vector after the cache is rebuilt.
        assert_eq!(v.get_or_create("Dog"), before);
    }
}
