//! # Hyperdimensional Vector Algebra
//!
//! Strategy-pluggable vector operations: bind, unbind, bundle, and
//! similarity over two representations:
//!
//! - **Dense**: a fixed-width binary vector (default 32,768 bits) packed
//!   into `u64` words. Bind is bitwise XOR (commutative, self-inverse,
//!   distributive over bundle), bundle is bitwise majority with a
//!   deterministic tie-break, similarity is Hamming-normalized cosine in
//!   `[-1, 1]`.
//! - **Sparse**: a sorted set of `(axis, exponent)` terms with an explicit
//!   maximum size. Bind adds exponents modulo a fixed order (terms cancel
//!   at zero), unbind subtracts, similarity is normalized overlap.
//!
//! All operations are pure; vectors are immutable once constructed, and
//! identical inputs yield bit-identical outputs across runs. Vectors carry
//! their strategy in the enum discriminant, so mixed-strategy operations
//! fail with [`HdcError::StrategyMismatch`] instead of producing garbage.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::HdcError;

pub mod vocabulary;

/// Calibration constants for the vector layer.
pub mod consts {
    /// Default dense geometry in bits.
    pub const GEOMETRY_DEFAULT: usize = 32_768;

    /// Small geometry for tests (keeps similarity statistics meaningful
    /// while staying fast).
    pub const GEOMETRY_TEST: usize = 2_048;

    /// Number of position vectors held by the vocabulary (Pos1..Pos20).
    /// Pos0 marks the operator slot.
    pub const POSITION_COUNT: usize = 20;

    /// Two dense vectors are considered orthogonal below this absolute
    /// similarity.
    pub const ORTHOGONALITY_THRESHOLD: f64 = 0.55;

    /// Minimum similarity for the holographic fast path to shortlist a KB
    /// candidate. Hits are always validated symbolically afterwards.
    pub const UNBIND_MIN_SIMILARITY: f64 = 0.25;

    /// Confidence of a direct KB match.
    pub const CONFIDENCE_DIRECT: f64 = 1.0;

    /// Multiplicative confidence decay per derivation layer (rule chain,
    /// Or-branch).
    pub const CONFIDENCE_DECAY: f64 = 0.9;

    /// Number of terms a sparse vector is generated with.
    pub const SPARSE_TERMS: usize = 64;

    /// Maximum number of terms a sparse vector may hold after bundling.
    pub const SPARSE_MAX_TERMS: usize = 256;

    /// Exponent modulus for sparse bind/unbind. Prime, so repeated binding
    /// cycles through the full residue group.
    pub const SPARSE_EXP_ORDER: i32 = 257;

    /// Axis space for sparse term generation.
    pub const SPARSE_AXIS_SPACE: u32 = 1 << 20;
}

/// Which representation a vector (or a vocabulary) uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Packed binary vector with XOR bind and majority bundle.
    Dense,
    /// Sorted `(axis, exponent)` terms with additive bind.
    Sparse,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Dense => write!(f, "dense"),
            Strategy::Sparse => write!(f, "sparse"),
        }
    }
}

/// A high-dimensional vector. The variant is the strategy id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vector {
    /// Fixed-width binary vector, bits packed little-endian into words.
    Dense {
        /// Width in bits.
        geometry: usize,
        /// `ceil(geometry / 64)` packed words; bits past `geometry` are zero.
        words: Vec<u64>,
    },
    /// Sparse polynomial keyed by axis, sorted by axis ascending.
    Sparse {
        /// Maximum term count this vector may carry.
        max_terms: usize,
        /// `(axis, exponent)` pairs; exponents in `1..SPARSE_EXP_ORDER`.
        terms: Vec<(u32, i32)>,
    },
}

/// splitmix64 step. Used for deterministic bit streams (name seeding,
/// bundle tie-breaking); stable across platforms.
#[inline]
pub(crate) fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e3779b97f4a7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Derive a 64-bit seed from a name under a given strategy and geometry.
fn name_seed(name: &str, geometry: usize, strategy: Strategy) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(strategy.to_string().as_bytes());
    hasher.update((geometry as u64).to_le_bytes());
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    u64::from_le_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ])
}

impl Vector {
    /// Create the deterministic vector for `name`. Dense vectors come out
    /// at ~50% bit density; sparse vectors carry exactly
    /// [`consts::SPARSE_TERMS`] distinct axes.
    pub fn from_name(name: &str, geometry: usize, strategy: Strategy) -> Self {
        let mut state = name_seed(name, geometry, strategy);
        match strategy {
            Strategy::Dense => {
                let word_count = geometry.div_ceil(64);
                let mut words = Vec::with_capacity(word_count);
                for _ in 0..word_count {
                    words.push(splitmix64(&mut state));
                }
                // Clear bits past the geometry so equality and Hamming
                // distance see exactly `geometry` bits.
                let tail_bits = geometry % 64;
                if tail_bits != 0 {
                    if let Some(last) = words.last_mut() {
                        *last &= (1u64 << tail_bits) - 1;
                    }
                }
                Vector::Dense { geometry, words }
            }
            Strategy::Sparse => {
                let mut terms: Vec<(u32, i32)> = Vec::with_capacity(consts::SPARSE_TERMS);
                while terms.len() < consts::SPARSE_TERMS {
                    let raw = splitmix64(&mut state);
                    let axis = (raw as u32) % consts::SPARSE_AXIS_SPACE;
                    if terms.iter().any(|&(a, _)| a == axis) {
                        continue;
                    }
                    let exp = 1 + ((raw >> 32) as i32).rem_euclid(consts::SPARSE_EXP_ORDER - 1);
                    terms.push((axis, exp));
                }
                terms.sort_unstable_by_key(|&(a, _)| a);
                Vector::Sparse {
                    max_terms: consts::SPARSE_MAX_TERMS,
                    terms,
                }
            }
        }
    }

    /// All-zero vector of the same shape as `self`. The dense identity
    /// element for bind.
    pub fn zero_like(&self) -> Self {
        match self {
            Vector::Dense { geometry, words } => Vector::Dense {
                geometry: *geometry,
                words: vec![0u64; words.len()],
            },
            Vector::Sparse { max_terms, .. } => Vector::Sparse {
                max_terms: *max_terms,
                terms: Vec::new(),
            },
        }
    }

    /// Strategy of this vector.
    pub fn strategy(&self) -> Strategy {
        match self {
            Vector::Dense { .. } => Strategy::Dense,
            Vector::Sparse { .. } => Strategy::Sparse,
        }
    }

    /// Geometry: bit width for dense, maximum term count for sparse.
    pub fn geometry(&self) -> usize {
        match self {
            Vector::Dense { geometry, .. } => *geometry,
            Vector::Sparse { max_terms, .. } => *max_terms,
        }
    }

    fn check_compatible(&self, other: &Vector) -> Result<(), HdcError> {
        match (self, other) {
            (Vector::Dense { geometry: a, .. }, Vector::Dense { geometry: b, .. }) => {
                if a == b {
                    Ok(())
                } else {
                    Err(HdcError::GeometryMismatch { left: *a, right: *b })
                }
            }
            (Vector::Sparse { .. }, Vector::Sparse { .. }) => Ok(()),
            _ => Err(HdcError::StrategyMismatch {
                left: self.strategy().to_string(),
                right: other.strategy().to_string(),
            }),
        }
    }

    /// Bind two vectors. Dense: bitwise XOR (commutative, self-inverse).
    /// Sparse: componentwise addition of exponents modulo
    /// [`consts::SPARSE_EXP_ORDER`]; terms whose exponent lands on zero
    /// cancel out of the term list.
    pub fn bind(&self, other: &Vector) -> Result<Vector, HdcError> {
        self.check_compatible(other)?;
        match (self, other) {
            (
                Vector::Dense { geometry, words: a },
                Vector::Dense { words: b, .. },
            ) => {
                let words = a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect();
                Ok(Vector::Dense {
                    geometry: *geometry,
                    words,
                })
            }
            (
                Vector::Sparse {
                    max_terms,
                    terms: a,
                },
                Vector::Sparse { terms: b, .. },
            ) => Ok(Vector::Sparse {
                max_terms: *max_terms,
                terms: sparse_combine(a, b, 1),
            }),
            _ => unreachable!("check_compatible rejects mixed strategies"),
        }
    }

    /// Unbind: dense is its own inverse so this is just bind; sparse
    /// subtracts exponents.
    pub fn unbind(&self, other: &Vector) -> Result<Vector, HdcError> {
        self.check_compatible(other)?;
        match (self, other) {
            (Vector::Dense { .. }, Vector::Dense { .. }) => self.bind(other),
            (
                Vector::Sparse {
                    max_terms,
                    terms: a,
                },
                Vector::Sparse { terms: b, .. },
            ) => Ok(Vector::Sparse {
                max_terms: *max_terms,
                terms: sparse_combine(a, b, -1),
            }),
            _ => unreachable!("check_compatible rejects mixed strategies"),
        }
    }

    /// Bundle a set of vectors into their superposition.
    ///
    /// Dense: bitwise majority per column; exact ties are broken by the
    /// first operand's bit XOR the parity of `splitmix64(column_index)`
    /// — stable across runs and platforms, and chosen so that bind
    /// distributes over bundle. Sparse: axes are merged, each axis keeps
    /// its most frequent exponent, and the result is renormalized to the
    /// majority axes capped at `max_terms`.
    pub fn bundle(vectors: &[&Vector]) -> Result<Vector, HdcError> {
        let first = *vectors.first().ok_or(HdcError::EmptyBundle)?;
        for v in &vectors[1..] {
            first.check_compatible(v)?;
        }
        if vectors.len() == 1 {
            return Ok(first.clone());
        }
        match first {
            Vector::Dense { geometry, .. } => Ok(dense_majority(vectors, *geometry)),
            Vector::Sparse { max_terms, .. } => Ok(sparse_bundle(vectors, *max_terms)),
        }
    }

    /// Similarity in `[-1, 1]` for dense (matches minus mismatches over
    /// geometry); normalized overlap for sparse.
    pub fn similarity(&self, other: &Vector) -> Result<f64, HdcError> {
        self.check_compatible(other)?;
        match (self, other) {
            (
                Vector::Dense { geometry, words: a },
                Vector::Dense { words: b, .. },
            ) => {
                let hamming: u64 = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| u64::from((x ^ y).count_ones()))
                    .sum();
                let d = *geometry as f64;
                Ok((d - 2.0 * hamming as f64) / d)
            }
            (Vector::Sparse { terms: a, .. }, Vector::Sparse { terms: b, .. }) => {
                if a.is_empty() || b.is_empty() {
                    return Ok(0.0);
                }
                let mut shared = 0usize;
                let (mut i, mut j) = (0usize, 0usize);
                while i < a.len() && j < b.len() {
                    match a[i].0.cmp(&b[j].0) {
                        std::cmp::Ordering::Less => i += 1,
                        std::cmp::Ordering::Greater => j += 1,
                        std::cmp::Ordering::Equal => {
                            if a[i].1 == b[j].1 {
                                shared += 1;
                            }
                            i += 1;
                            j += 1;
                        }
                    }
                }
                Ok(shared as f64 / ((a.len() as f64) * (b.len() as f64)).sqrt())
            }
            _ => unreachable!("check_compatible rejects mixed strategies"),
        }
    }

    /// `|similarity| < theta`. Default theta for dense vectors is
    /// [`consts::ORTHOGONALITY_THRESHOLD`].
    pub fn is_orthogonal(&self, other: &Vector, theta: f64) -> Result<bool, HdcError> {
        Ok(self.similarity(other)?.abs() < theta)
    }

    /// Stable 64-bit fingerprint of the vector content. Used as a cheap
    /// identity in visited sets during proof search.
    pub fn fingerprint(&self) -> u64 {
        let mut acc: u64 = 0xcbf29ce484222325;
        match self {
            Vector::Dense { geometry, words } => {
                acc ^= *geometry as u64;
                for w in words {
                    acc = acc.rotate_left(5) ^ w;
                    acc = acc.wrapping_mul(0x100000001b3);
                }
            }
            Vector::Sparse { terms, .. } => {
                for &(axis, exp) in terms {
                    acc = acc.rotate_left(5) ^ (u64::from(axis) << 32 | exp as u32 as u64);
                    acc = acc.wrapping_mul(0x100000001b3);
                }
            }
        }
        acc
    }

    /// Number of set bits (dense) or terms (sparse).
    pub fn weight(&self) -> usize {
        match self {
            Vector::Dense { words, .. } => {
                words.iter().map(|w| w.count_ones() as usize).sum()
            }
            Vector::Sparse { terms, .. } => terms.len(),
        }
    }
}

/// Merge two sorted sparse term lists, scaling the second operand's
/// exponents by `sign` (+1 for bind, -1 for unbind). Zero exponents cancel.
fn sparse_combine(a: &[(u32, i32)], b: &[(u32, i32)], sign: i32) -> Vec<(u32, i32)> {
    let order = consts::SPARSE_EXP_ORDER;
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0usize, 0usize);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push((b[j].0, (sign * b[j].1).rem_euclid(order)));
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                let exp = (a[i].1 + sign * b[j].1).rem_euclid(order);
                if exp != 0 {
                    out.push((a[i].0, exp));
                }
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    for &(axis, exp) in &b[j..] {
        let exp = (sign * exp).rem_euclid(order);
        if exp != 0 {
            out.push((axis, exp));
        }
    }
    out.retain(|&(_, e)| e != 0);
    out
}

/// Bitwise majority of dense vectors with a deterministic, value-aware
/// coin on ties. XOR-ing every operand by a key flips a tied column's
/// first bit along with the rest, so the tie resolution tracks the key
/// and bind distributes over bundle.
fn dense_majority(vectors: &[&Vector], geometry: usize) -> Vector {
    let word_count = geometry.div_ceil(64);
    let n = vectors.len();
    let half = n / 2;
    let even = n % 2 == 0;
    let mut words = vec![0u64; word_count];

    let first_words = match vectors[0] {
        Vector::Dense { words, .. } => words,
        Vector::Sparse { .. } => unreachable!("caller checked the strategy"),
    };

    let mut counts = vec![0u32; 64];
    for w in 0..word_count {
        counts.iter_mut().for_each(|c| *c = 0);
        for v in vectors {
            if let Vector::Dense { words: vw, .. } = v {
                let mut bits = vw[w];
                while bits != 0 {
                    let b = bits.trailing_zeros() as usize;
                    counts[b] += 1;
                    bits &= bits - 1;
                }
            }
        }
        let mut out = 0u64;
        for (b, &c) in counts.iter().enumerate() {
            let bit_index = w * 64 + b;
            if bit_index >= geometry {
                break;
            }
            let set = if even && c as usize == half {
                let mut state = bit_index as u64;
                let coin = splitmix64(&mut state) & 1 == 1;
                let first_bit = (first_words[w] >> b) & 1 == 1;
                first_bit ^ coin
            } else {
                c as usize > half
            };
            if set {
                out |= 1u64 << b;
            }
        }
        words[w] = out;
    }
    Vector::Dense { geometry, words }
}

/// Merge sparse vectors: every axis keeps its most frequent exponent
/// (ties broken toward the smaller exponent); axes present in at least
/// half of the inputs survive, ranked by occurrence count then axis.
fn sparse_bundle(vectors: &[&Vector], max_terms: usize) -> Vector {
    use std::collections::BTreeMap;

    // axis -> exponent -> occurrence count. BTreeMap keeps the scan order
    // deterministic.
    let mut tally: BTreeMap<u32, BTreeMap<i32, usize>> = BTreeMap::new();
    for v in vectors {
        if let Vector::Sparse { terms, .. } = v {
            for &(axis, exp) in terms {
                *tally.entry(axis).or_default().entry(exp).or_insert(0) += 1;
            }
        }
    }

    let quorum = vectors.len().div_ceil(2);
    let mut ranked: Vec<(usize, u32, i32)> = Vec::new();
    for (axis, exps) in &tally {
        let total: usize = exps.values().sum();
        if total < quorum {
            continue;
        }
        // Most frequent exponent; BTreeMap iteration makes the tie-break
        // the smallest exponent.
        let (&best_exp, _) = exps
            .iter()
            .max_by_key(|&(exp, count)| (*count, std::cmp::Reverse(*exp)))
            .expect("axis tally is never empty");
        ranked.push((total, *axis, best_exp));
    }
    ranked.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    ranked.truncate(max_terms);

    let mut terms: Vec<(u32, i32)> = ranked.into_iter().map(|(_, a, e)| (a, e)).collect();
    terms.sort_unstable_by_key(|&(a, _)| a);
    Vector::Sparse { max_terms, terms }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: usize = consts::GEOMETRY_TEST;

    #[test]
    fn from_name_is_deterministic() {
        let a = Vector::from_name("Dog", G, Strategy::Dense);
        let b = Vector::from_name("Dog", G, Strategy::Dense);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_names_are_quasi_orthogonal() {
        let a = Vector::from_name("Dog", G, Strategy::Dense);
        let b = Vector::from_name("Cat", G, Strategy::Dense);
        let sim = a.similarity(&b).unwrap();
        assert!(sim.abs() < consts::ORTHOGONALITY_THRESHOLD, "sim={sim}");
    }

    #[test]
    fn dense_density_near_half() {
        let v = Vector::from_name("Mammal", G, Strategy::Dense);
        let density = v.weight() as f64 / G as f64;
        assert!((0.4..0.6).contains(&density), "density={density}");
    }

    #[test]
    fn bind_self_inverse_dense() {
        let v = Vector::from_name("Dog", G, Strategy::Dense);
        let b = Vector::from_name("Pos1", G, Strategy::Dense);
        let bound = v.bind(&b).unwrap();
        assert_eq!(bound.bind(&b).unwrap(), v);
        assert_eq!(v.bind(&v).unwrap(), v.zero_like());
    }

    #[test]
    fn bind_unbind_round_trip_sparse() {
        let v = Vector::from_name("Dog", G, Strategy::Sparse);
        let b = Vector::from_name("Pos1", G, Strategy::Sparse);
        let bound = v.bind(&b).unwrap();
        assert_eq!(bound.unbind(&b).unwrap(), v);
    }

    #[test]
    fn bundle_idempotent() {
        let v = Vector::from_name("Dog", G, Strategy::Dense);
        let bundled = Vector::bundle(&[&v, &v, &v]).unwrap();
        assert_eq!(bundled, v);
    }

    #[test]
    fn bundle_members_stay_similar() {
        let a = Vector::from_name("Dog", G, Strategy::Dense);
        let b = Vector::from_name("Cat", G, Strategy::Dense);
        let c = Vector::from_name("Fish", G, Strategy::Dense);
        let bundled = Vector::bundle(&[&a, &b, &c]).unwrap();
        for member in [&a, &b, &c] {
            let sim = bundled.similarity(member).unwrap();
            assert!(sim > 0.2, "bundle lost a member: sim={sim}");
        }
    }

    #[test]
    fn bundle_empty_fails() {
        assert!(matches!(Vector::bundle(&[]), Err(HdcError::EmptyBundle)));
    }

    #[test]
    fn mixed_strategy_rejected() {
        let d = Vector::from_name("Dog", G, Strategy::Dense);
        let s = Vector::from_name("Dog", G, Strategy::Sparse);
        assert!(matches!(d.bind(&s), Err(HdcError::StrategyMismatch { .. })));
    }

    #[test]
    fn geometry_mismatch_rejected() {
        let a = Vector::from_name("Dog", 1024, Strategy::Dense);
        let b = Vector::from_name("Dog", 2048, Strategy::Dense);
        assert!(matches!(a.bind(&b), Err(HdcError::GeometryMismatch { .. })));
    }

    #[test]
    fn similarity_self_is_one() {
        let v = Vector::from_name("Dog", G, Strategy::Dense);
        assert!((v.similarity(&v).unwrap() - 1.0).abs() < f64::EPSILON);
        let s = Vector::from_name("Dog", G, Strategy::Sparse);
        assert!((s.similarity(&s).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sparse_bind_is_commutative() {
        let a = Vector::from_name("Dog", G, Strategy::Sparse);
        let b = Vector::from_name("Cat", G, Strategy::Sparse);
        assert_eq!(a.bind(&b).unwrap(), b.bind(&a).unwrap());
    }

    #[test]
    fn fingerprint_distinguishes_vectors() {
        let a = Vector::from_name("Dog", G, Strategy::Dense);
        let b = Vector::from_name("Cat", G, Strategy::Dense);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }
}
