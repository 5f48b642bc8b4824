//! # Dimension Registry
//!
//! Catalog of named axes, property→axis mappings, relation metadata
//! (transitivity, symmetry, inheritability, positioning, inverses,
//! computability, forced existence levels), operator aliases, and
//! partition ranges (ontology / axiology).
//!
//! The registry is loaded from a TOML document at session init:
//!
//! ```toml
//! [axes]
//! temperature = 0
//! spatial_x = 1
//!
//! [properties]
//! hot = "temperature"
//!
//! [aliases]
//! isa = "IS_A"
//!
//! [partitions]
//! ontology = { start = 0, end = 63 }
//! axiology = { start = 64, end = 127 }
//!
//! [relations.locatedIn]
//! transitive = true
//!
//! [relations.leftOf]
//! inverse = "rightOf"
//! positioning = { axes = ["spatial_x"], target_value = -1, inheritable = false }
//!
//! [relations.sumOf]
//! computable = "math"
//! ```
//!
//! A missing file is not an error: the registry degrades to empty
//! mappings and the reasoner operates purely syntactically. The IS_A
//! variant family is built in and present even in degraded mode.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::store::existence;

/// Positioning metadata for spatial/ordering relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositioningDef {
    /// Axis names this relation constrains.
    pub axes: Vec<String>,
    /// Target value on those axes, when the relation pins one.
    #[serde(default)]
    pub target_value: Option<i64>,
    /// Whether the positioning propagates down IS_A.
    #[serde(default)]
    pub inheritable: bool,
}

/// Raw per-relation descriptor as it appears in the TOML document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    #[serde(default)]
    pub transitive: bool,
    #[serde(default)]
    pub symmetric: bool,
    #[serde(default)]
    pub inheritable: bool,
    #[serde(default)]
    pub positioning: Option<PositioningDef>,
    #[serde(default)]
    pub inverse: Option<String>,
    /// Name of the plugin that evaluates this relation, if computable.
    #[serde(default)]
    pub computable: Option<String>,
    /// Relation this one specializes (e.g. `IS_A_CERTAIN` → `IS_A`).
    #[serde(default)]
    pub base_relation: Option<String>,
    /// Existence level this relation forces on assertion
    /// (`certain`, `demonstrated`, `possible`, `unproven`, `impossible`).
    #[serde(default)]
    pub existence_level: Option<String>,
}

/// Inclusive axis range of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRange {
    pub start: usize,
    pub end: usize,
}

/// On-disk shape of the registry document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub axes: HashMap<String, usize>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    #[serde(default)]
    pub partitions: HashMap<String, PartitionRange>,
    #[serde(default)]
    pub relations: HashMap<String, RelationDef>,
}

/// Resolved view of a relation's metadata, with the built-in IS_A family
/// folded in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationProperties {
    pub transitive: bool,
    pub symmetric: bool,
    pub inheritable: bool,
    pub positioning: Option<PositioningDef>,
    pub inverse: Option<String>,
    pub computable: Option<String>,
    pub base_relation: Option<String>,
    /// Existence level forced on assertion, when the relation pins one.
    pub existence_level: Option<i8>,
}

/// The canonical IS_A operator name.
pub const IS_A: &str = "IS_A";

/// Built-in IS_A variants and the existence level each one forces.
const IS_A_VARIANTS: [(&str, i8); 5] = [
    ("IS_A", existence::CERTAIN),
    ("IS_A_CERTAIN", existence::CERTAIN),
    ("IS_A_DEMONSTRATED", existence::DEMONSTRATED),
    ("IS_A_POSSIBLE", existence::POSSIBLE),
    ("IS_A_UNPROVEN", existence::UNPROVEN),
];

/// Loaded, queryable registry.
#[derive(Debug, Clone, Default)]
pub struct DimensionRegistry {
    doc: RegistryDocument,
    degraded: bool,
}

fn parse_existence_name(name: &str) -> Option<i8> {
    match name.to_ascii_lowercase().as_str() {
        "impossible" => Some(existence::IMPOSSIBLE),
        "unproven" => Some(existence::UNPROVEN),
        "possible" => Some(existence::POSSIBLE),
        "demonstrated" => Some(existence::DEMONSTRATED),
        "certain" => Some(existence::CERTAIN),
        _ => None,
    }
}

impl DimensionRegistry {
    /// Load from a TOML document, validating axis references.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path)?;
        let doc: RegistryDocument = toml::from_str(&text)?;
        Self::from_document(doc)
    }

    /// Build from an already-deserialized document.
    pub fn from_document(doc: RegistryDocument) -> Result<Self, RegistryError> {
        for axis in doc.properties.values() {
            if !doc.axes.contains_key(axis) {
                return Err(RegistryError::UnknownAxis { axis: axis.clone() });
            }
        }
        for rel in doc.relations.values() {
            if let Some(pos) = &rel.positioning {
                for axis in &pos.axes {
                    if !doc.axes.contains_key(axis) {
                        return Err(RegistryError::UnknownAxis { axis: axis.clone() });
                    }
                }
            }
        }
        Ok(Self {
            doc,
            degraded: false,
        })
    }

    /// Load from `path` if it exists; otherwise degrade to empty mappings.
    /// A present-but-invalid document is still an error.
    pub fn load_or_degraded(path: Option<&Path>) -> Result<Self, RegistryError> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            Some(p) => {
                tracing::warn!(path = %p.display(), "registry document missing, running degraded");
                Ok(Self::degraded())
            }
            None => Ok(Self::degraded()),
        }
    }

    /// Empty registry: no axes, no relation metadata beyond the built-in
    /// IS_A family. The reasoner still functions syntactically.
    pub fn degraded() -> Self {
        Self {
            doc: RegistryDocument::default(),
            degraded: true,
        }
    }

    /// Whether this registry was built without a document.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Resolve an operator name through the alias table and the built-in
    /// IS_A spellings (`isa`, `is_a`, `isA` all canonicalize to `IS_A`).
    pub fn canonical_operator(&self, name: &str) -> String {
        if let Some(target) = self.doc.aliases.get(name) {
            return target.clone();
        }
        let lowered = name.to_ascii_lowercase();
        if lowered == "isa" || lowered == "is_a" {
            return IS_A.to_string();
        }
        name.to_string()
    }

    /// Index of a named axis.
    pub fn axis_index(&self, name: &str) -> Option<usize> {
        self.doc.axes.get(name).copied()
    }

    /// Axis a property maps onto.
    pub fn property_axis(&self, property: &str) -> Option<usize> {
        let axis = self.doc.properties.get(property)?;
        self.doc.axes.get(axis).copied()
    }

    /// Axes a relation's positioning constrains (empty when none).
    pub fn relation_axes(&self, relation: &str) -> Vec<usize> {
        let canonical = self.canonical_operator(relation);
        self.doc
            .relations
            .get(&canonical)
            .and_then(|r| r.positioning.as_ref())
            .map(|p| {
                p.axes
                    .iter()
                    .filter_map(|a| self.doc.axes.get(a).copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Axis range of a named partition.
    pub fn partition_range(&self, name: &str) -> Option<PartitionRange> {
        self.doc.partitions.get(name).copied()
    }

    /// Full resolved metadata for a relation.
    pub fn relation_properties(&self, relation: &str) -> RelationProperties {
        let canonical = self.canonical_operator(relation);

        if let Some(&(_, level)) = IS_A_VARIANTS.iter().find(|(n, _)| *n == canonical) {
            let mut props = RelationProperties {
                transitive: true,
                existence_level: Some(level),
                ..Default::default()
            };
            if canonical != IS_A {
                props.base_relation = Some(IS_A.to_string());
            }
            // A document may refine the built-ins (e.g. mark IS_A
            // inheritable for property propagation experiments).
            if let Some(def) = self.doc.relations.get(&canonical) {
                props.symmetric = def.symmetric;
                props.inheritable = def.inheritable;
            }
            return props;
        }

        let Some(def) = self.doc.relations.get(&canonical) else {
            return RelationProperties::default();
        };
        RelationProperties {
            transitive: def.transitive,
            symmetric: def.symmetric,
            inheritable: def.inheritable,
            positioning: def.positioning.clone(),
            inverse: def.inverse.clone(),
            computable: def.computable.clone(),
            base_relation: def.base_relation.clone(),
            existence_level: def
                .existence_level
                .as_deref()
                .and_then(parse_existence_name),
        }
    }

    /// Whether chains of `relation` may be composed transitively.
    pub fn is_transitive(&self, relation: &str) -> bool {
        self.relation_properties(relation).transitive
    }

    /// Whether `relation` propagates down the IS_A hierarchy.
    pub fn is_inheritable(&self, relation: &str) -> bool {
        self.relation_properties(relation).inheritable
    }

    /// Whether `relation` is (a spelling of) an IS_A variant.
    pub fn is_is_a_variant(&self, relation: &str) -> bool {
        let canonical = self.canonical_operator(relation);
        IS_A_VARIANTS.iter().any(|(n, _)| *n == canonical)
    }

    /// All IS_A variant operator names.
    pub fn is_a_variants(&self) -> Vec<&'static str> {
        IS_A_VARIANTS.iter().map(|(n, _)| *n).collect()
    }

    /// Existence level `relation` forces on assertion, when it is an IS_A
    /// variant or carries an explicit level in the document.
    pub fn forced_existence(&self, relation: &str) -> Option<i8> {
        self.relation_properties(relation).existence_level
    }

    /// Plugin name evaluating `relation`, when computable.
    pub fn computable_plugin(&self, relation: &str) -> Option<String> {
        self.relation_properties(relation).computable
    }
}
