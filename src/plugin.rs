//! Plugin Registry
//!
//! A relation is *computable* when the dimension registry maps it to a
//! plugin name. Concrete plugins (math, physics, logic, datetime) live
//! outside the core; this module fixes the contract: a thin capability
//! trait plus a registry that degrades plugin failure to an UNKNOWN
//! verdict so the engine always continues.

use serde::{Deserialize, Serialize};

use crate::error::PluginError;
use crate::store::Concept;

/// Five-valued truth returned by plugin evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TruthValue {
    TrueCertain,
    TrueLikely,
    Unknown,
    FalseLikely,
    False,
}

impl TruthValue {
    /// Whether this verdict counts as a successful proof step.
    pub fn is_affirmative(self) -> bool {
        matches!(self, TruthValue::TrueCertain | TruthValue::TrueLikely)
    }
}

/// Result of evaluating a computable relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub truth: TruthValue,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Computed value, when the relation produces one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Unit of the computed value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Human-readable explanation (including degradation reasons).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Verdict {
    /// An UNKNOWN verdict carrying a reason. Used for degradation.
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self {
            truth: TruthValue::Unknown,
            confidence: 0.0,
            value: None,
            unit: None,
            reason: Some(reason.into()),
        }
    }

    /// An affirmative verdict with the given confidence.
    pub fn affirmed(confidence: f64) -> Self {
        Self {
            truth: if confidence >= 0.99 {
                TruthValue::TrueCertain
            } else {
                TruthValue::TrueLikely
            },
            confidence,
            value: None,
            unit: None,
            reason: None,
        }
    }
}

/// Capability trait for computable-relation evaluators.
pub trait Plugin: Send + Sync {
    /// Registry name this plugin answers to.
    fn name(&self) -> &str;

    /// Evaluate `relation(subject, object)`.
    fn evaluate(
        &self,
        relation: &str,
        subject: &Concept,
        object: &Concept,
    ) -> Result<Verdict, PluginError>;
}

/// Holds registered plugins and routes evaluation requests.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Later registrations shadow earlier ones with
    /// the same name.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// True when no plugins are registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Evaluate a relation through the named plugin. Any failure (missing
    /// plugin, plugin error) degrades to `Verdict::unknown` — the engine
    /// must keep reasoning about other relations.
    pub fn evaluate(
        &self,
        plugin_name: &str,
        relation: &str,
        subject: &Concept,
        object: &Concept,
    ) -> Verdict {
        let Some(plugin) = self
            .plugins
            .iter()
            .rev()
            .find(|p| p.name() == plugin_name)
        else {
            tracing::warn!(plugin = plugin_name, relation, "computable relation has no plugin");
            return Verdict::unknown(format!("no plugin registered under '{plugin_name}'"));
        };
        match plugin.evaluate(relation, subject, object) {
            Ok(verdict) => verdict,
            Err(err) => {
                tracing::warn!(plugin = plugin_name, relation, %err, "plugin failed, degrading to UNKNOWN");
                Verdict::unknown(err.to_string())
            }
        }
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hdc::{consts, Strategy, Vector};
    use crate::store::{ConceptId, CreationSource};

    struct AlwaysTrue;
    impl Plugin for AlwaysTrue {
        fn name(&self) -> &str {
            "truthy"
        }
        fn evaluate(&self, _: &str, _: &Concept, _: &Concept) -> Result<Verdict, PluginError> {
            Ok(Verdict::affirmed(1.0))
        }
    }

    struct Broken;
    impl Plugin for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn evaluate(&self, r: &str, _: &Concept, _: &Concept) -> Result<Verdict, PluginError> {
            Err(PluginError::Failed {
                name: "broken".to_string(),
                message: format!("cannot evaluate {r}"),
            })
        }
    }

    fn concept(label: &str) -> Concept {
        Concept {
            id: ConceptId(0),
            label: label.to_string(),
            vector: Vector::from_name(label, consts::GEOMETRY_TEST, Strategy::Dense),
            created_from: CreationSource::Dsl,
        }
    }

    #[test]
    fn evaluates_registered_plugin() {
        let mut reg = PluginRegistry::new();
        reg.register(Box::new(AlwaysTrue));
        let v = reg.evaluate("truthy", "sumOf", &concept("Two"), &concept("Four"));
        assert_eq!(v.truth, TruthValue::TrueCertain);
    }

    #[test]
    fn missing_plugin_degrades_to_unknown() {
        let reg = PluginRegistry::new();
        let v = reg.evaluate("math", "sumOf", &concept("Two"), &concept("Four"));
        assert_eq!(v.truth, TruthValue::Unknown);
        assert!(v.reason.is_some());
    }

    #[test]
    fn plugin_failure_degrades_to_unknown() {
        let mut reg = PluginRegistry::new();
        reg.register(Box::new(Broken));
        let v = reg.evaluate("broken", "sumOf", &concept("Two"), &concept("Four"));
        assert_eq!(v.truth, TruthValue::Unknown);
        assert!(v.reason.expect("reason present").contains("cannot evaluate"));
    }
}
