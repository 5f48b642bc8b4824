//! Dimension-registry loading: file-backed, degraded, and invalid
//! documents.

use std::io::Write;
use std::path::Path;

use sys2::registry::DimensionRegistry;
use sys2::{Config, RegistryError, Session};

const SAMPLE: &str = r#"
[axes]
temperature = 0
spatial_x = 1

[properties]
hot = "temperature"

[aliases]
within = "locatedIn"

[partitions]
ontology = { start = 0, end = 63 }
axiology = { start = 64, end = 127 }

[relations.locatedIn]
transitive = true

[relations.hasProperty]
inheritable = true

[relations.leftOf]
inverse = "rightOf"
positioning = { axes = ["spatial_x"], target_value = -1, inheritable = false }

[relations.distanceTo]
computable = "math"
"#;

fn write_registry(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("writes");
    file
}

#[test]
fn loads_full_document_from_disk() {
    let file = write_registry(SAMPLE);
    let registry = DimensionRegistry::load(file.path()).expect("loads");
    assert!(!registry.is_degraded());
    assert!(registry.is_transitive("locatedIn"));
    assert!(registry.is_transitive("within"), "alias resolves");
    assert!(registry.is_inheritable("hasProperty"));
    assert_eq!(registry.axis_index("temperature"), Some(0));
    assert_eq!(registry.property_axis("hot"), Some(0));
    assert_eq!(registry.relation_axes("leftOf"), vec![1]);
    assert_eq!(
        registry.computable_plugin("distanceTo").as_deref(),
        Some("math")
    );
    let ontology = registry.partition_range("ontology").expect("partition");
    assert_eq!((ontology.start, ontology.end), (0, 63));
}

#[test]
fn missing_file_degrades_without_error() {
    let registry =
        DimensionRegistry::load_or_degraded(Some(Path::new("/nonexistent/registry.toml")))
            .expect("degrades");
    assert!(registry.is_degraded());
    assert!(!registry.is_transitive("locatedIn"));
    // Built-in IS_A behavior survives.
    assert!(registry.is_transitive("IS_A"));
    assert_eq!(registry.is_a_variants().len(), 5);
}

#[test]
fn invalid_document_is_an_error_not_a_degrade() {
    let file = write_registry("[relations.broken]\npositioning = { axes = [\"ghost\"] }\n");
    let err = DimensionRegistry::load(file.path()).expect_err("must fail");
    assert!(matches!(err, RegistryError::UnknownAxis { .. }));

    let file = write_registry("this is not toml [");
    assert!(matches!(
        DimensionRegistry::load(file.path()),
        Err(RegistryError::Toml(_))
    ));
}

#[test]
fn session_picks_up_registry_semantics() {
    let file = write_registry(SAMPLE);
    let mut config = Config::for_tests();
    config.registry.path = Some(file.path().to_path_buf());
    let mut s = Session::new(config).expect("session builds");

    s.run("within Key Drawer\nlocatedIn Drawer Desk").expect("runs");
    // `within` canonicalizes to locatedIn; the chain composes.
    let result = s.ask("locatedIn Key Desk").expect("asks");
    assert!(result.found);
}

#[test]
fn session_without_registry_still_reasons_syntactically() {
    let mut s = Session::new(Config::for_tests()).expect("session builds");
    assert!(s.registry().is_degraded());
    s.run("IS_A Dog Mammal\nIS_A Mammal Animal").expect("runs");
    assert!(s.ask("Dog IS_A Animal").expect("asks").found);
    // Non-IS_A relations get no transitive closure without metadata.
    s.run("before Start Middle\nbefore Middle End").expect("runs");
    assert!(!s.ask("before Start End").expect("asks").found);
}
