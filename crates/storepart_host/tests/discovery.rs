use pretty_assertions::assert_eq;
use serde_json::json;
use storepart::DomainRegistry;
use storepart_host::*;

#[test]
fn nothing_to_discover_without_a_directory() {
    storepart_host::trace::test_run().ok();
    assert!(discover(None).unwrap().is_empty());
    let dir = tempfile::tempdir().unwrap();
    assert!(discover(Some(&dir.path().join("missing"))).unwrap().is_empty());
    assert!(discover(Some(dir.path())).unwrap().is_empty());
}

#[test]
fn manifests_become_slices() {
    storepart_host::trace::test_run().ok();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("b.json"),
        r#"{ "domain": "settings", "fields": { "theme": "dark", "size": 12 } }"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("a.json"), r#"{ "domain": "empty" }"#).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a slice").unwrap();

    let paths = discover(Some(dir.path())).unwrap();
    let names: Vec<_> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.json", "b.json", "notes.txt"]);

    let registry = DomainRegistry::new();
    let slices = load_all(&paths, &[&JsonSliceLoader], &registry).unwrap();
    assert_eq!(
        slices.iter().map(|s| s.domain()).collect::<Vec<_>>(),
        vec!["empty", "settings"]
    );
    assert_eq!(
        slices[1].initial_state().to_json(),
        json!({ "theme": "dark", "size": 12 })
    );
    assert!(registry.contains("settings"));

    let store = slices
        .iter()
        .fold(Store::builder(HostConfig::default()), |b, s| b.slice(s))
        .build()
        .unwrap();
    assert_eq!(
        store.snapshot_json(),
        json!({ "empty": {}, "settings": { "theme": "dark", "size": 12 } })
    );
}

#[test]
fn bad_manifests_name_the_file() {
    storepart_host::trace::test_run().ok();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, r#"{ "fields": {} }"#).unwrap();

    let err = JsonSliceLoader
        .load(&path, &DomainRegistry::new())
        .unwrap_err();
    match err {
        HostError::Manifest { path: p, reason } => {
            assert!(p.ends_with("broken.json"));
            assert!(reason.contains("domain"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn duplicate_domains_across_manifests_fail() {
    storepart_host::trace::test_run().ok();
    let dir = tempfile::tempdir().unwrap();
    for name in ["one.json", "two.json"] {
        std::fs::write(dir.path().join(name), r#"{ "domain": "same" }"#).unwrap();
    }
    let paths = discover(Some(dir.path())).unwrap();
    let err = load_all(&paths, &[&JsonSliceLoader], &DomainRegistry::new()).unwrap_err();
    assert!(matches!(err, HostError::Manifest { ref reason, .. } if reason.contains("same")));
}
