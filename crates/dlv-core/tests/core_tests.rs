use std::cmp::Ordering;

use dlv_core::{compare_versions, max_version, DocId, Document, DocKind, ProjectRef, RunType};
use serde_json::json;

#[test]
fn test_document_kinds() {
    let bodies = [
        json!({"type": "artifact", "name": "api", "version": "1.0.0", "project": "web@acme"}),
        json!({"type": "configuration", "project": "web@acme", "deliverable": "api", "stage": "prod", "timestamp": "2024-01-01T00:00:00Z"}),
        json!({"type": "deliverable", "name": "api", "project": "web@acme", "version": "1.0.0"}),
        json!({"type": "event", "event": "success", "project": "web@acme", "target": "api", "version": "1.0.0", "timestamp": "2024-01-01T00:00:00Z"}),
    ];
    let kinds: Vec<DocKind> = bodies
        .iter()
        .map(|b| Document::parse(b).unwrap().unwrap().kind())
        .collect();
    assert_eq!(kinds, vec![DocKind::Artifact, DocKind::Configuration, DocKind::Deliverable, DocKind::Event]);
}

#[test]
fn test_project_ref_from_document() {
    let doc = Document::parse(&json!({"type": "deliverable", "name": "api", "project": "web@acme", "version": "1"}))
        .unwrap()
        .unwrap();
    assert_eq!(
        doc.project_ref().unwrap(),
        ProjectRef { customer: "acme".into(), project: "web".into() }
    );
}

#[test]
fn test_doc_id_new() {
    let a = DocId::new();
    let b = DocId::new();
    assert_ne!(a, b);
    assert_eq!(a.partial_id(), "");
}

#[test]
fn test_run_type_from_stage() {
    assert_eq!(RunType::from_stage(None), RunType::Build);
    assert_eq!(RunType::from_stage(Some("")), RunType::Build);
    assert_eq!(RunType::from_stage(Some("prod")), RunType::Publish);
}

#[test]
fn test_version_ordering() {
    assert_eq!(compare_versions("1.2.3-rc1", "1.2.3"), Ordering::Less);
    assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
    assert_eq!(max_version(["1.0.0", "1.0.0-beta", "0.9.9"]), "1.0.0");
}
