//! Native container build tests
//!
//! Builds containers from the library API and from project files in both
//! encodings, re-parses them with the wire codec, and runs the patch step
//! on the result.

use std::fs;
use std::io::Read;
use std::path::Path;

use facepack::format::{Container, FORMAT_VERSION, MAGIC};
use facepack::serializer::{decode_payload, DecodedPayload};
use facepack::{
    set_identifier, BuildError, Component, ContainerSerializer, PatchOutcome, ProjectDescriptor,
    SlotStrategy,
};
use flate2::read::DeflateDecoder;
use serde_json::{json, Map, Value};
use tempfile::TempDir;

fn data(value: Value) -> Map<String, Value> {
    value.as_object().unwrap().clone()
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

// =============================================================================
// Wire layout
// =============================================================================

#[test]
fn test_single_text_component_layout() {
    let project = ProjectDescriptor::new("W")
        .with_component(Component::typed("Text", data(json!({"k": "v"}))));
    let bytes = ContainerSerializer::new("images").build(&project).unwrap();

    // magic | version | name len | name | count
    assert_eq!(&bytes[0..4], &MAGIC);
    assert_eq!(u32_at(&bytes, 4), FORMAT_VERSION);
    assert_eq!(u32_at(&bytes, 8), 1);
    assert_eq!(&bytes[12..13], b"W");
    assert_eq!(u32_at(&bytes, 13), 1);

    // type len | type | payload len | payload
    assert_eq!(u32_at(&bytes, 17), 4);
    assert_eq!(&bytes[21..25], b"Text");
    let payload_len = u32_at(&bytes, 25) as usize;
    assert_eq!(bytes.len(), 29 + payload_len);

    let mut json = String::new();
    DeflateDecoder::new(&bytes[29..])
        .read_to_string(&mut json)
        .unwrap();
    assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), json!({"k": "v"}));
}

#[test]
fn test_component_order_survives_reparse() {
    let project = ProjectDescriptor::new("W")
        .with_component(Component::typed("A", data(json!({"i": 0}))))
        .with_component(Component::typed("B", data(json!({"i": 1}))))
        .with_component(Component::typed("C", data(json!({"i": 2}))));
    let container =
        Container::parse(&ContainerSerializer::new("images").build(&project).unwrap()).unwrap();

    let kinds: Vec<_> = container.records.iter().map(|r| r.kind.as_str()).collect();
    assert_eq!(kinds, vec!["A", "B", "C"]);
    for (i, record) in container.records.iter().enumerate() {
        assert_eq!(
            decode_payload(record).unwrap(),
            DecodedPayload::Data(json!({"i": i}))
        );
    }
}

#[test]
fn test_missing_image_produces_no_bytes() {
    let dir = TempDir::new().unwrap();
    let project = ProjectDescriptor::new("W")
        .with_component(Component::typed("Image", data(json!({"src": "missing.png"}))));

    let err = ContainerSerializer::new(dir.path()).build(&project).unwrap_err();
    assert!(matches!(err, BuildError::ComponentRead { index: 0, .. }));
}

// =============================================================================
// Project files
// =============================================================================

fn write_images(dir: &Path) {
    fs::create_dir_all(dir.join("images")).unwrap();
    fs::write(dir.join("images/bg.png"), b"\x89PNG-background").unwrap();
}

#[test]
fn test_flat_and_nested_projects_build_identical_bytes() {
    let dir = TempDir::new().unwrap();
    write_images(dir.path());

    let flat = dir.path().join("face.toml");
    fs::write(
        &flat,
        r#"
name = "Sport"

[[component]]
type = "Image"
src = "bg.png"

[[component]]
type = "Text"
font = "mono"
size = "12"
"#,
    )
    .unwrap();

    let nested = dir.path().join("face.fprj");
    fs::write(
        &nested,
        r#"<?xml version="1.0" encoding="utf-8"?>
<Project name="Sport">
  <Component type="Image" src="bg.png"/>
  <Component type="Text" size="12" font="mono"/>
</Project>
"#,
    )
    .unwrap();

    let serializer = ContainerSerializer::for_project(&flat, Path::new("images"));
    let a = serializer.build_project(&flat).unwrap();
    let b = serializer.build_project(&nested).unwrap();
    assert_eq!(a, b);

    let container = Container::parse(&a).unwrap();
    assert_eq!(container.name, "Sport");
    assert_eq!(container.records[0].payload, b"\x89PNG-background");
}

#[test]
fn test_malformed_project_is_descriptor_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.fprj");
    fs::write(&path, "<Project><Component type=\"Text\"></Project>").unwrap();

    let err = ContainerSerializer::new("images").build_project(&path).unwrap_err();
    assert!(matches!(err, BuildError::Descriptor(_)));
}

// =============================================================================
// Build then patch
// =============================================================================

fn assert_only_slot_changed(before: &[u8], after: &[u8], slot: usize) {
    assert_eq!(after.len(), before.len());
    assert_eq!(&after[..slot], &before[..slot]);
    assert_eq!(&after[slot..slot + 9], b"123456789");
    assert_eq!(&after[slot + 9..], &before[slot + 9..]);
}

#[test]
fn test_patch_small_native_build_uses_file_start() {
    let dir = TempDir::new().unwrap();
    let artifact = dir.path().join("w.face");

    let project = ProjectDescriptor::new("W")
        .with_component(Component::typed("Text", data(json!({"k": "v"}))));
    ContainerSerializer::new("images")
        .build_to_file(&project, &artifact)
        .unwrap();
    let before = fs::read(&artifact).unwrap();
    assert!(before.len() < 49);

    let outcome = set_identifier(&artifact, "123456789").unwrap();
    assert_eq!(
        outcome,
        PatchOutcome::PatchedAt {
            offset: 0,
            strategy: SlotStrategy::FileStart
        }
    );
    assert_only_slot_changed(&before, &fs::read(&artifact).unwrap(), 0);
}

#[test]
fn test_patch_large_native_build_uses_fixed_offset() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("images")).unwrap();
    fs::write(dir.path().join("images/bg.png"), vec![0xAB; 64]).unwrap();
    let artifact = dir.path().join("w.face");

    let project = ProjectDescriptor::new("W")
        .with_component(Component::typed("Image", data(json!({"src": "bg.png"}))));
    ContainerSerializer::new(dir.path().join("images"))
        .build_to_file(&project, &artifact)
        .unwrap();
    let before = fs::read(&artifact).unwrap();
    assert!(before.len() >= 49);

    let outcome = set_identifier(&artifact, "123456789").unwrap();
    assert_eq!(
        outcome,
        PatchOutcome::PatchedAt {
            offset: 40,
            strategy: SlotStrategy::FixedOffset
        }
    );
    assert_only_slot_changed(&before, &fs::read(&artifact).unwrap(), 40);
}
