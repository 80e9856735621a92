//! Integration tests for the export pipeline.
//!
//! Snapshot in, `.molz` archive out: these tests run the full exporter and
//! read the published archive back.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use molz_export::{
    ExportConfig, ExportError, Exporter, PaletteColorLookup, SceneManifest, SessionSnapshot,
    SiteStructureWriter, StructureFormat,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

const SESSION: &str = r#"{
    "schema_version": "molz-session/1",
    "objects": [
        {
            "name": "Prot",
            "atoms": [
                {"reps": 32, "color": 5, "element": "N", "name": "N", "resn": "ALA", "resi": 1, "chain": "A", "coord": [0.0, 0.0, 0.0]},
                {"reps": 32, "color": 5, "element": "C", "name": "CA", "resn": "ALA", "resi": 1, "chain": "A", "coord": [1.5, 0.0, 0.0]},
                {"reps": 33, "color": 5, "element": "C", "name": "C", "resn": "ALA", "resi": 1, "chain": "A", "coord": [2.0, 1.4, 0.0]}
            ],
            "bonds": [{"atom_a": 0, "atom_b": 1}, {"atom_a": 1, "atom_b": 2}]
        },
        {
            "name": "lig",
            "atoms": [
                {"reps": 1, "color": 6, "element": "O"},
                {"reps": 1, "color": 6, "element": "H", "present": false}
            ],
            "bonds": [{"atom_a": 0, "atom_b": 1}]
        },
        {"name": "map", "kind": "other"}
    ],
    "workspace_settings": [{"setting": 236, "value": 7}],
    "palette": [
        {"id": 5, "rgb": [1.0, 0.0, 0.0]},
        {"id": 6, "rgb": [0.0, 0.0, 1.0]},
        {"id": 7, "rgb": [0.0, 0.5, 1.0]}
    ]
}"#;

fn snapshot() -> SessionSnapshot {
    SessionSnapshot::from_json_slice(SESSION.as_bytes()).unwrap()
}

fn exporter(dir: &Path) -> Exporter<SiteStructureWriter, PaletteColorLookup> {
    let config = ExportConfig::default()
        .with_output_dir(dir.join("out"))
        .with_staging_dir(dir.join("staging"));
    Exporter::with_site_writer(config)
}

fn read_entry(path: &Path, name: &str) -> String {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut contents = String::new();
    archive
        .by_name(name)
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    contents
}

fn entry_names(path: &Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

fn staging_is_empty(dir: &Path) -> bool {
    let staging = dir.join("staging");
    !staging.exists() || std::fs::read_dir(staging).unwrap().count() == 0
}

// ─────────────────────────────────────────────────────────────────────────────
// Archive Contents
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_archive_holds_manifest_and_assets() {
    let dir = tempfile::tempdir().unwrap();
    let report = exporter(dir.path()).export(&snapshot(), "session").unwrap();

    assert_eq!(report.archive.path, dir.path().join("out").join("session.molz"));
    assert_eq!(
        entry_names(&report.archive.path),
        vec!["assets/", "assets/Prot.sdf", "assets/lig.sdf", "state.json"]
    );
    assert!(staging_is_empty(dir.path()));

    let manifest: SceneManifest =
        serde_json::from_str(&read_entry(&report.archive.path, "state.json")).unwrap();
    assert_eq!(manifest.structures.len(), 2);
    assert!(manifest.structures.iter().all(|s| s.extension == StructureFormat::Sdf));
    assert_eq!(report.structure_count, 2);

    // Prot: cartoon (3 atoms) + stick (1 atom); lig: stick
    let names: Vec<_> = manifest
        .components
        .iter()
        .map(|c| (c.structure.as_str(), c.name.as_str(), c.selection.len()))
        .collect();
    assert_eq!(
        names,
        vec![("Prot.sdf", "Cartoon", 3), ("Prot.sdf", "Stick", 1), ("lig.sdf", "Stick", 1)]
    );
    assert_eq!(report.component_count, 3);
}

#[test]
fn test_assets_hold_present_atoms_only() {
    let dir = tempfile::tempdir().unwrap();
    let report = exporter(dir.path()).export(&snapshot(), "session").unwrap();

    let lig = read_entry(&report.archive.path, "assets/lig.sdf");
    assert!(lig.starts_with("lig\n"));
    assert!(lig.contains("  1  0  0  0  0  0  0  0  0  0999 V2000"));
    assert!(lig.contains("$$$$"));

    let prot = read_entry(&report.archive.path, "assets/Prot.sdf");
    assert!(prot.contains("  3  2  0  0  0  0  0  0  0  0999 V2000"));
}

#[test]
fn test_fingerprint_stable_across_exports() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = exporter(dir.path());

    let first = exporter.export(&snapshot(), "a").unwrap();
    let second = exporter.export(&snapshot(), "b").unwrap();
    assert_eq!(first.manifest_fingerprint, second.manifest_fingerprint);
    assert_eq!(
        read_entry(&first.archive.path, "state.json"),
        read_entry(&second.archive.path, "state.json")
    );
}

#[test]
fn test_same_name_replaces_archive() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = exporter(dir.path());

    exporter.export(&snapshot(), "session").unwrap();
    let report = exporter.export(&snapshot(), "session").unwrap();
    let published: Vec<_> = std::fs::read_dir(dir.path().join("out")).unwrap().collect();
    assert_eq!(published.len(), 1);
    assert!(report.archive.path.exists());
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure Handling
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_color_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let mut snapshot = snapshot();
    snapshot.palette.retain(|entry| entry.id != 6);

    let result = exporter(dir.path()).export(&snapshot, "session");
    assert!(matches!(result, Err(ExportError::Build(_))));
    assert!(!dir.path().join("out").join("session.molz").exists());
    assert!(staging_is_empty(dir.path()));
}

#[test]
fn test_invalid_snapshot_is_rejected_before_work() {
    let dir = tempfile::tempdir().unwrap();
    let mut snapshot = snapshot();
    snapshot.objects[1].name = "Prot".to_string();

    let exporter = exporter(dir.path());
    assert!(matches!(
        exporter.export(&snapshot, "session"),
        Err(ExportError::Snapshot(_))
    ));
    assert!(exporter.in_flight().is_none());
    assert!(!dir.path().join("out").join("session.molz").exists());
}

#[test]
fn test_invalid_archive_name() {
    let dir = tempfile::tempdir().unwrap();
    let result = exporter(dir.path()).export(&snapshot(), "../escape");
    assert!(matches!(result, Err(ExportError::Package(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Background Exports
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_spawned_export_reports_once() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = exporter(dir.path());

    let handle = exporter.spawn_export(&snapshot(), "session").unwrap();
    let id = handle.id();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.export_id, id);
    assert!(report.archive.path.exists());
    assert!(exporter.in_flight().is_none());
}

#[tokio::test]
async fn test_guard_released_after_failed_background_export() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = exporter(dir.path());
    let mut broken = snapshot();
    broken.palette.clear();

    let handle = exporter.spawn_export(&broken, "session").unwrap();
    assert!(handle.wait().await.is_err());
    assert!(exporter.in_flight().is_none());

    let handle = exporter.spawn_export(&snapshot(), "session").unwrap();
    assert!(handle.wait().await.is_ok());
}

#[test]
fn test_second_request_rejected_while_running() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = exporter(dir.path());

    let mut first = exporter.spawn_export(&snapshot(), "first").unwrap();
    match exporter.spawn_export(&snapshot(), "second") {
        // The first export may already have finished on a fast machine
        Ok(second) => {
            assert!(first.try_wait().map_or(true, |r| r.is_ok()));
            second.wait_blocking().unwrap();
        }
        Err(ExportError::ExportInProgress(id)) => {
            assert_eq!(id, first.id());
            wait_polling(first);
        }
        Err(other) => panic!("unexpected error: {other}"),
    }
}

fn wait_polling(mut handle: molz_export::ExportHandle) {
    loop {
        if let Some(result) = handle.try_wait() {
            result.unwrap();
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
}
