// E2E tests for the photometa CLI commands
use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

mod common;
use common::{jpeg_with_exif, nikon_z9_fields, png_bytes};

fn photometa() -> Command {
    let mut cmd = Command::cargo_bin("photometa").unwrap();
    cmd.arg("--no-geocode").arg("--quiet");
    cmd
}

fn setup_photo_dir(temp_dir: &assert_fs::TempDir) -> assert_fs::fixture::ChildPath {
    let photos = temp_dir.child("photos");
    photos.create_dir_all().unwrap();
    photos
        .child("z9.jpg")
        .write_binary(&jpeg_with_exif(64, 48, &nikon_z9_fields()))
        .unwrap();
    photos.child("nested").create_dir_all().unwrap();
    photos.child("nested/plain.png").write_binary(&png_bytes(20, 10)).unwrap();
    photos.child("notes.txt").write_str("not a photo").unwrap();
    photos
}

#[test]
fn test_analyze_table() {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    let photos = setup_photo_dir(&temp_dir);

    photometa()
        .arg("analyze")
        .arg(photos.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("z9.jpg"))
        .stdout(predicate::str::contains("plain.png"))
        .stdout(predicate::str::contains("notes.txt").not())
        .stdout(predicate::str::contains("Total: 2 files"));
}

#[test]
fn test_analyze_json_with_filter() {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    let photos = setup_photo_dir(&temp_dir);

    photometa()
        .arg("analyze")
        .arg(photos.path())
        .arg("--format")
        .arg("json")
        .arg("--camera")
        .arg("Z9")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"fileName\": \"z9.jpg\""))
        .stdout(predicate::str::contains("\"model\": \"Z9\""))
        .stdout(predicate::str::contains("plain.png").not());
}

#[test]
fn test_analyze_csv_to_file() {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    let photos = setup_photo_dir(&temp_dir);
    let output = temp_dir.child("out.csv");

    photometa()
        .arg("analyze")
        .arg(photos.path())
        .arg("--format")
        .arg("csv")
        .arg("--output")
        .arg(output.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 2 images"));

    let csv = std::fs::read_to_string(output.path()).unwrap();
    assert!(csv.starts_with("FileName,FileSize,Format,Width,Height,CameraMake,CameraModel"));
    assert!(csv.contains("\"Nikon\",\"Z9\""));
}

#[test]
fn test_analyze_save_uses_default_filename() {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    let photos = setup_photo_dir(&temp_dir);

    photometa()
        .current_dir(temp_dir.path())
        .arg("analyze")
        .arg(photos.path())
        .arg("--format")
        .arg("text")
        .arg("--save")
        .assert()
        .success()
        .stdout(predicate::str::contains("metadata_export_"));

    let saved: Vec<_> = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("metadata_export_") && name.ends_with(".txt"))
        .collect();
    assert_eq!(saved.len(), 1);
}

#[test]
fn test_table_cannot_be_saved() {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    let photos = setup_photo_dir(&temp_dir);

    photometa()
        .arg("analyze")
        .arg(photos.path())
        .arg("--save")
        .assert()
        .failure()
        .stderr(predicate::str::contains("can't be saved"));
}

#[test]
fn test_invalid_filter_is_rejected() {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    let photos = setup_photo_dir(&temp_dir);

    photometa()
        .arg("analyze")
        .arg(photos.path())
        .arg("--date")
        .arg("last week")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Date parsing error"));
}

#[test]
fn test_missing_path() {
    photometa()
        .arg("analyze")
        .arg("/definitely/not/here")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Path not found"));
}

#[test]
fn test_stats_command() {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    let photos = setup_photo_dir(&temp_dir);

    photometa()
        .arg("stats")
        .arg(photos.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Images:"))
        .stdout(predicate::str::contains("Professional:"))
        .stdout(predicate::str::contains("Camera models: Z9"));
}
