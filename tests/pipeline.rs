// End-to-end scenarios for the extraction pipeline
use photometa::photometa_core::export::{self, ExportFormat, ExportRecord};
use photometa::photometa_core::search::{self, FilterSpec, NumericRange};
use photometa::photometa_core::{
    GeoLocationResolver, ImageMetadataEntry, IntegrityFilter, Location, Pipeline, PipelineConfig,
    ProcessingStatus, RawFile,
};
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{jpeg_with_exif, mz_bytes, nikon_z9_fields, paris_gps_fields, png_bytes};

fn offline_config() -> PipelineConfig {
    let mut config = PipelineConfig {
        workers: 4,
        ..Default::default()
    };
    config.geocode.enabled = false;
    config
}

fn run_one(pipeline: &Pipeline, file: RawFile) -> ImageMetadataEntry {
    let ids = pipeline.process_batch(vec![file]);
    assert_eq!(ids.len(), 1);
    pipeline.store().get(&ids[0]).unwrap()
}

#[test]
fn test_executable_declared_as_jpeg_completes_with_warnings() {
    let pipeline = Pipeline::new(offline_config()).unwrap();
    let entry = run_one(
        &pipeline,
        RawFile::from_bytes("holiday.jpg", "image/jpeg", mz_bytes()),
    );

    assert_eq!(entry.status, ProcessingStatus::Completed);
    let integrity = &entry.basic_info.file_integrity;
    assert!(integrity.security_checks.has_executable_code);
    assert!(integrity.security_checks.has_suspicious_headers);
    assert!(integrity.security_checks.is_valid_format);
    assert!(integrity.is_corrupted);
}

#[test]
fn test_empty_file() {
    let pipeline = Pipeline::new(offline_config()).unwrap();
    let entry = run_one(&pipeline, RawFile::from_bytes("empty.png", "image/png", Vec::new()));

    assert_eq!(entry.status, ProcessingStatus::Completed);
    assert_eq!(entry.basic_info.dimensions.width, 0);
    assert_eq!(entry.basic_info.dimensions.height, 0);
    assert!(entry.basic_info.file_integrity.is_corrupted);
    assert_eq!(entry.analysis.unwrap().quality_score, 5);
    // Digests of the empty input are still computed
    assert_eq!(
        entry.basic_info.file_integrity.md5_hash,
        "d41d8cd98f00b204e9800998ecf8427e"
    );
}

#[test]
fn test_camera_exif_is_scored() {
    let pipeline = Pipeline::new(offline_config()).unwrap();
    let entry = run_one(
        &pipeline,
        RawFile::from_bytes("z9.jpg", "image/jpeg", jpeg_with_exif(64, 48, &nikon_z9_fields())),
    );

    assert_eq!(entry.status, ProcessingStatus::Completed);
    let camera = entry.exif.camera.as_ref().unwrap();
    assert_eq!(camera.make.as_deref(), Some("Nikon"));
    assert_eq!(camera.model.as_deref(), Some("Z9"));
    let settings = entry.exif.settings.as_ref().unwrap();
    assert_eq!(settings.iso, Some(100));
    assert_eq!(settings.aperture, Some(2.8));
    assert_eq!(
        entry.exif.datetime.as_ref().unwrap().original.as_deref(),
        Some("2024-05-21T12:30:00")
    );
    assert_eq!(entry.basic_info.dimensions.width, 64);

    let analysis = entry.analysis.unwrap();
    // 5 (resolution) + 25 (model) + 15 (ISO) + 15 (aperture) + 20 (intact)
    assert_eq!(analysis.quality_score, 80);
    assert_eq!(analysis.technical_score, 70);
    assert_eq!(analysis.composition_score, 75);
    assert!(analysis.camera_analysis.is_professional);
}

#[test]
fn test_unreachable_geocoder_leaves_location_absent() {
    let mut config = offline_config();
    config.geocode.enabled = true;
    config.geocode.endpoint = "http://127.0.0.1:9".to_string();
    config.geocode.timeout = Duration::from_secs(2);
    let pipeline = Pipeline::new(config).unwrap();

    let entry = run_one(
        &pipeline,
        RawFile::from_bytes("paris.jpg", "image/jpeg", jpeg_with_exif(16, 16, &paris_gps_fields())),
    );

    assert_eq!(entry.status, ProcessingStatus::Completed);
    let gps = entry.exif.gps.as_ref().unwrap();
    assert!((gps.latitude - 48.8566).abs() < 1e-3);
    assert!((gps.longitude - 2.3522).abs() < 1e-3);
    assert!(gps.location.is_none());
}

fn paris() -> photometa::photometa_core::error::Result<Location> {
    Ok(Location {
        city: Some("Paris".to_string()),
        country: Some("France".to_string()),
        ..Default::default()
    })
}

#[test]
fn test_custom_resolver_location_reaches_export() {
    let resolver: Arc<dyn GeoLocationResolver> = Arc::new(|_: f64, _: f64| paris());
    let pipeline = Pipeline::with_resolver(offline_config(), Some(resolver));
    let entry = run_one(
        &pipeline,
        RawFile::from_bytes("paris.jpg", "image/jpeg", jpeg_with_exif(16, 16, &paris_gps_fields())),
    );

    let json = export::to_json(std::slice::from_ref(&entry)).unwrap();
    assert!(json.contains("\"city\": \"Paris\""));

    let located = FilterSpec {
        has_location: Some(true),
        ..Default::default()
    };
    assert_eq!(search::apply(std::slice::from_ref(&entry), &located).len(), 1);
}

#[test]
fn test_non_image_is_never_an_entry() {
    let pipeline = Pipeline::new(offline_config()).unwrap();
    let ids = pipeline.process_batch(vec![RawFile::from_bytes(
        "readme.txt",
        "text/plain",
        b"not a photo".to_vec(),
    )]);
    assert!(ids.is_empty());
    assert!(pipeline.store().is_empty());
}

#[test]
fn test_batch_keeps_submission_order() {
    let pipeline = Pipeline::new(offline_config()).unwrap();
    let files: Vec<RawFile> = (0..12)
        .map(|i| RawFile::from_bytes(format!("img-{:02}.png", i), "image/png", png_bytes(8 + i, 8)))
        .collect();
    let ids = pipeline.process_batch(files);

    let snapshot = pipeline.store().snapshot();
    assert_eq!(snapshot.len(), 12);
    assert!(snapshot.iter().all(|e| e.status == ProcessingStatus::Completed));
    let stored_ids: Vec<_> = snapshot.iter().map(|e| e.id).collect();
    assert_eq!(stored_ids, ids);
    assert_eq!(snapshot[3].basic_info.dimensions.width, 11);
}

fn mixed_collection() -> Vec<ImageMetadataEntry> {
    let pipeline = Pipeline::new(offline_config()).unwrap();
    pipeline.process_batch(vec![
        RawFile::from_bytes("z9.jpg", "image/jpeg", jpeg_with_exif(64, 48, &nikon_z9_fields())),
        RawFile::from_bytes("plain.png", "image/png", png_bytes(32, 32)),
        RawFile::from_bytes("broken.jpg", "image/jpeg", vec![0xFF, 0xD8, 0xFF, 0x00]),
    ]);
    pipeline.store().snapshot()
}

#[test]
fn test_filter_laws_over_pipeline_output() {
    let entries = mixed_collection();
    let ids = |list: &[ImageMetadataEntry]| list.iter().map(|e| e.id).collect::<Vec<_>>();
    assert_eq!(ids(&search::apply(&entries, &FilterSpec::default())), ids(&entries));

    let valid = FilterSpec {
        integrity: IntegrityFilter::Valid,
        ..Default::default()
    };
    let valid_pro = FilterSpec {
        quality: NumericRange::new(Some(70), None),
        ..valid.clone()
    };
    let loose = search::apply(&entries, &valid);
    let strict = search::apply(&entries, &valid_pro);
    assert_eq!(loose.len(), 2);
    assert_eq!(strict.len(), 1);
    assert!(strict.iter().all(|s| loose.iter().any(|l| l.id == s.id)));
    assert_eq!(strict[0].basic_info.file_name, "z9.jpg");
}

#[test]
fn test_json_export_reads_back() {
    let entries = mixed_collection();
    let json = export::export(&entries, ExportFormat::Json).unwrap();
    assert!(!json.contains("null"));

    let records: Vec<ExportRecord> = serde_json::from_str(&json).unwrap();
    let expected: Vec<ExportRecord> = entries.iter().map(ExportRecord::from).collect();
    assert_eq!(records, expected);
}

#[test]
fn test_collection_stats_over_pipeline_output() {
    let stats = search::collection_stats(&mixed_collection());
    assert_eq!(stats.total_images, 3);
    assert_eq!(stats.corrupted_files, 1);
    assert_eq!(stats.professional_cameras, 1);
    assert_eq!(stats.cameras.get("Z9"), Some(&1));
    assert_eq!(stats.formats.get("image/jpeg"), Some(&2));
}
