use crate::photometa_core::analysis::analyze;
use crate::photometa_core::config::PipelineConfig;
use crate::photometa_core::decode::measure_dimensions;
use crate::photometa_core::error::{PhotometaError, Result};
use crate::photometa_core::exif::parse_exif;
use crate::photometa_core::geocode::GeoLocationResolver;
use crate::photometa_core::integrity::{self, isolated};
use crate::photometa_core::iptc::parse_iptc;
use crate::photometa_core::media::{
    BasicInfo, Dimensions, EntryId, FileIntegrity, ImageMetadataEntry, ProcessingStatus, RawFile,
};
use crate::photometa_core::photo::{ExifRecord, IptcRecord, Location, XmpRecord};
use crate::photometa_core::store::EntryStore;
use crate::photometa_core::xmp::parse_xmp;
use base64::{Engine, engine::general_purpose};
use crossbeam_channel::{RecvTimeoutError, Sender, bounded, unbounded};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;
use walkdir::WalkDir;

/// Outcome counts of a batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
}

/// Build a `data:` URI holding the full file content.
pub fn generate_preview(mime_type: &str, bytes: &[u8]) -> String {
    let mime_type = if mime_type.is_empty() {
        "application/octet-stream"
    } else {
        mime_type
    };
    format!(
        "data:{};base64,{}",
        mime_type,
        general_purpose::STANDARD.encode(bytes)
    )
}

/// Expand the given paths into files. Directories are walked recursively.
pub fn discover_files(paths: &[PathBuf]) -> Result<Vec<RawFile>> {
    let mut files = Vec::new();

    for path in paths {
        if !path.exists() {
            return Err(PhotometaError::PathNotFound(path.clone()));
        }

        if path.is_file() {
            files.push(RawFile::from_path(path)?);
            continue;
        }

        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                files.push(RawFile::from_path(entry.path())?);
            }
        }
    }

    log::info!("Discovered {} files", files.len());
    Ok(files)
}

/// Counts geocode lookups still running. Each lookup holds one slot until
/// its resolver returns, even after the waiting entry has moved on.
#[derive(Clone)]
struct LookupSlots {
    in_flight: Arc<AtomicUsize>,
    limit: usize,
}

/// Releases its slot when the lookup thread finishes.
struct LookupSlot(Arc<AtomicUsize>);

impl Drop for LookupSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LookupSlots {
    fn new(limit: usize) -> Self {
        Self {
            in_flight: Arc::new(AtomicUsize::new(0)),
            limit: limit.max(1),
        }
    }

    fn try_acquire(&self) -> Option<LookupSlot> {
        self.in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .ok()
            .map(|_| LookupSlot(Arc::clone(&self.in_flight)))
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Run the resolver on its own thread and hand the result over `tx`.
///
/// The caller waits on the channel with a deadline. Returns `false` without
/// starting a thread when every lookup slot is taken.
fn spawn_geocode(
    slots: &LookupSlots,
    resolver: Arc<dyn GeoLocationResolver>,
    latitude: f64,
    longitude: f64,
    tx: Sender<Location>,
) -> bool {
    let Some(slot) = slots.try_acquire() else {
        log::warn!(
            "Skipping reverse geocoding: {} lookups still running",
            slots.limit
        );
        return false;
    };

    let spawned = thread::Builder::new()
        .name("geocode".to_string())
        .spawn(move || {
            let _slot = slot;
            match panic::catch_unwind(AssertUnwindSafe(|| resolver.resolve(latitude, longitude))) {
                Ok(Ok(location)) if location != Location::default() => {
                    let _ = tx.send(location);
                }
                Ok(Ok(_)) => log::debug!("No place found at {}, {}", latitude, longitude),
                Ok(Err(e)) => log::warn!("Reverse geocoding failed: {}", e),
                Err(_) => log::warn!("Reverse geocoder panicked"),
            }
        });

    match spawned {
        Ok(_) => true,
        Err(e) => {
            log::warn!("Could not start geocoding thread: {}", e);
            false
        }
    }
}

/// Drives entries from `pending` to `completed` or `error`.
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<EntryStore>,
    resolver: Option<Arc<dyn GeoLocationResolver>>,
    lookups: LookupSlots,
}

impl Pipeline {
    /// A pipeline using the resolver described by `config`.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let resolver = config.resolver()?;
        Ok(Self::with_resolver(config, resolver))
    }

    pub fn with_resolver(
        config: PipelineConfig,
        resolver: Option<Arc<dyn GeoLocationResolver>>,
    ) -> Self {
        let lookups = LookupSlots::new(config.geocode.max_lookups);
        Self {
            config,
            store: Arc::new(EntryStore::new()),
            resolver,
            lookups,
        }
    }

    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Geocode lookups whose resolver has not returned yet.
    pub fn geocode_lookups_in_flight(&self) -> usize {
        self.lookups.in_flight()
    }

    /// Input boundary. Files whose declared type is not `image/*` are
    /// skipped; the rest become `pending` entries.
    pub fn accept_files(&self, files: Vec<RawFile>) -> Vec<EntryId> {
        files
            .into_iter()
            .filter_map(|file| {
                if !file.is_image() {
                    let rejected = PhotometaError::UnsupportedType {
                        name: file.name.clone(),
                        mime_type: file.mime_type.clone(),
                    };
                    log::info!("Skipping {}", rejected);
                    return None;
                }
                let entry = ImageMetadataEntry::pending(Arc::new(file));
                let id = entry.id;
                self.store.upsert(entry);
                Some(id)
            })
            .collect()
    }

    /// Accept `files` and process every accepted one concurrently.
    pub fn process_batch(&self, files: Vec<RawFile>) -> Vec<EntryId> {
        let ids = self.accept_files(files);
        let summary = self.run(&ids);
        log::info!(
            "Batch finished: {} completed, {} failed",
            summary.completed,
            summary.failed
        );
        ids
    }

    /// Process the stored entries with the given ids on the worker pool.
    pub fn run(&self, ids: &[EntryId]) -> BatchSummary {
        let pending: Vec<ImageMetadataEntry> =
            ids.iter().filter_map(|id| self.store.get(id)).collect();
        if pending.is_empty() {
            return BatchSummary::default();
        }

        let bar = self
            .config
            .progress_bar(pending.len() as u64, "Extracting metadata");
        let num_workers = self.config.workers.clamp(1, pending.len());

        // Queue every job up front so workers never wait on a producer
        let (job_tx, job_rx) = unbounded::<ImageMetadataEntry>();
        for entry in pending {
            if job_tx.send(entry).is_err() {
                log::error!("Failed to queue job for worker channel");
                break;
            }
        }
        drop(job_tx);

        let (result_tx, result_rx) = unbounded();

        rayon::scope(|s| {
            for _ in 0..num_workers {
                let job_rx_clone = job_rx.clone();
                let result_tx_clone = result_tx.clone();
                let bar_clone = bar.clone();

                s.spawn(move |_| {
                    for entry in job_rx_clone {
                        let done = self.process(entry);
                        bar_clone.inc(1);
                        if result_tx_clone.send(done.status).is_err() {
                            log::error!("Failed to send result to main thread");
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        let summary = result_rx
            .iter()
            .fold(BatchSummary::default(), |mut summary, status| {
                match status {
                    ProcessingStatus::Completed => summary.completed += 1,
                    _ => summary.failed += 1,
                }
                summary
            });

        bar.finish_with_message("Metadata extraction complete");
        summary
    }

    /// Drive one entry through extraction. Every state change is written to
    /// the store as a whole entry; the final entry is returned.
    pub fn process(&self, mut entry: ImageMetadataEntry) -> ImageMetadataEntry {
        if !entry.status.can_advance_to(&ProcessingStatus::Processing) {
            log::warn!(
                "Not processing {}: entry is already {}",
                entry.basic_info.file_name,
                entry.status
            );
            return entry;
        }

        entry.status = ProcessingStatus::Processing;
        self.store.upsert(entry.clone());
        log::debug!("Processing {}", entry.basic_info.file_name);

        let bytes = match entry.file.read() {
            Ok(bytes) => bytes,
            Err(e) => return self.fail(entry, e.to_string()),
        };

        match panic::catch_unwind(AssertUnwindSafe(|| self.extract(&entry, &bytes))) {
            Ok(finished) => {
                log::info!("Extracted metadata from {}", finished.basic_info.file_name);
                self.store.upsert(finished.clone());
                finished
            }
            Err(_) => self.fail(entry, "metadata extraction panicked".to_string()),
        }
    }

    /// Root failure: discard partial data and record the error.
    fn fail(&self, entry: ImageMetadataEntry, message: String) -> ImageMetadataEntry {
        log::error!("Failed to process {}: {}", entry.basic_info.file_name, message);

        let mut failed = ImageMetadataEntry {
            status: ProcessingStatus::Error(message),
            ..ImageMetadataEntry::pending(Arc::clone(&entry.file))
        };
        failed.id = entry.id;
        self.store.upsert(failed.clone());
        failed
    }

    /// Fan out the independent extractions over the shared bytes and merge
    /// them into a completed entry.
    fn extract(&self, entry: &ImageMetadataEntry, bytes: &[u8]) -> ImageMetadataEntry {
        let file = entry.file.as_ref();

        let mut exif = ExifRecord::default();
        let mut iptc = IptcRecord::default();
        let mut xmp = XmpRecord::default();
        let mut file_integrity = FileIntegrity::default();
        let mut dimensions = Dimensions::default();
        let mut preview = None;

        let (geo_tx, geo_rx) = bounded::<Location>(1);
        let mut geocode_deadline: Option<Instant> = None;

        rayon::scope(|s| {
            s.spawn(|_| {
                exif = isolated("exif", ExifRecord::default(), || parse_exif(bytes));

                // Dependent stage: only once EXIF has produced coordinates
                if let (Some((lat, lon)), Some(resolver)) = (exif.coordinates(), &self.resolver) {
                    if spawn_geocode(&self.lookups, Arc::clone(resolver), lat, lon, geo_tx.clone()) {
                        geocode_deadline = Some(Instant::now() + self.config.geocode.timeout);
                    }
                }
            });
            s.spawn(|_| iptc = isolated("iptc", IptcRecord::default(), || parse_iptc(bytes)));
            s.spawn(|_| xmp = isolated("xmp", XmpRecord::default(), || parse_xmp(bytes)));
            s.spawn(|_| {
                file_integrity = isolated("integrity", FileIntegrity::default(), || {
                    integrity::evaluate(file, bytes)
                })
            });
            s.spawn(|_| {
                dimensions = isolated("dimensions", Dimensions::default(), || {
                    measure_dimensions(bytes)
                })
            });
            if self.config.previews {
                s.spawn(|_| {
                    preview = isolated("preview", None, || {
                        Some(generate_preview(&file.mime_type, bytes))
                    })
                });
            }
        });
        drop(geo_tx);

        if let (Some(deadline), Some(gps)) = (geocode_deadline, exif.gps.as_mut()) {
            match geo_rx.recv_deadline(deadline) {
                Ok(location) => gps.location = Some(location),
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!("Reverse geocoding timed out for {}", file.name)
                }
                Err(RecvTimeoutError::Disconnected) => {
                    log::debug!("No location resolved for {}", file.name)
                }
            }
        }

        let mut basic_info = BasicInfo::for_file(file);
        basic_info.dimensions = dimensions;
        basic_info.resolution = dimensions.into();
        basic_info.file_integrity = file_integrity;

        let analysis = analyze(&basic_info, &exif);

        ImageMetadataEntry {
            id: entry.id,
            file: Arc::clone(&entry.file),
            preview,
            basic_info,
            exif,
            iptc,
            xmp,
            analysis: Some(analysis),
            status: ProcessingStatus::Completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photometa_core::exif::tests::{ascii, rational, tiff_with};
    use exif::Tag;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::time::Duration;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn paris_tiff() -> Vec<u8> {
        tiff_with(&[
            ascii(Tag::Make, "Canon"),
            rational(Tag::GPSLatitude, &[(48, 1), (51, 1), (2376, 100)]),
            ascii(Tag::GPSLatitudeRef, "N"),
            rational(Tag::GPSLongitude, &[(2, 1), (21, 1), (768, 100)]),
            ascii(Tag::GPSLongitudeRef, "E"),
        ])
    }

    fn config(timeout: Duration) -> PipelineConfig {
        let mut config = PipelineConfig {
            workers: 4,
            ..Default::default()
        };
        config.geocode.timeout = timeout;
        config
    }

    fn pipeline(resolver: Option<Arc<dyn GeoLocationResolver>>) -> Pipeline {
        Pipeline::with_resolver(config(Duration::from_secs(5)), resolver)
    }

    fn paris() -> Result<Location> {
        Ok(Location {
            city: Some("Paris".to_string()),
            country: Some("France".to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_generate_preview() {
        assert_eq!(
            generate_preview("image/png", b"abc"),
            "data:image/png;base64,YWJj"
        );
        assert_eq!(generate_preview("", b""), "data:application/octet-stream;base64,");
    }

    #[test]
    fn test_process_png() {
        let pipeline = pipeline(None);
        let ids = pipeline.process_batch(vec![RawFile::from_bytes(
            "red.png",
            "image/png",
            png_bytes(30, 20),
        )]);

        let entry = pipeline.store().get(&ids[0]).unwrap();
        assert_eq!(entry.status, ProcessingStatus::Completed);
        assert_eq!(entry.basic_info.dimensions, Dimensions { width: 30, height: 20 });
        assert_eq!(entry.basic_info.resolution.x, 30);
        assert!(!entry.basic_info.file_integrity.is_corrupted);
        assert!(entry.preview.unwrap().starts_with("data:image/png;base64,"));
        assert!(entry.analysis.is_some());
    }

    #[test]
    fn test_non_images_are_rejected_at_the_boundary() {
        let pipeline = pipeline(None);
        let ids = pipeline.accept_files(vec![
            RawFile::from_bytes("notes.txt", "text/plain", b"hello".to_vec()),
            RawFile::from_bytes("a.png", "image/png", png_bytes(2, 2)),
        ]);
        assert_eq!(ids.len(), 1);
        assert_eq!(pipeline.store().len(), 1);
        assert_eq!(
            pipeline.store().get(&ids[0]).unwrap().status,
            ProcessingStatus::Pending
        );
    }

    #[test]
    fn test_geocoded_location_is_attached() {
        let resolver: Arc<dyn GeoLocationResolver> = Arc::new(|_: f64, _: f64| paris());
        let pipeline = pipeline(Some(resolver));
        let ids = pipeline.process_batch(vec![RawFile::from_bytes(
            "paris.tif",
            "image/tiff",
            paris_tiff(),
        )]);

        let entry = pipeline.store().get(&ids[0]).unwrap();
        assert_eq!(entry.status, ProcessingStatus::Completed);
        let location = entry.exif.location().unwrap();
        assert_eq!(location.city.as_deref(), Some("Paris"));
    }

    #[test]
    fn test_slow_geocoder_is_bounded() {
        let resolver: Arc<dyn GeoLocationResolver> = Arc::new(|_: f64, _: f64| {
            thread::sleep(Duration::from_secs(3));
            paris()
        });
        let pipeline = Pipeline::with_resolver(config(Duration::from_millis(100)), Some(resolver));

        let started = Instant::now();
        let ids = pipeline.process_batch(vec![RawFile::from_bytes(
            "paris.tif",
            "image/tiff",
            paris_tiff(),
        )]);
        assert!(started.elapsed() < Duration::from_secs(2));

        let entry = pipeline.store().get(&ids[0]).unwrap();
        assert_eq!(entry.status, ProcessingStatus::Completed);
        assert!(entry.exif.gps.is_some());
        assert!(entry.exif.location().is_none());
    }

    #[test]
    fn test_hung_geocoder_holds_a_bounded_number_of_threads() {
        let (release_tx, release_rx) = bounded::<()>(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let resolver: Arc<dyn GeoLocationResolver> = Arc::new(move |_: f64, _: f64| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            let _ = release_rx.recv();
            paris()
        });

        let mut config = config(Duration::from_millis(50));
        config.workers = 1;
        config.geocode.max_lookups = 1;
        let pipeline = Pipeline::with_resolver(config, Some(resolver));

        let ids = pipeline.process_batch(vec![
            RawFile::from_bytes("first.tif", "image/tiff", paris_tiff()),
            RawFile::from_bytes("second.tif", "image/tiff", paris_tiff()),
        ]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.geocode_lookups_in_flight(), 1);
        for id in &ids {
            let entry = pipeline.store().get(id).unwrap();
            assert_eq!(entry.status, ProcessingStatus::Completed);
            assert!(entry.exif.location().is_none());
        }

        // Once the resolver returns its slot is free again
        drop(release_tx);
        let deadline = Instant::now() + Duration::from_secs(5);
        while pipeline.geocode_lookups_in_flight() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(pipeline.geocode_lookups_in_flight(), 0);

        let ids = pipeline.process_batch(vec![RawFile::from_bytes(
            "third.tif",
            "image/tiff",
            paris_tiff(),
        )]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let entry = pipeline.store().get(&ids[0]).unwrap();
        assert_eq!(entry.exif.location().unwrap().city.as_deref(), Some("Paris"));
    }

    #[test]
    fn test_failing_geocoder_leaves_location_absent() {
        let resolver: Arc<dyn GeoLocationResolver> = Arc::new(|_: f64, _: f64| -> Result<Location> {
            Err(PhotometaError::Geocode("service unavailable".to_string()))
        });
        let pipeline = pipeline(Some(resolver));
        let ids = pipeline.process_batch(vec![RawFile::from_bytes(
            "paris.tif",
            "image/tiff",
            paris_tiff(),
        )]);

        let entry = pipeline.store().get(&ids[0]).unwrap();
        assert_eq!(entry.status, ProcessingStatus::Completed);
        assert!(entry.exif.location().is_none());
    }

    #[test]
    fn test_unreadable_file_becomes_error() {
        let dir = std::env::temp_dir().join(format!("photometa-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gone.jpg");
        std::fs::write(&path, png_bytes(2, 2)).unwrap();
        let file = RawFile::from_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let pipeline = pipeline(None);
        let ids = pipeline.process_batch(vec![file]);
        let entry = pipeline.store().get(&ids[0]).unwrap();

        assert!(matches!(entry.status, ProcessingStatus::Error(_)));
        assert!(entry.error_message().unwrap().contains("gone.jpg"));
        assert!(entry.analysis.is_none());
        assert!(entry.preview.is_none());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_terminal_entries_are_not_reprocessed() {
        let pipeline = pipeline(None);
        let ids = pipeline.process_batch(vec![RawFile::from_bytes(
            "a.png",
            "image/png",
            png_bytes(2, 2),
        )]);
        let done = pipeline.store().get(&ids[0]).unwrap();

        let again = pipeline.process(done.clone());
        assert_eq!(again.status, ProcessingStatus::Completed);
        assert_eq!(pipeline.run(&ids), BatchSummary { completed: 1, failed: 0 });
    }

    #[test]
    fn test_batch_failures_are_isolated() {
        let dir = std::env::temp_dir().join(format!("photometa-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("vanishing.png");
        std::fs::write(&path, png_bytes(2, 2)).unwrap();
        let vanishing = RawFile::from_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let mut files: Vec<RawFile> = (0..6)
            .map(|i| RawFile::from_bytes(format!("{}.png", i), "image/png", png_bytes(4, 4)))
            .collect();
        files.push(vanishing);

        let pipeline = pipeline(None);
        let ids = pipeline.accept_files(files);
        let summary = pipeline.run(&ids);

        assert_eq!(summary, BatchSummary { completed: 6, failed: 1 });
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_discover_files_walks_directories() {
        let dir = std::env::temp_dir().join(format!("photometa-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("a.png"), png_bytes(2, 2)).unwrap();
        std::fs::write(dir.join("nested").join("b.jpg"), b"not really").unwrap();
        std::fs::write(dir.join("notes.txt"), b"hello").unwrap();

        let files = discover_files(&[dir.clone()]).unwrap();
        let mut names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        names.sort();
        assert_eq!(names, ["a.png", "b.jpg", "notes.txt"]);

        let missing = discover_files(&[dir.join("missing")]);
        assert!(matches!(missing, Err(PhotometaError::PathNotFound(_))));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
