use crate::photometa_core::cli::IntegrityFilter;
use crate::photometa_core::error::{PhotometaError, Result};
use crate::photometa_core::exif::RECORD_DATE_FORMAT;
use crate::photometa_core::media::{ImageMetadataEntry, format_file_size};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use time::{Date, PrimitiveDateTime, macros::format_description};

pub const UNCATEGORIZED: &str = "Uncategorized";

const DAY_FORMAT: &[time::format_description::FormatItem] =
    format_description!("[year]-[month]-[day]");

/// Inclusive bounds; a missing bound does not constrain that side.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NumericRange<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T: PartialOrd + Copy> NumericRange<T> {
    pub fn new(min: Option<T>, max: Option<T>) -> Self {
        Self { min, max }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn contains(&self, value: T) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

/// Inclusive range of capture days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<Date>,
    pub end: Option<Date>,
}

impl DateRange {
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, day: Date) -> bool {
        self.start.is_none_or(|start| day >= start) && self.end.is_none_or(|end| day <= end)
    }

    /// Parse a date filter string like "2024-01-01" or "2024-01-01..2024-12-31".
    /// Either side of a range may be left empty.
    pub fn parse(date_str: &str) -> Result<Self> {
        let parse_day = |s: &str| -> Result<Option<Date>> {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            Date::parse(s, DAY_FORMAT)
                .map(Some)
                .map_err(|e| PhotometaError::InvalidDateFormat(format!("'{}': {}", s, e)))
        };

        if let Some((start, end)) = date_str.split_once("..") {
            return Ok(Self {
                start: parse_day(start)?,
                end: parse_day(end)?,
            });
        }

        // Single date - that exact day
        let day = parse_day(date_str)?;
        Ok(Self {
            start: day,
            end: day,
        })
    }
}

/// Constraints over a collection of entries. Every dimension left at its
/// default imposes nothing; an entry must pass all the others.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub categories: Vec<String>,
    pub date_range: DateRange,
    pub camera_models: Vec<String>,
    pub has_gps: Option<bool>,
    pub has_exif: Option<bool>,
    pub quality: NumericRange<u32>,
    /// Bytes.
    pub file_size: NumericRange<u64>,
    /// Megapixels.
    pub resolution: NumericRange<f64>,
    pub lens_types: Vec<String>,
    pub exposure_modes: Vec<String>,
    pub metering_modes: Vec<String>,
    pub white_balances: Vec<String>,
    pub flash_used: Option<bool>,
    pub has_location: Option<bool>,
    pub integrity: IntegrityFilter,
}

impl FilterSpec {
    /// Parse a size filter string like ">10MB", "<1MB", or "5MB..50MB".
    pub fn parse_size_filter(size_str: &str) -> Result<NumericRange<u64>> {
        parse_range_with(size_str, parse_size_value)
    }

    /// Parse a numeric filter like "80", ">80", "<50" or "60..90".
    pub fn parse_range<T: FromStr + PartialOrd + Copy>(range_str: &str) -> Result<NumericRange<T>> {
        parse_range_with(range_str, |s| s.trim().parse().ok())
    }
}

fn parse_range_with<T: PartialOrd + Copy>(
    input: &str,
    parse_value: impl Fn(&str) -> Option<T>,
) -> Result<NumericRange<T>> {
    let input = input.trim();
    let value = |s: &str| {
        parse_value(s).ok_or_else(|| PhotometaError::Argument(format!("Invalid value '{}'", s)))
    };
    let optional = |s: &str| {
        if s.trim().is_empty() {
            Ok(None)
        } else {
            value(s).map(Some)
        }
    };

    // Handle range: "5MB..50MB"
    if let Some((min, max)) = input.split_once("..") {
        return Ok(NumericRange::new(optional(min)?, optional(max)?));
    }

    // Handle comparison operators
    if let Some(rest) = input.strip_prefix('>') {
        return Ok(NumericRange::new(Some(value(rest)?), None));
    }
    if let Some(rest) = input.strip_prefix('<') {
        return Ok(NumericRange::new(None, Some(value(rest)?)));
    }

    // Exact value
    let exact = value(input)?;
    Ok(NumericRange::new(Some(exact), Some(exact)))
}

/// Parse a size value like "10MB" or "1GB" into bytes.
fn parse_size_value(s: &str) -> Option<u64> {
    let s = s.trim().to_uppercase();

    let (num_part, multiplier) = if let Some(rest) = s.strip_suffix("GB") {
        (rest, 1_073_741_824u64)
    } else if let Some(rest) = s.strip_suffix("MB") {
        (rest, 1_048_576u64)
    } else if let Some(rest) = s.strip_suffix("KB") {
        (rest, 1_024u64)
    } else if let Some(rest) = s.strip_suffix('B') {
        (rest, 1u64)
    } else {
        // Assume bytes if no suffix
        (s.as_str(), 1u64)
    };

    num_part.trim().parse::<u64>().ok().map(|n| n * multiplier)
}

/// `iptc.category`, else the first XMP subject, else `Uncategorized`.
pub fn category_of(entry: &ImageMetadataEntry) -> &str {
    entry
        .iptc
        .category
        .as_deref()
        .or_else(|| entry.xmp.subject.as_ref().and_then(|s| s.first()).map(String::as_str))
        .unwrap_or(UNCATEGORIZED)
}

/// Calendar day of the original capture time, if it can be read.
fn capture_day(entry: &ImageMetadataEntry) -> Option<Date> {
    let original = entry.exif.datetime.as_ref()?.original.as_deref()?;
    Date::parse(original.get(..10)?, DAY_FORMAT).ok()
}

fn has_location(entry: &ImageMetadataEntry) -> bool {
    entry.exif.location().is_some_and(|l| l.is_resolved())
}

fn exact_match(wanted: &[String], value: Option<&String>) -> bool {
    wanted.is_empty() || value.is_some_and(|v| wanted.contains(v))
}

fn flag_matches(wanted: Option<bool>, actual: bool) -> bool {
    wanted.is_none_or(|w| w == actual)
}

/// Whether a single entry passes every constraint of `spec`.
pub fn matches(entry: &ImageMetadataEntry, spec: &FilterSpec) -> bool {
    let exif = &entry.exif;
    let settings = exif.settings.as_ref();

    if !spec.categories.is_empty() && !spec.categories.iter().any(|c| c == category_of(entry)) {
        return false;
    }

    // Entries without a readable capture date are not excluded by date
    if !spec.date_range.is_unbounded() {
        if let Some(day) = capture_day(entry) {
            if !spec.date_range.contains(day) {
                return false;
            }
        }
    }

    if !exact_match(
        &spec.camera_models,
        exif.camera.as_ref().and_then(|c| c.model.as_ref()),
    ) {
        return false;
    }

    if !flag_matches(spec.has_gps, exif.has_gps()) || !flag_matches(spec.has_exif, exif.has_exif())
    {
        return false;
    }

    let quality = entry.analysis.as_ref().map_or(0, |a| a.quality_score);
    if !spec.quality.contains(quality)
        || !spec.file_size.contains(entry.basic_info.file_size)
        || !spec.resolution.contains(entry.basic_info.dimensions.megapixels())
    {
        return false;
    }

    if !spec.lens_types.is_empty() {
        let lens = settings
            .and_then(|s| s.lens.as_deref())
            .unwrap_or_default()
            .to_lowercase();
        if !spec.lens_types.iter().any(|t| lens.contains(&t.to_lowercase())) {
            return false;
        }
    }

    if !exact_match(&spec.exposure_modes, settings.and_then(|s| s.exposure_mode.as_ref()))
        || !exact_match(&spec.metering_modes, settings.and_then(|s| s.metering_mode.as_ref()))
        || !exact_match(&spec.white_balances, settings.and_then(|s| s.white_balance.as_ref()))
    {
        return false;
    }

    let flash_fired = settings.and_then(|s| s.flash_fired).unwrap_or(false);
    if !flag_matches(spec.flash_used, flash_fired)
        || !flag_matches(spec.has_location, has_location(entry))
    {
        return false;
    }

    let corrupted = entry.basic_info.file_integrity.is_corrupted;
    match spec.integrity {
        IntegrityFilter::All => true,
        IntegrityFilter::Valid => !corrupted,
        IntegrityFilter::Corrupted => corrupted,
    }
}

/// The entries passing `spec`, in their original order.
pub fn apply(entries: &[ImageMetadataEntry], spec: &FilterSpec) -> Vec<ImageMetadataEntry> {
    entries
        .iter()
        .filter(|entry| matches(entry, spec))
        .cloned()
        .collect()
}

/// Distinct camera models, sorted.
pub fn camera_models(entries: &[ImageMetadataEntry]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|e| e.exif.camera.as_ref()?.model.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct IPTC categories, sorted.
pub fn categories(entries: &[ImageMetadataEntry]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|e| e.iptc.category.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRange {
    pub earliest: Option<String>,
    pub latest: Option<String>,
}

/// Aggregate figures over a collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub total_images: usize,
    pub total_size: u64,
    pub formats: BTreeMap<String, usize>,
    pub cameras: BTreeMap<String, usize>,
    pub has_gps: usize,
    pub has_exif: usize,
    pub average_rating: f64,
    pub date_range: CaptureRange,
    pub professional_cameras: usize,
    pub corrupted_files: usize,
    pub security_warnings: usize,
    pub average_quality_score: f64,
    pub average_technical_score: f64,
    pub has_location_data: usize,
    pub lens_types: BTreeMap<String, usize>,
    pub exposure_modes: BTreeMap<String, usize>,
    pub metering_modes: BTreeMap<String, usize>,
    pub white_balances: BTreeMap<String, usize>,
    pub flash_usage: usize,
    pub low_light_images: usize,
    pub high_dynamic_range_images: usize,
}

fn count(map: &mut BTreeMap<String, usize>, key: Option<&String>) {
    if let Some(key) = key {
        *map.entry(key.clone()).or_default() += 1;
    }
}

pub fn collection_stats(entries: &[ImageMetadataEntry]) -> CollectionStats {
    let mut stats = CollectionStats {
        total_images: entries.len(),
        ..Default::default()
    };

    let mut total_rating = 0u64;
    let mut rated_images = 0u64;
    let mut total_quality = 0u64;
    let mut total_technical = 0u64;
    let mut scored_images = 0u64;
    let mut earliest: Option<PrimitiveDateTime> = None;
    let mut latest: Option<PrimitiveDateTime> = None;

    for entry in entries {
        let basic = &entry.basic_info;
        let exif = &entry.exif;
        let settings = exif.settings.as_ref();

        stats.total_size += basic.file_size;
        count(&mut stats.formats, Some(&basic.format));
        count(
            &mut stats.cameras,
            exif.camera.as_ref().and_then(|c| c.model.as_ref()),
        );

        if exif.has_gps() {
            stats.has_gps += 1;
        }
        if exif.has_exif() {
            stats.has_exif += 1;
        }

        if let Some(rating) = entry.xmp.rating {
            total_rating += u64::from(rating);
            rated_images += 1;
        }

        let taken = exif
            .datetime
            .as_ref()
            .and_then(|d| d.original.as_deref())
            .and_then(|o| PrimitiveDateTime::parse(o, RECORD_DATE_FORMAT).ok());
        if let Some(taken) = taken {
            earliest = Some(earliest.map_or(taken, |e| e.min(taken)));
            latest = Some(latest.map_or(taken, |l| l.max(taken)));
        }

        if basic.file_integrity.is_corrupted {
            stats.corrupted_files += 1;
        }
        let checks = &basic.file_integrity.security_checks;
        if checks.has_executable_code || checks.has_suspicious_headers {
            stats.security_warnings += 1;
        }

        if let Some(analysis) = &entry.analysis {
            if analysis.camera_analysis.is_professional {
                stats.professional_cameras += 1;
            }
            // Zero scores count as unscored
            if analysis.quality_score > 0 {
                total_quality += u64::from(analysis.quality_score);
                scored_images += 1;
            }
            total_technical += u64::from(analysis.technical_score);
            if analysis.lighting_analysis.is_low_light {
                stats.low_light_images += 1;
            }
            if analysis.lighting_analysis.is_high_dynamic_range {
                stats.high_dynamic_range_images += 1;
            }
        }

        if has_location(entry) {
            stats.has_location_data += 1;
        }

        count(&mut stats.lens_types, settings.and_then(|s| s.lens.as_ref()));
        count(
            &mut stats.exposure_modes,
            settings.and_then(|s| s.exposure_mode.as_ref()),
        );
        count(
            &mut stats.metering_modes,
            settings.and_then(|s| s.metering_mode.as_ref()),
        );
        count(
            &mut stats.white_balances,
            settings.and_then(|s| s.white_balance.as_ref()),
        );
        if settings.and_then(|s| s.flash_fired).unwrap_or(false) {
            stats.flash_usage += 1;
        }
    }

    if rated_images > 0 {
        stats.average_rating = total_rating as f64 / rated_images as f64;
    }
    if scored_images > 0 {
        stats.average_quality_score = total_quality as f64 / scored_images as f64;
        stats.average_technical_score = total_technical as f64 / scored_images as f64;
    }

    let format_day = |d: PrimitiveDateTime| d.format(RECORD_DATE_FORMAT).ok();
    stats.date_range = CaptureRange {
        earliest: earliest.and_then(format_day),
        latest: latest.and_then(format_day),
    };

    stats
}

/// Entries as a fixed-width table for the terminal.
pub fn format_table(entries: &[ImageMetadataEntry]) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{:<32} {:>10} {:<20} {:>7} {:<10}\n",
        "Filename", "Size", "Camera", "Quality", "Status"
    ));
    output.push_str(&format!("{}\n", "─".repeat(83)));

    for entry in entries {
        let camera = entry
            .exif
            .camera
            .as_ref()
            .and_then(|c| c.model.as_deref())
            .unwrap_or("-");
        let quality = entry
            .analysis
            .as_ref()
            .map_or_else(|| "-".to_string(), |a| a.quality_score.to_string());

        output.push_str(&format!(
            "{:<32} {:>10} {:<20} {:>7} {:<10}\n",
            truncate_str(&entry.basic_info.file_name, 32),
            format_file_size(entry.basic_info.file_size),
            truncate_str(camera, 20),
            quality,
            entry.status.as_str()
        ));
    }
    output.push_str(&format!("\nTotal: {} files", entries.len()));
    output
}

fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
