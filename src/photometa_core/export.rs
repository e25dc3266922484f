use crate::photometa_core::error::Result;
use crate::photometa_core::geo;
use crate::photometa_core::media::{Dimensions, ImageMetadataEntry};
use crate::photometa_core::photo::{ExifRecord, IptcRecord, XmpRecord};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs;
use std::path::Path;
use time::{OffsetDateTime, macros::format_description};

pub const CSV_HEADERS: [&str; 19] = [
    "FileName",
    "FileSize",
    "Format",
    "Width",
    "Height",
    "CameraMake",
    "CameraModel",
    "Aperture",
    "ShutterSpeed",
    "ISO",
    "FocalLength",
    "DateTimeOriginal",
    "Latitude",
    "Longitude",
    "Caption",
    "Keywords",
    "Copyright",
    "Creator",
    "Rating",
];

const TEXT_RULE_WIDTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Text,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Text => "txt",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
            ExportFormat::Text => "text/plain",
        }
    }

    /// `metadata_export_<YYYY-MM-DD>.<ext>` for today's UTC date.
    pub fn default_filename(&self) -> String {
        self.filename_for(OffsetDateTime::now_utc())
    }

    fn filename_for(&self, now: OffsetDateTime) -> String {
        let day = now
            .format(format_description!("[year]-[month]-[day]"))
            .unwrap_or_else(|_| now.date().to_string());
        format!("metadata_export_{}.{}", day, self.extension())
    }
}

/// The exported view of one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub file_name: String,
    pub file_size_formatted: String,
    pub format: String,
    pub dimensions: Dimensions,
    pub exif: ExifRecord,
    pub iptc: IptcRecord,
    pub xmp: XmpRecord,
}

impl From<&ImageMetadataEntry> for ExportRecord {
    fn from(entry: &ImageMetadataEntry) -> Self {
        Self {
            file_name: entry.basic_info.file_name.clone(),
            file_size_formatted: entry.basic_info.file_size_formatted.clone(),
            format: entry.basic_info.format.clone(),
            dimensions: entry.basic_info.dimensions,
            exif: entry.exif.clone(),
            iptc: entry.iptc.clone(),
            xmp: entry.xmp.clone(),
        }
    }
}

/// Render entries in `format`.
pub fn export(entries: &[ImageMetadataEntry], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => to_json(entries),
        ExportFormat::Csv => Ok(to_csv(entries)),
        ExportFormat::Text => Ok(to_text(entries)),
    }
}

/// Render entries and write them to `path`.
pub fn save(entries: &[ImageMetadataEntry], format: ExportFormat, path: &Path) -> Result<()> {
    let content = export(entries, format)?;
    fs::write(path, content)?;
    log::info!(
        "Exported {} entries as {} to {}",
        entries.len(),
        format.mime_type(),
        path.display()
    );
    Ok(())
}

pub fn to_json(entries: &[ImageMetadataEntry]) -> Result<String> {
    let records: Vec<ExportRecord> = entries.iter().map(ExportRecord::from).collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

fn cell<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn to_csv(entries: &[ImageMetadataEntry]) -> String {
    let mut lines = vec![CSV_HEADERS.join(",")];

    for entry in entries {
        let basic = &entry.basic_info;
        let camera = entry.exif.camera.as_ref();
        let settings = entry.exif.settings.as_ref();
        let gps = entry.exif.gps.as_ref();

        let row = [
            basic.file_name.clone(),
            basic.file_size_formatted.clone(),
            basic.format.clone(),
            basic.dimensions.width.to_string(),
            basic.dimensions.height.to_string(),
            cell(camera.and_then(|c| c.make.as_ref())),
            cell(camera.and_then(|c| c.model.as_ref())),
            cell(settings.and_then(|s| s.aperture)),
            cell(settings.and_then(|s| s.shutter_speed.as_ref())),
            cell(settings.and_then(|s| s.iso)),
            cell(settings.and_then(|s| s.focal_length)),
            cell(entry.exif.datetime.as_ref().and_then(|d| d.original.as_ref())),
            cell(gps.map(|g| g.latitude)),
            cell(gps.map(|g| g.longitude)),
            cell(entry.iptc.caption.as_ref()),
            entry.iptc.keywords.as_deref().unwrap_or_default().join("; "),
            cell(entry.iptc.copyright.as_ref()),
            cell(entry.iptc.creator.as_ref()),
            cell(entry.xmp.rating),
        ];

        lines.push(row.iter().map(|c| quote(c)).collect::<Vec<_>>().join(","));
    }

    lines.join("\n")
}

fn text_block(entry: &ImageMetadataEntry) -> String {
    let basic = &entry.basic_info;
    let exif = &entry.exif;
    let mut lines = vec![
        format!("File: {}", basic.file_name),
        format!("Size: {}", basic.file_size_formatted),
        format!("Format: {}", basic.format),
        format!(
            "Dimensions: {} x {}",
            basic.dimensions.width, basic.dimensions.height
        ),
        String::new(),
    ];

    if let Some(camera) = &exif.camera {
        lines.push("Camera Information:".to_string());
        lines.push(format!("  Make: {}", camera.make.as_deref().unwrap_or_default()));
        lines.push(format!("  Model: {}", camera.model.as_deref().unwrap_or_default()));
        lines.push(String::new());
    }

    if let Some(settings) = &exif.settings {
        lines.push("Camera Settings:".to_string());
        if let Some(aperture) = settings.aperture {
            lines.push(format!("  Aperture: f/{}", aperture));
        }
        if let Some(shutter) = &settings.shutter_speed {
            lines.push(format!("  Shutter Speed: {}", shutter));
        }
        if let Some(iso) = settings.iso {
            lines.push(format!("  ISO: {}", iso));
        }
        if let Some(focal_length) = settings.focal_length {
            lines.push(format!("  Focal Length: {}mm", focal_length));
        }
        if let Some(lens) = &settings.lens {
            lines.push(format!("  Lens: {}", lens));
        }
        lines.push(String::new());
    }

    if let Some(original) = exif.datetime.as_ref().and_then(|d| d.original.as_ref()) {
        lines.push("Date & Time:".to_string());
        lines.push(format!("  Original: {}", original));
        lines.push(String::new());
    }

    if let Some(gps) = &exif.gps {
        lines.push("GPS Coordinates:".to_string());
        lines.push(format!("  Latitude: {}", gps.latitude));
        lines.push(format!("  Longitude: {}", gps.longitude));
        lines.push(format!(
            "  DMS: {}",
            geo::format_coordinates(gps.latitude, gps.longitude).dms
        ));
        if let Some(location) = gps.location.as_ref().filter(|l| l.is_resolved()) {
            let place: Vec<&str> = [&location.city, &location.state, &location.country]
                .into_iter()
                .filter_map(|part| part.as_deref())
                .collect();
            lines.push(format!("  Location: {}", place.join(", ")));
        }
        lines.push(String::new());
    }

    if let Some(caption) = &entry.iptc.caption {
        lines.push("IPTC Data:".to_string());
        lines.push(format!("  Caption: {}", caption));
        lines.push(String::new());
    }

    if let Some(keywords) = entry.iptc.keywords.as_ref().filter(|k| !k.is_empty()) {
        lines.push(format!("  Keywords: {}", keywords.join(", ")));
    }

    if let Some(rating) = entry.xmp.rating {
        lines.push(format!("  Rating: {}/5", rating));
    }

    lines.push("=".repeat(TEXT_RULE_WIDTH));
    lines.join("\n")
}

pub fn to_text(entries: &[ImageMetadataEntry]) -> String {
    entries
        .iter()
        .map(text_block)
        .collect::<Vec<_>>()
        .join("\n\n")
}
