use crate::photometa_core::config::DEFAULT_GEOCODE_TIMEOUT_SECS;
use crate::photometa_core::error::Result;
use crate::photometa_core::export::ExportFormat;
use crate::photometa_core::geocode::DEFAULT_ENDPOINT;
use crate::photometa_core::search::{DateRange, FilterSpec};
use clap::{Args, Parser, Subcommand, ValueEnum};
use simplelog::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Extract, score and export photo metadata")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable file logging to photometa.log
    #[arg(long = "log", global = true)]
    pub log: bool,

    /// Log level for file logging (debug, info, warn, error)
    #[arg(long, default_value_t = LevelFilter::Debug, global = true)]
    pub log_level: LevelFilter,

    /// Skip reverse geocoding of GPS coordinates
    #[arg(long, global = true)]
    pub no_geocode: bool,

    /// Base URL of the reverse geocoding service
    #[arg(long, default_value = DEFAULT_ENDPOINT, global = true)]
    pub geocode_endpoint: String,

    /// Seconds to wait for a location before giving up on it
    #[arg(long, default_value_t = DEFAULT_GEOCODE_TIMEOUT_SECS, global = true)]
    pub geocode_timeout: u64,

    /// Number of files processed in parallel (defaults to the CPU count)
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Don't build base64 previews
    #[arg(long, global = true)]
    pub no_preview: bool,

    /// Hide progress bars
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract metadata from images and print or export it
    Analyze {
        /// Image files or directories to analyze
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        filters: FilterArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Write the export to metadata_export_<date>.<ext> instead of stdout
        #[arg(long)]
        save: bool,

        /// Write the export to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show collection statistics
    Stats {
        /// Image files or directories to summarize
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

/// Filters applied to the extracted entries before output.
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Category (IPTC category, else first XMP subject), comma-separated
    #[arg(long)]
    pub category: Option<String>,

    /// Camera model (exact match), comma-separated
    #[arg(long)]
    pub camera: Option<String>,

    /// Lens (case-insensitive substring match), comma-separated
    #[arg(long)]
    pub lens: Option<String>,

    /// Filter by capture date (YYYY-MM-DD or YYYY-MM-DD..YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<String>,

    /// Quality score (e.g., "80", ">60", "50..90")
    #[arg(long)]
    pub quality: Option<String>,

    /// Filter by file size (e.g., ">10MB", "<1MB", "5MB..50MB")
    #[arg(long)]
    pub size: Option<String>,

    /// Resolution in megapixels (e.g., ">12", "20..50")
    #[arg(long)]
    pub resolution: Option<String>,

    /// Only images with GPS coordinates
    #[arg(long, conflicts_with = "no_gps")]
    pub has_gps: bool,

    /// Only images without GPS coordinates
    #[arg(long)]
    pub no_gps: bool,

    /// Only images with camera, settings or timestamp data
    #[arg(long, conflicts_with = "no_exif")]
    pub has_exif: bool,

    /// Only images without EXIF data
    #[arg(long)]
    pub no_exif: bool,

    /// Only images where the flash fired
    #[arg(long, conflicts_with = "no_flash")]
    pub flash: bool,

    /// Only images where the flash did not fire
    #[arg(long)]
    pub no_flash: bool,

    /// Only images with a resolved place name
    #[arg(long, conflicts_with = "no_location")]
    pub has_location: bool,

    /// Only images without a resolved place name
    #[arg(long)]
    pub no_location: bool,

    /// Exposure mode, comma-separated
    #[arg(long)]
    pub exposure_mode: Option<String>,

    /// Metering mode, comma-separated
    #[arg(long)]
    pub metering_mode: Option<String>,

    /// White balance, comma-separated
    #[arg(long)]
    pub white_balance: Option<String>,

    /// File integrity
    #[arg(long, value_enum, default_value_t = IntegrityFilter::All)]
    pub integrity: IntegrityFilter,
}

fn split_list(list: Option<&String>) -> Vec<String> {
    list.map(|s| {
        s.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn tri_state(yes: bool, no: bool) -> Option<bool> {
    if yes {
        Some(true)
    } else if no {
        Some(false)
    } else {
        None
    }
}

impl FilterArgs {
    pub fn to_spec(&self) -> Result<FilterSpec> {
        let mut spec = FilterSpec {
            categories: split_list(self.category.as_ref()),
            camera_models: split_list(self.camera.as_ref()),
            lens_types: split_list(self.lens.as_ref()),
            exposure_modes: split_list(self.exposure_mode.as_ref()),
            metering_modes: split_list(self.metering_mode.as_ref()),
            white_balances: split_list(self.white_balance.as_ref()),
            has_gps: tri_state(self.has_gps, self.no_gps),
            has_exif: tri_state(self.has_exif, self.no_exif),
            flash_used: tri_state(self.flash, self.no_flash),
            has_location: tri_state(self.has_location, self.no_location),
            integrity: self.integrity,
            ..Default::default()
        };

        if let Some(date_str) = &self.date {
            spec.date_range = DateRange::parse(date_str)?;
        }
        if let Some(quality) = &self.quality {
            spec.quality = FilterSpec::parse_range(quality)?;
        }
        if let Some(size_str) = &self.size {
            spec.file_size = FilterSpec::parse_size_filter(size_str)?;
        }
        if let Some(resolution) = &self.resolution {
            spec.resolution = FilterSpec::parse_range(resolution)?;
        }

        Ok(spec)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum IntegrityFilter {
    #[default]
    All,
    Valid,
    Corrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON array
    Json,
    /// Comma-separated values with a header row
    Csv,
    /// Human readable blocks
    Text,
    /// Summary table
    Table,
}

impl OutputFormat {
    /// The export format, or `None` for the terminal-only table.
    pub fn export_format(&self) -> Option<ExportFormat> {
        match self {
            OutputFormat::Json => Some(ExportFormat::Json),
            OutputFormat::Csv => Some(ExportFormat::Csv),
            OutputFormat::Text => Some(ExportFormat::Text),
            OutputFormat::Table => None,
        }
    }
}
