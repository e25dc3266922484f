pub mod analysis;
pub mod cli;
pub mod config;
pub mod decode;
pub mod error;
pub mod exif;
pub mod export;
pub mod geo;
pub mod geocode;
pub mod integrity;
pub mod iptc;
pub mod media;
pub mod photo;
pub mod search;
pub mod signature;
pub mod store;
pub mod workers;
pub mod xmp;

pub use analysis::{AnalysisRecord, analyze};
pub use cli::{Cli, Commands, IntegrityFilter, OutputFormat};
pub use config::{GeocodeConfig, PipelineConfig};
pub use error::PhotometaError;
pub use export::ExportFormat;
pub use geocode::{GeoLocationResolver, NominatimResolver};
pub use media::{BasicInfo, EntryId, ImageMetadataEntry, ProcessingStatus, RawFile};
pub use photo::{ExifRecord, IptcRecord, Location, XmpRecord};
pub use search::{CollectionStats, FilterSpec, apply, collection_stats};
pub use store::EntryStore;
pub use workers::{BatchSummary, Pipeline, discover_files};
