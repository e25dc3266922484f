//! Metadata records extracted from a photo.
//!
//! Every sub-record is an `Option`: `None` means none of its source tags were
//! present in the file, which is different from a tag that was present with a
//! zero value. Absent fields are left out when serialized.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_mount: Option<String>,
}

/// Exposure and lens settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraSettings {
    /// f-number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aperture: Option<f64>,
    /// Exposure time in seconds followed by `s`, e.g. `0.004s`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutter_speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso: Option<u32>,
    /// Millimetres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_compensation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_aperture: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flash_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flash_fired: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metering_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white_balance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digital_zoom_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharpness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain_control: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_distance_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_space: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_rendered: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensing_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_capture_type: Option<String>,
    #[serde(rename = "imageUniqueID", skip_serializing_if = "Option::is_none")]
    pub image_unique_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_specification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composite_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_image_number_of_composite_image: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_exposure_times_of_composite_image: Option<String>,
    #[serde(rename = "focalLengthIn35mmFilm", skip_serializing_if = "Option::is_none")]
    pub focal_length_in_35mm_film: Option<u32>,
}

/// Capture timestamps, normalised to `YYYY-MM-DDTHH:MM:SS` when parseable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digitized: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsec_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsec_time_original: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsec_time_digitized: Option<String>,
    /// Offset of `original` from UTC, e.g. `+09:00`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone_offset: Option<String>,
}

/// A reverse-geocoded place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
}

impl Location {
    /// A location counts as resolved when it names a city or a country.
    pub fn is_resolved(&self) -> bool {
        self.city.is_some() || self.country.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsInfo {
    /// Signed decimal degrees, south is negative.
    pub latitude: f64,
    /// Signed decimal degrees, west is negative.
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_direction_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_time_stamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_date_stamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_information: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub differential: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_positioning_error: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl GpsInfo {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExifRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<CameraSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<CaptureDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps: Option<GpsInfo>,
}

impl ExifRecord {
    /// True when any camera, settings or timestamp data was found.
    pub fn has_exif(&self) -> bool {
        self.camera.is_some() || self.settings.is_some() || self.datetime.is_some()
    }

    pub fn has_gps(&self) -> bool {
        self.gps.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_exif() && !self.has_gps()
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.gps.as_ref().map(|g| (g.latitude, g.longitude))
    }

    pub fn location(&self) -> Option<&Location> {
        self.gps.as_ref().and_then(|g| g.location.as_ref())
    }
}

/// Editorial metadata from the IPTC IIM application record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IptcRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byline_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_primary_location_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_primary_location_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_transmission_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplemental_categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digital_creation_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digital_creation_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub originating_program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_cycle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writer_editor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_identifier: Option<String>,
}

impl IptcRecord {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// XMP packet fields (Dublin Core, xmp, xmpRights, photoshop and Camera Raw).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XmpRecord {
    /// 1 to 5 stars.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rights: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modify_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_terms: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_statement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Camera Raw / Lightroom develop settings (`crs:*`).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub lightroom_edits: BTreeMap<String, String>,
}

impl XmpRecord {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
