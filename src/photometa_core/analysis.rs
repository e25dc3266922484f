//! Heuristic scoring of a merged metadata record.
//!
//! All functions here are pure: the same record always yields the same
//! analysis. Thresholds live in the tables below.
//!
//! Settings fields that are absent never earn points and never trip a flag,
//! the same way a comparison against a missing number is false.

use crate::photometa_core::exif::RECORD_DATE_FORMAT;
use crate::photometa_core::geo::{self, Season, TimeOfDay};
use crate::photometa_core::media::BasicInfo;
use crate::photometa_core::photo::{CameraSettings, ExifRecord};
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

/// Camera bodies counted as professional, by make.
pub const PROFESSIONAL_CAMERAS: &[(&str, &[&str])] = &[
    ("Canon", &["EOS R5", "EOS R6", "EOS 5D Mark IV", "EOS 1D X Mark III"]),
    ("Nikon", &["Z9", "Z8", "D850", "D6", "Z7 II"]),
    ("Sony", &["A1", "A7R V", "A7S III", "A9 II", "A7 IV"]),
    ("Fujifilm", &["GFX 100S", "X-T4", "X-Pro3", "X100V"]),
    ("Leica", &["M11", "Q3", "SL3", "M10-R"]),
];

pub const MAX_SCORE: u32 = 100;

/// Minimum megapixels and points, highest tier first.
pub const RESOLUTION_TIERS: &[(f64, u32)] = &[(50.0, 25), (24.0, 20), (12.0, 15), (6.0, 10)];
pub const RESOLUTION_FLOOR: u32 = 5;

pub const PROFESSIONAL_MODEL_POINTS: u32 = 25;
pub const PROFESSIONAL_BRAND_POINTS: u32 = 15;
pub const ANY_MAKE_POINTS: u32 = 10;
pub const INTEGRITY_POINTS: u32 = 20;

/// Maximum ISO and points, lowest ISO first.
pub const QUALITY_ISO_TIERS: &[(u32, u32)] = &[(100, 15), (400, 12), (1600, 8), (6400, 4)];
/// Maximum f-number and points, widest first.
pub const QUALITY_APERTURE_TIERS: &[(f64, u32)] = &[(2.8, 15), (5.6, 10), (11.0, 5)];

pub const TECHNICAL_ISO_TIERS: &[(u32, u32)] = &[(100, 40), (400, 35), (1600, 25), (6400, 15)];
/// Points for an ISO above every tier.
pub const TECHNICAL_ISO_FLOOR: u32 = 5;
pub const TECHNICAL_APERTURE_TIERS: &[(f64, u32)] = &[(2.8, 30), (5.6, 20), (11.0, 10)];
/// Minimum exposure time in seconds and points.
pub const SHUTTER_TIERS: &[(f64, u32)] = &[(1.0 / 1000.0, 30), (1.0 / 250.0, 20), (1.0 / 60.0, 10)];

pub const LOW_LIGHT_ISO: u32 = 800;
pub const LOW_LIGHT_SHUTTER: f64 = 1.0 / 60.0;
pub const UNDER_EXPOSED_ISO: u32 = 3200;
pub const UNDER_EXPOSED_SHUTTER: f64 = 1.0 / 30.0;
pub const OVER_EXPOSED_ISO: u32 = 100;
pub const OVER_EXPOSED_SHUTTER: f64 = 1.0 / 1000.0;
pub const HDR_MIN_ISO: u32 = 1600;
pub const HDR_MAX_APERTURE: f64 = 4.0;
/// At or below: shallow depth of field, high contrast.
pub const WIDE_APERTURE: f64 = 2.8;
/// At or above: deep depth of field, low contrast.
pub const NARROW_APERTURE: f64 = 8.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureLevel {
    Under,
    #[default]
    Normal,
    Over,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContrastLevel {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthOfField {
    Shallow,
    #[default]
    Medium,
    Deep,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightingAnalysis {
    pub is_low_light: bool,
    pub is_high_dynamic_range: bool,
    pub exposure_level: ExposureLevel,
    pub contrast_level: ContrastLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraAnalysis {
    pub is_professional: bool,
    pub depth_of_field: DepthOfField,
    pub motion_blur: bool,
    pub camera_shake: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationAnalysis {
    pub time_of_day: TimeOfDay,
    pub season: Season,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub quality_score: u32,
    pub technical_score: u32,
    pub composition_score: u32,
    pub lighting_analysis: LightingAnalysis,
    pub camera_analysis: CameraAnalysis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_analysis: Option<LocationAnalysis>,
}

/// Points of the first tier whose threshold the value does not exceed.
fn tier_at_most<T: PartialOrd + Copy>(value: Option<T>, tiers: &[(T, u32)]) -> Option<u32> {
    let value = value?;
    tiers
        .iter()
        .find(|(threshold, _)| value <= *threshold)
        .map(|(_, points)| *points)
}

/// Points of the first tier whose threshold the value reaches.
fn tier_at_least<T: PartialOrd + Copy>(value: Option<T>, tiers: &[(T, u32)]) -> Option<u32> {
    let value = value?;
    tiers
        .iter()
        .find(|(threshold, _)| value >= *threshold)
        .map(|(_, points)| *points)
}

fn above<T: PartialOrd>(value: Option<T>, threshold: T) -> bool {
    value.is_some_and(|v| v > threshold)
}

fn below<T: PartialOrd>(value: Option<T>, threshold: T) -> bool {
    value.is_some_and(|v| v < threshold)
}

fn at_most<T: PartialOrd>(value: Option<T>, threshold: T) -> bool {
    value.is_some_and(|v| v <= threshold)
}

fn at_least<T: PartialOrd>(value: Option<T>, threshold: T) -> bool {
    value.is_some_and(|v| v >= threshold)
}

/// Read a shutter string as seconds.
///
/// Every character other than digits and `.` is dropped first, so `0.004s`
/// reads as 0.004 but `1/500s` reads as 1500.
pub fn parse_shutter_seconds(shutter: &str) -> Option<f64> {
    let kept: String = shutter
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_digit = false;
    for (i, c) in kept.char_indices() {
        if c.is_ascii_digit() {
            seen_digit = true;
        } else if !seen_dot {
            seen_dot = true;
        } else {
            break;
        }
        end = i + 1;
    }

    if !seen_digit {
        return None;
    }
    kept[..end].parse().ok()
}

fn shutter_seconds(settings: &CameraSettings) -> Option<f64> {
    settings.shutter_speed.as_deref().and_then(parse_shutter_seconds)
}

/// Whether the (make, model) pair is on the professional list.
pub fn is_professional(make: Option<&str>, model: Option<&str>) -> bool {
    let (Some(make), Some(model)) = (make, model) else {
        return false;
    };
    PROFESSIONAL_CAMERAS
        .iter()
        .any(|(brand, models)| *brand == make && models.contains(&model))
}

fn is_professional_brand(make: &str) -> bool {
    PROFESSIONAL_CAMERAS.iter().any(|(brand, _)| *brand == make)
}

fn resolution_points(basic: &BasicInfo) -> u32 {
    let megapixels = basic.dimensions.megapixels();
    tier_at_least(Some(megapixels), RESOLUTION_TIERS).unwrap_or(RESOLUTION_FLOOR)
}

fn camera_points(exif: &ExifRecord) -> u32 {
    let Some(camera) = &exif.camera else {
        return 0;
    };
    let make = camera.make.as_deref();

    if is_professional(make, camera.model.as_deref()) {
        PROFESSIONAL_MODEL_POINTS
    } else if make.is_some_and(is_professional_brand) {
        PROFESSIONAL_BRAND_POINTS
    } else if make.is_some_and(|m| !m.is_empty()) {
        ANY_MAKE_POINTS
    } else {
        0
    }
}

/// Overall quality, 0 to 100.
pub fn quality_score(basic: &BasicInfo, exif: &ExifRecord) -> u32 {
    let mut score = resolution_points(basic) + camera_points(exif);

    if let Some(settings) = &exif.settings {
        score += tier_at_most(settings.iso, QUALITY_ISO_TIERS).unwrap_or(0);
        score += tier_at_most(settings.aperture, QUALITY_APERTURE_TIERS).unwrap_or(0);
    }

    if !basic.file_integrity.is_corrupted {
        score += INTEGRITY_POINTS;
    }

    score.min(MAX_SCORE)
}

/// Exposure technique, 0 to 100. Zero when no settings were recorded.
pub fn technical_score(exif: &ExifRecord) -> u32 {
    let Some(settings) = &exif.settings else {
        return 0;
    };

    let iso = settings
        .iso
        .map(|iso| tier_at_most(Some(iso), TECHNICAL_ISO_TIERS).unwrap_or(TECHNICAL_ISO_FLOOR))
        .unwrap_or(0);
    let aperture = tier_at_most(settings.aperture, TECHNICAL_APERTURE_TIERS).unwrap_or(0);
    let shutter = tier_at_least(shutter_seconds(settings), SHUTTER_TIERS).unwrap_or(0);

    (iso + aperture + shutter).min(MAX_SCORE)
}

pub fn composition_score(quality: u32, technical: u32) -> u32 {
    ((quality + technical) as f64 / 2.0).round() as u32
}

pub fn analyze_lighting(exif: &ExifRecord) -> LightingAnalysis {
    let Some(settings) = &exif.settings else {
        return LightingAnalysis::default();
    };
    let iso = settings.iso;
    let aperture = settings.aperture;
    let shutter = shutter_seconds(settings);

    // Under-exposure wins when both conditions hold
    let exposure_level = if above(iso, UNDER_EXPOSED_ISO) || below(shutter, UNDER_EXPOSED_SHUTTER)
    {
        ExposureLevel::Under
    } else if below(iso, OVER_EXPOSED_ISO) || above(shutter, OVER_EXPOSED_SHUTTER) {
        ExposureLevel::Over
    } else {
        ExposureLevel::Normal
    };

    let contrast_level = if at_most(aperture, WIDE_APERTURE) {
        ContrastLevel::High
    } else if at_least(aperture, NARROW_APERTURE) {
        ContrastLevel::Low
    } else {
        ContrastLevel::Medium
    };

    LightingAnalysis {
        is_low_light: above(iso, LOW_LIGHT_ISO) || below(shutter, LOW_LIGHT_SHUTTER),
        is_high_dynamic_range: above(iso, HDR_MIN_ISO) && at_most(aperture, HDR_MAX_APERTURE),
        exposure_level,
        contrast_level,
    }
}

pub fn analyze_camera(exif: &ExifRecord) -> CameraAnalysis {
    let (Some(camera), Some(settings)) = (&exif.camera, &exif.settings) else {
        return CameraAnalysis::default();
    };
    let aperture = settings.aperture;
    let shutter = shutter_seconds(settings);

    let depth_of_field = if at_most(aperture, WIDE_APERTURE) {
        DepthOfField::Shallow
    } else if at_least(aperture, NARROW_APERTURE) {
        DepthOfField::Deep
    } else {
        DepthOfField::Medium
    };

    // Handheld rule: blur once the exposure is longer than 1 / focal length,
    // shake once it is longer than 1 / (2 * focal length)
    let (motion_blur, camera_shake) = match (shutter, settings.focal_length) {
        (Some(shutter), Some(focal)) if shutter > 0.0 => {
            let reciprocal = 1.0 / shutter;
            (reciprocal < focal, reciprocal < focal * 2.0)
        }
        _ => (false, false),
    };

    CameraAnalysis {
        is_professional: is_professional(camera.make.as_deref(), camera.model.as_deref()),
        depth_of_field,
        motion_blur,
        camera_shake,
    }
}

/// Season and time of day at the capture location. Needs GPS and a
/// normalised original capture time.
pub fn analyze_location(exif: &ExifRecord) -> Option<LocationAnalysis> {
    let (latitude, _) = exif.coordinates()?;
    let original = exif.datetime.as_ref()?.original.as_deref()?;
    let taken = PrimitiveDateTime::parse(original, RECORD_DATE_FORMAT).ok()?;

    Some(LocationAnalysis {
        time_of_day: geo::time_of_day(latitude, taken),
        season: geo::season(taken.month(), latitude),
    })
}

/// Full analysis of a merged record.
pub fn analyze(basic: &BasicInfo, exif: &ExifRecord) -> AnalysisRecord {
    let quality = quality_score(basic, exif);
    let technical = technical_score(exif);

    AnalysisRecord {
        quality_score: quality,
        technical_score: technical,
        composition_score: composition_score(quality, technical),
        lighting_analysis: analyze_lighting(exif),
        camera_analysis: analyze_camera(exif),
        location_analysis: analyze_location(exif),
    }
}
