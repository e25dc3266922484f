use crate::photometa_core::error::{PhotometaError, Result};
use crate::photometa_core::photo::{CameraInfo, CameraSettings, CaptureDateTime, ExifRecord, GpsInfo};
use exif::{Exif, Field, In, Tag, Value};
use std::io::Cursor;
use time::PrimitiveDateTime;

/// Date format used in EXIF data.
const EXIF_DATE_FORMAT: &[time::format_description::FormatItem] =
    time::macros::format_description!("[year]:[month]:[day] [hour]:[minute]:[second]");

/// Date format used in extracted records.
pub const RECORD_DATE_FORMAT: &[time::format_description::FormatItem] =
    time::macros::format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// Divisors for degrees, minutes and seconds.
const DMS_DIVISION: [f64; 3] = [1.0, 60.0, 3600.0];

/// Undefined-typed text tags start with an 8 byte character code.
const CHARACTER_CODE_LEN: usize = 8;

/// Typed access to the primary IFD of a parsed EXIF block.
struct ExifFields<'a>(&'a Exif);

impl ExifFields<'_> {
    fn field(&self, tag: Tag) -> Option<&Field> {
        self.0.get_field(tag, In::PRIMARY)
    }

    /// Text tags. ASCII values are read directly, anything else falls back
    /// to the library's display form.
    fn string(&self, tag: Tag) -> Option<String> {
        let field = self.field(tag)?;
        let text = match &field.value {
            Value::Ascii(parts) => parts
                .iter()
                .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').trim().to_string())
                .find(|s| !s.is_empty())?,
            Value::Undefined(bytes, _) => undefined_text(bytes)?,
            _ => field.display_value().to_string(),
        };
        (!text.is_empty()).then_some(text)
    }

    /// Enumerated tags rendered through their human readable description.
    fn described(&self, tag: Tag) -> Option<String> {
        self.field(tag)
            .map(|f| f.display_value().to_string().replace(['\\', '"'], ""))
            .filter(|s| !s.trim().is_empty())
    }

    fn float(&self, tag: Tag) -> Option<f64> {
        let field = self.field(tag)?;
        let value = match &field.value {
            Value::Rational(v) => v.first().map(|r| r.to_f64()),
            Value::SRational(v) => v.first().map(|r| r.to_f64()),
            Value::Float(v) => v.first().map(|f| *f as f64),
            Value::Double(v) => v.first().copied(),
            other => other.get_uint(0).map(f64::from),
        };
        value.filter(|v| v.is_finite())
    }

    fn uint(&self, tag: Tag) -> Option<u32> {
        self.field(tag).and_then(|f| f.value.get_uint(0))
    }

    /// A degrees/minutes/seconds triple and its N/S/E/W reference as signed degrees.
    fn coordinate(&self, tag: Tag, reference: Tag) -> Option<f64> {
        let field = self.field(tag)?;
        let Value::Rational(parts) = &field.value else {
            return None;
        };
        if parts.is_empty() {
            return None;
        }

        let degrees: f64 = parts
            .iter()
            .zip(DMS_DIVISION.iter())
            .map(|(part, div)| part.to_f64() / div)
            .sum();
        if !degrees.is_finite() {
            return None;
        }

        match self.string(reference).as_deref() {
            Some("S") | Some("W") => Some(-degrees),
            _ => Some(degrees),
        }
    }

    /// Space separated rationals, e.g. a lens specification.
    fn rationals(&self, tag: Tag) -> Option<String> {
        let field = self.field(tag)?;
        let Value::Rational(parts) = &field.value else {
            return self.described(tag);
        };
        let joined = parts
            .iter()
            .map(|r| r.to_f64())
            .filter(|v| v.is_finite())
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        (!joined.is_empty()).then_some(joined)
    }
}

fn undefined_text(bytes: &[u8]) -> Option<String> {
    let body = if bytes.len() > CHARACTER_CODE_LEN
        && (bytes.starts_with(b"ASCII") || bytes.starts_with(b"UNICODE") || bytes.starts_with(&[0; 8]))
    {
        &bytes[CHARACTER_CODE_LEN..]
    } else {
        bytes
    };
    let text = String::from_utf8_lossy(body).trim_end_matches('\0').trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Parse an EXIF date string into `YYYY-MM-DDTHH:MM:SS`.
fn parse_exif_date(date_str: &str) -> Result<String> {
    if date_str.is_empty() {
        return Err(PhotometaError::InvalidDateFormat("empty date".to_string()));
    }

    let date_time = PrimitiveDateTime::parse(date_str.trim(), EXIF_DATE_FORMAT)
        .map_err(|e| PhotometaError::InvalidDateFormat(e.to_string()))?;

    date_time
        .format(RECORD_DATE_FORMAT)
        .map_err(|e| PhotometaError::InvalidDateFormat(e.to_string()))
}

/// Normalised timestamp, or the raw value when it is not a standard EXIF date.
fn normalise_date(raw: Option<String>) -> Option<String> {
    raw.map(|value| {
        parse_exif_date(&value).unwrap_or_else(|e| {
            log::debug!("Keeping unparsed EXIF date '{}': {}", value, e);
            value
        })
    })
}

/// Exposure time in seconds as carried in records: `0.004s`.
fn shutter_string(seconds: f64) -> String {
    format!("{}s", seconds)
}

fn present<T: Default + PartialEq>(record: T) -> Option<T> {
    (record != T::default()).then_some(record)
}

fn read_camera(fields: &ExifFields) -> Option<CameraInfo> {
    present(CameraInfo {
        make: fields.string(Tag::Make),
        model: fields.string(Tag::Model),
        serial_number: fields.string(Tag::BodySerialNumber),
        firmware_version: fields.string(Tag::Software),
        lens_mount: None,
    })
}

fn read_settings(fields: &ExifFields) -> Option<CameraSettings> {
    let flash = fields.uint(Tag::Flash);

    present(CameraSettings {
        aperture: fields.float(Tag::FNumber),
        shutter_speed: fields.float(Tag::ExposureTime).map(shutter_string),
        iso: fields.uint(Tag::PhotographicSensitivity),
        focal_length: fields.float(Tag::FocalLength),
        lens: fields.string(Tag::LensModel),
        exposure_compensation: fields.float(Tag::ExposureBiasValue),
        max_aperture: fields.float(Tag::MaxApertureValue),
        flash_mode: flash.and_then(|_| fields.described(Tag::Flash)),
        flash_fired: flash.map(|bits| bits & 1 == 1),
        metering_mode: fields.described(Tag::MeteringMode),
        white_balance: fields.described(Tag::WhiteBalance),
        exposure_mode: fields.described(Tag::ExposureMode),
        scene_type: fields.described(Tag::SceneType),
        digital_zoom_ratio: fields.float(Tag::DigitalZoomRatio),
        contrast: fields.described(Tag::Contrast),
        saturation: fields.described(Tag::Saturation),
        sharpness: fields.described(Tag::Sharpness),
        gain_control: fields.described(Tag::GainControl),
        subject_distance: fields.float(Tag::SubjectDistance),
        subject_distance_range: fields.described(Tag::SubjectDistanceRange),
        color_space: fields.described(Tag::ColorSpace),
        custom_rendered: fields.described(Tag::CustomRendered),
        exposure_program: fields.described(Tag::ExposureProgram),
        sensing_method: fields.described(Tag::SensingMethod),
        file_source: fields.described(Tag::FileSource),
        scene_capture_type: fields.described(Tag::SceneCaptureType),
        image_unique_id: fields.string(Tag::ImageUniqueID),
        owner_name: fields.string(Tag::CameraOwnerName),
        body_serial_number: fields.string(Tag::BodySerialNumber),
        lens_specification: fields.rationals(Tag::LensSpecification),
        lens_make: fields.string(Tag::LensMake),
        lens_model: fields.string(Tag::LensModel),
        lens_serial_number: fields.string(Tag::LensSerialNumber),
        composite_image: fields.described(Tag::CompositeImage),
        source_image_number_of_composite_image: fields
            .uint(Tag::SourceImageNumberOfCompositeImage),
        source_exposure_times_of_composite_image: fields
            .described(Tag::SourceExposureTimesOfCompositeImage),
        focal_length_in_35mm_film: fields.uint(Tag::FocalLengthIn35mmFilm),
    })
}

fn read_datetime(fields: &ExifFields) -> Option<CaptureDateTime> {
    present(CaptureDateTime {
        original: normalise_date(fields.string(Tag::DateTimeOriginal)),
        digitized: normalise_date(fields.string(Tag::DateTimeDigitized)),
        modified: normalise_date(fields.string(Tag::DateTime)),
        subsec_time: fields.string(Tag::SubSecTime),
        subsec_time_original: fields.string(Tag::SubSecTimeOriginal),
        subsec_time_digitized: fields.string(Tag::SubSecTimeDigitized),
        time_zone_offset: fields.string(Tag::OffsetTimeOriginal),
    })
}

/// GPS data is only reported when both coordinates are present.
fn read_gps(fields: &ExifFields) -> Option<GpsInfo> {
    let latitude = fields.coordinate(Tag::GPSLatitude, Tag::GPSLatitudeRef)?;
    let longitude = fields.coordinate(Tag::GPSLongitude, Tag::GPSLongitudeRef)?;

    let altitude = fields.float(Tag::GPSAltitude).map(|alt| {
        // Reference 1 means below sea level.
        if fields.uint(Tag::GPSAltitudeRef) == Some(1) {
            -alt
        } else {
            alt
        }
    });

    Some(GpsInfo {
        latitude,
        longitude,
        altitude,
        heading: fields.float(Tag::GPSImgDirection),
        speed: fields.float(Tag::GPSSpeed),
        speed_ref: fields.string(Tag::GPSSpeedRef),
        track: fields.float(Tag::GPSTrack),
        track_ref: fields.string(Tag::GPSTrackRef),
        img_direction_ref: fields.string(Tag::GPSImgDirectionRef),
        gps_time_stamp: fields.described(Tag::GPSTimeStamp),
        gps_date_stamp: fields.string(Tag::GPSDateStamp),
        processing_method: fields.string(Tag::GPSProcessingMethod),
        area_information: fields.string(Tag::GPSAreaInformation),
        differential: fields.uint(Tag::GPSDifferential),
        h_positioning_error: fields.float(Tag::GPSHPositioningError),
        location: None,
    })
}

/// Extract the EXIF record from a file's bytes. Any container supported by
/// the reader works (JPEG, TIFF, PNG, WebP, HEIF). Returns an empty record
/// when no EXIF block can be read.
pub fn parse_exif(bytes: &[u8]) -> ExifRecord {
    let exif = match exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => exif,
        Err(e) => {
            log::debug!("No EXIF data: {}", e);
            return ExifRecord::default();
        }
    };

    let fields = ExifFields(&exif);
    ExifRecord {
        camera: read_camera(&fields),
        settings: read_settings(&fields),
        datetime: read_datetime(&fields),
        gps: read_gps(&fields),
    }
}
