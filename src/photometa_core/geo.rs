//! Coordinate math and rough solar position used by location analysis.
//!
//! Sun times are a declination/hour-angle approximation in local solar time.
//! They are good to within an hour or so, which is enough to tell dawn from
//! midday.

use serde::{Deserialize, Serialize};
use time::{Date, Month, PrimitiveDateTime};

/// Mean Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6371e3;
const AXIAL_TILT_DEG: f64 = 23.45;

/// Great-circle distance in metres (haversine).
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial bearing from the first point to the second, degrees in `[0, 360)`.
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// `48° 51' 23.76"`, with a leading `-` for negative values.
pub fn decimal_to_dms(decimal: f64) -> String {
    let abs = decimal.abs();
    let degrees = abs.floor();
    let minutes = ((abs - degrees) * 60.0).floor();
    let seconds = (abs - degrees - minutes / 60.0) * 3600.0;
    let sign = if decimal < 0.0 { "-" } else { "" };

    format!("{}{}° {}' {:.2}\"", sign, degrees, minutes, seconds)
}

/// A coordinate pair in the formats shown to users.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedCoordinates {
    pub decimal: String,
    pub dms: String,
    /// Zone and hemisphere with a coarse grid position. Display only.
    pub utm: String,
}

pub fn format_coordinates(latitude: f64, longitude: f64) -> FormattedCoordinates {
    let zone = ((longitude + 180.0) / 6.0).floor() as i32 + 1;
    let hemisphere = if latitude >= 0.0 { 'N' } else { 'S' };
    let easting = ((longitude + 180.0) * 100_000.0).round() as i64;
    let northing = ((latitude + 90.0) * 100_000.0).round() as i64;

    FormattedCoordinates {
        decimal: format!("{:.6}, {:.6}", latitude, longitude),
        dms: format!("{}, {}", decimal_to_dms(latitude), decimal_to_dms(longitude)),
        utm: format!("{}{} {}E {}N", zone, hemisphere, easting, northing),
    }
}

/// Sunrise and sunset in fractional hours of local solar time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunTimes {
    pub sunrise: f64,
    pub sunset: f64,
}

impl SunTimes {
    pub fn day_length(&self) -> f64 {
        self.sunset - self.sunrise
    }
}

pub fn sun_times(latitude: f64, date: Date) -> SunTimes {
    let day_of_year = f64::from(date.ordinal());
    let declination =
        AXIAL_TILT_DEG * ((360.0 / 365.0) * (day_of_year - 80.0)).to_radians().sin();

    // Clamped for polar day and polar night
    let cos_hour_angle =
        (-latitude.to_radians().tan() * declination.to_radians().tan()).clamp(-1.0, 1.0);
    let half_day = cos_hour_angle.acos().to_degrees() / 15.0;

    SunTimes {
        sunrise: 12.0 - half_day,
        sunset: 12.0 + half_day,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Dawn,
    Day,
    Dusk,
    Night,
}

/// Classify a capture time using whole hours around sunrise and sunset.
pub fn time_of_day(latitude: f64, timestamp: PrimitiveDateTime) -> TimeOfDay {
    let sun = sun_times(latitude, timestamp.date());
    let hour = i32::from(timestamp.hour());
    let sunrise = sun.sunrise.floor() as i32;
    let sunset = sun.sunset.floor() as i32;

    if hour >= sunrise - 1 && hour < sunrise + 1 {
        TimeOfDay::Dawn
    } else if hour >= sunrise + 1 && hour < sunset - 1 {
        TimeOfDay::Day
    } else if hour >= sunset - 1 && hour < sunset + 1 {
        TimeOfDay::Dusk
    } else {
        TimeOfDay::Night
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

/// Meteorological season; flipped in the southern hemisphere.
pub fn season(month: Month, latitude: f64) -> Season {
    let northern = match month {
        Month::March | Month::April | Month::May => Season::Spring,
        Month::June | Month::July | Month::August => Season::Summer,
        Month::September | Month::October | Month::November => Season::Autumn,
        Month::December | Month::January | Month::February => Season::Winter,
    };

    if latitude >= 0.0 {
        return northern;
    }
    match northern {
        Season::Spring => Season::Autumn,
        Season::Summer => Season::Winter,
        Season::Autumn => Season::Spring,
        Season::Winter => Season::Summer,
    }
}
