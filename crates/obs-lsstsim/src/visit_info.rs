//! Exposure metadata derived from a raw simulated header.

use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::fits::Header;
use crate::time;

/// Conversion factor from millimetres of mercury to pascals.
pub const PASCAL_PER_MMHG: f64 = 133.322_387_415;

/// Humidity assumed for every exposure, in percent.
pub const DEFAULT_HUMIDITY: f64 = 40.0;

/// A site on the Earth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observatory {
    /// East longitude in degrees.
    pub longitude_deg: f64,
    /// Latitude in degrees.
    pub latitude_deg: f64,
    /// Elevation in metres.
    pub elevation_m: f64,
}

/// The simulated telescope site.
pub const OBSERVATORY: Observatory = Observatory {
    longitude_deg: -70.749_417,
    latitude_deg: -30.244_633,
    elevation_m: 2663.0,
};

/// Ambient conditions during an exposure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Weather {
    /// Air temperature in degrees Celsius.
    pub air_temperature_c: f64,
    /// Air pressure in pascals.
    pub air_pressure_pa: f64,
    /// Relative humidity in percent.
    pub humidity_pct: f64,
}

impl Weather {
    /// Typical conditions at an elevation, used when headers lack them.
    #[must_use]
    pub fn default_at(elevation_m: f64) -> Self {
        Self {
            air_temperature_c: 7.0,
            air_pressure_pa: 101_325.0 * (1.0 - 2.255_77e-5 * elevation_m).powf(5.255_88),
            humidity_pct: DEFAULT_HUMIDITY,
        }
    }
}

/// How the boresight rotation angle is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RotType {
    /// Not known.
    Unknown,
    /// Position angle of focal plane +Y measured from North through East.
    Sky,
    /// Position angle measured from +Alt through +Az.
    Horizon,
    /// Rotator mount angle.
    Mount,
}

/// Exposure metadata.
///
/// Angles are in degrees and times in seconds. Values absent from the
/// header are NaN.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitInfo {
    /// Packed exposure ID, if known.
    pub exposure_id: Option<u64>,
    /// Exposure time.
    pub exposure_time: f64,
    /// Dark time.
    pub dark_time: f64,
    /// TAI MJD at the middle of the exposure.
    pub date_tai_mjd: f64,
    /// UTC ISO string at the middle of the exposure.
    pub date_utc: Option<String>,
    /// Boresight right ascension and declination.
    pub boresight_ra_dec: [f64; 2],
    /// Boresight azimuth and altitude.
    pub boresight_az_alt: [f64; 2],
    /// Airmass at the boresight.
    pub boresight_airmass: f64,
    /// Boresight rotation angle.
    pub boresight_rot_angle: f64,
    /// Reference for the rotation angle.
    pub rot_type: RotType,
    /// Site.
    pub observatory: Observatory,
    /// Conditions.
    pub weather: Weather,
    /// Earth rotation angle.
    pub era: f64,
}

fn float_or_nan(header: &Header, keyword: &str) -> f64 {
    match header.get_f64(keyword) {
        Some(v) => v,
        None => {
            warn!(keyword, "Keyword missing or not numeric; using NaN");
            f64::NAN
        }
    }
}

/// Use `value` if it lies in `[min, max]`, else `default`.
fn default_metadata(value: f64, default: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() || value < min || value > max {
        default
    } else {
        value
    }
}

/// Build the visit info of a raw header.
///
/// The start time comes from `TAI`, falling back to `MJD-OBS`; the
/// recorded date is the middle of the exposure.
///
/// # Errors
///
/// Returns an error if the start time is present but not a valid date.
pub fn make_visit_info(header: &Header, exposure_id: Option<u64>) -> Result<VisitInfo> {
    let exposure_time = float_or_nan(header, "EXPTIME");
    let dark_time = float_or_nan(header, "DARKTIME");

    let start = header.get_f64("TAI").or_else(|| header.get_f64("MJD-OBS"));
    let date_tai_mjd = match start {
        Some(mjd) => mjd + 0.5 * exposure_time / 86_400.0,
        None => {
            warn!("Start time missing from metadata; date will be NaN");
            f64::NAN
        }
    };
    let date_utc = if date_tai_mjd.is_nan() {
        None
    } else {
        Some(time::tai_mjd_to_utc_string(date_tai_mjd)?)
    };

    let ra = float_or_nan(header, "RA_DEG");
    let dec = float_or_nan(header, "DEC_DEG");
    let azimuth = float_or_nan(header, "AZIMUTH");
    let altitude = 90.0 - float_or_nan(header, "ZENITH");

    let defaults = Weather::default_at(OBSERVATORY.elevation_m);
    let weather = Weather {
        air_temperature_c: default_metadata(
            float_or_nan(header, "TEMPERA"),
            defaults.air_temperature_c,
            -10.0,
            40.0,
        ),
        air_pressure_pa: default_metadata(
            float_or_nan(header, "PRESS") * PASCAL_PER_MMHG,
            defaults.air_pressure_pa,
            50_000.0,
            90_000.0,
        ),
        humidity_pct: DEFAULT_HUMIDITY,
    };

    let era = match header.get_f64("HA") {
        Some(hours) => hours * 15.0 + ra - OBSERVATORY.longitude_deg,
        None => {
            warn!("Hour angle missing from metadata, will be NaN");
            f64::NAN
        }
    };

    Ok(VisitInfo {
        exposure_id,
        exposure_time,
        dark_time,
        date_tai_mjd,
        date_utc,
        boresight_ra_dec: [ra, dec],
        boresight_az_alt: [azimuth, altitude],
        boresight_airmass: float_or_nan(header, "AIRMASS"),
        boresight_rot_angle: -float_or_nan(header, "ROTANG"),
        rot_type: RotType::Sky,
        observatory: OBSERVATORY,
        weather,
        era,
    })
}
