//! TAI and UTC conversions for header timestamps.
//!
//! Simulated headers carry `MJD-OBS` on the TAI scale. Registries store
//! UTC ISO-8601 strings with nanosecond precision and no zone suffix.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Error, Result};

/// MJD of the Unix epoch.
pub const MJD_UNIX_EPOCH: f64 = 40_587.0;

const NANOS_PER_DAY: i64 = 86_400_000_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Format used for `taiObs` registry columns.
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9f";

/// UTC dates from which `TAI - UTC` took each value, in seconds.
const LEAP_SECONDS: &[(i32, u32, i64)] = &[
    (1972, 1, 10),
    (1972, 7, 11),
    (1973, 1, 12),
    (1974, 1, 13),
    (1975, 1, 14),
    (1976, 1, 15),
    (1977, 1, 16),
    (1978, 1, 17),
    (1979, 1, 18),
    (1980, 1, 19),
    (1981, 7, 20),
    (1982, 7, 21),
    (1983, 7, 22),
    (1985, 7, 23),
    (1988, 1, 24),
    (1990, 1, 25),
    (1991, 1, 26),
    (1992, 7, 27),
    (1993, 7, 28),
    (1994, 7, 29),
    (1996, 1, 30),
    (1997, 7, 31),
    (1999, 1, 32),
    (2006, 1, 33),
    (2009, 1, 34),
    (2012, 7, 35),
    (2015, 7, 36),
    (2017, 1, 37),
];

fn leap_start_nanos(year: i32, month: u32) -> i64 {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(0, |dt| dt.and_utc().timestamp() * NANOS_PER_SECOND)
}

/// `TAI - UTC` in seconds at a UTC instant given as Unix nanoseconds.
///
/// Instants before 1972 use the 1972 offset.
#[must_use]
pub fn tai_minus_utc(utc_nanos: i64) -> i64 {
    LEAP_SECONDS
        .iter()
        .rev()
        .find(|(y, m, _)| utc_nanos >= leap_start_nanos(*y, *m))
        .map_or(LEAP_SECONDS[0].2, |(_, _, offset)| *offset)
}

/// Unix nanoseconds on the TAI scale for an MJD.
fn mjd_to_nanos(mjd: f64) -> Result<i64> {
    if !mjd.is_finite() || !(0.0..=100_000.0).contains(&mjd) {
        return Err(Error::InvalidTime(mjd));
    }
    let days = mjd.floor();
    let fraction = mjd - days;
    let whole = (days - MJD_UNIX_EPOCH) as i64 * NANOS_PER_DAY;
    // An f64 MJD resolves about a microsecond; finer digits are noise.
    let micros = (fraction * (NANOS_PER_DAY / 1000) as f64).round() as i64;
    Ok(whole + micros * 1000)
}

/// Convert a TAI MJD to a UTC instant.
///
/// # Errors
///
/// Returns [`Error::InvalidTime`] for non-finite or implausible dates.
pub fn tai_mjd_to_utc(mjd: f64) -> Result<DateTime<Utc>> {
    let tai = mjd_to_nanos(mjd)?;
    let mut utc = tai - tai_minus_utc(tai) * NANOS_PER_SECOND;
    // Close to a leap the first guess may use the next offset.
    let offset = tai_minus_utc(utc);
    utc = tai - offset * NANOS_PER_SECOND;
    Ok(DateTime::from_timestamp_nanos(utc))
}

/// Convert a TAI MJD to the UTC ISO string used in registries,
/// e.g. `1999-12-31T23:59:28.000000000`.
///
/// # Errors
///
/// Returns [`Error::InvalidTime`] for non-finite or implausible dates.
pub fn tai_mjd_to_utc_string(mjd: f64) -> Result<String> {
    Ok(tai_mjd_to_utc(mjd)?.format(ISO_FORMAT).to_string())
}

/// Convert a UTC instant to a TAI MJD.
#[must_use]
pub fn utc_to_tai_mjd(utc: DateTime<Utc>) -> f64 {
    let nanos = utc.timestamp_nanos_opt().unwrap_or_default();
    let tai = nanos + tai_minus_utc(nanos) * NANOS_PER_SECOND;
    MJD_UNIX_EPOCH + tai as f64 / NANOS_PER_DAY as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_y2k() {
        assert_eq!(
            tai_mjd_to_utc_string(51_544.0).unwrap(),
            "1999-12-31T23:59:28.000000000"
        );
    }

    #[test]
    fn test_fractional_day() {
        // 2010-01-01T12:00:00 TAI, 34 leap seconds in effect
        assert_eq!(
            tai_mjd_to_utc_string(55_197.5).unwrap(),
            "2010-01-01T11:59:26.000000000"
        );
    }

    #[test]
    fn test_offsets() {
        let at = |y, m, d| {
            NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc()
                .timestamp_nanos_opt()
                .unwrap()
        };
        assert_eq!(tai_minus_utc(at(1970, 1, 1)), 10);
        assert_eq!(tai_minus_utc(at(1998, 12, 31)), 31);
        assert_eq!(tai_minus_utc(at(1999, 1, 1)), 32);
        assert_eq!(tai_minus_utc(at(2020, 6, 1)), 37);
    }

    #[test]
    fn test_round_trip() {
        let mjd = 59_000.25;
        let utc = tai_mjd_to_utc(mjd).unwrap();
        assert!((utc_to_tai_mjd(utc) - mjd).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_non_finite() {
        assert!(matches!(tai_mjd_to_utc(f64::NAN), Err(Error::InvalidTime(_))));
        assert!(tai_mjd_to_utc(-1.0).is_err());
    }
}
