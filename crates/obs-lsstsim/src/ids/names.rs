//! Conversions between full detector names (`R:2,2 S:1,1`) and the
//! abbreviated PhoSim forms (`R22_S11`, `R00_S22_C0`).

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static ABBREV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^R(\d)(\d)_S(\d)(\d)(?:_C([01]))?$").expect("static regex is valid")
});

/// Abbreviate a full detector name: `"R:2,2 S:1,1"` becomes `"R22_S11"`.
#[must_use]
pub fn short_ccd_name(ccd_name: &str) -> String {
    ccd_name.replace(' ', "_").replace([':', ','], "")
}

fn parse_abbrev(abbrev: &str) -> Result<regex::Captures<'_>> {
    ABBREV_RE
        .captures(abbrev)
        .ok_or_else(|| Error::id_format("detector name", abbrev))
}

/// Expand an abbreviated detector name to its full form.
///
/// The wavefront suffix `_C0` becomes half `A` and `_C1` half `B`.
///
/// # Errors
///
/// Returns an error if the name is not `Rxy_Sxy[_C0|_C1]`.
pub fn expand_detector_name(abbrev: &str) -> Result<String> {
    let caps = parse_abbrev(abbrev)?;
    let mut name = format!("R:{},{} S:{},{}", &caps[1], &caps[2], &caps[3], &caps[4]);
    match caps.get(5).map(|m| m.as_str()) {
        Some("0") => name.push_str(",A"),
        Some(_) => name.push_str(",B"),
        None => {}
    }
    Ok(name)
}

/// Numeric detector id of an abbreviated name.
///
/// The digits are `rx ry sx sy`, with `10000 * (1 + c)` added for a
/// wavefront half `_Cc`.
///
/// # Errors
///
/// Returns an error if the name is not `Rxy_Sxy[_C0|_C1]`.
pub fn detector_id_from_abbrev(abbrev: &str) -> Result<i64> {
    let caps = parse_abbrev(abbrev)?;
    let digits = format!("{}{}{}{}", &caps[1], &caps[2], &caps[3], &caps[4]);
    let mut id: i64 = digits
        .parse()
        .map_err(|_| Error::id_format("detector name", abbrev))?;
    if let Some(c) = caps.get(5) {
        let c: i64 = c
            .as_str()
            .parse()
            .map_err(|_| Error::id_format("detector name", abbrev))?;
        id += 10_000 * (1 + c);
    }
    Ok(id)
}

/// Expand a PhoSim amplifier-level short name into `R:x,y S:x,y` form.
///
/// Two-part names (`R22_S11`) map part by part. Three-part wavefront
/// names (`R00_S22_C0`) fold the `C` part into the sensor as `A`/`B`.
///
/// # Errors
///
/// Returns an error if the name has the wrong number of parts or an
/// unknown wavefront suffix.
pub fn long_name_from_short(short: &str) -> Result<String> {
    fn expand(part: &str, extra: &str) -> Option<String> {
        let mut chars = part.chars();
        let head = chars.next()?;
        let mut digits: Vec<String> = chars.map(String::from).collect();
        if !extra.is_empty() {
            digits.push(extra.to_string());
        }
        Some(format!("{head}:{}", digits.join(",")))
    }

    let bad = || Error::id_format("detector name", short);
    let parts: Vec<&str> = short.split('_').collect();
    let expanded = match parts.as_slice() {
        [raft, sensor] => vec![expand(raft, ""), expand(sensor, "")],
        [raft, sensor, half] => {
            let letter = match *half {
                "C0" => "A",
                "C1" => "B",
                _ => return Err(bad()),
            };
            vec![expand(raft, ""), expand(sensor, letter)]
        }
        _ => return Err(bad()),
    };
    let expanded: Option<Vec<String>> = expanded.into_iter().collect();
    Ok(expanded.ok_or_else(bad)?.join(" "))
}
