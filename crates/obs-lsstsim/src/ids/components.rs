//! Typed raft, sensor, channel and patch identifiers.
//!
//! Each component accepts both the comma-separated data ID form (`"2,2"`)
//! and the compact path form (`"22"`). Parsing checks shape only; the
//! exposure ID codec checks ranges.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One half of a wavefront sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorHalf {
    /// The `C0` half.
    A,
    /// The `C1` half.
    B,
}

impl SensorHalf {
    /// The letter used in data IDs and detector names.
    #[must_use]
    pub fn letter(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        match c {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            _ => None,
        }
    }

    /// Map the PhoSim `C0`/`C1` suffix digit to a half.
    #[must_use]
    pub fn from_phosim_digit(c: char) -> Option<Self> {
        match c {
            '0' => Some(Self::A),
            '1' => Some(Self::B),
            _ => None,
        }
    }
}

/// Split a two-digit component written as `"x,y"` or `"xy"`.
fn parse_digit_pair(component: &'static str, s: &str) -> Result<(u8, u8)> {
    let bytes = s.as_bytes();
    let (x, y) = match bytes {
        [x, b',', y] | [x, y] => (*x, *y),
        _ => return Err(Error::id_format(component, s)),
    };
    if !x.is_ascii_digit() || !y.is_ascii_digit() {
        return Err(Error::id_format(component, s));
    }
    Ok((x - b'0', y - b'0'))
}

/// A raft position, `x,y` with both digits in `0..=4` for a real focal plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RaftId {
    /// First digit.
    pub x: u8,
    /// Second digit.
    pub y: u8,
}

impl RaftId {
    /// Create a raft identifier.
    #[must_use]
    pub fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Compact path form, e.g. `"22"`.
    #[must_use]
    pub fn path_form(&self) -> String {
        format!("{}{}", self.x, self.y)
    }
}

impl FromStr for RaftId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (x, y) = parse_digit_pair("raft", s)?;
        Ok(Self { x, y })
    }
}

impl fmt::Display for RaftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// A sensor position within a raft, optionally one half of a wavefront sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorId {
    /// First digit.
    pub x: u8,
    /// Second digit.
    pub y: u8,
    /// Wavefront half, if any.
    pub half: Option<SensorHalf>,
}

impl SensorId {
    /// Create a full-sensor identifier.
    #[must_use]
    pub fn new(x: u8, y: u8) -> Self {
        Self { x, y, half: None }
    }

    /// Create a wavefront half-sensor identifier.
    #[must_use]
    pub fn with_half(x: u8, y: u8, half: SensorHalf) -> Self {
        Self {
            x,
            y,
            half: Some(half),
        }
    }

    /// Compact path form, e.g. `"11"` or `"11A"`.
    #[must_use]
    pub fn path_form(&self) -> String {
        match self.half {
            Some(h) => format!("{}{}{}", self.x, self.y, h.letter()),
            None => format!("{}{}", self.x, self.y),
        }
    }
}

impl FromStr for SensorId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (pair, half) = match s.char_indices().last() {
            Some((i, c)) if c.is_ascii_alphabetic() => {
                let half = SensorHalf::from_letter(c.to_ascii_uppercase())
                    .ok_or_else(|| Error::id_format("sensor", s))?;
                let pair = s[..i].strip_suffix(',').unwrap_or(&s[..i]);
                (pair, Some(half))
            }
            _ => (s, None),
        };
        let (x, y) = parse_digit_pair("sensor", pair).map_err(|_| Error::id_format("sensor", s))?;
        Ok(Self { x, y, half })
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)?;
        if let Some(h) = self.half {
            write!(f, ",{}", h.letter())?;
        }
        Ok(())
    }
}

/// An amplifier channel, `x,y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId {
    /// First digit.
    pub x: u8,
    /// Second digit.
    pub y: u8,
}

impl ChannelId {
    /// Create a channel identifier.
    #[must_use]
    pub fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Map an `IDnn` amplifier number onto a channel: `x = n % 8`,
    /// `y = n / 8`.
    #[must_use]
    pub fn from_amp_number(n: u32) -> Self {
        Self {
            x: (n % 8) as u8,
            y: u8::try_from(n / 8).unwrap_or(u8::MAX),
        }
    }

    /// Compact path form, e.g. `"05"`.
    #[must_use]
    pub fn path_form(&self) -> String {
        format!("{}{}", self.x, self.y)
    }
}

impl FromStr for ChannelId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (x, y) = parse_digit_pair("channel", s)?;
        Ok(Self { x, y })
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// A sky-map patch, `x,y` with each component in `[0, 8192)` for coadd IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatchId {
    /// Patch x index.
    pub x: i64,
    /// Patch y index.
    pub y: i64,
}

impl FromStr for PatchId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| Error::id_format("patch", s))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<i64>()
                .map_err(|_| Error::id_format("patch", s))
        };
        Ok(Self {
            x: parse(x)?,
            y: parse(y)?,
        })
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}
