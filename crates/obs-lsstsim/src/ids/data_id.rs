//! Data identifiers and their normalization.
//!
//! A [`DataId`] names a dataset by its semantic keys. Callers may use a
//! number of aliases (`ccd`, `ccdName`, `amp`, `ampName`, `exposure`, ...);
//! [`DataId::transform`] folds those into the standard keys and renders
//! raft, sensor and channel in the compact path form used by file name
//! templates.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static CCD_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^R:(\d,\d) S:(\d,\d(?:,[AB])?)$").expect("static regex is valid")
});
static AMP_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ID(\d+)$").expect("static regex is valid"));
static DIGIT_PAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d),(\d)").expect("static regex is valid"));
static PAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d,\d$").expect("static regex is valid"));
static SENSOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d,\d(,[AB])?$").expect("static regex is valid"));

/// A dataset identifier.
///
/// Every key is optional; which keys are required depends on the operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataId {
    /// Visit number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit: Option<u64>,
    /// Snap (sub-exposure) number, 0 or 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snap: Option<i64>,
    /// Raft, `"x,y"` (or `"xy"` once transformed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raft: Option<String>,
    /// Sensor, `"x,y"` or `"x,y,A"` (or `"xy"`/`"xyA"` once transformed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor: Option<String>,
    /// Amplifier channel, `"x,y"` (or `"xy"` once transformed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Filter name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Sky-map tract.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tract: Option<i64>,
    /// Sky-map patch, `"x,y"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    /// Alias for `sensor`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ccd: Option<String>,
    /// Full detector name, `R:x,y S:x,y[,c]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ccd_name: Option<String>,
    /// Same as `ccd_name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_name: Option<String>,
    /// Alias for `channel`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amp: Option<String>,
    /// Amplifier name, `IDnn`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amp_name: Option<String>,
    /// Same as `amp_name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    /// Alias for `snap`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure: Option<i64>,
    /// Keys this crate does not interpret, kept for template rendering.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

fn parse_int<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::id_format(key, value))
}

impl DataId {
    /// Create an empty data ID.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a CCD-level data ID.
    #[must_use]
    pub fn ccd(visit: u64, raft: impl Into<String>, sensor: impl Into<String>) -> Self {
        Self {
            visit: Some(visit),
            raft: Some(raft.into()),
            sensor: Some(sensor.into()),
            ..Self::default()
        }
    }

    /// Parse `key=value` tokens, as given to `--id` on the command line.
    ///
    /// # Errors
    ///
    /// Returns an error if a token has no `=` or an integer key has a
    /// non-integer value.
    pub fn parse_pairs<S: AsRef<str>>(tokens: &[S]) -> Result<Self> {
        let mut id = Self::default();
        for token in tokens {
            let token = token.as_ref();
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| Error::id_format("key=value", token))?;
            id.set(key.trim(), value.trim())?;
        }
        Ok(id)
    }

    /// Set a single key from its string form.
    ///
    /// # Errors
    ///
    /// Returns an error if an integer key has a non-integer value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value_owned = value.to_string();
        match key {
            "visit" => self.visit = Some(parse_int("visit", value)?),
            "snap" => self.snap = Some(parse_int("snap", value)?),
            "exposure" => self.exposure = Some(parse_int("exposure", value)?),
            "tract" => self.tract = Some(parse_int("tract", value)?),
            "raft" => self.raft = Some(value_owned),
            "sensor" => self.sensor = Some(value_owned),
            "channel" => self.channel = Some(value_owned),
            "filter" => self.filter = Some(value_owned),
            "patch" => self.patch = Some(value_owned),
            "ccd" => self.ccd = Some(value_owned),
            "ccdName" => self.ccd_name = Some(value_owned),
            "sensorName" => self.sensor_name = Some(value_owned),
            "amp" => self.amp = Some(value_owned),
            "ampName" => self.amp_name = Some(value_owned),
            "channelName" => self.channel_name = Some(value_owned),
            other => {
                self.extra.insert(other.to_string(), value_owned);
            }
        }
        Ok(())
    }

    /// Fold aliases into the standard keys and compact raft, sensor and
    /// channel into path form. The receiver is left untouched.
    ///
    /// Keys already present are never overwritten by an alias.
    ///
    /// # Errors
    ///
    /// Returns an error if `ccdName`/`sensorName` or `ampName`/`channelName`
    /// cannot be parsed.
    pub fn transform(&self) -> Result<Self> {
        let mut actual = self.clone();

        let ccd_aliases = [
            ("ccdName", &self.ccd_name),
            ("sensorName", &self.sensor_name),
        ];
        if let Some((alias, Some(name))) = ccd_aliases.iter().find(|(_, v)| v.is_some()) {
            let upper = name.to_uppercase();
            let caps = CCD_NAME_RE
                .captures(&upper)
                .ok_or_else(|| Error::InvalidAlias {
                    alias: *alias,
                    value: upper.clone(),
                })?;
            actual.raft.get_or_insert_with(|| caps[1].to_string());
            actual.sensor.get_or_insert_with(|| caps[2].to_string());
        }

        if let Some(ccd) = &self.ccd {
            actual.sensor.get_or_insert_with(|| ccd.clone());
        }

        if let Some(amp) = &self.amp {
            actual.channel.get_or_insert_with(|| amp.clone());
        } else if actual.channel.is_none() {
            let amp_aliases = [
                ("ampName", &self.amp_name),
                ("channelName", &self.channel_name),
            ];
            if let Some((alias, Some(name))) = amp_aliases.iter().find(|(_, v)| v.is_some()) {
                let number = AMP_NAME_RE
                    .captures(name)
                    .and_then(|caps| caps[1].parse::<u32>().ok())
                    .ok_or_else(|| Error::InvalidAlias {
                        alias: *alias,
                        value: (*name).clone(),
                    })?;
                actual.channel =
                    Some(super::components::ChannelId::from_amp_number(number).to_string());
            }
        }

        if let Some(exposure) = self.exposure {
            actual.snap.get_or_insert(exposure);
        }

        if let Some(raft) = &actual.raft {
            actual.raft = Some(DIGIT_PAIR_RE.replace_all(raft, "$1$2").into_owned());
        }
        if let Some(sensor) = &actual.sensor {
            actual.sensor = Some(sensor.replace(',', ""));
        }
        if let Some(channel) = &actual.channel {
            actual.channel = Some(DIGIT_PAIR_RE.replace_all(channel, "$1$2").into_owned());
        }
        Ok(actual)
    }

    /// Check that raft, sensor and channel (where present) are in data ID form.
    ///
    /// # Errors
    ///
    /// Returns an [`Error::IdFormat`] naming the first malformed component.
    pub fn validate(&self) -> Result<()> {
        let checks: [(&'static str, &Option<String>, &Regex); 3] = [
            ("raft", &self.raft, &PAIR_RE),
            ("sensor", &self.sensor, &SENSOR_RE),
            ("channel", &self.channel, &PAIR_RE),
        ];
        for (component, value, re) in checks {
            if let Some(v) = value {
                if !re.is_match(v) {
                    return Err(Error::id_format(component, v.as_str()));
                }
            }
        }
        Ok(())
    }

    /// The full detector name, `R:<raft> S:<sensor>`.
    ///
    /// # Errors
    ///
    /// Returns an error if raft or sensor is missing.
    pub fn detector_name(&self) -> Result<String> {
        let raft = self.raft.as_ref().ok_or(Error::MissingKey { key: "raft" })?;
        let sensor = self
            .sensor
            .as_ref()
            .ok_or(Error::MissingKey { key: "sensor" })?;
        Ok(format!("R:{raft} S:{sensor}"))
    }

    /// Build a data ID from a visit and a full detector name.
    ///
    /// # Errors
    ///
    /// Returns an error if `ccd_name` is not of the form `R:x,y S:x,y[,c]`.
    pub fn from_visit_and_ccd(visit: u64, ccd_name: &str) -> Result<Self> {
        let caps = CCD_NAME_RE
            .captures(ccd_name)
            .ok_or_else(|| Error::InvalidAlias {
                alias: "ccdId",
                value: ccd_name.to_string(),
            })?;
        Ok(Self::ccd(visit, &caps[1], &caps[2]))
    }

    /// The detector name and channel digits identifying an amplifier.
    ///
    /// # Errors
    ///
    /// Returns an error if raft, sensor or channel is missing or the channel
    /// does not start with `x,y`.
    pub fn amp_id(&self) -> Result<(String, u8, u8)> {
        let channel = self
            .channel
            .as_ref()
            .ok_or(Error::MissingKey { key: "channel" })?;
        let bytes = channel.as_bytes();
        match bytes {
            [x, b',', y, ..] if x.is_ascii_digit() && y.is_ascii_digit() => {
                Ok((self.detector_name()?, x - b'0', y - b'0'))
            }
            _ => Err(Error::id_format("channel", channel.as_str())),
        }
    }

    /// Flatten into a string map of standard keys, used for template rendering.
    #[must_use]
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        let mut fields = self.extra.clone();
        let mut put = |k: &str, v: Option<String>| {
            if let Some(v) = v {
                fields.insert(k.to_string(), v);
            }
        };
        put("visit", self.visit.map(|v| v.to_string()));
        put("snap", self.snap.map(|v| v.to_string()));
        put("raft", self.raft.clone());
        put("sensor", self.sensor.clone());
        put("channel", self.channel.clone());
        put("filter", self.filter.clone());
        put("tract", self.tract.map(|v| v.to_string()));
        put("patch", self.patch.clone());
        fields
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.to_fields();
        let mut first = true;
        f.write_str("{")?;
        for (k, v) in &fields {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{k}: {v}")?;
        }
        f.write_str("}")
    }
}
