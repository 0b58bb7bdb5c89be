//! Packing of data IDs into 64-bit exposure and coadd identifiers.
//!
//! ```text
//! amp   = (visit << 13) + (snap << 12) + (r1*5 + r2)*160 + (s1*3 + s2)*16 + (c1*8 + c2)
//! ccd   = (visit << 9)  + (r1*5 + r2)*10 + (s1*3 + s2)
//! coadd = ((tract*8192 + px)*8192 + py)*8 + filter
//! ```
//!
//! Every component is range-checked before packing so that distinct data
//! IDs always produce distinct identifiers.

use super::components::{ChannelId, PatchId, RaftId, SensorId};
use super::data_id::DataId;
use crate::error::{Error, Result};

/// Bits used by amplifier exposure IDs.
pub const AMP_EXPOSURE_ID_BITS: u32 = 45;
/// Bits used by CCD exposure IDs.
pub const CCD_EXPOSURE_ID_BITS: u32 = 41;
/// Bits used by per-filter coadd IDs (`1 + 7 + 13*2 + 3`).
pub const COADD_ID_BITS: u32 = 37;
/// Bits used by filter-merged coadd IDs.
pub const MERGED_COADD_ID_BITS: u32 = 34;

/// Largest visit number the amplifier packing can hold without overflow.
pub const MAX_VISIT: u64 = (1 << 45) - 1;
/// Number of tracts representable in a coadd ID.
pub const TRACT_LIMIT: i64 = 128;
/// Number of patches per axis representable in a coadd ID.
pub const PATCH_LIMIT: i64 = 8192;

const RAFT_LIMIT: u8 = 5;
const SENSOR_LIMIT: u8 = 3;
const CHANNEL_X_LIMIT: u8 = 2;
const CHANNEL_Y_LIMIT: u8 = 8;

/// Coadd filter index for each supported filter name.
const FILTER_INDICES: &[(&str, u64)] = &[
    ("u", 0),
    ("g", 1),
    ("r", 2),
    ("i", 3),
    ("z", 4),
    ("y", 5),
    ("i2", 5),
];

/// Look up the coadd index of a filter.
///
/// # Errors
///
/// Returns [`Error::UnknownFilter`] for names outside `u g r i z y i2`.
pub fn filter_index(name: &str) -> Result<u64> {
    FILTER_INDICES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, i)| *i)
        .ok_or_else(|| Error::UnknownFilter(name.to_string()))
}

/// The fields of a CCD exposure ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CcdKey {
    /// Visit number.
    pub visit: u64,
    /// Raft position.
    pub raft: RaftId,
    /// Sensor position; never a wavefront half.
    pub sensor: SensorId,
}

/// The fields of an amplifier exposure ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmpKey {
    /// Visit number.
    pub visit: u64,
    /// Snap, 0 or 1.
    pub snap: u8,
    /// Raft position.
    pub raft: RaftId,
    /// Sensor position; never a wavefront half.
    pub sensor: SensorId,
    /// Amplifier channel.
    pub channel: ChannelId,
}

fn check_digit(what: &'static str, value: u8, limit: u8) -> Result<u64> {
    if value < limit {
        Ok(u64::from(value))
    } else {
        Err(Error::id_range(what, i64::from(value), 0, i64::from(limit)))
    }
}

fn check_visit(visit: u64) -> Result<u64> {
    if visit <= MAX_VISIT {
        Ok(visit)
    } else {
        Err(Error::id_range(
            "visit",
            i64::try_from(visit).unwrap_or(i64::MAX),
            0,
            (MAX_VISIT + 1) as i64,
        ))
    }
}

fn raft_index(raft: RaftId) -> Result<u64> {
    Ok(check_digit("raft x", raft.x, RAFT_LIMIT)? * 5 + check_digit("raft y", raft.y, RAFT_LIMIT)?)
}

fn sensor_index(sensor: SensorId) -> Result<u64> {
    if sensor.half.is_some() {
        return Err(Error::id_format("sensor", sensor.to_string()));
    }
    Ok(check_digit("sensor x", sensor.x, SENSOR_LIMIT)? * 3
        + check_digit("sensor y", sensor.y, SENSOR_LIMIT)?)
}

fn channel_index(channel: ChannelId) -> Result<u64> {
    Ok(check_digit("channel x", channel.x, CHANNEL_X_LIMIT)? * 8
        + check_digit("channel y", channel.y, CHANNEL_Y_LIMIT)?)
}

impl CcdKey {
    /// Pack into a CCD exposure ID.
    ///
    /// # Errors
    ///
    /// Returns an error if any component is out of range.
    pub fn encode(&self) -> Result<u64> {
        let visit = check_visit(self.visit)?;
        Ok((visit << 9) + raft_index(self.raft)? * 10 + sensor_index(self.sensor)?)
    }

    /// Unpack a CCD exposure ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the low bits do not name a real raft and sensor.
    pub fn decode(id: u64) -> Result<Self> {
        let low = id & 0x1ff;
        let raft = low / 10;
        let sensor = low % 10;
        if raft >= 25 {
            return Err(Error::id_range("raft index", raft as i64, 0, 25));
        }
        if sensor >= 9 {
            return Err(Error::id_range("sensor index", sensor as i64, 0, 9));
        }
        Ok(Self {
            visit: id >> 9,
            raft: RaftId::new((raft / 5) as u8, (raft % 5) as u8),
            sensor: SensorId::new((sensor / 3) as u8, (sensor % 3) as u8),
        })
    }

    /// Convert back into a data ID in `"x,y"` form.
    #[must_use]
    pub fn to_data_id(&self) -> DataId {
        DataId::ccd(self.visit, self.raft.to_string(), self.sensor.to_string())
    }
}

impl AmpKey {
    /// Pack into an amplifier exposure ID.
    ///
    /// # Errors
    ///
    /// Returns an error if any component is out of range.
    pub fn encode(&self) -> Result<u64> {
        let visit = check_visit(self.visit)?;
        if self.snap > 1 {
            return Err(Error::InvalidSnap(i64::from(self.snap)));
        }
        Ok((visit << 13)
            + (u64::from(self.snap) << 12)
            + raft_index(self.raft)? * 160
            + sensor_index(self.sensor)? * 16
            + channel_index(self.channel)?)
    }

    /// Unpack an amplifier exposure ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the low bits do not name a real raft, sensor and
    /// channel.
    pub fn decode(id: u64) -> Result<Self> {
        let low = id & 0xfff;
        let raft = low / 160;
        let rem = low % 160;
        let sensor = rem / 16;
        let channel = rem % 16;
        if raft >= 25 {
            return Err(Error::id_range("raft index", raft as i64, 0, 25));
        }
        if sensor >= 9 {
            return Err(Error::id_range("sensor index", sensor as i64, 0, 9));
        }
        Ok(Self {
            visit: id >> 13,
            snap: ((id >> 12) & 1) as u8,
            raft: RaftId::new((raft / 5) as u8, (raft % 5) as u8),
            sensor: SensorId::new((sensor / 3) as u8, (sensor % 3) as u8),
            channel: ChannelId::new((channel / 8) as u8, (channel % 8) as u8),
        })
    }

    /// Convert back into a data ID in `"x,y"` form.
    #[must_use]
    pub fn to_data_id(&self) -> DataId {
        let mut id = DataId::ccd(self.visit, self.raft.to_string(), self.sensor.to_string());
        id.snap = Some(i64::from(self.snap));
        id.channel = Some(self.channel.to_string());
        id
    }
}

fn required<'a>(value: Option<&'a String>, key: &'static str) -> Result<&'a str> {
    value.map(String::as_str).ok_or(Error::MissingKey { key })
}

/// Extract the CCD key of a data ID, resolving aliases first.
///
/// # Errors
///
/// Returns an error if visit, raft or sensor is missing or malformed.
pub fn ccd_key(data_id: &DataId) -> Result<CcdKey> {
    let id = data_id.transform()?;
    Ok(CcdKey {
        visit: id.visit.ok_or(Error::MissingKey { key: "visit" })?,
        raft: required(id.raft.as_ref(), "raft")?.parse()?,
        sensor: required(id.sensor.as_ref(), "sensor")?.parse()?,
    })
}

/// Extract the amplifier key of a data ID, resolving aliases first.
///
/// # Errors
///
/// Returns an error if visit, snap, raft, sensor or channel is missing or
/// malformed.
pub fn amp_key(data_id: &DataId) -> Result<AmpKey> {
    let id = data_id.transform()?;
    let snap = id.snap.ok_or(Error::MissingKey { key: "snap" })?;
    let snap = u8::try_from(snap)
        .ok()
        .filter(|s| *s <= 1)
        .ok_or(Error::InvalidSnap(snap))?;
    Ok(AmpKey {
        visit: id.visit.ok_or(Error::MissingKey { key: "visit" })?,
        snap,
        raft: required(id.raft.as_ref(), "raft")?.parse()?,
        sensor: required(id.sensor.as_ref(), "sensor")?.parse()?,
        channel: required(id.channel.as_ref(), "channel")?.parse()?,
    })
}

/// The CCD exposure ID of a data ID.
///
/// # Errors
///
/// See [`ccd_key`] and [`CcdKey::encode`].
pub fn ccd_exposure_id(data_id: &DataId) -> Result<u64> {
    ccd_key(data_id)?.encode()
}

/// The amplifier exposure ID of a data ID.
///
/// # Errors
///
/// See [`amp_key`] and [`AmpKey::encode`].
pub fn amp_exposure_id(data_id: &DataId) -> Result<u64> {
    amp_key(data_id)?.encode()
}

fn coadd_base(data_id: &DataId) -> Result<u64> {
    let tract = data_id.tract.ok_or(Error::MissingKey { key: "tract" })?;
    if !(0..TRACT_LIMIT).contains(&tract) {
        return Err(Error::id_range("tract", tract, 0, TRACT_LIMIT));
    }
    let patch: PatchId = required(data_id.patch.as_ref(), "patch")?.parse()?;
    for (what, v) in [("patch x", patch.x), ("patch y", patch.y)] {
        if !(0..PATCH_LIMIT).contains(&v) {
            return Err(Error::id_range(what, v, 0, PATCH_LIMIT));
        }
    }
    Ok(((tract * PATCH_LIMIT + patch.x) * PATCH_LIMIT + patch.y) as u64)
}

/// The per-filter coadd ID of a `tract`/`patch`/`filter` data ID.
///
/// # Errors
///
/// Returns an error if tract, patch or filter is missing or out of range.
pub fn coadd_id(data_id: &DataId) -> Result<u64> {
    let filter = required(data_id.filter.as_ref(), "filter")?;
    Ok(coadd_base(data_id)? * 8 + filter_index(filter)?)
}

/// The filter-merged coadd ID of a `tract`/`patch` data ID.
///
/// # Errors
///
/// Returns an error if tract or patch is missing or out of range.
pub fn merged_coadd_id(data_id: &DataId) -> Result<u64> {
    coadd_base(data_id)
}
