//! Data identifiers: parsing, normalization, detector names and packed IDs.

pub mod codec;
pub mod components;
pub mod data_id;
pub mod names;

pub use codec::{AmpKey, CcdKey};
pub use components::{ChannelId, PatchId, RaftId, SensorHalf, SensorId};
pub use data_id::DataId;
