//! Property tests for exposure and coadd ID packing.

use obs_lsstsim::ids::codec::{self, MAX_VISIT, PATCH_LIMIT, TRACT_LIMIT};
use obs_lsstsim::ids::{AmpKey, CcdKey, ChannelId, RaftId, SensorId};
use obs_lsstsim::{DataId, Error};
use proptest::prelude::*;

fn arb_amp_key() -> impl Strategy<Value = AmpKey> {
    (
        0..=MAX_VISIT,
        0u8..2,
        (0u8..5, 0u8..5),
        (0u8..3, 0u8..3),
        (0u8..2, 0u8..8),
    )
        .prop_map(|(visit, snap, (rx, ry), (sx, sy), (cx, cy))| AmpKey {
            visit,
            snap,
            raft: RaftId::new(rx, ry),
            sensor: SensorId::new(sx, sy),
            channel: ChannelId::new(cx, cy),
        })
}

fn arb_ccd_key() -> impl Strategy<Value = CcdKey> {
    (0..=MAX_VISIT, (0u8..5, 0u8..5), (0u8..3, 0u8..3)).prop_map(
        |(visit, (rx, ry), (sx, sy))| CcdKey {
            visit,
            raft: RaftId::new(rx, ry),
            sensor: SensorId::new(sx, sy),
        },
    )
}

fn coadd_id(tract: i64, px: i64, py: i64, filter: &str) -> obs_lsstsim::Result<u64> {
    let mut id = DataId::new();
    id.tract = Some(tract);
    id.patch = Some(format!("{px},{py}"));
    id.filter = Some(filter.to_string());
    codec::coadd_id(&id)
}

proptest! {
    /// Decoding an amplifier ID gives back every field
    #[test]
    fn amp_id_decodes_to_same_fields(key in arb_amp_key()) {
        let id = key.encode().unwrap();
        prop_assert_eq!(id >> 13, key.visit);
        prop_assert_eq!(AmpKey::decode(id).unwrap(), key);
    }

    /// Decoding a CCD ID gives back every field
    #[test]
    fn ccd_id_decodes_to_same_fields(key in arb_ccd_key()) {
        let id = key.encode().unwrap();
        prop_assert_eq!(CcdKey::decode(id).unwrap(), key);
    }

    /// Distinct amplifiers never share an ID
    #[test]
    fn distinct_amps_have_distinct_ids(a in arb_amp_key(), b in arb_amp_key()) {
        prop_assume!(a != b);
        prop_assert_ne!(a.encode().unwrap(), b.encode().unwrap());
    }

    /// Packing through a data ID agrees with packing the key directly
    #[test]
    fn data_id_path_agrees(key in arb_amp_key()) {
        let via_data_id = codec::amp_exposure_id(&key.to_data_id()).unwrap();
        prop_assert_eq!(via_data_id, key.encode().unwrap());
    }

    /// Tracts past the limit are rejected
    #[test]
    fn coadd_rejects_large_tract(tract in TRACT_LIMIT..10 * TRACT_LIMIT) {
        let err = coadd_id(tract, 0, 0, "r").unwrap_err();
        prop_assert!(matches!(err, Error::IdRange { .. }), "expected IdRange, got {:?}", err);
    }

    /// Patches past the limit are rejected
    #[test]
    fn coadd_rejects_large_patch(p in PATCH_LIMIT..2 * PATCH_LIMIT, tract in 0..TRACT_LIMIT) {
        prop_assert!(coadd_id(tract, p, 0, "g").is_err());
        prop_assert!(coadd_id(tract, 0, p, "g").is_err());
    }

    /// The filter occupies the low three bits of a coadd ID
    #[test]
    fn coadd_filter_in_low_bits(
        tract in 0..TRACT_LIMIT,
        px in 0..PATCH_LIMIT,
        py in 0..PATCH_LIMIT,
    ) {
        let merged = {
            let mut id = DataId::new();
            id.tract = Some(tract);
            id.patch = Some(format!("{px},{py}"));
            codec::merged_coadd_id(&id).unwrap()
        };
        for (i, filter) in ["u", "g", "r", "i", "z", "y"].iter().enumerate() {
            prop_assert_eq!(coadd_id(tract, px, py, filter).unwrap(), merged * 8 + i as u64);
        }
    }
}

#[test]
fn largest_visit_is_accepted_and_next_is_rejected() {
    let ccd = |visit| CcdKey {
        visit,
        raft: RaftId::new(4, 4),
        sensor: SensorId::new(2, 2),
    };
    let amp = |visit| AmpKey {
        visit,
        snap: 1,
        raft: RaftId::new(4, 4),
        sensor: SensorId::new(2, 2),
        channel: ChannelId::new(1, 7),
    };

    let id = ccd(MAX_VISIT).encode().unwrap();
    assert_eq!(CcdKey::decode(id).unwrap(), ccd(MAX_VISIT));
    let id = amp(MAX_VISIT).encode().unwrap();
    assert_eq!(AmpKey::decode(id).unwrap(), amp(MAX_VISIT));

    assert!(matches!(ccd(MAX_VISIT + 1).encode(), Err(Error::IdRange { .. })));
    assert!(matches!(amp(MAX_VISIT + 1).encode(), Err(Error::IdRange { .. })));
    assert!(matches!(ccd(u64::MAX).encode(), Err(Error::IdRange { .. })));
}

#[test]
fn every_legal_ccd_of_a_visit_has_a_unique_id() {
    let mut seen = std::collections::HashSet::new();
    for rx in 0..5 {
        for ry in 0..5 {
            for sx in 0..3 {
                for sy in 0..3 {
                    let key = CcdKey {
                        visit: 85_471_048,
                        raft: RaftId::new(rx, ry),
                        sensor: SensorId::new(sx, sy),
                    };
                    assert!(seen.insert(key.encode().unwrap()));
                }
            }
        }
    }
    assert_eq!(seen.len(), 225);
}
