//! End-to-end tests: ingest simulator output, then rebuild the input
//! registry from the resulting `raw/` tree.

use std::path::{Path, PathBuf};

use obs_lsstsim::fits::{self, Header};
use obs_lsstsim::ingest::{ingest, IngestOptions, TransferMode};
use obs_lsstsim::registry::{build_input_registry, ScanCounts};
use obs_lsstsim::{DataId, Error, Registry, RegistryKind};

const VISIT: u64 = 85_471_048;

fn raw_header() -> Header {
    let mut h = Header::image(16, &[4, 2]);
    h.set("EXPTIME", 15.0);
    h.set("MJD-OBS", 51_544.5);
    h
}

fn amp_header(channel: &str) -> Header {
    let mut h = raw_header();
    h.set("OBSID", VISIT.to_string());
    h.set("FILTER", 2);
    h.set("CHIPID", "R22_S11");
    h.set("AMPID", format!("R22_S11_C{channel}"));
    h.set("OUTFILE", format!("lsst_a_{VISIT}_f2_R22_S11_C{channel}_E000"));
    h
}

fn write_simulator_output(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    for channel in ["00", "01", "14"] {
        let name = format!("lsst_a_{VISIT}_f2_R22_S11_C{channel}_E000.fits.gz");
        fits::write_headers(&dir.join(name), &[amp_header(channel)]).unwrap();
    }
}

fn sensor_dir(repo: &Path, snap: u8) -> PathBuf {
    repo.join(format!("raw/v{VISIT}-fr/E00{snap}/R22/S11"))
}

fn ingest_repo(dir: &Path) -> PathBuf {
    let input = dir.join("input");
    let repo = dir.join("repo");
    write_simulator_output(&input);
    let options = IngestOptions {
        mode: TransferMode::Copy,
        ..IngestOptions::default()
    };
    let summary = ingest(&[format!("{}/lsst_a_*.fits.gz", input.display())], &repo, &options)
        .unwrap();
    assert_eq!(summary.rows_added, 3);
    repo
}

#[test]
fn rebuilt_registry_matches_ingested_rows() {
    let dir = tempfile::tempdir().unwrap();
    let repo = ingest_repo(dir.path());

    let output = dir.path().join("scanned.sqlite3");
    let counts = build_input_registry(&[repo.clone()], None, &output).unwrap();
    assert_eq!(
        counts,
        ScanCounts {
            processed: 3,
            ..ScanCounts::default()
        }
    );

    let ingested = Registry::open_existing(repo.join("registry.sqlite3"), RegistryKind::Raw).unwrap();
    let scanned = Registry::open_existing(&output, RegistryKind::Raw).unwrap();
    let all = DataId::new();
    assert_eq!(scanned.lookup_raw(&all).unwrap(), ingested.lookup_raw(&all).unwrap());
    assert_eq!(scanned.visits().unwrap(), ingested.visits().unwrap());
}

#[test]
fn scan_counts_unrecognized_and_unreadable_files() {
    let dir = tempfile::tempdir().unwrap();
    let repo = ingest_repo(dir.path());

    // file name disagrees with its visit directory
    let sensor = sensor_dir(&repo, 0);
    fits::write_headers(&sensor.join("imsim_1_R22_S11_C00_E000.fits"), &[raw_header()]).unwrap();
    std::fs::write(sensor.join(format!("imsim_{VISIT}_R22_S11_C03_E000.fits")), b"garbage").unwrap();
    // second snap of one amplifier
    let snap1 = sensor_dir(&repo, 1);
    std::fs::create_dir_all(&snap1).unwrap();
    fits::write_headers(
        &snap1.join(format!("imsim_{VISIT}_R22_S11_C00_E001.fits.gz")),
        &[raw_header()],
    )
    .unwrap();

    let output = dir.path().join("scanned.sqlite3");
    let counts = build_input_registry(&[repo], None, &output).unwrap();
    assert_eq!(
        counts,
        ScanCounts {
            processed: 4,
            skipped: 0,
            unrecognized: 1,
            failed: 1,
        }
    );

    let registry = Registry::open_existing(&output, RegistryKind::Raw).unwrap();
    assert_eq!(registry.count("raw").unwrap(), 4);
    assert_eq!(registry.count("raw_visit").unwrap(), 1);

    let snap1_rows = registry
        .lookup_raw(&DataId::parse_pairs(&[format!("visit={VISIT}"), "snap=1".to_string()]).unwrap())
        .unwrap();
    assert_eq!(snap1_rows.len(), 1);
    assert_eq!(snap1_rows[0].channel, "0,0");
    assert_eq!(snap1_rows[0].tai_obs.as_deref(), Some("2000-01-01T11:59:28.000000000"));

    let by_name = registry
        .lookup_raw(&DataId::parse_pairs(&["ccdName=R:2,2 S:1,1", "snap=0", "channel=1,4"]).unwrap())
        .unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].visit, VISIT);
}

#[test]
fn scan_with_input_registry_skips_known_rows() {
    let dir = tempfile::tempdir().unwrap();
    let repo = ingest_repo(dir.path());
    let input = repo.join("registry.sqlite3");

    let output = dir.path().join("merged.sqlite3");
    let counts = build_input_registry(&[repo], Some(&input), &output).unwrap();
    assert_eq!(counts.skipped, 3);
    assert_eq!(counts.processed, 0);

    let registry = Registry::open_existing(&output, RegistryKind::Raw).unwrap();
    assert_eq!(registry.count("raw").unwrap(), 3);
}

#[test]
fn scan_refuses_existing_output() {
    let dir = tempfile::tempdir().unwrap();
    let repo = ingest_repo(dir.path());
    let existing = repo.join("registry.sqlite3");
    assert!(matches!(
        build_input_registry(&[repo], None, &existing),
        Err(Error::RegistryExists { .. })
    ));
}
