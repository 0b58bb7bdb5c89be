//! `lsstsim` - CLI for obs-lsstsim
//!
//! This binary exposes the data ID tools, camera repository builder,
//! registry builders, ingest and ISR bookkeeping on the command line.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;

use obs_lsstsim::camera::{self, Camera, CameraSources};
use obs_lsstsim::cli::{
    CameraCommand, Cli, Command, ConfigCommand, IdArgs, IdCommand, IngestCommand, IsrCommand,
    RegistryCommand, VisitInfoCommand,
};
use obs_lsstsim::ids::{codec, AmpKey, CcdKey};
use obs_lsstsim::ingest::{self, IngestOptions};
use obs_lsstsim::registry::{self, Registry, RegistryKind};
use obs_lsstsim::{fits, init_logging, isr, visit_info, Config, DataId, Dataset, Mapper};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    // Execute the command
    match cli.command {
        Command::Id(cmd) => handle_id(&config, cmd),
        Command::Camera(cmd) => handle_camera(&config, cmd),
        Command::Registry(cmd) => handle_registry(&config, cmd),
        Command::Ingest(cmd) => handle_ingest(&config, cmd),
        Command::VisitInfo(cmd) => handle_visit_info(&cmd),
        Command::Isr(cmd) => handle_isr(&config, cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_id(args: &IdArgs) -> Result<DataId> {
    DataId::parse_pairs(&args.pairs).context("parsing data ID")
}

fn print_packed(args: &IdArgs, id: u64, bits: u32) -> Result<()> {
    if args.json {
        print_json(&serde_json::json!({ "id": id, "bits": bits }))
    } else {
        println!("{id}");
        Ok(())
    }
}

fn handle_id(config: &Config, cmd: IdCommand) -> Result<()> {
    match cmd {
        IdCommand::Transform(args) => {
            let id = parse_id(&args)?;
            id.validate()?;
            let transformed = id.transform()?;
            if args.json {
                print_json(&transformed)?;
            } else {
                println!("{transformed}");
            }
        }
        IdCommand::Amp(args) => {
            let id = codec::amp_exposure_id(&parse_id(&args)?)?;
            print_packed(&args, id, codec::AMP_EXPOSURE_ID_BITS)?;
        }
        IdCommand::Ccd(args) => {
            let id = codec::ccd_exposure_id(&parse_id(&args)?)?;
            print_packed(&args, id, codec::CCD_EXPOSURE_ID_BITS)?;
        }
        IdCommand::Coadd { merged, id: args } => {
            let data_id = parse_id(&args)?;
            if merged {
                let id = codec::merged_coadd_id(&data_id)?;
                print_packed(&args, id, codec::MERGED_COADD_ID_BITS)?;
            } else {
                let id = codec::coadd_id(&data_id)?;
                print_packed(&args, id, codec::COADD_ID_BITS)?;
            }
        }
        IdCommand::DecodeCcd { id, json } => {
            let data_id = CcdKey::decode(id)?.to_data_id();
            if json {
                print_json(&data_id)?;
            } else {
                println!("{data_id}");
            }
        }
        IdCommand::DecodeAmp { id, json } => {
            let data_id = AmpKey::decode(id)?.to_data_id();
            if json {
                print_json(&data_id)?;
            } else {
                println!("{data_id}");
            }
        }
        IdCommand::Path {
            dataset,
            root,
            id: args,
        } => {
            let dataset: Dataset = dataset.parse()?;
            let mapper = Mapper::new(root.unwrap_or_else(|| config.registry.root.clone()))
                .with_calib_root(config.calib_root());
            let path = mapper.path(dataset, &parse_id(&args)?)?;
            if args.json {
                print_json(&serde_json::json!({ "dataset": dataset, "path": path }))?;
            } else {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}

fn handle_camera(config: &Config, cmd: CameraCommand) -> Result<()> {
    match cmd {
        CameraCommand::Build {
            description,
            output,
            phosim_version,
            clobber,
        } => {
            let Some(dir) = description.or_else(|| config.description.dir.clone()) else {
                bail!("no description directory given or configured");
            };
            let version = phosim_version.or_else(|| config.description.phosim_version.clone());
            let sources = CameraSources::from_description_dir(&dir, version)
                .with_context(|| format!("reading descriptions in {}", dir.display()))?;
            let camera = Camera::build(&sources)?;
            let out_dir = output.unwrap_or_else(|| config.description.output_dir.clone());
            let written = camera.write_repository(&out_dir, clobber)?;
            println!(
                "Wrote {} files for {} detectors to {}",
                written.len(),
                camera.config.detectors.len(),
                out_dir.display()
            );
        }
        CameraCommand::Gains { amp_dir, output } => {
            let table = camera::gain::extract_from_amp_images(&amp_dir)?;
            table.write(&output)?;
            println!("Wrote {} amplifiers to {}", table.len(), output.display());
        }
    }
    Ok(())
}

fn open_registry(config: &Config, kind: RegistryKind, path: Option<PathBuf>) -> Result<Registry> {
    let path = path.unwrap_or_else(|| config.registry_path(kind));
    Registry::open_existing(&path, kind)
        .with_context(|| format!("opening {kind} registry {}", path.display()))
}

fn handle_registry(config: &Config, cmd: RegistryCommand) -> Result<()> {
    match cmd {
        RegistryCommand::Raw {
            dirs,
            input,
            output,
        } => {
            let output = output.unwrap_or_else(|| config.registry_path(RegistryKind::Raw));
            let counts = registry::build_input_registry(&dirs, input.as_deref(), &output)?;
            println!(
                "{}: {} processed, {} skipped, {} unrecognized, {} failed",
                output.display(),
                counts.processed,
                counts.skipped,
                counts.unrecognized,
                counts.failed
            );
        }
        RegistryCommand::Calib { root, output } => {
            let root = root.unwrap_or_else(|| config.calib_root());
            let output = output.unwrap_or_else(|| config.registry_path(RegistryKind::Calib));
            for (dataset, count) in registry::build_calib_registry(&root, &output)? {
                println!("{dataset}: {count}");
            }
        }
        RegistryCommand::Defect {
            defect_dir,
            output,
            phosim_version,
        } => {
            let Some(dir) = defect_dir.or_else(|| config.registry.defect_dir.clone()) else {
                bail!("no defect directory given or configured");
            };
            let version = match phosim_version.or_else(|| config.description.phosim_version.clone())
            {
                Some(v) => v,
                None => match &config.description.dir {
                    Some(desc) => camera::read_phosim_version(desc)?,
                    None => bail!("no PhoSim version given or configured"),
                },
            };
            let output = output.unwrap_or_else(|| config.registry_path(RegistryKind::Defect));
            let added = registry::build_defect_registry(&dir, &output, &version)?;
            println!("{}: {added} defect lists", output.display());
        }
        RegistryCommand::Stats {
            kind,
            registry,
            json,
        } => {
            let stats = open_registry(config, kind, registry)?.stats()?;
            if json {
                print_json(&stats)?;
            } else {
                println!("{} registry (schema v{})", stats.kind, stats.schema_version);
                for table in &stats.tables {
                    println!("  {:<16} {}", table.name, table.rows);
                }
                println!("  size: {} bytes", stats.db_size_bytes);
            }
        }
        RegistryCommand::Lookup { registry, id: args } => {
            let rows = open_registry(config, RegistryKind::Raw, registry)?
                .lookup_raw(&parse_id(&args)?)?;
            if args.json {
                print_json(&rows)?;
            } else {
                for row in &rows {
                    println!("{}", row.key());
                }
            }
        }
        RegistryCommand::Visits { registry, json } => {
            let visits = open_registry(config, RegistryKind::Raw, registry)?.visits()?;
            if json {
                print_json(&visits)?;
            } else {
                for v in &visits {
                    println!(
                        "{} {} {}",
                        v.visit,
                        v.filter,
                        v.tai_obs.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        RegistryCommand::Defects {
            ccd,
            registry,
            json,
        } => {
            let rows = open_registry(config, RegistryKind::Defect, registry)?
                .defects(ccd.as_deref())?;
            if json {
                print_json(&rows)?;
            } else {
                for row in &rows {
                    println!("{} {} {}", row.ccd_serial, row.version, row.path);
                }
            }
        }
    }
    Ok(())
}

fn handle_ingest(config: &Config, cmd: IngestCommand) -> Result<()> {
    let root = cmd.root.unwrap_or_else(|| config.registry.root.clone());
    let mut bad_files = config.ingest.bad_files.clone();
    bad_files.extend(cmd.bad_files);
    let bad_ids = config
        .ingest
        .bad_ids
        .iter()
        .chain(&cmd.bad_ids)
        .map(|id| ingest::parse_bad_id(id).with_context(|| format!("parsing bad id {id:?}")))
        .collect::<Result<Vec<_>>>()?;
    let options = IngestOptions {
        mode: cmd.mode.unwrap_or(config.ingest.mode),
        dry_run: cmd.dry_run,
        create: cmd.create,
        bad_files,
        bad_ids,
        registry: cmd.registry,
    };
    let summary = ingest::ingest(&cmd.files, &root, &options)?;
    if cmd.json {
        print_json(&summary)?;
    } else {
        println!(
            "{} files: {} transferred, {} rows added, {} bad, {} failed, {} already ingested",
            summary.files,
            summary.transferred,
            summary.rows_added,
            summary.bad,
            summary.failed,
            summary.already_ingested
        );
    }
    Ok(())
}

fn handle_visit_info(cmd: &VisitInfoCommand) -> Result<()> {
    let header = fits::read_header(&cmd.file, cmd.hdu)
        .with_context(|| format!("reading {}", cmd.file.display()))?;
    let info = visit_info::make_visit_info(&header, cmd.exposure_id)?;
    if cmd.json {
        print_json(&info)?;
    } else {
        println!("exposure time:  {} s", info.exposure_time);
        println!("dark time:      {} s", info.dark_time);
        println!("date (TAI MJD): {}", info.date_tai_mjd);
        println!("date (UTC):     {}", info.date_utc.as_deref().unwrap_or("-"));
        println!(
            "RA/Dec:         {} {}",
            info.boresight_ra_dec[0], info.boresight_ra_dec[1]
        );
        println!(
            "Az/Alt:         {} {}",
            info.boresight_az_alt[0], info.boresight_az_alt[1]
        );
        println!("airmass:        {}", info.boresight_airmass);
        println!("rotation:       {}", info.boresight_rot_angle);
        println!("ERA:            {}", info.era);
    }
    Ok(())
}

fn handle_isr(config: &Config, cmd: IsrCommand) -> Result<()> {
    match cmd {
        IsrCommand::Plan {
            registry,
            no_snap_combine,
            id: args,
        } => {
            let sensor = parse_id(&args)?;
            let rows = open_registry(config, RegistryKind::Raw, registry)?.lookup_raw(&sensor)?;
            let snaps: BTreeSet<i64> = rows.iter().map(|r| r.snap).collect();
            let mut isr_config = config.isr.clone();
            if no_snap_combine {
                isr_config.do_snap_combine = false;
            }
            let plan =
                isr::plan_snaps(&isr_config, &sensor, &snaps.into_iter().collect::<Vec<_>>())?;
            if args.json {
                print_json(&plan)?;
            } else {
                println!("snaps:       {:?}", plan.snaps);
                println!("combine:     {}", plan.combine);
                println!("write snaps: {}", plan.write_snaps);
                println!("write:       {}", plan.write);
            }
        }
        IsrCommand::CombineSnaps {
            snap0,
            snap1,
            output,
        } => {
            let header = isr::combine_snaps(&config.isr, &snap0, &snap1, &output)?;
            for key in config.isr.sum_keys.iter().chain(&config.isr.average_keys) {
                if let Some(value) = header.get(key) {
                    println!("{key:<10}{value}");
                }
            }
            println!("Wrote {}", output.display());
        }
        IsrCommand::Eimage {
            input,
            output,
            defects,
            edge_border,
            json,
        } => {
            let mut isr_config = config.isr.clone();
            if let Some(border) = edge_border {
                isr_config.mask_edge_border = border;
            }
            let summary = isr::process_eimage(&isr_config, &input, &defects, &output)?;
            if json {
                print_json(&summary)?;
            } else {
                println!("size:       {}x{}", summary.width, summary.height);
                println!("defects:    {}", summary.defects);
                println!("saturated:  {}", summary.saturated);
                println!("hot pixels: {}", summary.hot_pixels);
                println!("Wrote {}", output.display());
            }
        }
    }
    Ok(())
}

fn show_path(label: &str, path: Option<&Path>) {
    match path {
        Some(p) => println!("  {label:<20}{}", p.display()),
        None => println!("  {label:<20}(unset)"),
    }
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                print_json(config)?;
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Description]");
                show_path("Directory:", config.description.dir.as_deref());
                println!(
                    "  {:<20}{}",
                    "PhoSim version:",
                    config.description.phosim_version.as_deref().unwrap_or("(from file)")
                );
                show_path("Output:", Some(&config.description.output_dir));
                println!();
                println!("[Registry]");
                show_path("Root:", Some(&config.registry.root));
                show_path("Calib root:", Some(&config.calib_root()));
                show_path("Defects:", config.registry.defect_dir.as_deref());
                println!();
                println!("[Ingest]");
                println!("  {:<20}{}", "Mode:", config.ingest.mode);
                println!("  {:<20}{}", "Bad files:", config.ingest.bad_files.len());
                println!("  {:<20}{}", "Bad ids:", config.ingest.bad_ids.len());
                println!();
                println!("[ISR]");
                println!("  {:<20}{}", "Snap combine:", config.isr.do_snap_combine);
                println!("  {:<20}{}", "Write snaps:", config.isr.do_write_snaps);
                println!("  {:<20}{}", "Saturation:", config.isr.sat_val);
                println!("  {:<20}{}", "Edge border:", config.isr.mask_edge_border);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            Config::validate_file(&path).context("invalid configuration")?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}
