use clap::{Arg, ArgAction, ArgGroup, Command, value_parser};
use clap_num::maybe_hex;
use exhume_body::{Body, BodySlice};
use log::{debug, error, info};
use mftview::mft::MasterFileTable;
use mftview::scan::{ScanOptions, process_records};
use mftview::sink::{ConsoleSink, OutputFormat};
use mftview::{MftError, MftSource, NtfsVolume, Result, device_path};
use std::io;
use std::path::{Path, PathBuf};

fn cli() -> Command {
    Command::new("mftview")
        .version(env!("CARGO_PKG_VERSION"))
        .author("ForensicXlab")
        .about("Extract the NTFS master file table and report per-file forensic metadata.")
        .arg(
            Arg::new("mft")
                .short('m')
                .long("mft")
                .value_parser(value_parser!(PathBuf))
                .help("Path to a previously extracted $MFT file."),
        )
        .arg(
            Arg::new("body")
                .short('b')
                .long("body")
                .value_parser(value_parser!(String))
                .requires("size")
                .help("The path to the body to exhume (image, device or drive letter such as C:)."),
        )
        .group(
            ArgGroup::new("input")
                .args(["mft", "body"])
                .required(true),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_parser(value_parser!(String))
                .required(false)
                .help("The format of the file, either 'raw' or 'ewf'."),
        )
        .arg(
            Arg::new("offset")
                .short('o')
                .long("offset")
                .value_parser(maybe_hex::<u64>)
                .default_value("0")
                .help("The NTFS partition starts at address (decimal or hex)."),
        )
        .arg(
            Arg::new("size")
                .short('s')
                .long("size")
                .value_parser(maybe_hex::<u64>)
                .help("The size of the NTFS partition in sectors (decimal or hex)."),
        )
        .arg(
            Arg::new("pbs")
                .long("pbs")
                .action(ArgAction::SetTrue)
                .requires("body")
                .help("Display the partition boot sector information."),
        )
        .arg(
            Arg::new("save_mft")
                .long("save-mft")
                .value_parser(value_parser!(PathBuf))
                .requires("body")
                .help("Write the reconstructed $MFT stream to this path."),
        )
        .arg(
            Arg::new("entry")
                .short('e')
                .long("entry")
                .value_parser(maybe_hex::<u32>)
                .help("Display the decoded MFT record with this entry number."),
        )
        .arg(
            Arg::new("include_short")
                .long("include-short")
                .action(ArgAction::SetTrue)
                .help("Also report DOS 8.3 short filename attributes."),
        )
        .arg(
            Arg::new("all_timestamps")
                .long("all-timestamps")
                .action(ArgAction::SetTrue)
                .help("Report every $FILE_NAME timestamp, not only those that differ."),
        )
        .arg(
            Arg::new("dump_dir")
                .long("dump-dir")
                .value_parser(value_parser!(PathBuf))
                .help("Write resident $DATA payloads into this directory."),
        )
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Output records as JSON lines."),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .action(ArgAction::SetTrue)
                .conflicts_with("json")
                .help("Output a flat file listing."),
        )
        .arg(
            Arg::new("log_level")
                .short('l')
                .long("log-level")
                .value_parser(["error", "warn", "info", "debug", "trace"])
                .default_value("info")
                .help("Set the log verbosity level"),
        )
}

fn main() {
    let matches = cli().get_matches();

    // Initialize logger.
    let level_filter = match matches.get_one::<String>("log_level").map(String::as_str) {
        Some("error") => log::LevelFilter::Error,
        Some("warn") => log::LevelFilter::Warn,
        Some("debug") => log::LevelFilter::Debug,
        Some("trace") => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };
    env_logger::Builder::new().filter_level(level_filter).init();

    if let Err(e) = run(&matches) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let json_output = matches.get_flag("json");

    let data = match matches.get_one::<PathBuf>("mft") {
        Some(path) => MftSource::ExtractedFile(path).acquire()?,
        None => from_body(matches, json_output)?,
    };

    let mft = MasterFileTable::from_bytes(&data)?;

    if let Some(entry) = matches.get_one::<u32>("entry") {
        let Some(record) = mft.get(*entry) else {
            error!("Entry {} is free or could not be decoded", entry);
            return Ok(());
        };
        if json_output {
            println!("{}", serde_json::to_string_pretty(&record.to_json())?);
        } else {
            println!("{}", record.to_string());
        }
        return Ok(());
    }

    let options = ScanOptions {
        include_short_names: matches.get_flag("include_short"),
        show_all_timestamps: matches.get_flag("all_timestamps"),
        dump_directory: matches.get_one::<PathBuf>("dump_dir").cloned(),
    };
    let format = if json_output {
        OutputFormat::Json
    } else if matches.get_flag("list") {
        OutputFormat::List
    } else {
        OutputFormat::Table
    };

    let stdout = io::stdout();
    let mut sink = ConsoleSink::new(stdout.lock(), format);
    let summary = process_records(&mft, &options, &mut sink)?;
    debug!("{:?}", summary);
    Ok(())
}

// Open the evidence container and pull the $MFT stream out of it.
fn from_body(matches: &clap::ArgMatches, json_output: bool) -> Result<Vec<u8>> {
    let Some(file_path) = matches.get_one::<String>("body") else {
        return Err(MftError::NotFound(PathBuf::new()));
    };
    let auto = String::from("auto");
    let format = matches.get_one::<String>("format").unwrap_or(&auto);
    let offset = matches.get_one::<u64>("offset").copied().unwrap_or(0);
    let size = matches.get_one::<u64>("size").copied().unwrap_or(0);

    let device = device_path(file_path);
    if !device.starts_with(r"\\.\") && !Path::new(&device).exists() {
        return Err(MftError::NotFound(PathBuf::from(device)));
    }

    let mut body = Body::new(device.clone(), format);
    debug!("Created Body from '{}'", device);

    let partition_size = size * body.get_sector_size() as u64;
    let mut slice = BodySlice::new(&mut body, offset, partition_size)
        .map_err(|e| MftError::Io(io::Error::other(format!("could not create BodySlice: {}", e))))?;

    let mut volume = NtfsVolume::new(&mut slice)?;

    if matches.get_flag("pbs") {
        if json_output {
            println!("{}", serde_json::to_string_pretty(&volume.pbs.to_json())?);
        } else {
            println!("{}", volume.pbs.to_string());
        }
    }

    let data = volume.extract_mft()?;

    if let Some(path) = matches.get_one::<PathBuf>("save_mft") {
        std::fs::write(path, &data)?;
        info!("Saved {} bytes of $MFT to {}", data.len(), path.display());
    }
    Ok(data)
}
