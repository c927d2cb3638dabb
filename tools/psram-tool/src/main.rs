use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use psram_storage::{
    ApertureLayout, BlockDevice, ChecksumMode, HeaderTracking, IoctlOp, Region,
    RegionBlockDevice, RegionConfig, RegionStream, DEFAULT_BLOCK_SIZE, DEFAULT_TMPFS_SIZE,
    PRESTO_PSRAM,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod image;

use image::FileAperture;

#[derive(Parser, Debug)]
#[command(
    name = "psram-tool",
    about = "Inspect, format and edit PSRAM block-storage regions inside an aperture image."
)]
struct Cli {
    /// Increase log verbosity (-v: debug, -vv: trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print region geometry and header status
    Info {
        #[command(flatten)]
        region: RegionArgs,

        /// Emit a JSON report instead of text
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Zero the region and stamp a fresh header, discarding whatever was there
    Format {
        #[command(flatten)]
        region: RegionArgs,
    },
    /// Copy blocks out of the region
    ReadBlock {
        #[command(flatten)]
        region: RegionArgs,

        /// First block number
        #[arg(long)]
        block: u32,

        /// Number of blocks to read
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Output file (defaults to stdout)
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Write a file into the region starting at a block boundary
    WriteBlock {
        #[command(flatten)]
        region: RegionArgs,

        /// First block number
        #[arg(long)]
        block: u32,

        /// Data to write
        input: PathBuf,
    },
    /// Copy the whole region body out
    Dump {
        #[command(flatten)]
        region: RegionArgs,

        /// Output file (defaults to stdout)
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Print the region as newline-separated text, stopping at the first NUL
    Lines {
        #[command(flatten)]
        region: RegionArgs,
    },
}

#[derive(Args, Debug)]
struct RegionArgs {
    /// Aperture image path (dump of the whole PSRAM window; created on write if missing)
    image: PathBuf,

    /// Region config as JSON (replaces the geometry/policy flags below)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Region body length in bytes
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_TMPFS_SIZE, value_parser = parse_u64)]
    length: u64,

    /// Body offset within the aperture (defaults to top-aligned)
    #[arg(long, value_name = "BYTES", value_parser = parse_u64)]
    offset: Option<u64>,

    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: u32,

    /// Wipe and re-initialise the region if its header does not validate
    #[arg(long, action = ArgAction::SetTrue)]
    create: bool,

    /// Only compare magic and length when validating the header
    #[arg(long, action = ArgAction::SetTrue)]
    skip_checksum: bool,

    /// Region has no header (plain block storage)
    #[arg(long, action = ArgAction::SetTrue)]
    untracked: bool,

    #[arg(long, value_name = "ADDR", default_value_t = PRESTO_PSRAM.base, value_parser = parse_u64)]
    aperture_base: u64,

    #[arg(long, value_name = "BYTES", default_value_t = PRESTO_PSRAM.size, value_parser = parse_u64)]
    aperture_size: u64,
}

impl RegionArgs {
    fn region_config(&self) -> anyhow::Result<RegionConfig> {
        if let Some(path) = &self.config {
            let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
            return serde_json::from_str(&raw)
                .with_context(|| format!("parse region config {}", path.display()));
        }

        let mut config = RegionConfig::new(self.length)
            .with_block_size(self.block_size)
            .with_allow_create(self.create);
        if let Some(offset) = self.offset {
            config = config.with_offset(offset);
        }
        if self.skip_checksum {
            config = config.with_checksum(ChecksumMode::Skip);
        }
        if self.untracked {
            config = config.with_tracking(HeaderTracking::Untracked);
        }
        Ok(config)
    }

    fn aperture(&self) -> anyhow::Result<FileAperture> {
        FileAperture::open(
            &self.image,
            ApertureLayout {
                base: self.aperture_base,
                size: self.aperture_size,
            },
        )
    }

    fn open(&self) -> anyhow::Result<Region<FileAperture>> {
        let config = self.region_config()?;
        let mut region = Region::open(self.aperture()?, config)
            .with_context(|| format!("open region in {}", self.image.display()))?;
        // Persist a wipe performed while opening.
        if region.config().allow_create {
            region.sync().context("write image")?;
        }
        Ok(region)
    }
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let s = s.replace('_', "");
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number {s:?}: {e}"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoReport {
    base_address: u64,
    offset: u64,
    length: u64,
    block_size: u32,
    block_count: u32,
    tracking: HeaderTracking,
    checksum_mode: ChecksumMode,
    header: Option<HeaderReport>,
    valid: bool,
    fault: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HeaderReport {
    magic: String,
    length: u32,
    checksum: u16,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli.command)
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Info { region, json } => info(&region, json),
        Command::Format { region } => format_region(&region),
        Command::ReadBlock {
            region,
            block,
            count,
            out,
        } => read_block(&region, block, count, out),
        Command::WriteBlock {
            region,
            block,
            input,
        } => write_block(&region, block, input),
        Command::Dump { region, out } => {
            let stream = RegionStream::new(region.open()?);
            write_output(out, &stream.get_value())
        }
        Command::Lines { region } => lines(&region),
    }
}

fn info(args: &RegionArgs, json: bool) -> anyhow::Result<()> {
    let region = Region::inspect(args.aperture()?, args.region_config()?)
        .context("place region")?;
    let status = region.header_status();
    let report = InfoReport {
        base_address: region.base_address(),
        offset: region.offset(),
        length: region.length(),
        block_size: region.block_size(),
        block_count: region.block_count(),
        tracking: region.tracking(),
        checksum_mode: region.config().checksum,
        header: status.map(|s| HeaderReport {
            magic: String::from_utf8_lossy(&s.header.magic).into_owned(),
            length: s.header.length,
            checksum: s.header.checksum,
        }),
        valid: region.is_valid(),
        fault: status.and_then(|s| s.fault).map(|f| f.to_string()),
    };

    let mut stdout = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut stdout, &report)?;
        writeln!(stdout)?;
        return Ok(());
    }
    writeln!(stdout, "{region}")?;
    writeln!(
        stdout,
        "base: {:#x}  offset: {:#x}  blocks: {} x {} bytes",
        report.base_address, report.offset, report.block_count, report.block_size
    )?;
    if let Some(fault) = &report.fault {
        writeln!(stdout, "fault: {fault}")?;
    }
    Ok(())
}

fn format_region(args: &RegionArgs) -> anyhow::Result<()> {
    let mut region = Region::recreate(args.aperture()?, args.region_config()?)
        .context("place region")?;
    region.sync().context("write image")?;
    eprintln!("formatted: {region}");
    Ok(())
}

fn read_block(
    args: &RegionArgs,
    block: u32,
    count: u32,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut dev = RegionBlockDevice::new(args.open()?);
    let block_size = dev.block_size()?;
    let len = (count as usize)
        .checked_mul(block_size as usize)
        .context("block count overflow")?;
    let mut buf = vec![0u8; len];
    dev.read_blocks(block, &mut buf, 0)
        .with_context(|| format!("read {count} block(s) at {block}"))?;
    write_output(out, &buf)
}

fn write_block(args: &RegionArgs, block: u32, input: PathBuf) -> anyhow::Result<()> {
    let data = fs::read(&input).with_context(|| format!("read {}", input.display()))?;
    let mut dev = RegionBlockDevice::new(args.open()?);
    dev.write_blocks(block, &data, 0)
        .with_context(|| format!("write {} byte(s) at block {block}", data.len()))?;
    dev.ioctl(IoctlOp::Sync).context("write image")?;
    Ok(())
}

fn lines(args: &RegionArgs) -> anyhow::Result<()> {
    let mut stream = RegionStream::new(args.open()?);
    let mut stdout = io::stdout().lock();
    loop {
        let line = stream.readline();
        let end = line.iter().position(|b| *b == 0).unwrap_or(line.len());
        stdout.write_all(&line[..end])?;
        if line.is_empty() || end < line.len() {
            break;
        }
    }
    Ok(())
}

fn write_output(out: Option<PathBuf>, data: &[u8]) -> anyhow::Result<()> {
    match out {
        Some(path) => fs::write(&path, data).with_context(|| format!("write {}", path.display())),
        None => io::stdout().lock().write_all(data).context("write stdout"),
    }
}
