//! kosmos CLI: decode RTT capture dumps, compute interval statistics, and
//! play stimulus scenarios on an attached bench controller.

use anyhow::Result;
use clap::{Parser, Subcommand};
use kosmos_core::config::HarnessConfig;
use kosmos_core::parser::RecordParser;
use kosmos_core::profiler::{Profiler, ProfilerConfig, RelativeMeasure};
use kosmos_core::record::Record;
use kosmos_core::sequencer::Sequencer;
use kosmos_core::transport::ControllerLink;
use std::path::PathBuf;
use std::time::Duration;

/// Controller HID report layout: byte 0 is the report ID (always 0), byte 1
/// the command, the rest command-specific.
const REPORT_LEN: usize = 64;
const CMD_LOAD_FIRST: u8 = 0x01;
const CMD_LOAD_APPEND: u8 = 0x02;
const CMD_START: u8 = 0x03;
const CMD_STATUS: u8 = 0x04;
const STATUS_DONE: u8 = 0x01;
/// Instruction words per LOAD report (4 bytes each after the 3-byte head).
const WORDS_PER_REPORT: usize = 14;

struct CliControllerLink {
    device: hidapi::HidDevice,
}

impl CliControllerLink {
    fn open_first() -> Result<Self> {
        let controllers = kosmos_core::device::discover_controllers()?;
        let first = controllers
            .first()
            .ok_or_else(|| anyhow::anyhow!("No Kosmos controller found"))?;

        let api = hidapi::HidApi::new().map_err(|e| anyhow::anyhow!("hidapi init: {e}"))?;
        let device = api.open(first.vid, first.pid).map_err(|e| {
            anyhow::anyhow!(
                "open controller (VID=0x{:04X} PID=0x{:04X}): {e}",
                first.vid,
                first.pid
            )
        })?;

        println!("Using {}", first.model.name());
        Ok(Self { device })
    }

    fn write_report(&self, buf: &[u8; REPORT_LEN]) -> kosmos_core::error::Result<()> {
        self.device
            .write(buf)
            .map_err(|e| kosmos_core::error::Error::Transport(format!("write: {e}")))?;
        Ok(())
    }
}

impl ControllerLink for CliControllerLink {
    fn upload(&self, program: &[u32]) -> kosmos_core::error::Result<()> {
        for (i, chunk) in program.chunks(WORDS_PER_REPORT).enumerate() {
            let mut buf = [0u8; REPORT_LEN];
            buf[1] = if i == 0 { CMD_LOAD_FIRST } else { CMD_LOAD_APPEND };
            buf[2] = chunk.len() as u8;
            for (n, word) in chunk.iter().enumerate() {
                buf[3 + 4 * n..7 + 4 * n].copy_from_slice(&word.to_le_bytes());
            }
            self.write_report(&buf)?;
        }
        Ok(())
    }

    fn start(&self) -> kosmos_core::error::Result<()> {
        let mut buf = [0u8; REPORT_LEN];
        buf[1] = CMD_START;
        self.write_report(&buf)
    }

    fn poll_complete(&self) -> kosmos_core::error::Result<bool> {
        let mut buf = [0u8; REPORT_LEN];
        buf[1] = CMD_STATUS;
        self.write_report(&buf)?;

        let mut response = [0u8; REPORT_LEN];
        let n = self
            .device
            .read_timeout(&mut response, 100)
            .map_err(|e| kosmos_core::error::Error::Transport(format!("read_timeout: {e}")))?;
        if n == 0 {
            return Err(kosmos_core::error::Error::Timeout(
                "controller status read timed out after 100ms".to_string(),
            ));
        }
        Ok(response[1] == STATUS_DONE)
    }
}

#[derive(Parser)]
#[command(
    name = "kosmos",
    version,
    about = "HID device test harness: capture decoding and stimulus playback"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached Kosmos bench controllers.
    ListDevices,
    /// Decode an RTT capture dump and print its records.
    Decode {
        /// Path to the raw capture dump.
        dump: PathBuf,
    },
    /// Compute interval statistics over an RTT capture dump.
    Stats {
        /// Path to the raw capture dump.
        dump: PathBuf,
        /// Tag pair to measure, as START:END (repeatable).
        #[arg(long = "measure", required = true)]
        measures: Vec<String>,
        /// Record counter frequency in Hz.
        #[arg(long, default_value_t = kosmos_core::profiler::DEFAULT_RECORD_FREQUENCY_HZ)]
        frequency: u32,
        /// Tag marking device boot (enables startup-time reporting).
        #[arg(long)]
        boot_tag: Option<u16>,
    },
    /// Play a keystroke scenario on the first attached controller.
    Keystroke {
        /// Key channel id (0-11).
        key: u8,
        /// Hold duration in milliseconds.
        #[arg(long, default_value_t = 50.0)]
        duration_ms: f64,
        /// Number of repetitions.
        #[arg(long, default_value_t = 1)]
        repeat: u32,
        /// Delay between repetitions in milliseconds.
        #[arg(long)]
        gap_ms: Option<f64>,
        /// Play timeout in milliseconds.
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
}

fn parse_measure(spec: &str) -> Result<RelativeMeasure> {
    let (start, end) = spec
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("measure '{spec}' is not START:END"))?;
    Ok(RelativeMeasure::new(
        start.trim().parse()?,
        end.trim().parse()?,
    ))
}

/// Feed a dump through the parser in transport-sized chunks.
fn decode_dump(path: &PathBuf) -> Result<Vec<Record>> {
    let bytes = std::fs::read(path)?;
    let mut parser = RecordParser::new();
    let mut records = Vec::new();
    for chunk in bytes.chunks(kosmos_core::capture::READ_CHUNK) {
        records.extend(parser.feed(chunk).iter().map(Record::decode));
    }
    Ok(records)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ListDevices => {
            let controllers = kosmos_core::device::discover_controllers()?;
            if controllers.is_empty() {
                println!("No Kosmos controllers found.");
                println!("Ensure the bench controller is connected and powered.");
            } else {
                for dev in &controllers {
                    println!(
                        "{} (VID: 0x{:04X}, PID: 0x{:04X}, path: {})",
                        dev.model.name(),
                        dev.vid,
                        dev.pid,
                        dev.path
                    );
                }
            }
        }
        Commands::Decode { dump } => {
            let records = decode_dump(&dump)?;
            for rec in &records {
                println!(
                    "seq {:>5}  tag {:>5}  cycles {:>10}",
                    rec.seq_number, rec.tag, rec.cycles
                );
            }
            println!("{} records", records.len());
        }
        Commands::Stats {
            dump,
            measures,
            frequency,
            boot_tag,
        } => {
            let config = ProfilerConfig {
                record_frequency_hz: frequency,
                boot_tag,
            };
            let mut profiler = Profiler::new(config)?;
            let parsed: Vec<RelativeMeasure> = measures
                .iter()
                .map(|m| parse_measure(m))
                .collect::<Result<_>>()?;
            for &measure in &parsed {
                profiler.add_measure(measure);
            }

            let records = decode_dump(&dump)?;
            profiler.add(&records);
            profiler.process();

            println!("{} records", profiler.len());
            if let Some(startup) = profiler.startup_ms() {
                println!("startup time: {startup:.3} ms");
            }
            if let Some(gaps) = profiler.gap_report() {
                println!("{} sequence gap(s), first: {gaps}", gaps.count);
            }
            for &measure in &parsed {
                match profiler.stats(measure) {
                    Some(stats) => println!(
                        "{measure}: min={:.3} ms max={:.3} ms mean={:.3} ms samples={}",
                        stats.min_ms, stats.max_ms, stats.mean_ms, stats.samples
                    ),
                    None => println!("{measure}: no samples"),
                }
            }
        }
        Commands::Keystroke {
            key,
            duration_ms,
            repeat,
            gap_ms,
            timeout_ms,
        } => {
            let mut seq = Sequencer::new(&HarnessConfig::default())?;
            seq.begin_offline()?;
            seq.keystroke(key, duration_ms / 1000.0, repeat, gap_ms.map(|g| g / 1000.0))?;

            let link = CliControllerLink::open_first()?;
            seq.play(&link, Duration::from_millis(timeout_ms))?;
            println!("Played {repeat}x keystroke on key {key} ({duration_ms} ms hold)");
        }
    }

    Ok(())
}
