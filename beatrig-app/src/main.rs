//! beatrig - music-reactive DMX lighting
//!
//! Listens to the room (or replays a file), follows the song and drives the
//! rig over a DMX512 serial interface. Press Enter to stop.

mod config;
mod input;
mod replay;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use beatrig_analysis::BeatDetector;
use beatrig_dmx::{DmxDispatcher, Rig};
use beatrig_show::Show;

use config::ShowConfig;
use input::MicInput;

/// Interval between status log lines
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

const USAGE: &str = "usage: beatrig [--config FILE] [--write-config] [--list-devices] [AUDIO_FILE]";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    write_config: bool,
    list_devices: bool,
    replay: Option<PathBuf>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = Args::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().context("--config needs a file")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--write-config" => parsed.write_config = true,
                "--list-devices" => parsed.list_devices = true,
                "-h" | "--help" => {
                    println!("{USAGE}");
                    std::process::exit(0);
                }
                flag if flag.starts_with('-') => bail!("unknown option {flag}\n{USAGE}"),
                file => {
                    if parsed.replay.is_some() {
                        bail!("only one audio file can be replayed\n{USAGE}");
                    }
                    parsed.replay = Some(PathBuf::from(file));
                }
            }
        }
        Ok(parsed)
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse(std::env::args().skip(1))?;

    if args.list_devices {
        input::list_devices();
        return Ok(());
    }

    let config_path = args.config.clone().unwrap_or_else(ShowConfig::config_path);
    let config = match &args.config {
        Some(path) => ShowConfig::load_from(path)
            .with_context(|| format!("cannot read config {}", path.display()))?,
        None => ShowConfig::load()?,
    };

    if args.write_config {
        config
            .save_to(&config_path)
            .with_context(|| format!("cannot write config {}", config_path.display()))?;
        println!("wrote {}", config_path.display());
        return Ok(());
    }

    let rig = match &config.rig_file {
        Some(path) => {
            Rig::load(path).with_context(|| format!("cannot load rig {}", path.display()))?
        }
        None => Rig::standard(),
    };
    tracing::info!(
        fixtures = rig.fixtures().len(),
        groups = ?rig.group_names().collect::<Vec<_>>(),
        "rig loaded"
    );
    let dispatcher = DmxDispatcher::open(rig, &config.serial_port, config.fps);

    // Enter on stdin ends the show
    let stop = Arc::new(AtomicBool::new(false));
    let stop_on_enter = stop.clone();
    thread::spawn(move || {
        let _ = io::stdin().lock().lines().next();
        stop_on_enter.store(true, Ordering::SeqCst);
    });

    match &args.replay {
        Some(path) => run_replay(&config, dispatcher, path, stop),
        None => run_live(&config, dispatcher, stop),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

fn start_show(config: &ShowConfig, dispatcher: DmxDispatcher, sample_rate: u32) -> anyhow::Result<Show> {
    let detector = BeatDetector::new(config.detector_config(sample_rate), config.tuning_store());
    let show = Show::start(dispatcher, detector, config.director_config(sample_rate), None)?;
    Ok(show)
}

fn run_live(config: &ShowConfig, dispatcher: DmxDispatcher, stop: Arc<AtomicBool>) -> anyhow::Result<()> {
    let device = config.input_device.as_deref();
    let sample_rate = input::device_sample_rate(device)?;
    if sample_rate != config.sample_rate {
        tracing::info!(
            configured = config.sample_rate,
            device = sample_rate,
            "using the input device's sample rate"
        );
    }

    let show = start_show(config, dispatcher, sample_rate)?;
    let mic = MicInput::start(device, config.block_size, show.audio())?;
    println!("listening on {} - press Enter to stop", mic.device_name);

    let mut last_status = Instant::now();
    while !stop.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
        if last_status.elapsed() >= STATUS_INTERVAL {
            log_status(&show);
            last_status = Instant::now();
        }
    }

    // Stop the input before the worker
    drop(mic);
    show.shutdown();
    Ok(())
}

fn run_replay(
    config: &ShowConfig,
    dispatcher: DmxDispatcher,
    path: &std::path::Path,
    stop: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let audio = replay::decode_file(path, config.sample_rate)
        .with_context(|| format!("cannot replay {}", path.display()))?;
    let show = start_show(config, dispatcher, audio.sample_rate)?;
    println!(
        "replaying {} ({:.0} s) - press Enter to stop",
        path.display(),
        audio.duration_secs()
    );

    let mut last_status = Instant::now();
    replay::feed_realtime(&audio, show.audio(), config.block_size, || {
        if last_status.elapsed() >= STATUS_INTERVAL {
            log_status(&show);
            last_status = Instant::now();
        }
        !stop.load(Ordering::SeqCst)
    });

    // Let the worker catch up with what is queued
    let deadline = Instant::now() + Duration::from_secs(1);
    while show.audio().queued() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    show.shutdown();
    Ok(())
}

fn log_status(show: &Show) {
    let dmx = show.dmx();
    tracing::info!(
        blocks = show.blocks_processed(),
        dropped = show.dropped_blocks(),
        frames = dmx.frames_sent(),
        send_errors = dmx.send_errors(),
        dmx_error = dmx.last_error().as_deref().unwrap_or("none"),
        "status"
    );
}
