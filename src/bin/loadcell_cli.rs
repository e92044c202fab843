use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::mpsc;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use loadcell_daq::calibration::{CalibrationProcedure, ReferencePoint};
use loadcell_daq::config::AppConfig;
use loadcell_daq::decoder::decode;
use loadcell_daq::link::{available_ports, SerialLink, SimulatedLink};
use loadcell_daq::sampling::{LoopState, SampleConsumer, SamplingLoop};
use loadcell_daq::session::{LiveView, SegmentPaths, SessionRecorder, SessionState};
use loadcell_daq::{CalibrationParameters, Calibrator, RawSample, SensorTransport};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "loadcell_cli",
    about = "Calibrate and record a serial load cell"
)]
struct Cli {
    /// Configuration file (defaults to config/loadcell.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct DeviceArgs {
    /// Serial port (overrides the config file)
    #[arg(long)]
    port: Option<String>,
    #[arg(long)]
    baud: Option<u32>,
    /// Per-reading response timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Use the built-in simulated load cell instead of a serial port
    #[arg(long)]
    simulate: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial ports visible to the OS
    Ports,
    /// Print raw readings (and calibrated values if a calibration is given)
    Read {
        #[command(flatten)]
        device: DeviceArgs,
        #[arg(long, default_value_t = 10)]
        count: usize,
        #[arg(long)]
        calibration: Option<PathBuf>,
    },
    /// Run the two-point calibration and store the result as JSON
    Calibrate {
        #[command(flatten)]
        device: DeviceArgs,
        /// Reference load as VALUE, or VALUE:RAW to skip measuring it (give twice)
        #[arg(long = "point", required = true, num_args = 1)]
        points: Vec<PointArg>,
        /// Use this zero offset instead of capturing one
        #[arg(long)]
        zero_offset: Option<f64>,
        /// Unloaded readings averaged into the zero offset
        #[arg(long)]
        zero_samples: Option<usize>,
        /// Readings averaged per measured reference load
        #[arg(long)]
        samples: Option<usize>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Record a labelled segment to CSV with a live view
    Record {
        #[command(flatten)]
        device: DeviceArgs,
        /// Stored calibration (defaults to the config file's path)
        #[arg(long)]
        calibration: Option<PathBuf>,
        #[arg(long)]
        participant: String,
        /// Location tag, e.g. "Left UL"
        #[arg(long)]
        location: String,
        #[arg(long)]
        rate_hz: Option<f64>,
        /// Stop after this many samples
        #[arg(long)]
        samples: Option<u64>,
        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<f64>,
        /// Parent directory for participant folders
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Consecutive read failures tolerated before giving up
        #[arg(long)]
        max_failures: Option<u32>,
        /// Disable the live view
        #[arg(long)]
        quiet: bool,
    },
}

/// `--point` argument: a known load, optionally with its raw reading
#[derive(Debug, Clone, Copy, PartialEq)]
struct PointArg {
    value: f64,
    raw: Option<RawSample>,
}

impl FromStr for PointArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, raw) = match s.split_once(':') {
            Some((value, raw)) => (value, Some(raw)),
            None => (s, None),
        };
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|e| format!("invalid reference value {:?}: {}", value, e))?;
        if !value.is_finite() {
            return Err(format!("reference value must be finite, got {}", value));
        }
        let raw = match raw {
            Some(raw) => {
                let parsed: i32 = raw
                    .trim()
                    .parse()
                    .map_err(|e| format!("invalid raw reading {:?}: {}", raw, e))?;
                Some(RawSample::try_from(parsed)?)
            }
            None => None,
        };
        Ok(Self { value, raw })
    }
}

/// The transport selected on the command line
enum Device {
    Serial(SerialLink),
    Simulated(SimulatedLink),
}

impl Device {
    fn open(args: &DeviceArgs, config: &AppConfig) -> Result<Self> {
        if args.simulate {
            info!("[CLI] Using simulated load cell");
            return Ok(Device::Simulated(SimulatedLink::default()));
        }
        let mut serial = config.serial.clone();
        if let Some(port) = &args.port {
            serial.port = port.clone();
        }
        if let Some(baud) = args.baud {
            serial.baud_rate = baud;
        }
        if let Some(timeout_ms) = args.timeout_ms {
            serial.timeout_ms = timeout_ms;
        }
        let link = SerialLink::open(&serial.to_link_config())
            .with_context(|| format!("opening serial port {}", serial.port))?;
        Ok(Device::Serial(link))
    }

    fn transport(&mut self) -> &mut dyn SensorTransport {
        match self {
            Device::Serial(link) => link,
            Device::Simulated(link) => link,
        }
    }

    fn into_transport(self) -> Box<dyn SensorTransport> {
        match self {
            Device::Serial(link) => Box::new(link),
            Device::Simulated(link) => Box::new(link),
        }
    }

    /// Get the cell into a known state before a capture
    ///
    /// The simulated cell is set to the load directly; a real one waits for
    /// the operator to confirm.
    fn prepare_load(&mut self, load: f64, instruction: &str) -> Result<()> {
        match self {
            Device::Simulated(link) => {
                link.set_static_load(Some(load));
                Ok(())
            }
            Device::Serial(_) => prompt(instruction),
        }
    }
}

fn prompt(instruction: &str) -> Result<()> {
    eprint!("{} and press Enter... ", instruction);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading confirmation from stdin")?;
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    loadcell_daq::init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Ports => run_ports(),
        Commands::Read {
            device,
            count,
            calibration,
        } => run_read(&config, &device, count, calibration),
        Commands::Calibrate {
            device,
            points,
            zero_offset,
            zero_samples,
            samples,
            output,
        } => run_calibrate(
            &config,
            &device,
            &points,
            zero_offset,
            zero_samples.unwrap_or(config.calibration.zero_samples),
            samples.unwrap_or(config.calibration.reference_samples),
            output.unwrap_or_else(|| config.calibration.parameters_path.clone()),
        ),
        Commands::Record {
            device,
            calibration,
            participant,
            location,
            rate_hz,
            samples,
            duration_secs,
            out_dir,
            max_failures,
            quiet,
        } => {
            let request = RecordRequest {
                calibration,
                participant,
                location,
                rate_hz,
                samples,
                duration: duration_secs
                    .map(|secs| {
                        Duration::try_from_secs_f64(secs)
                            .with_context(|| format!("invalid --duration-secs {}", secs))
                    })
                    .transpose()?,
                out_dir,
                max_failures,
                quiet,
            };
            run_record(&config, &device, request)
        }
    }
}

fn run_ports() -> Result<ExitCode> {
    let ports = available_ports().context("listing serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(ExitCode::from(0))
}

fn run_read(
    config: &AppConfig,
    args: &DeviceArgs,
    count: usize,
    calibration: Option<PathBuf>,
) -> Result<ExitCode> {
    let params = calibration
        .map(|path| {
            CalibrationParameters::load(&path)
                .with_context(|| format!("loading calibration {}", path.display()))
        })
        .transpose()?;

    let mut device = Device::open(args, config)?;
    let link = device.transport();
    for index in 0..count {
        let bytes = link
            .request_raw_reading()
            .with_context(|| format!("reading sample {}", index))?;
        let raw = decode(bytes);
        match params {
            Some(params) => println!("{}\t{}\t{:.4}", index, raw, params.apply(raw)),
            None => println!("{}\t{}", index, raw),
        }
    }
    link.close();
    Ok(ExitCode::from(0))
}

#[derive(Serialize)]
struct CalibrationReport<'a> {
    zero_offset: f64,
    gradient: f64,
    points: &'a [ReferencePoint],
    output: &'a Path,
}

fn run_calibrate(
    config: &AppConfig,
    args: &DeviceArgs,
    points: &[PointArg],
    zero_offset: Option<f64>,
    zero_samples: usize,
    reference_samples: usize,
    output: PathBuf,
) -> Result<ExitCode> {
    let [first, second] = points else {
        bail!("exactly two --point values are required, got {}", points.len());
    };

    let needs_device = zero_offset.is_none() || first.raw.is_none() || second.raw.is_none();
    let mut device = if needs_device {
        Some(Device::open(args, config)?)
    } else {
        None
    };

    let mut calibrator = Calibrator::new();
    match (zero_offset, device.as_mut()) {
        (Some(offset), _) => calibrator
            .set_zero_offset(offset)
            .context("invalid --zero-offset")?,
        (None, Some(device)) => {
            device.prepare_load(0.0, "Remove all load from the cell")?;
            let mut procedure = CalibrationProcedure::new(device.transport(), zero_samples);
            procedure
                .capture_zero(&mut calibrator)
                .context("capturing zero offset")?;
        }
        (None, None) => bail!("no device available to capture the zero offset"),
    }

    let mut references = Vec::with_capacity(2);
    for point in [first, second] {
        let reference = match (point.raw, device.as_mut()) {
            (Some(raw), _) => ReferencePoint::new(point.value, raw),
            (None, Some(device)) => {
                device.prepare_load(
                    point.value,
                    &format!("Apply a load of {} to the cell", point.value),
                )?;
                CalibrationProcedure::new(device.transport(), reference_samples)
                    .measure_reference(point.value)
                    .with_context(|| format!("measuring reference {}", point.value))?
            }
            (None, None) => bail!("no device available to measure {}", point.value),
        };
        references.push(reference);
    }

    calibrator
        .set_gradient_from(references[0], references[1])
        .context("deriving gradient")?;
    let params = calibrator.parameters()?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    params
        .save(&output)
        .with_context(|| format!("writing {}", output.display()))?;

    let report = CalibrationReport {
        zero_offset: params.zero_offset(),
        gradient: params.gradient(),
        points: &references,
        output: &output,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(mut device) = device {
        device.transport().close();
    }
    Ok(ExitCode::from(0))
}

struct RecordRequest {
    calibration: Option<PathBuf>,
    participant: String,
    location: String,
    rate_hz: Option<f64>,
    samples: Option<u64>,
    duration: Option<Duration>,
    out_dir: Option<PathBuf>,
    max_failures: Option<u32>,
    quiet: bool,
}

fn run_record(config: &AppConfig, args: &DeviceArgs, request: RecordRequest) -> Result<ExitCode> {
    if !config.recording.is_known_location(&request.location) {
        bail!(
            "unknown location {:?}; expected one of {:?}",
            request.location,
            config.recording.locations
        );
    }

    let device = Device::open(args, config)?;
    let params = match (&request.calibration, &device) {
        (Some(path), _) => CalibrationParameters::load(path)
            .with_context(|| format!("loading calibration {}", path.display()))?,
        (None, Device::Simulated(link)) => {
            let profile = link.profile();
            info!("[CLI] Using the simulated cell's nominal calibration");
            CalibrationParameters::new(f64::from(profile.zero_counts), profile.counts_per_unit)?
        }
        (None, Device::Serial(_)) => {
            let path = &config.calibration.parameters_path;
            CalibrationParameters::load(path).with_context(|| {
                format!(
                    "loading calibration {} (run `calibrate` first or pass --calibration)",
                    path.display()
                )
            })?
        }
    };
    let calibrator = Calibrator::from_parameters(params);

    let mut settings = config.sampling.clone();
    if let Some(rate_hz) = request.rate_hz {
        settings.rate_hz = rate_hz;
    }
    if let Some(max_failures) = request.max_failures {
        settings.max_consecutive_failures = max_failures;
    }
    let sampling_config = settings.to_sampling_config(request.samples)?;

    let out_dir = request
        .out_dir
        .unwrap_or_else(|| config.recording.output_dir.clone());
    let paths = SegmentPaths::now(&out_dir, &request.participant, &request.location)?;
    let state = Arc::new(RwLock::new(SessionState::default()));
    let recorder = SessionRecorder::create(paths.clone(), &request.location, Arc::clone(&state))
        .with_context(|| format!("creating {}", paths.csv.display()))?;

    let mut consumers: Vec<Box<dyn SampleConsumer>> = vec![Box::new(recorder)];
    if !request.quiet {
        let view = LiveView::new(Box::new(io::stdout()), config.recording.display_window)
            .with_session(Arc::clone(&state))
            .with_refresh_every(config.recording.display_every);
        consumers.push(Box::new(view));
    }

    let mut sampling = SamplingLoop::new(device.into_transport(), sampling_config);
    sampling.start(&calibrator, consumers)?;

    let interrupts = spawn_ctrl_c_listener();
    let started = Instant::now();
    while sampling.state() == LoopState::Running {
        if let Some(limit) = request.duration {
            if started.elapsed() >= limit {
                info!("[CLI] Duration reached");
                break;
            }
        }
        match interrupts.recv_timeout(Duration::from_millis(50)) {
            Ok(()) => {
                info!("[CLI] Interrupted");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => thread::sleep(Duration::from_millis(50)),
        }
    }

    let outcome = sampling.stop();
    let max = state.read().ok().and_then(|s| s.max_observed);

    eprintln!("CSV: {}", paths.csv.display());
    eprintln!("Max force summary: {}", paths.max_force.display());
    if let Some(summary) = sampling.last_summary() {
        eprintln!(
            "Samples: {} | faults: {} | missed deadlines: {} | {}",
            summary.samples_emitted, summary.faults, summary.missed_deadlines, summary.reason
        );
    }
    match max {
        Some(max) => eprintln!("Max force: {max}"),
        None => eprintln!("Max force: none recorded"),
    }

    outcome.context("recording ended abnormally")?;
    Ok(ExitCode::from(0))
}

/// Forward Ctrl-C to the main thread
///
/// The signal future needs a runtime; a small current-thread runtime on a
/// helper thread is enough.
fn spawn_ctrl_c_listener() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("loadcell-ctrl-c".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    warn!("[CLI] Ctrl-C handling unavailable: {}", err);
                    return;
                }
            };
            runtime.block_on(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = tx.send(());
                }
            });
        });
    if let Err(err) = spawned {
        warn!("[CLI] Failed to spawn Ctrl-C listener: {}", err);
    }
    rx
}
