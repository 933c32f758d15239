use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use redrob_core::config::DEFAULT_CONFIG_PATH;
use redrob_core::hardware::{ShellRunner, SimAdc, SimGpio};
use redrob_core::{DaemonConfig, Hardware, RedrobCore, RedrobResult};

/// Battery level fed to the simulated ADC.
const SIM_BATTERY_VOLTAGE: f32 = 7.4;

#[derive(Parser)]
#[command(name = "redrobd")]
#[command(about = "redrob robot supervisory daemon")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log debug messages and steering changes
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Log to stdout instead of the log file
    #[arg(short = 's', long = "stdout")]
    stdout: bool,

    /// Use simulated GPIO and ADC instead of the hardware
    #[arg(long = "simulate")]
    simulate: bool,
}

/// How the supervision loop ended.
#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Terminated,
    ShutdownSwitch,
}

fn main() {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => {}
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = DaemonConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.verbose |= cli.verbose;
    config.log_stdout |= cli.stdout;
    config.validate().context("invalid configuration")?;

    init_logger(&config)?;

    let info = redrob_core::prod_info();
    log::info!(
        "{} {} starting (v{})",
        info.prod_num,
        info.rstate,
        env!("CARGO_PKG_VERSION")
    );

    let terminate = Arc::new(AtomicBool::new(false));
    {
        let terminate = Arc::clone(&terminate);
        if let Err(e) = ctrlc::set_handler(move || {
            terminate.store(true, Ordering::SeqCst);
        }) {
            log::warn!("Failed to set signal handler: {}", e);
        }
    }

    let simulated = cli.simulate || !cfg!(feature = "gpio-hardware");
    let hw = build_hardware(simulated, &config)?;
    let runner = Arc::clone(&hw.runner);
    let core = RedrobCore::new(hw);

    core.initialize(&config).context("initialize")?;

    let exit = supervise(&core, &config, &terminate);
    let exit = conclude(exit, core.finalize())?;

    match exit {
        Exit::ShutdownSwitch if !simulated => {
            log::warn!("Shutting down the system");
            runner
                .run("shutdown", &["-h", "now"])
                .context("running shutdown")?;
        }
        Exit::ShutdownSwitch => log::info!("Shutdown switch ignored in simulation"),
        Exit::Terminated => log::info!("Terminated"),
    }
    Ok(())
}

/// Combine the supervision outcome with finalize. A supervision failure
/// is what gets reported; a finalize error after it is only logged.
fn conclude(exit: Result<Exit>, finalized: RedrobResult<()>) -> Result<Exit> {
    match exit {
        Ok(exit) => {
            finalized.context("finalize")?;
            Ok(exit)
        }
        Err(e) => {
            if let Err(f) = finalized {
                log::error!("Finalize after failure: {}", f);
            }
            Err(e)
        }
    }
}

/// Check the core at `supervision_freq` until told to stop or it fails.
fn supervise(core: &RedrobCore, config: &DaemonConfig, terminate: &AtomicBool) -> Result<Exit> {
    let period = Duration::from_secs_f64(1.0 / config.supervision_freq);
    loop {
        thread::sleep(period);

        if let Err(e) = core.check_run_status() {
            eprintln!("{} {}", "Error:".red().bold(), e);
            if let Some(record) = core.get_last_error() {
                eprintln!("{}", record.to_string().red());
                log::error!("Last error: {}", record);
            }
            return Err(anyhow::Error::new(e).context("control loop failed"));
        }
        if terminate.load(Ordering::SeqCst) {
            return Ok(Exit::Terminated);
        }
        if core.shutdown_requested() {
            return Ok(Exit::ShutdownSwitch);
        }
    }
}

fn build_hardware(simulated: bool, config: &DaemonConfig) -> Result<Hardware> {
    if simulated {
        log::info!("Using simulated GPIO and ADC");
        let adc = SimAdc::new(config.adc.reference_voltage);
        // Shutdown switch in its pulled-up run position
        adc.set_voltage(config.adc.shutdown_channel, config.adc.reference_voltage);
        adc.set_voltage(
            config.adc.battery_channel,
            SIM_BATTERY_VOLTAGE * config.adc.battery_scale_factor,
        );
        return Ok(Hardware::new(
            Arc::new(SimGpio::new()),
            Arc::new(adc),
            Arc::new(ShellRunner),
        ));
    }
    hardware_backend(config)
}

#[cfg(feature = "gpio-hardware")]
fn hardware_backend(config: &DaemonConfig) -> Result<Hardware> {
    Hardware::raspberry_pi(config.adc.reference_voltage).context("opening GPIO and ADC")
}

#[cfg(not(feature = "gpio-hardware"))]
fn hardware_backend(_config: &DaemonConfig) -> Result<Hardware> {
    anyhow::bail!("built without the gpio-hardware feature")
}

fn init_logger(config: &DaemonConfig) -> Result<()> {
    let level = if config.verbose { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    });

    if config.log_stdout {
        builder.target(env_logger::Target::Stdout);
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_file)
            .with_context(|| format!("opening log file {}", config.log_file.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}
