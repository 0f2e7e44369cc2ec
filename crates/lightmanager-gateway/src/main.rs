//! `lightmanager` daemon.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser};
use lightmanager_gateway::{
    Clock, ClientSession, CommandEngine, ConfigError, DeviceIo, DeviceIoError, GatewayServer,
    HardwareTransport, HttpFrontEnd, PidFile, PlainSink, RuntimeConfig, ShutdownHandle,
    SimulatedDevice, StartupConfig, SystemClock, PROGRAM_NAME, VERSION,
};
use lightmanager_protocol::parse_fs20_code;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Gateway between a TCP command protocol and a jbmedia Light Manager.
#[derive(Parser, Debug)]
#[command(name = "lightmanager", disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// Listen on this address for command clients (default all available)
    #[arg(short = 'a', long)]
    address: Option<IpAddr>,

    /// Listen on this TCP port for command clients (default 3456)
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// FS20 housecode used for FS20 commands (default 11111111)
    #[arg(short = 'h', long, value_parser = parse_housecode)]
    housecode: Option<u16>,

    /// Execute the given commands and exit (separate commands by ';' or ',')
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// PID file name and location (default /var/run/lightmanager.pid)
    #[arg(short = 'f', long)]
    pidfile: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'g', long)]
    debug: bool,

    /// Use a simulated device instead of USB hardware
    #[arg(long)]
    simulate: bool,

    /// Read startup configuration from a YAML file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serve Prometheus metrics on this address (needs the `prometheus` feature)
    #[arg(long)]
    metrics_listen: Option<SocketAddr>,

    /// Print version and exit
    #[arg(short = 'v', long)]
    version: bool,

    /// Print this help and exit
    #[arg(short = '?', long, action = ArgAction::Help)]
    help: Option<bool>,
}

fn parse_housecode(value: &str) -> Result<u16, String> {
    parse_fs20_code(value).map_err(|err| err.to_string())
}

/// Fatal startup errors.
#[derive(Error, Debug)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot open device: {0}")]
    Device(#[from] DeviceIoError),

    #[error("this build has no USB support, use --simulate")]
    NoUsbSupport,

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        source: io::Error,
    },

    #[error("cannot install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[cfg(feature = "prometheus")]
    #[error("cannot start metrics exporter: {0}")]
    Metrics(#[from] lightmanager_metrics::metrics_exporter_prometheus::BuildError),
}

fn io_context(context: &'static str) -> impl FnOnce(io::Error) -> StartupError {
    move |source| StartupError::Io { context, source }
}

fn startup_config(cli: &Cli) -> Result<StartupConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => StartupConfig::load(path)?,
        None => StartupConfig::default(),
    };
    if let Some(address) = cli.address {
        config.address = address;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(housecode) = cli.housecode {
        config.housecode = housecode;
    }
    if let Some(pidfile) = &cli.pidfile {
        config.pidfile = pidfile.clone();
    }
    config.debug |= cli.debug;
    config.simulate |= cli.simulate;
    if let Some(addr) = cli.metrics_listen {
        config.metrics_listen = Some(addr);
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn open_device(
    config: &StartupConfig,
    clock: Arc<dyn Clock>,
) -> Result<Box<dyn DeviceIo>, StartupError> {
    if config.simulate {
        return Ok(Box::new(SimulatedDevice::new(clock, &config.simulation)));
    }
    #[cfg(feature = "usb")]
    {
        Ok(Box::new(lightmanager_gateway::device::UsbDevice::open()?))
    }
    #[cfg(not(feature = "usb"))]
    {
        Err(StartupError::NoUsbSupport)
    }
}

/// Run the commands given with `-c` and report whether all succeeded.
fn run_once(front_end: &HttpFrontEnd, commands: &str) -> Result<bool, StartupError> {
    let mut session = ClientSession::one_shot();
    let mut sink = PlainSink::new(io::stdout().lock());
    front_end
        .execute(commands, &mut session, &mut sink)
        .map_err(io_context("cannot write output"))?;
    Ok(session.failures() == 0)
}

fn serve(config: &StartupConfig, engine: Arc<CommandEngine>) -> Result<(), StartupError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(io_context("cannot start runtime"))?;

    let shutdown = ShutdownHandle::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("termination signal received");
            shutdown.trigger();
        })?;
    }

    #[cfg(feature = "prometheus")]
    {
        if let Some(addr) = config.metrics_listen {
            let _guard = runtime.enter();
            lightmanager_metrics::install_prometheus(addr)?;
            info!("serving metrics on {}", addr);
        }
    }
    #[cfg(not(feature = "prometheus"))]
    {
        if config.metrics_listen.is_some() {
            warn!("built without the prometheus feature, metrics_listen ignored");
        }
    }

    let server = runtime
        .block_on(GatewayServer::bind(config.listen_addr(), engine, shutdown))
        .map_err(io_context("cannot listen"))?;

    let pid_file = match PidFile::create(&config.pidfile) {
        Ok(pid_file) => Some(pid_file),
        Err(err) => {
            warn!("cannot write PID file {}: {}", config.pidfile.display(), err);
            None
        }
    };

    let result = runtime.block_on(server.run()).map_err(io_context("server failed"));
    drop(pid_file);
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

fn run(config: StartupConfig, command: Option<&str>) -> Result<bool, StartupError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let device = open_device(&config, clock.clone())?;
    let transport = Arc::new(HardwareTransport::new(device, config.retry));
    let runtime_config = Arc::new(RuntimeConfig::from_startup(&config));
    let engine = Arc::new(CommandEngine::new(transport.clone(), runtime_config, clock));

    let result = match command {
        Some(commands) => run_once(&HttpFrontEnd::new(engine), commands),
        None => {
            lightmanager_metrics::describe_metrics();
            serve(&config, engine).map(|()| true)
        }
    };
    transport.release();
    result
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.version {
        println!("{} v{}", PROGRAM_NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let config = match startup_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("lightmanager: {}", err);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.debug);
    info!("{} v{} starting", PROGRAM_NAME, VERSION);

    match run(config, cli.command.as_deref()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
