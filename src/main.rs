use anyhow::{Context, Result};
use chesscam::{
    CameraProvider, ChesscamConfig, ChesscamOrchestrator, ReplayCameraProvider,
    UnavailableCameraProvider,
};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "chesscam")]
#[command(about = "Multi-board chess camera service with live move streaming")]
#[command(version)]
#[command(long_about = "Tracks several physical chessboards at once. Each board's camera frames \
are turned into piece occupancy, reconciled into moves, and streamed to websocket subscribers. \
Without capture hardware, recorded detector output can be replayed from a directory.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "chesscam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the service")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Boards to create at startup
    #[arg(short, long, value_name = "N", help = "Number of boards to create at startup")]
    boards: Option<usize>,

    /// Starting position for every board
    #[arg(long, value_name = "FEN", help = "Starting position for every board")]
    fen: Option<String>,

    /// Replay recorded detections instead of using cameras
    #[arg(long, value_name = "DIR", help = "Directory of board-<id>.jsonl recordings to replay")]
    replay_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting chesscam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = ChesscamConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    apply_overrides(&mut config, &args);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let cameras = camera_provider(&config);

    let mut orchestrator = ChesscamOrchestrator::new(config, cameras).map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;

    orchestrator.initialize().await.map_err(|e| {
        error!("Failed to initialize: {}", e);
        e
    })?;

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("Error during execution: {}", e);
        e
    })?;

    info!("Chesscam exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn apply_overrides(config: &mut ChesscamConfig, args: &Args) {
    if let Some(boards) = args.boards {
        config.session.board_count = boards;
    }
    if let Some(fen) = &args.fen {
        config.session.initial_fen = fen.clone();
    }
    if let Some(dir) = &args.replay_dir {
        config.session.replay_dir = Some(dir.clone());
    }
}

fn camera_provider(config: &ChesscamConfig) -> Arc<dyn CameraProvider> {
    match &config.session.replay_dir {
        Some(dir) => {
            info!("Replaying recorded detections from {}", dir);
            Arc::new(ReplayCameraProvider::new(
                dir,
                config.detection.input_width,
                config.detection.input_height,
            ))
        }
        None => {
            if config.session.board_count > 0 {
                warn!("No capture devices are available on this host; use --replay-dir");
            }
            Arc::new(UnavailableCameraProvider)
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chesscam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()
        .context("failed to install the tracing subscriber")?;

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    let text = toml::to_string_pretty(&ChesscamConfig::default())
        .context("failed to serialize the default configuration")?;

    println!("# Chesscam configuration file");
    println!("# Every key is optional; environment variables such as");
    println!("# CHESSCAM_SERVER__PORT=9000 override the file.");
    println!("#");
    println!("# Per-board calibration, corners ordered a8, h8, h1, a1 in frame pixels:");
    println!("# [[calibration]]");
    println!("# board_id = 1");
    println!("# corners = [[112.0, 40.0], [530.0, 44.0], [560.0, 446.0], [90.0, 440.0]]");
    println!();
    println!("{}", text);
    Ok(())
}
