use clap::Parser;
use std::path::PathBuf;

use ballchaser_runtime::config::{LOG_FILE, RobotConfig};

/// Ball-chasing robot runtime
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port of the bus bridge
    #[arg(long)]
    port: Option<String>,

    /// Use an in-memory bus instead of the hardware
    #[arg(long)]
    simulate: bool,

    /// Log to the console at debug level instead of the log file
    #[arg(long)]
    debug: bool,

    /// Log file used outside debug mode
    #[arg(long, default_value = LOG_FILE)]
    log_file: PathBuf,
}

// One thread: the pursuit loop and cooldown timers interleave only at await points
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    if let Err(e) = ballchaser_runtime::logging::init(args.debug, &args.log_file) {
        eprintln!("Logging setup error: {}", e);
        std::process::exit(1);
    }

    let mut config = match &args.config {
        Some(path) => match RobotConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(1);
            }
        },
        None => RobotConfig::default(),
    };
    if let Some(port) = args.port {
        config.bridge_port = port;
    }
    config.simulate |= args.simulate;

    if let Err(e) = ballchaser_runtime::runtime::run(config).await {
        tracing::error!("Runtime error: {}", e);
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
