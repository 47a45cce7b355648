// you don't want your application runtime to randomly crash
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

use {
    std::{path::PathBuf, process::exit},
    tracing::{Level, info, error},
    tracing_subscriber::FmtSubscriber,
    clap::{Parser, Subcommand, ValueEnum, builder::PossibleValue},
    hits_core::CounterRequest,
    hits::{
        CounterHandler,
        CounterServer,
        config::{ConfigError, IncrementMode, ServerConfig},
        error::ServerError,
    },
};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// yaml config file, database settings from the environment take precedence over it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: Level,

    #[arg(long)]
    increment_mode: Option<ArgsIncrementMode>,
}

#[derive(Debug, Clone)]
pub enum ArgsIncrementMode {
    ReadThenWrite,
    Transactional,
}

impl ValueEnum for ArgsIncrementMode {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::ReadThenWrite, Self::Transactional]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        Some(match self {
            Self::ReadThenWrite => PossibleValue::new("read-then-write").help("select and update without a transaction"),
            Self::Transactional => PossibleValue::new("transactional").help("select and update in one transaction"),
        })
    }
}

impl From<ArgsIncrementMode> for IncrementMode {
    fn from(value: ArgsIncrementMode) -> Self {
        match value {
            ArgsIncrementMode::ReadThenWrite => Self::ReadThenWrite,
            ArgsIncrementMode::Transactional => Self::Transactional,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve counter requests over http
    Serve {
        #[arg(long)]
        port: Option<u16>,

        #[arg(long)]
        metrics_port: Option<u16>,
    },
    /// Increment one sequence and print the response body
    Increment {
        sequence: String,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    FmtSubscriber::builder().with_max_level(args.log_level).init();

    if let Err(err) = run(args).await {
        error!("{err}");
        exit(1);
    }
}

async fn run(args: Args) -> Result<(), ServerError> {
    let config = load_config(args.config)?;
    let config = match args.increment_mode {
        Some(increment_mode) => config.with_increment_mode(increment_mode.into()),
        None => config,
    };

    match args.command {
        Command::Serve { port, metrics_port } => {
            let config = match port {
                Some(port) => config.with_http_port(port),
                None => config,
            };
            let config = match metrics_port {
                Some(port) => config.with_metrics_port(port),
                None => config,
            };

            CounterServer::new(config).serve().await
        },
        Command::Increment { sequence } => {
            let handler = CounterHandler::new(config.database()?);
            let response = tokio::task::spawn_blocking(move || handler.handle(&CounterRequest::new().with_sequence(sequence)))
                .await
                .map_err(|err| ServerError::WorkerPool { reason: err.to_string() })?;

            println!("{}", response.to_json());
            if response.is_server_error() {
                exit(1);
            }
            Ok(())
        },
    }
}

fn load_config(config_path: Option<PathBuf>) -> Result<ServerConfig, ConfigError> {
    let config = match config_path {
        Some(config_path) => {
            let config_path = std::env::current_dir()
                .map(|dir| dir.join(&config_path))
                .unwrap_or(config_path);
            info!("Loading config from {config_path:?}");
            ServerConfig::load(config_path)?
        },
        None => ServerConfig::default(),
    };

    Ok(config.with_env())
}
