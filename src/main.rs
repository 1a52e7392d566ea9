use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use gredis::config::{Config, ConfigError};
use gredis::health::{HealthCheckManager, PingHealthChecker};
use gredis::{command, ConnectionRouter};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gredis")]
#[command(about = "A multi-connection Redis command router")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "gredis team")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an example configuration file
    Config {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
    /// PING every configured connection
    Ping {
        /// Path to configuration file
        #[arg(short, long, default_value = "config/gredis.toml")]
        config: PathBuf,
        /// Keep checking every `router.health_check_interval_ms`
        #[arg(short, long)]
        watch: bool,
    },
    /// Run a single command on a configured connection
    Exec {
        /// Path to configuration file
        #[arg(short, long, default_value = "config/gredis.toml")]
        config: PathBuf,
        /// Connection to use instead of the default one
        #[arg(long)]
        connection: Option<String>,
        /// Command name, e.g. GET
        name: String,
        /// Command arguments
        args: Vec<String>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { output } => {
            generate_config(output)?;
        }
        Commands::Validate { config } => {
            validate_config(config)?;
        }
        Commands::Ping { config, watch } => {
            ping_connections(config, watch).await?;
        }
        Commands::Exec {
            config,
            connection,
            name,
            args,
        } => {
            exec_command(config, connection, name, args).await?;
        }
        Commands::Version => {
            show_version();
        }
    }

    Ok(())
}

fn load_config(config_path: &PathBuf) -> anyhow::Result<Config> {
    let config = Config::load_from_file(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    init_logging(&config)?;
    info!("Configuration loaded from: {:?}", config_path);
    Ok(config)
}

async fn ping_connections(config_path: PathBuf, watch: bool) -> anyhow::Result<()> {
    let config = load_config(&config_path)?;
    let router = ConnectionRouter::from_config(&config).await?;
    let manager = HealthCheckManager::new(Box::new(
        PingHealthChecker::new()
            .with_timeout(config.router.command_timeout())
            .with_interval(config.router.health_check_interval()),
    ));

    if watch {
        manager.run_health_checks(&router).await;
        return Ok(());
    }

    let reports = manager.check_router(&router).await;
    let unhealthy = reports.iter().filter(|r| !r.status.is_healthy()).count();
    for report in &reports {
        let mark = if report.status.is_healthy() { "✓" } else { "✗" };
        println!("{} {}", mark, report);
    }

    router.close_all().await?;

    if unhealthy > 0 {
        return Err(anyhow!("{} of {} connection(s) unhealthy", unhealthy, reports.len()));
    }
    Ok(())
}

async fn exec_command(
    config_path: PathBuf,
    connection: Option<String>,
    name: String,
    args: Vec<String>,
) -> anyhow::Result<()> {
    let config = load_config(&config_path)?;
    let command = command::parse(&name, &args)?;

    let router = ConnectionRouter::from_config(&config).await?;
    if let Some(connection) = connection {
        router.use_connection(&connection).await?;
    }

    let result = router.execute(&command).await;
    if let Ok(reply) = &result {
        println!("{}", reply);
    }

    if let Err(e) = router.close_all().await {
        warn!("{}", e);
    }

    result?;
    Ok(())
}

fn generate_config(output: PathBuf) -> anyhow::Result<()> {
    println!("Generating configuration file: {:?}", output);

    Config::create_example_config(&output)
        .map_err(|e| anyhow!("Failed to generate config: {}", e))?;

    println!("Configuration file generated successfully!");
    println!("Edit the file to match your environment and run:");
    println!("  gredis ping --config {:?}", output);

    Ok(())
}

fn validate_config(config_path: PathBuf) -> anyhow::Result<()> {
    println!("Validating configuration file: {:?}", config_path);

    match Config::load_from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration file is valid");
            println!(
                "  Default connection: {}",
                config.default_connection().unwrap_or("(none)")
            );
            println!("  Command timeout: {}ms", config.router.command_timeout_ms);
            println!("  Connections: {}", config.connections.len());
            for (i, connection) in config.connections.iter().enumerate() {
                println!(
                    "    {}: {} -> {} db {}",
                    i + 1,
                    connection.name,
                    connection.address(),
                    connection.database_index
                );
            }
        }
        Err(e) => {
            eprintln!("✗ Configuration file validation failed:");
            match &e {
                ConfigError::IoError(msg) => eprintln!("  File error: {}", msg),
                ConfigError::ParseError(msg) => eprintln!("  Parse error: {}", msg),
                ConfigError::ValidationError(msg) => eprintln!("  Validation error: {}", msg),
                ConfigError::SerializeError(msg) => eprintln!("  Serialization error: {}", msg),
            }
            return Err(e.into());
        }
    }

    Ok(())
}

fn show_version() {
    println!("gredis v{}", env!("CARGO_PKG_VERSION"));
    println!("A multi-connection Redis command router");
    println!();
    println!("Target: {}", std::env::consts::ARCH);
    println!();
    println!("Features:");
    println!("  • Named connections with an active target");
    println!("  • Typed command builders");
    println!("  • Pipelines and MULTI/EXEC transactions");
    println!("  • PING health checks");
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let result = match config.logging.format.as_str() {
        "compact" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .try_init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
    result.map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized at level: {}", config.logging.level);
    Ok(())
}
