use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use herobot_sync::ServiceConfig;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "herobot")]
#[command(about = "Slack mention bot + weekly hero stat ingestion")]
struct Cli {
    #[arg(long, env = "HEROBOT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Commands {
    /// Run the HTTP server (default).
    Serve,
    /// Apply database migrations and exit.
    Migrate,
    /// Walk one date range for a hero and store a snapshot per Monday.
    Ingest {
        ocid: String,
        #[arg(long)]
        start_date: String,
        #[arg(long)]
        end_date: String,
    },
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let config = ServiceConfig::from_env().context("loading configuration")?;
            herobot_web::serve(config).await?;
        }
        Commands::Migrate => {
            let config = ServiceConfig::from_env().context("loading configuration")?;
            let pool = herobot_storage::connect_pool(&config.database_url, config.db_max_connections)
                .await
                .context("connecting to database")?;
            herobot_storage::run_migrations(&pool)
                .await
                .context("applying migrations")?;
            tracing::info!("migrations applied");
        }
        Commands::Ingest {
            ocid,
            start_date,
            end_date,
        } => {
            let summary = herobot_sync::run_ingest_once_from_env(&ocid, &start_date, &end_date).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
