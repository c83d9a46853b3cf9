use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use salesline::config::{
    self, ServerConfig, DEFAULT_AUTO_LOSS_INTERVAL_SECS, DEFAULT_HOST, DEFAULT_PORT,
};
use salesline::engine::{
    AutoLossDetector, EngineSettings, DEFAULT_INACTIVITY_DAYS, DEFAULT_QUALIFICATION_THRESHOLD,
};
use salesline::models::RunTrigger;
use salesline::{api, mcp, scheduler};

#[derive(Parser)]
#[command(name = "salesline")]
#[command(about = "Dealership sales pipelines with automatic stage tracking")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server and the auto-loss scheduler
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,

        /// Database file (defaults to the platform data directory)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Lead score at which a lead becomes qualified
        #[arg(long, default_value_t = DEFAULT_QUALIFICATION_THRESHOLD, value_parser = clap::value_parser!(u8).range(0..=100))]
        qualify_threshold: u8,

        /// Days without activity before an open pipeline is marked lost
        #[arg(long, default_value_t = DEFAULT_INACTIVITY_DAYS)]
        inactivity_days: i64,

        /// Seconds between scheduled auto-loss scans (0 disables the schedule)
        #[arg(long, default_value_t = DEFAULT_AUTO_LOSS_INTERVAL_SECS)]
        auto_loss_interval_secs: u64,
    },
    /// Start MCP server via stdio
    Mcp {
        /// Database file (defaults to the platform data directory)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Run auto-loss detection once and exit
    DetectLosses {
        /// Database file (defaults to the platform data directory)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Days without activity before an open pipeline is marked lost
        #[arg(long, default_value_t = DEFAULT_INACTIVITY_DAYS)]
        inactivity_days: i64,
    },
    /// Check server status
    Status {
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,

        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "salesline=debug,salesline_core=debug,tower_http=debug".into()
            }),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve {
            port,
            host,
            db,
            qualify_threshold,
            inactivity_days,
            auto_loss_interval_secs,
        }) => {
            anyhow::ensure!(inactivity_days > 0, "--inactivity-days must be positive");
            let config = ServerConfig {
                host,
                port,
                db_path: db,
                engine: EngineSettings {
                    qualification_threshold: qualify_threshold,
                    inactivity_days,
                },
                auto_loss_interval: (auto_loss_interval_secs > 0)
                    .then(|| Duration::from_secs(auto_loss_interval_secs)),
            };
            serve(config).await?;
        }
        Some(Commands::Mcp { db }) => {
            let db = config::open_database(db.as_ref())?;
            mcp::run_stdio_server(db, EngineSettings::default()).await?;
        }
        Some(Commands::DetectLosses {
            db,
            inactivity_days,
        }) => {
            anyhow::ensure!(inactivity_days > 0, "--inactivity-days must be positive");
            let db = config::open_database(db.as_ref())?;
            let settings = EngineSettings {
                inactivity_days,
                ..EngineSettings::default()
            };
            let report = AutoLossDetector::new(db, settings).run(RunTrigger::Manual, Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Some(Commands::Status { host, port }) => {
            let url = format!("http://{}:{}/health", host, port);
            match reqwest::get(&url).await {
                Ok(response) if response.status().is_success() => {
                    let body: serde_json::Value = response.json().await?;
                    println!("Salesline server is running at {}:{} ({})", host, port, body["version"]);
                }
                Ok(response) => {
                    println!("Salesline server responded with {}", response.status());
                }
                Err(e) => {
                    tracing::debug!("Status check failed: {}", e);
                    println!("Salesline server is not running at {}:{}", host, port);
                }
            }
        }
        None => {
            // Default: start server
            serve(ServerConfig::default()).await?;
        }
    }

    Ok(())
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let addr = config.bind_addr()?;
    let db = config.open_database()?;

    let scheduler = config.auto_loss_interval.map(|interval| {
        tracing::info!(
            "Auto-loss detection every {}s ({} day window)",
            interval.as_secs(),
            config.engine.inactivity_days
        );
        scheduler::spawn_auto_loss_scheduler(
            AutoLossDetector::new(db.clone(), config.engine),
            interval,
        )
    });

    let app = api::create_router(db, config.engine);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Salesline server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    if let Some(handle) = scheduler {
        handle.abort();
    }
    Ok(())
}
