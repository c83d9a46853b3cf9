//! Runtime configuration assembled from command line flags.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use salesline_core::{CoreError, Database, EngineSettings};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_AUTO_LOSS_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Database file; the platform data directory when unset.
    pub db_path: Option<PathBuf>,
    pub engine: EngineSettings,
    /// How often the auto-loss detector runs. `None` disables the schedule;
    /// the manual trigger endpoint keeps working.
    pub auto_loss_interval: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            db_path: None,
            engine: EngineSettings::default(),
            auto_loss_interval: Some(Duration::from_secs(DEFAULT_AUTO_LOSS_INTERVAL_SECS)),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn open_database(&self) -> Result<Database, CoreError> {
        open_database(self.db_path.as_ref())
    }
}

/// Opens and migrates the database at `path`, or at the default location.
pub fn open_database(path: Option<&PathBuf>) -> Result<Database, CoreError> {
    let db = match path {
        Some(path) => Database::open(path)?,
        None => Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}
