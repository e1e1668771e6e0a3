use crate::errors::{EngineError, EngineResult};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub db_file: String,
    pub server_port: u16,
    /// Divide the overall-efficiency sum by minutes per game before normalizing.
    pub efficiency_per_minute: bool,
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();

        let server_port = env_var_or("SERVER_PORT", "3001")
            .parse::<u16>()
            .map_err(|e| EngineError::Config(format!("SERVER_PORT: {e}")))?;

        let efficiency_per_minute = env_var_or("EFFICIENCY_PER_MINUTE", "false")
            .parse::<bool>()
            .map_err(|e| EngineError::Config(format!("EFFICIENCY_PER_MINUTE: {e}")))?;

        let db_file = env_var_or("NBA_DB_FILE", "nba_stats.db");
        if db_file.trim().is_empty() {
            return Err(EngineError::Config("NBA_DB_FILE: empty file name".into()));
        }

        Ok(Self {
            data_dir: PathBuf::from(env_var_or("NBA_DATA_DIR", "data")),
            db_file,
            server_port,
            efficiency_per_minute,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
