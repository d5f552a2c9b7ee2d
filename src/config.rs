use std::{env, path::PathBuf, str::FromStr};

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_LOG_FILTER: &str = "study_desk=info,tower_http=info";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub database_file: PathBuf,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Reads the process environment; call after `dotenvy::dotenv()` and
    /// once tracing is up.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = PathBuf::from(get("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into()));
        Config {
            port: parse_or(&get, "PORT", DEFAULT_PORT),
            database_file: get("DATABASE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("database.json")),
            upload_dir: get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("uploads")),
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
        }
    }
}

fn parse_or<T: FromStr + Copy>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match get(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value=%raw, "ignoring invalid setting");
            default
        }),
    }
}
