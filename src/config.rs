use std::path::PathBuf;

use crate::jalali::TEHRAN_OFFSET_MINUTES;

const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1024 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Config {
    pub backend_api_url: String,
    pub backend_api_token: Option<String>,
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: u64,
    pub catalog_path: Option<PathBuf>,
    pub calendar_utc_offset_minutes: i32,
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        dotenvy::dotenv().ok();

        let backend_api_url = std::env::var("BACKEND_API_URL")
            .unwrap_or_else(|_| "http://localhost:5000/api".to_string());
        if !backend_api_url.starts_with("http://") && !backend_api_url.starts_with("https://") {
            return Err(format!("BACKEND_API_URL must be an http(s) URL, got {}", backend_api_url).into());
        }

        let backend_api_token = std::env::var("BACKEND_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        let catalog_path = std::env::var("CATALOG_PATH").ok().map(PathBuf::from);

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = parse_or("PORT", 5001);
        let max_upload_bytes = parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES);
        let calendar_utc_offset_minutes =
            parse_or("CALENDAR_UTC_OFFSET_MINUTES", TEHRAN_OFFSET_MINUTES);

        Ok(Self {
            backend_api_url,
            backend_api_token,
            host,
            port,
            max_upload_bytes,
            catalog_path,
            calendar_utc_offset_minutes,
        })
    }
}
