use std::env;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

pub const DEFAULT_API_URL: &str = "https://chie-aqui-back.onrender.com/api/";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: Url,
    pub session_file: PathBuf,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_base_url = env::var("CHIEAQUI_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        let timeout_secs: u64 = env::var("CHIEAQUI_HTTP_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "30".into())
            .parse()?;

        Ok(Self {
            api_base_url: parse_base_url(&api_base_url)?,
            session_file: env::var("CHIEAQUI_SESSION_FILE")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_session_file),
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Parse the API root, forcing a trailing slash so relative endpoint paths
/// join underneath it instead of replacing its last segment.
pub fn parse_base_url(raw: &str) -> anyhow::Result<Url> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).map_err(|e| anyhow::anyhow!("Invalid CHIEAQUI_API_URL {raw}: {e}"))
}

fn default_session_file() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".chieaqui").join("session.json"),
        None => PathBuf::from(".chieaqui-session.json"),
    }
}
