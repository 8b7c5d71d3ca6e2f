use std::{collections::HashMap, fs, path::Path, time::Duration};

use tracing::warn;
use url::Url;

pub const SETTINGS_FILE: &str = "file_manager.toml";

#[derive(Debug, Clone)]
pub struct Settings {
    pub upload_url: String,
    pub delete_url: String,
    pub request_timeout_secs: u64,
    pub upload_chunk_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_url: "http://127.0.0.1:8000/files/upload".into(),
            delete_url: "http://127.0.0.1:8000/files".into(),
            request_timeout_secs: 120,
            upload_chunk_bytes: 64 * 1024,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then `path` (flat string keys), then environment overrides.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("upload_url") {
                    set_endpoint(&mut settings.upload_url, v);
                }
                if let Some(v) = file_cfg.get("delete_url") {
                    set_endpoint(&mut settings.delete_url, v);
                }
                if let Some(v) = file_cfg.get("request_timeout_secs") {
                    set_number(&mut settings.request_timeout_secs, v);
                }
                if let Some(v) = file_cfg.get("upload_chunk_bytes") {
                    set_number(&mut settings.upload_chunk_bytes, v);
                }
            }
            Err(err) => warn!(path = %path.display(), error = %err, "ignoring malformed settings file"),
        }
    }

    if let Some(v) = env("FILE_MANAGER_UPLOAD_URL") {
        set_endpoint(&mut settings.upload_url, &v);
    }
    if let Some(v) = env("APP__UPLOAD_URL") {
        set_endpoint(&mut settings.upload_url, &v);
    }

    if let Some(v) = env("FILE_MANAGER_DELETE_URL") {
        set_endpoint(&mut settings.delete_url, &v);
    }
    if let Some(v) = env("APP__DELETE_URL") {
        set_endpoint(&mut settings.delete_url, &v);
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        set_number(&mut settings.request_timeout_secs, &v);
    }
    if let Some(v) = env("APP__UPLOAD_CHUNK_BYTES") {
        set_number(&mut settings.upload_chunk_bytes, &v);
    }

    settings
}

fn set_endpoint(slot: &mut String, raw: &str) {
    match normalize_endpoint(raw) {
        Ok(url) => *slot = url,
        Err(err) => warn!(value = raw, error = %err, "ignoring invalid endpoint url"),
    }
}

fn set_number<T: std::str::FromStr + Default + PartialEq>(slot: &mut T, raw: &str) {
    match raw.trim().parse::<T>() {
        Ok(parsed) if parsed != T::default() => *slot = parsed,
        _ => warn!(value = raw, "ignoring invalid numeric setting"),
    }
}

/// Parses an endpoint and strips trailing slashes so paths can be appended.
pub fn normalize_endpoint(raw: &str) -> Result<String, url::ParseError> {
    let url = Url::parse(raw.trim())?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
