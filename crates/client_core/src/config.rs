use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub suppression_window_ms: u64,
    pub notice_duration_ms: u64,
    pub event_buffer: usize,
    pub server_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            suppression_window_ms: 100,
            notice_duration_ms: 3000,
            event_buffer: 1024,
            server_url: None,
        }
    }
}

impl Settings {
    pub fn suppression_window(&self) -> Duration {
        Duration::from_millis(self.suppression_window_ms)
    }

    pub fn notice_duration(&self) -> Duration {
        Duration::from_millis(self.notice_duration_ms)
    }
}

/// Defaults, then `client.toml` in the working directory if present, then
/// environment overrides.
pub fn load_settings() -> anyhow::Result<Settings> {
    let path = Path::new(DEFAULT_SETTINGS_FILE);
    let settings = if path.exists() {
        load_settings_file(path)?
    } else {
        Settings::default()
    };
    Ok(apply_env_overrides(settings, |key| std::env::var(key).ok()))
}

pub fn load_settings_from(path: &Path) -> anyhow::Result<Settings> {
    let settings = load_settings_file(path)?;
    Ok(apply_env_overrides(settings, |key| std::env::var(key).ok()))
}

fn load_settings_file(path: &Path) -> anyhow::Result<Settings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    parse_settings(&raw).with_context(|| format!("invalid settings file {}", path.display()))
}

fn parse_settings(raw: &str) -> anyhow::Result<Settings> {
    Ok(toml::from_str(raw)?)
}

fn apply_env_overrides(mut settings: Settings, var: impl Fn(&str) -> Option<String>) -> Settings {
    if let Some(v) = var("ENTITY_SYNC_SERVER_URL") {
        let v = v.trim();
        settings.server_url = (!v.is_empty()).then(|| v.to_string());
    }
    if let Some(parsed) = var("APP__SUPPRESSION_WINDOW_MS").and_then(|v| v.trim().parse().ok()) {
        settings.suppression_window_ms = parsed;
    }
    if let Some(parsed) = var("APP__NOTICE_DURATION_MS").and_then(|v| v.trim().parse().ok()) {
        settings.notice_duration_ms = parsed;
    }
    if let Some(parsed) = var("APP__EVENT_BUFFER").and_then(|v| v.trim().parse().ok()) {
        settings.event_buffer = parsed;
    }
    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
