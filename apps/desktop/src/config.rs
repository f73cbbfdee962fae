use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context};
use client_core::SessionConfig;
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "desktop.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(flatten)]
    pub session: SessionConfig,
    pub reconnect: bool,
    pub reconnect_initial_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub show_message_log: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            reconnect: false,
            reconnect_initial_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
            show_message_log: false,
        }
    }
}

impl Settings {
    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_bus_url(&self.session.bus_url)?;
        if self.session.transcript_cap == 0 {
            bail!("transcript_cap must be at least 1");
        }
        if self.reconnect_initial_delay_ms == 0
            || self.reconnect_initial_delay_ms > self.reconnect_max_delay_ms
        {
            bail!(
                "reconnect delays must satisfy 0 < initial ({}) <= max ({})",
                self.reconnect_initial_delay_ms,
                self.reconnect_max_delay_ms
            );
        }
        Ok(())
    }
}

pub fn load_settings(explicit_path: Option<&Path>) -> anyhow::Result<Settings> {
    let (path, required) = match explicit_path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };

    let mut settings = if path.exists() {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        parse_settings(&raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?
    } else if required {
        bail!("config file '{}' does not exist", path.display());
    } else {
        Settings::default()
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

pub fn parse_settings(raw: &str) -> anyhow::Result<Settings> {
    Ok(toml::from_str::<Settings>(raw)?)
}

pub fn apply_env_overrides<F>(settings: &mut Settings, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = var("BUS_URL") {
        settings.session.bus_url = v;
    }
    if let Some(v) = var("APP__BUS_URL") {
        settings.session.bus_url = v;
    }

    if let Some(v) = var("APP__TRANSCRIPT_CAP") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.session.transcript_cap = parsed;
        }
    }

    if let Some(v) = var("APP__RECONNECT") {
        if let Ok(parsed) = v.parse::<bool>() {
            settings.reconnect = parsed;
        }
    }
}

fn validate_bus_url(raw: &str) -> anyhow::Result<()> {
    let url = Url::parse(raw).with_context(|| format!("invalid bus url '{raw}'"))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        bail!("bus url must use ws:// or wss://, got '{raw}'");
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
