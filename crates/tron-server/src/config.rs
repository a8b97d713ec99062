use std::time::Duration;

use thiserror::Error;
use tron_lib::player::{Color, ColorParseError};

pub const DEFAULT_PORT: u16 = 8765;
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid port '{0}'")]
    InvalidPort(String),
    #[error("Invalid tick interval '{0}', expected a positive number of milliseconds")]
    InvalidTickInterval(String),
    #[error(transparent)]
    InvalidColor(#[from] ColorParseError),
    #[error("At least one player color is required")]
    NoColors,
    #[error("Color {0} is listed more than once")]
    DuplicateColor(Color),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub tick_interval: Duration,
    /// Colors handed out to players. The number of colors caps how many players can be
    /// connected at once.
    pub colors: Vec<Color>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            tick_interval: DEFAULT_TICK_INTERVAL,
            colors: Color::defaults(),
        }
    }
}

impl ServerConfig {
    /// Read `PORT`, `TICK_INTERVAL_MS` and `TRON_COLORS` from the environment, falling back to
    /// defaults for anything that isn't set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(port) = lookup("PORT") {
            config.port = parse_port(&port)?;
        }
        if let Some(ms) = lookup("TICK_INTERVAL_MS") {
            config.tick_interval = match ms.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => return Err(ConfigError::InvalidTickInterval(ms)),
            };
        }
        if let Some(colors) = lookup("TRON_COLORS") {
            config.colors = parse_colors(&colors)?;
        }
        Ok(config)
    }
}

pub fn parse_port(port: &str) -> Result<u16, ConfigError> {
    port.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidPort(port.to_owned()))
}

fn parse_colors(colors: &str) -> Result<Vec<Color>, ConfigError> {
    let colors = colors
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::parse)
        .collect::<Result<Vec<Color>, _>>()?;
    if colors.is_empty() {
        return Err(ConfigError::NoColors);
    }
    for (i, color) in colors.iter().enumerate() {
        if colors[..i].contains(color) {
            return Err(ConfigError::DuplicateColor(color.clone()));
        }
    }
    Ok(colors)
}
