use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Colors handed out to players, in allocation order.
pub const DEFAULT_COLORS: [&str; 3] = ["#ff0000", "#00ff00", "#0000ff"];

/// A player's car color in `#rrggbb` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(String);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("'{0}' is not a color of the form #rrggbb")]
pub struct ColorParseError(pub String);

impl Color {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The reference palette.
    pub fn defaults() -> Vec<Color> {
        DEFAULT_COLORS
            .iter()
            .map(|c| Color((*c).to_owned()))
            .collect()
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == 7
            && s.starts_with('#')
            && s[1..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(ColorParseError(s.to_owned()));
        }
        Ok(Self(s.to_owned()))
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(v: String) -> Result<Self, Self::Error> {
        v.parse()
    }
}

impl From<Color> for String {
    fn from(v: Color) -> Self {
        v.0
    }
}
