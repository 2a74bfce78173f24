use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Annotation labels prepended to metadata cells by the transcription sheet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Prefixes {
    pub age: String,
    pub migrated_from: String,
    pub migrated_to: String,
}

impl Default for Prefixes {
    fn default() -> Self {
        Self {
            age: "Age in 1947: ".to_string(),
            migrated_from: "Migrated From: ".to_string(),
            migrated_to: "Migrated To: ".to_string(),
        }
    }
}

/// Hub of the hub-and-spoke model.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Destination {
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
}

impl Default for Destination {
    fn default() -> Self {
        Self {
            name: "Delhi".to_string(),
            longitude: 77.2219388,
            latitude: 28.6517178,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct InputPaths {
    pub mentions: Option<PathBuf>,
    pub lookup: Option<PathBuf>,
    pub resolved: Option<PathBuf>,
    pub distances: Option<PathBuf>,
    pub countries: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub prefixes: Prefixes,
    pub destination: Destination,
    /// Country a location must differ from to count as international.
    pub home_country: String,
    pub inputs: InputPaths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefixes: Prefixes::default(),
            destination: Destination::default(),
            home_country: "India".to_string(),
            inputs: InputPaths::default(),
        }
    }
}

impl Config {
    /// Reads a TOML config, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
            .map_err(|err| PipelineError::Config(format!("{}: {err}", path.display())))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
