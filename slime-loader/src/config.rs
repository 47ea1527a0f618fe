use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::LoaderError;

fn config_default_file_path() -> PathBuf {
    PathBuf::from("slime_worlds")
}

fn config_default_sqlite_path() -> PathBuf {
    PathBuf::from("slime_worlds.db")
}

fn config_default_document_path() -> PathBuf {
    PathBuf::from("slime_documents")
}

#[derive(Debug, Deserialize)]
pub struct ConfigFileSource {
    #[serde(default = "config_default_file_path")]
    pub path: PathBuf,
}

impl Default for ConfigFileSource {
    fn default() -> Self {
        Self {
            path: config_default_file_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfigSqliteSource {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "config_default_sqlite_path")]
    pub path: PathBuf,
}

impl Default for ConfigSqliteSource {
    fn default() -> Self {
        Self {
            enabled: false,
            path: config_default_sqlite_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfigDocumentSource {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "config_default_document_path")]
    pub path: PathBuf,
}

impl Default for ConfigDocumentSource {
    fn default() -> Self {
        Self {
            enabled: false,
            path: config_default_document_path(),
        }
    }
}

/// Data sources to register, the file source is always present.
#[derive(Debug, Deserialize, Default)]
pub struct LoaderConfig {
    #[serde(default)]
    pub file: ConfigFileSource,
    #[serde(default)]
    pub sqlite: ConfigSqliteSource,
    #[serde(default, rename = "document-store")]
    pub document: ConfigDocumentSource,
}

impl LoaderConfig {
    /// First file that is found is loaded as config.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<LoaderConfig, LoaderError> {
        for path in paths {
            match std::fs::read_to_string(path) {
                Ok(str) => return Self::parse(&str),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Err(LoaderError::MissingConfig)
    }

    pub fn parse(str: &str) -> Result<LoaderConfig, LoaderError> {
        Ok(toml::from_str(str)?)
    }
}
