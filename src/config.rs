use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::questions::ATTACHMENTS_DIR_NAME;

const CONFIG_DOCUMENT_NAME: &str = "config.json";
const QUESTIONS_DOCUMENT_NAME: &str = "questions.json";

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "modelbench", "ModelBench")
        .context("Unable to resolve platform directories")
}

/// Top-level settings for the modelbench service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default = "ServiceSettings::default_listen_addr")]
    pub listen_addr: String,
    /// Directory holding both documents and the attachment tree.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub config_document: Option<PathBuf>,
    #[serde(default)]
    pub questions_document: Option<PathBuf>,
    #[serde(default)]
    pub attachments_root: Option<PathBuf>,
    /// Directory whose `index.html` is served at `/`.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    #[serde(default = "ServiceSettings::default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl ServiceSettings {
    fn default_listen_addr() -> String {
        "127.0.0.1:8806".into()
    }

    const fn default_max_body_bytes() -> usize {
        64 * 1024 * 1024
    }

    /// Load settings from disk, writing defaults on first run.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Unable to read settings at {}", path.display()))?;
            let parsed: Self = serde_json::from_str(&raw)
                .with_context(|| format!("Malformed settings at {}", path.display()))?;
            Ok(parsed)
        } else {
            let settings = Self::default();
            settings.save(path)?;
            Ok(settings)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialised = serde_json::to_string_pretty(self)?;
        fs::write(path, serialised)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn listen_socket(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address {}", self.listen_addr))
    }

    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(path) = &self.data_dir {
            return Ok(path.clone());
        }
        Ok(project_dirs()?.data_dir().to_path_buf())
    }

    /// Provider configuration document.
    pub fn resolve_config_document(&self) -> Result<PathBuf> {
        if let Some(path) = &self.config_document {
            return Ok(path.clone());
        }
        Ok(self.resolve_data_dir()?.join(CONFIG_DOCUMENT_NAME))
    }

    /// Question bank document.
    pub fn resolve_questions_document(&self) -> Result<PathBuf> {
        if let Some(path) = &self.questions_document {
            return Ok(path.clone());
        }
        Ok(self.resolve_data_dir()?.join(QUESTIONS_DOCUMENT_NAME))
    }

    /// Root directory with one attachment folder per question. Defaults to a
    /// sibling of the question document.
    pub fn resolve_attachments_root(&self) -> Result<PathBuf> {
        if let Some(path) = &self.attachments_root {
            return Ok(path.clone());
        }
        let questions = self.resolve_questions_document()?;
        let parent = match questions.parent() {
            Some(parent) => parent.to_path_buf(),
            None => self.resolve_data_dir()?,
        };
        Ok(parent.join(ATTACHMENTS_DIR_NAME))
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            data_dir: None,
            config_document: None,
            questions_document: None,
            attachments_root: None,
            static_dir: None,
            max_body_bytes: Self::default_max_body_bytes(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Controls the optional JSON-lines log file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub json_file: bool,
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "LoggingSettings::default_max_files")]
    pub max_files: usize,
}

impl LoggingSettings {
    const fn default_max_files() -> usize {
        10
    }

    pub fn resolve_directory(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.directory {
            return Ok(dir.clone());
        }
        Ok(project_dirs()?.cache_dir().join("logs"))
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            json_file: false,
            directory: None,
            max_files: Self::default_max_files(),
        }
    }
}

/// Default settings file location for the current platform.
pub fn default_settings_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("settings.json"))
}
