/// Bridge configuration
/// Every recognized option with its default; validated once at load time.

use crate::error::{BridgeError, Result};
use crate::models::SurfaceSettings;
use crate::services::launch::BATCH_UNSAFE;
use crate::services::platform::{BuildChannel, ReleaseCatalog};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Business modules the F18 executable can start in
pub const KNOWN_MODULES: [&str; 8] = ["pos", "fin", "kalk", "fakt", "os", "ld", "epdv", "cmd"];

pub const DEFAULT_FONT_SIZE: u16 = 16;
pub const DEFAULT_WINDOWS_FONT_FAMILY: &str = "Consolas, 'Courier New', monospace";
pub const DEFAULT_LINUX_FONT_FAMILY: &str =
    "'Droid Sans Mono', 'monospace', monospace, 'Droid Sans Fallback'";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    #[serde(default)]
    pub ver_channel: BuildChannel,

    /// Module opened when the application starts; blank means none
    #[serde(default)]
    pub on_start: Option<String>,

    #[serde(default)]
    pub full_screen: bool,

    #[serde(default)]
    pub font_size: Option<u16>,

    #[serde(default)]
    pub font_family: Option<String>,

    #[serde(default = "default_organization")]
    pub organization: String,

    /// Root holding the per-platform binary directories (`linux`, `win32`, `mac`)
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,

    #[serde(default = "default_executable")]
    pub executable: String,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default = "ReleaseCatalog::builtin")]
    pub catalog: ReleaseCatalog,
}

fn default_organization() -> String {
    "proba_2018".to_string()
}

fn default_install_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_executable() -> String {
    "F18".to_string()
}

/// Connection flags handed to the F18 executable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_user() -> String {
    "postgres".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ver_channel: BuildChannel::default(),
            on_start: None,
            full_screen: false,
            font_size: None,
            font_family: None,
            organization: default_organization(),
            install_dir: default_install_dir(),
            executable: default_executable(),
            database: DatabaseConfig::default(),
            catalog: ReleaseCatalog::builtin(),
        }
    }
}

impl BridgeConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut config: BridgeConfig = serde_json::from_str(json)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("[Config] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    fn normalize(&mut self) {
        self.on_start = self
            .on_start
            .take()
            .map(|module| module.trim().to_string())
            .filter(|module| !module.is_empty());
        if self.font_family.as_deref().map(str::trim) == Some("") {
            self.font_family = None;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(size) = self.font_size {
            if !(6..=72).contains(&size) {
                return Err(BridgeError::Config(format!("fontSize {} is outside 6..=72", size)));
            }
        }
        if let Some(module) = &self.on_start {
            if !is_known_module(module) {
                return Err(BridgeError::Config(format!("unknown onStart module `{}`", module)));
            }
        }
        if !is_valid_executable(&self.executable) {
            return Err(BridgeError::Config(format!(
                "executable `{}` must be a plain file name",
                self.executable
            )));
        }
        if !is_valid_organization(&self.organization) {
            return Err(BridgeError::Config(format!(
                "organization `{}` is not a database name",
                self.organization
            )));
        }
        if self.database.host.trim().is_empty() {
            return Err(BridgeError::Config("database.host must not be empty".to_string()));
        }
        for (field, value) in [
            ("host", &self.database.host),
            ("user", &self.database.user),
            ("password", &self.database.password),
        ] {
            if !is_launchable_value(value) {
                return Err(BridgeError::Config(format!(
                    "database.{} contains characters the shell cannot pass",
                    field
                )));
            }
        }
        if self.database.port == 0 {
            return Err(BridgeError::Config("database.port must not be 0".to_string()));
        }
        if self.catalog.channel(self.ver_channel).is_none() {
            return Err(BridgeError::Config(format!(
                "channel {} is missing from the release catalog",
                self.ver_channel
            )));
        }
        Ok(())
    }

    pub fn effective_font_size(&self) -> u16 {
        self.font_size.unwrap_or(DEFAULT_FONT_SIZE)
    }

    pub fn effective_font_family(&self) -> String {
        match &self.font_family {
            Some(family) => family.clone(),
            None if cfg!(windows) => DEFAULT_WINDOWS_FONT_FAMILY.to_string(),
            None => DEFAULT_LINUX_FONT_FAMILY.to_string(),
        }
    }

    pub fn surface_settings(&self) -> SurfaceSettings {
        SurfaceSettings {
            ver_channel: self.ver_channel.to_string(),
            on_start: self.on_start.clone(),
            full_screen: self.full_screen,
        }
    }
}

pub fn is_known_module(module: &str) -> bool {
    KNOWN_MODULES.contains(&module)
}

/// PostgreSQL-style identifier: letter or `_` first, then letters, digits, `_`
pub fn is_valid_organization(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= 63
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_valid_executable(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-.".contains(c))
        && !name.starts_with('.')
}

/// Values typed into the panel shell: no line breaks, and nothing cmd.exe
/// would expand inside quotes
fn is_launchable_value(value: &str) -> bool {
    !value.chars().any(|c| c.is_control() || (cfg!(windows) && BATCH_UNSAFE.contains(&c)))
}
