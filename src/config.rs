use std::fs;
use std::sync::LazyLock;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::NameResolution;
use crate::error::SortlyError;
use crate::fetch::DEFAULT_TIMEOUT;
use crate::naming::NamingScheme;

pub const CONFIG_FILE_NAME: &str = "config.cfg";
pub const DEFAULT_PORT: u16 = 8080;

static PORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9][0-9]{1,4}$").expect("port pattern is valid"));

/// On-disk shape of `config.cfg`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub root_folder: String,
    #[serde(default)]
    pub root_links: String,
}

/// Values given on the command line; they win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<String>,
    pub root_folder: Option<String>,
    pub root_links: Option<String>,
    pub file_path: Option<String>,
    pub save_config: bool,
    pub naming: Option<NamingScheme>,
    pub resolution: Option<NameResolution>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub port: u16,
    pub root_folder: Utf8PathBuf,
    /// Prefix of every public link; empty or `/`-terminated.
    pub root_links: String,
    pub file_path: Option<Utf8PathBuf>,
    pub save_config: bool,
    pub naming: NamingScheme,
    pub resolution: NameResolution,
    pub request_timeout: Duration,
}

impl ParserConfig {
    pub fn new(root_folder: impl Into<Utf8PathBuf>, root_links: &str) -> Self {
        Self {
            port: DEFAULT_PORT,
            root_folder: root_folder.into(),
            root_links: normalize_links(root_links),
            file_path: None,
            save_config: false,
            naming: NamingScheme::default(),
            resolution: NameResolution::default(),
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_file(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn excel_dir(&self) -> Utf8PathBuf {
        self.root_folder.join("excel")
    }

    pub fn staging_dir(&self) -> Utf8PathBuf {
        self.root_folder.join("temp-files")
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// `Ok(None)` when the file does not exist.
    pub fn read(path: &Utf8Path) -> Result<Option<ConfigFile>, SortlyError> {
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| SortlyError::ConfigRead(path.as_std_path().to_path_buf()))?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|err| SortlyError::ConfigParse(err.to_string()))?;
        Self::validate_file(&file)?;
        Ok(Some(file))
    }

    pub fn validate_file(file: &ConfigFile) -> Result<(), SortlyError> {
        if file.port.is_empty() {
            return Err(SortlyError::InvalidConfig("config port is empty".to_string()));
        }
        if file.root_folder.is_empty() {
            return Err(SortlyError::InvalidConfig("root folder is empty".to_string()));
        }
        Ok(())
    }

    pub fn resolve(
        file: Option<ConfigFile>,
        overrides: ConfigOverrides,
    ) -> Result<ParserConfig, SortlyError> {
        let file = file.unwrap_or_default();

        let port = match overrides.port.as_deref().or(non_empty(&file.port)) {
            Some(value) => parse_port(value)?,
            None => DEFAULT_PORT,
        };

        let root_folder = normalize_root_folder(
            overrides
                .root_folder
                .as_deref()
                .or(non_empty(&file.root_folder))
                .unwrap_or("."),
        );
        if !root_folder.as_std_path().is_dir() {
            return Err(SortlyError::InvalidConfig(format!(
                "root folder {root_folder} does not exist"
            )));
        }

        let root_links = normalize_links(
            overrides
                .root_links
                .as_deref()
                .or(non_empty(&file.root_links))
                .unwrap_or_default(),
        );

        let file_path = match overrides.file_path.as_deref() {
            Some(value) if !value.is_empty() => {
                let path = Utf8PathBuf::from(value.replace('\\', "/"));
                if !path.as_std_path().is_file() {
                    return Err(SortlyError::InvalidConfig(format!(
                        "input file {path} does not exist"
                    )));
                }
                Some(path)
            }
            _ => None,
        };

        Ok(ParserConfig {
            port,
            root_folder,
            root_links,
            file_path,
            save_config: overrides.save_config,
            naming: overrides.naming.unwrap_or_default(),
            resolution: overrides.resolution.unwrap_or_default(),
            request_timeout: overrides
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        })
    }

    pub fn write(path: &Utf8Path, config: &ParserConfig) -> Result<(), SortlyError> {
        let file = ConfigFile {
            port: config.port.to_string(),
            root_folder: config.root_folder.to_string(),
            root_links: config.root_links.clone(),
        };
        let content = serde_json::to_vec_pretty(&file)
            .map_err(|err| SortlyError::Filesystem(err.to_string()))?;
        let tmp_path = path.with_extension("cfg.tmp");
        fs::write(tmp_path.as_std_path(), &content)
            .map_err(|err| SortlyError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| SortlyError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

pub fn parse_port(value: &str) -> Result<u16, SortlyError> {
    let value = value.trim();
    if !PORT_RE.is_match(value) {
        return Err(SortlyError::InvalidPort(value.to_string()));
    }
    value
        .parse::<u16>()
        .map_err(|_| SortlyError::InvalidPort(value.to_string()))
}

/// Windows separators become `/`; the result always ends with `/`.
pub fn normalize_root_folder(value: &str) -> Utf8PathBuf {
    let mut normalized = value.replace('\\', "/");
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Utf8PathBuf::from(normalized)
}

pub fn normalize_links(value: &str) -> String {
    let mut normalized = value.trim().to_string();
    if !normalized.is_empty() && !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}
