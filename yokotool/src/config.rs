//! Configuration files.
//!
//! Both `/etc/yokotool.toml` and `$HOME/.yokotool.toml` hold named sections, values of the user
//! file override the global one and command line options override both:
//!
//! ```toml
//! [default]
//! devnode = "/dev/usbtmc0"
//! pmtype = "wt310"
//!
//! [lab]
//! devnode = "/dev/ttyUSB0"
//! baudrate = 9600
//! ```

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// System wide configuration file.
pub const GLOBAL_CONFIG: &str = "/etc/yokotool.toml";

/// Per user configuration file, relative to the home directory.
pub const USER_CONFIG: &str = ".yokotool.toml";

/// Section used when no device is specified.
pub const DEFAULT_SECTION: &str = "default";

/// Errors while loading the configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A configuration file exists but can not be read.
    #[error("failed to read '{path}': {source}")]
    Read {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// A configuration file is not valid.
    #[error("failed to parse '{path}': {source}")]
    Parse {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: toml::de::Error,
    },
    /// The named section is in none of the files.
    #[error("no power meter configured for '{0}'")]
    UnknownSection(String),
}

/// Settings of one power meter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Device node, e.g. `/dev/usbtmc0`.
    pub devnode: Option<PathBuf>,
    /// Serial baud rate.
    pub baudrate: Option<u32>,
    /// Power meter type.
    pub pmtype: Option<String>,
}

impl DeviceConfig {
    /// Take every value that is set in `other`.
    pub fn merge(&mut self, other: DeviceConfig) {
        if other.devnode.is_some() {
            self.devnode = other.devnode;
        }
        if other.baudrate.is_some() {
            self.baudrate = other.baudrate;
        }
        if other.pmtype.is_some() {
            self.pmtype = other.pmtype;
        }
    }
}

/// What the device argument of the command line names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevSpec {
    /// A device node.
    Node(PathBuf),
    /// A configuration section.
    Section(String),
}

impl DevSpec {
    /// A value containing `/` or naming an existing path is a device node.
    pub fn parse(raw: &str) -> Self {
        if raw.contains('/') || Path::new(raw).exists() {
            DevSpec::Node(PathBuf::from(raw))
        } else {
            DevSpec::Section(raw.to_string())
        }
    }
}

/// The configuration files in the order they are applied.
pub fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(GLOBAL_CONFIG)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(USER_CONFIG));
    }
    paths
}

/// Read and merge the sections of all files that exist.
pub fn load_sections(paths: &[PathBuf]) -> Result<BTreeMap<String, DeviceConfig>, ConfigError> {
    let mut sections: BTreeMap<String, DeviceConfig> = BTreeMap::new();
    for path in paths {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source,
                });
            }
        };
        let file: BTreeMap<String, DeviceConfig> =
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), sections = file.len(), "configuration loaded");
        for (name, config) in file {
            sections.entry(name).or_default().merge(config);
        }
    }
    Ok(sections)
}

/// Work out the settings for one run.
///
/// A section named by `devspec` must exist. A device node given by `devspec` replaces the one
/// of the default section. `overrides` are applied last.
pub fn resolve(
    devspec: Option<&DevSpec>,
    overrides: DeviceConfig,
    paths: &[PathBuf],
) -> Result<DeviceConfig, ConfigError> {
    let mut sections = load_sections(paths)?;
    let mut config = match devspec {
        Some(DevSpec::Section(name)) => sections
            .remove(name)
            .ok_or_else(|| ConfigError::UnknownSection(name.clone()))?,
        Some(DevSpec::Node(path)) => {
            let mut config = sections.remove(DEFAULT_SECTION).unwrap_or_default();
            config.devnode = Some(path.clone());
            config
        }
        None => sections.remove(DEFAULT_SECTION).unwrap_or_default(),
    };
    config.merge(overrides);
    Ok(config)
}
