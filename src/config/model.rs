// src/config/model.rs

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ledger::DEFAULT_LEDGER_FILE;
use crate::recap::{DEFAULT_RECAP_BANNER, RecapParser};

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [paths]
/// data_dir = "/var/lib/cluster-exec"
/// lock_dir = "/run/cluster-exec"
///
/// [recap]
/// strip_ansi = true
///
/// [ledger]
/// enabled = true
/// file_name = "success_tasks.jsonl"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub recap: RecapSection,

    #[serde(default)]
    pub ledger: LedgerSection,
}

/// `[paths]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    /// Root of per-cluster state: `<data_dir>/<cluster>/history/...`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Where `<cluster>.lock` files live. Defaults to `data_dir`.
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            lock_dir: None,
        }
    }
}

/// `[recap]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RecapSection {
    /// Literal line that starts the tool's summary block.
    #[serde(default = "default_banner")]
    pub banner: String,

    /// Remove terminal colour codes before looking for the banner.
    #[serde(default = "default_true")]
    pub strip_ansi: bool,
}

fn default_banner() -> String {
    DEFAULT_RECAP_BANNER.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for RecapSection {
    fn default() -> Self {
        Self {
            banner: default_banner(),
            strip_ansi: true,
        }
    }
}

/// `[ledger]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// File name under `<data_dir>/<cluster>/`.
    #[serde(default = "default_ledger_file")]
    pub file_name: String,
}

fn default_ledger_file() -> String {
    DEFAULT_LEDGER_FILE.to_string()
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            file_name: default_ledger_file(),
        }
    }
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub paths: PathsSection,
    pub recap: RecapSection,
    pub ledger: LedgerSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        paths: PathsSection,
        recap: RecapSection,
        ledger: LedgerSection,
    ) -> Self {
        Self {
            paths,
            recap,
            ledger,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.paths.data_dir
    }

    pub fn lock_dir(&self) -> &Path {
        self.paths
            .lock_dir
            .as_deref()
            .unwrap_or(&self.paths.data_dir)
    }

    pub fn recap_parser(&self) -> RecapParser {
        RecapParser::new(self.recap.banner.clone()).with_strip_ansi(self.recap.strip_ansi)
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        let raw = RawConfigFile::default();
        Self::new_unchecked(raw.paths, raw.recap, raw.ledger)
    }
}
