// src/recap.rs

//! Recap parsing: turn the tool's end-of-run summary into per-node verdicts.
//!
//! The wrapped tool ends its output with a block like:
//!
//! ```text
//! PLAY RECAP *********************************************************************
//! node1                      : ok=12   changed=3    unreachable=0    failed=0    skipped=4    rescued=0    ignored=0
//! node2                      : ok=11   changed=3    unreachable=0    failed=1    skipped=4    rescued=0    ignored=0
//!
//! ```
//!
//! The block starts on the line after the last banner and ends at the first
//! blank line (or end of input).

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::RecapError;
use crate::types::NodeStatus;

pub const DEFAULT_RECAP_BANNER: &str =
    "PLAY RECAP *********************************************************************";

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("ANSI escape regex is valid"));

/// Aggregate verdict plus the node records it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecapSummary {
    pub success: bool,
    pub nodes: Vec<NodeStatus>,
}

#[derive(Debug, Clone)]
pub struct RecapParser {
    banner: String,
    strip_ansi: bool,
}

impl Default for RecapParser {
    fn default() -> Self {
        Self::new(DEFAULT_RECAP_BANNER)
    }
}

impl RecapParser {
    pub fn new(banner: impl Into<String>) -> Self {
        Self {
            banner: banner.into(),
            strip_ansi: true,
        }
    }

    /// Whether colour escape sequences are removed before searching.
    pub fn with_strip_ansi(mut self, strip_ansi: bool) -> Self {
        self.strip_ansi = strip_ansi;
        self
    }

    pub fn banner(&self) -> &str {
        &self.banner
    }

    /// Parse the recap at the end of `raw`.
    ///
    /// Never reports success by default: a missing banner, an empty block or
    /// a line without a node name is an error.
    pub fn parse(&self, raw: &str) -> Result<RecapSummary, RecapError> {
        let text = if self.strip_ansi {
            ANSI_ESCAPE.replace_all(raw, "").replace("\r\n", "\n")
        } else {
            raw.replace("\r\n", "\n")
        };

        let start = text.rfind(&self.banner).ok_or(RecapError::BannerMissing)?;
        let after_banner = &text[start + self.banner.len()..];

        // Skip whatever else is on the banner line (wider banners, trailing stars).
        let body = match after_banner.split_once('\n') {
            Some((_, rest)) => rest,
            None => "",
        };
        let block = match body.find("\n\n") {
            Some(end) => &body[..end],
            None => body,
        };

        let nodes = block
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(parse_recap_line)
            .collect::<Result<Vec<_>, _>>()?;

        if nodes.is_empty() {
            return Err(RecapError::EmptyRecap);
        }

        let success = nodes.iter().all(NodeStatus::is_healthy);
        Ok(RecapSummary { success, nodes })
    }
}

/// Parse one `node : key=value ...` line.
///
/// Unknown keys and tokens without `=` are ignored; keys that never appear
/// stay empty.
pub fn parse_recap_line(line: &str) -> Result<NodeStatus, RecapError> {
    let malformed = || RecapError::MalformedLine(line.to_string());

    let (node, tail) = line.split_once(':').ok_or_else(malformed)?;
    let node = node.trim();
    if node.is_empty() {
        return Err(malformed());
    }

    let mut status = NodeStatus {
        node: node.to_string(),
        ..NodeStatus::default()
    };

    for token in tail.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let slot = match key {
            "ok" => &mut status.ok,
            "changed" => &mut status.changed,
            "unreachable" => &mut status.unreachable,
            "failed" => &mut status.failed,
            "skipped" => &mut status.skipped,
            "rescued" => &mut status.rescued,
            "ignored" => &mut status.ignored,
            _ => continue,
        };
        *slot = value.to_string();
    }

    Ok(status)
}
