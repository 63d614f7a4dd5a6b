use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ChannelLayout, ConversionParams, Ilda2WavError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "ilda2.json";
pub const DEFAULT_FPS: i64 = 15;
pub const DEFAULT_PPS: i64 = 20_000;
pub const DEFAULT_ORDER: &str = "Y|-1X|B|C";
pub const DEFAULT_TIME: &str = "*";

/// Top-level batch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(rename = "target-dir")]
    pub target_dir: PathBuf,
    #[serde(rename = "gen-list", default)]
    pub gen_list: bool,
    /// Values inherited by every entry of `files` that leaves them unset.
    #[serde(rename = "def-opts", default)]
    pub defaults: FileOptions,
    #[serde(rename = "convert", default)]
    pub files: Vec<FileOptions>,
}

/// Per-file options as written in the configuration. Rates below 1 and empty
/// strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileOptions {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pps: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// Fully resolved conversion job for one input file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileJob {
    pub input: PathBuf,
    pub fps: u32,
    pub pps: u32,
    /// Descriptor string as configured; it feeds the output file name.
    pub order: String,
    /// Playlist duration field, passed through verbatim.
    pub time: String,
    pub params: ConversionParams,
}

impl BatchConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            Ilda2WavError::config(format!("unable to read `{}`: {err}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| Ilda2WavError::config(err.to_string()))
    }

    /// Applies the built-in defaults under `def-opts`, validates them and
    /// expands them onto every file entry.
    pub fn resolve(&self) -> Result<Vec<FileJob>> {
        let fps = self.defaults.fps.unwrap_or(DEFAULT_FPS);
        if fps < 1 {
            return Err(Ilda2WavError::config(format!(
                "wrong value of default option fps: {fps}"
            )));
        }
        let pps = self.defaults.pps.unwrap_or(DEFAULT_PPS);
        if pps < 1 {
            return Err(Ilda2WavError::config(format!(
                "wrong value of default option pps: {pps}"
            )));
        }
        let order = self
            .defaults
            .order
            .clone()
            .unwrap_or_else(|| DEFAULT_ORDER.to_string());
        ChannelLayout::parse(&order)?;
        let time = self
            .defaults
            .time
            .clone()
            .unwrap_or_else(|| DEFAULT_TIME.to_string());

        self.files
            .iter()
            .map(|file| -> Result<FileJob> {
                std::fs::metadata(&file.name).map_err(|err| {
                    Ilda2WavError::config(format!("input `{}`: {err}", file.name))
                })?;

                let fps = to_rate("fps", inherit(file.fps, fps))?;
                let pps = to_rate("pps", inherit(file.pps, pps))?;
                let order = inherit_str(file.order.as_deref(), &order);
                let params = ConversionParams::new(fps, pps, ChannelLayout::parse(&order)?)?;

                Ok(FileJob {
                    input: PathBuf::from(&file.name),
                    fps,
                    pps,
                    order,
                    time: inherit_str(file.time.as_deref(), &time),
                    params,
                })
            })
            .collect()
    }
}

fn inherit(value: Option<i64>, default: i64) -> i64 {
    value.filter(|v| *v >= 1).unwrap_or(default)
}

fn inherit_str(value: Option<&str>, default: &str) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or(default).to_string()
}

fn to_rate(field: &str, value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Ilda2WavError::config(format!("{field} value {value} is out of range")))
}
