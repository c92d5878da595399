//! Invocation settings for both subcommands.
//!
//! Every value is a flag with an environment fallback. Nothing secret lives
//! in source.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;

use crate::consts::{
    DEFAULT_CONF_THRESHOLD, DEFAULT_DETECTOR_MODEL, DEFAULT_GEMINI_BASE_URL, DEFAULT_HOST,
    DEFAULT_IMAGE, DEFAULT_INPUT_SIZE, DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_DETECTIONS,
    DEFAULT_MODEL, DEFAULT_PORT, DEFAULT_TARGET_CLASS,
};
use crate::detect::DetectorConfig;

/// Checked after `--api-key` / `GOOGLE_API_KEY`.
pub const FALLBACK_KEY_VAR: &str = "GEMINI_API_KEY";

/// Settings for `farmhand serve`.
#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Gemini API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Gemini model name
    #[arg(long, env = "FARMHAND_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Address to bind
    #[arg(long, env = "FARMHAND_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to bind
    #[arg(short, long, env = "FARMHAND_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Gemini API base URL
    #[arg(long, env = "GEMINI_API_BASE", default_value = DEFAULT_GEMINI_BASE_URL)]
    pub api_base: String,
}

impl ServeArgs {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("invalid bind host: {}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// The flag (or `GOOGLE_API_KEY`) wins, then `lookup(GEMINI_API_KEY)`.
    /// Empty values count as unset.
    pub fn resolve_api_key<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = self
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| lookup(FALLBACK_KEY_VAR).filter(|k| !k.trim().is_empty()));

        match key {
            Some(key) => Ok(key),
            None => bail!(
                "no Gemini API key found. Set GOOGLE_API_KEY (or {FALLBACK_KEY_VAR}) or pass --api-key."
            ),
        }
    }
}

/// Settings for `farmhand classify`.
#[derive(Debug, Clone, Args)]
pub struct ClassifyArgs {
    /// ONNX detection model
    #[arg(long, env = "FARMHAND_DETECTOR_MODEL", default_value = DEFAULT_DETECTOR_MODEL)]
    pub model: PathBuf,

    /// Image to classify
    #[arg(short, long, default_value = DEFAULT_IMAGE)]
    pub image: PathBuf,

    /// Class id whose presence yields 0
    #[arg(short, long, default_value_t = DEFAULT_TARGET_CLASS)]
    pub target_class: u32,

    /// Minimum class score to keep a box
    #[arg(long, default_value_t = DEFAULT_CONF_THRESHOLD)]
    pub conf: f32,

    /// IoU above which overlapping boxes are suppressed
    #[arg(long, default_value_t = DEFAULT_IOU_THRESHOLD)]
    pub iou: f32,

    /// Suppress overlaps across classes
    #[arg(long, default_value_t = false)]
    pub agnostic_nms: bool,

    /// Maximum detections per image
    #[arg(long, default_value_t = DEFAULT_MAX_DETECTIONS)]
    pub max_det: usize,

    /// Model input side in pixels
    #[arg(long, default_value_t = DEFAULT_INPUT_SIZE)]
    pub input_size: u32,
}

impl ClassifyArgs {
    pub fn detector_config(&self) -> Result<DetectorConfig> {
        if !(0.0..=1.0).contains(&self.conf) {
            bail!("--conf must be within 0..=1, got {}", self.conf);
        }
        if !(0.0..=1.0).contains(&self.iou) {
            bail!("--iou must be within 0..=1, got {}", self.iou);
        }
        if self.input_size == 0 || self.input_size % 32 != 0 {
            bail!("--input-size must be a positive multiple of 32, got {}", self.input_size);
        }
        Ok(DetectorConfig {
            conf_threshold: self.conf,
            iou_threshold: self.iou,
            agnostic_nms: self.agnostic_nms,
            max_detections: self.max_det,
            input_size: self.input_size,
        })
    }
}
