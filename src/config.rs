use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub renderer: RendererConfig,
    pub image_cache: ImageCacheConfig,
    pub compiler: CompilerConfig,
    pub resolution: ResolutionConfig,
}

impl Config {
    pub fn from_yaml(src: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(src)
    }
}

#[serde_as]
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RendererConfig {
    pub typst_bin: PathBuf,
    pub font_paths: Vec<PathBuf>,
    /// Simultaneous typst processes; `0` removes the limit.
    pub max_concurrent: usize,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "acquire_timeout_ms")]
    pub acquire_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "compile_timeout_secs")]
    pub compile_timeout: Duration,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            typst_bin: PathBuf::from("typst"),
            font_paths: Vec::new(),
            max_concurrent: num_cpus::get(),
            acquire_timeout: Duration::from_secs(5),
            compile_timeout: Duration::from_secs(30),
        }
    }
}

#[serde_as]
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ImageCacheConfig {
    pub dir: PathBuf,
    /// Base of relative local image paths in documents.
    pub assets_dir: PathBuf,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "max_age_secs")]
    pub max_age: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "sweep_interval_secs")]
    pub sweep_interval: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "download_timeout_secs")]
    pub download_timeout: Duration,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("docrender-images"),
            assets_dir: PathBuf::from("."),
            max_age: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60 * 60),
            download_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CompilerConfig {
    /// Typst colour expression used when a highlight mark has no colour.
    pub highlight_color: String,
    /// Width of the printable area in px, used to distribute missing column widths.
    pub content_width: Option<f64>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            highlight_color: "yellow".to_owned(),
            content_width: None,
        }
    }
}

#[serde_as]
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ResolutionConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "default_timeout_ms")]
    pub default_timeout: Duration,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(5),
        }
    }
}
