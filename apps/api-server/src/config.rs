use ai::{
    blip::{BLIPModel, BLIPWeights, DEFAULT_MAX_TOKENS},
    clip::CLIPModel,
};
use anyhow::Context;
use std::{fmt::Display, net::SocketAddr, path::PathBuf, str::FromStr};

const DEFAULT_API_SERVER_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_CAPTION_DEMO_ADDR: &str = "0.0.0.0:7860";
const DEFAULT_RESOURCES_DIR: &str = "resources";
const DEFAULT_DOWNLOAD_URL: &str = "https://huggingface.co";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Which weights to load and where to find them.
#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub resources_dir: PathBuf,
    pub download_url: String,
    pub blip_model: BLIPModel,
    pub blip_weights: BLIPWeights,
    pub blip_max_tokens: usize,
    pub clip_model: CLIPModel,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_server_addr: SocketAddr,
    pub caption_demo_addr: SocketAddr,
    pub max_upload_bytes: usize,
    pub models: ModelConfig,
}

impl Config {
    /// Read the configuration from the process environment. Load `.env`
    /// beforehand if it should be taken into account.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let models = ModelConfig {
            resources_dir: var("LOCAL_RESOURCES_DIR")
                .unwrap_or_else(|| DEFAULT_RESOURCES_DIR.to_string())
                .into(),
            download_url: var("MODEL_DOWNLOAD_URL")
                .unwrap_or_else(|| DEFAULT_DOWNLOAD_URL.to_string()),
            blip_model: parse_or(var("BLIP_MODEL"), "BLIP_MODEL", BLIPModel::Base)?,
            blip_weights: parse_or(
                var("BLIP_WEIGHTS"),
                "BLIP_WEIGHTS",
                BLIPWeights::Safetensors,
            )?,
            blip_max_tokens: parse_or(var("BLIP_MAX_TOKENS"), "BLIP_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
            clip_model: parse_or(var("CLIP_MODEL"), "CLIP_MODEL", CLIPModel::ViTB32)?,
        };

        // fail here rather than on the first request
        models.blip_model.model_uri(&models.blip_weights)?;
        if models.blip_max_tokens < 2 {
            anyhow::bail!("BLIP_MAX_TOKENS must be at least 2");
        }

        Ok(Self {
            api_server_addr: parse_or(
                var("API_SERVER_ADDR"),
                "API_SERVER_ADDR",
                default_addr(DEFAULT_API_SERVER_ADDR),
            )?,
            caption_demo_addr: parse_or(
                var("CAPTION_DEMO_ADDR"),
                "CAPTION_DEMO_ADDR",
                default_addr(DEFAULT_CAPTION_DEMO_ADDR),
            )?,
            max_upload_bytes: parse_or(
                var("MAX_UPLOAD_BYTES"),
                "MAX_UPLOAD_BYTES",
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            models,
        })
    }
}

fn default_addr(addr: &str) -> SocketAddr {
    addr.parse().unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8000)))
}

fn parse_or<T>(value: Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match value {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid value {:?} for {}", value, name)),
        None => Ok(default),
    }
}
