use crate::{utils, BatchResults, ImageCaptionInput, ImageCaptionOutput, Model};
use anyhow::{anyhow, bail, Context};
use candle_core::{DType, Device, Module, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::blip::VisionConfig;
use candle_transformers::models::quantized_blip;
use candle_transformers::models::{blip, blip_text};
use image::RgbImage;
use std::path::{Path, PathBuf};
use strum_macros::{AsRefStr, EnumString};
use tokenizers::Tokenizer;
use tracing::debug;

const IMAGE_SIZE: u32 = 384;
const BOS_TOKEN_ID: u32 = 30522;
const SEP_TOKEN_ID: u32 = 102;
/// Generation length used by the reference checkpoints, start token included.
pub const DEFAULT_MAX_TOKENS: usize = 20;

fn blip_base_config() -> blip::Config {
    let text_config = blip_text::Config {
        vocab_size: 30524,
        hidden_size: 768,
        encoder_hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 768,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        max_position_embeddings: 512,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-12,
        is_decoder: true,
    };
    let vision_config = VisionConfig {
        hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 512,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        image_size: IMAGE_SIZE as usize,
        patch_size: 16,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-5,
    };

    blip::Config {
        text_config,
        vision_config,
        projection_dim: 512,
        image_text_hidden_size: 256,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum BLIPModel {
    Base,
    Large,
}

#[derive(Clone, Debug, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum BLIPWeights {
    Safetensors,
    Gguf,
}

impl BLIPModel {
    fn config(&self) -> blip::Config {
        match self {
            BLIPModel::Base => blip_base_config(),
            BLIPModel::Large => blip::Config::image_captioning_large(),
        }
    }

    /// Weights and tokenizer locations relative to the resources dir.
    pub fn model_uri(&self, weights: &BLIPWeights) -> anyhow::Result<(PathBuf, PathBuf)> {
        let repo = match self {
            BLIPModel::Base => "Salesforce/blip-image-captioning-base/resolve/main",
            BLIPModel::Large => "Salesforce/blip-image-captioning-large/resolve/main",
        };
        let tokenizer = Path::new(repo).join("tokenizer.json");

        let weights = match (self, weights) {
            (_, BLIPWeights::Safetensors) => Path::new(repo).join("model.safetensors"),
            (BLIPModel::Large, BLIPWeights::Gguf) => {
                PathBuf::from("lmz/candle-blip/resolve/main/blip-image-captioning-large-q4k.gguf")
            }
            (BLIPModel::Base, BLIPWeights::Gguf) => {
                bail!("no quantized weights are published for BLIP base")
            }
        };

        Ok((weights, tokenizer))
    }
}

enum CaptionModel {
    Full(blip::BlipForConditionalGeneration),
    Quantized(quantized_blip::BlipForConditionalGeneration),
}

impl CaptionModel {
    fn image_embeds(&self, image: &Tensor) -> candle_core::Result<Tensor> {
        let image = image.unsqueeze(0)?;
        match self {
            CaptionModel::Full(model) => model.vision_model().forward(&image),
            CaptionModel::Quantized(model) => model.vision_model().forward(&image),
        }
    }

    fn decode_step(&mut self, input_ids: &Tensor, image_embeds: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            CaptionModel::Full(model) => model.text_decoder().forward(input_ids, image_embeds),
            CaptionModel::Quantized(model) => model.text_decoder().forward(input_ids, image_embeds),
        }
    }

    fn reset_kv_cache(&mut self) {
        match self {
            CaptionModel::Full(model) => model.text_decoder().reset_kv_cache(),
            CaptionModel::Quantized(model) => model.text_decoder().reset_kv_cache(),
        }
    }
}

pub struct BLIP {
    tokenizer: Tokenizer,
    model: CaptionModel,
    logits_processor: LogitsProcessor,
    device: Device,
    max_tokens: usize,
}

impl Model for BLIP {
    type Item = ImageCaptionInput;
    type Output = ImageCaptionOutput;

    fn batch_size_limit(&self) -> usize {
        1
    }

    async fn process(&mut self, items: Vec<Self::Item>) -> BatchResults<Self::Output> {
        if items.len() > self.batch_size_limit() {
            bail!("too many items");
        }

        let mut results = vec![];

        for item in items {
            let res = self.get_caption(&item);
            results.push(res);
        }

        Ok(results)
    }
}

impl BLIP {
    /// Resolve the artifacts of `model_type` under `resources_dir`, downloading
    /// the missing ones from `download_url`, and load them.
    pub async fn new(
        resources_dir: impl AsRef<Path>,
        download_url: impl Into<String>,
        model_type: BLIPModel,
        weights: BLIPWeights,
        max_tokens: usize,
    ) -> anyhow::Result<Self> {
        let (model_uri, tokenizer_uri) = model_type.model_uri(&weights)?;

        let download = file_downloader::FileDownload::new(file_downloader::FileDownloadConfig {
            url: download_url.into(),
            resources_dir: resources_dir.as_ref().to_path_buf(),
        });
        let model_path = download.download_if_not_exists(&model_uri).await?;
        let tokenizer_path = download.download_if_not_exists(&tokenizer_uri).await?;

        Self::from_file(model_path, tokenizer_path, model_type, weights, max_tokens)
    }

    pub fn from_file(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        model_type: BLIPModel,
        weights: BLIPWeights,
        max_tokens: usize,
    ) -> anyhow::Result<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow!("failed to initialize tokenizer: {}", e))?;

        // no temperature means argmax sampling, so captions are deterministic
        let logits_processor = LogitsProcessor::new(1337, None, None);

        let config = model_type.config();
        let device = utils::device()?;

        let model = match weights {
            BLIPWeights::Safetensors => {
                let buffer = std::fs::read(model_path.as_ref()).with_context(|| {
                    format!("failed to read {}", model_path.as_ref().display())
                })?;
                let vb =
                    candle_nn::VarBuilder::from_buffered_safetensors(buffer, DType::F32, &device)?;
                CaptionModel::Full(blip::BlipForConditionalGeneration::new(&config, vb)?)
            }
            BLIPWeights::Gguf => {
                let vb = quantized_blip::VarBuilder::from_gguf(model_path, &device)?;
                CaptionModel::Quantized(quantized_blip::BlipForConditionalGeneration::new(
                    &config, vb,
                )?)
            }
        };

        Ok(Self {
            tokenizer,
            model,
            logits_processor,
            device,
            max_tokens: max_tokens.max(2),
        })
    }

    fn get_caption(&mut self, image: &RgbImage) -> anyhow::Result<String> {
        debug!(
            "generating caption for image: {}x{}",
            image.width(),
            image.height()
        );
        let image = load_image(image)?.to_device(&self.device)?;
        let image_embeds = self.model.image_embeds(&image)?;

        let mut token_ids = vec![BOS_TOKEN_ID];

        // we need this to make multi time generation work
        self.model.reset_kv_cache();

        for index in 0..self.max_tokens - 1 {
            let context_size = if index > 0 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);
            let input_ids = Tensor::new(&token_ids[start_pos..], &self.device)?.unsqueeze(0)?;
            let logits = self.model.decode_step(&input_ids, &image_embeds)?;
            let logits = logits.squeeze(0)?;
            let logits = logits.get(logits.dim(0)? - 1)?;
            let token = self.logits_processor.sample(&logits)?;
            if token == SEP_TOKEN_ID {
                break;
            }
            token_ids.push(token);
        }

        self.tokenizer
            .decode(&token_ids, true)
            .map(|caption| caption.trim().to_string())
            .map_err(|e| anyhow!("failed to decode caption: {}", e))
    }
}

/// Resize to 384x384 and normalize into a CHW float tensor on the CPU.
pub fn load_image(image: &RgbImage) -> candle_core::Result<Tensor> {
    let img = image::imageops::resize(
        image,
        IMAGE_SIZE,
        IMAGE_SIZE,
        image::imageops::FilterType::CatmullRom,
    );
    let data = img.into_raw();
    let size = IMAGE_SIZE as usize;
    let data = Tensor::from_vec(data, (size, size, 3), &Device::Cpu)?.permute((2, 0, 1))?;
    let mean = Tensor::new(&[0.48145466f32, 0.4578275, 0.40821073], &Device::Cpu)?
        .reshape((3, 1, 1))?;
    let std = Tensor::new(&[0.26862954f32, 0.261_302_6, 0.275_777_1], &Device::Cpu)?
        .reshape((3, 1, 1))?;
    (data.to_dtype(DType::F32)? / 255.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_load_image() {
        let image = RgbImage::from_pixel(50, 80, image::Rgb([255, 255, 255]));
        let tensor = load_image(&image).unwrap();
        assert_eq!(tensor.dims(), &[3, 384, 384]);

        let values = tensor.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let expected_r = (1.0 - 0.48145466) / 0.26862954;
        assert!((values[0] - expected_r).abs() < 1e-3);
    }

    #[test]
    fn test_model_uri() {
        let (weights, tokenizer) = BLIPModel::Base
            .model_uri(&BLIPWeights::Safetensors)
            .unwrap();
        assert!(weights.ends_with("model.safetensors"));
        assert!(tokenizer.ends_with("tokenizer.json"));

        assert!(BLIPModel::Large.model_uri(&BLIPWeights::Gguf).is_ok());
        assert!(BLIPModel::Base.model_uri(&BLIPWeights::Gguf).is_err());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(BLIPModel::from_str("large").unwrap(), BLIPModel::Large);
        assert_eq!(BLIPWeights::from_str("gguf").unwrap(), BLIPWeights::Gguf);
        assert!(BLIPModel::from_str("huge").is_err());
    }

    /// Needs the weights under `LOCAL_RESOURCES_DIR`, run with `--ignored`.
    #[test_log::test(tokio::test)]
    #[ignore]
    async fn test_caption_is_stable() {
        let resources_dir =
            std::env::var("LOCAL_RESOURCES_DIR").unwrap_or_else(|_| "resources".into());
        let mut blip = BLIP::new(
            resources_dir,
            "https://huggingface.co",
            BLIPModel::Base,
            BLIPWeights::Safetensors,
            DEFAULT_MAX_TOKENS,
        )
        .await
        .unwrap();

        let image = RgbImage::from_fn(300, 200, |x, _| {
            if x < 150 {
                image::Rgb([200, 30, 30])
            } else {
                image::Rgb([30, 30, 200])
            }
        });
        let first = blip.get_caption(&image).unwrap();
        let second = blip.get_caption(&image).unwrap();
        tracing::debug!("caption: {}", first);

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }
}
