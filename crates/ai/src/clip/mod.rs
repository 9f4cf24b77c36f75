use crate::{
    ort::load_onnx_model, utils, BatchResults, Model, MultiModalEmbeddingInput,
    MultiModalEmbeddingOutput,
};
use anyhow::anyhow;
use image::RgbImage;
use ndarray::{Array1, Axis};
use ort::Session;
use std::path::Path;
use tokenizers::tokenizer::Tokenizer;
use tracing::debug;

pub use model::*;

pub mod model;
pub mod preprocess;

/// Dual-encoder CLIP over ONNX. Both encoders output L2-normalized vectors of
/// the same dimension, so image and text embeddings are directly comparable.
pub struct CLIP {
    image_model: Session,
    text_model: Session,
    text_tokenizer: Tokenizer,
    artifacts: CLIPArtifacts,
    // some text exports only declare `input_ids`
    text_takes_attention_mask: bool,
    context_length: usize,
    dim: usize,
}

type CLIPEmbedding = Array1<f32>;

impl Model for CLIP {
    type Item = MultiModalEmbeddingInput;
    type Output = MultiModalEmbeddingOutput;

    fn batch_size_limit(&self) -> usize {
        // one image and its caption
        2
    }

    async fn process(&mut self, items: Vec<Self::Item>) -> BatchResults<Self::Output> {
        if items.len() > self.batch_size_limit() {
            anyhow::bail!("too many items");
        }

        let results = items
            .into_iter()
            .map(|item| {
                let embedding = match item {
                    MultiModalEmbeddingInput::Image(image) => {
                        self.get_image_embedding_from_image(&image)
                    }
                    MultiModalEmbeddingInput::Text(text) => self.get_text_embedding(&text),
                };
                embedding.map(|v| v.to_vec())
            })
            .collect();

        Ok(results)
    }
}

impl CLIP {
    /// Resolve the artifacts of `model` under `resources_dir`, downloading the
    /// missing ones from `download_url`, and load them.
    pub async fn new(
        model: CLIPModel,
        resources_dir: impl AsRef<Path>,
        download_url: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let artifacts = model.artifacts();

        let download = file_downloader::FileDownload::new(file_downloader::FileDownloadConfig {
            url: download_url.into(),
            resources_dir: resources_dir.as_ref().to_path_buf(),
        });

        let image_model_path = download
            .download_if_not_exists(&artifacts.image_model)
            .await?;
        let text_model_path = download
            .download_if_not_exists(&artifacts.text_model)
            .await?;
        let text_tokenizer_path = download.download_if_not_exists(&artifacts.tokenizer).await?;

        Self::from_file(
            image_model_path,
            text_model_path,
            text_tokenizer_path,
            &model,
        )
    }

    pub fn from_file(
        image_model_path: impl AsRef<Path>,
        text_model_path: impl AsRef<Path>,
        text_tokenizer_path: impl AsRef<Path>,
        model: &CLIPModel,
    ) -> anyhow::Result<Self> {
        let image_model = load_onnx_model(image_model_path, None)?;
        let text_model = load_onnx_model(text_model_path, None)?;
        let artifacts = model.artifacts();
        let text_takes_attention_mask = declares_input(
            text_model.inputs.iter().map(|input| input.name.as_str()),
            artifacts.text_attention_mask,
        );
        debug!(
            "text model inputs: {:?}",
            text_model.inputs.iter().map(|input| &input.name).collect::<Vec<_>>()
        );

        let context_length = model.context_length();
        let mut text_tokenizer = Tokenizer::from_file(text_tokenizer_path)
            .map_err(|e| anyhow!("failed to initialize tokenizer: {}", e))?;
        let truncation = tokenizers::utils::truncation::TruncationParams {
            // default CLIP text truncation
            max_length: context_length,
            ..Default::default()
        };
        text_tokenizer
            .with_truncation(Some(truncation))
            .map_err(|e| anyhow!("failed to set truncation: {}", e))?;

        Ok(Self {
            image_model,
            text_model,
            text_tokenizer,
            artifacts,
            text_takes_attention_mask,
            context_length,
            dim: model.dim(),
        })
    }

    pub fn get_image_embedding_from_image(&self, image: &RgbImage) -> anyhow::Result<CLIPEmbedding> {
        debug!("image embedding for {}x{}", image.width(), image.height());
        let image = preprocess::preprocess_rgb8_image(image)?;

        // add axis to reshape to (1, C, H, W)
        let image = image.insert_axis(Axis(0));
        let outputs = self
            .image_model
            .run(ort::inputs![self.artifacts.image_input => image.view()]?)?;

        let output = outputs
            .get(self.artifacts.image_output)
            .ok_or(anyhow!("output {} not found", self.artifacts.image_output))?
            .try_extract_tensor::<f32>()?
            .to_owned();

        let output: CLIPEmbedding = output.into_shape(self.dim)?;

        Ok(utils::normalize(output))
    }

    pub fn get_text_embedding(&self, text: &str) -> anyhow::Result<CLIPEmbedding> {
        let encoding = self
            .text_tokenizer
            .encode(text, true)
            .map_err(|err| anyhow!(err))?;

        let ids = Array1::from_iter(encoding.get_ids().iter().map(|&x| x as i64));
        let attention_mask =
            Array1::from_iter(encoding.get_attention_mask().iter().map(|&x| x as i64));
        debug!("text embedding for {} tokens", ids.len());

        // the text encoder is causal, trailing padding does not change the pooled token
        let ids = utils::pad_with_zeros(&ids, self.context_length);
        let attention_mask = utils::pad_with_zeros(&attention_mask, self.context_length);
        // add axis
        let ids = ids.insert_axis(Axis(0));
        let attention_mask = attention_mask.insert_axis(Axis(0));

        let inputs = if self.text_takes_attention_mask {
            ort::inputs![
                self.artifacts.text_input_ids => ids.view(),
                self.artifacts.text_attention_mask => attention_mask.view()
            ]?
        } else {
            ort::inputs![self.artifacts.text_input_ids => ids.view()]?
        };
        let outputs = self.text_model.run(inputs)?;

        let output = outputs
            .get(self.artifacts.text_output)
            .ok_or(anyhow!("output {} not found", self.artifacts.text_output))?
            .try_extract_tensor::<f32>()?
            .to_owned();

        let output: CLIPEmbedding = output.into_shape(self.dim)?;

        Ok(utils::normalize(output))
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

fn declares_input<'a>(mut names: impl Iterator<Item = &'a str>, name: &str) -> bool {
    names.any(|n| n == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_declares_input() {
        let names = ["input_ids"];
        assert!(declares_input(names.iter().copied(), "input_ids"));
        assert!(!declares_input(names.iter().copied(), "attention_mask"));

        let names = ["input_ids", "attention_mask"];
        assert!(declares_input(names.iter().copied(), "attention_mask"));
    }

    /// Needs the ONNX exports under `LOCAL_RESOURCES_DIR`, run with `--ignored`.
    #[test_log::test(tokio::test)]
    #[ignore]
    async fn test_clip_embeddings() {
        let resources_dir =
            std::env::var("LOCAL_RESOURCES_DIR").unwrap_or_else(|_| "resources".into());
        let clip = CLIP::new(CLIPModel::ViTB32, resources_dir, "https://huggingface.co")
            .await
            .unwrap();

        let image = RgbImage::from_fn(320, 240, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        let image_embedding = clip.get_image_embedding_from_image(&image).unwrap();
        let text_embedding = clip.get_text_embedding("a colorful gradient").unwrap();

        for embedding in [&image_embedding, &text_embedding] {
            assert_eq!(embedding.len(), 512);
            assert!((embedding.dot(embedding) - 1.0).abs() < 1e-4);
        }

        // padding to the context length must not depend on the prompt length
        let long = "word ".repeat(200);
        assert_eq!(clip.get_text_embedding(&long).unwrap().len(), 512);
    }
}
