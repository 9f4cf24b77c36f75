use crate::config::ModelConfig;
use ai::{
    blip::BLIP, clip::CLIP, utils::embedding_average, AIModel, ImageCaptionModel,
    MultiModalEmbeddingInput, MultiModalEmbeddingModel,
};
use anyhow::Context;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ImageDescription {
    pub description: String,
    pub embedding_vector: Vec<f32>,
}

/// Captioning and embedding shared by the HTTP service and the demo UI.
#[derive(Clone)]
pub struct AIHandler {
    pub image_caption: ImageCaptionModel,
    pub multi_modal_embedding: MultiModalEmbeddingModel,
}

impl fmt::Debug for AIHandler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AIHandler").finish()
    }
}

impl AIHandler {
    /// Creates the model workers. Nothing is loaded until [`AIHandler::ready`]
    /// or the first request.
    pub fn new(config: &ModelConfig) -> anyhow::Result<Self> {
        let image_caption = {
            let config = config.clone();
            AIModel::new(
                format!("blip-{}", config.blip_model.as_ref()),
                move || {
                    let config = config.clone();
                    async move {
                        BLIP::new(
                            config.resources_dir,
                            config.download_url,
                            config.blip_model,
                            config.blip_weights,
                            config.blip_max_tokens,
                        )
                        .await
                    }
                },
                None,
            )?
        };

        let multi_modal_embedding = {
            let config = config.clone();
            AIModel::new(
                format!("clip-{}", config.clip_model.as_ref()),
                move || {
                    let config = config.clone();
                    async move {
                        CLIP::new(config.clip_model, config.resources_dir, config.download_url)
                            .await
                    }
                },
                None,
            )?
        };

        Ok(Self::from_models(image_caption, multi_modal_embedding))
    }

    pub fn from_models(
        image_caption: ImageCaptionModel,
        multi_modal_embedding: MultiModalEmbeddingModel,
    ) -> Self {
        Self {
            image_caption,
            multi_modal_embedding,
        }
    }

    /// Load both models, failing if either cannot be loaded.
    pub async fn ready(&self) -> anyhow::Result<()> {
        self.image_caption
            .ready()
            .await
            .with_context(|| format!("failed to load {}", self.image_caption.model_id()))?;
        self.multi_modal_embedding.ready().await.with_context(|| {
            format!(
                "failed to load {}",
                self.multi_modal_embedding.model_id()
            )
        })?;
        Ok(())
    }

    pub async fn caption(&self, image: Arc<RgbImage>) -> anyhow::Result<String> {
        self.image_caption.process_single(image).await
    }

    /// Mean of the image embedding and the caption embedding.
    pub async fn embed(&self, image: Arc<RgbImage>, caption: &str) -> anyhow::Result<Vec<f32>> {
        let results = self
            .multi_modal_embedding
            .process(vec![
                MultiModalEmbeddingInput::Image(image),
                MultiModalEmbeddingInput::Text(caption.to_string()),
            ])
            .await?;

        let mut results = results.into_iter();
        let image_embedding = results
            .next()
            .ok_or(anyhow::anyhow!("no image embedding"))?
            .context("image embedding failed")?;
        let text_embedding = results
            .next()
            .ok_or(anyhow::anyhow!("no text embedding"))?
            .context("text embedding failed")?;

        embedding_average(&image_embedding, &text_embedding)
    }

    #[tracing::instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub async fn describe(&self, image: Arc<RgbImage>) -> anyhow::Result<ImageDescription> {
        let description = self.caption(image.clone()).await?;
        tracing::debug!("caption: {}", description);
        let embedding_vector = self.embed(image, &description).await?;

        Ok(ImageDescription {
            description,
            embedding_vector,
        })
    }
}
