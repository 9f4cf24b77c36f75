use super::AIModel;
use image::RgbImage;
use std::{fmt, sync::Arc};

#[derive(Clone)]
pub enum MultiModalEmbeddingInput {
    Image(Arc<RgbImage>),
    Text(String),
}

impl fmt::Debug for MultiModalEmbeddingInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(image) => write!(f, "Image({}x{})", image.width(), image.height()),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
        }
    }
}

pub type MultiModalEmbeddingOutput = Vec<f32>;
pub type MultiModalEmbeddingModel = AIModel<MultiModalEmbeddingInput, MultiModalEmbeddingOutput>;
