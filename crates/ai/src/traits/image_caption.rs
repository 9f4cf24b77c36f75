use super::AIModel;
use image::RgbImage;
use std::sync::Arc;

pub type ImageCaptionInput = Arc<RgbImage>;
pub type ImageCaptionOutput = String;
pub type ImageCaptionModel = AIModel<ImageCaptionInput, ImageCaptionOutput>;
