use std::path::PathBuf;
use strum_macros::{AsRefStr, EnumString};

#[derive(Clone, Debug, PartialEq, Eq, EnumString, AsRefStr)]
pub enum CLIPModel {
    #[strum(serialize = "vit-b-32")]
    ViTB32,
}

/// Where the ONNX exports and tokenizer of a CLIP variant live, relative to
/// the resources dir, and the tensor names they use.
#[derive(Clone, Debug)]
pub struct CLIPArtifacts {
    pub image_model: PathBuf,
    pub text_model: PathBuf,
    pub tokenizer: PathBuf,
    pub image_input: &'static str,
    pub image_output: &'static str,
    pub text_input_ids: &'static str,
    pub text_attention_mask: &'static str,
    pub text_output: &'static str,
}

impl CLIPModel {
    pub fn artifacts(&self) -> CLIPArtifacts {
        match self {
            CLIPModel::ViTB32 => {
                let repo = PathBuf::from("Xenova/clip-vit-base-patch32/resolve/main");

                CLIPArtifacts {
                    image_model: repo.join("onnx/vision_model.onnx"),
                    text_model: repo.join("onnx/text_model.onnx"),
                    tokenizer: repo.join("tokenizer.json"),
                    image_input: "pixel_values",
                    image_output: "image_embeds",
                    text_input_ids: "input_ids",
                    text_attention_mask: "attention_mask",
                    text_output: "text_embeds",
                }
            }
        }
    }

    pub fn dim(&self) -> usize {
        match self {
            CLIPModel::ViTB32 => 512,
        }
    }

    /// Token window of the text encoder.
    pub fn context_length(&self) -> usize {
        match self {
            CLIPModel::ViTB32 => 77,
        }
    }
}

#[test]
fn test_clip_model_from_str() {
    use std::str::FromStr;

    assert_eq!(CLIPModel::from_str("vit-b-32").unwrap(), CLIPModel::ViTB32);
    assert!(CLIPModel::from_str("vit-l-14").is_err());
    assert_eq!(CLIPModel::ViTB32.as_ref(), "vit-b-32");
    assert_eq!(CLIPModel::ViTB32.dim(), 512);
}
