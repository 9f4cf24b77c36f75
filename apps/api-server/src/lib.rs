pub mod ai;
pub mod config;
pub mod demo;
pub mod error;
pub mod image_source;
pub mod routes;
pub mod standalone;

pub use crate::ai::{AIHandler, ImageDescription};
pub use config::{Config, ModelConfig};
pub use error::ApiError;
pub use routes::AppState;

pub mod exports {
    pub use super::demo;
    pub use super::standalone;
}
