mod loader;
mod ort;
mod traits;

pub mod blip;
pub mod clip;
pub mod utils;

pub use tokenizers;
pub use traits::*;

use tokio::sync::oneshot;

pub type BatchResults<TOutput> = anyhow::Result<Vec<anyhow::Result<TOutput>>>;

/// Messages accepted by the worker thread behind an [`AIModel`].
pub enum HandlerPayload<TItem, TOutput> {
    /// Run the model on a batch and reply with one result per item.
    BatchData(Vec<TItem>, oneshot::Sender<BatchResults<TOutput>>),
    /// Make sure the weights are in memory, without running anything.
    Load(oneshot::Sender<anyhow::Result<()>>),
}
