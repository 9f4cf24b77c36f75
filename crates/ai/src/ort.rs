use ort::{GraphOptimizationLevel, Session};
use std::path::Path;

/// Open an ONNX session with full graph optimization. `intra_threads`
/// defaults to the available parallelism.
pub(crate) fn load_onnx_model(
    model_path: impl AsRef<Path>,
    intra_threads: Option<usize>,
) -> anyhow::Result<Session> {
    let intra_threads = intra_threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    });

    let session = Session::builder()?
        .with_intra_threads(intra_threads)?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(model_path.as_ref())?;

    Ok(session)
}
