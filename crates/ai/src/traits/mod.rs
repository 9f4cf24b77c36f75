mod image_caption;
mod multi_modal_embedding;

use crate::{loader, BatchResults, HandlerPayload};
use futures::Future;
pub use image_caption::*;
pub use multi_modal_embedding::*;
use std::{fmt, time::Duration};
use tokio::sync::{mpsc, oneshot};

pub trait Model {
    type Item;
    type Output;

    fn process(
        &mut self,
        items: Vec<Self::Item>,
    ) -> impl Future<Output = BatchResults<Self::Output>> + Send;

    fn batch_size_limit(&self) -> usize;
}

pub type BatchHandlerTx<Item, Output> = mpsc::Sender<HandlerPayload<Item, Output>>;

/// Handle to a model running on its own worker thread.
///
/// Handles are cheap to clone and every clone talks to the same worker, so the
/// weights are loaded once no matter how many request handlers hold one. The
/// worker serves messages one at a time in arrival order. When the last handle
/// is dropped the worker releases the model and exits.
pub struct AIModel<TItem, TOutput> {
    model_id: String, // for better logging
    tx: BatchHandlerTx<TItem, TOutput>,
}

impl<TItem, TOutput> Clone for AIModel<TItem, TOutput> {
    fn clone(&self) -> Self {
        Self {
            model_id: self.model_id.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<TItem, TOutput> fmt::Debug for AIModel<TItem, TOutput> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AIModel")
            .field("model_id", &self.model_id)
            .finish()
    }
}

impl<TItem, TOutput> AIModel<TItem, TOutput>
where
    TItem: Send + 'static,
    TOutput: Send + 'static,
{
    /// Spawns the worker thread. The model itself is created lazily by
    /// `create_model`, on the first message or on [`AIModel::ready`].
    ///
    /// With `offload_duration` set, the model is dropped after that much idle
    /// time and recreated on the next request. `None` keeps it loaded for the
    /// lifetime of the worker.
    pub fn new<T, TFut, TFn>(
        model_id: impl Into<String>,
        create_model: TFn,
        offload_duration: Option<Duration>,
    ) -> anyhow::Result<Self>
    where
        T: Model<Item = TItem, Output = TOutput> + Send + 'static,
        TFut: Future<Output = anyhow::Result<T>> + Send + 'static,
        TFn: Fn() -> TFut + Send + 'static,
    {
        let model_id = model_id.into();
        let mut loader = loader::ModelLoader::new(create_model);
        let (tx, mut rx) = mpsc::channel::<HandlerPayload<TItem, TOutput>>(512);

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let worker_model_id = model_id.clone();
        std::thread::Builder::new()
            .name(format!("ai-model-{}", model_id))
            .spawn(move || {
                rt.block_on(async move {
                    loop {
                        let idle = async {
                            match offload_duration {
                                Some(duration) => tokio::time::sleep(duration).await,
                                None => std::future::pending::<()>().await,
                            }
                        };

                        tokio::select! {
                            _ = idle => {
                                if loader.is_loaded() {
                                    tracing::debug!(model_id = %worker_model_id, "No message received for {:?}, offload model", offload_duration);
                                    loader.offload();
                                }
                            }
                            payload = rx.recv() => {
                                match payload {
                                    Some(HandlerPayload::Load(reply_tx)) => {
                                        let result = loader.load().await.map(|_| ());
                                        if let Err(e) = &result {
                                            tracing::error!(model_id = %worker_model_id, "failed to load model: {}", e);
                                        }
                                        let _ = reply_tx.send(result);
                                    }
                                    Some(HandlerPayload::BatchData(items, result_tx)) => {
                                        // If channel closed,
                                        // we have no way to response, just ignore task.
                                        if result_tx.is_closed() {
                                            tracing::debug!(model_id = %worker_model_id, "receiver dropped, skip items");
                                            continue;
                                        }

                                        let results = match loader.load().await {
                                            Ok(model) => model.process(items).await,
                                            Err(e) => {
                                                tracing::error!(model_id = %worker_model_id, "failed to load model: {}", e);
                                                Err(e)
                                            }
                                        };

                                        if result_tx.send(results).is_err() {
                                            tracing::error!(model_id = %worker_model_id, "failed to send results");
                                        }
                                    }
                                    None => {
                                        // this means all tx has been dropped
                                        if loader.is_loaded() {
                                            tracing::info!(model_id = %worker_model_id, "all tx dropped, offload model and end loop");
                                            loader.offload();
                                        }
                                        break;
                                    }
                                }
                            }
                        }
                    }
                });
            })?;

        Ok(Self { model_id, tx })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Forces the model to load and reports whether that worked.
    #[tracing::instrument(name = "AIModel::ready", err(Debug), skip_all, fields(model_id=%self.model_id))]
    pub async fn ready(&self) -> anyhow::Result<()> {
        let (reply_tx, rx) = oneshot::channel();
        if let Err(e) = self.tx.send(HandlerPayload::Load(reply_tx)).await {
            anyhow::bail!("failed to send load request: {}", e);
        }

        match rx.await {
            Ok(result) => result,
            Err(e) => anyhow::bail!("failed to receive load result: {:?}", e),
        }
    }

    #[tracing::instrument(name = "AIModel::process", err(Debug), skip_all, fields(model_id=%self.model_id))]
    pub async fn process(&self, items: Vec<TItem>) -> BatchResults<TOutput> {
        let (result_tx, rx) = oneshot::channel();
        match self.tx.send(HandlerPayload::BatchData(items, result_tx)).await {
            Ok(_) => {
                tracing::debug!("items sent to model");
            }
            Err(e) => {
                anyhow::bail!("failed to send items: {}", e);
            }
        }

        match rx.await {
            Ok(result) => result,
            Err(e) => {
                anyhow::bail!("failed to receive results: {:?}", e);
            }
        }
    }

    #[tracing::instrument(name = "AIModel::process_single", err(Debug), skip_all, fields(model_id=%self.model_id))]
    pub async fn process_single(&self, item: TItem) -> anyhow::Result<TOutput> {
        let results = self.process(vec![item]).await?;
        let result = results
            .into_iter()
            .next()
            .ok_or(anyhow::anyhow!("no result"))??;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    struct Doubler;

    impl Model for Doubler {
        type Item = i32;
        type Output = i32;

        fn batch_size_limit(&self) -> usize {
            2
        }

        async fn process(&mut self, items: Vec<i32>) -> BatchResults<i32> {
            if items.len() > self.batch_size_limit() {
                anyhow::bail!("too many items");
            }
            Ok(items
                .into_iter()
                .map(|v| {
                    if v < 0 {
                        anyhow::bail!("negative input");
                    }
                    Ok(v * 2)
                })
                .collect())
        }
    }

    fn counting_doubler(
        loads: Arc<AtomicUsize>,
        offload_duration: Option<Duration>,
    ) -> AIModel<i32, i32> {
        AIModel::new(
            "doubler",
            move || {
                let loads = loads.clone();
                async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(Doubler)
                }
            },
            offload_duration,
        )
        .unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_ready_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let model = counting_doubler(loads.clone(), None);
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        model.ready().await.unwrap();
        model.ready().await.unwrap();
        assert_eq!(model.process_single(21).await.unwrap(), 42);
        assert_eq!(model.clone().process_single(1).await.unwrap(), 2);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(model.model_id(), "doubler");
    }

    #[test_log::test(tokio::test)]
    async fn test_item_and_batch_errors() {
        let model = counting_doubler(Arc::new(AtomicUsize::new(0)), None);

        let results = model.process(vec![1, -1]).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(*results[0].as_ref().unwrap(), 2);
        assert!(results[1].is_err());

        assert!(model.process(vec![1, 2, 3]).await.is_err());
        assert!(model.process_single(-5).await.is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_load_failure() {
        let model: AIModel<i32, i32> = AIModel::new(
            "broken",
            || async { Err::<Doubler, _>(anyhow::anyhow!("weights not found")) },
            None,
        )
        .unwrap();

        let err = model.ready().await.unwrap_err();
        assert!(err.to_string().contains("weights not found"));
        assert!(model.process_single(1).await.is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_offload_and_reload() {
        let loads = Arc::new(AtomicUsize::new(0));
        let model = counting_doubler(loads.clone(), Some(Duration::from_millis(50)));

        assert_eq!(model.process_single(1).await.unwrap(), 2);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(model.process_single(2).await.unwrap(), 4);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn test_concurrent_callers() {
        let model = counting_doubler(Arc::new(AtomicUsize::new(0)), None);

        let handles = (0..16)
            .map(|i| {
                let model = model.clone();
                tokio::spawn(async move { (i, model.process_single(i).await.unwrap()) })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            let (input, output) = handle.await.unwrap();
            assert_eq!(output, input * 2);
        }
    }
}
