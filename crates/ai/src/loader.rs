use crate::Model;
use futures::{future::BoxFuture, Future};
use tracing::debug;

pub(crate) struct ModelLoader<T>
where
    T: Model,
{
    model: Option<T>,
    create_model_fn: Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send>,
}

impl<T> ModelLoader<T>
where
    T: Model,
{
    pub fn new<TFut, TFn>(create_model: TFn) -> Self
    where
        TFut: Future<Output = anyhow::Result<T>> + Send + 'static,
        TFn: Fn() -> TFut + Send + 'static,
    {
        Self {
            model: None,
            create_model_fn: Box::new(move || Box::pin(create_model())),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Returns the loaded model, creating it first if needed.
    pub async fn load(&mut self) -> anyhow::Result<&mut T> {
        if self.model.is_none() {
            debug!("loading model");
            let model = (self.create_model_fn)().await?;
            self.model = Some(model);
        }

        self.model
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("failed to load model"))
    }

    pub fn offload(&mut self) {
        self.model = None;
    }
}
