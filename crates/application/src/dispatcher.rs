use std::sync::Arc;

use mangashelf_api::MangaApi;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::request::{ApiRequest, Completion, execute};

/// Runs each request as an independent task and queues its completion for
/// the UI thread. Requests are never ordered, deduplicated or cancelled.
pub struct Dispatcher {
    api: Arc<dyn MangaApi>,
    runtime: Handle,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl Dispatcher {
    pub fn new(api: Arc<dyn MangaApi>, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            api,
            runtime,
            tx,
            rx,
        }
    }

    pub fn dispatch(&self, request: ApiRequest) {
        debug!(request = request.name(), "dispatch");
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            let completion = execute(api.as_ref(), request).await;
            // The receiver only goes away on shutdown.
            let _ = tx.send(completion);
        });
    }

    pub fn dispatch_all(&self, requests: impl IntoIterator<Item = ApiRequest>) {
        for request in requests {
            self.dispatch(request);
        }
    }

    /// Next finished request, without blocking.
    pub fn try_next(&mut self) -> Option<Completion> {
        self.rx.try_recv().ok()
    }
}
