//! Session wiring (§6 External Interfaces): assembles the head encoder,
//! multiplexer, parser and dispatcher behind the producer/consumer surface
//! a host actually calls.

use std::sync::Arc;

use futures_core::Stream;
use serde_json::Value;
use tokio_stream::StreamExt;
use valuewire_api::{
    node::{Node, Reconstructed},
    nonce::{uuid_nonce_source, NonceSource},
    registry::{Registry, TagEntry},
    StreamError, StreamResult,
};

use crate::dispatcher::Dispatcher;
use crate::head::{encode_head, IdAllocator};
use crate::multiplexer::drain_all;
use crate::parser::{Delivery, IncrementalParser};
use crate::sse::to_sse_stream;

/// Builds a `Session` from the configuration table in §6: registered tag
/// entries, a nonce source, guards, and a producer-side fault callback.
#[derive(Clone)]
pub struct SessionConfig {
    registry: Registry,
    nonce_source: NonceSource,
    on_stream_error: Option<Arc<dyn Fn(StreamError) + Send + Sync>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            registry: Registry::new(),
            nonce_source: uuid_nonce_source(),
            on_stream_error: None,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, entry: TagEntry) -> Self {
        self.registry.register(entry);
        self
    }

    pub fn guard(mut self, guard: impl Fn(&Value) -> StreamResult<()> + Send + Sync + 'static) -> Self {
        self.registry.guard(guard);
        self
    }

    /// Default is a v4 UUID source; hosts without a UUID dependency can
    /// supply `random_scalar_nonce_source` instead.
    pub fn nonce_source(mut self, source: NonceSource) -> Self {
        self.nonce_source = source;
        self
    }

    /// Called once per producer-side fault, the way `onStreamError` is
    /// described in §6. Never invoked for a producer's own `UserFault` —
    /// that's delivered to the owning handle instead.
    pub fn on_stream_error(mut self, f: impl Fn(StreamError) + Send + Sync + 'static) -> Self {
        self.on_stream_error = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Session {
        Session { config: self }
    }
}

pub struct Session {
    config: SessionConfig,
}

impl Session {
    /// Producer side: encode `root` as a chunked async sequence of valid
    /// UTF-8 fragments of the outer frame.
    pub fn stringify(&self, root: Node) -> StreamResult<impl Stream<Item = String>> {
        let nonce = (self.config.nonce_source)();
        let registry = self.config.registry.clone();
        let ids = Arc::new(IdAllocator::default());
        let (head_value, producers) = encode_head(root, &registry, &nonce, &ids)?;
        let on_error = self.config.on_stream_error.clone();

        Ok(async_stream::stream! {
            yield format!("[{head_value},[");
            let mut rows = Box::pin(drain_all(producers, registry, nonce, ids));
            let mut first = true;
            while let Some(row) = rows.next().await {
                match row {
                    Ok(row) => {
                        if !first {
                            yield ",".to_string();
                        }
                        first = false;
                        yield row.value.to_string();
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "producer-side fault");
                        if let Some(cb) = &on_error {
                            cb(e);
                        }
                    }
                }
            }
            yield "]]".to_string();
        })
    }

    /// Same payload as `stringify`, reframed as Server-Sent Events.
    pub fn to_sse_response(&self, root: Node) -> StreamResult<impl Stream<Item = String>> {
        Ok(to_sse_stream(self.stringify(root)?))
    }

    /// Consumer side: resolves as soon as the head is parsed. Handles
    /// nested in the returned tree keep resolving/yielding as rows arrive
    /// on a background task that owns the parser and dispatcher from then
    /// on (§5: both stay pinned to a single task).
    pub async fn parse<S>(&self, mut source: S) -> StreamResult<Reconstructed>
    where
        S: Stream<Item = String> + Unpin + Send + 'static,
    {
        let registry = self.config.registry.clone();
        let mut dispatcher = Dispatcher::new(registry);
        let mut parser = IncrementalParser::new();

        let head = loop {
            if let Some(head) = parser.take_head()? {
                break head;
            }
            match source.next().await {
                Some(chunk) => parser.feed(chunk.as_bytes()),
                None => return Err(StreamError::StreamInterrupted),
            }
        };

        let root = dispatcher.materialize_head(&head)?;

        tokio::spawn(async move {
            loop {
                match parser.next_delivery() {
                    Ok(Some(Delivery::Row(row))) => {
                        if let Err(e) = dispatcher.dispatch_row(&row).await {
                            tracing::error!(error = %e, "protocol violation, interrupting session");
                            return;
                        }
                    }
                    Ok(Some(Delivery::End)) => return,
                    Ok(None) => match source.next().await {
                        Some(chunk) => parser.feed(chunk.as_bytes()),
                        None => {
                            tracing::warn!("source ended before the frame closed");
                            dispatcher.interrupt_all().await;
                            return;
                        }
                    },
                    Err(e) => {
                        tracing::error!(error = %e, "parser fault, interrupting session");
                        dispatcher.interrupt_all().await;
                        return;
                    }
                }
            }
        });

        Ok(root)
    }
}
