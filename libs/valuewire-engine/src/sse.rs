//! Server-Sent Events framing (§6, `toSSEResponse`): the same chunk
//! sequence `Session::stringify` produces, reframed as one `data:` record
//! per chunk. Purely a transport-level rewrap — the value-wire framing
//! inside each record is untouched.

use futures_core::Stream;
use tokio_stream::StreamExt;

pub fn to_sse_stream(chunks: impl Stream<Item = String>) -> impl Stream<Item = String> {
    async_stream::stream! {
        let mut chunks = Box::pin(chunks);
        while let Some(chunk) = chunks.next().await {
            yield format!("data: {chunk}\n\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wraps_every_chunk_in_a_data_record() {
        let chunks = tokio_stream::iter(vec!["a".to_string(), "b".to_string()]);
        let mut sse = Box::pin(to_sse_stream(chunks));
        assert_eq!(sse.next().await, Some("data: a\n\n".to_string()));
        assert_eq!(sse.next().await, Some("data: b\n\n".to_string()));
        assert_eq!(sse.next().await, None);
    }
}
