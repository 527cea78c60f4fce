//! Feed Port
//!
//! Receiver side of the launch feed: every inbound text payload is handed
//! to a `PayloadHandler` by the connection that read it.

use async_trait::async_trait;

#[async_trait]
pub trait PayloadHandler: Send + Sync {
    /// Handle one raw payload. Failures are the handler's to log; the
    /// stream keeps going regardless.
    async fn handle_payload(&self, payload: &str);
}
