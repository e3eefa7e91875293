//! Seam between the controller and the remote execution service.

use async_trait::async_trait;
use graphrun_api::{ApiError, ByteStream, GraphClient, StreamRequest};
use graphrun_types::InitData;

/// Remote operations the controller depends on.
///
/// [`GraphClient`] is the HTTP implementation; tests substitute scripted ones.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Fetch the metadata describing the expected inputs.
    async fn init(&self) -> Result<InitData, ApiError>;

    /// Issue a `stream` request and return the undecoded response body.
    async fn open_stream(&self, request: StreamRequest) -> Result<ByteStream, ApiError>;
}

#[async_trait]
impl ExecutionService for GraphClient {
    async fn init(&self) -> Result<InitData, ApiError> {
        self.fetch_init().await
    }

    async fn open_stream(&self, request: StreamRequest) -> Result<ByteStream, ApiError> {
        GraphClient::open_stream(self, &request).await
    }
}
