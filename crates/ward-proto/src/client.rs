//! gRPC client for the `PolicySync` service
//!
//! Mirrors what `tonic-build` emits for a single server-streaming method,
//! specialised to [`Channel`].

use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

use crate::{SyncRequest, ToDataplane, SYNC_PATH};

/// Client for the policy sync server
#[derive(Debug, Clone)]
pub struct PolicySyncClient {
    inner: tonic::client::Grpc<Channel>,
}

impl PolicySyncClient {
    /// Wrap an established channel
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Open the sync stream.
    ///
    /// The returned stream yields updates in the order the server sent them
    /// and ends with an error status if the connection breaks.
    pub async fn sync(
        &mut self,
        request: impl tonic::IntoRequest<SyncRequest>,
    ) -> Result<tonic::Response<tonic::Streaming<ToDataplane>>, tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("service was not ready: {e}")))?;

        let codec: ProstCodec<SyncRequest, ToDataplane> = ProstCodec::default();
        let path = PathAndQuery::from_static(SYNC_PATH);
        self.inner
            .server_streaming(request.into_request(), path, codec)
            .await
    }
}
