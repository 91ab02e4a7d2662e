//! Dial targets for the policy sync server
//!
//! The node agent normally exposes the sync API on a unix socket mounted into
//! the workload; plain `http://` endpoints are accepted for local testing.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::debug;

use crate::error::SyncError;

/// Authority used for unix socket channels. Only the connector decides
/// where the bytes go; tonic still needs a well-formed URI.
const UNIX_PLACEHOLDER_URI: &str = "http://[::]:50051";

/// Where to dial the policy sync server
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialTarget {
    /// Unix domain socket path
    Unix(PathBuf),
    /// `http://host:port`
    Http(String),
}

impl DialTarget {
    /// Parse a configured target (pure function)
    ///
    /// Accepts `unix:///path`, a bare absolute path, or `http://host:port`.
    pub fn parse(target: &str) -> Result<Self, SyncError> {
        let target = target.trim();
        if let Some(path) = target.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(SyncError::invalid_target(target, "missing socket path"));
            }
            return Ok(DialTarget::Unix(PathBuf::from(path)));
        }
        if target.starts_with('/') {
            return Ok(DialTarget::Unix(PathBuf::from(target)));
        }
        if target.starts_with("http://") {
            return Ok(DialTarget::Http(target.to_string()));
        }
        Err(SyncError::invalid_target(
            target,
            "expected unix://<path> or http://<host>:<port>",
        ))
    }

    /// Dial the target and return a connected channel
    pub async fn connect(&self, connect_timeout: Duration) -> Result<Channel, SyncError> {
        debug!(dial_target = %self, "Dialing policy sync server");
        match self {
            DialTarget::Http(uri) => Endpoint::from_shared(uri.clone())
                .map_err(|e| SyncError::invalid_target(uri.as_str(), e.to_string()))?
                .connect_timeout(connect_timeout)
                .connect()
                .await
                .map_err(|source| SyncError::Connect {
                    target: self.to_string(),
                    source,
                }),
            DialTarget::Unix(path) => {
                let socket = path.clone();
                Endpoint::from_static(UNIX_PLACEHOLDER_URI)
                    .connect_timeout(connect_timeout)
                    .connect_with_connector(service_fn(move |_: Uri| {
                        let socket = socket.clone();
                        async move {
                            let stream = UnixStream::connect(socket).await?;
                            Ok::<_, std::io::Error>(TokioIo::new(stream))
                        }
                    }))
                    .await
                    .map_err(|source| SyncError::Connect {
                        target: self.to_string(),
                        source,
                    })
            }
        }
    }
}

impl fmt::Display for DialTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialTarget::Unix(path) => write!(f, "unix://{}", path.display()),
            DialTarget::Http(uri) => f.write_str(uri),
        }
    }
}
