//! In-process policy sync server on a temporary unix socket

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnixListenerStream};
use tokio_util::sync::{CancellationToken, DropGuard};
use tonic::codec::ProstCodec;
use tonic::codegen::{http, Body, BoxFuture, Service, StdError};
use tonic::server::{Grpc, NamedService, ServerStreamingService};
use tonic::{Request, Response, Status};

use ward_proto::{SyncRequest, ToDataplane, SERVICE_NAME, SYNC_PATH};

type Update = Result<ToDataplane, Status>;

/// Serves a single `Sync` call with whatever the test pushes into `updates`
#[derive(Clone)]
struct SingleSync {
    updates: Arc<Mutex<Option<mpsc::Receiver<Update>>>>,
}

impl ServerStreamingService<SyncRequest> for SingleSync {
    type Response = ToDataplane;
    type ResponseStream = ReceiverStream<Update>;
    type Future = std::future::Ready<Result<Response<Self::ResponseStream>, Status>>;

    fn call(&mut self, _request: Request<SyncRequest>) -> Self::Future {
        let updates = self.updates.lock().unwrap().take();
        std::future::ready(match updates {
            Some(rx) => Ok(Response::new(ReceiverStream::new(rx))),
            None => Err(Status::resource_exhausted("sync stream already served")),
        })
    }
}

impl<B> Service<http::Request<B>> for SingleSync
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        assert_eq!(req.uri().path(), SYNC_PATH);
        let method = self.clone();
        Box::pin(async move {
            let codec: ProstCodec<ToDataplane, SyncRequest> = ProstCodec::default();
            let mut grpc = Grpc::new(codec);
            Ok(grpc.server_streaming(method, req).await)
        })
    }
}

impl NamedService for SingleSync {
    const NAME: &'static str = SERVICE_NAME;
}

/// A running server. Dropping `updates` ends the stream; dropping the
/// whole value shuts the server down and removes the socket directory.
pub(crate) struct TestServer {
    /// `unix://` target to dial
    pub(crate) target: String,
    /// Updates streamed to the client, in order
    pub(crate) updates: mpsc::Sender<Update>,
    _shutdown: DropGuard,
    _dir: tempfile::TempDir,
}

pub(crate) async fn start() -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("sync.sock");
    let listener = UnixListener::bind(&socket).unwrap();

    let (updates, rx) = mpsc::channel(32);
    let service = SingleSync {
        updates: Arc::new(Mutex::new(Some(rx))),
    };

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(service)
            .serve_with_incoming_shutdown(UnixListenerStream::new(listener), async move {
                signal.cancelled().await
            })
            .await
    });

    TestServer {
        target: format!("unix://{}", socket.display()),
        updates,
        _shutdown: shutdown.drop_guard(),
        _dir: dir,
    }
}
