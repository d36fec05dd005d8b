//! TCP listener dispatching control requests to the session controller.

use std::{future::Future, io, net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::sleep,
};
use tokio_util::{codec::Framed, sync::CancellationToken, task::TaskTracker};

use super::{
    ControlError,
    protocol::{
        ControlRequest,
        ControlResponse,
        HarvestReport,
        StatusReport,
        decode,
        encode,
        frame_codec,
    },
};
use crate::session::SessionController;

/// First delay after a failed `accept()`.
const ACCEPT_BACKOFF_INITIAL: Duration = Duration::from_millis(10);
/// Longest delay between `accept()` retries.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Turns requests into session operations.
struct Dispatcher {
    controller: Arc<SessionController>,
    mode: String,
}

impl Dispatcher {
    async fn handle(&self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::Start => match self.controller.start().await {
                Ok(()) => ControlResponse::Started,
                Err(err) => ControlResponse::Failed(err.to_string()),
            },
            ControlRequest::Stop => match self.controller.stop().await {
                Ok(()) => ControlResponse::Stopped,
                Err(err) => ControlResponse::Failed(err.to_string()),
            },
            ControlRequest::Harvest => {
                let records = self.controller.harvest().await;
                ControlResponse::Harvest(HarvestReport::new(self.mode.clone(), records))
            }
            ControlRequest::Status => {
                ControlResponse::Status(StatusReport::from(self.controller.status().await))
            }
        }
    }
}

/// Control listener bound to a local address.
pub struct ControlServer {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
}

impl ControlServer {
    /// Bind the listener. `mode` is echoed in every harvest report.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Io`] if the address cannot be bound.
    pub async fn bind(
        addr: SocketAddr,
        controller: Arc<SessionController>,
        mode: impl Into<String>,
    ) -> Result<Self, ControlError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            dispatcher: Arc::new(Dispatcher {
                controller,
                mode: mode.into(),
            }),
        })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Io`] if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, ControlError> { Ok(self.listener.local_addr()?) }

    /// Serve connections until `shutdown` resolves.
    ///
    /// Open connections are cancelled and awaited before returning. Accept
    /// failures are retried with exponential back-off.
    pub async fn run_with_shutdown<S>(self, shutdown: S)
    where
        S: Future<Output = ()> + Send,
    {
        let Self {
            listener,
            dispatcher,
        } = self;
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        if let Ok(addr) = listener.local_addr() {
            info!("control listener ready: addr={addr}");
        }

        select! {
            () = shutdown => {}
            () = accept_loop(&listener, &dispatcher, &token, &tracker) => {}
        }

        token.cancel();
        tracker.close();
        tracker.wait().await;
        info!("control listener stopped");
    }
}

async fn accept_loop(
    listener: &TcpListener,
    dispatcher: &Arc<Dispatcher>,
    token: &CancellationToken,
    tracker: &TaskTracker,
) {
    let mut delay = ACCEPT_BACKOFF_INITIAL;
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("control connection accepted: peer={peer}");
                tracker.spawn(serve_connection(
                    stream,
                    peer,
                    Arc::clone(dispatcher),
                    token.clone(),
                ));
                delay = ACCEPT_BACKOFF_INITIAL;
            }
            Err(err) => {
                warn!("accept error: error={err:?}");
                sleep(delay).await;
                delay = (delay * 2).min(ACCEPT_BACKOFF_MAX);
            }
        }
    }
}

/// Answer requests on one connection until the peer leaves or shutdown.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) {
    let mut framed = Framed::new(stream, frame_codec());
    loop {
        let frame = select! {
            biased;
            () = shutdown.cancelled() => break,
            frame = framed.next() => frame,
        };
        let bytes = match frame {
            Some(Ok(bytes)) => bytes,
            Some(Err(err)) => {
                log_read_error(peer, &err);
                break;
            }
            None => break,
        };
        let response = match decode::<ControlRequest>(&bytes) {
            Ok(request) => {
                debug!("control request: peer={peer}, request={request:?}");
                dispatcher.handle(request).await
            }
            Err(err) => {
                warn!("malformed control request: peer={peer}, error={err}");
                ControlResponse::Failed(err.to_string())
            }
        };
        if let Err(err) = send_response(&mut framed, &response).await {
            warn!("control reply failed: peer={peer}, error={err}");
            break;
        }
    }
    debug!("control connection closed: peer={peer}");
}

async fn send_response(
    framed: &mut Framed<TcpStream, tokio_util::codec::LengthDelimitedCodec>,
    response: &ControlResponse,
) -> Result<(), ControlError> {
    let payload = encode(response)?;
    framed.send(Bytes::from(payload)).await?;
    Ok(())
}

fn log_read_error(peer: SocketAddr, err: &io::Error) {
    if err.kind() == io::ErrorKind::InvalidData {
        warn!("oversized control frame: peer={peer}, error={err}");
    } else {
        debug!("control read failed: peer={peer}, error={err}");
    }
}
