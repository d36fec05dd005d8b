//! Helpers for running a controller and control listener in tests.

use std::{net::SocketAddr, sync::Arc};

use tokio::{sync::oneshot, task::JoinHandle};
use tricorder::{ControlServer, SessionController, SourceFactory};

/// A control listener running on a background task.
pub struct RunningAgent {
    /// Address of the control listener.
    pub addr: SocketAddr,
    /// Controller behind the listener.
    pub controller: Arc<SessionController>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RunningAgent {
    /// Bind a listener on an ephemeral loopback port and serve `factory`.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn spawn(factory: Arc<dyn SourceFactory>, mode: &str) -> Self {
        let controller = Arc::new(SessionController::new(factory));
        let server = ControlServer::bind(([127, 0, 0, 1], 0).into(), Arc::clone(&controller), mode)
            .await
            .expect("bind control listener");
        let addr = server.local_addr().expect("listener address");
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(server.run_with_shutdown(async {
            let _ = rx.await;
        }));
        Self {
            addr,
            controller,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    /// Stop the listener and wait for its connections to close.
    ///
    /// # Panics
    ///
    /// Panics if the listener task panicked.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await.expect("control listener task panicked");
        }
    }
}
