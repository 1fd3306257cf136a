//! Frontend listener implementation.
//!
//! Accepts connections on the application's listener and serves each one
//! over HTTP/1.1, handing every request to the dispatcher.

use crate::frontend::dispatch::Dispatcher;
use crate::frontend::pools::TaskPools;
use crate::proxy::ClientAddr;
use crate::state::AppState;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

/// Listener that accepts and serves connections until shutdown.
pub struct FrontendListener {
    /// Entrypoint name, for logs.
    name: String,
    listener: TcpListener,
    dispatcher: Dispatcher<Incoming>,
    pools: Arc<TaskPools>,
}

impl FrontendListener {
    /// Bind the listener configured in `state`.
    pub async fn bind(state: &AppState) -> std::io::Result<Self> {
        let server = &state.config().server;
        let listener = TcpListener::bind(server.listen).await?;

        info!(
            name = %server.name,
            listen = %listener.local_addr()?,
            metrics_path = %state.config().metrics.path,
            upstream = %state.config().upstream.address,
            "frontend listener bound"
        );

        Ok(Self {
            name: server.name.clone(),
            listener,
            dispatcher: state.dispatcher(),
            pools: Arc::clone(state.pools()),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the listener, accepting connections until shutdown.
    #[instrument(skip_all, fields(entrypoint = %self.name))]
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("frontend listener starting");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("frontend listener shutting down");
                    break;
                }
            }
        }
    }

    /// Serve one connection on its own task.
    fn handle_connection(&self, stream: TcpStream, client_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY on client connection");
        }

        let dispatcher = self.dispatcher.clone();
        let guard = self.pools.enter_background();

        tokio::spawn(async move {
            let _guard = guard;
            let io = TokioIo::new(stream);

            let service = service_fn(move |mut req: Request<Incoming>| {
                let dispatcher = dispatcher.clone();
                req.extensions_mut().insert(ClientAddr(client_addr));
                async move { Ok::<_, Infallible>(dispatcher.dispatch(req).await) }
            });

            if let Err(e) = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(io, service)
                .await
            {
                debug!(client = %client_addr, error = %e, "connection closed with error");
            } else {
                debug!(client = %client_addr, "connection closed");
            }
        });
    }
}
