//! Server accept loop and graceful shutdown.
//!
//! Contains the runtime infrastructure that sits between the TCP listener
//! and the per-request handler. This module is intentionally decoupled
//! from `main()` so that the server logic remains testable and reusable
//! without pulling in process-level concerns like signal handling or
//! `std::process::exit`.

use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Response;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::{handle_request, ApiError, AppState, BoxBody};

/// Runtime state shared across the accept loop.
pub struct ServerState {
    /// Application state shared by all handlers.
    pub state: Arc<AppState>,
    /// Bounds the number of concurrent in-flight requests.
    pub semaphore: Arc<Semaphore>,
    /// Cached value of the semaphore capacity, used in error messages.
    pub concurrency_limit: usize,
}

impl ServerState {
    /// Builds the server state, sizing the semaphore from the config.
    pub fn new(state: Arc<AppState>) -> Self {
        let concurrency_limit = state.config.max_concurrent_requests;
        Self {
            state,
            semaphore: Arc::new(Semaphore::new(concurrency_limit)),
            concurrency_limit,
        }
    }
}

/// Accepts connections on `listener` and dispatches them through
/// [`handle_request`] with the shared `state`.
///
/// Runs until `shutdown` resolves, then stops accepting new connections
/// and returns. In-flight requests on already-spawned tasks continue
/// to completion independently.
pub async fn serve(
    listener: TcpListener,
    server_state: ServerState,
    shutdown: impl std::future::Future<Output = ()>,
) {
    let ServerState {
        state,
        semaphore,
        concurrency_limit,
    } = server_state;

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, client_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(%e, "failed to accept connection");
                        continue;
                    }
                };

                let state = Arc::clone(&state);
                let semaphore = Arc::clone(&semaphore);

                tokio::spawn(async move {
                    let svc = service_fn(move |req: hyper::Request<Incoming>| {
                        let state = Arc::clone(&state);
                        let semaphore = Arc::clone(&semaphore);
                        async move {
                            let _permit = match semaphore.try_acquire() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    warn!(
                                        limit = concurrency_limit,
                                        "concurrency limit reached, rejecting request"
                                    );
                                    let err = ApiError::ServiceUnavailable(concurrency_limit);
                                    return Ok::<Response<BoxBody>, std::convert::Infallible>(
                                        err.into_response(),
                                    );
                                }
                            };

                            let resp = handle_request(req, state, client_addr)
                                .await
                                .unwrap_or_else(ApiError::into_response);
                            Ok::<Response<BoxBody>, std::convert::Infallible>(resp)
                        }
                    });

                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), svc)
                        .await
                    {
                        warn!(%e, "connection error");
                    }
                });
            }
            () = &mut shutdown => {
                info!("shutting down, no longer accepting connections");
                break;
            }
        }
    }
}

/// Awaits a shutdown signal (SIGINT or SIGTERM on Unix, Ctrl+C on all
/// platforms). Returns once the first signal is received.
pub async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, initiating graceful shutdown"),
            _ = sigterm.recv() => info!("received SIGTERM, initiating graceful shutdown"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("received Ctrl+C, initiating graceful shutdown");
    }
}
