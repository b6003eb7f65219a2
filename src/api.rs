//! Read-only HTTP query surface.
//!
//! `GET /api/data` answers with [`SharedState::query`] as JSON. Nothing here
//! ever writes to the state.

use crate::error::AppError;
use crate::state::SharedState;
use log::{debug, info, warn};
use picoserve::response::Json;
use picoserve::routing::{PathRouter, get};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub const DATA_PATH: &str = "/api/data";

pub fn make_app(state: Arc<SharedState>) -> picoserve::Router<impl PathRouter> {
    picoserve::Router::new().route(
        DATA_PATH,
        get(move || {
            let state = state.clone();
            async move { Json(state.query()) }
        }),
    )
}

pub fn server_config() -> picoserve::Config<Duration> {
    picoserve::Config::new(picoserve::Timeouts {
        start_read_request: Some(Duration::from_secs(5)),
        read_request: Some(Duration::from_secs(1)),
        write: Some(Duration::from_secs(1)),
    })
}

/// Accept connections on `listener` until `cancel` fires.
///
/// Connections are served on local tasks, so this must run inside a
/// [`tokio::task::LocalSet`].
pub async fn serve(
    listener: TcpListener,
    state: Arc<SharedState>,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let app = Rc::new(make_app(state));
    let config = Rc::new(server_config());

    if let Ok(local) = listener.local_addr() {
        info!("Serving {} on http://{}", DATA_PATH, local);
    }

    loop {
        let (stream, remote) = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted?,
        };
        debug!("Connection from {}", remote);

        let app = app.clone();
        let config = config.clone();
        tokio::task::spawn_local(async move {
            match picoserve::serve(&app, &config, &mut [0; 2048], stream).await {
                Ok(handled) => debug!("{} requests handled from {}", handled, remote),
                Err(e) => warn!("HTTP connection from {} failed: {:?}", remote, e),
            }
        });
    }

    info!("HTTP server stopped");
    Ok(())
}
