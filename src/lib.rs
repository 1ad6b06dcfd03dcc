//! # macroscrub: local Excel macro remover
//!
//! `macroscrub` is a small local web utility that takes a macro-enabled
//! Excel workbook (`.xlsm`), deletes its VBA macro project, and hands back a
//! macro-free `.xlsx` download. Nothing ever leaves the machine: the server
//! binds to loopback and each upload is processed in a private temp
//! directory that is removed when the request finishes.
//!
//! ## Architecture
//!
//! The HTTP layer is built on [Axum](https://github.com/tokio-rs/axum).
//! A browser form (`POST /`) and a JSON API (`POST /api/remove-macro`) both
//! feed the same conversion workflow in [`api::handlers::convert`]; they
//! differ only in how failures are reported (redirect with a flash message
//! versus a JSON error body). The conversion itself lives in [`strip`]: the
//! workbook is treated as an OPC zip package, the VBA project parts are
//! removed, and the package metadata ([Content_Types].xml and the workbook
//! relationships) is repaired so the result is a well-formed `.xlsx`. Cell
//! data is never interpreted; untouched parts are preserved byte-for-byte.
//!
//! The binary can run headless (serving to the system browser) or, with the
//! `desktop` cargo feature, host the page in a native window.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use macroscrub::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = macroscrub::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     macroscrub::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await
//! }
//! ```

pub mod api;
pub mod config;
pub mod errors;
pub mod filename;
pub mod shell;
pub mod strip;
pub mod telemetry;

use std::net::SocketAddr;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};

pub use config::Config;
use errors::Error;

/// Shared state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    let router = Router::new()
        .route(
            "/",
            get(api::handlers::pages::index).post(api::handlers::convert::convert_form),
        )
        .route(
            "/api/remove-macro",
            post(api::handlers::convert::convert_api),
        )
        .route("/healthz", get(api::handlers::pages::healthz))
        // Reject oversized uploads before any file I/O happens.
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state);

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

/// The bound server, ready to run.
///
/// Binding happens in [`Application::new`] rather than in `serve` so that a
/// configured port of `0` resolves to a real ephemeral port before anything
/// (browser opener, native window) needs the URL.
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Bind the listener and build the router.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        let state = AppState { config };
        let router = build_router(state);
        Ok(Self { listener, router })
    }

    /// The address the server is actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// The URL the UI is reachable at.
    pub fn local_url(&self) -> Result<String, Error> {
        let addr = self.local_addr()?;
        Ok(format!("http://{addr}"))
    }

    /// Run the server until the shutdown future resolves.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        info!("Listening on {}", self.local_url()?);

        axum::serve(self.listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Server stopped");
        Ok(())
    }
}
