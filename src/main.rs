use clap::Parser;
use macroscrub::{Application, Config, telemetry};

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
#[cfg(not(feature = "desktop"))]
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

fn load_config() -> anyhow::Result<Option<Config>> {
    let args = macroscrub::config::Args::parse();
    let config = Config::load(&args)?;

    // If --validate flag is set, exit successfully after config validation
    if args.validate {
        println!("Configuration is valid.");
        return Ok(None);
    }
    Ok(Some(config))
}

/// Headless mode: serve in the foreground and hand the URL to the system
/// browser after a short delay.
#[cfg(not(feature = "desktop"))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(config) = load_config()? else {
        return Ok(());
    };

    telemetry::init_telemetry()?;

    let open_browser = config.open_browser;
    let browser_delay = std::time::Duration::from_millis(config.browser_delay_ms);

    let app = Application::new(config).await?;
    if open_browser {
        macroscrub::shell::open_browser_later(app.local_url()?, browser_delay);
    }

    app.serve(shutdown_signal()).await
}

/// Desktop mode: the server runs on a background runtime task while the
/// main thread drives the native window event loop. Closing the window
/// ends the process.
#[cfg(feature = "desktop")]
fn main() -> anyhow::Result<()> {
    let Some(config) = load_config()? else {
        return Ok(());
    };

    telemetry::init_telemetry()?;

    let window = config.window.clone();
    let runtime = tokio::runtime::Runtime::new()?;

    let app = runtime.block_on(Application::new(config))?;
    let url = app.local_url()?;

    runtime.spawn(async move {
        // The window going away tears the whole process down; the server
        // just runs until then.
        if let Err(err) = app.serve(std::future::pending::<()>()).await {
            tracing::error!(error = %err, "server exited unexpectedly");
        }
    });

    macroscrub::shell::run_window(window, url)
}
