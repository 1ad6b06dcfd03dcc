//! Hosting shells for the web UI.
//!
//! Headless builds point the system browser at the local URL once the
//! listener is up. With the `desktop` cargo feature the page is hosted in a
//! native window instead; the window closing ends the process.

use std::time::Duration;

use tracing::{info, warn};

/// Spawn a task that opens the system browser at `url` after `delay`.
///
/// The delay gives the accept loop a moment to start so the browser's first
/// request doesn't race the server. A failed launch is not fatal; the URL is
/// logged so the user can open it by hand.
pub fn open_browser_later(url: String, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match open_browser(&url) {
            Ok(()) => info!(%url, "opened system browser"),
            Err(err) => warn!(%url, error = %err, "could not open a browser; open the URL manually"),
        }
    });
}

fn open_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    let status = std::process::Command::new("open").arg(url).status()?;

    #[cfg(target_os = "windows")]
    let status = std::process::Command::new("cmd")
        .args(["/C", "start", "", url])
        .status()?;

    #[cfg(all(unix, not(target_os = "macos")))]
    let status = std::process::Command::new("xdg-open").arg(url).status()?;

    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!(
            "browser launcher exited with {status}"
        )))
    }
}

/// Host the UI in a native window pointed at the local URL.
///
/// Runs the window event loop on the calling thread (platform webviews
/// require the main thread) and returns when the window is closed.
#[cfg(feature = "desktop")]
pub fn run_window(window: crate::config::WindowConfig, url: String) -> anyhow::Result<()> {
    use anyhow::Context;
    use tauri::{WebviewUrl, WebviewWindowBuilder};

    tauri::Builder::default()
        .setup(move |app| {
            let external: tauri::Url = url.parse()?;
            WebviewWindowBuilder::new(app, "main", WebviewUrl::External(external))
                .title(&window.title)
                .inner_size(window.width, window.height)
                .min_inner_size(window.min_width, window.min_height)
                .resizable(window.resizable)
                .build()?;
            Ok(())
        })
        .run(tauri::generate_context!())
        .context("error while running the native window")
}
