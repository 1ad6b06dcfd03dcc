//! Page and health handlers.

use axum::extract::Query;
use axum::response::Html;
use serde::Deserialize;

/// Upload form page, embedded at compile time.
const INDEX_HTML: &str = include_str!("../../../static/index.html");

/// Placeholder in the page template that the flash block replaces.
const FLASH_PLACEHOLDER: &str = "{{flash}}";

#[derive(Debug, Deserialize)]
pub struct IndexParams {
    /// One-shot error message carried over a redirect from a failed upload.
    pub error: Option<String>,
}

/// `GET /` - render the upload form, with a flash box when the previous
/// request failed.
pub async fn index(Query(params): Query<IndexParams>) -> Html<String> {
    let flash = match params.error.as_deref() {
        Some(message) if !message.is_empty() => {
            format!(r#"<p class="flash" role="alert">{}</p>"#, html_escape(message))
        }
        _ => String::new(),
    };
    Html(INDEX_HTML.replace(FLASH_PLACEHOLDER, &flash))
}

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "OK"
}

/// Escape a string for interpolation into HTML text content.
fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;
    use axum_test::TestServer;

    fn create_test_router() -> Router {
        Router::new()
            .route("/", get(index))
            .route("/healthz", get(healthz))
    }

    #[tokio::test]
    async fn test_index_renders_upload_form() {
        let server = TestServer::new(create_test_router()).unwrap();

        let response = server.get("/").await;
        response.assert_status_ok();
        let body = response.text();
        assert!(body.contains("multipart/form-data"));
        assert!(body.contains(r#"name="file""#));
        // No flash box without an error parameter, and no leftover placeholder.
        assert!(!body.contains("class=\"flash\""));
        assert!(!body.contains("{{flash}}"));
    }

    #[tokio::test]
    async fn test_index_renders_flash_message() {
        let server = TestServer::new(create_test_router()).unwrap();

        let response = server.get("/").add_query_param("error", "No file selected").await;
        response.assert_status_ok();
        let body = response.text();
        assert!(body.contains("class=\"flash\""));
        assert!(body.contains("No file selected"));
    }

    #[tokio::test]
    async fn test_flash_message_is_html_escaped() {
        let server = TestServer::new(create_test_router()).unwrap();

        let response = server
            .get("/")
            .add_query_param("error", "<script>alert(1)</script>")
            .await;
        let body = response.text();
        assert!(!body.contains("<script>"));
        assert!(body.contains("&lt;script&gt;"));
    }

    #[tokio::test]
    async fn test_healthz() {
        let server = TestServer::new(create_test_router()).unwrap();

        let response = server.get("/healthz").await;
        response.assert_status_ok();
        assert_eq!(response.text(), "OK");
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }
}
