//! Default route

use axum::response::Html;

/// GET / - landing banner
pub async fn root() -> Html<&'static str> {
    Html(
        "<div>\n<h1>Backend Server</h1>\n<p>Server is running successfully!</p>\n</div>",
    )
}
