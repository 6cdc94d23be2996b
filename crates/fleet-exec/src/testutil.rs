use std::net::SocketAddr;

use axum::{Router, routing::get};

/// Serve `router` on an ephemeral localhost port for the rest of the test.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A small artifact host with a few canned scripts.
pub fn scripts() -> Router {
    Router::new()
        .route("/ok.sh", get(|| async { "echo hello\n" }))
        .route("/boom.sh", get(|| async { "echo partial\necho boom >&2\n" }))
        .route("/exit3.sh", get(|| async { "echo bye\nexit 3\n" }))
        .route("/nested/dir/deep.sh", get(|| async { "printf deep\n" }))
        .route("/sleep.sh", get(|| async { "sleep 30\n" }))
        .route("/big.bin", get(|| async { vec![b'x'; 64 * 1024] }))
}
