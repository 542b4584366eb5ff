//! agora-web: JSON API server for the agora social content platform.

#[tokio::main]
async fn main() {
    agora::web::run().await;
}
