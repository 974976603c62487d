use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        "mock OpenAM listening on http://{addr}{} (login {} / {})",
        mock_openam::BASE_PATH,
        mock_openam::ADMIN_USER,
        mock_openam::ADMIN_PASSWORD
    );
    mock_openam::run(listener).await
}
