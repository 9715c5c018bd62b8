use mock_server::{Account, MockState, DEFAULT_SESSION_LENGTH};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let defaults = Account::default();
    let account = Account {
        client_code: std::env::var("MOCK_CLIENT_CODE").unwrap_or(defaults.client_code),
        username: std::env::var("MOCK_USERNAME").unwrap_or(defaults.username),
        password: std::env::var("MOCK_PASSWORD").unwrap_or(defaults.password),
    };
    let session_length = std::env::var("MOCK_SESSION_LENGTH")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_SESSION_LENGTH);

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, client_code = %account.client_code, session_length, "listening");
    mock_server::run_with_state(listener, MockState::new(account, session_length)).await
}
