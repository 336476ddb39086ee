use docchat::{api, config, logging, service};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Ports scanned when `SERVER_PORT` is not set.
const PORT_RANGE: std::ops::RangeInclusive<u16> = 4800..=4899;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();

    let chat_service = service::ChatService::from_config().await;
    let app = api::create_router(Arc::new(chat_service));

    let (listener, port) = bind_listener().await.expect("Failed to bind listener");
    tracing::info!("DocChat listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.unwrap();
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        format!(
            "No available port found in range {}-{}",
            PORT_RANGE.start(),
            PORT_RANGE.end()
        ),
    ))
}
