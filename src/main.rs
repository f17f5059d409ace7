use shortly::{config, http, link_service::link_service_capsule};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let container = config::init_container().await?;
    let app = http::router(container.read(link_service_capsule));

    let listener = TcpListener::bind(container.read(config::addr_capsule)).await?;
    info!(addr = %listener.local_addr()?, "Started listening on TCP");
    axum::serve(listener, app).await?;
    Ok(())
}
