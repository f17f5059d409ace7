use std::env;

use anyhow::bail;
use sea_orm::DbConn;
use shortly::{config, link_service::link_service_capsule};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let keys: Vec<String> = env::args().skip(1).collect();
    if keys.is_empty() {
        bail!("Usage: link-revoke KEY...");
    }

    let container = config::init_container().await?;
    ensure_database(container.read(config::db_conn_capsule).as_ref())?;
    let link_service = container.read(link_service_capsule);

    let mut failures = 0;
    for key in &keys {
        match link_service.revoke(key).await {
            Ok(()) => info!(key, "Revoked link"),
            Err(err) => {
                error!(key, %err, "Failed to revoke link");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("Failed to revoke {failures} of {} links", keys.len());
    }
    Ok(())
}

/// Revoking from a fresh in-memory store would always report `not_found`.
fn ensure_database(db: Option<&DbConn>) -> anyhow::Result<()> {
    if db.is_none() {
        bail!("DB_URL must be set to revoke links");
    }
    Ok(())
}
