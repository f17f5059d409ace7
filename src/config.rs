use std::env::{self, VarError};

use rearch::{CData, CapsuleHandle, Container};
use sea_orm::{ConnectOptions, Database, DbConn};
use tracing::{info, instrument, warn};
use url::Url;

/// # Errors
/// Will return [`Err`] if the connection to the database fails.
#[instrument]
pub async fn init_container() -> anyhow::Result<Container> {
    info!("Initializing container");
    let container = Container::new();

    let (db_connection_options, set_db_conn) =
        container.read((db_connection_options_capsule, db_conn_init_action));

    if let Some(db_connection_options) = db_connection_options {
        info!("Connecting to database");
        set_db_conn(Database::connect(db_connection_options).await?);
    }

    info!("Container initialized");
    Ok(container)
}

/// Returns [`None`] when no database is configured.
///
/// # Panics
/// Panics when environment variable is invalid.
#[must_use]
pub fn db_connection_options_capsule(_: CapsuleHandle) -> Option<ConnectOptions> {
    const ENV_VAR_NAME: &str = "DB_URL";
    match env::var(ENV_VAR_NAME) {
        Ok(db_url) => Some(db_url.into()),
        Err(VarError::NotPresent) => {
            warn!("{ENV_VAR_NAME} environment variable not set; using in-memory link storage");
            None
        }
        Err(VarError::NotUnicode(actual)) => {
            panic!("{ENV_VAR_NAME} is invalid unicode: {}", actual.display());
        }
    }
}

fn db_conn_manager(
    CapsuleHandle { register, .. }: CapsuleHandle,
) -> (Option<DbConn>, impl use<> + CData + Fn(Option<DbConn>)) {
    register.register(rearch_effects::state::<rearch_effects::Cloned<_>>(None))
}

pub fn db_conn_init_action(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> impl use<> + CData + Fn(DbConn) {
    let set_db_conn = get.as_ref(db_conn_manager).1.clone();
    move |db| set_db_conn(Some(db))
}

/// The [`DbConn`] set via [`db_conn_init_action`], if any.
pub fn db_conn_capsule(CapsuleHandle { mut get, .. }: CapsuleHandle) -> Option<DbConn> {
    get.as_ref(db_conn_manager).0.clone()
}

/// # Panics
/// Panics when environment variable is invalid.
pub fn addr_capsule(_: CapsuleHandle) -> String {
    env_var_or_default("ADDR", "127.0.0.1:0")
}

/// Prefix that a key is appended to in order to form the short URL.
///
/// # Panics
/// Panics when environment variable is invalid or is not an absolute URL.
pub fn short_url_base_capsule(_: CapsuleHandle) -> String {
    const ENV_VAR_NAME: &str = "SHORT_URL_BASE";
    let base = env_var_or_default(ENV_VAR_NAME, "http://short.ly/");
    if let Err(parse_error) = Url::parse(&base) {
        panic!("{ENV_VAR_NAME} environment variable is not a valid URL: {parse_error}");
    }
    if !base.ends_with('/') {
        warn!(base, "{ENV_VAR_NAME} does not end with '/'; keys will be appended directly");
    }
    base
}

/// Upper bound on salted attempts the key allocator makes per URL.
///
/// # Panics
/// Panics when environment variable is invalid or is not a positive integer.
pub fn max_allocation_attempts_capsule(_: CapsuleHandle) -> u32 {
    const ENV_VAR_NAME: &str = "MAX_ALLOCATION_ATTEMPTS";
    let attempts = env_var_or_default(ENV_VAR_NAME, "16");
    match attempts.parse() {
        Ok(attempts) if attempts > 0 => attempts,
        _ => panic!("{ENV_VAR_NAME} environment variable must be a positive integer: {attempts}"),
    }
}

fn env_var_or_default(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(value) => {
            info!(value, "{name} environment variable set");
            value
        }
        Err(VarError::NotPresent) => {
            warn!(
                value = default,
                "{name} environment variable not set; defaulting to {default}"
            );
            default.to_owned()
        }
        Err(VarError::NotUnicode(actual)) => {
            panic!(
                "{name} environment variable is invalid: {}",
                actual.display()
            );
        }
    }
}
