use std::{
    env::{self, VarError},
    path::PathBuf,
    sync::Arc,
};

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

    info!(?db_connection_options, "Connecting to database");
    set_db_conn(Database::connect(db_connection_options).await?);

    info!("Container initialized");
    Ok(container)
}

/// # Panics
/// Panics when environment variable is not set or is invalid.
#[must_use]
pub fn db_connection_options_capsule(_: CapsuleHandle) -> ConnectOptions {
    const ENV_VAR_NAME: &str = "DB_URL";
    env::var(ENV_VAR_NAME)
        .unwrap_or_else(|err| match err {
            VarError::NotPresent => panic!("{ENV_VAR_NAME} is not set"),
            VarError::NotUnicode(actual) => {
                panic!("{ENV_VAR_NAME} is invalid unicode: {}", actual.display());
            }
        })
        .into()
}

fn db_conn_manager(
    CapsuleHandle { register, .. }: CapsuleHandle,
) -> (
    Option<Arc<DbConn>>,
    impl use<> + CData + Fn(Option<Arc<DbConn>>),
) {
    register.register(rearch_effects::state::<rearch_effects::Cloned<_>>(None))
}

pub fn db_conn_init_action(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> impl use<> + CData + Fn(DbConn) {
    let set_db_conn = get.as_ref(db_conn_manager).1.clone();
    move |db| set_db_conn(Some(Arc::new(db)))
}

/// # Panics
/// Panics when the [`DbConn`] was not set via [`db_conn_init_action`].
pub fn db_conn_capsule(CapsuleHandle { mut get, .. }: CapsuleHandle) -> Arc<DbConn> {
    let db_conn = get.as_ref(db_conn_manager).0.clone();
    db_conn.expect("DbConn should've been set via db_conn_init_action!")
}

/// Reads an optional environment variable, falling back to `default` with a warning.
///
/// # Panics
/// Panics when the environment variable is not valid unicode.
fn env_var_or(name: &str, default: &str) -> String {
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

/// # Panics
/// Panics when environment variable is invalid.
pub fn addr_capsule(_: CapsuleHandle) -> String {
    env_var_or("ADDR", "127.0.0.1:0")
}

/// Public origin that short links are built against, e.g. `https://foodgram.example`.
///
/// # Panics
/// Panics when environment variable is invalid or is not an absolute URL.
pub fn base_url_capsule(_: CapsuleHandle) -> Url {
    const ENV_VAR_NAME: &str = "BASE_URL";
    let raw = env_var_or(ENV_VAR_NAME, "http://localhost");
    Url::parse(&raw).unwrap_or_else(|err| panic!("{ENV_VAR_NAME} is not a valid URL: {err}"))
}

/// Directory holding `fonts/Roboto-Regular.ttf` and `logo_foodgram.png`.
///
/// # Panics
/// Panics when environment variable is invalid.
pub fn media_root_capsule(_: CapsuleHandle) -> PathBuf {
    env_var_or("MEDIA_ROOT", "media").into()
}
