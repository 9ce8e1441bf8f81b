use anyhow::Context;
use foodgram::{config, schema::create_schema};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let container = config::init_container().await?;

    create_schema(&container.read(config::db_conn_capsule))
        .await
        .context("Failed to create database schema")
}
