use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Opens the underlying store connection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: Clone + Send + Sync + 'static;

    async fn connect(&self) -> anyhow::Result<Self::Conn>;
}

/// A connection created on first use and shared afterwards.
///
/// Callers arriving while the first attempt is still pending wait on that
/// same attempt instead of opening their own. A failed attempt leaves the
/// cell empty, so the next caller tries again.
pub struct SharedConnection<C: Connector> {
    connector: C,
    cell: OnceCell<C::Conn>,
}

impl<C: Connector> SharedConnection<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            cell: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> anyhow::Result<C::Conn> {
        if let Some(conn) = self.cell.get() {
            return Ok(conn.clone());
        }
        let conn = self
            .cell
            .get_or_try_init(|| async {
                debug!("opening store connection");
                self.connector.connect().await
            })
            .await?;
        Ok(conn.clone())
    }
}

pub struct PgConnector {
    pub url: String,
    pub max_connections: u32,
}

#[async_trait]
impl Connector for PgConnector {
    type Conn = PgPool;

    async fn connect(&self) -> anyhow::Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&self.url)
            .await
            .context("connect to database")?;
        info!(max_connections = self.max_connections, "database pool ready");
        Ok(pool)
    }
}

pub type PgConnection = SharedConnection<PgConnector>;
