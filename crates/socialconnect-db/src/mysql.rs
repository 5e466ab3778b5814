use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use socialconnect_common::{Error, Result};
use socialconnect_config::DatabaseConfig;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;
use tracing::{debug, info};

use crate::backend::SchemaBackend;
use crate::classify::classify;

/// A single MySQL connection used for one migration run.
pub struct MySqlBackend {
    conn: Option<MySqlConnection>,
    schema: String,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl MySqlBackend {
    /// Connect to the configured database.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = connect_options(config).database(&config.database);
        let conn = open(config, &options).await?;
        info!(
            "connected to {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            conn: Some(conn),
            schema: config.database.clone(),
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
        })
    }

    /// Create the configured database if it does not exist yet, using a
    /// short-lived connection that is not bound to any schema.
    pub async fn ensure_database(config: &DatabaseConfig) -> Result<()> {
        let options = connect_options(config);
        let mut conn = open(config, &options).await?;

        // The name is validated as a plain identifier by DatabaseConfig::validate.
        let sql = format!(
            "CREATE DATABASE IF NOT EXISTS `{}` CHARACTER SET {}",
            config.database, config.charset
        );
        let result = bounded(
            config.write_timeout(),
            "CREATE DATABASE",
            sqlx::query(&sql).execute(&mut conn),
        )
        .await;

        if let Err(e) = conn.close().await {
            debug!("failed to close bootstrap connection: {e}");
        }
        result?;
        info!("database '{}' is present", config.database);
        Ok(())
    }

    fn conn(&mut self) -> Result<&mut MySqlConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| Error::Connectivity("connection already closed".into()))
    }

    async fn count(&mut self, what: &str, sql: &str, binds: &[&str]) -> Result<i64> {
        let limit = self.read_timeout;
        let mut query = sqlx::query_scalar::<_, i64>(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let conn = self.conn()?;
        bounded(limit, what, query.fetch_one(conn)).await
    }

    async fn run_statement(&mut self, what: &str, sql: &str) -> Result<()> {
        let limit = self.write_timeout;
        let conn = self.conn()?;
        bounded(limit, what, sqlx::query(sql).execute(conn)).await?;
        Ok(())
    }
}

fn connect_options(config: &DatabaseConfig) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .charset(&config.charset);
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    options
}

async fn open(config: &DatabaseConfig, options: &MySqlConnectOptions) -> Result<MySqlConnection> {
    debug!("connecting to {}:{}", config.host, config.port);
    bounded(
        config.connect_timeout(),
        "connect",
        MySqlConnection::connect_with(options),
    )
    .await
}

/// Await `fut` for at most `limit`. An elapsed timeout leaves the session in
/// an unknown state, so it is reported as a connectivity failure.
async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(classify),
        Err(_) => Err(Error::Connectivity(format!(
            "{what} timed out after {}s",
            limit.as_secs()
        ))),
    }
}

#[async_trait]
impl SchemaBackend for MySqlBackend {
    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        let schema = self.schema.clone();
        let n = self
            .count(
                "table lookup",
                "SELECT COUNT(*) FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?",
                &[schema.as_str(), table],
            )
            .await?;
        Ok(n > 0)
    }

    async fn column_exists(&mut self, table: &str, column: &str) -> Result<bool> {
        let schema = self.schema.clone();
        let n = self
            .count(
                "column lookup",
                "SELECT COUNT(*) FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND COLUMN_NAME = ?",
                &[schema.as_str(), table, column],
            )
            .await?;
        Ok(n > 0)
    }

    async fn constraint_exists(&mut self, table: &str, constraint: &str) -> Result<bool> {
        let schema = self.schema.clone();
        let n = self
            .count(
                "constraint lookup",
                "SELECT COUNT(*) FROM information_schema.TABLE_CONSTRAINTS \
                 WHERE CONSTRAINT_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = ?",
                &[schema.as_str(), table, constraint],
            )
            .await?;
        Ok(n > 0)
    }

    async fn null_count(&mut self, table: &str, column: &str) -> Result<u64> {
        // Identifiers come from a validated MigrationPlan.
        let sql = format!("SELECT COUNT(*) FROM `{table}` WHERE `{column}` IS NULL");
        let n = self.count("null count", &sql, &[]).await?;
        Ok(n.max(0) as u64)
    }

    async fn begin(&mut self) -> Result<()> {
        self.run_statement("START TRANSACTION", "START TRANSACTION").await
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.run_statement("statement", sql).await
    }

    async fn commit(&mut self) -> Result<()> {
        self.run_statement("COMMIT", "COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.run_statement("ROLLBACK", "ROLLBACK").await
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await.map_err(classify)?;
            debug!("mysql connection closed");
        }
        Ok(())
    }
}
