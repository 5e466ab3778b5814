use async_trait::async_trait;
use socialconnect_common::Result;

/// The operations the migration runner needs from a live database connection.
///
/// Implementations classify driver failures into `Error::Connectivity`,
/// `Error::AlreadyApplied` or `Error::Statement` so the runner can decide
/// whether to stop, recover or record a failure.
#[async_trait]
pub trait SchemaBackend: Send {
    async fn table_exists(&mut self, table: &str) -> Result<bool>;

    async fn column_exists(&mut self, table: &str, column: &str) -> Result<bool>;

    async fn constraint_exists(&mut self, table: &str, constraint: &str) -> Result<bool>;

    /// Number of rows in `table` whose `column` is NULL.
    async fn null_count(&mut self, table: &str, column: &str) -> Result<u64>;

    async fn begin(&mut self) -> Result<()>;

    async fn execute(&mut self, sql: &str) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Release the connection. Further calls on the backend fail.
    async fn close(&mut self) -> Result<()>;
}
