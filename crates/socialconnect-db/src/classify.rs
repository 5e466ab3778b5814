use socialconnect_common::Error;
use sqlx::mysql::MySqlDatabaseError;

/// MySQL server error numbers meaning "the object you tried to create exists".
const DUPLICATE_OBJECT_CODES: &[u16] = &[
    1007, // ER_DB_CREATE_EXISTS
    1022, // ER_DUP_KEY
    1050, // ER_TABLE_EXISTS_ERROR
    1060, // ER_DUP_FIELDNAME
    1061, // ER_DUP_KEYNAME
    1826, // ER_FK_DUP_NAME
];

/// Server and client error numbers meaning the session is unusable.
const CONNECTIVITY_CODES: &[u16] = &[
    1040, // ER_CON_COUNT_ERROR
    1044, // ER_DBACCESS_DENIED_ERROR
    1045, // ER_ACCESS_DENIED_ERROR
    1049, // ER_BAD_DB_ERROR
    1053, // ER_SERVER_SHUTDOWN
    1129, // ER_HOST_IS_BLOCKED
    1130, // ER_HOST_NOT_PRIVILEGED
    2002, // CR_CONNECTION_ERROR
    2003, // CR_CONN_HOST_ERROR
    2005, // CR_UNKNOWN_HOST
    2006, // CR_SERVER_GONE_ERROR
    2013, // CR_SERVER_LOST
    2055, // CR_SERVER_LOST_EXTENDED
    4031, // ER_CLIENT_INTERACTION_TIMEOUT
];

/// SQLSTATEs for "base table exists" and "column exists".
const DUPLICATE_OBJECT_STATES: &[&str] = &["42S01", "42S21"];

/// Map a driver error onto the migration error taxonomy.
pub fn classify(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Database(db) => {
            let number = db
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(MySqlDatabaseError::number);
            let sqlstate = db.code().map(|c| c.into_owned());
            classify_server_error(number, sqlstate.as_deref(), db.message())
        }
        sqlx::Error::Io(e) => Error::Connectivity(format!("i/o error: {e}")),
        sqlx::Error::Tls(e) => Error::Connectivity(format!("tls error: {e}")),
        sqlx::Error::Protocol(msg) => Error::Connectivity(format!("protocol error: {msg}")),
        e @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed) => {
            Error::Connectivity(e.to_string())
        }
        sqlx::Error::Configuration(e) => Error::Config(e.to_string()),
        other => Error::Statement(other.to_string()),
    }
}

/// Classify a server-reported error by its MySQL error number, SQLSTATE and
/// message text.
pub fn classify_server_error(
    number: Option<u16>,
    sqlstate: Option<&str>,
    message: &str,
) -> Error {
    let detail = match number {
        Some(n) => format!("{message} (error {n})"),
        None => message.to_string(),
    };

    if is_duplicate_object(number, sqlstate, message) {
        return Error::AlreadyApplied(detail);
    }
    let connection_class = sqlstate.is_some_and(|s| s.starts_with("08"));
    if connection_class || number.is_some_and(|n| CONNECTIVITY_CODES.contains(&n)) {
        return Error::Connectivity(detail);
    }
    Error::Statement(detail)
}

fn is_duplicate_object(number: Option<u16>, sqlstate: Option<&str>, message: &str) -> bool {
    if number.is_some_and(|n| DUPLICATE_OBJECT_CODES.contains(&n)) {
        return true;
    }
    if sqlstate.is_some_and(|s| DUPLICATE_OBJECT_STATES.contains(&s)) {
        return true;
    }
    // Older servers report a duplicate foreign key name as
    // "Can't create table ... (errno: 121)".
    number == Some(1005) && message.contains("errno: 121")
}
