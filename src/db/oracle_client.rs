//! Oracle client bootstrap and blocking query helpers.
//!
//! The Oracle client library is loaded once per process. `init_oracle_client`
//! reports whether this call did the work or found it already done; both are
//! success for the caller.

use crate::error::{AppError, AppResult};
use crate::models::{ConnectionDescriptor, ResultSet};
use oracle::sql_type::OracleType;
use oracle::{Connection, InitParams, Row};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

static CLIENT_READY: AtomicBool = AtomicBool::new(false);

/// Outcome of a client initialization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientInit {
    /// This call loaded the client library.
    Initialized,
    /// The library was loaded earlier in this process.
    AlreadyInitialized,
}

impl ClientInit {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Initialized)
    }
}

/// Initialize the Oracle client library, optionally from an explicit directory.
///
/// Safe to call any number of times.
pub fn init_oracle_client(lib_dir: Option<&Path>) -> AppResult<ClientInit> {
    let outcome = init_once(&CLIENT_READY, || {
        let mut params = InitParams::new();
        if let Some(dir) = lib_dir {
            params.oracle_client_lib_dir(dir)?;
        }
        Ok(params.init()?)
    })?;

    if outcome.is_fresh() {
        info!(lib_dir = ?lib_dir, "Oracle client initialized");
    } else {
        debug!("Oracle client already initialized");
    }
    Ok(outcome)
}

/// Run `init` unless `flag` says it already succeeded.
///
/// `init` returns `true` when it loaded the library and `false` when the
/// library reports it was loaded by someone else first.
fn init_once<F>(flag: &AtomicBool, init: F) -> AppResult<ClientInit>
where
    F: FnOnce() -> AppResult<bool>,
{
    if flag.load(Ordering::Acquire) {
        return Ok(ClientInit::AlreadyInitialized);
    }
    let fresh = init()?;
    // Another thread may have raced us here; only one sees `false -> true`.
    let first = flag
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok();
    Ok(if fresh && first {
        ClientInit::Initialized
    } else {
        ClientInit::AlreadyInitialized
    })
}

/// Open a connection using the easy-connect string `host:port/service`.
pub fn connect(descriptor: &ConnectionDescriptor) -> AppResult<Connection> {
    Connection::connect(
        &descriptor.user,
        &descriptor.password,
        descriptor.easy_connect(),
    )
    .map_err(AppError::from)
}

/// Execute one statement and fetch every row with its column names.
pub fn fetch_all(conn: &Connection, sql: &str) -> AppResult<ResultSet> {
    let rows = conn.query(sql, &[])?;
    let column_info = rows.column_info();
    let columns: Vec<String> = column_info.iter().map(|c| c.name().to_string()).collect();
    let types: Vec<OracleType> = column_info.iter().map(|c| c.oracle_type().clone()).collect();

    let mut result = ResultSet::with_columns(columns);
    for row in rows {
        let row = row?;
        let values = types
            .iter()
            .enumerate()
            .map(|(idx, ty)| decode_column(&row, idx, ty))
            .collect::<AppResult<Vec<_>>>()?;
        result.rows.push(values);
    }
    Ok(result)
}

fn decode_column(row: &Row, idx: usize, ty: &OracleType) -> AppResult<JsonValue> {
    let value = match ty {
        OracleType::BinaryFloat | OracleType::BinaryDouble | OracleType::Float(_) => row
            .get::<_, Option<f64>>(idx)?
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number),
        OracleType::Int64 => row
            .get::<_, Option<i64>>(idx)?
            .map(|v| JsonValue::Number(v.into())),
        OracleType::Number(_, _) => row
            .get::<_, Option<String>>(idx)?
            .map(|v| super::types::decimal_value(&v)),
        OracleType::Raw(_) | OracleType::LongRaw | OracleType::BLOB => row
            .get::<_, Option<Vec<u8>>>(idx)?
            .map(|v| super::types::binary_value(&v)),
        _ => row.get::<_, Option<String>>(idx)?.map(JsonValue::String),
    };
    Ok(value.unwrap_or(JsonValue::Null))
}
