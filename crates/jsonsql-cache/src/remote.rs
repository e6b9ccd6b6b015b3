//! The remote execute capability.
//!
//! Transport, authentication and network retry live outside this crate. The
//! sync engine and the query client only need something that executes a
//! JSONSQL request and returns positional rows.

use std::sync::Arc;

use async_trait::async_trait;
use jsonsql_core::JsonSqlRequest;
use serde_json::Value;

/// Failure reported by the remote layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote API rejected the request.
    #[error("API error: {0}")]
    Api(String),

    /// The response was not a sequence of positional rows.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Executes JSONSQL requests against the remote API.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Executes `request` and returns the response body as sent by the API.
    async fn execute_raw(&self, request: &JsonSqlRequest) -> Result<Value, RemoteError>;

    /// Executes `request` and returns its rows, one positional array per row.
    ///
    /// The default reads the raw response with [`rows_from_value`].
    async fn execute(&self, request: &JsonSqlRequest) -> Result<Vec<Vec<Value>>, RemoteError> {
        rows_from_value(self.execute_raw(request).await?)
    }
}

#[async_trait]
impl<T: RemoteExecutor + ?Sized> RemoteExecutor for Arc<T> {
    async fn execute_raw(&self, request: &JsonSqlRequest) -> Result<Value, RemoteError> {
        (**self).execute_raw(request).await
    }

    async fn execute(&self, request: &JsonSqlRequest) -> Result<Vec<Vec<Value>>, RemoteError> {
        (**self).execute(request).await
    }
}

/// Converts a raw JSON result into positional rows.
///
/// Accepts either a bare array of arrays or an object carrying it under
/// `rows`, `data` or `result`. `null` is an empty result.
///
/// # Errors
///
/// Returns `RemoteError::InvalidResponse` for any other shape.
pub fn rows_from_value(value: Value) -> Result<Vec<Vec<Value>>, RemoteError> {
    let rows = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(rows) => rows,
        Value::Object(mut object) => {
            let inner = ["rows", "data", "result"]
                .iter()
                .find_map(|key| object.remove(*key))
                .ok_or_else(|| {
                    RemoteError::InvalidResponse(String::from("object without rows"))
                })?;
            return rows_from_value(inner);
        }
        other => {
            return Err(RemoteError::InvalidResponse(format!(
                "expected an array of rows, got {other}"
            )))
        }
    };

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| match row {
            Value::Array(values) => Ok(values),
            other => Err(RemoteError::InvalidResponse(format!(
                "row {i} is not an array: {other}"
            ))),
        })
        .collect()
}
