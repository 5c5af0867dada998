use serde::de::DeserializeOwned;

use crate::{
    wire::{self, AuthPayload, CommitPayload, QueryPayload},
    AuthInfo, CommitDbError, CommitResult, ExecuteResult, QueryResult,
};

/// Fallback message when a failed envelope carries no `error` text.
const UNKNOWN_ERROR: &str = "unknown error";

/// Turns a decoded envelope into a typed result.
///
/// Unknown or missing `type` values yield an empty [`CommitResult`] rather than an error.
pub(crate) fn decode_execute_result(
    envelope: wire::Envelope,
    command: &str,
) -> Result<ExecuteResult, CommitDbError> {
    let envelope = ensure_success(envelope, command)?;

    match envelope.kind.as_deref() {
        Some("query") => {
            let payload: QueryPayload = decode_payload(envelope.result, command)?;
            decode_query_result(payload, command).map(ExecuteResult::Query)
        }
        Some("commit") => {
            let payload: CommitPayload = decode_payload(envelope.result, command)?;
            Ok(ExecuteResult::Commit(decode_commit_result(payload)))
        }
        _other => {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "unrecognised response type {:?} for '{}', reporting empty commit",
                _other,
                command
            );
            Ok(ExecuteResult::Commit(CommitResult::default()))
        }
    }
}

pub(crate) fn decode_auth_result(
    envelope: wire::Envelope,
    command: &str,
) -> Result<AuthInfo, CommitDbError> {
    let envelope = ensure_success(envelope, command)?;
    if envelope.kind.as_deref() != Some("auth") {
        return Err(CommitDbError::Protocol {
            command: command.to_owned(),
            message: format!(
                "expected auth response, got '{}'",
                envelope.kind.as_deref().unwrap_or("<none>")
            ),
        });
    }

    let payload: AuthPayload = decode_payload(envelope.result, command)?;
    Ok(AuthInfo {
        authenticated: payload.authenticated,
        identity: payload.identity,
        expires_in: payload.expires_in,
    })
}

/// Raises the server's error text verbatim when `success` is false.
pub(crate) fn ensure_success(
    envelope: wire::Envelope,
    command: &str,
) -> Result<wire::Envelope, CommitDbError> {
    if envelope.success {
        return Ok(envelope);
    }
    Err(CommitDbError::Server {
        command: command.to_owned(),
        message: envelope
            .error
            .unwrap_or_else(|| UNKNOWN_ERROR.to_owned()),
    })
}

pub(crate) fn decode_query_result(
    payload: QueryPayload,
    command: &str,
) -> Result<QueryResult, CommitDbError> {
    let columns = payload.columns.unwrap_or_default();
    let data = payload.data.unwrap_or_default();

    let width = columns.len();
    if let Some((index, row)) = data.iter().enumerate().find(|(_, row)| row.len() != width) {
        return Err(CommitDbError::Protocol {
            command: command.to_owned(),
            message: format!(
                "row {index} has {} cells but the result has {width} columns",
                row.len()
            ),
        });
    }

    Ok(QueryResult {
        columns,
        data,
        records_read: payload.records_read,
        time_ms: payload.time_ms,
    })
}

pub(crate) fn decode_commit_result(payload: CommitPayload) -> CommitResult {
    CommitResult {
        databases_created: payload.databases_created,
        databases_deleted: payload.databases_deleted,
        tables_created: payload.tables_created,
        tables_deleted: payload.tables_deleted,
        records_written: payload.records_written,
        records_deleted: payload.records_deleted,
        time_ms: payload.time_ms,
    }
}

/// Missing or `null` payloads decode to the all-default value.
fn decode_payload<T>(result: Option<serde_json::Value>, command: &str) -> Result<T, CommitDbError>
where
    T: DeserializeOwned + Default,
{
    match result {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|err| CommitDbError::Protocol {
            command: command.to_owned(),
            message: format!("invalid result payload: {err}"),
        }),
    }
}
