//! Raw response passthrough.
//!
//! Enabled with the `raw-mode` feature. A successful envelope is returned as parsed JSON,
//! unmodified. `success: false` still raises [`CommitDbError::Server`].

use crate::{codec, decode::ensure_success, merge::Reply, CommitDbError, Result, Session};

/// One response line as the server sent it.
#[derive(Clone, Debug, PartialEq)]
pub struct RawEnvelope(pub serde_json::Value);

impl RawEnvelope {
    pub fn success(&self) -> bool {
        self.0
            .get("success")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(serde_json::Value::as_str)
    }

    pub fn error(&self) -> Option<&str> {
        self.0.get("error").and_then(serde_json::Value::as_str)
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.0.get("result")
    }

    fn reply(&self) -> Reply {
        match self.kind() {
            Some("query") => Reply::Query {
                rows: self
                    .result()
                    .and_then(|result| result.get("data"))
                    .and_then(serde_json::Value::as_array)
                    .map_or(0, Vec::len),
            },
            _ => Reply::Commit,
        }
    }
}

impl Session {
    /// Executes a command and returns the undecoded envelope.
    ///
    /// Connection and merge guards still apply, and the merge state follows the reply.
    pub fn execute_raw(&mut self, command: &str) -> Result<RawEnvelope> {
        let class = self.admit(command)?;
        let line = self.exchange(command, command)?;

        // The typed parse rejects malformed lines the same way `execute` does.
        let checked = codec::decode_envelope(&line, command)
            .and_then(|envelope| ensure_success(envelope, command));
        if let Err(err) = checked {
            self.track(class, Reply::Failed);
            return Err(err);
        }

        let value = serde_json::from_slice(&line).map_err(|err| CommitDbError::Protocol {
            command: command.to_owned(),
            message: format!("invalid response JSON: {err}"),
        })?;

        let envelope = RawEnvelope(value);
        self.track(class, envelope.reply());
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use crate::{codec::tests::ScriptedTransport, CommitDbError, MergeState, Session};

    #[test]
    fn raw_envelope_is_returned_unmodified() {
        let reply = r#"{"success":true,"type":"commit","result":{"records_written":2},"extra":[1,2]}"#;
        let mut session =
            Session::with_transport(Box::new(ScriptedTransport::with_replies([reply])));

        let raw = session.execute_raw("INSERT INTO a.b (id) VALUES (1)").expect("must execute");
        assert!(raw.success());
        assert_eq!(raw.kind(), Some("commit"));
        assert_eq!(raw.result().map(|r| r["records_written"].clone()), Some(serde_json::json!(2)));
        assert_eq!(raw.0["extra"], serde_json::json!([1, 2]));
    }

    #[test]
    fn raw_server_failure_is_raised() {
        let reply = r#"{"success":false,"error":"boom"}"#;
        let mut session =
            Session::with_transport(Box::new(ScriptedTransport::with_replies([reply])));

        let err = session.execute_raw("SELECT 1").expect_err("must fail");
        assert_eq!(err.server_message(), Some("boom"));
    }

    #[test]
    fn raw_manual_merge_tracks_state() {
        let reply = r#"{"success":true,"type":"query","result":{"columns":["Database","Table","Key"],"data":[["a","b","1"]]}}"#;
        let mut session =
            Session::with_transport(Box::new(ScriptedTransport::with_replies([reply])));

        let raw = session
            .execute_raw("MERGE feature WITH MANUAL RESOLUTION")
            .expect("must execute");
        assert_eq!(raw.kind(), Some("query"));
        assert_eq!(session.merge_state(), MergeState::Pending);
    }

    #[test]
    fn raw_rejects_malformed_line() {
        let mut session =
            Session::with_transport(Box::new(ScriptedTransport::with_replies(["{oops"])));
        let err = session.execute_raw("SELECT 1").expect_err("must fail");
        assert!(matches!(err, CommitDbError::Protocol { .. }));
    }
}
