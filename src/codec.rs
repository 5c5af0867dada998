//! Newline framing for requests and responses.
//!
//! A request is the raw command text followed by `\n`. A response is one JSON object
//! followed by `\n`. Responses may arrive split across any number of reads, and a read may
//! carry bytes past the delimiter; those are kept for the next frame.

use crate::{
    transport::{io_to_transport_error, Transport},
    wire, CommitDbError, Result, UsageError,
};

/// Frame delimiter for both directions.
pub const DELIMITER: u8 = b'\n';

/// Graceful termination sentinel understood by the server.
pub(crate) const QUIT_FRAME: &[u8] = b"quit\n";

/// How many characters of an undecodable body are quoted in a protocol error.
const BODY_EXCERPT_LEN: usize = 256;

/// Frames `command` for the wire.
///
/// Commands containing the delimiter cannot be framed; no escaping exists.
pub fn encode_command(command: &str) -> std::result::Result<Vec<u8>, UsageError> {
    if command.as_bytes().contains(&DELIMITER) {
        return Err(UsageError::InvalidCommand {
            reason: "command must not contain a newline".to_owned(),
        });
    }

    let mut frame = Vec::with_capacity(command.len() + 1);
    frame.extend_from_slice(command.as_bytes());
    frame.push(DELIMITER);
    Ok(frame)
}

/// Accumulates response bytes and yields complete frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk received from the transport.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Splits off the first complete frame, without its delimiter.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let end = self.buffer.iter().position(|byte| *byte == DELIMITER)?;
        let mut frame: Vec<u8> = self.buffer.drain(..=end).collect();
        frame.pop();
        Some(frame)
    }

    /// Bytes received but not yet returned as a frame.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Reads from `transport` until one full frame is available.
    ///
    /// A closed stream before the delimiter is [`CommitDbError::ConnectionClosed`].
    pub fn read_frame<T>(&mut self, transport: &mut T, command: &str) -> Result<Vec<u8>>
    where
        T: Transport + ?Sized,
    {
        loop {
            if let Some(frame) = self.next_frame() {
                return Ok(frame);
            }

            let chunk = transport
                .receive_chunk()
                .map_err(|err| io_to_transport_error(command, err))?;
            if chunk.is_empty() {
                return Err(CommitDbError::ConnectionClosed {
                    command: command.to_owned(),
                });
            }

            #[cfg(feature = "tracing")]
            tracing::trace!(
                "received {} bytes ({} buffered)",
                chunk.len(),
                self.buffer.len()
            );

            self.push(&chunk);
        }
    }
}

/// Parses one frame into a response envelope.
pub fn decode_envelope(frame: &[u8], command: &str) -> Result<wire::Envelope> {
    serde_json::from_slice::<wire::Envelope>(frame).map_err(|err| CommitDbError::Protocol {
        command: command.to_owned(),
        message: format!("invalid response JSON: {err}; body: {}", excerpt(frame)),
    })
}

fn excerpt(frame: &[u8]) -> String {
    let text = String::from_utf8_lossy(frame);
    if text.chars().count() <= BODY_EXCERPT_LEN {
        return text.into_owned();
    }
    let mut cut: String = text.chars().take(BODY_EXCERPT_LEN).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::VecDeque,
        io,
        sync::{Arc, Mutex},
    };

    use super::{decode_envelope, encode_command, FrameDecoder};
    use crate::{transport::Transport, CommitDbError, UsageError};

    /// Transport replaying scripted chunks; records every frame sent.
    ///
    /// The log is shared so tests can inspect it after handing the transport to a session.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedTransport {
        pub chunks: VecDeque<io::Result<Vec<u8>>>,
        pub log: Arc<Mutex<TransportLog>>,
        pub fail_send: bool,
    }

    #[derive(Debug, Default)]
    pub(crate) struct TransportLog {
        pub sent: Vec<Vec<u8>>,
        pub closed: usize,
    }

    impl ScriptedTransport {
        pub fn with_chunks<I, C>(chunks: I) -> Self
        where
            I: IntoIterator<Item = C>,
            C: Into<Vec<u8>>,
        {
            Self {
                chunks: chunks.into_iter().map(|chunk| Ok(chunk.into())).collect(),
                ..Self::default()
            }
        }

        /// One newline-terminated chunk per reply.
        pub fn with_replies<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: AsRef<str>,
        {
            Self::with_chunks(
                replies
                    .into_iter()
                    .map(|reply| format!("{}\n", reply.as_ref()).into_bytes()),
            )
        }

        pub fn sent_commands(log: &Arc<Mutex<TransportLog>>) -> Vec<String> {
            log.lock()
                .expect("log mutex must not be poisoned")
                .sent
                .iter()
                .map(|frame| String::from_utf8_lossy(frame).into_owned())
                .collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&mut self, frame: &[u8]) -> io::Result<()> {
            if self.fail_send {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted failure"));
            }
            self.log
                .lock()
                .expect("log mutex must not be poisoned")
                .sent
                .push(frame.to_vec());
            Ok(())
        }

        fn receive_chunk(&mut self) -> io::Result<Vec<u8>> {
            self.chunks.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }

        fn close(&mut self) {
            self.log.lock().expect("log mutex must not be poisoned").closed += 1;
        }
    }

    #[test]
    fn encode_appends_single_newline() {
        let frame = encode_command("SELECT * FROM db.t").expect("must encode");
        assert_eq!(frame, b"SELECT * FROM db.t\n");
    }

    #[test]
    fn encode_rejects_embedded_newline() {
        let err = encode_command("SELECT 1\nDROP DATABASE db").expect_err("must reject");
        assert!(matches!(err, UsageError::InvalidCommand { .. }));
    }

    #[test]
    fn frame_split_across_three_chunks() {
        let mut transport = ScriptedTransport::with_chunks([
            &b"{\"success\":tr"[..],
            &b"ue,\"type\":\"com"[..],
            &b"mit\",\"result\":{}}\n{\"succ"[..],
        ]);
        let mut decoder = FrameDecoder::new();

        let frame = decoder
            .read_frame(&mut transport, "CREATE DATABASE db")
            .expect("must assemble frame");
        assert_eq!(frame, br#"{"success":true,"type":"commit","result":{}}"#);
        assert_eq!(decoder.buffered(), b"{\"succ");
        assert!(transport.chunks.is_empty());
    }

    #[test]
    fn buffered_frame_is_returned_without_reading() {
        let mut transport = ScriptedTransport::default();
        let mut decoder = FrameDecoder::new();
        decoder.push(b"first\nsecond\n");

        assert_eq!(decoder.read_frame(&mut transport, "x").expect("first"), b"first");
        assert_eq!(decoder.read_frame(&mut transport, "x").expect("second"), b"second");
        assert!(decoder.buffered().is_empty());
    }

    #[test]
    fn close_before_delimiter_is_connection_closed() {
        let mut transport = ScriptedTransport::with_chunks([&b"{\"success\":true"[..]]);
        let mut decoder = FrameDecoder::new();

        let err = decoder
            .read_frame(&mut transport, "SHOW DATABASES")
            .expect_err("must fail");
        assert!(matches!(
            err,
            CommitDbError::ConnectionClosed { ref command } if command == "SHOW DATABASES"
        ));
    }

    #[test]
    fn read_failure_is_transport_error() {
        let mut transport = ScriptedTransport::default();
        transport
            .chunks
            .push_back(Err(io::Error::new(io::ErrorKind::TimedOut, "deadline")));
        let mut decoder = FrameDecoder::new();

        let err = decoder.read_frame(&mut transport, "SELECT 1").expect_err("must fail");
        assert!(matches!(err, CommitDbError::Transport { .. }));
    }

    #[test]
    fn truncated_json_is_protocol_error() {
        let err = decode_envelope(br#"{"success":true,"type":"query","result":{"colu"#, "q")
            .expect_err("must fail");
        match err {
            CommitDbError::Protocol { command, message } => {
                assert_eq!(command, "q");
                assert!(message.contains("invalid response JSON"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_object_json_is_protocol_error() {
        let err = decode_envelope(b"[1,2,3]", "q").expect_err("must fail");
        assert!(matches!(err, CommitDbError::Protocol { .. }));
    }

    #[test]
    fn invalid_utf8_is_protocol_error() {
        let err = decode_envelope(b"{\"success\":\xff}", "q").expect_err("must fail");
        assert!(matches!(err, CommitDbError::Protocol { .. }));
    }
}
