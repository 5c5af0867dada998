//! Byte-in/byte-out transports.
//!
//! [`Transport`] is the seam between the session and the server. It has exactly two
//! implementations, picked by [`SessionConfig`](crate::SessionConfig):
//! - [`RemoteTransport`](crate::RemoteTransport): TCP socket
//! - [`EmbeddedTransport`](crate::EmbeddedTransport): in-process shared library
//!
//! No transport retries anything.

use std::io;

use crate::{
    codec::QUIT_FRAME, ClientOptions, CommitDbError, EmbeddedTransport, RemoteTransport, Result,
    SessionConfig,
};

/// A bidirectional, half-duplex byte channel to a CommitDB engine.
///
/// Implementations are driven by one caller at a time; a transport shared across
/// threads must be serialized externally.
pub trait Transport: Send {
    /// Writes one framed request in full.
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Returns the next chunk of response bytes.
    ///
    /// An empty chunk means the peer has closed the stream.
    fn receive_chunk(&mut self) -> io::Result<Vec<u8>>;

    /// Best-effort graceful termination before [`Transport::close`].
    fn terminate(&mut self) -> io::Result<()> {
        self.send(QUIT_FRAME)
    }

    /// Releases the underlying resource. Must be safe to call more than once.
    fn close(&mut self);
}

/// Opens the transport selected by `config`.
pub fn open_transport(
    config: &SessionConfig,
    options: &ClientOptions,
) -> Result<Box<dyn Transport>> {
    let transport: Box<dyn Transport> = match config {
        SessionConfig::Remote { host, port } => {
            Box::new(RemoteTransport::connect(host, *port, options)?)
        }
        SessionConfig::Embedded { library, database } => {
            Box::new(EmbeddedTransport::load(library, database)?)
        }
    };

    #[cfg(feature = "tracing")]
    tracing::debug!("opened transport to {}", config.describe());

    Ok(transport)
}

pub(crate) fn io_to_transport_error(command: &str, err: io::Error) -> CommitDbError {
    CommitDbError::Transport {
        command: command.to_owned(),
        source: err,
    }
}
