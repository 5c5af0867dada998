use std::{
    fmt,
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use crate::{transport::Transport, ClientOptions, CommitDbError, Result};

/// TCP transport speaking the newline-delimited protocol.
pub struct RemoteTransport {
    stream: Option<TcpStream>,
    peer: SocketAddr,
    chunk_size: usize,
}

impl fmt::Debug for RemoteTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTransport")
            .field("peer", &self.peer)
            .field("open", &self.stream.is_some())
            .finish()
    }
}

impl RemoteTransport {
    /// Connects to `host:port`, trying every resolved address within the connect timeout.
    pub fn connect(host: &str, port: u16, options: &ClientOptions) -> Result<Self> {
        let address = format!("{host}:{port}");
        let connection_error = |source: io::Error| CommitDbError::Connection {
            address: address.clone(),
            source,
        };

        let timeout = Duration::from_millis(options.timeout_ms.max(1));
        let candidates = (host, port).to_socket_addrs().map_err(connection_error)?;

        let mut last_err = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    let read_timeout = options
                        .read_timeout_ms
                        .map(|ms| Duration::from_millis(ms.max(1)));
                    stream.set_read_timeout(read_timeout).map_err(connection_error)?;
                    stream.set_nodelay(true).map_err(connection_error)?;

                    #[cfg(feature = "tracing")]
                    tracing::debug!("connected to {} ({})", address, candidate);

                    return Ok(Self {
                        stream: Some(stream),
                        peer: candidate,
                        chunk_size: options.chunk_size.max(1),
                    });
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(connection_error(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        })))
    }

    /// Address of the connected server.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport is closed"))
    }
}

impl Transport for RemoteTransport {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let stream = self.stream()?;
        stream.write_all(frame)?;
        stream.flush()
    }

    fn receive_chunk(&mut self) -> io::Result<Vec<u8>> {
        let mut chunk = vec![0u8; self.chunk_size];
        let read = loop {
            match self.stream()?.read(&mut chunk) {
                Ok(read) => break read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        };
        chunk.truncate(read);
        Ok(chunk)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);

            #[cfg(feature = "tracing")]
            tracing::debug!("closed connection to {}", self.peer);
        }
    }
}

impl Drop for RemoteTransport {
    fn drop(&mut self) {
        self.close();
    }
}
