use std::path::PathBuf;

/// Default server port of the CommitDB SQL server.
pub const DEFAULT_PORT: u16 = 3306;

/// Configures connect timeout, read deadline and read chunk size.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Connect timeout in milliseconds.
    pub timeout_ms: u64,
    /// Deadline for each receive in milliseconds. `None` blocks indefinitely.
    pub read_timeout_ms: Option<u64>,
    /// Upper bound of a single socket read in bytes.
    pub chunk_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            read_timeout_ms: Some(10_000),
            chunk_size: 4096,
        }
    }
}

/// Which database the embedded library should open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmbeddedDatabase {
    /// Volatile in-memory repository.
    Memory,
    /// File-backed repository rooted at the given directory.
    File(PathBuf),
}

/// Selects one of the two transports. Chosen explicitly, never inferred.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionConfig {
    /// Line-delimited JSON over TCP.
    Remote { host: String, port: u16 },
    /// In-process calls into the CommitDB shared library.
    Embedded {
        library: PathBuf,
        database: EmbeddedDatabase,
    },
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::remote("localhost", DEFAULT_PORT)
    }
}

impl SessionConfig {
    pub fn remote(host: impl Into<String>, port: u16) -> Self {
        Self::Remote {
            host: host.into(),
            port,
        }
    }

    pub fn embedded(library: impl Into<PathBuf>, database: EmbeddedDatabase) -> Self {
        Self::Embedded {
            library: library.into(),
            database,
        }
    }

    /// Builds a config from environment variables.
    ///
    /// Reads:
    /// - `COMMITDB_LIBRARY`: path to the shared library; selects embedded mode
    /// - `COMMITDB_DATA_DIR`: optional data directory for embedded mode
    ///   (in-memory when unset)
    /// - `COMMITDB_HOST` / `COMMITDB_PORT`: remote server otherwise
    ///   (defaults `localhost` / `3306`)
    pub fn from_env() -> std::result::Result<Self, String> {
        if let Ok(library) = std::env::var("COMMITDB_LIBRARY") {
            if library.trim().is_empty() {
                return Err("COMMITDB_LIBRARY is set but empty".to_owned());
            }
            let database = match std::env::var("COMMITDB_DATA_DIR") {
                Ok(dir) if !dir.trim().is_empty() => EmbeddedDatabase::File(dir.into()),
                _ => EmbeddedDatabase::Memory,
            };
            return Ok(Self::embedded(library, database));
        }

        let host = std::env::var("COMMITDB_HOST").unwrap_or_else(|_| "localhost".to_owned());
        if host.trim().is_empty() {
            return Err("COMMITDB_HOST is set but empty".to_owned());
        }
        let port = match std::env::var("COMMITDB_PORT") {
            Ok(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|err| format!("COMMITDB_PORT '{raw}' is not a valid port: {err}"))?,
            Err(_) => DEFAULT_PORT,
        };
        Ok(Self::remote(host.trim(), port))
    }

    /// Human-readable target, used in errors and logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Remote { host, port } => format!("{host}:{port}"),
            Self::Embedded { library, database } => match database {
                EmbeddedDatabase::Memory => format!("{} (memory)", library.display()),
                EmbeddedDatabase::File(dir) => {
                    format!("{} ({})", library.display(), dir.display())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientOptions, EmbeddedDatabase, SessionConfig};

    #[test]
    fn defaults_match_driver_conventions() {
        let opts = ClientOptions::default();
        assert_eq!(opts.timeout_ms, 10_000);
        assert_eq!(opts.read_timeout_ms, Some(10_000));
        assert_eq!(opts.chunk_size, 4096);
        assert_eq!(SessionConfig::default(), SessionConfig::remote("localhost", 3306));
    }

    #[test]
    fn describe_names_the_target() {
        assert_eq!(SessionConfig::remote("db", 7000).describe(), "db:7000");
        let embedded = SessionConfig::embedded("/opt/libcommitdb.so", EmbeddedDatabase::Memory);
        assert_eq!(embedded.describe(), "/opt/libcommitdb.so (memory)");
    }
}
