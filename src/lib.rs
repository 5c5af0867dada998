//! `commitdb-client` is a blocking client for the CommitDB SQL engine.
//!
//! The same [`Session`] API drives either transport:
//! - a CommitDB server over TCP, one JSON response line per command
//! - the CommitDB shared library loaded into this process
//!
//! ```no_run
//! use commitdb_client::{Session, SessionConfig};
//!
//! # fn main() -> commitdb_client::Result<()> {
//! let mut session = Session::connect(SessionConfig::remote("localhost", 3306))?;
//! session.create_database("app")?;
//! let rows = session.query("SELECT * FROM app.users")?;
//! for row in &rows {
//!     println!("{:?}", row.get("name"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Branching and manual-resolution merges go through [`Session::merge_workflow`].

mod codec;
mod decode;
mod embedded;
mod error;
mod merge;
mod options;
mod remote;
mod session;
mod transport;
mod types;
mod value;
mod wire;

#[cfg(feature = "raw-mode")]
pub mod raw;

pub use codec::{encode_command, FrameDecoder, DELIMITER};
pub use embedded::EmbeddedTransport;
pub use error::{CommitDbError, UsageError};
pub use merge::{
    Branch, ConflictResolution, MergeConflict, MergeOutcome, MergeState, MergeWorkflow,
    ResolveOutcome,
};
pub use options::{ClientOptions, EmbeddedDatabase, SessionConfig, DEFAULT_PORT};
pub use remote::RemoteTransport;
pub use session::Session;
pub use transport::{open_transport, Transport};
pub use types::{AuthInfo, CommitResult, ExecuteResult, QueryResult, Row, Rows};
pub use value::Value;

pub type Result<T> = std::result::Result<T, CommitDbError>;
