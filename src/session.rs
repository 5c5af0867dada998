use std::fmt;

use crate::{
    codec::{decode_envelope, encode_command, FrameDecoder},
    decode::{decode_auth_result, decode_execute_result},
    merge::{branches_from, Branch, CommandClass, MergeState, MergeWorkflow, Reply},
    transport::{io_to_transport_error, open_transport, Transport},
    wire, AuthInfo, ClientOptions, CommitResult, ExecuteResult, QueryResult, Result,
    SessionConfig, UsageError, Value,
};

/// One logical connection to a CommitDB engine.
///
/// A session is created closed, opened with [`Session::open`] (or [`Session::connect`]) and
/// closed with [`Session::close`]. Dropping an open session closes it.
///
/// Requests are strictly one at a time: [`Session::execute`] blocks until the full reply line
/// has arrived. `Session` is `Send` but not `Sync`; to share one across threads, wrap it in a
/// `Mutex`.
pub struct Session {
    config: SessionConfig,
    options: ClientOptions,
    transport: Option<Box<dyn Transport>>,
    decoder: FrameDecoder,
    merge_state: MergeState,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.config.describe())
            .field("options", &self.options)
            .field("open", &self.is_open())
            .field("buffered", &self.decoder.buffered().len())
            .field("merge_state", &self.merge_state)
            .finish()
    }
}

impl Session {
    /// Creates a closed session.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            options: ClientOptions::default(),
            transport: None,
            decoder: FrameDecoder::new(),
            merge_state: MergeState::Clean,
        }
    }

    /// Creates a closed session configured from `COMMITDB_*` environment variables.
    ///
    /// See [`SessionConfig::from_env`].
    pub fn from_env() -> std::result::Result<Self, String> {
        SessionConfig::from_env().map(Self::new)
    }

    /// Creates and opens a session.
    pub fn connect(config: SessionConfig) -> Result<Self> {
        Self::connect_with(config, ClientOptions::default())
    }

    pub fn connect_with(config: SessionConfig, options: ClientOptions) -> Result<Self> {
        let mut session = Self::new(config).with_options(options);
        session.open()?;
        Ok(session)
    }

    /// Opens a session, runs `body`, and closes the session on every exit path.
    pub fn scoped<T, F>(config: SessionConfig, options: ClientOptions, body: F) -> Result<T>
    where
        F: FnOnce(&mut Session) -> Result<T>,
    {
        let mut session = Self::connect_with(config, options)?;
        let outcome = body(&mut session);
        session.close();
        outcome
    }

    /// Applies client options such as timeouts. Takes effect on the next `open`.
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Local view of the server's merge state.
    pub fn merge_state(&self) -> MergeState {
        self.merge_state
    }

    /// Establishes the transport. Fails if the session is already open.
    pub fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(UsageError::AlreadyOpen.into());
        }

        let transport = open_transport(&self.config, &self.options)?;
        self.transport = Some(transport);
        self.decoder.clear();
        self.merge_state = MergeState::Clean;
        Ok(())
    }

    /// Sends the `quit` sentinel (best effort), then releases the transport.
    ///
    /// A no-op on a closed session.
    pub fn close(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };

        if let Err(_err) = transport.terminate() {
            #[cfg(feature = "tracing")]
            tracing::debug!("ignoring failed quit sentinel: {}", _err);
        }
        transport.close();
        self.decoder.clear();
        self.merge_state = MergeState::Clean;

        #[cfg(feature = "tracing")]
        tracing::debug!("closed session to {}", self.config.describe());
    }

    /// Executes one command and returns its typed result.
    ///
    /// Server rejections surface as [`CommitDbError::Server`](crate::CommitDbError::Server)
    /// with the server's text unmodified.
    pub fn execute(&mut self, command: &str) -> Result<ExecuteResult> {
        let class = self.admit(command)?;

        let outcome = self
            .round_trip(command, command)
            .and_then(|envelope| decode_execute_result(envelope, command));

        self.track(class, Reply::of(&outcome));
        outcome
    }

    /// Executes a read; fails if the server replied with a commit result.
    pub fn query(&mut self, command: &str) -> Result<QueryResult> {
        match self.execute(command)? {
            ExecuteResult::Query(result) => Ok(result),
            ExecuteResult::Commit(_) => Err(UsageError::UnexpectedResult {
                expected: "query",
                actual: "commit",
            }
            .into()),
        }
    }

    /// Executes a mutation; fails if the server replied with rows.
    pub fn execute_mutation(&mut self, command: &str) -> Result<CommitResult> {
        match self.execute(command)? {
            ExecuteResult::Commit(result) => Ok(result),
            ExecuteResult::Query(_) => Err(UsageError::UnexpectedResult {
                expected: "commit",
                actual: "query",
            }
            .into()),
        }
    }

    pub fn create_database(&mut self, name: &str) -> Result<CommitResult> {
        self.execute_mutation(&format!("CREATE DATABASE {name}"))
    }

    pub fn drop_database(&mut self, name: &str) -> Result<CommitResult> {
        self.execute_mutation(&format!("DROP DATABASE {name}"))
    }

    /// `columns` is the raw column list, e.g. `"id INT PRIMARY KEY, name STRING"`.
    pub fn create_table(
        &mut self,
        database: &str,
        table: &str,
        columns: &str,
    ) -> Result<CommitResult> {
        self.execute_mutation(&format!("CREATE TABLE {database}.{table} ({columns})"))
    }

    pub fn drop_table(&mut self, database: &str, table: &str) -> Result<CommitResult> {
        self.execute_mutation(&format!("DROP TABLE {database}.{table}"))
    }

    /// Inserts one row. Text values are single-quoted, nothing is escaped.
    pub fn insert<I, V>(
        &mut self,
        database: &str,
        table: &str,
        columns: &[&str],
        values: I,
    ) -> Result<CommitResult>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values
            .into_iter()
            .map(|value| value.into().to_literal())
            .collect::<Vec<_>>()
            .join(", ");
        self.execute_mutation(&format!(
            "INSERT INTO {database}.{table} ({}) VALUES ({values})",
            columns.join(", ")
        ))
    }

    pub fn show_databases(&mut self) -> Result<Vec<String>> {
        self.first_column("SHOW DATABASES")
    }

    pub fn show_tables(&mut self, database: &str) -> Result<Vec<String>> {
        self.first_column(&format!("SHOW TABLES IN {database}"))
    }

    pub fn show_branches(&mut self) -> Result<Vec<Branch>> {
        let result = self.query("SHOW BRANCHES")?;
        Ok(branches_from(&result))
    }

    /// Branch and merge helpers bound to this session.
    pub fn merge_workflow(&mut self) -> MergeWorkflow<'_> {
        MergeWorkflow::new(self)
    }

    /// Sends `AUTH JWT <token>` and binds the token's identity to this connection.
    pub fn authenticate_jwt(&mut self, token: &str) -> Result<AuthInfo> {
        let token = token.trim();
        if token.is_empty() || token.contains(char::is_whitespace) {
            return Err(UsageError::InvalidCommand {
                reason: "token must be a single non-empty word".to_owned(),
            }
            .into());
        }
        self.ensure_open()?;

        let label = "AUTH JWT <redacted>";
        let envelope = self.round_trip(&format!("AUTH JWT {token}"), label)?;
        decode_auth_result(envelope, label)
    }

    fn first_column(&mut self, command: &str) -> Result<Vec<String>> {
        let result = self.query(command)?;
        Ok(result
            .into_data()
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(UsageError::NotConnected.into())
        }
    }

    /// Checks connection and merge guards before any I/O.
    pub(crate) fn admit(&self, command: &str) -> Result<CommandClass> {
        self.ensure_open()?;
        let class = CommandClass::of(command);
        self.merge_state.check(class, command)?;
        Ok(class)
    }

    pub(crate) fn track(&mut self, class: CommandClass, reply: Reply) {
        let next = self.merge_state.after(class, reply);
        if next != self.merge_state {
            #[cfg(feature = "tracing")]
            tracing::debug!("merge state {:?} -> {:?}", self.merge_state, next);
            self.merge_state = next;
        }
    }

    /// Sends one frame and reads exactly one reply line.
    ///
    /// `label` stands in for the command in errors and logs. A send or receive failure
    /// leaves the stream out of step with its replies, so the transport is dropped and
    /// later calls fail with [`UsageError::NotConnected`].
    pub(crate) fn exchange(&mut self, command: &str, label: &str) -> Result<Vec<u8>> {
        let frame = encode_command(command)?;
        let transport = self
            .transport
            .as_deref_mut()
            .ok_or(UsageError::NotConnected)?;

        #[cfg(feature = "tracing")]
        tracing::debug!("-> {}", label);

        let outcome = transport
            .send(&frame)
            .map_err(|err| io_to_transport_error(label, err))
            .and_then(|()| self.decoder.read_frame(transport, label));
        if outcome.is_err() {
            self.abandon();
        }
        outcome
    }

    /// Releases the transport without the `quit` sentinel.
    fn abandon(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();

            #[cfg(feature = "tracing")]
            tracing::debug!(
                "dropped connection to {} after a transport failure",
                self.config.describe()
            );
        }
        self.decoder.clear();
        self.merge_state = MergeState::Clean;
    }

    fn round_trip(&mut self, command: &str, label: &str) -> Result<wire::Envelope> {
        let line = self.exchange(command, label)?;
        decode_envelope(&line, label)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
impl Session {
    /// An open session over a scripted transport.
    pub(crate) fn with_transport(transport: Box<dyn Transport>) -> Self {
        let mut session = Self::new(SessionConfig::default());
        session.transport = Some(transport);
        session
    }
}
