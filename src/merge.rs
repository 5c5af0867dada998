//! Client-side sequencing for branches and manual-resolution merges.
//!
//! The server owns all merge state. The session keeps a local [`MergeState`] only to refuse
//! commands that cannot be valid while a manual merge is open, with a precise error and
//! before any bytes are sent:
//!
//! ```text
//! Clean ──MERGE x WITH MANUAL RESOLUTION (conflicts)──▶ Pending
//! Pending ──COMMIT MERGE (ok) / ABORT MERGE──▶ Clean
//! ```
//!
//! While `Pending`, another `MERGE`, `CHECKOUT` and schema DDL are refused locally.

use std::fmt;

use crate::{CommitDbError, CommitResult, ExecuteResult, QueryResult, Result, Session, UsageError};

/// Local view of the server's merge state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MergeState {
    #[default]
    Clean,
    /// A manual merge is open and must be committed or aborted.
    Pending,
}

/// Coarse classification of a command by its leading keywords.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CommandClass {
    Merge,
    ManualMerge,
    CommitMerge,
    AbortMerge,
    ResolveConflict,
    ShowConflicts,
    Checkout,
    SchemaChange,
    Other,
}

impl CommandClass {
    pub(crate) fn of(command: &str) -> Self {
        let command = command.trim().trim_end_matches(';');
        let words: Vec<String> = command
            .split_whitespace()
            .map(|word| word.to_ascii_uppercase())
            .collect();
        let word = |idx: usize| words.get(idx).map(String::as_str);

        match (word(0), word(1)) {
            (Some("MERGE"), _) => {
                let manual = words.len() == 5
                    && words[2..] == ["WITH", "MANUAL", "RESOLUTION"];
                if manual {
                    Self::ManualMerge
                } else {
                    Self::Merge
                }
            }
            (Some("COMMIT"), Some("MERGE")) => Self::CommitMerge,
            (Some("ABORT"), Some("MERGE")) => Self::AbortMerge,
            (Some("RESOLVE"), Some("CONFLICT")) => Self::ResolveConflict,
            (Some("SHOW"), Some("MERGE")) => Self::ShowConflicts,
            (Some("CHECKOUT"), _) => Self::Checkout,
            (Some("CREATE" | "DROP"), Some("DATABASE" | "TABLE")) => Self::SchemaChange,
            (Some("ALTER"), Some("TABLE")) => Self::SchemaChange,
            _ => Self::Other,
        }
    }
}

/// Shape of a reply, as far as merge tracking cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reply {
    Failed,
    Commit,
    Query { rows: usize },
}

impl Reply {
    pub(crate) fn of(outcome: &Result<ExecuteResult>) -> Self {
        match outcome {
            Ok(ExecuteResult::Query(result)) => Self::Query { rows: result.len() },
            Ok(ExecuteResult::Commit(_)) => Self::Commit,
            Err(_) => Self::Failed,
        }
    }
}

impl MergeState {
    /// Refuses `command` if it cannot be valid in this state.
    pub(crate) fn check(
        self,
        class: CommandClass,
        command: &str,
    ) -> std::result::Result<(), UsageError> {
        let forbidden = matches!(
            class,
            CommandClass::Merge
                | CommandClass::ManualMerge
                | CommandClass::Checkout
                | CommandClass::SchemaChange
        );
        if self == Self::Pending && forbidden {
            return Err(UsageError::MergePending {
                command: command.to_owned(),
            });
        }
        Ok(())
    }

    /// State after `class` produced `reply`.
    pub(crate) fn after(self, class: CommandClass, reply: Reply) -> Self {
        match (class, reply) {
            (CommandClass::AbortMerge, _) => Self::Clean,
            (CommandClass::CommitMerge, Reply::Commit | Reply::Query { .. }) => Self::Clean,
            (CommandClass::ManualMerge, Reply::Query { .. }) => Self::Pending,
            (CommandClass::ShowConflicts, Reply::Query { rows }) if rows > 0 => Self::Pending,
            _ => self,
        }
    }
}

/// One unresolved key conflict of a pending manual merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeConflict {
    pub database: String,
    pub table: String,
    pub key: String,
    /// Value on the current branch, as reported by the server.
    pub head: Option<String>,
    /// Value on the branch being merged in.
    pub source: Option<String>,
}

impl MergeConflict {
    /// `database.table.key`, the form `RESOLVE CONFLICT` expects.
    pub fn path(&self) -> String {
        format!("{}.{}.{}", self.database, self.table, self.key)
    }
}

/// How to settle one conflict.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Keep the current branch's value.
    Head,
    /// Take the merged-in branch's value.
    Source,
    /// Write this literal value.
    Value(String),
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head => f.write_str("HEAD"),
            Self::Source => f.write_str("SOURCE"),
            Self::Value(value) => write!(f, "'{value}'"),
        }
    }
}

/// Result of `MERGE <branch> WITH MANUAL RESOLUTION`.
#[derive(Clone, Debug, PartialEq)]
pub enum MergeOutcome {
    /// No conflicts; the server completed the merge.
    Merged(CommitResult),
    /// The merge is open; every conflict must be resolved before `COMMIT MERGE`.
    Pending(Vec<MergeConflict>),
}

/// Reply to `RESOLVE CONFLICT`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub resolved: String,
    /// Conflicts still open, when the server reports it.
    pub remaining: Option<u64>,
}

/// A branch listed by `SHOW BRANCHES`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Branch {
    pub name: String,
    pub current: bool,
}

pub(crate) fn conflicts_from(result: &QueryResult, command: &str) -> Result<Vec<MergeConflict>> {
    result
        .rows()
        .map(|row| {
            let field = |name: &str| {
                row.get(name).map(str::to_owned).ok_or_else(|| CommitDbError::Protocol {
                    command: command.to_owned(),
                    message: format!("conflict listing has no '{name}' column"),
                })
            };
            Ok(MergeConflict {
                database: field("Database")?,
                table: field("Table")?,
                key: field("Key")?,
                head: row.get("HEAD").map(str::to_owned),
                source: row.get("SOURCE").map(str::to_owned),
            })
        })
        .collect()
}

pub(crate) fn branches_from(result: &QueryResult) -> Vec<Branch> {
    result
        .rows()
        .filter_map(|row| {
            let name = row.get("Branch").or_else(|| row.values().first().map(String::as_str))?;
            Some(Branch {
                name: name.to_owned(),
                current: row.get("Current").is_some_and(|flag| flag.trim() == "*"),
            })
        })
        .collect()
}

fn ensure_identifier(what: &str, name: &str) -> std::result::Result<(), UsageError> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == ';') {
        return Err(UsageError::InvalidCommand {
            reason: format!("{what} '{name}' must be a single non-empty word"),
        });
    }
    Ok(())
}

/// Branch and merge helpers over a borrowed [`Session`].
///
/// Holds no state of its own; conflict lists are fetched fresh on every call.
#[derive(Debug)]
pub struct MergeWorkflow<'s> {
    session: &'s mut Session,
}

impl<'s> MergeWorkflow<'s> {
    pub fn new(session: &'s mut Session) -> Self {
        Self { session }
    }

    pub fn state(&self) -> MergeState {
        self.session.merge_state()
    }

    /// `CREATE BRANCH <name>` from the current checkout.
    pub fn create_branch(&mut self, name: &str) -> Result<CommitResult> {
        ensure_identifier("branch name", name)?;
        self.session.execute_mutation(&format!("CREATE BRANCH {name}"))
    }

    /// `CHECKOUT <name>`; later reads and writes apply to that branch.
    pub fn checkout(&mut self, name: &str) -> Result<CommitResult> {
        ensure_identifier("branch name", name)?;
        self.session.execute_mutation(&format!("CHECKOUT {name}"))
    }

    /// `MERGE <branch>` with automatic resolution.
    pub fn merge(&mut self, branch: &str) -> Result<CommitResult> {
        ensure_identifier("branch name", branch)?;
        self.session.execute_mutation(&format!("MERGE {branch}"))
    }

    /// `MERGE <branch> WITH MANUAL RESOLUTION`.
    pub fn merge_manual(&mut self, branch: &str) -> Result<MergeOutcome> {
        ensure_identifier("branch name", branch)?;
        let command = format!("MERGE {branch} WITH MANUAL RESOLUTION");
        match self.session.execute(&command)? {
            ExecuteResult::Commit(result) => Ok(MergeOutcome::Merged(result)),
            ExecuteResult::Query(result) => {
                conflicts_from(&result, &command).map(MergeOutcome::Pending)
            }
        }
    }

    /// `SHOW MERGE CONFLICTS`. Empty when nothing is pending or everything is resolved.
    pub fn conflicts(&mut self) -> Result<Vec<MergeConflict>> {
        let command = "SHOW MERGE CONFLICTS";
        let result = self.session.query(command)?;
        conflicts_from(&result, command)
    }

    /// `RESOLVE CONFLICT <db>.<table>.<key> USING <resolution>`.
    pub fn resolve(
        &mut self,
        conflict: &MergeConflict,
        resolution: &ConflictResolution,
    ) -> Result<ResolveOutcome> {
        let path = conflict.path();
        let command = format!("RESOLVE CONFLICT {path} USING {resolution}");
        let outcome = match self.session.execute(&command)? {
            ExecuteResult::Query(result) => {
                let row = result.row(0);
                ResolveOutcome {
                    resolved: row
                        .and_then(|row| row.get("Resolved"))
                        .map_or_else(|| path.clone(), str::to_owned),
                    remaining: row
                        .and_then(|row| row.get("Remaining"))
                        .and_then(|count| count.trim().parse().ok()),
                }
            }
            ExecuteResult::Commit(_) => ResolveOutcome {
                resolved: path,
                remaining: None,
            },
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "resolved {} ({:?} remaining)",
            outcome.resolved,
            outcome.remaining
        );

        Ok(outcome)
    }

    /// Resolves every listed conflict with the same policy. Returns how many were resolved.
    pub fn resolve_all(&mut self, resolution: &ConflictResolution) -> Result<usize> {
        let conflicts = self.conflicts()?;
        for conflict in &conflicts {
            self.resolve(conflict, resolution)?;
        }
        Ok(conflicts.len())
    }

    /// `COMMIT MERGE`. The server refuses while conflicts remain.
    pub fn commit_merge(&mut self) -> Result<CommitResult> {
        self.session.execute_mutation("COMMIT MERGE")
    }

    /// `ABORT MERGE`. Always leaves the local state clean.
    pub fn abort_merge(&mut self) -> Result<()> {
        self.session.execute("ABORT MERGE").map(|_| ())
    }

    pub fn show_branches(&mut self) -> Result<Vec<Branch>> {
        self.session.show_branches()
    }

    /// Name of the checked-out branch.
    pub fn current_branch(&mut self) -> Result<Option<String>> {
        Ok(self
            .show_branches()?
            .into_iter()
            .find(|branch| branch.current)
            .map(|branch| branch.name))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        branches_from, conflicts_from, CommandClass, ConflictResolution, MergeState, Reply,
    };
    use crate::{QueryResult, UsageError};

    fn query(columns: &[&str], data: &[&[&str]]) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            data: data
                .iter()
                .map(|row| row.iter().map(|c| (*c).to_owned()).collect())
                .collect(),
            records_read: data.len() as u64,
            time_ms: 0.0,
        }
    }

    #[test]
    fn classifies_merge_family() {
        assert_eq!(CommandClass::of("MERGE feature"), CommandClass::Merge);
        assert_eq!(
            CommandClass::of("merge feature with manual resolution;"),
            CommandClass::ManualMerge
        );
        assert_eq!(CommandClass::of("  COMMIT MERGE "), CommandClass::CommitMerge);
        assert_eq!(CommandClass::of("COMMIT"), CommandClass::Other);
        assert_eq!(CommandClass::of("ABORT MERGE"), CommandClass::AbortMerge);
        assert_eq!(
            CommandClass::of("RESOLVE CONFLICT db.t.1 USING HEAD"),
            CommandClass::ResolveConflict
        );
        assert_eq!(CommandClass::of("SHOW MERGE CONFLICTS"), CommandClass::ShowConflicts);
    }

    #[test]
    fn classifies_ddl_and_checkout() {
        assert_eq!(CommandClass::of("CHECKOUT master"), CommandClass::Checkout);
        assert_eq!(CommandClass::of("create database app"), CommandClass::SchemaChange);
        assert_eq!(CommandClass::of("DROP TABLE app.users"), CommandClass::SchemaChange);
        assert_eq!(
            CommandClass::of("ALTER TABLE app.users ADD COLUMN x INT"),
            CommandClass::SchemaChange
        );
        assert_eq!(CommandClass::of("CREATE BRANCH feature"), CommandClass::Other);
        assert_eq!(CommandClass::of("SELECT * FROM app.users"), CommandClass::Other);
        assert_eq!(CommandClass::of(""), CommandClass::Other);
    }

    #[test]
    fn pending_refuses_merge_checkout_and_ddl() {
        let state = MergeState::Pending;
        for command in [
            "MERGE other",
            "MERGE other WITH MANUAL RESOLUTION",
            "CHECKOUT master",
            "CREATE TABLE app.t (id INT PRIMARY KEY)",
            "DROP DATABASE app",
        ] {
            let err = state
                .check(CommandClass::of(command), command)
                .expect_err("must refuse");
            assert_eq!(
                err,
                UsageError::MergePending {
                    command: command.to_owned()
                }
            );
        }

        for command in [
            "SHOW MERGE CONFLICTS",
            "RESOLVE CONFLICT app.t.1 USING SOURCE",
            "COMMIT MERGE",
            "ABORT MERGE",
            "CREATE BRANCH spare",
            "SELECT * FROM app.t",
            "INSERT INTO app.t (id) VALUES (3)",
        ] {
            state
                .check(CommandClass::of(command), command)
                .expect("must allow");
        }
    }

    #[test]
    fn clean_allows_everything() {
        for command in ["MERGE x WITH MANUAL RESOLUTION", "CHECKOUT x", "DROP TABLE a.b"] {
            MergeState::Clean
                .check(CommandClass::of(command), command)
                .expect("must allow");
        }
    }

    #[test]
    fn transitions() {
        use CommandClass::*;
        use MergeState::{Clean, Pending};

        let cases = [
            (Clean, ManualMerge, Reply::Query { rows: 2 }, Pending),
            (Clean, ManualMerge, Reply::Commit, Clean),
            (Clean, ManualMerge, Reply::Failed, Clean),
            (Pending, CommitMerge, Reply::Commit, Clean),
            (Pending, CommitMerge, Reply::Failed, Pending),
            (Pending, AbortMerge, Reply::Failed, Clean),
            (Pending, AbortMerge, Reply::Query { rows: 1 }, Clean),
            (Pending, ResolveConflict, Reply::Query { rows: 1 }, Pending),
            (Clean, ShowConflicts, Reply::Query { rows: 1 }, Pending),
            (Pending, ShowConflicts, Reply::Query { rows: 0 }, Pending),
            (Clean, Other, Reply::Commit, Clean),
        ];
        for (from, class, reply, to) in cases {
            assert_eq!(from.after(class, reply), to, "{from:?} + {class:?} / {reply:?}");
        }
    }

    #[test]
    fn conflict_rows_become_records() {
        let result = query(
            &["Database", "Table", "Key", "HEAD", "SOURCE"],
            &[&["app", "users", "7", "{\"name\":\"a\"}", "{\"name\":\"b\"}"]],
        );
        let conflicts = conflicts_from(&result, "SHOW MERGE CONFLICTS").expect("must decode");
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path(), "app.users.7");
        assert_eq!(conflicts[0].head.as_deref(), Some("{\"name\":\"a\"}"));
        assert_eq!(conflicts[0].source.as_deref(), Some("{\"name\":\"b\"}"));
    }

    #[test]
    fn conflict_listing_without_key_column_is_rejected() {
        let result = query(&["Database", "Table"], &[&["app", "users"]]);
        assert!(conflicts_from(&result, "SHOW MERGE CONFLICTS").is_err());
        assert!(conflicts_from(&query(&[], &[]), "SHOW MERGE CONFLICTS")
            .expect("empty is fine")
            .is_empty());
    }

    #[test]
    fn resolution_rendering() {
        assert_eq!(ConflictResolution::Head.to_string(), "HEAD");
        assert_eq!(ConflictResolution::Source.to_string(), "SOURCE");
        assert_eq!(
            ConflictResolution::Value("{\"id\":1}".to_owned()).to_string(),
            "'{\"id\":1}'"
        );
    }

    #[test]
    fn branch_listing_marks_current() {
        let result = query(&["Branch", "Current"], &[&["feature", ""], &["master", "*"]]);
        let branches = branches_from(&result);
        assert_eq!(branches.len(), 2);
        assert!(!branches[0].current);
        assert_eq!(branches[1].name, "master");
        assert!(branches[1].current);
    }
}
