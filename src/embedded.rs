//! In-process transport backed by the CommitDB shared library.
//!
//! The library exports a handle-based C interface. Each request is one synchronous call to
//! `commitdb_execute`, whose reply uses the same JSON envelope as the TCP server. The reply
//! is handed back through [`Transport::receive_chunk`] as a single newline-terminated chunk,
//! so the session's frame decoding is shared by both transports.

use std::{
    ffi::{c_char, c_int, CStr, CString},
    fmt, io, mem,
    path::{Path, PathBuf},
};

use libloading::Library;

use crate::{codec::DELIMITER, transport::Transport, CommitDbError, EmbeddedDatabase, Result};

type OpenMemoryFn = unsafe extern "C" fn() -> c_int;
type OpenFileFn = unsafe extern "C" fn(*const c_char) -> c_int;
type ExecuteFn = unsafe extern "C" fn(c_int, *const c_char) -> *mut c_char;
type FreeFn = unsafe extern "C" fn(*mut c_char);
type CloseFn = unsafe extern "C" fn(c_int);

const SYM_OPEN_MEMORY: &[u8] = b"commitdb_open_memory\0";
const SYM_OPEN_FILE: &[u8] = b"commitdb_open_file\0";
const SYM_EXECUTE: &[u8] = b"commitdb_execute\0";
const SYM_FREE: &[u8] = b"commitdb_free\0";
const SYM_CLOSE: &[u8] = b"commitdb_close\0";

#[derive(Clone, Copy)]
struct Entrypoints {
    execute: ExecuteFn,
    free: FreeFn,
    close: CloseFn,
}

/// Transport that calls into a loaded CommitDB library.
///
/// The library is not documented as thread-safe, so callers must drive one
/// `EmbeddedTransport` from one thread at a time.
pub struct EmbeddedTransport {
    entry: Entrypoints,
    handle: c_int,
    pending: Vec<u8>,
    open: bool,
    library: Option<Library>,
    path: PathBuf,
}

impl fmt::Debug for EmbeddedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedTransport")
            .field("path", &self.path)
            .field("handle", &self.handle)
            .field("open", &self.open)
            .finish()
    }
}

impl EmbeddedTransport {
    /// Loads the library at `path`, resolves its entry points and opens `database`.
    pub fn load(path: &Path, database: &EmbeddedDatabase) -> Result<Self> {
        let load_error = |reason: String| CommitDbError::Load {
            path: path.to_path_buf(),
            reason,
        };

        if !path.exists() {
            return Err(load_error("file does not exist".to_owned()));
        }

        // SAFETY: loading runs the library's initialisers; the caller chose this library.
        let library = unsafe { Library::new(path) }.map_err(|err| load_error(err.to_string()))?;

        // SAFETY: the declared signatures match the exported C ABI of the CommitDB bindings.
        let (entry, open_memory, open_file) = unsafe {
            let execute = *library
                .get::<ExecuteFn>(SYM_EXECUTE)
                .map_err(|err| load_error(format!("missing symbol commitdb_execute: {err}")))?;
            let free = *library
                .get::<FreeFn>(SYM_FREE)
                .map_err(|err| load_error(format!("missing symbol commitdb_free: {err}")))?;
            let close = *library
                .get::<CloseFn>(SYM_CLOSE)
                .map_err(|err| load_error(format!("missing symbol commitdb_close: {err}")))?;
            let open_memory = *library.get::<OpenMemoryFn>(SYM_OPEN_MEMORY).map_err(|err| {
                load_error(format!("missing symbol commitdb_open_memory: {err}"))
            })?;
            let open_file = *library
                .get::<OpenFileFn>(SYM_OPEN_FILE)
                .map_err(|err| load_error(format!("missing symbol commitdb_open_file: {err}")))?;
            (
                Entrypoints {
                    execute,
                    free,
                    close,
                },
                open_memory,
                open_file,
            )
        };

        let handle = match database {
            // SAFETY: no arguments; returns a handle or a negative code.
            EmbeddedDatabase::Memory => unsafe { open_memory() },
            EmbeddedDatabase::File(dir) => {
                let dir = dir.to_string_lossy();
                let c_dir = CString::new(dir.as_bytes())
                    .map_err(|_| load_error("data directory contains NUL".to_owned()))?;
                // SAFETY: `c_dir` is a valid NUL-terminated string for the duration of the call.
                unsafe { open_file(c_dir.as_ptr()) }
            }
        };
        if handle < 0 {
            return Err(load_error(format!(
                "library refused to open database (code {handle})"
            )));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("loaded {} with handle {}", path.display(), handle);

        Ok(Self {
            entry,
            handle,
            pending: Vec::new(),
            open: true,
            library: Some(library),
            path: path.to_path_buf(),
        })
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn call(&self, command: &CStr) -> io::Result<Vec<u8>> {
        if !self.open {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "library has been unloaded",
            ));
        }

        // SAFETY: the library is loaded and `command` outlives the call.
        let reply = unsafe { (self.entry.execute)(self.handle, command.as_ptr()) };
        if reply.is_null() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "commitdb_execute returned a null reply",
            ));
        }

        // SAFETY: non-null replies are NUL-terminated strings owned by the library,
        // released exactly once through `commitdb_free`.
        let bytes = unsafe {
            let bytes = CStr::from_ptr(reply).to_bytes().to_vec();
            (self.entry.free)(reply);
            bytes
        };
        Ok(bytes)
    }
}

impl Transport for EmbeddedTransport {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let command = frame.strip_suffix(&[DELIMITER]).unwrap_or(frame);
        let command = CString::new(command).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "command contains a NUL byte")
        })?;

        let mut reply = self.call(&command)?;
        reply.push(DELIMITER);
        self.pending.extend_from_slice(&reply);
        Ok(())
    }

    fn receive_chunk(&mut self) -> io::Result<Vec<u8>> {
        if !self.open {
            return Ok(Vec::new());
        }
        Ok(mem::take(&mut self.pending))
    }

    /// The library lifecycle replaces the `quit` sentinel.
    fn terminate(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            // SAFETY: the handle came from this library and is released exactly once.
            unsafe { (self.entry.close)(self.handle) };
            self.pending.clear();
            drop(self.library.take());

            #[cfg(feature = "tracing")]
            tracing::debug!("unloaded {}", self.path.display());
        }
    }
}

impl Drop for EmbeddedTransport {
    fn drop(&mut self) {
        self.close();
    }
}
