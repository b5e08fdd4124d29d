//! Error kinds shared by the ELF parser, the tracing engine, and the
//! command layer. Engine methods fail fast with `?`; the REPL catches at
//! the command boundary and reports.
use nix::errno::Errno;
use std::panic::Location;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// File open/read/mmap failure.
    #[error("couldn't read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// ELF validation failure.
    #[error("{}: {reason}", path.display())]
    BadFormat { path: PathBuf, reason: &'static str },

    /// An OS primitive (ptrace, waitpid, fork, kill, ...) failed.
    #[error("{op} failed at {location}: {source}")]
    Os {
        op: &'static str,
        source: Errno,
        location: &'static Location<'static>,
    },

    /// Peek or poke faulted on tracee memory.
    #[error("tracee memory fault at {addr:#x}: {source} ({location})")]
    MemoryFault {
        addr: u64,
        source: Errno,
        location: &'static Location<'static>,
    },

    #[error("{0}")]
    BadArgument(String),

    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),

    /// An operation that needs a live tracee was issued without one.
    #[error("no child process")]
    ChildGone,

    #[error("couldn't spawn {}: {reason}", path.display())]
    SpawnFailed { path: PathBuf, reason: String },

    /// A broken invariant, not an environment failure.
    #[error("internal error at {location}: {message}")]
    Internal {
        message: String,
        location: &'static Location<'static>,
    },
}

impl Error {
    #[track_caller]
    pub fn os(op: &'static str, source: Errno) -> Self {
        Error::Os {
            op,
            source,
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn memory_fault(addr: u64, source: Errno) -> Self {
        Error::MemoryFault {
            addr,
            source,
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
            location: Location::caller(),
        }
    }

    pub fn bad_argument(message: impl Into<String>) -> Self {
        Error::BadArgument(message.into())
    }
}
