//! The handlers behind the REPL verbs. Engine errors are caught here, at
//! the command boundary, and reported; the loop keeps going.
pub mod control;
pub mod inspect;
pub mod tables;

pub use control::*;
pub use inspect::*;

use crate::errors::{Error, Result};
use crate::trace::Tracee;

/// Resolve an ADDR token: first as a symbol through every loaded image,
/// then as a hex literal. Symbols win because names like `f` are also
/// valid hex digits.
fn resolve_addr(tracee: &Tracee, token: &str) -> Result<u64> {
    if let Some(addr) = tracee.lookup_sym(token) {
        return Ok(addr);
    }
    let t = token.trim_start_matches("0x");
    u64::from_str_radix(t, 16).map_err(|_| Error::UnknownSymbol(token.to_string()))
}
