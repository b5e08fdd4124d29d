use crate::errors::{Error, Result};
use nu_ansi_term::Color;

/// Report a recoverable problem without aborting the command loop.
pub fn warn(mesg: &str) {
    eprintln!("{}", Color::Yellow.paint(mesg));
}

/// Turn a broken invariant into an error carrying the caller's location.
#[track_caller]
pub fn require(predicate: bool, mesg: &str) -> Result<()> {
    if predicate {
        Ok(())
    } else {
        Err(Error::internal(mesg))
    }
}
