//! The tracing engine: owns the child process and the breakpoint table and
//! drives both through ptrace. The submodules split the engine the same way
//! the commands use it:
//! * `tracee` - process lifecycle, breakpoints, continue/step
//! * `memory` - word-granular peek/poke with partial-word tails
//! * `registers` - the x86-64 register file with sub-register widths
//! * `bootstrap` - auxv, PIE rebase, and shared-library enumeration
//! * `syscall` - synthetic syscall injection
//! * `stack` - frame-pointer backtraces
//! * `symbols` - name and address resolution across all loaded images
//!
//! Everything is synchronous: the controller is only ever inside a blocking
//! wait for the tracee's stop-to-stop interval.
pub mod bootstrap;
pub mod memory;
pub mod registers;
pub mod stack;
pub mod symbols;
pub mod syscall;
pub mod tracee;

pub use registers::*;
pub use tracee::*;
