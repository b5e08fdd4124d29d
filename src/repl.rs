//! Definitions for the commands that are used interactively, e.g.
//! `break h` and `readreg rsi`.
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(infer_subcommands(true))] // allow abreviations
pub struct Repl {
    #[command(subcommand)]
    pub command: MainCommand,
}

#[derive(Subcommand)]
pub enum MainCommand {
    /// Insert a breakpoint at a symbol or hex address
    #[command(visible_aliases = ["b", "brk", "breakpoint"])]
    Break(AddrArgs),

    /// Remove a breakpoint
    #[command(visible_aliases = ["clr"])]
    Clear(AddrArgs),

    /// Show the call stack of the stopped tracee
    #[command(visible_aliases = ["bt"])]
    Backtrace,

    /// Resume the tracee until the next breakpoint, signal, or exit
    #[command(visible_aliases = ["c"])]
    Continue,

    /// Execute a single instruction
    #[command(visible_aliases = ["si"])]
    Stepin,

    /// Read a register, or dump them all
    #[command(visible_aliases = ["rr"])]
    Readreg(ReadRegArgs),

    /// Overwrite the low bytes of a register
    #[command(visible_aliases = ["wr"])]
    Writereg(WriteRegArgs),

    /// Read tracee memory as one hex value
    #[command(name = "x", visible_aliases = ["readmem"])]
    Readmem(ReadMemArgs),

    /// Overwrite tracee memory
    #[command(name = "set", visible_aliases = ["writemem"])]
    Writemem(WriteMemArgs),

    /// Run a syscall inside the tracee and print its return value
    #[command(visible_aliases = ["sys"])]
    Syscall(SyscallArgs),

    /// Exit cydbg
    #[command(visible_aliases = ["q"])]
    Quit,
}

#[derive(Args)]
pub struct AddrArgs {
    /// Symbol name, or hex address (the 0x prefix is optional)
    pub addr: String,
}

#[derive(Args)]
pub struct ReadRegArgs {
    /// Register name, e.g. rip; omit to dump the whole register file
    pub reg: Option<String>,
}

#[derive(Args)]
pub struct WriteRegArgs {
    /// Register name, e.g. rsi
    pub reg: String,

    /// How many low bytes to replace: 1, 2, 4, or 8
    pub width: u32,

    /// The new value
    #[arg(value_parser = parse_u64_expr)]
    pub value: u64,
}

#[derive(Args)]
pub struct ReadMemArgs {
    /// Symbol name or hex address to read from
    pub addr: String,

    /// Number of bytes to read, at most 8
    pub size: u32,
}

#[derive(Args)]
pub struct WriteMemArgs {
    /// Symbol name or hex address to write to
    pub addr: String,

    /// Number of low bytes of VALUE to write, at most 8
    pub size: u32,

    /// The value to store
    #[arg(value_parser = parse_u64_expr)]
    pub value: u64,
}

#[derive(Args)]
pub struct SyscallArgs {
    /// Syscall number, e.g. 39 for getpid
    #[arg(value_parser = parse_u64_expr)]
    pub num: u64,

    /// Up to six arguments; missing ones are zero
    #[arg(value_parser = parse_u64_expr, num_args = 0..=6)]
    pub args: Vec<u64>,
}

/// Accepts `0x`-prefixed hex or plain decimal.
fn parse_u64_expr(s: &str) -> Result<u64, String> {
    if s.starts_with("0x") {
        let t = s.trim_start_matches("0x");
        u64::from_str_radix(t, 16).map_err(|_| format!("`{s}` isn't a hex or decimal number"))
    } else {
        s.parse()
            .map_err(|_| format!("`{s}` isn't a hex or decimal number"))
    }
}
