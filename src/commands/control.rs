//! Verbs that move the tracee: breakpoints, continue, single-step, and
//! syscall injection.
use super::resolve_addr;
use crate::errors::Result;
use crate::repl::{AddrArgs, SyscallArgs};
use crate::trace::{RunStatus, Tracee};
use crate::utils::warn;

pub fn breakpoint(tracee: &mut Tracee, args: &AddrArgs) {
    fn run(tracee: &mut Tracee, args: &AddrArgs) -> Result<()> {
        let addr = resolve_addr(tracee, &args.addr)?;
        tracee.insert_breakpoint(addr)?;
        println!("Breakpoint added at {addr:#x}");
        Ok(())
    }
    if let Err(e) = run(tracee, args) {
        warn(&e.to_string());
    }
}

pub fn clear(tracee: &mut Tracee, args: &AddrArgs) {
    fn run(tracee: &mut Tracee, args: &AddrArgs) -> Result<()> {
        let addr = resolve_addr(tracee, &args.addr)?;
        if tracee.remove_breakpoint(addr)? {
            println!("Breakpoint removed from {addr:#x}");
        } else {
            println!("No breakpoint at {addr:#x}");
        }
        Ok(())
    }
    if let Err(e) = run(tracee, args) {
        warn(&e.to_string());
    }
}

pub fn continue_process(tracee: &mut Tracee) {
    match tracee.continue_process() {
        Ok(status) => {
            let symbol = match status {
                RunStatus::Breakpoint(pc) => tracee.lookup_addr(pc),
                _ => None,
            };
            println!("{}", status_line(status, symbol));
        }
        Err(e) => warn(&e.to_string()),
    }
}

pub fn stepin(tracee: &mut Tracee) {
    fn run(tracee: &mut Tracee) -> Result<()> {
        tracee.step_into()?;
        let rip = tracee.getregs()?.rip;
        match tracee.lookup_addr(rip) {
            Some(name) => println!("Stopped at {rip:#x} <{name}>"),
            None => println!("Stopped at {rip:#x}"),
        }
        Ok(())
    }
    if let Err(e) = run(tracee) {
        warn(&e.to_string());
    }
}

pub fn syscall(tracee: &mut Tracee, args: &SyscallArgs) {
    fn run(tracee: &mut Tracee, args: &SyscallArgs) -> Result<()> {
        let mut sysargs = [0u64; 6];
        sysargs[..args.args.len()].copy_from_slice(&args.args);
        let ret = tracee.inject_syscall(args.num, sysargs)?;
        println!("syscall {} returned {ret:#x}", args.num);
        Ok(())
    }
    if let Err(e) = run(tracee, args) {
        warn(&e.to_string());
    }
}

fn status_line(status: RunStatus, symbol: Option<&str>) -> String {
    match status {
        RunStatus::Breakpoint(pc) => match symbol {
            Some(name) => format!("Hit breakpoint at {pc:#x} <{name}>"),
            None => format!("Hit breakpoint at {pc:#x}"),
        },
        RunStatus::Stopped(sig) => format!("Process stopped by signal {sig}"),
        RunStatus::Exited(code) => format!("Process exited with code {code}"),
        RunStatus::Terminated(sig) => format!("Process received signal {sig}"),
    }
}
