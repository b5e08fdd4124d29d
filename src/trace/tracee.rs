//! Child process lifecycle and breakpoints.
use crate::elf::ElfImage;
use crate::errors::{Error, Result};
use crate::utils::require;
use log::debug;
use nix::errno::Errno;
use nix::sys::ptrace;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{self, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use std::collections::HashMap;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

/// A recorded stop address. While `injected` the byte at `addr` in the
/// tracee is 0xCC (INT 3) and `orig_byte` holds what it replaced.
pub struct Breakpoint {
    pub addr: u64,
    pub injected: bool,
    pub orig_byte: u8,
}

/// How the last `continue_process` came back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// Stopped at a known breakpoint; the tracee's RIP is the address.
    Breakpoint(u64),
    /// Stopped by a signal that is not one of our traps.
    Stopped(Signal),
    Exited(i32),
    Terminated(Signal),
}

/// The traced child plus everything owned on its behalf: the breakpoint
/// table, the auxiliary vector, and the ELF images of the executable, its
/// interpreter, and the shared libraries the interpreter loaded.
pub struct Tracee {
    pub(super) path: PathBuf,
    pub(super) child: Option<Pid>,
    pub(super) breakpoints: HashMap<u64, Breakpoint>,
    /// `Some(addr)` when the last stop was at the breakpoint at `addr`,
    /// which is currently lifted so its original instruction can run.
    pub(super) stepping_over: Option<u64>,
    /// Breakpoint addresses have been shifted by the PIE load base.
    pub(super) rebased: bool,
    pub(super) auxv: HashMap<u64, u64>,
    pub(super) elf: ElfImage,
    pub(super) interp: Option<ElfImage>,
    pub(super) shlibs: Vec<ElfImage>,
}

impl Tracee {
    pub fn new(path: PathBuf, elf: ElfImage) -> Tracee {
        Tracee {
            path,
            child: None,
            breakpoints: HashMap::new(),
            stepping_over: None,
            rebased: false,
            auxv: HashMap::new(),
            elf,
            interp: None,
            shlibs: Vec::new(),
        }
    }

    pub fn child(&self) -> Option<Pid> {
        self.child
    }

    pub(super) fn require_child(&self) -> Result<Pid> {
        self.child.ok_or(Error::ChildGone)
    }

    /// Fork and exec the target under ptrace. Any previous child is killed
    /// and reaped first. On return the tracee is stopped at its entry point
    /// (after the dynamic linker has run, for dynamic executables) with
    /// every breakpoint in the table armed.
    pub fn spawn(&mut self, args: &[String]) -> Result<()> {
        if self.child.is_some() {
            self.kill_process(Signal::SIGKILL)?;
            self.wait_process_exit()?;
        }

        let arg0 = CString::new(self.path.as_os_str().as_bytes())
            .map_err(|_| Error::bad_argument("program path contains a NUL byte"))?;
        let mut argv = vec![arg0.clone()];
        for arg in args {
            argv.push(
                CString::new(arg.as_bytes())
                    .map_err(|_| Error::bad_argument("argument contains a NUL byte"))?,
            );
        }
        let envp: Vec<CString> = std::env::vars_os()
            .filter_map(|(key, value)| {
                let mut pair = key.as_bytes().to_vec();
                pair.push(b'=');
                pair.extend_from_slice(value.as_bytes());
                CString::new(pair).ok()
            })
            .collect();
        // Built before the fork: between fork and exec only
        // async-signal-safe calls are allowed.
        let argv_ptrs = nul_terminated(&argv);
        let envp_ptrs = nul_terminated(&envp);

        match unsafe { unistd::fork() }.map_err(|e| Error::os("fork", e))? {
            ForkResult::Child => {
                // ASLR is switched off for the child so fixed addresses
                // survive a respawn.
                let _ = child_exec(&arg0, &argv_ptrs, &envp_ptrs);
                unsafe { libc::_exit(127) }
            }
            ForkResult::Parent { child } => {
                self.child = Some(child);
                let status =
                    wait::waitpid(child, None).map_err(|e| Error::os("waitpid", e))?;
                if !matches!(status, WaitStatus::Stopped(_, Signal::SIGTRAP)) {
                    self.child_gone();
                    return Err(Error::SpawnFailed {
                        path: self.path.clone(),
                        reason: format!("expected the exec trap, got {status:?}"),
                    });
                }
                debug!("spawned {} as pid {child}", self.path.display());
                self.post_spawn()?;
                let addrs: Vec<u64> = self.breakpoints.keys().copied().collect();
                for addr in addrs {
                    self.inject_breakpoint(addr)?;
                }
                Ok(())
            }
        }
    }

    /// Send a signal to the child. A child that is already gone is not an
    /// error.
    pub fn kill_process(&mut self, sgn: Signal) -> Result<()> {
        let Some(pid) = self.child else {
            return Ok(());
        };
        match signal::kill(pid, sgn) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(Error::os("kill", e)),
        }
    }

    /// Reap the child until it exits or is killed, returning the exit code
    /// or the terminating signal number.
    pub fn wait_process_exit(&mut self) -> Result<i32> {
        let Some(pid) = self.child else {
            return Ok(0);
        };
        loop {
            match wait::waitpid(pid, None).map_err(|e| Error::os("waitpid", e))? {
                WaitStatus::Exited(_, code) => {
                    self.child_gone();
                    return Ok(code);
                }
                WaitStatus::Signaled(_, sig, _) => {
                    self.child_gone();
                    return Ok(sig as i32);
                }
                _ => continue,
            }
        }
    }

    /// Execute exactly one instruction.
    pub fn step_into(&mut self) -> Result<()> {
        let pid = self.require_child()?;
        ptrace::step(pid, None).map_err(|e| Error::os("ptrace(PTRACE_SINGLESTEP)", e))?;
        let status = wait::waitpid(pid, None).map_err(|e| Error::os("waitpid", e))?;
        require(
            matches!(status, WaitStatus::Stopped(_, Signal::SIGTRAP)),
            "single step did not stop with SIGTRAP",
        )
    }

    /// Resume the tracee until the next stop. If the previous stop was at a
    /// breakpoint, its original instruction is single-stepped first and the
    /// trap byte restored, so the same address traps again next time
    /// around.
    pub fn continue_process(&mut self) -> Result<RunStatus> {
        let pid = self.require_child()?;

        if let Some(addr) = self.stepping_over.take() {
            // The breakpoint at addr is lifted right now. It may have been
            // removed while we were stopped, in which case there is nothing
            // to re-arm and nothing to step over.
            if self.breakpoints.contains_key(&addr) {
                self.step_into()?;
                self.inject_breakpoint(addr)?;
            }
        }

        ptrace::cont(pid, None).map_err(|e| Error::os("ptrace(PTRACE_CONT)", e))?;
        let status = wait::waitpid(pid, None).map_err(|e| Error::os("waitpid", e))?;
        match status {
            WaitStatus::Stopped(_, Signal::SIGTRAP) => {
                let mut regs = self.getregs()?;
                regs.rip -= 1; // back onto the 0xCC
                let pc = regs.rip;
                if self.breakpoints.contains_key(&pc) {
                    debug!("hit breakpoint at {pc:#x}");
                    self.stepping_over = Some(pc);
                    self.uninject_breakpoint(pc)?;
                    self.setregs(regs)?;
                    Ok(RunStatus::Breakpoint(pc))
                } else {
                    Ok(RunStatus::Stopped(Signal::SIGTRAP))
                }
            }
            WaitStatus::Stopped(_, sig) => Ok(RunStatus::Stopped(sig)),
            WaitStatus::Exited(_, code) => {
                self.child_gone();
                Ok(RunStatus::Exited(code))
            }
            WaitStatus::Signaled(_, sig, _) => {
                self.child_gone();
                Ok(RunStatus::Terminated(sig))
            }
            other => Err(Error::internal(format!("unexpected wait status {other:?}"))),
        }
    }

    /// Record a breakpoint. Arms it immediately when a child is live;
    /// otherwise it is armed by the next spawn. Inserting an existing
    /// address is a no-op.
    pub fn insert_breakpoint(&mut self, addr: u64) -> Result<()> {
        if self.breakpoints.contains_key(&addr) {
            return Ok(());
        }
        self.breakpoints.insert(
            addr,
            Breakpoint {
                addr,
                injected: false,
                orig_byte: 0,
            },
        );
        if self.child.is_some() {
            self.inject_breakpoint(addr)?;
        }
        Ok(())
    }

    /// Drop a breakpoint, restoring the original byte if it is armed.
    /// Returns false if there was no breakpoint at `addr`.
    pub fn remove_breakpoint(&mut self, addr: u64) -> Result<bool> {
        if !self.breakpoints.contains_key(&addr) {
            return Ok(false);
        }
        if self.child.is_some() {
            self.uninject_breakpoint(addr)?;
        }
        self.breakpoints.remove(&addr);
        if self.stepping_over == Some(addr) {
            self.stepping_over = None;
        }
        Ok(true)
    }

    pub fn breakpoint_addrs(&self) -> Vec<u64> {
        let mut addrs: Vec<u64> = self.breakpoints.keys().copied().collect();
        addrs.sort_unstable();
        addrs
    }

    /// Write the trap byte, remembering what it replaced. No-op if already
    /// injected.
    pub(super) fn inject_breakpoint(&mut self, addr: u64) -> Result<()> {
        let bp = self
            .breakpoints
            .get(&addr)
            .ok_or_else(|| Error::internal(format!("no breakpoint at {addr:#x}")))?;
        if bp.injected {
            return Ok(());
        }
        let mut orig = [0u8; 1];
        self.read_memory(addr, &mut orig)?;
        self.write_memory(addr, &[0xcc])?;
        let bp = self.breakpoints.get_mut(&addr).unwrap();
        bp.orig_byte = orig[0];
        bp.injected = true;
        Ok(())
    }

    /// Put the original byte back. No-op if not injected.
    pub(super) fn uninject_breakpoint(&mut self, addr: u64) -> Result<()> {
        let bp = self
            .breakpoints
            .get(&addr)
            .ok_or_else(|| Error::internal(format!("no breakpoint at {addr:#x}")))?;
        if !bp.injected {
            return Ok(());
        }
        let orig = [bp.orig_byte];
        self.write_memory(addr, &orig)?;
        self.breakpoints.get_mut(&addr).unwrap().injected = false;
        Ok(())
    }

    /// The child is gone: forget it and disarm the table (its memory went
    /// with it). Recorded addresses survive for the next spawn.
    fn child_gone(&mut self) {
        self.child = None;
        self.stepping_over = None;
        for bp in self.breakpoints.values_mut() {
            bp.injected = false;
        }
    }
}

fn nul_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    let mut ptrs: Vec<*const libc::c_char> = strings.iter().map(|s| s.as_ptr()).collect();
    ptrs.push(std::ptr::null());
    ptrs
}

/// The post-fork child half of spawn. Never returns on success because the
/// exec replaces the image; the caller `_exit`s on failure.
fn child_exec(
    path: &CString,
    argv: &[*const libc::c_char],
    envp: &[*const libc::c_char],
) -> nix::Result<()> {
    use nix::sys::personality::{self, Persona};
    let persona = personality::get()?;
    personality::set(persona | Persona::ADDR_NO_RANDOMIZE)?;
    ptrace::traceme()?;
    unsafe { libc::execve(path.as_ptr(), argv.as_ptr(), envp.as_ptr()) };
    Ok(())
}

impl Drop for Tracee {
    fn drop(&mut self) {
        // Teardown is best effort; the tracee may already be gone.
        let _ = self.kill_process(Signal::SIGKILL);
    }
}
