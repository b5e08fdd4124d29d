//! Synthetic syscall injection: run one syscall inside the tracee's
//! address space and restore everything afterwards, so only the kernel
//! side effects remain.
use super::Tracee;
use crate::errors::Result;
use log::debug;

/// The two-byte x86-64 `syscall` instruction.
const SYSCALL_OPCODE: [u8; 2] = [0x0f, 0x05];

impl Tracee {
    /// Execute syscall `num` with up to six arguments in the tracee and
    /// return its RAX. The opcode is planted at the base of the page RIP is
    /// executing from (mapped and executable by construction) and both the
    /// clobbered bytes and the full register file are restored before
    /// returning.
    pub fn inject_syscall(&mut self, num: u64, args: [u64; 6]) -> Result<u64> {
        let regs = self.getregs()?;
        let scratch = regs.rip & !0xfff;

        let mut saved = [0u8; 2];
        self.read_memory(scratch, &mut saved)?;
        self.write_memory(scratch, &SYSCALL_OPCODE)?;

        let mut syscall_regs = regs;
        syscall_regs.rax = num;
        syscall_regs.rdi = args[0];
        syscall_regs.rsi = args[1];
        syscall_regs.rdx = args[2];
        syscall_regs.r10 = args[3];
        syscall_regs.r8 = args[4];
        syscall_regs.r9 = args[5];
        syscall_regs.rip = scratch;
        self.setregs(syscall_regs)?;

        self.step_into()?;
        let ret = self.getregs()?.rax;
        debug!("injected syscall {num} returned {ret:#x}");

        self.write_memory(scratch, &saved)?;
        self.setregs(regs)?;
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::ElfImage;
    use std::path::{Path, PathBuf};

    fn spawned(path: &str) -> Tracee {
        let image = ElfImage::new(Path::new(path), 0).unwrap();
        let mut tracee = Tracee::new(PathBuf::from(path), image);
        tracee.spawn(&[]).unwrap();
        tracee
    }

    #[test]
    fn getpid_comes_back_with_the_child_pid() {
        let mut tracee = spawned("/bin/true");
        let pid = tracee.child().unwrap();
        let ret = tracee.inject_syscall(libc::SYS_getpid as u64, [0; 6]).unwrap();
        assert_eq!(ret, pid.as_raw() as u64);
    }

    #[test]
    fn tracee_state_is_untouched_afterwards() {
        let mut tracee = spawned("/bin/true");
        let before = tracee.getregs().unwrap();
        let page = before.rip & !0xfff;
        let mut bytes_before = [0u8; 2];
        tracee.read_memory(page, &mut bytes_before).unwrap();

        tracee.inject_syscall(libc::SYS_getpid as u64, [0; 6]).unwrap();

        let after = tracee.getregs().unwrap();
        assert_eq!(after.rip, before.rip);
        assert_eq!(after.rax, before.rax);
        assert_eq!(after.rsp, before.rsp);
        let mut bytes_after = [0u8; 2];
        tracee.read_memory(page, &mut bytes_after).unwrap();
        assert_eq!(bytes_after, bytes_before);
    }

    #[test]
    fn mmap_then_write_reaches_the_controller() {
        // Scenario: allocate a page in the tracee, fill it, and have the
        // tracee write() it to a pipe we can observe. Writing to fd 2 would
        // interleave with test output, so stat the result instead: mmap
        // must return a page-aligned address and the memory must hold what
        // we stored.
        let mut tracee = spawned("/bin/true");
        let page = tracee
            .inject_syscall(
                libc::SYS_mmap as u64,
                [
                    0,
                    0x1000,
                    (libc::PROT_READ | libc::PROT_WRITE) as u64,
                    (libc::MAP_PRIVATE | libc::MAP_ANONYMOUS) as u64,
                    u64::MAX, // fd -1
                    0,
                ],
            )
            .unwrap();
        assert_eq!(page & 0xfff, 0);
        assert!((page as i64) > 0);

        tracee.write_memory(page, b"hello from the tracee\0").unwrap();
        assert_eq!(tracee.read_cstr(page).unwrap(), "hello from the tracee");
    }
}
