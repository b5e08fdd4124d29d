//! The x86-64 register file as exposed by PTRACE_GETREGS. Reads and writes
//! go through a full snapshot; sub-register widths mask into it so writing
//! e.g. the low 16 bits leaves the rest of the register intact.
use super::Tracee;
use crate::errors::{Error, Result};
use libc::user_regs_struct;
use nix::sys::ptrace;
use std::fmt;
use std::str::FromStr;

/// Every register in `user_regs_struct`, in its layout order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    R15,
    R14,
    R13,
    R12,
    Rbp,
    Rbx,
    R11,
    R10,
    R9,
    R8,
    Rax,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    OrigRax,
    Rip,
    Cs,
    Eflags,
    Rsp,
    Ss,
    FsBase,
    GsBase,
    Ds,
    Es,
    Fs,
    Gs,
}

impl Register {
    pub const ALL: [Register; 27] = [
        Register::R15,
        Register::R14,
        Register::R13,
        Register::R12,
        Register::Rbp,
        Register::Rbx,
        Register::R11,
        Register::R10,
        Register::R9,
        Register::R8,
        Register::Rax,
        Register::Rcx,
        Register::Rdx,
        Register::Rsi,
        Register::Rdi,
        Register::OrigRax,
        Register::Rip,
        Register::Cs,
        Register::Eflags,
        Register::Rsp,
        Register::Ss,
        Register::FsBase,
        Register::GsBase,
        Register::Ds,
        Register::Es,
        Register::Fs,
        Register::Gs,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Register::R15 => "r15",
            Register::R14 => "r14",
            Register::R13 => "r13",
            Register::R12 => "r12",
            Register::Rbp => "rbp",
            Register::Rbx => "rbx",
            Register::R11 => "r11",
            Register::R10 => "r10",
            Register::R9 => "r9",
            Register::R8 => "r8",
            Register::Rax => "rax",
            Register::Rcx => "rcx",
            Register::Rdx => "rdx",
            Register::Rsi => "rsi",
            Register::Rdi => "rdi",
            Register::OrigRax => "orig_rax",
            Register::Rip => "rip",
            Register::Cs => "cs",
            Register::Eflags => "eflags",
            Register::Rsp => "rsp",
            Register::Ss => "ss",
            Register::FsBase => "fs_base",
            Register::GsBase => "gs_base",
            Register::Ds => "ds",
            Register::Es => "es",
            Register::Fs => "fs",
            Register::Gs => "gs",
        }
    }

    pub fn get(self, regs: &user_regs_struct) -> u64 {
        match self {
            Register::R15 => regs.r15,
            Register::R14 => regs.r14,
            Register::R13 => regs.r13,
            Register::R12 => regs.r12,
            Register::Rbp => regs.rbp,
            Register::Rbx => regs.rbx,
            Register::R11 => regs.r11,
            Register::R10 => regs.r10,
            Register::R9 => regs.r9,
            Register::R8 => regs.r8,
            Register::Rax => regs.rax,
            Register::Rcx => regs.rcx,
            Register::Rdx => regs.rdx,
            Register::Rsi => regs.rsi,
            Register::Rdi => regs.rdi,
            Register::OrigRax => regs.orig_rax,
            Register::Rip => regs.rip,
            Register::Cs => regs.cs,
            Register::Eflags => regs.eflags,
            Register::Rsp => regs.rsp,
            Register::Ss => regs.ss,
            Register::FsBase => regs.fs_base,
            Register::GsBase => regs.gs_base,
            Register::Ds => regs.ds,
            Register::Es => regs.es,
            Register::Fs => regs.fs,
            Register::Gs => regs.gs,
        }
    }

    pub fn set(self, regs: &mut user_regs_struct, value: u64) {
        match self {
            Register::R15 => regs.r15 = value,
            Register::R14 => regs.r14 = value,
            Register::R13 => regs.r13 = value,
            Register::R12 => regs.r12 = value,
            Register::Rbp => regs.rbp = value,
            Register::Rbx => regs.rbx = value,
            Register::R11 => regs.r11 = value,
            Register::R10 => regs.r10 = value,
            Register::R9 => regs.r9 = value,
            Register::R8 => regs.r8 = value,
            Register::Rax => regs.rax = value,
            Register::Rcx => regs.rcx = value,
            Register::Rdx => regs.rdx = value,
            Register::Rsi => regs.rsi = value,
            Register::Rdi => regs.rdi = value,
            Register::OrigRax => regs.orig_rax = value,
            Register::Rip => regs.rip = value,
            Register::Cs => regs.cs = value,
            Register::Eflags => regs.eflags = value,
            Register::Rsp => regs.rsp = value,
            Register::Ss => regs.ss = value,
            Register::FsBase => regs.fs_base = value,
            Register::GsBase => regs.gs_base = value,
            Register::Ds => regs.ds = value,
            Register::Es => regs.es = value,
            Register::Fs => regs.fs = value,
            Register::Gs => regs.gs = value,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.name())
    }
}

impl FromStr for Register {
    type Err = Error;

    fn from_str(s: &str) -> Result<Register> {
        Register::ALL
            .into_iter()
            .find(|reg| reg.name() == s)
            .ok_or_else(|| Error::bad_argument(format!("unknown register `{s}`")))
    }
}

fn width_mask(width: u32) -> Result<u64> {
    match width {
        1 => Ok(0xff),
        2 => Ok(0xffff),
        4 => Ok(0xffff_ffff),
        8 => Ok(u64::MAX),
        _ => Err(Error::bad_argument(format!(
            "unsupported register width {width} (use 1, 2, 4, or 8)"
        ))),
    }
}

/// The low `width` bytes of `value`.
pub fn mask_value(value: u64, width: u32) -> Result<u64> {
    Ok(value & width_mask(width)?)
}

/// `old` with its low `width` bytes replaced by `value`'s.
pub fn merge_value(old: u64, value: u64, width: u32) -> Result<u64> {
    let mask = width_mask(width)?;
    Ok((old & !mask) | (value & mask))
}

impl Tracee {
    pub fn getregs(&self) -> Result<user_regs_struct> {
        let pid = self.require_child()?;
        ptrace::getregs(pid).map_err(|e| Error::os("ptrace(PTRACE_GETREGS)", e))
    }

    pub fn setregs(&self, regs: user_regs_struct) -> Result<()> {
        let pid = self.require_child()?;
        ptrace::setregs(pid, regs).map_err(|e| Error::os("ptrace(PTRACE_SETREGS)", e))
    }

    /// The low `width` bytes of a register.
    pub fn read_register(&self, reg: Register, width: u32) -> Result<u64> {
        let regs = self.getregs()?;
        mask_value(reg.get(&regs), width)
    }

    /// Replace the low `width` bytes of a register, leaving the high bytes
    /// as they were.
    pub fn write_register(&self, reg: Register, width: u32, value: u64) -> Result<()> {
        let mut regs = self.getregs()?;
        let merged = merge_value(reg.get(&regs), value, width)?;
        reg.set(&mut regs, merged);
        self.setregs(regs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::ElfImage;
    use std::path::{Path, PathBuf};

    #[test]
    fn masks_narrow_correctly() {
        assert_eq!(mask_value(0x9900aabbccddeeff, 1).unwrap(), 0xff);
        assert_eq!(mask_value(0x9900aabbccddeeff, 2).unwrap(), 0xeeff);
        assert_eq!(mask_value(0x9900aabbccddeeff, 4).unwrap(), 0xccddeeff);
        assert_eq!(mask_value(0x9900aabbccddeeff, 8).unwrap(), 0x9900aabbccddeeff);
        assert!(mask_value(0, 3).is_err());
        assert!(mask_value(0, 0).is_err());
    }

    #[test]
    fn merges_leave_high_bytes_alone() {
        assert_eq!(merge_value(0x9900aabbccddeeff, 0x12, 1).unwrap(), 0x9900aabbccddee12);
        assert_eq!(merge_value(0x9900aabbccddeeff, 0x1234, 2).unwrap(), 0x9900aabbccdd1234);
        assert_eq!(
            merge_value(0x9900aabbccddeeff, 0x12345678, 4).unwrap(),
            0x9900aabb12345678
        );
        assert_eq!(merge_value(0x9900aabbccddeeff, 0x1, 8).unwrap(), 0x1);
        assert!(merge_value(0, 0, 16).is_err());
    }

    #[test]
    fn names_round_trip() {
        for reg in Register::ALL {
            assert_eq!(reg.name().parse::<Register>().unwrap(), reg);
        }
        assert!("rax ".parse::<Register>().is_err());
        assert!("xmm0".parse::<Register>().is_err());
    }

    #[test]
    fn get_and_set_address_every_field() {
        let mut regs: user_regs_struct = unsafe { std::mem::zeroed() };
        for (i, reg) in Register::ALL.into_iter().enumerate() {
            reg.set(&mut regs, i as u64 + 1);
        }
        for (i, reg) in Register::ALL.into_iter().enumerate() {
            assert_eq!(reg.get(&regs), i as u64 + 1, "{reg}");
        }
        assert_eq!(regs.rax, 11);
        assert_eq!(regs.rip, 17);
    }

    fn spawned(path: &str) -> Tracee {
        let image = ElfImage::new(Path::new(path), 0).unwrap();
        let mut tracee = Tracee::new(PathBuf::from(path), image);
        tracee.spawn(&[]).unwrap();
        tracee
    }

    #[test]
    fn width_writes_preserve_the_rest_of_the_register() {
        let tracee = spawned("/bin/true");
        tracee.write_register(Register::Rsi, 8, 0x9900aabbccddeeff).unwrap();
        tracee.write_register(Register::Rsi, 2, 0x1234).unwrap();
        assert_eq!(
            tracee.read_register(Register::Rsi, 8).unwrap(),
            0x9900aabbccdd1234
        );
        assert_eq!(tracee.read_register(Register::Rsi, 2).unwrap(), 0x1234);
        assert_eq!(tracee.read_register(Register::Rsi, 1).unwrap(), 0x34);
        assert!(tracee.read_register(Register::Rsi, 5).is_err());
    }
}
