//! Everything that happens between the exec trap and handing the tracee to
//! the user: parse the auxiliary vector, discover the PIE load base,
//! rebase breakpoints, and enumerate the shared objects the dynamic linker
//! mapped.
//!
//! The linker's rendezvous structure (`r_debug`, reached through the
//! `DT_DEBUG` entry of the `PT_DYNAMIC` segment) is only populated once the
//! linker has run, so a one-shot breakpoint at the program entry point is
//! used to let it finish before the `link_map` list is walked.
use super::Tracee;
use crate::elf::{ElfImage, PHDR_SIZE};
use crate::errors::{Error, Result};
use crate::utils::{require, warn};
use log::info;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// Not exported by the libc crate, unlike AT_* and PT_DYNAMIC.
const DT_DEBUG: i64 = 21;

// Offsets into glibc's link_map: l_addr, l_name, l_ld, l_next, l_prev,
// five pointers. r_debug keeps r_map one pointer after r_version.
const LINK_MAP_SIZE: usize = 40;
const R_DEBUG_MAP_OFFSET: u64 = 8;

/// `/proc/<pid>/auxv` is a stream of (key, value) pairs ending at AT_NULL.
fn parse_auxv(bytes: &[u8]) -> HashMap<u64, u64> {
    let mut auxv = HashMap::new();
    for pair in bytes.chunks_exact(16) {
        let key = u64::from_le_bytes(pair[..8].try_into().unwrap());
        if key == libc::AT_NULL as u64 {
            break;
        }
        let value = u64::from_le_bytes(pair[8..].try_into().unwrap());
        auxv.insert(key, value);
    }
    auxv
}

impl Tracee {
    pub(super) fn auxv_entry(&self, key: u64) -> Result<u64> {
        self.auxv
            .get(&key)
            .copied()
            .ok_or_else(|| Error::internal(format!("auxv has no entry for key {key}")))
    }

    /// Runs once per spawn, with the tracee stopped at the exec trap.
    pub(super) fn post_spawn(&mut self) -> Result<()> {
        let pid = self.require_child()?;
        let auxv_path = format!("/proc/{pid}/auxv");
        let bytes = std::fs::read(&auxv_path).map_err(|source| Error::Io {
            path: PathBuf::from(auxv_path),
            source,
        })?;
        self.auxv = parse_auxv(&bytes);

        let entry = self.auxv_entry(libc::AT_ENTRY as u64)?;
        self.elf.set_base_from_entry(entry);
        if self.elf.base() != 0 {
            info!("PIE executable (base {:#x})", self.elf.base());
            self.rebase_breakpoints(self.elf.base())?;
        }

        let interp = self.elf.interp().map(str::to_string);
        if let Some(interp) = interp {
            let at_base = self.auxv_entry(libc::AT_BASE as u64)?;
            self.interp = Some(ElfImage::new(Path::new(&interp), at_base)?);

            // Let the linker run to the program entry point so r_debug is
            // filled in before we read it.
            info!("setting temporary breakpoint at entry point ({entry:#x})");
            self.insert_breakpoint(entry)?;
            self.continue_process()?;
            self.remove_breakpoint(entry)?;

            self.load_shared_libraries(&interp)?;
        }
        Ok(())
    }

    /// Shift every recorded breakpoint by the load base, once, and arm the
    /// shifted addresses so they are live before the linker runs.
    fn rebase_breakpoints(&mut self, base: u64) -> Result<()> {
        if self.rebased {
            return Ok(());
        }
        self.rebased = true;
        let moved: Vec<_> = self
            .breakpoints
            .drain()
            .map(|(_, mut bp)| {
                bp.addr = bp.addr.wrapping_add(base);
                bp
            })
            .collect();
        for bp in moved {
            let addr = bp.addr;
            self.breakpoints.insert(addr, bp);
            self.inject_breakpoint(addr)?;
        }
        Ok(())
    }

    /// Walk the linker's rendezvous list and open each shared object at the
    /// base the linker reports. The head entry (the executable itself), the
    /// interpreter, and the vdso are skipped.
    fn load_shared_libraries(&mut self, interp: &str) -> Result<()> {
        let (dyn_addr, dyn_size) = self
            .find_segment(libc::PT_DYNAMIC)?
            .ok_or_else(|| Error::internal("no PT_DYNAMIC segment"))?;
        let debug_addr = self
            .find_dynamic_entry(dyn_addr, dyn_size, DT_DEBUG)?
            .ok_or_else(|| Error::internal("dynamic segment has no DT_DEBUG entry"))?;
        let mut lm_addr = self.peek_word(debug_addr + R_DEBUG_MAP_OFFSET)?;

        while lm_addr != 0 {
            let mut lm = [0u8; LINK_MAP_SIZE];
            self.read_memory(lm_addr, &mut lm)?;
            let l_addr = u64::from_le_bytes(lm[0..8].try_into().unwrap());
            let l_name = u64::from_le_bytes(lm[8..16].try_into().unwrap());
            let l_next = u64::from_le_bytes(lm[24..32].try_into().unwrap());
            let l_prev = u64::from_le_bytes(lm[32..40].try_into().unwrap());
            lm_addr = l_next;

            if l_prev == 0 {
                continue; // list head, the executable itself
            }
            let name = self.read_cstr(l_name)?;
            if name == interp || name == "linux-vdso.so.1" {
                continue;
            }
            match ElfImage::new(Path::new(&name), l_addr) {
                Ok(image) => {
                    info!("adding shared library {name} ({l_addr:#x})");
                    self.shlibs.push(image);
                }
                Err(err) => warn(&format!("skipping shared library {name}: {err}")),
            }
        }
        Ok(())
    }

    /// Find a program header by type, reading the table out of the tracee
    /// at the location the kernel reported in the auxiliary vector. Returns
    /// the segment's relocated address and its size in memory.
    pub(super) fn find_segment(&self, ptype: u32) -> Result<Option<(u64, u64)>> {
        let phdr_addr = self.auxv_entry(libc::AT_PHDR as u64)?;
        let phnum = self.auxv_entry(libc::AT_PHNUM as u64)?;
        let phent = self.auxv_entry(libc::AT_PHENT as u64)?;
        require(phent == PHDR_SIZE as u64, "unexpected program header size")?;

        let mut phdr = [0u8; PHDR_SIZE as usize];
        for i in 0..phnum {
            self.read_memory(phdr_addr + i * phent, &mut phdr)?;
            let p_type = u32::from_le_bytes(phdr[0..4].try_into().unwrap());
            if p_type == ptype {
                let p_vaddr = u64::from_le_bytes(phdr[16..24].try_into().unwrap());
                let p_memsz = u64::from_le_bytes(phdr[40..48].try_into().unwrap());
                return Ok(Some((self.elf.base().wrapping_add(p_vaddr), p_memsz)));
            }
        }
        Ok(None)
    }

    /// Scan the in-memory dynamic table for a tag.
    pub(super) fn find_dynamic_entry(
        &self,
        dyn_addr: u64,
        dyn_size: u64,
        tag: i64,
    ) -> Result<Option<u64>> {
        let mut dyn_entry = [0u8; 16];
        for i in 0..dyn_size / 16 {
            self.read_memory(dyn_addr + i * 16, &mut dyn_entry)?;
            let d_tag = i64::from_le_bytes(dyn_entry[0..8].try_into().unwrap());
            if d_tag == tag {
                return Ok(Some(u64::from_le_bytes(dyn_entry[8..16].try_into().unwrap())));
            }
        }
        Ok(None)
    }
}
