//! Tracee memory access. ptrace moves memory a word (8 bytes) at a time,
//! so ranges are transferred in word strides with a read-modify-write for
//! a trailing partial word.
//!
//! A peek returning -1 is a legitimate memory value; failure is signalled
//! through errno alone. nix's `ptrace::read` clears errno before the call
//! and reports through it, which is exactly the discrimination needed.
use super::Tracee;
use crate::errors::{Error, Result};
use nix::sys::ptrace;

const WORD: usize = 8;

impl Tracee {
    /// One word of tracee memory at `addr`.
    pub(super) fn peek_word(&self, addr: u64) -> Result<u64> {
        let pid = self.require_child()?;
        ptrace::read(pid, addr as ptrace::AddressType)
            .map(|word| word as u64)
            .map_err(|source| Error::memory_fault(addr, source))
    }

    pub(super) fn poke_word(&self, addr: u64, word: u64) -> Result<()> {
        let pid = self.require_child()?;
        ptrace::write(pid, addr as ptrace::AddressType, word as libc::c_long)
            .map_err(|source| Error::memory_fault(addr, source))
    }

    /// Fill `out` from tracee memory starting at `addr`.
    pub fn read_memory(&self, addr: u64, out: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < out.len() {
            let word = self.peek_word(addr + done as u64)?;
            let n = WORD.min(out.len() - done);
            out[done..done + n].copy_from_slice(&word.to_le_bytes()[..n]);
            done += n;
        }
        Ok(())
    }

    /// Copy `data` into tracee memory starting at `addr`. A partial tail
    /// peeks the underlying word and overlays the leading bytes so the rest
    /// of the word is preserved.
    pub fn write_memory(&self, addr: u64, data: &[u8]) -> Result<()> {
        let mut done = 0;
        while done < data.len() {
            let n = WORD.min(data.len() - done);
            let word = if n == WORD {
                u64::from_le_bytes(data[done..done + WORD].try_into().unwrap())
            } else {
                let old = self.peek_word(addr + done as u64)?;
                overlay_word(old, &data[done..])
            };
            self.poke_word(addr + done as u64, word)?;
            done += n;
        }
        Ok(())
    }

    /// Read a NUL-terminated string out of the tracee, one word at a time.
    pub fn read_cstr(&self, addr: u64) -> Result<String> {
        let mut ret = Vec::new();
        let mut buf = [0u8; WORD];
        let mut addr = addr;
        loop {
            self.read_memory(addr, &mut buf)?;
            match buf.iter().position(|b| *b == 0) {
                Some(end) => {
                    ret.extend_from_slice(&buf[..end]);
                    return Ok(String::from_utf8_lossy(&ret).into_owned());
                }
                None => ret.extend_from_slice(&buf),
            }
            addr += WORD as u64;
        }
    }
}

/// Overlay the leading bytes of a word, in memory order, with `bytes`.
/// x86-64 is little-endian so memory order is the low end of the value.
fn overlay_word(word: u64, bytes: &[u8]) -> u64 {
    let mut buf = word.to_le_bytes();
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::super::RunStatus;
    use super::*;
    use crate::elf::ElfImage;
    use std::path::{Path, PathBuf};

    #[test]
    fn overlay_replaces_only_the_leading_bytes() {
        assert_eq!(overlay_word(0x8877665544332211, &[0xaa]), 0x88776655443322aa);
        assert_eq!(
            overlay_word(0x8877665544332211, &[0xaa, 0xbb, 0xcc]),
            0x8877665544ccbbaa
        );
        assert_eq!(overlay_word(0x8877665544332211, &[]), 0x8877665544332211);
    }

    fn spawned(path: &str) -> Tracee {
        let image = ElfImage::new(Path::new(path), 0).unwrap();
        let mut tracee = Tracee::new(PathBuf::from(path), image);
        tracee.spawn(&[]).unwrap();
        tracee
    }

    #[test]
    fn round_trips_include_partial_words() {
        let tracee = spawned("/bin/true");
        let rsp = tracee.getregs().unwrap().rsp;

        for len in [1usize, 3, 7, 8, 11, 16] {
            let data: Vec<u8> = (1..=len as u8).collect();
            tracee.write_memory(rsp, &data).unwrap();
            let mut back = vec![0u8; len];
            tracee.read_memory(rsp, &mut back).unwrap();
            assert_eq!(back, data, "round trip of {len} bytes");
        }
    }

    #[test]
    fn partial_write_preserves_the_rest_of_the_word() {
        let tracee = spawned("/bin/true");
        let rsp = tracee.getregs().unwrap().rsp;

        tracee.write_memory(rsp, &0xdeadbeefcafebabe_u64.to_le_bytes()).unwrap();
        tracee.write_memory(rsp, &[0x11, 0x22]).unwrap();
        let mut back = [0u8; 8];
        tracee.read_memory(rsp, &mut back).unwrap();
        assert_eq!(u64::from_le_bytes(back), 0xdeadbeefcafe2211);
    }

    #[test]
    fn unmapped_addresses_fault() {
        let mut tracee = spawned("/bin/true");
        let mut buf = [0u8; 8];
        assert!(matches!(
            tracee.read_memory(8, &mut buf),
            Err(Error::MemoryFault { addr: 8, .. })
        ));
        assert_eq!(tracee.continue_process().unwrap(), RunStatus::Exited(0));
    }

    #[test]
    fn read_cstr_crosses_word_boundaries() {
        let tracee = spawned("/bin/true");
        let rsp = tracee.getregs().unwrap().rsp;
        tracee.write_memory(rsp, b"a rather long string\0").unwrap();
        assert_eq!(tracee.read_cstr(rsp).unwrap(), "a rather long string");
    }
}
