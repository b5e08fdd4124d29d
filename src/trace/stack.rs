//! Frame-pointer stack walking. Assumes the tracee was compiled with frame
//! pointers: `[rbp]` holds the saved frame pointer and `[rbp + 8]` the
//! return address.
//! See https://eli.thegreenplace.net/2011/09/06/stack-frame-layout-on-x86-64
use super::Tracee;
use crate::errors::Result;

/// Walks past any sane call depth; garbage frame chains can loop.
const MAX_FRAMES: usize = 256;

impl Tracee {
    /// The current RIP followed by the return addresses of each caller
    /// frame. The chain ends at a zero frame pointer, at the first frame
    /// whose memory can't be read (failure comes from the peek's errno, a
    /// word of all one bits is a legitimate value), or at the frame cap.
    pub fn backtrace(&self) -> Result<Vec<u64>> {
        let regs = self.getregs()?;
        let mut addresses = vec![regs.rip];
        let mut bp = regs.rbp;

        while addresses.len() < MAX_FRAMES {
            if bp == 0 {
                break;
            }
            let Ok(next_bp) = self.peek_word(bp) else {
                break;
            };
            let Ok(return_addr) = self.peek_word(bp + 8) else {
                break;
            };
            if self.peek_word(next_bp).is_err() {
                break;
            }
            addresses.push(return_addr);
            bp = next_bp;
        }
        Ok(addresses)
    }
}
