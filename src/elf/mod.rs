//! ELF64 executable and shared-object support. The debugger maps files
//! read-only and walks them by offset: the ELF header, the section header
//! table, `.symtab`/`.strtab` and `.dynsym`/`.dynstr` for symbols, and
//! `.interp` for the program interpreter path.
//! Quick ELF reference: https://gist.github.com/x0nu11byt3/bcb35c3de461e5fb66173071a2379779
//!
//! Only little-endian ELF64 for EM_X86_64 is accepted; anything else is a
//! format error. Program headers are not read from the file at all: at run
//! time the kernel hands us their location through the auxiliary vector and
//! the tracing engine reads them out of the tracee instead.
pub mod image;
pub mod io;
pub mod layout;

pub use image::*;
pub use io::*;
pub use layout::*;
