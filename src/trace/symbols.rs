//! Name and address resolution across everything loaded into the tracee:
//! the main executable, the program interpreter, and the shared libraries
//! in load order. First match wins; duplicate symbols across libraries are
//! not disambiguated by version.
use super::Tracee;
use crate::elf::ElfImage;

impl Tracee {
    fn images(&self) -> impl Iterator<Item = &ElfImage> {
        std::iter::once(&self.elf)
            .chain(self.interp.iter())
            .chain(self.shlibs.iter())
    }

    /// The relocated address of a function symbol, searching the images in
    /// load order.
    pub fn lookup_sym(&self, name: &str) -> Option<u64> {
        self.images().find_map(|image| image.lookup_sym(name))
    }

    /// The name of the function containing `addr`: the nearest function
    /// symbol at or below it across every image.
    pub fn lookup_addr(&self, addr: u64) -> Option<&str> {
        let mut best: Option<(&str, u64)> = None;
        for image in self.images() {
            if let Some((sym, sym_addr)) = image.nearest_sym(addr) {
                // An image loaded above addr produces a wrapped, bogus
                // candidate; only below counts.
                if sym_addr <= addr && best.is_none_or(|(_, b)| sym_addr > b) {
                    best = Some((sym, sym_addr));
                }
            }
        }
        best.map(|(sym, _)| sym)
    }
}
