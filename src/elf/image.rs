//! A parsed executable or shared object plus the function symbols it
//! contributes to address resolution.
use super::{
    ELF_MAGIC, EHDR_SIZE, ET_DYN, ET_EXEC, EM_X86_64, ElfHeader, PHDR_SIZE, Reader, SHDR_SIZE,
    SHN_UNDEF, SHT_DYNSYM, SHT_STRTAB, SHT_SYMTAB, STT_FUNC, SYM_SIZE, SectionHeader, SymbolEntry,
};
use crate::errors::Result;
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// An mmap'd ELF file. `base` is 0 for fixed-address executables, the load
/// bias discovered at run time for PIE executables, and the dynamic
/// linker's `l_addr` for shared objects. The `Mmap` inside `reader` owns
/// the mapping, so an image can be moved but never cloned and the region is
/// unmapped exactly once.
pub struct ElfImage {
    path: PathBuf,
    reader: Reader,
    base: u64,
    entry: u64,
    sections: Vec<SectionHeader>,
    shstrtab: usize,
    syms: HashMap<String, u64>,
}

impl ElfImage {
    pub fn new(path: &Path, base: u64) -> Result<Self> {
        let reader = Reader::new(path)?;
        if reader.slice(0, 4)? != &ELF_MAGIC[..] {
            return Err(reader.bad("not an ELF file"));
        }
        let header = ElfHeader::parse(&reader)?;
        if header.machine != EM_X86_64 {
            return Err(reader.bad("unsupported machine"));
        }
        if header.etype != ET_EXEC && header.etype != ET_DYN {
            return Err(reader.bad("unsupported file type"));
        }
        if header.ehdr_size != EHDR_SIZE {
            return Err(reader.bad("wrong ehdr size"));
        }
        if header.ph_entry_size != PHDR_SIZE {
            return Err(reader.bad("wrong phdr size"));
        }
        if header.section_entry_size != SHDR_SIZE {
            return Err(reader.bad("wrong shdr size"));
        }

        let mut sections = Vec::new();
        let mut offset = header.section_offset as usize;
        for _ in 0..header.num_section_entries {
            sections.push(SectionHeader::parse(&reader, offset)?);
            offset += header.section_entry_size as usize;
        }
        let shstrtab = sections
            .get(header.string_table_index as usize)
            .ok_or_else(|| reader.bad("bad section string table index"))?;
        if shstrtab.stype != SHT_STRTAB {
            return Err(reader.bad("shstrtab is not a string table"));
        }
        let shstrtab = shstrtab.offset as usize;

        let mut syms = HashMap::new();
        Self::collect_syms(&reader, &sections, shstrtab, &mut syms, ".symtab", ".strtab")?;
        Self::collect_syms(&reader, &sections, shstrtab, &mut syms, ".dynsym", ".dynstr")?;
        debug!("{} symbols loaded from {}", syms.len(), path.display());

        Ok(ElfImage {
            path: path.to_path_buf(),
            entry: header.entry,
            reader,
            base,
            sections,
            shstrtab,
            syms,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn entry(&self) -> u64 {
        self.entry
    }

    /// Derive the PIE load bias from the entry point the kernel reported.
    pub fn set_base_from_entry(&mut self, runtime_entry: u64) {
        self.base = runtime_entry.wrapping_sub(self.entry);
    }

    /// Contents of the `.interp` section, i.e. the program interpreter
    /// path, if the file has one.
    pub fn interp(&self) -> Option<&str> {
        let shdr = self.find_section(".interp")?;
        self.reader.read_str(shdr.offset as usize).ok()
    }

    /// The relocated address of a function symbol.
    pub fn lookup_sym(&self, name: &str) -> Option<u64> {
        self.syms.get(name).map(|value| self.base.wrapping_add(*value))
    }

    /// The function symbol nearest below `addr`, with its relocated
    /// address. Symbol sizes are not consulted.
    pub fn nearest_sym(&self, addr: u64) -> Option<(&str, u64)> {
        let addr = addr.wrapping_sub(self.base);
        let mut ret: Option<(&str, u64)> = None;
        for (sym, sym_addr) in &self.syms {
            if addr >= *sym_addr && *sym_addr >= ret.map_or(0, |r| r.1) {
                ret = Some((sym, *sym_addr));
            }
        }
        ret.map(|(sym, sym_addr)| (sym, self.base.wrapping_add(sym_addr)))
    }

    /// The name of the function containing `addr`, by nearest-below.
    pub fn lookup_addr(&self, addr: u64) -> Option<&str> {
        self.nearest_sym(addr).map(|(sym, _)| sym)
    }

    fn find_section(&self, name: &str) -> Option<&SectionHeader> {
        Self::section_by_name(&self.reader, &self.sections, self.shstrtab, name)
    }

    fn section_by_name<'a>(
        reader: &Reader,
        sections: &'a [SectionHeader],
        shstrtab: usize,
        name: &str,
    ) -> Option<&'a SectionHeader> {
        sections
            .iter()
            .find(|s| reader.read_str(shstrtab + s.name as usize).ok() == Some(name))
    }

    /// Merge one symbol table into `syms`. Either table may be absent; a
    /// name already present is kept (first table wins).
    fn collect_syms(
        reader: &Reader,
        sections: &[SectionHeader],
        shstrtab: usize,
        syms: &mut HashMap<String, u64>,
        symtab_name: &str,
        strtab_name: &str,
    ) -> Result<()> {
        let Some(symtab) = Self::section_by_name(reader, sections, shstrtab, symtab_name) else {
            debug!("no {symtab_name} section in {}", reader.path().display());
            return Ok(());
        };
        if symtab.entry_size != SYM_SIZE {
            return Err(reader.bad("symbol table has unexpected entry size"));
        }
        if symtab.stype != SHT_SYMTAB && symtab.stype != SHT_DYNSYM {
            return Err(reader.bad("symbol table has unexpected section type"));
        }
        let strtab = Self::section_by_name(reader, sections, shstrtab, strtab_name)
            .ok_or_else(|| reader.bad("symbol table has no corresponding string table"))?;
        if strtab.stype != SHT_STRTAB {
            return Err(reader.bad("symbol string table is not a string table"));
        }

        for i in 0..symtab.size / SYM_SIZE {
            let sym = SymbolEntry::parse(reader, (symtab.offset + i * SYM_SIZE) as usize)?;
            if sym.stype() == STT_FUNC && sym.shndx != SHN_UNDEF {
                let name = reader.read_str(strtab.offset as usize + sym.name as usize)?;
                syms.entry(name.to_string()).or_insert(sym.value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct SymSpec {
        name: &'static str,
        value: u64,
        info: u8,
        shndx: u16,
    }

    impl SymSpec {
        fn func(name: &'static str, value: u64) -> SymSpec {
            SymSpec {
                name,
                value,
                info: 0x12, // GLOBAL | FUNC
                shndx: 1,
            }
        }
    }

    fn put_half(bytes: &mut [u8], offset: usize, v: u16) {
        bytes[offset..offset + 2].copy_from_slice(&v.to_le_bytes());
    }

    fn put_word(bytes: &mut [u8], offset: usize, v: u32) {
        bytes[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn put_xword(bytes: &mut [u8], offset: usize, v: u64) {
        bytes[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
    }

    fn shdr(name: u32, stype: u32, offset: u64, size: u64, link: u32, entsize: u64) -> [u8; 64] {
        let mut s = [0u8; 64];
        put_word(&mut s, 0, name);
        put_word(&mut s, 4, stype);
        put_xword(&mut s, 24, offset);
        put_xword(&mut s, 32, size);
        put_word(&mut s, 40, link);
        put_xword(&mut s, 56, entsize);
        s
    }

    /// A minimal but structurally honest ELF64: null section, .shstrtab,
    /// .symtab + .strtab, and optionally .interp.
    fn build_elf(etype: u16, entry: u64, syms: &[SymSpec], interp: Option<&str>) -> Vec<u8> {
        let shnum = if interp.is_some() { 5 } else { 4 };
        let shstrtab: &[u8] = b"\0.shstrtab\0.symtab\0.strtab\0.interp\0";
        let shstrtab_off = 64 + shnum * 64;

        let mut strtab = vec![0u8];
        let mut name_offsets = Vec::new();
        for sym in syms {
            name_offsets.push(strtab.len() as u32);
            strtab.extend_from_slice(sym.name.as_bytes());
            strtab.push(0);
        }
        let strtab_off = shstrtab_off + shstrtab.len();
        let symtab_off = strtab_off + strtab.len();
        let symtab_size = 24 * syms.len();
        let interp_off = symtab_off + symtab_size;

        let mut bytes = vec![0u8; 64];
        bytes[0..4].copy_from_slice(&ELF_MAGIC);
        bytes[4] = 2; // ELFCLASS64
        bytes[5] = 1; // little endian
        bytes[6] = 1; // EV_CURRENT
        put_half(&mut bytes, 0x10, etype);
        put_half(&mut bytes, 0x12, EM_X86_64);
        put_word(&mut bytes, 0x14, 1);
        put_xword(&mut bytes, 0x18, entry);
        put_xword(&mut bytes, 0x28, 64); // e_shoff
        put_half(&mut bytes, 0x34, 64); // e_ehsize
        put_half(&mut bytes, 0x36, 56); // e_phentsize
        put_half(&mut bytes, 0x3a, 64); // e_shentsize
        put_half(&mut bytes, 0x3c, shnum as u16);
        put_half(&mut bytes, 0x3e, 1); // e_shstrndx

        bytes.extend_from_slice(&[0u8; 64]); // null section
        bytes.extend_from_slice(&shdr(1, SHT_STRTAB, shstrtab_off as u64, shstrtab.len() as u64, 0, 0));
        bytes.extend_from_slice(&shdr(11, SHT_SYMTAB, symtab_off as u64, symtab_size as u64, 3, 24));
        bytes.extend_from_slice(&shdr(19, SHT_STRTAB, strtab_off as u64, strtab.len() as u64, 0, 0));
        if let Some(path) = interp {
            bytes.extend_from_slice(&shdr(27, 1, interp_off as u64, path.len() as u64 + 1, 0, 0));
        }

        bytes.extend_from_slice(shstrtab);
        bytes.extend_from_slice(&strtab);
        for (sym, name_off) in syms.iter().zip(name_offsets) {
            let mut entry = [0u8; 24];
            put_word(&mut entry, 0, name_off);
            entry[4] = sym.info;
            put_half(&mut entry, 6, sym.shndx);
            put_xword(&mut entry, 8, sym.value);
            bytes.extend_from_slice(&entry);
        }
        if let Some(path) = interp {
            bytes.extend_from_slice(path.as_bytes());
            bytes.push(0);
        }
        bytes
    }

    fn write_elf(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn lookup_sym_applies_base() {
        let syms = [SymSpec::func("f", 0x1000), SymSpec::func("g", 0x1010)];
        let file = write_elf(&build_elf(ET_EXEC, 0x1000, &syms, None));
        let image = ElfImage::new(file.path(), 0).unwrap();
        assert_eq!(image.lookup_sym("f"), Some(0x1000));
        assert_eq!(image.lookup_sym("g"), Some(0x1010));
        assert_eq!(image.lookup_sym("missing"), None);
    }

    #[test]
    fn base_from_runtime_entry() {
        let syms = [SymSpec::func("f", 0x1000)];
        let file = write_elf(&build_elf(ET_DYN, 0x1040, &syms, None));
        let mut image = ElfImage::new(file.path(), 0).unwrap();
        image.set_base_from_entry(0x5555_5555_1040);
        assert_eq!(image.base(), 0x5555_5555_0000);
        assert_eq!(image.lookup_sym("f"), Some(0x5555_5555_1000));
    }

    #[test]
    fn lookup_addr_picks_nearest_below() {
        let syms = [SymSpec::func("f", 0x1000), SymSpec::func("g", 0x1010)];
        let file = write_elf(&build_elf(ET_EXEC, 0x1000, &syms, None));
        let image = ElfImage::new(file.path(), 0).unwrap();
        assert_eq!(image.lookup_addr(0x1000), Some("f"));
        assert_eq!(image.lookup_addr(0x100f), Some("f"));
        assert_eq!(image.lookup_addr(0x1010), Some("g"));
        assert_eq!(image.lookup_addr(0x2000), Some("g"));
        assert_eq!(image.lookup_addr(0xfff), None);
    }

    #[test]
    fn interp_is_exposed() {
        let path = "/lib64/ld-linux-x86-64.so.2";
        let file = write_elf(&build_elf(ET_DYN, 0x1040, &[], Some(path)));
        let image = ElfImage::new(file.path(), 0).unwrap();
        assert_eq!(image.interp(), Some(path));

        let file = write_elf(&build_elf(ET_EXEC, 0x401000, &[], None));
        let image = ElfImage::new(file.path(), 0).unwrap();
        assert_eq!(image.interp(), None);
    }

    #[test]
    fn non_function_and_undefined_symbols_are_skipped() {
        let syms = [
            SymSpec::func("f", 0x1000),
            SymSpec {
                name: "global_var",
                value: 0x2000,
                info: 0x11, // GLOBAL | OBJECT
                shndx: 1,
            },
            SymSpec {
                name: "puts",
                value: 0,
                info: 0x12,
                shndx: SHN_UNDEF,
            },
        ];
        let file = write_elf(&build_elf(ET_EXEC, 0x1000, &syms, None));
        let image = ElfImage::new(file.path(), 0).unwrap();
        assert_eq!(image.lookup_sym("f"), Some(0x1000));
        assert_eq!(image.lookup_sym("global_var"), None);
        assert_eq!(image.lookup_sym("puts"), None);
    }

    #[test]
    fn duplicate_symbols_first_wins() {
        let syms = [SymSpec::func("dup", 0x1000), SymSpec::func("dup", 0x2000)];
        let file = write_elf(&build_elf(ET_EXEC, 0x1000, &syms, None));
        let image = ElfImage::new(file.path(), 0).unwrap();
        assert_eq!(image.lookup_sym("dup"), Some(0x1000));
    }

    #[test]
    fn validation_rejects_bad_files() {
        let good = build_elf(ET_EXEC, 0x1000, &[], None);

        let mut bad_magic = good.clone();
        bad_magic[0] = 0x7e;
        let file = write_elf(&bad_magic);
        assert!(ElfImage::new(file.path(), 0).is_err());

        let mut bad_machine = good.clone();
        put_half(&mut bad_machine, 0x12, 40); // EM_ARM
        let file = write_elf(&bad_machine);
        assert!(ElfImage::new(file.path(), 0).is_err());

        let mut bad_type = good.clone();
        put_half(&mut bad_type, 0x10, 1); // ET_REL
        let file = write_elf(&bad_type);
        assert!(ElfImage::new(file.path(), 0).is_err());

        let mut bad_shentsize = good.clone();
        put_half(&mut bad_shentsize, 0x3a, 40);
        let file = write_elf(&bad_shentsize);
        assert!(ElfImage::new(file.path(), 0).is_err());
    }
}
