//! Helpers for building tables using the tabled crate.
use tabled::{
    builder::Builder,
    settings::{Alignment, Padding, Style, object::Columns},
};

struct TableCol {
    header: String,
    align: Alignment,
    fields: Vec<String>,
}

/// Borderless column-aligned table, e.g.
/// ```text
/// name            hex      decimal
/// rax        401136      4198710
/// rip        401136      4198710
/// ```
pub struct TableBuilder {
    cols: Vec<TableCol>,
}

impl TableBuilder {
    pub fn new() -> TableBuilder {
        TableBuilder { cols: Vec::new() }
    }

    /// Left aligned column
    pub fn add_col_l(&mut self, header: &str) {
        debug_assert!(!self.has_col(header));
        self.cols.push(TableCol {
            header: header.to_string(),
            align: Alignment::left(),
            fields: Vec::new(),
        });
    }

    /// Right aligned column
    pub fn add_col_r(&mut self, header: &str) {
        debug_assert!(!self.has_col(header));
        self.cols.push(TableCol {
            header: header.to_string(),
            align: Alignment::right(),
            fields: Vec::new(),
        });
    }

    /// Typically add_field! is used instead.
    pub fn add_str_field(&mut self, header: &str, value: String) {
        let col = self.find_col(header);
        if value.is_empty() {
            // For some reason empty fields screw up tabled formatting.
            col.fields.push(" ".to_string());
        } else {
            col.fields.push(value);
        }
    }

    pub fn println(&self, titles: bool) {
        println!("{}", self.table_str(titles));
    }

    // We need to preserve add_col ordering so we can't use a HashMap
    // but O(n) should be fine for tables.
    fn has_col(&self, header: &str) -> bool {
        self.cols.iter().any(|c| c.header == header)
    }

    fn find_col(&mut self, header: &str) -> &mut TableCol {
        self.cols.iter_mut().find(|c| c.header == header).unwrap() // programmer error to not have a col
    }

    fn table_str(&self, titles: bool) -> String {
        let height = self.cols[0].fields.len();
        let mut builder = Builder::with_capacity(height + 2, self.cols.len());
        if titles {
            let names: Vec<String> = self.cols.iter().map(|c| c.header.to_string()).collect();
            let dashes: Vec<String> = names.iter().map(|s| "-".repeat(s.len())).collect();
            builder.push_record(&names);
            builder.push_record(&dashes);
        }
        for i in 0..height {
            let row: Vec<String> = self.cols.iter().map(|c| c.fields[i].clone()).collect();
            builder.push_record(&row);
        }

        let mut table = builder.build();
        for (i, col) in self.cols.iter().enumerate() {
            table.modify(Columns::one(i), col.align);
        }
        table.modify(Columns::first(), Padding::new(0, 1, 0, 0));
        table.with(Style::empty());

        table.to_string()
    }
}

macro_rules! add_field {
    ($builder:ident, $header:literal, $value:expr) => {
        let s = format!("{}", $value);
        $builder.add_str_field($header, s);
    };
    ($builder:ident, $header:literal, $format:literal, $value:expr) => {
        let s = format!($format, $value);
        $builder.add_str_field($header, s);
    };
}
pub(crate) use add_field;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_land_in_their_columns() {
        let mut b = TableBuilder::new();
        b.add_col_l("name");
        b.add_col_r("hex");
        add_field!(b, "name", "rax");
        add_field!(b, "hex", "{:x}", 0xff0011u64);
        add_field!(b, "name", "rip");
        add_field!(b, "hex", "{:x}", 0x401136u64);

        let s = b.table_str(true);
        let lines: Vec<&str> = s.lines().filter(|l| !l.trim().is_empty()).collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("name") && lines[0].contains("hex"));
        assert!(lines[1].contains("----"));
        assert!(lines[2].contains("rax") && lines[2].contains("ff0011"));
        assert!(lines[3].contains("rip") && lines[3].contains("401136"));
    }
}
