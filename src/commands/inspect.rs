//! Verbs that look at (or patch) the stopped tracee: backtrace, registers,
//! and memory.
use super::resolve_addr;
use super::tables::{TableBuilder, add_field};
use crate::errors::{Error, Result};
use crate::repl::{ReadMemArgs, ReadRegArgs, WriteMemArgs, WriteRegArgs};
use crate::trace::{Register, Tracee};
use crate::utils::warn;
use std::cmp::Ordering;

pub fn backtrace(tracee: &Tracee) {
    fn run(tracee: &Tracee) -> Result<()> {
        for addr in tracee.backtrace()? {
            match tracee.lookup_addr(addr) {
                Some(name) => println!("{addr:#x} <{name}>"),
                None => println!("{addr:#x}"),
            }
        }
        Ok(())
    }
    if let Err(e) = run(tracee) {
        warn(&e.to_string());
    }
}

pub fn readreg(tracee: &Tracee, args: &ReadRegArgs) {
    fn run(tracee: &Tracee, args: &ReadRegArgs) -> Result<()> {
        match &args.reg {
            Some(name) => {
                let reg: Register = name.parse()?;
                let value = tracee.read_register(reg, 8)?;
                println!("{reg} = {value:#x}");
            }
            None => dump_registers(tracee)?,
        }
        Ok(())
    }
    if let Err(e) = run(tracee, args) {
        warn(&e.to_string());
    }
}

pub fn writereg(tracee: &Tracee, args: &WriteRegArgs) {
    fn run(tracee: &Tracee, args: &WriteRegArgs) -> Result<()> {
        let reg: Register = args.reg.parse()?;
        tracee.write_register(reg, args.width, args.value)?;
        let value = tracee.read_register(reg, 8)?;
        println!("{reg} = {value:#x}");
        Ok(())
    }
    if let Err(e) = run(tracee, args) {
        warn(&e.to_string());
    }
}

pub fn readmem(tracee: &Tracee, args: &ReadMemArgs) {
    fn run(tracee: &Tracee, args: &ReadMemArgs) -> Result<()> {
        let addr = resolve_addr(tracee, &args.addr)?;
        let mut buf = [0u8; 8];
        let size = check_size(args.size)?;
        tracee.read_memory(addr, &mut buf[..size])?;
        println!("{:#x}", u64::from_le_bytes(buf));
        Ok(())
    }
    if let Err(e) = run(tracee, args) {
        warn(&e.to_string());
    }
}

pub fn writemem(tracee: &Tracee, args: &WriteMemArgs) {
    fn run(tracee: &Tracee, args: &WriteMemArgs) -> Result<()> {
        let addr = resolve_addr(tracee, &args.addr)?;
        let size = check_size(args.size)?;
        tracee.write_memory(addr, &args.value.to_le_bytes()[..size])?;
        Ok(())
    }
    if let Err(e) = run(tracee, args) {
        warn(&e.to_string());
    }
}

/// Memory verbs print a single hex value, so they move at most one word.
fn check_size(size: u32) -> Result<usize> {
    if (1..=8).contains(&size) {
        Ok(size as usize)
    } else {
        Err(Error::bad_argument(format!(
            "size {size} isn't between 1 and 8"
        )))
    }
}

fn dump_registers(tracee: &Tracee) -> Result<()> {
    let regs = tracee.getregs()?;
    let mut tuples: Vec<(&'static str, u64)> = Register::ALL
        .into_iter()
        .map(|reg| (reg.name(), reg.get(&regs)))
        .collect();

    // These come out in a really annoying order so we'll sort them.
    tuples.sort_by(|lhs, rhs| {
        let lhs_num = lhs.0[1..].parse::<i32>();
        let rhs_num = rhs.0[1..].parse::<i32>();
        if let Ok(n1) = lhs_num
            && let Ok(n2) = rhs_num
        {
            // numeric registers are sorted by value, eg r9 before r11
            n1.cmp(&n2)
        } else if lhs_num.is_ok() {
            // alpha registers appear before numeric, eg rbp before r10
            Ordering::Greater
        } else if rhs_num.is_ok() {
            Ordering::Less
        } else {
            lhs.cmp(rhs)
        }
    });

    let mut builder = TableBuilder::new();
    builder.add_col_l("name");
    builder.add_col_r("hex");
    builder.add_col_r("decimal");
    for (name, value) in tuples.iter() {
        add_field!(builder, "name", name);
        add_field!(builder, "hex", "{:x}", value);
        add_field!(builder, "decimal", value);
    }
    builder.println(false);
    Ok(())
}
