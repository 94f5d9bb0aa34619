//! Free-form GDB log parser.
//!
//! Users paste `info all-registers` / `x` output into a text file and the
//! parser reconstructs registers and RAM from it. Two passes: the first
//! discovers contiguous memory ranges (coalescing consecutive lines) and
//! captures register values; the second rewinds and writes the memory
//! words into the regions created in between.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::context::{RegisterContext, DEFAULT_SP_VALUE, FPSCR, LR, MSP, PC, PSP, SP, XPSR};
use crate::fault::{Fault, Result};
use crate::mem::MemorySim;

/// Character width of the register name column in GDB output.
const NAME_FIELD_WIDTH: usize = 15;

/// Values per memory line; GDB prints at most four words.
const MAX_VALUES_PER_LINE: usize = 4;

pub fn parse(mem: &mut MemorySim, context: &mut RegisterContext, path: &Path) -> Result<()> {
    let file = File::open(path)
        .map_err(|_| Fault::file(format!("Failed to open \"{}\" GDB log.", path.display())))?;
    let mut reader = BufReader::new(file);

    context.r[MSP] = DEFAULT_SP_VALUE;
    context.r[PSP] = DEFAULT_SP_VALUE;

    run_pass(&mut reader, mem, context, Pass::Discover)?;
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|_| Fault::file("Failed to rewind GDB log for second pass."))?;
    run_pass(&mut reader, mem, context, Pass::Populate)
}

#[derive(Clone, Copy, PartialEq)]
enum Pass {
    Discover,
    Populate,
}

#[derive(Debug, PartialEq)]
enum Line {
    Memory { address: u32, values: Vec<u32> },
    Register { slot: Slot, value: u32 },
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Int(usize),
    Float(usize),
}

fn run_pass(
    reader: &mut BufReader<File>,
    mem: &mut MemorySim,
    context: &mut RegisterContext,
    pass: Pass,
) -> Result<()> {
    // Pending contiguous range discovered so far: (start, size).
    let mut region: Option<(u32, u32)> = None;
    let mut next_expected = 0xFFFF_FFFFu32;

    let mut text = String::new();
    loop {
        text.clear();
        match reader.read_line(&mut text) {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }
        match classify_line(&text) {
            Line::Memory { address, values } => match pass {
                Pass::Discover => {
                    if address != next_expected {
                        if let Some((start, size)) = region.take() {
                            mem.create_region(start, size)?;
                        }
                        region = Some((address, 0));
                    }
                    let span = (values.len() * 4) as u32;
                    if let Some((_, ref mut size)) = region {
                        *size += span;
                    }
                    next_expected = address.wrapping_add(span);
                }
                Pass::Populate => {
                    for (i, value) in values.iter().enumerate() {
                        mem.write32(address.wrapping_add(i as u32 * 4), *value)?;
                    }
                }
            },
            Line::Register { slot, value } => {
                if pass == Pass::Discover {
                    match slot {
                        Slot::Int(index) => context.r[index] = value,
                        Slot::Float(index) => {
                            if index < FPSCR {
                                context.set_float_state();
                            }
                            context.fpr[index] = value;
                        }
                    }
                }
            }
            Line::Other => {}
        }
    }

    if let Some((start, size)) = region {
        if size != 0 {
            mem.create_region(start, size)?;
        }
    }
    Ok(())
}

fn classify_line(line: &str) -> Line {
    if is_memory_line(line) {
        parse_memory_line(line)
    } else if let Some(slot) = register_slot(line) {
        Line::Register {
            slot,
            value: parse_register_line(line, slot),
        }
    } else {
        Line::Other
    }
}

/// Memory lines start with a `0x`-prefixed 8-digit address and carry at
/// least one more character past the address field.
fn is_memory_line(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.len() > 11
        && bytes[0] == b'0'
        && bytes[1] == b'x'
        && bytes[2..10].iter().all(|b| b.is_ascii_hexdigit())
        && line.is_char_boundary(11)
}

fn parse_memory_line(line: &str) -> Line {
    let (address, _) = parse_c_u32(line);
    // Step over the 0xXXXXXXXX address field; separators follow.
    let mut rest = &line[11..];
    let mut values = Vec::new();
    while values.len() < MAX_VALUES_PER_LINE {
        rest = skip_whitespace(rest);
        rest = skip_symbol(rest);
        rest = skip_whitespace(rest);
        if rest.is_empty() {
            break;
        }
        let (value, after) = parse_c_u32(rest);
        if after.len() == rest.len() {
            break;
        }
        values.push(value);
        rest = after;
    }
    Line::Memory { address, values }
}

fn skip_whitespace(text: &str) -> &str {
    text.trim_start()
}

/// Steps over a `<symbol+offset>` decoration, tracking nested angle
/// brackets; stops at the first whitespace outside the brackets.
fn skip_symbol(text: &str) -> &str {
    if !text.starts_with('<') {
        return text;
    }
    let mut nesting = 0i32;
    for (i, c) in text.char_indices() {
        match c {
            '<' => nesting += 1,
            '>' => nesting -= 1,
            c if c.is_whitespace() && nesting == 0 => return &text[i..],
            _ => {}
        }
    }
    ""
}

/// Recognizes the 15-character register name field: the name followed by
/// space padding through the full column.
fn register_slot(line: &str) -> Option<Slot> {
    let bytes = line.as_bytes();
    if bytes.len() < NAME_FIELD_WIDTH {
        return None;
    }
    let field = &bytes[..NAME_FIELD_WIDTH];
    let name_len = field
        .iter()
        .position(|&b| b == b' ')
        .unwrap_or(NAME_FIELD_WIDTH);
    if !field[name_len..].iter().all(|&b| b == b' ') {
        return None;
    }
    slot_for_name(std::str::from_utf8(&field[..name_len]).ok()?)
}

fn slot_for_name(name: &str) -> Option<Slot> {
    match name {
        "sp" => return Some(Slot::Int(SP)),
        "lr" => return Some(Slot::Int(LR)),
        "pc" => return Some(Slot::Int(PC)),
        "xpsr" => return Some(Slot::Int(XPSR)),
        "msp" => return Some(Slot::Int(MSP)),
        "psp" => return Some(Slot::Int(PSP)),
        "fpscr" => return Some(Slot::Float(FPSCR)),
        _ => {}
    }
    let (prefix, digits) = name.split_at(1.min(name.len()));
    if digits.is_empty() || (digits.len() > 1 && digits.starts_with('0')) {
        return None;
    }
    let number: usize = digits.parse().ok()?;
    match prefix {
        "r" if number <= 12 => Some(Slot::Int(number)),
        "s" if number <= 31 => Some(Slot::Float(number)),
        _ => None,
    }
}

fn parse_register_line(line: &str, slot: Slot) -> u32 {
    let rest = &line[NAME_FIELD_WIDTH..];
    match slot {
        Slot::Int(_) => parse_c_u32(rest).0,
        // FPSCR renders as a plain integer; S registers carry a float
        // with the raw bit pattern in parentheses.
        Slot::Float(index) if index == FPSCR => parse_c_u32(rest).0,
        Slot::Float(_) => parse_float_register(rest),
    }
}

/// Float lines look like `1\t(raw 0x3f800000)`; the raw bit pattern is
/// what gets stored. A missing raw clause stores all-ones.
fn parse_float_register(rest: &str) -> u32 {
    let after_value = match rest.find(char::is_whitespace) {
        Some(index) => &rest[index..],
        None => return 0xFFFF_FFFF,
    };
    let raw = skip_whitespace(after_value);
    match raw.strip_prefix("(raw ") {
        Some(raw_value) => parse_c_u32(raw_value).0,
        None => 0xFFFF_FFFF,
    }
}

/// C-style unsigned integer scan: optional whitespace, then `0x` hex,
/// `0` octal, or decimal digits. Returns the value and the unconsumed
/// tail; an empty scan returns the input untouched.
fn parse_c_u32(text: &str) -> (u32, &str) {
    let text = skip_whitespace(text);
    let bytes = text.as_bytes();
    let (radix, digits_at) = if bytes.len() > 2 && bytes[0] == b'0' && (bytes[1] | 0x20) == b'x' {
        (16, 2)
    } else if bytes.first() == Some(&b'0') {
        (8, 0)
    } else {
        (10, 0)
    };

    let mut value = 0u64;
    let mut index = digits_at;
    while index < bytes.len() {
        let digit = match (bytes[index] as char).to_digit(radix) {
            Some(digit) => digit,
            None => break,
        };
        value = (value * u64::from(radix) + u64::from(digit)) & 0xFFFF_FFFF;
        index += 1;
    }
    if index == digits_at {
        // No digits at all; report nothing consumed.
        return (0, text);
    }
    (value as u32, &text[index..])
}
