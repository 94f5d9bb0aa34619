//! Crash dump ingestion.
//!
//! Three on-disk formats feed the register context and the memory
//! simulator: CrashCatcher binary dumps, their hex-encoded rendering, and
//! free-form GDB session logs. The format is sniffed from the first bytes
//! of the file; anything that is not a CrashCatcher dump is treated as a
//! GDB log.

pub mod crashcatcher;
pub mod gdblog;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::context::RegisterContext;
use crate::fault::{Fault, Result};
use crate::mem::MemorySim;

/// First two bytes of every CrashCatcher dump: ASCII "cC".
pub const SIGNATURE_BYTE0: u8 = 0x63;
pub const SIGNATURE_BYTE1: u8 = 0x43;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    CrashCatcherBinary,
    CrashCatcherHex,
    GdbLog,
}

/// Reads up to 4 bytes of the file and classifies it. Files shorter than
/// the signature fall through to the GDB log parser.
pub fn detect_format(path: &Path) -> Result<DumpFormat> {
    let mut file = File::open(path).map_err(|_| {
        Fault::file(format!(
            "Failed to open the \"{}\" dump file.",
            path.display()
        ))
    })?;
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match file.read(&mut header[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(_) => break,
        }
    }

    if header[0] == SIGNATURE_BYTE0 && header[1] == SIGNATURE_BYTE1 {
        Ok(DumpFormat::CrashCatcherBinary)
    } else if header == hex_signature() {
        Ok(DumpFormat::CrashCatcherHex)
    } else {
        Ok(DumpFormat::GdbLog)
    }
}

/// Ingests the dump at `path` into `mem` and `context`, auto-detecting
/// its format.
pub fn load_dump(mem: &mut MemorySim, context: &mut RegisterContext, path: &Path) -> Result<()> {
    let format = detect_format(path)?;
    log::info!("ingesting {} as {:?}", path.display(), format);
    match format {
        DumpFormat::CrashCatcherBinary => crashcatcher::read_binary(mem, context, path),
        DumpFormat::CrashCatcherHex => crashcatcher::read_hex(mem, context, path),
        DumpFormat::GdbLog => gdblog::parse(mem, context, path),
    }
}

/// Uppercase-hex ASCII rendering of the two signature bytes: "6343".
fn hex_signature() -> [u8; 4] {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    [
        DIGITS[(SIGNATURE_BYTE0 >> 4) as usize],
        DIGITS[(SIGNATURE_BYTE0 & 0xF) as usize],
        DIGITS[(SIGNATURE_BYTE1 >> 4) as usize],
        DIGITS[(SIGNATURE_BYTE1 & 0xF) as usize],
    ]
}
