//! Fault-cause decoding, shown in the debugger through `O` packets.
//!
//! When the captured exception is one of the Cortex-M fault handlers,
//! the session walks the System Control Block fault status registers in
//! the frozen memory image and prints what it finds before the stop
//! reply. A register that was not captured in the dump simply silences
//! its decoder; the crash report must never die over a missing word.

use super::Session;
use crate::comm::Comm;
use crate::fault::Result;
use crate::gdb::rsp;

/// Fault status registers in the System Control Block.
pub const CFSR: u32 = 0xE000_ED28;
pub const HFSR: u32 = 0xE000_ED2C;
pub const MMFAR: u32 = 0xE000_ED34;
pub const BFAR: u32 = 0xE000_ED38;

pub(crate) fn display_fault_cause<C: Comm>(session: &mut Session<'_, C>) -> Result<()> {
    match session.context.ipsr() {
        3 => display_hard_fault(session)?,
        4 => display_mem_fault(session)?,
        5 => display_bus_fault(session)?,
        6 => display_usage_fault(session)?,
        _ => return Ok(()),
    }
    write_string(session, "\n")
}

fn display_hard_fault<C: Comm>(session: &mut Session<'_, C>) -> Result<()> {
    const DEBUG_EVENT: u32 = 1 << 31;
    const FORCED: u32 = 1 << 30;
    const VECTOR_TABLE_READ: u32 = 1 << 1;

    write_string(session, "\n**Hard Fault**")?;

    let status = match session.mem.read32(HFSR) {
        Ok(status) => status,
        Err(_) => return Ok(()),
    };
    write_string(session, "\n  Status Register: ")?;
    write_hex_value(session, status)?;

    if status & DEBUG_EVENT != 0 {
        write_string(session, "\n    Debug Event")?;
    }
    if status & VECTOR_TABLE_READ != 0 {
        write_string(session, "\n    Vector Table Read")?;
    }
    if status & FORCED != 0 {
        write_string(session, "\n    Forced")?;
        display_mem_fault(session)?;
        display_bus_fault(session)?;
        display_usage_fault(session)?;
    }
    Ok(())
}

fn display_mem_fault<C: Comm>(session: &mut Session<'_, C>) -> Result<()> {
    const MMAR_VALID: u32 = 1 << 7;
    const FP_LAZY_PRESERVATION: u32 = 1 << 5;
    const STACKING_ERROR: u32 = 1 << 4;
    const UNSTACKING_ERROR: u32 = 1 << 3;
    const DATA_ACCESS: u32 = 1 << 1;
    const INSTRUCTION_FETCH: u32 = 1 << 0;

    let status = match session.mem.read32(CFSR) {
        Ok(cfsr) => cfsr & 0xFF,
        Err(_) => return Ok(()),
    };
    if status == 0 {
        return Ok(());
    }

    write_string(session, "\n**MPU Fault**")?;
    write_string(session, "\n  Status Register: ")?;
    write_hex_value(session, status)?;

    if status & MMAR_VALID != 0 {
        if let Ok(address) = session.mem.read32(MMFAR) {
            write_string(session, "\n    Fault Address: ")?;
            write_hex_value(session, address)?;
        }
    }
    if status & FP_LAZY_PRESERVATION != 0 {
        write_string(session, "\n    FP Lazy Preservation")?;
    }
    if status & STACKING_ERROR != 0 {
        write_string(session, "\n    Stacking Error")?;
    }
    if status & UNSTACKING_ERROR != 0 {
        write_string(session, "\n    Unstacking Error")?;
    }
    if status & DATA_ACCESS != 0 {
        write_string(session, "\n    Data Access")?;
    }
    if status & INSTRUCTION_FETCH != 0 {
        write_string(session, "\n    Instruction Fetch")?;
    }
    Ok(())
}

fn display_bus_fault<C: Comm>(session: &mut Session<'_, C>) -> Result<()> {
    const BFAR_VALID: u32 = 1 << 7;
    const FP_LAZY_PRESERVATION: u32 = 1 << 5;
    const STACKING_ERROR: u32 = 1 << 4;
    const UNSTACKING_ERROR: u32 = 1 << 3;
    const IMPRECISE_DATA_ACCESS: u32 = 1 << 2;
    const PRECISE_DATA_ACCESS: u32 = 1 << 1;
    const INSTRUCTION_PREFETCH: u32 = 1 << 0;

    let status = match session.mem.read32(CFSR) {
        Ok(cfsr) => (cfsr >> 8) & 0xFF,
        Err(_) => return Ok(()),
    };
    if status == 0 {
        return Ok(());
    }

    write_string(session, "\n**Bus Fault**")?;
    write_string(session, "\n  Status Register: ")?;
    write_hex_value(session, status)?;

    if status & BFAR_VALID != 0 {
        if let Ok(address) = session.mem.read32(BFAR) {
            write_string(session, "\n    Fault Address: ")?;
            write_hex_value(session, address)?;
        }
    }
    if status & FP_LAZY_PRESERVATION != 0 {
        write_string(session, "\n    FP Lazy Preservation")?;
    }
    if status & STACKING_ERROR != 0 {
        write_string(session, "\n    Stacking Error")?;
    }
    if status & UNSTACKING_ERROR != 0 {
        write_string(session, "\n    Unstacking Error")?;
    }
    if status & IMPRECISE_DATA_ACCESS != 0 {
        write_string(session, "\n    Imprecise Data Access")?;
    }
    if status & PRECISE_DATA_ACCESS != 0 {
        write_string(session, "\n    Precise Data Access")?;
    }
    if status & INSTRUCTION_PREFETCH != 0 {
        write_string(session, "\n    Instruction Prefetch")?;
    }
    Ok(())
}

fn display_usage_fault<C: Comm>(session: &mut Session<'_, C>) -> Result<()> {
    const DIVIDE_BY_ZERO: u32 = 1 << 9;
    const UNALIGNED: u32 = 1 << 8;
    const COPROCESSOR_ACCESS: u32 = 1 << 3;
    const INVALID_PC: u32 = 1 << 2;
    const INVALID_STATE: u32 = 1 << 1;
    const UNDEFINED_INSTRUCTION: u32 = 1 << 0;

    let status = match session.mem.read32(CFSR) {
        Ok(cfsr) => (cfsr >> 16) & 0xFFFF,
        Err(_) => return Ok(()),
    };
    if status == 0 {
        return Ok(());
    }

    write_string(session, "\n**Usage Fault**")?;
    write_string(session, "\n  Status Register: ")?;
    write_hex_value(session, status)?;

    if status & DIVIDE_BY_ZERO != 0 {
        write_string(session, "\n    Divide by Zero")?;
    }
    if status & UNALIGNED != 0 {
        write_string(session, "\n    Unaligned Access")?;
    }
    if status & COPROCESSOR_ACCESS != 0 {
        write_string(session, "\n    Coprocessor Access")?;
    }
    if status & INVALID_PC != 0 {
        write_string(session, "\n    Invalid Exception Return State")?;
    }
    if status & INVALID_STATE != 0 {
        write_string(session, "\n    Invalid State")?;
    }
    if status & UNDEFINED_INSTRUCTION != 0 {
        write_string(session, "\n    Undefined Instruction")?;
    }
    Ok(())
}

/// One console write is one `O` packet carrying the hex-spelled text.
fn write_string<C: Comm>(session: &mut Session<'_, C>, text: &str) -> Result<()> {
    let mut payload = Vec::with_capacity(1 + text.len() * 2);
    payload.push(b'O');
    for &byte in text.as_bytes() {
        rsp::push_hex_byte(&mut payload, byte);
    }
    session.send_packet(&payload)
}

/// Values print as `0x` plus however many whole bytes are significant,
/// at least one: 0 is `0x00`, 0x200 is `0x0200`.
fn write_hex_value<C: Comm>(session: &mut Session<'_, C>, value: u32) -> Result<()> {
    let mut bytes = 4;
    while bytes > 1 && (value >> ((bytes - 1) * 8)) & 0xFF == 0 {
        bytes -= 1;
    }
    let text = format!("0x{:0width$x}", value, width = bytes * 2);
    write_string(session, &text)
}
