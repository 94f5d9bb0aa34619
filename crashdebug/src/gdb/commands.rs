//! Packet command handlers.
//!
//! Each handler answers one RSP command against the frozen context and
//! memory. Post-mortem rules apply throughout: continue and step leave
//! the state untouched, breakpoint mutations succeed without arming
//! anything, and a memory fault inside one transfer never escapes past
//! its error reply.

use super::{rsp, xml, Session};
use crate::comm::Comm;
use crate::context::{FLOAT_REG_COUNT, INTEGER_REG_COUNT};
use crate::fault::Result;

pub(crate) enum Action {
    Reply(Vec<u8>),
    /// Leave the command loop; the run loop re-announces the stop state.
    Resume,
}

const ERROR_INVALID_ARGUMENT: &[u8] = b"E01";
const ERROR_MEMORY_ACCESS_FAILURE: &[u8] = b"E03";

pub(crate) fn dispatch<C: Comm>(session: &mut Session<'_, C>, packet: &[u8]) -> Result<Action> {
    let (&command, args) = match packet.split_first() {
        Some(split) => split,
        None => return Ok(Action::Reply(Vec::new())),
    };
    match command {
        b'g' => read_registers(session),
        b'G' => write_registers(session, args),
        b'm' => read_memory(session, args),
        b'M' => write_memory(session, args),
        b'c' | b's' => {
            // The crash already happened; execution cannot move.
            log::trace!("inert {} request", command as char);
            Ok(Action::Resume)
        }
        b'?' => Ok(Action::Reply(session.stop_reply_payload())),
        b'Z' | b'z' => update_breakpoint(args),
        b'q' => query(session, packet),
        _ => Ok(Action::Reply(Vec::new())),
    }
}

fn reply(payload: &[u8]) -> Result<Action> {
    Ok(Action::Reply(payload.to_vec()))
}

fn read_registers<C: Comm>(session: &mut Session<'_, C>) -> Result<Action> {
    let mut out = Vec::new();
    for value in session.context.r {
        rsp::push_hex_word_le(&mut out, value);
    }
    if session.context.has_float_state() {
        for value in session.context.fpr {
            rsp::push_hex_word_le(&mut out, value);
        }
    }
    Ok(Action::Reply(out))
}

fn write_registers<C: Comm>(session: &mut Session<'_, C>, args: &[u8]) -> Result<Action> {
    let words = if session.context.has_float_state() {
        INTEGER_REG_COUNT + FLOAT_REG_COUNT
    } else {
        INTEGER_REG_COUNT
    };
    let mut bytes = Vec::with_capacity(words * 4);
    if rsp::parse_hex_bytes(args, words * 4, &mut bytes).is_none() {
        return reply(ERROR_INVALID_ARGUMENT);
    }

    let mut values = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    for reg in session.context.r.iter_mut() {
        *reg = values.next().unwrap_or(0);
    }
    if session.context.has_float_state() {
        for reg in session.context.fpr.iter_mut() {
            *reg = values.next().unwrap_or(0);
        }
    }
    reply(b"OK")
}

fn read_memory<C: Comm>(session: &mut Session<'_, C>, args: &[u8]) -> Result<Action> {
    let (address, length) = match parse_address_and_length(args) {
        Some(parsed) => parsed,
        None => return reply(ERROR_INVALID_ARGUMENT),
    };

    let mut out = Vec::new();
    let transferred = transfer_read(session, address, length, &mut out);
    if transferred == 0 {
        return reply(ERROR_MEMORY_ACCESS_FAILURE);
    }
    Ok(Action::Reply(out))
}

/// Reads up to `length` bytes, widest aligned chunks first, stopping at
/// the first fault. Returns how many bytes made it into `out`.
fn transfer_read<C: Comm>(
    session: &mut Session<'_, C>,
    address: u32,
    length: u32,
    out: &mut Vec<u8>,
) -> u32 {
    let mut done = 0u32;
    if address % 4 == 0 && length % 4 == 0 {
        while done < length {
            match session.mem.read32(address.wrapping_add(done)) {
                Ok(word) => rsp::push_hex_word_le(out, word),
                Err(_) => break,
            }
            done += 4;
        }
    } else if address % 2 == 0 && length % 2 == 0 {
        while done < length {
            match session.mem.read16(address.wrapping_add(done)) {
                Ok(half) => {
                    for byte in half.to_le_bytes() {
                        rsp::push_hex_byte(out, byte);
                    }
                }
                Err(_) => break,
            }
            done += 2;
        }
    } else {
        while done < length {
            match session.mem.read8(address.wrapping_add(done)) {
                Ok(byte) => rsp::push_hex_byte(out, byte),
                Err(_) => break,
            }
            done += 1;
        }
    }
    done
}

fn write_memory<C: Comm>(session: &mut Session<'_, C>, args: &[u8]) -> Result<Action> {
    let (address, rest, length) = match parse_hex_pair(args, b',') {
        Some((address, rest)) => match rsp::parse_hex_u32(rest) {
            Some((length, rest)) => (address, rest, length),
            None => return reply(ERROR_INVALID_ARGUMENT),
        },
        None => return reply(ERROR_INVALID_ARGUMENT),
    };
    let data = match rest.strip_prefix(b":") {
        Some(data) => data,
        None => return reply(ERROR_INVALID_ARGUMENT),
    };
    let mut bytes = Vec::with_capacity(length as usize);
    if rsp::parse_hex_bytes(data, length as usize, &mut bytes).is_none() {
        return reply(ERROR_INVALID_ARGUMENT);
    }

    if transfer_write(session, address, &bytes) {
        reply(b"OK")
    } else {
        reply(ERROR_MEMORY_ACCESS_FAILURE)
    }
}

fn transfer_write<C: Comm>(session: &mut Session<'_, C>, address: u32, bytes: &[u8]) -> bool {
    let length = bytes.len() as u32;
    let mut done = 0u32;
    if address % 4 == 0 && length % 4 == 0 {
        while done < length {
            let i = done as usize;
            let word = u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
            if session.mem.write32(address.wrapping_add(done), word).is_err() {
                return false;
            }
            done += 4;
        }
    } else if address % 2 == 0 && length % 2 == 0 {
        while done < length {
            let i = done as usize;
            let half = u16::from_le_bytes([bytes[i], bytes[i + 1]]);
            if session.mem.write16(address.wrapping_add(done), half).is_err() {
                return false;
            }
            done += 2;
        }
    } else {
        while done < length {
            if session
                .mem
                .write8(address.wrapping_add(done), bytes[done as usize])
                .is_err()
            {
                return false;
            }
            done += 1;
        }
    }
    true
}

/// `Z`/`z`: every type a debugger can ask for is acknowledged and none
/// is armed; breakpoints cannot fire on a target that never runs.
fn update_breakpoint(args: &[u8]) -> Result<Action> {
    let (&kind, rest) = match args.split_first() {
        Some(split) => split,
        None => return Ok(Action::Reply(Vec::new())),
    };
    if !kind.is_ascii_digit() || kind > b'4' {
        return Ok(Action::Reply(Vec::new()));
    }
    let rest = match rest.strip_prefix(b",") {
        Some(rest) => rest,
        None => return reply(ERROR_INVALID_ARGUMENT),
    };
    if parse_hex_pair(rest, b',')
        .and_then(|(_, rest)| rsp::parse_hex_u32(rest))
        .is_none()
    {
        return reply(ERROR_INVALID_ARGUMENT);
    }
    reply(b"OK")
}

fn query<C: Comm>(session: &mut Session<'_, C>, packet: &[u8]) -> Result<Action> {
    if packet.starts_with(b"qSupported") {
        return reply(b"qXfer:memory-map:read+;qXfer:features:read+;PacketSize=4000");
    }
    if let Some(args) = packet.strip_prefix(b"qXfer:memory-map:read::") {
        let document = session.mem.memory_map_xml().as_bytes().to_vec();
        return xfer_chunk(&document, args);
    }
    if let Some(args) = packet.strip_prefix(b"qXfer:features:read:target.xml:") {
        let document = if session.context.has_float_state() {
            xml::TARGET_FPU_XML
        } else {
            xml::TARGET_XML
        };
        return xfer_chunk(document.as_bytes(), args);
    }
    Ok(Action::Reply(Vec::new()))
}

/// Serves one `offset,length` window of an xfer document. `l` marks the
/// final chunk, `m` asks the debugger to come back for more.
fn xfer_chunk(document: &[u8], args: &[u8]) -> Result<Action> {
    let (offset, length) = match parse_address_and_length(args) {
        Some(parsed) => parsed,
        None => return reply(ERROR_INVALID_ARGUMENT),
    };
    let offset = offset as usize;
    if offset >= document.len() {
        return reply(b"l");
    }
    let end = document.len().min(offset + length as usize);
    let mut out = Vec::with_capacity(end - offset + 1);
    out.push(if end == document.len() { b'l' } else { b'm' });
    out.extend_from_slice(&document[offset..end]);
    Ok(Action::Reply(out))
}

fn parse_address_and_length(args: &[u8]) -> Option<(u32, u32)> {
    let (address, rest) = parse_hex_pair(args, b',')?;
    let (length, _) = rsp::parse_hex_u32(rest)?;
    Some((address, length))
}

/// Parses a hex value followed by `separator`, returning the value and
/// the bytes after the separator.
fn parse_hex_pair(args: &[u8], separator: u8) -> Option<(u32, &[u8])> {
    let (value, rest) = rsp::parse_hex_u32(args)?;
    let rest = rest.strip_prefix(std::slice::from_ref(&separator))?;
    Some((value, rest))
}
