//! CrashCatcher dump reader.
//!
//! The binary layout is signature, flags, integer registers, optional
//! floating point registers, then zero or more memory regions until end
//! of file. The hex rendering is the identical byte stream with each
//! byte spelled as two hex digits and newlines sprinkled anywhere
//! between digits.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::context::{RegisterContext, DEFAULT_SP_VALUE, FLOAT_REG_COUNT, MSP, PSP};
use crate::fault::{Fault, Result};
use crate::mem::MemorySim;

/// Dump versions understood by this reader.
const VERSION_MAJOR: u8 = 3;
const VERSION_MINOR: u8 = 0;

/// Written by CrashCatcher instead of a region header when it found its
/// stack guard corrupted while dumping.
pub const STACK_SENTINEL: u32 = 0xACCE_55ED;

/// Integer register words present in a dump: v3 carries the full file,
/// v2 predates MSP/PSP.
const V3_INTEGER_WORDS: usize = 19;
const V2_INTEGER_WORDS: usize = 17;

pub fn read_binary(mem: &mut MemorySim, context: &mut RegisterContext, path: &Path) -> Result<()> {
    let file = open_dump(path)?;
    read_dump(&mut BinarySource(BufReader::new(file)), mem, context)
}

pub fn read_hex(mem: &mut MemorySim, context: &mut RegisterContext, path: &Path) -> Result<()> {
    let file = open_dump(path)?;
    read_dump(&mut HexSource(BufReader::new(file)), mem, context)
}

fn open_dump(path: &Path) -> Result<File> {
    File::open(path).map_err(|_| {
        Fault::file(format!(
            "Failed to open the \"{}\" dump file.",
            path.display()
        ))
    })
}

/// Byte supply for the dump reader. Short counts signal end of stream;
/// only malformed hex raises a fault of its own.
trait ByteSource {
    fn read_up_to(&mut self, buffer: &mut [u8]) -> Result<usize>;
}

struct BinarySource<R: Read>(R);

impl<R: Read> ByteSource for BinarySource<R> {
    fn read_up_to(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buffer.len() {
            match self.0.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        Ok(filled)
    }
}

struct HexSource<R: Read>(R);

impl<R: Read> HexSource<R> {
    fn next_digit(&mut self) -> Result<Option<u8>> {
        loop {
            let mut byte = [0u8; 1];
            match self.0.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) if byte[0] == b'\r' || byte[0] == b'\n' => continue,
                Ok(_) => return nibble_value(byte[0]).map(Some),
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => return Ok(None),
            }
        }
    }
}

impl<R: Read> ByteSource for HexSource<R> {
    fn read_up_to(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        for slot in buffer.iter_mut() {
            let hi = match self.next_digit()? {
                Some(digit) => digit,
                None => break,
            };
            let lo = match self.next_digit()? {
                Some(digit) => digit,
                None => break,
            };
            *slot = (hi << 4) | lo;
            filled += 1;
        }
        Ok(filled)
    }
}

fn nibble_value(digit: u8) -> Result<u8> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        _ => Err(Fault::file_format(
            "The dump file contained an invalid hex digit.",
        )),
    }
}

fn read_dump<S: ByteSource>(
    source: &mut S,
    mem: &mut MemorySim,
    context: &mut RegisterContext,
) -> Result<()> {
    let version2 = validate_signature(source)?;
    read_flags(source, context)?;
    read_integer_registers(source, context, version2)?;
    read_float_registers(source, context)?;
    read_memory_regions(source, mem)
}

/// Checks the 4-byte signature. Returns true for a version 2 dump.
fn validate_signature<S: ByteSource>(source: &mut S) -> Result<bool> {
    let mut signature = [0u8; 4];
    if source.read_up_to(&mut signature)? != signature.len() {
        return Err(Fault::file_format(
            "The dump file was too short to contain the 4-byte signature.",
        ));
    }
    let current = [
        super::SIGNATURE_BYTE0,
        super::SIGNATURE_BYTE1,
        VERSION_MAJOR,
        VERSION_MINOR,
    ];
    let version2 = [super::SIGNATURE_BYTE0, super::SIGNATURE_BYTE1, 2, 0];
    if signature == current {
        Ok(false)
    } else if signature == version2 {
        Ok(true)
    } else {
        Err(Fault::file_format(
            "The dump file didn't start with the expected 4-byte signature.",
        ))
    }
}

fn read_flags<S: ByteSource>(source: &mut S, context: &mut RegisterContext) -> Result<()> {
    context.flags = read_word(source)
        .ok_or_else(|| Fault::file_format("The dump file was too short to contain the flags."))??;
    Ok(())
}

fn read_integer_registers<S: ByteSource>(
    source: &mut S,
    context: &mut RegisterContext,
    version2: bool,
) -> Result<()> {
    let words = if version2 {
        context.r[MSP] = DEFAULT_SP_VALUE;
        context.r[PSP] = DEFAULT_SP_VALUE;
        V2_INTEGER_WORDS
    } else {
        V3_INTEGER_WORDS
    };

    for index in 0..words {
        context.r[index] = read_word(source).ok_or_else(|| {
            Fault::file_format("The dump file was too short to contain the integer registers.")
        })??;
    }
    context.exception_psr = read_word(source).ok_or_else(|| {
        Fault::file_format("The dump file was too short to contain the exception PSR.")
    })??;
    Ok(())
}

fn read_float_registers<S: ByteSource>(source: &mut S, context: &mut RegisterContext) -> Result<()> {
    if !context.has_float_state() {
        return Ok(());
    }
    for index in 0..FLOAT_REG_COUNT {
        context.fpr[index] = read_word(source).ok_or_else(|| {
            Fault::file_format(
                "The dump file was too short to contain the floating point registers.",
            )
        })??;
    }
    Ok(())
}

fn read_memory_regions<S: ByteSource>(source: &mut S, mem: &mut MemorySim) -> Result<()> {
    loop {
        let mut header = [0u8; 8];
        let count = source.read_up_to(&mut header)?;
        if count == 4
            && u32::from_le_bytes([header[0], header[1], header[2], header[3]]) == STACK_SENTINEL
        {
            return Err(Fault::StackOverflow);
        }
        if count == 0 {
            return Ok(());
        }
        if count != header.len() {
            return Err(Fault::file_format(
                "The dump file contained a truncated memory region header.",
            ));
        }

        let start = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let end = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        load_region(source, mem, start, end).map_err(|fault| {
            fault.reword(format!(
                "The dump file failed to load RAM memory region at 0x{:08X} - 0x{:08X}.",
                start, end
            ))
        })?;
    }
}

/// Creates the region and streams its bytes in. A truncated stream
/// leaves the bytes already read in place and faults.
fn load_region<S: ByteSource>(
    source: &mut S,
    mem: &mut MemorySim,
    start: u32,
    end: u32,
) -> Result<()> {
    let length = end.wrapping_sub(start);
    mem.create_region(start, length)?;
    let mut address = start;
    for _ in 0..length {
        let mut byte = [0u8; 1];
        if source.read_up_to(&mut byte)? != 1 {
            return Err(Fault::file_format("truncated memory region"));
        }
        mem.write8(address, byte[0])?;
        address = address.wrapping_add(1);
    }
    Ok(())
}

/// Reads one little-endian word. `None` when the stream ended first;
/// the inner result carries hex-decode faults.
fn read_word<S: ByteSource>(source: &mut S) -> Option<Result<u32>> {
    let mut bytes = [0u8; 4];
    match source.read_up_to(&mut bytes) {
        Err(fault) => Some(Err(fault)),
        Ok(4) => Some(Ok(u32::from_le_bytes(bytes))),
        Ok(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{LR, PC, SP, XPSR};
    use std::io::Write;

    /// Serializes a v3 dump for the given context; regions are appended
    /// by the individual tests.
    fn v3_dump(context: &RegisterContext) -> Vec<u8> {
        let mut dump = vec![0x63, 0x43, VERSION_MAJOR, VERSION_MINOR];
        dump.extend_from_slice(&context.flags.to_le_bytes());
        for reg in context.r {
            dump.extend_from_slice(&reg.to_le_bytes());
        }
        dump.extend_from_slice(&context.exception_psr.to_le_bytes());
        if context.has_float_state() {
            for reg in context.fpr {
                dump.extend_from_slice(&reg.to_le_bytes());
            }
        }
        dump
    }

    fn v2_dump(context: &RegisterContext) -> Vec<u8> {
        let mut dump = vec![0x63, 0x43, 2, 0];
        dump.extend_from_slice(&context.flags.to_le_bytes());
        for reg in &context.r[..V2_INTEGER_WORDS] {
            dump.extend_from_slice(&reg.to_le_bytes());
        }
        dump.extend_from_slice(&context.exception_psr.to_le_bytes());
        if context.has_float_state() {
            for reg in context.fpr {
                dump.extend_from_slice(&reg.to_le_bytes());
            }
        }
        dump
    }

    fn append_region(dump: &mut Vec<u8>, start: u32, bytes: &[u8]) {
        dump.extend_from_slice(&start.to_le_bytes());
        dump.extend_from_slice(&(start + bytes.len() as u32).to_le_bytes());
        dump.extend_from_slice(bytes);
    }

    fn sample_context() -> RegisterContext {
        let mut context = RegisterContext::new();
        for (i, reg) in context.r.iter_mut().enumerate() {
            *reg = 0x1111_1111u32.wrapping_mul(i as u32);
        }
        context.r[SP] = 0x1000_8000;
        context.r[LR] = 0x0000_0000;
        context.r[PC] = 0x1000_4000;
        context.r[XPSR] = 1 << 24;
        context.exception_psr = (1 << 24) | 3;
        context
    }

    fn read_from_file(
        bytes: &[u8],
        reader: fn(&mut MemorySim, &mut RegisterContext, &Path) -> Result<()>,
    ) -> (MemorySim, RegisterContext, Result<()>) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        let mut mem = MemorySim::new();
        let mut context = RegisterContext::new();
        let result = reader(&mut mem, &mut context, file.path());
        (mem, context, result)
    }

    fn hex_encode(bytes: &[u8], line_bytes: usize) -> Vec<u8> {
        let mut text = Vec::new();
        for (i, byte) in bytes.iter().enumerate() {
            if line_bytes != 0 && i != 0 && i % line_bytes == 0 {
                text.extend_from_slice(b"\r\n");
            }
            text.extend_from_slice(format!("{:02X}", byte).as_bytes());
        }
        text
    }

    #[test]
    fn v3_registers_round_trip() {
        let expected = sample_context();
        let (_, context, result) = read_from_file(&v3_dump(&expected), read_binary);
        result.unwrap();
        assert_eq!(context, expected);
    }

    #[test]
    fn v3_float_registers_round_trip() {
        let mut expected = sample_context();
        expected.set_float_state();
        for (i, reg) in expected.fpr.iter_mut().enumerate() {
            *reg = i as u32;
        }
        expected.fpr[crate::context::FPSCR] = 0xBAAD_F00D;
        let (_, context, result) = read_from_file(&v3_dump(&expected), read_binary);
        result.unwrap();
        assert_eq!(context, expected);
    }

    #[test]
    fn v2_dump_defaults_msp_and_psp() {
        let mut on_wire = sample_context();
        on_wire.r[MSP] = 0xA5A5_A5A5;
        on_wire.r[PSP] = 0x5A5A_5A5A;
        let (_, context, result) = read_from_file(&v2_dump(&on_wire), read_binary);
        result.unwrap();

        let mut expected = on_wire;
        expected.r[MSP] = DEFAULT_SP_VALUE;
        expected.r[PSP] = DEFAULT_SP_VALUE;
        assert_eq!(context, expected);
    }

    #[test]
    fn memory_regions_populate_simulator() {
        let mut dump = v3_dump(&sample_context());
        append_region(&mut dump, 0x1000_0000, &0x1111_1111u32.to_le_bytes());
        append_region(&mut dump, 0x2000_0000, &0x2222_2222u32.to_le_bytes());
        let (mut mem, _, result) = read_from_file(&dump, read_binary);
        result.unwrap();
        assert_eq!(mem.read32(0x1000_0000).unwrap(), 0x1111_1111);
        assert_eq!(mem.read32(0x2000_0000).unwrap(), 0x2222_2222);
        assert_eq!(mem.read32(0x1000_0004), Err(Fault::BusError));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut dump = v3_dump(&sample_context());
        dump[2] = 4;
        let (_, _, result) = read_from_file(&dump, read_binary);
        assert_eq!(
            result.unwrap_err().to_string(),
            "The dump file didn't start with the expected 4-byte signature."
        );
    }

    #[test]
    fn truncation_points_name_the_missing_field() {
        let full = v3_dump(&sample_context());
        let cases: [(usize, &str); 4] = [
            (2, "The dump file was too short to contain the 4-byte signature."),
            (6, "The dump file was too short to contain the flags."),
            (30, "The dump file was too short to contain the integer registers."),
            (
                4 + 4 + V3_INTEGER_WORDS * 4 + 2,
                "The dump file was too short to contain the exception PSR.",
            ),
        ];
        for (length, message) in cases {
            let (_, _, result) = read_from_file(&full[..length], read_binary);
            assert_eq!(result.unwrap_err().to_string(), message, "at {}", length);
        }
    }

    #[test]
    fn truncated_float_block_is_reported() {
        let mut expected = sample_context();
        expected.set_float_state();
        let full = v3_dump(&expected);
        let (_, _, result) = read_from_file(&full[..full.len() - 2], read_binary);
        assert_eq!(
            result.unwrap_err().to_string(),
            "The dump file was too short to contain the floating point registers."
        );
    }

    #[test]
    fn truncated_region_header_is_reported() {
        let mut dump = v3_dump(&sample_context());
        dump.extend_from_slice(&0x1000_0000u32.to_le_bytes());
        dump.extend_from_slice(&[0x04, 0x00]);
        let (_, _, result) = read_from_file(&dump, read_binary);
        assert_eq!(
            result.unwrap_err().to_string(),
            "The dump file contained a truncated memory region header."
        );
    }

    #[test]
    fn truncated_region_data_keeps_partial_bytes() {
        let mut dump = v3_dump(&sample_context());
        dump.extend_from_slice(&0x1000_0000u32.to_le_bytes());
        dump.extend_from_slice(&0x1000_0004u32.to_le_bytes());
        dump.extend_from_slice(&[0x11, 0x11, 0x11]); // one byte short
        let (mut mem, _, result) = read_from_file(&dump, read_binary);
        let fault = result.unwrap_err();
        assert!(matches!(fault, Fault::FileFormat { .. }));
        assert_eq!(
            fault.to_string(),
            "The dump file failed to load RAM memory region at 0x10000000 - 0x10000004."
        );
        assert_eq!(mem.read32(0x1000_0000).unwrap(), 0x0011_1111);
    }

    #[test]
    fn stack_overflow_sentinel_stops_region_list() {
        let mut dump = v3_dump(&sample_context());
        append_region(&mut dump, 0x1000_0000, &0x1111_1111u32.to_le_bytes());
        dump.extend_from_slice(&STACK_SENTINEL.to_le_bytes());
        let (mut mem, _, result) = read_from_file(&dump, read_binary);
        assert_eq!(result, Err(Fault::StackOverflow));
        // The region before the sentinel is kept.
        assert_eq!(mem.read32(0x1000_0000).unwrap(), 0x1111_1111);
    }

    #[test]
    fn hex_dump_round_trips_with_interleaved_newlines() {
        let mut expected = sample_context();
        expected.set_float_state();
        for (i, reg) in expected.fpr.iter_mut().enumerate() {
            *reg = (i as u32) << 8;
        }
        let mut dump = v3_dump(&expected);
        append_region(&mut dump, 0x1000_0000, &[0xDE, 0xAD, 0xBE, 0xEF]);

        for line_bytes in [0usize, 1, 7, 16] {
            let (mut mem, context, result) =
                read_from_file(&hex_encode(&dump, line_bytes), read_hex);
            result.unwrap();
            assert_eq!(context, expected);
            assert_eq!(mem.read32(0x1000_0000).unwrap(), 0xEFBE_ADDE);
        }
    }

    #[test]
    fn hex_dump_accepts_lowercase_digits_past_signature() {
        let dump = v3_dump(&sample_context());
        let mut text = hex_encode(&dump, 0);
        text[8..].make_ascii_lowercase();
        let (_, context, result) = read_from_file(&text, read_hex);
        result.unwrap();
        assert_eq!(context, sample_context());
    }

    #[test]
    fn hex_dump_with_invalid_digit_faults() {
        let dump = v3_dump(&sample_context());
        let mut text = hex_encode(&dump, 0);
        text[20] = b'g';
        let (_, _, result) = read_from_file(&text, read_hex);
        assert_eq!(
            result.unwrap_err().to_string(),
            "The dump file contained an invalid hex digit."
        );
    }

    #[test]
    fn v2_float_dump_round_trips() {
        let mut on_wire = sample_context();
        on_wire.set_float_state();
        for (i, reg) in on_wire.fpr.iter_mut().enumerate() {
            *reg = i as u32 + 100;
        }
        let (_, context, result) = read_from_file(&v2_dump(&on_wire), read_binary);
        result.unwrap();
        let mut expected = on_wire;
        expected.r[MSP] = DEFAULT_SP_VALUE;
        expected.r[PSP] = DEFAULT_SP_VALUE;
        assert_eq!(context, expected);
    }
}
