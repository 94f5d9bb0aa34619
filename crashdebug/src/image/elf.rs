//! ELF32 program image loader.
//!
//! Only the pieces of the format needed for FLASH reconstruction are
//! understood: a little-endian 32-bit executable whose PT_LOAD entries
//! carry initialized bytes. Each such entry becomes one read-only region
//! at its physical load address.

use crate::fault::{Fault, Result};
use crate::mem::MemorySim;

const EI_NIDENT: usize = 16;
const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const PT_LOAD: u32 = 1;

pub(crate) const EHDR_SIZE: u32 = 52;
pub(crate) const PHDR_SIZE: u32 = 32;

struct ElfHeader {
    ident: [u8; EI_NIDENT],
    e_type: u16,
    e_phoff: u32,
    e_phentsize: u16,
    e_phnum: u16,
}

struct ProgramHeader {
    p_type: u32,
    p_offset: u32,
    p_paddr: u32,
    p_filesz: u32,
    p_memsz: u32,
}

/// Loads every FLASH-loadable entry of `elf` into `mem`. At least one
/// entry must load for the image to be considered valid.
pub fn load_elf_image(mem: &mut MemorySim, elf: &[u8]) -> Result<()> {
    let header = parse_elf_header(elf)?;
    validate_elf_header(&header)?;

    let mut load_count = 0;
    let mut offset = header.e_phoff;
    for i in 0..header.e_phnum {
        let bytes = fetch(elf, offset, PHDR_SIZE).map_err(|fault| {
            fault.reword(format!(
                "ELF page header entry {} is at an invalid file offset of {}.",
                i, offset
            ))
        })?;
        let entry = parse_program_header(bytes);
        if is_flash_loadable(&entry) {
            load_entry(mem, elf, &entry)?;
            load_count += 1;
        }
        // Tolerate nonstandard, larger-than-minimum entry sizes.
        offset = offset.wrapping_add(u32::from(header.e_phentsize));
    }

    if load_count == 0 {
        return Err(Fault::elf_format(
            "ELF contained no entries which were loadable and had a valid non-zero filesz <= to memsz.",
        ));
    }
    log::info!("loaded {} segment(s) from ELF image", load_count);
    Ok(())
}

fn parse_elf_header(elf: &[u8]) -> Result<ElfHeader> {
    let bytes = fetch(elf, 0, EHDR_SIZE)
        .map_err(|fault| fault.reword("ELF was too short to contain valid header.".into()))?;
    let mut ident = [0u8; EI_NIDENT];
    ident.copy_from_slice(&bytes[..EI_NIDENT]);
    Ok(ElfHeader {
        ident,
        e_type: read_u16(bytes, 16),
        e_phoff: read_u32(bytes, 28),
        e_phentsize: read_u16(bytes, 42),
        e_phnum: read_u16(bytes, 44),
    })
}

fn validate_elf_header(header: &ElfHeader) -> Result<()> {
    if header.ident[..4] != ELF_MAGIC {
        return Err(Fault::elf_format(
            "ELF header doesn't start with expected magic ELF identifier.",
        ));
    }
    if header.ident[EI_CLASS] != ELFCLASS32 {
        return Err(Fault::elf_format("ELF header doesn't contain 32-bit flag."));
    }
    if header.ident[EI_DATA] != ELFDATA2LSB {
        return Err(Fault::elf_format(
            "ELF header doesn't contain little endian flag.",
        ));
    }
    if header.e_type != ET_EXEC {
        return Err(Fault::elf_format(
            "ELF header doesn't contain executable flag.",
        ));
    }
    if header.e_phoff == 0 {
        return Err(Fault::elf_format(
            "ELF header contains an invalid offset of 0 for the page headers.",
        ));
    }
    if header.e_phnum == 0 {
        return Err(Fault::elf_format(
            "ELF header contains an invalid page header entry count of 0.",
        ));
    }
    if u32::from(header.e_phentsize) < PHDR_SIZE {
        return Err(Fault::elf_format(format!(
            "ELF header contains a page header entry size of {}, which is smaller than the expected size of {}.",
            header.e_phentsize, PHDR_SIZE
        )));
    }
    Ok(())
}

fn parse_program_header(bytes: &[u8]) -> ProgramHeader {
    ProgramHeader {
        p_type: read_u32(bytes, 0),
        p_offset: read_u32(bytes, 4),
        p_paddr: read_u32(bytes, 12),
        p_filesz: read_u32(bytes, 16),
        p_memsz: read_u32(bytes, 20),
    }
}

fn is_flash_loadable(entry: &ProgramHeader) -> bool {
    entry.p_type == PT_LOAD && entry.p_filesz != 0 && entry.p_memsz >= entry.p_filesz
}

fn load_entry(mem: &mut MemorySim, elf: &[u8], entry: &ProgramHeader) -> Result<()> {
    let bytes = fetch(elf, entry.p_offset, entry.p_filesz).map_err(|fault| {
        fault.reword(format!(
            "ELF failed to load entry from file at offsets {} to {}.",
            entry.p_offset,
            entry.p_offset.wrapping_add(entry.p_filesz).wrapping_sub(1)
        ))
    })?;
    mem.create_region(entry.p_paddr, entry.p_filesz)?;
    mem.load_from_flash_image(entry.p_paddr, bytes)?;
    mem.make_read_only(entry.p_paddr)
}

fn fetch(blob: &[u8], offset: u32, size: u32) -> Result<&[u8]> {
    let end = u64::from(offset) + u64::from(size);
    if u64::from(offset) > blob.len() as u64 || end > blob.len() as u64 {
        return Err(Fault::elf_format("ELF blob access out of bounds."));
    }
    Ok(&blob[offset as usize..end as usize])
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::Fault;

    /// Builds a minimal 32-bit little-endian EXEC image with the given
    /// program header entries appended right after the ELF header.
    fn build_elf(entries: &[(u32, u32, u32, u32, u32)], payload: &[u8]) -> Vec<u8> {
        let mut elf = vec![0u8; EHDR_SIZE as usize];
        elf[..4].copy_from_slice(&ELF_MAGIC);
        elf[EI_CLASS] = ELFCLASS32;
        elf[EI_DATA] = ELFDATA2LSB;
        elf[16..18].copy_from_slice(&ET_EXEC.to_le_bytes());
        elf[28..32].copy_from_slice(&EHDR_SIZE.to_le_bytes()); // e_phoff
        elf[42..44].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
        elf[44..46].copy_from_slice(&(entries.len() as u16).to_le_bytes());
        for &(p_type, p_offset, p_paddr, p_filesz, p_memsz) in entries {
            let mut phdr = [0u8; PHDR_SIZE as usize];
            phdr[0..4].copy_from_slice(&p_type.to_le_bytes());
            phdr[4..8].copy_from_slice(&p_offset.to_le_bytes());
            phdr[12..16].copy_from_slice(&p_paddr.to_le_bytes());
            phdr[16..20].copy_from_slice(&p_filesz.to_le_bytes());
            phdr[20..24].copy_from_slice(&p_memsz.to_le_bytes());
            elf.extend_from_slice(&phdr);
        }
        elf.extend_from_slice(payload);
        elf
    }

    fn payload_offset(entry_count: u32) -> u32 {
        EHDR_SIZE + entry_count * PHDR_SIZE
    }

    fn elf_message(fault: Fault) -> String {
        match fault {
            Fault::ElfFormat { message } => message,
            other => panic!("expected ElfFormat fault, got {:?}", other),
        }
    }

    #[test]
    fn single_load_entry_becomes_read_only_region() {
        let mut mem = MemorySim::new();
        let elf = build_elf(
            &[(PT_LOAD, payload_offset(1), 0x0800_0000, 4, 4)],
            &[0x0D, 0xF0, 0xAD, 0xBA],
        );
        load_elf_image(&mut mem, &elf).unwrap();
        assert_eq!(mem.read32(0x0800_0000).unwrap(), 0xBAAD_F00D);
        assert_eq!(mem.write32(0x0800_0000, 0), Err(Fault::BusError));
    }

    #[test]
    fn non_load_and_empty_entries_are_skipped() {
        let mut mem = MemorySim::new();
        let elf = build_elf(
            &[
                (6, payload_offset(3), 0x1000_0000, 4, 4),     // PT_PHDR
                (PT_LOAD, payload_offset(3), 0x2000_0000, 0, 4), // empty
                (PT_LOAD, payload_offset(3), 0x0800_0000, 4, 4),
            ],
            &[1, 2, 3, 4],
        );
        load_elf_image(&mut mem, &elf).unwrap();
        assert_eq!(mem.read32(0x0800_0000).unwrap(), 0x0403_0201);
        assert_eq!(mem.read32(0x1000_0000), Err(Fault::BusError));
        assert_eq!(mem.read32(0x2000_0000), Err(Fault::BusError));
    }

    #[test]
    fn memsz_smaller_than_filesz_is_not_loadable() {
        let mut mem = MemorySim::new();
        let elf = build_elf(&[(PT_LOAD, payload_offset(1), 0, 4, 3)], &[1, 2, 3, 4]);
        let message = elf_message(load_elf_image(&mut mem, &elf).unwrap_err());
        assert_eq!(
            message,
            "ELF contained no entries which were loadable and had a valid non-zero filesz <= to memsz."
        );
    }

    #[test]
    fn short_header_is_rejected() {
        let mut mem = MemorySim::new();
        let message = elf_message(load_elf_image(&mut mem, &[0x7F, b'E']).unwrap_err());
        assert_eq!(message, "ELF was too short to contain valid header.");
    }

    #[test]
    fn header_validation_runs_in_order() {
        let mut mem = MemorySim::new();

        let mut elf = build_elf(&[(PT_LOAD, payload_offset(1), 0, 4, 4)], &[0; 4]);
        elf[0] = 0;
        assert_eq!(
            elf_message(load_elf_image(&mut mem, &elf).unwrap_err()),
            "ELF header doesn't start with expected magic ELF identifier."
        );

        let mut elf = build_elf(&[(PT_LOAD, payload_offset(1), 0, 4, 4)], &[0; 4]);
        elf[EI_CLASS] = 2;
        assert_eq!(
            elf_message(load_elf_image(&mut mem, &elf).unwrap_err()),
            "ELF header doesn't contain 32-bit flag."
        );

        let mut elf = build_elf(&[(PT_LOAD, payload_offset(1), 0, 4, 4)], &[0; 4]);
        elf[EI_DATA] = 2;
        assert_eq!(
            elf_message(load_elf_image(&mut mem, &elf).unwrap_err()),
            "ELF header doesn't contain little endian flag."
        );

        let mut elf = build_elf(&[(PT_LOAD, payload_offset(1), 0, 4, 4)], &[0; 4]);
        elf[16] = 1; // ET_REL
        assert_eq!(
            elf_message(load_elf_image(&mut mem, &elf).unwrap_err()),
            "ELF header doesn't contain executable flag."
        );

        let mut elf = build_elf(&[(PT_LOAD, payload_offset(1), 0, 4, 4)], &[0; 4]);
        elf[28..32].copy_from_slice(&0u32.to_le_bytes());
        assert_eq!(
            elf_message(load_elf_image(&mut mem, &elf).unwrap_err()),
            "ELF header contains an invalid offset of 0 for the page headers."
        );

        let mut elf = build_elf(&[(PT_LOAD, payload_offset(1), 0, 4, 4)], &[0; 4]);
        elf[44..46].copy_from_slice(&0u16.to_le_bytes());
        assert_eq!(
            elf_message(load_elf_image(&mut mem, &elf).unwrap_err()),
            "ELF header contains an invalid page header entry count of 0."
        );

        let mut elf = build_elf(&[(PT_LOAD, payload_offset(1), 0, 4, 4)], &[0; 4]);
        elf[42..44].copy_from_slice(&8u16.to_le_bytes());
        assert_eq!(
            elf_message(load_elf_image(&mut mem, &elf).unwrap_err()),
            "ELF header contains a page header entry size of 8, which is smaller than the expected size of 32."
        );
    }

    #[test]
    fn program_header_outside_file_is_rejected_with_offset() {
        let mut mem = MemorySim::new();
        let mut elf = build_elf(&[(PT_LOAD, payload_offset(1), 0, 4, 4)], &[0; 4]);
        elf[28..32].copy_from_slice(&0x1000u32.to_le_bytes());
        assert_eq!(
            elf_message(load_elf_image(&mut mem, &elf).unwrap_err()),
            "ELF page header entry 0 is at an invalid file offset of 4096."
        );
    }

    #[test]
    fn segment_bytes_outside_file_are_rejected_with_range() {
        let mut mem = MemorySim::new();
        let elf = build_elf(&[(PT_LOAD, 0x2000, 0, 16, 16)], &[0; 4]);
        assert_eq!(
            elf_message(load_elf_image(&mut mem, &elf).unwrap_err()),
            "ELF failed to load entry from file at offsets 8192 to 8207."
        );
    }

    #[test]
    fn oversized_phentsize_steps_by_declared_size() {
        let mut mem = MemorySim::new();
        // Two 40-byte entries: a real PT_LOAD followed by 8 bytes of pad,
        // then garbage that must be skipped via the declared stride.
        let mut elf = vec![0u8; EHDR_SIZE as usize];
        elf[..4].copy_from_slice(&ELF_MAGIC);
        elf[EI_CLASS] = ELFCLASS32;
        elf[EI_DATA] = ELFDATA2LSB;
        elf[16..18].copy_from_slice(&ET_EXEC.to_le_bytes());
        elf[28..32].copy_from_slice(&EHDR_SIZE.to_le_bytes());
        elf[42..44].copy_from_slice(&40u16.to_le_bytes());
        elf[44..46].copy_from_slice(&1u16.to_le_bytes());
        let data_offset = EHDR_SIZE + 40;
        let mut phdr = [0u8; 40];
        phdr[0..4].copy_from_slice(&PT_LOAD.to_le_bytes());
        phdr[4..8].copy_from_slice(&data_offset.to_le_bytes());
        phdr[12..16].copy_from_slice(&0x0800_0000u32.to_le_bytes());
        phdr[16..20].copy_from_slice(&4u32.to_le_bytes());
        phdr[20..24].copy_from_slice(&4u32.to_le_bytes());
        elf.extend_from_slice(&phdr);
        elf.extend_from_slice(&[9, 8, 7, 6]);

        load_elf_image(&mut mem, &elf).unwrap();
        assert_eq!(mem.read32(0x0800_0000).unwrap(), 0x0607_0809);
    }
}
