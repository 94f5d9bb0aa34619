//! Program image ingestion: ELF executables and raw FLASH dumps both end
//! up as read-only regions in the memory simulator.

pub mod bin;
pub mod elf;

pub use bin::load_bin_image;
pub use elf::load_elf_image;
