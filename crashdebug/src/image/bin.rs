//! Raw binary image loader.
//!
//! Places the image verbatim at the caller-supplied base address and
//! marks it read-only. Unlike the FLASH-image path, no RAM region is
//! inferred from the first word; raw images may carry arbitrary payloads
//! at arbitrary bases.

use crate::fault::Result;
use crate::mem::MemorySim;

pub fn load_bin_image(mem: &mut MemorySim, base: u32, image: &[u8]) -> Result<()> {
    mem.create_region(base, image.len() as u32)?;
    mem.load_from_flash_image(base, image)?;
    mem.make_read_only(base)
}
