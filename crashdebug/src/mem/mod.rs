//! Simulated target memory.
//!
//! Memory is an ordered arena of regions. A region either owns its backing
//! bytes or is an alias that forwards every access into another region's
//! storage at a fixed redirect address. Regions loaded from a program
//! image are marked read-only, which also arms a per-half-word read
//! counter used to observe which FLASH words a debugger fetched.

pub mod watchpoint;

pub use watchpoint::{Watchpoint, WatchpointKind};

use crate::fault::{Fault, Result};

/// FLASH image contents land at this address when regions are derived
/// from a raw image.
pub const FLASH_BASE_ADDRESS: u32 = 0x0000_0000;

/// The derived RAM region starts at `initial_sp & RAM_ADDRESS_MASK`.
pub const RAM_ADDRESS_MASK: u32 = 0xF000_0000;

const XML_HEADER: &str = "<?xml version=\"1.0\"?>\
    <!DOCTYPE memory-map PUBLIC \"+//IDN gnu.org//DTD GDB Memory Map V1.0//EN\" \
    \"http://sourceware.org/gdb/gdb-memory-map.dtd\">\
    <memory-map>";
const XML_TRAILER: &str = "</memory-map>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessIntent {
    Reading,
    Writing,
    /// Image ingestion: writes through read-only markings and never
    /// trips break/watchpoints or read counters.
    Loading,
}

impl AccessIntent {
    fn watchpoint_mask(self) -> WatchpointKind {
        match self {
            AccessIntent::Reading | AccessIntent::Loading => WatchpointKind::READ,
            AccessIntent::Writing => WatchpointKind::WRITE,
        }
    }
}

#[derive(Debug)]
struct RegionStore {
    data: Vec<u8>,
    read_only: bool,
    read_counts: Option<Vec<u32>>,
    watchpoints: Vec<Watchpoint>,
}

#[derive(Debug)]
enum RegionKind {
    Owned(RegionStore),
    /// Forwards into `target`'s store; an access at `base + k` lands on
    /// target address `redirect + k`.
    Alias { target: usize, redirect: u32 },
}

#[derive(Debug)]
struct Region {
    base: u32,
    size: u32,
    kind: RegionKind,
}

impl Region {
    fn contains(&self, address: u32, size: u32) -> bool {
        address >= self.base
            && u64::from(address) + u64::from(size) <= u64::from(self.base) + u64::from(self.size)
    }
}

/// The simulated memory of the crashed target.
#[derive(Debug, Default)]
pub struct MemorySim {
    regions: Vec<Region>,
    map_xml: Option<String>,
    watchpoints_hit: u32,
}

impl MemorySim {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new zero-filled region. Overlap with existing regions is
    /// not rejected; lookups resolve to the earliest created match.
    pub fn create_region(&mut self, base: u32, size: u32) -> Result<()> {
        let mut data = Vec::new();
        data.try_reserve_exact(size as usize)
            .map_err(|_| Fault::out_of_memory())?;
        data.resize(size as usize, 0);
        self.regions.push(Region {
            base,
            size,
            kind: RegionKind::Owned(RegionStore {
                data,
                read_only: false,
                read_counts: None,
                watchpoints: Vec::new(),
            }),
        });
        self.map_xml = None;
        log::debug!("created region {:#010x} len {:#x}", base, size);
        Ok(())
    }

    /// Appends an alias that redirects `[alias_base, alias_base+size)` to
    /// `[redirect, ...)` inside an existing region. The alias is clamped
    /// to the bytes the target region has left past `redirect`.
    pub fn create_alias(&mut self, alias_base: u32, redirect: u32, size: u32) -> Result<()> {
        let index = self.find_region(redirect, 1)?;
        let (target, offset) = self.resolve(index, redirect);
        let clamped = size.min(self.regions[target].size - offset);
        let redirect = self.regions[target].base + offset;
        self.regions.push(Region {
            base: alias_base,
            size: clamped,
            kind: RegionKind::Alias { target, redirect },
        });
        self.map_xml = None;
        log::debug!(
            "created alias {:#010x} len {:#x} -> {:#010x}",
            alias_base,
            clamped,
            redirect
        );
        Ok(())
    }

    /// Marks the region containing `base` read-only and arms its
    /// half-word read counters. Through an alias, the shared target
    /// region transitions.
    pub fn make_read_only(&mut self, base: u32) -> Result<()> {
        let index = self.find_region(base, 1)?;
        let (target, _) = self.resolve(index, base);
        let half_words = (self.regions[target].size / 2) as usize;
        let mut counts = Vec::new();
        counts
            .try_reserve_exact(half_words)
            .map_err(|_| Fault::out_of_memory())?;
        counts.resize(half_words, 0);
        let store = self.store_mut(target);
        store.read_only = true;
        store.read_counts = Some(counts);
        self.map_xml = None;
        Ok(())
    }

    /// Writes an image into already-created regions through the loading
    /// path, a word at a time with a byte-sized tail.
    pub fn load_from_flash_image(&mut self, base: u32, image: &[u8]) -> Result<()> {
        let mut address = base;
        let mut rest = image;
        while rest.len() > 4 {
            let word = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
            self.load32(address, word)?;
            address = address.wrapping_add(4);
            rest = &rest[4..];
        }
        for &byte in rest {
            self.load8(address, byte)?;
            address = address.wrapping_add(1);
        }
        Ok(())
    }

    /// Builds the FLASH region at address 0 from a raw image, marks it
    /// read-only, and derives a RAM region from the initial stack pointer
    /// stored in the image's first word.
    pub fn create_regions_from_flash_image(&mut self, image: &[u8]) -> Result<()> {
        if image.len() < 4 {
            return Err(Fault::BufferOverrun);
        }
        self.create_region(FLASH_BASE_ADDRESS, image.len() as u32)?;
        self.load_from_flash_image(FLASH_BASE_ADDRESS, image)?;
        self.make_read_only(FLASH_BASE_ADDRESS)?;

        let end_ram = u32::from_le_bytes([image[0], image[1], image[2], image[3]]);
        let base_ram = end_ram & RAM_ADDRESS_MASK;
        self.create_region(base_ram, end_ram - base_ram)
    }

    /// The cached GDB memory-map document. Regenerated after any region
    /// or read-only change.
    pub fn memory_map_xml(&mut self) -> &str {
        if self.map_xml.is_none() {
            let mut xml = String::from(XML_HEADER);
            for i in 0..self.regions.len() {
                let region = &self.regions[i];
                let read_only = match region.kind {
                    RegionKind::Owned(ref store) => store.read_only,
                    RegionKind::Alias { target, .. } => self.store(target).read_only,
                };
                if read_only {
                    xml.push_str(&format!(
                        "<memory type=\"flash\" start=\"0x{:X}\" length=\"0x{:X}\"> \
                         <property name=\"blocksize\">1</property></memory>",
                        region.base, region.size
                    ));
                } else {
                    xml.push_str(&format!(
                        "<memory type=\"ram\" start=\"0x{:X}\" length=\"0x{:X}\"></memory>",
                        region.base, region.size
                    ));
                }
            }
            xml.push_str(XML_TRAILER);
            self.map_xml = Some(xml);
        }
        self.map_xml.as_deref().unwrap_or(XML_TRAILER)
    }

    /// Number of half-word reads observed at `address` since the owning
    /// region became read-only. Only valid on FLASH regions.
    pub fn flash_read_count(&self, address: u32) -> Result<u32> {
        let index = self.find_region(address, 2)?;
        let (target, offset) = self.resolve(index, address);
        let store = self.store(target);
        if !store.read_only {
            return Err(Fault::BusError);
        }
        match store.read_counts {
            Some(ref counts) => Ok(counts[(offset / 2) as usize]),
            None => Err(Fault::BusError),
        }
    }

    pub fn set_hardware_breakpoint(&mut self, address: u32, size: u32) -> Result<()> {
        self.set_watchpoint(address, size, WatchpointKind::BREAKPOINT)
    }

    pub fn clear_hardware_breakpoint(&mut self, address: u32, size: u32) -> Result<()> {
        self.clear_watchpoint(address, size, WatchpointKind::BREAKPOINT)
    }

    pub fn set_hardware_watchpoint(
        &mut self,
        address: u32,
        size: u32,
        kind: WatchpointKind,
    ) -> Result<()> {
        self.set_watchpoint(address, size, kind)
    }

    pub fn clear_hardware_watchpoint(
        &mut self,
        address: u32,
        size: u32,
        kind: WatchpointKind,
    ) -> Result<()> {
        self.clear_watchpoint(address, size, kind)
    }

    /// Latched watchpoint indicator; reading it clears it.
    pub fn watchpoint_encountered(&mut self) -> bool {
        let hit = self.watchpoints_hit != 0;
        self.watchpoints_hit = 0;
        hit
    }

    pub fn read8(&mut self, address: u32) -> Result<u8> {
        let (target, offset) = self.access(address, 1, AccessIntent::Reading, true)?;
        Ok(self.store(target).data[offset as usize])
    }

    pub fn read16(&mut self, address: u32) -> Result<u16> {
        let (target, offset) = self.access(address, 2, AccessIntent::Reading, true)?;
        let data = &self.store(target).data;
        let offset = offset as usize;
        Ok(u16::from_le_bytes([data[offset], data[offset + 1]]))
    }

    pub fn read32(&mut self, address: u32) -> Result<u32> {
        let (target, offset) = self.access(address, 4, AccessIntent::Reading, true)?;
        let data = &self.store(target).data;
        let offset = offset as usize;
        Ok(u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]))
    }

    pub fn write8(&mut self, address: u32, value: u8) -> Result<()> {
        let (target, offset) = self.access(address, 1, AccessIntent::Writing, true)?;
        self.store_mut(target).data[offset as usize] = value;
        Ok(())
    }

    pub fn write16(&mut self, address: u32, value: u16) -> Result<()> {
        let (target, offset) = self.access(address, 2, AccessIntent::Writing, true)?;
        let data = &mut self.store_mut(target).data;
        data[offset as usize..offset as usize + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn write32(&mut self, address: u32, value: u32) -> Result<()> {
        let (target, offset) = self.access(address, 4, AccessIntent::Writing, true)?;
        let data = &mut self.store_mut(target).data;
        data[offset as usize..offset as usize + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Read-intent view of the backing bytes. Break/watchpoints are not
    /// consulted; half-word views still count as FLASH reads.
    pub fn bytes(&mut self, address: u32, size: u32) -> Result<&[u8]> {
        let (target, offset) = self.access(address, size, AccessIntent::Reading, false)?;
        let offset = offset as usize;
        Ok(&self.store(target).data[offset..offset + size as usize])
    }

    /// Write-intent view of the backing bytes; read-only regions refuse.
    pub fn bytes_mut(&mut self, address: u32, size: u32) -> Result<&mut [u8]> {
        let (target, offset) = self.access(address, size, AccessIntent::Writing, false)?;
        let offset = offset as usize;
        Ok(&mut self.store_mut(target).data[offset..offset + size as usize])
    }

    fn load8(&mut self, address: u32, value: u8) -> Result<()> {
        let (target, offset) = self.access(address, 1, AccessIntent::Loading, false)?;
        self.store_mut(target).data[offset as usize] = value;
        Ok(())
    }

    fn load32(&mut self, address: u32, value: u32) -> Result<()> {
        let (target, offset) = self.access(address, 4, AccessIntent::Loading, false)?;
        let data = &mut self.store_mut(target).data;
        data[offset as usize..offset as usize + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn find_region(&self, address: u32, size: u32) -> Result<usize> {
        self.regions
            .iter()
            .position(|region| region.contains(address, size))
            .ok_or(Fault::BusError)
    }

    /// Follows an alias to the owning region. Returns the owning region's
    /// index and the byte offset of `address` within its store.
    fn resolve(&self, index: usize, address: u32) -> (usize, u32) {
        match self.regions[index].kind {
            RegionKind::Owned(_) => (index, address - self.regions[index].base),
            RegionKind::Alias { target, redirect } => {
                let target_address = redirect + (address - self.regions[index].base);
                (target, target_address - self.regions[target].base)
            }
        }
    }

    fn store(&self, index: usize) -> &RegionStore {
        match self.regions[index].kind {
            RegionKind::Owned(ref store) => store,
            RegionKind::Alias { .. } => unreachable!("alias targets are always owned regions"),
        }
    }

    fn store_mut(&mut self, index: usize) -> &mut RegionStore {
        match self.regions[index].kind {
            RegionKind::Owned(ref mut store) => store,
            RegionKind::Alias { .. } => unreachable!("alias targets are always owned regions"),
        }
    }

    /// Gatekeeper for every simulated access. Resolves the owning store,
    /// enforces read-only, bumps FLASH read counters for half-word reads
    /// and runs the break/watchpoint scan before any byte moves.
    fn access(
        &mut self,
        address: u32,
        size: u32,
        intent: AccessIntent,
        check_watchpoints: bool,
    ) -> Result<(usize, u32)> {
        let index = self.find_region(address, size)?;
        let (target, offset) = self.resolve(index, address);

        let store = self.store_mut(target);
        if intent == AccessIntent::Writing && store.read_only {
            return Err(Fault::BusError);
        }
        if intent == AccessIntent::Reading && size == 2 {
            if let Some(ref mut counts) = store.read_counts {
                counts[(offset / 2) as usize] += 1;
            }
        }

        if check_watchpoints {
            let resolved = self.regions[target].base + offset;
            let (hits, breakpoint) =
                scan_watchpoints(self.store(target), resolved, size, intent.watchpoint_mask());
            self.watchpoints_hit += hits;
            if breakpoint {
                return Err(Fault::HardwareBreakpoint);
            }
        }

        Ok((target, offset))
    }

    fn set_watchpoint(&mut self, address: u32, size: u32, kind: WatchpointKind) -> Result<()> {
        let (target, watchpoint) = self.watchpoint_key(address, size, kind)?;
        watchpoint::insert(&mut self.store_mut(target).watchpoints, watchpoint);
        Ok(())
    }

    fn clear_watchpoint(&mut self, address: u32, size: u32, kind: WatchpointKind) -> Result<()> {
        let (target, watchpoint) = self.watchpoint_key(address, size, kind)?;
        watchpoint::remove(&mut self.store_mut(target).watchpoints, &watchpoint);
        Ok(())
    }

    /// Translates the caller's address range into the owning region's
    /// address space so that entries set through an alias are observed
    /// through the target and vice versa.
    fn watchpoint_key(
        &self,
        address: u32,
        size: u32,
        kind: WatchpointKind,
    ) -> Result<(usize, Watchpoint)> {
        let index = self.find_region(address, size)?;
        let (target, offset) = self.resolve(index, address);
        let start = self.regions[target].base + offset;
        Ok((
            target,
            Watchpoint {
                kind,
                start,
                end: start.wrapping_add(size),
            },
        ))
    }
}

/// One pass over a sorted table. Returns how many plain watchpoints the
/// access landed in and whether it tripped a breakpoint. The scan stops
/// early once entries start past the access address.
fn scan_watchpoints(
    store: &RegionStore,
    address: u32,
    size: u32,
    mask: WatchpointKind,
) -> (u32, bool) {
    let end = address.wrapping_add(size);
    let mut hits = 0;
    for entry in &store.watchpoints {
        if (entry.kind & mask).is_empty() {
            continue;
        }
        if entry.kind == WatchpointKind::BREAKPOINT {
            if size == 2 && entry.covers(address, end) {
                return (hits, true);
            }
        } else if entry.covers(address, end) {
            hits += 1;
        } else if entry.start > address {
            break;
        }
    }
    (hits, false)
}
