use bitflags::bitflags;

bitflags! {
    /// Kind mask for hardware watchpoints. Breakpoints share the same
    /// per-region table, tagged with a marker bit on top of the READ bit
    /// so that the kind doubles as an access mask during hit scans.
    pub struct WatchpointKind: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits | Self::WRITE.bits;
        const BREAKPOINT = (1 << 31) | Self::READ.bits;
    }
}

/// A structural marker observed while simulated memory is accessed.
/// `start`/`end` form the half-open range `[start, end)` in the address
/// space of the region that owns the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watchpoint {
    pub kind: WatchpointKind,
    pub start: u32,
    pub end: u32,
}

impl Watchpoint {
    pub(crate) fn covers(&self, start: u32, end: u32) -> bool {
        start >= self.start && end <= self.end
    }
}

/// Inserts in ascending `start` order. An entry equal in all three fields
/// is already present and the insert is a no-op. Entries sharing a start
/// address keep their insertion order relative to each other.
pub(crate) fn insert(table: &mut Vec<Watchpoint>, watchpoint: Watchpoint) {
    for (i, entry) in table.iter().enumerate() {
        if *entry == watchpoint {
            return;
        }
        if watchpoint.start < entry.start {
            table.insert(i, watchpoint);
            return;
        }
    }
    table.push(watchpoint);
}

/// Removes the entry matching all three fields; absent entries are ignored.
pub(crate) fn remove(table: &mut Vec<Watchpoint>, watchpoint: &Watchpoint) {
    if let Some(i) = table.iter().position(|entry| entry == watchpoint) {
        table.remove(i);
    }
}
