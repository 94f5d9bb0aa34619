use bitfield::bitfield;
use bitflags::bitflags;
use static_assertions::const_assert_eq;

/// Indices of the named entries in [`RegisterContext::r`]. R0-R12 occupy
/// slots 0-12 and are addressed numerically.
pub const SP: usize = 13;
pub const LR: usize = 14;
pub const PC: usize = 15;
pub const XPSR: usize = 16;
pub const MSP: usize = 17;
pub const PSP: usize = 18;
pub const INTEGER_REG_COUNT: usize = PSP + 1;

/// Index of FPSCR in [`RegisterContext::fpr`]. S0-S31 occupy slots 0-31.
pub const FPSCR: usize = 32;
pub const FLOAT_REG_COUNT: usize = FPSCR + 1;

const_assert_eq!(INTEGER_REG_COUNT, 19);
const_assert_eq!(FLOAT_REG_COUNT, 33);

/// Value placed in MSP and PSP when the ingested dump predates those
/// fields (version 2 dumps and ad-hoc GDB logs).
pub const DEFAULT_SP_VALUE: u32 = 0xBAADBAAD;

bitflags! {
    /// Flags word carried at the front of a crash dump.
    pub struct DumpFlags: u32 {
        const FLOATING_POINT = 1 << 0;
    }
}

bitfield! {
    /// View over a captured xPSR / exception PSR value.
    pub struct ProgramStatus(u32);

    pub exception_number, _: 7, 0;
    pub thumb, _: 24, 24;
}

/// CPU register file at the moment of the crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterContext {
    pub flags: u32,
    pub r: [u32; INTEGER_REG_COUNT],
    pub exception_psr: u32,
    pub fpr: [u32; FLOAT_REG_COUNT],
}

impl RegisterContext {
    pub fn new() -> Self {
        Self {
            flags: 0,
            r: [0; INTEGER_REG_COUNT],
            exception_psr: 0,
            fpr: [0; FLOAT_REG_COUNT],
        }
    }

    /// True when the dump captured floating point state, which widens the
    /// `g`/`G` payloads and the advertised target description.
    pub fn has_float_state(&self) -> bool {
        DumpFlags::from_bits_truncate(self.flags).contains(DumpFlags::FLOATING_POINT)
    }

    pub fn set_float_state(&mut self) {
        self.flags |= DumpFlags::FLOATING_POINT.bits();
    }

    /// Exception number of the handler that was running at capture time.
    pub fn ipsr(&self) -> u8 {
        ProgramStatus(self.exception_psr).exception_number() as u8
    }
}

impl Default for RegisterContext {
    fn default() -> Self {
        Self::new()
    }
}
