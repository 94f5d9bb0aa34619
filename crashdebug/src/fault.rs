use snafu::prelude::*;

/// Failures raised by the simulator, the image loaders, the dump readers
/// and the GDB session. Variants whose diagnostics depend on runtime
/// values carry the rendered message text.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Fault {
    /// Access fell outside every simulated region, wrote through the
    /// read-only marking, or queried FLASH state on a non-FLASH region.
    #[snafu(display("Memory access outside of valid simulated regions."))]
    BusError,

    #[snafu(display("{}", message))]
    OutOfMemory { message: String },

    #[snafu(display("Hardware breakpoint encountered."))]
    HardwareBreakpoint,

    #[snafu(display("Hardware watchpoint encountered."))]
    HardwareWatchpoint,

    /// Could not open, read, or rewind an input file.
    #[snafu(display("{}", message))]
    File { message: String },

    /// A crash dump was truncated or malformed.
    #[snafu(display("{}", message))]
    FileFormat { message: String },

    /// An ELF image failed validation.
    #[snafu(display("{}", message))]
    ElfFormat { message: String },

    #[snafu(display(
        "The dump file ended with an indication that CrashCatcher detected a stack overflow."
    ))]
    StackOverflow,

    #[snafu(display("The FLASH image was too small to contain the initial stack pointer."))]
    BufferOverrun,

    /// Command line could not be parsed.
    #[snafu(display("{}", message))]
    InvalidArgument { message: String },
}

impl Fault {
    pub fn out_of_memory() -> Self {
        Fault::OutOfMemory {
            message: "Failed to allocate memory.".into(),
        }
    }

    pub fn file(message: impl Into<String>) -> Self {
        Fault::File {
            message: message.into(),
        }
    }

    pub fn file_format(message: impl Into<String>) -> Self {
        Fault::FileFormat {
            message: message.into(),
        }
    }

    pub fn elf_format(message: impl Into<String>) -> Self {
        Fault::ElfFormat {
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Fault::InvalidArgument {
            message: message.into(),
        }
    }

    /// Rebuilds the fault with a more specific message. The kind is never
    /// downgraded: message-free kinds pass through untouched so that the
    /// strongest fault is what finally surfaces.
    pub(crate) fn reword(self, message: String) -> Self {
        match self {
            Fault::OutOfMemory { .. } => Fault::OutOfMemory { message },
            Fault::File { .. } => Fault::File { message },
            Fault::FileFormat { .. } => Fault::FileFormat { message },
            Fault::ElfFormat { .. } => Fault::ElfFormat { message },
            Fault::InvalidArgument { .. } => Fault::InvalidArgument { message },
            other => other,
        }
    }
}

pub type Result<T> = core::result::Result<T, Fault>;
