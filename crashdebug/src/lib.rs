//! Post-mortem debugging aid for ARM Cortex-M firmware.
//!
//! CrashDebug rebuilds the state of a crashed device from a program
//! image (ELF or raw binary) plus a crash dump (CrashCatcher binary or
//! hex dump, or a pasted GDB log), then serves that frozen state to GDB
//! over the Remote Serial Protocol. The debugger can walk stacks, read
//! and write the reconstructed memory and inspect a decoded fault cause;
//! it just cannot make a crash un-happen, so continue and step are
//! accepted and ignored.

pub mod comm;
pub mod context;
pub mod dump;
pub mod fault;
pub mod gdb;
pub mod image;
pub mod mem;

pub use comm::{Comm, ScriptedComm, StandardComm};
pub use context::RegisterContext;
pub use dump::{detect_format, load_dump, DumpFormat};
pub use fault::{Fault, Result};
pub use gdb::{run_session, Session};
pub use image::{load_bin_image, load_elf_image};
pub use mem::{MemorySim, WatchpointKind};
