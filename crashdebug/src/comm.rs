//! Byte transport between the session and the debugger.
//!
//! The session only ever moves one byte at a time, so the contract stays
//! narrow: poll, receive, send, plus the stop and connection signals the
//! run loop consults. The standard implementation speaks over the
//! process's stdin/stdout; the scripted one feeds canned conversations
//! to tests and embedders.

use std::collections::VecDeque;
use std::io::{Read, Write};

use crate::fault::{Fault, Result};

pub trait Comm {
    /// True when a byte can be received without blocking.
    fn has_data(&mut self) -> bool;

    /// Blocks until the next byte arrives.
    fn recv_byte(&mut self) -> Result<u8>;

    fn send_byte(&mut self, byte: u8) -> Result<()>;

    /// Consulted between debugger-loop entries; true ends the session.
    fn should_stop(&mut self) -> bool;

    /// True once the debugger has opened the conversation. May block
    /// while the transport waits for the first sign of a client.
    fn is_connected(&mut self) -> bool;
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn stdin_readable(wait: bool) -> bool {
            let mut fds = libc::pollfd {
                fd: libc::STDIN_FILENO,
                events: libc::POLLIN,
                revents: 0,
            };
            let timeout = if wait { -1 } else { 0 };
            let result = unsafe { libc::poll(&mut fds, 1, timeout) };
            result > 0 && (fds.revents & libc::POLLIN) != 0
        }
    } else {
        fn stdin_readable(wait: bool) -> bool {
            // No portable readiness probe; claim readiness only when the
            // caller was prepared to block anyway.
            wait
        }
    }
}

/// Transport over the process's own stdin/stdout, which is how GDB's
/// `target remote | crashdebug ...` runs the tool. Transmitted bytes are
/// buffered and pushed out before the next receive so each packet leaves
/// in one write.
#[derive(Default)]
pub struct StandardComm {
    connected: bool,
    pending: Vec<u8>,
}

impl StandardComm {
    pub fn new() -> Self {
        Self::default()
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let stdout = std::io::stdout();
        let mut stdout = stdout.lock();
        stdout
            .write_all(&self.pending)
            .and_then(|_| stdout.flush())
            .map_err(|_| Fault::file("Failed to write to the GDB connection on stdout."))?;
        self.pending.clear();
        Ok(())
    }
}

impl Comm for StandardComm {
    fn has_data(&mut self) -> bool {
        if self.flush_pending().is_err() {
            return false;
        }
        stdin_readable(false)
    }

    fn recv_byte(&mut self) -> Result<u8> {
        self.flush_pending()?;
        let mut byte = [0u8; 1];
        std::io::stdin()
            .lock()
            .read_exact(&mut byte)
            .map_err(|_| Fault::file("The GDB connection on stdin was closed."))?;
        self.connected = true;
        Ok(byte[0])
    }

    fn send_byte(&mut self, byte: u8) -> Result<()> {
        self.pending.push(byte);
        Ok(())
    }

    fn should_stop(&mut self) -> bool {
        false
    }

    fn is_connected(&mut self) -> bool {
        if self.connected {
            return true;
        }
        let _ = self.flush_pending();
        stdin_readable(true)
    }
}

/// Canned transport for exercising sessions without a live debugger.
pub struct ScriptedComm {
    receive: VecDeque<u8>,
    sent: Vec<u8>,
    should_stop: bool,
    connected: bool,
}

impl ScriptedComm {
    pub fn new() -> Self {
        Self {
            receive: VecDeque::new(),
            sent: Vec::new(),
            // Most scripts drive one debugger-loop pass and stop.
            should_stop: true,
            connected: true,
        }
    }

    /// Queues raw bytes such as acknowledgements.
    pub fn queue_bytes(&mut self, bytes: &[u8]) {
        self.receive.extend(bytes.iter().copied());
    }

    /// Queues `payload` framed and checksummed as a packet.
    pub fn queue_packet(&mut self, payload: &str) {
        self.queue_bytes(&frame_packet(payload.as_bytes()));
    }

    pub fn set_should_stop(&mut self, stop: bool) {
        self.should_stop = stop;
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Everything the session transmitted so far, as text.
    pub fn sent_text(&self) -> String {
        String::from_utf8_lossy(&self.sent).into_owned()
    }

    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }
}

impl Default for ScriptedComm {
    fn default() -> Self {
        Self::new()
    }
}

impl Comm for ScriptedComm {
    fn has_data(&mut self) -> bool {
        !self.receive.is_empty()
    }

    fn recv_byte(&mut self) -> Result<u8> {
        self.receive
            .pop_front()
            .ok_or_else(|| Fault::file("The GDB connection on stdin was closed."))
    }

    fn send_byte(&mut self, byte: u8) -> Result<()> {
        self.sent.push(byte);
        Ok(())
    }

    fn should_stop(&mut self) -> bool {
        self.should_stop
    }

    fn is_connected(&mut self) -> bool {
        self.connected
    }
}

/// Frames `payload` as `$payload#CS` with the RSP modulo-256 checksum.
pub fn frame_packet(payload: &[u8]) -> Vec<u8> {
    let checksum = payload
        .iter()
        .fold(0u8, |sum, &byte| sum.wrapping_add(byte));
    let mut framed = Vec::with_capacity(payload.len() + 4);
    framed.push(b'$');
    framed.extend_from_slice(payload);
    framed.push(b'#');
    framed.extend_from_slice(format!("{:02x}", checksum).as_bytes());
    framed
}
