//! GDB Remote Serial Protocol session over a frozen target.
//!
//! The session answers a live debugger from the reconstructed crash
//! state: registers and memory read back real data, writes mutate the
//! simulation, and anything that would resume execution is accepted and
//! quietly ignored. One [`Session`] owns borrowed views of the context,
//! the memory simulator and the transport; there is no global state.

pub mod commands;
pub mod console;
pub mod rsp;
pub mod xml;

use static_assertions::const_assert_eq;

use crate::comm::Comm;
use crate::context::{RegisterContext, LR, PC, SP};
use crate::fault::Result;
use crate::mem::MemorySim;

/// Incoming packet payloads are capped at this size. The hex constant
/// inside the `qSupported` reply advertises the same number.
pub const PACKET_BUFFER_SIZE: usize = 16 * 1024;
const_assert_eq!(PACKET_BUFFER_SIZE, 0x4000);

/// GDB's own signal numbering, independent of any host `<signal.h>`.
const SIGINT: u8 = 2;
const SIGILL: u8 = 4;
const SIGTRAP: u8 = 5;
const SIGBUS: u8 = 10;
const SIGSEGV: u8 = 11;
const SIGSTOP: u8 = 17;

/// Maps the captured IPSR exception number onto the stop signal shown
/// to the debugger.
fn signal_for_exception(ipsr: u8) -> u8 {
    match ipsr {
        2 => SIGINT,   // NMI
        3 => SIGSEGV,  // HardFault
        4 => SIGSEGV,  // MemManage
        5 => SIGBUS,   // BusFault
        6 => SIGILL,   // UsageFault
        12 => SIGTRAP, // Debug Monitor
        _ => SIGSTOP,
    }
}

pub struct Session<'a, C: Comm> {
    pub(crate) context: &'a mut RegisterContext,
    pub(crate) mem: &'a mut MemorySim,
    pub(crate) comm: &'a mut C,
    wait_for_connect: bool,
    first_entry: bool,
}

/// Runs a whole post-mortem session with the default connection gating.
pub fn run_session<C: Comm>(
    context: &mut RegisterContext,
    mem: &mut MemorySim,
    comm: &mut C,
) -> Result<()> {
    Session::new(context, mem, comm).run()
}

impl<'a, C: Comm> Session<'a, C> {
    pub fn new(context: &'a mut RegisterContext, mem: &'a mut MemorySim, comm: &'a mut C) -> Self {
        Self {
            context,
            mem,
            comm,
            wait_for_connect: true,
            first_entry: true,
        }
    }

    /// Disables the first-entry wait so scripted transports see the stop
    /// announcement immediately.
    pub fn set_wait_for_connect(&mut self, wait: bool) {
        self.wait_for_connect = wait;
    }

    /// Serves the debugger until the transport asks to stop or fails.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.debug_exception()?;
            if self.comm.should_stop() {
                return Ok(());
            }
        }
    }

    /// One stop-announce-then-serve pass, ending when the debugger asks
    /// to resume.
    fn debug_exception(&mut self) -> Result<()> {
        if self.first_entry && self.wait_for_connect {
            // Nothing is listening yet; announcing a stop would corrupt
            // the first real conversation.
            while !self.comm.is_connected() {}
        } else {
            console::display_fault_cause(self)?;
            let stop_reply = self.stop_reply_payload();
            self.send_packet(&stop_reply)?;
        }
        self.first_entry = false;
        self.command_loop()
    }

    fn command_loop(&mut self) -> Result<()> {
        loop {
            let packet = self.receive_packet()?;
            log::trace!("packet: {}", String::from_utf8_lossy(&packet));
            match commands::dispatch(self, &packet)? {
                commands::Action::Reply(reply) => self.send_packet(&reply)?,
                commands::Action::Resume => return Ok(()),
            }
        }
    }

    /// `T<signal>` plus the registers GDB wants with every stop: R12,
    /// SP, LR and PC as little-endian byte hex.
    pub(crate) fn stop_reply_payload(&self) -> Vec<u8> {
        let signal = signal_for_exception(self.context.ipsr());
        let mut payload = format!("T{:02x}", signal).into_bytes();
        for (number, value) in [
            (12u8, self.context.r[12]),
            (13, self.context.r[SP]),
            (14, self.context.r[LR]),
            (15, self.context.r[PC]),
        ] {
            payload.extend_from_slice(format!("{:02x}:", number).as_bytes());
            rsp::push_hex_word_le(&mut payload, value);
            payload.push(b';');
        }
        payload
    }

    /// Collects one well-formed packet. Valid packets are acknowledged
    /// with `+` before they are returned; checksum mismatches draw a `-`
    /// and the hunt starts over. Interrupt bytes and other noise outside
    /// a packet are discarded.
    fn receive_packet(&mut self) -> Result<Vec<u8>> {
        enum RxState {
            Idle,
            Payload,
            Checksum,
        }

        let mut payload = Vec::new();
        let mut state = RxState::Idle;
        let mut checksum_digits = [0u8; 2];
        let mut digits_seen = 0;

        loop {
            let byte = self.comm.recv_byte()?;
            match state {
                RxState::Idle => {
                    if byte == b'$' {
                        payload.clear();
                        state = RxState::Payload;
                    }
                    // 0x03 would interrupt a running target; this one
                    // stopped for good long ago.
                }
                RxState::Payload => match byte {
                    b'#' => {
                        digits_seen = 0;
                        state = RxState::Checksum;
                    }
                    b'$' => payload.clear(),
                    _ => {
                        if payload.len() < PACKET_BUFFER_SIZE {
                            payload.push(byte);
                        } else {
                            self.comm.send_byte(b'-')?;
                            state = RxState::Idle;
                        }
                    }
                },
                RxState::Checksum => {
                    checksum_digits[digits_seen] = byte;
                    digits_seen += 1;
                    if digits_seen == 2 {
                        let received = rsp::hex_digit_value(checksum_digits[0])
                            .zip(rsp::hex_digit_value(checksum_digits[1]))
                            .map(|(hi, lo)| (hi << 4) | lo);
                        if received == Some(rsp::checksum(&payload)) {
                            self.comm.send_byte(b'+')?;
                            return Ok(payload);
                        }
                        log::warn!("dropping packet with bad checksum");
                        self.comm.send_byte(b'-')?;
                        state = RxState::Idle;
                    }
                }
            }
        }
    }

    /// Frames and transmits `payload`, retransmitting until the peer
    /// acknowledges with `+`.
    pub(crate) fn send_packet(&mut self, payload: &[u8]) -> Result<()> {
        loop {
            self.comm.send_byte(b'$')?;
            for &byte in payload {
                self.comm.send_byte(byte)?;
            }
            self.comm.send_byte(b'#')?;
            let mut checksum = Vec::with_capacity(2);
            rsp::push_hex_byte(&mut checksum, rsp::checksum(payload));
            self.comm.send_byte(checksum[0])?;
            self.comm.send_byte(checksum[1])?;

            loop {
                match self.comm.recv_byte()? {
                    b'+' => return Ok(()),
                    b'-' => {
                        log::warn!("peer rejected packet, retransmitting");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}
