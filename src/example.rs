//! Mocks for doc examples
use crate::transport::{RxQueue, Transport};
use fugit::{TimerDurationU32, TimerInstantU32};
use fugit_timer::Timer;
use heapless::{Deque, Vec};

/// Transport mock answering a fixed set of commands
#[derive(Default)]
pub struct ExampleTransport {
    /// Command currently written
    line: Vec<u8, 256>,

    /// Bytes to be received
    rx: Deque<u8, 512>,

    /// Remaining raw payload bytes announced by CIPSEND
    payload_pending: usize,

    /// State of the enable line
    enabled: bool,
}

impl ExampleTransport {
    fn reply(&mut self, data: &[u8]) {
        for byte in data {
            let _ = self.rx.push_back(*byte);
        }
    }

    fn respond(&mut self) {
        let line = core::mem::take(&mut self.line);

        match line.as_slice() {
            b"AT+CWJAP_DEF=\"test_wifi\",\"secret\"\r\n" => self.reply(b"WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n"),
            b"AT+CIPSTA?\r\n" => self.reply(
                b"+CIPSTA:ip:\"10.0.0.181\"\r\n+CIPSTA:gateway:\"10.0.0.1\"\r\n+CIPSTA:netmask:\"255.255.255.0\"\r\n\r\nOK\r\n",
            ),
            b"AT+CIPSTART=0,\"TCP\",\"10.0.0.1\",21,7200\r\n" => self.reply(b"0,CONNECT\r\n\r\nOK\r\n"),
            b"AT+CIPCLOSE=0\r\n" => self.reply(b"0,CLOSED\r\n\r\nOK\r\n"),
            command if command.starts_with(b"AT+CIPSEND=") => {
                self.payload_pending = Self::payload_length(command);
                self.reply(b"\r\nOK\r\n> ");
            }
            _ => self.reply(b"\r\nOK\r\n"),
        }
    }

    /// Length argument of `AT+CIPSEND=<link_id>,<length>`
    fn payload_length(command: &[u8]) -> usize {
        command
            .iter()
            .rposition(|byte| *byte == b',')
            .and_then(|comma| core::str::from_utf8(&command[comma + 1..]).ok())
            .and_then(|length| length.trim_end().parse().ok())
            .unwrap_or(0)
    }
}

impl Transport for ExampleTransport {
    fn send_byte(&mut self, byte: u8) {
        if self.payload_pending > 0 {
            self.payload_pending -= 1;
            if self.payload_pending == 0 {
                self.reply(b"\r\nRecv 6 bytes\r\n\r\nSEND OK\r\n\r\n+IPD,0,16:nice to see you!");
            }
            return;
        }

        let _ = self.line.push(byte);
        if self.line.ends_with(b"\r\n") {
            self.respond();
        }
    }

    fn is_send_busy(&mut self) -> bool {
        false
    }

    fn byte_available(&mut self) -> bool {
        !self.rx.is_empty()
    }

    fn read_byte(&mut self) -> u8 {
        self.rx.pop_front().unwrap_or_default()
    }

    fn enable_receive_interrupt(&mut self, _enable: bool) {}

    fn hardware_enable(&mut self, enable: bool) {
        self.enabled = enable;
    }

    fn is_hardware_enabled(&mut self) -> bool {
        self.enabled
    }

    fn delay_us(&mut self, _us: u32) {}
}

/// Transport whose received bytes are queued by the RX interrupt. Sent bytes are discarded.
pub struct InterruptTransport<'a, const SIZE: usize> {
    /// Filled by the interrupt through the matching ingress
    rx: RxQueue<'a, SIZE>,

    /// State of the enable line
    enabled: bool,
}

impl<'a, const SIZE: usize> InterruptTransport<'a, SIZE> {
    pub fn new(rx: RxQueue<'a, SIZE>) -> Self {
        Self { rx, enabled: false }
    }
}

impl<const SIZE: usize> Transport for InterruptTransport<'_, SIZE> {
    fn send_byte(&mut self, _byte: u8) {}

    fn is_send_busy(&mut self) -> bool {
        false
    }

    fn byte_available(&mut self) -> bool {
        self.rx.byte_available()
    }

    fn read_byte(&mut self) -> u8 {
        self.rx.read_byte().unwrap_or_default()
    }

    fn enable_receive_interrupt(&mut self, _enable: bool) {}

    fn hardware_enable(&mut self, enable: bool) {
        self.enabled = enable;
    }

    fn is_hardware_enabled(&mut self) -> bool {
        self.enabled
    }

    fn delay_us(&mut self, _us: u32) {}
}

/// Timer mock, never expires
#[derive(Default)]
pub struct ExampleTimer {}

impl Timer<1_000_000> for ExampleTimer {
    type Error = u32;

    fn now(&mut self) -> TimerInstantU32<1000000> {
        TimerInstantU32::from_ticks(0)
    }

    fn start(&mut self, _duration: TimerDurationU32<1000000>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn wait(&mut self) -> nb::Result<(), Self::Error> {
        nb::Result::Err(nb::Error::WouldBlock)
    }
}
