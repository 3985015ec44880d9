//! # ESP8266 socket multiplexer
//!
//! Turns the AT command serial link of an ESP8266 into up to `N` concurrent TCP sockets.
//!
//! Received bytes are assembled into frames by [wifi::Adapter::on_receive_interrupt], parsed into
//! a [status::Status] bitmask and applied to the socket table. Commands block on that bitmask,
//! bounded by a watchdog timer which forces a frame flush on expiry.
//!
//! * [wifi] contains the adapter, command issuance and access point handling
//! * [stack] contains TCP server and socket operations
//! * [transport] defines the serial port consumed by the adapter
#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

#[macro_use]
mod logging;

pub(crate) mod commands;
pub(crate) mod parser;
pub(crate) mod receiver;
pub(crate) mod responses;
pub mod session;
pub mod socket;
pub mod stack;
pub mod status;
pub mod transport;
pub mod wifi;

#[cfg(feature = "examples")]
pub mod example;

#[cfg(test)]
mod tests;
