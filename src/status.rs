//! # Protocol status bitmask
//!
//! Every parsed frame yields a [Status], a set of independent flags. The adapter accumulates them
//! while a command is pending and returns the combined bitmask to the caller.
use core::fmt;
use core::ops::{BitAnd, BitOr, BitOrAssign};

/// Set of status flags observed on the serial link
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Status(u32);

impl Status {
    /// No status observed
    pub const NONE: Self = Self(0);
    /// `OK` received
    pub const OK: Self = Self(1 << 0);
    /// `busy...` received, chip is still processing the previous command
    pub const BUSY: Self = Self(1 << 1);
    /// `SUCCESS` received
    pub const SUCCESS: Self = Self(1 << 2);
    /// Command was issued in non-blocking mode and its outcome is still pending
    pub const NONBLOCKING: Self = Self(1 << 3);
    /// `WIFI CONNECTED` received
    pub const CONNECTED: Self = Self(1 << 4);
    /// `WIFI DISCONNECT` received
    pub const DISCONNECTED: Self = Self(1 << 5);
    /// `READY` or the boot banner `ready` received
    pub const READY: Self = Self(1 << 6);
    /// `<id>,CONNECT` received
    pub const SOCKET_OPENED: Self = Self(1 << 7);
    /// `<id>,CLOSED` received
    pub const SOCKET_CLOSED: Self = Self(1 << 8);
    /// Send prompt `>` received, chip awaits payload bytes
    pub const RECV_PROMPT: Self = Self(1 << 9);
    /// `FAIL` received
    pub const FAIL: Self = Self(1 << 10);
    /// `SEND OK` received
    pub const SEND_OK: Self = Self(1 << 11);
    /// `ERROR` received or injected by the watchdog
    pub const ERROR: Self = Self(1 << 12);
    /// `+IPD` socket data received
    pub const DATA_INCOMING: Self = Self(1 << 14);
    /// Station IP captured
    pub const GOT_IP: Self = Self(1 << 15);

    /// Sentinel returned by non-blocking command issuance
    pub const PENDING: Self = Self::NONBLOCKING;

    /// Returns the raw bit representation
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Creates a status from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// True if no flag is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if all flags of `other` are set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if at least one flag of `other` is set
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Sets all flags of `other`
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// True if the command was confirmed by `OK` and no error was reported
    pub const fn is_ok(self) -> bool {
        self.contains(Self::OK) && !self.contains(Self::ERROR)
    }
}

impl BitOr for Status {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Status {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Status {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Status, &str); 15] = [
            (Status::OK, "OK"),
            (Status::BUSY, "BUSY"),
            (Status::SUCCESS, "SUCCESS"),
            (Status::NONBLOCKING, "NONBLOCKING"),
            (Status::CONNECTED, "CONNECTED"),
            (Status::DISCONNECTED, "DISCONNECTED"),
            (Status::READY, "READY"),
            (Status::SOCKET_OPENED, "SOCKET_OPENED"),
            (Status::SOCKET_CLOSED, "SOCKET_CLOSED"),
            (Status::RECV_PROMPT, "RECV_PROMPT"),
            (Status::FAIL, "FAIL"),
            (Status::SEND_OK, "SEND_OK"),
            (Status::ERROR, "ERROR"),
            (Status::DATA_INCOMING, "DATA_INCOMING"),
            (Status::GOT_IP, "GOT_IP"),
        ];

        if self.is_empty() {
            return f.write_str("Status(NONE)");
        }

        f.write_str("Status(")?;
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        f.write_str(")")
    }
}
