//! # Session state
//!
//! State shared between command issuance and the receive path. Field ownership:
//!
//! * `status`, socket payloads and ready flags are written by the parser only. Command issuance
//!   clears `status` before each command, consumers clear payloads.
//! * `wifi_state` and `ip_address` are written by both, access point operations and unsolicited
//!   `WIFI ...` frames.
//! * `server_open`, `server_port` and the hook are written by the adapter only.
use crate::socket::SocketTable;
use crate::status::Status;
use embedded_nal::Ipv4Addr;

/// Callback for unsolicited socket data: `(link_id, payload)`
pub type DataHook = fn(usize, &[u8]);

/// WIFI access point connection state
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum WifiState {
    /// Not associated to any access point
    #[default]
    Disconnected,
    /// Associated, but IP not acquired yet
    Connecting,
    /// Associated and IP acquired
    Connected,
}

/// Session wide protocol state
pub struct SessionState<const N: usize, const RX_SIZE: usize> {
    /// Accumulated status of all frames parsed since the last command was issued
    pub(crate) status: Status,

    /// Access point connection state
    pub(crate) wifi_state: WifiState,

    /// Station IP, 0 if unknown
    pub(crate) ip_address: u32,

    /// True while the TCP server is running
    pub(crate) server_open: bool,

    /// TCP server port, 0 if closed
    pub(crate) server_port: u16,

    /// Open sockets, array index = link_id
    pub(crate) sockets: SocketTable<N, RX_SIZE>,

    /// Receiver of unsolicited socket data
    pub(crate) hook: Option<DataHook>,
}

impl<const N: usize, const RX_SIZE: usize> Default for SessionState<N, RX_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, const RX_SIZE: usize> SessionState<N, RX_SIZE> {
    pub fn new() -> Self {
        Self {
            status: Status::NONE,
            wifi_state: WifiState::Disconnected,
            ip_address: 0,
            server_open: false,
            server_port: 0,
            sockets: SocketTable::new(),
            hook: None,
        }
    }

    /// Resets everything but the registered hook
    pub(crate) fn reset(&mut self) {
        self.status = Status::NONE;
        self.wifi_state = WifiState::Disconnected;
        self.ip_address = 0;
        self.server_open = false;
        self.server_port = 0;
        self.sockets.clear();
    }

    /// Stores the station IP. A valid IP implies a full access point connection.
    pub(crate) fn set_ip_address(&mut self, ip: u32) {
        self.ip_address = ip;

        if ip != 0 {
            self.wifi_state = WifiState::Connected;
        }
    }

    /// Association started, a new IP gets acquired
    pub(crate) fn set_connecting(&mut self) {
        self.ip_address = 0;
        self.wifi_state = WifiState::Connecting;
    }

    /// Drops the cached IP and marks the access point connection as lost
    pub(crate) fn set_disconnected(&mut self) {
        self.ip_address = 0;
        self.wifi_state = WifiState::Disconnected;
    }

    /// Accumulated status since the last command
    pub fn status(&self) -> Status {
        self.status
    }

    pub fn wifi_state(&self) -> WifiState {
        self.wifi_state
    }

    /// Station IP in integer form, 0 if not assigned
    pub fn ip_address(&self) -> u32 {
        self.ip_address
    }

    /// Station IP, None if not assigned
    pub fn local_ip(&self) -> Option<Ipv4Addr> {
        match self.ip_address {
            0 => None,
            ip => Some(Ipv4Addr::from(ip)),
        }
    }

    pub fn server_open(&self) -> bool {
        self.server_open
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    pub fn sockets(&self) -> &SocketTable<N, RX_SIZE> {
        &self.sockets
    }

    /// Passes every ready and not yet delivered payload to the hook, in ascending link id order
    pub(crate) fn deliver_data(&mut self) {
        let Some(hook) = self.hook else {
            return;
        };

        for socket in self.sockets.iter_mut() {
            if socket.data_ready && !socket.delivered {
                hook(socket.link_id, &socket.data);
                socket.delivered = true;
            }
        }
    }
}
