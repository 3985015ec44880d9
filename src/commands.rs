use crate::responses::NoResponse;
use crate::stack::Error as StackError;
use crate::status::Status;
use crate::wifi::JoinError;
use atat::atat_derive::AtatCmd;
use atat::heapless::String;
use core::fmt::Write;
use embedded_nal::SocketAddrV4;

/// Keep alive interval of TCP connections in seconds
const TCP_KEEP_ALIVE: u16 = 7200;

/// Trait for mapping failed command statuses
pub trait CommandErrorHandler {
    type Error;

    /// Maps the status of a command which was not confirmed by OK
    fn command_error(&self, status: Status) -> Self::Error;
}

/// Connectivity test
#[derive(Clone, AtatCmd)]
#[at_cmd("", NoResponse, timeout_ms = 250)]
pub struct AttentionCommand;

/// Disables command echo
#[derive(Clone, AtatCmd)]
#[at_cmd("E0", NoResponse, timeout_ms = 250)]
pub struct DisableEchoCommand;

/// Enables/Disables multiple connections
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPMUX", NoResponse, timeout_ms = 250)]
pub struct SetMultipleConnectionsCommand {
    /// 0: single connection, 1: multiple connections
    mode: usize,
}

impl SetMultipleConnectionsCommand {
    /// Enables multiple connections
    pub fn multiple() -> Self {
        Self { mode: 1 }
    }
}

/// Sets the WIFI mode and stores it in flash
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("+CWMODE_DEF", NoResponse, timeout_ms = 250)]
pub struct WifiModeCommand {
    /// WIFI mode:
    ///     1: Station mode.
    ///     2: SoftAP mode.
    ///     3: SoftAP+Station mode.
    mode: usize,
}

impl WifiModeCommand {
    pub fn station_mode() -> Self {
        Self { mode: 1 }
    }
}

impl CommandErrorHandler for WifiModeCommand {
    type Error = JoinError;

    fn command_error(&self, status: Status) -> Self::Error {
        JoinError::ModeError(status)
    }
}

/// Joins the given access point and stores the credentials in flash.
/// Association and DHCP may take several seconds.
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("+CWJAP_DEF", NoResponse, timeout_ms = 16_000)]
pub struct AccessPointConnectCommand {
    /// The SSID of the target access point
    ssid: String<32>,

    /// The password/key of the target access point
    password: String<64>,
}

impl AccessPointConnectCommand {
    pub fn new(ssid: &str, password: &str) -> Result<Self, JoinError> {
        let mut command = Self::default();
        command.ssid.push_str(ssid).map_err(|_| JoinError::InvalidSSIDLength)?;
        command
            .password
            .push_str(password)
            .map_err(|_| JoinError::InvalidPasswordLength)?;

        Ok(command)
    }
}

impl CommandErrorHandler for AccessPointConnectCommand {
    type Error = JoinError;

    fn command_error(&self, status: Status) -> Self::Error {
        JoinError::ConnectError(status)
    }
}

/// Leaves the current access point
#[derive(Clone, AtatCmd)]
#[at_cmd("+CWQAP", NoResponse, timeout_ms = 250)]
pub struct AccessPointDisconnectCommand;

/// Queries the station IP, answered by `+CIPSTA:ip:"<ip>"`
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPSTA?", NoResponse, timeout_ms = 250)]
pub struct ObtainStationAddressCommand;

/// Starts the TCP server
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPSERVER", NoResponse, timeout_ms = 250)]
pub struct ServerStartCommand {
    /// 1: create server
    mode: usize,

    /// Listening port
    port: u16,
}

impl ServerStartCommand {
    pub fn new(port: u16) -> Self {
        Self { mode: 1, port }
    }
}

impl CommandErrorHandler for ServerStartCommand {
    type Error = StackError;

    fn command_error(&self, status: Status) -> Self::Error {
        StackError::ServerError(status)
    }
}

/// Stops the TCP server
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPSERVER", NoResponse, timeout_ms = 250)]
pub struct ServerStopCommand {
    /// 0: delete server
    mode: usize,
}

impl ServerStopCommand {
    pub fn new() -> Self {
        Self { mode: 0 }
    }
}

impl CommandErrorHandler for ServerStopCommand {
    type Error = StackError;

    fn command_error(&self, status: Status) -> Self::Error {
        StackError::ServerError(status)
    }
}

/// Sets the timeout of server connections
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPSTO", NoResponse, timeout_ms = 250)]
pub struct ServerTimeoutCommand {
    /// Timeout in seconds, 0 = never
    timeout: u16,
}

impl ServerTimeoutCommand {
    /// Connections never time out
    pub fn disabled() -> Self {
        Self { timeout: 0 }
    }
}

impl CommandErrorHandler for ServerTimeoutCommand {
    type Error = StackError;

    fn command_error(&self, status: Status) -> Self::Error {
        StackError::ServerError(status)
    }
}

/// Establishes a TCP connection
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPSTART", NoResponse, timeout_ms = 5_000)]
pub struct ConnectCommand {
    /// Socket ID
    link_id: usize,

    /// Connection type
    connection_type: String<3>,

    /// Remote IPv4 address
    remote_host: String<15>,

    /// Remote port
    port: u16,

    /// TCP keep alive interval
    keep_alive: u16,
}

impl ConnectCommand {
    /// Establishes a IPv4 TCP connection
    pub fn tcp_v4(link_id: usize, remote: SocketAddrV4) -> Self {
        let mut connection_type = String::new();
        let _ = connection_type.push_str("TCP");

        // Dotted quad never exceeds 15 chars
        let mut remote_host = String::new();
        let _ = write!(remote_host, "{}", remote.ip());

        Self {
            link_id,
            connection_type,
            remote_host,
            port: remote.port(),
            keep_alive: TCP_KEEP_ALIVE,
        }
    }
}

impl CommandErrorHandler for ConnectCommand {
    type Error = StackError;

    fn command_error(&self, status: Status) -> Self::Error {
        StackError::ConnectError(status)
    }
}

/// Initiates the transmission of data, answered by the `> ` prompt
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPSEND", NoResponse, timeout_ms = 600)]
pub struct TransmissionPrepareCommand {
    /// Socket ID
    link_id: usize,

    /// Length of the data to send
    length: usize,
}

impl TransmissionPrepareCommand {
    pub fn new(link_id: usize, length: usize) -> Self {
        Self { link_id, length }
    }
}

impl CommandErrorHandler for TransmissionPrepareCommand {
    type Error = StackError;

    fn command_error(&self, status: Status) -> Self::Error {
        StackError::TransmissionStartFailed(status)
    }
}

/// Closes a socket
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPCLOSE", NoResponse, timeout_ms = 250)]
pub struct CloseSocketCommand {
    /// Socket ID
    link_id: usize,
}

impl CloseSocketCommand {
    pub fn new(link_id: usize) -> Self {
        Self { link_id }
    }
}

impl CommandErrorHandler for CloseSocketCommand {
    type Error = StackError;

    fn command_error(&self, status: Status) -> Self::Error {
        StackError::CloseError(status)
    }
}
