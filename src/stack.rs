//! # TCP sockets and server
//!
//! Up to `N` sockets are multiplexed over the AT link, addressed by their link id. Sockets get
//! created either by [Adapter::open_socket] or by the TCP server when a remote client connects.
//! Received payloads are buffered per socket, one unread payload at a time. They are either
//! pulled by [Adapter::receive_from_socket] or pushed to the registered hook on arrival.
//!
//! [TcpClientStack] of [embedded_nal] is implemented on top of these operations.
//!
//! ## Example
//!
//! ````
//! # use core::str::FromStr;
//! # use embedded_nal::SocketAddrV4;
//! # use esp_at_mux::example::{ExampleTimer, ExampleTransport};
//! # use esp_at_mux::wifi::{Adapter, Mode, WifiAdapter};
//! #
//! let mut adapter: Adapter<_, _, 1_000_000, 5, 256> = Adapter::new(ExampleTransport::default(), ExampleTimer::default());
//! adapter.init();
//! adapter.join("test_wifi", "secret", Mode::Blocking).unwrap();
//!
//! // Creating a TCP connection
//! let link_id = adapter.open_socket(SocketAddrV4::from_str("10.0.0.1:21").unwrap(), true, None).unwrap();
//!
//! // Sending some data
//! adapter.send_on_socket(link_id, b"hallo!").unwrap();
//!
//! // Receiving some data
//! let mut rx_buffer = [0x0; 64];
//! let length = adapter.receive_from_socket(link_id, &mut rx_buffer).unwrap();
//! assert_eq!(b"nice to see you!", &rx_buffer[..length]);
//!
//! // Closing socket
//! adapter.close_socket(link_id).unwrap();
//! ````
use crate::commands::{
    CloseSocketCommand, CommandErrorHandler, ConnectCommand, ServerStartCommand, ServerStopCommand,
    ServerTimeoutCommand, TransmissionPrepareCommand,
};
use crate::session::WifiState;
use crate::status::Status;
use crate::transport::Transport;
use crate::wifi::{Adapter, Mode, Outcome};
use embedded_nal::{SocketAddr, SocketAddrV4, TcpClientStack, TcpError, TcpErrorKind};
use fugit_timer::Timer;

/// Max. payload length of a single CIPSEND command
const MAX_CHUNK_SIZE: usize = 2048;

/// Network related errors
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Access point connection is required
    NotConnected,

    /// No socket available, since the maximum number is in use
    NoSocketAvailable,

    /// Link id is out of range or does not map to a live socket
    InvalidSocket,

    /// Given socket handle is already connected to a remote
    AlreadyConnected,

    /// Port 0 is not allowed for the TCP server
    InvalidPort,

    /// Only IPv4 remotes are supported
    UnsupportedAddress,

    /// TCP server command failed
    ServerError(Status),

    /// TCP connect command failed
    ConnectError(Status),

    /// Preparing the transmission failed (CIPSEND command or missing prompt)
    TransmissionStartFailed(Status),

    /// Transmission of data was not confirmed by SEND OK
    SendFailed(Status),

    /// Socket close command failed
    CloseError(Status),

    /// Buffered payload does not fit into the given buffer
    ReceiveOverflow,
}

impl TcpError for Error {
    fn kind(&self) -> TcpErrorKind {
        match self {
            Error::InvalidSocket => TcpErrorKind::PipeClosed,
            _ => TcpErrorKind::Other,
        }
    }
}

/// Socket handle of [TcpClientStack]
#[derive(Debug)]
pub struct SocketHandle {
    /// Assigned on connect
    link_id: Option<usize>,
}

impl SocketHandle {
    /// Link id, None if not connected yet
    pub fn link_id(&self) -> Option<usize> {
        self.link_id
    }
}

impl<T: Transport, W: Timer<TIMER_HZ>, const TIMER_HZ: u32, const N: usize, const RX_SIZE: usize>
    Adapter<T, W, TIMER_HZ, N, RX_SIZE>
{
    /// Starts the TCP server on the given port and disables the server timeout
    pub fn start_tcp_server(&mut self, port: u16) -> Result<Status, Error> {
        if port == 0 {
            return Err(Error::InvalidPort);
        }

        let mut status = self.command(&ServerStartCommand::new(port))?;
        self.session.server_open = true;
        self.session.server_port = port;

        status |= self.command(&ServerTimeoutCommand::disabled())?;
        self.tcp_listen(true);

        debug!("TCP server listening on port {}", port);
        Ok(status)
    }

    /// Stops the TCP server
    pub fn stop_tcp_server(&mut self) -> Result<Status, Error> {
        let status = self.command(&ServerStopCommand::new())?;
        self.session.server_open = false;
        self.session.server_port = 0;

        Ok(status)
    }

    /// Enables/Disables receiving of unsolicited frames, e.g. incoming connections and data
    pub fn tcp_listen(&mut self, enable: bool) {
        self.transport.enable_receive_interrupt(enable);
    }

    /// Opens a TCP connection and returns its link id.
    ///
    /// The preferred link id is used if free, otherwise the lowest free one.
    /// If `keep_alive` is false, the socket gets closed as soon as its first payload is consumed.
    pub fn open_socket(
        &mut self,
        remote: SocketAddrV4,
        keep_alive: bool,
        preferred: Option<usize>,
    ) -> Result<usize, Error> {
        if self.session.wifi_state != WifiState::Connected {
            return Err(Error::NotConnected);
        }

        let link_id = match preferred {
            Some(link_id) if link_id < N && !self.session.sockets.is_occupied(link_id) => link_id,
            _ => self.session.sockets.next_free().ok_or(Error::NoSocketAvailable)?,
        };

        self.command(&ConnectCommand::tcp_v4(link_id, remote))?;

        // Socket gets created by the CONNECT frame, which may have been lost
        if !self.session.sockets.is_occupied(link_id) {
            warn!("Socket {} connected without CONNECT message", link_id);
            self.session.sockets.open(link_id);
        }

        if let Some(socket) = self.session.sockets.get_mut(link_id) {
            socket.keep_alive = keep_alive;
        }
        self.transport.enable_receive_interrupt(true);

        debug!("Socket {} connected to {:?}", link_id, remote);
        Ok(link_id)
    }

    /// Requests closing the socket. The slot gets released when the chip confirms by `CLOSED`.
    pub fn close_socket(&mut self, link_id: usize) -> Result<Status, Error> {
        self.assert_socket_alive(link_id)?;

        if let Some(socket) = self.session.sockets.get_mut(link_id) {
            socket.alive = false;
        }

        self.command(&CloseSocketCommand::new(link_id))
    }

    /// Sends the payload in chunks of max. 2048 bytes. Returns the status of the last chunk.
    pub fn send_on_socket(&mut self, link_id: usize, data: &[u8]) -> Result<Status, Error> {
        self.assert_socket_alive(link_id)?;

        let mut status = Status::NONE;
        for chunk in data.chunks(MAX_CHUNK_SIZE) {
            self.prepare_transmission(link_id, chunk.len())?;
            status = self.send_chunk(chunk)?;
        }

        Ok(status)
    }

    /// Copies the buffered payload into the given buffer and returns its length.
    ///
    /// Returns [nb::Error::WouldBlock] if no payload is buffered. Sockets without keep alive get
    /// closed after the payload was copied.
    pub fn receive_from_socket(&mut self, link_id: usize, buffer: &mut [u8]) -> nb::Result<usize, Error> {
        self.poll();

        let socket = self.session.sockets.get_mut(link_id).ok_or(Error::InvalidSocket)?;
        if !socket.data_ready {
            return Err(nb::Error::WouldBlock);
        }

        let length = socket.data.len();
        if buffer.len() < length {
            return Err(nb::Error::Other(Error::ReceiveOverflow));
        }

        buffer[..length].copy_from_slice(&socket.data);
        socket.clear();

        self.close_unless_kept_alive(link_id);
        Ok(length)
    }

    /// True if an unread payload is buffered for the given socket
    pub fn peek_ready(&self, link_id: usize) -> bool {
        self.session.sockets.get(link_id).is_some_and(|socket| socket.data_ready)
    }

    /// Unread payload of the given socket. Needs to be acknowledged by [Adapter::consume].
    pub fn peek_data(&self, link_id: usize) -> Option<&[u8]> {
        self.session
            .sockets
            .get(link_id)
            .filter(|socket| socket.data_ready)
            .map(|socket| socket.data())
    }

    /// Acknowledges the buffered payload, read by [Adapter::peek_data] or the hook
    pub fn consume(&mut self, link_id: usize) -> Result<(), Error> {
        let socket = self.session.sockets.get_mut(link_id).ok_or(Error::InvalidSocket)?;
        socket.clear();

        self.close_unless_kept_alive(link_id);
        Ok(())
    }

    /// True if the link id maps to a live socket
    pub fn valid_socket(&self, link_id: usize) -> bool {
        self.session.sockets.get(link_id).is_some_and(|socket| socket.alive)
    }

    /// Number of occupied socket slots
    pub fn socket_count(&self) -> usize {
        self.session.sockets.count()
    }

    /// Closes all sockets, power cycles and reinitializes the chip.
    /// The chip reconnects to the stored access point on its own.
    pub fn reboot(&mut self) -> Status {
        for link_id in 0..N {
            if !self.valid_socket(link_id) {
                continue;
            }

            if let Err(error) = self.close_socket(link_id) {
                warn!("Failed to close socket {} before reboot: {:?}", link_id, error);
            }
        }

        self.power_off();
        let status = self.init();
        self.session.set_connecting();
        status
    }

    /// Sends CIPSEND and waits until the chip is ready to receive the raw payload
    fn prepare_transmission(&mut self, link_id: usize, length: usize) -> Result<(), Error> {
        let command = TransmissionPrepareCommand::new(link_id, length);
        let mut status = self.send_command(&command, Status::RECV_PROMPT, Mode::Blocking).status();

        // OK is received before the prompt
        if status.is_ok() && !status.contains(Status::RECV_PROMPT) {
            status = self.await_status(Status::RECV_PROMPT | Status::ERROR, self.send_timeout).status();
        }

        if !status.contains(Status::RECV_PROMPT) || status.intersects(Status::ERROR | Status::FAIL) {
            return Err(command.command_error(status));
        }

        Ok(())
    }

    /// Writes the raw payload and waits for the transmission confirmation
    fn send_chunk(&mut self, data: &[u8]) -> Result<Status, Error> {
        let outcome = self.transmit(data, Status::SEND_OK | Status::FAIL | Status::ERROR, self.send_timeout);

        match outcome {
            Outcome::Completed(status) if status.contains(Status::SEND_OK) && !status.contains(Status::FAIL) => {
                Ok(status)
            }
            _ => Err(Error::SendFailed(outcome.status())),
        }
    }

    fn assert_socket_alive(&self, link_id: usize) -> Result<(), Error> {
        match self.valid_socket(link_id) {
            true => Ok(()),
            false => Err(Error::InvalidSocket),
        }
    }

    /// Closes the socket if keep alive is disabled. Failures are just logged.
    fn close_unless_kept_alive(&mut self, link_id: usize) {
        let Some(socket) = self.session.sockets.get(link_id) else {
            return;
        };
        if socket.keep_alive || !socket.alive {
            return;
        }

        if let Err(error) = self.close_socket(link_id) {
            warn!("Failed to close socket {} after receive: {:?}", link_id, error);
        }
    }
}

impl<T: Transport, W: Timer<TIMER_HZ>, const TIMER_HZ: u32, const N: usize, const RX_SIZE: usize> TcpClientStack
    for Adapter<T, W, TIMER_HZ, N, RX_SIZE>
{
    type TcpSocket = SocketHandle;
    type Error = Error;

    /// Returns a new unconnected socket. The link id is assigned on connect.
    fn socket(&mut self) -> Result<SocketHandle, Error> {
        match self.session.sockets.next_free() {
            Some(_) => Ok(SocketHandle { link_id: None }),
            None => Err(Error::NoSocketAvailable),
        }
    }

    /// Opens a new TCP connection with keep alive enabled. Only IPv4 is supported.
    fn connect(&mut self, socket: &mut SocketHandle, remote: SocketAddr) -> nb::Result<(), Error> {
        if let Some(link_id) = socket.link_id {
            if self.valid_socket(link_id) {
                return Err(nb::Error::Other(Error::AlreadyConnected));
            }
        }

        let SocketAddr::V4(remote) = remote else {
            return Err(nb::Error::Other(Error::UnsupportedAddress));
        };

        socket.link_id = Some(self.open_socket(remote, true, socket.link_id)?);
        Ok(())
    }

    fn send(&mut self, socket: &mut SocketHandle, buffer: &[u8]) -> nb::Result<usize, Error> {
        let link_id = socket.link_id.ok_or(Error::InvalidSocket)?;
        self.send_on_socket(link_id, buffer)?;

        Ok(buffer.len())
    }

    fn receive(&mut self, socket: &mut SocketHandle, buffer: &mut [u8]) -> nb::Result<usize, Error> {
        let link_id = socket.link_id.ok_or(Error::InvalidSocket)?;
        self.receive_from_socket(link_id, buffer)
    }

    /// Closes the socket. Sockets already closed by the remote side are just dropped.
    fn close(&mut self, socket: SocketHandle) -> Result<(), Error> {
        match socket.link_id {
            Some(link_id) if self.valid_socket(link_id) => self.close_socket(link_id).map(|_| ()),
            _ => Ok(()),
        }
    }
}
