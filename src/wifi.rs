//! # Adapter and WIFI access point client
//!
//! The [Adapter] owns the serial transport, the watchdog timer and all session state. Commands are
//! written synchronously and then wait on the status bitmask, which gets filled by parsing the
//! received frames. Every received byte re-arms the watchdog. If it expires, the pending frame is
//! flushed and the waiting command returns with [Outcome::TimedOut].
//!
//! The receive path is driven by [Adapter::on_receive_interrupt] and [Adapter::on_watchdog_expired].
//! Both get called by the blocking wait loop itself. Outside of commands [Adapter::poll] services
//! them, e.g. from the main loop.
//!
//! Note: If the connection is lost, the ESP8266 will try independently to reconnect. The state can
//! be queried using `get_join_status()`.
//!
//! ## Example
//!
//! ````
//! # use esp_at_mux::example::{ExampleTimer, ExampleTransport};
//! # use esp_at_mux::session::WifiState;
//! # use esp_at_mux::wifi::{Adapter, Mode, WifiAdapter};
//! #
//! let mut adapter: Adapter<_, _, 1_000_000, 5, 256> = Adapter::new(ExampleTransport::default(), ExampleTimer::default());
//! assert!(adapter.init().is_ok());
//!
//! // Joining the access point, blocks until confirmed
//! let state = adapter.join("test_wifi", "secret", Mode::Blocking).unwrap();
//! assert_eq!(WifiState::Connected, state.state);
//!
//! let address = adapter.get_address().unwrap();
//! assert_eq!("10.0.0.181", address.to_string());
//! ````
use crate::commands::{
    AccessPointConnectCommand, AccessPointDisconnectCommand, AttentionCommand, CommandErrorHandler,
    DisableEchoCommand, ObtainStationAddressCommand, SetMultipleConnectionsCommand, WifiModeCommand,
};
use crate::parser;
use crate::receiver::{FrameState, Receiver};
use crate::session::{DataHook, SessionState, WifiState};
use crate::status::Status;
use crate::transport::Transport;
use atat::AtatCmd;
use core::fmt::Debug;
use embedded_nal::Ipv4Addr;
use fugit::{ExtU32, TimerDurationU32};
use fugit_timer::Timer;

/// Max. length of an encoded command including CRLF
const COMMAND_BUFFER_SIZE: usize = 256;

/// Boot time of the chip after enabling
const ENABLE_SETTLE_US: u32 = 70_000;

/// Discharge time after disabling
const DISABLE_SETTLE_US: u32 = 5_000;

/// Settle time after a blocking command completed
const GRACE_DELAY_US: u32 = 1_000;

/// Default timeout of raw data transmissions in ms
const DEFAULT_SEND_TIMEOUT_MS: u32 = 600;

/// Wifi network adapter trait
pub trait WifiAdapter {
    /// Error when joining a WIFI network
    type JoinError: Debug;

    /// Connects to an WIFI access point and returns the connection state
    fn join(&mut self, ssid: &str, key: &str, mode: Mode) -> Result<JoinState, Self::JoinError>;

    /// Disconnects from the current access point
    fn leave(&mut self) -> Outcome;

    /// Returns the current WIFI connection status
    fn get_join_status(&mut self) -> JoinState;

    /// Returns the station IP, queried from the chip if not known yet
    fn get_address(&mut self) -> Option<Ipv4Addr>;
}

/// Command issuance mode
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Waits until the command got confirmed, failed or the watchdog expired
    Blocking,

    /// Returns directly after writing the command. The response is collected by [Adapter::poll].
    NonBlocking,
}

/// Result of a command issuance
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A terminal status was received
    Completed(Status),

    /// Watchdog expired before a terminal status was received. Status contains ERROR.
    TimedOut(Status),

    /// Command was issued non-blocking
    Pending,
}

impl Outcome {
    /// Accumulated status, [Status::PENDING] for non-blocking commands
    pub fn status(&self) -> Status {
        match self {
            Outcome::Completed(status) | Outcome::TimedOut(status) => *status,
            Outcome::Pending => Status::PENDING,
        }
    }

    /// True if confirmed by OK without any ERROR
    pub fn is_ok(&self) -> bool {
        self.status().is_ok()
    }
}

/// Possible errors when joining an access point
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinError {
    /// Error while setting WIFI mode to station
    ModeError(Status),

    /// Error while setting WIFI credentials or joining
    ConnectError(Status),

    /// Given SSID is longer then the max. size of 32 chars
    InvalidSSIDLength,

    /// Given password is longer then the max. size of 64 chars
    InvalidPasswordLength,
}

/// Current WIFI connection state
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct JoinState {
    /// Access point connection state
    pub state: WifiState,

    /// True if an IP was assigned
    pub ip_assigned: bool,
}

/// Central driver of the AT link
///
/// N: Number of multiplexed sockets (link ids). The ESP8266 supports up to 5. Link ids are single
/// digits on the wire, so N is limited to 10:
///
/// ````compile_fail
/// # use esp_at_mux::example::{ExampleTimer, ExampleTransport};
/// # use esp_at_mux::wifi::Adapter;
/// let adapter: Adapter<_, _, 1_000_000, 11, 256> = Adapter::new(ExampleTransport::default(), ExampleTimer::default());
/// ````
///
/// RX_SIZE: Size of the frame assembly buffer and of each socket payload buffer. Longer frames wrap
/// around and get corrupted.
pub struct Adapter<
    T: Transport,
    W: Timer<TIMER_HZ>,
    const TIMER_HZ: u32,
    const N: usize,
    const RX_SIZE: usize,
> {
    /// Serial port and power line
    pub(crate) transport: T,

    /// Timer bounding each command, re-armed on every received byte
    pub(crate) watchdog: W,

    /// Duration used when (re)arming the watchdog
    pub(crate) watchdog_timeout: TimerDurationU32<TIMER_HZ>,

    /// True while the watchdog is running
    pub(crate) watchdog_armed: bool,

    /// True if the watchdog expired since the last command was issued
    pub(crate) watchdog_fired: bool,

    /// Timeout for raw data transmission
    pub(crate) send_timeout: TimerDurationU32<TIMER_HZ>,

    /// Frame assembly
    pub(crate) receiver: Receiver<RX_SIZE>,

    /// Status, access point state and sockets
    pub(crate) session: SessionState<N, RX_SIZE>,
}

impl<T: Transport, W: Timer<TIMER_HZ>, const TIMER_HZ: u32, const N: usize, const RX_SIZE: usize> WifiAdapter
    for Adapter<T, W, TIMER_HZ, N, RX_SIZE>
{
    type JoinError = JoinError;

    /// Sets station mode and joins the access point. In blocking mode the station IP gets queried
    /// after a successful join.
    ///
    /// Note:
    /// If the connection was not successful or is lost, the ESP8266 will retry independently.
    fn join(&mut self, ssid: &str, key: &str, mode: Mode) -> Result<JoinState, JoinError> {
        let command = AccessPointConnectCommand::new(ssid, key)?;
        self.command(&WifiModeCommand::station_mode())?;

        self.session.set_connecting();
        let outcome = self.send_command(&command, Status::FAIL, mode);
        if outcome == Outcome::Pending {
            return Ok(self.join_state());
        }

        if !outcome.is_ok() {
            self.session.set_disconnected();
            return Err(command.command_error(outcome.status()));
        }

        self.session.wifi_state = WifiState::Connected;
        self.query_ip();
        Ok(self.join_state())
    }

    fn leave(&mut self) -> Outcome {
        self.session.set_disconnected();
        self.send_command(&AccessPointDisconnectCommand, Status::NONE, Mode::Blocking)
    }

    fn get_join_status(&mut self) -> JoinState {
        self.poll();
        self.join_state()
    }

    fn get_address(&mut self) -> Option<Ipv4Addr> {
        self.query_ip();
        self.session.local_ip()
    }
}

impl<T: Transport, W: Timer<TIMER_HZ>, const TIMER_HZ: u32, const N: usize, const RX_SIZE: usize>
    Adapter<T, W, TIMER_HZ, N, RX_SIZE>
{
    /// Link ids are parsed as a single digit
    const VALID_SOCKET_COUNT: () = assert!(N <= 10, "At most 10 sockets are supported");

    /// Creates a new adapter. The chip stays powered off until [Adapter::init] is called.
    pub fn new(transport: T, watchdog: W) -> Self {
        let () = Self::VALID_SOCKET_COUNT;

        Self {
            transport,
            watchdog,
            watchdog_timeout: AttentionCommand::MAX_TIMEOUT_MS.millis(),
            watchdog_armed: false,
            watchdog_fired: false,
            send_timeout: DEFAULT_SEND_TIMEOUT_MS.millis(),
            receiver: Receiver::new(),
            session: SessionState::new(),
        }
    }

    /// Powers the chip up, disables echo and enables multiple connections.
    /// Session state gets reset afterwards, the registered hook is kept.
    pub fn init(&mut self) -> Status {
        self.power_on();

        // Boot messages may still be in flight, so the first attention command only checks the link
        let attention = self.send_command(&AttentionCommand, Status::NONE, Mode::Blocking);
        trace!("Attention: {:?}", attention);

        let mut status = self.send_command(&DisableEchoCommand, Status::NONE, Mode::Blocking).status();
        status |= self
            .send_command(&SetMultipleConnectionsCommand::multiple(), Status::NONE, Mode::Blocking)
            .status();

        self.session.reset();
        debug!("Initialized: {:?}", status);
        status
    }

    /// Sets the enable line and waits until the chip has booted
    pub fn power_on(&mut self) {
        self.transport.hardware_enable(true);
        self.transport.delay_us(ENABLE_SETTLE_US);
    }

    /// Clears the enable line
    pub fn power_off(&mut self) {
        self.transport.hardware_enable(false);
        self.transport.delay_us(DISABLE_SETTLE_US);
    }

    /// Reads back the enable line
    pub fn is_enabled(&mut self) -> bool {
        self.transport.is_hardware_enabled()
    }

    /// Issues an encoded command. The command timeout is used for the watchdog.
    ///
    /// In blocking mode waits until OK, ERROR or any of the `accept` flags are set.
    pub fn send_command<Cmd: AtatCmd>(&mut self, command: &Cmd, accept: Status, mode: Mode) -> Outcome {
        let mut buffer = [0x0; COMMAND_BUFFER_SIZE];
        let length = command.write(&mut buffer);

        self.issue(&[&buffer[..length]], accept, Cmd::MAX_TIMEOUT_MS.millis(), mode)
    }

    /// Issues a command given as text, e.g. `"AT+GMR"`. CRLF gets appended.
    pub fn send_raw_command(&mut self, command: &str, accept: Status, timeout_ms: u32, mode: Mode) -> Outcome {
        self.issue(&[command.as_bytes(), b"\r\n"], accept, timeout_ms.millis(), mode)
    }

    /// Sends a blocking command and maps failures by the command's error handler
    pub(crate) fn command<Cmd: AtatCmd + CommandErrorHandler>(&mut self, command: &Cmd) -> Result<Status, Cmd::Error> {
        let status = self.send_command(command, Status::NONE, Mode::Blocking).status();
        if !status.is_ok() {
            return Err(command.command_error(status));
        }

        Ok(status)
    }

    fn issue(&mut self, parts: &[&[u8]], accept: Status, timeout: TimerDurationU32<TIMER_HZ>, mode: Mode) -> Outcome {
        self.disarm_watchdog();
        self.session.status = Status::NONE;
        self.watchdog_fired = false;
        self.watchdog_timeout = timeout;

        self.wait_send_idle();
        self.flush_receive();
        self.wait_send_idle();

        for part in parts {
            debug!("Sending: {:?}", core::str::from_utf8(part).unwrap_or("<binary>").trim_end());
            self.write_raw(part);
        }
        self.transport.enable_receive_interrupt(true);

        if mode == Mode::NonBlocking {
            return Outcome::Pending;
        }

        let outcome = self.await_status(accept | Status::OK | Status::ERROR, timeout);
        self.transport.delay_us(GRACE_DELAY_US);
        outcome
    }

    /// Writes raw bytes and waits for any of the given flags. Status is cleared before.
    pub(crate) fn transmit(&mut self, data: &[u8], flags: Status, timeout: TimerDurationU32<TIMER_HZ>) -> Outcome {
        self.session.status = Status::NONE;
        self.watchdog_fired = false;

        self.wait_send_idle();
        self.write_raw(data);
        self.transport.enable_receive_interrupt(true);

        self.await_status(flags, timeout)
    }

    /// Arms the watchdog and waits for any of the given flags. Accumulated status is kept.
    pub(crate) fn await_status(&mut self, flags: Status, timeout: TimerDurationU32<TIMER_HZ>) -> Outcome {
        self.arm_watchdog(timeout);
        let outcome = self.wait_for(flags);
        self.disarm_watchdog();
        outcome
    }

    /// Busy waits until any of the flags is set or the watchdog expired
    fn wait_for(&mut self, flags: Status) -> Outcome {
        loop {
            self.on_receive_interrupt();

            let status = self.session.status;
            if self.watchdog_fired {
                return Outcome::TimedOut(status);
            }

            if status.intersects(flags) {
                return Outcome::Completed(status);
            }

            // Intermediate frames disarm the watchdog, but the command is still waiting
            if !self.watchdog_armed {
                self.kick_watchdog();
            }

            if self.watchdog_expired() {
                self.on_watchdog_expired();
            }
        }
    }

    fn write_raw(&mut self, data: &[u8]) {
        for byte in data {
            while self.transport.is_send_busy() {}
            self.transport.send_byte(*byte);
        }
    }

    fn wait_send_idle(&mut self) {
        while self.transport.is_send_busy() {}
    }

    /// Drops stale bytes and any partially assembled frame
    fn flush_receive(&mut self) {
        let mut dropped = self.receiver.frame().len();
        while self.transport.byte_available() {
            let _ = self.transport.read_byte();
            dropped += 1;
        }

        if dropped > 0 {
            trace!("Flushed {} stale bytes", dropped);
        }
        self.receiver.reset();
    }

    /// Receive interrupt entry point. Drains all available bytes and processes completed frames.
    pub fn on_receive_interrupt(&mut self) {
        while self.transport.byte_available() {
            let byte = self.transport.read_byte();
            self.kick_watchdog();
            self.receiver.push(byte);

            match self.receiver.poll() {
                FrameState::Incomplete => {}
                FrameState::Discarded => self.disarm_watchdog(),
                FrameState::Complete => self.process_frame(),
            }
        }
    }

    /// Watchdog interrupt entry point. Signals ERROR and flushes the pending frame.
    pub fn on_watchdog_expired(&mut self) {
        warn!("Watchdog expired after {} bytes", self.receiver.frame().len());
        self.watchdog_armed = false;
        self.watchdog_fired = true;
        self.session.status |= Status::ERROR;

        if self.receiver.force() == FrameState::Complete {
            self.process_frame();
        }
    }

    /// Services pending bytes and watchdog expiry outside of commands
    pub fn poll(&mut self) {
        self.on_receive_interrupt();

        if self.watchdog_expired() {
            self.on_watchdog_expired();
        }
    }

    fn process_frame(&mut self) {
        self.disarm_watchdog();

        let frame = self.receiver.frame();
        trace!("Received frame: {:?}", core::str::from_utf8(frame).unwrap_or("<binary>"));

        let status = parser::parse(frame, &mut self.session);
        self.receiver.reset();
        self.session.status |= status;

        if status.contains(Status::DATA_INCOMING) {
            self.session.deliver_data();
        }
    }

    fn arm_watchdog(&mut self, timeout: TimerDurationU32<TIMER_HZ>) {
        self.watchdog_timeout = timeout;
        self.kick_watchdog();
    }

    /// (Re)starts the watchdog with the current timeout
    fn kick_watchdog(&mut self) {
        match self.watchdog.start(self.watchdog_timeout) {
            Ok(_) => self.watchdog_armed = true,
            Err(_) => error!("Failed to start watchdog"),
        }
    }

    fn disarm_watchdog(&mut self) {
        if !self.watchdog_armed {
            return;
        }

        if self.watchdog.cancel().is_err() {
            warn!("Failed to cancel watchdog");
        }
        self.watchdog_armed = false;
    }

    fn watchdog_expired(&mut self) -> bool {
        if !self.watchdog_armed {
            return false;
        }

        match self.watchdog.wait() {
            Ok(_) => true,
            Err(nb::Error::WouldBlock) => false,
            // Treated as expiry, otherwise a waiting command would never return
            Err(nb::Error::Other(_)) => {
                error!("Watchdog failure");
                true
            }
        }
    }

    /// Returns the station IP. Queries it from the chip (`AT+CIPSTA?`) if not known yet.
    /// Returns 0 if no IP was assigned.
    pub fn query_ip(&mut self) -> u32 {
        if self.session.ip_address == 0 {
            let outcome = self.send_command(&ObtainStationAddressCommand, Status::NONE, Mode::Blocking);
            if !outcome.is_ok() {
                warn!("Station IP query failed: {:?}", outcome);
            }
        }

        self.session.ip_address
    }

    /// Registers the receiver of unsolicited socket data. Called once per received payload.
    pub fn register_hook(&mut self, hook: DataHook) {
        self.session.hook = Some(hook);
    }

    pub fn remove_hook(&mut self) {
        self.session.hook = None;
    }

    /// Sets the timeout for sending TCP data in ms
    pub fn set_send_timeout_ms(&mut self, timeout: u32) {
        self.send_timeout = TimerDurationU32::millis(timeout);
    }

    /// Read access to status, access point state and sockets
    pub fn session(&self) -> &SessionState<N, RX_SIZE> {
        &self.session
    }

    /// Accumulated status since the last command
    pub fn status(&self) -> Status {
        self.session.status
    }

    pub fn wifi_state(&self) -> WifiState {
        self.session.wifi_state
    }

    /// Cached station IP in integer form, 0 if unknown
    pub fn ip_address(&self) -> u32 {
        self.session.ip_address
    }

    /// Cached station IP
    pub fn local_ip(&self) -> Option<Ipv4Addr> {
        self.session.local_ip()
    }

    pub fn is_connected(&self) -> bool {
        self.session.wifi_state == WifiState::Connected
    }

    /// Releases the transport and the watchdog
    pub fn release(self) -> (T, W) {
        (self.transport, self.watchdog)
    }

    fn join_state(&self) -> JoinState {
        JoinState {
            state: self.session.wifi_state,
            ip_assigned: self.session.ip_address != 0,
        }
    }
}
