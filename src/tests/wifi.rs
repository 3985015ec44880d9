use crate::session::WifiState;
use crate::status::Status;
use crate::tests::mock::{MockTimer, MockTransport};
use crate::wifi::{Adapter, JoinError, JoinState, Mode, Outcome, WifiAdapter};
use std::cell::RefCell;

type AdapterType = Adapter<MockTransport, MockTimer, 1_000_000, 5, 64>;

const JOIN_RESPONSE: &[u8] = b"WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n";
const ADDRESS_RESPONSE: &[u8] =
    b"+CIPSTA:ip:\"10.0.0.181\"\r\n+CIPSTA:gateway:\"10.0.0.1\"\r\n+CIPSTA:netmask:\"255.255.255.0\"\r\n\r\nOK\r\n";

#[test]
fn test_init_correct_commands() {
    let mut transport = MockTransport::new();
    transport.add_init_responses();

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::running());
    let status = adapter.init();

    assert_eq!(Status::OK, status);
    assert!(adapter.is_enabled());
    assert!(adapter.transport.interrupt_enabled);
    assert_eq!(70_000, adapter.transport.delays[0]);

    let commands = adapter.transport.get_commands_as_strings();
    assert_eq!(vec!["AT\r\n", "ATE0\r\n", "AT+CIPMUX=1\r\n"], commands);
}

#[test]
fn test_init_echo_enabled() {
    let mut transport = MockTransport::new();
    transport.add_response(b"AT\r\n\r\nOK\r\n");
    transport.add_response(b"ATE0\r\n\r\nOK\r\n");
    transport.add_ok_response();

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::running());

    assert_eq!(Status::OK, adapter.init());
}

#[test]
fn test_init_error() {
    let mut transport = MockTransport::new();
    transport.add_ok_response();
    transport.add_ok_response();
    transport.add_error_response();

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::running());
    let status = adapter.init();

    assert_eq!(Status::OK | Status::ERROR, status);
    assert!(!status.is_ok());
}

#[test]
fn test_init_resets_session() {
    let mut transport = MockTransport::new();
    transport.add_init_responses();

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::running());
    adapter.register_hook(|_, _| {});
    adapter.session.set_ip_address(0x0A00_00B5);
    adapter.session.sockets.open(0);
    adapter.session.server_open = true;
    adapter.session.server_port = 80;

    adapter.init();

    assert_eq!(WifiState::Disconnected, adapter.wifi_state());
    assert_eq!(0, adapter.ip_address());
    assert_eq!(0, adapter.session().sockets().count());
    assert!(!adapter.session().server_open());
    assert_eq!(Status::NONE, adapter.status());
    assert!(adapter.session.hook.is_some());
}

#[test]
fn test_power_off() {
    let mut adapter: AdapterType = Adapter::new(MockTransport::new(), MockTimer::running());

    adapter.power_on();
    adapter.power_off();

    assert!(!adapter.is_enabled());
    assert_eq!(vec![true, false], adapter.transport.enable_calls);
    assert_eq!(vec![70_000, 5_000], adapter.transport.delays);
}

#[test]
fn test_join_mode_error() {
    let mut transport = MockTransport::new();
    transport.add_error_response();

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::running());
    let result = adapter.join("test_wifi", "secret", Mode::Blocking).unwrap_err();

    assert_eq!(JoinError::ModeError(Status::ERROR), result);

    let commands = adapter.transport.get_commands_as_strings();
    assert_eq!(1, commands.len());
    assert_eq!("AT+CWMODE_DEF=1\r\n", commands[0]);
}

#[test]
fn test_join_invalid_ssid_length() {
    let mut adapter: AdapterType = Adapter::new(MockTransport::new(), MockTimer::running());

    let result = adapter.join("0123456789012345678901234567890123", "secret", Mode::Blocking);

    assert_eq!(JoinError::InvalidSSIDLength, result.unwrap_err());
    assert!(adapter.transport.get_commands_as_strings().is_empty());
}

#[test]
fn test_join_invalid_password_length() {
    let mut adapter: AdapterType = Adapter::new(MockTransport::new(), MockTimer::running());
    let password = "x".repeat(65);

    let result = adapter.join("test_wifi", &password, Mode::Blocking);

    assert_eq!(JoinError::InvalidPasswordLength, result.unwrap_err());
    assert!(adapter.transport.get_commands_as_strings().is_empty());
}

#[test]
fn test_join_connect_fail() {
    let mut transport = MockTransport::new();
    transport.add_ok_response();
    transport.add_response(b"+CWJAP:1\r\n\r\nFAIL\r\n");

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::running());
    let result = adapter.join("test_wifi", "secret", Mode::Blocking).unwrap_err();

    assert_eq!(JoinError::ConnectError(Status::FAIL), result);
    assert_eq!(WifiState::Disconnected, adapter.wifi_state());

    let commands = adapter.transport.get_commands_as_strings();
    assert_eq!(2, commands.len());
    assert_eq!("AT+CWJAP_DEF=\"test_wifi\",\"secret\"\r\n", commands[1]);
}

#[test]
fn test_join_timeout() {
    let mut transport = MockTransport::new();
    transport.add_ok_response();
    transport.add_no_response();

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::expired());
    let result = adapter.join("test_wifi", "secret", Mode::Blocking).unwrap_err();

    assert_eq!(JoinError::ConnectError(Status::ERROR), result);
    assert_eq!(WifiState::Disconnected, adapter.wifi_state());
}

#[test]
fn test_join_blocking() {
    let mut transport = MockTransport::new();
    transport.add_ok_response();
    transport.add_response(JOIN_RESPONSE);
    transport.add_response(ADDRESS_RESPONSE);

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::running());
    let state = adapter.join("test_wifi", "secret", Mode::Blocking).unwrap();

    assert_eq!(
        JoinState {
            state: WifiState::Connected,
            ip_assigned: true
        },
        state
    );
    assert!(adapter.is_connected());
    assert_eq!(0x0A00_00B5, adapter.ip_address());

    let commands = adapter.transport.get_commands_as_strings();
    assert_eq!(
        vec![
            "AT+CWMODE_DEF=1\r\n",
            "AT+CWJAP_DEF=\"test_wifi\",\"secret\"\r\n",
            "AT+CIPSTA?\r\n"
        ],
        commands
    );
}

#[test]
fn test_join_uses_extended_timeout() {
    let mut transport = MockTransport::new();
    transport.add_ok_response();
    transport.add_response(JOIN_RESPONSE);
    transport.add_response(ADDRESS_RESPONSE);

    let mut timer = MockTimer::new();
    timer
        .expect_start()
        .withf(|duration| *duration == MockTimer::duration_ms(250))
        .returning(|_| Ok(()));
    timer
        .expect_start()
        .withf(|duration| *duration == MockTimer::duration_ms(16_000))
        .times(1..)
        .returning(|_| Ok(()));
    timer.expect_cancel().returning(|| Ok(()));
    timer.expect_wait().returning(|| Err(nb::Error::WouldBlock));

    let mut adapter: AdapterType = Adapter::new(transport, timer);
    adapter.join("test_wifi", "secret", Mode::Blocking).unwrap();
}

#[test]
fn test_join_non_blocking() {
    let mut transport = MockTransport::new();
    transport.add_ok_response();
    transport.add_response(JOIN_RESPONSE);

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::running());
    let state = adapter.join("test_wifi", "secret", Mode::NonBlocking).unwrap();

    assert_eq!(WifiState::Connecting, state.state);
    assert!(!state.ip_assigned);
    assert_eq!(2, adapter.transport.get_commands_as_strings().len());

    // Response is collected later
    let state = adapter.get_join_status();
    assert_eq!(WifiState::Connected, state.state);
    assert!(!state.ip_assigned);
    assert!(adapter.status().contains(Status::OK | Status::CONNECTED));
    assert_eq!(0, adapter.transport.pending_rx());
}

#[test]
fn test_leave() {
    let mut transport = MockTransport::new();
    transport.add_response(b"WIFI DISCONNECT\r\n\r\nOK\r\n");

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::running());
    adapter.session.set_ip_address(0x0A00_00B5);

    let outcome = adapter.leave();

    assert_eq!(Outcome::Completed(Status::DISCONNECTED | Status::OK), outcome);
    assert_eq!(WifiState::Disconnected, adapter.wifi_state());
    assert_eq!(None, adapter.local_ip());
    assert_eq!(vec!["AT+CWQAP\r\n"], adapter.transport.get_commands_as_strings());
}

#[test]
fn test_get_address_cached() {
    let mut adapter: AdapterType = Adapter::new(MockTransport::new(), MockTimer::running());
    adapter.session.set_ip_address(0x0A00_00B5);

    let address = adapter.get_address().unwrap();

    assert_eq!("10.0.0.181", address.to_string());
    assert!(adapter.transport.get_commands_as_strings().is_empty());
}

#[test]
fn test_get_address_queried() {
    let mut transport = MockTransport::new();
    transport.add_response(ADDRESS_RESPONSE);

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::running());
    let address = adapter.get_address().unwrap();

    assert_eq!("10.0.0.181", address.to_string());
    assert_eq!(WifiState::Connected, adapter.wifi_state());
    assert_eq!(vec!["AT+CIPSTA?\r\n"], adapter.transport.get_commands_as_strings());
}

#[test]
fn test_get_address_not_assigned() {
    let mut transport = MockTransport::new();
    transport.add_response(b"+CIPSTA:ip:\"0.0.0.0\"\r\n\r\nOK\r\n");

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::running());

    assert_eq!(None, adapter.get_address());
    assert_eq!(0, adapter.ip_address());
    assert!(adapter.status().contains(Status::GOT_IP));
}

#[test]
fn test_unsolicited_disconnect() {
    let mut adapter: AdapterType = Adapter::new(MockTransport::new(), MockTimer::running());
    adapter.session.set_ip_address(0x0A00_00B5);
    adapter.transport.add_unsolicited(b"WIFI DISCONNECT\r\n");

    let state = adapter.get_join_status();

    assert_eq!(WifiState::Disconnected, state.state);
    assert!(!state.ip_assigned);
}

#[test]
fn test_raw_command_accept_flag() {
    let mut transport = MockTransport::new();
    transport.add_response(b"\r\nready\r\n");

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::running());
    let outcome = adapter.send_raw_command("AT+RST", Status::READY, 2_000, Mode::Blocking);

    assert_eq!(Outcome::Completed(Status::READY), outcome);
    assert_eq!(vec!["AT+RST\r\n"], adapter.transport.get_commands_as_strings());
}

#[test]
fn test_raw_command_non_blocking() {
    let mut transport = MockTransport::new();
    transport.add_ok_response();

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::running());
    let outcome = adapter.send_raw_command("AT+GMR", Status::NONE, 250, Mode::NonBlocking);

    assert_eq!(Outcome::Pending, outcome);
    assert_eq!(Status::PENDING, outcome.status());
    assert_eq!(Status::NONE, adapter.status());

    adapter.poll();
    assert_eq!(Status::OK, adapter.status());
}

#[test]
fn test_command_grace_delay() {
    let mut transport = MockTransport::new();
    transport.add_ok_response();

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::running());
    adapter.send_raw_command("AT", Status::NONE, 250, Mode::Blocking);

    assert_eq!(vec![1_000], adapter.transport.delays);
}

#[test]
fn test_stale_bytes_flushed() {
    let mut transport = MockTransport::new();
    transport.add_unsolicited(b"ERROR\r\nbusy");
    transport.add_ok_response();

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::running());
    let outcome = adapter.send_raw_command("AT", Status::NONE, 250, Mode::Blocking);

    assert_eq!(Outcome::Completed(Status::OK), outcome);
}

#[test]
fn test_timeout_without_response() {
    let mut transport = MockTransport::new();
    transport.add_no_response();

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::expired());
    let outcome = adapter.send_raw_command("AT", Status::NONE, 250, Mode::Blocking);

    assert_eq!(Outcome::TimedOut(Status::ERROR), outcome);
    assert!(!outcome.is_ok());
}

#[test]
fn test_timeout_flushes_partial_frame() {
    let mut transport = MockTransport::new();
    transport.add_response(b"\r\npartial OK");

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::expired());
    let outcome = adapter.send_raw_command("AT", Status::NONE, 250, Mode::Blocking);

    // Forced frame is still parsed
    assert_eq!(Outcome::TimedOut(Status::ERROR | Status::OK), outcome);
    assert!(adapter.receiver.frame().is_empty());
}

#[test]
fn test_watchdog_failure_ends_wait() {
    let mut transport = MockTransport::new();
    transport.add_no_response();

    let mut timer = MockTimer::new();
    timer.expect_start().returning(|_| Ok(()));
    timer.expect_cancel().returning(|| Ok(()));
    timer.expect_wait().returning(|| Err(nb::Error::Other(1)));

    let mut adapter: AdapterType = Adapter::new(transport, timer);
    let outcome = adapter.send_raw_command("AT", Status::NONE, 250, Mode::Blocking);

    assert_eq!(Outcome::TimedOut(Status::ERROR), outcome);
}

#[test]
fn test_receive_interrupt_accumulates_status() {
    let mut adapter: AdapterType = Adapter::new(MockTransport::new(), MockTimer::running());
    adapter.transport.add_unsolicited(b"\r\nready\r\nWIFI CONNECTED\r\n");

    adapter.on_receive_interrupt();

    assert_eq!(Status::READY | Status::CONNECTED, adapter.status());
    assert_eq!(WifiState::Connecting, adapter.wifi_state());
}

#[test]
fn test_watchdog_expired_outside_command() {
    let mut adapter: AdapterType = Adapter::new(MockTransport::new(), MockTimer::expired());
    adapter.transport.add_unsolicited(b"0,CONNECT");

    // First byte arms the watchdog, which expires directly
    adapter.poll();

    assert!(adapter.status().contains(Status::ERROR | Status::SOCKET_OPENED));
    assert!(adapter.session().sockets().is_occupied(0));
}

#[test]
fn test_watchdog_rearmed_by_every_byte() {
    let mut transport = MockTransport::new();
    transport.drip = true;
    transport.add_response(b"+CWJAP:\"test_wifi\"\r\n\r\nOK\r\n");

    // Expires as soon as a single check passes without a received byte
    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::stall_detecting());
    let outcome = adapter.send_raw_command("AT+CWJAP?", Status::NONE, 250, Mode::Blocking);

    assert_eq!(Outcome::Completed(Status::OK), outcome);
}

#[test]
fn test_watchdog_expires_after_last_byte() {
    let mut transport = MockTransport::new();
    transport.drip = true;
    transport.add_response(b"\r\nOK");

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::stall_detecting());
    let outcome = adapter.send_raw_command("AT", Status::NONE, 250, Mode::Blocking);

    assert_eq!(Outcome::TimedOut(Status::OK | Status::ERROR), outcome);
}

#[test]
fn test_watchdog_started_per_byte() {
    let mut transport = MockTransport::new();
    transport.add_ok_response();

    // Armed once by the command, restarted by each of the 6 received bytes
    let mut timer = MockTimer::new();
    timer.expect_start().times(7).returning(|_| Ok(()));
    timer.expect_cancel().returning(|| Ok(()));
    timer.expect_wait().returning(|| Err(nb::Error::WouldBlock));

    let mut adapter: AdapterType = Adapter::new(transport, timer);
    let outcome = adapter.send_raw_command("AT", Status::NONE, 250, Mode::Blocking);

    assert_eq!(Outcome::Completed(Status::OK), outcome);
}

#[test]
fn test_max_link_id() {
    let mut adapter: Adapter<MockTransport, MockTimer, 1_000_000, 10, 64> =
        Adapter::new(MockTransport::new(), MockTimer::running());
    adapter.transport.add_unsolicited(b"9,CONNECT\r\n");

    adapter.poll();

    assert!(adapter.session().sockets().is_occupied(9));
    assert_eq!(10, adapter.session().sockets().capacity());
}

thread_local! {
    static DELIVERED: RefCell<Vec<(usize, Vec<u8>)>> = const { RefCell::new(Vec::new()) };
}

fn capture(link_id: usize, data: &[u8]) {
    DELIVERED.with(|delivered| delivered.borrow_mut().push((link_id, data.to_vec())));
}

#[test]
fn test_hook_called_once_per_payload() {
    let mut adapter: AdapterType = Adapter::new(MockTransport::new(), MockTimer::running());
    adapter.register_hook(capture);
    adapter.transport.add_unsolicited(b"1,CONNECT\r\n+IPD,1,8:ping\r\n\r\n");

    adapter.poll();
    adapter.poll();

    let delivered = DELIVERED.with(|delivered| delivered.take());
    assert_eq!(vec![(1, b"ping\r\n\r\n".to_vec())], delivered);
    assert!(adapter.session().sockets().get(1).unwrap().is_data_ready());
}

#[test]
fn test_hook_watchdog_expired_during_payload() {
    let mut adapter: AdapterType = Adapter::new(MockTransport::new(), MockTimer::expired());
    adapter.register_hook(capture);
    adapter.transport.add_unsolicited(b"0,CONNECT\r\n+IPD,0,10:abc");

    adapter.poll();

    // Only the received bytes are delivered
    let delivered = DELIVERED.with(|delivered| delivered.take());
    assert_eq!(vec![(0, b"abc".to_vec())], delivered);
    assert_eq!(b"abc", adapter.session().sockets().get(0).unwrap().data());
    assert!(adapter.status().contains(Status::ERROR | Status::DATA_INCOMING));
}

#[test]
fn test_hook_removed() {
    let mut adapter: AdapterType = Adapter::new(MockTransport::new(), MockTimer::running());
    adapter.register_hook(capture);
    adapter.remove_hook();
    adapter.transport.add_unsolicited(b"0,CONNECT\r\n+IPD,0,2:hi");

    adapter.poll();

    assert!(DELIVERED.with(|delivered| delivered.take()).is_empty());
    assert!(adapter.session().sockets().get(0).unwrap().is_data_ready());
}

#[test]
fn test_send_timeout() {
    let mut adapter: AdapterType = Adapter::new(MockTransport::new(), MockTimer::running());
    assert_eq!(MockTimer::duration_ms(600), adapter.send_timeout);

    adapter.set_send_timeout_ms(2_000);

    assert_eq!(MockTimer::duration_ms(2_000), adapter.send_timeout);
}
