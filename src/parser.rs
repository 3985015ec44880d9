//! Response parser
//!
//! Decodes one completed frame into a [Status] and applies its side effects to the session.
//! Patterns are searched independently, so a single frame may carry any combination of them.
use crate::session::{SessionState, WifiState};
use crate::status::Status;

/// Prefix of socket data frames: `+IPD,<link_id>,<length>:<payload>`
pub(crate) const IPD_PREFIX: &[u8] = b"+IPD,";

/// Prefix of the station IP, e.g. in `+CIPSTA:ip:"10.0.0.181"`
const IP_PREFIX: &[u8] = b"ip:\"";

/// Plain status patterns
const STATUS_PATTERNS: [(&[u8], Status); 10] = [
    (b"OK", Status::OK),
    (b"busy...", Status::BUSY),
    (b"FAIL", Status::FAIL),
    (b"ERROR", Status::ERROR),
    (b"READY", Status::READY),
    (b"ready", Status::READY),
    (b"SEND OK", Status::SEND_OK),
    (b"SUCCESS", Status::SUCCESS),
    (b">", Status::RECV_PROMPT),
    (b"WIFI DISCONN", Status::DISCONNECTED),
];

/// Parse state of a `+IPD` header
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum IpdHeader {
    /// Header fully received
    Complete {
        link_id: usize,
        length: usize,
        /// Header length in bytes, including the colon
        size: usize,
    },
    /// Header ends before the colon
    Incomplete,
    /// Header contains unexpected characters
    Malformed,
}

impl IpdHeader {
    /// Parses the header following the `+IPD,` prefix
    pub(crate) fn parse(data: &[u8]) -> Self {
        let Some(comma) = data.iter().position(|byte| !byte.is_ascii_digit()) else {
            return Self::Incomplete;
        };
        if data[comma] != b',' {
            return Self::Malformed;
        }

        let length_start = comma + 1;
        let Some(colon) = data[length_start..].iter().position(|byte| !byte.is_ascii_digit()) else {
            return Self::Incomplete;
        };
        let colon = length_start + colon;
        if data[colon] != b':' {
            return Self::Malformed;
        }

        match (parse_decimal(&data[..comma]), parse_decimal(&data[length_start..colon])) {
            (Some(link_id), Some(length)) => Self::Complete {
                link_id: link_id as usize,
                length: length as usize,
                size: colon + 1,
            },
            _ => Self::Malformed,
        }
    }
}

/// Frame split into the text parts around a socket payload
struct Frame<'a> {
    head: &'a [u8],
    tail: &'a [u8],
}

impl<'a> Frame<'a> {
    /// True if the needle occurs outside the payload
    fn contains(&self, needle: &[u8]) -> bool {
        find(self.head, needle).is_some() || find(self.tail, needle).is_some()
    }

    /// Calls `f` with the link id of every `<digit><suffix>` occurrence outside the payload.
    /// Returns true if the suffix was found at least once.
    fn for_each_link_id<F: FnMut(Option<usize>)>(&self, suffix: &[u8], mut f: F) -> bool {
        let mut found = false;

        for text in [self.head, self.tail] {
            let mut offset = 0;
            while let Some(position) = find(&text[offset..], suffix) {
                let index = offset + position;
                found = true;

                let link_id = match index {
                    0 => None,
                    _ => match text[index - 1] {
                        digit @ b'0'..=b'9' => Some((digit - b'0') as usize),
                        _ => None,
                    },
                };
                f(link_id);
                offset = index + 1;
            }
        }

        found
    }
}

/// Parses a completed frame, updates the session and returns the found status flags
pub(crate) fn parse<const N: usize, const RX_SIZE: usize>(
    data: &[u8],
    session: &mut SessionState<N, RX_SIZE>,
) -> Status {
    let mut status = Status::NONE;

    if data.is_empty() {
        return status;
    }

    // Socket data is excluded from pattern matching, payload may contain anything
    let mut payload = None;
    let mut frame = Frame { head: data, tail: &[] };
    if let Some(position) = find(data, IPD_PREFIX) {
        status |= Status::DATA_INCOMING;
        let header_start = position + IPD_PREFIX.len();

        match IpdHeader::parse(&data[header_start..]) {
            IpdHeader::Complete { link_id, length, size } => {
                let start = header_start + size;
                let end = data.len().min(start.saturating_add(length));
                if end - start < length {
                    warn!("Socket {} payload truncated: {}/{} bytes", link_id, end - start, length);
                }

                payload = Some((link_id, &data[start..end]));
                frame = Frame {
                    head: &data[..position],
                    tail: &data[end..],
                };
            }
            header => warn!("Invalid +IPD header: {:?}", header),
        }
    }

    if frame.contains(b"WIFI CONN") {
        status |= Status::CONNECTED;
        session.set_connecting();
    }

    if frame.contains(b"WIFI GOT IP") {
        session.wifi_state = WifiState::Connected;
    }

    for (pattern, flag) in STATUS_PATTERNS {
        if frame.contains(pattern) {
            status |= flag;
        }
    }

    if status.contains(Status::DISCONNECTED) {
        session.set_disconnected();
    }

    let opened = frame.for_each_link_id(b",CONNECT", |link_id| {
        match link_id.and_then(|link_id| session.sockets.open(link_id)) {
            Some(socket) => debug!("Socket {} opened", socket.link_id),
            None => warn!("Ignoring CONNECT of invalid link id {:?}", link_id),
        }
    });
    if opened {
        status |= Status::SOCKET_OPENED;
    }

    let closed = frame.for_each_link_id(b",CLOSED", |link_id| match link_id {
        Some(link_id) if session.sockets.release(link_id) => debug!("Socket {} closed", link_id),
        _ => warn!("Ignoring CLOSED of unknown link id {:?}", link_id),
    });
    if closed {
        status |= Status::SOCKET_CLOSED;
    }

    let ip_text = [frame.head, frame.tail]
        .into_iter()
        .find_map(|text| find(text, IP_PREFIX).map(|position| &text[position + IP_PREFIX.len()..]));
    if let Some(text) = ip_text {
        match parse_ipv4(text) {
            Some(ip) => {
                session.set_ip_address(ip);
                status |= Status::GOT_IP;
            }
            None => warn!("Invalid station IP: {:?}", text),
        }
    }

    if let Some((link_id, payload)) = payload {
        match session.sockets.get_mut(link_id) {
            Some(socket) => {
                let length = socket.store(payload);
                debug!("Socket {} received {} bytes", link_id, length);
            }
            None => warn!("Dropping {} bytes for unknown socket {}", payload.len(), link_id),
        }
    }

    status
}

/// Converts a dotted quad, terminated by any character except digits and dots, into its integer form
pub(crate) fn parse_ipv4(data: &[u8]) -> Option<u32> {
    let end = data
        .iter()
        .position(|byte| !byte.is_ascii_digit() && *byte != b'.')
        .unwrap_or(data.len());

    let mut ip = 0u32;
    let mut octets = 0;
    for octet in data[..end].split(|byte| *byte == b'.') {
        let value = parse_decimal(octet).filter(|value| *value <= 255)?;
        if octets == 4 {
            return None;
        }

        ip = (ip << 8) | value;
        octets += 1;
    }

    match octets {
        4 => Some(ip),
        _ => None,
    }
}

/// Minimal decimal parser. Fails on empty input, non digits and overflow.
pub(crate) fn parse_decimal(digits: &[u8]) -> Option<u32> {
    if digits.is_empty() {
        return None;
    }

    digits.iter().try_fold(0u32, |value, byte| {
        if !byte.is_ascii_digit() {
            return None;
        }

        value.checked_mul(10)?.checked_add((byte - b'0') as u32)
    })
}

/// Returns the position of the first occurrence of needle
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }

    haystack.windows(needle.len()).position(|window| window == needle)
}
