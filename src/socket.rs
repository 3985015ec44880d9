//! # Socket table
//!
//! Fixed capacity arena of sockets, indexed by the link id of ESP-AT. Slots are filled and emptied
//! in place by the response parser, so no allocation happens on the receive path.
use heapless::Vec;

/// Single TCP connection multiplexed by ESP-AT
#[derive(Debug)]
pub struct Socket<const RX_SIZE: usize> {
    /// Link id of ESP-AT, equals the table index
    pub(crate) link_id: usize,

    /// False => socket gets closed as soon as the buffered payload was consumed
    pub(crate) keep_alive: bool,

    /// False once closing was requested, even if the slot is not released yet
    pub(crate) alive: bool,

    /// Last received payload
    pub(crate) data: Vec<u8, RX_SIZE>,

    /// True if a payload was stored by the parser and not consumed yet
    pub(crate) data_ready: bool,

    /// True if the current payload was already passed to the data hook
    pub(crate) delivered: bool,
}

impl<const RX_SIZE: usize> Socket<RX_SIZE> {
    pub(crate) fn new(link_id: usize) -> Self {
        Self {
            link_id,
            keep_alive: true,
            alive: true,
            data: Vec::new(),
            data_ready: false,
            delivered: false,
        }
    }

    /// Link id of this socket
    pub fn link_id(&self) -> usize {
        self.link_id
    }

    /// True if the socket stays open after consuming data
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// False if closing was requested
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// True if an unread payload is buffered
    pub fn is_data_ready(&self) -> bool {
        self.data_ready
    }

    /// Currently buffered payload. Empty if no data is ready.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Stores a received payload. Bytes exceeding the buffer capacity are dropped.
    /// Returns the number of stored bytes.
    pub(crate) fn store(&mut self, payload: &[u8]) -> usize {
        let length = payload.len().min(RX_SIZE);

        self.data.clear();
        // Length is bound by capacity
        let _ = self.data.extend_from_slice(&payload[..length]);
        self.data_ready = true;
        self.delivered = false;
        length
    }

    /// Drops the buffered payload
    pub(crate) fn clear(&mut self) {
        self.data.clear();
        self.data_ready = false;
        self.delivered = false;
    }
}

/// Fixed size table of sockets, array index = link_id
pub struct SocketTable<const N: usize, const RX_SIZE: usize> {
    slots: [Option<Socket<RX_SIZE>>; N],
}

impl<const N: usize, const RX_SIZE: usize> Default for SocketTable<N, RX_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, const RX_SIZE: usize> SocketTable<N, RX_SIZE> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Creates a fresh socket at the given slot, replacing any stale one.
    /// Returns None if the link id is out of range.
    pub(crate) fn open(&mut self, link_id: usize) -> Option<&mut Socket<RX_SIZE>> {
        let slot = self.slots.get_mut(link_id)?;
        Some(slot.insert(Socket::new(link_id)))
    }

    /// Releases the given slot. Returns true if a socket was removed.
    pub(crate) fn release(&mut self, link_id: usize) -> bool {
        match self.slots.get_mut(link_id) {
            Some(slot) => slot.take().is_some(),
            None => false,
        }
    }

    /// Empties all slots
    pub(crate) fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    /// Returns the socket of the given slot
    pub fn get(&self, link_id: usize) -> Option<&Socket<RX_SIZE>> {
        self.slots.get(link_id)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, link_id: usize) -> Option<&mut Socket<RX_SIZE>> {
        self.slots.get_mut(link_id)?.as_mut()
    }

    /// True if the slot is occupied by an open or not yet released socket
    pub fn is_occupied(&self, link_id: usize) -> bool {
        self.get(link_id).is_some()
    }

    /// Lowest free link id
    pub fn next_free(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    /// Number of occupied slots
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Iterates all sockets in ascending link id order
    pub fn iter(&self) -> impl Iterator<Item = &Socket<RX_SIZE>> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Socket<RX_SIZE>> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    /// Table capacity
    pub const fn capacity(&self) -> usize {
        N
    }
}
