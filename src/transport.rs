//! # Serial transport
//!
//! Narrow interface to the board support layer. Implementations are expected to be synchronous
//! and infallible, hardware faults are out of scope of this crate.
//!
//! ## Interrupt context
//!
//! The [Adapter](crate::wifi::Adapter) is owned by the application and borrowed mutably for the
//! whole duration of a blocking command, so the RX interrupt never calls into it. Instead the
//! interrupt writes received bytes into an [Ingress]. The transport drains the matching [RxQueue]
//! in [Transport::byte_available] and [Transport::read_byte], and the adapter assembles frames from
//! its wait loop or from [Adapter::poll](crate::wifi::Adapter::poll).
//!
//! On a target the queue lives in a `static` and is split once, handing the [Ingress] to the
//! interrupt handler.
//!
//! ````
//! # use esp_at_mux::example::{ExampleTimer, InterruptTransport};
//! # use esp_at_mux::transport::split_ingress;
//! # use esp_at_mux::wifi::Adapter;
//! # use heapless::spsc::Queue;
//! #
//! let mut queue: Queue<u8, 64> = Queue::new();
//! let (mut ingress, rx) = split_ingress(&mut queue);
//! let mut adapter: Adapter<_, _, 1_000_000, 5, 256> = Adapter::new(InterruptTransport::new(rx), ExampleTimer::default());
//!
//! // RX interrupt handler
//! ingress.write(b"0,CONNECT\r\n");
//!
//! // Main loop
//! adapter.poll();
//! assert!(adapter.valid_socket(0));
//! ````
use heapless::spsc::{Consumer, Producer, Queue};

/// Byte level port to the ESP8266
pub trait Transport {
    /// Writes a single byte to the UART
    fn send_byte(&mut self, byte: u8);

    /// True while the UART is still shifting out data
    fn is_send_busy(&mut self) -> bool;

    /// True if at least one received byte can be read
    fn byte_available(&mut self) -> bool;

    /// Reads the next received byte. Only called if [Transport::byte_available] returned true.
    fn read_byte(&mut self) -> u8;

    /// Enables/disables the receive interrupt
    fn enable_receive_interrupt(&mut self, enable: bool);

    /// Drives the chip enable (CH_PD) line
    fn hardware_enable(&mut self, enable: bool);

    /// Returns the current state of the chip enable line
    fn is_hardware_enabled(&mut self) -> bool;

    /// Blocks for the given number of microseconds
    fn delay_us(&mut self, us: u32);
}

/// Splits the queue into the interrupt and the application side.
/// The queue holds up to `SIZE - 1` bytes.
pub fn split_ingress<const SIZE: usize>(queue: &mut Queue<u8, SIZE>) -> (Ingress<'_, SIZE>, RxQueue<'_, SIZE>) {
    let (producer, consumer) = queue.split();

    (Ingress { producer, dropped: 0 }, RxQueue { consumer })
}

/// Interrupt side of the receive path
pub struct Ingress<'a, const SIZE: usize> {
    producer: Producer<'a, u8, SIZE>,

    /// Bytes lost because the queue was full
    dropped: usize,
}

impl<const SIZE: usize> Ingress<'_, SIZE> {
    /// Queues received bytes and returns the number of accepted ones.
    /// Bytes not fitting into the queue are dropped.
    pub fn write(&mut self, data: &[u8]) -> usize {
        for (written, byte) in data.iter().enumerate() {
            if self.producer.enqueue(*byte).is_err() {
                self.dropped += data.len() - written;
                return written;
            }
        }

        data.len()
    }

    /// Total number of dropped bytes
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Application side of the receive path, drained by the [Transport] implementation
pub struct RxQueue<'a, const SIZE: usize> {
    consumer: Consumer<'a, u8, SIZE>,
}

impl<const SIZE: usize> RxQueue<'_, SIZE> {
    /// True if at least one byte is queued
    pub fn byte_available(&self) -> bool {
        self.consumer.ready()
    }

    /// Next queued byte
    pub fn read_byte(&mut self) -> Option<u8> {
        self.consumer.dequeue()
    }
}
