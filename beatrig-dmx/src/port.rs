//! DMX output ports
//!
//! A DMX512 packet is a break (line held low), a mark-after-break, the start
//! code and then up to 512 channel bytes at 250 kbaud, 8N2.

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::Result;
use crate::universe::{Universe, UNIVERSE_SIZE};

pub const DMX_BAUD_RATE: u32 = 250_000;
/// Break length, the protocol minimum is 88 µs
pub const BREAK_TIME: Duration = Duration::from_micros(100);
/// Mark-after-break length, the protocol minimum is 8 µs
pub const MARK_AFTER_BREAK: Duration = Duration::from_micros(12);
/// Null start code for dimmer data
pub const START_CODE: u8 = 0x00;

/// Something that can put a universe on the wire
pub trait DmxPort: Send {
    /// Transmit one complete packet
    fn send(&mut self, universe: &Universe) -> Result<()>;

    /// Human-readable name for logs
    fn name(&self) -> &str;
}

/// DMX512 over a USB/RS-485 serial adapter
pub struct SerialDmxPort {
    name: String,
    port: Box<dyn SerialPort>,
    packet: Vec<u8>,
}

impl SerialDmxPort {
    /// Open a serial device with DMX512 line settings
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, DMX_BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::Two)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()?;
        tracing::info!(port = path, "opened DMX serial port");
        Ok(Self {
            name: path.to_string(),
            port,
            packet: Vec::with_capacity(UNIVERSE_SIZE + 1),
        })
    }
}

impl DmxPort for SerialDmxPort {
    fn send(&mut self, universe: &Universe) -> Result<()> {
        self.packet.clear();
        self.packet.push(START_CODE);
        self.packet.extend_from_slice(universe.as_bytes());

        self.port.set_break()?;
        thread::sleep(BREAK_TIME);
        self.port.clear_break()?;
        thread::sleep(MARK_AFTER_BREAK);
        self.port.write_all(&self.packet)?;
        self.port.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Port that discards every packet, used when no interface is available
#[derive(Debug, Default)]
pub struct NullPort;

impl DmxPort for NullPort {
    fn send(&mut self, _universe: &Universe) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Port that records packets in memory, for dry runs and tests
#[derive(Debug, Clone, Default)]
pub struct RecordingPort {
    packets: Arc<Mutex<Vec<Universe>>>,
}

impl RecordingPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets sent so far
    pub fn packets(&self) -> Vec<Universe> {
        self.packets.lock().clone()
    }

    pub fn packet_count(&self) -> usize {
        self.packets.lock().len()
    }

    pub fn last(&self) -> Option<Universe> {
        self.packets.lock().last().cloned()
    }
}

impl DmxPort for RecordingPort {
    fn send(&mut self, universe: &Universe) -> Result<()> {
        self.packets.lock().push(universe.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Wraps a port and skips packets identical to the last one transmitted
pub struct FrameSender {
    port: Box<dyn DmxPort>,
    last_sent: Option<Universe>,
    sent: u64,
}

impl FrameSender {
    pub fn new(port: Box<dyn DmxPort>) -> Self {
        Self {
            port,
            last_sent: None,
            sent: 0,
        }
    }

    /// Transmit `universe` unless it matches the last packet.
    ///
    /// Returns whether a packet went on the wire. A failed write is retried
    /// on the next call.
    pub fn send(&mut self, universe: &Universe) -> Result<bool> {
        if self.last_sent.as_ref() == Some(universe) {
            return Ok(false);
        }
        self.port.send(universe)?;
        self.last_sent = Some(universe.clone());
        self.sent += 1;
        Ok(true)
    }

    /// Packets actually transmitted
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn port_name(&self) -> &str {
        self.port.name()
    }
}
