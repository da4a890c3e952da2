//! Link engine
//!
//! Owns the transport and drives the connection through reset, handshake
//! and streaming. All protocol decisions are a function of the current
//! [`ConnectionState`] and the next command byte.

pub mod state;
pub mod stats;

pub use state::{ConnectionState, SensorIdentity};
pub use stats::LinkStats;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{OutputPin, PinState};

use ev3uart_hal::{ByteTransport, HeartbeatTimer};
use ev3uart_protocol::frame::{BYTE_ACK, BYTE_NACK};
use ev3uart_protocol::{
    verify, Checksum, Command, FrameError, HostCommand, InfoKind, MAX_PAYLOAD_SIZE,
};

use crate::config::{ConfigError, EngineConfig};
use crate::heartbeat::LinkFlag;
use crate::mode::{ModeCatalog, ModeDescriptor};
use crate::sample::{SampleBuffer, MAX_SAMPLES};

/// Errors returned by caller-facing commands
///
/// `service()` never returns these; it reflects problems through
/// [`LinkStats`] and the connection state instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The transport failed
    Transport(E),
    /// Mode index not present in the catalog
    ModeOutOfRange { mode: u8, available: usize },
    /// Raw write payload must be 1-32 bytes
    InvalidPayloadLength(usize),
    /// Outgoing frame could not be encoded
    Frame(FrameError),
    /// `connect_within` gave up before streaming started
    ConnectTimeout,
    /// The engine configuration is unusable
    Config(ConfigError),
}

/// Why a committed frame could not be read to the end
enum ReadFault<E> {
    Transport(E),
    Timeout,
}

/// One frame read off the line
struct RawFrame {
    info_kind: u8,
    payload: [u8; MAX_PAYLOAD_SIZE],
    len: usize,
    computed: u8,
    received: u8,
}

impl RawFrame {
    fn payload(&self) -> &[u8] {
        &self.payload[..self.len]
    }

    fn checksum_ok(&self) -> bool {
        self.computed == self.received
    }
}

/// EV3 UART sensor link engine
///
/// Generic over the byte transport `T`, the blocking delay `D` used while
/// switching bit rate, and the heartbeat timer `H`.
pub struct Engine<'a, T, D, H> {
    transport: T,
    delay: D,
    timer: H,
    link: &'a LinkFlag,
    config: EngineConfig,
    state: ConnectionState,
    identity: SensorIdentity,
    catalog: ModeCatalog,
    samples: SampleBuffer,
    current_mode: u8,
    sample_count: usize,
    stats: LinkStats,
}

impl<'a, T, D, H> Engine<'a, T, D, H>
where
    T: ByteTransport,
    D: DelayNs,
    H: HeartbeatTimer,
{
    /// Create an engine in the `Reset` state
    ///
    /// Validates `config` and puts the transport on the default bit rate.
    pub fn new(
        transport: T,
        delay: D,
        timer: H,
        link: &'a LinkFlag,
        config: EngineConfig,
    ) -> Result<Self, Error<T::Error>> {
        config.validate().map_err(Error::Config)?;
        link.publish(ConnectionState::Reset);
        let mut engine = Self {
            transport,
            delay,
            timer,
            link,
            config,
            state: ConnectionState::Reset,
            identity: SensorIdentity::unknown(config.default_bit_rate),
            catalog: ModeCatalog::new(),
            samples: SampleBuffer::new(),
            current_mode: 0,
            sample_count: 1,
            stats: LinkStats::default(),
        };
        engine
            .transport
            .set_bit_rate(config.default_bit_rate)
            .map_err(Error::Transport)?;
        Ok(engine)
    }

    /// Process at most one pending message
    ///
    /// Returns immediately when no byte is waiting. Once a command byte
    /// declares a payload the rest of that frame is read before returning.
    /// Returns true if a byte was consumed.
    pub fn service(&mut self) -> bool {
        if !self.transport.is_byte_available() {
            return false;
        }
        let byte = match self.transport.read_byte() {
            Ok(byte) => byte,
            Err(_e) => {
                self.stats.transport_errors = self.stats.transport_errors.wrapping_add(1);
                warn!("Transport read failed");
                return true;
            }
        };

        let command = Command::classify(byte);
        match self.state {
            ConnectionState::Streaming => match command {
                Command::Data { mode, length } => self.handle_data(byte, mode, length),
                _ => trace!("Ignoring {=u8:#x} while streaming", byte),
            },
            ConnectionState::Handshaking => self.handle_handshake(byte, command),
            // Ignore everything until a valid TYPE message
            ConnectionState::Reset => {
                if command == Command::Type {
                    self.handle_type(byte);
                }
            }
        }
        true
    }

    /// Service the link until it is streaming
    ///
    /// Blocks forever if no sensor is attached.
    pub fn connect(&mut self) {
        while !self.state.is_streaming() {
            self.service();
        }
    }

    /// Service the link until it is streaming or `max_polls` calls elapse
    pub fn connect_within(&mut self, max_polls: u32) -> Result<(), Error<T::Error>> {
        for _ in 0..max_polls {
            if self.state.is_streaming() {
                return Ok(());
            }
            self.service();
        }
        if self.state.is_streaming() {
            Ok(())
        } else {
            Err(Error::ConnectTimeout)
        }
    }

    /// Like [`connect`](Self::connect), blinking `indicator` on traffic
    ///
    /// The indicator is toggled for every message received during the
    /// handshake and left on once streaming.
    pub fn connect_with_indicator<P: OutputPin>(&mut self, indicator: &mut P) -> Result<(), P::Error> {
        let mut lit = false;
        while !self.state.is_streaming() {
            if self.service() {
                lit = !lit;
                indicator.set_state(PinState::from(lit))?;
            }
        }
        indicator.set_high()
    }

    /// Return to the `Reset` state
    ///
    /// Disarms the heartbeat, forgets everything learned in the handshake
    /// and puts the transport back on the default bit rate. Safe to call at
    /// any time. The local state is cleared even if the transport fails.
    pub fn reset(&mut self) -> Result<(), Error<T::Error>> {
        self.timer.disarm();
        self.set_state(ConnectionState::Reset);
        self.identity = SensorIdentity::unknown(self.config.default_bit_rate);
        self.catalog.clear();
        self.samples.clear();
        self.current_mode = 0;
        self.sample_count = 1;
        self.stats.clear_session();
        self.transport
            .set_bit_rate(self.config.default_bit_rate)
            .map_err(Error::Transport)
    }

    /// Ask the sensor to switch mode
    ///
    /// Fails without sending anything if `mode` was not declared during
    /// the handshake.
    pub fn select_mode(&mut self, mode: u8) -> Result<(), Error<T::Error>> {
        let sets = match self.catalog.get(usize::from(mode)) {
            Some(descriptor) => descriptor.sample_count(),
            None => {
                return Err(Error::ModeOutOfRange {
                    mode,
                    available: self.catalog.len(),
                })
            }
        };

        let bytes = HostCommand::Select { mode }
            .encode_to_vec()
            .map_err(Error::Frame)?;
        self.transport.write_all(&bytes).map_err(Error::Transport)?;

        debug!("Selected mode {=u8}", mode);
        self.current_mode = mode;
        self.sample_count = sets;
        Ok(())
    }

    /// Send a WRITE message with 1-32 raw bytes
    ///
    /// Payloads that are not a power of two are zero-padded.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), Error<T::Error>> {
        if bytes.is_empty() || bytes.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::InvalidPayloadLength(bytes.len()));
        }
        let frame = HostCommand::Write(bytes)
            .encode_to_vec()
            .map_err(Error::Frame)?;
        self.transport.write_all(&frame).map_err(Error::Transport)
    }

    /// Current connection state
    pub fn status(&self) -> ConnectionState {
        self.state
    }

    /// Number of modes declared by the sensor
    pub fn mode_count(&self) -> usize {
        self.catalog.len()
    }

    /// Number of modes the sensor lists for display
    pub fn view_count(&self) -> u8 {
        self.catalog.views()
    }

    /// LEGO type code, 0 before the handshake
    pub fn sensor_type(&self) -> u8 {
        self.identity.sensor_type
    }

    /// Type code and negotiated bit rate
    pub fn identity(&self) -> SensorIdentity {
        self.identity
    }

    /// Mode the sensor is streaming
    pub fn current_mode(&self) -> u8 {
        self.current_mode
    }

    /// Values per sample in the current mode
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Copy the latest sample into `buffer[offset..]`
    ///
    /// Returns the number of values written, which is
    /// [`sample_count`](Self::sample_count) unless `buffer` is too short.
    pub fn fetch_sample(&self, buffer: &mut [f32], offset: usize) -> usize {
        self.samples.fetch(buffer, offset, self.sample_count)
    }

    /// Latest decoded values
    pub fn samples(&self) -> &[f32] {
        self.samples.as_slice()
    }

    /// Metadata for one mode
    pub fn mode_descriptor(&self, mode: usize) -> Option<&ModeDescriptor> {
        self.catalog.get(mode)
    }

    /// Every declared mode
    pub fn catalog(&self) -> &ModeCatalog {
        &self.catalog
    }

    /// Bit rate used once streaming
    pub fn negotiated_bit_rate(&self) -> u32 {
        self.identity.bit_rate
    }

    /// Error and traffic counters
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Flag shared with the heartbeat
    pub fn link(&self) -> &'a LinkFlag {
        self.link
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Tear down, handing back the hardware
    pub fn release(mut self) -> (T, D, H) {
        self.timer.disarm();
        self.link.publish(ConnectionState::Reset);
        (self.transport, self.delay, self.timer)
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("Link state {} -> {}", self.state, state);
        }
        self.state = state;
        self.link.publish(state);
    }

    fn handle_handshake(&mut self, byte: u8, command: Command) {
        match command {
            Command::Ack => self.handle_ack(),
            Command::Type => self.handle_type(byte),
            Command::Modes => {
                if let Some(frame) = self.read_checked(byte, Command::Modes.payload_len(), false) {
                    let [modes_minus_one, views] = [frame.payload[0], frame.payload[1]];
                    self.catalog
                        .allocate(usize::from(modes_minus_one) + 1, views);
                    debug!("Sensor has {=usize} modes, {=u8} views", self.catalog.len(), views);
                }
            }
            Command::Speed => {
                if let Some(frame) = self.read_checked(byte, Command::Speed.payload_len(), false) {
                    let p = frame.payload();
                    self.identity.bit_rate = u32::from_le_bytes([p[0], p[1], p[2], p[3]]);
                    debug!("Sensor speed {=u32}", self.identity.bit_rate);
                }
            }
            Command::Info { mode, length } => self.handle_info(byte, mode, length),
            _ => trace!("Ignoring {=u8:#x} during handshake", byte),
        }
    }

    fn handle_type(&mut self, byte: u8) {
        if let Some(frame) = self.read_checked(byte, Command::Type.payload_len(), false) {
            self.identity.sensor_type = frame.payload[0];
            info!("Sensor type {=u8}", self.identity.sensor_type);
            self.set_state(ConnectionState::Handshaking);
        }
    }

    fn handle_info(&mut self, byte: u8, mode: u8, length: usize) {
        let Some(frame) = self.read_checked(byte, length, true) else {
            return;
        };
        let Some(kind) = InfoKind::from_byte(frame.info_kind) else {
            trace!("Unknown INFO kind {=u8:#x}", frame.info_kind);
            return;
        };
        let Some(descriptor) = self.catalog.get_mut(usize::from(mode)) else {
            self.stats.malformed_frames = self.stats.malformed_frames.wrapping_add(1);
            warn!("INFO for undeclared mode {=u8}", mode);
            return;
        };
        if descriptor.apply_info(kind, frame.payload()).is_err() {
            self.stats.malformed_frames = self.stats.malformed_frames.wrapping_add(1);
            warn!("Malformed INFO {} for mode {=u8}", kind.as_str(), mode);
        }
    }

    fn handle_ack(&mut self) {
        match self.start_streaming() {
            Ok(()) => info!(
                "Streaming at {=u32} baud, {=usize} modes",
                self.identity.bit_rate,
                self.catalog.len()
            ),
            Err(_e) => {
                warn!("Transport failed while switching to streaming");
                let restored = self.reset();
                self.stats.transport_errors = self.stats.transport_errors.wrapping_add(1);
                if restored.is_err() {
                    self.stats.transport_errors = self.stats.transport_errors.wrapping_add(1);
                }
            }
        }
    }

    fn start_streaming(&mut self) -> Result<(), T::Error> {
        let dropped = self.transport.drain()?;
        if dropped > 0 {
            trace!("Drained {=usize} bytes before ACK", dropped);
        }
        self.transport.write_byte(BYTE_ACK)?;
        self.delay.delay_ms(self.config.ack_settle_ms);
        self.transport.set_bit_rate(self.identity.bit_rate)?;

        self.set_state(ConnectionState::Streaming);
        self.stats.start_streaming();
        self.current_mode = 0;
        self.sample_count = self
            .catalog
            .get(0)
            .map_or(1, ModeDescriptor::sample_count);

        self.transport.write_byte(BYTE_NACK)?;
        self.timer.arm(self.config.heartbeat_period_us);
        Ok(())
    }

    fn handle_data(&mut self, byte: u8, mode: u8, length: usize) {
        let Some(frame) = self.read_frame(byte, length, false) else {
            return;
        };

        if !verify(frame.received, frame.computed, self.identity.sensor_type, mode) {
            let threshold = self.config.max_consecutive_errors;
            if self.stats.record_data_error(threshold) {
                warn!(
                    "{=u8} consecutive data errors, resetting link",
                    self.stats.consecutive_errors
                );
                if self.reset().is_err() {
                    warn!("Transport failed restoring the default bit rate");
                    self.stats.transport_errors = self.stats.transport_errors.wrapping_add(1);
                }
                self.stats.resets = self.stats.resets.wrapping_add(1);
            } else {
                debug!(
                    "Data checksum error: calculated {=u8:#x}, received {=u8:#x}",
                    frame.computed,
                    frame.received
                );
            }
            return;
        }

        self.stats.record_data();

        let Some(descriptor) = self.catalog.get(usize::from(mode)) else {
            self.stats.malformed_frames = self.stats.malformed_frames.wrapping_add(1);
            warn!("DATA for undeclared mode {=u8}", mode);
            return;
        };
        let data_type = descriptor.data_type;
        let count = descriptor.sample_count();

        // Frames still in flight after select_mode() carry the old mode
        if mode != self.current_mode {
            trace!("DATA for mode {=u8} while {=u8} is selected", mode, self.current_mode);
        }

        self.samples
            .load(data_type, count.min(MAX_SAMPLES), frame.payload());
    }

    /// Read a frame and drop it unless its checksum matches exactly
    fn read_checked(&mut self, command: u8, length: usize, info: bool) -> Option<RawFrame> {
        let frame = self.read_frame(command, length, info)?;
        if frame.checksum_ok() {
            Some(frame)
        } else {
            self.stats.handshake_errors = self.stats.handshake_errors.wrapping_add(1);
            debug!(
                "Handshake checksum error on {=u8:#x}: calculated {=u8:#x}, received {=u8:#x}",
                command,
                frame.computed,
                frame.received
            );
            None
        }
    }

    /// Read the remainder of a frame whose command byte was just received
    ///
    /// Faults are counted here; `None` means the frame is gone.
    fn read_frame(&mut self, command: u8, length: usize, info: bool) -> Option<RawFrame> {
        match self.try_read_frame(command, length, info) {
            Ok(frame) => Some(frame),
            Err(ReadFault::Timeout) => {
                self.stats.malformed_frames = self.stats.malformed_frames.wrapping_add(1);
                warn!("Timed out reading frame {=u8:#x}", command);
                None
            }
            Err(ReadFault::Transport(_e)) => {
                self.stats.transport_errors = self.stats.transport_errors.wrapping_add(1);
                warn!("Transport failed reading frame {=u8:#x}", command);
                None
            }
        }
    }

    fn try_read_frame(
        &mut self,
        command: u8,
        length: usize,
        info: bool,
    ) -> Result<RawFrame, ReadFault<T::Error>> {
        let mut sum = Checksum::new();
        sum.push(command);

        let info_kind = if info {
            let kind = self.wait_byte()?;
            sum.push(kind);
            kind
        } else {
            0
        };

        let mut frame = RawFrame {
            info_kind,
            payload: [0; MAX_PAYLOAD_SIZE],
            len: length.min(MAX_PAYLOAD_SIZE),
            computed: 0,
            received: 0,
        };
        for i in 0..frame.len {
            let b = self.wait_byte()?;
            sum.push(b);
            frame.payload[i] = b;
        }

        frame.computed = sum.value();
        frame.received = self.wait_byte()?;
        Ok(frame)
    }

    /// Busy-wait for the next byte of a committed frame
    fn wait_byte(&mut self) -> Result<u8, ReadFault<T::Error>> {
        let limit = self.config.byte_wait_limit;
        let mut polls: u32 = 0;
        while !self.transport.is_byte_available() {
            if limit != 0 {
                polls += 1;
                if polls >= limit {
                    return Err(ReadFault::Timeout);
                }
            }
            core::hint::spin_loop();
        }
        self.transport.read_byte().map_err(ReadFault::Transport)
    }
}
