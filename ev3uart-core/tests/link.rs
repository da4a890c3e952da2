//! End-to-end link tests against a simulated sensor

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};
use proptest::prelude::*;

use ev3uart_core::{
    ConnectionState, DataType, Engine, EngineConfig, Error, Heartbeat, InfoKind, LinkFlag,
    MAX_SAMPLES,
};
use ev3uart_drivers::{SimDelay, SimLink, SimTimer};
use ev3uart_protocol::SensorMessage;

type SimEngine<'a> = Engine<'a, &'a SimLink, &'a SimDelay, &'a SimTimer>;

const TYPE_ULTRASONIC: u8 = 30;
const TYPE_COLOR: u8 = 29;

struct Bench {
    sim: SimLink,
    delay: SimDelay,
    timer: SimTimer,
    flag: LinkFlag,
}

impl Bench {
    fn new() -> Self {
        Self {
            sim: SimLink::new(),
            delay: SimDelay::new(),
            timer: SimTimer::new(),
            flag: LinkFlag::new(),
        }
    }

    fn engine(&self) -> SimEngine<'_> {
        self.engine_with(EngineConfig::default().with_byte_wait_limit(32))
    }

    fn engine_with(&self, config: EngineConfig) -> SimEngine<'_> {
        Engine::new(&self.sim, &self.delay, &self.timer, &self.flag, config).unwrap()
    }

    fn push(&self, message: SensorMessage<'_>) {
        self.sim.push_message(&message).unwrap();
    }

    /// Queue a DATA frame with its checksum flipped
    fn push_corrupt_data(&self, mode: u8, payload: &[u8]) {
        let mut bytes = SensorMessage::Data { mode, payload }.encode_to_vec().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x55;
        self.sim.push_bytes(&bytes);
    }

    /// Queue the handshake of an EV3 color sensor (five modes)
    fn push_color_handshake(&self) {
        let modes: [(&str, u8, DataType); 5] = [
            ("COL-REFLECT", 1, DataType::Byte8),
            ("COL-AMBIENT", 1, DataType::Byte8),
            ("COL-COLOR", 1, DataType::Byte8),
            ("REF-RAW", 2, DataType::Int16),
            ("RGB-RAW", 3, DataType::Int16),
        ];

        self.push(SensorMessage::Sync);
        self.push(SensorMessage::Type(TYPE_COLOR));
        self.push(SensorMessage::Modes { modes_minus_one: 4, views: 3 });
        self.push(SensorMessage::Speed(57_600));
        for (mode, &(name, sets, data_type)) in modes.iter().enumerate().rev() {
            let mode = mode as u8;
            self.push(SensorMessage::Name { mode, name });
            self.push(SensorMessage::Format {
                mode,
                sets,
                data_type,
                figures: 4,
                decimals: 0,
            });
        }
        self.push(SensorMessage::Ack);
    }

    /// Queue the handshake of a sensor whose mode 0 streams one float
    fn push_float_handshake(&self) {
        self.push(SensorMessage::Type(TYPE_ULTRASONIC));
        self.push(SensorMessage::Modes { modes_minus_one: 1, views: 2 });
        self.push(SensorMessage::Speed(57_600));
        self.push(SensorMessage::Format {
            mode: 0,
            sets: 1,
            data_type: DataType::Float32,
            figures: 5,
            decimals: 1,
        });
        self.push(SensorMessage::Format {
            mode: 1,
            sets: 2,
            data_type: DataType::Int32,
            figures: 8,
            decimals: 0,
        });
        self.push(SensorMessage::Ack);
    }
}

fn service_all(engine: &mut SimEngine<'_>) {
    while engine.service() {}
}

#[test]
fn handshake_builds_catalog_and_switches_rate() {
    let bench = Bench::new();
    let mut engine = bench.engine();

    bench.push_color_handshake();
    engine.connect_within(200).unwrap();

    assert_eq!(engine.status(), ConnectionState::Streaming);
    assert_eq!(engine.sensor_type(), TYPE_COLOR);
    assert_eq!(engine.mode_count(), 5);
    assert_eq!(engine.view_count(), 3);
    assert_eq!(engine.negotiated_bit_rate(), 57_600);
    assert!(engine.catalog().is_complete());

    let rgb = engine.mode_descriptor(4).unwrap();
    assert_eq!(rgb.name(), Some("RGB-RAW"));
    assert_eq!(rgb.sample_count(), 3);
    assert_eq!(rgb.data_type, DataType::Int16);

    // ACK reply, then the first keepalive at the new rate
    assert_eq!(&bench.sim.written()[..], &[0x04, 0x02]);
    assert_eq!(bench.sim.bit_rate(), 57_600);
    assert_eq!(bench.delay.elapsed_ms(), 10);
    assert_eq!(bench.timer.period_us(), Some(95_000));
    assert_eq!(bench.flag.state(), ConnectionState::Streaming);

    assert_eq!(engine.current_mode(), 0);
    assert_eq!(engine.sample_count(), 1);
}

#[test]
fn modes_message_declares_count_plus_one() {
    let bench = Bench::new();
    let mut engine = bench.engine();

    bench.push(SensorMessage::Type(TYPE_ULTRASONIC));
    bench.push(SensorMessage::Modes { modes_minus_one: 2, views: 3 });
    service_all(&mut engine);

    assert_eq!(engine.status(), ConnectionState::Handshaking);
    assert_eq!(engine.mode_count(), 3);
    assert!(engine.mode_descriptor(2).is_some());
}

#[test]
fn format_info_populates_descriptor() {
    let bench = Bench::new();
    let mut engine = bench.engine();

    bench.push(SensorMessage::Type(TYPE_ULTRASONIC));
    bench.push(SensorMessage::Modes { modes_minus_one: 1, views: 2 });
    // INFO FORMAT for mode 1: sets=2, Float32, 5 figures, 1 decimal
    bench.sim.push_bytes(&[0x91, 0x80, 2, 3, 5, 1, 0xFF ^ 0x91 ^ 0x80 ^ 2 ^ 3 ^ 5 ^ 1]);
    service_all(&mut engine);

    assert!(!engine.mode_descriptor(0).unwrap().is_complete());
    let mode = engine.mode_descriptor(1).unwrap();
    assert_eq!(mode.sample_count(), 2);
    assert_eq!(mode.sets, 2);
    assert_eq!(mode.data_type, DataType::Float32);
    assert_eq!(mode.figures, 5);
    assert_eq!(mode.decimals, 1);
}

#[test]
fn later_info_overwrites_earlier() {
    let bench = Bench::new();
    let mut engine = bench.engine();

    bench.push(SensorMessage::Type(TYPE_ULTRASONIC));
    bench.push(SensorMessage::Modes { modes_minus_one: 0, views: 1 });
    bench.push(SensorMessage::Symbol { mode: 0, symbol: "cm" });
    bench.push(SensorMessage::Symbol { mode: 0, symbol: "inch" });
    bench.push(SensorMessage::Range {
        mode: 0,
        kind: InfoKind::SiRange,
        low: 0.0,
        high: 255.0,
    });
    service_all(&mut engine);

    let mode = engine.mode_descriptor(0).unwrap();
    assert_eq!(mode.symbol.as_str(), "inch");
    assert_eq!(mode.si.high, 255.0);
}

#[test]
fn handshake_checksum_error_is_skipped() {
    let bench = Bench::new();
    let mut engine = bench.engine();

    bench.push(SensorMessage::Type(TYPE_ULTRASONIC));
    // SPEED with a bad checksum
    bench.sim.push_bytes(&[0x52, 0x00, 0xE1, 0x00, 0x00, 0x00]);
    bench.push(SensorMessage::Modes { modes_minus_one: 0, views: 1 });
    service_all(&mut engine);

    assert_eq!(engine.status(), ConnectionState::Handshaking);
    assert_eq!(engine.stats().handshake_errors, 1);
    assert_eq!(engine.negotiated_bit_rate(), 2400);
    assert_eq!(engine.mode_count(), 1);
}

#[test]
fn float_sample_decodes() {
    let bench = Bench::new();
    let mut engine = bench.engine();
    bench.push_float_handshake();
    engine.connect_within(100).unwrap();

    bench.push(SensorMessage::Data {
        mode: 0,
        payload: &[0x00, 0x00, 0x80, 0x3F],
    });
    service_all(&mut engine);

    let mut out = [0.0f32; 4];
    assert_eq!(engine.fetch_sample(&mut out, 0), 1);
    assert_eq!(out[0], 1.0);
    assert_eq!(engine.stats().messages_received, 1);
}

#[test]
fn stale_mode_frame_keeps_selected_mode() {
    let bench = Bench::new();
    let mut engine = bench.engine();
    bench.push_float_handshake();
    engine.connect_within(100).unwrap();

    let mut payload = [0u8; 8];
    payload[..4].copy_from_slice(&(-7i32).to_le_bytes());
    payload[4..].copy_from_slice(&70_000i32.to_le_bytes());
    bench.push(SensorMessage::Data { mode: 1, payload: &payload });
    service_all(&mut engine);

    // Decoded with mode 1's layout, but mode 0 stays selected
    assert_eq!(engine.samples(), &[-7.0, 70_000.0]);
    assert_eq!(engine.current_mode(), 0);
    assert_eq!(engine.sample_count(), 1);

    engine.select_mode(1).unwrap();
    // A mode 0 frame sent before the sensor switched
    bench.push(SensorMessage::Data {
        mode: 0,
        payload: &[0x00, 0x00, 0x80, 0x3F],
    });
    service_all(&mut engine);
    assert_eq!(engine.current_mode(), 1);
    assert_eq!(engine.sample_count(), 2);
    assert_eq!(engine.samples(), &[1.0]);
}

#[test]
fn failed_rate_restore_on_auto_reset_is_counted() {
    let bench = Bench::new();
    let mut engine = bench.engine();
    bench.push_color_handshake();
    engine.connect_within(200).unwrap();

    bench.sim.set_rate_faulted(true);
    for _ in 0..6 {
        bench.push_corrupt_data(0, &[0x11]);
    }
    service_all(&mut engine);

    assert_eq!(engine.status(), ConnectionState::Reset);
    assert_eq!(engine.stats().resets, 1);
    assert_eq!(engine.stats().transport_errors, 1);
    assert_eq!(bench.sim.bit_rate(), 57_600);

    // Once the line recovers an explicit reset brings it back to 2400
    bench.sim.set_rate_faulted(false);
    engine.reset().unwrap();
    assert_eq!(bench.sim.bit_rate(), 2400);
}

#[test]
fn six_bad_frames_reset_the_link() {
    let bench = Bench::new();
    let mut engine = bench.engine();
    bench.push_color_handshake();
    engine.connect_within(200).unwrap();

    for _ in 0..5 {
        bench.push_corrupt_data(0, &[0x11]);
    }
    service_all(&mut engine);
    assert_eq!(engine.status(), ConnectionState::Streaming);
    assert_eq!(engine.stats().consecutive_errors, 5);

    bench.push_corrupt_data(0, &[0x11]);
    service_all(&mut engine);
    assert_eq!(engine.status(), ConnectionState::Reset);
    assert_eq!(engine.stats().resets, 1);
    assert_eq!(engine.mode_count(), 0);
    assert_eq!(bench.sim.bit_rate(), 2400);
    assert!(!bench.timer.is_armed());
    assert_eq!(bench.flag.state(), ConnectionState::Reset);

    // Further garbage in Reset does not compound
    bench.push_corrupt_data(0, &[0x11]);
    service_all(&mut engine);
    assert_eq!(engine.status(), ConnectionState::Reset);
    assert_eq!(engine.stats().resets, 1);
    assert_eq!(engine.stats().data_errors, 0);
}

#[test]
fn good_frame_clears_error_run() {
    let bench = Bench::new();
    let mut engine = bench.engine();
    bench.push_color_handshake();
    engine.connect_within(200).unwrap();

    for _ in 0..5 {
        bench.push_corrupt_data(0, &[0x11]);
    }
    bench.push(SensorMessage::Data { mode: 0, payload: &[0x2A] });
    for _ in 0..5 {
        bench.push_corrupt_data(0, &[0x11]);
    }
    service_all(&mut engine);

    assert_eq!(engine.status(), ConnectionState::Streaming);
    assert_eq!(engine.stats().consecutive_errors, 5);
    assert_eq!(engine.stats().data_errors, 10);
    assert_eq!(engine.samples(), &[42.0]);
}

#[test]
fn error_threshold_is_configurable() {
    let bench = Bench::new();
    let config = EngineConfig {
        max_consecutive_errors: 2,
        ..EngineConfig::default()
    }
    .with_byte_wait_limit(32);
    let mut engine = bench.engine_with(config);
    bench.push_color_handshake();
    engine.connect_within(200).unwrap();

    bench.push_corrupt_data(0, &[0x11]);
    bench.push_corrupt_data(0, &[0x11]);
    service_all(&mut engine);
    assert_eq!(engine.status(), ConnectionState::Reset);
}

#[test]
fn color_rgb_raw_tolerates_bad_checksum() {
    let bench = Bench::new();
    let mut engine = bench.engine();
    bench.push_color_handshake();
    engine.connect_within(200).unwrap();

    engine.select_mode(4).unwrap();
    bench.push_corrupt_data(4, &[0x10, 0x00, 0x20, 0x00, 0x30, 0x00]);
    service_all(&mut engine);

    assert_eq!(engine.stats().data_errors, 0);
    assert_eq!(engine.current_mode(), 4);
    let mut out = [0.0f32; MAX_SAMPLES];
    assert_eq!(engine.fetch_sample(&mut out, 0), 3);
    assert_eq!(&out[..3], &[16.0, 32.0, 48.0]);

    // Other color modes are still checked
    bench.push_corrupt_data(0, &[0x11]);
    service_all(&mut engine);
    assert_eq!(engine.stats().data_errors, 1);
}

#[test]
fn rgb_raw_exemption_is_color_only() {
    let bench = Bench::new();
    let mut engine = bench.engine();

    bench.push(SensorMessage::Type(TYPE_ULTRASONIC));
    bench.push(SensorMessage::Modes { modes_minus_one: 4, views: 5 });
    bench.push(SensorMessage::Ack);
    engine.connect_within(100).unwrap();

    bench.push_corrupt_data(4, &[0x10]);
    service_all(&mut engine);
    assert_eq!(engine.stats().data_errors, 1);
    assert_eq!(engine.stats().messages_received, 0);
}

#[test]
fn data_for_undeclared_mode_is_dropped() {
    let bench = Bench::new();
    let mut engine = bench.engine();
    bench.push_float_handshake();
    engine.connect_within(100).unwrap();

    bench.push(SensorMessage::Data { mode: 6, payload: &[1, 2, 3, 4] });
    service_all(&mut engine);
    assert_eq!(engine.stats().malformed_frames, 1);
    assert_eq!(engine.current_mode(), 0);
    assert!(engine.samples().is_empty());
}

#[test]
fn select_mode_out_of_range_sends_nothing() {
    let bench = Bench::new();
    let mut engine = bench.engine();
    bench.push_color_handshake();
    engine.connect_within(200).unwrap();
    bench.sim.take_written();

    assert_eq!(
        engine.select_mode(9),
        Err(Error::ModeOutOfRange { mode: 9, available: 5 })
    );
    assert!(bench.sim.written().is_empty());

    engine.select_mode(3).unwrap();
    assert_eq!(&bench.sim.written()[..], &[0x43, 0x03, 0xFF ^ 0x43 ^ 0x03]);
    assert_eq!(engine.current_mode(), 3);
    assert_eq!(engine.sample_count(), 2);
}

#[test]
fn heartbeat_only_while_streaming() {
    let bench = Bench::new();
    let mut engine = bench.engine();
    let mut heartbeat = Heartbeat::new(engine.link(), &bench.sim);

    assert!(!heartbeat.on_tick());
    bench.push(SensorMessage::Type(TYPE_COLOR));
    service_all(&mut engine);
    assert!(!heartbeat.on_tick());
    assert!(bench.sim.written().is_empty());

    bench.push_color_handshake();
    engine.connect_within(200).unwrap();
    bench.sim.take_written();
    assert!(heartbeat.on_tick());
    assert!(heartbeat.on_tick());
    assert_eq!(&bench.sim.written()[..], &[0x02, 0x02]);

    engine.reset().unwrap();
    assert!(!heartbeat.on_tick());
    assert_eq!(heartbeat.sent(), 2);
}

#[test]
fn transport_fault_during_ack_resets() {
    let bench = Bench::new();
    let mut engine = bench.engine();

    bench.push(SensorMessage::Type(TYPE_ULTRASONIC));
    bench.push(SensorMessage::Modes { modes_minus_one: 0, views: 1 });
    bench.push(SensorMessage::Speed(57_600));
    service_all(&mut engine);

    bench.push(SensorMessage::Ack);
    bench.sim.set_write_faulted(true);
    service_all(&mut engine);

    assert_eq!(engine.status(), ConnectionState::Reset);
    assert_eq!(engine.stats().transport_errors, 1);
    assert_eq!(bench.sim.bit_rate(), 2400);
    assert!(!bench.timer.is_armed());
}

#[test]
fn connect_within_times_out_without_sensor() {
    let bench = Bench::new();
    let mut engine = bench.engine();
    bench.sim.push_bytes(&[0xFF, 0x00, 0x04]);
    assert_eq!(engine.connect_within(10), Err(Error::ConnectTimeout));
    assert_eq!(engine.status(), ConnectionState::Reset);
}

#[derive(Default)]
struct Led {
    lit: bool,
    changes: u32,
}

impl ErrorType for Led {
    type Error = Infallible;
}

impl OutputPin for Led {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.lit = false;
        self.changes += 1;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.lit = true;
        self.changes += 1;
        Ok(())
    }
}

#[test]
fn indicator_blinks_then_stays_on() {
    let bench = Bench::new();
    let mut engine = bench.engine();
    let mut led = Led::default();

    bench.push_color_handshake();
    engine.connect_with_indicator(&mut led).unwrap();

    assert_eq!(engine.status(), ConnectionState::Streaming);
    assert!(led.lit);
    assert!(led.changes > 10);
}

#[test]
fn write_pads_to_power_of_two() {
    let bench = Bench::new();
    let mut engine = bench.engine();
    bench.push_color_handshake();
    engine.connect_within(200).unwrap();
    bench.sim.take_written();

    engine.write(&[0x01, 0x02, 0x03]).unwrap();
    // Three bytes travel as four, length exponent 2
    let cmd: u8 = 0x44 | (2 << 3);
    assert_eq!(
        &bench.sim.written()[..],
        &[cmd, 0x01, 0x02, 0x03, 0x00, 0xFF ^ cmd ^ 0x01 ^ 0x02 ^ 0x03]
    );
}

#[test]
fn reset_is_idempotent() {
    let bench = Bench::new();
    let mut engine = bench.engine();
    bench.push_color_handshake();
    engine.connect_within(200).unwrap();

    engine.reset().unwrap();
    engine.reset().unwrap();
    assert_eq!(engine.status(), ConnectionState::Reset);
    assert_eq!(engine.sample_count(), 1);
    assert_eq!(engine.current_mode(), 0);
    assert!(engine.mode_descriptor(0).is_none());

    // A fresh handshake works after a reset
    bench.push_float_handshake();
    engine.connect_within(100).unwrap();
    assert_eq!(engine.sensor_type(), TYPE_ULTRASONIC);
    assert_eq!(engine.mode_count(), 2);
}

proptest! {
    #[test]
    fn line_noise_never_exceeds_sample_bounds(noise in proptest::collection::vec(any::<u8>(), 0..256)) {
        let bench = Bench::new();
        let mut engine = bench.engine_with(EngineConfig::default().with_byte_wait_limit(4));
        bench.push_color_handshake();
        prop_assert!(engine.connect_within(200).is_ok());

        bench.sim.push_bytes(&noise);
        for _ in 0..=noise.len() {
            engine.service();
        }

        let mut out = [0.0f32; 2 * MAX_SAMPLES];
        prop_assert!(engine.samples().len() <= MAX_SAMPLES);
        prop_assert!(engine.sample_count() <= MAX_SAMPLES);
        prop_assert!(engine.fetch_sample(&mut out, 0) <= MAX_SAMPLES);
        prop_assert!(engine.mode_count() <= 10);
    }

    #[test]
    fn valid_data_always_accepted(mode in 0u8..5, raw in proptest::collection::vec(any::<u8>(), 6)) {
        let bench = Bench::new();
        let mut engine = bench.engine();
        bench.push_color_handshake();
        prop_assert!(engine.connect_within(200).is_ok());
        prop_assert!(engine.select_mode(mode).is_ok());

        let width = engine.mode_descriptor(usize::from(mode)).map(|m| m.payload_size()).unwrap_or(1);
        bench.push(SensorMessage::Data { mode, payload: &raw[..width] });
        while engine.service() {}

        prop_assert_eq!(engine.stats().messages_received, 1);
        prop_assert_eq!(engine.current_mode(), mode);
        prop_assert_eq!(engine.samples().len(), engine.sample_count());
    }
}
