//! The sensor driver: state machine, init handshake, unlock crypto, and
//! measurement (§4.1).

use std::num::Wrapping;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::colorimetry::ColorResult;
use crate::error::{DriverError, Result};
use crate::gamut::Measurement as GamutPoint; // re-exported for callers building gamut/gamma inputs from measurements
use crate::keys::{UnlockKey, KEY_CATALOG};
use crate::transport::{FileTransport, Transport, PACKET_SIZE};

const INIT_OPCODES: [(u8, u8); 8] = [
    (0x00, 0x01),
    (0x00, 0x10),
    (0x00, 0x11),
    (0x00, 0x12),
    (0x10, 0x00),
    (0x00, 0x31),
    (0x00, 0x13),
    (0x00, 0x20),
];

const INIT_DELAY: Duration = Duration::from_millis(150);
const UNLOCK_BACKOFF: Duration = Duration::from_millis(400);
const MEASURE_DELAY: Duration = Duration::from_millis(500);
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// The device connection state (§3, §4.1). Transitions are monotonic in the
/// forward direction; `close` returns to `Disconnected` from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Disconnected,
    Connected,
    Initialized,
    Unlocked,
}

/// Configuration for [`Driver::open`] (§2c, §6, §9).
#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    /// Whether `open` attempts the privileged permission-escalation shell-out
    /// before opening the device node. Default: `true`, matching the
    /// reference implementation's unconditional behavior.
    pub escalate_permissions: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            escalate_permissions: true,
        }
    }
}

/// The sensor-specific emissive calibration matrix (§6).
const EMISSIVE_MATRIX: [[f64; 3]; 3] = [
    [0.035814, -0.021980, 0.016668],
    [0.014015, 0.016946, 0.000451],
    [-0.000407, 0.000830, 0.078830],
];

/// A value that owns both the transport and its device state (§3, §9): this
/// replaces the reference implementation's process-wide state table keyed by
/// file descriptor with a struct the caller holds directly, so a closed or
/// wrong-state handle is a type-level non-issue rather than a stale-index bug.
pub struct Driver<T: Transport = FileTransport, C: Clock = SystemClock> {
    transport: T,
    state: DeviceState,
    clock: C,
}

impl Driver<FileTransport, SystemClock> {
    /// Opens the device node at `path` (§4.1 `open`).
    ///
    /// If `config.escalate_permissions` is set, first attempts the
    /// privileged chmod-equivalent escalation (§6, §9) — a best-effort step
    /// whose failure is logged but does not itself fail `open`, since the
    /// subsequent device open is the real authority on access.
    pub fn open(path: &str, config: DriverConfig) -> Result<Self> {
        if config.escalate_permissions {
            crate::transport::escalate_permissions(path);
        } else {
            log::debug!("permission escalation disabled by configuration");
        }

        let transport = FileTransport::open(path)?;
        log::info!("opened {path}, state -> Connected");
        Ok(Driver {
            transport,
            state: DeviceState::Connected,
            clock: SystemClock,
        })
    }
}

impl<T: Transport, C: Clock> Driver<T, C> {
    /// Builds a driver directly from an already-open transport and clock,
    /// bypassing `open`'s path-based construction and permission escalation.
    /// Used by tests to drive the state machine against a mock transport.
    pub fn from_parts(transport: T, clock: C) -> Self {
        Driver {
            transport,
            state: DeviceState::Connected,
            clock,
        }
    }

    /// The driver's current state (§4.1 observability).
    pub fn state(&self) -> DeviceState {
        self.state
    }

    fn require_state(&self, expected: DeviceState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(DriverError::NotInitialized)
        }
    }

    /// Closes the handle, returning to `Disconnected` from any state (§3).
    pub fn close(&mut self) {
        log::info!("closing {}, state -> Disconnected", self.transport.name());
        self.state = DeviceState::Disconnected;
    }

    /// Sends the eight-packet init handshake (§4.1 `init_sequence`).
    pub fn init_sequence(&mut self) -> Result<()> {
        self.require_state(DeviceState::Connected)?;

        for (hi, lo) in INIT_OPCODES {
            let mut packet = [0u8; PACKET_SIZE];
            packet[0] = hi;
            packet[1] = lo;
            self.transport.send(&packet)?;
            self.clock.sleep(INIT_DELAY);
            let response = self.transport.recv(READ_TIMEOUT);
            response.map_err(|_| {
                DriverError::InvalidResponse(format!("init opcode ({hi:#04x},{lo:#04x}) short read"))
            })?;
        }

        self.state = DeviceState::Initialized;
        log::info!("init sequence complete, state -> Initialized");
        Ok(())
    }

    /// Attempts the two-round cryptographic unlock with a single key (§4.1
    /// `unlock`).
    pub fn unlock(&mut self, key: UnlockKey) -> Result<()> {
        self.require_state(DeviceState::Initialized)?;

        let mut challenge = [0u8; PACKET_SIZE];
        challenge[0] = 0x99;
        self.transport.send(&challenge)?;
        let response = self.transport.recv(READ_TIMEOUT)?;
        if response[1] != 0x99 {
            return Err(DriverError::InvalidResponse(
                "expected challenge opcode 0x99".into(),
            ));
        }

        let c2 = response[2];
        let c3 = response[3];
        let mut sc = [0u8; 8];
        for i in 0..8 {
            sc[i] = c3 ^ response[35 + i];
        }

        let sr = compute_unlock_response(&sc, key.k0, key.k1);

        let mut reply = [0u8; PACKET_SIZE];
        reply[0] = 0x9A;
        for i in 0..16 {
            reply[24 + i] = c2 ^ sr[i];
        }
        self.transport.send(&reply)?;
        let result = self.transport.recv(READ_TIMEOUT)?;

        if result[2] == 0x77 {
            self.state = DeviceState::Unlocked;
            log::info!("unlocked with key '{}', state -> Unlocked", key.name);
            Ok(())
        } else {
            Err(DriverError::UnlockFailed)
        }
    }

    /// Tries every catalog key in order, waiting 400 ms between failures
    /// (§4.1 `auto_unlock`).
    pub fn auto_unlock(&mut self) -> Result<()> {
        for (idx, key) in KEY_CATALOG.iter().enumerate() {
            log::debug!("auto_unlock attempt {}/{}: {}", idx + 1, KEY_CATALOG.len(), key.name);
            match self.unlock(*key) {
                Ok(()) => return Ok(()),
                Err(DriverError::UnlockFailed) => {
                    self.clock.sleep(UNLOCK_BACKOFF);
                }
                Err(other) => return Err(other),
            }
        }
        Err(DriverError::UnlockFailed)
    }

    /// Triggers a measurement and converts the raw frequency counts into a
    /// full [`ColorResult`] (§4.1 `measure`). Never changes `state`.
    pub fn measure(&mut self) -> Result<ColorResult> {
        self.require_state(DeviceState::Unlocked)?;

        let mut packet = [0u8; PACKET_SIZE];
        packet[0..9].copy_from_slice(&[0x04, 0x00, 0x9F, 0x24, 0x00, 0x00, 0x07, 0xE8, 0x03]);
        self.transport.send(&packet)?;
        self.clock.sleep(MEASURE_DELAY);
        let response = self.transport.recv(READ_TIMEOUT)?;
        if response[1] != 0x04 {
            return Err(DriverError::InvalidResponse(
                "expected measurement opcode 0x04".into(),
            ));
        }

        let r_cnt = le_u32(&response, 2);
        let g_cnt = le_u32(&response, 6);
        let b_cnt = le_u32(&response, 10);
        let r_clk = le_u32(&response, 14);
        let g_clk = le_u32(&response, 18);
        let b_clk = le_u32(&response, 22);

        let r_hz = hz(r_cnt, r_clk);
        let g_hz = hz(g_cnt, g_clk);
        let b_hz = hz(b_cnt, b_clk);

        let (x, y, z) = apply_emissive_matrix(r_hz, g_hz, b_hz);
        Ok(ColorResult::from_xyz(x, y, z))
    }
}

/// Parses a little-endian u32 at `response[offset..offset+4]`, byte by byte
/// rather than by pointer cast (§9 endianness note).
fn le_u32(buf: &[u8; PACKET_SIZE], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

/// Converts a raw (count, clock) pair into a frequency in Hz (§4.1).
fn hz(cnt: u32, clk: u32) -> f64 {
    if cnt <= 1 {
        0.0
    } else {
        (cnt - 1) as f64 * 0.25 / (clk as f64 / 48_000_000.0)
    }
}

/// Applies the compile-time emissive calibration matrix to an (R, G, B)
/// frequency triple, yielding (X, Y, Z) (§4.1, §6).
fn apply_emissive_matrix(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let m = EMISSIVE_MATRIX;
    let x = m[0][0] * r + m[0][1] * g + m[0][2] * b;
    let y = m[1][0] * r + m[1][1] * g + m[1][2] * b;
    let z = m[2][0] * r + m[2][1] * g + m[2][2] * b;
    (x, y, z)
}

/// Computes the 16-byte unlock response vector from the scrambled challenge
/// and a key, per the fixed byte-offset-and-add/subtract schedule in §4.1.
/// All arithmetic is explicitly wrapping (§9): two's-complement negation,
/// modular add/sub/mul on 32-bit words, and modular byte sums.
fn compute_unlock_response(sc: &[u8; 8], k0: u32, k1: u32) -> [u8; 16] {
    let ci0 = (u32::from(sc[3]) << 24) | (u32::from(sc[0]) << 16) | (u32::from(sc[4]) << 8) | u32::from(sc[6]);
    let ci1 = (u32::from(sc[1]) << 24) | (u32::from(sc[7]) << 16) | (u32::from(sc[2]) << 8) | u32::from(sc[5]);

    let n_k0 = (!Wrapping(k0)) + Wrapping(1u32);
    let n_k1 = (!Wrapping(k1)) + Wrapping(1u32);
    let ci0 = Wrapping(ci0);
    let ci1 = Wrapping(ci1);

    let co = [
        (n_k0 - ci1).0,
        (n_k1 - ci0).0,
        (ci1 * n_k0).0,
        (ci0 * n_k1).0,
    ];

    let byte_sum = |v: u32| -> u32 {
        (v & 0xFF) + ((v >> 8) & 0xFF) + ((v >> 16) & 0xFF) + ((v >> 24) & 0xFF)
    };

    let mut sum: u32 = sc.iter().map(|&b| u32::from(b)).sum();
    sum = sum.wrapping_add(byte_sum(n_k0.0)).wrapping_add(byte_sum(n_k1.0));
    let s0 = Wrapping((sum & 0xFF) as u8);
    let s1 = Wrapping(((sum >> 8) & 0xFF) as u8);

    let byte = |word: u32, shift: u32| -> Wrapping<u8> { Wrapping(((word >> shift) & 0xFF) as u8) };

    let mut sr = [Wrapping(0u8); 16];
    sr[0] = byte(co[0], 16) + s0;
    sr[1] = byte(co[2], 8) - s1;
    sr[2] = byte(co[3], 0) + s1;
    sr[3] = byte(co[1], 16) + s0;
    sr[4] = byte(co[2], 16) - s1;
    sr[5] = byte(co[3], 16) - s0;
    sr[6] = byte(co[1], 24) - s0;
    sr[7] = byte(co[0], 0) - s1;
    sr[8] = byte(co[3], 8) + s0;
    sr[9] = byte(co[2], 24) - s1;
    sr[10] = byte(co[0], 8) + s0;
    sr[11] = byte(co[1], 8) - s1;
    sr[12] = byte(co[1], 0) + s1;
    sr[13] = byte(co[3], 24) + s1;
    sr[14] = byte(co[2], 0) + s0;
    sr[15] = byte(co[0], 24) - s0;

    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = sr[i].0;
    }
    out
}

/// Converts a [`ColorResult`]'s chromaticity and luminance into the
/// [`GamutPoint`]/[`crate::gamma::build_gamma`] sample type used by the
/// off-line solvers, for callers assembling calibration artifacts from a
/// sequence of live measurements.
pub fn as_sample(result: &ColorResult) -> GamutPoint {
    GamutPoint::new(result.x, result.y, result.y_tristim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::mock::NoopClock;
    use crate::transport::mock::MockTransport;

    /// Boundary scenario 1 (§8): sc=[1..8], K=(0xe9622e9f, 0x8d63e133).
    #[test]
    fn unlock_response_matches_reference_vector() {
        let sc: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];
        let sr = compute_unlock_response(&sc, 0xe962_2e9f, 0x8d63_e133);
        assert_eq!(
            sr,
            [151, 7, 159, 157, 43, 169, 108, 87, 218, 170, 208, 21, 202, 133, 72, 18]
        );
    }

    #[test]
    fn init_sequence_requires_connected_state() {
        let transport = MockTransport::new();
        let mut driver = Driver::from_parts(transport, NoopClock::new());
        driver.close();
        assert!(matches!(driver.init_sequence(), Err(DriverError::NotInitialized)));
    }

    #[test]
    fn init_sequence_advances_to_initialized_on_eight_full_reads() {
        let mut transport = MockTransport::new();
        transport.queue_acks(8);
        let mut driver = Driver::from_parts(transport, NoopClock::new());

        driver.init_sequence().unwrap();
        assert_eq!(driver.state(), DeviceState::Initialized);
        assert_eq!(driver.clock.total_slept(), Duration::from_millis(150) * 8);
    }

    #[test]
    fn init_sequence_fails_on_short_read() {
        let mut transport = MockTransport::new();
        transport.queue_acks(1);
        // Second read never queued: recv() returns an error on an empty queue,
        // exercising the "read must succeed, returning 64 bytes" contract.
        let mut driver = Driver::from_parts(transport, NoopClock::new());

        assert!(driver.init_sequence().is_err());
        assert_eq!(driver.state(), DeviceState::Connected);
    }

    #[test]
    fn measure_requires_unlocked_state() {
        let transport = MockTransport::new();
        let mut driver = Driver::from_parts(transport, NoopClock::new());
        assert!(matches!(driver.measure(), Err(DriverError::NotInitialized)));
    }

    fn force_unlocked<T: Transport, C: Clock>(driver: &mut Driver<T, C>) {
        driver.state = DeviceState::Unlocked;
    }

    #[test]
    fn measure_parses_le_counters_and_never_changes_state() {
        let mut transport = MockTransport::new();
        let mut response = [0u8; PACKET_SIZE];
        response[1] = 0x04;
        // rCnt=3 at offset 2, rClk=48_000_000 at offset 14 -> hz = (3-1)*0.25/1 = 0.5
        response[2..6].copy_from_slice(&3u32.to_le_bytes());
        response[14..18].copy_from_slice(&48_000_000u32.to_le_bytes());
        transport.queue_recv(response);

        let mut driver = Driver::from_parts(transport, NoopClock::new());
        force_unlocked(&mut driver);

        let result = driver.measure().unwrap();
        assert_eq!(driver.state(), DeviceState::Unlocked);
        // R channel feeds into X via EMISSIVE_MATRIX[0][0] with G=B=0.
        let expected_x = EMISSIVE_MATRIX[0][0] * 0.5;
        assert!((result.x_tristim - expected_x).abs() < 1e-12);
    }

    #[test]
    fn measure_rejects_wrong_opcode() {
        let mut transport = MockTransport::new();
        let mut response = [0u8; PACKET_SIZE];
        response[1] = 0xFF;
        transport.queue_recv(response);

        let mut driver = Driver::from_parts(transport, NoopClock::new());
        force_unlocked(&mut driver);

        assert!(matches!(driver.measure(), Err(DriverError::InvalidResponse(_))));
    }

    #[test]
    fn hz_is_zero_for_count_at_or_below_one() {
        assert_eq!(hz(0, 48_000_000), 0.0);
        assert_eq!(hz(1, 48_000_000), 0.0);
    }
}
