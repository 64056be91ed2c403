//! Driver and closed-loop calibrator for an i1Display3-class colorimeter.
//!
//! This crate has two halves, joined by one trait boundary and one data type:
//!
//! - [`driver`] owns the device connection and speaks the HID protocol: the
//!   init handshake, the cryptographic unlock, and frequency-count
//!   measurement, converted into [`colorimetry::ColorResult`] via
//!   [`colorimetry`]. It talks to hardware through the [`transport::Transport`]
//!   trait, so it can be driven against [`transport::mock::MockTransport`] in
//!   tests without a real device.
//! - [`calibrator`] runs a predictive-control loop that queries the driver and
//!   commands a display's RGB gain registers (through the [`calibrator::TvSink`]
//!   trait) toward a target chromaticity.
//!
//! [`gamut`] and [`gamma`] are the two off-line transforms used alongside the
//! live control loop: a 3x3 gamut correction matrix solved from four
//! chromaticity measurements, and a 256-entry gamma table built from 11
//! luminance samples.
//!
//! [`clock`] abstracts the handful of fixed suspension points in the
//! protocol and control-loop timing, for the same testability reason as
//! `Transport`. [`error`] is the unified error type every fallible operation
//! in this crate returns.

pub mod calibrator;
pub mod clock;
pub mod colorimetry;
pub mod driver;
pub mod error;
pub mod gamma;
pub mod gamut;
pub mod keys;
pub mod transport;

pub use calibrator::{CalibratorConfig, CalibratorState, GainTriple, TvSink};
pub use colorimetry::ColorResult;
pub use driver::{DeviceState, Driver, DriverConfig};
pub use error::{DriverError, Result};
pub use transport::{FileTransport, Transport};
