//! Closed-loop predictive-control calibrator (§4.4).

use std::time::Duration;

use crate::clock::Clock;
use crate::colorimetry::ColorResult;
use crate::driver::Driver;
use crate::error::Result;
use crate::transport::Transport;

const SENSITIVITY_PROBE_DELTA: i32 = 15;
const SENSITIVITY_SETTLE: Duration = Duration::from_millis(100);
const STEP_SETTLE: Duration = Duration::from_millis(100);
const MIN_SENSITIVITY: f64 = 1e-7;
const DEFAULT_RED_SENSITIVITY: f64 = 6e-4;
const DEFAULT_GREEN_SENSITIVITY: f64 = 5e-4;
const HIGH_ERROR_THRESHOLD: f64 = 0.005;
const BLUE_NUDGE_THRESHOLD: f64 = 0.01;
const BLUE_NUDGE_GAIN: f64 = 40.0;
const GAIN_MIN: i32 = 0;
const GAIN_MAX: i32 = 192;
const DEFAULT_STEPS: u32 = 20;

/// A per-channel gain triple, each channel clamped to `[0, 192]` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GainTriple {
    pub r: i32,
    pub g: i32,
    pub b: i32,
}

impl GainTriple {
    pub fn new(r: i32, g: i32, b: i32) -> Self {
        GainTriple {
            r: r.clamp(GAIN_MIN, GAIN_MAX),
            g: g.clamp(GAIN_MIN, GAIN_MAX),
            b: b.clamp(GAIN_MIN, GAIN_MAX),
        }
    }
}

/// A display's "set RGB gain" sink (§6): an external collaborator, opaque
/// to this crate beyond the single operation it exposes.
pub trait TvSink {
    /// Applies a gain triple to the panel. No response expected.
    fn set_gain(&mut self, gain: GainTriple);
}

/// Session parameters (§2c, §4.4 "Session").
#[derive(Debug, Clone, Copy)]
pub struct CalibratorConfig {
    /// Number of calibration steps to run after the sensitivity probe.
    /// Default: 20, matching the reference implementation. There is no
    /// early-exit-on-convergence option (§9): this is a budget, not a
    /// threshold.
    pub steps: u32,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        CalibratorConfig { steps: DEFAULT_STEPS }
    }
}

/// The calibrator's mutable state across a session (§3).
#[derive(Debug, Clone, Copy)]
pub struct CalibratorState {
    pub target_x: f64,
    pub target_y: f64,
    pub gain: GainTriple,
    pub best_gain: GainTriple,
    pub min_distance: f64,
    red_sensitivity: f64,
    green_sensitivity: f64,
}

impl CalibratorState {
    /// Constructs a fresh state for a target chromaticity and starting gain.
    pub fn new(target_x: f64, target_y: f64, initial_gain: GainTriple) -> Self {
        CalibratorState {
            target_x,
            target_y,
            gain: initial_gain,
            best_gain: initial_gain,
            min_distance: f64::INFINITY,
            red_sensitivity: 0.0,
            green_sensitivity: 0.0,
        }
    }

    pub fn red_sensitivity(&self) -> f64 {
        self.red_sensitivity
    }

    pub fn green_sensitivity(&self) -> f64 {
        self.green_sensitivity
    }
}

fn xy_distance(state: &CalibratorState, measured: &ColorResult) -> (f64, f64, f64) {
    let dx = state.target_x - measured.x;
    let dy = state.target_y - measured.y;
    (dx, dy, (dx * dx + dy * dy).sqrt())
}

/// Establishes per-channel gain-to-chromaticity sensitivities by perturbing
/// red and green gain in turn and measuring the response (§4.4).
pub fn check_sensitivity<T: Transport, C: Clock>(
    state: &mut CalibratorState,
    driver: &mut Driver<T, C>,
    sink: &mut impl TvSink,
    clock: &C,
) -> Result<()> {
    sink.set_gain(state.gain);
    let baseline = driver.measure()?;

    let red_probe = GainTriple::new(state.gain.r - SENSITIVITY_PROBE_DELTA, state.gain.g, state.gain.b);
    sink.set_gain(red_probe);
    let red_test = driver.measure()?;
    let red_sensitivity = (red_test.x - baseline.x).abs() / SENSITIVITY_PROBE_DELTA as f64;

    let green_probe = GainTriple::new(state.gain.r, state.gain.g - SENSITIVITY_PROBE_DELTA, state.gain.b);
    sink.set_gain(green_probe);
    let green_test = driver.measure()?;
    let green_sensitivity = (green_test.y - baseline.y).abs() / SENSITIVITY_PROBE_DELTA as f64;

    sink.set_gain(state.gain);
    clock.sleep(SENSITIVITY_SETTLE);

    if red_sensitivity < MIN_SENSITIVITY || green_sensitivity < MIN_SENSITIVITY {
        log::warn!(
            "sensitivity too low (rs={red_sensitivity}, gs={green_sensitivity}); substituting defaults"
        );
        state.red_sensitivity = DEFAULT_RED_SENSITIVITY;
        state.green_sensitivity = DEFAULT_GREEN_SENSITIVITY;
    } else {
        state.red_sensitivity = red_sensitivity;
        state.green_sensitivity = green_sensitivity;
    }

    Ok(())
}

/// Runs one step of the control loop: measure, update the best-seen gain,
/// compute and apply a gain adjustment (§4.4).
pub fn step<T: Transport, C: Clock>(
    state: &mut CalibratorState,
    driver: &mut Driver<T, C>,
    sink: &mut impl TvSink,
    clock: &C,
    step_no: u32,
) -> Result<()> {
    sink.set_gain(state.gain);
    let measured = driver.measure()?;

    let (dx, dy, distance) = xy_distance(state, &measured);
    if distance < state.min_distance {
        state.min_distance = distance;
        state.best_gain = state.gain;
    }

    let alpha = if distance > HIGH_ERROR_THRESHOLD { 0.8 } else { 0.4 };
    let delta_r = alpha * dx / state.red_sensitivity.max(MIN_SENSITIVITY);
    let delta_g = alpha * dy / state.green_sensitivity.max(MIN_SENSITIVITY);

    let mut gain = state.gain;
    gain.r = (gain.r + delta_r.round() as i32).clamp(GAIN_MIN, GAIN_MAX);
    gain.g = (gain.g + delta_g.round() as i32).clamp(GAIN_MIN, GAIN_MAX);

    if distance > BLUE_NUDGE_THRESHOLD {
        let blue_nudge = ((dx + dy) * BLUE_NUDGE_GAIN).round() as i32;
        gain.b = (gain.b + blue_nudge).clamp(GAIN_MIN, GAIN_MAX);
    }
    state.gain = gain;

    log::info!(
        "step {step_no}: measured ({:.4},{:.4}) distance={distance:.6} gain={gain:?}",
        measured.x, measured.y
    );

    sink.set_gain(state.gain);
    clock.sleep(STEP_SETTLE);
    Ok(())
}

/// Runs a full session: one sensitivity probe followed by `config.steps`
/// calibration steps, then applies the best-seen gain (§4.4 "Session").
pub fn run_session<T: Transport, C: Clock>(
    state: &mut CalibratorState,
    driver: &mut Driver<T, C>,
    sink: &mut impl TvSink,
    clock: &C,
    config: CalibratorConfig,
) -> Result<()> {
    check_sensitivity(state, driver, sink, clock)?;
    for step_no in 1..=config.steps {
        step(state, driver, sink, clock, step_no).map_err(|err| {
            log::error!("calibration step {step_no} failed: {err}");
            err
        })?;
    }
    sink.set_gain(state.best_gain);
    state.gain = state.best_gain;
    Ok(())
}
