//! Minimal end-to-end demonstration: open the device, unlock it, take one
//! measurement, and exit with the numeric code from §6/§7 on failure.
//!
//! This intentionally does not replicate an interactive debug menu — that
//! surface is out of scope here (§1). It is a thin wiring example for
//! library consumers, not a full CLI.

use std::process::ExitCode;

use i1d3_cal::{Driver, DriverConfig, DriverError};

fn main() -> ExitCode {
    env_logger::init();

    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: i1d3-cal <device-path>");
            return ExitCode::FAILURE;
        }
    };

    match run(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::from(err.code().unsigned_abs() as u8)
        }
    }
}

fn run(path: &str) -> Result<(), DriverError> {
    let mut driver = Driver::open(path, DriverConfig::default())?;
    driver.init_sequence()?;
    driver.auto_unlock()?;

    let result = driver.measure()?;
    println!(
        "xy=({:.4},{:.4}) CCT={:.0}K Lab=({:.2},{:.2},{:.2})",
        result.x, result.y, result.cct, result.l, result.a, result.b
    );

    driver.close();
    Ok(())
}
