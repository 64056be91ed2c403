//! Hardware abstraction layer for i1Display3 communication.
//!
//! This module defines the [`Transport`] trait, which abstracts the
//! underlying 64-byte packet channel (§6) from the device driver, and the
//! one production implementation, which treats the device node as a raw
//! byte-stream file (as the reference driver does for its `/dev/hidraw*`
//! path) rather than performing USB enumeration: the channel is opaque, and
//! a plain file handle is the most direct honest model of it.

use crate::error::{DriverError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::time::Duration;

/// Every request and response on this channel is exactly this many bytes (§6).
pub const PACKET_SIZE: usize = 64;

/// A trait abstracting the opaque bidirectional 64-byte packet channel.
///
/// Implementors handle the raw I/O; the driver layer ([`crate::driver`]) is
/// transport-agnostic and only ever sends and receives whole packets.
pub trait Transport {
    /// Sends a single 64-byte packet.
    fn send(&mut self, packet: &[u8; PACKET_SIZE]) -> Result<()>;

    /// Reads a single 64-byte packet. `timeout` is advisory: this trait does
    /// not mandate a particular timeout mechanism, only that a short read
    /// surface as [`DriverError::InvalidResponse`] rather than blocking
    /// forever or panicking.
    fn recv(&mut self, timeout: Duration) -> Result<[u8; PACKET_SIZE]>;

    /// A human-readable name for this transport (for logging).
    fn name(&self) -> &str;
}

// ============================================================================
// File-backed transport implementation
// ============================================================================

/// Speaks the 64-byte packet protocol over a raw device node, the same way
/// the reference implementation does over `/dev/hidraw0`.
pub struct FileTransport {
    file: File,
    path: String,
}

impl FileTransport {
    /// Opens `path` for reading and writing. Does not perform any
    /// permission escalation; callers needing that should go through
    /// [`crate::driver::Driver::open`], which applies it per
    /// [`crate::driver::DriverConfig`] before calling this.
    pub fn open(path: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => DriverError::DeviceNotFound,
                std::io::ErrorKind::PermissionDenied => DriverError::PermissionDenied,
                _ => DriverError::OpenFailed(err.to_string()),
            })?;
        Ok(FileTransport {
            file,
            path: path.to_string(),
        })
    }
}

impl Transport for FileTransport {
    fn send(&mut self, packet: &[u8; PACKET_SIZE]) -> Result<()> {
        log::trace!("-> {} bytes to {}", PACKET_SIZE, self.path);
        self.file.write_all(packet).map_err(DriverError::Transport)
    }

    fn recv(&mut self, _timeout: Duration) -> Result<[u8; PACKET_SIZE]> {
        let mut buf = [0u8; PACKET_SIZE];
        let read = self.file.read(&mut buf).map_err(DriverError::Transport)?;
        if read < PACKET_SIZE {
            return Err(DriverError::InvalidResponse(format!(
                "short read: {read} of {PACKET_SIZE} bytes"
            )));
        }
        log::trace!("<- {} bytes from {}", PACKET_SIZE, self.path);
        Ok(buf)
    }

    fn name(&self) -> &str {
        &self.path
    }
}

/// Relaxes permissions on a device node so an unprivileged process can open
/// it, mirroring the reference driver's `chmod` escalation (§6, §9).
///
/// Gated by [`crate::driver::DriverConfig::escalate_permissions`]; a failure
/// here is logged and otherwise ignored, since the subsequent device open is
/// the real authority on whether access succeeded.
pub fn escalate_permissions(path: &str) {
    log::warn!("attempting permission escalation on {path}");
    let status = std::process::Command::new("sudo")
        .args(["chmod", "666", path])
        .status();
    match status {
        Ok(status) if status.success() => log::debug!("permission escalation on {path} succeeded"),
        Ok(status) => log::warn!("permission escalation on {path} exited with {status}"),
        Err(err) => log::warn!("permission escalation on {path} failed to run: {err}"),
    }
}

// ============================================================================
// Mock Transport for Testing
// ============================================================================

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;

    /// A mock transport for unit testing driver logic without real hardware.
    ///
    /// Pre-program responses with [`MockTransport::queue_recv`]; sent packets
    /// are recorded in `sent` for assertions.
    #[derive(Default)]
    pub struct MockTransport {
        pub recv_responses: VecDeque<[u8; PACKET_SIZE]>,
        pub sent: Vec<[u8; PACKET_SIZE]>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response to be returned by the next `recv` call.
        pub fn queue_recv(&mut self, packet: [u8; PACKET_SIZE]) {
            self.recv_responses.push_back(packet);
        }

        /// Queue `count` identical full-size-read acknowledgements, useful
        /// for the init handshake where response contents are discarded.
        pub fn queue_acks(&mut self, count: usize) {
            for _ in 0..count {
                self.queue_recv([0u8; PACKET_SIZE]);
            }
        }
    }

    impl Transport for MockTransport {
        fn send(&mut self, packet: &[u8; PACKET_SIZE]) -> Result<()> {
            self.sent.push(*packet);
            Ok(())
        }

        fn recv(&mut self, _timeout: Duration) -> Result<[u8; PACKET_SIZE]> {
            self.recv_responses
                .pop_front()
                .ok_or_else(|| DriverError::InvalidResponse("mock queue exhausted".into()))
        }

        fn name(&self) -> &str {
            "Mock"
        }
    }
}
