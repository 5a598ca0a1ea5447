//! Compiled model loading.
//!
//! A model file is the 4096-byte descriptor header followed immediately by
//! the payload blob whose size the header declares. Short reads are hard
//! errors: a truncated model must never reach the device.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use bytes::Bytes;

use crate::descriptor::{Descriptor, HEADER_SIZE};
use crate::error::Result;

/// A loaded model: validated descriptor plus immutable payload blob.
#[derive(Debug, Clone)]
pub struct Model {
    descriptor: Descriptor,
    payload: Bytes,
}

impl Model {
    /// Load a model from a file.
    ///
    /// # Errors
    ///
    /// [`crate::AneError::Io`] on open failure or a short read of either
    /// the header or the payload; [`crate::AneError::Descriptor`] if the
    /// header fails validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("loading model from {}", path.display());

        let mut file = File::open(path)?;

        let mut header = vec![0u8; HEADER_SIZE];
        file.read_exact(&mut header)?;
        let descriptor = Descriptor::parse(&header)?;

        let payload_size = usize::try_from(descriptor.payload_size())
            .expect("payload size validated against MAX_PAYLOAD");
        let mut payload = vec![0u8; payload_size];
        file.read_exact(&mut payload)?;

        tracing::debug!(
            "model: payload {:#x} bytes, {} src / {} dst channel(s)",
            descriptor.payload_size(),
            descriptor.src_count(),
            descriptor.dst_count()
        );

        Ok(Self {
            descriptor,
            payload: Bytes::from(payload),
        })
    }

    /// Parse a model already resident in memory.
    ///
    /// # Errors
    ///
    /// As [`Self::load`], with a short buffer reported as an I/O error.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let descriptor = Descriptor::parse(data)?;

        let payload_size = usize::try_from(descriptor.payload_size())
            .expect("payload size validated against MAX_PAYLOAD");
        let end = HEADER_SIZE + payload_size;
        if data.len() < end {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("payload truncated: {} of {payload_size} bytes", data.len() - HEADER_SIZE),
            )
            .into());
        }

        Ok(Self {
            descriptor,
            payload: Bytes::copy_from_slice(&data[HEADER_SIZE..end]),
        })
    }

    /// The validated descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// The payload blob. `Bytes` clones are cheap reference bumps.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::tests::scenario_header;
    use std::io::Write;

    fn scenario_file(payload_len: usize) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("temp file");
        f.write_all(&scenario_header()).unwrap();
        f.write_all(&vec![0xabu8; payload_len]).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn loads_header_and_payload() {
        let f = scenario_file(0x8000);
        let model = Model::load(f.path()).unwrap();
        assert_eq!(model.payload().len(), 0x8000);
        assert_eq!(model.descriptor().src_count(), 1);
        assert!(model.payload().iter().all(|&b| b == 0xab));
    }

    #[test]
    fn short_payload_is_an_io_error() {
        let f = scenario_file(0x100);
        assert!(matches!(
            Model::load(f.path()),
            Err(crate::AneError::Io { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            Model::load("/nonexistent/net.anec"),
            Err(crate::AneError::Io { .. })
        ));
    }

    #[test]
    fn from_bytes_round_trips() {
        let mut data = scenario_header();
        data.extend_from_slice(&vec![7u8; 0x8000]);
        let model = Model::from_bytes(&data).unwrap();
        assert_eq!(model.payload().len(), 0x8000);

        data.truncate(HEADER_SIZE + 16);
        assert!(Model::from_bytes(&data).is_err());
    }
}
