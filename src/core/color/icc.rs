use std::fs::File;
use std::os::unix::fs::FileExt;

use super::color_state::{ColorState, ColorStateKind, IccProfile};
use super::image_description::{FailureCause, ImageDescription};
use crate::core::errors::{ProtocolError, ProtocolResult};

/// Largest ICC profile accepted from a client.
pub const MAX_ICC_SIZE: u32 = 32 * 1024 * 1024;

const ICC_HEADER_SIZE: usize = 128;
const ICC_SIGNATURE_OFFSET: usize = 36;

#[derive(Debug)]
enum IccSource {
    File { file: File, offset: u32, length: u32 },
    /// The file could not be inspected; reported when the description is
    /// created.
    Unreadable(String),
}

/// ICC image description creator.
#[derive(Debug, Default)]
pub struct IccCreator {
    source: Option<IccSource>,
}

impl IccCreator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_icc_file(&mut self, file: File, offset: u32, length: u32) -> ProtocolResult<()> {
        if self.source.is_some() {
            return Err(ProtocolError::AlreadySet("ICC file"));
        }
        if length == 0 || length > MAX_ICC_SIZE {
            return Err(ProtocolError::IccBadSize(length));
        }

        match file.metadata() {
            Ok(metadata) => {
                if !metadata.is_file() {
                    return Err(ProtocolError::IccBadFd("not a regular file".to_string()));
                }
                if offset as u64 + length as u64 > metadata.len() {
                    return Err(ProtocolError::IccOutOfFile { offset, length });
                }
                self.source = Some(IccSource::File { file, offset, length });
            }
            Err(err) => {
                tracing::debug!("fstat on ICC file failed: {}", err);
                self.source = Some(IccSource::Unreadable(err.to_string()));
            }
        }
        Ok(())
    }

    /// Read the profile. I/O problems produce a failed description rather
    /// than a protocol error.
    pub fn create(self) -> ProtocolResult<ImageDescription> {
        let Some(source) = self.source else {
            return Err(ProtocolError::IncompleteSet("no ICC file was set"));
        };

        let (file, offset, length) = match source {
            IccSource::File { file, offset, length } => (file, offset, length),
            IccSource::Unreadable(message) => {
                return Ok(ImageDescription::failed(FailureCause::OperatingSystem, message));
            }
        };

        let mut data = vec![0u8; length as usize];
        if let Err(err) = file.read_exact_at(&mut data, offset as u64) {
            return Ok(ImageDescription::failed(
                FailureCause::OperatingSystem,
                format!("failed to read ICC data: {}", err),
            ));
        }

        if !has_icc_signature(&data) {
            return Ok(ImageDescription::failed(
                FailureCause::Unsupported,
                "data is not an ICC profile",
            ));
        }

        let color_state = ColorState::new(ColorStateKind::Icc(IccProfile::new(data)));
        Ok(ImageDescription::ready(color_state, false))
    }
}

fn has_icc_signature(data: &[u8]) -> bool {
    data.len() >= ICC_HEADER_SIZE
        && &data[ICC_SIGNATURE_OFFSET..ICC_SIGNATURE_OFFSET + 4] == b"acsp"
}
