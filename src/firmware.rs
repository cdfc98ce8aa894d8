//! Firmware image validation.
//!
//! The flashing tool reads the image itself; this only checks that the path
//! is a plausible Intel HEX file and records its checksum for the logs.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::FIRMWARE_EXTENSION;
use crate::error::{ModuleError, ModuleResult};

/// A validated firmware image on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    path: PathBuf,
    sha256: String,
}

impl FirmwareImage {
    /// Validate `path` and checksum it. No device is touched.
    pub fn open<P: AsRef<Path>>(path: P) -> ModuleResult<Self> {
        let path = path.as_ref();
        let invalid = |reason: &str| ModuleError::InvalidFirmware {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };

        if !path.is_file() {
            return Err(invalid("file does not exist"));
        }

        let is_hex = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(FIRMWARE_EXTENSION))
            .unwrap_or(false);
        if !is_hex {
            return Err(invalid("expected an Intel HEX (.hex) image"));
        }

        let sha256 = calculate_sha256(path)?;
        info!("Firmware image {} (sha256 {})", path.display(), sha256);

        Ok(Self {
            path: path.to_path_buf(),
            sha256,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}

/// Calculate SHA256 hash of a file
pub fn calculate_sha256(file_path: &Path) -> ModuleResult<String> {
    let mut file = fs::File::open(file_path)?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::temp::TestContext;

    #[test]
    fn test_open_valid_image() {
        let ctx = TestContext::new();
        let path = ctx.create_firmware("magdeck-v1.1.0.hex");

        let image = FirmwareImage::open(&path).unwrap();
        assert_eq!(image.path(), path.as_path());
        assert_eq!(image.sha256().len(), 64);
        assert!(image.sha256().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_open_missing_image() {
        let ctx = TestContext::new();
        let err = FirmwareImage::open(ctx.path("firmware/none.hex")).unwrap_err();
        assert!(matches!(err, ModuleError::InvalidFirmware { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_open_rejects_wrong_extension() {
        let ctx = TestContext::new();
        let path = ctx.create_file("firmware/magdeck.bin", "binary");
        let err = FirmwareImage::open(&path).unwrap_err();
        assert!(err.to_string().contains("Intel HEX"));
    }

    #[test]
    fn test_open_rejects_directory() {
        let ctx = TestContext::new();
        let dir = ctx.create_dir("firmware/image.hex");
        assert!(FirmwareImage::open(dir).is_err());
    }

    #[test]
    fn test_sha256_known_value() {
        let ctx = TestContext::new();
        let path = ctx.create_file("abc.hex", "abc");
        assert_eq!(
            calculate_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_large_file() {
        let ctx = TestContext::new();
        let content: String = (0..16384).map(|i| ((i % 26) as u8 + b'a') as char).collect();
        let path = ctx.create_file("large.hex", &content);

        let hash = calculate_sha256(&path).unwrap();
        assert_eq!(hash.len(), 64);
    }
}
