pub mod tar;

pub use self::tar::ArchiveHandle;

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Compression wrapped around a tar stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
}

impl Compression {
    /// Detect compression from the leading bytes of a file.
    ///
    /// Keys are not trusted: an object named `.tar` may well be gzipped.
    pub fn sniff(header: &[u8]) -> Self {
        if header.starts_with(&[0x1f, 0x8b]) {
            Compression::Gzip
        } else if header.starts_with(b"BZh") {
            Compression::Bzip2
        } else {
            Compression::None
        }
    }

    pub fn sniff_file(path: &Path) -> std::io::Result<Self> {
        let mut header = [0u8; 3];
        let mut file = File::open(path)?;
        let mut filled = 0;
        while filled < header.len() {
            let n = file.read(&mut header[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(Self::sniff(&header[..filled]))
    }
}
