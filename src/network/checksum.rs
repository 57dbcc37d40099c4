use std::{fmt, fs::File, io, path::Path};

use sha1::{Digest, Sha1};

use crate::{network::CHECKSUM_SIZE, Result};

/// SHA-1 of the artifact a session annotates.
///
/// Server and clients compare checksums at login so that nobody applies names meant for another
/// build of the program.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ArtifactChecksum([u8; CHECKSUM_SIZE]);

impl ArtifactChecksum {
    /// Wraps raw checksum bytes.
    #[must_use]
    pub fn new(bytes: [u8; CHECKSUM_SIZE]) -> Self {
        ArtifactChecksum(bytes)
    }

    /// Hashes an in-memory artifact.
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self::from_digest(&hasher.finalize())
    }

    /// Hashes an artifact on disk without loading it into memory.
    ///
    /// # Errors
    /// Returns [`crate::Error::TransportFault`] if the file cannot be read.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut hasher = Sha1::new();
        io::copy(&mut file, &mut hasher)?;
        Ok(Self::from_digest(&hasher.finalize()))
    }

    fn from_digest(digest: &[u8]) -> Self {
        let mut bytes = [0u8; CHECKSUM_SIZE];
        bytes.copy_from_slice(digest);
        ArtifactChecksum(bytes)
    }

    /// The raw checksum bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; CHECKSUM_SIZE] {
        &self.0
    }
}

impl fmt::Display for ArtifactChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ArtifactChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArtifactChecksum({self})")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_known_digest() {
        let checksum = ArtifactChecksum::from_bytes(b"abc");
        assert_eq!(checksum.to_string(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_from_file_matches_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not really a jar").unwrap();
        file.flush().unwrap();

        let from_file = ArtifactChecksum::from_file(file.path()).unwrap();
        assert_eq!(from_file, ArtifactChecksum::from_bytes(b"not really a jar"));
    }

    #[test]
    fn test_missing_file() {
        assert!(ArtifactChecksum::from_file(Path::new("/definitely/not/here.jar")).is_err());
    }
}
