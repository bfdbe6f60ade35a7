// Content hashing used as the upload dedup key. The service indexes results
// by SHA1, so that is the digest computed here.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::error::ClientError;

/// Read size for streaming digests.
const CHUNK_SIZE: usize = 1024;

/// Hex SHA1 of everything readable from `reader`, consumed in fixed chunks.
pub fn sha1_hex<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha1::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex SHA1 of a local file.
pub fn file_sha1(path: &Path) -> Result<String, ClientError> {
    let file = File::open(path).map_err(|e| ClientError::io(path, e))?;
    sha1_hex(file).map_err(|e| ClientError::io(path, e))
}
