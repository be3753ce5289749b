//! Streamed content hashing of store and index files.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::WikidResult;

/// Bytes read per block while hashing.
pub const HASH_BLOCK_SIZE: usize = 1 << 20;

/// MD5 hex digest of a file, read in blocks of [`HASH_BLOCK_SIZE`].
pub fn hash_file(path: impl AsRef<Path>) -> WikidResult<String> {
    hash_file_with_block_size(path, HASH_BLOCK_SIZE)
}

/// MD5 hex digest of a file, read in blocks of `block_size` bytes.
pub fn hash_file_with_block_size(path: impl AsRef<Path>, block_size: usize) -> WikidResult<String> {
    let mut file = File::open(path.as_ref())?;
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; block_size.max(1)];

    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        context.consume(&buf[..read]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// Like [`hash_file`], but `None` when the file does not exist.
pub fn hash_file_if_exists(path: impl AsRef<Path>) -> WikidResult<Option<String>> {
    if path.as_ref().exists() {
        hash_file(path).map(Some)
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_independent_of_block_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let whole = hash_file(&path).unwrap();
        let small_blocks = hash_file_with_block_size(&path, 7).unwrap();
        assert_eq!(whole, small_blocks);
        assert_eq!(whole, format!("{:x}", md5::compute(&data)));
    }

    #[test]
    fn test_hash_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, b"first").unwrap();
        let before = hash_file(&path).unwrap();
        std::fs::write(&path, b"second").unwrap();
        assert_ne!(before, hash_file(&path).unwrap());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        assert!(hash_file_if_exists(&path).unwrap().is_none());
        assert!(hash_file(&path).is_err());
    }
}
