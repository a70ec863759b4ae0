//! zlib framing of chunk payloads.

use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

/// Compresses a payload at `level` (0-9).
pub(crate) fn compress(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(level));
    encoder.write_all(data)?;
    encoder.finish()
}

/// Inflates a payload produced by [`compress`].
pub(crate) fn decompress(payload: &[u8], size_hint: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(size_hint);
    ZlibDecoder::new(payload).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        let data = b"Content-Type: text/plain\r\n\r\n".repeat(64);
        for level in [0, 1, 6, 9] {
            let packed = compress(&data, level).unwrap();
            assert_eq!(decompress(&packed, data.len()).unwrap(), data);
        }
        assert!(compress(&data, 9).unwrap().len() < data.len());
    }

    #[test]
    fn test_corrupt_payload() {
        assert!(decompress(b"not zlib", 0).is_err());
    }
}
