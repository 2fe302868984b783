// Byte order helpers for page headers and the tonie header prefix

use std::io::{Read, Seek, SeekFrom};

pub fn read_u8<R: Read>(reader: &mut R) -> std::io::Result<u8> {
    let mut buffer = [0u8; 1];
    reader.read_exact(&mut buffer)?;
    Ok(buffer[0])
}

/// Read big-endian 32-bit integer
pub fn read_be_u32<R: Read>(reader: &mut R) -> std::io::Result<u32> {
    let mut buffer = [0u8; 4];
    reader.read_exact(&mut buffer)?;
    Ok(u32::from_be_bytes(buffer))
}

/// Read little-endian 32-bit integer
pub fn read_le_u32<R: Read>(reader: &mut R) -> std::io::Result<u32> {
    let mut buffer = [0u8; 4];
    reader.read_exact(&mut buffer)?;
    Ok(u32::from_le_bytes(buffer))
}

/// Read little-endian 64-bit integer
pub fn read_le_u64<R: Read>(reader: &mut R) -> std::io::Result<u64> {
    let mut buffer = [0u8; 8];
    reader.read_exact(&mut buffer)?;
    Ok(u64::from_le_bytes(buffer))
}

/// Check if the stream has `signature` at the current position without consuming it.
/// A stream shorter than the signature does not match.
pub fn check_signature<R: Read + Seek>(reader: &mut R, signature: &[u8]) -> std::io::Result<bool> {
    let pos = reader.stream_position()?;
    let mut buffer = vec![0u8; signature.len()];
    let matched = match reader.read_exact(&mut buffer) {
        Ok(()) => buffer == signature,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => false,
        Err(e) => return Err(e),
    };
    reader.seek(SeekFrom::Start(pos))?;
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_byte_orders() {
        let mut cursor = Cursor::new(vec![0x00, 0x00, 0x0F, 0xFC, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(read_be_u32(&mut cursor).unwrap(), 0xFFC);
        assert_eq!(read_le_u32(&mut cursor).unwrap(), 1);
        assert!(read_u8(&mut cursor).is_err());
    }

    #[test]
    fn test_check_signature_keeps_position() {
        let mut cursor = Cursor::new(b"OggS\0rest".to_vec());
        assert!(check_signature(&mut cursor, b"OggS").unwrap());
        assert_eq!(cursor.position(), 0);
        assert!(!check_signature(&mut cursor, b"OggSxxxxxxxxxxxx").unwrap());
        assert_eq!(cursor.position(), 0);
    }
}
