// Binary serialization helpers

use crate::error::{Error, Result};
use std::io::{self, Read};

/// Types with a canonical binary encoding
pub trait Serializable {
    fn serialize(&self) -> Vec<u8>;
    fn deserialize(data: &[u8]) -> Result<Self>
    where
        Self: Sized;
}

/// Map a failed read to a corruption error
pub fn corrupt(err: io::Error) -> Error {
    Error::Serialization(err.to_string())
}

/// Write a variable-length integer (VarInt)
pub fn write_varint(buf: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => buf.push(value as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x10000..=0xffffffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Read a variable-length integer (VarInt)
pub fn read_varint<R: Read + ?Sized>(reader: &mut R) -> Result<u64> {
    let mut first_byte = [0u8; 1];
    reader.read_exact(&mut first_byte).map_err(corrupt)?;

    match first_byte[0] {
        0..=0xfc => Ok(first_byte[0] as u64),
        0xfd => {
            let mut bytes = [0u8; 2];
            reader.read_exact(&mut bytes).map_err(corrupt)?;
            Ok(u16::from_le_bytes(bytes) as u64)
        }
        0xfe => {
            let mut bytes = [0u8; 4];
            reader.read_exact(&mut bytes).map_err(corrupt)?;
            Ok(u32::from_le_bytes(bytes) as u64)
        }
        0xff => {
            let mut bytes = [0u8; 8];
            reader.read_exact(&mut bytes).map_err(corrupt)?;
            Ok(u64::from_le_bytes(bytes))
        }
    }
}

/// Write bytes with length prefix (VarInt length + data)
pub fn write_var_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    write_varint(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

/// Read bytes with length prefix
pub fn read_var_bytes<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>> {
    let len = read_varint(reader)? as usize;
    let mut data = Vec::new();
    reader
        .take(len as u64)
        .read_to_end(&mut data)
        .map_err(corrupt)?;
    if data.len() != len {
        return Err(Error::Serialization(format!(
            "expected {} bytes, got {}",
            len,
            data.len()
        )));
    }
    Ok(data)
}

/// Write a length-prefixed UTF-8 string
pub fn write_string(buf: &mut Vec<u8>, value: &str) {
    write_var_bytes(buf, value.as_bytes());
}

/// Read a length-prefixed UTF-8 string
pub fn read_string<R: Read + ?Sized>(reader: &mut R) -> Result<String> {
    let bytes = read_var_bytes(reader)?;
    String::from_utf8(bytes).map_err(|e| Error::Serialization(e.to_string()))
}

pub fn read_u32<R: Read + ?Sized>(reader: &mut R) -> Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes).map_err(corrupt)?;
    Ok(u32::from_le_bytes(bytes))
}

pub fn read_u64<R: Read + ?Sized>(reader: &mut R) -> Result<u64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes).map_err(corrupt)?;
    Ok(u64::from_le_bytes(bytes))
}

pub fn read_i64<R: Read + ?Sized>(reader: &mut R) -> Result<i64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes).map_err(corrupt)?;
    Ok(i64::from_le_bytes(bytes))
}

pub fn read_hash<R: Read + ?Sized>(reader: &mut R) -> Result<crate::core::Hash256> {
    let mut bytes = [0u8; 32];
    reader.read_exact(&mut bytes).map_err(corrupt)?;
    Ok(crate::core::Hash256::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_varint_widths() {
        for (value, width) in [(100u64, 1usize), (1000, 3), (100_000, 5), (u64::MAX, 9)] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            assert_eq!(buf.len(), width);
            assert_eq!(read_varint(&mut Cursor::new(buf)).unwrap(), value);
        }
    }

    #[test]
    fn test_var_bytes() {
        let mut buf = Vec::new();
        write_var_bytes(&mut buf, b"hello world");
        let decoded = read_var_bytes(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, b"hello world");
    }

    #[test]
    fn test_truncated_var_bytes_is_error() {
        let mut buf = Vec::new();
        write_var_bytes(&mut buf, b"hello world");
        buf.truncate(5);
        assert!(read_var_bytes(&mut Cursor::new(buf)).is_err());
    }

    #[test]
    fn test_huge_length_prefix_is_error() {
        let mut buf = Vec::new();
        write_varint(&mut buf, u64::MAX);
        assert!(read_var_bytes(&mut Cursor::new(buf)).is_err());
    }
}
