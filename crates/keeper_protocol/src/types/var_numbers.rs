use crate::types::MAX_VARINT_LEN;
use crate::types::traits::{ProtocolRead, ProtocolWrite};
use bytes::{BufMut, BytesMut};
use std::io::{self, Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt};

const SEGMENT_BITS: u32 = 0x7F;
const CONTINUE_BIT: u8 = 0x80;

/// Minecraft variable-length integer: 7 data bits per byte, least
/// significant group first, high bit set while more bytes follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInt(pub i32);

impl VarInt {
    /// Number of bytes this value occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        let mut value = self.0 as u32;
        let mut size = 0;
        loop {
            size += 1;
            if value & !SEGMENT_BITS == 0 {
                break;
            }
            value >>= 7;
        }
        size
    }

    pub fn to_bytes(&self) -> BytesMut {
        let mut buffer = BytesMut::with_capacity(MAX_VARINT_LEN);
        self.put(&mut buffer);
        buffer
    }

    pub fn put(&self, buffer: &mut BytesMut) {
        let mut value = self.0 as u32;
        loop {
            let mut byte = (value & SEGMENT_BITS) as u8;
            value >>= 7;
            if value != 0 {
                byte |= CONTINUE_BIT;
            }
            buffer.put_u8(byte);
            if value == 0 {
                break;
            }
        }
    }

    /// Reads a VarInt straight off an async stream, one byte at a time.
    pub async fn read_async<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<(Self, usize)> {
        let mut value: u32 = 0;
        let mut bytes_read = 0;

        loop {
            if bytes_read >= MAX_VARINT_LEN {
                return Err(too_long());
            }
            let byte = reader.read_u8().await?;
            value |= ((byte & 0x7F) as u32) << (7 * bytes_read);
            bytes_read += 1;

            if byte & CONTINUE_BIT == 0 {
                break;
            }
        }

        Ok((VarInt(value as i32), bytes_read))
    }
}

fn too_long() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "VarInt too long (>5 bytes)")
}

impl ProtocolWrite for VarInt {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        let bytes = self.to_bytes();
        writer.write_all(&bytes)?;
        Ok(bytes.len())
    }
}

impl ProtocolRead for VarInt {
    fn read_from<R: Read>(reader: &mut R) -> io::Result<(Self, usize)> {
        let mut value: u32 = 0;
        let mut bytes_read = 0;

        loop {
            if bytes_read >= MAX_VARINT_LEN {
                return Err(too_long());
            }

            let mut buf = [0u8; 1];
            reader.read_exact(&mut buf)?;
            let byte = buf[0];
            value |= ((byte & 0x7F) as u32) << (7 * bytes_read);
            bytes_read += 1;

            if byte & CONTINUE_BIT == 0 {
                break;
            }
        }

        Ok((VarInt(value as i32), bytes_read))
    }
}
