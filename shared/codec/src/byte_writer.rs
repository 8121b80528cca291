use crate::error::CodecErr;

/// Writer capacity used for the unreliable datagram pipelines; frames
/// larger than this must go through the fragmenting pipeline.
pub const MTU_SIZE_BYTES: usize = 508;

/// A growable byte buffer with a hard capacity. Writes are all-or-nothing:
/// a write that would exceed the capacity fails without appending any of
/// its bytes.
pub struct ByteWriter {
    buffer: Vec<u8>,
    capacity: usize,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::with_capacity(MTU_SIZE_BYTES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::new(),
            capacity,
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Bytes left before the capacity is reached.
    pub fn remaining(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<(), CodecErr> {
        if self.remaining() < 1 {
            return Err(CodecErr);
        }
        self.buffer.push(byte);
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecErr> {
        if self.remaining() < bytes.len() {
            return Err(CodecErr);
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_accumulate() {
        let mut writer = ByteWriter::with_capacity(8);

        writer.write_byte(1).unwrap();
        writer.write_bytes(&[2, 3, 4]).unwrap();

        assert_eq!(writer.len(), 4);
        assert_eq!(writer.remaining(), 4);
        assert_eq!(writer.into_bytes(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn overflow_is_all_or_nothing() {
        let mut writer = ByteWriter::with_capacity(4);
        writer.write_bytes(&[1, 2, 3]).unwrap();

        assert!(writer.write_bytes(&[4, 5]).is_err());
        assert_eq!(writer.len(), 3);

        writer.write_byte(4).unwrap();
        assert!(writer.write_byte(5).is_err());
        assert_eq!(writer.as_slice(), &[1, 2, 3, 4]);
    }
}
