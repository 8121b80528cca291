use crate::{byte_reader::ByteReader, byte_writer::ByteWriter, codec::Codec, error::CodecErr};

// Runs a multi-field read and restores the reader position if any field
// fails, so callers never observe a partially-consumed value.
fn atomically<'b, T>(
    reader: &mut ByteReader<'b>,
    read: impl FnOnce(&mut ByteReader<'b>) -> Result<T, CodecErr>,
) -> Result<T, CodecErr> {
    let mark = reader.clone();
    match read(reader) {
        Ok(value) => Ok(value),
        Err(err) => {
            *reader = mark;
            Err(err)
        }
    }
}

macro_rules! impl_codec_for_number {
    ($($number:ty),* $(,)?) => {$(
        impl Codec for $number {
            fn ser(&self, writer: &mut ByteWriter) -> Result<(), CodecErr> {
                writer.write_bytes(&self.to_le_bytes())
            }

            fn de(reader: &mut ByteReader) -> Result<Self, CodecErr> {
                let bytes = reader.read_bytes(core::mem::size_of::<$number>())?;
                Ok(<$number>::from_le_bytes(bytes.try_into().map_err(|_| CodecErr)?))
            }
        }
    )*};
}

impl_codec_for_number!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// A point in time carried on the wire as a signed 64-bit tick count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    pub fn ticks(&self) -> i64 {
        self.0
    }
}

impl Codec for Timestamp {
    fn ser(&self, writer: &mut ByteWriter) -> Result<(), CodecErr> {
        self.0.ser(writer)
    }

    fn de(reader: &mut ByteReader) -> Result<Self, CodecErr> {
        Ok(Self(i64::de(reader)?))
    }
}

// Strings travel as a signed 32-bit byte-count prefix followed by UTF-8:
// -1 denotes null (see the Option impl), 0 an empty string, any other
// negative value is malformed.

const NULL_STRING_LENGTH: i32 = -1;

impl Codec for String {
    fn ser(&self, writer: &mut ByteWriter) -> Result<(), CodecErr> {
        let bytes = self.as_bytes();
        if bytes.len() > i32::MAX as usize || writer.remaining() < 4 + bytes.len() {
            return Err(CodecErr);
        }
        (bytes.len() as i32).ser(writer)?;
        writer.write_bytes(bytes)
    }

    fn de(reader: &mut ByteReader) -> Result<Self, CodecErr> {
        atomically(reader, |reader| {
            let length = i32::de(reader)?;
            if length < 0 {
                return Err(CodecErr);
            }
            let bytes = reader.read_bytes(length as usize)?;
            String::from_utf8(bytes.to_vec()).map_err(|_| CodecErr)
        })
    }
}

impl Codec for Option<String> {
    fn ser(&self, writer: &mut ByteWriter) -> Result<(), CodecErr> {
        match self {
            Some(string) => string.ser(writer),
            None => NULL_STRING_LENGTH.ser(writer),
        }
    }

    fn de(reader: &mut ByteReader) -> Result<Self, CodecErr> {
        atomically(reader, |reader| {
            let length = i32::de(reader)?;
            if length == NULL_STRING_LENGTH {
                return Ok(None);
            }
            if length < 0 {
                return Err(CodecErr);
            }
            let bytes = reader.read_bytes(length as usize)?;
            String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|_| CodecErr)
        })
    }
}

/// A 2-component float vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Codec for Vec2 {
    fn ser(&self, writer: &mut ByteWriter) -> Result<(), CodecErr> {
        if writer.remaining() < 8 {
            return Err(CodecErr);
        }
        self.x.ser(writer)?;
        self.y.ser(writer)
    }

    fn de(reader: &mut ByteReader) -> Result<Self, CodecErr> {
        atomically(reader, |reader| {
            Ok(Self {
                x: f32::de(reader)?,
                y: f32::de(reader)?,
            })
        })
    }
}

/// A 3-component float vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Codec for Vec3 {
    fn ser(&self, writer: &mut ByteWriter) -> Result<(), CodecErr> {
        if writer.remaining() < 12 {
            return Err(CodecErr);
        }
        self.x.ser(writer)?;
        self.y.ser(writer)?;
        self.z.ser(writer)
    }

    fn de(reader: &mut ByteReader) -> Result<Self, CodecErr> {
        atomically(reader, |reader| {
            Ok(Self {
                x: f32::de(reader)?,
                y: f32::de(reader)?,
                z: f32::de(reader)?,
            })
        })
    }
}
