use crate::{byte_reader::ByteReader, byte_writer::ByteWriter, error::CodecErr};

/// A type that can be written to and read from a wirecast byte stream.
/// All multi-byte encodings are little-endian on the wire.
pub trait Codec: Sized {
    /// Serialize into the writer. Fails when the writer's capacity would
    /// be exceeded, in which case nothing is appended.
    fn ser(&self, writer: &mut ByteWriter) -> Result<(), CodecErr>;

    /// Deserialize from the reader. Fails without advancing the reader
    /// when there are not enough bytes or the data is malformed.
    fn de(reader: &mut ByteReader) -> Result<Self, CodecErr>;
}
