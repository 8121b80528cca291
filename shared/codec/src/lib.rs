//! # Wirecast Codec
//! Byte-level serialization used by the wirecast message engine: a
//! bounds-checked reader/writer pair, the `Codec` trait with impls for the
//! wire primitives, and the type-erased registry backing reflective
//! handler registration.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod byte_reader;
mod byte_writer;
mod codec;
mod error;
mod impls;
mod registry;

pub use byte_reader::ByteReader;
pub use byte_writer::{ByteWriter, MTU_SIZE_BYTES};
pub use codec::Codec;
pub use error::CodecErr;
pub use impls::{Timestamp, Vec2, Vec3};
pub use registry::{CodecRegistry, ErasedDeserializer, ErasedSerializer};
