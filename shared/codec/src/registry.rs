use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};

use crate::{
    byte_reader::ByteReader,
    byte_writer::ByteWriter,
    codec::Codec,
    error::CodecErr,
    impls::{Timestamp, Vec2, Vec3},
};

/// Writes a type-erased value into a byte stream.
pub type ErasedSerializer =
    Arc<dyn Fn(&dyn Any, &mut ByteWriter) -> Result<(), CodecErr> + Send + Sync>;

/// Reads a type-erased value out of a byte stream.
pub type ErasedDeserializer =
    Arc<dyn Fn(&mut ByteReader) -> Result<Box<dyn Any>, CodecErr> + Send + Sync>;

/// Parallel maps from a payload type to its serializer and deserializer.
/// Reflective handler registration resolves each declared parameter here;
/// a type with no entry cannot be used as a handler parameter.
///
/// `Default` pre-populates the wire primitives: the 1/2/4/8-byte signed
/// and unsigned integers, `f32`/`f64`, `Timestamp`, the length-prefixed
/// string (both `String` and nullable `Option<String>`), and the 2- and
/// 3-component float vectors.
pub struct CodecRegistry {
    serializers: HashMap<TypeId, ErasedSerializer>,
    deserializers: HashMap<TypeId, ErasedDeserializer>,
}

impl CodecRegistry {
    /// A registry with no entries at all; prefer `Default` unless the
    /// primitive set is deliberately excluded.
    pub fn empty() -> Self {
        Self {
            serializers: HashMap::new(),
            deserializers: HashMap::new(),
        }
    }

    /// Registers both directions for `T`, replacing any prior entry.
    pub fn register<T: Codec + Send + Sync + 'static>(&mut self) {
        self.serializers.insert(
            TypeId::of::<T>(),
            Arc::new(|value: &dyn Any, writer: &mut ByteWriter| {
                let value = value.downcast_ref::<T>().ok_or(CodecErr)?;
                value.ser(writer)
            }),
        );
        self.deserializers.insert(
            TypeId::of::<T>(),
            Arc::new(|reader: &mut ByteReader| {
                Ok(Box::new(T::de(reader)?) as Box<dyn Any>)
            }),
        );
    }

    pub fn serializer<T: 'static>(&self) -> Option<ErasedSerializer> {
        self.serializers.get(&TypeId::of::<T>()).cloned()
    }

    pub fn deserializer<T: 'static>(&self) -> Option<ErasedDeserializer> {
        self.deserializers.get(&TypeId::of::<T>()).cloned()
    }

    pub fn has<T: 'static>(&self) -> bool {
        self.deserializers.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.deserializers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deserializers.is_empty()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register::<u8>();
        registry.register::<i8>();
        registry.register::<u16>();
        registry.register::<i16>();
        registry.register::<u32>();
        registry.register::<i32>();
        registry.register::<u64>();
        registry.register::<i64>();
        registry.register::<f32>();
        registry.register::<f64>();
        registry.register::<Timestamp>();
        registry.register::<String>();
        registry.register::<Option<String>>();
        registry.register::<Vec2>();
        registry.register::<Vec3>();
        registry
    }
}
