//! Reflective handler support: user functions declare typed parameters in
//! any order and the engine deserializes each one from the payload before
//! invoking them. There is no runtime reflection. An arity macro builds a
//! wrapper per function shape, resolving every payload parameter against
//! the codec registry at registration time and erasing the result to the
//! dispatcher's uniform callable shape.

use wirecast_codec::{ByteReader, CodecErr, CodecRegistry, ErasedDeserializer};

use crate::{
    error::RegistrationError,
    metadata::Metadata,
    types::ConnectionUid,
};

use super::{ControlFn, DataFn, EventFn};

/// The calling connection's identifier, bound from dispatch context
/// rather than deserialized from the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uid(pub ConnectionUid);

/// Dispatch-time context handed to parameter extraction.
pub struct MessageCtx {
    pub uid: ConnectionUid,
    pub metadata: Metadata,
}

/// A type a reflective handler may declare as a parameter. `Uid` and
/// `Metadata` bind from context; every other implementor reads itself
/// from the payload through the deserializer resolved at registration.
pub trait FromMessage: Sized + 'static {
    /// Resolves whatever registry entry this parameter needs. Context
    /// parameters resolve to `None`; payload parameters fail registration
    /// when their type has no deserializer.
    fn resolve(registry: &CodecRegistry) -> Result<Option<ErasedDeserializer>, RegistrationError>;

    /// Produces the parameter value at dispatch time.
    fn extract(
        ctx: &MessageCtx,
        reader: &mut ByteReader,
        de: &Option<ErasedDeserializer>,
    ) -> Result<Self, CodecErr>;
}

impl FromMessage for Uid {
    fn resolve(_registry: &CodecRegistry) -> Result<Option<ErasedDeserializer>, RegistrationError> {
        Ok(None)
    }

    fn extract(
        ctx: &MessageCtx,
        _reader: &mut ByteReader,
        _de: &Option<ErasedDeserializer>,
    ) -> Result<Self, CodecErr> {
        Ok(Uid(ctx.uid))
    }
}

impl FromMessage for Metadata {
    fn resolve(_registry: &CodecRegistry) -> Result<Option<ErasedDeserializer>, RegistrationError> {
        Ok(None)
    }

    fn extract(
        ctx: &MessageCtx,
        _reader: &mut ByteReader,
        _de: &Option<ErasedDeserializer>,
    ) -> Result<Self, CodecErr> {
        Ok(ctx.metadata)
    }
}

/// Implements `FromMessage` for payload types. Pre-invoked for the wire
/// primitives below; call it for custom `Codec` types registered through
/// the codec registry.
#[macro_export]
macro_rules! impl_payload_param {
    ($($payload:ty),* $(,)?) => {$(
        impl $crate::FromMessage for $payload {
            fn resolve(
                registry: &$crate::CodecRegistry,
            ) -> Result<Option<$crate::ErasedDeserializer>, $crate::RegistrationError> {
                registry
                    .deserializer::<$payload>()
                    .map(Some)
                    .ok_or($crate::RegistrationError::MissingDeserializer {
                        type_name: std::any::type_name::<$payload>(),
                    })
            }

            fn extract(
                _ctx: &$crate::MessageCtx,
                reader: &mut $crate::ByteReader,
                de: &Option<$crate::ErasedDeserializer>,
            ) -> Result<Self, $crate::CodecErr> {
                let Some(de) = de else {
                    return Err($crate::CodecErr);
                };
                let value = (de.as_ref())(reader)?;
                value
                    .downcast::<$payload>()
                    .map(|boxed| *boxed)
                    .map_err(|_| $crate::CodecErr)
            }
        }
    )*};
}

impl_payload_param!(
    u8,
    i8,
    u16,
    i16,
    u32,
    i32,
    u64,
    i64,
    f32,
    f64,
    wirecast_codec::Timestamp,
    String,
    Option<String>,
    wirecast_codec::Vec2,
    wirecast_codec::Vec3,
);

/// A function registrable as a reflective default-data handler.
pub trait TypedDataHandler<Params>: Send + 'static {
    fn into_data_fn(self, registry: &CodecRegistry) -> Result<DataFn, RegistrationError>;
}

/// A function registrable as a reflective event handler. Event frames
/// carry no payload, so payload parameters never extract and such a
/// handler is never invoked.
pub trait TypedEventHandler<Params>: Send + 'static {
    fn into_event_fn(self, registry: &CodecRegistry) -> Result<EventFn, RegistrationError>;
}

/// A function registrable as a reflective control handler; returns
/// whether the permission bit is granted.
pub trait TypedControlHandler<Params>: Send + 'static {
    fn into_control_fn(self, registry: &CodecRegistry) -> Result<ControlFn, RegistrationError>;
}

impl<Func> TypedDataHandler<()> for Func
where
    Func: FnMut() + Send + 'static,
{
    fn into_data_fn(mut self, _registry: &CodecRegistry) -> Result<DataFn, RegistrationError> {
        Ok(Box::new(move |_uid, _metadata, _reader| (self)()))
    }
}

impl<Func> TypedEventHandler<()> for Func
where
    Func: FnMut() + Send + 'static,
{
    fn into_event_fn(mut self, _registry: &CodecRegistry) -> Result<EventFn, RegistrationError> {
        Ok(Box::new(move |_uid, _metadata| (self)()))
    }
}

impl<Func> TypedControlHandler<()> for Func
where
    Func: FnMut() -> bool + Send + 'static,
{
    fn into_control_fn(mut self, _registry: &CodecRegistry) -> Result<ControlFn, RegistrationError> {
        Ok(Box::new(move |_uid, _metadata, _reader| (self)()))
    }
}

macro_rules! impl_typed_handlers {
    ($(($Param:ident, $param:ident)),+) => {
        impl<Func, $($Param: FromMessage),+> TypedDataHandler<($($Param,)+)> for Func
        where
            Func: FnMut($($Param),+) + Send + 'static,
        {
            fn into_data_fn(
                mut self,
                registry: &CodecRegistry,
            ) -> Result<DataFn, RegistrationError> {
                let resolved = ($(<$Param as FromMessage>::resolve(registry)?,)+);
                Ok(Box::new(move |uid, metadata, reader| {
                    let ctx = MessageCtx { uid, metadata };
                    let ($(ref $param,)+) = resolved;
                    $(
                        let $param = match <$Param as FromMessage>::extract(&ctx, reader, $param) {
                            Ok(value) => value,
                            Err(_) => return,
                        };
                    )+
                    (self)($($param),+)
                }))
            }
        }

        impl<Func, $($Param: FromMessage),+> TypedEventHandler<($($Param,)+)> for Func
        where
            Func: FnMut($($Param),+) + Send + 'static,
        {
            fn into_event_fn(
                mut self,
                registry: &CodecRegistry,
            ) -> Result<EventFn, RegistrationError> {
                let resolved = ($(<$Param as FromMessage>::resolve(registry)?,)+);
                Ok(Box::new(move |uid, metadata| {
                    let ctx = MessageCtx { uid, metadata };
                    let mut reader = ByteReader::new(&[]);
                    let ($(ref $param,)+) = resolved;
                    $(
                        let $param =
                            match <$Param as FromMessage>::extract(&ctx, &mut reader, $param) {
                                Ok(value) => value,
                                Err(_) => return,
                            };
                    )+
                    (self)($($param),+)
                }))
            }
        }

        impl<Func, $($Param: FromMessage),+> TypedControlHandler<($($Param,)+)> for Func
        where
            Func: FnMut($($Param),+) -> bool + Send + 'static,
        {
            fn into_control_fn(
                mut self,
                registry: &CodecRegistry,
            ) -> Result<ControlFn, RegistrationError> {
                let resolved = ($(<$Param as FromMessage>::resolve(registry)?,)+);
                Ok(Box::new(move |uid, metadata, reader| {
                    let ctx = MessageCtx { uid, metadata };
                    let ($(ref $param,)+) = resolved;
                    $(
                        let $param = match <$Param as FromMessage>::extract(&ctx, reader, $param) {
                            Ok(value) => value,
                            Err(_) => return false,
                        };
                    )+
                    (self)($($param),+)
                }))
            }
        }
    };
}

impl_typed_handlers!((P1, p1));
impl_typed_handlers!((P1, p1), (P2, p2));
impl_typed_handlers!((P1, p1), (P2, p2), (P3, p3));
impl_typed_handlers!((P1, p1), (P2, p2), (P3, p3), (P4, p4));
impl_typed_handlers!((P1, p1), (P2, p2), (P3, p3), (P4, p4), (P5, p5));
impl_typed_handlers!((P1, p1), (P2, p2), (P3, p3), (P4, p4), (P5, p5), (P6, p6));
impl_typed_handlers!(
    (P1, p1),
    (P2, p2),
    (P3, p3),
    (P4, p4),
    (P5, p5),
    (P6, p6),
    (P7, p7)
);
impl_typed_handlers!(
    (P1, p1),
    (P2, p2),
    (P3, p3),
    (P4, p4),
    (P5, p5),
    (P6, p6),
    (P7, p7),
    (P8, p8)
);

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use wirecast_codec::{ByteWriter, Codec};

    use super::*;
    use crate::{
        dispatcher::{ControlDecl, Dispatcher, HandlerOptions},
        directory::ConnectionDirectory,
        metadata::MessageType,
        side::MessageSide,
        transport::TransportConn,
    };

    fn directory_with(uid: ConnectionUid) -> ConnectionDirectory {
        let directory = ConnectionDirectory::new();
        directory.register(uid, 0, Some(TransportConn::new(1)));
        directory
    }

    #[test]
    fn parameters_bind_in_declaration_order() {
        let mut dispatcher = Dispatcher::new(MessageSide::SERVER, CodecRegistry::default());
        let directory = directory_with(7);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        dispatcher
            .register_data_typed(
                0x20,
                HandlerOptions::default(),
                move |uid: Uid, first: u32, name: String, second: i16| {
                    sink.lock()
                        .unwrap()
                        .push((uid.0, first, name, second));
                },
            )
            .unwrap()
            .unwrap();

        let mut writer = ByteWriter::new();
        99u32.ser(&mut writer).unwrap();
        "turret".to_string().ser(&mut writer).unwrap();
        (-5i16).ser(&mut writer).unwrap();
        let bytes = writer.into_bytes();
        let reader = ByteReader::new(&bytes);

        dispatcher.dispatch_data(0x20, 7, Metadata::default(), &reader, &directory);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(7, 99, "turret".to_string(), -5)]
        );
    }

    #[test]
    fn context_parameters_may_appear_anywhere() {
        let mut dispatcher = Dispatcher::new(MessageSide::SERVER, CodecRegistry::default());
        let directory = directory_with(3);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        dispatcher
            .register_data_typed(
                0x21,
                HandlerOptions::default(),
                move |value: u8, metadata: Metadata, uid: Uid| {
                    sink.lock()
                        .unwrap()
                        .push((value, metadata.to_byte(), uid.0));
                },
            )
            .unwrap()
            .unwrap();

        let bytes = [0x2Au8];
        let reader = ByteReader::new(&bytes);
        let metadata = Metadata::with_flags(MessageType::Default, 0b11);
        dispatcher.dispatch_data(0x21, 3, metadata, &reader, &directory);

        assert_eq!(*seen.lock().unwrap(), vec![(0x2A, 0b11, 3)]);
    }

    #[test]
    fn short_payload_drops_the_message_silently() {
        let mut dispatcher = Dispatcher::new(MessageSide::SERVER, CodecRegistry::default());
        let directory = directory_with(1);
        let seen = Arc::new(Mutex::new(0u32));

        let sink = seen.clone();
        dispatcher
            .register_data_typed(
                0x22,
                HandlerOptions::default(),
                move |_value: u64| {
                    *sink.lock().unwrap() += 1;
                },
            )
            .unwrap()
            .unwrap();

        let bytes = [1u8, 2, 3];
        let reader = ByteReader::new(&bytes);
        dispatcher.dispatch_data(0x22, 1, Metadata::default(), &reader, &directory);

        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn unregistered_payload_type_fails_registration() {
        #[derive(Debug)]
        struct Unregistered;

        impl Codec for Unregistered {
            fn ser(&self, _writer: &mut ByteWriter) -> Result<(), CodecErr> {
                Ok(())
            }

            fn de(_reader: &mut ByteReader) -> Result<Self, CodecErr> {
                Ok(Unregistered)
            }
        }

        crate::impl_payload_param!(Unregistered);

        let mut dispatcher = Dispatcher::new(MessageSide::SERVER, CodecRegistry::default());
        let result = dispatcher.register_data_typed(
            0x23,
            HandlerOptions::default(),
            |_value: Unregistered| {},
        );

        assert!(matches!(
            result,
            Err(RegistrationError::MissingDeserializer { .. })
        ));
    }

    #[test]
    fn custom_type_works_once_registered() {
        #[derive(Debug, Clone, Copy, PartialEq)]
        struct Health(u16);

        impl Codec for Health {
            fn ser(&self, writer: &mut ByteWriter) -> Result<(), CodecErr> {
                self.0.ser(writer)
            }

            fn de(reader: &mut ByteReader) -> Result<Self, CodecErr> {
                Ok(Health(u16::de(reader)?))
            }
        }

        crate::impl_payload_param!(Health);

        let mut dispatcher = Dispatcher::new(MessageSide::SERVER, CodecRegistry::default());
        dispatcher.registry_mut().register::<Health>();
        let directory = directory_with(2);
        let seen = Arc::new(Mutex::new(None));

        let sink = seen.clone();
        dispatcher
            .register_data_typed(0x24, HandlerOptions::default(), move |health: Health| {
                *sink.lock().unwrap() = Some(health);
            })
            .unwrap()
            .unwrap();

        let mut writer = ByteWriter::new();
        Health(250).ser(&mut writer).unwrap();
        let bytes = writer.into_bytes();
        let reader = ByteReader::new(&bytes);
        dispatcher.dispatch_data(0x24, 2, Metadata::default(), &reader, &directory);

        assert_eq!(*seen.lock().unwrap(), Some(Health(250)));
    }

    #[test]
    fn reflective_control_handler_grants_the_bit() {
        let mut dispatcher = Dispatcher::new(MessageSide::SERVER, CodecRegistry::default());
        let directory = directory_with(4);

        dispatcher
            .register_control_typed(
                ControlDecl {
                    key: 5,
                    expected_len: 4,
                    side: MessageSide::ANY,
                    required_flags: 0,
                },
                |token: u32| token == 0xFEED,
            )
            .unwrap()
            .unwrap();

        let mut writer = ByteWriter::new();
        0xFEEDu32.ser(&mut writer).unwrap();
        let bytes = writer.into_bytes();
        let reader = ByteReader::new(&bytes);
        dispatcher.dispatch_control(
            5,
            4,
            Metadata::new(MessageType::Control),
            &reader,
            &directory,
        );

        assert_eq!(directory.flags(4).unwrap().load(), 1 << 5);
    }

    #[test]
    fn reflective_event_handler_receives_context() {
        let mut dispatcher = Dispatcher::new(MessageSide::SERVER, CodecRegistry::default());
        let directory = directory_with(6);
        let seen = Arc::new(Mutex::new(None));

        let sink = seen.clone();
        dispatcher
            .register_event_typed(0x30, HandlerOptions::default(), move |uid: Uid| {
                *sink.lock().unwrap() = Some(uid.0);
            })
            .unwrap()
            .unwrap();

        dispatcher.dispatch_event(0x30, 6, Metadata::new(MessageType::Event), &directory);

        assert_eq!(*seen.lock().unwrap(), Some(6));
    }
}
