use std::{
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
};

use log::{info, warn};

use wirecast_codec::{ByteReader, CodecRegistry};

use crate::{
    constants::CONTROL_KEY_COUNT,
    directory::ConnectionDirectory,
    error::{RegistrationError, WarningCode},
    metadata::Metadata,
    side::MessageSide,
    types::{ConnectionUid, MessageKey},
};

mod typed;

pub use typed::{
    FromMessage, MessageCtx, TypedControlHandler, TypedDataHandler, TypedEventHandler, Uid,
};

/// Uniform callable shape for default-data handlers.
pub type DataFn = Box<dyn FnMut(ConnectionUid, Metadata, &mut ByteReader) + Send>;
/// Uniform callable shape for event handlers.
pub type EventFn = Box<dyn FnMut(ConnectionUid, Metadata) + Send>;
/// Uniform callable shape for control handlers; returning true grants the
/// caller the permission bit matching the control key.
pub type ControlFn = Box<dyn FnMut(ConnectionUid, Metadata, &mut ByteReader) -> bool + Send>;

/// Identifies one registered callable so it can be unregistered later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Options shared by data and event registrations.
#[derive(Debug, Clone, Copy)]
pub struct HandlerOptions {
    /// Which dispatcher sides this handler registers on.
    pub side: MessageSide,
    /// Permission bits the calling connection must hold.
    pub required_flags: u16,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            side: MessageSide::ANY,
            required_flags: 0,
        }
    }
}

/// Declaration of a control handler: its key in [0,15], the exact payload
/// length it accepts, and the usual side/flags options.
#[derive(Debug, Clone, Copy)]
pub struct ControlDecl {
    pub key: u16,
    pub expected_len: u16,
    pub side: MessageSide,
    pub required_flags: u16,
}

struct DataHandler {
    id: HandlerId,
    required_flags: u16,
    callable: DataFn,
}

struct EventHandler {
    id: HandlerId,
    required_flags: u16,
    callable: EventFn,
}

struct ControlHandler {
    id: HandlerId,
    required_flags: u16,
    expected_len: u16,
    callable: ControlFn,
}

/// Routes decoded messages to user handlers. Holds the four registries
/// (default-data, event, control, and reflective wrappers installed into
/// the first three), the codec registry reflective registration resolves
/// against, and the side filter.
///
/// Per-key handlers form an ordered multicast list: callables run in
/// registration order, each over its own clone of the payload reader, and
/// a panicking callable is contained and logged without aborting the
/// tick. The control path is the only place incoming traffic can mutate a
/// connection's permission flags.
pub struct Dispatcher {
    side: MessageSide,
    registry: CodecRegistry,
    next_handler_id: u64,
    data_handlers: HashMap<MessageKey, Vec<DataHandler>>,
    event_handlers: HashMap<MessageKey, Vec<EventHandler>>,
    control_handlers: [Vec<ControlHandler>; CONTROL_KEY_COUNT],
}

impl Dispatcher {
    pub fn new(side: MessageSide, registry: CodecRegistry) -> Self {
        Self {
            side,
            registry,
            next_handler_id: 0,
            data_handlers: HashMap::new(),
            event_handlers: HashMap::new(),
            control_handlers: std::array::from_fn(|_| Vec::new()),
        }
    }

    pub fn side(&self) -> MessageSide {
        self.side
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    /// Mutable access for registering custom payload types.
    pub fn registry_mut(&mut self) -> &mut CodecRegistry {
        &mut self.registry
    }

    fn next_id(&mut self) -> HandlerId {
        self.next_handler_id += 1;
        HandlerId(self.next_handler_id)
    }

    // Registration

    /// Registers a default-data handler. Returns `None` when the side
    /// filter excludes it on this dispatcher.
    pub fn register_data<F>(
        &mut self,
        key: MessageKey,
        options: HandlerOptions,
        callable: F,
    ) -> Option<HandlerId>
    where
        F: FnMut(ConnectionUid, Metadata, &mut ByteReader) + Send + 'static,
    {
        if !options.side.matches(self.side) {
            return None;
        }
        let id = self.next_id();
        self.data_handlers.entry(key).or_default().push(DataHandler {
            id,
            required_flags: options.required_flags,
            callable: Box::new(callable),
        });
        Some(id)
    }

    /// Registers a reflective default-data handler: the callable's typed
    /// parameters are deserialized by the engine in declaration order.
    pub fn register_data_typed<Params, F>(
        &mut self,
        key: MessageKey,
        options: HandlerOptions,
        callable: F,
    ) -> Result<Option<HandlerId>, RegistrationError>
    where
        F: TypedDataHandler<Params>,
    {
        if !options.side.matches(self.side) {
            return Ok(None);
        }
        let callable = callable.into_data_fn(&self.registry)?;
        let id = self.next_id();
        self.data_handlers.entry(key).or_default().push(DataHandler {
            id,
            required_flags: options.required_flags,
            callable,
        });
        Ok(Some(id))
    }

    /// Unregisters a data handler; a no-op when already gone.
    pub fn unregister_data(&mut self, key: MessageKey, id: HandlerId) -> bool {
        Self::remove_from(&mut self.data_handlers, key, |handler: &DataHandler| {
            handler.id == id
        })
    }

    pub fn register_event<F>(
        &mut self,
        key: MessageKey,
        options: HandlerOptions,
        callable: F,
    ) -> Option<HandlerId>
    where
        F: FnMut(ConnectionUid, Metadata) + Send + 'static,
    {
        if !options.side.matches(self.side) {
            return None;
        }
        let id = self.next_id();
        self.event_handlers
            .entry(key)
            .or_default()
            .push(EventHandler {
                id,
                required_flags: options.required_flags,
                callable: Box::new(callable),
            });
        Some(id)
    }

    pub fn register_event_typed<Params, F>(
        &mut self,
        key: MessageKey,
        options: HandlerOptions,
        callable: F,
    ) -> Result<Option<HandlerId>, RegistrationError>
    where
        F: TypedEventHandler<Params>,
    {
        if !options.side.matches(self.side) {
            return Ok(None);
        }
        let callable = callable.into_event_fn(&self.registry)?;
        let id = self.next_id();
        self.event_handlers
            .entry(key)
            .or_default()
            .push(EventHandler {
                id,
                required_flags: options.required_flags,
                callable,
            });
        Ok(Some(id))
    }

    pub fn unregister_event(&mut self, key: MessageKey, id: HandlerId) -> bool {
        Self::remove_from(&mut self.event_handlers, key, |handler: &EventHandler| {
            handler.id == id
        })
    }

    /// Registers a control handler for `decl.key`. The callable's bool
    /// return decides whether permission bit `decl.key` is granted.
    pub fn register_control<F>(
        &mut self,
        decl: ControlDecl,
        callable: F,
    ) -> Result<Option<HandlerId>, RegistrationError>
    where
        F: FnMut(ConnectionUid, Metadata, &mut ByteReader) -> bool + Send + 'static,
    {
        if decl.key as usize >= CONTROL_KEY_COUNT {
            return Err(RegistrationError::ControlKeyOutOfRange { key: decl.key });
        }
        if !decl.side.matches(self.side) {
            return Ok(None);
        }
        let id = self.next_id();
        self.control_handlers[decl.key as usize].push(ControlHandler {
            id,
            required_flags: decl.required_flags,
            expected_len: decl.expected_len,
            callable: Box::new(callable),
        });
        Ok(Some(id))
    }

    pub fn register_control_typed<Params, F>(
        &mut self,
        decl: ControlDecl,
        callable: F,
    ) -> Result<Option<HandlerId>, RegistrationError>
    where
        F: TypedControlHandler<Params>,
    {
        if decl.key as usize >= CONTROL_KEY_COUNT {
            return Err(RegistrationError::ControlKeyOutOfRange { key: decl.key });
        }
        if !decl.side.matches(self.side) {
            return Ok(None);
        }
        let callable = callable.into_control_fn(&self.registry)?;
        let id = self.next_id();
        self.control_handlers[decl.key as usize].push(ControlHandler {
            id,
            required_flags: decl.required_flags,
            expected_len: decl.expected_len,
            callable,
        });
        Ok(Some(id))
    }

    pub fn unregister_control(&mut self, key: u16, id: HandlerId) -> bool {
        let Some(handlers) = self
            .control_handlers
            .get_mut(key as usize)
        else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|handler| handler.id != id);
        handlers.len() != before
    }

    fn remove_from<H>(
        registry: &mut HashMap<MessageKey, Vec<H>>,
        key: MessageKey,
        mut matches: impl FnMut(&H) -> bool,
    ) -> bool {
        let Some(handlers) = registry.get_mut(&key) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|handler| !matches(handler));
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            registry.remove(&key);
        }
        removed
    }

    pub fn data_handler_count(&self, key: MessageKey) -> usize {
        self.data_handlers.get(&key).map(Vec::len).unwrap_or(0)
    }

    pub fn event_handler_count(&self, key: MessageKey) -> usize {
        self.event_handlers.get(&key).map(Vec::len).unwrap_or(0)
    }

    pub fn control_handler_count(&self, key: u16) -> usize {
        self.control_handlers
            .get(key as usize)
            .map(Vec::len)
            .unwrap_or(0)
    }

    // Dispatch

    pub fn dispatch_data(
        &mut self,
        key: MessageKey,
        uid: ConnectionUid,
        metadata: Metadata,
        reader: &ByteReader,
        directory: &ConnectionDirectory,
    ) {
        let Some(handlers) = self.data_handlers.get_mut(&key) else {
            warn!(
                "[{}] invalid key: no data handler registered for {:#06x}",
                WarningCode::UnknownKey,
                key
            );
            return;
        };
        let Some(flags) = directory.flags(uid) else {
            warn!(
                "[{}] no connection record for uid {}, dropping data message {:#06x}",
                WarningCode::UnknownConnection,
                uid,
                key
            );
            return;
        };
        let current = flags.load();
        for handler in handlers.iter_mut() {
            if current & handler.required_flags != handler.required_flags {
                info!(
                    "[{}] connection {} lacks permissions {:#06x} for data message {:#06x}",
                    WarningCode::PermissionDenied,
                    uid,
                    handler.required_flags,
                    key
                );
                continue;
            }
            let mut handler_reader = reader.clone();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                (handler.callable)(uid, metadata, &mut handler_reader)
            }));
            if outcome.is_err() {
                warn!(
                    "[{}] data handler for key {:#06x} panicked",
                    WarningCode::HandlerPanicked,
                    key
                );
            }
        }
    }

    pub fn dispatch_event(
        &mut self,
        key: MessageKey,
        uid: ConnectionUid,
        metadata: Metadata,
        directory: &ConnectionDirectory,
    ) {
        let Some(handlers) = self.event_handlers.get_mut(&key) else {
            warn!(
                "[{}] invalid key: no event handler registered for {:#06x}",
                WarningCode::UnknownKey,
                key
            );
            return;
        };
        let Some(flags) = directory.flags(uid) else {
            warn!(
                "[{}] no connection record for uid {}, dropping event {:#06x}",
                WarningCode::UnknownConnection,
                uid,
                key
            );
            return;
        };
        let current = flags.load();
        for handler in handlers.iter_mut() {
            if current & handler.required_flags != handler.required_flags {
                info!(
                    "[{}] connection {} lacks permissions {:#06x} for event {:#06x}",
                    WarningCode::PermissionDenied,
                    uid,
                    handler.required_flags,
                    key
                );
                continue;
            }
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| (handler.callable)(uid, metadata)));
            if outcome.is_err() {
                warn!(
                    "[{}] event handler for key {:#06x} panicked",
                    WarningCode::HandlerPanicked,
                    key
                );
            }
        }
    }

    /// Dispatches a control message. `key` must already be validated into
    /// [0,15] by the receiver.
    pub fn dispatch_control(
        &mut self,
        key: u16,
        uid: ConnectionUid,
        metadata: Metadata,
        reader: &ByteReader,
        directory: &ConnectionDirectory,
    ) {
        let Some(handlers) = self.control_handlers.get_mut(key as usize) else {
            return;
        };
        if handlers.is_empty() {
            warn!(
                "[{}] invalid key: no control handler registered for {}",
                WarningCode::UnknownKey,
                key
            );
            return;
        }
        let Some(flags) = directory.flags(uid) else {
            warn!(
                "[{}] no connection record for uid {}, dropping control message {}",
                WarningCode::UnknownConnection,
                uid,
                key
            );
            return;
        };
        let current = flags.load();
        for handler in handlers.iter_mut() {
            if current & handler.required_flags != handler.required_flags {
                info!(
                    "[{}] connection {} lacks permissions {:#06x} for control message {}",
                    WarningCode::PermissionDenied,
                    uid,
                    handler.required_flags,
                    key
                );
                continue;
            }
            if reader.remaining() != handler.expected_len as usize {
                warn!(
                    "[{}] control message {} carries {} payload bytes, handler expects {}",
                    WarningCode::ControlLengthMismatch,
                    key,
                    reader.remaining(),
                    handler.expected_len
                );
                continue;
            }
            let mut handler_reader = reader.clone();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                (handler.callable)(uid, metadata, &mut handler_reader)
            }));
            match outcome {
                Ok(true) => flags.set_bit(key as u8),
                Ok(false) => {}
                Err(_) => {
                    warn!(
                        "[{}] control handler for key {} panicked",
                        WarningCode::HandlerPanicked,
                        key
                    );
                }
            }
        }
    }
}
