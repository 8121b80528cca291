//! # Wirecast Shared
//! Common functionality shared between the wirecast-server & wirecast-client
//! crates: the frame format, pipelines, dispatcher, connection directory,
//! receiver/sender paths and the transport driver abstraction.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use wirecast_codec::{
    ByteReader, ByteWriter, Codec, CodecErr, CodecRegistry, ErasedDeserializer, ErasedSerializer,
    Timestamp, Vec2, Vec3, MTU_SIZE_BYTES,
};

mod connection_config;
mod constants;
mod directory;
mod dispatcher;
mod error;
mod metadata;
mod permissions;
mod pipeline;
mod receiver;
mod sender;
mod side;
mod types;

pub mod transport;

pub use connection_config::ConnectionConfig;
pub use constants::{
    CONTROL_KEY_COUNT, EVENT_FRAME_BYTES, FRAME_PREAMBLE_BYTES, FRAME_TRAILER_BYTES,
};
pub use directory::{ConnectionDirectory, ConnectionRecord};
pub use dispatcher::{
    ControlDecl, ControlFn, DataFn, Dispatcher, EventFn, FromMessage, HandlerId, HandlerOptions,
    MessageCtx, TypedControlHandler, TypedDataHandler, TypedEventHandler, Uid,
};
pub use error::{RegistrationError, WarningCode};
pub use metadata::{MessageType, Metadata};
pub use permissions::PermissionFlags;
pub use pipeline::{
    PipelineVerdict, ReceiveParams, ReceivePipeline, SendParams, SendPipeline, StepResult,
};
pub use receiver::{process_frame, ReceiveOutcome};
pub use sender::{
    commit_frame, commit_multicast_one, open_frame, open_multicast, seal_frame, write_preamble,
    MulticastHandle, MulticastTargets, SendAbort, SendHandle,
};
pub use side::MessageSide;
pub use types::{ConnectionUid, MessageKey, SELF_UID};
