//! # Wirecast Server
//! The server side of the wirecast message engine: owns the transport
//! drivers, assigns connection identifiers, applies the receive/send
//! pipelines and drives the dispatcher from a tick-driven I/O loop.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub mod shared {
    pub use wirecast_shared::{
        ByteReader, ByteWriter, Codec, CodecErr, CodecRegistry, ConnectionConfig,
        ConnectionDirectory, ConnectionUid, ControlDecl, Dispatcher, FromMessage, HandlerId,
        HandlerOptions, MessageKey, MessageSide, MessageType, Metadata, MulticastHandle,
        PermissionFlags, PipelineVerdict, ReceivePipeline, SendHandle, SendPipeline, StepResult,
        Timestamp, Uid, Vec2, Vec3, SELF_UID,
    };
}

mod config;
mod error;
mod events;
mod server;
mod tracker;
mod uid_allocator;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{Server, MAX_TRANSPORT_DRIVERS};
