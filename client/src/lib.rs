//! # Wirecast Client
//! The client side of the wirecast message engine: dials a server through
//! a transport driver, keeps the local "self" connection record, and
//! drives the dispatcher from the same tick-driven loop as the server.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub mod shared {
    pub use wirecast_shared::{
        ByteReader, ByteWriter, Codec, CodecErr, CodecRegistry, ConnectionConfig,
        ConnectionDirectory, ConnectionUid, ControlDecl, Dispatcher, FromMessage, HandlerId,
        HandlerOptions, MessageKey, MessageSide, MessageType, Metadata, PermissionFlags,
        PipelineVerdict, ReceivePipeline, SendHandle, SendPipeline, StepResult, Timestamp, Uid,
        Vec2, Vec3, SELF_UID,
    };
}

mod client;
mod config;
mod error;

pub use client::Client;
pub use config::ClientConfig;
pub use error::ClientError;
