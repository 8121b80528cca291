use log::warn;

use wirecast_codec::{ByteWriter, Codec};

use crate::{
    constants::{FRAME_PREAMBLE_BYTES, FRAME_TRAILER_BYTES},
    error::WarningCode,
    metadata::Metadata,
    pipeline::{PipelineVerdict, SendParams, SendPipeline},
    transport::{TransportConn, TransportDriver, TransportPipeline},
    types::{ConnectionUid, MessageKey},
};

/// Why a begin-send produced no handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendAbort {
    /// The driver had no writer for this connection (unknown or closed).
    WriterUnavailable,
    /// The preamble, payload copy or trailer did not fit the writer.
    FrameOverflow,
    /// A send-pipeline step discarded the message.
    Discarded,
    /// A send-pipeline step demanded the target be disconnected.
    Disconnected,
    /// The driver refused the finalized frame.
    TransportFailed,
}

/// An in-progress outgoing frame. The metadata byte, key and any
/// pipeline prefix are already written; the caller serializes payload
/// into `writer()` and commits through the owning engine. Handles are
/// valid only within the tick (or inter-tick window) they were opened in.
pub struct SendHandle {
    uid: ConnectionUid,
    conn: TransportConn,
    driver_index: usize,
    pipeline: TransportPipeline,
    writer: ByteWriter,
    epoch: u64,
}

impl SendHandle {
    pub fn uid(&self) -> ConnectionUid {
        self.uid
    }

    pub fn driver_index(&self) -> usize {
        self.driver_index
    }

    pub fn writer(&mut self) -> &mut ByteWriter {
        &mut self.writer
    }
}

/// Recipients of a multicast handle.
#[derive(Debug, Clone)]
pub enum MulticastTargets {
    Explicit(Vec<ConnectionUid>),
    /// Resolved against the connection directory at commit time.
    AllConnections,
}

/// An in-progress multicast: one template payload the caller fills once,
/// re-framed per recipient at commit time so each recipient still gets
/// its own send-pipeline pass.
pub struct MulticastHandle {
    targets: MulticastTargets,
    key: MessageKey,
    pipeline: TransportPipeline,
    metadata: Metadata,
    template: ByteWriter,
    epoch: u64,
}

impl MulticastHandle {
    pub fn targets(&self) -> &MulticastTargets {
        &self.targets
    }

    pub fn key(&self) -> MessageKey {
        self.key
    }

    pub fn pipeline(&self) -> TransportPipeline {
        self.pipeline
    }

    pub fn metadata(&self) -> Metadata {
        self.metadata
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The shared payload writer.
    pub fn writer(&mut self) -> &mut ByteWriter {
        &mut self.template
    }

    pub fn template_bytes(&self) -> &[u8] {
        self.template.as_slice()
    }
}

/// Writes the metadata byte and the little-endian message key.
pub fn write_preamble(
    writer: &mut ByteWriter,
    metadata: Metadata,
    key: MessageKey,
) -> Result<(), wirecast_codec::CodecErr> {
    writer.write_byte(metadata.to_byte())?;
    key.ser(writer)
}

/// Appends the 32-bit total-length trailer and surrenders the bytes.
/// Fails when the trailer does not fit or the total exceeds u32 range.
pub fn seal_frame(mut writer: ByteWriter) -> Result<Vec<u8>, wirecast_codec::CodecErr> {
    let total = writer
        .len()
        .checked_add(FRAME_TRAILER_BYTES)
        .ok_or(wirecast_codec::CodecErr)?;
    let total = u32::try_from(total).map_err(|_| wirecast_codec::CodecErr)?;
    writer.write_bytes(&total.to_le_bytes())?;
    Ok(writer.into_bytes())
}

/// Acquires a writer from the driver, stamps the preamble and runs the
/// send pipeline. On success the caller owns a handle whose writer is
/// positioned for payload.
pub fn open_frame(
    driver: &mut dyn TransportDriver,
    driver_index: usize,
    conn: TransportConn,
    uid: ConnectionUid,
    key: MessageKey,
    pipeline: TransportPipeline,
    metadata: Metadata,
    send_pipeline: &mut SendPipeline,
    epoch: u64,
) -> Result<SendHandle, SendAbort> {
    let Some(mut writer) = driver.begin_send(pipeline, &conn) else {
        return Err(SendAbort::WriterUnavailable);
    };
    if writer.remaining() < FRAME_PREAMBLE_BYTES
        || write_preamble(&mut writer, metadata, key).is_err()
    {
        return Err(SendAbort::FrameOverflow);
    }
    let mut params = SendParams {
        uid,
        metadata,
        writer: &mut writer,
    };
    match send_pipeline.run(&mut params) {
        PipelineVerdict::Continue => Ok(SendHandle {
            uid,
            conn,
            driver_index,
            pipeline,
            writer,
            epoch,
        }),
        PipelineVerdict::Discard => Err(SendAbort::Discarded),
        PipelineVerdict::Disconnect => Err(SendAbort::Disconnected),
    }
}

/// Seals the frame and hands it to the transport. Stale handles (opened
/// before the engine's current epoch) are refused; their writers are
/// simply abandoned.
pub fn commit_frame(
    driver: &mut dyn TransportDriver,
    handle: SendHandle,
    current_epoch: u64,
) -> bool {
    if handle.epoch != current_epoch {
        warn!(
            "[{}] send handle for {} outlived its tick, aborting",
            WarningCode::StaleSendHandle,
            handle.uid
        );
        return false;
    }
    let SendHandle {
        conn,
        pipeline,
        writer,
        uid,
        ..
    } = handle;
    let Ok(payload) = seal_frame(writer) else {
        warn!(
            "[{}] outgoing frame for {} exceeded its writer capacity",
            WarningCode::MalformedFrame,
            uid
        );
        return false;
    };
    driver.end_send(&conn, pipeline, payload).is_ok()
}

/// Opens a multicast handle; the template holds payload only, since the
/// per-recipient preamble and pipeline prefix are produced at commit.
pub fn open_multicast(
    targets: MulticastTargets,
    key: MessageKey,
    pipeline: TransportPipeline,
    metadata: Metadata,
    epoch: u64,
) -> MulticastHandle {
    MulticastHandle {
        targets,
        key,
        pipeline,
        metadata,
        template: ByteWriter::with_capacity(pipeline.writer_capacity()),
        epoch,
    }
}

/// Frames and sends the template to a single multicast recipient.
pub fn commit_multicast_one(
    driver: &mut dyn TransportDriver,
    conn: TransportConn,
    uid: ConnectionUid,
    key: MessageKey,
    pipeline: TransportPipeline,
    metadata: Metadata,
    template: &[u8],
    send_pipeline: &mut SendPipeline,
) -> Result<(), SendAbort> {
    let Some(mut writer) = driver.begin_send(pipeline, &conn) else {
        return Err(SendAbort::WriterUnavailable);
    };
    if writer.remaining() < FRAME_PREAMBLE_BYTES
        || write_preamble(&mut writer, metadata, key).is_err()
    {
        return Err(SendAbort::FrameOverflow);
    }
    let mut params = SendParams {
        uid,
        metadata,
        writer: &mut writer,
    };
    match send_pipeline.run(&mut params) {
        PipelineVerdict::Continue => {}
        PipelineVerdict::Discard => return Err(SendAbort::Discarded),
        PipelineVerdict::Disconnect => return Err(SendAbort::Disconnected),
    }
    if writer.write_bytes(template).is_err() {
        return Err(SendAbort::FrameOverflow);
    }
    let payload = seal_frame(writer).map_err(|_| SendAbort::FrameOverflow)?;
    driver
        .end_send(&conn, pipeline, payload)
        .map_err(|_| SendAbort::TransportFailed)
}
