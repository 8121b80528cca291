use log::warn;

use wirecast_codec::{ByteReader, Codec};

use crate::{
    constants::{FRAME_PREAMBLE_BYTES, FRAME_TRAILER_BYTES},
    dispatcher::Dispatcher,
    directory::ConnectionDirectory,
    error::WarningCode,
    metadata::{MessageType, Metadata},
    pipeline::{PipelineVerdict, ReceivePipeline, ReceiveParams},
    types::{ConnectionUid, MessageKey},
};

/// What the receiver decided about the connection after one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The frame was handled or dropped; the connection stays up.
    KeepAlive,
    /// A receive-pipeline step demanded the connection be dropped.
    Disconnect,
}

/// Decodes one inbound frame and routes it to the dispatcher.
///
/// Frames shorter than the 3-byte preamble are keepalives. The 32-bit
/// total-length trailer is validated against the actual frame size and
/// stripped before any payload reaches a pipeline step or handler, so
/// handlers never observe partial data. Only Default frames run the
/// receive pipeline.
pub fn process_frame(
    uid: ConnectionUid,
    frame: &[u8],
    receive_pipeline: &mut ReceivePipeline,
    dispatcher: &mut Dispatcher,
    directory: &ConnectionDirectory,
) -> ReceiveOutcome {
    let mut reader = ByteReader::new(frame);
    if reader.remaining() < FRAME_PREAMBLE_BYTES {
        return ReceiveOutcome::KeepAlive;
    }

    // the preamble reads cannot fail past the length check above
    let Ok(metadata_byte) = reader.read_byte() else {
        return ReceiveOutcome::KeepAlive;
    };
    let metadata = Metadata::from_byte(metadata_byte);
    let Ok(key) = u16::de(&mut reader) else {
        return ReceiveOutcome::KeepAlive;
    };

    let Ok(trailer) = reader.trim_trailer(FRAME_TRAILER_BYTES) else {
        warn!(
            "[{}] frame from {} is missing its length trailer ({} bytes total)",
            WarningCode::MalformedFrame,
            uid,
            frame.len()
        );
        return ReceiveOutcome::KeepAlive;
    };
    let declared_len = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    if declared_len as usize != frame.len() {
        warn!(
            "[{}] frame from {} declares {} bytes but carries {}",
            WarningCode::MalformedFrame,
            uid,
            declared_len,
            frame.len()
        );
        return ReceiveOutcome::KeepAlive;
    }

    match metadata.message_type() {
        MessageType::Default => {
            handle_default(uid, metadata, key, reader, receive_pipeline, dispatcher, directory)
        }
        MessageType::Event => {
            if !reader.is_empty() {
                warn!(
                    "[{}] event frame from {} for key {:#06x} carries payload",
                    WarningCode::MalformedFrame,
                    uid,
                    key
                );
                return ReceiveOutcome::KeepAlive;
            }
            dispatcher.dispatch_event(key, uid, metadata, directory);
            ReceiveOutcome::KeepAlive
        }
        MessageType::Control => {
            if key & !0x000F != 0 {
                warn!(
                    "[{}] control frame from {} uses out-of-range key {:#06x}",
                    WarningCode::MalformedFrame,
                    uid,
                    key
                );
                return ReceiveOutcome::KeepAlive;
            }
            dispatcher.dispatch_control(key, uid, metadata, &reader, directory);
            ReceiveOutcome::KeepAlive
        }
        // reserved; decoded and dropped so the format can grow
        MessageType::VarTracking => ReceiveOutcome::KeepAlive,
    }
}

fn handle_default(
    uid: ConnectionUid,
    metadata: Metadata,
    key: MessageKey,
    mut reader: ByteReader,
    receive_pipeline: &mut ReceivePipeline,
    dispatcher: &mut Dispatcher,
    directory: &ConnectionDirectory,
) -> ReceiveOutcome {
    let mut params = ReceiveParams {
        uid,
        metadata,
        reader: &mut reader,
    };
    match receive_pipeline.run(&mut params) {
        PipelineVerdict::Continue => {
            dispatcher.dispatch_data(key, uid, metadata, &reader, directory);
            ReceiveOutcome::KeepAlive
        }
        PipelineVerdict::Discard => ReceiveOutcome::KeepAlive,
        PipelineVerdict::Disconnect => ReceiveOutcome::Disconnect,
    }
}
