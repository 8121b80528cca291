use wirecast_codec::{ByteReader, ByteWriter};

use crate::{metadata::Metadata, types::ConnectionUid};

/// What a single pipeline step decided about the message it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// Hand the message to the next step.
    Success,
    /// Drop the message; the connection stays up.
    Failure,
    /// Drop the message and disconnect its connection.
    DisconnectClient,
}

/// The aggregate outcome of running a pipeline over one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineVerdict {
    Continue,
    Discard,
    Disconnect,
}

/// Mutable view a receive step gets over an inbound message. Steps may
/// consume prefix bytes from the reader; whatever remains is what the
/// dispatcher hands to handlers.
pub struct ReceiveParams<'a, 'b> {
    pub uid: ConnectionUid,
    pub metadata: Metadata,
    pub reader: &'a mut ByteReader<'b>,
}

/// Mutable view a send step gets over an outbound message. The metadata
/// byte and key are already written; steps may append a prefix before the
/// caller writes payload.
pub struct SendParams<'a> {
    pub uid: ConnectionUid,
    pub metadata: Metadata,
    pub writer: &'a mut ByteWriter,
}

type ReceiveStep = Box<dyn FnMut(&mut ReceiveParams) -> StepResult + Send>;
type SendStep = Box<dyn FnMut(&mut SendParams) -> StepResult + Send>;

/// An ordered sequence of receive steps, run in registration order and
/// short-circuited by the first non-`Success` result.
pub struct ReceivePipeline {
    steps: Vec<ReceiveStep>,
}

impl ReceivePipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn add_step<F>(&mut self, step: F)
    where
        F: FnMut(&mut ReceiveParams) -> StepResult + Send + 'static,
    {
        self.steps.push(Box::new(step));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn run(&mut self, params: &mut ReceiveParams) -> PipelineVerdict {
        for step in &mut self.steps {
            match step(params) {
                StepResult::Success => {}
                StepResult::Failure => return PipelineVerdict::Discard,
                StepResult::DisconnectClient => return PipelineVerdict::Disconnect,
            }
        }
        PipelineVerdict::Continue
    }
}

impl Default for ReceivePipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Send-side counterpart of `ReceivePipeline`.
pub struct SendPipeline {
    steps: Vec<SendStep>,
}

impl SendPipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn add_step<F>(&mut self, step: F)
    where
        F: FnMut(&mut SendParams) -> StepResult + Send + 'static,
    {
        self.steps.push(Box::new(step));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn run(&mut self, params: &mut SendParams) -> PipelineVerdict {
        for step in &mut self.steps {
            match step(params) {
                StepResult::Success => {}
                StepResult::Failure => return PipelineVerdict::Discard,
                StepResult::DisconnectClient => return PipelineVerdict::Disconnect,
            }
        }
        PipelineVerdict::Continue
    }
}

impl Default for SendPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[test]
    fn empty_pipeline_continues() {
        let mut pipeline = ReceivePipeline::new();
        let bytes = [1u8];
        let mut reader = ByteReader::new(&bytes);
        let mut params = ReceiveParams {
            uid: 1,
            metadata: Metadata::default(),
            reader: &mut reader,
        };

        assert_eq!(pipeline.run(&mut params), PipelineVerdict::Continue);
    }

    #[test]
    fn steps_run_in_order_and_short_circuit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut pipeline = ReceivePipeline::new();

        let counter = calls.clone();
        pipeline.add_step(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            StepResult::Success
        });
        pipeline.add_step(|_| StepResult::Failure);
        let counter = calls.clone();
        pipeline.add_step(move |_| {
            counter.fetch_add(100, Ordering::Relaxed);
            StepResult::Success
        });

        let bytes = [];
        let mut reader = ByteReader::new(&bytes);
        let mut params = ReceiveParams {
            uid: 1,
            metadata: Metadata::default(),
            reader: &mut reader,
        };

        assert_eq!(pipeline.run(&mut params), PipelineVerdict::Discard);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn disconnect_wins_over_later_steps() {
        let mut pipeline = SendPipeline::new();
        pipeline.add_step(|params| {
            if params.metadata.flag(0) {
                StepResult::DisconnectClient
            } else {
                StepResult::Success
            }
        });

        let mut writer = ByteWriter::new();
        let mut params = SendParams {
            uid: 3,
            metadata: Metadata::with_flags(crate::metadata::MessageType::Default, 0b1),
            writer: &mut writer,
        };
        assert_eq!(pipeline.run(&mut params), PipelineVerdict::Disconnect);

        let mut writer = ByteWriter::new();
        let mut params = SendParams {
            uid: 3,
            metadata: Metadata::default(),
            writer: &mut writer,
        };
        assert_eq!(pipeline.run(&mut params), PipelineVerdict::Continue);
    }

    #[test]
    fn send_steps_may_write_a_prefix() {
        let mut pipeline = SendPipeline::new();
        pipeline.add_step(|params| {
            params.writer.write_byte(0xAA).unwrap();
            StepResult::Success
        });

        let mut writer = ByteWriter::new();
        let mut params = SendParams {
            uid: 1,
            metadata: Metadata::default(),
            writer: &mut writer,
        };
        assert_eq!(pipeline.run(&mut params), PipelineVerdict::Continue);
        assert_eq!(writer.as_slice(), &[0xAA]);
    }
}
