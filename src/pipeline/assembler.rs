use anyhow::ensure;
use log::debug;

use crate::error::OptResult;
use crate::jobgen::PipelineDescriptor;
use crate::pipeline::{
    builtin_factory, DefaultRuntimeProvider, Frame, FrameWriter, PushRuntime, PushRuntimeFactory,
    RuntimeContext, RuntimeProvider,
};

/// Turns pipeline descriptors into runnable runtime chains.
pub struct PipelineAssembler<'a> {
    provider: &'a dyn RuntimeProvider,
    frame_size: usize,
}

impl Default for PipelineAssembler<'static> {
    fn default() -> Self {
        Self {
            provider: &DefaultRuntimeProvider,
            frame_size: 32,
        }
    }
}

impl<'a> PipelineAssembler<'a> {
    pub fn new(provider: &'a dyn RuntimeProvider, frame_size: usize) -> Self {
        Self {
            provider,
            frame_size: frame_size.max(1),
        }
    }

    /// Factories of every stage, builtin runtimes first and the provider otherwise.
    pub fn factories(
        &self,
        pipeline: &PipelineDescriptor,
    ) -> OptResult<Vec<Box<dyn PushRuntimeFactory>>> {
        pipeline
            .operators
            .iter()
            .map(|micro| match builtin_factory(micro) {
                Some(factory) => Ok(factory),
                None => self.provider.runtime_factory(micro),
            })
            .collect()
    }

    /// Wires the stages of `pipeline` so that each writes into the next and the last one
    /// writes into `output`.
    pub fn assemble(
        &self,
        pipeline: &PipelineDescriptor,
        output: Box<dyn FrameWriter>,
    ) -> OptResult<FusedPushOperator> {
        let factories = self.factories(pipeline)?;
        ensure!(!factories.is_empty(), "cannot assemble an empty pipeline");

        let ctx = RuntimeContext {
            frame_size: self.frame_size,
            provider: self.provider,
        };
        let mut head: PushRuntime = output;
        for factory in factories.iter().rev() {
            head = factory.create_push_runtime(&ctx, head)?;
        }
        debug!(
            "Assembled pipeline of {}",
            factories.iter().map(|f| f.name()).collect::<Vec<_>>().join(" -> ")
        );
        Ok(FusedPushOperator {
            head,
            stages: factories.len(),
        })
    }
}

/// A linear chain of runtimes that behaves as a single writer.
#[derive(Debug)]
pub struct FusedPushOperator {
    head: PushRuntime,
    stages: usize,
}

impl FusedPushOperator {
    pub fn stages(&self) -> usize {
        self.stages
    }

    /// Drives a chain whose head produces tuples on its own, such as an empty tuple source.
    pub fn run_source(&mut self) -> OptResult<()> {
        if let Err(e) = self.head.open() {
            self.head.fail()?;
            self.head.close()?;
            return Err(e);
        }
        self.head.close()
    }
}

impl FrameWriter for FusedPushOperator {
    fn open(&mut self) -> OptResult<()> {
        self.head.open()
    }

    fn next_frame(&mut self, frame: &Frame) -> OptResult<()> {
        self.head.next_frame(frame)
    }

    fn fail(&mut self) -> OptResult<()> {
        self.head.fail()
    }

    fn close(&mut self) -> OptResult<()> {
        self.head.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ConstantValue, LogicalVariable};
    use crate::jobgen::MicroOperatorDescriptor;
    use crate::pipeline::test_util::*;

    #[test]
    fn test_fused_chain_flushes_on_close() {
        let var = LogicalVariable::new;
        let pipeline = PipelineDescriptor {
            operators: vec![
                MicroOperatorDescriptor::StreamProject { fields: vec![1] },
                MicroOperatorDescriptor::StreamLimit {
                    limit: 10,
                    offset: 0,
                },
            ],
            input_layout: vec![var(1), var(2)],
            layouts: vec![vec![var(2)], vec![var(2)]],
        };
        let events = Events::default();
        let assembler = PipelineAssembler::default();
        let mut fused = assembler
            .assemble(
                &pipeline,
                Box::new(RecordingWriter {
                    events: events.clone(),
                }),
            )
            .unwrap();
        assert_eq!(2, fused.stages());

        let frame = Frame::from_tuples(vec![
            vec![ConstantValue::Int64(1), ConstantValue::Int64(10)],
            vec![ConstantValue::Int64(2), ConstantValue::Int64(20)],
        ]);
        fused.open().unwrap();
        fused.next_frame(&frame).unwrap();
        assert_eq!(vec!["open"], *events.borrow());

        fused.close().unwrap();
        assert_eq!(
            vec!["open", "frame[[Int64(10)],[Int64(20)]]", "close"],
            *events.borrow()
        );
    }
}
