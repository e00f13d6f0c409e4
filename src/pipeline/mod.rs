//! Push based execution of fused micro operator chains.
//!
//! A [`PipelineDescriptor`](crate::jobgen::PipelineDescriptor) produced by job generation is
//! turned into a chain of runtimes by the [`PipelineAssembler`]. Each runtime writes its
//! results into the next one through in-process calls; only the head of the chain and the
//! final output writer are visible outside the [`FusedPushOperator`].
//!
//! Every writer follows the lifecycle `open → next_frame* → close`, or `fail` followed by
//! `close` on error.

use std::fmt::Debug;

use crate::error::OptResult;
use crate::expr::ConstantValue;

mod assembler;
pub use assembler::*;
mod runtime;
pub use runtime::*;

pub type Tuple = Vec<ConstantValue>;

/// A batch of tuples with a fixed capacity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    tuples: Vec<Tuple>,
    capacity: usize,
}

impl Frame {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            tuples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn from_tuples(tuples: Vec<Tuple>) -> Self {
        let capacity = tuples.len().max(1);
        Self { tuples, capacity }
    }

    pub fn tuples(&self) -> &[Tuple] {
        &self.tuples
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tuples.len() >= self.capacity
    }

    pub fn clear(&mut self) {
        self.tuples.clear();
    }

    fn push(&mut self, tuple: Tuple) {
        self.tuples.push(tuple);
    }
}

/// Receiver of frames.
pub trait FrameWriter: Debug {
    fn open(&mut self) -> OptResult<()>;

    /// The frame is only valid for the duration of the call.
    fn next_frame(&mut self, frame: &Frame) -> OptResult<()>;

    fn fail(&mut self) -> OptResult<()>;

    fn close(&mut self) -> OptResult<()>;
}

/// A micro runtime: a writer that pushes its results to the writer it was created with.
pub type PushRuntime = Box<dyn FrameWriter>;

/// Buffers output tuples of a runtime into one reused frame.
///
/// A full frame is handed to the output immediately. Whatever is buffered when the appender
/// is closed is handed over before the output is closed.
#[derive(Debug)]
pub struct FrameAppender {
    frame: Frame,
    output: Box<dyn FrameWriter>,
}

impl FrameAppender {
    pub fn new(frame_size: usize, output: Box<dyn FrameWriter>) -> Self {
        Self {
            frame: Frame::with_capacity(frame_size),
            output,
        }
    }

    pub fn open(&mut self) -> OptResult<()> {
        self.output.open()
    }

    pub fn append(&mut self, tuple: Tuple) -> OptResult<()> {
        self.frame.push(tuple);
        if self.frame.is_full() {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> OptResult<()> {
        if !self.frame.is_empty() {
            self.output.next_frame(&self.frame)?;
            self.frame.clear();
        }
        Ok(())
    }

    pub fn fail(&mut self) -> OptResult<()> {
        self.frame.clear();
        self.output.fail()
    }

    pub fn close(&mut self) -> OptResult<()> {
        self.flush()?;
        self.output.close()
    }
}

/// Receives the records of a result sink.
pub trait TuplePrinter: Debug {
    /// Called once before the first tuple.
    fn init(&mut self) -> OptResult<()>;

    fn print(&mut self, tuple: &[ConstantValue]) -> OptResult<()>;
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// Shared log of everything a [`RecordingWriter`] saw.
    pub type Events = Rc<RefCell<Vec<String>>>;

    #[derive(Debug)]
    pub struct RecordingWriter {
        pub events: Events,
    }

    impl FrameWriter for RecordingWriter {
        fn open(&mut self) -> OptResult<()> {
            self.events.borrow_mut().push("open".to_string());
            Ok(())
        }

        fn next_frame(&mut self, frame: &Frame) -> OptResult<()> {
            let tuples = frame
                .tuples()
                .iter()
                .map(|t| format!("{:?}", t))
                .collect::<Vec<_>>()
                .join(",");
            self.events.borrow_mut().push(format!("frame[{}]", tuples));
            Ok(())
        }

        fn fail(&mut self) -> OptResult<()> {
            self.events.borrow_mut().push("fail".to_string());
            Ok(())
        }

        fn close(&mut self) -> OptResult<()> {
            self.events.borrow_mut().push("close".to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    #[test]
    fn test_appender_flushes_before_close() {
        let events = Events::default();
        let mut appender = FrameAppender::new(
            2,
            Box::new(RecordingWriter {
                events: events.clone(),
            }),
        );
        appender.open().unwrap();
        for i in 0..3 {
            appender.append(vec![ConstantValue::Int64(i)]).unwrap();
        }
        appender.close().unwrap();

        assert_eq!(
            vec![
                "open",
                "frame[[Int64(0)],[Int64(1)]]",
                "frame[[Int64(2)]]",
                "close"
            ],
            *events.borrow()
        );
    }
}
