use anyhow::{bail, ensure};

use crate::error::{OptError, OptResult};
use crate::expr::ConstantValue;
use crate::jobgen::{MicroOperatorDescriptor, RuntimeExpression};
use crate::pipeline::{Frame, FrameAppender, FrameWriter, PushRuntime, TuplePrinter};

/// What a factory may use while creating runtimes.
pub struct RuntimeContext<'a> {
    pub frame_size: usize,
    pub provider: &'a dyn RuntimeProvider,
}

/// Creates the runtime of one stage of a pipeline.
pub trait PushRuntimeFactory: std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn create_push_runtime(
        &self,
        ctx: &RuntimeContext,
        output: Box<dyn FrameWriter>,
    ) -> OptResult<PushRuntime>;
}

/// Source of the runtimes this crate does not implement itself, which are the ones that
/// evaluate expressions or functions.
pub trait RuntimeProvider {
    fn runtime_factory(
        &self,
        descriptor: &MicroOperatorDescriptor,
    ) -> OptResult<Box<dyn PushRuntimeFactory>>;

    fn tuple_printer(&self) -> OptResult<Box<dyn TuplePrinter>>;
}

/// Provides nothing.
#[derive(Clone, Debug, Default)]
pub struct DefaultRuntimeProvider;

impl RuntimeProvider for DefaultRuntimeProvider {
    fn runtime_factory(
        &self,
        descriptor: &MicroOperatorDescriptor,
    ) -> OptResult<Box<dyn PushRuntimeFactory>> {
        bail!(OptError::not_implemented(format!(
            "runtime for {}",
            descriptor
        )))
    }

    fn tuple_printer(&self) -> OptResult<Box<dyn TuplePrinter>> {
        bail!(OptError::not_implemented("tuple printer"))
    }
}

/// Factory of the builtin runtime for `descriptor`, if there is one.
pub fn builtin_factory(descriptor: &MicroOperatorDescriptor) -> Option<Box<dyn PushRuntimeFactory>> {
    let factory: Box<dyn PushRuntimeFactory> = match descriptor {
        MicroOperatorDescriptor::EmptyTupleSource => Box::new(EmptyTupleSourceFactory),
        MicroOperatorDescriptor::StreamProject { fields } => Box::new(StreamProjectFactory {
            fields: fields.clone(),
        }),
        MicroOperatorDescriptor::StreamLimit { limit, offset } => Box::new(StreamLimitFactory {
            limit: *limit,
            offset: *offset,
        }),
        MicroOperatorDescriptor::Printer { expressions } => Box::new(PrinterFactory {
            expressions: expressions.clone(),
        }),
        _ => return None,
    };
    Some(factory)
}

#[derive(Clone, Debug)]
pub struct EmptyTupleSourceFactory;

impl PushRuntimeFactory for EmptyTupleSourceFactory {
    fn name(&self) -> &'static str {
        "EmptyTupleSource"
    }

    fn create_push_runtime(
        &self,
        ctx: &RuntimeContext,
        output: Box<dyn FrameWriter>,
    ) -> OptResult<PushRuntime> {
        Ok(Box::new(EmptyTupleSourceRuntime {
            appender: FrameAppender::new(ctx.frame_size, output),
        }))
    }
}

/// Emits a single empty tuple when opened.
#[derive(Debug)]
struct EmptyTupleSourceRuntime {
    appender: FrameAppender,
}

impl FrameWriter for EmptyTupleSourceRuntime {
    fn open(&mut self) -> OptResult<()> {
        self.appender.open()?;
        self.appender.append(vec![])
    }

    fn next_frame(&mut self, _frame: &Frame) -> OptResult<()> {
        bail!("empty tuple source does not accept input frames")
    }

    fn fail(&mut self) -> OptResult<()> {
        self.appender.fail()
    }

    fn close(&mut self) -> OptResult<()> {
        self.appender.close()
    }
}

#[derive(Clone, Debug)]
pub struct StreamProjectFactory {
    pub fields: Vec<usize>,
}

impl PushRuntimeFactory for StreamProjectFactory {
    fn name(&self) -> &'static str {
        "StreamProject"
    }

    fn create_push_runtime(
        &self,
        ctx: &RuntimeContext,
        output: Box<dyn FrameWriter>,
    ) -> OptResult<PushRuntime> {
        Ok(Box::new(StreamProjectRuntime {
            fields: self.fields.clone(),
            appender: FrameAppender::new(ctx.frame_size, output),
        }))
    }
}

#[derive(Debug)]
struct StreamProjectRuntime {
    fields: Vec<usize>,
    appender: FrameAppender,
}

impl FrameWriter for StreamProjectRuntime {
    fn open(&mut self) -> OptResult<()> {
        self.appender.open()
    }

    fn next_frame(&mut self, frame: &Frame) -> OptResult<()> {
        for tuple in frame.tuples() {
            let projected = self
                .fields
                .iter()
                .map(|f| field(tuple, *f))
                .collect::<OptResult<Vec<_>>>()?;
            self.appender.append(projected)?;
        }
        Ok(())
    }

    fn fail(&mut self) -> OptResult<()> {
        self.appender.fail()
    }

    fn close(&mut self) -> OptResult<()> {
        self.appender.close()
    }
}

#[derive(Clone, Debug)]
pub struct StreamLimitFactory {
    pub limit: u64,
    pub offset: u64,
}

impl PushRuntimeFactory for StreamLimitFactory {
    fn name(&self) -> &'static str {
        "StreamLimit"
    }

    fn create_push_runtime(
        &self,
        ctx: &RuntimeContext,
        output: Box<dyn FrameWriter>,
    ) -> OptResult<PushRuntime> {
        Ok(Box::new(StreamLimitRuntime {
            limit: self.limit,
            offset: self.offset,
            seen: 0,
            appender: FrameAppender::new(ctx.frame_size, output),
        }))
    }
}

/// Skips the first `offset` tuples and passes on at most `limit` after them.
#[derive(Debug)]
struct StreamLimitRuntime {
    limit: u64,
    offset: u64,
    seen: u64,
    appender: FrameAppender,
}

impl FrameWriter for StreamLimitRuntime {
    fn open(&mut self) -> OptResult<()> {
        self.seen = 0;
        self.appender.open()
    }

    fn next_frame(&mut self, frame: &Frame) -> OptResult<()> {
        for tuple in frame.tuples() {
            if self.seen >= self.offset.saturating_add(self.limit) {
                break;
            }
            if self.seen >= self.offset {
                self.appender.append(tuple.clone())?;
            }
            self.seen += 1;
        }
        Ok(())
    }

    fn fail(&mut self) -> OptResult<()> {
        self.appender.fail()
    }

    fn close(&mut self) -> OptResult<()> {
        self.appender.close()
    }
}

#[derive(Clone, Debug)]
pub struct PrinterFactory {
    pub expressions: Vec<RuntimeExpression>,
}

impl PushRuntimeFactory for PrinterFactory {
    fn name(&self) -> &'static str {
        "Printer"
    }

    fn create_push_runtime(
        &self,
        ctx: &RuntimeContext,
        output: Box<dyn FrameWriter>,
    ) -> OptResult<PushRuntime> {
        for expr in &self.expressions {
            if let RuntimeExpression::Call { function, .. } = expr {
                bail!(OptError::not_implemented(format!(
                    "printing the result of {}",
                    function
                )));
            }
        }
        Ok(Box::new(PrinterRuntime {
            expressions: self.expressions.clone(),
            printer: ctx.provider.tuple_printer()?,
            output,
            initialized: false,
        }))
    }
}

/// Result sink. Hands every tuple to the printer and nothing to its output.
#[derive(Debug)]
struct PrinterRuntime {
    expressions: Vec<RuntimeExpression>,
    printer: Box<dyn TuplePrinter>,
    output: Box<dyn FrameWriter>,
    initialized: bool,
}

impl FrameWriter for PrinterRuntime {
    fn open(&mut self) -> OptResult<()> {
        if !self.initialized {
            self.printer.init()?;
            self.initialized = true;
        }
        self.output.open()
    }

    fn next_frame(&mut self, frame: &Frame) -> OptResult<()> {
        for tuple in frame.tuples() {
            let printed = self
                .expressions
                .iter()
                .map(|e| match e {
                    RuntimeExpression::Field(f) => field(tuple, *f),
                    RuntimeExpression::Constant(c) => Ok(c.clone()),
                    RuntimeExpression::Call { function, .. } => Err(OptError::not_implemented(
                        format!("printing the result of {}", function),
                    )
                    .into()),
                })
                .collect::<OptResult<Vec<_>>>()?;
            self.printer.print(&printed)?;
        }
        Ok(())
    }

    fn fail(&mut self) -> OptResult<()> {
        self.output.fail()
    }

    fn close(&mut self) -> OptResult<()> {
        self.output.close()
    }
}

fn field(tuple: &[ConstantValue], idx: usize) -> OptResult<ConstantValue> {
    ensure!(
        idx < tuple.len(),
        "field {} out of range of a tuple with {} fields",
        idx,
        tuple.len()
    );
    Ok(tuple[idx].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_kind;
    use crate::pipeline::test_util::*;

    #[test]
    fn test_limit_with_offset() {
        let events = Events::default();
        let ctx = RuntimeContext {
            frame_size: 8,
            provider: &DefaultRuntimeProvider,
        };
        let mut limit = StreamLimitFactory {
            limit: 2,
            offset: 1,
        }
        .create_push_runtime(
            &ctx,
            Box::new(RecordingWriter {
                events: events.clone(),
            }),
        )
        .unwrap();

        let frame = Frame::from_tuples((0..5).map(|i| vec![ConstantValue::Int64(i)]).collect());
        limit.open().unwrap();
        limit.next_frame(&frame).unwrap();
        limit.close().unwrap();

        assert_eq!(
            vec!["open", "frame[[Int64(1)],[Int64(2)]]", "close"],
            *events.borrow()
        );
    }

    #[test]
    fn test_unbounded_limit_with_offset() {
        let events = Events::default();
        let ctx = RuntimeContext {
            frame_size: 8,
            provider: &DefaultRuntimeProvider,
        };
        let mut limit = StreamLimitFactory {
            limit: u64::MAX,
            offset: 3,
        }
        .create_push_runtime(
            &ctx,
            Box::new(RecordingWriter {
                events: events.clone(),
            }),
        )
        .unwrap();

        let frame = Frame::from_tuples((0..5).map(|i| vec![ConstantValue::Int64(i)]).collect());
        limit.open().unwrap();
        limit.next_frame(&frame).unwrap();
        limit.close().unwrap();

        assert_eq!(
            vec!["open", "frame[[Int64(3)],[Int64(4)]]", "close"],
            *events.borrow()
        );
    }

    #[test]
    fn test_default_provider_has_no_evaluators() {
        let err = DefaultRuntimeProvider
            .runtime_factory(&MicroOperatorDescriptor::Assign {
                expressions: vec![RuntimeExpression::Field(0)],
            })
            .unwrap_err();
        assert!(matches!(
            error_kind(&err),
            Some(OptError::NotImplemented(_))
        ));
    }
}
