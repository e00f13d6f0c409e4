use std::cell::RefCell;
use std::rc::Rc;

use algebra_opt_framework::context::OptimizationContext;
use algebra_opt_framework::error::{error_kind, OptError, OptResult};
use algebra_opt_framework::expr::{ConstantValue, LogicalExpression};
use algebra_opt_framework::heuristic::HeuristicOptimizer;
use algebra_opt_framework::jobgen::{
    JobGraphBuilder, MicroOperatorDescriptor, OperatorDescriptor, PipelineDescriptor,
    PlanCompiler, RuntimeExpression,
};
use algebra_opt_framework::pipeline::{
    Frame, FrameWriter, PipelineAssembler, PushRuntimeFactory, RuntimeProvider, TuplePrinter,
};
use algebra_opt_framework::plan::LogicalPlanBuilder;

type Log = Rc<RefCell<Vec<String>>>;

#[derive(Debug)]
struct Sink {
    log: Log,
}

impl FrameWriter for Sink {
    fn open(&mut self) -> OptResult<()> {
        self.log.borrow_mut().push("open".to_string());
        Ok(())
    }

    fn next_frame(&mut self, frame: &Frame) -> OptResult<()> {
        self.log
            .borrow_mut()
            .push(format!("frame of {}", frame.len()));
        Ok(())
    }

    fn fail(&mut self) -> OptResult<()> {
        self.log.borrow_mut().push("fail".to_string());
        Ok(())
    }

    fn close(&mut self) -> OptResult<()> {
        self.log.borrow_mut().push("close".to_string());
        Ok(())
    }
}

#[derive(Debug)]
struct LogPrinter {
    log: Log,
}

impl TuplePrinter for LogPrinter {
    fn init(&mut self) -> OptResult<()> {
        self.log.borrow_mut().push("init".to_string());
        Ok(())
    }

    fn print(&mut self, tuple: &[ConstantValue]) -> OptResult<()> {
        self.log.borrow_mut().push(format!("print {:?}", tuple));
        Ok(())
    }
}

/// Provides a printer and nothing else.
struct PrintingProvider {
    log: Log,
}

impl RuntimeProvider for PrintingProvider {
    fn runtime_factory(
        &self,
        descriptor: &MicroOperatorDescriptor,
    ) -> OptResult<Box<dyn PushRuntimeFactory>> {
        Err(OptError::not_implemented(format!("runtime for {}", descriptor)).into())
    }

    fn tuple_printer(&self) -> OptResult<Box<dyn TuplePrinter>> {
        Ok(Box::new(LogPrinter {
            log: self.log.clone(),
        }))
    }
}

fn constant_result_pipeline() -> PipelineDescriptor {
    let mut builder = LogicalPlanBuilder::new();
    builder
        .empty_tuple_source()
        .distribute_result(vec![LogicalExpression::constant(1)]);
    let mut plan = builder.build();
    let mut ctx = OptimizationContext::default();
    HeuristicOptimizer::default()
        .optimize(&mut plan, &mut ctx)
        .unwrap();
    let spec = PlanCompiler::with_context(&plan, &ctx)
        .compile(JobGraphBuilder::with_config(ctx.config()))
        .unwrap();

    assert_eq!(1, spec.node_count());
    assert_eq!(0, spec.edge_count());
    match &spec.node(spec.roots()[0]).descriptor.descriptor {
        OperatorDescriptor::Pipeline(pipeline) => pipeline.clone(),
        other => panic!("expected a pipeline, got {}", other),
    }
}

#[test]
fn test_constant_query_runs_as_one_pipeline() {
    let pipeline = constant_result_pipeline();
    assert_eq!(
        vec![
            MicroOperatorDescriptor::EmptyTupleSource,
            MicroOperatorDescriptor::Printer {
                expressions: vec![RuntimeExpression::Constant(ConstantValue::Int64(1))]
            },
        ],
        pipeline.operators
    );

    let printed = Log::default();
    let provider = PrintingProvider {
        log: printed.clone(),
    };
    let sink = Log::default();
    let mut fused = PipelineAssembler::new(&provider, 8)
        .assemble(&pipeline, Box::new(Sink { log: sink.clone() }))
        .unwrap();
    assert_eq!(2, fused.stages());
    fused.run_source().unwrap();

    assert_eq!(vec!["init", "print [Int64(1)]"], *printed.borrow());
    // The printer is the end of the line: its output sees the lifecycle but no tuples.
    assert_eq!(vec!["open", "close"], *sink.borrow());
}

#[test]
fn test_missing_printer_is_not_implemented() {
    let pipeline = constant_result_pipeline();
    let err = PipelineAssembler::default()
        .assemble(&pipeline, Box::new(Sink { log: Log::default() }))
        .unwrap_err();
    assert!(matches!(
        error_kind(&err),
        Some(OptError::NotImplemented(_))
    ));
}

#[test]
fn test_limit_stops_after_enough_tuples() {
    let pipeline = PipelineDescriptor {
        operators: vec![MicroOperatorDescriptor::StreamLimit {
            limit: 3,
            offset: 0,
        }],
        input_layout: vec![],
        layouts: vec![vec![]],
    };
    let sink = Log::default();
    let mut fused = PipelineAssembler::default()
        .assemble(&pipeline, Box::new(Sink { log: sink.clone() }))
        .unwrap();

    let frame = Frame::from_tuples((0..5).map(|i| vec![ConstantValue::Int64(i)]).collect());
    fused.open().unwrap();
    fused.next_frame(&frame).unwrap();
    fused.next_frame(&frame).unwrap();
    fused.close().unwrap();
    assert_eq!(vec!["open", "frame of 3", "close"], *sink.borrow());
}
