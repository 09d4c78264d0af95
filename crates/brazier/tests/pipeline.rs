use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use brazier::{
    EngineError, FakeEngine, InferEngine, PipelineConfig, PipelineError, WorkItem, WorkerId,
    WorkerPool, WorkerState,
};

/// Writes the sum of each input sample into the first output slot of that sample.
struct RowSum;

impl InferEngine for RowSum {
    fn infer(&mut self, item: &mut WorkItem) -> Result<(), EngineError> {
        let shape = item.shape();
        let (input, output) = item.buffers_mut();
        for sample in 0..shape.batch_size {
            let row = &input[sample * shape.input_size..(sample + 1) * shape.input_size];
            output[sample * shape.output_size] = row.iter().sum();
        }
        Ok(())
    }
}

fn row_sum(_: WorkerId) -> Result<RowSum, EngineError> {
    Ok(RowSum)
}

#[test]
fn two_workers_ten_items() {
    let mut pool = WorkerPool::new(PipelineConfig::new(2, 4, 3, 1), row_sum).unwrap();
    pool.start_all().unwrap();

    let requests = pool.request_queue();
    let factory = pool.item_factory();
    for _ in 0..10 {
        requests.push(factory.create(true)).unwrap();
    }

    let report = pool.shutdown();
    assert!(report.is_clean());
    assert_eq!(report.workers.len(), 2);
    assert_eq!(report.processed(), 10);

    let responses = pool.response_queue();
    let mut count = 0;
    while let Ok(item) = responses.pop() {
        for sample in 0..item.batch_size() {
            let expected: f32 = item.sample_input(sample).iter().sum();
            assert!((item.sample_output(sample)[0] - expected).abs() < 1e-5);
        }
        count += 1;
    }
    assert_eq!(count, 10);
}

#[test]
fn concurrent_producers_lose_nothing() {
    let mut pool = WorkerPool::new(
        PipelineConfig::new(4, 1, 8, 8).with_request_capacity(Some(4)),
        |_: WorkerId| Ok::<_, EngineError>(FakeEngine::new()),
    )
    .unwrap();
    pool.start_all().unwrap();

    let producers: Vec<_> = (0..3)
        .map(|_| {
            let requests = pool.request_queue();
            let factory = pool.item_factory();
            thread::spawn(move || {
                (0..100)
                    .map(|_| {
                        let item = factory.create(false);
                        let id = item.id();
                        requests.push(item).unwrap();
                        id
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let responses = pool.response_queue();
    let consumer = thread::spawn(move || {
        let mut seen = HashSet::new();
        while let Ok(item) = responses.pop() {
            assert!(seen.insert(item.id()), "duplicate delivery");
        }
        seen
    });

    let mut submitted = HashSet::new();
    for producer in producers {
        submitted.extend(producer.join().unwrap());
    }

    let report = pool.shutdown();
    assert_eq!(report.processed(), 300);
    assert_eq!(consumer.join().unwrap(), submitted);
}

#[test]
fn shutdown_never_waits_on_consumers() {
    let mut pool = WorkerPool::new(
        PipelineConfig::new(3, 1, 1, 1).with_close_response_on_shutdown(false),
        |_: WorkerId| Ok::<_, EngineError>(FakeEngine::new()),
    )
    .unwrap();
    pool.start_all().unwrap();

    let factory = pool.item_factory();
    for _ in 0..200 {
        pool.request_queue().push(factory.create(false)).unwrap();
    }

    let report = pool.shutdown();
    assert_eq!(report.processed(), 200);
    assert_eq!(pool.response_queue().len(), 200);
    assert_eq!(pool.worker_states(), vec![WorkerState::Stopped; 3]);
}

#[test]
fn engines_are_built_on_their_own_thread() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    let main_thread = thread::current().id();

    let mut pool = WorkerPool::new(PipelineConfig::new(3, 1, 1, 1), move |id: WorkerId| {
        assert_ne!(thread::current().id(), main_thread);
        assert_eq!(id.pool_size(), 3);
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, EngineError>(FakeEngine::new())
    })
    .unwrap();
    assert_eq!(built.load(Ordering::SeqCst), 0, "no engine before start");

    pool.start_all().unwrap();
    assert!(pool.shutdown().is_clean());
    assert_eq!(built.load(Ordering::SeqCst), 3);
}

#[test]
fn engine_fault_surfaces_as_error() {
    struct Broken;

    impl InferEngine for Broken {
        fn infer(&mut self, _: &mut WorkItem) -> Result<(), EngineError> {
            Err(EngineError::Device("device lost".to_string()))
        }
    }

    let mut pool = WorkerPool::new(
        PipelineConfig::new(1, 1, 1, 1),
        |_: WorkerId| Ok::<_, EngineError>(Broken),
    )
    .unwrap();
    let factory = pool.item_factory();
    pool.request_queue().push(factory.create(false)).unwrap();
    pool.start_all().unwrap();

    let err = pool.shutdown().into_result().unwrap_err();
    assert!(matches!(err, PipelineError::Engine { .. }));
    assert_eq!(err.to_string(), "worker 00/01: device error: device lost");
}
