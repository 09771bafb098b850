// crates/planruntime/tests/mapper_test.rs

mod common;

use common::{completed, init_tracing, instance, Recorder, Signal};
use plancore::{
    Connector, EngineState, FlowError, Transition, TransitionError, TransitionTemplate, Workplan,
    WorkplanInstance,
};
use planruntime::{DispatchMode, Engine, TransitionMapper};
use plantransitions::{DummyTransition, JoinTransition, SplitTransition, TaskStatus, TaskTransition};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Weld;
struct Paint;

fn task<P: Send + Sync + 'static>(id: u64, parameters: P) -> Arc<dyn Transition> {
    Arc::new(TaskTransition::new(
        TransitionTemplate::new(id, "task").with_input(1),
        parameters,
    ))
}

/// in(1) -> weld(10) -> [done(2, exit), scrap(3, failed)]
fn welding() -> (Arc<WorkplanInstance>, Arc<TaskTransition<Weld>>) {
    let template = TransitionTemplate::new(10, "weld")
        .with_input(1)
        .with_output(2)
        .with_output(3);
    let workplan = Workplan::new("welding")
        .with_connector(Connector::start(1, "in"))
        .with_connector(Connector::exit(2, "done"))
        .with_connector(Connector::failed(3, "scrap"))
        .with_transition(template.clone());
    let weld = Arc::new(TaskTransition::new(template, Weld));
    let instance = instance(workplan, vec![weld.clone() as Arc<dyn Transition>]);
    (instance, weld)
}

#[test]
fn first_registration_wins() {
    init_tracing();
    let mapper = TransitionMapper::synchronous();
    let hits = Arc::new([AtomicUsize::new(0), AtomicUsize::new(0), AtomicUsize::new(0)]);

    let h = Arc::clone(&hits);
    mapper.map::<TaskTransition<Weld>, _>(move |_| {
        h[0].fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let h = Arc::clone(&hits);
    mapper.map::<TaskTransition<Weld>, _>(move |_| {
        h[1].fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let h = Arc::clone(&hits);
    mapper.map::<TaskTransition<Paint>, _>(move |task| {
        assert_eq!(task.id(), 11);
        h[2].fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    assert_eq!(mapper.len(), 3);

    assert!(mapper.dispatch(&task(10, Weld)).unwrap());
    assert!(mapper.dispatch(&task(11, Paint)).unwrap());

    let counts: Vec<usize> = hits.iter().map(|h| h.load(Ordering::SeqCst)).collect();
    assert_eq!(counts, vec![1, 0, 1]);
}

#[test]
fn unmatched_transitions_are_dropped() {
    init_tracing();
    let mapper = TransitionMapper::synchronous();
    let called = Arc::new(AtomicBool::new(false));
    let c = Arc::clone(&called);
    mapper.map::<TaskTransition<Weld>, _>(move |_| {
        c.store(true, Ordering::SeqCst);
        Ok(())
    });

    assert!(!mapper.dispatch(&task(10, Paint)).unwrap());
    let dummy: Arc<dyn Transition> = Arc::new(DummyTransition::new(
        TransitionTemplate::new(11, "dummy").with_input(1),
    ));
    assert!(!mapper.dispatch(&dummy).unwrap());
    assert!(!called.load(Ordering::SeqCst));
}

#[test]
fn dispose_releases_handlers() {
    let mapper = TransitionMapper::synchronous();
    let captured = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&captured);
    mapper.map::<TaskTransition<Weld>, _>(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    assert_eq!(Arc::strong_count(&captured), 2);

    mapper.dispose();
    assert!(mapper.is_empty());
    assert_eq!(Arc::strong_count(&captured), 1);
    assert!(!mapper.dispatch(&task(10, Weld)).unwrap());
    assert_eq!(captured.load(Ordering::SeqCst), 0);
}

#[test]
fn engine_without_handlers_still_completes() {
    init_tracing();
    let x = TransitionTemplate::new(10, "X").with_input(1).with_output(2);
    let workplan = Workplan::new("observed")
        .with_connector(Connector::start(1, "in"))
        .with_connector(Connector::exit(2, "out"))
        .with_transition(x.clone());
    let engine = Engine::new();
    let mapper = Arc::new(TransitionMapper::synchronous());
    engine.subscribe(mapper.clone());
    engine
        .initialize(instance(workplan, vec![Arc::new(DummyTransition::new(x).observable())]))
        .unwrap();

    engine.start().unwrap();
    assert_eq!(engine.state(), EngineState::Completed);
}

#[test]
fn synchronous_handler_completes_task_inline() {
    init_tracing();
    let (instance, weld) = welding();
    let engine = Engine::new();
    let recorder = Arc::new(Recorder::default());
    let mapper = Arc::new(TransitionMapper::synchronous());
    mapper.map::<TaskTransition<Weld>, _>(|task| task.complete(1));
    engine.subscribe(mapper.clone());
    engine.subscribe(recorder.clone());
    engine.initialize(Arc::clone(&instance)).unwrap();

    engine.start().unwrap();

    assert_eq!(engine.state(), EngineState::Completed);
    assert!(instance.place(3).unwrap().has_tokens());
    assert!(!weld.executing());
    assert!(weld.statuses().is_empty());
    assert!(matches!(
        recorder.signals().as_slice(),
        [Signal::Completed(3, _), Signal::Triggered(10)]
    ));
}

#[test]
fn synchronous_handler_error_reaches_the_caller() {
    init_tracing();
    let (instance, weld) = welding();
    let engine = Engine::new();
    let mapper = Arc::new(TransitionMapper::synchronous());
    mapper.map::<TaskTransition<Weld>, _>(|_| {
        Err(TransitionError::ExecutionFailed("electrode worn".to_string()).into())
    });
    engine.subscribe(mapper.clone());
    engine.initialize(Arc::clone(&instance)).unwrap();

    let started = engine.start();
    assert!(matches!(
        started,
        Err(FlowError::Transition(TransitionError::ExecutionFailed(_)))
    ));
    assert_eq!(engine.state(), EngineState::Running);
    assert!(!weld.executing());

    let snapshot = engine.pause().unwrap();
    let entry = snapshot.holder(10).unwrap();
    assert_eq!(entry.tokens.len(), 1);
    let statuses: Vec<TaskStatus> = serde_json::from_value(entry.state.clone()).unwrap();
    assert!(matches!(
        statuses.as_slice(),
        [TaskStatus::Faulted { reason }] if reason.contains("electrode worn")
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn asynchronous_handler_completes_task() {
    init_tracing();
    let (instance, _weld) = welding();
    let engine = Engine::new();
    let mut events = engine.events();
    let mapper = Arc::new(TransitionMapper::asynchronous(tokio::runtime::Handle::current()));
    assert!(matches!(mapper.mode(), DispatchMode::Asynchronous(_)));
    mapper.map::<TaskTransition<Weld>, _>(|task| {
        std::thread::sleep(Duration::from_millis(20));
        task.complete(0)
    });
    engine.subscribe(mapper.clone());
    engine.initialize(Arc::clone(&instance)).unwrap();

    engine.start().unwrap();
    completed(&mut events).await;

    assert_eq!(engine.state(), EngineState::Completed);
    assert!(instance.place(2).unwrap().has_tokens());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pause_waits_for_running_handler() {
    init_tracing();
    let (instance, weld) = welding();
    let engine = Arc::new(Engine::new());
    let mut events = engine.events();
    let finished = Arc::new(AtomicBool::new(false));
    let (started_tx, started_rx) = std::sync::mpsc::channel();

    let mapper = Arc::new(TransitionMapper::asynchronous(tokio::runtime::Handle::current()));
    let done = Arc::clone(&finished);
    mapper.map::<TaskTransition<Weld>, _>(move |task| {
        let _ = started_tx.send(());
        std::thread::sleep(Duration::from_millis(100));
        done.store(true, Ordering::SeqCst);
        task.complete(0)
    });
    engine.subscribe(mapper.clone());
    engine.initialize(Arc::clone(&instance)).unwrap();
    engine.start().unwrap();

    tokio::task::spawn_blocking(move || started_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let pausing = Arc::clone(&engine);
    let snapshot = tokio::task::spawn_blocking(move || pausing.pause())
        .await
        .unwrap()
        .unwrap();

    assert!(finished.load(Ordering::SeqCst), "pause returned mid-fire");
    assert_eq!(engine.state(), EngineState::Paused);
    assert!(!weld.executing());
    assert!(!instance.place(2).unwrap().has_tokens());
    let entry = snapshot.holder(10).unwrap();
    assert_eq!(entry.tokens.len(), 1);
    assert_eq!(weld.statuses(), vec![TaskStatus::Completed { result: 0 }]);

    engine.start().unwrap();
    completed(&mut events).await;
    assert_eq!(engine.state(), EngineState::Completed);
    assert!(instance.place(2).unwrap().has_tokens());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn held_result_survives_restore() {
    init_tracing();
    let (first, weld) = welding();
    let engine = Engine::new();
    engine.initialize(Arc::clone(&first)).unwrap();
    engine.start().unwrap();

    // No handler is mapped; finish the work by hand while paused.
    assert!(weld.executing());
    weld.pause();
    weld.complete(1).unwrap();
    let snapshot = engine.pause().unwrap();
    assert_eq!(engine.state(), EngineState::Paused);

    let (second, _) = welding();
    let restored = Engine::new();
    let mut events = restored.events();
    restored.initialize(Arc::clone(&second)).unwrap();
    restored.restore(snapshot).unwrap();
    restored.start().unwrap();

    match completed(&mut events).await {
        plancore::EngineEvent::Completed { place_id, .. } => assert_eq!(place_id, 3),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(second.place(3).unwrap().has_tokens());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn asynchronous_failure_goes_to_fault_channel() {
    init_tracing();
    let (instance, weld) = welding();
    let engine = Engine::new();
    let mapper = Arc::new(TransitionMapper::asynchronous(tokio::runtime::Handle::current()));
    let mut faults = mapper.take_faults().unwrap();
    assert!(mapper.take_faults().is_none());
    mapper.map::<TaskTransition<Weld>, _>(|_| {
        Err(TransitionError::ExecutionFailed("gas supply empty".to_string()).into())
    });
    engine.subscribe(mapper.clone());
    engine.initialize(Arc::clone(&instance)).unwrap();

    engine.start().unwrap();
    let fault = tokio::time::timeout(Duration::from_secs(5), faults.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(fault.transition_id, 10);
    assert_eq!(fault.transition_name, "weld");
    assert!(matches!(
        fault.error,
        FlowError::Transition(TransitionError::ExecutionFailed(_))
    ));
    assert!(!weld.executing());
    assert!(matches!(
        weld.statuses().as_slice(),
        [TaskStatus::Faulted { .. }]
    ));
    assert_eq!(engine.state(), EngineState::Running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn handlers_of_one_transition_run_one_at_a_time() {
    init_tracing();
    let a = TransitionTemplate::new(10, "feed-a").with_input(1).with_output(3);
    let b = TransitionTemplate::new(11, "feed-b").with_input(2).with_output(3);
    let weld = TransitionTemplate::new(12, "weld").with_input(3).with_output(4);
    let workplan = Workplan::new("two-feeds")
        .with_connector(Connector::start(1, "a"))
        .with_connector(Connector::start(2, "b"))
        .with_connector(Connector::intermediate(3, "queue"))
        .with_connector(Connector::exit(4, "done"))
        .with_transition(a.clone())
        .with_transition(b.clone())
        .with_transition(weld.clone());
    let instance = instance(
        workplan,
        vec![
            Arc::new(DummyTransition::new(a)),
            Arc::new(DummyTransition::new(b)),
            Arc::new(TaskTransition::new(weld, Weld)),
        ],
    );

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));
    let mapper = Arc::new(TransitionMapper::asynchronous(tokio::runtime::Handle::current()));
    {
        let (active, peak, runs) = (active.clone(), peak.clone(), runs.clone());
        mapper.map::<TaskTransition<Weld>, _>(move |task| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            active.fetch_sub(1, Ordering::SeqCst);
            runs.fetch_add(1, Ordering::SeqCst);
            task.complete(0)
        });
    }

    let engine = Engine::new();
    let mut events = engine.events();
    engine.subscribe(mapper.clone());
    engine.initialize(Arc::clone(&instance)).unwrap();
    engine.start().unwrap();
    completed(&mut events).await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while runs.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(instance.place(4).unwrap().tokens().len(), 2);
    assert_eq!(engine.state(), EngineState::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn equal_ids_in_separate_instances_run_side_by_side() {
    init_tracing();
    let (first, _) = welding();
    let (second, _) = welding();

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mapper = Arc::new(TransitionMapper::asynchronous(tokio::runtime::Handle::current()));
    {
        let (active, peak) = (active.clone(), peak.clone());
        mapper.map::<TaskTransition<Weld>, _>(move |task| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            // Give the other instance's weld a chance to start alongside.
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            while active.load(Ordering::SeqCst) < 2 && std::time::Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            peak.fetch_max(active.load(Ordering::SeqCst), Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            active.fetch_sub(1, Ordering::SeqCst);
            task.complete(0)
        });
    }

    let left = Engine::new();
    let right = Engine::new();
    let mut left_events = left.events();
    let mut right_events = right.events();
    left.subscribe(mapper.clone());
    right.subscribe(mapper.clone());
    left.initialize(Arc::clone(&first)).unwrap();
    right.initialize(Arc::clone(&second)).unwrap();

    left.start().unwrap();
    right.start().unwrap();
    completed(&mut left_events).await;
    completed(&mut right_events).await;

    assert_eq!(peak.load(Ordering::SeqCst), 2, "welds of separate instances were serialized");
    assert!(first.place(2).unwrap().has_tokens());
    assert!(second.place(2).unwrap().has_tokens());
}

struct Station(u64);

const STATIONS: u64 = 8;

/// in(1) -> split(10) -> feed 2..=9 -> station 20..=27 -> sink 30..=37
/// sink 30..=37 -> join(40) -> out(50, exit)
fn stations() -> Arc<WorkplanInstance> {
    let mut split = TransitionTemplate::new(10, "split").with_input(1);
    let mut join = TransitionTemplate::new(40, "join").with_output(50);
    let mut workplan = Workplan::new("stations")
        .with_connector(Connector::start(1, "in"))
        .with_connector(Connector::exit(50, "out"));
    let mut transitions: Vec<Arc<dyn Transition>> = Vec::new();

    for n in 0..STATIONS {
        let (feed, sink) = (2 + n, 30 + n);
        split = split.with_output(feed);
        join = join.with_input(sink);
        let station = TransitionTemplate::new(20 + n, format!("station-{n}"))
            .with_input(feed)
            .with_output(sink);
        workplan = workplan
            .with_connector(Connector::intermediate(feed, format!("feed-{n}")))
            .with_connector(Connector::intermediate(sink, format!("sink-{n}")))
            .with_transition(station.clone());
        transitions.push(Arc::new(TaskTransition::new(station, Station(n))));
    }

    workplan = workplan
        .with_transition(split.clone())
        .with_transition(join.clone());
    transitions.push(Arc::new(SplitTransition::new(split)));
    transitions.push(Arc::new(JoinTransition::new(join)));
    instance(workplan, transitions)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pausing_a_split_mid_flight_keeps_every_branch() {
    init_tracing();

    for offset in [0u64, 20, 50, 80] {
        let instance = stations();
        let engine = Arc::new(Engine::new());
        let mut events = engine.events();
        let recorder = Arc::new(Recorder::default());
        let runs = Arc::new(AtomicUsize::new(0));
        let mapper = Arc::new(TransitionMapper::asynchronous(tokio::runtime::Handle::current()));
        {
            let runs = runs.clone();
            mapper.map::<TaskTransition<Station>, _>(move |task| {
                std::thread::sleep(Duration::from_millis(15 * (task.parameters().0 + 1)));
                runs.fetch_add(1, Ordering::SeqCst);
                task.complete(0)
            });
        }
        engine.subscribe(mapper.clone());
        engine.subscribe(recorder.clone());
        engine.initialize(Arc::clone(&instance)).unwrap();
        engine.start().unwrap();

        tokio::time::sleep(Duration::from_millis(offset)).await;
        let pausing = Arc::clone(&engine);
        let snapshot = tokio::task::spawn_blocking(move || pausing.pause())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(engine.state(), EngineState::Paused);
        assert_eq!(snapshot.token_count(), STATIONS as usize, "paused after {offset}ms");
        assert!(!instance.place(50).unwrap().has_tokens());

        engine.start().unwrap();
        completed(&mut events).await;

        assert_eq!(engine.state(), EngineState::Completed);
        assert_eq!(runs.load(Ordering::SeqCst), STATIONS as usize);
        let sinks: HashSet<u64> = recorder
            .signals()
            .into_iter()
            .filter_map(|signal| match signal {
                Signal::Reached(place, _) if (30..30 + STATIONS).contains(&place) => Some(place),
                _ => None,
            })
            .collect();
        assert_eq!(sinks.len(), STATIONS as usize, "every branch reached its sink");
        assert_eq!(instance.place(50).unwrap().tokens().len(), 1);
        assert!(instance.place(50).unwrap().tokens()[0].is_main());
    }
}
