use parking_lot::Mutex;
use singleton_factory::{args, ArgSpec, FactoryError, FactoryObserver, LoggingObserver, SingletonFactory, Value};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl FactoryObserver for Recorder {
    fn constructing(&self, factory: &str, key: &str) {
        self.events.lock().push(format!("{} constructing {}", factory, key));
    }

    fn constructed(&self, factory: &str, key: &str, _duration: Duration) {
        self.events.lock().push(format!("{} constructed {}", factory, key));
    }

    fn reused(&self, factory: &str, key: &str) {
        self.events.lock().push(format!("{} reused {}", factory, key));
    }

    fn failed(&self, factory: &str, error: &FactoryError) {
        self.events.lock().push(format!("{} failed: {}", factory, error));
    }
}

fn recorded_factory(recorder: Arc<Recorder>) -> SingletonFactory<i64> {
    SingletonFactory::builder(|args: &[Value]| match args[0].as_i64() {
        Some(n) if n >= 0 => Ok(n),
        _ => Err("negative".into()),
    })
    .name("numbers")
    .spec(ArgSpec::from_tokens(["literal"]))
    .observer(recorder)
    .observer(Arc::new(LoggingObserver::new()))
    .build()
    .unwrap()
}

#[test]
fn test_observer_sees_call_outcomes() {
    let recorder = Arc::new(Recorder::default());
    let numbers = recorded_factory(recorder.clone());

    numbers.call(&args![1]).unwrap();
    numbers.call(&args![1]).unwrap();
    numbers.call(&args![-1]).unwrap_err();

    assert_eq!(
        *recorder.events.lock(),
        vec![
            "numbers constructing i1".to_string(),
            "numbers constructed i1".to_string(),
            "numbers reused i1".to_string(),
            "numbers constructing i-1".to_string(),
            "numbers failed: Construction of i64 failed: negative".to_string(),
        ]
    );
}

#[test]
fn test_metrics_snapshot() {
    let numbers = recorded_factory(Arc::new(Recorder::default()));

    numbers.call(&args![1]).unwrap();
    numbers.call(&args![1]).unwrap();
    numbers.call(&args![2]).unwrap();
    numbers.call(&args![-5]).unwrap_err();
    numbers.get(&args![3]).unwrap();

    let metrics = numbers.metrics();
    assert_eq!(metrics.calls, 4);
    assert_eq!(metrics.hits, 1);
    assert_eq!(metrics.misses, 3);
    assert_eq!(metrics.failed_constructions, 1);
    assert_eq!(metrics.failed_calls, 1);
    assert_eq!(metrics.instances, 2);
    assert_eq!(metrics.constructions.count, 2);
    assert!((metrics.hit_ratio() - 0.25).abs() < f64::EPSILON);
}

#[test]
fn test_logging_observer_emits_events() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let numbers = SingletonFactory::builder(|_: &[Value]| Ok(0u8))
            .observer(Arc::new(LoggingObserver::with_prefix("test")))
            .build()
            .unwrap();
        numbers.call(&args!["a"]).unwrap();
        numbers.call(&args!["a"]).unwrap();
        assert_eq!(numbers.len(), 1);
    });
}

struct CallingBack {
    factory: Arc<OnceLock<SingletonFactory<i64>>>,
    seen: Mutex<Vec<String>>,
}

impl FactoryObserver for CallingBack {
    fn constructing(&self, _factory: &str, key: &str) {
        let Some(factory) = self.factory.get() else { return };
        let found = factory.singleton(key).is_some();
        let nested = match factory.call(&args![7]) {
            Err(FactoryError::Reentrant(name)) => format!("reentrant {}", name),
            other => format!("unexpected {:?}", other.map(|n| *n)),
        };
        let len = factory.len();
        self.seen.lock().push(format!("{} {} {} {}", key, found, nested, len));
    }
}

#[test]
fn test_constructing_observer_calling_back() {
    let slot = Arc::new(OnceLock::new());
    let observer = Arc::new(CallingBack {
        factory: slot.clone(),
        seen: Mutex::new(Vec::new()),
    });

    let numbers = SingletonFactory::builder(|args: &[Value]| Ok(args[0].as_i64().unwrap_or_default()))
        .name("numbers")
        .spec(ArgSpec::from_tokens(["literal"]))
        .observer(observer.clone())
        .build()
        .unwrap();
    slot.set(numbers.clone()).unwrap();

    let worker = numbers.clone();
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(worker.call(&args![1]).map(|n| *n));
    });

    let result = rx.recv_timeout(Duration::from_secs(5)).expect("call deadlocked");
    assert_eq!(result.unwrap(), 1);
    assert_eq!(*observer.seen.lock(), vec!["i1 false reentrant numbers 0".to_string()]);
    assert_eq!(numbers.keys(), vec!["i1".to_string()]);
}
