use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use storepart::*;
use storepart_host::*;

fn container() -> Arc<dyn Container> {
    Arc::new(Store::builder(HostConfig::default()).build().unwrap())
}

fn sleeper(id: &str) -> EffectRoutine {
    EffectRoutine::new(id, |_container| {
        async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, EffectError>(())
        }
        .boxed()
        .into()
    })
}

#[tokio::test(start_paused = true)]
async fn routines_run_once_per_id() {
    storepart_host::trace::test_run().ok();
    let runner = EffectRunner::new();
    let routine = sleeper("sleepy");
    assert!(runner.run(&routine, container()).unwrap());
    assert!(!runner.run(&routine, container()).unwrap());
    assert!(runner.run(&sleeper("other"), container()).unwrap());
    assert_eq!(runner.running(), vec!["other".to_string(), "sleepy".to_string()]);

    runner.shutdown();
    assert!(!runner.is_running("sleepy"));
    assert!(runner.running().is_empty());
}

#[tokio::test(start_paused = true)]
async fn finished_routines_can_run_again() {
    storepart_host::trace::test_run().ok();
    let runner = EffectRunner::new();
    let mut outcomes = runner.take_outcomes().unwrap();
    let routine = EffectRoutine::new("quick", |_container| {
        async move { Ok::<_, EffectError>(()) }.boxed().into()
    });

    assert!(runner.run(&routine, container()).unwrap());
    assert!(matches!(
        outcomes.next().await,
        Some(EffectOutcome::Completed(ref id)) if id == "quick"
    ));
    assert!(runner.run(&routine, container()).unwrap());
    assert_eq!(outcomes.next().await.unwrap().routine(), "quick");
}

#[tokio::test(start_paused = true)]
async fn failures_and_panics_are_reported() {
    storepart_host::trace::test_run().ok();
    let runner = EffectRunner::new();
    let mut outcomes = runner.take_outcomes().unwrap();

    let failing = EffectRoutine::new("failing", |_container| {
        async move { Err::<(), _>(EffectError::ChannelClosed) }.boxed().into()
    });
    runner.run(&failing, container()).unwrap();
    assert!(matches!(
        outcomes.next().await,
        Some(EffectOutcome::Failed(ref id, EffectError::ChannelClosed)) if id == "failing"
    ));

    let panicking = EffectRoutine::new("panicking", |_container| {
        async move {
            if true {
                panic!("oops");
            }
            Ok::<_, EffectError>(())
        }
        .boxed()
        .into()
    });
    runner.run(&panicking, container()).unwrap();
    assert!(matches!(
        outcomes.next().await,
        Some(EffectOutcome::Panicked(ref id)) if id == "panicking"
    ));
}

#[test]
fn routines_need_a_runtime() {
    storepart_host::trace::test_run().ok();
    let runner = EffectRunner::new();
    assert!(matches!(
        runner.run(&sleeper("sleepy"), container()),
        Err(HostError::NoRuntime)
    ));
}
