use std::time::Duration;

use futures::FutureExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use storepart::*;
use storepart_host::api::*;
use storepart_host::*;

fn settings(registry: &DomainRegistry) -> Slice {
    Slice::builder("settings")
        .field("theme", "light")
        .reducer("setTheme", ReducerOptions::new(), |a, args| {
            a.set("theme", args.arg(0).cloned().unwrap_or_default())
        })
        .build(registry)
        .unwrap()
}

#[tokio::test]
async fn registration_needs_a_current_store() {
    storepart_host::trace::test_run().ok();
    let slice = settings(&DomainRegistry::new());
    let err = register_slice(&slice).unwrap_err();
    assert!(matches!(err, HostError::NoCurrentContainer));
    assert!(err.to_string().contains("outside of a store scope"));
    assert!(matches!(get_store(), Err(HostError::NoCurrentContainer)));
}

#[tokio::test]
async fn registration_targets_the_task_store() {
    storepart_host::trace::test_run().ok();
    let registry = DomainRegistry::new();
    let slice = settings(&registry);
    let store = Store::builder(HostConfig::default()).build().unwrap();

    TaskContainer::scope(store.clone(), async {
        register_slice(&slice).unwrap();
        // registering twice is fine, it is the same reducer
        register_reducer(slice.reducer()).unwrap();
        get_store()
            .unwrap()
            .dispatch(slice.action("setTheme").unwrap().create(json!("dark")))
            .unwrap();
    })
    .await;

    assert_eq!(store.snapshot_json(), json!({ "settings": { "theme": "dark" } }));
    assert!(matches!(get_store(), Err(HostError::NoCurrentContainer)));
}

#[tokio::test(flavor = "multi_thread")]
async fn each_task_sees_its_own_store() {
    storepart_host::trace::test_run().ok();
    let registry = DomainRegistry::new();
    let slice = settings(&registry);
    let stores: Vec<Store> = (0..4)
        .map(|_| Store::builder(HostConfig::default()).slice(&slice).build().unwrap())
        .collect();

    let tasks: Vec<_> = stores
        .iter()
        .enumerate()
        .map(|(i, store)| {
            let action = slice.action("setTheme").unwrap().create(json!(i));
            tokio::spawn(TaskContainer::scope(store.clone(), async move {
                tokio::task::yield_now().await;
                get_store().unwrap().dispatch(action).unwrap();
            }))
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    for (i, store) in stores.iter().enumerate() {
        assert_eq!(store.snapshot_json()["settings"]["theme"], json!(i));
    }
}

/// The `check` effect finds the store through `get_store` and marks the
/// slice as seen through it.
fn lookup(registry: &DomainRegistry) -> Slice {
    Slice::builder("lookup")
        .field("seen", false)
        .reducer("markSeen", ReducerOptions::new(), |a, _| a.set("seen", true))
        .effect("check", EffectOptions::new(), |_ctx, _args| {
            async move {
                tokio::task::yield_now().await;
                get_store()?.dispatch(Action::new("@@LOOKUP/MARK_SEEN", ()))?;
                Ok::<_, anyhow::Error>(())
            }
            .boxed()
            .into()
        })
        .build(registry)
        .unwrap()
}

async fn seen(store: &Store) -> bool {
    for _ in 0..100 {
        if store.snapshot_json()["lookup"]["seen"] == json!(true) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread")]
async fn effects_registered_in_a_task_scope_see_the_store() {
    storepart_host::trace::test_run().ok();
    let slice = lookup(&DomainRegistry::new());
    let store = Store::builder(HostConfig::default()).build().unwrap();

    TaskContainer::scope(store.clone(), async {
        register_slice(&slice).unwrap();
        get_store()
            .unwrap()
            .dispatch(slice.action("check").unwrap().create(()))
            .unwrap();
    })
    .await;

    assert!(seen(&store).await);
    assert_eq!(store.running_effects(), vec!["lookup/check".to_string()]);
    store.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn effects_see_their_store_outside_any_scope() {
    storepart_host::trace::test_run().ok();
    let slice = lookup(&DomainRegistry::new());
    let store = Store::builder(HostConfig::default())
        .slice(&slice)
        .build()
        .unwrap();

    store
        .dispatch(slice.action("check").unwrap().create(()))
        .unwrap();

    assert!(seen(&store).await);
    assert!(matches!(get_store(), Err(HostError::NoCurrentContainer)));
    store.shutdown();
}
