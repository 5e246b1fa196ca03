//! End-to-end scenarios against `MemoryStore`, mirroring the reference
//! implementation's own example scenarios for a counter, a pure-read flow,
//! a two-instance pipeline, and a streaming serve route.

use std::sync::Arc;
use std::time::Duration;

use motion::{Component, DispatchOptions, InstanceOptions, ServeRoute, StateSnapshot};
use motion_core::state::StateMap;
use motion_store::{MemoryStore, StateStore};
use serde_json::{Value, json};

fn counter_value(snapshot: &StateSnapshot) -> i64 {
    snapshot
        .state
        .get("value")
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

fn prop_v(props: &Value) -> i64 {
    props.get("v").and_then(Value::as_i64).unwrap_or(0)
}

fn counter_component() -> Component<Value, i64> {
    Component::new("Counter")
        .init_state(|| {
            let mut state = StateMap::new();
            state.insert("value".to_string(), json!(0));
            state
        })
        .serve(
            "add",
            ServeRoute::Value(Arc::new(|snapshot, props| counter_value(snapshot) + prop_v(props))),
        )
        .update_single("add", |snapshot, props, _result| {
            let mut partial = StateMap::new();
            partial.insert("value".to_string(), json!(counter_value(snapshot) + prop_v(&props)));
            partial
        })
        .build()
}

#[tokio::test]
async fn counter_synchronous_add_and_update() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let component = counter_component();
    let instance = component
        .instance("a", Arc::clone(&store), InstanceOptions::default())
        .unwrap();
    instance.initialize_default().await.unwrap();
    assert_eq!(instance.get_version().await.unwrap(), 1);

    let result = instance
        .run_with("add", json!({"v": 1}), DispatchOptions { flush_after: true, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(result, 1);
    assert_eq!(instance.get_version().await.unwrap(), 2);

    let result = instance.run("add", json!({"v": 1})).await.unwrap();
    assert_eq!(result, 2);

    instance.flush_update("add").await.unwrap();
    let result = instance
        .run_with("add", json!({"v": 2}), DispatchOptions { force_refresh: true, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(result, 4);

    instance.shutdown().await;
}

#[tokio::test]
async fn pure_read_flow_is_cached_on_second_call() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let component: Component<Value, i64> = Component::new("Identity")
        .init_state(StateMap::new)
        .serve(
            "id",
            ServeRoute::Value(Arc::new(move |_snapshot, props| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                prop_v(props)
            })),
        )
        .build();

    let instance = component.instance("a", store, InstanceOptions::default()).unwrap();
    instance.initialize_default().await.unwrap();

    let first = instance.run("id", json!({"v": 7})).await.unwrap();
    let second = instance.run("id", json!({"v": 7})).await.unwrap();
    assert_eq!(first, 7);
    assert_eq!(second, 7);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    instance.shutdown().await;
}

#[tokio::test]
async fn ignore_cache_always_invokes_serve() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let component: Component<Value, i64> = Component::new("Identity")
        .init_state(StateMap::new)
        .serve(
            "id",
            ServeRoute::Value(Arc::new(move |_snapshot, props| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                prop_v(props)
            })),
        )
        .build();

    let instance = component.instance("a", store, InstanceOptions::default()).unwrap();
    instance.initialize_default().await.unwrap();

    let opts = DispatchOptions { ignore_cache: true, ..Default::default() };
    instance.run_with("id", json!({"v": 1}), opts).await.unwrap();
    instance.run_with("id", json!({"v": 1}), opts).await.unwrap();
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);

    instance.shutdown().await;
}

#[tokio::test]
async fn pipeline_across_two_instances_sharing_a_store() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());

    let adder = counter_component();
    let a = adder.instance("pipeline-a", Arc::clone(&store), InstanceOptions::default()).unwrap();
    a.initialize_default().await.unwrap();

    let concat: Component<Value, String> = Component::new("Concat")
        .init_state(|| {
            let mut state = StateMap::new();
            state.insert("text".to_string(), json!(""));
            state
        })
        .serve(
            "concat",
            ServeRoute::Value(Arc::new(|snapshot, props| {
                let prefix = snapshot.state.get("text").and_then(Value::as_str).unwrap_or("");
                let s = props.get("str").and_then(Value::as_str).unwrap_or("");
                format!("{prefix} {s}")
            })),
        )
        .update_single("concat", |snapshot, props, _result| {
            let prefix = snapshot.state.get("text").and_then(Value::as_str).unwrap_or("");
            let s = props.get("str").and_then(Value::as_str).unwrap_or("");
            let mut partial = StateMap::new();
            partial.insert("text".to_string(), json!(format!("{prefix} {s}")));
            partial
        })
        .build();
    let b = concat.instance("pipeline-b", Arc::clone(&store), InstanceOptions::default()).unwrap();
    b.initialize_default().await.unwrap();

    let add_opts = DispatchOptions { flush_after: true, ..Default::default() };
    let sum = a.run_with("add", json!({"v": 1}), add_opts).await.unwrap();
    assert_eq!(sum, 1);

    let concatenated = b.run_with("concat", json!({"str": "1"}), add_opts).await.unwrap();
    assert_eq!(concatenated, " 1");

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn streaming_serve_yields_the_full_sequence_and_is_cached() {
    use futures::StreamExt;

    // A synchronous `Sequence` route is eagerly materialized into a
    // `Vec`, so it is finite and bounded and gets cached like `run()`'s
    // single-value path (spec §8 scenario 4): a second `gen()` call
    // returns the same list without invoking the generator again.
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let component: Component<Value, i64> = Component::new("Count")
        .init_state(StateMap::new)
        .serve(
            "count",
            ServeRoute::Sequence(Arc::new(move |_snapshot, props| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                let n = prop_v(props);
                Box::new(0..n) as Box<dyn Iterator<Item = i64> + Send>
            })),
        )
        .build();

    let instance = component.instance("a", store, InstanceOptions::default()).unwrap();
    instance.initialize_default().await.unwrap();

    let stream = instance.gen("count", json!({"v": 3})).await.unwrap();
    let items: Vec<i64> = stream.collect().await;
    assert_eq!(items, vec![0, 1, 2]);

    let stream = instance.gen("count", json!({"v": 3})).await.unwrap();
    let items_again: Vec<i64> = stream.collect().await;
    assert_eq!(items_again, vec![0, 1, 2]);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    instance.shutdown().await;
}

#[tokio::test]
async fn disabled_update_task_rejects_flush_but_still_serves() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let component = counter_component();
    let options = InstanceOptions {
        disable_update_task: true,
        ..InstanceOptions::default()
    };
    let instance = component.instance("a", store, options).unwrap();
    instance.initialize_default().await.unwrap();

    let result = instance.run("add", json!({"v": 5})).await.unwrap();
    assert_eq!(result, 5);

    let err = instance.flush_update("add").await.unwrap_err();
    assert!(matches!(err, motion::MotionError::DisabledUpdateTask));

    instance.shutdown().await;
}

#[tokio::test]
async fn concurrent_writers_across_two_instances_serialize_through_the_lock() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let component = counter_component();

    let a = Arc::new(component.instance("shared", Arc::clone(&store), InstanceOptions::default()).unwrap());
    let b = Arc::new(component.instance("shared", Arc::clone(&store), InstanceOptions::default()).unwrap());
    a.initialize_default().await.unwrap();

    let opts = DispatchOptions { flush_after: true, ..Default::default() };
    let mut handles = Vec::new();
    for i in 0..100 {
        let inst = if i % 2 == 0 { Arc::clone(&a) } else { Arc::clone(&b) };
        handles.push(tokio::spawn(async move {
            inst.run_with("add", json!({"v": 1}), opts).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let value = a
        .run_with("add", json!({"v": 0}), DispatchOptions { force_refresh: true, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(value, 100);

    a.shutdown().await;
    b.shutdown().await;
}
