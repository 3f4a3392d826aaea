//! Single-key, assigned-key, and counter operations end to end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cachegate::{
    CacheBackend, CacheGate, CacheGateError, CachePolicy, DescriptorBuilder, DescriptorRegistry,
    KeyPart, MemoryBackend, MethodSpec, OperationKind, ParamSpec,
};

const TTL: Duration = Duration::from_secs(60);

fn id_spec(method: &str) -> MethodSpec {
    MethodSpec::new(method).param(ParamSpec::new("id").key_order(0))
}

fn build_gate(descriptors: Vec<cachegate::CacheDescriptor>) -> (CacheGate, Arc<MemoryBackend>) {
    let mut builder = DescriptorRegistry::builder();
    for descriptor in descriptors {
        builder = builder.register(descriptor);
    }
    let registry = builder.build().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let gate = CacheGate::builder(registry)
        .backend(backend.clone())
        .build()
        .unwrap();
    (gate, backend)
}

#[tokio::test]
async fn test_read_single_hit_skips_loader() {
    let (gate, _backend) = build_gate(vec![DescriptorBuilder::new(
        "users.read",
        OperationKind::ReadSingle,
    )
    .namespace("users")
    .expiration(TTL)
    .signature(id_spec("get_user"))
    .build()
    .unwrap()]);
    let loads = AtomicUsize::new(0);

    let load = || {
        loads.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, anyhow::Error>(Some("alice".to_string())) }
    };

    let first: Option<String> = gate.read_single("users.read", &[&7u64], load).await.unwrap();
    assert_eq!(first.as_deref(), Some("alice"));

    let second: Option<String> = gate.read_single("users.read", &[&7u64], load).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_read_assign_uses_the_fixed_key() {
    let (gate, backend) = build_gate(vec![DescriptorBuilder::new(
        "totals.read",
        OperationKind::ReadAssign,
    )
    .namespace("reports")
    .expiration(TTL)
    .assigned_key("totals")
    .build()
    .unwrap()]);

    let total: Option<u64> = gate
        .read_assign("totals.read", || async { Ok::<_, anyhow::Error>(Some(4200u64)) })
        .await
        .unwrap();
    assert_eq!(total, Some(4200));
    assert!(backend.get("reports:totals").await.unwrap().is_some());
}

#[tokio::test]
async fn test_update_single_stores_the_result() {
    let (gate, backend) = build_gate(vec![DescriptorBuilder::new(
        "users.save",
        OperationKind::UpdateSingle,
    )
    .namespace("users")
    .expiration(TTL)
    .signature(id_spec("save_user").data_from_result())
    .build()
    .unwrap()]);

    let saved: Option<String> = gate
        .update_single("users.save", &[&7u64], || async {
            Ok::<_, anyhow::Error>(Some("alice-v2".to_string()))
        })
        .await
        .unwrap();
    assert_eq!(saved.as_deref(), Some("alice-v2"));

    let raw = backend.get("users:7").await.unwrap().unwrap();
    assert_eq!(raw, serde_json::to_vec("alice-v2").unwrap());
}

#[tokio::test]
async fn test_update_single_with_argument_data() {
    let (gate, backend) = build_gate(vec![DescriptorBuilder::new(
        "users.rename",
        OperationKind::UpdateSingle,
    )
    .namespace("users")
    .expiration(TTL)
    .signature(
        MethodSpec::new("rename_user")
            .param(ParamSpec::new("id").key_order(0))
            .param(ParamSpec::new("name").data()),
    )
    .build()
    .unwrap()]);

    let new_name = "bob".to_string();
    let rows: u64 = gate
        .update_single_with("users.rename", &[&7u64], Some(&new_name), || async {
            Ok::<_, anyhow::Error>(1u64)
        })
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let raw = backend.get("users:7").await.unwrap().unwrap();
    assert_eq!(raw, serde_json::to_vec("bob").unwrap());
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Session {
    token: String,
}

impl KeyPart for Session {
    fn key_part(&self) -> String {
        self.token.clone()
    }
}

#[tokio::test]
async fn test_update_by_result_derives_the_key_from_the_value() {
    let (gate, backend) = build_gate(vec![DescriptorBuilder::new(
        "sessions.save",
        OperationKind::UpdateSingle,
    )
    .namespace("sessions")
    .expiration(TTL)
    .signature(MethodSpec::new("open_session").key_from_result().data_from_result())
    .build()
    .unwrap()]);

    let opened: Option<Session> = gate
        .update_single_by_result("sessions.save", || async {
            Ok::<_, anyhow::Error>(Some(Session { token: "t-99".to_string() }))
        })
        .await
        .unwrap();
    assert!(opened.is_some());
    assert!(backend.get("sessions:t-99").await.unwrap().is_some());

    // a null result names no key, so nothing is written
    let none: Option<Session> = gate
        .update_single_by_result("sessions.save", || async { Ok::<_, anyhow::Error>(None) })
        .await
        .unwrap();
    assert!(none.is_none());
    assert_eq!(backend.len().await, 1);
}

#[tokio::test]
async fn test_invalidate_single_by_result() {
    let (gate, backend) = build_gate(vec![DescriptorBuilder::new(
        "sessions.close",
        OperationKind::InvalidateSingle,
    )
    .namespace("sessions")
    .signature(MethodSpec::new("close_session").key_from_result())
    .build()
    .unwrap()]);

    backend
        .set("sessions:t-99", TTL, b"\"stale\"".to_vec())
        .await
        .unwrap();

    let closed: Session = gate
        .invalidate_single_by_result("sessions.close", || async {
            Ok::<_, anyhow::Error>(Session { token: "t-99".to_string() })
        })
        .await
        .unwrap();
    assert_eq!(closed.token, "t-99");
    assert!(backend.get("sessions:t-99").await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalidate_assign_removes_the_fixed_key() {
    let (gate, backend) = build_gate(vec![
        DescriptorBuilder::new("totals.read", OperationKind::ReadAssign)
            .namespace("reports")
            .expiration(TTL)
            .assigned_key("totals")
            .build()
            .unwrap(),
        DescriptorBuilder::new("totals.reset", OperationKind::InvalidateAssign)
            .namespace("reports")
            .assigned_key("totals")
            .build()
            .unwrap(),
    ]);

    gate.read_assign::<u64, _, _, anyhow::Error>("totals.read", || async { Ok(Some(1u64)) })
        .await
        .unwrap();
    assert!(backend.get("reports:totals").await.unwrap().is_some());

    gate.invalidate_assign("totals.reset", || async { Ok::<_, anyhow::Error>(()) })
        .await
        .unwrap();
    assert!(backend.get("reports:totals").await.unwrap().is_none());
}

#[tokio::test]
async fn test_cached_null_short_circuits_single_reads() {
    let (gate, _backend) = build_gate(vec![DescriptorBuilder::new(
        "users.read",
        OperationKind::ReadSingle,
    )
    .namespace("users")
    .expiration(TTL)
    .policy(CachePolicy {
        cache_nulls: true,
        ..CachePolicy::default()
    })
    .signature(id_spec("get_user"))
    .build()
    .unwrap()]);
    let loads = AtomicUsize::new(0);

    let load = || {
        loads.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, anyhow::Error>(None::<String>) }
    };

    assert_eq!(gate.read_single::<String, _, _, _>("users.read", &[&7u64], load).await.unwrap(), None);
    assert_eq!(gate.read_single::<String, _, _, _>("users.read", &[&7u64], load).await.unwrap(), None);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_key_part_count_mismatch_is_invalid_argument() {
    let (gate, _backend) = build_gate(vec![DescriptorBuilder::new(
        "users.read",
        OperationKind::ReadSingle,
    )
    .namespace("users")
    .expiration(TTL)
    .signature(id_spec("get_user"))
    .build()
    .unwrap()]);

    let err = gate
        .read_single::<String, _, _, anyhow::Error>("users.read", &[], || async { Ok(None) })
        .await
        .unwrap_err();
    assert!(matches!(err, CacheGateError::InvalidArgument(_)));
}

fn counter_gate() -> (CacheGate, Arc<MemoryBackend>) {
    build_gate(vec![
        DescriptorBuilder::new("hits.incr", OperationKind::Increment)
            .namespace("hits")
            .signature(id_spec("bump_hits"))
            .build()
            .unwrap(),
        DescriptorBuilder::new("hits.decr", OperationKind::Decrement)
            .namespace("hits")
            .signature(id_spec("drop_hits"))
            .build()
            .unwrap(),
        DescriptorBuilder::new("hits.read", OperationKind::ReadCounter)
            .namespace("hits")
            .expiration(TTL)
            .signature(id_spec("count_hits"))
            .build()
            .unwrap(),
        DescriptorBuilder::new("hits.store", OperationKind::UpdateCounter)
            .namespace("hits")
            .expiration(TTL)
            .signature(id_spec("recount_hits").data_from_result())
            .build()
            .unwrap(),
    ])
}

#[tokio::test]
async fn test_counter_adjustments() {
    let (gate, _backend) = counter_gate();

    // absent counter is created holding the initial value
    assert_eq!(gate.incr("hits.incr", &[&9u64], 1, 5).await.unwrap(), 5);
    assert_eq!(gate.incr("hits.incr", &[&9u64], 2, 5).await.unwrap(), 7);

    assert_eq!(gate.decr("hits.decr", &[&9u64], 3).await.unwrap(), Some(4));
    assert_eq!(gate.decr("hits.decr", &[&9u64], 100).await.unwrap(), Some(0));
    assert_eq!(gate.decr("hits.decr", &[&404u64], 1).await.unwrap(), None);
}

#[tokio::test]
async fn test_read_counter_miss_then_hit() {
    let (gate, backend) = counter_gate();
    let loads = AtomicUsize::new(0);

    let count = || {
        loads.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, anyhow::Error>(42u64) }
    };

    assert_eq!(gate.read_counter("hits.read", &[&9u64], count).await.unwrap(), 42);
    assert_eq!(backend.get("hits:9").await.unwrap().unwrap(), b"42".to_vec());

    assert_eq!(gate.read_counter("hits.read", &[&9u64], count).await.unwrap(), 42);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_counters_and_read_counter_share_the_ascii_form() {
    let (gate, _backend) = counter_gate();

    gate.update_counter("hits.store", &[&9u64], || async { Ok::<_, anyhow::Error>(10u64) })
        .await
        .unwrap();
    // the stored form is directly adjustable
    assert_eq!(gate.incr("hits.incr", &[&9u64], 5, 0).await.unwrap(), 15);
    assert_eq!(
        gate.read_counter("hits.read", &[&9u64], || async {
            Ok::<_, anyhow::Error>(0u64)
        })
        .await
        .unwrap(),
        15
    );
}
