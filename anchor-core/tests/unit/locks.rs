use anchor_core::application::{LockOutcome, LockService};
use anchor_core::foundation::AnchorError;
use anchor_core::infrastructure::locks::{LockStore, MemoryLockStore};
use std::sync::Arc;
use std::time::Duration;

fn service() -> (LockService, Arc<MemoryLockStore>) {
    let store = Arc::new(MemoryLockStore::new());
    (LockService::new(store.clone()), store)
}

#[test]
fn acquire_then_release_with_returned_token_always_succeeds() {
    let (service, _) = service();
    let token = service.acquire("maintenance", Duration::from_secs(10)).expect("acquire").expect("token");
    assert!(service.release("maintenance", &token).expect("release"));
}

#[test]
fn release_and_extend_with_a_different_token_never_succeed() {
    let (service, store) = service();
    let _owner = service.acquire("maintenance", Duration::from_secs(10)).expect("acquire").expect("token");
    let foreign = service.acquire("other", Duration::from_secs(10)).expect("acquire").expect("token");

    assert!(!service.release("maintenance", &foreign).expect("release"));
    assert!(!service.extend("maintenance", &foreign, Duration::from_secs(10)).expect("extend"));
    // The lease is still held: nobody else can take it.
    assert!(!store
        .try_acquire("maintenance", &anchor_core::foundation::LockToken::generate(), Duration::from_secs(10))
        .expect("contend"));
}

/// Decorator counting lease extensions so the heartbeat is observable.
struct CountingLockStore {
    inner: MemoryLockStore,
    extends: std::sync::atomic::AtomicU32,
}

impl LockStore for CountingLockStore {
    fn try_acquire(&self, key: &str, token: &anchor_core::foundation::LockToken, ttl: Duration) -> Result<bool, AnchorError> {
        self.inner.try_acquire(key, token, ttl)
    }

    fn release(&self, key: &str, token: &anchor_core::foundation::LockToken) -> Result<bool, AnchorError> {
        self.inner.release(key, token)
    }

    fn extend(&self, key: &str, token: &anchor_core::foundation::LockToken, ttl: Duration) -> Result<bool, AnchorError> {
        self.extends.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.inner.extend(key, token, ttl)
    }
}

#[tokio::test]
async fn heartbeat_extends_a_long_operation() {
    let store = Arc::new(CountingLockStore { inner: MemoryLockStore::new(), extends: std::sync::atomic::AtomicU32::new(0) });
    let service = LockService::new(store.clone());

    // TTL of 6s gives a clamped 2s heartbeat; the 2.5s operation sees at
    // least one extension and finishes with the lease intact.
    let outcome = service
        .with_heartbeat("maintenance", Duration::from_secs(6), || async {
            tokio::time::sleep(Duration::from_millis(2_500)).await;
            Ok::<_, AnchorError>(5)
        })
        .await
        .expect("outcome");
    match outcome {
        LockOutcome::Completed(value) => assert_eq!(value, 5),
        LockOutcome::Skipped => panic!("lock was free"),
    }
    assert!(store.extends.load(std::sync::atomic::Ordering::SeqCst) >= 1, "heartbeat never extended the lease");
    // Released on completion.
    assert!(service.acquire("maintenance", Duration::from_secs(1)).expect("acquire").is_some());
}

#[test]
fn acquire_required_surfaces_the_held_lease() {
    let (service, _) = service();
    let _holder = service.acquire_required("maintenance", Duration::from_secs(10)).expect("free lease");
    let err = service.acquire_required("maintenance", Duration::from_secs(10)).expect_err("held");
    assert!(matches!(err, AnchorError::LockNotAcquired(_)));
}

#[tokio::test]
async fn held_lease_yields_a_benign_skip() {
    let (service, _) = service();
    let _holder = service.acquire("maintenance", Duration::from_secs(30)).expect("acquire").expect("token");
    let outcome = service
        .with_heartbeat("maintenance", Duration::from_secs(30), || async { Ok::<_, AnchorError>(()) })
        .await
        .expect("no error");
    assert!(outcome.is_skipped());
}
