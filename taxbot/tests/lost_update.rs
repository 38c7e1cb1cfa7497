//! The read-modify-write race across the store boundary.
//!
//! The trait's default `increment` reads, then writes. With an injected
//! delay between the two, concurrent entries for the same category lose one
//! update. The shipped adapters override `increment` atomically, which
//! removes the race; both outcomes are pinned down here.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::time::{sleep, Duration as TokioDuration};

use taxbot::chat::{Dispatcher, MessageEnvelope};
use taxbot::ledger::store::{LedgerStore, StoreError};
use taxbot::{Category, InMemoryLedgerStore, LedgerRecord, ResetPolicy};

const CHANNEL: &str = "chan-1";

/// Non-atomic adapter: inherits the default read-then-write `increment`
/// and delays every write so overlapping reads are easy to provoke.
struct DelayedNonAtomicStore {
    inner: InMemoryLedgerStore,
    write_delay: TokioDuration,
}

impl DelayedNonAtomicStore {
    fn new(write_delay: TokioDuration) -> Self {
        Self {
            inner: InMemoryLedgerStore::new(),
            write_delay,
        }
    }
}

#[async_trait]
impl LedgerStore for DelayedNonAtomicStore {
    async fn get(&self) -> Result<LedgerRecord, StoreError> {
        self.inner.get().await
    }

    async fn put(&self, record: LedgerRecord) -> Result<(), StoreError> {
        self.inner.put(record).await
    }

    async fn update(
        &self,
        category: Category,
        new_value: i64,
    ) -> Result<LedgerRecord, StoreError> {
        sleep(self.write_delay).await;
        self.inner.update(category, new_value).await
    }
}

fn dispatcher(store: Arc<dyn LedgerStore>) -> Dispatcher {
    Dispatcher::new(
        CHANNEL.to_string(),
        ResetPolicy::single("1"),
        store,
        Duration::milliseconds(3_600_000),
    )
}

fn tax_message(id: &str) -> MessageEnvelope {
    MessageEnvelope {
        id: id.to_string(),
        channel_id: CHANNEL.to_string(),
        sender_id: "u".to_string(),
        sender_is_bot: false,
        text: "!taxa 1 100000 pcp".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }
}

#[tokio::test]
async fn non_atomic_adapter_loses_an_update_under_interleaving() {
    let store = Arc::new(DelayedNonAtomicStore::new(TokioDuration::from_millis(50)));
    let dispatcher = Arc::new(dispatcher(store.clone()));

    // Both commands read the pre-update total before either write lands.
    let m1 = tax_message("m1");
    let m2 = tax_message("m2");
    let (a, b) = tokio::join!(
        dispatcher.handle(&m1),
        dispatcher.handle(&m2),
    );
    a.unwrap().unwrap();
    b.unwrap().unwrap();

    assert_eq!(store.get().await.unwrap().pcp_total, 100_000);
}

#[tokio::test]
async fn atomic_adapter_keeps_both_updates() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let dispatcher = Arc::new(dispatcher(store.clone()));

    let m1 = tax_message("m1");
    let m2 = tax_message("m2");
    let (a, b) = tokio::join!(
        dispatcher.handle(&m1),
        dispatcher.handle(&m2),
    );
    a.unwrap().unwrap();
    b.unwrap().unwrap();

    assert_eq!(store.get().await.unwrap().pcp_total, 200_000);
}

#[tokio::test]
async fn sequential_entries_are_safe_even_without_atomicity() {
    let store = Arc::new(DelayedNonAtomicStore::new(TokioDuration::from_millis(10)));
    let dispatcher = dispatcher(store.clone());

    dispatcher.handle(&tax_message("m1")).await.unwrap();
    dispatcher.handle(&tax_message("m2")).await.unwrap();

    assert_eq!(store.get().await.unwrap().pcp_total, 200_000);
}
