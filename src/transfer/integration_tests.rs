//! End-to-end transfer tests
//!
//! Full coordinator flow over the in-memory store with mock authorizer,
//! notifier and cache collaborators. No database needed.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::account::{AccountId, AccountRole, AccountStore};
use crate::authorizer::mock::{MockAuthorizer, MockDecision};
use crate::cache::mock::RecordingInvalidator;
use crate::memory::MemoryStore;
use crate::notification::notifier::mock::MockNotifier;
use crate::notification::{
    DeliveryConfig, DeliveryEngine, NotificationDispatcher, NotificationJob, NotificationStatus,
    RetryPolicy,
};
use crate::transfer::{
    PageRequest, TransactionFilter, TransactionStatus, TransferCoordinator, TransferError,
    TransferRequest, TransferStore,
};

/// Helper wiring a coordinator to in-memory collaborators
struct TestHarness {
    store: Arc<MemoryStore>,
    authorizer: Arc<MockAuthorizer>,
    cache: Arc<RecordingInvalidator>,
    dispatcher: Arc<NotificationDispatcher>,
    jobs: Option<mpsc::Receiver<NotificationJob>>,
    coordinator: Arc<TransferCoordinator>,
}

impl TestHarness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let authorizer = Arc::new(MockAuthorizer::approving());
        let cache = Arc::new(RecordingInvalidator::default());
        let (dispatcher, jobs) = NotificationDispatcher::new(store.clone(), 1024);
        let dispatcher = Arc::new(dispatcher);

        let coordinator = Arc::new(TransferCoordinator::new(
            store.clone(),
            authorizer.clone(),
            dispatcher.clone(),
            cache.clone(),
        ));

        Self {
            store,
            authorizer,
            cache,
            dispatcher,
            jobs: Some(jobs),
            coordinator,
        }
    }

    fn account(&self, name: &str, role: AccountRole, cents: i64) -> AccountId {
        self.store.seed_account(
            name,
            &format!("{}@example.com", name.to_lowercase()),
            role,
            Decimal::new(cents, 2),
        )
    }

    async fn balance(&self, id: AccountId) -> Decimal {
        self.store.get(id).await.unwrap().unwrap().balance
    }

    /// Transaction rows (any status) where `id` is the payer
    async fn rows_sent_by(&self, id: AccountId) -> u64 {
        self.store
            .account_stats(id)
            .await
            .unwrap()
            .total_transactions_sent
    }

    async fn transfer(
        &self,
        payer: AccountId,
        payee: AccountId,
        cents: i64,
    ) -> Result<crate::transfer::TransactionRecord, TransferError> {
        self.coordinator
            .transfer(TransferRequest::new(payer, payee, Decimal::new(cents, 2)))
            .await
    }

    fn queued_jobs(&mut self) -> usize {
        let jobs = self.jobs.as_mut().unwrap();
        let mut n = 0;
        while jobs.try_recv().is_ok() {
            n += 1;
        }
        n
    }
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_transfer_moves_funds_and_completes() {
    let mut h = TestHarness::new();
    let alice = h.account("Alice", AccountRole::SenderCapable, 100000);
    let bob = h.account("Bob", AccountRole::SenderCapable, 50000);

    let record = h.transfer(alice, bob, 10000).await.unwrap();

    assert_eq!(record.status, TransactionStatus::Completed);
    assert_eq!(record.amount, Decimal::new(10000, 2));
    assert_eq!(h.balance(alice).await, Decimal::new(90000, 2));
    assert_eq!(h.balance(bob).await, Decimal::new(60000, 2));

    let stored = h.coordinator.get_transaction(record.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Completed);
    assert_eq!(h.rows_sent_by(alice).await, 1);
    assert_eq!(h.authorizer.calls(), 1);

    // Side effects were issued before the call returned
    let calls = h.cache.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, vec![alice, bob]);
    assert_eq!(calls[0].1, record.id);

    assert_eq!(h.queued_jobs(), 1);
    let summary = h.dispatcher.summary(record.id).await.unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.pending, 1);
    let notification = &summary.notifications[0];
    assert_eq!(notification.recipient_id, bob);
    assert_eq!(
        notification.message,
        "Hello Bob! You received a transfer of 100.00 from Alice."
    );
}

#[tokio::test]
async fn test_transfer_of_exact_balance_leaves_zero() {
    let h = TestHarness::new();
    let alice = h.account("Alice", AccountRole::SenderCapable, 12345);
    let shop = h.account("Shop", AccountRole::ReceiverOnly, 0);

    h.transfer(alice, shop, 12345).await.unwrap();

    let remaining = h.balance(alice).await;
    assert!(remaining.is_zero());
    assert_eq!(remaining.to_string(), "0.00");
    assert_eq!(h.balance(shop).await, Decimal::new(12345, 2));
}

#[tokio::test]
async fn test_receiver_only_account_can_receive() {
    let h = TestHarness::new();
    let alice = h.account("Alice", AccountRole::SenderCapable, 1000);
    let shop = h.account("Shop", AccountRole::ReceiverOnly, 0);

    let record = h.transfer(alice, shop, 1000).await.unwrap();
    assert_eq!(record.payee_id, shop);
}

// ============================================================================
// Precondition failures: no state change, authorizer never called
// ============================================================================

#[tokio::test]
async fn test_receiver_only_payer_is_rejected() {
    let h = TestHarness::new();
    let shop = h.account("Shop", AccountRole::ReceiverOnly, 100000);
    let bob = h.account("Bob", AccountRole::SenderCapable, 0);

    let err = h.transfer(shop, bob, 100).await.unwrap_err();

    assert_eq!(err, TransferError::SenderNotAuthorized);
    assert_eq!(h.balance(shop).await, Decimal::new(100000, 2));
    assert_eq!(h.balance(bob).await, Decimal::new(0, 2));
    assert_eq!(h.rows_sent_by(shop).await, 0);
    assert_eq!(h.authorizer.calls(), 0);
    assert!(h.cache.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_accounts_are_not_found() {
    let h = TestHarness::new();
    let alice = h.account("Alice", AccountRole::SenderCapable, 1000);

    assert_eq!(
        h.transfer(AccountId(404), alice, 100).await.unwrap_err(),
        TransferError::AccountNotFound(AccountId(404))
    );
    assert_eq!(
        h.transfer(alice, AccountId(405), 100).await.unwrap_err(),
        TransferError::AccountNotFound(AccountId(405))
    );
    assert_eq!(h.balance(alice).await, Decimal::new(1000, 2));
}

#[tokio::test]
async fn test_self_transfer_is_rejected() {
    let h = TestHarness::new();
    let alice = h.account("Alice", AccountRole::SenderCapable, 1000);

    assert_eq!(
        h.transfer(alice, alice, 100).await.unwrap_err(),
        TransferError::SelfTransfer
    );
    assert_eq!(h.balance(alice).await, Decimal::new(1000, 2));
}

#[tokio::test]
async fn test_precondition_order() {
    let h = TestHarness::new();
    let shop = h.account("Shop", AccountRole::ReceiverOnly, 1000);

    // Existence is checked before role
    assert_eq!(
        h.transfer(shop, AccountId(999), 100).await.unwrap_err(),
        TransferError::AccountNotFound(AccountId(999))
    );
    // Role is checked before self-transfer
    assert_eq!(
        h.transfer(shop, shop, 100).await.unwrap_err(),
        TransferError::SenderNotAuthorized
    );

    let alice = h.account("Alice", AccountRole::SenderCapable, 1000);
    // Self-transfer is checked before amount
    assert!(matches!(
        h.coordinator
            .transfer(TransferRequest::new(alice, alice, Decimal::ZERO))
            .await,
        Err(TransferError::SelfTransfer)
    ));
    // Amount is checked before balance
    let bob = h.account("Bob", AccountRole::SenderCapable, 0);
    assert!(matches!(
        h.coordinator
            .transfer(TransferRequest::new(alice, bob, Decimal::new(100001, 3)))
            .await,
        Err(TransferError::InvalidAmount(_))
    ));
}

#[tokio::test]
async fn test_invalid_amounts_are_rejected() {
    let h = TestHarness::new();
    let alice = h.account("Alice", AccountRole::SenderCapable, 100000);
    let bob = h.account("Bob", AccountRole::SenderCapable, 0);

    for amount in [
        Decimal::ZERO,
        Decimal::new(-100, 2),
        Decimal::new(1001, 3),
        Decimal::new(100000000, 2),
    ] {
        let result = h
            .coordinator
            .transfer(TransferRequest::new(alice, bob, amount))
            .await;
        assert!(
            matches!(result, Err(TransferError::InvalidAmount(_))),
            "amount {} should be invalid, got {:?}",
            amount,
            result
        );
    }
    assert_eq!(h.balance(alice).await, Decimal::new(100000, 2));
    assert_eq!(h.authorizer.calls(), 0);
}

#[tokio::test]
async fn test_configured_max_amount() {
    let h = TestHarness::new();
    let alice = h.account("Alice", AccountRole::SenderCapable, 1000000);
    let bob = h.account("Bob", AccountRole::SenderCapable, 0);

    let store: Arc<dyn TransferStore> = h.store.clone();
    let coordinator = TransferCoordinator::new(
        store,
        h.authorizer.clone(),
        h.dispatcher.clone(),
        h.cache.clone(),
    )
    .with_max_amount(Decimal::new(100000, 2));

    assert!(
        coordinator
            .transfer(TransferRequest::new(alice, bob, Decimal::new(100000, 2)))
            .await
            .is_ok()
    );
    assert!(matches!(
        coordinator
            .transfer(TransferRequest::new(alice, bob, Decimal::new(100001, 2)))
            .await,
        Err(TransferError::InvalidAmount(_))
    ));
}

#[tokio::test]
async fn test_insufficient_balance() {
    let h = TestHarness::new();
    let alice = h.account("Alice", AccountRole::SenderCapable, 10000);
    let bob = h.account("Bob", AccountRole::SenderCapable, 0);

    assert_eq!(
        h.transfer(alice, bob, 10001).await.unwrap_err(),
        TransferError::InsufficientBalance
    );
    assert_eq!(h.balance(alice).await, Decimal::new(10000, 2));
    assert_eq!(h.rows_sent_by(alice).await, 0);
    assert_eq!(h.authorizer.calls(), 0);
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn test_denied_transfer_leaves_nothing() {
    let mut h = TestHarness::new();
    let alice = h.account("Alice", AccountRole::SenderCapable, 100000);
    let bob = h.account("Bob", AccountRole::SenderCapable, 50000);
    h.authorizer.set_decision(MockDecision::Deny);

    let err = h.transfer(alice, bob, 10000).await.unwrap_err();

    assert!(matches!(err, TransferError::NotAuthorized(_)));
    assert_eq!(err.http_status(), 403);
    assert_eq!(h.balance(alice).await, Decimal::new(100000, 2));
    assert_eq!(h.balance(bob).await, Decimal::new(50000, 2));
    // No audit row for a denial
    assert_eq!(h.rows_sent_by(alice).await, 0);
    assert!(h.cache.calls().is_empty());
    assert_eq!(h.queued_jobs(), 0);
}

#[tokio::test]
async fn test_unreachable_authorizer_fails_closed() {
    let h = TestHarness::new();
    let alice = h.account("Alice", AccountRole::SenderCapable, 100000);
    let bob = h.account("Bob", AccountRole::SenderCapable, 0);
    h.authorizer.set_decision(MockDecision::Unreachable);

    assert!(matches!(
        h.transfer(alice, bob, 100).await,
        Err(TransferError::NotAuthorized(_))
    ));
    assert_eq!(h.balance(alice).await, Decimal::new(100000, 2));
    assert_eq!(h.rows_sent_by(alice).await, 0);

    // Locks were released by the rollback
    h.authorizer.set_decision(MockDecision::Approve);
    assert!(h.transfer(alice, bob, 100).await.is_ok());
}

// ============================================================================
// Persistence failure
// ============================================================================

#[tokio::test]
async fn test_commit_failure_rolls_back_and_records_failed_row() {
    let mut h = TestHarness::new();
    let alice = h.account("Alice", AccountRole::SenderCapable, 100000);
    let bob = h.account("Bob", AccountRole::SenderCapable, 0);
    h.store.fail_next_commit();

    let err = h.transfer(alice, bob, 2500).await.unwrap_err();

    assert!(matches!(err, TransferError::PersistenceFailure(_)));
    assert!(err.is_retryable());
    assert_eq!(h.balance(alice).await, Decimal::new(100000, 2));
    assert_eq!(h.balance(bob).await, Decimal::new(0, 2));

    let stats = h.store.account_stats(alice).await.unwrap();
    assert_eq!(stats.total_transactions_sent, 1);
    assert_eq!(stats.total_sent, Decimal::ZERO);
    assert!(h.cache.calls().is_empty());
    assert_eq!(h.queued_jobs(), 0);

    // The caller may retry the identical request
    let record = h.transfer(alice, bob, 2500).await.unwrap();
    assert_eq!(record.status, TransactionStatus::Completed);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_drain_exactly() {
    const N: i64 = 50;
    const CENTS: i64 = 1000;

    let h = TestHarness::new();
    let x = h.account("Xavier", AccountRole::SenderCapable, N * CENTS);
    let y = h.account("Yolanda", AccountRole::SenderCapable, 2500);

    let handles: Vec<_> = (0..N)
        .map(|_| {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .transfer(TransferRequest::new(x, y, Decimal::new(CENTS, 2)))
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        assert_eq!(result.unwrap().unwrap().status, TransactionStatus::Completed);
    }

    assert!(h.balance(x).await.is_zero());
    assert_eq!(h.balance(y).await, Decimal::new(2500 + N * CENTS, 2));

    let stats = h.store.account_stats(x).await.unwrap();
    assert_eq!(stats.total_transactions_sent, N as u64);
    assert_eq!(stats.total_sent, Decimal::new(N * CENTS, 2));

    // One more must fail on the locked balance
    assert_eq!(
        h.transfer(x, y, 1).await.unwrap_err(),
        TransferError::InsufficientBalance
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_direction_transfers_do_not_deadlock() {
    let h = TestHarness::new();
    let a = h.account("Ann", AccountRole::SenderCapable, 100000);
    let b = h.account("Ben", AccountRole::SenderCapable, 100000);
    let c = h.account("Cid", AccountRole::SenderCapable, 100000);

    let pairs = [(a, b), (b, a), (b, c), (c, a), (a, c), (c, b)];
    let handles: Vec<_> = (0..60)
        .map(|i| {
            let (from, to) = pairs[i % pairs.len()];
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .transfer(TransferRequest::new(from, to, Decimal::new(500, 2)))
                    .await
            })
        })
        .collect();

    let all = tokio::time::timeout(Duration::from_secs(10), futures::future::join_all(handles))
        .await
        .expect("transfers deadlocked");
    for result in all {
        result.unwrap().unwrap();
    }

    // Each account sent and received the same count
    let total = h.balance(a).await + h.balance(b).await + h.balance(c).await;
    assert_eq!(total, Decimal::new(300000, 2));
    assert_eq!(h.balance(a).await, Decimal::new(100000, 2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_overdraft_attempts_never_go_negative() {
    let h = TestHarness::new();
    let x = h.account("Xavier", AccountRole::SenderCapable, 5000);
    let y = h.account("Yolanda", AccountRole::SenderCapable, 0);

    // 20 transfers of 10.00 against a 50.00 balance: exactly 5 succeed
    let handles: Vec<_> = (0..20)
        .map(|_| {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .transfer(TransferRequest::new(x, y, Decimal::new(1000, 2)))
                    .await
            })
        })
        .collect();

    let mut ok = 0;
    for result in futures::future::join_all(handles).await {
        match result.unwrap() {
            Ok(_) => ok += 1,
            Err(e) => assert_eq!(e, TransferError::InsufficientBalance),
        }
    }

    assert_eq!(ok, 5);
    assert!(h.balance(x).await.is_zero());
    assert_eq!(h.balance(y).await, Decimal::new(5000, 2));
}

// ============================================================================
// Notifications after commit
// ============================================================================

async fn wait_for_terminal(h: &TestHarness, tx: crate::transfer::TransactionId) -> NotificationStatus {
    for _ in 0..200 {
        let summary = h.dispatcher.summary(tx).await.unwrap();
        if summary.pending == 0 && summary.total > 0 {
            return summary.notifications[0].status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    NotificationStatus::Pending
}

fn start_engine(h: &mut TestHarness, notifier: Arc<MockNotifier>) -> Arc<DeliveryEngine> {
    let engine = Arc::new(DeliveryEngine::new(
        h.store.clone(),
        h.store.clone(),
        notifier,
        DeliveryConfig {
            policy: RetryPolicy::new(
                3,
                vec![Duration::from_millis(5), Duration::from_millis(10)],
            ),
            recovery_batch_size: 10,
            ..DeliveryConfig::default()
        },
        h.dispatcher.sender(),
    ));
    let jobs = h.jobs.take().unwrap();
    tokio::spawn(engine.clone().run(jobs));
    engine
}

#[tokio::test]
async fn test_failing_notifier_never_affects_transfer() {
    let mut h = TestHarness::new();
    let alice = h.account("Alice", AccountRole::SenderCapable, 100000);
    let bob = h.account("Bob", AccountRole::SenderCapable, 0);
    let notifier = Arc::new(MockNotifier::always_failing());
    start_engine(&mut h, notifier.clone());

    let record = h.transfer(alice, bob, 10000).await.unwrap();
    assert_eq!(record.status, TransactionStatus::Completed);

    assert_eq!(wait_for_terminal(&h, record.id).await, NotificationStatus::Failed);
    let summary = h.dispatcher.summary(record.id).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.notifications[0].attempts, 3);
    assert!(summary.notifications[0].failed_at.is_some());
    assert_eq!(notifier.calls(), 3);

    // Transfer untouched by the notification outcome
    let stored = h.coordinator.get_transaction(record.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Completed);
    assert_eq!(h.balance(bob).await, Decimal::new(10000, 2));
}

#[tokio::test]
async fn test_notifier_recovers_after_retry() {
    let mut h = TestHarness::new();
    let alice = h.account("Alice", AccountRole::SenderCapable, 100000);
    let bob = h.account("Bob", AccountRole::SenderCapable, 0);
    let notifier = Arc::new(MockNotifier::failing(1));
    start_engine(&mut h, notifier.clone());

    let record = h.transfer(alice, bob, 4200).await.unwrap();

    assert_eq!(wait_for_terminal(&h, record.id).await, NotificationStatus::Sent);
    let summary = h.dispatcher.summary(record.id).await.unwrap();
    assert_eq!(summary.notifications[0].attempts, 2);
    assert_eq!(
        notifier.sent(),
        vec![(
            "bob@example.com".to_string(),
            "Hello Bob! You received a transfer of 42.00 from Alice.".to_string()
        )]
    );
}

// ============================================================================
// Transaction log listing
// ============================================================================

#[tokio::test]
async fn test_listing_includes_failed_audit_rows() {
    let h = TestHarness::new();
    let alice = h.account("Alice", AccountRole::SenderCapable, 100000);
    let bob = h.account("Bob", AccountRole::SenderCapable, 0);

    let done = h.transfer(alice, bob, 1000).await.unwrap();
    h.store.fail_next_commit();
    assert!(h.transfer(alice, bob, 2000).await.is_err());

    let all = h
        .coordinator
        .list_transactions(&TransactionFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(all.total, 2);

    let failed = h
        .coordinator
        .list_transactions(
            &TransactionFilter {
                status: Some(TransactionStatus::Failed),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(failed.total, 1);
    assert_eq!(failed.data[0].amount, Decimal::new(2000, 2));
    assert_ne!(failed.data[0].id, done.id);

    let to_alice = h
        .coordinator
        .list_transactions(
            &TransactionFilter {
                payee_id: Some(alice),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(to_alice.total, 0);
    assert_eq!(to_alice.last_page, 1);
}
