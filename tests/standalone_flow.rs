//! End-to-end transfer flow over the public API: in-memory store, real HTTP
//! authorizer and notifier clients pointed at local fake services.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{Json, Router, http::StatusCode, routing::get, routing::post};
use fundsflow::account::{AccountRole, AccountStore};
use fundsflow::authorizer::{AuthorizerConfig, build_authorizer};
use fundsflow::cache::NoopInvalidator;
use fundsflow::memory::MemoryStore;
use fundsflow::notification::{
    DeliveryConfig, DeliveryEngine, HttpNotifier, NotificationDispatcher, NotifierConfig,
    RetryPolicy,
};
use fundsflow::transfer::{TransactionStatus, TransferCoordinator, TransferError, TransferRequest};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Serve `app` on an ephemeral port and return its base URL
async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Authorizer that approves iff `approve`
async fn fake_authorizer(approve: bool) -> String {
    let app = Router::new().route(
        "/authorize",
        get(move || async move {
            if approve {
                (StatusCode::OK, Json(json!({"status": "success", "data": {"authorization": true}})))
            } else {
                (StatusCode::FORBIDDEN, Json(json!({"status": "fail", "data": {"authorization": false}})))
            }
        }),
    );
    format!("{}/authorize", serve(app).await)
}

/// Notifier that rejects the first `failures` requests
async fn fake_notifier(failures: usize, hits: Arc<AtomicUsize>) -> String {
    let app = Router::new().route(
        "/notify",
        post(move |Json(body): Json<Value>| {
            let hits = hits.clone();
            async move {
                assert!(body["email"].is_string());
                let n = hits.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::NO_CONTENT
                }
            }
        }),
    );
    format!("{}/notify", serve(app).await)
}

struct Service {
    store: Arc<MemoryStore>,
    coordinator: TransferCoordinator,
    dispatcher: Arc<NotificationDispatcher>,
}

async fn start(approve: bool, notify_failures: usize, hits: Arc<AtomicUsize>) -> Service {
    let store = Arc::new(MemoryStore::new());

    let authorizer = build_authorizer(&AuthorizerConfig {
        url: fake_authorizer(approve).await,
        timeout_ms: 1_000,
        ..AuthorizerConfig::default()
    })
    .unwrap();

    let notifier_config = NotifierConfig {
        url: fake_notifier(notify_failures, hits).await,
        timeout_ms: 1_000,
        ..NotifierConfig::default()
    };
    let notifier = Arc::new(HttpNotifier::new(&notifier_config).unwrap());

    let (dispatcher, jobs) = NotificationDispatcher::new(store.clone(), 16);
    let dispatcher = Arc::new(dispatcher);
    let engine = Arc::new(DeliveryEngine::new(
        store.clone(),
        store.clone(),
        notifier,
        DeliveryConfig {
            policy: RetryPolicy::new(3, vec![Duration::from_millis(20)]),
            ..DeliveryConfig::default()
        },
        dispatcher.sender(),
    ));
    tokio::spawn(engine.run(jobs));

    let coordinator = TransferCoordinator::new(
        store.clone(),
        authorizer,
        dispatcher.clone(),
        Arc::new(NoopInvalidator),
    );

    Service {
        store,
        coordinator,
        dispatcher,
    }
}

#[tokio::test]
async fn transfer_commits_and_payee_is_notified_after_a_retry() {
    let hits = Arc::new(AtomicUsize::new(0));
    let svc = start(true, 1, hits.clone()).await;

    let payer = svc.store.seed_account(
        "Alice",
        "alice@example.com",
        AccountRole::SenderCapable,
        Decimal::new(25000, 2),
    );
    let payee = svc.store.seed_account(
        "Corner Shop",
        "shop@example.com",
        AccountRole::ReceiverOnly,
        Decimal::ZERO,
    );

    let record = svc
        .coordinator
        .transfer(TransferRequest::new(payer, payee, Decimal::new(7550, 2)))
        .await
        .unwrap();
    assert_eq!(record.status, TransactionStatus::Completed);

    let payer_balance = svc.store.get(payer).await.unwrap().unwrap().balance;
    let payee_balance = svc.store.get(payee).await.unwrap().unwrap().balance;
    assert_eq!(payer_balance, Decimal::new(17450, 2));
    assert_eq!(payee_balance, Decimal::new(7550, 2));

    // First delivery is rejected, the retry goes through
    let summary = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let summary = svc.dispatcher.summary(record.id).await.unwrap();
            if summary.sent == 1 {
                return summary;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("notification was not delivered");

    assert_eq!(summary.total, 1);
    assert_eq!(summary.notifications[0].attempts, 2);
    assert_eq!(
        summary.notifications[0].message,
        "Hello Corner Shop! You received a transfer of 75.50 from Alice."
    );
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn denied_transfer_moves_nothing() {
    let hits = Arc::new(AtomicUsize::new(0));
    let svc = start(false, 0, hits.clone()).await;

    let payer = svc.store.seed_account(
        "Alice",
        "alice@example.com",
        AccountRole::SenderCapable,
        Decimal::new(10000, 2),
    );
    let payee = svc.store.seed_account(
        "Bob",
        "bob@example.com",
        AccountRole::SenderCapable,
        Decimal::ZERO,
    );

    let err = svc
        .coordinator
        .transfer(TransferRequest::new(payer, payee, Decimal::new(100, 2)))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::NotAuthorized(_)));

    assert_eq!(
        svc.store.get(payer).await.unwrap().unwrap().balance,
        Decimal::new(10000, 2)
    );
    assert_eq!(svc.coordinator.account_stats(payer).await.unwrap().total_transactions_sent, 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
