//! Queue-monitor behavior against the in-memory provider: batch delivery,
//! visibility redelivery, the proxy-invoker boundary, and the convenience
//! constructors.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use smartpoll::{
    handler_fn, queue, DirectInvoker, InMemoryQueue, MessageQueue, MonitorConfig, PollError,
    QueueMonitor, ReceiveInvoker, ReceiveRequest, ReceivedMessage,
};
use smartpoll::queue::QueueResult;
use tokio::sync::mpsc;

fn fast_config(queue_name: &str) -> MonitorConfig {
    MonitorConfig {
        visibility_timeout_ms: 30_000,
        max_idle_delay_ms: 50,
        ..MonitorConfig::new(queue_name)
    }
}

#[tokio::test]
async fn wait_for_messages_returns_the_visible_batch() {
    let queue = Arc::new(InMemoryQueue::new());
    for order in 0..3 {
        queue.send_json("orders", json!({ "order": order })).await;
    }

    let monitor = QueueMonitor::new(queue.clone(), fast_config("orders")).unwrap();
    let batch = monitor
        .wait_for_messages()
        .await
        .unwrap()
        .expect("batch expected");

    assert_eq!(batch.len(), 3);
    assert_eq!(batch[0].payload, json!({ "order": 0 }));
    assert_eq!(monitor.payload_poll_count(), 1);
    assert_eq!(monitor.empty_poll_count(), 0);
    assert_eq!(monitor.queue_name(), "orders");
}

#[tokio::test]
async fn handler_loop_picks_up_messages_sent_after_start() {
    smartpoll::logging::init();

    let queue = Arc::new(InMemoryQueue::new());
    queue.ensure_queue("orders").await;

    let monitor = QueueMonitor::new(queue.clone(), fast_config("orders")).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<ReceivedMessage>>();
    monitor
        .start_message_handler(handler_fn(move |batch| {
            let tx = tx.clone();
            async move {
                tx.send(batch)
                    .map_err(|_| anyhow::anyhow!("receiver dropped"))?;
                Ok(())
            }
        }))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    queue.send_json("orders", json!({"order": 42})).await;

    let batch = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no batch within 2 s")
        .expect("handler channel closed");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].payload, json!({"order": 42}));

    monitor.stop().await.unwrap();
    assert!(monitor.payload_poll_count() >= 1);
}

#[tokio::test]
async fn unacknowledged_messages_are_redelivered_after_the_visibility_lapse() {
    let queue = Arc::new(InMemoryQueue::new());
    queue.send_json("orders", json!({"order": 1})).await;

    let mut config = fast_config("orders");
    config.visibility_timeout_ms = 50;

    let first = QueueMonitor::new(queue.clone(), config.clone()).unwrap();
    let batch = first.wait_for_messages().await.unwrap().unwrap();
    assert_eq!(batch[0].read_count, 1);

    tokio::time::sleep(Duration::from_millis(80)).await;

    let second = QueueMonitor::new(queue.clone(), config).unwrap();
    let redelivered = second.wait_for_messages().await.unwrap().unwrap();
    assert_eq!(redelivered[0].msg_id, batch[0].msg_id);
    assert_eq!(redelivered[0].read_count, 2);
}

/// Invoker that counts calls before delegating.
#[derive(Debug, Default)]
struct CountingInvoker {
    calls: AtomicUsize,
}

#[async_trait]
impl ReceiveInvoker for CountingInvoker {
    async fn invoke(
        &self,
        queue: &dyn MessageQueue,
        request: ReceiveRequest,
    ) -> QueueResult<Vec<ReceivedMessage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        DirectInvoker.invoke(queue, request).await
    }
}

#[tokio::test]
async fn a_custom_invoker_sees_every_receive() {
    let queue = Arc::new(InMemoryQueue::new());
    queue.send_json("orders", json!({"order": 1})).await;

    let invoker = Arc::new(CountingInvoker::default());
    let monitor = QueueMonitor::with_invoker(
        queue.clone(),
        invoker.clone() as Arc<dyn ReceiveInvoker>,
        fast_config("orders"),
    )
    .unwrap();

    let batch = monitor.wait_for_messages().await.unwrap().unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn a_missing_queue_surfaces_as_a_source_failure() {
    let queue = Arc::new(InMemoryQueue::new());
    let monitor = QueueMonitor::new(queue, fast_config("never-created")).unwrap();

    let result = monitor.wait_for_messages().await;
    assert!(matches!(result, Err(PollError::Source(_))));
}

#[tokio::test]
async fn wait_for_messages_convenience_builds_and_waits() {
    let queue = Arc::new(InMemoryQueue::new());
    queue.send_json("orders", json!({"order": 7})).await;

    let batch = queue::wait_for_messages(queue.clone(), fast_config("orders"))
        .await
        .unwrap()
        .expect("batch expected");
    assert_eq!(batch.len(), 1);
}

#[tokio::test]
async fn wait_for_messages_convenience_routes_through_the_invoker() {
    let queue = Arc::new(InMemoryQueue::new());
    queue.send_json("orders", json!({"order": 9})).await;

    let invoker = Arc::new(CountingInvoker::default());
    let batch = queue::wait_for_messages_with_invoker(
        queue.clone(),
        invoker.clone(),
        fast_config("orders"),
    )
    .await
    .unwrap()
    .expect("batch expected");

    assert_eq!(batch.len(), 1);
    assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn register_message_handler_convenience_routes_through_the_invoker() {
    let queue = Arc::new(InMemoryQueue::new());
    queue.send_json("orders", json!({"order": 9})).await;

    let invoker = Arc::new(CountingInvoker::default());
    let (tx, mut rx) = mpsc::unbounded_channel::<usize>();
    let monitor = queue::register_message_handler_with_invoker(
        queue.clone(),
        invoker.clone(),
        handler_fn(move |batch: Vec<ReceivedMessage>| {
            let tx = tx.clone();
            async move {
                tx.send(batch.len())
                    .map_err(|_| anyhow::anyhow!("receiver dropped"))?;
                Ok(())
            }
        }),
        fast_config("orders"),
    )
    .await
    .unwrap();

    let batch_len = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no batch within 2 s")
        .expect("handler channel closed");
    assert_eq!(batch_len, 1);
    assert!(invoker.calls.load(Ordering::SeqCst) >= 1);

    monitor.stop().await.unwrap();
}

#[tokio::test]
async fn register_message_handler_returns_a_stoppable_monitor() {
    let queue = Arc::new(InMemoryQueue::new());
    queue.send_json("orders", json!({"order": 7})).await;

    let (tx, mut rx) = mpsc::unbounded_channel::<usize>();
    let monitor = queue::register_message_handler(
        queue.clone(),
        handler_fn(move |batch: Vec<ReceivedMessage>| {
            let tx = tx.clone();
            async move {
                tx.send(batch.len())
                    .map_err(|_| anyhow::anyhow!("receiver dropped"))?;
                Ok(())
            }
        }),
        fast_config("orders"),
    )
    .await
    .unwrap();

    let batch_len = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no batch within 2 s")
        .expect("handler channel closed");
    assert_eq!(batch_len, 1);

    monitor.stop().await.unwrap();
}
