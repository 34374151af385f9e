use crate::common::*;
use daimon::atoms::constants::FALLBACK_REPLY;
use daimon::{drain_inbox, CycleEngine, CycleQueue, InboundMessage, MemoryStore, ProviderRegistry};
use std::sync::Arc;
use std::time::Duration;

fn msg(text: &str, thread: &str) -> InboundMessage {
    InboundMessage::new(text, "sms", thread, "u1", "Ada")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queue_runs_cycles_one_at_a_time() {
    let mock = MockProvider::replying("mock", &unified_reply("queued")).with_delay(Duration::from_millis(50)).arc();
    let engine = Arc::new(engine(config(), &[mock.clone()]));
    let (queue, consumer) = CycleQueue::spawn(Arc::clone(&engine), 8);

    let mut handles = Vec::new();
    for i in 0..4 {
        let q = queue.clone();
        handles.push(tokio::spawn(async move { q.submit(msg(&format!("m{}", i), &format!("t{}", i))).await }));
    }
    for h in handles {
        assert_eq!(h.await.unwrap().unwrap(), "queued");
    }
    assert_eq!(mock.calls(), 4);
    assert_eq!(mock.max_in_flight(), 1);

    drop(queue);
    consumer.await.unwrap();
}

#[tokio::test]
async fn failing_cycle_still_answers() {
    // A store failure is the one error a cycle surfaces. Break the store
    // from a second connection.
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("daimon.db");
    let registry = ProviderRegistry::empty();
    registry.register(MockProvider::replying("mock", "hi").arc());
    let engine = Arc::new(CycleEngine::new(config(), MemoryStore::open(&db).unwrap(), Arc::new(registry)));
    rusqlite::Connection::open(&db).unwrap().execute("DROP TABLE user_profiles", []).unwrap();

    let (queue, _consumer) = CycleQueue::spawn(Arc::clone(&engine), 1);
    assert_eq!(queue.submit(msg("hello", "t")).await.unwrap(), FALLBACK_REPLY);
}

#[tokio::test]
async fn inbox_delivers_each_message_once() {
    let mock = MockProvider::replying("mock", &unified_reply("got it")).arc();
    let engine = Arc::new(engine(config(), &[mock.clone()]));
    let (queue, _consumer) = CycleQueue::spawn(Arc::clone(&engine), 4);
    let store = engine.store();

    assert!(store.enqueue_inbound("SM1", &msg("first", "t")).unwrap());
    assert!(!store.enqueue_inbound("SM1", &msg("first", "t")).unwrap());
    assert!(store.enqueue_inbound("SM2", &msg("second", "t")).unwrap());

    let mut delivered = Vec::new();
    let n = drain_inbox(store, &queue, 10, |m, reply| delivered.push((m.text.clone(), reply.to_string())))
        .await
        .unwrap();
    assert_eq!(n, 2);
    assert_eq!(
        delivered,
        vec![("first".to_string(), "got it".to_string()), ("second".to_string(), "got it".to_string())]
    );

    // A re-read of the same platform messages does nothing.
    assert!(!store.enqueue_inbound("SM1", &msg("first", "t")).unwrap());
    assert_eq!(drain_inbox(store, &queue, 10, |_, _| panic!("delivered twice")).await.unwrap(), 0);
    assert_eq!(mock.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn inbox_and_direct_submissions_share_one_consumer() {
    let mock = MockProvider::replying("mock", &unified_reply("ok")).with_delay(Duration::from_millis(50)).arc();
    let engine = Arc::new(engine(config(), &[mock.clone()]));
    let (queue, consumer) = CycleQueue::spawn(Arc::clone(&engine), 8);
    for i in 0..3 {
        engine.store().enqueue_inbound(&format!("SM{}", i), &msg(&format!("sms {}", i), "inbox")).unwrap();
    }

    let direct = {
        let q = queue.clone();
        tokio::spawn(async move {
            for i in 0..3 {
                assert_eq!(q.submit(msg(&format!("chat {}", i), "chat")).await.unwrap(), "ok");
            }
        })
    };
    let drained = drain_inbox(engine.store(), &queue, 10, |_, reply| assert_eq!(reply, "ok")).await.unwrap();
    direct.await.unwrap();

    assert_eq!(drained, 3);
    assert_eq!(mock.calls(), 6);
    assert_eq!(mock.max_in_flight(), 1);

    drop(queue);
    consumer.await.unwrap();
}

#[tokio::test]
async fn drain_fails_once_the_queue_is_closed() {
    let engine = Arc::new(engine(config(), &[MockProvider::replying("mock", &unified_reply("ok")).arc()]));
    let (queue, consumer) = CycleQueue::spawn(Arc::clone(&engine), 1);
    consumer.abort();
    let _ = consumer.await;
    engine.store().enqueue_inbound("SM9", &msg("late", "t")).unwrap();

    assert!(drain_inbox(engine.store(), &queue, 10, |_, _| panic!("no consumer")).await.is_err());
}
