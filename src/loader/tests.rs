use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::DynamicImage;

use super::*;
use crate::domain::entities::Request;
use crate::domain::ports::mocks::{MockRequestHandler, Outcome, RecordingTarget};
use crate::infrastructure::dispatch::Transport;

fn picasso(handler: &Arc<MockRequestHandler>) -> Picasso {
    Picasso::builder()
        .add_request_handler(handler.clone())
        .batch_delay(Duration::from_millis(10))
        .retry_delay(Duration::from_millis(10))
        .logging_enabled(true)
        .build()
        .unwrap()
}

fn key(uri: &str) -> String {
    Request::builder(uri).build().unwrap().key()
}

fn recorder() -> (Arc<RecordingTarget>, Arc<dyn Target>) {
    let recorder = Arc::new(RecordingTarget::new());
    let target: Arc<dyn Target> = recorder.clone();
    (recorder, target)
}

async fn wait_for(recorder: &RecordingTarget, count: usize) -> Vec<Outcome> {
    tokio::time::timeout(Duration::from_secs(5), recorder.wait_for(count))
        .await
        .expect("timed out waiting for delivery")
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_into_delivers_then_serves_from_memory() {
    let handler = Arc::new(MockRequestHandler::new());
    let picasso = picasso(&handler);

    let (first, target) = recorder();
    picasso.load("mock:a").into(target);
    assert_eq!(
        wait_for(&first, 1).await,
        vec![Outcome::Loaded(key("mock:a"), LoadedFrom::Network)]
    );
    assert_eq!(first.prepared(), 1);

    let (second, target) = recorder();
    picasso.load("mock:a").into(target);
    assert_eq!(
        second.outcomes(),
        vec![Outcome::Loaded(key("mock:a"), LoadedFrom::Memory)]
    );
    assert_eq!(second.prepared(), 0);
    assert_eq!(handler.calls(), 1);

    let snapshot = picasso.snapshot();
    assert_eq!(snapshot.cache_hits, 1);
    assert_eq!(snapshot.cache_misses, 1);
}

#[tokio::test]
async fn test_new_request_replaces_target_request() {
    let handler = Arc::new(MockRequestHandler::gated());
    let picasso = picasso(&handler);
    let (recorder, target) = recorder();

    picasso.load("mock:a").into(target.clone());
    picasso.load("mock:b").into(target);
    handler.open_gate(2);

    assert_eq!(
        wait_for(&recorder, 1).await,
        vec![Outcome::Loaded(key("mock:b"), LoadedFrom::Network)]
    );
    settle().await;
    assert_eq!(recorder.outcomes().len(), 1);
}

#[tokio::test]
async fn test_cancel_request_suppresses_delivery() {
    let handler = Arc::new(MockRequestHandler::gated());
    let picasso = picasso(&handler);
    let (recorder, target) = recorder();

    picasso.load("mock:a").into(target.clone());
    picasso.cancel_request(&target);
    handler.open_gate(1);

    settle().await;
    assert!(recorder.outcomes().is_empty());
}

#[tokio::test]
async fn test_cancel_tag_cancels_awaiting_load() {
    let handler = Arc::new(MockRequestHandler::gated());
    let picasso = picasso(&handler);

    let pending = tokio::spawn(picasso.load("mock:a").tag("feed").load());
    settle().await;
    picasso.cancel_tag("feed");

    let result = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.unwrap_err(), LoadError::Cancelled);
    handler.open_gate(1);
}

#[tokio::test]
async fn test_load_and_get() {
    let handler = Arc::new(MockRequestHandler::new());
    let picasso = picasso(&handler);

    let loaded = picasso.load("mock:a").resize(4, 4).load().await.unwrap();
    assert_eq!(loaded.loaded_from, LoadedFrom::Network);
    assert_eq!((loaded.image.width(), loaded.image.height()), (4, 4));

    let got = picasso.load("mock:b").get().await.unwrap();
    assert_eq!(got.loaded_from, LoadedFrom::Network);
    assert_eq!(got.key, key("mock:b"));

    // get() leaves the memory cache untouched
    let again = picasso.load("mock:b").load().await.unwrap();
    assert_eq!(again.loaded_from, LoadedFrom::Network);
    assert_eq!(handler.calls(), 3);
}

#[tokio::test]
async fn test_fetch_warms_memory_cache() {
    let handler = Arc::new(MockRequestHandler::new());
    let picasso = picasso(&handler);

    picasso.load("mock:a").fetch().unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while picasso.snapshot().size == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let loaded = picasso.load("mock:a").load().await.unwrap();
    assert_eq!(loaded.loaded_from, LoadedFrom::Memory);
}

#[tokio::test]
async fn test_invalidate_drops_cached_variants() {
    let handler = Arc::new(MockRequestHandler::new());
    let picasso = picasso(&handler);

    picasso.load("mock:a").load().await.unwrap();
    picasso.load("mock:a").resize(2, 2).load().await.unwrap();
    assert_eq!(
        picasso.load("mock:a").load().await.unwrap().loaded_from,
        LoadedFrom::Memory
    );

    picasso.invalidate("mock:a");
    assert_eq!(picasso.snapshot().size, 0);
    assert_eq!(
        picasso.load("mock:a").load().await.unwrap().loaded_from,
        LoadedFrom::Network
    );
}

#[tokio::test]
async fn test_pause_and_resume_tag() {
    let handler = Arc::new(MockRequestHandler::new());
    let picasso = picasso(&handler);
    let (recorder, target) = recorder();

    picasso.pause_tag("gallery");
    picasso.load("mock:a").tag("gallery").into(target);
    settle().await;
    assert_eq!(handler.calls(), 0);
    assert!(recorder.outcomes().is_empty());

    picasso.resume_tag("gallery");
    assert_eq!(
        wait_for(&recorder, 1).await,
        vec![Outcome::Loaded(key("mock:a"), LoadedFrom::Network)]
    );
}

#[tokio::test]
async fn test_invalid_request_reports_error() {
    let handler = Arc::new(MockRequestHandler::new());
    let picasso = picasso(&handler);
    let (recorder, target) = recorder();

    picasso.load("mock:a").center_crop().into(target);
    assert!(matches!(
        recorder.outcomes().as_slice(),
        [Outcome::Failed(LoadError::InvalidRequest(_))]
    ));
    assert!(matches!(
        picasso.load("  ").fetch(),
        Err(LoadError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_unhandled_scheme_fails() {
    let handler = Arc::new(MockRequestHandler::new());
    let picasso = picasso(&handler);

    let err = picasso.load("gopher://a").load().await.unwrap_err();
    assert!(matches!(err, LoadError::UnrecognizedRequest { .. }));
}

#[tokio::test]
async fn test_data_uri_through_builtin_handler() {
    let handler = Arc::new(MockRequestHandler::new());
    let picasso = picasso(&handler);

    let mut png = Vec::new();
    DynamicImage::new_rgba8(6, 3)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    let uri = format!("data:image/png;base64,{}", STANDARD.encode(&png));

    let loaded = picasso.load(uri).load().await.unwrap();
    assert_eq!((loaded.image.width(), loaded.image.height()), (6, 3));
    assert_eq!(loaded.loaded_from, LoadedFrom::Memory);
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn test_shutdown_fails_pending_and_later_loads() {
    let handler = Arc::new(MockRequestHandler::gated());
    let picasso = picasso(&handler);
    let (recorder, target) = recorder();

    picasso.load("mock:a").into(target.clone());
    let pending = tokio::spawn(picasso.load("mock:b").load());
    settle().await;

    picasso.shutdown();
    picasso.shutdown();
    assert!(picasso.is_shutdown());

    let result = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.unwrap_err(), LoadError::ShutDown);
    assert_eq!(
        recorder.outcomes(),
        vec![Outcome::Failed(LoadError::ShutDown)]
    );

    picasso.load("mock:c").into(target);
    assert_eq!(recorder.outcomes().len(), 2);
    assert_eq!(
        picasso.load("mock:c").load().await.unwrap_err(),
        LoadError::ShutDown
    );
    handler.open_gate(2);
}

#[tokio::test]
async fn test_submit_racing_shutdown_still_resolves() {
    let handler = Arc::new(MockRequestHandler::new());
    let picasso = picasso(&handler);
    let request = Arc::new(Request::builder("mock:a").build().unwrap());
    let (action, reply) = Action::for_reply(request, None);
    let action = Arc::new(action);

    // the caller passed its shutdown check just before shutdown ran
    picasso.shutdown();
    picasso.enqueue_and_submit(action.clone());

    let result = tokio::time::timeout(Duration::from_secs(5), reply)
        .await
        .expect("reply never resolved")
        .unwrap();
    assert_eq!(result.unwrap_err(), LoadError::ShutDown);
    assert!(action.is_cancelled());
    assert!(picasso.inner.actions.lock().is_empty());
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn test_network_state_resizes_pool() {
    let handler = Arc::new(MockRequestHandler::new());
    let picasso = picasso(&handler);

    picasso.set_network_state(NetworkState::connected(Transport::Wifi));
    tokio::time::timeout(Duration::from_secs(5), async {
        while picasso.thread_count() != 4 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}
