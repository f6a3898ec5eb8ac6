//! E2E tests for populate / train / reuse / installed across restarts.

mod helpers;

use axum::http::StatusCode;

use helpers::{TestHarness, home_dataset};

#[tokio::test]
async fn e2e_train_reports_loaded_state() {
    let h = TestHarness::new().await;
    let (status, json) = h.populate(home_dataset("en")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["created"], true);

    let (status, json) = h.engine("train").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], true);
    assert_eq!(json["action"], "train");
    assert_eq!(json["lang"], "en");
    assert_eq!(json["state"], "loaded");

    let (_, alive) = h.get("/avi/alive").await;
    assert_eq!(alive["response"]["kit"]["intent"], true);
    assert_eq!(alive["response"]["engines"]["en"], "loaded");
}

#[tokio::test]
async fn e2e_installed_lists_trained_language() {
    let h = TestHarness::trained().await;

    let (status, json) = h.get("/intent_recognition/installed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["installed"], serde_json::json!(["en"]));

    let metadata = &json["data"]["en"];
    assert_eq!(metadata["language_code"], "en");
    assert_eq!(metadata["slot_name_mappings"]["turn_on_lights"]["room"], "room");
    assert_eq!(metadata["entities"]["room"]["utterances"]["lounge"], "living room");
}

/// After a restart the persisted model is reused without retraining and
/// answers exactly as before; repeating reuse changes nothing.
#[tokio::test]
async fn e2e_reuse_after_restart_is_idempotent() {
    let mut h = TestHarness::trained().await;
    let text = "could you switch the kitchen lights on";
    let (_, before) = h.recognize(text).await;

    h.restart();
    let (status, _) = h.recognize(text).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "fresh state has no model loaded");

    let (status, json) = h.engine("reuse").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "reused");
    let (_, first) = h.recognize(text).await;

    let (_, json) = h.engine("reuse").await;
    assert_eq!(json["outcome"], "reused");
    assert_eq!(json["state"], "loaded");
    let (_, second) = h.recognize(text).await;

    assert_eq!(first, second);
    assert_eq!(first["processor"], before["processor"]);
    assert_eq!(
        first["result"]["intent"]["intentName"],
        before["result"]["intent"]["intentName"]
    );
}

#[tokio::test]
async fn e2e_reuse_without_model_trains() {
    let h = TestHarness::new().await;
    h.populate(home_dataset("en")).await;

    let (status, json) = h.engine("reuse").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "trained");
    assert_eq!(json["state"], "loaded");
}

#[tokio::test]
async fn e2e_reuse_is_the_default_action() {
    let h = TestHarness::trained().await;
    let (status, json) = h.post("/intent_recognition/engine", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["action"], "reuse");
}

/// The saved corpus lets a restarted server retrain without a new populate.
#[tokio::test]
async fn e2e_retrain_after_restart_uses_saved_dataset() {
    let mut h = TestHarness::trained().await;
    h.restart();

    let (status, json) = h.engine("train").await;
    assert_eq!(status, StatusCode::OK, "{json}");
    let (_, json) = h.recognize("hello avi").await;
    assert_eq!(json["result"]["intent"]["intentName"], "greet");
}

#[tokio::test]
async fn e2e_wrong_language_populate_keeps_pending_dataset() {
    let h = TestHarness::new().await;
    h.populate(home_dataset("en")).await;

    let (status, json) = h.populate(home_dataset("pt")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "NOT_THE_CURRENT_LANGUAGE");
    assert!(json["error"].as_str().unwrap().contains("en"));

    // The English dataset staged earlier still trains.
    let (status, _) = h.engine("train").await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = h.recognize("hi there").await;
    assert_eq!(json["result"]["intent"]["intentName"], "greet");
}

/// Concurrent train requests for one language serialize on the slot lock
/// and leave a single loadable model behind.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn e2e_concurrent_trains_leave_consistent_model() {
    let mut h = TestHarness::new().await;
    h.populate(home_dataset("en")).await;

    let (a, b, c) = tokio::join!(h.engine("train"), h.engine("train"), h.recognize("hello avi"));
    assert_eq!(a.0, StatusCode::OK);
    assert_eq!(b.0, StatusCode::OK);
    // The parse either waited for a model or ran before any existed.
    assert!(c.0 == StatusCode::OK || c.0 == StatusCode::INTERNAL_SERVER_ERROR);

    h.restart();
    let (status, _) = h.engine("reuse").await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = h.recognize("hello avi").await;
    assert_eq!(json["result"]["intent"]["intentName"], "greet");
}
