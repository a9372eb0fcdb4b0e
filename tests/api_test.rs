//! Learning platform client tests
//!
//! Request shape, auth header, lecture mapping and error handling.

use mockito::{Matcher, Server};
use serde_json::json;

use lectern::api::{ApiError, LearningClient, SyncClient};
use lectern::models::{LectureId, PlaybackTelemetry, ProgressUpdate, TelemetryKind};

fn client(server: &Server) -> LearningClient {
    LearningClient::with_base_url(server.url()).with_token("tok-123")
}

// =============================================================================
// Progress
// =============================================================================

#[tokio::test]
async fn test_fetch_progress_sends_bearer_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/progress/course/c1")
        .match_header("authorization", "Bearer tok-123")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "summary": {"totalLectures": 3, "knownDurations": 3, "totalDuration": 1800,
                            "totalWatched": 660, "percent": 0.3667, "remainingSeconds": 1140},
                "items": [
                    {"lectureId": "l1", "position": 600, "duration": 600, "isComplete": true},
                    {"lectureId": "l2", "position": 60, "duration": 600, "isComplete": false}
                ]
            }"#,
        )
        .create_async()
        .await;

    let progress = client(&server).fetch_progress("c1").await.unwrap();
    mock.assert_async().await;

    assert_eq!(progress.summary.total_lectures, 3);
    assert_eq!(progress.summary.percent_rounded(), 37);
    assert_eq!(progress.items.len(), 2);
    assert!(progress.items[0].is_complete);
    assert_eq!(progress.items[1].position, 60.0);
}

#[tokio::test]
async fn test_persist_progress_omits_is_complete_when_unset() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/progress/upsert")
        .match_body(Matcher::Json(json!({
            "courseId": "c1",
            "lectureId": "l1",
            "videoId": "v1",
            "position": 61.0,
            "duration": 600.0
        })))
        .with_status(200)
        .with_body(r#"{"ok": true}"#)
        .create_async()
        .await;

    let update = ProgressUpdate {
        course_id: "c1".to_string(),
        lecture_id: LectureId::new("l1"),
        video_ref: Some("v1".to_string()),
        position: 61.0,
        duration: 600.0,
        is_complete: None,
    };
    let ack = client(&server).persist_progress(&update).await.unwrap();
    mock.assert_async().await;
    assert!(ack.ok);
    assert!(!ack.completed);
}

#[tokio::test]
async fn test_persist_progress_completing_save() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/progress/upsert")
        .match_body(Matcher::PartialJson(json!({"isComplete": true, "position": 598.0})))
        .with_status(200)
        .with_body(r#"{"ok": true, "completed": true}"#)
        .create_async()
        .await;

    let update = ProgressUpdate {
        course_id: "c1".to_string(),
        lecture_id: LectureId::new("l1"),
        video_ref: None,
        position: 598.0,
        duration: 600.0,
        is_complete: Some(true),
    };
    let ack = client(&server).persist_progress(&update).await.unwrap();
    mock.assert_async().await;
    assert!(ack.completed);
}

// =============================================================================
// Lectures
// =============================================================================

#[tokio::test]
async fn test_fetch_lectures_maps_and_sorts() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/courses/c1/lectures")
        .with_status(200)
        .with_body(
            r#"[
                {"_id": "b", "title": "Second", "orderIndex": 2, "videoUrl": "https://cdn/b/index.m3u8", "videoId": "vb"},
                {"lectureId": "a", "title": "First", "orderIndex": 1, "previewUrl": "https://cdn/a.mp4", "isPreview": true},
                {"_id": "c"}
            ]"#,
        )
        .create_async()
        .await;

    let lectures = client(&server).fetch_lectures("c1").await.unwrap();
    let ids: Vec<&str> = lectures.iter().map(|l| l.lecture_id.as_str()).collect();
    // "c" has no order and defaults to 1; sort is stable
    assert_eq!(ids, vec!["a", "c", "b"]);

    assert!(lectures[0].is_preview);
    assert_eq!(lectures[0].source_ref.as_deref(), Some("https://cdn/a.mp4"));
    assert_eq!(lectures[1].title, "Lecture");
    assert_eq!(lectures[2].video_ref.as_deref(), Some("vb"));
}

#[tokio::test]
async fn test_fetch_lectures_non_array_is_empty() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/courses/c1/lectures")
        .with_status(200)
        .with_body(r#"{"lectures": []}"#)
        .create_async()
        .await;

    assert!(client(&server).fetch_lectures("c1").await.unwrap().is_empty());
}

// =============================================================================
// Enrollment and telemetry
// =============================================================================

#[tokio::test]
async fn test_is_enrolled() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/courses/c1/purchased")
        .with_status(200)
        .with_body(r#"{"purchased": true}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/api/courses/c2/purchased")
        .with_status(200)
        .with_body(r#"{}"#)
        .create_async()
        .await;

    let client = client(&server);
    assert!(client.is_enrolled("c1").await.unwrap());
    assert!(!client.is_enrolled("c2").await.unwrap());
}

#[tokio::test]
async fn test_log_event_posts_telemetry() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/logs")
        .match_body(Matcher::Json(json!({"event": "pause", "position": 42.0})))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let event = PlaybackTelemetry {
        event: TelemetryKind::Pause,
        position: 42.0,
        duration: None,
    };
    client(&server).log_event(&event).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_saves_all_reach_server() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/progress/upsert")
        .with_status(200)
        .with_body(r#"{"ok": true}"#)
        .expect(3)
        .create_async()
        .await;

    let client = client(&server);
    let updates: Vec<ProgressUpdate> = (1..=3)
        .map(|i| ProgressUpdate {
            course_id: "c1".to_string(),
            lecture_id: LectureId::new(format!("l{}", i)),
            video_ref: None,
            position: 60.0 * i as f64,
            duration: 600.0,
            is_complete: None,
        })
        .collect();
    let results = futures::future::join_all(updates.iter().map(|u| client.persist_progress(u))).await;

    for result in results {
        let ack = tokio_test::assert_ok!(result);
        assert!(ack.ok);
    }
    mock.assert_async().await;
}

// =============================================================================
// Error handling
// =============================================================================

#[tokio::test]
async fn test_unauthorized() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/progress/course/c1")
        .with_status(401)
        .create_async()
        .await;

    let result = client(&server).fetch_progress("c1").await;
    assert!(matches!(result, Err(ApiError::Unauthorized)));
}

#[tokio::test]
async fn test_not_found() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/courses/missing/lectures")
        .with_status(404)
        .create_async()
        .await;

    let result = client(&server).fetch_lectures("missing").await;
    assert!(matches!(result, Err(ApiError::NotFound)));
}

#[tokio::test]
async fn test_server_error_uses_body_message() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/progress/upsert")
        .with_status(400)
        .with_body(r#"{"message": "position must be a number"}"#)
        .create_async()
        .await;

    let update = ProgressUpdate {
        course_id: "c1".to_string(),
        lecture_id: LectureId::new("l1"),
        video_ref: None,
        position: 1.0,
        duration: 0.0,
        is_complete: None,
    };
    match client(&server).persist_progress(&update).await {
        Err(ApiError::Server(400, message)) => assert_eq!(message, "position must be a number"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_server_unavailable_message() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/progress/course/c1")
        .with_status(503)
        .with_body("<html>Bad gateway</html>")
        .create_async()
        .await;

    match client(&server).fetch_progress("c1").await {
        Err(ApiError::Server(503, message)) => assert!(message.contains("unavailable")),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_json() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/progress/course/c1")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let result = client(&server).fetch_progress("c1").await;
    assert!(matches!(result, Err(ApiError::InvalidResponse(_))));
}

#[test]
fn test_client_without_token_sends_no_credential() {
    let client = LearningClient::with_base_url("http://api.test");
    assert!(!client.has_token());
    let url = client.resolver().stream_url(&LectureId::new("l1")).unwrap();
    assert_eq!(url, "http://api.test/api/stream/l1");
}
