use api_lib::config::Config;
use api_lib::web::{self, rest::{BookResponse, ChapterCountResponse, VersesResponse, VersionResponse}, AppState};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use scripture_reader_core::domain::{HighlightColor, User};
use scripture_reader_core::ports::{AuthEvent, AuthSessionStore};
use scripture_reader_core::InMemoryStore;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

fn test_app() -> (Arc<InMemoryStore>, Arc<AppState>, Router) {
    let config = Config::from_lookup(|name| match name {
        "STORE_BACKEND" => Some("memory".to_string()),
        _ => None,
    })
    .unwrap();
    let store = Arc::new(InMemoryStore::with_sample());
    let state = Arc::new(AppState::new(store.clone(), Arc::new(config)));
    (store, state.clone(), web::router(state))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_with_session(uri: &str, session_id: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, format!("session={}", session_id))
        .body(Body::empty())
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json<T: DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn lists_books_in_canonical_order() {
    let (_, _, app) = test_app();
    let response = app.oneshot(get("/books")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let books: Vec<BookResponse> = body_json(response).await;
    let names: Vec<&str> = books.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, ["Genesis", "John"]);
}

#[tokio::test]
async fn chapter_count_and_unknown_book() {
    let (_, _, app) = test_app();

    let response = app.clone().oneshot(get("/books/1/chapters")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let count: ChapterCountResponse = body_json(response).await;
    assert_eq!(count, ChapterCountResponse { book_id: 1, chapter_count: 50 });

    let response = app.oneshot(get("/books/999/chapters")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn verses_default_to_configured_version_in_order() {
    let (_, _, app) = test_app();
    let response = app.oneshot(get("/books/1/chapters/1/verses")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: VersesResponse = body_json(response).await;
    assert_eq!(body.version, "ACF");
    assert_eq!(body.verses.len(), 31);
    assert!(body.verses.windows(2).all(|w| w[0].verse_number < w[1].verse_number));
    assert_eq!(body.verses[0].text, "No princípio criou Deus os céus e a terra.");
    assert!(body.verses.iter().all(|v| v.highlight.is_none()));
}

#[tokio::test]
async fn missing_version_and_chapter_are_not_found() {
    let (_, _, app) = test_app();

    let response = app.clone().oneshot(get("/books/1/chapters/1/verses?version=xyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("XYZ version isn't available yet"));

    let response = app.clone().oneshot(get("/books/1/chapters/51/verses")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get("/books/999/chapters/1/verses")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn highlights_are_only_shown_to_their_owner() {
    let (store, _, app) = test_app();
    let user = User { user_id: Uuid::new_v4(), email: Some("leitor@example.com".into()) };
    store.add_auth_session("abc", user.clone());

    let response = app.clone().oneshot(get("/books/1/chapters/1/verses")).await.unwrap();
    let body: VersesResponse = body_json(response).await;
    let first = body.verses[0].id;
    store.seed_highlight(first, user.user_id, HighlightColor::Green);

    let response = app
        .clone()
        .oneshot(get_with_session("/books/1/chapters/1/verses", "abc"))
        .await
        .unwrap();
    let body: VersesResponse = body_json(response).await;
    assert_eq!(body.verses[0].highlight.as_deref(), Some("green"));
    assert!(body.verses[1..].iter().all(|v| v.highlight.is_none()));

    // No cookie and an unknown cookie both read anonymously.
    let response = app.clone().oneshot(get("/books/1/chapters/1/verses")).await.unwrap();
    let body: VersesResponse = body_json(response).await;
    assert_eq!(body.verses[0].highlight, None);

    let response = app
        .oneshot(get_with_session("/books/1/chapters/1/verses", "stale"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn logout_ends_session_and_notifies_readers() {
    let (store, state, app) = test_app();
    let user = User { user_id: Uuid::new_v4(), email: None };
    store.add_auth_session("abc", user);
    let mut notices = state.auth_notifier.subscribe();

    let anonymous = Request::builder().method("POST").uri("/auth/logout").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(anonymous).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header(header::COOKIE, "session=abc")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.contains("Max-Age=0"));

    assert!(store.validate_auth_session("abc").await.is_err());
    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.session_id, "abc");
    assert_eq!(notice.event, AuthEvent::SignedOut);
}

#[tokio::test]
async fn versions_and_openapi_document_are_served() {
    let (_, _, app) = test_app();

    let response = app.clone().oneshot(get("/versions")).await.unwrap();
    let versions: Vec<VersionResponse> = body_json(response).await;
    assert_eq!(versions.len(), 6);
    assert_eq!(versions[0].code, "ACF");

    let response = app.oneshot(get("/api-docs/openapi.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc = body_text(response).await;
    assert!(doc.contains("/books/{book_id}/chapters/{chapter}/verses"));
    assert!(doc.contains("/auth/logout"));
}
