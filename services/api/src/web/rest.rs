//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::reader_error_response;
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use scripture_reader_core::domain::{BookId, User, KNOWN_VERSIONS};
use scripture_reader_core::fetcher::HighlightMap;
use scripture_reader_core::{ReaderError, VerseKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_books_handler,
        chapter_count_handler,
        list_verses_handler,
        list_versions_handler,
        crate::web::auth::logout_handler,
    ),
    components(
        schemas(BookResponse, ChapterCountResponse, VersesResponse, VerseResponse, VersionResponse)
    ),
    tags(
        (name = "Scripture Reader API", description = "Books, chapters and verses for the comparison reader.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct BookResponse {
    pub id: i64,
    pub name: String,
    pub alternate_name: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct ChapterCountResponse {
    pub book_id: i64,
    pub chapter_count: u32,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct VerseResponse {
    pub id: i64,
    pub verse_number: u32,
    pub text: String,
    /// The signed-in user's highlight color, if any.
    pub highlight: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct VersesResponse {
    pub book_id: i64,
    pub chapter_number: u32,
    pub version: String,
    pub verses: Vec<VerseResponse>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct VersionResponse {
    pub code: String,
    pub display_name: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VersesQuery {
    /// Version code; the configured default when omitted.
    pub version: Option<String>,
}

fn internal(context: &str, e: impl std::fmt::Debug) -> (StatusCode, String) {
    error!("{}: {:?}", context, e);
    (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List every book in canonical order.
#[utoipa::path(
    get,
    path = "/books",
    responses(
        (status = 200, description = "All books", body = [BookResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_books_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BookResponse>>, (StatusCode, String)> {
    let books = state
        .store
        .list_books()
        .await
        .map_err(|e| internal("Failed to list books", e))?;
    Ok(Json(
        books
            .into_iter()
            .map(|b| BookResponse {
                id: b.id,
                name: b.name,
                alternate_name: b.alternate_name,
            })
            .collect(),
    ))
}

/// Number of chapters in a book.
#[utoipa::path(
    get,
    path = "/books/{book_id}/chapters",
    params(("book_id" = i64, Path, description = "The book id.")),
    responses(
        (status = 200, description = "Chapter count", body = ChapterCountResponse),
        (status = 404, description = "Unknown book"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn chapter_count_handler(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<BookId>,
) -> Result<Json<ChapterCountResponse>, (StatusCode, String)> {
    let book = state
        .store
        .get_book(book_id)
        .await
        .map_err(|e| internal("Failed to load book", e))?;
    if book.is_none() {
        return Err(reader_error_response(&ReaderError::BookNotFound(book_id)));
    }
    let max = state
        .store
        .get_max_chapter_number(book_id)
        .await
        .map_err(|e| internal("Failed to count chapters", e))?;
    Ok(Json(ChapterCountResponse {
        book_id,
        chapter_count: max.unwrap_or(0),
    }))
}

/// Verses of one chapter in one version, with the caller's highlights.
#[utoipa::path(
    get,
    path = "/books/{book_id}/chapters/{chapter}/verses",
    params(
        ("book_id" = i64, Path, description = "The book id."),
        ("chapter" = u32, Path, description = "The chapter number, from 1."),
        VersesQuery
    ),
    responses(
        (status = 200, description = "Verses in ascending order", body = VersesResponse),
        (status = 404, description = "Unknown book or chapter, or version missing for this chapter"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_verses_handler(
    State(state): State<Arc<AppState>>,
    Path((book_id, chapter_number)): Path<(BookId, u32)>,
    Query(query): Query<VersesQuery>,
    Extension(user): Extension<Option<User>>,
) -> Result<Json<VersesResponse>, (StatusCode, String)> {
    let version = query
        .version
        .map(|v| v.trim().to_uppercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| state.config.default_version.clone());

    let key = VerseKey::new(book_id, chapter_number, &version);
    let verses = state
        .fetcher
        .fetch_verses(&key)
        .await
        .map_err(|e| reader_error_response(&e))?;

    let highlights = match &user {
        Some(user) => state
            .fetcher
            .fetch_highlights(user.user_id, &verses)
            .await
            .map_err(|e| reader_error_response(&e))?,
        None => Arc::new(HighlightMap::new()),
    };

    Ok(Json(VersesResponse {
        book_id,
        chapter_number,
        version,
        verses: verses
            .iter()
            .map(|v| VerseResponse {
                id: v.id,
                verse_number: v.verse_number,
                text: v.text.clone(),
                highlight: highlights.get(&v.id).map(|c| c.as_str().to_string()),
            })
            .collect(),
    }))
}

/// The version catalog offered by the panel selectors.
#[utoipa::path(
    get,
    path = "/versions",
    responses((status = 200, description = "Known versions", body = [VersionResponse]))
)]
pub async fn list_versions_handler() -> Json<Vec<VersionResponse>> {
    Json(
        KNOWN_VERSIONS
            .iter()
            .map(|v| VersionResponse {
                code: v.code.to_string(),
                display_name: v.display_name.to_string(),
            })
            .collect(),
    )
}
