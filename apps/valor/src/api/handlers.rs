//! # API Endpoint Handlers
//!
//! Reads take the session read lock; every mutation route takes the write
//! lock for the whole batch so a batch is applied without interleaving.

use super::{
    AppState,
    types::{
        DescendantsQuery, EntityResponse, ErrorResponse, HealthResponse, IdentityList,
        MutationBody, OneOrMany, StatusResponse,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use valor_core::{
    BatchReport, CharacterSnapshot, CreateRequest, DerivedSheet, EmbedRequest, EntityId,
    FeedOutcome, Identity, MutationEngine, PointTotals, TransferRequest, UpdateRequest,
    ValorError, primitives::MAX_TRAVERSAL_DEPTH, store::ChangeEvent,
};

/// Largest batch accepted by a single mutation or feed request.
pub const MAX_BATCH_ITEMS: usize = 1000;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(e: &ValorError) -> ApiError {
    let status = match e {
        ValorError::NotFound(_) => StatusCode::NOT_FOUND,
        ValorError::InvalidRecord(_)
        | ValorError::NoCollection(_)
        | ValorError::CycleRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ValorError::TraversalLimit(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::new(e.to_string())))
}

fn check_batch<T>(items: &[T]) -> Result<(), ApiError> {
    if items.len() > MAX_BATCH_ITEMS {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(ErrorResponse::new(format!(
                "batch of {} items exceeds maximum {}",
                items.len(),
                MAX_BATCH_ITEMS
            ))),
        ));
    }
    Ok(())
}

// =============================================================================
// HEALTH & STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Entity and collection counts.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    (StatusCode::OK, Json(StatusResponse::from(session.stats())))
}

// =============================================================================
// ENTITY READS
// =============================================================================

pub async fn entity_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EntityResponse>, ApiError> {
    let id = EntityId::new(id);
    let session = state.session.read().await;
    let meta = session
        .read(&id)
        .cloned()
        .ok_or_else(|| api_error(&ValorError::NotFound(id.to_string())))?;
    let data = session.record(&id).cloned();
    Ok(Json(EntityResponse { meta, data }))
}

pub async fn descendants_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DescendantsQuery>,
) -> Result<Json<IdentityList>, ApiError> {
    if let Some(depth) = query.depth
        && depth > MAX_TRAVERSAL_DEPTH
    {
        return Err(api_error(&ValorError::TraversalLimit(format!(
            "depth {depth} exceeds {MAX_TRAVERSAL_DEPTH}"
        ))));
    }
    let id = EntityId::new(id);
    let session = state.session.read().await;
    if !session.check(&id) {
        return Err(api_error(&ValorError::NotFound(id.to_string())));
    }
    Ok(Json(IdentityList {
        items: session.descendants_of(&id, query.depth),
    }))
}

pub async fn trail_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<IdentityList>, ApiError> {
    let id = EntityId::new(id);
    let session = state.session.read().await;
    if !session.check(&id) {
        return Err(api_error(&ValorError::NotFound(id.to_string())));
    }
    Ok(Json(IdentityList {
        items: session.trail_of(&id),
    }))
}

// =============================================================================
// MUTATIONS
// =============================================================================

pub async fn create_handler(
    State(state): State<AppState>,
    Json(body): Json<MutationBody<CreateRequest>>,
) -> Result<Json<BatchReport>, ApiError> {
    let items = body.items.into_vec();
    check_batch(&items)?;
    let mut session = state.session.write().await;
    Ok(Json(MutationEngine::create(&mut session, items, body.options)))
}

pub async fn update_handler(
    State(state): State<AppState>,
    Json(body): Json<MutationBody<UpdateRequest>>,
) -> Result<Json<BatchReport>, ApiError> {
    let items = body.items.into_vec();
    check_batch(&items)?;
    let mut session = state.session.write().await;
    Ok(Json(MutationEngine::update(&mut session, items, body.options)))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Json(body): Json<MutationBody<Identity>>,
) -> Result<Json<BatchReport>, ApiError> {
    let items = body.items.into_vec();
    check_batch(&items)?;
    let mut session = state.session.write().await;
    Ok(Json(MutationEngine::delete(&mut session, items, body.options)))
}

pub async fn embed_handler(
    State(state): State<AppState>,
    Json(body): Json<MutationBody<EmbedRequest>>,
) -> Result<Json<BatchReport>, ApiError> {
    let items = body.items.into_vec();
    check_batch(&items)?;
    let mut session = state.session.write().await;
    Ok(Json(MutationEngine::embed(&mut session, items, body.options)))
}

pub async fn transfer_handler(
    State(state): State<AppState>,
    Json(body): Json<MutationBody<TransferRequest>>,
) -> Result<Json<BatchReport>, ApiError> {
    let items = body.items.into_vec();
    check_batch(&items)?;
    let mut session = state.session.write().await;
    Ok(Json(MutationEngine::transfer(&mut session, items, body.options)))
}

pub async fn eject_handler(
    State(state): State<AppState>,
    Json(body): Json<MutationBody<Identity>>,
) -> Result<Json<BatchReport>, ApiError> {
    let items = body.items.into_vec();
    check_batch(&items)?;
    let mut session = state.session.write().await;
    Ok(Json(MutationEngine::eject(&mut session, items, body.options)))
}

// =============================================================================
// CHANGE FEED
// =============================================================================

/// Apply externally observed changes in order.
pub async fn feed_handler(
    State(state): State<AppState>,
    Json(events): Json<OneOrMany<ChangeEvent>>,
) -> Result<Json<Vec<FeedOutcome>>, ApiError> {
    let events = events.into_vec();
    check_batch(&events)?;
    let mut session = state.session.write().await;
    Ok(Json(session.apply_feed(events)))
}

// =============================================================================
// DERIVED VALUES
// =============================================================================

pub async fn totals_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PointTotals>, ApiError> {
    let session = state.session.read().await;
    let snapshot = CharacterSnapshot::from_session(&session, &EntityId::new(id))
        .map_err(|e| api_error(&e))?;
    Ok(Json(snapshot.totals()))
}

pub async fn derived_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DerivedSheet>, ApiError> {
    let session = state.session.read().await;
    let snapshot = CharacterSnapshot::from_session(&session, &EntityId::new(id))
        .map_err(|e| api_error(&e))?;
    Ok(Json(snapshot.derive()))
}
