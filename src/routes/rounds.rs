use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::round::{
        ActionResponse, CorrectScoreRequest, CreateRoundRequest, EditRoundRequest,
        JoinRoundRequest, ParticipantSummary, RoundListItem, RoundSummary, ScoreCorrectionSummary,
        ScoreReceiptResponse, SubmitScoreRequest,
    },
    error::AppError,
    services::round_service::{self, EventOutcome, FinalizeOutcome},
    state::{SharedState, round::RoundId},
};

/// Routes mapping each inbound round command to one orchestrator operation.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rounds", post(create_round).get(list_rounds))
        .route(
            "/rounds/{id}",
            get(get_round).patch(edit_round).delete(delete_round),
        )
        .route("/rounds/{id}/participants", post(join_round))
        .route("/rounds/{id}/scores", post(submit_score))
        .route("/rounds/{id}/scores/corrections", post(correct_score))
        .route("/rounds/{id}/finalize", post(finalize_round))
        .route("/rounds/{id}/start", post(start_round))
}

/// Schedule a new round.
#[utoipa::path(
    post,
    path = "/rounds",
    tag = "rounds",
    request_body = CreateRoundRequest,
    responses(
        (status = 200, description = "Round created and scheduled", body = RoundSummary),
        (status = 400, description = "Invalid input")
    )
)]
pub async fn create_round(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateRoundRequest>>,
) -> Result<Json<RoundSummary>, AppError> {
    let round = round_service::create_round(&state, payload.into()).await?;
    Ok(Json(RoundSummary::from(&round)))
}

/// List every round.
#[utoipa::path(
    get,
    path = "/rounds",
    tag = "rounds",
    responses((status = 200, description = "Known rounds", body = [RoundListItem]))
)]
pub async fn list_rounds(
    State(state): State<SharedState>,
) -> Result<Json<Vec<RoundListItem>>, AppError> {
    let rounds = round_service::list_rounds(&state).await?;
    Ok(Json(rounds.iter().map(RoundListItem::from).collect()))
}

/// Fetch a round with its participants and scores.
#[utoipa::path(
    get,
    path = "/rounds/{id}",
    tag = "rounds",
    params(("id" = u64, Path, description = "Round identifier")),
    responses(
        (status = 200, description = "Round details", body = RoundSummary),
        (status = 404, description = "Unknown round")
    )
)]
pub async fn get_round(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<RoundSummary>, AppError> {
    let round = round_service::get_round(&state, RoundId(id)).await?;
    Ok(Json(RoundSummary::from(&round)))
}

/// Edit an upcoming round.
#[utoipa::path(
    patch,
    path = "/rounds/{id}",
    tag = "rounds",
    params(("id" = u64, Path, description = "Round identifier")),
    request_body = EditRoundRequest,
    responses(
        (status = 200, description = "Round updated", body = RoundSummary),
        (status = 403, description = "Requestor may not edit this round"),
        (status = 409, description = "Round is no longer upcoming"),
        (status = 504, description = "Role lookup timed out")
    )
)]
pub async fn edit_round(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Valid(Json(payload)): Valid<Json<EditRoundRequest>>,
) -> Result<Json<RoundSummary>, AppError> {
    let (requestor, update) = payload.into_parts();
    let round = round_service::edit_round(&state, RoundId(id), requestor, update).await?;
    Ok(Json(RoundSummary::from(&round)))
}

/// Delete a round that is not finalized.
#[utoipa::path(
    delete,
    path = "/rounds/{id}",
    tag = "rounds",
    params(("id" = u64, Path, description = "Round identifier")),
    responses(
        (status = 200, description = "Round deleted", body = ActionResponse),
        (status = 409, description = "Finalized rounds cannot be deleted")
    )
)]
pub async fn delete_round(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<ActionResponse>, AppError> {
    let message = match round_service::delete_round(&state, RoundId(id)).await? {
        EventOutcome::Applied => "round deleted",
        _ => "round already deleted",
    };
    Ok(Json(ActionResponse {
        message: message.into(),
    }))
}

/// Join a round or change an existing response.
#[utoipa::path(
    post,
    path = "/rounds/{id}/participants",
    tag = "rounds",
    params(("id" = u64, Path, description = "Round identifier")),
    request_body = JoinRoundRequest,
    responses(
        (status = 200, description = "Participant recorded; tag resolves in the background", body = ParticipantSummary),
        (status = 409, description = "Round no longer accepts participants")
    )
)]
pub async fn join_round(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Json(payload): Json<JoinRoundRequest>,
) -> Result<Json<ParticipantSummary>, AppError> {
    let receipt =
        round_service::join_round(&state, RoundId(id), payload.user_id, payload.response).await?;
    Ok(Json(ParticipantSummary::from(&receipt.participant)))
}

/// Submit a participant's score.
#[utoipa::path(
    post,
    path = "/rounds/{id}/scores",
    tag = "rounds",
    params(("id" = u64, Path, description = "Round identifier")),
    request_body = SubmitScoreRequest,
    responses(
        (status = 200, description = "Score recorded", body = ScoreReceiptResponse),
        (status = 400, description = "Participant declined the round"),
        (status = 404, description = "Unknown round or participant")
    )
)]
pub async fn submit_score(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Json(payload): Json<SubmitScoreRequest>,
) -> Result<Json<ScoreReceiptResponse>, AppError> {
    let receipt =
        round_service::submit_score(&state, RoundId(id), payload.user_id, payload.score).await?;
    Ok(Json(ScoreReceiptResponse {
        round_id: receipt.round_id,
        user_id: receipt.user_id,
        score: receipt.score,
        finalized: receipt.finalized,
    }))
}

/// Correct a finalized score.
#[utoipa::path(
    post,
    path = "/rounds/{id}/scores/corrections",
    tag = "rounds",
    params(("id" = u64, Path, description = "Round identifier")),
    request_body = CorrectScoreRequest,
    responses(
        (status = 200, description = "Correction recorded", body = ScoreCorrectionSummary),
        (status = 403, description = "Requestor may not correct scores"),
        (status = 409, description = "Round is not finalized")
    )
)]
pub async fn correct_score(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Json(payload): Json<CorrectScoreRequest>,
) -> Result<Json<ScoreCorrectionSummary>, AppError> {
    let correction = round_service::correct_score(
        &state,
        RoundId(id),
        payload.requestor,
        payload.user_id,
        payload.score,
    )
    .await?;
    Ok(Json(ScoreCorrectionSummary::from(&correction)))
}

/// Seal the scores of an in-progress round now.
#[utoipa::path(
    post,
    path = "/rounds/{id}/finalize",
    tag = "rounds",
    params(("id" = u64, Path, description = "Round identifier")),
    responses(
        (status = 200, description = "Round finalized", body = ActionResponse),
        (status = 409, description = "Round is not in progress")
    )
)]
pub async fn finalize_round(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<ActionResponse>, AppError> {
    let message = match round_service::finalize_round(&state, RoundId(id)).await? {
        FinalizeOutcome::Finalized => "round finalized",
        FinalizeOutcome::AlreadyFinalized => "round already finalized",
    };
    Ok(Json(ActionResponse {
        message: message.into(),
    }))
}

/// Start a round without waiting for its scheduled start.
#[utoipa::path(
    post,
    path = "/rounds/{id}/start",
    tag = "rounds",
    params(("id" = u64, Path, description = "Round identifier")),
    responses(
        (status = 200, description = "Round started (or already past upcoming)", body = RoundSummary),
        (status = 404, description = "Unknown round")
    )
)]
pub async fn start_round(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<RoundSummary>, AppError> {
    let round = round_service::start_round_now(&state, RoundId(id)).await?;
    Ok(Json(RoundSummary::from(&round)))
}
