use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for the round coordinator.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rounds::create_round,
        crate::routes::rounds::list_rounds,
        crate::routes::rounds::get_round,
        crate::routes::rounds::edit_round,
        crate::routes::rounds::delete_round,
        crate::routes::rounds::join_round,
        crate::routes::rounds::submit_score,
        crate::routes::rounds::finalize_round,
        crate::routes::rounds::start_round,
        crate::routes::rounds::correct_score,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::round::CreateRoundRequest,
            crate::dto::round::JoinRoundRequest,
            crate::dto::round::SubmitScoreRequest,
            crate::dto::round::EditRoundRequest,
            crate::dto::round::CorrectScoreRequest,
            crate::dto::round::RoundSummary,
            crate::dto::round::RoundListItem,
            crate::dto::round::ParticipantSummary,
            crate::dto::round::ScoreLine,
            crate::dto::round::ScoreCorrectionSummary,
            crate::dto::round::ScoreReceiptResponse,
            crate::dto::round::ActionResponse,
            crate::state::round::ParticipantResponse,
            crate::state::state_machine::RoundPhase,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rounds", description = "Round lifecycle commands and reads"),
    )
)]
pub struct ApiDoc;
