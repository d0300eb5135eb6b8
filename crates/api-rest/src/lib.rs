//! # API REST
//!
//! REST and push API for the EHR service.
//!
//! Handles:
//! - the client API used by this organisation's own staff (`/api/...`)
//! - the gated external API used by other organisations (`/external/...`)
//! - event ingestion and the WebSocket push channel (`/events/...`)
//! - OpenAPI/Swagger documentation
//!
//! Uses `api-shared` for wire types and credential extraction, and `ehr-core` for everything else.

#![warn(rust_2018_idioms)]

pub mod client;
pub mod external;
pub mod push;

use api_shared::{
    AccessLogEntryRes, ConsentRowRes, CreateConsentReq, CreateConsentRes, ExternalDataRes,
    HealthRes, HealthService, InboxEntryRes, NotifyEventReq, NotifyEventRes, ObservationRes,
    OrganisationRes, PatientRes, TransactionRes,
};
use axum::{
    extract::State,
    response::Json,
    routing::{get, post, put},
    Router,
};
use ehr_core::EhrServices;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub services: EhrServices,
}

impl AppState {
    pub fn new(services: EhrServices) -> Self {
        Self { services }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        client::list_patients,
        client::get_patient,
        client::list_observations,
        client::given_consents,
        client::received_consents,
        client::consent_inbox,
        client::consent_transactions,
        client::create_consent,
        client::own_organisation,
        client::search_organisations,
        client::access_log,
        external::external_patient,
        external::external_observations,
        external::external_data,
        push::notify_event,
    ),
    components(schemas(
        HealthRes,
        PatientRes,
        ObservationRes,
        ConsentRowRes,
        InboxEntryRes,
        TransactionRes,
        OrganisationRes,
        CreateConsentReq,
        CreateConsentRes,
        ExternalDataRes,
        AccessLogEntryRes,
        NotifyEventReq,
        NotifyEventRes,
    ))
)]
pub struct ApiDoc;

/// Builds the full router, including Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/patients", get(client::list_patients))
        .route("/api/patients/:id", get(client::get_patient))
        .route("/api/patients/:id/observations", get(client::list_observations))
        .route("/api/consent/inbox", get(client::consent_inbox))
        .route("/api/consent/transactions", get(client::consent_transactions))
        .route("/api/consent/:patient_id", put(client::create_consent))
        .route("/api/consent/:patient_id/given", get(client::given_consents))
        .route("/api/consent/:patient_id/received", get(client::received_consents))
        .route("/api/organisation/me", get(client::own_organisation))
        .route("/api/organisation/search", get(client::search_organisations))
        .route("/access-log", get(client::access_log))
        .route("/external/patient", get(external::external_patient))
        .route("/external/observations", get(external::external_observations))
        .route("/external-data-endpoint", get(external::external_data))
        .route("/events/notify", post(push::notify_event))
        .route("/events/ws", get(push::push_socket))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint
///
/// Reports whether the process is up. The node is not contacted.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}
