//! Endpoints for other organisations, guarded by the authorization gate.
//!
//! Every failure, whether a denial or an internal error, is a bare `500` so a caller cannot tell
//! whether a patient is in care here.

use crate::AppState;
use api_shared::{auth::access_request, ExternalDataRes, ObservationRes, PatientRes};
use axum::{extract::State, http::HeaderMap, http::StatusCode, response::Json};
use ehr_core::{ObservationStore, RequestContext};

async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<RequestContext, StatusCode> {
    state
        .services
        .gate
        .authorize(&access_request(headers))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn observations_for(
    state: &AppState,
    context: &RequestContext,
) -> Result<Vec<ObservationRes>, StatusCode> {
    match state
        .services
        .records
        .by_patient_id(&context.patient.id)
        .await
    {
        Ok(observations) => Ok(observations.into_iter().map(Into::into).collect()),
        Err(e) => {
            tracing::error!("Observation query error: {:?}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[utoipa::path(
    get,
    path = "/external/patient",
    responses(
        (status = 200, description = "The patient named by the access token", body = PatientRes),
        (status = 500, description = "Denied or failed")
    )
)]
#[axum::debug_handler]
pub async fn external_patient(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PatientRes>, StatusCode> {
    let context = authorize(&state, &headers).await?;
    Ok(Json(context.patient.into()))
}

#[utoipa::path(
    get,
    path = "/external/observations",
    responses(
        (status = 200, description = "Observations of the patient named by the access token", body = [ObservationRes]),
        (status = 500, description = "Denied or failed")
    )
)]
#[axum::debug_handler]
pub async fn external_observations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ObservationRes>>, StatusCode> {
    let context = authorize(&state, &headers).await?;
    Ok(Json(observations_for(&state, &context).await?))
}

#[utoipa::path(
    get,
    path = "/external-data-endpoint",
    responses(
        (status = 200, description = "Patient and observations", body = ExternalDataRes),
        (status = 500, description = "Denied or failed")
    )
)]
/// Patient data for another organisation
///
/// Requires `Authorization: Bearer <token>`. Deployments requiring identity contracts also need
/// the `X-Identity-Contract` header, optionally with `X-Requesting-Organisation`.
#[axum::debug_handler]
pub async fn external_data(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ExternalDataRes>, StatusCode> {
    let context = authorize(&state, &headers).await?;
    let observations = observations_for(&state, &context).await?;
    Ok(Json(ExternalDataRes {
        patient: context.patient.into(),
        observations,
    }))
}
