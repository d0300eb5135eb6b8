//! Client API for this organisation's own staff.
//!
//! Consent views degrade to empty lists when the node is unreachable; the push channel carries the
//! same views as they change.

use crate::AppState;
use api_shared::{
    AccessLogEntryRes, AccessLogQuery, ConsentRowRes, CreateConsentReq, CreateConsentRes,
    InboxEntryRes, ObservationRes, OrganisationRes, OrganisationSearchQuery, PatientRes,
    TransactionRes,
};
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::Json,
};
use ehr_core::{AccessLog, EhrError, ObservationStore, Patient, PatientStore};
use ehr_types::{NonEmptyText, Urn};
use node_client::RegistryApi;

type ApiError = (StatusCode, &'static str);

async fn find_patient(state: &AppState, id: &str) -> Result<Patient, ApiError> {
    match state.services.records.by_id(id).await {
        Ok(patient) => Ok(patient),
        Err(EhrError::PatientNotFound(_)) => Err((StatusCode::NOT_FOUND, "Patient not found")),
        Err(e) => {
            tracing::error!("Patient lookup error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

fn subject_of(patient: &Patient) -> Result<Urn, ApiError> {
    patient.subject_urn().map_err(|e| {
        tracing::error!("Patient {} has an unusable BSN: {:?}", patient.id, e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    })
}

#[utoipa::path(
    get,
    path = "/api/patients",
    responses(
        (status = 200, description = "All local patients", body = [PatientRes]),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn list_patients(
    State(state): State<AppState>,
) -> Result<Json<Vec<PatientRes>>, ApiError> {
    match state.services.records.all().await {
        Ok(patients) => Ok(Json(patients.into_iter().map(Into::into).collect())),
        Err(e) => {
            tracing::error!("List patients error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/patients/{id}",
    params(("id" = String, Path, description = "Local patient id")),
    responses(
        (status = 200, description = "Patient", body = PatientRes),
        (status = 404, description = "Patient not found")
    )
)]
#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<PatientRes>, ApiError> {
    let patient = find_patient(&state, &id).await?;
    Ok(Json(patient.into()))
}

#[utoipa::path(
    get,
    path = "/api/patients/{id}/observations",
    params(("id" = String, Path, description = "Local patient id")),
    responses(
        (status = 200, description = "Observations for the patient", body = [ObservationRes]),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn list_observations(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<Vec<ObservationRes>>, ApiError> {
    match state.services.records.by_patient_id(&id).await {
        Ok(observations) => Ok(Json(observations.into_iter().map(Into::into).collect())),
        Err(e) => {
            tracing::error!("List observations error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/consent/{patient_id}/given",
    params(("patient_id" = String, Path, description = "Local patient id")),
    responses(
        (status = 200, description = "Confirmed and pending consents this organisation gave", body = [ConsentRowRes]),
        (status = 404, description = "Patient not found")
    )
)]
/// Consents this organisation extended to others for a patient
///
/// Confirmed consents come first, followed by requests the node has not completed yet.
#[axum::debug_handler]
pub async fn given_consents(
    State(state): State<AppState>,
    AxumPath(patient_id): AxumPath<String>,
) -> Result<Json<Vec<ConsentRowRes>>, ApiError> {
    let patient = find_patient(&state, &patient_id).await?;
    let subject = subject_of(&patient)?;
    let rows = state.services.reconciler.given(&subject).await;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/api/consent/{patient_id}/received",
    params(("patient_id" = String, Path, description = "Local patient id")),
    responses(
        (status = 200, description = "Consents other custodians gave this organisation", body = [ConsentRowRes]),
        (status = 404, description = "Patient not found")
    )
)]
#[axum::debug_handler]
pub async fn received_consents(
    State(state): State<AppState>,
    AxumPath(patient_id): AxumPath<String>,
) -> Result<Json<Vec<ConsentRowRes>>, ApiError> {
    let patient = find_patient(&state, &patient_id).await?;
    let subject = subject_of(&patient)?;
    let rows = state.services.reconciler.received(&subject).await;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/api/consent/inbox",
    responses(
        (status = 200, description = "Patients shared with this organisation but not known locally", body = [InboxEntryRes])
    )
)]
#[axum::debug_handler]
pub async fn consent_inbox(State(state): State<AppState>) -> Json<Vec<InboxEntryRes>> {
    let inbox = state.services.reconciler.inbox().await;
    Json(inbox.into_iter().map(Into::into).collect())
}

#[utoipa::path(
    get,
    path = "/api/consent/transactions",
    responses(
        (status = 200, description = "Consent-request jobs on the node", body = [TransactionRes])
    )
)]
#[axum::debug_handler]
pub async fn consent_transactions(State(state): State<AppState>) -> Json<Vec<TransactionRes>> {
    let transactions = state.services.reconciler.transactions().await;
    Json(transactions.into_iter().map(Into::into).collect())
}

#[utoipa::path(
    put,
    path = "/api/consent/{patient_id}",
    params(("patient_id" = String, Path, description = "Local patient id")),
    request_body = CreateConsentReq,
    responses(
        (status = 201, description = "Consent request accepted by the node", body = CreateConsentRes),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Patient not found"),
        (status = 500, description = "Internal server error")
    )
)]
/// Ask the node to register consent for another organisation
///
/// The request shows as pending in the given view until the node reports the job completed.
#[axum::debug_handler]
pub async fn create_consent(
    State(state): State<AppState>,
    AxumPath(patient_id): AxumPath<String>,
    Json(req): Json<CreateConsentReq>,
) -> Result<(StatusCode, Json<CreateConsentRes>), ApiError> {
    let actor = match Urn::parse(&req.organisation_urn) {
        Ok(urn) => urn,
        Err(e) => {
            tracing::error!("Invalid organisation URN: {:?}", e);
            return Err((StatusCode::BAD_REQUEST, "Invalid organisation URN"));
        }
    };
    let reason = match NonEmptyText::new(&req.reason) {
        Ok(reason) => reason,
        Err(_) => return Err((StatusCode::BAD_REQUEST, "Reason is required")),
    };

    match state
        .services
        .requester
        .request(&patient_id, actor, reason)
        .await
    {
        Ok(job) => Ok((StatusCode::CREATED, Json(job.into()))),
        Err(EhrError::PatientNotFound(_)) => Err((StatusCode::NOT_FOUND, "Patient not found")),
        Err(e) => {
            tracing::error!("Create consent error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/organisation/me",
    responses(
        (status = 200, description = "This organisation", body = OrganisationRes)
    )
)]
#[axum::debug_handler]
pub async fn own_organisation(State(state): State<AppState>) -> Json<OrganisationRes> {
    let config = &state.services.config;
    Json(OrganisationRes {
        identifier: config.organisation_urn().to_string(),
        name: config.organisation_name().to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/api/organisation/search",
    params(("query" = String, Query, description = "Part of an organisation name")),
    responses(
        (status = 200, description = "Matching organisations sorted by name", body = [OrganisationRes]),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn search_organisations(
    State(state): State<AppState>,
    Query(params): Query<OrganisationSearchQuery>,
) -> Result<Json<Vec<OrganisationRes>>, ApiError> {
    match state
        .services
        .node
        .registry
        .search_organisations(&params.query)
        .await
    {
        Ok(found) => Ok(Json(found.into_iter().map(Into::into).collect())),
        Err(e) => {
            tracing::error!("Organisation search error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

#[utoipa::path(
    get,
    path = "/access-log",
    params(("patientId" = String, Query, description = "Local patient id")),
    responses(
        (status = 200, description = "Data releases for the patient", body = [AccessLogEntryRes]),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn access_log(
    State(state): State<AppState>,
    Query(params): Query<AccessLogQuery>,
) -> Result<Json<Vec<AccessLogEntryRes>>, ApiError> {
    match state
        .services
        .access_log
        .by_patient_id(&params.patient_id)
        .await
    {
        Ok(entries) => Ok(Json(entries.into_iter().map(Into::into).collect())),
        Err(e) => {
            tracing::error!("Access log query error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}
