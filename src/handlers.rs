use crate::config::Config;
use crate::errors::AppError;
use crate::fees::LenderQuote;
use crate::models::*;
use crate::quote_client::MortechClient;
use crate::scenario::MortechDirector;
use crate::states;
use crate::storage::RateQuoteStorage;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use moka::future::Cache;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: sqlx::PgPool,
    /// Application configuration.
    pub config: Config,
    /// Client for the Mortech pricing engine.
    pub mortech: Arc<MortechClient>,
    /// In-flight refresh deduplication cache, keyed by profile id. Prevents
    /// concurrent engine calls for the same profile.
    pub refresh_cache: Cache<Uuid, i64>,
}

impl AppState {
    fn storage(&self) -> RateQuoteStorage {
        RateQuoteStorage::new(self.db.clone())
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rate-quote-api",
            "version": "0.1.0"
        })),
    )
}

/// GET /api/v1/states
///
/// Licensed states the rate quote tool can price.
pub async fn licensed_states() -> Json<Value> {
    let states: Vec<Value> = states::STATES
        .iter()
        .map(|(name, code)| json!({ "name": name, "code": code }))
        .collect();
    Json(json!({ "states": states }))
}

fn is_valid_zipcode(zipcode: &str) -> bool {
    let zip_re = Regex::new(r"^\d{5}$").expect("valid zipcode pattern");
    zip_re.is_match(zipcode)
}

const VALUE_MIN: i64 = 10_000;
const VALUE_MAX: i64 = 10_000_000;

fn validate_common(
    credit_score: Option<i32>,
    property_zipcode: Option<&str>,
) -> Result<(), AppError> {
    if let Some(score) = credit_score {
        if score < 0 {
            return Err(AppError::BadRequest(
                "Credit score must be greater than 0.".to_string(),
            ));
        }
        if score > 850 {
            return Err(AppError::BadRequest(
                "Credit score must be less than 850.".to_string(),
            ));
        }
    }
    if let Some(zipcode) = property_zipcode {
        if !is_valid_zipcode(zipcode) {
            return Err(AppError::BadRequest(
                "Property zipcode must be 5 digits.".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_value_range(value: Option<i64>, label: &str) -> Result<(), AppError> {
    if let Some(value) = value {
        if value < VALUE_MIN {
            return Err(AppError::BadRequest(format!(
                "{} must be greater than {}.",
                label, VALUE_MIN
            )));
        }
        if value > VALUE_MAX {
            return Err(AppError::BadRequest(format!(
                "{} must be less than {}.",
                label, VALUE_MAX
            )));
        }
    }
    Ok(())
}

/// POST /api/v1/profiles/purchase
pub async fn create_purchase_profile(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PurchaseProfilePayload>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    tracing::info!("POST /profiles/purchase");

    validate_common(payload.credit_score, payload.property_zipcode.as_deref())?;
    validate_value_range(payload.target_value, "Purchase price")?;
    if let Some(down_payment) = payload.purchase_down_payment {
        if down_payment < 0 || down_payment > VALUE_MAX {
            return Err(AppError::BadRequest(format!(
                "Down payment must be between 0 and {}.",
                VALUE_MAX
            )));
        }
    }

    let storage = state.storage();
    let profile = storage.create_purchase_profile(&payload).await?;
    tracing::info!("Purchase mortgage profile {} created", profile.id);

    let body = profile_response(&storage, profile).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

/// POST /api/v1/profiles/refinance
pub async fn create_refinance_profile(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefinanceProfilePayload>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    tracing::info!("POST /profiles/refinance");

    validate_common(payload.credit_score, payload.property_zipcode.as_deref())?;
    validate_value_range(payload.property_value, "Property value")?;
    if let Some(owed) = payload.mortgage_owe {
        if owed < 0 || owed > VALUE_MAX {
            return Err(AppError::BadRequest(format!(
                "Current mortgage balance must be between 0 and {}.",
                VALUE_MAX
            )));
        }
    }

    let storage = state.storage();
    let profile = storage.create_refinance_profile(&payload).await?;
    tracing::info!("Refinance mortgage profile {} created", profile.id);

    let body = profile_response(&storage, profile).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

/// GET /api/v1/profiles/:id
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let storage = state.storage();
    let profile = storage.get_profile(id).await?;
    let body = profile_response(&storage, profile).await?;
    Ok(Json(body))
}

/// PATCH /api/v1/profiles/:id
///
/// Partial update. Setting `selected_lender_id` goes through the
/// cross-reference validator: the offer must come from one of this
/// profile's own requests and be selected by no other profile.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProfileUpdatePayload>,
) -> Result<Json<Value>, AppError> {
    tracing::info!("PATCH /profiles/{}", id);

    validate_common(payload.credit_score, payload.property_zipcode.as_deref())?;

    let storage = state.storage();
    let mut profile = storage.update_profile(id, &payload).await?;
    if let Some(lender_id) = payload.selected_lender_id {
        profile = storage.set_selected_lender(&profile, lender_id).await?;
    }

    let body = profile_response(&storage, profile).await?;
    Ok(Json(body))
}

/// POST /api/v1/profiles/:id/rate-quote
///
/// Full refresh: validate the profile, price it with the engine, persist
/// the returned offers and answer with the recommended scenario.
pub async fn refresh_rate_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    tracing::info!("POST /profiles/{}/rate-quote", id);

    let storage = state.storage();
    let profile = storage.get_profile(id).await?;

    // One engine call per profile at a time
    if state.refresh_cache.get(&id).await.is_some() {
        tracing::info!("Refresh already in progress for profile {}", id);
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "status": REFRESH_IN_PROGRESS })),
        )
            .into_response());
    }

    let calculations = crate::calculations::MortechCalculations::new(&profile);
    if !calculations.is_valid() {
        let errors = calculations.validation_errors();
        tracing::info!("Rate quote request invalid for profile {}: {}", id, errors);
        return Ok((StatusCode::BAD_REQUEST, Json(errors)).into_response());
    }

    state.refresh_cache.insert(id, Utc::now().timestamp()).await;
    storage
        .update_refresh_progress(id, REFRESH_IN_PROGRESS)
        .await?;

    let engine_result = state.mortech.fetch_rate_quotes(&profile).await;
    let response = match engine_result {
        Ok(response) => response,
        Err(e) => {
            state.refresh_cache.invalidate(&id).await;
            return Err(e);
        }
    };

    if !response.is_valid() {
        state.refresh_cache.invalidate(&id).await;
        let errors = response.get_errors();
        tracing::info!("Engine returned no results for profile {}: {}", id, errors);
        return Ok((StatusCode::BAD_REQUEST, Json(errors)).into_response());
    }

    let offers = response.lender_offers()?;
    storage.save_lender_offers(id, &offers).await?;
    storage.update_refresh_progress(id, REFRESH_COMPLETE).await?;
    storage.refresh_selected_lender(&profile).await?;
    state.refresh_cache.invalidate(&id).await;

    scenario_response(&storage, &profile, None, None).await
}

/// GET /api/v1/profiles/:id/scenario
///
/// Recommended (or requested) scenario over the latest stored offers.
pub async fn get_scenario(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ScenarioQuery>,
) -> Result<Response, AppError> {
    let storage = state.storage();
    let profile = storage.get_profile(id).await?;
    scenario_response(
        &storage,
        &profile,
        query.term.as_deref(),
        query.amortization_type.as_deref(),
    )
    .await
}

/// GET /api/v1/profiles/:id/scenario/full
///
/// Spread of quotes +/- 0.25% around the par rate.
pub async fn get_full_scenario(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ScenarioQuery>,
) -> Result<Response, AppError> {
    let storage = state.storage();
    let profile = storage.get_profile(id).await?;

    let request = storage.latest_request(profile.id).await?;
    let lenders = match &request {
        Some(request) => storage.lenders_for_request(request.id).await?,
        None => Vec::new(),
    };

    let director = MortechDirector::new(&profile, request.as_ref(), &lenders);
    if !director.is_valid() {
        let errors = director.get_errors();
        tracing::info!("Scenario invalid for profile {}: {}", profile.id, errors);
        return Ok((StatusCode::BAD_REQUEST, Json(errors)).into_response());
    }

    let (term, amortization_type) = match (&query.term, &query.amortization_type) {
        (Some(term), Some(amortization_type)) => (term.clone(), amortization_type.clone()),
        _ => {
            let (term, amortization_type) = director.optimal_product();
            (term.to_string(), amortization_type.to_string())
        }
    };

    let result = director.get_full_scenario(&term, &amortization_type);
    Ok(Json(serde_json::to_value(&result).map_err(|e| {
        AppError::Internal(format!("Failed to serialize scenario: {}", e))
    })?)
    .into_response())
}

/// GET /api/v1/rate-quotes/:request_id
///
/// Results for a stored request: par lender, the spread around it, and the
/// products the request priced.
pub async fn get_request_results(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<Uuid>,
    Query(query): Query<ScenarioQuery>,
) -> Result<Response, AppError> {
    let storage = state.storage();
    let request = storage
        .find_request(request_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Rate quote request {} not found", request_id)))?;
    let profile = storage.get_profile(request.mortgage_profile_id).await?;
    let lenders = storage.lenders_for_request(request.id).await?;

    let director = MortechDirector::new(&profile, Some(&request), &lenders);
    if !director.is_valid() {
        let errors = director.get_errors();
        return Ok((StatusCode::BAD_REQUEST, Json(errors)).into_response());
    }

    let scenario = director.get_scenario(query.term.as_deref(), query.amortization_type.as_deref());
    let spread = director.get_full_scenario(&scenario.term, &scenario.amortization_type);

    let available_products: Vec<Value> = director
        .provided_loans()
        .into_iter()
        .map(|(amortization_type, term)| {
            json!({ "amortization_type": amortization_type, "term": term })
        })
        .collect();

    Ok(Json(json!({
        "request_id": request.id,
        "term": scenario.term,
        "amortization_type": scenario.amortization_type,
        "par_lender": scenario.results,
        "results": spread.results,
        "programs": scenario.programs,
        "available_products": available_products,
    }))
    .into_response())
}

async fn scenario_response(
    storage: &RateQuoteStorage,
    profile: &MortgageProfile,
    term: Option<&str>,
    amortization_type: Option<&str>,
) -> Result<Response, AppError> {
    let request = storage.latest_request(profile.id).await?;
    let lenders = match &request {
        Some(request) => storage.lenders_for_request(request.id).await?,
        None => Vec::new(),
    };

    let director = MortechDirector::new(profile, request.as_ref(), &lenders);
    if !director.is_valid() {
        let errors = director.get_errors();
        tracing::info!("Scenario invalid for profile {}: {}", profile.id, errors);
        return Ok((StatusCode::BAD_REQUEST, Json(errors)).into_response());
    }

    let result = director.get_scenario(term, amortization_type);
    Ok(Json(serde_json::to_value(&result).map_err(|e| {
        AppError::Internal(format!("Failed to serialize scenario: {}", e))
    })?)
    .into_response())
}

/// Profile plus its selected offer, the shape every profile endpoint
/// returns.
async fn profile_response(
    storage: &RateQuoteStorage,
    profile: MortgageProfile,
) -> Result<Value, AppError> {
    let selected_lender = match profile.selected_lender_id {
        Some(lender_id) => storage
            .find_lender(lender_id)
            .await?
            .map(|lender| LenderQuote::build(&profile, &lender)),
        None => None,
    };

    let mut body = serde_json::to_value(&profile)
        .map_err(|e| AppError::Internal(format!("Failed to serialize profile: {}", e)))?;
    if let Value::Object(map) = &mut body {
        map.insert(
            "selected_lender".to_string(),
            serde_json::to_value(&selected_lender)
                .map_err(|e| AppError::Internal(format!("Failed to serialize quote: {}", e)))?,
        );
    }
    Ok(body)
}
