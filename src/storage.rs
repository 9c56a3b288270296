use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::models::{
    MortgageProfile, ProfileUpdatePayload, PurchaseProfilePayload, RateQuoteLender,
    RateQuoteRequest, RefinanceProfilePayload, KIND_PURCHASE, KIND_REFINANCE, OWNERSHIP_NOT_SURE,
    PROPERTY_TYPE_SINGLE_FAMILY,
};
use crate::quote_client::NewLenderOffer;
use crate::scenario::MortechScenario;

/// Database storage for mortgage profiles and rate quote data.
///
/// Uses sequential runtime queries instead of CTE pyramids; every write is
/// small and the transaction around offer persistence keeps a request and
/// its lenders atomic.
pub struct RateQuoteStorage {
    pool: PgPool,
}

impl RateQuoteStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_purchase_profile(
        &self,
        payload: &PurchaseProfilePayload,
    ) -> Result<MortgageProfile, AppError> {
        let profile = sqlx::query_as::<_, MortgageProfile>(
            "INSERT INTO mortgage_profiles
                (kind, ownership_time, property_type, property_state, property_county,
                 property_city, property_zipcode, property_occupation, purchase_timing,
                 target_value, purchase_down_payment, credit_score, is_veteran)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING *",
        )
        .bind(KIND_PURCHASE)
        .bind(
            payload
                .ownership_time
                .clone()
                .unwrap_or_else(|| OWNERSHIP_NOT_SURE.to_string()),
        )
        .bind(
            payload
                .property_type
                .clone()
                .unwrap_or_else(|| PROPERTY_TYPE_SINGLE_FAMILY.to_string()),
        )
        .bind(&payload.property_state)
        .bind(&payload.property_county)
        .bind(&payload.property_city)
        .bind(&payload.property_zipcode)
        .bind(&payload.property_occupation)
        .bind(&payload.purchase_timing)
        .bind(payload.target_value)
        .bind(payload.purchase_down_payment)
        .bind(payload.credit_score)
        .bind(payload.is_veteran)
        .fetch_one(&self.pool)
        .await
        .context("creating purchase mortgage profile")?;

        Ok(profile)
    }

    pub async fn create_refinance_profile(
        &self,
        payload: &RefinanceProfilePayload,
    ) -> Result<MortgageProfile, AppError> {
        let profile = sqlx::query_as::<_, MortgageProfile>(
            "INSERT INTO mortgage_profiles
                (kind, ownership_time, property_type, property_state, property_county,
                 property_city, property_zipcode, property_occupation, purpose,
                 property_value, mortgage_owe, cashout_amount, credit_score, is_veteran)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             RETURNING *",
        )
        .bind(KIND_REFINANCE)
        .bind(
            payload
                .ownership_time
                .clone()
                .unwrap_or_else(|| OWNERSHIP_NOT_SURE.to_string()),
        )
        .bind(
            payload
                .property_type
                .clone()
                .unwrap_or_else(|| PROPERTY_TYPE_SINGLE_FAMILY.to_string()),
        )
        .bind(&payload.property_state)
        .bind(&payload.property_county)
        .bind(&payload.property_city)
        .bind(&payload.property_zipcode)
        .bind(&payload.property_occupation)
        .bind(&payload.purpose)
        .bind(payload.property_value)
        .bind(payload.mortgage_owe)
        .bind(payload.cashout_amount)
        .bind(payload.credit_score)
        .bind(payload.is_veteran)
        .fetch_one(&self.pool)
        .await
        .context("creating refinance mortgage profile")?;

        Ok(profile)
    }

    pub async fn find_profile(&self, id: Uuid) -> Result<Option<MortgageProfile>, AppError> {
        let profile = sqlx::query_as::<_, MortgageProfile>(
            "SELECT * FROM mortgage_profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    pub async fn get_profile(&self, id: Uuid) -> Result<MortgageProfile, AppError> {
        self.find_profile(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Mortgage profile {} not found", id)))
    }

    /// Partial update; absent payload fields keep their stored value.
    /// `selected_lender_id` is handled separately by `set_selected_lender`.
    pub async fn update_profile(
        &self,
        id: Uuid,
        payload: &ProfileUpdatePayload,
    ) -> Result<MortgageProfile, AppError> {
        let profile = sqlx::query_as::<_, MortgageProfile>(
            "UPDATE mortgage_profiles SET
                ownership_time = COALESCE($2, ownership_time),
                property_type = COALESCE($3, property_type),
                property_state = COALESCE($4, property_state),
                property_county = COALESCE($5, property_county),
                property_city = COALESCE($6, property_city),
                property_zipcode = COALESCE($7, property_zipcode),
                property_occupation = COALESCE($8, property_occupation),
                purchase_timing = COALESCE($9, purchase_timing),
                target_value = COALESCE($10, target_value),
                purchase_down_payment = COALESCE($11, purchase_down_payment),
                purpose = COALESCE($12, purpose),
                property_value = COALESCE($13, property_value),
                mortgage_owe = COALESCE($14, mortgage_owe),
                cashout_amount = COALESCE($15, cashout_amount),
                credit_score = COALESCE($16, credit_score),
                is_veteran = COALESCE($17, is_veteran),
                updated_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(&payload.ownership_time)
        .bind(&payload.property_type)
        .bind(&payload.property_state)
        .bind(&payload.property_county)
        .bind(&payload.property_city)
        .bind(&payload.property_zipcode)
        .bind(&payload.property_occupation)
        .bind(&payload.purchase_timing)
        .bind(payload.target_value)
        .bind(payload.purchase_down_payment)
        .bind(&payload.purpose)
        .bind(payload.property_value)
        .bind(payload.mortgage_owe)
        .bind(payload.cashout_amount)
        .bind(payload.credit_score)
        .bind(payload.is_veteran)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Mortgage profile {} not found", id)))?;

        Ok(profile)
    }

    /// Select a lender offer for a profile.
    ///
    /// Validates the cross-reference invariant: the offer must belong to a
    /// request of this same profile (the error mirrors a plain not-found so
    /// foreign offer ids are not confirmed to exist), and at most one
    /// profile may select a given offer.
    pub async fn set_selected_lender(
        &self,
        profile: &MortgageProfile,
        lender_id: Uuid,
    ) -> Result<MortgageProfile, AppError> {
        let owned: Option<Uuid> = sqlx::query_scalar(
            "SELECT l.id FROM rate_quote_lenders l
             JOIN rate_quote_requests r ON l.request_id = r.id
             WHERE l.id = $1 AND r.mortgage_profile_id = $2",
        )
        .bind(lender_id)
        .bind(profile.id)
        .fetch_optional(&self.pool)
        .await?;
        if owned.is_none() {
            return Err(AppError::BadRequest(format!(
                "Invalid pk \"{}\" - object does not exist.",
                lender_id
            )));
        }

        let already_selected: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM mortgage_profiles
                WHERE selected_lender_id = $1 AND id <> $2
             )",
        )
        .bind(lender_id)
        .bind(profile.id)
        .fetch_one(&self.pool)
        .await?;
        if already_selected {
            return Err(AppError::BadRequest(
                "This field must be unique. Another mortgage profile already references \
                 this rate quote lender."
                    .to_string(),
            ));
        }

        let profile = sqlx::query_as::<_, MortgageProfile>(
            "UPDATE mortgage_profiles
             SET selected_lender_id = $2, updated_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(profile.id)
        .bind(lender_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(profile)
    }

    pub async fn latest_request(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<RateQuoteRequest>, AppError> {
        let request = sqlx::query_as::<_, RateQuoteRequest>(
            "SELECT * FROM rate_quote_requests
             WHERE mortgage_profile_id = $1
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(profile_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(request)
    }

    pub async fn find_request(&self, id: Uuid) -> Result<Option<RateQuoteRequest>, AppError> {
        let request =
            sqlx::query_as::<_, RateQuoteRequest>("SELECT * FROM rate_quote_requests WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(request)
    }

    pub async fn lenders_for_request(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<RateQuoteLender>, AppError> {
        let lenders = sqlx::query_as::<_, RateQuoteLender>(
            "SELECT * FROM rate_quote_lenders WHERE request_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lenders)
    }

    pub async fn find_lender(&self, id: Uuid) -> Result<Option<RateQuoteLender>, AppError> {
        let lender =
            sqlx::query_as::<_, RateQuoteLender>("SELECT * FROM rate_quote_lenders WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(lender)
    }

    /// Persist one engine response: a new request row plus its offers,
    /// atomically.
    pub async fn save_lender_offers(
        &self,
        profile_id: Uuid,
        offers: &[NewLenderOffer],
    ) -> Result<RateQuoteRequest, AppError> {
        let mut tx = self.pool.begin().await?;

        let request = sqlx::query_as::<_, RateQuoteRequest>(
            "INSERT INTO rate_quote_requests (mortgage_profile_id) VALUES ($1) RETURNING *",
        )
        .bind(profile_id)
        .fetch_one(&mut *tx)
        .await?;

        for offer in offers {
            sqlx::query(
                "INSERT INTO rate_quote_lenders
                    (request_id, lender_name, term, amortization_type, program_category,
                     program_name, program_type, rate, points, price, apr,
                     monthly_premium, piti, upfront_fee, fees)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            )
            .bind(request.id)
            .bind(&offer.lender_name)
            .bind(&offer.term)
            .bind(&offer.amortization_type)
            .bind(&offer.program_category)
            .bind(&offer.program_name)
            .bind(&offer.program_type)
            .bind(&offer.rate)
            .bind(&offer.points)
            .bind(&offer.price)
            .bind(&offer.apr)
            .bind(&offer.monthly_premium)
            .bind(&offer.piti)
            .bind(&offer.upfront_fee)
            .bind(&offer.fees)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            "{} lender offers saved for profile {}",
            offers.len(),
            profile_id
        );
        Ok(request)
    }

    pub async fn update_refresh_progress(
        &self,
        profile_id: Uuid,
        status: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE mortgage_profiles
             SET rate_quote_refresh_progress = $2, updated_at = now()
             WHERE id = $1",
        )
        .bind(profile_id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Re-point a profile's selected offer after a refresh.
    ///
    /// When new results land and the customer had already selected a
    /// product, keep their (term, amortization) choice but move the
    /// selection to the best-priced offer in the fresh request.
    pub async fn refresh_selected_lender(
        &self,
        profile: &MortgageProfile,
    ) -> Result<Option<RateQuoteLender>, AppError> {
        let Some(selected_id) = profile.selected_lender_id else {
            tracing::debug!("Profile {} has no selected lender to update", profile.id);
            return Ok(None);
        };
        let Some(previous) = self.find_lender(selected_id).await? else {
            return Ok(None);
        };

        let Some(request) = self.latest_request(profile.id).await? else {
            return Ok(None);
        };
        let lenders = self.lenders_for_request(request.id).await?;
        if lenders.is_empty() {
            return Ok(None);
        }

        let scenario = MortechScenario::new(profile, Some(&request), &lenders);
        let par = scenario.calculate(&previous.term, &previous.amortization_type, None);
        let replacement = par.and_then(|par| {
            scenario.calculate(&previous.term, &previous.amortization_type, Some(&par.rate))
        });

        let Some(replacement) = replacement else {
            tracing::debug!(
                "No replacement product for profile {} at {} {}",
                profile.id,
                previous.term,
                previous.amortization_type
            );
            return Ok(None);
        };

        sqlx::query(
            "UPDATE mortgage_profiles
             SET selected_lender_id = $2, updated_at = now()
             WHERE id = $1",
        )
        .bind(profile.id)
        .bind(replacement.id)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "Selected lender for profile {} moved from {} to {}",
            profile.id,
            previous.id,
            replacement.id
        );
        Ok(Some(replacement.clone()))
    }
}
