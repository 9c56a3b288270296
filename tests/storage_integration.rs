use std::env;
use uuid::Uuid;

use bigdecimal::BigDecimal;
use rate_quote_api::db::Database;
use rate_quote_api::errors::AppError;
use rate_quote_api::models::PurchaseProfilePayload;
use rate_quote_api::quote_client::NewLenderOffer;
use rate_quote_api::storage::RateQuoteStorage;
use std::str::FromStr;

/// Integration smoke test for the rate-quote storage layer.
/// Marked ignored to avoid running against production by accident; set
/// TEST_DATABASE_URL to run against a database with schema.sql applied.
#[tokio::test]
#[ignore]
async fn rate_quote_round_trip_smoke_test() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    let storage = RateQuoteStorage::new(db.pool.clone());

    let payload = PurchaseProfilePayload {
        ownership_time: None,
        property_type: None,
        property_state: Some("California".to_string()),
        property_county: Some("Orange County".to_string()),
        property_city: None,
        property_zipcode: Some("92660".to_string()),
        property_occupation: None,
        purchase_timing: None,
        target_value: Some(750_000),
        purchase_down_payment: Some(150_000),
        credit_score: Some(760),
        is_veteran: Some(false),
    };
    let profile = storage
        .create_purchase_profile(&payload)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_ne!(profile.id, Uuid::nil());

    let offers = vec![NewLenderOffer {
        lender_name: "Smoke Lender".to_string(),
        term: "30 Year".to_string(),
        amortization_type: "Fixed".to_string(),
        program_category: "Conf 30 Yr Fixed".to_string(),
        program_name: "Agency Fixed 30".to_string(),
        program_type: "Conforming".to_string(),
        rate: BigDecimal::from_str("412.5")?,
        points: BigDecimal::from_str("-0.25")?,
        price: None,
        apr: BigDecimal::from_str("4.2")?,
        monthly_premium: None,
        piti: Some(BigDecimal::from_str("2958.0")?),
        upfront_fee: None,
        fees: serde_json::json!({ "Tax Service Fee": "69.0" }),
    }];
    let request = storage
        .save_lender_offers(profile.id, &offers)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let lenders = storage
        .lenders_for_request(request.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(lenders.len(), 1);

    // Selecting one of the profile's own offers is allowed
    let profile = storage
        .set_selected_lender(&profile, lenders[0].id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(profile.selected_lender_id, Some(lenders[0].id));

    // A foreign offer id is rejected without confirming whether it exists
    let result = storage.set_selected_lender(&profile, Uuid::new_v4()).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    Ok(())
}
