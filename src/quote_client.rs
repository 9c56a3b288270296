//! Client for the Mortech rate-quote engine.
//!
//! Forms the engine request from a mortgage profile, sends it, and parses
//! the XML response into lender offer rows ready for persistence.

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

use crate::calculations::MortechCalculations;
use crate::circuit_breaker::{create_pricing_circuit_breaker, PricingEngineBreaker};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::MortgageProfile;

/// Engine result filters. Filters are exclusive and do not stack; only one
/// can be applied per request. More can be configured at the engine's admin
/// panel online.
const FILTER_VA: &str = "999999";
const FILTER_NONE: &str = "";
const FILTER_DEFAULT: &str = "888888";

/// Known program labels, checked against the vendor's product strings.
const PROGRAMS: &[&str] = &[
    "VA",
    "FHA",
    "Non Conforming",
    "Non Conf",
    "Conforming",
    "Conf",
    "Jumbo",
    "Non-Agency",
];

pub struct MortechClient {
    client: reqwest::Client,
    endpoint: String,
    license_key: String,
    third_party_name: String,
    customer_id: String,
    email: String,
    save_response: bool,
    breaker: PricingEngineBreaker,
}

impl MortechClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                AppError::PricingEngine(format!("Failed to create Mortech client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: config.mortech_endpoint.clone(),
            license_key: config.mortech_license_key.clone(),
            third_party_name: config.mortech_third_party_name.clone(),
            customer_id: config.mortech_customer_id.clone(),
            email: config.mortech_email.clone(),
            save_response: config.save_mortech_response,
            breaker: create_pricing_circuit_breaker(),
        })
    }

    /// Engine request parameters from profile data. Hard-coded defaults
    /// below drive the rate quote tool results and the disclaimer.
    pub fn build_request_params(&self, profile: &MortgageProfile) -> Vec<(String, String)> {
        let calculations = MortechCalculations::new(profile);

        let mut params: Vec<(String, String)> = vec![
            ("licenseKey".to_string(), self.license_key.clone()),
            ("thirdPartyName".to_string(), self.third_party_name.clone()),
            ("customerId".to_string(), self.customer_id.clone()),
            ("emailAddress".to_string(), self.email.clone()),
            ("request_id".to_string(), "1".to_string()),
            (
                "propertyState".to_string(),
                calculations.property_state_code().to_string(),
            ),
            ("propertyCounty".to_string(), calculations.county()),
            (
                "loan_amount".to_string(),
                calculations.loan_amount().to_string(),
            ),
            (
                "loanpurpose".to_string(),
                calculations.loan_purpose().to_string(),
            ),
            // Returns everything for the requested products
            ("targetPrice".to_string(), "-999".to_string()),
            // Includes monthlyPremium for mortgage insurance
            ("pmiCompany".to_string(), "-999".to_string()),
            ("lockindays".to_string(), "45".to_string()),
            (
                "appraisedvalue".to_string(),
                calculations.property_value().to_string(),
            ),
            ("loanProduct1".to_string(), "30 year fixed".to_string()),
            ("loanProduct2".to_string(), "15 year fixed".to_string()),
            ("loanProduct3".to_string(), "7 year ARM/30 yrs".to_string()),
            ("loanProduct4".to_string(), "5 year ARM/30 yrs".to_string()),
        ];

        if let Some(fico) = profile.credit_score {
            params.push(("fico".to_string(), fico.to_string()));
        }
        if let Some(prop_type) = calculations.property_type_code() {
            params.push(("propType".to_string(), prop_type.to_string()));
        }
        if let Some(occupancy) = calculations.occupancy_code() {
            params.push(("occupancy".to_string(), occupancy.to_string()));
        }
        if let Some(cashout) = calculations.cashout_amount() {
            params.push(("cashoutAmount".to_string(), cashout.to_string()));
        }

        params
    }

    fn filter_ids(&self, profile: &MortgageProfile) -> Vec<&'static str> {
        let mut filter_ids = vec![FILTER_NONE, FILTER_DEFAULT];
        if profile.is_veteran.unwrap_or(false) {
            // VA filter returns exclusively VA products, try it first
            filter_ids.insert(0, FILTER_VA);
        }
        filter_ids
    }

    /// Request pricing from the engine. Walks the filter-id sequence and
    /// keeps the first response carrying results; the last response is
    /// returned otherwise so the caller can surface its error header.
    pub async fn fetch_rate_quotes(
        &self,
        profile: &MortgageProfile,
    ) -> Result<MortechResponse, AppError> {
        let params = self.build_request_params(profile);
        let mut last_response: Option<MortechResponse> = None;

        for filter_id in self.filter_ids(profile) {
            let mut request_params = params.clone();
            request_params.push(("filterId".to_string(), filter_id.to_string()));

            let request = self
                .client
                .post(&self.endpoint)
                .query(&request_params)
                .send();

            let response = failsafe::futures::CircuitBreaker::call(&self.breaker, request)
                .await
                .map_err(|err| match err {
                    failsafe::Error::Inner(e) => {
                        AppError::PricingEngine(format!("Mortech request failed: {}", e))
                    }
                    failsafe::Error::Rejected => AppError::PricingEngine(
                        "Mortech circuit open, request rejected".to_string(),
                    ),
                })?;

            if !response.status().is_success() {
                let status = response.status();
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                tracing::error!("Mortech returned error {}: {}", status, error_text);
                return Err(AppError::PricingEngine(format!(
                    "Mortech returned status {}: {}",
                    status, error_text
                )));
            }

            let body = response.text().await.map_err(|e| {
                AppError::PricingEngine(format!("Failed to read Mortech response: {}", e))
            })?;
            if body.trim().is_empty() {
                return Err(AppError::PricingEngine(
                    "Mortech response is missing content".to_string(),
                ));
            }

            self.dump_response(profile, filter_id, &body).await;

            let parsed = parse_response(&body)?;
            if parsed.result_count() > 0 {
                tracing::debug!(
                    "Mortech returned {} products for filter \"{}\"",
                    parsed.result_count(),
                    filter_id
                );
                return Ok(parsed);
            }
            tracing::info!(
                "Mortech returned no products for filter \"{}\", trying next",
                filter_id
            );
            last_response = Some(parsed);
        }

        last_response.ok_or_else(|| {
            AppError::PricingEngine("Mortech returned no parseable response".to_string())
        })
    }

    /// Dump raw responses to /tmp when enabled, for vendor support tickets.
    async fn dump_response(&self, profile: &MortgageProfile, filter_id: &str, body: &str) {
        if !self.save_response {
            return;
        }
        let filter = if filter_id.is_empty() { "none" } else { filter_id };
        let filename = format!("/tmp/mortech-{}-{}.xml", profile.id, filter);
        if let Err(e) = tokio::fs::write(&filename, body).await {
            tracing::debug!("Saving Mortech response to {} failed: {}", filename, e);
        }
    }
}

// ============ XML Response ============

#[derive(Debug, Deserialize)]
pub struct MortechXml {
    pub header: MortechXmlHeader,
    #[serde(default, rename = "results")]
    pub results: Vec<MortechXmlResultGroup>,
}

#[derive(Debug, Deserialize)]
pub struct MortechXmlHeader {
    #[serde(default, rename = "@error_num")]
    pub error_num: Option<String>,
    #[serde(default, rename = "@error_desc")]
    pub error_desc: Option<String>,
}

/// One product grouping, e.g. "Conf 30 Yr Fixed".
#[derive(Debug, Deserialize)]
pub struct MortechXmlResultGroup {
    #[serde(default, rename = "@size")]
    pub size: Option<String>,
    #[serde(default, rename = "@product_name")]
    pub product_name: String,
    #[serde(default, rename = "@term_type")]
    pub term_type: String,
    #[serde(default, rename = "quote")]
    pub quotes: Vec<MortechXmlQuote>,
}

#[derive(Debug, Deserialize)]
pub struct MortechXmlQuote {
    #[serde(default, rename = "@vendor_name")]
    pub vendor_name: String,
    #[serde(default, rename = "@vendor_product_name")]
    pub vendor_product_name: String,
    #[serde(default, rename = "@initial_arm_term")]
    pub initial_arm_term: String,
    #[serde(default, rename = "@product_term")]
    pub product_term: String,
    pub quote_detail: MortechXmlQuoteDetail,
}

#[derive(Debug, Deserialize)]
pub struct MortechXmlQuoteDetail {
    #[serde(rename = "@rate")]
    pub rate: String,
    #[serde(rename = "@price")]
    pub price: String,
    #[serde(rename = "@apr")]
    pub apr: String,
    #[serde(default, rename = "@piti")]
    pub piti: Option<String>,
    #[serde(default, rename = "@monthly_premium")]
    pub monthly_premium: Option<String>,
    #[serde(default, rename = "@upfront_fee")]
    pub upfront_fee: Option<String>,
    pub ratesheet_price: Option<String>,
    pub fees: Option<MortechXmlFees>,
}

#[derive(Debug, Deserialize)]
pub struct MortechXmlFees {
    pub fee_list: Option<MortechXmlFeeList>,
}

#[derive(Debug, Deserialize)]
pub struct MortechXmlFeeList {
    #[serde(default, rename = "fee")]
    pub fees: Vec<MortechXmlFee>,
}

#[derive(Debug, Deserialize)]
pub struct MortechXmlFee {
    #[serde(rename = "@description")]
    pub description: String,
    #[serde(rename = "@feeamount")]
    pub feeamount: String,
}

/// Parsed engine response.
#[derive(Debug)]
pub struct MortechResponse {
    pub header: MortechXmlHeader,
    pub results: Vec<MortechXmlResultGroup>,
}

/// A lender offer row ready for insertion, before it gets an id.
#[derive(Debug, Clone)]
pub struct NewLenderOffer {
    pub lender_name: String,
    pub term: String,
    pub amortization_type: String,
    pub program_category: String,
    pub program_name: String,
    pub program_type: String,
    pub rate: BigDecimal,
    pub points: BigDecimal,
    pub price: Option<BigDecimal>,
    pub apr: BigDecimal,
    pub monthly_premium: Option<BigDecimal>,
    pub piti: Option<BigDecimal>,
    pub upfront_fee: Option<BigDecimal>,
    pub fees: Value,
}

impl MortechResponse {
    pub fn result_count(&self) -> u32 {
        self.results
            .iter()
            .filter_map(|group| group.size.as_deref())
            .filter_map(|size| size.parse::<u32>().ok())
            .sum()
    }

    pub fn has_results(&self) -> bool {
        !self.results.is_empty() && self.result_count() > 0
    }

    pub fn is_valid(&self) -> bool {
        if let Some(status) = &self.header.error_desc {
            tracing::info!("Mortech response status: {}", status);
        }
        self.has_results()
    }

    /// Engine error header for a 502-style response body.
    pub fn get_errors(&self) -> Value {
        serde_json::json!({
            "error_num": self.header.error_num,
            "error_desc": self.header.error_desc,
        })
    }

    /// Flatten the response into offer rows. Rates arrive as percentages
    /// and are stored as basis-point decimals (4.125 -> 412.5).
    pub fn lender_offers(&self) -> Result<Vec<NewLenderOffer>, AppError> {
        let mut offers = Vec::new();
        for group in &self.results {
            for quote in &group.quotes {
                let detail = &quote.quote_detail;
                let rate = parse_decimal(&detail.rate, "rate")? * BigDecimal::from(100);
                let offer = NewLenderOffer {
                    lender_name: quote.vendor_name.clone(),
                    term: derive_term(&quote.initial_arm_term, &quote.product_term),
                    amortization_type: group.term_type.clone(),
                    program_category: group.product_name.clone(),
                    program_name: quote.vendor_product_name.clone(),
                    program_type: classify_program_type(
                        &quote.vendor_product_name,
                        &group.product_name,
                    ),
                    rate,
                    points: parse_decimal(&detail.price, "price")?,
                    price: detail
                        .ratesheet_price
                        .as_deref()
                        .and_then(|p| BigDecimal::from_str(p.trim()).ok()),
                    apr: parse_decimal(&detail.apr, "apr")?,
                    monthly_premium: parse_optional_decimal(detail.monthly_premium.as_deref()),
                    piti: parse_optional_decimal(detail.piti.as_deref()),
                    upfront_fee: parse_optional_decimal(detail.upfront_fee.as_deref()),
                    fees: collect_fees(detail),
                };
                offers.push(offer);
            }
        }
        Ok(offers)
    }
}

pub fn parse_response(body: &str) -> Result<MortechResponse, AppError> {
    let xml: MortechXml = quick_xml::de::from_str(body)
        .map_err(|e| AppError::PricingEngine(format!("Failed to parse Mortech XML: {}", e)))?;
    Ok(MortechResponse {
        header: xml.header,
        results: xml.results,
    })
}

fn parse_decimal(raw: &str, field: &str) -> Result<BigDecimal, AppError> {
    BigDecimal::from_str(raw.trim()).map_err(|_| {
        AppError::PricingEngine(format!("Mortech quote has invalid {}: {:?}", field, raw))
    })
}

fn parse_optional_decimal(raw: Option<&str>) -> Option<BigDecimal> {
    raw.and_then(|value| BigDecimal::from_str(value.trim()).ok())
}

/// Term from the ARM initial period in months, falling back to the product
/// term in years for fixed products.
pub fn derive_term(initial_arm_term: &str, product_term: &str) -> String {
    match initial_arm_term.trim() {
        "36" => "3 Year".to_string(),
        "60" => "5 Year".to_string(),
        "84" => "7 Year".to_string(),
        "120" => "10 Year".to_string(),
        _ => format!("{} Year", product_term.trim()),
    }
}

/// Program label for the lender based on the vendor's product strings.
pub fn classify_program_type(vendor_product_name: &str, product_name: &str) -> String {
    for program in PROGRAMS {
        if vendor_product_name.contains(program) || product_name.contains(program) {
            return (*program).to_string();
        }
    }
    tracing::warn!(
        "No program matched vendor_product_name {:?} product_name {:?}",
        vendor_product_name,
        product_name
    );
    if vendor_product_name.is_empty() {
        "unknown".to_string()
    } else {
        vendor_product_name.to_string()
    }
}

fn collect_fees(detail: &MortechXmlQuoteDetail) -> Value {
    let mut fees = serde_json::Map::new();
    if let Some(fee_list) = detail.fees.as_ref().and_then(|f| f.fee_list.as_ref()) {
        for fee in &fee_list.fees {
            fees.insert(
                fee.description.clone(),
                Value::String(fee.feeamount.clone()),
            );
        }
    }
    Value::Object(fees)
}
