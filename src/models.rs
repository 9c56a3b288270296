use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

use crate::states;

// ============ Domain Vocabulary ============

pub const KIND_PURCHASE: &str = "purchase";
pub const KIND_REFINANCE: &str = "refinance";

pub const OWNERSHIP_LONG_TERM: &str = "long_term";
pub const OWNERSHIP_MEDIUM_TERM: &str = "medium_term";
pub const OWNERSHIP_SHORT_TERM: &str = "short_term";
pub const OWNERSHIP_NOT_SURE: &str = "not_sure";

// Property types implemented on the rate quote tool
pub const PROPERTY_TYPE_SINGLE_FAMILY: &str = "single_family";
pub const PROPERTY_TYPE_CONDO_LESS_5: &str = "condo_less_5";
pub const PROPERTY_TYPE_CONDO_5_8: &str = "condo_5_8";
pub const PROPERTY_TYPE_CONDO_MORE_8: &str = "condo_more_8";
pub const PROPERTY_TYPE_TOWNHOUSE: &str = "townhouse";
pub const PROPERTY_TYPE_TWO_UNIT: &str = "two_unit";
pub const PROPERTY_TYPE_THREE_UNIT: &str = "three_unit";
pub const PROPERTY_TYPE_FOUR_UNIT: &str = "four_unit";
pub const PROPERTY_TYPE_MANUFACTURED_SINGLE: &str = "manufactured_single";

pub const OCCUPATION_PRIMARY: &str = "my_current_residence";
pub const OCCUPATION_SECONDARY: &str = "second_home_vacation_home";
pub const OCCUPATION_INVESTMENT: &str = "investment_property";

// Legacy purchase-type values still accepted from older clients
pub const PURCHASE_TYPE_FIRST_TIME_HOMEBUYER: &str = "first_time_homebuyer";
pub const PURCHASE_TYPE_SELLING_HOME: &str = "selling_home";
pub const PURCHASE_TYPE_VACATION_HOME: &str = "vacation_home";
pub const PURCHASE_TYPE_INVESTMENT_PROPERTY: &str = "investment_property";

pub const PURPOSE_LOWER_MORTGAGE_PAYMENTS: &str = "lower_mortgage_payments";
pub const PURPOSE_CASH_OUT: &str = "cash_out";
pub const PURPOSE_HELOC: &str = "heloc";
pub const PURPOSE_BOTH: &str = "both";

pub const TERM_3_YEAR: &str = "3 Year";
pub const TERM_5_YEAR: &str = "5 Year";
pub const TERM_7_YEAR: &str = "7 Year";
pub const TERM_10_YEAR: &str = "10 Year";
pub const TERM_15_YEAR: &str = "15 Year";
pub const TERM_30_YEAR: &str = "30 Year";

pub const AMORTIZATION_FIXED: &str = "Fixed";
pub const AMORTIZATION_VARIABLE: &str = "Variable";

pub const PROGRAM_TYPE_VA: &str = "VA";
pub const PROGRAM_TYPE_FHA: &str = "FHA";
pub const PROGRAM_TYPE_JUMBO: &str = "Jumbo";
pub const PROGRAM_TYPE_NON_AGENCY: &str = "Non-Agency";

/// Program type labels counted as conforming products.
pub const CONFORMING_PROGRAM_TYPES: &[&str] = &["Conf", "Conforming"];

pub const REFRESH_IN_PROGRESS: &str = "in_progress";
pub const REFRESH_COMPLETE: &str = "complete";

pub(crate) fn dec(literal: &str) -> BigDecimal {
    BigDecimal::from_str(literal).expect("valid decimal literal")
}

// ============ Database Models ============

/// A borrower's loan-shopping parameters.
///
/// Purchase and refinance profiles share one table; `kind` discriminates
/// and the kind-specific columns are nullable.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MortgageProfile {
    /// Unique identifier for the profile.
    pub id: Uuid,
    /// Profile kind ("purchase" or "refinance").
    pub kind: String,
    /// How long the borrower expects to keep the property.
    pub ownership_time: Option<String>,
    /// Credit score (0-850).
    pub credit_score: Option<i32>,
    /// Veteran flag, drives VA product filtering.
    pub is_veteran: Option<bool>,
    /// Property state name (e.g. "California").
    pub property_state: Option<String>,
    /// Property county.
    pub property_county: Option<String>,
    /// Property city.
    pub property_city: Option<String>,
    /// Property zipcode.
    pub property_zipcode: Option<String>,
    /// Property type (e.g. "single_family").
    pub property_type: Option<String>,
    /// Property occupation (primary/second home/investment).
    pub property_occupation: Option<String>,
    /// Purchase price target (purchase only).
    pub target_value: Option<i64>,
    /// Down payment (purchase only).
    pub purchase_down_payment: Option<i64>,
    /// Purchase timing (purchase only).
    pub purchase_timing: Option<String>,
    /// Refinance purpose (refinance only).
    pub purpose: Option<String>,
    /// Current property value (refinance only).
    pub property_value: Option<i64>,
    /// Outstanding mortgage balance (refinance only).
    pub mortgage_owe: Option<i64>,
    /// Requested cashout amount (refinance only).
    pub cashout_amount: Option<i64>,
    /// Rate quote refresh status ("in_progress" or "complete").
    pub rate_quote_refresh_progress: Option<String>,
    /// Lender offer the customer selected, if any.
    pub selected_lender_id: Option<Uuid>,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
    /// Timestamp of last update.
    pub updated_at: Option<DateTime<Utc>>,
}

impl MortgageProfile {
    pub fn is_purchase(&self) -> bool {
        self.kind == KIND_PURCHASE
    }

    pub fn is_refinance(&self) -> bool {
        self.kind == KIND_REFINANCE
    }

    pub fn is_cash_out(&self) -> bool {
        self.is_refinance() && self.purpose.as_deref() == Some(PURPOSE_CASH_OUT)
    }

    /// Loan amount the borrower is asking for.
    ///
    /// Panics when the kind-specific inputs are missing. Callers must gate
    /// on `MortechCalculations::is_enough_data` first; a panic here means a
    /// required-field list and this computation disagree.
    pub fn loan_amount(&self) -> i64 {
        match self.kind.as_str() {
            KIND_PURCHASE => {
                let target = self.target_value.expect("target_value should be defined");
                let down_payment = self
                    .purchase_down_payment
                    .expect("purchase_down_payment should be defined");
                target - down_payment
            }
            KIND_REFINANCE => {
                let owed = self.mortgage_owe.expect("mortgage_owe should be defined");
                if self.is_cash_out() {
                    owed + self.cashout_amount.unwrap_or(0)
                } else {
                    owed
                }
            }
            other => panic!("unknown mortgage profile kind: {}", other),
        }
    }

    /// Property value backing the loan. Panics like `loan_amount`.
    pub fn property_value(&self) -> i64 {
        match self.kind.as_str() {
            KIND_PURCHASE => self.target_value.expect("target_value should be defined"),
            KIND_REFINANCE => self.property_value.expect("property_value should be defined"),
            other => panic!("unknown mortgage profile kind: {}", other),
        }
    }

    pub fn loan_to_value(&self) -> f64 {
        self.loan_amount() as f64 / self.property_value() as f64
    }

    /// USPS code for the property state; engine requests default to CA.
    pub fn property_state_code(&self) -> &'static str {
        self.property_state
            .as_deref()
            .and_then(states::state_code)
            .unwrap_or("CA")
    }

    /// County name without the "County" suffix the questionnaire appends.
    pub fn property_county_name(&self) -> String {
        self.property_county
            .as_deref()
            .map(|county| county.replace("County", "").trim().to_string())
            .unwrap_or_default()
    }
}

/// One outbound quote request sent to the pricing engine for a profile.
/// Immutable after creation; owns the lender offers it returned.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RateQuoteRequest {
    /// Unique identifier for the request.
    pub id: Uuid,
    /// Profile this request priced.
    pub mortgage_profile_id: Uuid,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
}

/// One lender/product offer returned by the pricing engine.
///
/// Key:
/// * piti = principal, interest and mortgage insurance (monthly_premium);
///   excludes real estate taxes and insurance escrows
/// * monthly_premium = FHA/mortgage insurance
/// * program_category = engine result grouping, e.g. "Conf 30 Yr"
/// * program_name = the lender's product name, e.g. "FNMA 30 Yr"
/// * program_type = FHA, VA, Conforming, Non Conforming, ...
///
/// `rate` and `points` are basis-point decimals: rate 250.0 means 2.50%.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RateQuoteLender {
    /// Unique identifier for the offer.
    pub id: Uuid,
    /// Request this offer belongs to.
    pub request_id: Uuid,
    /// Lender name.
    pub lender_name: String,
    /// Term (e.g. "30 Year").
    pub term: String,
    /// Amortization type ("Fixed" or "Variable").
    pub amortization_type: String,
    /// Engine result grouping.
    pub program_category: String,
    /// Lender's product name.
    pub program_name: String,
    /// Program classification (VA/FHA/Conforming/...).
    pub program_type: String,
    /// Note rate in basis points.
    pub rate: BigDecimal,
    /// Up-front price in points; negative values are lender credits.
    pub points: BigDecimal,
    /// Raw ratesheet price.
    pub price: Option<BigDecimal>,
    /// Annual percentage rate.
    pub apr: BigDecimal,
    /// Monthly mortgage insurance premium.
    pub monthly_premium: Option<BigDecimal>,
    /// Monthly principal, interest and mortgage insurance.
    pub piti: Option<BigDecimal>,
    /// Up-front mortgage insurance premium.
    pub upfront_fee: Option<BigDecimal>,
    /// Vendor fee-name -> amount map, as returned by the engine.
    pub fees: Option<Value>,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
}

const FLOOD_CERTIFICATION_FEE_DEFAULT: &str = "0.0";
const PREPAID_INTEREST_DEFAULT: &str = "0.0";
const TAX_SERVICE_FEE_DEFAULT: &str = "69.0";
const UNDERWRITING_FEE_DEFAULT: &str = "0.0";
const ESTIMATED_APPRAISAL_FEE_DEFAULT: &str = "550.0";
const TITLE_FEE_DEFAULT: &str = "0.0";
const ESCROW_FEE_DEFAULT: &str = "0.0";
const CREDIT_REPORT_FEE_DEFAULT: &str = "0.0";

impl RateQuoteLender {
    /// Interest rate as percentage points: rate 412.5 becomes 4.125.
    pub fn rate_percent(&self) -> BigDecimal {
        &self.rate / dec("100.0")
    }

    /// Rate used to underwrite the monthly payment.
    ///
    /// Short-fixed-period ARMs ("3 Year", "5 Year") qualify 2 percent above
    /// the note rate so the borrower can still pay if rates rise after the
    /// fixed period.
    pub fn qualifying_rate(&self) -> BigDecimal {
        let adjustment = if self.term == TERM_3_YEAR || self.term == TERM_5_YEAR {
            dec("2.00")
        } else {
            dec("0.00")
        };
        self.rate_percent() + adjustment
    }

    /// Monthly principal and interest only.
    pub fn monthly_payment(&self) -> Option<BigDecimal> {
        let piti = self.piti.clone()?;
        match &self.monthly_premium {
            Some(premium) => Some(piti - premium),
            None => Some(piti),
        }
    }

    /// Vendor fee lookup by name aliases; missing fees fall back to the
    /// configured defaults so quote math never sees a hole.
    fn fee_from_names(&self, names: &[&str], default: &str) -> BigDecimal {
        if let Some(Value::Object(map)) = &self.fees {
            for name in names {
                if let Some(value) = map.get(*name) {
                    if let Some(amount) = json_decimal(value) {
                        return amount;
                    }
                }
            }
        }
        dec(default)
    }

    pub fn underwriting_fee(&self) -> BigDecimal {
        let names = [
            "Admin",
            "Admin Fee",
            "Administration",
            "Administration Fee",
            "Commitment",
            "FMC Origination",
            "Funding Fee",
            "Lender Fee",
            "Lender Fees",
            "Underwriting Fee",
            "UW Fee",
        ];
        self.fee_from_names(&names, UNDERWRITING_FEE_DEFAULT)
    }

    pub fn prepaid_interest_fee(&self) -> BigDecimal {
        let names = ["Pre-paid Interest", "Pre-paid Interest (15 days)"];
        self.fee_from_names(&names, PREPAID_INTEREST_DEFAULT)
    }

    pub fn tax_service_fee(&self) -> BigDecimal {
        self.fee_from_names(&["Tax Service Fee"], TAX_SERVICE_FEE_DEFAULT)
    }

    pub fn flood_certification_fee(&self) -> BigDecimal {
        self.fee_from_names(&["Flood Certification"], FLOOD_CERTIFICATION_FEE_DEFAULT)
    }

    pub fn estimated_appraisal_fee(&self) -> BigDecimal {
        self.fee_from_names(&["Estimated Appraisal Fee"], ESTIMATED_APPRAISAL_FEE_DEFAULT)
    }

    pub fn title_fee(&self) -> BigDecimal {
        self.fee_from_names(&["Title Fee"], TITLE_FEE_DEFAULT)
    }

    pub fn escrow_fee(&self) -> BigDecimal {
        self.fee_from_names(&["Escrow Fee"], ESCROW_FEE_DEFAULT)
    }

    pub fn credit_report_fee(&self) -> BigDecimal {
        self.fee_from_names(&["Credit Report"], CREDIT_REPORT_FEE_DEFAULT)
    }

    pub fn is_fixed(&self) -> bool {
        self.amortization_type == AMORTIZATION_FIXED
    }

    pub fn is_variable(&self) -> bool {
        self.amortization_type == AMORTIZATION_VARIABLE
    }

    pub fn is_va(&self) -> bool {
        self.program_type == PROGRAM_TYPE_VA
    }

    pub fn is_fha(&self) -> bool {
        self.program_type == PROGRAM_TYPE_FHA
    }

    pub fn is_jumbo(&self) -> bool {
        self.program_type == PROGRAM_TYPE_JUMBO || self.program_type == PROGRAM_TYPE_NON_AGENCY
    }

    pub fn is_conforming(&self) -> bool {
        CONFORMING_PROGRAM_TYPES.contains(&self.program_type.as_str())
    }
}

/// Engine fee amounts arrive as strings; stored JSON may also hold numbers.
fn json_decimal(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::String(s) => BigDecimal::from_str(s.trim()).ok(),
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

// ============ API Request Models ============

/// Create payload for purchase profiles.
#[derive(Debug, Deserialize)]
pub struct PurchaseProfilePayload {
    pub ownership_time: Option<String>,
    pub property_type: Option<String>,
    pub property_state: Option<String>,
    pub property_county: Option<String>,
    pub property_city: Option<String>,
    pub property_zipcode: Option<String>,
    pub property_occupation: Option<String>,
    pub purchase_timing: Option<String>,
    pub target_value: Option<i64>,
    pub purchase_down_payment: Option<i64>,
    pub credit_score: Option<i32>,
    pub is_veteran: Option<bool>,
}

/// Create payload for refinance profiles.
#[derive(Debug, Deserialize)]
pub struct RefinanceProfilePayload {
    pub ownership_time: Option<String>,
    pub property_type: Option<String>,
    pub property_state: Option<String>,
    pub property_county: Option<String>,
    pub property_city: Option<String>,
    pub property_zipcode: Option<String>,
    pub property_occupation: Option<String>,
    pub purpose: Option<String>,
    pub property_value: Option<i64>,
    pub mortgage_owe: Option<i64>,
    pub cashout_amount: Option<i64>,
    pub credit_score: Option<i32>,
    pub is_veteran: Option<bool>,
}

/// Partial update for either profile kind. Absent fields are left alone;
/// `selected_lender_id` goes through the cross-reference validator.
#[derive(Debug, Deserialize)]
pub struct ProfileUpdatePayload {
    pub ownership_time: Option<String>,
    pub property_type: Option<String>,
    pub property_state: Option<String>,
    pub property_county: Option<String>,
    pub property_city: Option<String>,
    pub property_zipcode: Option<String>,
    pub property_occupation: Option<String>,
    pub purchase_timing: Option<String>,
    pub target_value: Option<i64>,
    pub purchase_down_payment: Option<i64>,
    pub purpose: Option<String>,
    pub property_value: Option<i64>,
    pub mortgage_owe: Option<i64>,
    pub cashout_amount: Option<i64>,
    pub credit_score: Option<i32>,
    pub is_veteran: Option<bool>,
    pub selected_lender_id: Option<Uuid>,
}

/// Query parameters for scenario endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioQuery {
    pub term: Option<String>,
    pub amortization_type: Option<String>,
}
