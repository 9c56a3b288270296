use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::cell::OnceCell;
use uuid::Uuid;

use crate::models::{dec, MortgageProfile, RateQuoteLender};

// Fee identifiers used in quote responses
pub const COST_OF_CHOSEN_RATE: &str = "cost_of_chosen_rate";
pub const TAX_SERVICE_FEE: &str = "tax_service_fee";
pub const UNDERWRITING: &str = "underwriting";
pub const FLOOD_CERTIFICATION: &str = "flood_certification";
pub const UPFRONT_MORTGAGE_INSURANCE_PREMIUM: &str = "upfront_mortgage_insurance_premium";
pub const PREPAID_INTEREST: &str = "initial_interest";
pub const ESCROWED_INSURANCE: &str = "escrowed_insurance";
pub const ESCROWED_TAXES: &str = "escrowed_taxes";
pub const MORTGAGE_INSURANCE: &str = "mortgage_insurance";
pub const ESTIMATED_APPRAISAL_FEE: &str = "estimated_appraisal_fee";
pub const TITLE_FEE: &str = "title_fee";
pub const ESCROW_FEE: &str = "escrow_fee";
pub const CREDIT_REPORT_FEE: &str = "credit_report_fee";

fn lender_term_years(term: &str) -> i64 {
    match term {
        "3 Year" => 3,
        "5 Year" => 5,
        "7 Year" => 7,
        "10 Year" => 10,
        "15 Year" => 15,
        "20 Year" => 20,
        "25 Year" => 25,
        "30 Year" => 30,
        "40 Year" => 40,
        other => panic!("unknown lender term: {}", other),
    }
}

/// Fee and payment breakdown for one (profile, offer) pair.
///
/// Formulae reference: http://www.efunda.com/formulae/finance/apr_calculator.cfm
///
/// Each derived amount is cached on the instance the first time it is
/// computed; the cache lives and dies with one request/response cycle.
pub struct MortechFees<'a> {
    profile: &'a MortgageProfile,
    lender: &'a RateQuoteLender,
    loan_amount: OnceCell<BigDecimal>,
    escrowed_insurance: OnceCell<BigDecimal>,
    escrowed_taxes: OnceCell<BigDecimal>,
    cost_of_chosen_rate: OnceCell<BigDecimal>,
    prepaid_interest: OnceCell<BigDecimal>,
    mortgage_insurance: OnceCell<BigDecimal>,
}

impl<'a> MortechFees<'a> {
    pub fn new(profile: &'a MortgageProfile, lender: &'a RateQuoteLender) -> Self {
        Self {
            profile,
            lender,
            loan_amount: OnceCell::new(),
            escrowed_insurance: OnceCell::new(),
            escrowed_taxes: OnceCell::new(),
            cost_of_chosen_rate: OnceCell::new(),
            prepaid_interest: OnceCell::new(),
            mortgage_insurance: OnceCell::new(),
        }
    }

    pub fn loan_amount(&self) -> BigDecimal {
        self.loan_amount
            .get_or_init(|| BigDecimal::from(self.profile.loan_amount()))
            .clone()
    }

    /// Loan amount * 0.00375 / 12
    pub fn escrowed_insurance(&self) -> BigDecimal {
        self.escrowed_insurance
            .get_or_init(|| self.loan_amount() * dec("0.00375") / dec("12"))
            .clone()
    }

    /// Property value * 0.0125 / 12
    pub fn escrowed_taxes(&self) -> BigDecimal {
        self.escrowed_taxes
            .get_or_init(|| {
                BigDecimal::from(self.profile.property_value()) * dec("0.0125") / dec("12")
            })
            .clone()
    }

    /// Cost = loan amount * points / 100
    pub fn cost_of_chosen_rate(&self) -> BigDecimal {
        self.cost_of_chosen_rate
            .get_or_init(|| self.loan_amount() * &self.lender.points / dec("100"))
            .clone()
    }

    /// Vendor-quoted pre-paid interest when present, otherwise
    /// loan amount * (rate / 100) / (365 * term years).
    pub fn prepaid_interest(&self) -> BigDecimal {
        self.prepaid_interest
            .get_or_init(|| {
                let quoted = self.lender.prepaid_interest_fee();
                if !quoted.is_zero() {
                    return quoted;
                }
                let rate = &self.lender.rate / dec("100");
                let term_days = BigDecimal::from(365 * lender_term_years(&self.lender.term));
                self.loan_amount() * rate / term_days
            })
            .clone()
    }

    /// Monthly mortgage insurance. LTV and other adjustments are
    /// pre-calculated by the pricing engine.
    pub fn mortgage_insurance(&self) -> BigDecimal {
        self.mortgage_insurance
            .get_or_init(|| {
                self.lender
                    .monthly_premium
                    .clone()
                    .unwrap_or_else(BigDecimal::zero)
            })
            .clone()
    }

    /// Fee id -> amount for every fee this quote carries.
    pub fn get_fees(&self) -> Vec<(&'static str, Option<BigDecimal>)> {
        vec![
            (UNDERWRITING, Some(self.lender.underwriting_fee())),
            (FLOOD_CERTIFICATION, Some(self.lender.flood_certification_fee())),
            (
                UPFRONT_MORTGAGE_INSURANCE_PREMIUM,
                self.lender.upfront_fee.clone(),
            ),
            (TAX_SERVICE_FEE, Some(self.lender.tax_service_fee())),
            (ESCROWED_TAXES, Some(self.escrowed_taxes())),
            (ESCROWED_INSURANCE, Some(self.escrowed_insurance())),
            (PREPAID_INTEREST, Some(self.prepaid_interest())),
            (MORTGAGE_INSURANCE, Some(self.mortgage_insurance())),
            (COST_OF_CHOSEN_RATE, Some(self.cost_of_chosen_rate())),
            (
                ESTIMATED_APPRAISAL_FEE,
                Some(self.lender.estimated_appraisal_fee()),
            ),
            (TITLE_FEE, Some(self.lender.title_fee())),
            (ESCROW_FEE, Some(self.lender.escrow_fee())),
            (CREDIT_REPORT_FEE, Some(self.lender.credit_report_fee())),
        ]
    }

    /// All non-zero fees; cost-of-chosen-rate is always included. Avoids
    /// presenting fees which are unknown and treated as zero.
    pub fn get_non_zero_fees(&self) -> serde_json::Map<String, Value> {
        let mut fees = serde_json::Map::new();
        for (name, value) in self.get_fees() {
            let keep = match &value {
                Some(amount) => name == COST_OF_CHOSEN_RATE || !amount.is_zero(),
                None => false,
            };
            if keep {
                if let Some(amount) = value {
                    fees.insert(name.to_string(), Value::String(amount.to_string()));
                }
            }
        }
        fees
    }

    /// Total up-front cost for the rate-quote results page.
    pub fn get_total_fees(&self) -> BigDecimal {
        let fees = [
            Some(self.lender.underwriting_fee()),
            Some(self.cost_of_chosen_rate()),
            Some(self.lender.tax_service_fee()),
            self.lender.upfront_fee.clone(),
            Some(self.prepaid_interest()),
            Some(self.lender.estimated_appraisal_fee()),
            Some(self.lender.title_fee()),
            Some(self.lender.escrow_fee()),
            Some(self.lender.credit_report_fee()),
        ];
        fees.into_iter()
            .flatten()
            .filter(|fee| !fee.is_zero())
            .sum()
    }

    /// Total monthly payment; the offer's piti does not include taxes or
    /// escrow, so they are added here. `None` when the offer has no piti.
    pub fn get_total_monthly_payment(&self) -> Option<BigDecimal> {
        let principal_and_interest = self.lender.monthly_payment()?;
        Some(
            principal_and_interest
                + self.escrowed_insurance()
                + self.escrowed_taxes()
                + self.mortgage_insurance(),
        )
    }
}

/// Serialized view of a lender offer, the shape every quote endpoint
/// returns.
#[derive(Debug, Serialize)]
pub struct LenderQuote {
    pub id: Uuid,
    pub lender_name: String,
    pub amortization_type: String,
    pub term: String,
    pub program_type: String,
    pub program_name: String,
    pub points: BigDecimal,
    pub rate: BigDecimal,
    pub rate_percent: BigDecimal,
    pub apr: BigDecimal,
    pub qualifying_rate: BigDecimal,
    pub monthly_payment: Option<BigDecimal>,
    pub total_monthly_payment: Option<BigDecimal>,
    pub fees: serde_json::Map<String, Value>,
    pub total_fees: BigDecimal,
    pub is_fixed: bool,
    pub is_variable: bool,
    pub created_at: DateTime<Utc>,
}

impl LenderQuote {
    pub fn build(profile: &MortgageProfile, lender: &RateQuoteLender) -> Self {
        let fees = MortechFees::new(profile, lender);
        Self {
            id: lender.id,
            lender_name: lender.lender_name.clone(),
            amortization_type: lender.amortization_type.clone(),
            term: lender.term.clone(),
            program_type: lender.program_type.clone(),
            program_name: lender.program_name.clone(),
            points: lender.points.clone(),
            rate: lender.rate.clone(),
            rate_percent: lender.rate_percent(),
            apr: lender.apr.clone(),
            qualifying_rate: lender.qualifying_rate(),
            monthly_payment: lender.monthly_payment(),
            total_monthly_payment: fees.get_total_monthly_payment(),
            fees: fees.get_non_zero_fees(),
            total_fees: fees.get_total_fees(),
            is_fixed: lender.is_fixed(),
            is_variable: lender.is_variable(),
            created_at: lender.created_at,
        }
    }
}
