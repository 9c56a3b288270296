use crate::models::{self, MortgageProfile};
use crate::states;

/// Loan purpose codes the pricing engine expects.
pub const LOAN_PURPOSE_PURCHASE: i32 = 0;
pub const LOAN_PURPOSE_RATE_AND_TERM: i32 = 1; // Refi
pub const LOAN_PURPOSE_CASHOUT: i32 = 2; // Refi
pub const LOAN_PURPOSE_HOME_EQUITY: i32 = 3; // Refi
pub const LOAN_PURPOSE_HELOC: i32 = 4; // Refi

/// Property type codes the pricing engine expects.
pub const PROPERTY_TYPE_1_UNIT: i32 = 0;
pub const PROPERTY_TYPE_2_UNIT: i32 = 1;
pub const PROPERTY_TYPE_3_UNIT: i32 = 2;
pub const PROPERTY_TYPE_4_UNIT: i32 = 3;
pub const PROPERTY_TYPE_MANUFACTURED_HOME: i32 = 5;
pub const PROPERTY_TYPE_CONDOS_LOW: i32 = 6; // 1-4 stories
pub const PROPERTY_TYPE_CONDOS_MID: i32 = 7; // 5-8
pub const PROPERTY_TYPE_CONDOS_HIGH: i32 = 8; // >8
pub const PROPERTY_TYPE_TOWNHOMES: i32 = 15;

/// Occupancy codes the pricing engine expects.
pub const OCCUPANCY_TYPE_OWNER_OCCUPIED: i32 = 0;
pub const OCCUPANCY_TYPE_NON_OWNER_OCCUPIED: i32 = 1;
pub const OCCUPANCY_TYPE_SECOND_HOME: i32 = 2;

const REQUIRED_FIELDS_BASE: &[&str] = &["credit_score", "property_state"];
const REQUIRED_FIELDS_PURCHASE: &[&str] = &["target_value", "purchase_down_payment"];
const REQUIRED_FIELDS_REFINANCE: &[&str] =
    &["property_type", "property_value", "mortgage_owe", "purpose"];

/// Translates a mortgage profile's domain fields into the fixed vocabulary
/// the pricing engine expects.
///
/// Precondition failures (`is_enough_data`, `is_valid_state`) are reported
/// as booleans so callers can render what is missing. Once those gates
/// pass, an absent source field is a programmer error and panics: a wrong
/// quote must never be produced silently.
pub struct MortechCalculations<'a> {
    profile: &'a MortgageProfile,
}

impl<'a> MortechCalculations<'a> {
    pub fn new(profile: &'a MortgageProfile) -> Self {
        Self { profile }
    }

    /// Purpose-specific required-field list; the gate before any external
    /// request is issued.
    pub fn required_fields(&self) -> Vec<&'static str> {
        let mut fields: Vec<&'static str> = REQUIRED_FIELDS_BASE.to_vec();
        if self.profile.is_purchase() {
            fields.extend_from_slice(REQUIRED_FIELDS_PURCHASE);
        } else {
            fields.extend_from_slice(REQUIRED_FIELDS_REFINANCE);
        }
        fields
    }

    fn has_value(&self, field: &str) -> bool {
        match field {
            "credit_score" => self.profile.credit_score.is_some(),
            "property_state" => self.profile.property_state.is_some(),
            "target_value" => self.profile.target_value.is_some(),
            "purchase_down_payment" => self.profile.purchase_down_payment.is_some(),
            "property_type" => self.profile.property_type.is_some(),
            "property_value" => self.profile.property_value.is_some(),
            "mortgage_owe" => self.profile.mortgage_owe.is_some(),
            "purpose" => self.profile.purpose.is_some(),
            other => panic!("unknown required field: {}", other),
        }
    }

    pub fn is_enough_data(&self) -> bool {
        let result = self
            .required_fields()
            .iter()
            .all(|field| self.has_value(field));
        tracing::debug!(
            "Data sufficiency {} for {} profile {}",
            result,
            self.profile.kind,
            self.profile.id
        );
        result
    }

    pub fn is_valid_state(&self) -> bool {
        let state = self
            .profile
            .property_state
            .as_deref()
            .expect("property_state should be defined");
        states::is_licensed_state(state)
    }

    /// Combined validation gate for the pricing-engine request.
    pub fn is_valid(&self) -> bool {
        self.is_enough_data() && self.is_valid_state()
    }

    /// Structured map of failed validations, for a 400 response body.
    pub fn validation_errors(&self) -> serde_json::Value {
        let mut errors = serde_json::Map::new();
        if !self.is_enough_data() {
            errors.insert("is_enough_data".to_string(), serde_json::Value::Bool(false));
        }
        if self.profile.property_state.is_none() || !self.is_valid_state() {
            errors.insert("is_valid_state".to_string(), serde_json::Value::Bool(false));
        }
        serde_json::json!({ "errors": errors })
    }

    pub fn loan_purpose(&self) -> i32 {
        if self.profile.is_purchase() {
            return LOAN_PURPOSE_PURCHASE;
        }
        let purpose = self
            .profile
            .purpose
            .as_deref()
            .expect("purpose should be defined");
        match purpose {
            models::PURPOSE_CASH_OUT => LOAN_PURPOSE_CASHOUT,
            models::PURPOSE_LOWER_MORTGAGE_PAYMENTS => LOAN_PURPOSE_RATE_AND_TERM,
            models::PURPOSE_BOTH => LOAN_PURPOSE_HOME_EQUITY,
            models::PURPOSE_HELOC => LOAN_PURPOSE_HELOC,
            other => panic!("unknown refinance purpose: {}", other),
        }
    }

    pub fn property_type_code(&self) -> Option<i32> {
        let property_type = self
            .profile
            .property_type
            .as_deref()
            .expect("property_type should be defined");
        match property_type {
            models::PROPERTY_TYPE_SINGLE_FAMILY => Some(PROPERTY_TYPE_1_UNIT),
            models::PROPERTY_TYPE_CONDO_LESS_5 => Some(PROPERTY_TYPE_CONDOS_LOW),
            models::PROPERTY_TYPE_CONDO_5_8 => Some(PROPERTY_TYPE_CONDOS_MID),
            models::PROPERTY_TYPE_CONDO_MORE_8 => Some(PROPERTY_TYPE_CONDOS_HIGH),
            models::PROPERTY_TYPE_TOWNHOUSE => Some(PROPERTY_TYPE_TOWNHOMES),
            models::PROPERTY_TYPE_TWO_UNIT => Some(PROPERTY_TYPE_2_UNIT),
            models::PROPERTY_TYPE_THREE_UNIT => Some(PROPERTY_TYPE_3_UNIT),
            models::PROPERTY_TYPE_FOUR_UNIT => Some(PROPERTY_TYPE_4_UNIT),
            models::PROPERTY_TYPE_MANUFACTURED_SINGLE => Some(PROPERTY_TYPE_MANUFACTURED_HOME),
            _ => None,
        }
    }

    /// Occupancy code from the occupation answer. Legacy purchase-type
    /// values are still mapped for profiles created by older clients.
    pub fn occupancy_code(&self) -> Option<i32> {
        let occupation = if self.profile.is_refinance() {
            self.profile
                .property_occupation
                .as_deref()
                .expect("property_occupation should be defined")
        } else {
            self.profile.property_occupation.as_deref()?
        };
        match occupation {
            models::OCCUPATION_PRIMARY
            | models::PURCHASE_TYPE_FIRST_TIME_HOMEBUYER
            | models::PURCHASE_TYPE_SELLING_HOME => Some(OCCUPANCY_TYPE_OWNER_OCCUPIED),
            models::OCCUPATION_SECONDARY | models::PURCHASE_TYPE_VACATION_HOME => {
                Some(OCCUPANCY_TYPE_SECOND_HOME)
            }
            models::OCCUPATION_INVESTMENT => Some(OCCUPANCY_TYPE_NON_OWNER_OCCUPIED),
            _ => None,
        }
    }

    /// Cashout amount for cash-out refinances, `None` otherwise.
    pub fn cashout_amount(&self) -> Option<i64> {
        if !self.profile.is_refinance() {
            return None;
        }
        let purpose = self
            .profile
            .purpose
            .as_deref()
            .expect("purpose should be defined");
        if purpose == models::PURPOSE_CASH_OUT {
            self.profile.cashout_amount
        } else {
            None
        }
    }

    pub fn military(&self) -> bool {
        self.profile.is_veteran.unwrap_or(false)
    }

    pub fn loan_amount(&self) -> i64 {
        self.profile.loan_amount()
    }

    pub fn property_value(&self) -> i64 {
        self.profile.property_value()
    }

    pub fn loan_to_value(&self) -> f64 {
        self.profile.loan_to_value()
    }

    pub fn property_state_code(&self) -> &'static str {
        self.profile.property_state_code()
    }

    pub fn county(&self) -> String {
        self.profile.property_county_name()
    }

    pub fn zipcode(&self) -> Option<&str> {
        self.profile.property_zipcode.as_deref()
    }

    pub fn is_condo(&self) -> bool {
        matches!(
            self.profile.property_type.as_deref(),
            Some(models::PROPERTY_TYPE_CONDO_LESS_5)
                | Some(models::PROPERTY_TYPE_CONDO_5_8)
                | Some(models::PROPERTY_TYPE_CONDO_MORE_8)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn purchase_profile() -> MortgageProfile {
        MortgageProfile {
            id: Uuid::new_v4(),
            kind: models::KIND_PURCHASE.to_string(),
            ownership_time: Some(models::OWNERSHIP_NOT_SURE.to_string()),
            credit_score: Some(760),
            is_veteran: Some(false),
            property_state: Some("California".to_string()),
            property_county: Some("Orange County".to_string()),
            property_city: None,
            property_zipcode: Some("92660".to_string()),
            property_type: Some(models::PROPERTY_TYPE_SINGLE_FAMILY.to_string()),
            property_occupation: Some(models::OCCUPATION_PRIMARY.to_string()),
            target_value: Some(750_000),
            purchase_down_payment: Some(150_000),
            purchase_timing: None,
            purpose: None,
            property_value: None,
            mortgage_owe: None,
            cashout_amount: None,
            rate_quote_refresh_progress: None,
            selected_lender_id: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn refinance_profile() -> MortgageProfile {
        let mut profile = purchase_profile();
        profile.kind = models::KIND_REFINANCE.to_string();
        profile.target_value = None;
        profile.purchase_down_payment = None;
        profile.purpose = Some(models::PURPOSE_LOWER_MORTGAGE_PAYMENTS.to_string());
        profile.property_value = Some(900_000);
        profile.mortgage_owe = Some(400_000);
        profile
    }

    #[test]
    fn test_required_fields_per_kind() {
        let purchase = purchase_profile();
        let fields = MortechCalculations::new(&purchase).required_fields();
        assert!(fields.contains(&"credit_score"));
        assert!(fields.contains(&"target_value"));
        assert!(!fields.contains(&"mortgage_owe"));

        let refinance = refinance_profile();
        let fields = MortechCalculations::new(&refinance).required_fields();
        assert!(fields.contains(&"mortgage_owe"));
        assert!(fields.contains(&"purpose"));
        assert!(!fields.contains(&"purchase_down_payment"));
    }

    #[test]
    fn test_enough_data_gate() {
        let mut profile = purchase_profile();
        assert!(MortechCalculations::new(&profile).is_enough_data());

        profile.purchase_down_payment = None;
        assert!(!MortechCalculations::new(&profile).is_enough_data());
    }

    #[test]
    fn test_valid_state_gate() {
        let mut profile = purchase_profile();
        assert!(MortechCalculations::new(&profile).is_valid_state());
        assert!(MortechCalculations::new(&profile).is_valid());

        profile.property_state = Some("Puerto Rico".to_string());
        let calculations = MortechCalculations::new(&profile);
        assert!(!calculations.is_valid_state());
        let errors = calculations.validation_errors();
        assert_eq!(
            errors["errors"]["is_valid_state"],
            serde_json::Value::Bool(false)
        );
    }

    #[test]
    fn test_loan_purpose_codes() {
        let purchase = purchase_profile();
        assert_eq!(
            MortechCalculations::new(&purchase).loan_purpose(),
            LOAN_PURPOSE_PURCHASE
        );

        let mut refinance = refinance_profile();
        assert_eq!(
            MortechCalculations::new(&refinance).loan_purpose(),
            LOAN_PURPOSE_RATE_AND_TERM
        );
        refinance.purpose = Some(models::PURPOSE_CASH_OUT.to_string());
        assert_eq!(
            MortechCalculations::new(&refinance).loan_purpose(),
            LOAN_PURPOSE_CASHOUT
        );
        refinance.purpose = Some(models::PURPOSE_HELOC.to_string());
        assert_eq!(
            MortechCalculations::new(&refinance).loan_purpose(),
            LOAN_PURPOSE_HELOC
        );
    }

    #[test]
    fn test_property_type_codes() {
        let mut profile = purchase_profile();
        assert_eq!(
            MortechCalculations::new(&profile).property_type_code(),
            Some(PROPERTY_TYPE_1_UNIT)
        );
        profile.property_type = Some(models::PROPERTY_TYPE_CONDO_5_8.to_string());
        assert_eq!(
            MortechCalculations::new(&profile).property_type_code(),
            Some(PROPERTY_TYPE_CONDOS_MID)
        );
        profile.property_type = Some("houseboat".to_string());
        assert_eq!(MortechCalculations::new(&profile).property_type_code(), None);
    }

    #[test]
    fn test_occupancy_codes_with_legacy_values() {
        let mut profile = purchase_profile();
        assert_eq!(
            MortechCalculations::new(&profile).occupancy_code(),
            Some(OCCUPANCY_TYPE_OWNER_OCCUPIED)
        );
        profile.property_occupation =
            Some(models::PURCHASE_TYPE_VACATION_HOME.to_string());
        assert_eq!(
            MortechCalculations::new(&profile).occupancy_code(),
            Some(OCCUPANCY_TYPE_SECOND_HOME)
        );
        profile.property_occupation = Some(models::OCCUPATION_INVESTMENT.to_string());
        assert_eq!(
            MortechCalculations::new(&profile).occupancy_code(),
            Some(OCCUPANCY_TYPE_NON_OWNER_OCCUPIED)
        );
        profile.property_occupation = None;
        assert_eq!(MortechCalculations::new(&profile).occupancy_code(), None);
    }

    #[test]
    fn test_cashout_only_for_cashout_refinance() {
        let mut refinance = refinance_profile();
        refinance.cashout_amount = Some(50_000);
        assert_eq!(MortechCalculations::new(&refinance).cashout_amount(), None);

        refinance.purpose = Some(models::PURPOSE_CASH_OUT.to_string());
        assert_eq!(
            MortechCalculations::new(&refinance).cashout_amount(),
            Some(50_000)
        );

        let purchase = purchase_profile();
        assert_eq!(MortechCalculations::new(&purchase).cashout_amount(), None);
    }
}
