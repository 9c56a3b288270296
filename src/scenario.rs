use bigdecimal::{BigDecimal, Zero};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::fees::LenderQuote;
use crate::models::{
    dec, MortgageProfile, RateQuoteLender, RateQuoteRequest, AMORTIZATION_FIXED,
    AMORTIZATION_VARIABLE, OWNERSHIP_LONG_TERM, OWNERSHIP_MEDIUM_TERM, OWNERSHIP_NOT_SURE,
    OWNERSHIP_SHORT_TERM, TERM_30_YEAR, TERM_7_YEAR,
};

/// How many of the best-priced products are in the running for par.
const PAR_WINDOW: usize = 5;

/// Rate deltas (basis points) for the spread around the par rate.
const SPREAD_DELTAS: &[&str] = &["25.0", "12.5", "0.0", "-12.5", "-25.0"];

/// Ownership-time horizon to recommended (term, amortization type).
pub fn recommended_product(ownership_time: &str) -> (&'static str, &'static str) {
    match ownership_time {
        OWNERSHIP_LONG_TERM => (TERM_30_YEAR, AMORTIZATION_FIXED),
        OWNERSHIP_MEDIUM_TERM => (TERM_30_YEAR, AMORTIZATION_FIXED),
        OWNERSHIP_SHORT_TERM => (TERM_7_YEAR, AMORTIZATION_VARIABLE),
        OWNERSHIP_NOT_SURE => (TERM_30_YEAR, AMORTIZATION_FIXED),
        other => panic!("unknown ownership_time: {}", other),
    }
}

pub fn fallback_product() -> (&'static str, &'static str) {
    (TERM_30_YEAR, AMORTIZATION_FIXED)
}

/// Rate quote scenario over one request's already-persisted lender offers.
///
/// Stateless and side-effect free: the caller loads the latest request and
/// its offers, the scenario only filters and ranks them in memory.
pub struct MortechScenario<'a> {
    profile: &'a MortgageProfile,
    request: Option<&'a RateQuoteRequest>,
    lenders: &'a [RateQuoteLender],
}

impl<'a> MortechScenario<'a> {
    pub fn new(
        profile: &'a MortgageProfile,
        request: Option<&'a RateQuoteRequest>,
        lenders: &'a [RateQuoteLender],
    ) -> Self {
        Self {
            profile,
            request,
            lenders,
        }
    }

    pub fn profile(&self) -> &MortgageProfile {
        self.profile
    }

    pub fn request(&self) -> Option<&RateQuoteRequest> {
        self.request
    }

    /// Results can only be calculated when a request exists, it returned
    /// offers, and the profile answered the ownership-time question.
    pub fn is_valid(&self) -> bool {
        self.request.is_some() && !self.lenders.is_empty() && self.profile.ownership_time.is_some()
    }

    pub fn optimal_term_and_amortization_type(&self) -> (&'static str, &'static str) {
        let ownership_time = self
            .profile
            .ownership_time
            .as_deref()
            .expect("ownership_time should be defined");
        recommended_product(ownership_time)
    }

    /// Find the single best offer for a term and amortization type.
    ///
    /// With a target rate: exact-rate matches, minimum points wins. Without:
    /// offers priced at or below par (points <= 0) ranked by points
    /// descending then rate ascending; the winner is the minimum rate among
    /// the top five. When nothing prices at or below par, the positive-points
    /// side is tried under the same ordering.
    pub fn calculate(
        &self,
        term: &str,
        amortization_type: &str,
        rate: Option<&BigDecimal>,
    ) -> Option<&'a RateQuoteLender> {
        let matching: Vec<&'a RateQuoteLender> = self
            .lenders
            .iter()
            .filter(|lender| lender.term == term && lender.amortization_type == amortization_type)
            .collect();

        let result = if let Some(rate) = rate {
            // specific rate with minimal points
            matching
                .into_iter()
                .filter(|lender| &lender.rate == rate)
                .min_by(|a, b| a.points.cmp(&b.points).then_with(|| a.id.cmp(&b.id)))
        } else {
            // lowest rate of the top products with credit closest to par
            let at_or_below_par: Vec<&'a RateQuoteLender> = matching
                .iter()
                .copied()
                .filter(|lender| lender.points <= BigDecimal::zero())
                .collect();
            if at_or_below_par.is_empty() {
                self.adjust_filter(&matching)
            } else {
                best_of_par_window(at_or_below_par)
            }
        };

        match result {
            Some(lender) => tracing::debug!(
                "Par search found {} {} at rate {} points {}",
                lender.program_type,
                lender.program_name,
                lender.rate,
                lender.points
            ),
            None => tracing::debug!(
                "Par search found nothing for {} {}",
                term,
                amortization_type
            ),
        }
        result
    }

    /// Increase the points threshold: consider positive-points offers.
    fn adjust_filter(&self, matching: &[&'a RateQuoteLender]) -> Option<&'a RateQuoteLender> {
        let above_par: Vec<&'a RateQuoteLender> = matching
            .iter()
            .copied()
            .filter(|lender| lender.points > BigDecimal::zero())
            .collect();
        best_of_par_window(above_par)
    }

    /// Distinct (amortization_type, term) pairs the request priced,
    /// amortization descending then term ascending.
    pub fn provided_loans(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .lenders
            .iter()
            .map(|lender| (lender.amortization_type.clone(), lender.term.clone()))
            .collect();
        pairs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        pairs.dedup();
        pairs
    }

    pub fn is_va_suitable(&self) -> bool {
        self.profile.is_veteran.unwrap_or(false) && self.lenders.iter().any(|l| l.is_va())
    }

    pub fn is_fha_suitable(&self) -> bool {
        self.lenders.iter().any(|l| l.is_fha())
    }

    pub fn is_conf_suitable(&self) -> bool {
        self.lenders.iter().any(|l| l.is_conforming())
    }

    pub fn is_conf_jumbo_suitable(&self) -> bool {
        self.lenders
            .iter()
            .any(|l| l.is_conforming() && l.program_name.contains("Jumbo"))
    }
}

/// Rank by points descending (credit closest to par first) then rate
/// ascending, keep the top five, and return the minimum-rate offer among
/// them. Rate ties inside the window resolve to the highest-points offer,
/// then the lowest id, so repeated runs over the same rows agree.
fn best_of_par_window(mut offers: Vec<&RateQuoteLender>) -> Option<&RateQuoteLender> {
    offers.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| a.rate.cmp(&b.rate))
            .then_with(|| a.id.cmp(&b.id))
    });
    offers.truncate(PAR_WINDOW);
    offers.into_iter().min_by(|a, b| {
        a.rate
            .cmp(&b.rate)
            .then_with(|| b.points.cmp(&a.points))
            .then_with(|| a.id.cmp(&b.id))
    })
}

/// Scenario selection result for one term/amortization pair.
#[derive(Debug, Serialize)]
pub struct ScenarioResult {
    pub term: String,
    pub amortization_type: String,
    pub request_id: Option<Uuid>,
    pub results: Option<LenderQuote>,
    pub programs: ProgramEligibility,
}

/// Spread of offers around the par rate.
#[derive(Debug, Serialize)]
pub struct FullScenarioResult {
    pub term: String,
    pub amortization_type: String,
    pub results: Option<Vec<LenderQuote>>,
}

/// Which program badges the offer set supports.
#[derive(Debug, Serialize)]
pub struct ProgramEligibility {
    pub va: bool,
    pub fha: bool,
    pub conforming: bool,
    pub conforming_jumbo: bool,
}

/// Builds the correct scenario results for a mortgage profile.
pub struct MortechDirector<'a> {
    scenario: MortechScenario<'a>,
}

impl<'a> MortechDirector<'a> {
    pub fn new(
        profile: &'a MortgageProfile,
        request: Option<&'a RateQuoteRequest>,
        lenders: &'a [RateQuoteLender],
    ) -> Self {
        Self {
            scenario: MortechScenario::new(profile, request, lenders),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.scenario.is_valid()
    }

    /// Recommended (term, amortization type) for this profile.
    pub fn optimal_product(&self) -> (&'static str, &'static str) {
        self.scenario.optimal_term_and_amortization_type()
    }

    /// Scenario for the given product, or the recommended one when the
    /// caller does not pick. An auto-derived 7-year recommendation with no
    /// offers falls back to 30-year fixed once before giving up.
    pub fn get_scenario(
        &self,
        term: Option<&str>,
        amortization_type: Option<&str>,
    ) -> ScenarioResult {
        let auto_derived = term.is_none() || amortization_type.is_none();
        let (mut term, mut amortization_type) = if auto_derived {
            self.scenario.optimal_term_and_amortization_type()
        } else {
            (term.unwrap(), amortization_type.unwrap())
        };

        tracing::debug!("Scenario for term {} type {}", term, amortization_type);

        let mut par_lender = self.scenario.calculate(term, amortization_type, None);
        if par_lender.is_none() && auto_derived && term == TERM_7_YEAR {
            tracing::info!(
                "No offers for {} {}, moving to 30-year fixed",
                term,
                amortization_type
            );
            let (fallback_term, fallback_type) = fallback_product();
            term = fallback_term;
            amortization_type = fallback_type;
            par_lender = self.scenario.calculate(term, amortization_type, None);
        }

        // Surface the best-priced product at the par rate
        let lender = par_lender
            .and_then(|par| self.scenario.calculate(term, amortization_type, Some(&par.rate)));

        ScenarioResult {
            term: term.to_string(),
            amortization_type: amortization_type.to_string(),
            request_id: lender.and_then(|_| self.scenario.request().map(|r| r.id)),
            results: lender.map(|l| LenderQuote::build(self.scenario.profile(), l)),
            programs: self.program_eligibility(),
        }
    }

    /// Quotes in a +/- 0.25% spread around the par rate. Deltas that do not
    /// resolve to an offer are omitted.
    pub fn get_full_scenario(&self, term: &str, amortization_type: &str) -> FullScenarioResult {
        let par_lender = self.scenario.calculate(term, amortization_type, None);
        let lenders: Vec<&RateQuoteLender> = match par_lender {
            Some(par) => SPREAD_DELTAS
                .iter()
                .filter_map(|delta| {
                    let rate = &par.rate + dec(delta);
                    self.scenario.calculate(term, amortization_type, Some(&rate))
                })
                .collect(),
            None => Vec::new(),
        };

        FullScenarioResult {
            term: term.to_string(),
            amortization_type: amortization_type.to_string(),
            results: if lenders.is_empty() {
                None
            } else {
                Some(
                    lenders
                        .into_iter()
                        .map(|l| LenderQuote::build(self.scenario.profile(), l))
                        .collect(),
                )
            },
        }
    }

    pub fn program_eligibility(&self) -> ProgramEligibility {
        ProgramEligibility {
            va: self.scenario.is_va_suitable(),
            fha: self.scenario.is_fha_suitable(),
            conforming: self.scenario.is_conf_suitable(),
            conforming_jumbo: self.scenario.is_conf_jumbo_suitable(),
        }
    }

    pub fn provided_loans(&self) -> Vec<(String, String)> {
        self.scenario.provided_loans()
    }

    /// Which validity precondition failed, as a structured map the client
    /// can render. Never an exception path.
    pub fn get_errors(&self) -> serde_json::Value {
        let status = [
            ("request_exists", self.scenario.request().is_some()),
            (
                "lender_exists",
                !self.scenario.lenders.is_empty(),
            ),
            (
                "ownership_time",
                self.scenario.profile().ownership_time.is_some(),
            ),
        ];

        let mut errors = serde_json::Map::new();
        for (key, ok) in status {
            if !ok {
                errors.insert(key.to_string(), serde_json::Value::Bool(false));
            }
        }
        json!({ "errors": errors })
    }
}
