/// Property-based tests using proptest
/// Tests invariants of the offer-selection algorithm that should hold for
/// all offer sets
use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use proptest::prelude::*;
use rate_quote_api::models::*;
use rate_quote_api::quote_client::{classify_program_type, derive_term};
use rate_quote_api::scenario::{MortechDirector, MortechScenario};
use std::str::FromStr;
use uuid::Uuid;

fn dec(literal: &str) -> BigDecimal {
    BigDecimal::from_str(literal).unwrap()
}

fn profile() -> MortgageProfile {
    MortgageProfile {
        id: Uuid::new_v4(),
        kind: KIND_PURCHASE.to_string(),
        ownership_time: Some(OWNERSHIP_NOT_SURE.to_string()),
        credit_score: Some(760),
        is_veteran: Some(false),
        property_state: Some("California".to_string()),
        property_county: Some("Orange County".to_string()),
        property_city: None,
        property_zipcode: Some("92660".to_string()),
        property_type: Some(PROPERTY_TYPE_SINGLE_FAMILY.to_string()),
        property_occupation: Some(OCCUPATION_PRIMARY.to_string()),
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

fn request_for(profile: &MortgageProfile) -> RateQuoteRequest {
    RateQuoteRequest {
        id: Uuid::new_v4(),
        mortgage_profile_id: profile.id,
        created_at: Utc::now(),
    }
}

const PRODUCTS: &[(&str, &str)] = &[
    (TERM_30_YEAR, AMORTIZATION_FIXED),
    (TERM_15_YEAR, AMORTIZATION_FIXED),
    (TERM_7_YEAR, AMORTIZATION_VARIABLE),
];

/// Offer from generated integers: rates in 12.5 bp steps between 2.00% and
/// 5.00%, points in tenths between -3.0 and +3.0.
fn offer(request_id: Uuid, rate_steps: i32, points_tenths: i32, product: usize) -> RateQuoteLender {
    let (term, amortization_type) = PRODUCTS[product % PRODUCTS.len()];
    RateQuoteLender {
        id: Uuid::new_v4(),
        request_id,
        lender_name: "Prop Lender".to_string(),
        term: term.to_string(),
        amortization_type: amortization_type.to_string(),
        program_category: "Conf".to_string(),
        program_name: "Agency Product".to_string(),
        program_type: "Conforming".to_string(),
        rate: BigDecimal::from(rate_steps) * dec("12.5"),
        points: BigDecimal::from(points_tenths) / BigDecimal::from(10),
        price: None,
        apr: BigDecimal::from(rate_steps) * dec("12.5"),
        monthly_premium: None,
        piti: Some(dec("2000.0")),
        upfront_fee: None,
        fees: None,
        created_at: Utc::now(),
    }
}

fn offer_set(raw: &[(i32, i32, usize)]) -> (MortgageProfile, RateQuoteRequest, Vec<RateQuoteLender>) {
    let profile = profile();
    let request = request_for(&profile);
    let lenders = raw
        .iter()
        .map(|(rate, points, product)| offer(request.id, *rate, *points, *product))
        .collect();
    (profile, request, lenders)
}

// Property: par search result always matches the requested product
proptest! {
    #[test]
    fn par_search_result_matches_filter(
        raw in prop::collection::vec((16..=40, -30..=30, 0..3usize), 0..25)
    ) {
        let (profile, request, lenders) = offer_set(&raw);
        let scenario = MortechScenario::new(&profile, Some(&request), &lenders);

        for (term, amortization_type) in PRODUCTS {
            if let Some(winner) = scenario.calculate(term, amortization_type, None) {
                prop_assert_eq!(&winner.term, term);
                prop_assert_eq!(&winner.amortization_type, amortization_type);
            } else {
                // None only when no offer matches the product at all
                prop_assert!(!lenders
                    .iter()
                    .any(|l| &l.term == term && &l.amortization_type == amortization_type));
            }
        }
    }

    #[test]
    fn winner_is_at_or_below_par_when_possible(
        raw in prop::collection::vec((16..=40, -30..=30, 0..3usize), 1..25)
    ) {
        let (profile, request, lenders) = offer_set(&raw);
        let scenario = MortechScenario::new(&profile, Some(&request), &lenders);

        let any_at_or_below_par = lenders.iter().any(|l| {
            l.term == TERM_30_YEAR
                && l.amortization_type == AMORTIZATION_FIXED
                && l.points <= BigDecimal::zero()
        });
        if let Some(winner) = scenario.calculate(TERM_30_YEAR, AMORTIZATION_FIXED, None) {
            if any_at_or_below_par {
                prop_assert!(winner.points <= BigDecimal::zero());
            } else {
                prop_assert!(winner.points > BigDecimal::zero());
            }
        }
    }

    // No matching at-or-below-par offer may price closer to par AND carry a
    // lower rate than the winner: such an offer would rank above the winner
    // inside the window and steal the minimum-rate slot.
    #[test]
    fn winner_is_never_dominated(
        raw in prop::collection::vec((16..=40, -30..=30, 0..3usize), 1..25)
    ) {
        let (profile, request, lenders) = offer_set(&raw);
        let scenario = MortechScenario::new(&profile, Some(&request), &lenders);

        if let Some(winner) = scenario.calculate(TERM_30_YEAR, AMORTIZATION_FIXED, None) {
            if winner.points <= BigDecimal::zero() {
                let dominated = lenders.iter().any(|l| {
                    l.term == TERM_30_YEAR
                        && l.amortization_type == AMORTIZATION_FIXED
                        && l.points <= BigDecimal::zero()
                        && l.points >= winner.points
                        && l.rate < winner.rate
                });
                prop_assert!(!dominated);
            }
        }
    }
}

// Property: by-rate search returns the true minimum points at that rate
proptest! {
    #[test]
    fn by_rate_search_returns_minimum_points(
        raw in prop::collection::vec((16..=40, -30..=30), 1..25),
        target in any::<prop::sample::Index>()
    ) {
        let raw: Vec<(i32, i32, usize)> =
            raw.into_iter().map(|(rate, points)| (rate, points, 0)).collect();
        let (profile, request, lenders) = offer_set(&raw);
        let scenario = MortechScenario::new(&profile, Some(&request), &lenders);

        let target_rate = lenders[target.index(lenders.len())].rate.clone();
        let winner = scenario
            .calculate(TERM_30_YEAR, AMORTIZATION_FIXED, Some(&target_rate))
            .expect("an offer exists at the target rate");

        prop_assert_eq!(&winner.rate, &target_rate);
        let min_points = lenders
            .iter()
            .filter(|l| l.rate == target_rate)
            .map(|l| l.points.clone())
            .min()
            .unwrap();
        prop_assert_eq!(&winner.points, &min_points);
    }
}

// Property: the full-scenario spread never leaves the +/- 25 bp deltas
proptest! {
    #[test]
    fn spread_stays_on_known_deltas(
        raw in prop::collection::vec((16..=40, -30..=30), 1..25)
    ) {
        let raw: Vec<(i32, i32, usize)> =
            raw.into_iter().map(|(rate, points)| (rate, points, 0)).collect();
        let (profile, request, lenders) = offer_set(&raw);
        let scenario = MortechScenario::new(&profile, Some(&request), &lenders);
        let director = MortechDirector::new(&profile, Some(&request), &lenders);

        let par = scenario
            .calculate(TERM_30_YEAR, AMORTIZATION_FIXED, None)
            .expect("a par offer")
            .rate
            .clone();
        let allowed: Vec<BigDecimal> = ["25.0", "12.5", "0.0", "-12.5", "-25.0"]
            .iter()
            .map(|delta| &par + dec(delta))
            .collect();

        let result = director.get_full_scenario(TERM_30_YEAR, AMORTIZATION_FIXED);
        let quotes = result.results.expect("the par delta always resolves");
        prop_assert!(!quotes.is_empty());
        for quote in &quotes {
            prop_assert!(allowed.contains(&quote.rate), "off-spread rate {}", quote.rate);
        }
    }
}

// Property: vendor string handling never panics
proptest! {
    #[test]
    fn derive_term_never_panics(arm in "[0-9]{0,4}", product in "[0-9]{1,3}") {
        let term = derive_term(&arm, &product);
        prop_assert!(term.ends_with(" Year"));
    }

    #[test]
    fn classify_program_type_never_empty(
        vendor_product in "[ -~]{0,30}",
        product in "[ -~]{0,30}"
    ) {
        let program = classify_program_type(&vendor_product, &product);
        prop_assert!(!program.is_empty());
    }
}
