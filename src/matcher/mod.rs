//! Cross-venue event matching.
//!
//! Pairs venue-A markets with venue-B markets into [`SportEvent`]s by fuzzy
//! team-name similarity, gated by sport, date, line, and event-group
//! compatibility. Greedy: each venue-B market is consumed by at most one
//! venue-A market, best candidate first.

pub mod groups;
pub mod normalize;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use tracing::{debug, info};

use crate::models::{Market, MarketType, SportEvent, Venue};
use groups::groups_compatible;
use normalize::{is_individual_sport, is_three_outcome_sport, team_similarity};

/// Minimum per-team similarity for two-team game matching.
const TEAM_MATCH_THRESHOLD: f64 = 75.0;

/// Single-named markets (futures, individual sports) carry much less signal,
/// so the bar is correspondingly higher.
const SINGLE_TEAM_THRESHOLD: f64 = 93.0;

/// Calendar-day tolerance between venue game dates.
const DATE_TOLERANCE_DAYS: i64 = 1;

/// Individually-scheduled sports list tournament dates loosely; allow more.
const INDIVIDUAL_DATE_TOLERANCE_DAYS: i64 = 2;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f64,
    swapped: bool,
}

fn date_tolerance(sport: &str) -> i64 {
    if is_individual_sport(sport) {
        INDIVIDUAL_DATE_TOLERANCE_DAYS
    } else {
        DATE_TOLERANCE_DAYS
    }
}

fn lines_agree(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(la), Some(lb)) => (la - lb).abs() < 1e-9,
        _ => false,
    }
}

fn dates_agree(a: &Market, b: &Market) -> bool {
    match (a.game_date, b.game_date) {
        (Some(da), Some(db)) => (da - db).num_days().abs() <= date_tolerance(&a.sport),
        // A game market without a date on either venue cannot be safely
        // paired; refusing here is what keeps tomorrow's rematch distinct.
        _ => false,
    }
}

/// Best score for a pairing where at least one side names a single team.
/// The single name may be either of the other side's teams, or the team its
/// venue declares as the YES outcome in the metadata bag.
fn single_name_score(a: &Market, b: &Market) -> f64 {
    let (single, other) = if a.team_b.is_empty() { (a, b) } else { (b, a) };
    let mut score = team_similarity(&single.team_a, &other.team_a, &a.sport);
    if !other.team_b.is_empty() {
        score = score.max(team_similarity(&single.team_a, &other.team_b, &a.sport));
    }
    if let Some(yes_team) = other.raw_str("yes_team") {
        score = score.max(team_similarity(&single.team_a, yes_team, &a.sport));
    }
    score
}

/// Score a candidate pairing, or `None` when a hard gate rejects it.
fn score_pair(a: &Market, b: &Market) -> Option<Candidate> {
    if a.sport != b.sport || a.market_type != b.market_type {
        return None;
    }
    if !lines_agree(a.line, b.line) || a.map_number != b.map_number {
        return None;
    }

    if a.market_type == MarketType::Futures {
        if !groups_compatible(&a.event_group, &b.event_group) {
            return None;
        }
        let score = single_name_score(a, b);
        return (score >= SINGLE_TEAM_THRESHOLD).then_some(Candidate {
            score,
            swapped: false,
        });
    }

    if !dates_agree(a, b) {
        return None;
    }

    // Single-named game markets (e.g. tennis "will X win the match") pair on
    // the named side alone, at the stricter bar.
    if a.team_b.is_empty() || b.team_b.is_empty() {
        let score = single_name_score(a, b);
        return (score >= SINGLE_TEAM_THRESHOLD).then_some(Candidate {
            score,
            swapped: false,
        });
    }

    let direct = f64::min(
        team_similarity(&a.team_a, &b.team_a, &a.sport),
        team_similarity(&a.team_b, &b.team_b, &a.sport),
    );
    // Swapped alignment cannot be priced once a draw outcome exists.
    let swapped = if is_three_outcome_sport(&a.sport) {
        0.0
    } else {
        f64::min(
            team_similarity(&a.team_a, &b.team_b, &a.sport),
            team_similarity(&a.team_b, &b.team_a, &a.sport),
        )
    };

    let (score, is_swapped) = if swapped > direct {
        (swapped, true)
    } else {
        (direct, false)
    };
    (score >= TEAM_MATCH_THRESHOLD).then_some(Candidate {
        score,
        swapped: is_swapped,
    })
}

fn parse_start_time(market: &Market) -> Option<DateTime<Utc>> {
    market
        .raw_str("start_time")
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn unmatched_event(market: &Market) -> SportEvent {
    let (market_a, market_b) = match market.venue {
        Venue::ExchangeA => (Some(market.clone()), None),
        Venue::ExchangeB => (None, Some(market.clone())),
    };
    SportEvent {
        id: format!("{}:{}", market.venue, market.event_id),
        title: market.title.clone(),
        team_a: market.team_a.clone(),
        team_b: market.team_b.clone(),
        start_time: parse_start_time(market),
        market_a,
        market_b,
        matched: false,
        teams_swapped: false,
    }
}

/// Drop duplicate game markets for the same venue event, keeping the first
/// seen (a venue may list one market per team of the same game). Futures keep
/// per-market identity: a championship board is one event id with one market
/// per contender.
fn dedup_by_event<'a>(markets: &'a [Market]) -> Vec<&'a Market> {
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    markets
        .iter()
        .filter(|m| m.market_type != MarketType::Game || seen.insert(m.event_id.as_str()))
        .collect()
}

/// Pair venue-A markets against venue-B markets.
///
/// Returns one [`SportEvent`] per venue-A market (matched or not) plus one
/// per leftover venue-B market, so downstream consumers see the full
/// universe. Event team naming always follows venue-A; `teams_swapped`
/// records when venue-B's YES side is venue-A's NO side.
pub fn match_events(exchange_a: &[Market], exchange_b: &[Market]) -> Vec<SportEvent> {
    let a_markets = dedup_by_event(exchange_a);
    let b_markets = dedup_by_event(exchange_b);

    let mut b_used = vec![false; b_markets.len()];
    let mut events = Vec::with_capacity(a_markets.len());
    let mut matched_count = 0usize;

    for a in &a_markets {
        let mut best: Option<(usize, Candidate)> = None;
        for (idx, b) in b_markets.iter().enumerate() {
            if b_used[idx] {
                continue;
            }
            if let Some(cand) = score_pair(a, b) {
                if best.map(|(_, c)| cand.score > c.score).unwrap_or(true) {
                    best = Some((idx, cand));
                }
            }
        }

        match best {
            Some((idx, cand)) => {
                b_used[idx] = true;
                matched_count += 1;
                let b = b_markets[idx];
                debug!(
                    event = "markets_matched",
                    team_a = %a.team_a,
                    team_b = %a.team_b,
                    score = cand.score,
                    swapped = cand.swapped,
                    sport = %a.sport,
                );
                events.push(SportEvent {
                    id: format!("{}:{}", a.venue, a.event_id),
                    title: a.title.clone(),
                    team_a: a.team_a.clone(),
                    team_b: a.team_b.clone(),
                    start_time: parse_start_time(a).or_else(|| parse_start_time(b)),
                    market_a: Some((*a).clone()),
                    market_b: Some(b.clone()),
                    matched: true,
                    teams_swapped: cand.swapped,
                });
            }
            None => events.push(unmatched_event(a)),
        }
    }

    for (idx, b) in b_markets.iter().enumerate() {
        if !b_used[idx] {
            events.push(unmatched_event(b));
        }
    }

    info!(
        event = "matching_complete",
        exchange_a = a_markets.len(),
        exchange_b = b_markets.len(),
        matched = matched_count,
    );
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn make_market(
        venue: Venue,
        event_id: &str,
        team_a: &str,
        team_b: &str,
        sport: &str,
        date: Option<NaiveDate>,
    ) -> Market {
        Market {
            venue,
            market_id: format!("{event_id}-m"),
            event_id: event_id.to_string(),
            title: format!("{team_a} vs {team_b}"),
            team_a: team_a.to_string(),
            team_b: team_b.to_string(),
            sport: sport.to_string(),
            market_type: MarketType::Game,
            game_date: date,
            event_group: String::new(),
            line: None,
            map_number: None,
            url: String::new(),
            price: None,
            raw: BTreeMap::new(),
        }
    }

    fn futures_market(venue: Venue, event_id: &str, team: &str, group: &str) -> Market {
        let mut m = make_market(venue, event_id, team, "", "nfl", None);
        m.market_type = MarketType::Futures;
        m.event_group = group.to_string();
        m
    }

    fn day(d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2026, 1, d)
    }

    #[test]
    fn matches_identical_games() {
        let a = [make_market(Venue::ExchangeA, "a1", "Detroit Lions", "Buffalo Bills", "nfl", day(5))];
        let b = [make_market(Venue::ExchangeB, "b1", "Detroit Lions", "Buffalo Bills", "nfl", day(5))];
        let events = match_events(&a, &b);
        assert_eq!(events.len(), 1);
        assert!(events[0].matched);
        assert!(!events[0].teams_swapped);
        assert_eq!(events[0].team_a, "Detroit Lions");
    }

    #[test]
    fn matches_across_naming_variants() {
        let a = [make_market(Venue::ExchangeA, "a1", "Man United FC", "Arsenal", "soccer", day(5))];
        let b = [make_market(Venue::ExchangeB, "b1", "Man United", "Arsenal FC", "soccer", day(5))];
        let events = match_events(&a, &b);
        assert!(events[0].matched);
    }

    #[test]
    fn swapped_alignment_sets_flag_for_two_outcome_sports() {
        let a = [make_market(Venue::ExchangeA, "a1", "Detroit Lions", "Buffalo Bills", "nfl", day(5))];
        let b = [make_market(Venue::ExchangeB, "b1", "Buffalo Bills", "Detroit Lions", "nfl", day(5))];
        let events = match_events(&a, &b);
        assert!(events[0].matched);
        assert!(events[0].teams_swapped);
        // Naming still follows venue-A
        assert_eq!(events[0].team_a, "Detroit Lions");
    }

    #[test]
    fn swapped_alignment_never_matches_draw_sports() {
        let a = [make_market(Venue::ExchangeA, "a1", "Arsenal", "Chelsea", "soccer", day(5))];
        let b = [make_market(Venue::ExchangeB, "b1", "Chelsea", "Arsenal", "soccer", day(5))];
        let events = match_events(&a, &b);
        let matched: Vec<_> = events.iter().filter(|e| e.matched).collect();
        assert!(matched.is_empty());
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn date_tolerance_is_one_day_for_team_sports() {
        let a = [make_market(Venue::ExchangeA, "a1", "Detroit Lions", "Buffalo Bills", "nfl", day(5))];
        let b_near = [make_market(Venue::ExchangeB, "b1", "Detroit Lions", "Buffalo Bills", "nfl", day(6))];
        let b_far = [make_market(Venue::ExchangeB, "b1", "Detroit Lions", "Buffalo Bills", "nfl", day(7))];
        assert!(match_events(&a, &b_near)[0].matched);
        assert!(!match_events(&a, &b_far).iter().any(|e| e.matched));
    }

    #[test]
    fn date_tolerance_widens_for_individual_sports() {
        let a = [make_market(Venue::ExchangeA, "a1", "Carlos Alcaraz", "Jannik Sinner", "tennis", day(5))];
        let b = [make_market(Venue::ExchangeB, "b1", "Carlos Alcaraz", "Jannik Sinner", "tennis", day(7))];
        assert!(match_events(&a, &b)[0].matched);
    }

    #[test]
    fn games_without_dates_never_match() {
        let a = [make_market(Venue::ExchangeA, "a1", "Detroit Lions", "Buffalo Bills", "nfl", None)];
        let b = [make_market(Venue::ExchangeB, "b1", "Detroit Lions", "Buffalo Bills", "nfl", day(5))];
        assert!(!match_events(&a, &b).iter().any(|e| e.matched));
    }

    #[test]
    fn line_and_map_number_must_agree() {
        let mut a = make_market(Venue::ExchangeA, "a1", "Detroit Lions", "Buffalo Bills", "nfl", day(5));
        let mut b = make_market(Venue::ExchangeB, "b1", "Detroit Lions", "Buffalo Bills", "nfl", day(5));
        a.line = Some(-3.5);
        b.line = Some(-2.5);
        assert!(!match_events(&[a.clone()], &[b.clone()]).iter().any(|e| e.matched));

        b.line = Some(-3.5);
        assert!(match_events(&[a.clone()], &[b.clone()])[0].matched);

        a.map_number = Some(2);
        b.map_number = Some(3);
        assert!(!match_events(&[a], &[b]).iter().any(|e| e.matched));
    }

    #[test]
    fn futures_match_on_group_and_single_team() {
        let a = [futures_market(Venue::ExchangeA, "a1", "Kansas City Chiefs", "Super Bowl Champion")];
        let b = [futures_market(Venue::ExchangeB, "b1", "Kansas City", "KXNFLCHAMP-26")];
        let events = match_events(&a, &b);
        assert!(events[0].matched);
    }

    #[test]
    fn futures_board_keeps_one_market_per_contender() {
        // One venue event id for the whole championship board
        let a = [
            futures_market(Venue::ExchangeA, "a-superbowl", "Detroit Lions", "Super Bowl Champion"),
            futures_market(Venue::ExchangeA, "a-superbowl", "Buffalo Bills", "Super Bowl Champion"),
        ];
        let b = [
            futures_market(Venue::ExchangeB, "b1", "Detroit Lions", "KXNFLCHAMP-26"),
            futures_market(Venue::ExchangeB, "b2", "Buffalo Bills", "KXNFLCHAMP-26"),
        ];
        let events = match_events(&a, &b);
        let matched: Vec<_> = events.iter().filter(|e| e.matched).collect();
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn single_named_market_pairs_with_either_side() {
        let a = [make_market(Venue::ExchangeA, "a1", "Carlos Alcaraz", "Jannik Sinner", "tennis", day(5))];
        let b = [make_market(Venue::ExchangeB, "b1", "Jannik Sinner", "", "tennis", day(5))];
        let events = match_events(&a, &b);
        assert!(events[0].matched);
    }

    #[test]
    fn single_named_market_pairs_on_declared_yes_team() {
        let a = [futures_market(Venue::ExchangeA, "a1", "Detroit Lions", "Super Bowl Champion")];
        let mut contender = futures_market(Venue::ExchangeB, "b1", "AFC Title Market", "KXNFLCHAMP-26");
        contender.raw.insert(
            "yes_team".to_string(),
            serde_json::Value::String("Detroit Lions".to_string()),
        );
        let events = match_events(&a, &[contender]);
        assert!(events[0].matched);
    }

    #[test]
    fn futures_reject_group_stage_against_winner() {
        let mut a = futures_market(Venue::ExchangeA, "a1", "Brazil", "World Cup Winner");
        let mut b = futures_market(Venue::ExchangeB, "b1", "Brazil", "World Cup Group L");
        a.sport = "soccer".to_string();
        b.sport = "soccer".to_string();
        assert!(!match_events(&[a], &[b]).iter().any(|e| e.matched));
    }

    #[test]
    fn single_team_bar_is_strict() {
        let a = [futures_market(Venue::ExchangeA, "a1", "Kansas", "Super Bowl Champion")];
        let b = [futures_market(Venue::ExchangeB, "b1", "Kansas City", "KXNFLCHAMP-26")];
        assert!(!match_events(&a, &b).iter().any(|e| e.matched));
    }

    #[test]
    fn different_sports_never_match() {
        let a = [make_market(Venue::ExchangeA, "a1", "New York", "Boston", "nba", day(5))];
        let b = [make_market(Venue::ExchangeB, "b1", "New York", "Boston", "nhl", day(5))];
        assert!(!match_events(&a, &b).iter().any(|e| e.matched));
    }

    #[test]
    fn unmatched_markets_pass_through_per_venue() {
        let a = [make_market(Venue::ExchangeA, "a1", "Detroit Lions", "Buffalo Bills", "nfl", day(5))];
        let b = [make_market(Venue::ExchangeB, "b1", "Dallas Cowboys", "Philadelphia Eagles", "nfl", day(5))];
        let events = match_events(&a, &b);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| !e.matched));
        assert!(events.iter().any(|e| e.market_a.is_some() && e.market_b.is_none()));
        assert!(events.iter().any(|e| e.market_b.is_some() && e.market_a.is_none()));
    }

    #[test]
    fn duplicate_event_ids_are_collapsed_per_venue() {
        let a = [
            make_market(Venue::ExchangeA, "a1", "Detroit Lions", "Buffalo Bills", "nfl", day(5)),
            make_market(Venue::ExchangeA, "a1", "Detroit Lions", "Buffalo Bills", "nfl", day(5)),
        ];
        let b = [make_market(Venue::ExchangeB, "b1", "Detroit Lions", "Buffalo Bills", "nfl", day(5))];
        let events = match_events(&a, &b);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn best_candidate_wins_over_first_seen() {
        let a = [make_market(Venue::ExchangeA, "a1", "New York Giants", "Dallas Cowboys", "nfl", day(5))];
        let b = [
            make_market(Venue::ExchangeB, "b1", "New York Gaints", "Dallas Cowboys", "nfl", day(5)),
            make_market(Venue::ExchangeB, "b2", "New York Giants", "Dallas Cowboys", "nfl", day(5)),
        ];
        let events = match_events(&a, &b);
        let matched = events.iter().find(|e| e.matched).unwrap();
        assert_eq!(
            matched.market_b.as_ref().unwrap().event_id,
            "b2"
        );
    }
}
