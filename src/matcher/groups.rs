//! Tournament/award event-group canonicalization for futures matching.
//!
//! Each venue labels the same tournament differently ("Super Bowl Champion"
//! vs a `KXNFLCHAMP` series ticker). Raw group strings are collapsed to a
//! canonical key via substring aliases, longest alias first so the most
//! specific label wins.

use std::sync::OnceLock;

/// canonical key -> substrings seen in venue event titles / series tickers.
const EVENT_GROUP_ALIASES: &[(&str, &[&str])] = &[
    // NFL
    ("nfl_champ", &["pro football champion", "super bowl", "kxsuperbowl", "kxnflchamp"]),
    ("nfl_mvp", &["nfl mvp", "kxnflmvp"]),
    ("nfl_sb_mvp", &["super bowl mvp", "sb mvp", "kxnflsbmvp"]),
    ("nfl_droty", &["nfl defensive rookie", "kxnfldroty"]),
    // NBA
    ("nba_champ", &["nba finals", "nba champion", "kxnbachamp"]),
    ("nba_east", &["nba eastern", "kxnbaeast"]),
    ("nba_west", &["nba western", "kxnbawest"]),
    ("nba_mvp", &["nba mvp", "kxnbamvp"]),
    ("nba_finals_mvp", &["nba finals mvp", "kxnbafinmvp"]),
    ("nba_droty", &["nba rookie", "kxnbadroty"]),
    ("nba_dpoy", &["nba defensive player", "kxnbadpoy"]),
    // MLB
    ("mlb_ws", &["world series", "kxmlbws"]),
    ("mlb_al", &["al champion", "kxmlbalchamp"]),
    ("mlb_nl", &["nl champion", "kxmlbnlchamp"]),
    ("mlb_mvp", &["mlb mvp", "kxmlbmvp"]),
    // NHL
    ("nhl_champ", &["stanley cup", "nhl champion", "kxnhlchamp"]),
    ("nhl_finals", &["nhl finals", "kxnhlfinalsexact"]),
    // Soccer
    ("ucl_champ", &["champions league", "kxuclchamp"]),
    ("epl_champ", &["premier league", "epl", "kxeplchamp"]),
    ("epl_top4", &["epl top 4", "premier league top 4", "kxepltop4"]),
    ("laliga_champ", &["la liga", "kxlaligachamp"]),
    ("bundesliga_champ", &["bundesliga", "kxbundesligachamp"]),
    ("seriea_champ", &["serie a", "kxserieachamp"]),
    ("ligue1_champ", &["ligue 1", "kxligue1champ"]),
    ("world_cup", &["fifa world cup", "world cup", "kxmenworldcup"]),
    ("fa_cup", &["fa cup", "kxfacup"]),
    ("carabao", &["carabao cup", "league cup", "efl cup", "kxcarabaocup"]),
    ("europa", &["europa league", "kxeuropaleague"]),
    ("conference", &["conference league", "kxconferenceleague"]),
    ("copa_america", &["copa america", "kxcopaamerica"]),
    ("gold_cup", &["gold cup", "kxgoldcup"]),
    ("mls_champ", &["mls cup", "kxmlscup"]),
    ("liga_mx", &["liga mx", "kxligamx"]),
    // College
    ("ncaafb_champ", &["college football", "cfp", "kxncaafbchamp", "kxncaaf"]),
    ("ncaamb_champ", &["march madness", "ncaa basketball", "kxncaambchamp"]),
    ("heisman", &["heisman", "kxheisman"]),
    // Tennis
    ("french_open", &["french open", "roland garros", "kxfopenmensingle"]),
    ("wimbledon", &["wimbledon", "kxwimbledonmensingle"]),
    ("aus_open", &["australian open", "kxausopenmensingle"]),
    ("us_open_tennis", &["us open", "kxusopenmensingle"]),
    // MMA
    ("ufc_champ", &["ufc", "kxufcchamp"]),
];

fn group_lookup() -> &'static [(&'static str, &'static str)] {
    static LOOKUP: OnceLock<Vec<(&'static str, &'static str)>> = OnceLock::new();
    LOOKUP.get_or_init(|| {
        let mut pairs: Vec<(&str, &str)> = EVENT_GROUP_ALIASES
            .iter()
            .flat_map(|(canonical, aliases)| aliases.iter().map(move |a| (*a, *canonical)))
            .collect();
        // Longer aliases first so "super bowl mvp" beats "super bowl"
        pairs.sort_by_key(|(alias, _)| std::cmp::Reverse(alias.len()));
        pairs
    })
}

/// Map a raw event-group string to its canonical key. Unrecognized strings
/// pass through lowercased so identical raw labels still compare equal.
pub fn canonicalize_event_group(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let lower = raw.to_lowercase();
    for (alias, canonical) in group_lookup() {
        if lower.contains(alias) {
            return (*canonical).to_string();
        }
    }
    lower
}

fn has_word(text: &str, words: &[&str]) -> bool {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|tok| words.contains(&tok))
}

/// "Group L" style sub-stage markets.
pub fn is_group_stage(text: &str) -> bool {
    has_word(text, &["group"])
}

/// Outright tournament-winner markets.
pub fn is_tournament_winner(text: &str) -> bool {
    has_word(text, &["winner", "champion", "champ"])
}

/// Whether two raw futures group labels refer to the same tournament/award.
/// A sub-stage market never pairs with an outright-winner market even when
/// both canonicalize to the same tournament.
pub fn groups_compatible(raw_a: &str, raw_b: &str) -> bool {
    if (is_group_stage(raw_a) && is_tournament_winner(raw_b))
        || (is_tournament_winner(raw_a) && is_group_stage(raw_b))
    {
        return false;
    }
    let ca = canonicalize_event_group(raw_a);
    let cb = canonicalize_event_group(raw_b);
    if !ca.is_empty() && !cb.is_empty() {
        return ca == cb;
    }
    // Best effort when either side lacks a group label
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_both_venue_labels() {
        assert_eq!(canonicalize_event_group("Super Bowl Champion 2026"), "nfl_champ");
        assert_eq!(canonicalize_event_group("KXNFLCHAMP-26"), "nfl_champ");
        assert_eq!(canonicalize_event_group("Stanley Cup Winner"), "nhl_champ");
    }

    #[test]
    fn longest_alias_wins() {
        // "Super Bowl MVP" contains "super bowl" too; the longer alias
        // must take precedence.
        assert_eq!(canonicalize_event_group("Super Bowl MVP"), "nfl_sb_mvp");
        assert_eq!(canonicalize_event_group("NBA Finals MVP 2026"), "nba_finals_mvp");
    }

    #[test]
    fn unknown_groups_pass_through_lowercased() {
        assert_eq!(canonicalize_event_group("Eurovision 2026"), "eurovision 2026");
        assert_eq!(canonicalize_event_group(""), "");
    }

    #[test]
    fn group_stage_never_pairs_with_outright_winner() {
        assert!(!groups_compatible("World Cup Group L", "World Cup Winner"));
        assert!(!groups_compatible("FIFA World Cup Champion", "World Cup Group A"));
    }

    #[test]
    fn same_canonical_group_is_compatible() {
        assert!(groups_compatible("FIFA World Cup", "KXMENWORLDCUP"));
        assert!(!groups_compatible("Stanley Cup", "World Series"));
    }

    #[test]
    fn missing_group_is_best_effort_compatible() {
        assert!(groups_compatible("", "World Series"));
    }

    #[test]
    fn stage_detection_is_word_bounded() {
        assert!(is_group_stage("World Cup Group L"));
        assert!(!is_group_stage("Newsgroup Cup"));
        assert!(is_tournament_winner("EPL Champion"));
        assert!(!is_tournament_winner("Champagne Derby"));
    }
}
