//! Team-name normalization and fuzzy scoring.
//!
//! Venues render the same team differently ("Man United FC" vs "Manchester
//! Utd", "UNC Tar Heels" vs "North Carolina"). Both sides are normalized to a
//! canonical lowercase form before token-sort fuzzy comparison.

/// Sports with a draw outcome. Swapped-side alignment cannot be priced once a
/// draw exists, so these never participate in cross-team matching.
pub const THREE_OUTCOME_SPORTS: &[&str] = &["soccer", "rugby", "cricket"];

/// Individually-scheduled sports where tournament dates and match-day dates
/// diverge; the matcher widens its date tolerance for these.
pub const INDIVIDUAL_SPORTS: &[&str] = &["tennis", "table_tennis", "mma", "boxing", "golf"];

pub fn is_three_outcome_sport(sport: &str) -> bool {
    THREE_OUTCOME_SPORTS.contains(&sport)
}

pub fn is_individual_sport(sport: &str) -> bool {
    INDIVIDUAL_SPORTS.contains(&sport)
}

/// Sports whose team names follow club-naming conventions ("FC", "United",
/// "City"); the word affixes below are only stripped for these.
const CLUB_NAME_SPORTS: &[&str] = &["soccer", "rugby", "cricket"];

/// Abbreviation affixes stripped at the edges of a name for every sport.
const CLUB_AFFIXES: &[&str] = &["fc", "sc", "cf", "ac", "afc", "cfc"];

/// Word affixes stripped only for club-naming sports, and only at the edges.
/// Stripping them mid-string would damage names like "West Ham United" vs
/// "Leeds United"; stripping them for US sports would damage "Kansas City".
const CLUB_WORD_AFFIXES: &[&str] = &["united", "utd", "city", "town", "county", "wanderers"];

/// Esports roster names often carry the game title as a suffix.
const ESPORTS_SUFFIXES: &[&str] = &[
    "cs2", "csgo", "cs", "dota", "dota2", "lol", "valorant", "rl", "ow",
];

/// Trailing mascot tokens stripped from NCAA (and pro) team names so that
/// "North Carolina Tar Heels" and "North Carolina" compare equal.
const MASCOT_TOKENS: &[&str] = &[
    "aggies",
    "badgers",
    "bearcats",
    "beavers",
    "bills",
    "blazers",
    "boilermakers",
    "broncos",
    "bruins",
    "buckeyes",
    "bulldogs",
    "bulls",
    "cardinals",
    "cavaliers",
    "celtics",
    "chiefs",
    "commodores",
    "commanders",
    "cornhuskers",
    "cougars",
    "cubs",
    "cowboys",
    "crimson",
    "cyclones",
    "deacons",
    "devils",
    "dolphins",
    "ducks",
    "eagles",
    "frogs",
    "gamecocks",
    "gators",
    "giants",
    "gophers",
    "hawkeyes",
    "heels",
    "hoosiers",
    "horned",
    "hokies",
    "hurricanes",
    "huskies",
    "irish",
    "jackets",
    "jayhawks",
    "knights",
    "kraken",
    "lakers",
    "lions",
    "longhorns",
    "mariners",
    "mountaineers",
    "musketeers",
    "nittany",
    "orange",
    "packers",
    "panthers",
    "pistons",
    "raiders",
    "razorbacks",
    "rebels",
    "seahawks",
    "seminoles",
    "sooners",
    "spartans",
    "tar",
    "terrapins",
    "tide",
    "tigers",
    "trojans",
    "utes",
    "volunteers",
    "wildcats",
    "wizards",
    "wolverines",
];

/// Sport-scoped city -> franchise aliases for cities hosting several teams.
/// Keys are the fully normalized bare-city form; values are the canonical
/// franchise string both sides collapse to.
const CITY_ALIASES: &[(&str, &str, &str)] = &[
    ("nfl", "seattle", "seattle seahawks"),
    ("mlb", "seattle", "seattle mariners"),
    ("nhl", "seattle", "seattle kraken"),
    ("nfl", "new york", "new york giants"),
    ("nba", "los angeles", "los angeles lakers"),
    ("nba", "la", "los angeles lakers"),
    ("nfl", "washington", "washington commanders"),
    ("nba", "washington", "washington wizards"),
    ("mlb", "chicago", "chicago cubs"),
];

fn transliterate(c: char) -> Option<char> {
    let out = match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        'ß' => 's',
        'ý' | 'ÿ' => 'y',
        _ => return None,
    };
    Some(out)
}

fn city_alias(sport: &str, name: &str) -> Option<&'static str> {
    CITY_ALIASES
        .iter()
        .find(|(s, city, _)| *s == sport && *city == name)
        .map(|(_, _, franchise)| *franchise)
}

fn is_edge_affix(token: &str, club_words: bool) -> bool {
    CLUB_AFFIXES.contains(&token) || (club_words && CLUB_WORD_AFFIXES.contains(&token))
}

/// Edge affixes, repeatedly: "manchester united fc" -> "manchester".
fn strip_edge_affixes(tokens: &mut Vec<&str>, club_words: bool) {
    loop {
        let mut changed = false;
        if let Some(&first) = tokens.first() {
            if is_edge_affix(first, club_words) && tokens.len() > 1 {
                tokens.remove(0);
                changed = true;
            }
        }
        if let Some(&last) = tokens.last() {
            if is_edge_affix(last, club_words) && tokens.len() > 1 {
                tokens.pop();
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

/// Normalize a team name for cross-venue comparison.
///
/// Pipeline: case-fold -> transliterate diacritics -> strip punctuation ->
/// drop esports title suffix -> strip club affixes at the edges -> strip
/// trailing mascot tokens -> strip affixes the mascot was shielding ->
/// sport-scoped city alias.
pub fn normalize_team_name(name: &str, sport: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if let Some(t) = transliterate(c) {
            cleaned.push(t);
        } else if c.is_ascii_alphanumeric() {
            cleaned.push(c);
        } else if c.is_whitespace() || c == '-' || c == '.' || c == '\'' {
            cleaned.push(' ');
        }
    }

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();

    if let Some(last) = tokens.last() {
        if ESPORTS_SUFFIXES.contains(last) && tokens.len() > 1 {
            tokens.pop();
        }
    }

    let club_words = CLUB_NAME_SPORTS.contains(&sport);
    strip_edge_affixes(&mut tokens, club_words);

    while tokens.len() > 1 {
        let last = tokens[tokens.len() - 1];
        if MASCOT_TOKENS.contains(&last) {
            tokens.pop();
        } else {
            break;
        }
    }

    // A trailing mascot can shield an affix ("Norwich City Canaries").
    strip_edge_affixes(&mut tokens, club_words);

    let joined = tokens.join(" ");
    match city_alias(sport, &joined) {
        Some(franchise) => franchise.to_string(),
        None => joined,
    }
}

/// Token-sort similarity in [0, 100]: sort whitespace tokens alphabetically,
/// rejoin, and compare with normalized edit distance. Word order differences
/// ("Lions Detroit" vs "Detroit Lions") score 100.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let sort_join = |s: &str| {
        let mut tokens: Vec<&str> = s.split_whitespace().collect();
        tokens.sort_unstable();
        tokens.join(" ")
    };
    let (sa, sb) = (sort_join(a), sort_join(b));
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&sa, &sb) * 100.0
}

/// Similarity score between two raw team names (0-100) after normalization.
pub fn team_similarity(a: &str, b: &str, sport: &str) -> f64 {
    let na = normalize_team_name(a, sport);
    let nb = normalize_team_name(b, sport);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return 100.0;
    }
    token_sort_ratio(&na, &nb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_club_affixes_at_edges_only() {
        assert_eq!(normalize_team_name("Manchester United FC", "soccer"), "manchester");
        assert_eq!(normalize_team_name("FC Barcelona", "soccer"), "barcelona");
        // Mid-string affix tokens survive
        assert_eq!(
            normalize_team_name("West Ham United Rovers", "soccer"),
            "west ham united rovers"
        );
    }

    #[test]
    fn club_word_affixes_are_scoped_to_club_sports() {
        // "City" is part of the name in US sports, an affix in soccer
        assert_eq!(normalize_team_name("Kansas City", "nfl"), "kansas city");
        assert_eq!(normalize_team_name("Kansas City Chiefs", "nfl"), "kansas city");
        assert_eq!(normalize_team_name("Manchester City", "soccer"), "manchester");
    }

    #[test]
    fn bare_state_does_not_collapse_onto_a_city() {
        assert!(team_similarity("Kansas", "Kansas City", "nfl") < 93.0);
        assert_eq!(team_similarity("Kansas City Chiefs", "Kansas City", "nfl"), 100.0);
    }

    #[test]
    fn strips_trailing_mascots() {
        assert_eq!(
            normalize_team_name("North Carolina Tar Heels", "ncaamb"),
            "north carolina"
        );
        assert_eq!(normalize_team_name("Michigan Wolverines", "ncaaf"), "michigan");
        assert_eq!(normalize_team_name("Alabama Crimson Tide", "ncaaf"), "alabama");
    }

    #[test]
    fn mascot_strip_never_empties_the_name() {
        assert_eq!(normalize_team_name("Wolverines", "ncaaf"), "wolverines");
    }

    #[test]
    fn city_alias_is_sport_scoped() {
        assert_eq!(normalize_team_name("Seattle", "nfl"), "seattle seahawks");
        assert_eq!(normalize_team_name("Seattle", "mlb"), "seattle mariners");
        assert_eq!(normalize_team_name("Seattle", "nhl"), "seattle kraken");
        // Full franchise names collapse to the same canonical form
        assert_eq!(normalize_team_name("Seattle Mariners", "mlb"), "seattle mariners");
    }

    #[test]
    fn transliterates_diacritics() {
        assert_eq!(normalize_team_name("Atlético Madrid", "soccer"), "atletico madrid");
        assert_eq!(normalize_team_name("São Paulo", "soccer"), "sao paulo");
    }

    #[test]
    fn strips_esports_suffix() {
        assert_eq!(normalize_team_name("Team Liquid CS2", "esports"), "team liquid");
        assert_eq!(normalize_team_name("Fnatic LoL", "esports"), "fnatic");
    }

    #[test]
    fn token_sort_handles_word_order() {
        assert_eq!(token_sort_ratio("detroit lions", "lions detroit"), 100.0);
        assert!(token_sort_ratio("detroit", "denver") < 75.0);
    }

    #[test]
    fn similarity_exact_after_normalization_is_100() {
        assert_eq!(
            team_similarity("Manchester United", "Manchester United FC", "soccer"),
            100.0
        );
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = team_similarity("Borussia Dortmund", "Borusia Dortmund", "soccer");
        let b = team_similarity("Borusia Dortmund", "Borussia Dortmund", "soccer");
        assert_eq!(a, b);
        assert!(a > 75.0);
    }

    #[test]
    fn sport_sets() {
        assert!(is_three_outcome_sport("soccer"));
        assert!(!is_three_outcome_sport("nba"));
        assert!(is_individual_sport("tennis"));
        assert!(!is_individual_sport("nfl"));
    }
}
