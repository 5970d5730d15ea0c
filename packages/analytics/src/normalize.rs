//! Street name normalization.
//!
//! Property addresses (`"1234 MARKET ST"`) and crime block descriptions
//! (`"1200 BLOCK MARKET ST"`) name the same street in different shapes.
//! [`normalize_street`] reduces both to the street name so the two
//! datasets can be joined; [`street_key`] is the case-insensitive form
//! used as the join key.

use std::sync::LazyLock;

use regex::Regex;

/// A leading house/block number token (digits and hyphens, at least one
/// digit), an optional `BLOCK` marker, then the street name.
static LEADING_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9-]*[0-9][0-9-]*\s+(?:BLOCK\s+)?(\S.*)$").expect("valid regex")
});

/// Returns the canonical street name for a property address or crime
/// block description.
///
/// Strips leading number tokens, each with the `BLOCK` marker that may
/// follow it, until the first token is no longer a number. Whitespace is
/// trimmed and collapsed; case is kept for display. Input without a
/// recognizable leading number comes back as-is, so this never fails and
/// normalizing a normalized name returns it unchanged:
///
/// - `"1234 Market St"` → `"Market St"`
/// - `"1200 BLOCK MARKET ST"` → `"MARKET ST"`
/// - `"MARKET ST"` → `"MARKET ST"`
/// - `"5TH ST"` → `"5TH ST"` (an ordinal is not a house number)
/// - `"12 34 MAIN ST"` → `"MAIN ST"`
#[must_use]
pub fn normalize_street(address: &str) -> String {
    let collapsed = address.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut rest = collapsed.as_str();
    while let Some(m) = LEADING_NUMBER_RE.captures(rest).and_then(|caps| caps.get(1)) {
        rest = m.as_str();
    }
    rest.to_string()
}

/// Case-insensitive join key for an address or block description.
#[must_use]
pub fn street_key(address: &str) -> String {
    normalize_street(address).to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_house_number() {
        assert_eq!(normalize_street("1234 MARKET ST"), "MARKET ST");
    }

    #[test]
    fn strips_block_marker() {
        assert_eq!(normalize_street("1200 BLOCK MARKET ST"), "MARKET ST");
        assert_eq!(normalize_street("1200 block Market St"), "Market St");
    }

    #[test]
    fn keeps_case_for_display() {
        assert_eq!(normalize_street("4021 Spruce St"), "Spruce St");
    }

    #[test]
    fn hyphenated_number_is_stripped() {
        assert_eq!(normalize_street("1200-02 N BROAD ST"), "N BROAD ST");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize_street("  12   N   BROAD   ST "), "N BROAD ST");
    }

    #[test]
    fn missing_number_is_unchanged() {
        assert_eq!(normalize_street("MARKET ST"), "MARKET ST");
        assert_eq!(normalize_street("BLOCK MARKET ST"), "BLOCK MARKET ST");
    }

    #[test]
    fn ordinal_street_is_not_a_number() {
        assert_eq!(normalize_street("5TH ST"), "5TH ST");
        assert_eq!(normalize_street("300 5TH ST"), "5TH ST");
    }

    #[test]
    fn bare_number_is_unchanged() {
        assert_eq!(normalize_street("1234"), "1234");
        assert_eq!(normalize_street(""), "");
    }

    #[test]
    fn repeated_number_tokens_are_all_stripped() {
        assert_eq!(normalize_street("12 34 MAIN ST"), "MAIN ST");
        assert_eq!(normalize_street("1200 BLOCK 34 MAIN ST"), "MAIN ST");
        assert_eq!(normalize_street("1200 BLOCK 3400 BLOCK MAIN ST"), "MAIN ST");
        assert_eq!(normalize_street("12 34"), "34");
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in [
            "1234 MARKET ST",
            "1200 BLOCK S 52ND ST",
            "MARKET ST",
            "  77 w   Girard Ave",
            "4 BLOCK",
            "12 34 MAIN ST",
            "1200 BLOCK 34 MAIN ST",
            "7 8 9",
            "12 34",
            "",
        ] {
            let once = normalize_street(input);
            assert_eq!(normalize_street(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn property_and_block_share_a_key() {
        assert_eq!(street_key("1234 Market St"), street_key("1200 BLOCK MARKET ST"));
        assert_ne!(street_key("1234 MARKET ST"), street_key("1234 CHESTNUT ST"));
    }
}
