//! Colour → traffic level lookup.
//!
//! The feed encodes the traffic level of a road section as a hex colour.  The
//! table below is closed: anything it does not list resolves to
//! [`UNKNOWN_LEVEL`].
//!
//! Only `00FF00` (C1) and `FF0000` (C3) are confirmed against live feed data.
//! The other eight entries are provisional and may not match the codes the
//! feed actually uses.

use serde::Serialize;

/// Traffic level attached to a feed colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorLevel {
    /// Short level code, e.g. `"C1"`.
    pub code: &'static str,
    /// Human readable title, e.g. `"Circulation normale"`.
    pub title: &'static str,
}

/// Level reported for colours missing from [`LEVELS`].
pub const UNKNOWN_LEVEL: ColorLevel = ColorLevel {
    code: "??",
    title: "Inconnu",
};

/// Upper-case hex colour → level.
const LEVELS: [(&str, ColorLevel); 10] = [
    ("00FF00", ColorLevel { code: "C1", title: "Circulation normale" }),
    ("FFFF00", ColorLevel { code: "C2", title: "Circulation délicate" }),
    ("FF0000", ColorLevel { code: "C3", title: "Circulation difficile" }),
    ("000000", ColorLevel { code: "C4", title: "Circulation impossible" }),
    ("FF8000", ColorLevel { code: "E1", title: "Équipements conseillés" }),
    ("FF00FF", ColorLevel { code: "E2", title: "Équipements obligatoires" }),
    ("00FFFF", ColorLevel { code: "V1", title: "Risque de verglas" }),
    ("0000FF", ColorLevel { code: "F1", title: "Route fermée" }),
    ("808080", ColorLevel { code: "F2", title: "Fermeture hivernale" }),
    ("800080", ColorLevel { code: "P1", title: "Interdit aux poids lourds" }),
];

/// Resolve a feed colour to its [`ColorLevel`].
///
/// The lookup is case-insensitive and ignores a leading `#`.  `None` and
/// unlisted colours resolve to [`UNKNOWN_LEVEL`].
pub fn level_for_color(color: Option<&str>) -> ColorLevel {
    let Some(color) = color else {
        return UNKNOWN_LEVEL;
    };
    let normalized = color.trim().trim_start_matches('#').to_ascii_uppercase();
    LEVELS
        .iter()
        .find(|(hex, _)| *hex == normalized)
        .map(|(_, level)| *level)
        .unwrap_or(UNKNOWN_LEVEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let expected = ColorLevel {
            code: "C1",
            title: "Circulation normale",
        };
        assert_eq!(level_for_color(Some("00ff00")), expected);
        assert_eq!(level_for_color(Some("00FF00")), expected);
        assert_eq!(level_for_color(Some("#00Ff00")), expected);
    }

    #[test]
    fn red_is_difficult() {
        assert_eq!(level_for_color(Some("FF0000")).title, "Circulation difficile");
    }

    #[test]
    fn unknown_colours_use_sentinel() {
        assert_eq!(level_for_color(Some("123456")), UNKNOWN_LEVEL);
        assert_eq!(level_for_color(Some("")), UNKNOWN_LEVEL);
        assert_eq!(level_for_color(None), UNKNOWN_LEVEL);
    }

    #[test]
    fn table_has_no_duplicate_colours() {
        for (i, (a, _)) in LEVELS.iter().enumerate() {
            assert!(LEVELS[i + 1..].iter().all(|(b, _)| a != b), "duplicate {a}");
            assert_eq!(*a, a.to_ascii_uppercase());
        }
    }
}
