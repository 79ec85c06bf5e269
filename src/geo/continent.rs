//! Continent zones and continent-level sanity checks.
//!
//! Visually similar places on different continents ("confusers") are the main
//! source of wildly wrong answers. The zone table is coarse on purpose: it only
//! needs to tell Lisbon from Rio, not to draw borders. Zones are tested in table
//! order and the first containing box wins, so overlaps resolve toward the
//! earlier entry (Istanbul is Europe, Cairo is Africa, Riyadh is Asia).

use crate::catalog::Match;
use crate::geo::haversine_m;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Continent {
    Europe,
    Asia,
    NorthAmerica,
    SouthAmerica,
    Africa,
    Oceania,
}

impl Continent {
    pub const ALL: [Continent; 6] = [
        Continent::Europe,
        Continent::Asia,
        Continent::NorthAmerica,
        Continent::SouthAmerica,
        Continent::Africa,
        Continent::Oceania,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Continent::Europe => "Europe",
            Continent::Asia => "Asia",
            Continent::NorthAmerica => "North America",
            Continent::SouthAmerica => "South America",
            Continent::Africa => "Africa",
            Continent::Oceania => "Oceania",
        }
    }

    pub fn zone(self) -> &'static ContinentZone {
        &CONTINENT_ZONES[self as usize]
    }
}

impl std::fmt::Display for Continent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Bounding box, center and plausible radius of one continent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContinentZone {
    pub continent: Continent,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    pub center_lat: f64,
    pub center_lon: f64,
    /// Farthest plausible distance from the center; a sanity bound, not a filter.
    pub max_radius_m: f64,
}

impl ContinentZone {
    #[inline]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    /// True when `(lat, lon)` lies within `max_radius_m` of the zone center.
    pub fn is_plausible(&self, lat: f64, lon: f64) -> bool {
        haversine_m(self.center_lat, self.center_lon, lat, lon) <= self.max_radius_m
    }
}

/// Indexed by `Continent as usize`.
pub const CONTINENT_ZONES: [ContinentZone; 6] = [
    ContinentZone {
        continent: Continent::Europe,
        min_lat: 35.0,
        max_lat: 71.5,
        min_lon: -25.0,
        max_lon: 45.0,
        center_lat: 50.0,
        center_lon: 15.0,
        max_radius_m: 3_500_000.0,
    },
    ContinentZone {
        continent: Continent::Asia,
        min_lat: -11.0,
        max_lat: 82.0,
        min_lon: 40.0,
        max_lon: 180.0,
        center_lat: 34.0,
        center_lon: 100.0,
        max_radius_m: 6_500_000.0,
    },
    ContinentZone {
        continent: Continent::NorthAmerica,
        min_lat: 7.0,
        max_lat: 84.0,
        min_lon: -170.0,
        max_lon: -52.0,
        center_lat: 45.0,
        center_lon: -100.0,
        max_radius_m: 5_000_000.0,
    },
    ContinentZone {
        continent: Continent::SouthAmerica,
        min_lat: -56.0,
        max_lat: 13.0,
        min_lon: -82.0,
        max_lon: -34.0,
        center_lat: -15.0,
        center_lon: -60.0,
        max_radius_m: 4_500_000.0,
    },
    ContinentZone {
        continent: Continent::Africa,
        min_lat: -35.0,
        max_lat: 37.5,
        min_lon: -18.0,
        max_lon: 52.0,
        center_lat: 2.0,
        center_lon: 20.0,
        max_radius_m: 5_000_000.0,
    },
    ContinentZone {
        continent: Continent::Oceania,
        min_lat: -50.0,
        max_lat: 0.0,
        min_lon: 110.0,
        max_lon: 180.0,
        center_lat: -25.0,
        center_lon: 140.0,
        max_radius_m: 4_500_000.0,
    },
];

/// First zone whose box contains the point; `None` for open ocean and bad input.
pub fn detect_continent(lat: f64, lon: f64) -> Option<Continent> {
    if !(lat.is_finite() && lon.is_finite()) {
        return None;
    }
    CONTINENT_ZONES
        .iter()
        .find(|zone| zone.contains(lat, lon))
        .map(|zone| zone.continent)
}

/// Continent with the largest summed similarity among `matches`.
///
/// Equal totals resolve toward the earlier zone in the table. `None` when no
/// match falls inside any zone.
pub fn get_dominant_continent(matches: &[Match]) -> Option<Continent> {
    let mut totals = [0.0f64; 6];
    let mut seen = [false; 6];
    for m in matches {
        if let Some(continent) = detect_continent(m.lat, m.lon) {
            totals[continent as usize] += m.similarity;
            seen[continent as usize] = true;
        }
    }

    let mut best: Option<(Continent, f64)> = None;
    for continent in Continent::ALL {
        let idx = continent as usize;
        if !seen[idx] {
            continue;
        }
        match best {
            Some((_, total)) if totals[idx] <= total => {}
            _ => best = Some((continent, totals[idx])),
        }
    }
    best.map(|(continent, _)| continent)
}

/// Penalty for a cluster whose members span several continents.
///
/// `{1 → 0.0, 2 → 0.1, 3 → 0.25, ≥4 → 0.4}`; members outside every zone are ignored.
pub fn calculate_geographic_spread_penalty(matches: &[Match]) -> f64 {
    let mut present = [false; 6];
    for m in matches {
        if let Some(continent) = detect_continent(m.lat, m.lon) {
            present[continent as usize] = true;
        }
    }
    match present.iter().filter(|&&p| p).count() {
        0 | 1 => 0.0,
        2 => 0.1,
        3 => 0.25,
        _ => 0.4,
    }
}

/// Outcome of checking a predicted point against the continents of its evidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinentValidation {
    pub is_valid: bool,
    /// Confidence cap implied by the check: 0.2 invalid, 0.85 valid, 0.5 neutral.
    pub confidence: f64,
    pub reason: Option<String>,
    pub predicted: Option<Continent>,
    pub dominant: Option<Continent>,
}

const INVALID_CONFIDENCE: f64 = 0.2;
const VALID_CONFIDENCE: f64 = 0.85;
const NEUTRAL_CONFIDENCE: f64 = 0.5;
const CONSISTENCY_TOP_N: usize = 5;

/// Check that the predicted point sits on a continent the evidence supports.
///
/// If either side cannot be resolved to a continent the result is valid with
/// neutral confidence. A predicted continent that differs from the dominant one
/// is still accepted when any of the top five matches shares it.
pub fn validate_continent_consistency(
    predicted_lat: f64,
    predicted_lon: f64,
    reference_matches: &[Match],
) -> ContinentValidation {
    let predicted = detect_continent(predicted_lat, predicted_lon);
    let dominant = get_dominant_continent(reference_matches);

    let (Some(pred), Some(dom)) = (predicted, dominant) else {
        return ContinentValidation {
            is_valid: true,
            confidence: NEUTRAL_CONFIDENCE,
            reason: None,
            predicted,
            dominant,
        };
    };

    if pred != dom {
        let supported = reference_matches
            .iter()
            .take(CONSISTENCY_TOP_N)
            .any(|m| detect_continent(m.lat, m.lon) == Some(pred));
        if !supported {
            return ContinentValidation {
                is_valid: false,
                confidence: INVALID_CONFIDENCE,
                reason: Some(format!(
                    "predicted location is in {pred} but the reference matches point to {dom}, \
                     and none of the top {CONSISTENCY_TOP_N} matches are in {pred}"
                )),
                predicted,
                dominant,
            };
        }
    }

    ContinentValidation {
        is_valid: true,
        confidence: VALID_CONFIDENCE,
        reason: None,
        predicted,
        dominant,
    }
}

/// Keep only the matches on the dominant continent, without starving clustering.
///
/// When filtering would leave fewer than three matches out of an input of three
/// or more, the unfiltered list is returned instead. Order is preserved.
pub fn filter_to_dominant_continent(matches: &[Match]) -> Vec<Match> {
    let Some(dominant) = get_dominant_continent(matches) else {
        return matches.to_vec();
    };
    let filtered: Vec<Match> = matches
        .iter()
        .filter(|m| detect_continent(m.lat, m.lon) == Some(dominant))
        .cloned()
        .collect();

    if filtered.len() < 3 && matches.len() >= 3 {
        tracing::debug!(
            %dominant,
            kept = filtered.len(),
            total = matches.len(),
            "dominant-continent filter would starve clustering; using unfiltered matches"
        );
        return matches.to_vec();
    }
    tracing::debug!(%dominant, kept = filtered.len(), total = matches.len(), "dominant-continent filter");
    filtered
}
