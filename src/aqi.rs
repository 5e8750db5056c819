//! Air Quality Index engine.
//!
//! Converts a pollutant concentration into an EPA-style AQI value and maps
//! an AQI value onto one of six severity tiers. Everything in here is pure:
//! no I/O, no state, and no error path. Inputs the tables do not cover
//! resolve to a defined value (see [`compute_aqi`]).

use serde::Serialize;

use crate::Pollutant;

// ---

/// One row of a piecewise-linear breakpoint table:
/// `(c_low, c_high, i_low, i_high)`.
type Breakpoint = (f64, f64, f64, f64);

/// EPA PM2.5 (24-hour, µg/m³) breakpoints.
const PM25_BREAKPOINTS: [Breakpoint; 6] = [
    (0.0, 12.0, 0.0, 50.0),
    (12.1, 35.4, 51.0, 100.0),
    (35.5, 55.4, 101.0, 150.0),
    (55.5, 150.4, 151.0, 200.0),
    (150.5, 250.4, 201.0, 300.0),
    (250.5, 500.4, 301.0, 500.0),
];

/// Compute the AQI for a single concentration.
///
/// Only [`Pollutant::Pm25`] has a breakpoint table; every other pollutant
/// yields `0.0`. Negative (sensor noise) and NaN concentrations also yield
/// `0.0`, as does any concentration outside every bucket. That includes
/// values above 500.4, which are *not* clamped to 500.
///
/// The result is rounded to two decimals.
pub fn compute_aqi(pollutant: Pollutant, concentration: f64) -> f64 {
    // ---
    if pollutant != Pollutant::Pm25 || concentration.is_nan() || concentration < 0.0 {
        return 0.0;
    }

    PM25_BREAKPOINTS
        .iter()
        .find(|(c_low, c_high, _, _)| *c_low <= concentration && concentration <= *c_high)
        .map(|&(c_low, c_high, i_low, i_high)| {
            round2((i_high - i_low) / (c_high - c_low) * (concentration - c_low) + i_low)
        })
        .unwrap_or(0.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Severity tier for an AQI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub const ALL: [AqiCategory; 6] = [
        AqiCategory::Good,
        AqiCategory::Moderate,
        AqiCategory::UnhealthyForSensitiveGroups,
        AqiCategory::Unhealthy,
        AqiCategory::VeryUnhealthy,
        AqiCategory::Hazardous,
    ];

    /// Human readable descriptor, as shown to users.
    pub fn descriptor(self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            AqiCategory::Good => "Green",
            AqiCategory::Moderate => "Yellow",
            AqiCategory::UnhealthyForSensitiveGroups => "Orange",
            AqiCategory::Unhealthy => "Red",
            AqiCategory::VeryUnhealthy => "Purple",
            AqiCategory::Hazardous => "Maroon",
        }
    }

    /// Narrative used verbatim as the image-generation prompt.
    pub fn prompt(self) -> &'static str {
        match self {
            AqiCategory::Good => {
                "A bright, clear cityscape with blue skies, lush greenery, reflecting clean and fresh air.  800x600."
            }
            AqiCategory::Moderate => {
                "A cityscape with slightly hazy skies, mild sunlight filtering through, and people going about daily activities with caution.  800x600."
            }
            AqiCategory::UnhealthyForSensitiveGroups => {
                "A city with noticeable haze, muted colors, and some people wearing masks, indicating caution for sensitive groups.  800x600."
            }
            AqiCategory::Unhealthy => {
                "A city shrouded in thick haze, dim sunlight, and limited visibility, with people avoiding outdoor activities. 800x600."
            }
            AqiCategory::VeryUnhealthy => {
                "A gloomy cityscape with heavy smog, dark skies, and deserted streets, reflecting dangerous air quality.  800x600."
            }
            AqiCategory::Hazardous => {
                "A dystopian cityscape engulfed in dense, toxic smog, with no visible greenery or activity, symbolizing hazardous air conditions. 800x600."
            }
        }
    }

    pub fn from_descriptor(descriptor: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.descriptor() == descriptor)
    }
}

/// Map an AQI value onto its tier.
///
/// Tiers use inclusive integer bounds (0-50, 51-100, ...). A fractional
/// value that falls between two bounds belongs to the upper tier, so 50.5 is
/// Moderate. Negative values are Good; NaN and anything from 301 up are
/// Hazardous.
pub fn categorize(aqi: f64) -> AqiCategory {
    // ---
    if aqi <= 50.0 {
        AqiCategory::Good
    } else if aqi <= 100.0 {
        AqiCategory::Moderate
    } else if aqi <= 150.0 {
        AqiCategory::UnhealthyForSensitiveGroups
    } else if aqi <= 200.0 {
        AqiCategory::Unhealthy
    } else if aqi <= 300.0 {
        AqiCategory::VeryUnhealthy
    } else {
        AqiCategory::Hazardous
    }
}

/// Prompt for a descriptor string; unknown descriptors fall back to Good.
pub fn prompt_for(descriptor: &str) -> &'static str {
    AqiCategory::from_descriptor(descriptor)
        .unwrap_or(AqiCategory::Good)
        .prompt()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn pm25(c: f64) -> f64 {
        compute_aqi(Pollutant::Pm25, c)
    }

    #[test]
    fn test_bucket_boundaries_are_continuous() {
        // ---
        assert_eq!(pm25(0.0), 0.0);
        assert_eq!(pm25(12.0), 50.0);
        assert_eq!(pm25(12.1), 51.0);
        assert_eq!(pm25(35.4), 100.0);
        assert_eq!(pm25(35.5), 101.0);
        assert_eq!(pm25(55.4), 150.0);
        assert_eq!(pm25(55.5), 151.0);
        assert_eq!(pm25(150.4), 200.0);
        assert_eq!(pm25(150.5), 201.0);
        assert_eq!(pm25(250.4), 300.0);
        assert_eq!(pm25(250.5), 301.0);
        assert_eq!(pm25(500.4), 500.0);

        for pair in PM25_BREAKPOINTS.windows(2) {
            let upper_of_lower = pm25(pair[0].1);
            let lower_of_upper = pm25(pair[1].0);
            assert!((lower_of_upper - upper_of_lower - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_interpolation_rounds_to_two_decimals() {
        // ---
        // (50 / 12) * 10 = 41.666...
        assert_eq!(pm25(10.0), 41.67);
        // (49 / 23.3) * (20 - 12.1) + 51 = 67.61...
        assert_eq!(pm25(20.0), 67.61);
    }

    #[test]
    fn test_out_of_table_inputs_yield_zero() {
        // ---
        assert_eq!(pm25(-5.0), 0.0);
        assert_eq!(pm25(f64::NAN), 0.0);
        assert_eq!(pm25(600.0), 0.0);
        // Gap between buckets
        assert_eq!(pm25(12.05), 0.0);
    }

    #[test]
    fn test_unsupported_pollutants_yield_zero() {
        // ---
        assert_eq!(compute_aqi(Pollutant::No2, 40.0), 0.0);
        assert_eq!(compute_aqi(Pollutant::Co, 1.2), 0.0);
        assert_eq!(compute_aqi(Pollutant::O3, 70.0), 0.0);
    }

    #[test]
    fn test_categorize_inclusive_tiers() {
        // ---
        assert_eq!(categorize(0.0), AqiCategory::Good);
        assert_eq!(categorize(50.0), AqiCategory::Good);
        assert_eq!(categorize(51.0), AqiCategory::Moderate);
        assert_eq!(categorize(100.0), AqiCategory::Moderate);
        assert_eq!(categorize(101.0), AqiCategory::UnhealthyForSensitiveGroups);
        assert_eq!(categorize(150.0), AqiCategory::UnhealthyForSensitiveGroups);
        assert_eq!(categorize(151.0), AqiCategory::Unhealthy);
        assert_eq!(categorize(200.0), AqiCategory::Unhealthy);
        assert_eq!(categorize(201.0), AqiCategory::VeryUnhealthy);
        assert_eq!(categorize(300.0), AqiCategory::VeryUnhealthy);
        assert_eq!(categorize(301.0), AqiCategory::Hazardous);
        assert_eq!(categorize(1e9), AqiCategory::Hazardous);
        assert_eq!(categorize(f64::INFINITY), AqiCategory::Hazardous);
    }

    #[test]
    fn test_categorize_has_no_gaps_between_tiers() {
        // ---
        assert_eq!(categorize(50.5), AqiCategory::Moderate);
        assert_eq!(categorize(100.01), AqiCategory::UnhealthyForSensitiveGroups);
        assert_eq!(categorize(300.5), AqiCategory::Hazardous);
        assert_eq!(categorize(-0.3), AqiCategory::Good);

        // Walk [0, 600] in small steps; tiers must never go backwards
        let mut previous = AqiCategory::Good;
        let mut v = 0.0;
        while v <= 600.0 {
            let current = categorize(v);
            let prev_rank = AqiCategory::ALL.iter().position(|c| *c == previous);
            let cur_rank = AqiCategory::ALL.iter().position(|c| *c == current);
            assert!(cur_rank >= prev_rank, "tier regressed at {}", v);
            previous = current;
            v += 0.25;
        }
    }

    #[test]
    fn test_descriptor_and_color() {
        // ---
        let c = categorize(120.0);
        assert_eq!(c.descriptor(), "Unhealthy for Sensitive Groups");
        assert_eq!(c.color(), "Orange");
        assert_eq!(categorize(450.0).color(), "Maroon");
    }

    #[test]
    fn test_prompt_lookup_falls_back_to_good() {
        // ---
        assert_eq!(prompt_for("Hazardous"), AqiCategory::Hazardous.prompt());
        assert_eq!(prompt_for("Very Unhealthy"), AqiCategory::VeryUnhealthy.prompt());
        assert_eq!(prompt_for("Smoky"), AqiCategory::Good.prompt());
        assert_eq!(prompt_for(""), AqiCategory::Good.prompt());
    }
}
