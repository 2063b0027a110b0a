//! Named lookback horizons.
//!
//! A horizon is a calendar-day offset with a stable label. The same set of
//! labels names return columns, scoring weights and the periods tracked by
//! the historical score tracker.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// A named lookback window measured in calendar days.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Horizon {
    /// 7 calendar days
    #[display("1_Week")]
    #[serde(rename = "1_Week")]
    OneWeek,
    /// 30 calendar days
    #[display("1_Month")]
    #[serde(rename = "1_Month")]
    OneMonth,
    /// 90 calendar days
    #[display("3_Months")]
    #[serde(rename = "3_Months")]
    ThreeMonths,
    /// 180 calendar days
    #[display("6_Months")]
    #[serde(rename = "6_Months")]
    SixMonths,
    /// 270 calendar days
    #[display("9_Months")]
    #[serde(rename = "9_Months")]
    NineMonths,
    /// 365 calendar days
    #[display("1_Year")]
    #[serde(rename = "1_Year")]
    OneYear,
    /// 1095 calendar days
    #[display("3_Years")]
    #[serde(rename = "3_Years")]
    ThreeYears,
    /// 1825 calendar days
    #[display("5_Years")]
    #[serde(rename = "5_Years")]
    FiveYears,
}

impl Horizon {
    /// Every horizon a return set can carry, shortest first.
    pub const ALL: [Self; 8] = [
        Self::OneWeek,
        Self::OneMonth,
        Self::ThreeMonths,
        Self::SixMonths,
        Self::NineMonths,
        Self::OneYear,
        Self::ThreeYears,
        Self::FiveYears,
    ];

    /// Horizons that feed the composite score.
    pub const SCORING: [Self; 5] = [
        Self::OneMonth,
        Self::ThreeMonths,
        Self::SixMonths,
        Self::NineMonths,
        Self::OneYear,
    ];

    /// Periods re-scored by the historical tracker.
    pub const TRACKED: [Self; 6] = [
        Self::OneWeek,
        Self::OneMonth,
        Self::ThreeMonths,
        Self::SixMonths,
        Self::NineMonths,
        Self::OneYear,
    ];

    /// Offset in calendar days.
    pub const fn days(self) -> i64 {
        match self {
            Self::OneWeek => 7,
            Self::OneMonth => 30,
            Self::ThreeMonths => 90,
            Self::SixMonths => 180,
            Self::NineMonths => 270,
            Self::OneYear => 365,
            Self::ThreeYears => 1095,
            Self::FiveYears => 1825,
        }
    }

    /// Lower-case column slug, e.g. `1week`, `3months`.
    pub const fn slug(self) -> &'static str {
        match self {
            Self::OneWeek => "1week",
            Self::OneMonth => "1month",
            Self::ThreeMonths => "3months",
            Self::SixMonths => "6months",
            Self::NineMonths => "9months",
            Self::OneYear => "1year",
            Self::ThreeYears => "3years",
            Self::FiveYears => "5years",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Horizon::OneWeek, 7, "1_Week", "1week")]
    #[case(Horizon::OneMonth, 30, "1_Month", "1month")]
    #[case(Horizon::NineMonths, 270, "9_Months", "9months")]
    #[case(Horizon::FiveYears, 1825, "5_Years", "5years")]
    fn test_horizon_labels(
        #[case] horizon: Horizon,
        #[case] days: i64,
        #[case] label: &str,
        #[case] slug: &str,
    ) {
        assert_eq!(horizon.days(), days);
        assert_eq!(horizon.to_string(), label);
        assert_eq!(horizon.slug(), slug);
    }

    #[test]
    fn test_horizon_sets_are_ordered() {
        let days: Vec<i64> = Horizon::ALL.iter().map(|h| h.days()).collect();
        let mut sorted = days.clone();
        sorted.sort_unstable();
        assert_eq!(days, sorted);
        assert!(Horizon::SCORING.iter().all(|h| Horizon::ALL.contains(h)));
        assert!(Horizon::TRACKED.iter().all(|h| h.days() <= 365));
    }

    #[test]
    fn test_horizon_serde_uses_labels() {
        let json = serde_json::to_string(&Horizon::ThreeMonths).unwrap();
        assert_eq!(json, "\"3_Months\"");
        let back: Horizon = serde_json::from_str("\"1_Year\"").unwrap();
        assert_eq!(back, Horizon::OneYear);
    }
}
