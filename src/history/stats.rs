use std::{collections::BTreeMap, fmt::Display};

use chrono::NaiveDate;
use serde::Serialize;

use crate::utils::time::days_before;

use super::aggregate::{DailyAggregate, DayTotals, Metric};

/// Anything the statistics are computed for: the four counters plus mouse travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    Keystrokes,
    Words,
    Clicks,
    Scrolls,
    Distance,
}

impl Measure {
    pub const ALL: [Measure; 5] = [
        Measure::Keystrokes,
        Measure::Words,
        Measure::Clicks,
        Measure::Scrolls,
        Measure::Distance,
    ];

    pub fn of(&self, totals: &DayTotals) -> f64 {
        match self {
            Measure::Keystrokes => totals.keystrokes as f64,
            Measure::Words => totals.words as f64,
            Measure::Clicks => totals.clicks as f64,
            Measure::Scrolls => totals.scrolls as f64,
            Measure::Distance => totals.distance,
        }
    }
}

impl From<Metric> for Measure {
    fn from(value: Metric) -> Self {
        match value {
            Metric::Keystrokes => Measure::Keystrokes,
            Metric::Words => Measure::Words,
            Metric::Clicks => Measure::Clicks,
            Metric::Scrolls => Measure::Scrolls,
        }
    }
}

impl Display for Measure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Measure::Distance => write!(f, "distance"),
            Measure::Keystrokes => Metric::Keystrokes.fmt(f),
            Measure::Words => Metric::Words.fmt(f),
            Measure::Clicks => Metric::Clicks.fmt(f),
            Measure::Scrolls => Metric::Scrolls.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DayRecord {
    pub day: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MeasureStats {
    pub yesterday: f64,
    pub average_7: f64,
    pub average_30: f64,
    /// Best day so far. Absent until some day has a positive total.
    pub record: Option<DayRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RollingStats {
    pub today: NaiveDate,
    pub measures: BTreeMap<Measure, MeasureStats>,
}

impl RollingStats {
    pub fn get(&self, measure: impl Into<Measure>) -> MeasureStats {
        self.measures
            .get(&measure.into())
            .copied()
            .unwrap_or_default()
    }

    /// Lets `day` compete for the records. Yesterday and the averages are left as they are.
    pub fn with_record_candidate(mut self, day: NaiveDate, totals: &DayTotals) -> Self {
        for measure in Measure::ALL {
            let value = measure.of(totals);
            let stats = self.measures.entry(measure).or_default();
            let wins = match stats.record {
                None => value > 0.,
                Some(record) => {
                    value > record.value || (value == record.value && day < record.day)
                }
            };
            if wins {
                stats.record = Some(DayRecord { day, value });
            }
        }
        self
    }
}

/// Computes yesterday, the 7 and 30 day averages and the records relative to `today`.
///
/// Averages only count days that have an entry; a day nobody recorded anything on is a gap,
/// not a zero. Records go to the earliest day reaching the maximum.
pub fn compute_rolling_stats(
    days: &BTreeMap<NaiveDate, DailyAggregate>,
    today: NaiveDate,
) -> RollingStats {
    let totals = days
        .iter()
        .map(|(day, aggregate)| (*day, aggregate.totals()))
        .collect::<BTreeMap<_, _>>();

    let yesterday = totals
        .get(&days_before(today, 1))
        .copied()
        .unwrap_or_default();

    let measures = Measure::ALL
        .into_iter()
        .map(|measure| {
            let stats = MeasureStats {
                yesterday: measure.of(&yesterday),
                average_7: window_average(&totals, today, 7, measure),
                average_30: window_average(&totals, today, 30, measure),
                record: record(&totals, measure),
            };
            (measure, stats)
        })
        .collect();

    RollingStats { today, measures }
}

/// Average over the `window` days before `today`, excluding today itself.
fn window_average(
    totals: &BTreeMap<NaiveDate, DayTotals>,
    today: NaiveDate,
    window: u64,
    measure: Measure,
) -> f64 {
    let (sum, count) = totals
        .range(days_before(today, window)..today)
        .fold((0., 0u32), |(sum, count), (_, day)| {
            (sum + measure.of(day), count + 1)
        });
    if count == 0 {
        0.
    } else {
        sum / f64::from(count)
    }
}

fn record(totals: &BTreeMap<NaiveDate, DayTotals>, measure: Measure) -> Option<DayRecord> {
    let mut best: Option<DayRecord> = None;
    for (day, day_totals) in totals {
        let value = measure.of(day_totals);
        if value > 0. && best.map_or(true, |best| value > best.value) {
            best = Some(DayRecord { day: *day, value });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{NaiveDate, TimeZone, Utc};

    use crate::{
        device::DeviceId,
        history::aggregate::{DailyAggregate, Metric},
    };

    use super::{compute_rolling_stats, DayRecord, Measure};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn history(entries: &[(u32, u64)]) -> BTreeMap<NaiveDate, DailyAggregate> {
        let device = DeviceId::new("a");
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        entries
            .iter()
            .map(|(day, keystrokes)| {
                let mut aggregate = DailyAggregate::new(date(*day), now);
                if *keystrokes > 0 {
                    aggregate
                        .increment(&device, Metric::Keystrokes, *keystrokes, now)
                        .unwrap();
                }
                (date(*day), aggregate)
            })
            .collect()
    }

    #[test]
    fn test_average_excludes_gaps() {
        let days = history(&[(12, 10), (14, 20), (17, 30)]);

        let stats = compute_rolling_stats(&days, date(18));

        assert_eq!(stats.get(Metric::Keystrokes).average_7, 20.);
        assert_eq!(stats.get(Metric::Keystrokes).average_30, 20.);
    }

    #[test]
    fn test_average_ignores_today_and_older_days() {
        let days = history(&[(1, 1000), (10, 2), (11, 4), (12, 8), (18, 500)]);

        let stats = compute_rolling_stats(&days, date(18));

        assert_eq!(stats.get(Metric::Keystrokes).average_7, 6.);
        assert_eq!(stats.get(Metric::Keystrokes).average_30, (1000. + 2. + 4. + 8.) / 4.);
    }

    #[test]
    fn test_empty_window_averages_zero() {
        let days = history(&[(18, 500)]);

        let stats = compute_rolling_stats(&days, date(18));

        let keystrokes = stats.get(Metric::Keystrokes);
        assert_eq!(keystrokes.average_7, 0.);
        assert_eq!(keystrokes.yesterday, 0.);
    }

    #[test]
    fn test_yesterday_totals() {
        let days = history(&[(16, 3), (17, 42)]);

        let stats = compute_rolling_stats(&days, date(18));

        assert_eq!(stats.get(Metric::Keystrokes).yesterday, 42.);
        assert_eq!(stats.get(Metric::Clicks).yesterday, 0.);
    }

    #[test]
    fn test_record_prefers_earliest_day() {
        let days = history(&[(1, 50), (2, 80), (3, 80)]);

        let stats = compute_rolling_stats(&days, date(4));

        assert_eq!(
            stats.get(Metric::Keystrokes).record,
            Some(DayRecord {
                day: date(2),
                value: 80.
            })
        );
    }

    #[test]
    fn test_record_candidate_matches_full_computation() {
        let days = history(&[(1, 50), (2, 80), (3, 0), (4, 80), (5, 120), (6, 7)]);

        for today in [1, 2, 3, 4, 5, 6] {
            let mut others = days.clone();
            let aggregate = others.remove(&date(today)).unwrap();

            let stats = compute_rolling_stats(&others, date(today))
                .with_record_candidate(date(today), &aggregate.totals());

            assert_eq!(stats, compute_rolling_stats(&days, date(today)), "today {today}");
        }
    }

    #[test]
    fn test_record_absent_without_activity() {
        let days = history(&[(1, 0), (2, 0)]);

        let stats = compute_rolling_stats(&days, date(4));

        assert_eq!(stats.get(Metric::Keystrokes).record, None);
        assert_eq!(stats.get(Measure::Distance).record, None);
    }
}
