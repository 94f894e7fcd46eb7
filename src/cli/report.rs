use std::fmt::Write;

use ansi_term::Style;
use serde::Serialize;

use crate::history::{DailyAggregate, DayTotals, Measure, RollingStats};

/// Everything `stats` prints, in a shape that also serializes to JSON.
#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub today: DayTotals,
    pub stats: RollingStats,
}

fn format_value(measure: Measure, value: f64) -> String {
    match measure {
        Measure::Distance => format!("{:.0}px", value),
        _ => format!("{:.0}", value),
    }
}

fn format_average(measure: Measure, value: f64) -> String {
    match measure {
        Measure::Distance => format!("{:.0}px", value),
        _ => format!("{:.1}", value),
    }
}

fn heading(text: &str, colored: bool) -> String {
    if colored {
        Style::new().bold().paint(text).to_string()
    } else {
        text.to_owned()
    }
}

pub fn render_stats(report: &StatsReport, colored: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        heading(
            &format!("{}\ttoday\tyesterday\tavg 7\tavg 30\trecord", report.stats.today),
            colored
        )
    );
    for measure in Measure::ALL {
        let stats = report.stats.get(measure);
        let record = match stats.record {
            Some(record) => format!("{} ({})", format_value(measure, record.value), record.day),
            None => "-".to_owned(),
        };
        let _ = writeln!(
            out,
            "{measure}\t{}\t{}\t{}\t{}\t{record}",
            format_value(measure, measure.of(&report.today)),
            format_value(measure, stats.yesterday),
            format_average(measure, stats.average_7),
            format_average(measure, stats.average_30),
        );
    }
    out
}

/// One line per day, newest first, at most `limit` days.
pub fn render_history<'a>(
    days: impl DoubleEndedIterator<Item = &'a DailyAggregate>,
    limit: usize,
    colored: bool,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        heading("day\tkeystrokes\twords\tclicks\tscrolls\tdistance", colored)
    );
    for aggregate in days.rev().take(limit) {
        let totals = aggregate.totals();
        let _ = writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}",
            aggregate.day(),
            totals.keystrokes,
            totals.words,
            totals.clicks,
            totals.scrolls,
            format_value(Measure::Distance, totals.distance),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{NaiveDate, TimeZone, Utc};

    use crate::{
        device::DeviceId,
        history::{stats::compute_rolling_stats, DailyAggregate, Metric},
    };

    use super::{render_history, render_stats, StatsReport};

    fn day(day: u32, keystrokes: u64) -> DailyAggregate {
        let now = Utc.with_ymd_and_hms(2018, 7, day, 10, 0, 0).unwrap();
        let mut aggregate =
            DailyAggregate::new(NaiveDate::from_ymd_opt(2018, 7, day).unwrap(), now);
        aggregate
            .increment(&DeviceId::new("a"), Metric::Keystrokes, keystrokes, now)
            .unwrap();
        aggregate
    }

    #[test]
    fn test_history_is_newest_first() {
        let days = [day(1, 5), day(2, 6), day(3, 7)];

        let rendered = render_history(days.iter(), 2, false);

        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("2018-07-03\t7\t"));
        assert!(lines[2].starts_with("2018-07-02\t6\t"));
    }

    #[test]
    fn test_stats_lists_every_measure() {
        let days = [day(1, 10), day(2, 30), day(3, 4)]
            .into_iter()
            .map(|v| (v.day(), v))
            .collect::<BTreeMap<_, _>>();
        let today = NaiveDate::from_ymd_opt(2018, 7, 3).unwrap();
        let report = StatsReport {
            today: days[&today].totals(),
            stats: compute_rolling_stats(&days, today),
        };

        let rendered = render_stats(&report, false);

        let keystrokes = rendered
            .lines()
            .find(|v| v.starts_with("keystrokes"))
            .unwrap();
        assert_eq!(keystrokes, "keystrokes\t4\t30\t20.0\t20.0\t30 (2018-07-02)");
        assert!(rendered.lines().any(|v| v == "distance\t0px\t0px\t0px\t0px\t-"));
        assert_eq!(rendered.lines().count(), 6);
    }
}
