//! Analysis time resolution, per-period resampling, and time coverage.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, Duration, Months, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Aggregation period for the composite table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    #[default]
    Monthly,
    Daily,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Daily => "daily",
        }
    }

    /// Start of the period containing `ts` (first of month, or midnight).
    pub fn period_start(self, ts: NaiveDateTime) -> NaiveDateTime {
        let date = ts.date();
        let start = match self {
            Self::Monthly => date.with_day(1).unwrap_or(date),
            Self::Daily => date,
        };
        start.and_time(NaiveTime::MIN)
    }

    /// Start of the period following the one beginning at `start`.
    pub fn next_period(self, start: NaiveDateTime) -> NaiveDateTime {
        match self {
            Self::Monthly => start
                .checked_add_months(Months::new(1))
                .unwrap_or(NaiveDateTime::MAX),
            Self::Daily => start + Duration::days(1),
        }
    }

    /// Length in hours of the period beginning at `start`.
    pub fn period_hours(self, start: NaiveDateTime) -> f64 {
        (self.next_period(start) - start).num_seconds() as f64 / 3600.0
    }

    /// Number of periods in an average year.
    pub fn periods_per_year(self) -> f64 {
        match self {
            Self::Monthly => 12.0,
            Self::Daily => 365.25,
        }
    }

    /// Samples a table logged every `step` should hold in the period
    /// beginning at `start`.
    ///
    /// Tables without a step, or stepping by a month or more, hold one
    /// sample per period.
    pub fn expected_samples(self, start: NaiveDateTime, step: Option<Duration>) -> f64 {
        match step {
            Some(step) if step > Duration::zero() && step < Duration::days(28) => {
                let step_hours = step.num_seconds() as f64 / 3600.0;
                (self.period_hours(start) / step_hours).max(1.0)
            }
            _ => 1.0,
        }
    }
}


impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How values falling in one period are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Additive quantities such as energy.
    Sum,
    /// Intensive quantities such as wind speed or density.
    Mean,
}

/// Aggregate of one period together with how many samples produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodValue {
    pub value: f64,
    /// Present (non-missing) samples that fell in the period.
    pub samples: usize,
}

/// Resamples paired timestamps and values to per-period aggregates, keeping
/// the sample count of each period.
///
/// Missing values are skipped. Periods without any present value are absent
/// from the output rather than reported as zero.
pub fn resample_counted(
    resolution: Resolution,
    timestamps: &[NaiveDateTime],
    values: &[Option<f64>],
    aggregation: Aggregation,
) -> BTreeMap<NaiveDateTime, PeriodValue> {
    let mut acc: BTreeMap<NaiveDateTime, (f64, usize)> = BTreeMap::new();
    for (ts, value) in timestamps.iter().zip(values) {
        let Some(v) = value else { continue };
        let entry = acc.entry(resolution.period_start(*ts)).or_insert((0.0, 0));
        entry.0 += v;
        entry.1 += 1;
    }
    acc.into_iter()
        .map(|(period, (sum, samples))| {
            let value = match aggregation {
                Aggregation::Sum => sum,
                Aggregation::Mean => sum / samples as f64,
            };
            (period, PeriodValue { value, samples })
        })
        .collect()
}

/// [`resample_counted`] without the counts.
pub fn resample(
    resolution: Resolution,
    timestamps: &[NaiveDateTime],
    values: &[Option<f64>],
    aggregation: Aggregation,
) -> BTreeMap<NaiveDateTime, f64> {
    resample_counted(resolution, timestamps, values, aggregation)
        .into_iter()
        .map(|(period, v)| (period, v.value))
        .collect()
}

/// Median spacing of sorted timestamps, ignoring repeats. `None` with fewer
/// than two distinct timestamps.
pub fn sampling_step(timestamps: &[NaiveDateTime]) -> Option<Duration> {
    let mut steps: Vec<Duration> = timestamps
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|d| *d > Duration::zero())
        .collect();
    if steps.is_empty() {
        return None;
    }
    steps.sort_unstable();
    Some(steps[steps.len() / 2])
}

/// Half-open interval `[start, end)` of time covered by a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Coverage {
    /// Coverage of sorted timestamps: first sample to last sample plus one
    /// median step. Steps of 28 days or more count as one calendar month.
    ///
    /// A single distinct timestamp has no step and covers nothing.
    pub fn of(timestamps: &[NaiveDateTime]) -> Option<Self> {
        let first = *timestamps.first()?;
        let last = *timestamps.last()?;
        let Some(step) = sampling_step(timestamps) else {
            return Some(Self {
                start: first,
                end: first,
            });
        };
        let end = if step >= Duration::days(28) {
            last.checked_add_months(Months::new(1))
                .unwrap_or(NaiveDateTime::MAX)
        } else {
            last + step
        };
        Some(Self { start: first, end })
    }

    pub fn intersect(&self, other: &Self) -> Self {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end).max(start);
        Self { start, end }
    }

    /// Whether some calendar month lies entirely inside this coverage.
    pub fn contains_whole_month(&self) -> bool {
        let monthly = Resolution::Monthly;
        let mut month = monthly.period_start(self.start);
        if month < self.start {
            month = monthly.next_period(month);
        }
        monthly.next_period(month) <= self.end
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
