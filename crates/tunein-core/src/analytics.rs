//! Mood and streak analytics over a merged entry history.
//!
//! Everything here is pure: inputs are never mutated, day boundaries come
//! from the caller's timezone, and empty input yields empty results.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, Duration, Local, NaiveDate, TimeZone, Weekday};
use serde::Serialize;

use crate::models::{newest_first, valence_of, EntryRecord, Mood};

/// Entries averaged by [`trend`] when no window is given
pub const DEFAULT_TREND_WINDOW: usize = 7;

const POSITIVE_THRESHOLD: f64 = 3.5;
const NEGATIVE_THRESHOLD: f64 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Positive,
    Neutral,
    Negative,
}

impl Trend {
    /// Classify an average valence
    #[must_use]
    pub fn classify(average: f64) -> Self {
        if average >= POSITIVE_THRESHOLD {
            Self::Positive
        } else if average < NEGATIVE_THRESHOLD {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendSummary {
    pub direction: Trend,
    pub average: f64,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MoodDistribution {
    pub counts: BTreeMap<Mood, usize>,
    pub most_frequent: Option<Mood>,
}

/// Most common mood on one weekday
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekdayMood {
    pub weekday: Weekday,
    pub mood: Mood,
    /// Entries with that mood on that weekday
    pub count: usize,
}

/// Entries sharing a calendar month, for month headers in a journal list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthGroup {
    pub year: i32,
    pub month: u32,
    pub entries: Vec<EntryRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub total_entries: usize,
    pub current_streak: usize,
    pub longest_streak_per_mood: BTreeMap<Mood, usize>,
    pub mood_distribution: MoodDistribution,
    pub trend: Option<TrendSummary>,
    pub weekday_pattern: Vec<WeekdayMood>,
}

/// Full report as of `today` in `tz`.
pub fn analyze<Tz: TimeZone>(entries: &[EntryRecord], today: NaiveDate, tz: &Tz) -> AnalyticsReport {
    AnalyticsReport {
        total_entries: entries.len(),
        current_streak: current_streak(entries, today, tz),
        longest_streak_per_mood: longest_streak_per_mood(entries, tz),
        mood_distribution: mood_distribution(entries),
        trend: trend(entries, DEFAULT_TREND_WINDOW),
        weekday_pattern: weekday_pattern(entries, tz),
    }
}

/// Full report as of now in the system timezone.
pub fn analyze_now(entries: &[EntryRecord]) -> AnalyticsReport {
    analyze(entries, Local::now().date_naive(), &Local)
}

/// Consecutive calendar days with at least one entry, ending at the most
/// recent entry day.
///
/// Zero when the most recent entry is older than yesterday.
pub fn current_streak<Tz: TimeZone>(entries: &[EntryRecord], today: NaiveDate, tz: &Tz) -> usize {
    let days = entry_days(entries, tz);
    let Some(&latest) = days.last() else {
        return 0;
    };
    if today - latest > Duration::days(1) {
        return 0;
    }

    let mut streak = 0;
    let mut expected = latest;
    for &day in days.iter().rev() {
        if day != expected {
            break;
        }
        streak += 1;
        let Some(previous) = day.pred_opt() else {
            break;
        };
        expected = previous;
    }
    streak
}

/// Longest run of consecutive calendar days on which each mood was recorded.
///
/// Moods never recorded are absent from the map.
pub fn longest_streak_per_mood<Tz: TimeZone>(
    entries: &[EntryRecord],
    tz: &Tz,
) -> BTreeMap<Mood, usize> {
    let mut days_by_mood: BTreeMap<Mood, BTreeSet<NaiveDate>> = BTreeMap::new();
    for entry in entries {
        let (Some(mood), Some(day)) = (entry.mood, entry.local_date(tz)) else {
            continue;
        };
        days_by_mood.entry(mood).or_default().insert(day);
    }

    days_by_mood
        .into_iter()
        .map(|(mood, days)| (mood, longest_run(&days)))
        .collect()
}

fn longest_run(days: &BTreeSet<NaiveDate>) -> usize {
    let mut longest = 0;
    let mut running = 0;
    let mut previous: Option<NaiveDate> = None;

    for &day in days {
        running = match previous {
            Some(prev) if day - prev == Duration::days(1) => running + 1,
            _ => 1,
        };
        longest = longest.max(running);
        previous = Some(day);
    }
    longest
}

/// Count entries per mood.
///
/// Ties for the most frequent mood go to the one seen first, newest entry
/// first.
pub fn mood_distribution(entries: &[EntryRecord]) -> MoodDistribution {
    let mut ordered = entries.iter().collect::<Vec<_>>();
    ordered.sort_by(|a, b| newest_first(a, b));

    let mut counts: BTreeMap<Mood, usize> = BTreeMap::new();
    let mut first_seen: Vec<Mood> = Vec::new();
    for mood in ordered.into_iter().filter_map(|entry| entry.mood) {
        let count = counts.entry(mood).or_insert(0);
        if *count == 0 {
            first_seen.push(mood);
        }
        *count += 1;
    }

    let mut most_frequent: Option<(Mood, usize)> = None;
    for mood in first_seen {
        let count = counts.get(&mood).copied().unwrap_or_default();
        if most_frequent.map_or(true, |(_, best)| count > best) {
            most_frequent = Some((mood, count));
        }
    }

    MoodDistribution {
        counts,
        most_frequent: most_frequent.map(|(mood, _)| mood),
    }
}

/// Average valence of the `window` most recent entries.
///
/// Entries without a mood count as neutral. `None` when there is nothing to
/// average.
#[allow(clippy::cast_precision_loss)]
pub fn trend(entries: &[EntryRecord], window: usize) -> Option<TrendSummary> {
    let mut ordered = entries.iter().collect::<Vec<_>>();
    ordered.sort_by(|a, b| newest_first(a, b));
    ordered.truncate(window);

    if ordered.is_empty() {
        return None;
    }

    let sample_size = ordered.len();
    let total: f64 = ordered.iter().map(|entry| valence_of(entry.mood)).sum();
    let average = total / sample_size as f64;

    Some(TrendSummary {
        direction: Trend::classify(average),
        average,
        sample_size,
    })
}

/// Most frequent mood per weekday, Monday first.
///
/// Weekdays without mood entries are omitted; ties go to the
/// alphabetically first label.
pub fn weekday_pattern<Tz: TimeZone>(entries: &[EntryRecord], tz: &Tz) -> Vec<WeekdayMood> {
    let mut buckets: HashMap<Weekday, BTreeMap<&'static str, (Mood, usize)>> = HashMap::new();
    for entry in entries {
        let (Some(mood), Some(day)) = (entry.mood, entry.local_date(tz)) else {
            continue;
        };
        buckets
            .entry(day.weekday())
            .or_default()
            .entry(mood.label())
            .or_insert((mood, 0))
            .1 += 1;
    }

    let mut weekday = Weekday::Mon;
    let mut pattern = Vec::new();
    for _ in 0..7 {
        if let Some(counts) = buckets.get(&weekday) {
            // Labels iterate alphabetically, so the first maximum wins ties
            let mut best: Option<(Mood, usize)> = None;
            for &(mood, count) in counts.values() {
                if best.map_or(true, |(_, top)| count > top) {
                    best = Some((mood, count));
                }
            }
            if let Some((mood, count)) = best {
                pattern.push(WeekdayMood {
                    weekday,
                    mood,
                    count,
                });
            }
        }
        weekday = weekday.succ();
    }
    pattern
}

/// Group entries by calendar month, newest month first.
pub fn group_by_month<Tz: TimeZone>(entries: &[EntryRecord], tz: &Tz) -> Vec<MonthGroup> {
    let mut ordered = entries.to_vec();
    ordered.sort_by(newest_first);

    let mut groups: Vec<MonthGroup> = Vec::new();
    for entry in ordered {
        let Some(day) = entry.local_date(tz) else {
            continue;
        };
        match groups.last_mut() {
            Some(group) if group.year == day.year() && group.month == day.month() => {
                group.entries.push(entry);
            }
            _ => groups.push(MonthGroup {
                year: day.year(),
                month: day.month(),
                entries: vec![entry],
            }),
        }
    }
    groups
}

/// Distinct entry days, oldest first
fn entry_days<Tz: TimeZone>(entries: &[EntryRecord], tz: &Tz) -> Vec<NaiveDate> {
    entries
        .iter()
        .filter_map(|entry| entry.local_date(tz))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryDraft;
    use chrono::{FixedOffset, Utc};
    use pretty_assertions::assert_eq;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn entry_on(day: NaiveDate, hour: u32, mood: Option<Mood>) -> EntryRecord {
        let timestamp = Utc
            .from_utc_datetime(&day.and_hms_opt(hour, 0, 0).unwrap())
            .timestamp();
        let draft = EntryDraft::new("entry");
        EntryRecord {
            timestamp,
            mood,
            ..EntryRecord::from_draft(draft)
        }
    }

    fn moods_on(days: &[(NaiveDate, Mood)]) -> Vec<EntryRecord> {
        days.iter()
            .map(|&(day, mood)| entry_on(day, 12, Some(mood)))
            .collect()
    }

    #[test]
    fn empty_input_yields_empty_results() {
        let report = analyze(&[], date(2024, 5, 10), &Utc);
        assert_eq!(report.total_entries, 0);
        assert_eq!(report.current_streak, 0);
        assert!(report.longest_streak_per_mood.is_empty());
        assert_eq!(report.mood_distribution, MoodDistribution::default());
        assert_eq!(report.trend, None);
        assert!(report.weekday_pattern.is_empty());
        assert!(group_by_month(&[], &Utc).is_empty());
    }

    #[test]
    fn streak_is_one_for_single_entry_today() {
        let today = date(2024, 5, 10);
        let entries = vec![entry_on(today, 9, Some(Mood::Calm))];
        assert_eq!(current_streak(&entries, today, &Utc), 1);
    }

    #[test]
    fn streak_is_zero_when_latest_entry_is_two_days_old() {
        let today = date(2024, 5, 10);
        let entries = vec![
            entry_on(date(2024, 5, 8), 9, None),
            entry_on(date(2024, 5, 7), 9, None),
        ];
        assert_eq!(current_streak(&entries, today, &Utc), 0);
    }

    #[test]
    fn streak_survives_until_end_of_next_day() {
        let today = date(2024, 5, 10);
        let entries = vec![
            entry_on(date(2024, 5, 9), 9, None),
            entry_on(date(2024, 5, 8), 9, None),
        ];
        assert_eq!(current_streak(&entries, today, &Utc), 2);
    }

    #[test]
    fn gap_breaks_streak() {
        // Mon, Tue, Wed, then Fri with Thursday missing
        let friday = date(2024, 5, 10);
        let entries = vec![
            entry_on(date(2024, 5, 6), 9, None),
            entry_on(date(2024, 5, 7), 9, None),
            entry_on(date(2024, 5, 8), 9, None),
            entry_on(friday, 9, None),
        ];
        assert_eq!(current_streak(&entries, friday, &Utc), 1);
    }

    #[test]
    fn same_day_entries_count_once() {
        let today = date(2024, 5, 10);
        let entries = vec![
            entry_on(today, 8, None),
            entry_on(today, 20, None),
            entry_on(date(2024, 5, 9), 8, None),
        ];
        assert_eq!(current_streak(&entries, today, &Utc), 2);
    }

    #[test]
    fn day_boundaries_follow_timezone() {
        // 23:30 UTC on May 9 is already May 10 at UTC+2
        let timestamp = Utc
            .from_utc_datetime(&date(2024, 5, 9).and_hms_opt(23, 30, 0).unwrap())
            .timestamp();
        let entry = EntryRecord {
            timestamp,
            ..EntryRecord::from_draft(EntryDraft::new("late"))
        };
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();

        assert_eq!(entry.local_date(&plus_two), Some(date(2024, 5, 10)));
        assert_eq!(current_streak(&[entry.clone()], date(2024, 5, 11), &Utc), 0);
        assert_eq!(current_streak(&[entry], date(2024, 5, 11), &plus_two), 1);
    }

    #[test]
    fn longest_streak_per_mood_counts_consecutive_days() {
        let entries = moods_on(&[
            (date(2024, 5, 1), Mood::Happy),
            (date(2024, 5, 2), Mood::Happy),
            (date(2024, 5, 3), Mood::Sad),
            (date(2024, 5, 4), Mood::Happy),
            (date(2024, 5, 5), Mood::Happy),
            (date(2024, 5, 6), Mood::Happy),
            (date(2024, 5, 6), Mood::Sad),
            (date(2024, 5, 9), Mood::Calm),
        ]);

        let streaks = longest_streak_per_mood(&entries, &Utc);
        assert_eq!(
            streaks,
            BTreeMap::from([(Mood::Happy, 3), (Mood::Calm, 1), (Mood::Sad, 1)])
        );
    }

    #[test]
    fn distribution_counts_and_mode() {
        let entries = moods_on(&[
            (date(2024, 5, 1), Mood::Happy),
            (date(2024, 5, 2), Mood::Happy),
            (date(2024, 5, 3), Mood::Sad),
        ]);

        let distribution = mood_distribution(&entries);
        assert_eq!(
            distribution.counts,
            BTreeMap::from([(Mood::Happy, 2), (Mood::Sad, 1)])
        );
        assert_eq!(distribution.most_frequent, Some(Mood::Happy));
    }

    #[test]
    fn distribution_tie_goes_to_most_recent_first_seen() {
        let entries = moods_on(&[
            (date(2024, 5, 1), Mood::Calm),
            (date(2024, 5, 2), Mood::Angry),
            (date(2024, 5, 3), Mood::Calm),
            (date(2024, 5, 4), Mood::Angry),
        ]);
        assert_eq!(mood_distribution(&entries).most_frequent, Some(Mood::Angry));

        let mut without_mood = entries;
        without_mood.push(entry_on(date(2024, 5, 5), 9, None));
        assert_eq!(mood_distribution(&without_mood).counts.values().sum::<usize>(), 4);
    }

    #[test]
    fn trend_classification() {
        let days = (1..=7).map(|day| date(2024, 5, day)).collect::<Vec<_>>();

        let happy = days.iter().map(|&day| (day, Mood::Happy)).collect::<Vec<_>>();
        let summary = trend(&moods_on(&happy), DEFAULT_TREND_WINDOW).unwrap();
        assert_eq!(summary.direction, Trend::Positive);
        assert_eq!(summary.sample_size, 7);
        assert!((summary.average - 5.0).abs() < f64::EPSILON);

        let sad = days.iter().map(|&day| (day, Mood::Sad)).collect::<Vec<_>>();
        assert_eq!(
            trend(&moods_on(&sad), DEFAULT_TREND_WINDOW).unwrap().direction,
            Trend::Negative
        );

        let unknown = vec![entry_on(date(2024, 5, 1), 9, None)];
        assert_eq!(trend(&unknown, DEFAULT_TREND_WINDOW).unwrap().direction, Trend::Neutral);
    }

    #[test]
    fn trend_uses_only_most_recent_window() {
        let mut entries = moods_on(&[
            (date(2024, 5, 1), Mood::Angry),
            (date(2024, 5, 2), Mood::Angry),
            (date(2024, 5, 3), Mood::Angry),
        ]);
        entries.extend(moods_on(&[
            (date(2024, 5, 4), Mood::Happy),
            (date(2024, 5, 5), Mood::Calm),
        ]));

        let summary = trend(&entries, 2).unwrap();
        assert_eq!(summary.sample_size, 2);
        assert!((summary.average - 4.5).abs() < f64::EPSILON);
        assert_eq!(summary.direction, Trend::Positive);
        assert_eq!(trend(&entries, 0), None);
    }

    #[test]
    fn threshold_edges() {
        assert_eq!(Trend::classify(3.5), Trend::Positive);
        assert_eq!(Trend::classify(3.49), Trend::Neutral);
        assert_eq!(Trend::classify(2.5), Trend::Neutral);
        assert_eq!(Trend::classify(2.49), Trend::Negative);
    }

    #[test]
    fn weekday_pattern_orders_and_breaks_ties() {
        // 2024-05-06 is a Monday
        let entries = moods_on(&[
            (date(2024, 5, 6), Mood::Sad),
            (date(2024, 5, 13), Mood::Sad),
            (date(2024, 5, 20), Mood::Happy),
            (date(2024, 5, 8), Mood::Calm),
            (date(2024, 5, 15), Mood::Anxious),
            (date(2024, 5, 12), Mood::Happy),
        ]);

        let pattern = weekday_pattern(&entries, &Utc);
        assert_eq!(
            pattern,
            vec![
                WeekdayMood {
                    weekday: Weekday::Mon,
                    mood: Mood::Sad,
                    count: 2,
                },
                WeekdayMood {
                    weekday: Weekday::Wed,
                    mood: Mood::Anxious,
                    count: 1,
                },
                WeekdayMood {
                    weekday: Weekday::Sun,
                    mood: Mood::Happy,
                    count: 1,
                },
            ]
        );
    }

    #[test]
    fn groups_by_month_newest_first() {
        let entries = vec![
            entry_on(date(2024, 4, 30), 9, None),
            entry_on(date(2024, 5, 2), 9, None),
            entry_on(date(2024, 5, 1), 9, None),
            entry_on(date(2023, 12, 31), 9, None),
        ];

        let groups = group_by_month(&entries, &Utc);
        let keys = groups
            .iter()
            .map(|group| (group.year, group.month, group.entries.len()))
            .collect::<Vec<_>>();
        assert_eq!(keys, vec![(2024, 5, 2), (2024, 4, 1), (2023, 12, 1)]);
        assert_eq!(groups[0].entries[0].timestamp, entries[1].timestamp);
    }
}
