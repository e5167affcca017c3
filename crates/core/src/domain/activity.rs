//! アクティビティカレンダー: 履歴のタイムスタンプを 52週×7日 のグリッドに集計する。

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone};
use serde::Serialize;

use super::types::HistoryEntry;

pub const WEEKS_TO_SHOW: usize = 52;
pub const DAYS_PER_WEEK: usize = 7;

/// カレンダーの1日分
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDay {
    /// ローカル日付 `YYYY-MM-DD`
    pub date: String,
    pub count: u32,
    /// 今日より後の日（描画はするが活動なし扱い）
    pub is_future: bool,
}

/// 週ごと（日曜始まり）のグリッド
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityGrid {
    pub weeks: Vec<Vec<ActivityDay>>,
}

impl ActivityGrid {
    /// 日付キーでセルを探す
    #[cfg(test)]
    pub fn day(&self, date: &str) -> Option<&ActivityDay> {
        self.weeks.iter().flatten().find(|d| d.date == date)
    }

    /// グリッド内の活動総数
    pub fn total(&self) -> u32 {
        self.weeks.iter().flatten().map(|d| d.count).sum()
    }
}

/// ローカル日付キー
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// 端末のローカルタイムゾーンで集計する
pub fn build_local(entries: &[HistoryEntry]) -> ActivityGrid {
    build_grid(entries.iter().map(|e| e.timestamp), Local::now())
}

/// `now` のタイムゾーンでタイムスタンプ（epoch ms）を日付ごとに数え、
/// 今週の日曜日を最終週の先頭として過去51週を含むグリッドを作る。
pub fn build_grid<Tz: TimeZone>(
    timestamps: impl IntoIterator<Item = i64>,
    now: DateTime<Tz>,
) -> ActivityGrid {
    let tz = now.timezone();
    let mut activity: HashMap<NaiveDate, u32> = HashMap::new();
    for ts in timestamps {
        if let Some(local) = tz.timestamp_millis_opt(ts).earliest() {
            *activity.entry(local.date_naive()).or_insert(0) += 1;
        }
    }

    let today = now.date_naive();
    let current_week_sunday =
        today - Duration::days(i64::from(today.weekday().num_days_from_sunday()));
    let start = current_week_sunday - Duration::days(((WEEKS_TO_SHOW - 1) * DAYS_PER_WEEK) as i64);

    let mut weeks = Vec::with_capacity(WEEKS_TO_SHOW);
    let mut day = start;
    for _ in 0..WEEKS_TO_SHOW {
        let mut week = Vec::with_capacity(DAYS_PER_WEEK);
        for _ in 0..DAYS_PER_WEEK {
            week.push(ActivityDay {
                date: date_key(day),
                count: activity.get(&day).copied().unwrap_or(0),
                is_future: day > today,
            });
            day += Duration::days(1);
        }
        weeks.push(week);
    }

    ActivityGrid { weeks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Weekday};

    fn tokyo() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    // 2026-10-14 (水) 12:00 +09:00
    fn wednesday_noon() -> DateTime<FixedOffset> {
        tokyo().with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_grid_shape_and_alignment() {
        let grid = build_grid(std::iter::empty(), wednesday_noon());
        assert_eq!(grid.weeks.len(), WEEKS_TO_SHOW);
        assert!(grid.weeks.iter().all(|w| w.len() == DAYS_PER_WEEK));

        let last_week = grid.weeks.last().unwrap();
        assert_eq!(last_week[0].date, "2026-10-11");
        assert_eq!(last_week[6].date, "2026-10-17");

        let first = NaiveDate::parse_from_str(&grid.weeks[0][0].date, "%Y-%m-%d").unwrap();
        assert_eq!(first.weekday(), Weekday::Sun);
        assert_eq!(first, NaiveDate::from_ymd_opt(2026, 10, 11).unwrap() - Duration::days(357));
    }

    #[test]
    fn test_today_at_noon_marks_current_week() {
        let now = wednesday_noon();
        let grid = build_grid([now.timestamp_millis()], now);
        let last_week = grid.weeks.last().unwrap();

        assert_eq!(last_week[3].date, "2026-10-14");
        assert_eq!(last_week[3].count, 1);
        assert!(!last_week[3].is_future);

        for day in &last_week[4..] {
            assert!(day.is_future);
            assert_eq!(day.count, 0);
        }
        for day in &last_week[..3] {
            assert!(!day.is_future);
        }
        assert_eq!(grid.total(), 1);
    }

    #[test]
    fn test_bucketing_uses_local_date() {
        // 2026-10-13 20:00 UTC は東京では 2026-10-14 05:00
        let ts = chrono::Utc
            .with_ymd_and_hms(2026, 10, 13, 20, 0, 0)
            .unwrap()
            .timestamp_millis();
        let grid = build_grid([ts, ts + 1_000], wednesday_noon());
        assert_eq!(grid.day("2026-10-14").unwrap().count, 2);
        assert_eq!(grid.day("2026-10-13").unwrap().count, 0);
    }

    #[test]
    fn test_entries_outside_window_ignored() {
        let now = wednesday_noon();
        let two_years_ago = now.timestamp_millis() - 2 * 365 * 24 * 3600 * 1000;
        let grid = build_grid([two_years_ago], now);
        assert_eq!(grid.total(), 0);
    }

    #[test]
    fn test_sunday_is_first_column_of_current_week() {
        let sunday = tokyo().with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
        let grid = build_grid([sunday.timestamp_millis()], sunday);
        let last_week = grid.weeks.last().unwrap();
        assert_eq!(last_week[0].date, "2026-10-18");
        assert_eq!(last_week[0].count, 1);
        assert!(last_week[1..].iter().all(|d| d.is_future));
    }
}
