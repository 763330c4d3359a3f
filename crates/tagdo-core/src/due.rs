use anyhow::{Context, anyhow};
use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DueBucket {
    None,
    Overdue,
    Today,
    Soon,
}

impl DueBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            DueBucket::None => "none",
            DueBucket::Overdue => "overdue",
            DueBucket::Today => "today",
            DueBucket::Soon => "soon",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueStatus {
    pub label: String,
    pub bucket: DueBucket,
    pub detail: String,
}

impl DueStatus {
    fn none() -> Self {
        Self {
            label: String::new(),
            bucket: DueBucket::None,
            detail: String::new(),
        }
    }
}

pub fn today_local() -> NaiveDate {
    Local::now().date_naive()
}

/// Buckets a due date against `today`. Both sides are calendar dates, so the
/// day difference is exact.
pub fn classify(due_at: Option<NaiveDate>, today: NaiveDate) -> DueStatus {
    let Some(due) = due_at else {
        return DueStatus::none();
    };

    let diff_days = (due - today).num_days();
    match diff_days {
        d if d < 0 => DueStatus {
            label: "Overdue".to_string(),
            bucket: DueBucket::Overdue,
            detail: format!("{}d ago", -d),
        },
        0 => DueStatus {
            label: "Today".to_string(),
            bucket: DueBucket::Today,
            detail: "due today".to_string(),
        },
        1 => DueStatus {
            label: "Tomorrow".to_string(),
            bucket: DueBucket::Soon,
            detail: due.format("%Y-%m-%d").to_string(),
        },
        d => DueStatus {
            label: format!("In {d}d"),
            bucket: DueBucket::Soon,
            detail: due.format("%Y-%m-%d").to_string(),
        },
    }
}

/// Parses a due date typed on the command line.
///
/// Accepts `today`, `tomorrow`, `yesterday`, weekday names (the next
/// occurrence, today included), `+3d`, `in 3d`, `2w`, and `YYYY-MM-DD`.
#[tracing::instrument(skip(today))]
pub fn parse_due_input(input: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    let lower = input.trim().to_lowercase();

    match lower.as_str() {
        "" => return Err(anyhow!("due date cannot be empty")),
        "today" => return Ok(today),
        "tomorrow" => return Ok(today + Duration::days(1)),
        "yesterday" => return Ok(today - Duration::days(1)),
        _ => {}
    }

    if let Some(weekday) = parse_weekday_name(&lower) {
        return Ok(next_weekday_date(today, weekday));
    }

    let offset = lower
        .strip_prefix("in ")
        .or_else(|| lower.strip_prefix('+'))
        .unwrap_or(&lower)
        .trim();
    if let Some(days) = parse_offset_days(offset)? {
        return Duration::try_days(days)
            .and_then(|delta| today.checked_add_signed(delta))
            .ok_or_else(|| anyhow!("due date out of range: {input}"));
    }

    NaiveDate::parse_from_str(&lower, "%Y-%m-%d")
        .with_context(|| format!("unrecognized due date: {input}"))
}

fn parse_offset_days(token: &str) -> anyhow::Result<Option<i64>> {
    let (digits, per_unit) = if let Some(n) = token.strip_suffix('d') {
        (n, 1)
    } else if let Some(n) = token.strip_suffix('w') {
        (n, 7)
    } else {
        return Ok(None);
    };

    let digits = digits.trim();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Ok(None);
    }

    let count: i64 = digits
        .parse()
        .with_context(|| format!("invalid day offset: {token}"))?;
    count
        .checked_mul(per_unit)
        .map(Some)
        .ok_or_else(|| anyhow!("due date out of range: {token}"))
}

fn parse_weekday_name(value: &str) -> Option<Weekday> {
    match value {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

fn next_weekday_date(today: NaiveDate, target: Weekday) -> NaiveDate {
    let current = today.weekday().num_days_from_monday() as i64;
    let wanted = target.num_days_from_monday() as i64;
    today + Duration::days((wanted - current).rem_euclid(7))
}
