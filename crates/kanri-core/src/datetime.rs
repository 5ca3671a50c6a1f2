use std::path::Path;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow,
  bail
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

/// Views group tasks by the calendar day
/// of this zone unless overridden.
const FALLBACK_TZ: Tz =
  chrono_tz::Asia::Tokyo;
const TZ_ENV: &str = "KANRI_TIMEZONE";
const TZ_FILE: &str = "kanri-time.toml";

#[derive(Debug, Deserialize)]
struct TimeFile {
  timezone: String
}

/// The zone plan dates are bucketed in.
/// Resolved once per process.
pub fn project_timezone() -> &'static Tz
{
  static ZONE: OnceLock<Tz> =
    OnceLock::new();
  ZONE.get_or_init(|| {
    let from_env = std::env::var(TZ_ENV)
      .ok()
      .and_then(|raw| {
        zone_named(&raw, TZ_ENV)
      });
    from_env
      .or_else(|| {
        let dir =
          std::env::current_dir().ok()?;
        zone_from_file(&dir.join(TZ_FILE))
      })
      .unwrap_or(FALLBACK_TZ)
  })
}

fn zone_from_file(path: &Path) -> Option<Tz> {
  let raw = std::fs::read_to_string(path)
    .inspect_err(|err| {
      tracing::trace!(file = %path.display(), error = %err, "no timezone file");
    })
    .ok()?;
  match toml::from_str::<TimeFile>(&raw) {
    | Ok(file) => zone_named(
      &file.timezone,
      &path.display().to_string()
    ),
    | Err(err) => {
      tracing::warn!(file = %path.display(), error = %err, "ignoring malformed timezone file");
      None
    }
  }
}

fn zone_named(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let name = raw.trim();
  if name.is_empty() {
    return None;
  }
  name
    .parse::<Tz>()
    .inspect(|_| {
      tracing::debug!(source, timezone = name, "project timezone set");
    })
    .inspect_err(|err| {
      tracing::warn!(source, timezone = name, error = %err, "unknown timezone; ignored");
    })
    .ok()
}

#[must_use]
pub fn to_project_date(
  dt: DateTime<Utc>
) -> NaiveDate {
  dt.with_timezone(project_timezone())
    .date_naive()
}

#[must_use]
pub fn format_project_date(
  dt: DateTime<Utc>
) -> String {
  to_project_date(dt)
    .format("%Y-%m-%d")
    .to_string()
}

#[must_use]
pub fn project_today(
  now: DateTime<Utc>
) -> NaiveDate {
  to_project_date(now)
}

/// A project-local wall clock time as an
/// instant. Repeated hours resolve to the
/// earlier one; skipped hours are errors.
fn from_local(
  local: NaiveDateTime
) -> anyhow::Result<DateTime<Utc>> {
  project_timezone()
    .from_local_datetime(&local)
    .earliest()
    .map(|dt| dt.with_timezone(&Utc))
    .ok_or_else(|| {
      anyhow!("{local} does not exist in {}", project_timezone())
    })
}

/// Plan dates without a time land on the
/// first instant of that project day.
fn start_of_day(
  day: NaiveDate
) -> anyhow::Result<DateTime<Utc>> {
  let midnight = day.and_time(NaiveTime::MIN);
  from_local(midnight).or_else(|_| {
    // midnight skipped by a DST jump
    from_local(midnight + Duration::hours(1))
  })
}

/// The next `target` strictly after `from`.
fn next_weekday(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let ahead = (target.num_days_from_monday()
    + 6
    - from.weekday().num_days_from_monday())
    % 7
    + 1;
  from + Duration::days(i64::from(ahead))
}

/// `+3d`, `-2w` style day offsets.
fn day_offset(
  token: &str
) -> anyhow::Result<Option<i64>> {
  let re =
    Regex::new(r"^([+-])(\d{1,4})([dw])$")
      .context("offset pattern")?;
  let Some(caps) = re.captures(token) else {
    return Ok(None);
  };
  let n: i64 = caps[2]
    .parse()
    .context("offset amount")?;
  let days =
    if &caps[3] == "w" { n * 7 } else { n };
  Ok(Some(if &caps[1] == "-" {
    -days
  } else {
    days
  }))
}

/// Reads a plan date given on the command
/// line. Day forms mean the start of that
/// day in the project timezone.
#[tracing::instrument(skip(now))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower = token.to_ascii_lowercase();
  let today = project_today(now);

  let day = match lower.as_str() {
    | "" => bail!("empty date"),
    | "now" => return Ok(now),
    | "today" => Some(today),
    | "tomorrow" => {
      Some(today + Duration::days(1))
    }
    | "yesterday" => {
      Some(today - Duration::days(1))
    }
    | other => match other.parse::<Weekday>()
    {
      | Ok(weekday) => {
        Some(next_weekday(today, weekday))
      }
      | Err(_) => day_offset(other)?
        .map(|days| {
          today + Duration::days(days)
        })
    }
  };
  if let Some(day) = day {
    return start_of_day(day);
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }
  if let Ok(day) =
    NaiveDate::parse_from_str(token, "%Y-%m-%d")
  {
    return start_of_day(day);
  }
  ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
    .iter()
    .find_map(|fmt| {
      NaiveDateTime::parse_from_str(token, fmt)
        .ok()
    })
    .map(from_local)
    .unwrap_or_else(|| {
      Err(anyhow!(
        "cannot read {input:?} as a date; \
         try today, tomorrow, friday, +3d, \
         -1w, 2026-05-01 or \
         2026-05-01 09:30"
      ))
    })
}
