use std::fmt;
use std::str::FromStr;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  FixedOffset,
  Local,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::{
  Deserialize,
  Deserializer,
  Serialize,
  Serializer
};

const TIMEZONE_ENV_VAR: &str =
  "HABITUAL_TIMEZONE";
const KEY_FORMAT: &str = "%Y-%m-%d";

/// Canonical `YYYY-MM-DD` key for one
/// calendar day in the client's zone.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
)]
pub struct CalendarKey(NaiveDate);

impl CalendarKey {
  #[must_use]
  pub fn date(&self) -> NaiveDate {
    self.0
  }
}

impl fmt::Display for CalendarKey {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(
      f,
      "{}",
      self.0.format(KEY_FORMAT)
    )
  }
}

impl FromStr for CalendarKey {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    NaiveDate::parse_from_str(
      s.trim(),
      KEY_FORMAT
    )
    .map(Self)
    .with_context(|| {
      format!(
        "invalid calendar key: {s}"
      )
    })
  }
}

impl Serialize for CalendarKey {
  fn serialize<S>(
    &self,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de>
  for CalendarKey
{
  fn deserialize<D>(
    deserializer: D
  ) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    raw
      .parse()
      .map_err(serde::de::Error::custom)
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum WeekdayCode {
  Sun,
  Mon,
  Tue,
  Wed,
  Thu,
  Fri,
  Sat
}

impl WeekdayCode {
  pub const ALL: [WeekdayCode; 7] = [
    WeekdayCode::Sun,
    WeekdayCode::Mon,
    WeekdayCode::Tue,
    WeekdayCode::Wed,
    WeekdayCode::Thu,
    WeekdayCode::Fri,
    WeekdayCode::Sat
  ];

  #[must_use]
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Sun => "sun",
      | Self::Mon => "mon",
      | Self::Tue => "tue",
      | Self::Wed => "wed",
      | Self::Thu => "thu",
      | Self::Fri => "fri",
      | Self::Sat => "sat"
    }
  }

  /// Position counted from Sunday.
  #[must_use]
  pub fn index(self) -> usize {
    self as usize
  }

  #[must_use]
  pub fn from_chrono(
    day: Weekday
  ) -> Self {
    match day {
      | Weekday::Sun => Self::Sun,
      | Weekday::Mon => Self::Mon,
      | Weekday::Tue => Self::Tue,
      | Weekday::Wed => Self::Wed,
      | Weekday::Thu => Self::Thu,
      | Weekday::Fri => Self::Fri,
      | Weekday::Sat => Self::Sat
    }
  }
}

impl fmt::Display for WeekdayCode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for WeekdayCode {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    parse_weekday_name(
      &s.to_ascii_lowercase()
    )
    .map(Self::from_chrono)
    .ok_or_else(|| {
      anyhow!("unknown weekday: {s}")
    })
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum DayLabel {
  Today,
  Yesterday,
  Tomorrow,
  Date(NaiveDate)
}

impl fmt::Display for DayLabel {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Self::Today => {
        f.write_str("today")
      }
      | Self::Yesterday => {
        f.write_str("yesterday")
      }
      | Self::Tomorrow => {
        f.write_str("tomorrow")
      }
      | Self::Date(date) => {
        write!(
          f,
          "{}",
          date.format(KEY_FORMAT)
        )
      }
    }
  }
}

/// Key for the calendar day the instant
/// falls on in its own zone.
#[must_use]
pub fn calendar_key<Z: TimeZone>(
  instant: &DateTime<Z>
) -> CalendarKey {
  CalendarKey(instant.date_naive())
}

#[must_use]
pub fn weekday_code<Z: TimeZone>(
  instant: &DateTime<Z>
) -> WeekdayCode {
  WeekdayCode::from_chrono(
    instant.weekday()
  )
}

#[must_use]
pub fn label_for<Z: TimeZone>(
  instant: &DateTime<Z>,
  reference_now: &DateTime<Z>
) -> DayLabel {
  let day = instant.date_naive();
  let delta = day
    .signed_duration_since(
      reference_now.date_naive()
    )
    .num_days();

  match delta {
    | 0 => DayLabel::Today,
    | -1 => DayLabel::Yesterday,
    | 1 => DayLabel::Tomorrow,
    | _ => DayLabel::Date(day)
  }
}

/// Timezone the client renders
/// calendar days in.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum ClientZone {
  System,
  Named(Tz)
}

impl ClientZone {
  /// The env var wins over the
  /// configured id; both fall back to
  /// the system zone when unset or
  /// unparseable.
  #[must_use]
  pub fn resolve(
    configured: Option<&str>
  ) -> Self {
    if let Ok(raw) =
      std::env::var(TIMEZONE_ENV_VAR)
      && let Some(tz) = parse_timezone(
        &raw,
        TIMEZONE_ENV_VAR
      )
    {
      return Self::Named(tz);
    }

    if let Some(raw) = configured
      && let Some(tz) = parse_timezone(
        raw,
        "config:timezone"
      )
    {
      return Self::Named(tz);
    }

    tracing::debug!(
      "using system local timezone"
    );
    Self::System
  }

  #[must_use]
  pub fn localize(
    &self,
    instant: DateTime<Utc>
  ) -> DateTime<FixedOffset> {
    match self {
      | Self::System => {
        instant
          .with_timezone(&Local)
          .fixed_offset()
      }
      | Self::Named(tz) => {
        instant
          .with_timezone(tz)
          .fixed_offset()
      }
    }
  }

  #[must_use]
  pub fn calendar_key(
    &self,
    instant: DateTime<Utc>
  ) -> CalendarKey {
    calendar_key(
      &self.localize(instant)
    )
  }

  #[must_use]
  pub fn weekday_code(
    &self,
    instant: DateTime<Utc>
  ) -> WeekdayCode {
    weekday_code(
      &self.localize(instant)
    )
  }

  #[must_use]
  pub fn label_for(
    &self,
    instant: DateTime<Utc>,
    reference_now: DateTime<Utc>
  ) -> DayLabel {
    label_for(
      &self.localize(instant),
      &self.localize(reference_now)
    )
  }

  /// Moves by whole calendar days in
  /// this zone. The result is anchored
  /// at local noon so it never lands in
  /// a DST gap.
  pub fn shift_days(
    &self,
    instant: DateTime<Utc>,
    days: i64
  ) -> anyhow::Result<DateTime<Utc>> {
    let day = self
      .localize(instant)
      .date_naive()
      .checked_add_signed(
        Duration::days(days)
      )
      .ok_or_else(|| {
        anyhow!(
          "date out of range after \
           shifting {days} days"
        )
      })?;
    self.local_noon(day)
  }

  pub fn local_noon(
    &self,
    day: NaiveDate
  ) -> anyhow::Result<DateTime<Utc>> {
    let noon = day
      .and_hms_opt(12, 0, 0)
      .ok_or_else(|| {
        anyhow!(
          "failed to construct noon \
           for {day}"
        )
      })?;
    self.from_local(noon, "local-noon")
  }

  fn from_local(
    &self,
    local_naive: NaiveDateTime,
    context: &str
  ) -> anyhow::Result<DateTime<Utc>> {
    match self {
      | Self::System => {
        resolve_local(
          Local.from_local_datetime(
            &local_naive
          ),
          context
        )
      }
      | Self::Named(tz) => {
        resolve_local(
          tz.from_local_datetime(
            &local_naive
          ),
          context
        )
      }
    }
  }
}

impl fmt::Display for ClientZone {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Self::System => {
        f.write_str("system")
      }
      | Self::Named(tz) => {
        f.write_str(tz.name())
      }
    }
  }
}

fn resolve_local<Z: TimeZone>(
  result: LocalResult<DateTime<Z>>,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match result {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      Err(anyhow!(
        "local datetime does not \
         exist in client timezone: \
         {context}"
      ))
    }
  }
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured client timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Resolves a user supplied day
/// expression to an instant.
#[tracing::instrument(skip(now, zone), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>,
  zone: &ClientZone
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "now" | "today" => return Ok(now),
    | "yesterday" => {
      return zone.shift_days(now, -1);
    }
    | "tomorrow" => {
      return zone.shift_days(now, 1);
    }
    | _ => {}
  }

  if let Some(days) =
    parse_day_offset(token)
  {
    return zone.shift_days(now, days);
  }

  if let Some(target) =
    parse_weekday_name(&lower)
  {
    let today =
      zone.localize(now).date_naive();
    return zone.local_noon(
      next_weekday_date(today, target)
    );
  }

  if let Ok(key) =
    token.parse::<CalendarKey>()
  {
    return zone.local_noon(key.date());
  }

  Err(anyhow!(
    "unrecognized date expression \
     '{token}'. supported: now, \
     today, yesterday, tomorrow, \
     weekday names (e.g. monday), \
     +Nd/-Nd, YYYY-MM-DD"
  ))
}

fn parse_day_offset(
  token: &str
) -> Option<i64> {
  let offset_re = Regex::new(
    r"(?i)^(?P<sign>[+-])(?P<days>\d{1,5})d$"
  )
  .ok()?;
  let captures =
    offset_re.captures(token)?;
  let days = captures
    .name("days")?
    .as_str()
    .parse::<i64>()
    .ok()?;

  match captures.name("sign")?.as_str() {
    | "-" => Some(-days),
    | _ => Some(days)
  }
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}
