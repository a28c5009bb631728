//! Reference-time layouts and duration strings
//!
//! Dates are formatted and parsed with layouts written against the
//! reference time `Mon Jan 2 15:04:05 MST 2006`, and durations use the
//! `1h2m3.5s` notation. Both are what operators write in source configs.

use crate::error::{Error, Result};
use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone,
    Timelike, Utc,
};

/// Layout used when rendering a time value directly
pub const DISPLAY_LAYOUT: &str = "2006-01-02 15:04:05.999999999 -0700 MST";

/// Default layout for `parseDate` and `formatDate`
pub const RFC3339: &str = "2006-01-02T15:04:05Z07:00";

/// Resolve a named layout (`RFC3339`, `UnixDate`, ...) or return the input unchanged
pub fn named_layout(name: &str) -> &str {
    match name {
        "Layout" => "01/02 03:04:05PM '06 -0700",
        "ANSIC" => "Mon Jan _2 15:04:05 2006",
        "UnixDate" => "Mon Jan _2 15:04:05 MST 2006",
        "RubyDate" => "Mon Jan 02 15:04:05 -0700 2006",
        "RFC822" => "02 Jan 06 15:04 MST",
        "RFC822Z" => "02 Jan 06 15:04 -0700",
        "RFC850" => "Monday, 02-Jan-06 15:04:05 MST",
        "RFC1123" => "Mon, 02 Jan 2006 15:04:05 MST",
        "RFC1123Z" => "Mon, 02 Jan 2006 15:04:05 -0700",
        "RFC3339" => RFC3339,
        "RFC3339Nano" => "2006-01-02T15:04:05.999999999Z07:00",
        "Kitchen" => "3:04PM",
        "Stamp" => "Jan _2 15:04:05",
        "StampMilli" => "Jan _2 15:04:05.000",
        "StampMicro" => "Jan _2 15:04:05.000000",
        "StampNano" => "Jan _2 15:04:05.000000000",
        "DateTime" => "2006-01-02 15:04:05",
        "DateOnly" => "2006-01-02",
        "TimeOnly" => "15:04:05",
        other => other,
    }
}

// ============================================================================
// Time value
// ============================================================================

/// A point in time together with the zone abbreviation it is displayed in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Time {
    pub at: DateTime<FixedOffset>,
    pub zone: String,
}

impl Time {
    /// A UTC time
    pub fn utc(at: DateTime<Utc>) -> Self {
        Self {
            at: at.fixed_offset(),
            zone: "UTC".to_string(),
        }
    }

    /// Convert to UTC keeping the instant
    pub fn to_utc(&self) -> Self {
        Self::utc(self.at.with_timezone(&Utc))
    }

    /// Display the time in a zone: a `-0700` style offset or an IANA name.
    /// Returns `None` for an unknown zone.
    pub fn in_zone(&self, zone: &str) -> Option<Self> {
        match resolve_zone(zone)? {
            Zone::Fixed(offset) => Some(Self {
                at: self.at.with_timezone(&offset),
                zone: format_offset(offset.local_minus_utc(), false, false),
            }),
            Zone::Named(tz) => {
                let local = self.at.with_timezone(&tz);
                Some(Self {
                    at: local.fixed_offset(),
                    zone: local.format("%Z").to_string(),
                })
            }
        }
    }

    /// Add a duration expressed in nanoseconds
    pub fn add_nanos(&self, nanos: i64) -> Self {
        Self {
            at: self.at + chrono::Duration::nanoseconds(nanos),
            zone: self.zone.clone(),
        }
    }

    /// Format with a reference-time layout
    pub fn format(&self, layout: &str) -> String {
        format_time(self, layout)
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_time(self, DISPLAY_LAYOUT))
    }
}

enum Zone {
    Fixed(FixedOffset),
    Named(chrono_tz::Tz),
}

fn resolve_zone(zone: &str) -> Option<Zone> {
    if zone.eq_ignore_ascii_case("utc") {
        return Some(Zone::Fixed(Utc.fix()));
    }
    if let Some(offset) = parse_offset_literal(zone) {
        return Some(Zone::Fixed(offset));
    }
    zone.parse::<chrono_tz::Tz>().ok().map(Zone::Named)
}

fn parse_offset_literal(zone: &str) -> Option<FixedOffset> {
    let bytes = zone.as_bytes();
    if bytes.len() < 3 || !(bytes[0] == b'+' || bytes[0] == b'-') {
        return None;
    }
    let digits: String = zone[1..].chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) || !(digits.len() == 2 || digits.len() == 4) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = if digits.len() == 4 {
        digits[2..].parse().ok()?
    } else {
        0
    };
    let secs = hours * 3600 + minutes * 60;
    if bytes[0] == b'-' {
        FixedOffset::west_opt(secs)
    } else {
        FixedOffset::east_opt(secs)
    }
}

/// Reinterpret the wall clock of `t` as local time in `zone`, then return it as UTC.
/// An unknown zone leaves the instant unchanged.
pub fn wall_clock_in_zone(t: &Time, zone: &str) -> Time {
    let naive = t.at.naive_local();
    let at = match resolve_zone(zone) {
        Some(Zone::Fixed(offset)) => offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc)),
        Some(Zone::Named(tz)) => tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
        None => None,
    };
    match at {
        Some(at) => Time::utc(at),
        None => t.to_utc(),
    }
}

// ============================================================================
// Layout tokens
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Chunk {
    Lit(String),
    LongMonth,
    Month,
    NumMonth,
    ZeroMonth,
    LongWeekDay,
    WeekDay,
    Day,
    UnderDay,
    ZeroDay,
    YearDay,
    Hour,
    Hour12,
    ZeroHour12,
    Minute,
    ZeroMinute,
    Second,
    ZeroSecond,
    LongYear,
    Year,
    PM,
    Pm,
    TzName,
    /// `colon`, `z` (print Z for UTC), `seconds`, `short` (hours only)
    Offset {
        colon: bool,
        z: bool,
        seconds: bool,
        short: bool,
    },
    /// Fraction with a fixed number of digits (`.000`)
    FracFixed(usize),
    /// Fraction with trailing zeros trimmed (`.999`)
    FracTrim(usize),
}

fn tokenize(layout: &str) -> Vec<Chunk> {
    const PATTERNS: &[(&str, fn() -> Chunk)] = &[
        ("January", || Chunk::LongMonth),
        ("Jan", || Chunk::Month),
        ("Monday", || Chunk::LongWeekDay),
        ("Mon", || Chunk::WeekDay),
        ("MST", || Chunk::TzName),
        ("2006", || Chunk::LongYear),
        ("002", || Chunk::YearDay),
        ("01", || Chunk::ZeroMonth),
        ("02", || Chunk::ZeroDay),
        ("03", || Chunk::ZeroHour12),
        ("04", || Chunk::ZeroMinute),
        ("05", || Chunk::ZeroSecond),
        ("06", || Chunk::Year),
        ("15", || Chunk::Hour),
        ("_2", || Chunk::UnderDay),
        ("PM", || Chunk::PM),
        ("pm", || Chunk::Pm),
        ("Z07:00:00", || Chunk::Offset {
            colon: true,
            z: true,
            seconds: true,
            short: false,
        }),
        ("-07:00:00", || Chunk::Offset {
            colon: true,
            z: false,
            seconds: true,
            short: false,
        }),
        ("Z070000", || Chunk::Offset {
            colon: false,
            z: true,
            seconds: true,
            short: false,
        }),
        ("-070000", || Chunk::Offset {
            colon: false,
            z: false,
            seconds: true,
            short: false,
        }),
        ("Z07:00", || Chunk::Offset {
            colon: true,
            z: true,
            seconds: false,
            short: false,
        }),
        ("-07:00", || Chunk::Offset {
            colon: true,
            z: false,
            seconds: false,
            short: false,
        }),
        ("Z0700", || Chunk::Offset {
            colon: false,
            z: true,
            seconds: false,
            short: false,
        }),
        ("-0700", || Chunk::Offset {
            colon: false,
            z: false,
            seconds: false,
            short: false,
        }),
        ("Z07", || Chunk::Offset {
            colon: false,
            z: true,
            seconds: false,
            short: true,
        }),
        ("-07", || Chunk::Offset {
            colon: false,
            z: false,
            seconds: false,
            short: true,
        }),
        ("1", || Chunk::NumMonth),
        ("2", || Chunk::Day),
        ("3", || Chunk::Hour12),
        ("4", || Chunk::Minute),
        ("5", || Chunk::Second),
    ];

    let mut chunks = Vec::new();
    let mut lit = String::new();
    let mut rest = layout;

    'outer: while !rest.is_empty() {
        // fractional seconds: '.' or ',' followed by a run of 0s or 9s not followed by a digit
        if rest.starts_with('.') || rest.starts_with(',') {
            let tail = &rest[1..];
            if let Some(first) = tail.chars().next() {
                if first == '0' || first == '9' {
                    let run = tail.chars().take_while(|c| *c == first).count();
                    let next_is_digit = tail[run..].chars().next().is_some_and(|c| c.is_ascii_digit());
                    if !next_is_digit {
                        if !lit.is_empty() {
                            chunks.push(Chunk::Lit(std::mem::take(&mut lit)));
                        }
                        chunks.push(if first == '0' {
                            Chunk::FracFixed(run)
                        } else {
                            Chunk::FracTrim(run)
                        });
                        rest = &tail[run..];
                        continue;
                    }
                }
            }
        }
        for (pattern, make) in PATTERNS {
            if let Some(after) = rest.strip_prefix(pattern) {
                if !lit.is_empty() {
                    chunks.push(Chunk::Lit(std::mem::take(&mut lit)));
                }
                chunks.push(make());
                rest = after;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            lit.push(c);
        }
        rest = chars.as_str();
    }
    if !lit.is_empty() {
        chunks.push(Chunk::Lit(lit));
    }
    chunks
}

// ============================================================================
// Formatting
// ============================================================================

const LONG_MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const LONG_DAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

fn format_offset(secs: i32, colon: bool, seconds: bool) -> String {
    let sign = if secs < 0 { '-' } else { '+' };
    let abs = secs.abs();
    let (h, m, s) = (abs / 3600, (abs / 60) % 60, abs % 60);
    let sep = if colon { ":" } else { "" };
    let mut out = format!("{sign}{h:02}{sep}{m:02}");
    if seconds {
        out.push_str(&format!("{sep}{s:02}"));
    }
    out
}

fn format_time(t: &Time, layout: &str) -> String {
    let at = &t.at;
    let mut out = String::new();
    for chunk in tokenize(layout) {
        match chunk {
            Chunk::Lit(s) => out.push_str(&s),
            Chunk::LongMonth => out.push_str(LONG_MONTHS[at.month0() as usize]),
            Chunk::Month => out.push_str(&LONG_MONTHS[at.month0() as usize][..3]),
            Chunk::NumMonth => out.push_str(&at.month().to_string()),
            Chunk::ZeroMonth => out.push_str(&format!("{:02}", at.month())),
            Chunk::LongWeekDay => {
                out.push_str(LONG_DAYS[at.weekday().num_days_from_monday() as usize]);
            }
            Chunk::WeekDay => {
                out.push_str(&LONG_DAYS[at.weekday().num_days_from_monday() as usize][..3]);
            }
            Chunk::Day => out.push_str(&at.day().to_string()),
            Chunk::UnderDay => out.push_str(&format!("{:>2}", at.day())),
            Chunk::ZeroDay => out.push_str(&format!("{:02}", at.day())),
            Chunk::YearDay => out.push_str(&format!("{:03}", at.ordinal())),
            Chunk::Hour => out.push_str(&format!("{:02}", at.hour())),
            Chunk::Hour12 => out.push_str(&at.hour12().1.to_string()),
            Chunk::ZeroHour12 => out.push_str(&format!("{:02}", at.hour12().1)),
            Chunk::Minute => out.push_str(&at.minute().to_string()),
            Chunk::ZeroMinute => out.push_str(&format!("{:02}", at.minute())),
            Chunk::Second => out.push_str(&at.second().to_string()),
            Chunk::ZeroSecond => out.push_str(&format!("{:02}", at.second())),
            Chunk::LongYear => out.push_str(&format!("{:04}", at.year())),
            Chunk::Year => out.push_str(&format!("{:02}", at.year().rem_euclid(100))),
            Chunk::PM => out.push_str(if at.hour() >= 12 { "PM" } else { "AM" }),
            Chunk::Pm => out.push_str(if at.hour() >= 12 { "pm" } else { "am" }),
            Chunk::TzName => {
                if t.zone.is_empty() {
                    out.push_str(&format_offset(at.offset().local_minus_utc(), false, false));
                } else {
                    out.push_str(&t.zone);
                }
            }
            Chunk::Offset {
                colon,
                z,
                seconds,
                short,
            } => {
                let secs = at.offset().local_minus_utc();
                if z && secs == 0 {
                    out.push('Z');
                } else if short {
                    let sign = if secs < 0 { '-' } else { '+' };
                    out.push_str(&format!("{sign}{:02}", secs.abs() / 3600));
                } else {
                    out.push_str(&format_offset(secs, colon, seconds));
                }
            }
            Chunk::FracFixed(n) => {
                let nanos = format!("{:09}", at.nanosecond() % 1_000_000_000);
                out.push('.');
                out.push_str(&nanos[..n.min(9)]);
            }
            Chunk::FracTrim(n) => {
                let nanos = format!("{:09}", at.nanosecond() % 1_000_000_000);
                let digits = nanos[..n.min(9)].trim_end_matches('0');
                if !digits.is_empty() {
                    out.push('.');
                    out.push_str(digits);
                }
            }
        }
    }
    out
}

// ============================================================================
// Parsing
// ============================================================================

#[derive(Default)]
struct Fields {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    yday: Option<u32>,
    hour: u32,
    minute: u32,
    second: u32,
    nanos: u32,
    pm: Option<bool>,
    offset: Option<i32>,
    zone: Option<String>,
}

struct Cursor<'a> {
    input: &'a str,
    layout: &'a str,
}

impl<'a> Cursor<'a> {
    fn err(&self, what: &str) -> Error {
        Error::template(format!(
            "parsing time {:?} as {:?}: cannot parse {:?} as {what}",
            self.input, self.layout, self.input
        ))
    }
}

fn take_digits<'a>(s: &'a str, min: usize, max: usize) -> Option<(u32, &'a str)> {
    let n = s.chars().take(max).take_while(char::is_ascii_digit).count();
    if n < min {
        return None;
    }
    let value = s[..n].parse().ok()?;
    Some((value, &s[n..]))
}

fn take_name<'a>(s: &'a str, names: &[&str], len: Option<usize>) -> Option<(u32, &'a str)> {
    for (i, name) in names.iter().enumerate() {
        let candidate = match len {
            Some(n) => &name[..n],
            None => name,
        };
        if let Some(head) = s.get(..candidate.len()) {
            if head.eq_ignore_ascii_case(candidate) {
                return Some((i as u32, &s[candidate.len()..]));
            }
        }
    }
    None
}

/// Parse `input` with a reference-time layout
pub fn parse_time(layout: &str, input: &str) -> Result<Time> {
    let cur = Cursor { input, layout };
    let mut f = Fields::default();
    let mut s = input;

    for chunk in tokenize(layout) {
        match chunk {
            Chunk::Lit(lit) => {
                s = s.strip_prefix(lit.as_str()).ok_or_else(|| cur.err(&lit))?;
            }
            Chunk::LongMonth => {
                let (m, rest) = take_name(s, &LONG_MONTHS, None).ok_or_else(|| cur.err("January"))?;
                f.month = Some(m + 1);
                s = rest;
            }
            Chunk::Month => {
                let (m, rest) = take_name(s, &LONG_MONTHS, Some(3)).ok_or_else(|| cur.err("Jan"))?;
                f.month = Some(m + 1);
                s = rest;
            }
            Chunk::LongWeekDay => {
                let (_, rest) = take_name(s, &LONG_DAYS, None).ok_or_else(|| cur.err("Monday"))?;
                s = rest;
            }
            Chunk::WeekDay => {
                let (_, rest) = take_name(s, &LONG_DAYS, Some(3)).ok_or_else(|| cur.err("Mon"))?;
                s = rest;
            }
            Chunk::NumMonth | Chunk::ZeroMonth => {
                let min = if chunk == Chunk::ZeroMonth { 2 } else { 1 };
                let (m, rest) = take_digits(s, min, 2).ok_or_else(|| cur.err("01"))?;
                f.month = Some(m);
                s = rest;
            }
            Chunk::Day | Chunk::ZeroDay | Chunk::UnderDay => {
                if chunk == Chunk::UnderDay {
                    s = s.strip_prefix(' ').unwrap_or(s);
                }
                let min = if chunk == Chunk::ZeroDay { 2 } else { 1 };
                let (d, rest) = take_digits(s, min, 2).ok_or_else(|| cur.err("02"))?;
                f.day = Some(d);
                s = rest;
            }
            Chunk::YearDay => {
                let (d, rest) = take_digits(s, 3, 3).ok_or_else(|| cur.err("002"))?;
                f.yday = Some(d);
                s = rest;
            }
            Chunk::Hour => {
                let (h, rest) = take_digits(s, 2, 2).ok_or_else(|| cur.err("15"))?;
                f.hour = h;
                s = rest;
            }
            Chunk::Hour12 | Chunk::ZeroHour12 => {
                let min = if chunk == Chunk::ZeroHour12 { 2 } else { 1 };
                let (h, rest) = take_digits(s, min, 2).ok_or_else(|| cur.err("03"))?;
                f.hour = h;
                s = rest;
            }
            Chunk::Minute | Chunk::ZeroMinute => {
                let min = if chunk == Chunk::ZeroMinute { 2 } else { 1 };
                let (m, rest) = take_digits(s, min, 2).ok_or_else(|| cur.err("04"))?;
                f.minute = m;
                s = rest;
            }
            Chunk::Second | Chunk::ZeroSecond => {
                let min = if chunk == Chunk::ZeroSecond { 2 } else { 1 };
                let (sec, rest) = take_digits(s, min, 2).ok_or_else(|| cur.err("05"))?;
                f.second = sec;
                s = rest;
                // a fraction may follow seconds even when the layout has none
                if let Some(frac) = s.strip_prefix('.') {
                    if frac.starts_with(|c: char| c.is_ascii_digit())
                        && !layout_has_fraction(layout)
                    {
                        let (nanos, rest) = take_fraction(frac);
                        f.nanos = nanos;
                        s = rest;
                    }
                }
            }
            Chunk::LongYear => {
                let (y, rest) = take_digits(s, 4, 4).ok_or_else(|| cur.err("2006"))?;
                f.year = Some(y as i32);
                s = rest;
            }
            Chunk::Year => {
                let (y, rest) = take_digits(s, 2, 2).ok_or_else(|| cur.err("06"))?;
                let y = y as i32;
                f.year = Some(if y >= 69 { 1900 + y } else { 2000 + y });
                s = rest;
            }
            Chunk::PM | Chunk::Pm => {
                let word = s.get(..2).ok_or_else(|| cur.err("PM"))?;
                f.pm = match word.to_ascii_uppercase().as_str() {
                    "PM" => Some(true),
                    "AM" => Some(false),
                    _ => return Err(cur.err("PM")),
                };
                s = &s[2..];
            }
            Chunk::TzName => {
                let n = s.chars().take_while(char::is_ascii_uppercase).count();
                if n < 3 {
                    return Err(cur.err("MST"));
                }
                f.zone = Some(s[..n].to_string());
                s = &s[n..];
            }
            Chunk::Offset {
                colon,
                z,
                seconds,
                short,
            } => {
                if z && s.starts_with('Z') {
                    f.offset = Some(0);
                    s = &s[1..];
                    continue;
                }
                let sign = match s.chars().next() {
                    Some('+') => 1,
                    Some('-') => -1,
                    _ => return Err(cur.err("-0700")),
                };
                let mut rest = &s[1..];
                let (h, r) = take_digits(rest, 2, 2).ok_or_else(|| cur.err("-0700"))?;
                rest = r;
                let mut m = 0;
                let mut sec = 0;
                if !short {
                    if colon {
                        rest = rest.strip_prefix(':').ok_or_else(|| cur.err("-07:00"))?;
                    }
                    let (mm, r) = take_digits(rest, 2, 2).ok_or_else(|| cur.err("-0700"))?;
                    m = mm;
                    rest = r;
                    if seconds {
                        if colon {
                            rest = rest.strip_prefix(':').ok_or_else(|| cur.err("-07:00:00"))?;
                        }
                        let (ss, r) = take_digits(rest, 2, 2).ok_or_else(|| cur.err("-070000"))?;
                        sec = ss;
                        rest = r;
                    }
                }
                f.offset = Some(sign * (h as i32 * 3600 + m as i32 * 60 + sec as i32));
                s = rest;
            }
            Chunk::FracFixed(n) | Chunk::FracTrim(n) => {
                match s.strip_prefix('.').or_else(|| s.strip_prefix(',')) {
                    Some(frac) => {
                        let (nanos, rest) = take_fraction(frac);
                        if matches!(chunk, Chunk::FracFixed(_)) && frac.len() - rest.len() != n {
                            return Err(cur.err("fraction"));
                        }
                        f.nanos = nanos;
                        s = rest;
                    }
                    None if matches!(chunk, Chunk::FracTrim(_)) => {}
                    None => return Err(cur.err("fraction")),
                }
            }
        }
    }

    if !s.is_empty() {
        return Err(Error::template(format!(
            "parsing time {input:?}: extra text: {s:?}"
        )));
    }

    build_time(&f).ok_or_else(|| Error::template(format!("parsing time {input:?}: day out of range")))
}

fn layout_has_fraction(layout: &str) -> bool {
    tokenize(layout)
        .iter()
        .any(|c| matches!(c, Chunk::FracFixed(_) | Chunk::FracTrim(_)))
}

fn take_fraction(s: &str) -> (u32, &str) {
    let n = s.chars().take_while(char::is_ascii_digit).count();
    let digits = &s[..n];
    let mut padded: String = digits.chars().take(9).collect();
    while padded.len() < 9 {
        padded.push('0');
    }
    (padded.parse().unwrap_or(0), &s[n..])
}

fn build_time(f: &Fields) -> Option<Time> {
    let year = f.year.unwrap_or(0);
    let date = match (f.yday, f.month, f.day) {
        (Some(yday), None, None) => NaiveDate::from_yo_opt(year, yday)?,
        _ => NaiveDate::from_ymd_opt(year, f.month.unwrap_or(1), f.day.unwrap_or(1))?,
    };
    let mut hour = f.hour;
    match f.pm {
        Some(true) if hour < 12 => hour += 12,
        Some(false) if hour == 12 => hour = 0,
        _ => {}
    }
    let time = NaiveTime::from_hms_nano_opt(hour, f.minute, f.second, f.nanos)?;
    let naive = NaiveDateTime::new(date, time);

    let (offset, zone) = match (&f.offset, &f.zone) {
        (Some(secs), _) => {
            let zone = if *secs == 0 {
                "UTC".to_string()
            } else {
                format_offset(*secs, false, false)
            };
            (FixedOffset::east_opt(*secs)?, zone)
        }
        // unknown abbreviations are taken as UTC with the given name
        (None, Some(name)) => (Utc.fix(), name.clone()),
        (None, None) => (Utc.fix(), "UTC".to_string()),
    };
    let at = offset.from_local_datetime(&naive).single()?;
    Some(Time { at, zone })
}

// ============================================================================
// Durations
// ============================================================================

/// Parse a duration such as `-1h30m` or `250ms` into nanoseconds
pub fn parse_duration(input: &str) -> Result<i64> {
    let invalid = || Error::template(format!("time: invalid duration {input:?}"));
    let mut s = input;
    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }
    if s == "0" {
        return Ok(0);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total: f64 = 0.0;
    while !s.is_empty() {
        let n = s
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .count();
        if n == 0 {
            return Err(invalid());
        }
        let number: f64 = s[..n].parse().map_err(|_| invalid())?;
        s = &s[n..];
        let unit_len = s
            .chars()
            .take_while(|c| !(c.is_ascii_digit() || *c == '.'))
            .map(char::len_utf8)
            .sum::<usize>();
        let unit = &s[..unit_len];
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        total += number * scale;
        s = &s[unit_len..];
    }
    if total > i64::MAX as f64 {
        return Err(invalid());
    }
    let nanos = total.round() as i64;
    Ok(if negative { -nanos } else { nanos })
}

/// Render nanoseconds as `1h0m0s`
pub fn format_duration(nanos: i64) -> String {
    if nanos == 0 {
        return "0s".to_string();
    }
    let sign = if nanos < 0 { "-" } else { "" };
    let u = nanos.unsigned_abs();

    if u < 1_000_000_000 {
        if u < 1_000 {
            return format!("{sign}{u}ns");
        }
        let (unit, digits) = if u < 1_000_000 { ("µs", 3) } else { ("ms", 6) };
        return format!("{sign}{}{unit}", fraction_string(u, digits));
    }

    let secs = u / 1_000_000_000;
    let frac = u % 1_000_000_000;
    let hours = secs / 3600;
    let minutes = (secs / 60) % 60;
    let seconds = fraction_string(secs % 60 * 1_000_000_000 + frac, 9);

    if hours > 0 {
        format!("{sign}{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{sign}{minutes}m{seconds}s")
    } else {
        format!("{sign}{seconds}s")
    }
}

/// `value` scaled down by `10^digits`, trailing zeros trimmed
fn fraction_string(value: u64, digits: u32) -> String {
    let scale = 10u64.pow(digits);
    let whole = value / scale;
    let frac = value % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = digits as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn reference() -> Time {
        Time::utc(Utc.timestamp_opt(1_604_582_732, 0).unwrap())
    }

    #[test_case("-1h", "-1h0m0s")]
    #[test_case("1h30m", "1h30m0s")]
    #[test_case("90s", "1m30s")]
    #[test_case("1.5s", "1.5s")]
    #[test_case("250ms", "250ms")]
    #[test_case("0", "0s")]
    fn test_duration_round_trip(input: &str, expected: &str) {
        assert_eq!(format_duration(parse_duration(input).unwrap()), expected);
    }

    #[test]
    fn test_invalid_duration() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("1x").is_err());
        assert!(parse_duration("h").is_err());
    }

    #[test]
    fn test_display_layout() {
        assert_eq!(reference().to_string(), "2020-11-05 13:25:32 +0000 UTC");
    }

    #[test]
    fn test_named_layouts() {
        let t = reference();
        assert_eq!(t.format(named_layout("RFC3339")), "2020-11-05T13:25:32Z");
        assert_eq!(
            t.format(named_layout("UnixDate")),
            "Thu Nov  5 13:25:32 UTC 2020"
        );
        assert_eq!(
            t.format(named_layout("RFC1123")),
            "Thu, 05 Nov 2020 13:25:32 UTC"
        );
        assert_eq!(t.format(named_layout("Kitchen")), "1:25PM");
    }

    #[test]
    fn test_format_in_named_zone() {
        let t = reference().in_zone("America/New_York").unwrap();
        assert_eq!(
            t.format(named_layout("UnixDate")),
            "Thu Nov  5 08:25:32 EST 2020"
        );
        assert!(reference().in_zone("wrong/tz").is_none());
    }

    #[test]
    fn test_parse_rfc3339_nano() {
        let t = parse_time(named_layout("RFC3339Nano"), "2020-11-05T12:25:32.1234567Z").unwrap();
        assert_eq!(t.to_string(), "2020-11-05 12:25:32.1234567 +0000 UTC");
    }

    #[test]
    fn test_parse_custom_layout() {
        let t = parse_time(
            "Mon Jan _2 15:04:05 -0700 2006",
            "Thu Nov  5 12:25:32 +0000 2020",
        )
        .unwrap();
        assert_eq!(t.to_utc().to_string(), "2020-11-05 12:25:32 +0000 UTC");
    }

    #[test]
    fn test_parse_with_offset() {
        let t = parse_time(RFC3339, "2020-11-05T12:25:32+04:00").unwrap();
        assert_eq!(t.to_utc().to_string(), "2020-11-05 08:25:32 +0000 UTC");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_time(RFC3339, "yesterday").is_err());
        assert!(parse_time(RFC3339, "2020-11-05T12:25:32Zjunk").is_err());
    }

    #[test]
    fn test_wall_clock_in_zone() {
        let t = parse_time(RFC3339, "2020-11-05T12:25:32Z").unwrap();
        assert_eq!(
            wall_clock_in_zone(&t, "-0700").to_string(),
            "2020-11-05 19:25:32 +0000 UTC"
        );
        assert_eq!(
            wall_clock_in_zone(&t, "America/New_York").to_string(),
            "2020-11-05 17:25:32 +0000 UTC"
        );
        assert_eq!(
            wall_clock_in_zone(&t, "Invalid/Timezone").to_string(),
            "2020-11-05 12:25:32 +0000 UTC"
        );
    }
}
