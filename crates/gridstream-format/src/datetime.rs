use serde::{Deserialize, Serialize};

/// Excel workbook date system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateSystem {
    /// 1900 date system (Windows), including the Lotus 1-2-3 leap-year bug
    /// where the non-existent `1900-02-29` occupies serial day 60.
    #[default]
    V1900,
    /// 1904 date system (Mac). Serial day 0 is `1904-01-01`.
    V1904,
}

/// A civil date-time tuple.
///
/// The representation is deliberately wider than the real calendar so it can
/// carry the two fictitious values Excel's 1900 system produces: serial 60
/// reports as `1900-02-29` and serial 0 reports a day-of-month of `0`. Both
/// arise from a presentation-only day adjustment; the underlying instant is
/// never moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CivilDateTime {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millisecond: u16,
}

impl CivilDateTime {
    pub const fn new(year: i32, month: u8, day: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour: 0,
            minute: 0,
            second: 0,
            millisecond: 0,
        }
    }

    pub const fn with_time(mut self, hour: u8, minute: u8, second: u8, millisecond: u16) -> Self {
        self.hour = hour;
        self.minute = minute;
        self.second = second;
        self.millisecond = millisecond;
        self
    }
}

impl std::fmt::Display for CivilDateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )?;
        if self.millisecond != 0 {
            write!(f, ".{:03}", self.millisecond)?;
        }
        Ok(())
    }
}

/// An elapsed-time value produced by duration formats such as `[h]:mm:ss`.
///
/// Stored as signed milliseconds; the serial it came from counts fractional
/// days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExcelDuration {
    millis: i64,
}

impl ExcelDuration {
    pub const fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    pub const fn as_millis(self) -> i64 {
        self.millis
    }

    /// Whole days component.
    pub const fn days(self) -> i64 {
        self.millis / MS_PER_DAY
    }

    /// Hour component, `0..24`.
    pub const fn hours(self) -> i64 {
        (self.millis / MS_PER_HOUR) % 24
    }

    /// Minute component, `0..60`.
    pub const fn minutes(self) -> i64 {
        (self.millis / MS_PER_MINUTE) % 60
    }

    /// Second component, `0..60`.
    pub const fn seconds(self) -> i64 {
        (self.millis / 1000) % 60
    }

    pub fn total_days(self) -> f64 {
        self.millis as f64 / MS_PER_DAY as f64
    }
}

const MS_PER_DAY: i64 = 86_400_000;
const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_MINUTE: i64 = 60_000;

/// Days from the 1904 epoch (`1904-01-01`) back to the OLE epoch
/// (`1899-12-30`).
const DAYS_1899_TO_1904: i64 = 1462;

/// Convert an OLE automation serial to milliseconds relative to the OLE epoch
/// (`1899-12-30 00:00`), rounding half away from zero.
///
/// OLE encodes instants before the epoch as "negative days, positive time of
/// day": `-1.25` is one day before the epoch at 06:00. The fold below turns
/// the plain numeric value into that convention.
fn serial_to_epoch_millis(serial: f64) -> i64 {
    let scaled = serial * MS_PER_DAY as f64;
    let mut millis = if scaled >= 0.0 {
        (scaled + 0.5).floor() as i64
    } else {
        (scaled - 0.5).ceil() as i64
    };
    if millis < 0 {
        millis -= (millis % MS_PER_DAY) * 2;
    }
    millis
}

/// Convert an OLE automation serial into a civil date-time.
///
/// In 1900 mode the result mirrors what Excel displays, which needs two
/// corrections around the epoch:
///
/// | epoch day offset | day shift | reported-day adjust |
/// |---|---|---|
/// | `< 0`  | +2 | 0  |
/// | `0`    | +2 | -1 |
/// | `1-59` | +1 | 0  |
/// | `60`   | 0  | +1 |
/// | `>= 61`| 0  | 0  |
///
/// The reported-day adjust applies to the day-of-month component only, which
/// is how serial 60 surfaces as `1900-02-29` and serial 0 as day `0` without
/// the underlying instant moving.
pub fn serial_to_datetime(serial: f64, system: DateSystem) -> CivilDateTime {
    let millis = serial_to_epoch_millis(serial);
    let epoch_day = millis.div_euclid(MS_PER_DAY);
    let ms_of_day = millis.rem_euclid(MS_PER_DAY);

    let (day_shift, reported_day_adjust) = match system {
        DateSystem::V1904 => (DAYS_1899_TO_1904, 0),
        DateSystem::V1900 => match epoch_day {
            d if d < 0 => (2, 0),
            0 => (2, -1),
            1..=59 => (1, 0),
            60 => (0, 1),
            _ => (0, 0),
        },
    };

    let absolute_day = days_from_civil(1899, 12, 30) + epoch_day + day_shift;
    let (year, month, day) = civil_from_days(absolute_day);

    let hour = (ms_of_day / MS_PER_HOUR) as u8;
    let minute = ((ms_of_day / MS_PER_MINUTE) % 60) as u8;
    let second = ((ms_of_day / 1000) % 60) as u8;
    let millisecond = (ms_of_day % 1000) as u16;

    let day = (i16::from(day) + reported_day_adjust) as u8;
    CivilDateTime {
        year,
        month,
        day,
        hour,
        minute,
        second,
        millisecond,
    }
}

/// Convert an OLE automation serial into an elapsed duration.
pub fn serial_to_duration(serial: f64) -> ExcelDuration {
    let scaled = serial * MS_PER_DAY as f64;
    let millis = if scaled >= 0.0 {
        (scaled + 0.5).floor() as i64
    } else {
        (scaled - 0.5).ceil() as i64
    };
    ExcelDuration::from_millis(millis)
}

/// Convert a civil date-time back to an OLE serial.
///
/// Accepts the fictitious `1900-02-29` (serial 60) in 1900 mode, so values
/// produced by [`serial_to_datetime`] round-trip.
pub fn datetime_to_serial(dt: &CivilDateTime, system: DateSystem) -> f64 {
    let time = f64::from(dt.hour) / 24.0
        + f64::from(dt.minute) / 1_440.0
        + f64::from(dt.second) / 86_400.0
        + f64::from(dt.millisecond) / MS_PER_DAY as f64;

    let days = match system {
        DateSystem::V1904 => {
            days_from_civil(dt.year, dt.month, dt.day) - days_from_civil(1904, 1, 1)
        }
        DateSystem::V1900 => {
            if (dt.year, dt.month, dt.day) == (1900, 2, 29) {
                60
            } else {
                let absolute = days_from_civil(dt.year, dt.month, dt.day);
                let mut serial = absolute - days_from_civil(1899, 12, 31);
                if absolute >= days_from_civil(1900, 3, 1) {
                    serial += 1;
                }
                serial
            }
        }
    };

    days as f64 + time
}

// Howard Hinnant's "civil" algorithms for the proleptic Gregorian calendar.
// https://howardhinnant.github.io/date_algorithms.html
fn days_from_civil(year: i32, month: u8, day: u8) -> i64 {
    let y = i64::from(year) - if month <= 2 { 1 } else { 0 };
    let m = i64::from(month);
    let d = i64::from(day);

    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = m + if m > 2 { -3 } else { 9 };
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

fn civil_from_days(days: i64) -> (i32, u8, u8) {
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = mp + if mp < 10 { 3 } else { -9 };
    let year = y + if m <= 2 { 1 } else { 0 };

    (
        i32::try_from(year).unwrap_or(i32::MAX),
        u8::try_from(m).unwrap_or(u8::MAX),
        u8::try_from(d).unwrap_or(u8::MAX),
    )
}
