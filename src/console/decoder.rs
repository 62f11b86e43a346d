/// Field extraction for the console's LOOP live-data frame
use log::warn;
use thiserror::Error;
use time::{Date, Month};

use crate::models::Observation;

// Packed date layout: month in bits 0-3, day in bits 4-7, year offset in bits 8-14
const DATE_MONTH_MASK: u16 = 0x000F;
const DATE_DAY_SHIFT: u16 = 4;
const DATE_DAY_MASK: u16 = 0x000F;
const DATE_YEAR_SHIFT: u16 = 8;
const DATE_YEAR_MASK: u16 = 0x007F;
const DATE_YEAR_BASE: i32 = 2000;

// Battery sense scaling: raw * 300 / 512 gives hundredths of a volt
const VOLTAGE_NUMERATOR: i32 = 300;
const VOLTAGE_DENOMINATOR: i32 = 512;

/// Reason a single field could not be decoded
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("{width} byte(s) at offset {offset} lie outside a {len}-byte frame")]
    OutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },
    #[error("packed date {raw:#06x} is not a calendar date: {source}")]
    InvalidDate {
        raw: u16,
        #[source]
        source: time::error::ComponentRange,
    },
    #[error("packed time {raw} is negative")]
    NegativeTime { raw: i16 },
}

fn bytes<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], FieldError> {
    offset
        .checked_add(N)
        .and_then(|end| data.get(offset..end))
        .and_then(|slice| slice.try_into().ok())
        .ok_or(FieldError::OutOfBounds {
            offset,
            width: N,
            len: data.len(),
        })
}

/// Read one byte as a two's-complement signed integer
pub fn signed_byte(data: &[u8], offset: usize) -> Result<i8, FieldError> {
    bytes::<1>(data, offset).map(i8::from_le_bytes)
}

/// Read one byte as an unsigned integer
pub fn unsigned_byte(data: &[u8], offset: usize) -> Result<u8, FieldError> {
    bytes::<1>(data, offset).map(u8::from_le_bytes)
}

/// Read bytes `offset` and `offset + 1` as a little-endian signed 16-bit integer
pub fn int16_le(data: &[u8], offset: usize) -> Result<i16, FieldError> {
    bytes::<2>(data, offset).map(i16::from_le_bytes)
}

/// Decode a bit-packed calendar date
///
/// A raw value of -1 means the console has no date to report and yields
/// `Ok(None)`. Otherwise the 16 bits split, from the least significant bit
/// upward, into month (4 bits), day (4 bits) and years since 2000 (7 bits).
/// Combinations that are not a real calendar date are an error.
pub fn packed_date(data: &[u8], offset: usize) -> Result<Option<Date>, FieldError> {
    let value = int16_le(data, offset)?;
    if value == -1 {
        return Ok(None);
    }

    let raw = value as u16;
    let month = (raw & DATE_MONTH_MASK) as u8;
    let day = ((raw >> DATE_DAY_SHIFT) & DATE_DAY_MASK) as u8;
    let year = DATE_YEAR_BASE + i32::from((raw >> DATE_YEAR_SHIFT) & DATE_YEAR_MASK);

    Month::try_from(month)
        .and_then(|month| Date::from_calendar_date(year, month, day))
        .map(Some)
        .map_err(|source| FieldError::InvalidDate { raw, source })
}

/// Decode a decimal-packed clock time (`hours * 100 + minutes`) as `HH:MM`
///
/// The sub-fields are passed through without range checks.
pub fn packed_time(data: &[u8], offset: usize) -> Result<String, FieldError> {
    let value = int16_le(data, offset)?;
    if value < 0 {
        return Err(FieldError::NegativeTime { raw: value });
    }

    let hours = value / 100;
    let minutes = value % 100;
    Ok(format!("{:02}:{:02}", hours, minutes))
}

/// Decode the console battery voltage in volts
///
/// `raw * 300 / 512` is floored to whole hundredths before the final
/// division by 100, so e.g. raw 513 reads 3.0 V and not 3.0059 V.
pub fn voltage(data: &[u8], offset: usize) -> Result<f32, FieldError> {
    let value = i32::from(int16_le(data, offset)?);
    let hundredths = (value * VOLTAGE_NUMERATOR).div_euclid(VOLTAGE_DENOMINATOR);
    Ok(hundredths as f32 / 100.0)
}

/// Counts field failures across one decode pass
#[derive(Debug, Default)]
struct FieldTally {
    failed: usize,
}

impl FieldTally {
    fn take<T>(&mut self, name: &str, result: Result<T, FieldError>, default: T) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to decode field {}: {}", name, e);
                self.failed += 1;
                default
            }
        }
    }
}

/// Decode a LOOP frame into an observation
///
/// Offsets follow the console's 99-byte LOOP record:
/// - Byte 3: Barometer trend (signed)
/// - Bytes 7-8: Barometer (thousandths of inHg)
/// - Bytes 9-10: Inside temperature (tenths of a degree)
/// - Byte 11: Inside humidity
/// - Bytes 12-13: Outside temperature (tenths of a degree)
/// - Byte 14: Wind speed, Byte 15: 10-minute average wind speed (unsigned)
/// - Bytes 16-17: Wind direction
/// - Byte 33: Outside humidity
/// - Bytes 41-42: Rain rate, Byte 43: UV index
/// - Bytes 44-45: Solar radiation, Bytes 46-47: Storm rain
/// - Bytes 48-49: Storm start date (packed)
/// - Bytes 50-55: Day/month/year rain, Bytes 56-61: Day/month/year ET
/// - Bytes 70, 71: Inside and rain alarms, Bytes 72-73: Outside alarms
/// - Byte 86: Transmitter battery status
/// - Bytes 87-88: Console battery voltage
/// - Bytes 89, 90: Forecast icon and rule number
/// - Bytes 91-92, 93-94: Sunrise and sunset (packed)
///
/// Never fails: a field that cannot be read takes its default and the
/// result's `valid` flag is cleared, while the remaining fields still decode.
pub fn decode(data: &[u8]) -> Observation {
    let mut fields = FieldTally::default();

    let mut observation = Observation {
        barometer: fields.take(
            "barometer",
            int16_le(data, 7).map(|v| f32::from(v) / 1000.0),
            0.0,
        ),
        bar_trend: fields.take("bar_trend", signed_byte(data, 3), 0),
        in_temperature: fields.take(
            "in_temperature",
            int16_le(data, 9).map(|v| f32::from(v) / 10.0),
            0.0,
        ),
        out_temperature: fields.take(
            "out_temperature",
            int16_le(data, 12).map(|v| f32::from(v) / 10.0),
            0.0,
        ),
        in_humidity: fields.take("in_humidity", signed_byte(data, 11), 0),
        out_humidity: fields.take("out_humidity", signed_byte(data, 33), 0),
        rain_rate: fields.take("rain_rate", int16_le(data, 41), 0),
        ten_min_wind_speed: fields.take("ten_min_wind_speed", unsigned_byte(data, 15), 0),
        wind_direction: fields.take("wind_direction", int16_le(data, 16), 0),
        wind_speed: fields.take("wind_speed", unsigned_byte(data, 14), 0),
        uv: fields.take("uv", signed_byte(data, 43), 0),
        solar_radiation: fields.take("solar_radiation", int16_le(data, 44), 0),
        storm_rain: fields.take("storm_rain", int16_le(data, 46), 0),
        start_date_storm: fields.take("start_date_storm", packed_date(data, 48), None),
        day_rain: fields.take("day_rain", int16_le(data, 50), 0),
        month_rain: fields.take("month_rain", int16_le(data, 52), 0),
        year_rain: fields.take("year_rain", int16_le(data, 54), 0),
        day_et: fields.take("day_et", int16_le(data, 56), 0),
        month_et: fields.take("month_et", int16_le(data, 58), 0),
        year_et: fields.take("year_et", int16_le(data, 60), 0),
        inside_alarm: fields.take("inside_alarm", signed_byte(data, 70), 0),
        rain_alarm: fields.take("rain_alarm", signed_byte(data, 71), 0),
        outside_alarm: fields.take("outside_alarm", int16_le(data, 72), 0),
        transmitter_battery: fields.take("transmitter_battery", signed_byte(data, 86), 0),
        console_battery: fields.take("console_battery", voltage(data, 87), 0.0),
        forecast_icon: fields.take("forecast_icon", signed_byte(data, 89), 0),
        forecast_rule_number: fields.take("forecast_rule_number", signed_byte(data, 90), 0),
        time_of_sunrise: fields.take(
            "time_of_sunrise",
            packed_time(data, 91),
            "00:00".to_string(),
        ),
        time_of_sunset: fields.take(
            "time_of_sunset",
            packed_time(data, 93),
            "00:00".to_string(),
        ),
        valid: false,
    };

    observation.valid = fields.failed == 0;
    if !observation.valid {
        warn!(
            "Decoded frame with {} field(s) defaulted, marking observation invalid",
            fields.failed
        );
    }

    observation
}
