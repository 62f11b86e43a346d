use serde::Serialize;
use time::Date;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// One decoded live-data frame from the weather console.
///
/// Every field is always populated; a field that could not be decoded holds
/// its default and clears `valid`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub barometer: f32,
    pub bar_trend: i8,
    pub in_temperature: f32,
    pub out_temperature: f32,
    pub in_humidity: i8,
    pub out_humidity: i8,
    pub rain_rate: i16,
    pub ten_min_wind_speed: u8,
    pub wind_direction: i16,
    pub wind_speed: u8,
    pub uv: i8,
    pub solar_radiation: i16,
    pub storm_rain: i16,
    #[serde(with = "iso_date::option")]
    pub start_date_storm: Option<Date>,
    pub day_rain: i16,
    pub month_rain: i16,
    pub year_rain: i16,
    pub day_et: i16,
    pub month_et: i16,
    pub year_et: i16,
    pub inside_alarm: i8,
    pub rain_alarm: i8,
    pub outside_alarm: i16,
    pub transmitter_battery: i8,
    pub console_battery: f32,
    pub forecast_icon: i8,
    pub forecast_rule_number: i8,
    pub time_of_sunrise: String,
    pub time_of_sunset: String,
    /// False if any single field failed to decode
    pub valid: bool,
}
