use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column order of every sheet and CSV file written by garmingo.
pub const HEADERS: [&str; 24] = [
    "Day/Date",
    "Sleep Score",
    "Sleep Length",
    "HRV (ms)",
    "HRV Status",
    "Weight (kg)",
    "Body Fat %",
    "Blood Pressure Systolic",
    "Blood Pressure Diastolic",
    "Active Calories",
    "Resting Calories",
    "Resting Heart Rate",
    "Average Stress",
    "Training Status",
    "VO2 Max Running",
    "Intensity Minutes",
    "All Activity Count",
    "Running Activity Count",
    "Running Distance (km)",
    "Strength Activity Count",
    "Strength Duration",
    "Cardio Activity Count",
    "Cardio Duration",
    "Steps",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Date,
    SleepScore,
    SleepLength,
    OvernightHrv,
    HrvStatus,
    Weight,
    BodyFat,
    BloodPressureSystolic,
    BloodPressureDiastolic,
    ActiveCalories,
    RestingCalories,
    RestingHeartRate,
    AverageStress,
    TrainingStatus,
    Vo2maxRunning,
    IntensityMinutes,
    AllActivityCount,
    RunningActivityCount,
    RunningDistance,
    StrengthActivityCount,
    StrengthDuration,
    CardioActivityCount,
    CardioDuration,
    Steps,
}

// Must list every entry of HEADERS.
const HEADER_FIELDS: [(&str, Field); 24] = [
    ("Day/Date", Field::Date),
    ("Sleep Score", Field::SleepScore),
    ("Sleep Length", Field::SleepLength),
    ("Weight (kg)", Field::Weight),
    ("Body Fat %", Field::BodyFat),
    ("Blood Pressure Systolic", Field::BloodPressureSystolic),
    ("Blood Pressure Diastolic", Field::BloodPressureDiastolic),
    ("Active Calories", Field::ActiveCalories),
    ("Resting Calories", Field::RestingCalories),
    ("Resting Heart Rate", Field::RestingHeartRate),
    ("Average Stress", Field::AverageStress),
    ("Training Status", Field::TrainingStatus),
    ("VO2 Max Running", Field::Vo2maxRunning),
    ("Intensity Minutes", Field::IntensityMinutes),
    ("All Activity Count", Field::AllActivityCount),
    ("Running Activity Count", Field::RunningActivityCount),
    ("Running Distance (km)", Field::RunningDistance),
    ("Strength Activity Count", Field::StrengthActivityCount),
    ("Strength Duration", Field::StrengthDuration),
    ("Cardio Activity Count", Field::CardioActivityCount),
    ("Cardio Duration", Field::CardioDuration),
    ("HRV (ms)", Field::OvernightHrv),
    ("HRV Status", Field::HrvStatus),
    ("Steps", Field::Steps),
];

pub fn field_for_header(header: &str) -> Option<Field> {
    HEADER_FIELDS
        .iter()
        .find(|(name, _)| *name == header)
        .map(|(_, field)| *field)
}

/// Daily health metrics for one calendar date. Every field other than the
/// date is optional because Garmin may not report it for a given day.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GarminMetrics {
    pub date: NaiveDate,
    pub sleep_score: Option<f64>,
    /// Hours
    pub sleep_length: Option<f64>,
    pub weight: Option<f64>,
    pub body_fat: Option<f64>,
    pub blood_pressure_systolic: Option<i64>,
    pub blood_pressure_diastolic: Option<i64>,
    pub active_calories: Option<i64>,
    pub resting_calories: Option<i64>,
    pub resting_heart_rate: Option<i64>,
    pub average_stress: Option<i64>,
    pub training_status: Option<String>,
    pub vo2max_running: Option<f64>,
    pub intensity_minutes: Option<i64>,
    pub all_activity_count: Option<i64>,
    pub running_activity_count: Option<i64>,
    /// Kilometres
    pub running_distance: Option<f64>,
    pub strength_activity_count: Option<i64>,
    /// Minutes
    pub strength_duration: Option<f64>,
    pub cardio_activity_count: Option<i64>,
    /// Minutes
    pub cardio_duration: Option<f64>,
    pub overnight_hrv: Option<i64>,
    pub hrv_status: Option<String>,
    pub steps: Option<i64>,
}

impl GarminMetrics {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            ..Default::default()
        }
    }

    /// Canonical key used to match rows in every sink.
    pub fn date_key(&self) -> String {
        format_date(self.date)
    }

    pub fn value(&self, field: Field) -> CellValue {
        match field {
            Field::Date => CellValue::Text(self.date_key()),
            Field::SleepScore => CellValue::float(self.sleep_score),
            Field::SleepLength => CellValue::float(self.sleep_length),
            Field::OvernightHrv => CellValue::integer(self.overnight_hrv),
            Field::HrvStatus => CellValue::text(self.hrv_status.as_deref()),
            Field::Weight => CellValue::float(self.weight),
            Field::BodyFat => CellValue::float(self.body_fat),
            Field::BloodPressureSystolic => CellValue::integer(self.blood_pressure_systolic),
            Field::BloodPressureDiastolic => CellValue::integer(self.blood_pressure_diastolic),
            Field::ActiveCalories => CellValue::integer(self.active_calories),
            Field::RestingCalories => CellValue::integer(self.resting_calories),
            Field::RestingHeartRate => CellValue::integer(self.resting_heart_rate),
            Field::AverageStress => CellValue::integer(self.average_stress),
            Field::TrainingStatus => CellValue::text(self.training_status.as_deref()),
            Field::Vo2maxRunning => CellValue::float(self.vo2max_running),
            Field::IntensityMinutes => CellValue::integer(self.intensity_minutes),
            Field::AllActivityCount => CellValue::integer(self.all_activity_count),
            Field::RunningActivityCount => CellValue::integer(self.running_activity_count),
            Field::RunningDistance => CellValue::float(self.running_distance),
            Field::StrengthActivityCount => CellValue::integer(self.strength_activity_count),
            Field::StrengthDuration => CellValue::float(self.strength_duration),
            Field::CardioActivityCount => CellValue::integer(self.cardio_activity_count),
            Field::CardioDuration => CellValue::float(self.cardio_duration),
            Field::Steps => CellValue::integer(self.steps),
        }
    }

    /// Serialize in published header order.
    pub fn to_row(&self) -> Vec<CellValue> {
        self.to_row_with(&HEADERS)
    }

    pub(crate) fn to_row_with(&self, headers: &[&str]) -> Vec<CellValue> {
        headers
            .iter()
            .map(|header| match field_for_header(header) {
                Some(field) => self.value(field),
                None => CellValue::Empty,
            })
            .collect()
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// A single serialized cell, shared by the CSV and Sheets sinks.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Integer(i64),
    Number(Decimal),
}

impl CellValue {
    /// Floats are rounded to 2 decimal places, halves away from zero.
    fn float(value: Option<f64>) -> Self {
        value
            .and_then(Decimal::from_f64)
            .map(|d| {
                let rounded = d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
                CellValue::Number(rounded.normalize())
            })
            .unwrap_or(CellValue::Empty)
    }

    fn integer(value: Option<i64>) -> Self {
        value.map(CellValue::Integer).unwrap_or(CellValue::Empty)
    }

    fn text(value: Option<&str>) -> Self {
        value
            .map(|s| CellValue::Text(s.to_string()))
            .unwrap_or(CellValue::Empty)
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Empty => serde_json::Value::String(String::new()),
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
            CellValue::Integer(i) => serde_json::Value::from(*i),
            CellValue::Number(d) => d
                .to_f64()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(d.to_string())),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Number(d) => write!(f, "{}", d),
        }
    }
}
