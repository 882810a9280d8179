//! Extraction of daily metrics from Garmin Connect JSON payloads. Every
//! function tolerates missing or oddly shaped data by returning `None`.

use crate::models::GarminMetrics;
use chrono::NaiveDate;
use serde_json::Value;

/// Raw responses gathered for one date.
#[derive(Debug, Default)]
pub(super) struct DailyPayloads {
    pub summary: Option<Value>,
    pub sleep: Option<Value>,
    pub hrv: Option<Value>,
    pub weight: Option<Value>,
    pub blood_pressure: Option<Value>,
    pub vo2max: Option<Value>,
    pub training_status: Option<Value>,
    pub activities: Option<Value>,
}

impl DailyPayloads {
    pub fn into_metrics(self, date: NaiveDate) -> GarminMetrics {
        let summary = self.summary.as_ref();
        let (sleep_score, sleep_length) = parse_sleep(self.sleep.as_ref());
        let (overnight_hrv, hrv_status) = parse_hrv(self.hrv.as_ref());
        let (weight, body_fat) = parse_weight(self.weight.as_ref());
        let (systolic, diastolic) = parse_blood_pressure(self.blood_pressure.as_ref());
        let activities = parse_activities(self.activities.as_ref());

        GarminMetrics {
            date,
            sleep_score,
            sleep_length,
            weight,
            body_fat,
            blood_pressure_systolic: systolic,
            blood_pressure_diastolic: diastolic,
            active_calories: int_field(summary, "activeKilocalories"),
            resting_calories: int_field(summary, "bmrKilocalories"),
            resting_heart_rate: int_field(summary, "restingHeartRate"),
            average_stress: int_field(summary, "averageStressLevel").filter(|v| *v >= 0),
            training_status: parse_training_status(self.training_status.as_ref(), date),
            vo2max_running: parse_vo2max(self.vo2max.as_ref()),
            intensity_minutes: parse_intensity_minutes(summary),
            all_activity_count: activities.as_ref().map(|a| a.all),
            running_activity_count: activities.as_ref().map(|a| a.running),
            running_distance: activities.as_ref().map(|a| a.running_km),
            strength_activity_count: activities.as_ref().map(|a| a.strength),
            strength_duration: activities.as_ref().map(|a| a.strength_minutes),
            cardio_activity_count: activities.as_ref().map(|a| a.cardio),
            cardio_duration: activities.as_ref().map(|a| a.cardio_minutes),
            overnight_hrv,
            hrv_status,
            steps: int_field(summary, "totalSteps"),
        }
    }
}

fn int_field(value: Option<&Value>, key: &str) -> Option<i64> {
    let v = value?.get(key)?;
    v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64))
}

fn first_entry(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.first(),
        other => Some(other),
    }
}

/// (score, hours)
fn parse_sleep(value: Option<&Value>) -> (Option<f64>, Option<f64>) {
    let Some(dto) = value.map(|v| v.get("dailySleepDTO").unwrap_or(v)) else {
        return (None, None);
    };

    let score = dto
        .get("sleepScores")
        .and_then(|v| v.get("overall"))
        .and_then(|v| v.get("value"))
        .and_then(Value::as_f64);
    let hours = dto
        .get("sleepTimeSeconds")
        .and_then(Value::as_f64)
        .map(|seconds| seconds / 3600.0);

    (score, hours)
}

/// (last night average ms, status)
fn parse_hrv(value: Option<&Value>) -> (Option<i64>, Option<String>) {
    let Some(summary) = value.and_then(|v| v.get("hrvSummary")) else {
        return (None, None);
    };

    let last_night = int_field(Some(summary), "lastNightAvg")
        .or_else(|| int_field(Some(summary), "lastNight"));
    let status = summary
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_string);

    (last_night, status)
}

/// (kg, body fat %)
fn parse_weight(value: Option<&Value>) -> (Option<f64>, Option<f64>) {
    let entry = value
        .and_then(|v| v.get("dateWeightList"))
        .and_then(first_entry)
        .or_else(|| value.and_then(|v| v.get("totalAverage")));
    let Some(entry) = entry else {
        return (None, None);
    };

    let kg = entry
        .get("weight")
        .and_then(Value::as_f64)
        .map(|grams| grams / 1000.0);
    let body_fat = entry.get("bodyFat").and_then(Value::as_f64);

    (kg, body_fat)
}

/// (systolic, diastolic) of the first measurement of the day
fn parse_blood_pressure(value: Option<&Value>) -> (Option<i64>, Option<i64>) {
    let measurement = value
        .and_then(|v| v.get("measurementSummaries"))
        .and_then(first_entry)
        .and_then(|summary| summary.get("measurements"))
        .and_then(first_entry);

    (
        int_field(measurement, "systolic"),
        int_field(measurement, "diastolic"),
    )
}

fn parse_vo2max(value: Option<&Value>) -> Option<f64> {
    let generic = value.and_then(first_entry)?.get("generic")?;
    generic
        .get("vo2MaxPreciseValue")
        .and_then(Value::as_f64)
        .or_else(|| generic.get("vo2MaxValue").and_then(Value::as_f64))
}

/// Garmin counts vigorous minutes double.
fn parse_intensity_minutes(summary: Option<&Value>) -> Option<i64> {
    let moderate = int_field(summary, "moderateIntensityMinutes");
    let vigorous = int_field(summary, "vigorousIntensityMinutes");
    match (moderate, vigorous) {
        (None, None) => None,
        (m, v) => Some(m.unwrap_or(0) + 2 * v.unwrap_or(0)),
    }
}

fn parse_training_status(value: Option<&Value>, date: NaiveDate) -> Option<String> {
    let root = value?;
    let date_str = date.format("%Y-%m-%d").to_string();
    let phrase_for_date = |entry: &Value| {
        (entry.get("calendarDate").and_then(Value::as_str) == Some(date_str.as_str()))
            .then(|| entry.get("trainingStatusFeedbackPhrase"))
            .flatten()
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let latest = root
        .get("mostRecentTrainingStatus")
        .and_then(|v| v.get("latestTrainingStatusData"))
        .and_then(Value::as_object);
    if let Some(phrase) = latest.and_then(|devices| devices.values().find_map(phrase_for_date)) {
        return Some(phrase);
    }

    root.get("trainingStatusHistory")
        .and_then(Value::as_array)
        .and_then(|history| history.iter().find_map(phrase_for_date))
}

#[derive(Debug, PartialEq)]
struct ActivityTotals {
    all: i64,
    running: i64,
    running_km: f64,
    strength: i64,
    strength_minutes: f64,
    cardio: i64,
    cardio_minutes: f64,
}

fn parse_activities(value: Option<&Value>) -> Option<ActivityTotals> {
    let activities = value?.as_array()?;
    let mut totals = ActivityTotals {
        all: 0,
        running: 0,
        running_km: 0.0,
        strength: 0,
        strength_minutes: 0.0,
        cardio: 0,
        cardio_minutes: 0.0,
    };

    for activity in activities {
        totals.all += 1;
        let type_key = activity
            .get("activityType")
            .and_then(|t| t.get("typeKey"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let minutes = activity
            .get("duration")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            / 60.0;

        if type_key.contains("running") {
            totals.running += 1;
            totals.running_km += activity
                .get("distance")
                .and_then(Value::as_f64)
                .unwrap_or(0.0)
                / 1000.0;
        } else if type_key == "strength_training" {
            totals.strength += 1;
            totals.strength_minutes += minutes;
        } else if type_key.contains("cardio") {
            totals.cardio += 1;
            totals.cardio_minutes += minutes;
        }
    }

    Some(totals)
}
