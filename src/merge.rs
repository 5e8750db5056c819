//! Observation merger: turns daily weather records and sub-daily,
//! multi-sensor air quality readings into one labelled daily table.
//!
//! The pipeline is four pure steps, each usable on its own:
//! 1. [`align_to_local_midnight`] picks the local-midnight sample per day
//! 2. [`pivot_by_parameter`] reshapes long readings into one row per day
//! 3. [`merge_daily`] inner-joins weather and air quality on the date
//! 4. [`label_and_split`] attaches the AQI label and splits by month
//!
//! [`prepare_training_table`] runs all four.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{NaiveDate, Timelike};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::debug;

use crate::{
    aqi::compute_aqi, format_day, DailyObservation, LabeledObservation, LocalReading, Pollutant,
    PivotedReading, SensorReading, TrainingSplit, WeatherRecord,
};

// ---

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MergeError {
    #[error("Pollutant {0} not found in OpenAQ data")]
    MissingPollutant(Pollutant),

    #[error("{dataset} data has more than one row for {date}")]
    DuplicateDate { dataset: &'static str, date: String },
}

/// Keep only readings taken at local midnight in `tz`, labelled with
/// their local calendar date.
pub fn align_to_local_midnight(readings: &[SensorReading], tz: Tz) -> Vec<LocalReading> {
    // ---
    readings
        .iter()
        .filter_map(|reading| {
            let local = reading.datetime.with_timezone(&tz);
            (local.hour() == 0).then(|| LocalReading {
                date: local.date_naive(),
                reading: reading.clone(),
            })
        })
        .collect()
}

/// Reshape long-format readings into one row per (location, date).
///
/// When several readings share (location, date, parameter) the first one
/// encountered wins. Rows come back ordered by location id, then date.
pub fn pivot_by_parameter(readings: &[LocalReading]) -> Vec<PivotedReading> {
    // ---
    let mut groups: BTreeMap<(String, NaiveDate), PivotedReading> = BTreeMap::new();

    for LocalReading { date, reading } in readings {
        let row = groups
            .entry((reading.location_id.clone(), *date))
            .or_insert_with(|| PivotedReading {
                location_id: reading.location_id.clone(),
                date: *date,
                lat: reading.lat,
                lon: reading.lon,
                values: BTreeMap::new(),
                units: BTreeMap::new(),
            });

        row.values
            .entry(reading.parameter.clone())
            .or_insert(reading.value);
        row.units
            .entry(reading.parameter.clone())
            .or_insert_with(|| reading.units.clone());
    }

    groups.into_values().collect()
}

/// Inner join on calendar date. Output follows the weather row order.
///
/// Both sides must carry at most one row per date; the air quality side's
/// coordinates are dropped in favour of the weather station's.
pub fn merge_daily(
    weather: &[WeatherRecord],
    pivoted: &[PivotedReading],
) -> Result<Vec<DailyObservation>, MergeError> {
    // ---
    let mut seen = HashSet::with_capacity(weather.len());
    for record in weather {
        if !seen.insert(record.date) {
            return Err(MergeError::DuplicateDate {
                dataset: "NOAA",
                date: format_day(record.date),
            });
        }
    }

    let mut by_date: HashMap<NaiveDate, &PivotedReading> = HashMap::with_capacity(pivoted.len());
    for row in pivoted {
        if by_date.insert(row.date, row).is_some() {
            return Err(MergeError::DuplicateDate {
                dataset: "OpenAQ",
                date: format_day(row.date),
            });
        }
    }

    let joined = weather
        .iter()
        .filter_map(|w| {
            by_date.get(&w.date).map(|aq| DailyObservation {
                date: w.date,
                latitude: w.latitude,
                longitude: w.longitude,
                dewp: w.dewp,
                wdsp: w.wdsp,
                max: w.max,
                min: w.min,
                prcp: w.prcp,
                values: aq.values.clone(),
                units: aq.units.clone(),
            })
        })
        .collect();

    Ok(joined)
}

/// Attach the AQI label for `pollutant` and split by month:
/// January-October train, November-December validate/test.
///
/// A day without a reading for the pollutant is labelled 0.
pub fn label_and_split(joined: Vec<DailyObservation>, pollutant: Pollutant) -> TrainingSplit {
    // ---
    let parameter = pollutant.as_str();
    let mut split = TrainingSplit::default();
    for observation in joined {
        let aqi = observation
            .value(parameter)
            .map(|c| compute_aqi(pollutant, c))
            .unwrap_or(0.0);

        if observation.month() <= 10 {
            split.train.push(LabeledObservation { observation, aqi });
        } else {
            split.test.push(observation.clone());
            split.validate.push(LabeledObservation { observation, aqi });
        }
    }

    split
}

/// Run the whole merge for one station/location pair.
///
/// Only a pollutant that no raw reading names is an error. Readings that
/// never land on local midnight leave an empty split.
pub fn prepare_training_table(
    weather: &[WeatherRecord],
    readings: &[SensorReading],
    tz: Tz,
    pollutant: Pollutant,
) -> Result<TrainingSplit, MergeError> {
    // ---
    if !readings.iter().any(|r| r.parameter == pollutant.as_str()) {
        return Err(MergeError::MissingPollutant(pollutant));
    }

    let midnight = align_to_local_midnight(readings, tz);
    debug!(
        "{} of {} readings fall on local midnight ({})",
        midnight.len(),
        readings.len(),
        tz
    );

    let pivoted = pivot_by_parameter(&midnight);
    let joined = merge_daily(weather, &pivoted)?;
    debug!(
        "Joined {} weather days with {} air quality days into {} rows",
        weather.len(),
        pivoted.len(),
        joined.len()
    );

    Ok(label_and_split(joined, pollutant))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{DateTime, FixedOffset};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn reading(location: &str, ts: &str, parameter: &str, value: f64) -> SensorReading {
        SensorReading {
            location_id: location.to_string(),
            datetime: DateTime::<FixedOffset>::parse_from_rfc3339(ts).unwrap(),
            lat: 34.05,
            lon: -118.25,
            parameter: parameter.to_string(),
            value,
            units: if parameter == "co" { "ppm" } else { "µg/m³" }.to_string(),
        }
    }

    fn local(location: &str, date: NaiveDate, parameter: &str, value: f64) -> LocalReading {
        LocalReading {
            date,
            reading: reading(location, "2023-01-01T00:00:00-08:00", parameter, value),
        }
    }

    fn weather(date: NaiveDate) -> WeatherRecord {
        WeatherRecord {
            station: "72295023174".to_string(),
            date,
            latitude: 33.938,
            longitude: -118.387,
            dewp: 10.0,
            wdsp: 5.0,
            max: 70.0,
            min: 55.0,
            prcp: 0.0,
        }
    }

    fn pivoted(date: NaiveDate, pm25: f64) -> PivotedReading {
        PivotedReading {
            location_id: "2138".to_string(),
            date,
            lat: 34.05,
            lon: -118.25,
            values: BTreeMap::from([("pm25".to_string(), pm25)]),
            units: BTreeMap::from([("pm25".to_string(), "µg/m³".to_string())]),
        }
    }

    #[test]
    fn test_midnight_alignment_uses_local_time() {
        // ---
        let la: Tz = "America/Los_Angeles".parse().unwrap();
        let readings = vec![
            // 08:00Z is local midnight in PST
            reading("2138", "2023-01-05T08:00:00Z", "pm25", 9.0),
            // Midnight UTC is 16:00 the previous day in LA
            reading("2138", "2023-01-05T00:00:00Z", "pm25", 3.0),
            // Already expressed with the local offset
            reading("2138", "2023-01-06T00:00:00-08:00", "no2", 12.0),
            // 07:00Z during PDT is local midnight
            reading("2138", "2023-07-04T07:00:00Z", "pm25", 14.0),
        ];

        let kept = align_to_local_midnight(&readings, la);
        let dates: Vec<String> = kept.iter().map(|r| format_day(r.date)).collect();
        assert_eq!(dates, vec!["2023/01/05", "2023/01/06", "2023/07/04"]);
        assert_eq!(kept[0].reading.value, 9.0);
    }

    #[test]
    fn test_midnight_alignment_with_no_matches_is_empty() {
        // ---
        let la: Tz = "America/Los_Angeles".parse().unwrap();
        let readings = vec![reading("2138", "2023-01-05T13:00:00Z", "pm25", 9.0)];
        assert!(align_to_local_midnight(&readings, la).is_empty());
    }

    #[test]
    fn test_pivot_builds_one_row_per_location_and_day() {
        // ---
        let d1 = day(2023, 1, 1);
        let d2 = day(2023, 1, 2);
        let input = vec![
            local("2138", d1, "pm25", 10.0),
            local("2138", d1, "no2", 21.0),
            local("2138", d1, "co", 0.4),
            local("2138", d2, "pm25", 7.5),
        ];

        let rows = pivot_by_parameter(&input);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, d1);
        assert_eq!(rows[0].values.len(), 3);
        assert_eq!(rows[0].values["no2"], 21.0);
        assert_eq!(rows[0].units["co"], "ppm");
        assert_eq!(rows[1].values["pm25"], 7.5);
        assert!(!rows[1].values.contains_key("no2"));
    }

    #[test]
    fn test_pivot_first_value_wins() {
        // ---
        let d1 = day(2023, 1, 1);
        let input = vec![local("2138", d1, "pm25", 10.0), local("2138", d1, "pm25", 99.0)];
        let rows = pivot_by_parameter(&input);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values["pm25"], 10.0);
    }

    #[test]
    fn test_pivot_is_independent_of_input_order() {
        // ---
        let input = vec![
            local("2138", day(2023, 3, 2), "pm25", 4.0),
            local("2009", day(2023, 3, 1), "no2", 17.0),
            local("2138", day(2023, 3, 1), "pm25", 6.0),
            local("2138", day(2023, 3, 1), "co", 0.2),
            local("2009", day(2023, 3, 1), "pm25", 8.0),
        ];
        let expected = pivot_by_parameter(&input);

        let mut reversed = input.clone();
        reversed.reverse();
        assert_eq!(pivot_by_parameter(&reversed), expected);

        let mut rotated = input.clone();
        rotated.rotate_left(2);
        assert_eq!(pivot_by_parameter(&rotated), expected);

        let locations: Vec<&str> = expected.iter().map(|r| r.location_id.as_str()).collect();
        assert_eq!(locations, vec!["2009", "2138", "2138"]);
    }

    #[test]
    fn test_merge_is_a_strict_inner_join() {
        // ---
        let weather_rows = vec![weather(day(2023, 1, 1)), weather(day(2023, 1, 2))];
        let aq_rows = vec![pivoted(day(2023, 1, 2), 5.0), pivoted(day(2023, 1, 3), 6.0)];

        let joined = merge_daily(&weather_rows, &aq_rows).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(format_day(joined[0].date), "2023/01/02");
        // Weather coordinates take precedence
        assert_eq!(joined[0].latitude, 33.938);
        assert_eq!(joined[0].value("pm25"), Some(5.0));
    }

    #[test]
    fn test_merge_with_disjoint_dates_is_empty() {
        // ---
        let joined = merge_daily(&[weather(day(2023, 1, 1))], &[pivoted(day(2023, 2, 1), 1.0)]).unwrap();
        assert!(joined.is_empty());
    }

    #[test]
    fn test_merge_rejects_duplicate_dates() {
        // ---
        let d = day(2023, 1, 1);
        let err = merge_daily(&[weather(d), weather(d)], &[pivoted(d, 1.0)]).unwrap_err();
        assert_eq!(
            err,
            MergeError::DuplicateDate {
                dataset: "NOAA",
                date: "2023/01/01".to_string()
            }
        );

        let mut other_location = pivoted(d, 2.0);
        other_location.location_id = "9999".to_string();
        let err = merge_daily(&[weather(d)], &[pivoted(d, 1.0), other_location]).unwrap_err();
        assert!(matches!(err, MergeError::DuplicateDate { dataset: "OpenAQ", .. }));
    }

    #[test]
    fn test_split_partitions_by_month() {
        // ---
        let dates = [
            day(2023, 1, 15),
            day(2023, 10, 31),
            day(2023, 11, 1),
            day(2023, 12, 31),
            day(2023, 6, 1),
        ];
        let weather_rows: Vec<WeatherRecord> = dates.iter().map(|d| weather(*d)).collect();
        let aq_rows: Vec<PivotedReading> = dates.iter().map(|d| pivoted(*d, 20.0)).collect();
        let joined = merge_daily(&weather_rows, &aq_rows).unwrap();
        let total = joined.len();

        let split = label_and_split(joined, Pollutant::Pm25);
        assert_eq!(split.train.len() + split.validate.len(), total);
        assert_eq!(split.validate.len(), split.test.len());
        assert!(split.train.iter().all(|r| r.observation.month() <= 10));
        assert!(split.validate.iter().all(|r| r.observation.month() >= 11));

        // Held-out copies describe the same days
        let validate_days: Vec<NaiveDate> =
            split.validate.iter().map(|r| r.observation.date).collect();
        let test_days: Vec<NaiveDate> = split.test.iter().map(|o| o.date).collect();
        assert_eq!(validate_days, test_days);
        assert!(split.validate.iter().all(|r| r.aqi == 67.61));
    }

    #[test]
    fn test_split_without_pollutant_values_labels_zero() {
        // ---
        let d = day(2023, 1, 1);
        let joined = merge_daily(&[weather(d)], &[pivoted(d, 3.0)]).unwrap();
        let split = label_and_split(joined, Pollutant::No2);
        assert_eq!(split.train.len(), 1);
        assert_eq!(split.train[0].aqi, 0.0);
    }

    #[test]
    fn test_split_labels_missing_values_with_zero() {
        // ---
        let d1 = day(2023, 2, 1);
        let d2 = day(2023, 2, 2);
        let mut without_pm25 = pivoted(d2, 0.0);
        without_pm25.values.clear();
        without_pm25.values.insert("no2".to_string(), 30.0);

        let joined = merge_daily(&[weather(d1), weather(d2)], &[pivoted(d1, 12.0), without_pm25]).unwrap();
        let split = label_and_split(joined, Pollutant::Pm25);
        assert_eq!(split.train[0].aqi, 50.0);
        assert_eq!(split.train[1].aqi, 0.0);
    }

    #[test]
    fn test_end_to_end_midsummer_day() {
        // ---
        let la: Tz = "America/Los_Angeles".parse().unwrap();
        let weather_rows = vec![weather(day(2023, 6, 15))];
        let readings = vec![
            reading("2138", "2023-06-15T00:00:00-07:00", "pm25", 10.0),
            reading("2138", "2023-06-15T00:00:00-07:00", "no2", 18.0),
            reading("2138", "2023-06-15T01:00:00-07:00", "pm25", 55.0),
        ];

        let split = prepare_training_table(&weather_rows, &readings, la, Pollutant::Pm25).unwrap();
        assert_eq!(split.train.len(), 1);
        assert!(split.validate.is_empty());
        assert!(split.test.is_empty());

        let row = &split.train[0];
        assert_eq!(row.aqi, 41.67);
        assert_eq!(format_day(row.observation.date), "2023/06/15");
        assert_eq!(row.observation.value("pm25"), Some(10.0));
        assert_eq!(row.observation.value("no2"), Some(18.0));
    }

    #[test]
    fn test_prepare_rejects_pollutant_absent_from_readings() {
        // ---
        let la: Tz = "America/Los_Angeles".parse().unwrap();
        let readings = vec![reading("2138", "2023-06-15T00:00:00-07:00", "pm25", 10.0)];
        let err = prepare_training_table(&[], &readings, la, Pollutant::O3).unwrap_err();
        assert_eq!(err, MergeError::MissingPollutant(Pollutant::O3));
        assert_eq!(err.to_string(), "Pollutant o3 not found in OpenAQ data");
    }

    #[test]
    fn test_prepare_without_midnight_readings_is_empty() {
        // ---
        let la: Tz = "America/Los_Angeles".parse().unwrap();
        let weather_rows = vec![weather(day(2023, 6, 15))];
        let readings = vec![reading("2138", "2023-06-15T13:00:00-07:00", "pm25", 10.0)];

        let split = prepare_training_table(&weather_rows, &readings, la, Pollutant::Pm25).unwrap();
        assert_eq!(split, TrainingSplit::default());
    }

    #[test]
    fn test_prepare_with_no_common_dates_is_empty() {
        // ---
        let la: Tz = "America/Los_Angeles".parse().unwrap();
        let weather_rows = vec![weather(day(2023, 11, 2))];
        let readings = vec![reading("2138", "2023-06-15T00:00:00-07:00", "pm25", 10.0)];

        let split = prepare_training_table(&weather_rows, &readings, la, Pollutant::Pm25).unwrap();
        assert!(split.train.is_empty());
        assert!(split.validate.is_empty());
        assert!(split.test.is_empty());
    }
}
