//! Cities the pipeline covers: GSOD station metadata, the paired OpenAQ
//! location and the local timezone used for midnight alignment.

use chrono_tz::Tz;

// ---

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct City {
    pub name: &'static str,
    pub station_id: &'static str,
    pub usaf: &'static str,
    pub wban: &'static str,
    pub station_name: &'static str,
    pub country: &'static str,
    pub state: &'static str,
    pub icao: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_m: f64,
    /// `YYYYMMDD`
    pub begin_date: &'static str,
    /// `YYYYMMDD`
    pub end_date: &'static str,
    pub aq_location_id: &'static str,
    pub timezone: Tz,
}

pub static CITIES: [City; 3] = [
    City {
        name: "Los Angeles",
        station_id: "72295023174",
        usaf: "722950",
        wban: "23174",
        station_name: "LOS ANGELES INTERNATIONAL AIRPORT",
        country: "US",
        state: "CA",
        icao: "KLAX",
        latitude: 33.938,
        longitude: -118.387,
        elevation_m: 29.7,
        begin_date: "19430101",
        end_date: "20250416",
        aq_location_id: "2138",
        timezone: Tz::America__Los_Angeles,
    },
    City {
        name: "San Francisco",
        station_id: "99847999999",
        usaf: "998479",
        wban: "99999",
        station_name: "SAN FRANCISCO (PIER 1)",
        country: "US",
        state: "CA",
        icao: "",
        latitude: 37.798,
        longitude: -122.393,
        elevation_m: 10.0,
        begin_date: "19430101",
        end_date: "20251231",
        aq_location_id: "2009",
        timezone: Tz::America__Los_Angeles,
    },
    City {
        name: "PHILADELPHIA",
        station_id: "72408013739",
        usaf: "724080",
        wban: "13739",
        station_name: "PHILADELPHIA INTERNATIONAL AIRPORT",
        country: "US",
        state: "PA",
        icao: "KPHL",
        latitude: 39.873,
        longitude: -75.227,
        elevation_m: 2.2,
        begin_date: "19430101",
        end_date: "20251231",
        aq_location_id: "1884",
        timezone: Tz::America__New_York,
    },
];

/// Case-insensitive lookup by display name.
pub fn find(name: &str) -> Option<&'static City> {
    CITIES.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_station_ids_join_usaf_and_wban() {
        // ---
        for city in &CITIES {
            assert_eq!(city.station_id, format!("{}{}", city.usaf, city.wban));
        }
    }

    #[test]
    fn test_lookup_ignores_case() {
        // ---
        assert_eq!(find("philadelphia").map(|c| c.aq_location_id), Some("1884"));
        assert_eq!(find("los angeles").map(|c| c.timezone), Some(Tz::America__Los_Angeles));
        assert!(find("Boston").is_none());
    }
}
