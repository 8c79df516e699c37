//! Shared fixtures for airq-core integration tests.

#![allow(dead_code)]

use airq_core::{
    AirQualityService, ArtifactStore, Location, ObservationRecord, PollutionReading, SatelliteAtmospheric,
    SatelliteSurface, Trainer, TrainerConfig, WeatherBlock,
};
use chrono::{TimeZone, Utc};
use std::path::Path;

const CONDITIONS: [&str; 3] = ["Clear", "Clouds", "Rain"];

/// A full record whose pollutant values follow simple functions of `i`.
pub fn full_record(i: usize) -> ObservationRecord {
    let x = i as f64;
    ObservationRecord {
        weather: Some(WeatherBlock {
            temperature: Some(15.0 + (x * 1.7) % 20.0),
            humidity: Some(40.0 + (x * 3.1) % 50.0),
            pressure: Some(1000.0 + x % 25.0),
            wind_speed: Some(1.0 + (x * 0.37) % 6.0),
            wind_direction: Some((x * 29.0) % 360.0),
            visibility: Some(8000.0 + (x * 97.0) % 2000.0),
            condition: Some(CONDITIONS[i % CONDITIONS.len()].to_string()),
        }),
        pollution: Some(PollutionReading {
            pm2_5: Some(12.0 + (x * 5.3) % 80.0),
            pm10: Some(20.0 + (x * 7.1) % 120.0),
            no2: Some(5.0 + (x * 2.3) % 40.0),
            o3: Some(30.0 + (x * 4.9) % 60.0),
            co: Some(0.2 + (x * 0.11) % 1.5),
            so2: Some(1.0 + (x * 0.7) % 8.0),
            aqi: Some(1.0 + (x % 5.0)),
        }),
        satellite_atmospheric: Some(SatelliteAtmospheric {
            no2: Some(1e-4 * (1.0 + x % 7.0)),
            o3: Some(0.12 + 0.001 * x),
            so2: None,
            co: Some(0.03),
            aerosol: Some(0.2 + (x * 0.05) % 1.0),
        }),
        satellite_surface: Some(SatelliteSurface {
            ndvi: Some(0.3 + (x * 0.01) % 0.4),
            surface_temperature: Some(290.0 + x % 15.0),
            vegetation_health: Some(0.5),
        }),
        location: Some(Location { lat: Some(28.6), lon: Some(77.2) }),
        collected_at: Some(Utc.with_ymd_and_hms(2024, 5, 1 + (i % 28) as u32, (i % 24) as u32, 0, 0).unwrap()),
        historical_pollution: vec![PollutionReading {
            pm2_5: Some(10.0 + x % 30.0),
            pm10: Some(25.0),
            ..Default::default()
        }],
    }
}

pub fn full_batch(n: usize) -> Vec<ObservationRecord> {
    (0..n).map(full_record).collect()
}

/// Service over `root` with a smaller ensemble to keep tests quick.
pub fn service(root: &Path) -> AirQualityService {
    let trainer = Trainer::new(TrainerConfig { n_estimators: 20, ..Default::default() }).unwrap();
    AirQualityService::new(ArtifactStore::new(root.to_path_buf()), trainer)
}
