//! Wire format of the run backend.

use crate::error::NetworkError;
use crate::models::{Location, Run};
use crate::time_utils::parse_utc_rfc3339;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Run as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDto {
    pub id: String,
    pub date_time_utc: String,
    pub duration_millis: u64,
    pub distance_meters: i32,
    pub lat: f64,
    pub long: f64,
    pub avg_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub total_elevation_meters: i32,
    pub map_picture_url: Option<String>,
    pub avg_heart_rate: Option<u32>,
    pub max_heart_rate: Option<u32>,
}

/// Body of the `RUN_DATA` part when creating a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    pub id: String,
    pub duration_millis: u64,
    pub distance_meters: i32,
    pub epoch_millis: i64,
    pub lat: f64,
    pub long: f64,
    pub avg_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub total_elevation_meters: i32,
    pub avg_heart_rate: Option<u32>,
    pub max_heart_rate: Option<u32>,
}

impl TryFrom<RunDto> for Run {
    type Error = NetworkError;

    fn try_from(dto: RunDto) -> Result<Self, Self::Error> {
        let date_time_utc = parse_utc_rfc3339(&dto.date_time_utc).map_err(|e| {
            tracing::warn!(run_id = %dto.id, error = %e, "Backend sent invalid run date");
            NetworkError::Serialization
        })?;

        Ok(Run {
            id: Some(dto.id),
            duration: Duration::from_millis(dto.duration_millis),
            date_time_utc,
            distance_meters: dto.distance_meters,
            location: Location {
                lat: dto.lat,
                long: dto.long,
            },
            max_speed_kmh: dto.max_speed_kmh,
            total_elevation_meters: dto.total_elevation_meters,
            map_picture_url: dto.map_picture_url,
            avg_heart_rate: dto.avg_heart_rate,
            max_heart_rate: dto.max_heart_rate,
            // The backend does not keep location samples
            path: Vec::new(),
        })
    }
}

impl TryFrom<&Run> for CreateRunRequest {
    type Error = NetworkError;

    fn try_from(run: &Run) -> Result<Self, Self::Error> {
        let id = run.id.clone().ok_or_else(|| {
            tracing::warn!("Refusing to upload a run without an id");
            NetworkError::Serialization
        })?;

        Ok(CreateRunRequest {
            id,
            duration_millis: run.duration.as_millis() as u64,
            distance_meters: run.distance_meters,
            epoch_millis: run.date_time_utc.timestamp_millis(),
            lat: run.location.lat,
            long: run.location.long,
            avg_speed_kmh: run.avg_speed_kmh(),
            max_speed_kmh: run.max_speed_kmh,
            total_elevation_meters: run.total_elevation_meters,
            avg_heart_rate: run.avg_heart_rate,
            max_heart_rate: run.max_heart_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn dto_json() -> serde_json::Value {
        serde_json::json!({
            "id": "srv-1",
            "dateTimeUtc": "2024-06-01T07:15:00Z",
            "durationMillis": 1_800_000,
            "distanceMeters": 6000,
            "lat": 37.4,
            "long": -122.1,
            "avgSpeedKmh": 12.0,
            "maxSpeedKmh": 16.5,
            "totalElevationMeters": 40,
            "mapPictureUrl": "https://cdn.example.com/srv-1.jpg",
            "avgHeartRate": 151,
            "maxHeartRate": null
        })
    }

    #[test]
    fn test_run_from_dto() {
        let dto: RunDto = serde_json::from_value(dto_json()).unwrap();
        let run = Run::try_from(dto).unwrap();

        assert_eq!(run.id.as_deref(), Some("srv-1"));
        assert_eq!(run.duration, Duration::from_secs(1800));
        assert_eq!(
            run.date_time_utc,
            Utc.with_ymd_and_hms(2024, 6, 1, 7, 15, 0).unwrap()
        );
        assert_eq!(run.avg_heart_rate, Some(151));
        assert_eq!(run.max_heart_rate, None);
        assert!(run.path.is_empty());
    }

    #[test]
    fn test_invalid_date_is_serialization_error() {
        let mut json = dto_json();
        json["dateTimeUtc"] = serde_json::json!("yesterday");
        let dto: RunDto = serde_json::from_value(json).unwrap();
        assert_eq!(Run::try_from(dto).unwrap_err(), NetworkError::Serialization);
    }

    #[test]
    fn test_create_request_uses_camel_case_and_epoch_millis() {
        let dto: RunDto = serde_json::from_value(dto_json()).unwrap();
        let run = Run::try_from(dto).unwrap();
        let request = CreateRunRequest::try_from(&run).unwrap();
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["id"], "srv-1");
        assert_eq!(json["epochMillis"], 1_717_226_100_000_i64);
        assert_eq!(json["durationMillis"], 1_800_000);
        assert_eq!(json["avgSpeedKmh"], 12.0);
    }

    #[test]
    fn test_create_request_requires_id() {
        let dto: RunDto = serde_json::from_value(dto_json()).unwrap();
        let mut run = Run::try_from(dto).unwrap();
        run.id = None;
        assert_eq!(
            CreateRunRequest::try_from(&run).unwrap_err(),
            NetworkError::Serialization
        );
    }
}
