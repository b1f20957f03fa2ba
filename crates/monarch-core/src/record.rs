//! Catalog candidates and the persisted observation record.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::coords::{Coordinates, parse_coordinates};

/// Stable external identifier of a catalog observation.
pub type ObservationId = i64;

/// Why a candidate cannot become a [`Record`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CandidateError {
    #[error("observation {id} is missing required field `{field}`")]
    MissingField {
        id: ObservationId,
        field: &'static str,
    },
}

/// The submitting user of an observation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Submitter {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// One photo attached to an observation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Photo {
    #[serde(default)]
    pub url: Option<String>,
}

/// A community identification attached to an observation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identification {
    #[serde(default, deserialize_with = "null_as_default")]
    pub current: bool,
    #[serde(default)]
    pub category: Option<String>,
}

/// A not-yet-verified observation returned by the remote catalog.
///
/// Only the fields the pipeline reads are typed; the full source document is
/// kept in `raw` so later schema changes can re-derive columns from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: ObservationId,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub observed_on: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user: Submitter,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub place_guess: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub photos: Vec<Photo>,
    #[serde(default)]
    pub quality_grade: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub identifications: Vec<Identification>,
    #[serde(default)]
    pub license_code: Option<String>,
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl Candidate {
    /// Decode a catalog result, retaining the verbatim document in `raw`.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut candidate: Candidate = serde_json::from_value(value.clone())?;
        candidate.raw = value;
        Ok(candidate)
    }

    /// URL of the first photo, resized to `size` (e.g. `"medium"`).
    ///
    /// The catalog returns thumbnail URLs whose size is a path segment
    /// (`.../photos/123/square.jpg`); only that segment is rewritten.
    pub fn asset_url(&self, size: &str) -> Option<String> {
        let url = self.photos.first()?.url.as_deref()?.trim();
        if url.is_empty() {
            return None;
        }
        Some(resize_photo_url(url, size))
    }

    /// Current identifications agreeing with the community taxon.
    pub fn agreement_count(&self) -> u32 {
        self.count_current("improving")
    }

    /// Current identifications disagreeing with the community taxon.
    pub fn disagreement_count(&self) -> u32 {
        self.count_current("maverick")
    }

    fn count_current(&self, category: &str) -> u32 {
        self.identifications
            .iter()
            .filter(|i| i.current && i.category.as_deref() == Some(category))
            .count() as u32
    }
}

fn resize_photo_url(url: &str, size: &str) -> String {
    match url.rsplit_once('/') {
        Some((base, file)) if file.starts_with("square.") || file == "square" => {
            format!("{base}/{}", file.replacen("square", size, 1))
        }
        _ => url.to_string(),
    }
}

/// One durably stored observation.
///
/// Created once by the acquisition pipeline and never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: ObservationId,
    pub source_uri: String,
    pub observed_at: Option<NaiveDate>,
    pub submitter_handle: Option<String>,
    pub submitter_name: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub place_text: Option<String>,
    pub asset_url: String,
    /// Set only once the asset is on durable storage.
    pub local_asset_path: Option<String>,
    pub quality_tier: Option<String>,
    pub agreement_count: u32,
    pub disagreement_count: u32,
    pub license_code: Option<String>,
    pub raw_payload: serde_json::Value,
}

impl Record {
    /// Build a record from a catalog candidate and its resolved asset URL.
    ///
    /// `local_asset_path` starts empty; the pipeline fills it in after the
    /// asset has been written.
    pub fn from_candidate(candidate: &Candidate, asset_url: String) -> Result<Self, CandidateError> {
        let source_uri = candidate
            .uri
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(CandidateError::MissingField {
                id: candidate.id,
                field: "uri",
            })?
            .to_string();

        let observed_at = candidate
            .observed_on
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok());

        Ok(Self {
            id: candidate.id,
            source_uri,
            observed_at,
            submitter_handle: candidate.user.login.clone(),
            submitter_name: candidate.user.name.clone(),
            coordinates: candidate.location.as_deref().and_then(parse_coordinates),
            place_text: candidate.place_guess.clone(),
            asset_url,
            local_asset_path: None,
            quality_tier: candidate.quality_grade.clone(),
            agreement_count: candidate.agreement_count(),
            disagreement_count: candidate.disagreement_count(),
            license_code: candidate.license_code.clone(),
            raw_payload: candidate.raw.clone(),
        })
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "id": 123456,
            "uri": "https://www.inaturalist.org/observations/123456",
            "observed_on": "2024-08-14",
            "user": { "login": "lepidoptera_fan", "name": "Ana Ruiz" },
            "location": "19.5,-100.25",
            "place_guess": "Michoacán, MX",
            "photos": [
                { "url": "https://static.inaturalist.org/photos/99/square.jpg" },
                { "url": "https://static.inaturalist.org/photos/100/square.jpg" }
            ],
            "quality_grade": "research",
            "identifications": [
                { "current": true, "category": "improving" },
                { "current": true, "category": "improving" },
                { "current": false, "category": "improving" },
                { "current": true, "category": "maverick" },
                { "current": true, "category": "supporting" }
            ],
            "license_code": "cc-by-nc",
            "taxon": { "id": 48662 }
        })
    }

    #[test]
    fn candidate_keeps_raw_document() {
        let value = sample();
        let candidate = Candidate::from_value(value.clone()).unwrap();
        assert_eq!(candidate.id, 123456);
        assert_eq!(candidate.raw, value);
        assert_eq!(candidate.raw["taxon"]["id"], 48662);
    }

    #[test]
    fn asset_url_uses_first_photo_resized() {
        let candidate = Candidate::from_value(sample()).unwrap();
        assert_eq!(
            candidate.asset_url("medium").as_deref(),
            Some("https://static.inaturalist.org/photos/99/medium.jpg")
        );
    }

    #[test]
    fn asset_url_leaves_other_sizes_alone() {
        let mut value = sample();
        value["photos"] = json!([{ "url": "https://example.org/photos/1/large.jpeg" }]);
        let candidate = Candidate::from_value(value).unwrap();
        assert_eq!(
            candidate.asset_url("medium").as_deref(),
            Some("https://example.org/photos/1/large.jpeg")
        );
    }

    #[test]
    fn no_photos_means_no_asset() {
        let mut value = sample();
        value["photos"] = json!([]);
        assert!(Candidate::from_value(value).unwrap().asset_url("medium").is_none());

        let mut value = sample();
        value["photos"] = serde_json::Value::Null;
        assert!(Candidate::from_value(value).unwrap().asset_url("medium").is_none());

        let mut value = sample();
        value["photos"] = json!([{ "url": null }]);
        assert!(Candidate::from_value(value).unwrap().asset_url("medium").is_none());
    }

    #[test]
    fn identification_counts() {
        let candidate = Candidate::from_value(sample()).unwrap();
        assert_eq!(candidate.agreement_count(), 2);
        assert_eq!(candidate.disagreement_count(), 1);
    }

    #[test]
    fn minimal_candidate_decodes() {
        let candidate = Candidate::from_value(json!({ "id": 7, "user": null })).unwrap();
        assert_eq!(candidate.id, 7);
        assert!(candidate.photos.is_empty());
        assert!(candidate.user.login.is_none());
    }

    #[test]
    fn candidate_without_id_fails() {
        assert!(Candidate::from_value(json!({ "uri": "x" })).is_err());
    }

    #[test]
    fn record_from_candidate() {
        let candidate = Candidate::from_value(sample()).unwrap();
        let url = candidate.asset_url("medium").unwrap();
        let record = Record::from_candidate(&candidate, url).unwrap();
        assert_eq!(record.id, 123456);
        assert_eq!(record.observed_at, NaiveDate::from_ymd_opt(2024, 8, 14));
        assert_eq!(record.submitter_handle.as_deref(), Some("lepidoptera_fan"));
        assert_eq!(record.submitter_name.as_deref(), Some("Ana Ruiz"));
        assert_eq!(record.place_text.as_deref(), Some("Michoacán, MX"));
        let coords = record.coordinates.unwrap();
        assert_eq!(coords.latitude, 19.5);
        assert_eq!(coords.longitude, -100.25);
        assert_eq!(record.agreement_count, 2);
        assert_eq!(record.disagreement_count, 1);
        assert!(record.local_asset_path.is_none());
        assert_eq!(record.raw_payload["license_code"], "cc-by-nc");
    }

    #[test]
    fn record_requires_uri() {
        let mut value = sample();
        value["uri"] = json!("  ");
        let candidate = Candidate::from_value(value).unwrap();
        let err = Record::from_candidate(&candidate, "u".into()).unwrap_err();
        assert_eq!(
            err,
            CandidateError::MissingField {
                id: 123456,
                field: "uri"
            }
        );
    }

    #[test]
    fn malformed_location_leaves_coordinates_absent() {
        let mut value = sample();
        value["location"] = json!("19.5");
        let candidate = Candidate::from_value(value).unwrap();
        let record = Record::from_candidate(&candidate, "u".into()).unwrap();
        assert!(record.coordinates.is_none());
    }

    #[test]
    fn unparseable_date_is_null() {
        let mut value = sample();
        value["observed_on"] = json!("sometime in August");
        let candidate = Candidate::from_value(value).unwrap();
        let record = Record::from_candidate(&candidate, "u".into()).unwrap();
        assert!(record.observed_at.is_none());
    }
}
