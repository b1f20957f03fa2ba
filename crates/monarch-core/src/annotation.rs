//! Types shared with the external annotation system.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::record::ObservationId;

/// Life stage label assigned by annotators.
///
/// The `labels` table constrains its `life_stage` column to these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifeStage {
    Egg,
    Larva,
    Pupa,
    Adult,
    Unknown,
}

impl LifeStage {
    pub const ALL: [LifeStage; 5] = [
        LifeStage::Egg,
        LifeStage::Larva,
        LifeStage::Pupa,
        LifeStage::Adult,
        LifeStage::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Egg => "Egg",
            Self::Larva => "Larva",
            Self::Pupa => "Pupa",
            Self::Adult => "Adult",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for LifeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifeStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown life stage: {s}"))
    }
}

/// Task payload imported into the annotation system for one stored record.
///
/// The stored record is the source of truth; this is a denormalised view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationTask {
    /// Local reference path the annotation system serves the image from.
    pub image: String,
    pub observation_id: String,
    pub source_uri: String,
    pub observed_on: String,
    pub observer: String,
    pub location: String,
}

const UNKNOWN: &str = "Unknown";

impl AnnotationTask {
    /// Build a task from the stored columns, filling gaps with placeholders.
    pub fn from_row(
        id: ObservationId,
        source_uri: Option<String>,
        observed_on: Option<NaiveDate>,
        observer: Option<String>,
        location: Option<String>,
        image: Option<String>,
    ) -> Self {
        Self {
            image: image.unwrap_or_default(),
            observation_id: id.to_string(),
            source_uri: source_uri.unwrap_or_else(|| "N/A".into()),
            observed_on: observed_on
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| UNKNOWN.into()),
            observer: observer.unwrap_or_else(|| UNKNOWN.into()),
            location: location.unwrap_or_else(|| UNKNOWN.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn life_stage_parses_case_insensitively() {
        assert_eq!("larva".parse::<LifeStage>().unwrap(), LifeStage::Larva);
        assert_eq!(" PUPA ".parse::<LifeStage>().unwrap(), LifeStage::Pupa);
        assert!("chrysalis".parse::<LifeStage>().is_err());
    }

    #[test]
    fn life_stage_display_matches_as_str() {
        for stage in LifeStage::ALL {
            assert_eq!(stage.to_string(), stage.as_str());
        }
    }

    #[test]
    fn task_placeholders() {
        let task = AnnotationTask::from_row(42, None, None, None, None, Some("/data/images/42.jpg".into()));
        assert_eq!(task.observation_id, "42");
        assert_eq!(task.source_uri, "N/A");
        assert_eq!(task.observed_on, "Unknown");
        assert_eq!(task.observer, "Unknown");
        assert_eq!(task.location, "Unknown");
        assert_eq!(task.image, "/data/images/42.jpg");
    }

    #[test]
    fn task_formats_date() {
        let task = AnnotationTask::from_row(
            1,
            Some("https://example.org/observations/1".into()),
            NaiveDate::from_ymd_opt(2023, 3, 9),
            Some("obs".into()),
            Some("Oaxaca".into()),
            None,
        );
        assert_eq!(task.observed_on, "2023-03-09");
        assert_eq!(task.observer, "obs");
    }

    #[test]
    fn task_json_shape() {
        let task = AnnotationTask::from_row(5, None, None, None, None, None);
        let json = serde_json::to_value(&task).unwrap();
        for key in ["image", "observation_id", "source_uri", "observed_on", "observer", "location"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
