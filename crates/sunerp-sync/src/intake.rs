//! PV project intake
//!
//! Normalizes raw lead rows (web forms, partner exports) into [`PvIntake`]
//! records and aggregates the features sales planning looks at: roof types,
//! requested capacity and battery storage interest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::connector::RecordError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoofType {
    Pitched,
    Flat,
    Mixed,
    Other,
}

impl RoofType {
    /// Lenient mapping of free-text roof descriptions (English and German)
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "pitched" | "gable" | "hip" | "satteldach" | "walmdach" | "steildach" => RoofType::Pitched,
            "flat" | "flachdach" => RoofType::Flat,
            "mixed" | "gemischt" => RoofType::Mixed,
            _ => RoofType::Other,
        }
    }
}

/// Normalized intake data for one prospective PV project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvIntake {
    pub id: String,
    pub name: String,
    pub roof_type: RoofType,
    pub desired_capacity_kwp: Option<f64>,
    pub storage_requested: bool,
}

impl PvIntake {
    /// Build from a raw row; returns a description of the problem on failure
    pub fn from_row(row: &Map<String, Value>) -> Result<Self, String> {
        let id = text_field(row, &["id", "lead_id", "leadId"]).ok_or("missing id")?;
        let name = text_field(row, &["name", "contact_name", "contactName"]).ok_or("missing name")?;

        let roof_type = text_field(row, &["roof_type", "roofType"])
            .map(|label| RoofType::from_label(&label))
            .unwrap_or(RoofType::Other);

        let desired_capacity_kwp = match text_field(row, &["desired_capacity_kwp", "desiredCapacityKwp"]) {
            None => None,
            Some(raw) => {
                let kwp: f64 = raw
                    .replace(',', ".")
                    .parse()
                    .map_err(|_| format!("desired capacity '{raw}' is not a number"))?;
                if !kwp.is_finite() || kwp < 0.0 {
                    return Err(format!("desired capacity '{raw}' must be a positive number"));
                }
                Some(kwp)
            },
        };

        let storage_requested = text_field(row, &["storage", "storage_requested", "storageRequested"])
            .map(|v| matches!(v.to_lowercase().as_str(), "yes" | "y" | "true" | "1" | "ja"))
            .unwrap_or(false);

        Ok(Self {
            id,
            name,
            roof_type,
            desired_capacity_kwp,
            storage_requested,
        })
    }
}

fn text_field(row: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match row.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Split raw rows into valid intakes and per-row errors
pub fn normalize_leads(rows: &[Value]) -> (Vec<PvIntake>, Vec<RecordError>) {
    let mut intakes = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();

    for row in rows {
        let parsed = match row {
            Value::Object(map) => PvIntake::from_row(map),
            _ => Err("row is not an object".to_string()),
        };
        match parsed {
            Ok(intake) => intakes.push(intake),
            Err(message) => errors.push(RecordError::new(message, row.clone())),
        }
    }

    (intakes, errors)
}

/// Aggregated lead features
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeFeatures {
    pub lead_count: usize,
    pub by_roof_type: BTreeMap<RoofType, usize>,
    pub total_capacity_kwp: f64,
    pub average_capacity_kwp: Option<f64>,
    pub storage_requested: usize,
}

/// Aggregate features over a batch of intakes
pub fn aggregate_features(intakes: &[PvIntake]) -> IntakeFeatures {
    let mut features = IntakeFeatures {
        lead_count: intakes.len(),
        ..IntakeFeatures::default()
    };
    let mut with_capacity = 0usize;

    for intake in intakes {
        *features.by_roof_type.entry(intake.roof_type).or_default() += 1;
        if let Some(kwp) = intake.desired_capacity_kwp {
            features.total_capacity_kwp += kwp;
            with_capacity += 1;
        }
        if intake.storage_requested {
            features.storage_requested += 1;
        }
    }

    if with_capacity > 0 {
        features.average_capacity_kwp = Some(features.total_capacity_kwp / with_capacity as f64);
    }

    features
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_row_maps_fields() {
        let intake = PvIntake::from_row(&row(json!({
            "id": "L-100",
            "name": "Familie Berger",
            "roof_type": "Satteldach",
            "desired_capacity_kwp": "9,8",
            "storage": "ja"
        })))
        .unwrap();

        assert_eq!(intake.roof_type, RoofType::Pitched);
        assert_eq!(intake.desired_capacity_kwp, Some(9.8));
        assert!(intake.storage_requested);
    }

    #[test]
    fn test_from_row_rejects_bad_capacity() {
        let err = PvIntake::from_row(&row(json!({
            "id": "L-101",
            "name": "Hofladen Kunz",
            "desired_capacity_kwp": "lots"
        })))
        .unwrap_err();
        assert!(err.contains("lots"));

        let err = PvIntake::from_row(&row(json!({
            "id": "L-102",
            "name": "Kita Sonnenschein",
            "desired_capacity_kwp": "-3"
        })))
        .unwrap_err();
        assert!(err.contains("positive"));
    }

    #[test]
    fn test_normalize_collects_errors() {
        let rows = vec![
            json!({ "id": "1", "name": "A", "roof_type": "flat" }),
            json!({ "id": "", "name": "B" }),
            json!("not a row"),
        ];

        let (intakes, errors) = normalize_leads(&rows);
        assert_eq!(intakes.len(), 1);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "missing id");
        assert_eq!(errors[1].item, json!("not a row"));
    }

    #[test]
    fn test_aggregate_features() {
        let intakes = vec![
            PvIntake {
                id: "1".into(),
                name: "A".into(),
                roof_type: RoofType::Pitched,
                desired_capacity_kwp: Some(10.0),
                storage_requested: true,
            },
            PvIntake {
                id: "2".into(),
                name: "B".into(),
                roof_type: RoofType::Pitched,
                desired_capacity_kwp: Some(6.0),
                storage_requested: false,
            },
            PvIntake {
                id: "3".into(),
                name: "C".into(),
                roof_type: RoofType::Flat,
                desired_capacity_kwp: None,
                storage_requested: true,
            },
        ];

        let features = aggregate_features(&intakes);
        assert_eq!(features.lead_count, 3);
        assert_eq!(features.by_roof_type[&RoofType::Pitched], 2);
        assert_eq!(features.by_roof_type[&RoofType::Flat], 1);
        assert_eq!(features.total_capacity_kwp, 16.0);
        assert_eq!(features.average_capacity_kwp, Some(8.0));
        assert_eq!(features.storage_requested, 2);

        let value = serde_json::to_value(&features).unwrap();
        assert_eq!(value["byRoofType"]["pitched"], json!(2));
    }

    #[test]
    fn test_aggregate_empty_batch() {
        let features = aggregate_features(&[]);
        assert_eq!(features.lead_count, 0);
        assert!(features.average_capacity_kwp.is_none());
    }
}
