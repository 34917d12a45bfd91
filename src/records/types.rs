use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A physical site (e.g. a care home) under which users and their meal
/// records are grouped. Created once via registration, immutable after.
#[derive(Debug, Clone, PartialEq)]
pub struct Facility {
    pub id: String,
    pub name: String,
    pub submitted_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Display sequence number within the facility, assigned at creation as
    /// count(existing users)+1. Not guaranteed unique under concurrent
    /// registration against the remote store; treat as display-only.
    pub number: String,
    pub facility_id: String,
    pub submitted_at_ms: i64,
}

/// One uploaded tray photo. `meals` stays `None` until analysis completes;
/// `None` means "not yet analyzed", never "zero meals".
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub id: String,
    pub url: String,
    pub submitted_at_ms: i64,
    pub meals: Option<Vec<Meal>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MealLabel {
    Staple,
    Side,
    Other(String),
}

impl From<String> for MealLabel {
    fn from(s: String) -> Self {
        match s.as_str() {
            "staple" => MealLabel::Staple,
            "side" => MealLabel::Side,
            _ => MealLabel::Other(s),
        }
    }
}

impl From<MealLabel> for String {
    fn from(label: MealLabel) -> Self {
        match label {
            MealLabel::Staple => "staple".to_string(),
            MealLabel::Side => "side".to_string(),
            MealLabel::Other(s) => s,
        }
    }
}

/// A single dish the vision model recognized on a tray. Immutable once
/// attached to an [`ImageRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub name: String,
    /// Comma-separated free text, e.g. "carbohydrate, protein".
    pub nutrients: String,
    /// Estimated weight in grams. The model frequently quotes the number,
    /// so deserialization also accepts a numeric string.
    #[serde(deserialize_with = "de_grams")]
    pub weight: i64,
    pub label: MealLabel,
    /// Fraction left uneaten: 0.0 = fully consumed, 1.0 = untouched.
    /// Clamped into [0, 1] on decode.
    #[serde(deserialize_with = "de_fraction")]
    pub remaining: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(i64),
    Float(f64),
    Text(String),
}

fn de_grams<'de, D: serde::Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    match NumberOrString::deserialize(de)? {
        NumberOrString::Int(n) => Ok(n),
        NumberOrString::Float(f) => Ok(f.round() as i64),
        NumberOrString::Text(s) => s
            .trim()
            .parse::<i64>()
            .or_else(|_| s.trim().parse::<f64>().map(|f| f.round() as i64))
            .map_err(serde::de::Error::custom),
    }
}

fn de_fraction<'de, D: serde::Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
    let raw = match NumberOrString::deserialize(de)? {
        NumberOrString::Int(n) => n as f64,
        NumberOrString::Float(f) => f,
        NumberOrString::Text(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom)?,
    };
    Ok(raw.clamp(0.0, 1.0))
}

pub(crate) fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod meal_tests {
    use super::*;

    #[test]
    fn label_maps_known_strings_and_keeps_unknown() {
        assert_eq!(MealLabel::from("staple".to_string()), MealLabel::Staple);
        assert_eq!(MealLabel::from("side".to_string()), MealLabel::Side);
        assert_eq!(
            MealLabel::from("dessert".to_string()),
            MealLabel::Other("dessert".to_string())
        );
        assert_eq!(String::from(MealLabel::Staple), "staple");
    }

    #[test]
    fn meal_decodes_quoted_weight_and_clamps_remaining() {
        let meal: Meal = serde_json::from_str(
            r#"{"name":"rice","nutrients":"carbohydrate","weight":"150","label":"staple","remaining":1.4}"#,
        )
        .unwrap();
        assert_eq!(meal.weight, 150);
        assert_eq!(meal.remaining, 1.0);
        assert_eq!(meal.label, MealLabel::Staple);
    }

    #[test]
    fn meal_rejects_non_numeric_weight() {
        let res = serde_json::from_str::<Meal>(
            r#"{"name":"soup","nutrients":"sodium","weight":"a bowl","label":"side","remaining":0.5}"#,
        );
        assert!(res.is_err());
    }
}
