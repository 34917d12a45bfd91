//! CSV export for daily review, one row per user carrying the staple and
//! side average leftover percentages. Pure formatting over already-fetched
//! records; delivery (mail etc.) is the caller's concern.

use std::collections::HashMap;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::records::{ImageRecord, Meal, MealLabel, User};

const CSV_HEADER: &str = "施設名,記録日時,氏名,主食の残食率,副食の残食率";

/// Mean `remaining` over meals carrying `label`, as a percentage.
/// 0.0 when no meal matches (also for a not-yet-analyzed image).
pub fn label_average(meals: &[Meal], label: &MealLabel) -> f64 {
    let remaining: Vec<f64> = meals
        .iter()
        .filter(|m| &m.label == label)
        .map(|m| m.remaining)
        .collect();
    if remaining.is_empty() {
        return 0.0;
    }
    remaining.iter().sum::<f64>() / remaining.len() as f64 * 100.0
}

/// Most recently submitted record, the one the daily row reports on.
pub fn latest_image(images: &[ImageRecord]) -> Option<&ImageRecord> {
    images.iter().max_by_key(|img| img.submitted_at_ms)
}

/// Builds the export CSV. Users without an image that day are skipped.
pub fn generate_csv(
    facility_name: &str,
    users: &[User],
    latest_images: &HashMap<String, ImageRecord>,
) -> String {
    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');

    for user in users {
        let Some(image) = latest_images.get(&user.id) else {
            continue;
        };
        let meals = image.meals.as_deref().unwrap_or(&[]);
        let staple = label_average(meals, &MealLabel::Staple);
        let side = label_average(meals, &MealLabel::Side);
        csv.push_str(&format!(
            "{},{},{},{staple:.1},{side:.1}\n",
            facility_name,
            format_timestamp(image.submitted_at_ms),
            user.name,
        ));
    }
    csv
}

fn format_timestamp(millis: i64) -> String {
    let fmt = format_description!("[year]/[month]/[day] [hour]:[minute]");
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .ok()
        .and_then(|t| t.format(&fmt).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod export_tests {
    use super::*;

    fn meal(label: MealLabel, remaining: f64) -> Meal {
        Meal {
            name: "dish".to_string(),
            nutrients: "protein".to_string(),
            weight: 100,
            label,
            remaining,
        }
    }

    fn user(id: &str, name: &str) -> User {
        User {
            id: id.to_string(),
            name: name.to_string(),
            number: "1".to_string(),
            facility_id: "f1".to_string(),
            submitted_at_ms: 0,
        }
    }

    fn image(id: &str, at_ms: i64, meals: Option<Vec<Meal>>) -> ImageRecord {
        ImageRecord {
            id: id.to_string(),
            url: format!("https://store/images/{id}.jpg"),
            submitted_at_ms: at_ms,
            meals,
        }
    }

    #[test]
    fn averages_are_per_label_percentages() {
        let meals = vec![
            meal(MealLabel::Staple, 0.2),
            meal(MealLabel::Staple, 0.4),
            meal(MealLabel::Side, 1.0),
            meal(MealLabel::Other("dessert".to_string()), 0.5),
        ];
        assert!((label_average(&meals, &MealLabel::Staple) - 30.0).abs() < 1e-9);
        assert!((label_average(&meals, &MealLabel::Side) - 100.0).abs() < 1e-9);
        assert_eq!(label_average(&[], &MealLabel::Staple), 0.0);
    }

    #[test]
    fn csv_rows_cover_users_with_images_only() {
        let users = vec![user("u1", "Tanaka"), user("u2", "Suzuki")];
        let mut latest = HashMap::new();
        // 2024-06-08T03:30:00Z
        latest.insert(
            "u1".to_string(),
            image("img1", 1_717_817_400_000, Some(vec![meal(MealLabel::Staple, 0.2)])),
        );

        let csv = generate_csv("Sakura Home", &users, &latest);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2, "header plus one row");
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "Sakura Home,2024/06/08 03:30,Tanaka,20.0,0.0");
    }

    #[test]
    fn unanalyzed_image_reports_zero_averages() {
        let users = vec![user("u1", "Tanaka")];
        let mut latest = HashMap::new();
        latest.insert("u1".to_string(), image("img1", 0, None));

        let csv = generate_csv("Sakura Home", &users, &latest);
        assert!(csv.lines().nth(1).unwrap().ends_with(",0.0,0.0"));
    }

    #[test]
    fn latest_image_picks_newest_submission() {
        let images = vec![image("a", 10, None), image("b", 30, None), image("c", 20, None)];
        assert_eq!(latest_image(&images).unwrap().id, "b");
        assert!(latest_image(&[]).is_none());
    }
}
