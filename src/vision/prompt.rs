use crate::db::Spot;

/// The classification prompt. Its reply contract limits the verdict to the
/// three labels `normalize` accepts.
pub fn occupancy_prompt(spot: &Spot) -> String {
    let description = spot.description.trim();
    let context = if description.is_empty() {
        String::new()
    } else {
        format!("\nWhat counts as this spot: {description}")
    };

    format!(
        r#"You are checking a single camera image of one monitored spot named "{name}".{context}

Decide whether the spot is currently occupied or free.
Answer "unknown" if the spot is not visible, the image is too dark or blurry, or you cannot tell.

Respond with only this JSON object and nothing else:
{{"state": "occupied" | "free" | "unknown", "confidence": <number between 0 and 1>, "reason": "<one short sentence>"}}"#,
        name = spot.name.trim(),
    )
}
