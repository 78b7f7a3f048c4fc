use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Fallback used for any emotion code outside the table.
pub const NEUTRAL_EXPRESSION: &str = "neutral expression";

/// Sparse emotion-code table. Codes run from apocalyptic despair (-10) to
/// divine rapture (10); anything unmapped falls back to [`NEUTRAL_EXPRESSION`].
static EMOTION_DESCRIPTIONS: Lazy<HashMap<i32, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (-10, "apocalyptic despair and cosmic horror"),
        (-8, "extreme terror and overwhelming fear"),
        (-6, "devastating sorrow and deep anguish"),
        (-4, "intense anger and fury"),
        (-2, "sadness and disappointment"),
        (-1, "slight sadness or melancholy"),
        (0, "neutral and calm expression"),
        (1, "happiness and contentment"),
        (2, "joy and excitement"),
        (4, "euphoric joy and elation"),
        (6, "transcendent bliss and wonder"),
        (8, "cosmic ecstasy and divine joy"),
        (10, "divine rapture and ultimate bliss"),
    ])
});

pub fn describe_emotion(code: i32) -> &'static str {
    EMOTION_DESCRIPTIONS
        .get(&code)
        .copied()
        .unwrap_or(NEUTRAL_EXPRESSION)
}

fn intensity_phrase(hallucination_enabled: bool) -> &'static str {
    if hallucination_enabled {
        "extreme and exaggerated"
    } else {
        "subtle and realistic"
    }
}

/// Builds the transformation prompt sent to the vision model. Pure function
/// of its inputs; the surreal-elements clause is only present when
/// hallucination is enabled.
pub fn build_transformation_prompt(emotion: i32, hallucination_enabled: bool) -> String {
    let description = describe_emotion(emotion);
    let intensity = intensity_phrase(hallucination_enabled);
    let style_clause = if hallucination_enabled {
        "Feel free to add dramatic lighting, color shifts, or surreal elements that enhance the emotion."
    } else {
        "Keep the transformation natural and believable."
    };

    format!(
        "Transform this portrait image to show {description}. \
         Apply {intensity} emotional transformation while maintaining the person's identity and basic facial structure. \
         Focus on facial expression, eye emotion, mouth position, and overall emotional aura. \
         {style_clause} \
         Describe the transformed image in detail."
    )
}
