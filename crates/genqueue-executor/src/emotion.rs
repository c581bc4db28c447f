/// Index order: happy, sad, angry, surprised, fearful, disgusted, calm, other.
const VECTOR_LEN: usize = 8;
const OTHER_INDEX: usize = 7;
const DEFAULT_INTENSITY: f64 = 0.3;

fn emotion_index(token: &str) -> usize {
    match token.to_ascii_lowercase().as_str() {
        "happy" | "happiness" | "joy" | "joyful" | "高兴" | "开心" => 0,
        "sad" | "sadness" | "sorrow" | "悲伤" | "难过" => 1,
        "angry" | "anger" | "mad" | "愤怒" | "生气" => 2,
        "surprised" | "surprise" | "astonished" | "惊讶" => 3,
        "fearful" | "fear" | "scared" | "afraid" | "恐惧" | "害怕" => 4,
        "disgusted" | "disgust" | "厌恶" => 5,
        "calm" | "neutral" | "平静" => 6,
        _ => OTHER_INDEX,
    }
}

fn parse_intensity(intensity: Option<&str>) -> f64 {
    let Some(raw) = intensity else {
        return DEFAULT_INTENSITY;
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_INTENSITY;
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "weak" | "low" | "弱" => return 0.2,
        "medium" | "中" => return 0.3,
        "strong" | "high" | "强" => return 0.5,
        _ => {}
    }

    trimmed.parse::<f64>().unwrap_or(DEFAULT_INTENSITY)
}

/// Builds the 8-dim emotion vector a TTS back-end expects, per the synonym/intensity
/// mapping described in the settings contract. Empty or absent emotion yields zeros.
pub fn build_emotion_vector(emotion: Option<&str>, intensity: Option<&str>) -> [f64; VECTOR_LEN] {
    let mut vector = [0.0; VECTOR_LEN];
    let Some(emotion) = emotion else {
        return vector;
    };
    let trimmed = emotion.trim();
    if trimmed.is_empty() {
        return vector;
    }

    let index = emotion_index(trimmed);
    vector[index] = parse_intensity(intensity);
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_emotion_is_zero_vector() {
        assert_eq!(build_emotion_vector(None, None), [0.0; 8]);
        assert_eq!(build_emotion_vector(Some(""), Some("strong")), [0.0; 8]);
    }

    #[test]
    fn known_synonym_maps_to_its_index() {
        let v = build_emotion_vector(Some("joy"), Some("strong"));
        assert_eq!(v[0], 0.5);
        assert_eq!(v.iter().filter(|&&x| x != 0.0).count(), 1);
    }

    #[test]
    fn unknown_emotion_maps_to_other_with_default_intensity() {
        let v = build_emotion_vector(Some("bewildered"), None);
        assert_eq!(v[7], 0.3);
    }

    #[test]
    fn bare_float_intensity_is_used_verbatim() {
        let v = build_emotion_vector(Some("sad"), Some("0.42"));
        assert_eq!(v[1], 0.42);
    }
}
