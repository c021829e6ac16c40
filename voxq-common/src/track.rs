//! Track metadata record
//!
//! One `Track` is produced per JSON line of metadata resolver output. The
//! field names follow the resolver's JSON keys so a line can be decoded
//! directly.

use serde::{Deserialize, Deserializer, Serialize};

/// A playable remote track
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Track {
    /// Source-specific identifier
    pub id: String,
    pub title: String,
    pub description: String,
    /// Extended title (artist, uploader, ...)
    pub full_title: String,
    /// Thumbnail URL
    pub thumbnail: String,
    /// Page URL handed to the fetch stage
    pub webpage_url: String,
    /// Length in whole seconds
    #[serde(deserialize_with = "lenient_seconds")]
    pub duration: u64,
    /// Seconds left while playing; only meaningful on a now-playing snapshot
    pub remaining: u64,
}

impl Track {
    /// Copy of this track with `remaining` replaced
    pub fn with_remaining(&self, remaining: u64) -> Self {
        Self {
            remaining,
            ..self.clone()
        }
    }

    /// Human readable label used in logs
    pub fn label(&self) -> &str {
        if self.title.is_empty() {
            &self.webpage_url
        } else {
            &self.title
        }
    }
}

/// Accepts integer, float (truncated) or null durations
fn lenient_seconds<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_resolver_line() {
        let line = r#"{"id":"abc123","title":"Song","description":"d","full_title":"Artist - Song",
            "thumbnail":"https://img/1.jpg","webpage_url":"https://example.com/watch?v=abc123",
            "duration":215,"extra_key":true}"#;
        let track: Track = serde_json::from_str(line).unwrap();

        assert_eq!(track.id, "abc123");
        assert_eq!(track.full_title, "Artist - Song");
        assert_eq!(track.webpage_url, "https://example.com/watch?v=abc123");
        assert_eq!(track.duration, 215);
        assert_eq!(track.remaining, 0);
    }

    #[test]
    fn test_missing_fields_default() {
        let track: Track = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert_eq!(track.id, "x");
        assert!(track.title.is_empty());
        assert_eq!(track.duration, 0);
    }

    #[test]
    fn test_float_and_null_duration() {
        let track: Track = serde_json::from_str(r#"{"duration":12.9}"#).unwrap();
        assert_eq!(track.duration, 12);

        let track: Track = serde_json::from_str(r#"{"duration":null}"#).unwrap();
        assert_eq!(track.duration, 0);
    }

    #[test]
    fn test_with_remaining_keeps_other_fields() {
        let track = Track {
            id: "a".into(),
            duration: 100,
            ..Default::default()
        };
        let snapshot = track.with_remaining(40);
        assert_eq!(snapshot.remaining, 40);
        assert_eq!(snapshot.duration, 100);
        assert_eq!(track.remaining, 0);
    }

    #[test]
    fn test_label_falls_back_to_url() {
        let track = Track {
            webpage_url: "https://example.com/a".into(),
            ..Default::default()
        };
        assert_eq!(track.label(), "https://example.com/a");
    }
}
