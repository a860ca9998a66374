//! Tolerant reader for the character file.
//!
//! The character sheet belongs to the rules engine; this crate only needs the
//! level, experience and inventory. Both the saved-character envelope
//! (`{"version", "character": {...}}`) and a bare character object are accepted.

use serde_json::Value;
use std::path::Path;
use tokio::fs;

/// Errors reading the character file.
#[derive(Debug, thiserror::Error)]
pub enum CharacterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Character file is not a JSON object")]
    InvalidFormat,
}

/// The slice of a character sheet that session tracking cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharacterProgress {
    pub name: Option<String>,
    pub level: u32,
    pub experience: u64,
    pub inventory: Vec<String>,
}

impl CharacterProgress {
    /// Read and parse a character file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CharacterError> {
        let content = fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse character JSON.
    pub fn parse(content: &str) -> Result<Self, CharacterError> {
        let root: Value = serde_json::from_str(content)?;
        let sheet = match root.get("character") {
            Some(nested) if nested.is_object() => nested,
            _ => &root,
        };
        if !sheet.is_object() {
            return Err(CharacterError::InvalidFormat);
        }

        let level = sheet
            .get("level")
            .and_then(Value::as_u64)
            .map(|l| l as u32)
            .unwrap_or(1);

        let experience = sheet
            .get("experience")
            .or_else(|| sheet.get("xp"))
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let inventory = match sheet.get("inventory") {
            Some(Value::Array(items)) => item_names(items),
            Some(Value::Object(inv)) => inv
                .get("items")
                .and_then(Value::as_array)
                .map(|items| item_names(items))
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        Ok(Self {
            name: sheet.get("name").and_then(Value::as_str).map(str::to_string),
            level,
            experience,
            inventory,
        })
    }
}

fn item_names(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(name) => Some(name.clone()),
            Value::Object(obj) => {
                let name = obj.get("name")?.as_str()?;
                match obj.get("quantity").and_then(Value::as_u64) {
                    Some(q) if q > 1 => Some(format!("{name} x{q}")),
                    _ => Some(name.to_string()),
                }
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_character() {
        let progress = CharacterProgress::parse(
            r#"{"name": "Thorin", "level": 3, "experience": 900, "inventory": ["Rope", "Torch"]}"#,
        )
        .unwrap();

        assert_eq!(progress.name.as_deref(), Some("Thorin"));
        assert_eq!(progress.level, 3);
        assert_eq!(progress.experience, 900);
        assert_eq!(progress.inventory, vec!["Rope", "Torch"]);
    }

    #[test]
    fn test_parse_saved_character_envelope() {
        let progress = CharacterProgress::parse(
            r#"{
                "version": 1,
                "character": {
                    "level": 2,
                    "experience": 300,
                    "inventory": {
                        "items": [
                            {"name": "Healing Potion", "quantity": 3},
                            {"name": "Longsword", "quantity": 1}
                        ],
                        "gold": 12.5
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(progress.level, 2);
        assert_eq!(progress.experience, 300);
        assert_eq!(progress.inventory, vec!["Healing Potion x3", "Longsword"]);
    }

    #[test]
    fn test_parse_defaults_and_xp_alias() {
        let progress = CharacterProgress::parse(r#"{"xp": 50}"#).unwrap();
        assert_eq!(progress.level, 1);
        assert_eq!(progress.experience, 50);
        assert!(progress.inventory.is_empty());
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(matches!(
            CharacterProgress::parse("[1, 2, 3]"),
            Err(CharacterError::InvalidFormat)
        ));
        assert!(matches!(
            CharacterProgress::parse("not json"),
            Err(CharacterError::Json(_))
        ));
    }
}
