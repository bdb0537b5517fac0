use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// File name of the definition inside a mod directory
pub const DEFINITION_FILE: &str = "mod.json";

/// One replaceable script as written in `mod.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchDefinition {
    /// ASCII comparison string identifying the existing script in memory
    pub signature: String,
    /// Replacement file, relative to the mod directory
    pub replacement: PathBuf,
    #[serde(default)]
    pub address_offset: i64,
}

/// Contents of a mod's `mod.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub contacts: Vec<String>,
    #[serde(default)]
    pub files: Vec<PatchDefinition>,
}

pub fn load_definition<P: AsRef<Path>>(path: P) -> Result<ModDefinition> {
    let content = fs::read_to_string(&path)?;
    let data = serde_json::from_str(&content)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_definition() {
        let json = r#"{
            "name": "Faster Menus",
            "files": [
                { "signature": "function MenuFade()", "replacement": "scripts/menu.nut" }
            ]
        }"#;
        let definition: ModDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(definition.name, "Faster Menus");
        assert!(definition.authors.is_empty());
        assert_eq!(definition.files.len(), 1);
        assert_eq!(definition.files[0].address_offset, 0);
        assert_eq!(
            definition.files[0].replacement,
            PathBuf::from("scripts/menu.nut")
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFINITION_FILE);
        let definition = ModDefinition {
            name: "Example".to_string(),
            version: "1.2".to_string(),
            authors: vec!["someone".to_string()],
            files: vec![PatchDefinition {
                signature: "sig".to_string(),
                replacement: "a.nut".into(),
                address_offset: -8,
            }],
            ..Default::default()
        };

        fs::write(&path, serde_json::to_string_pretty(&definition).unwrap()).unwrap();
        assert_eq!(load_definition(&path).unwrap(), definition);
    }
}
