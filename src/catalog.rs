//! # Ingredient Catalog
//!
//! Fixed, ordered list of known ingredients loaded once at startup.
//! An ingredient's id is its position in the list.

use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use tracing::{info, warn};

const EMBEDDED_CATALOG: &str = include_str!("../config/ingredients.json");

/// A known ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    /// Position in the catalog
    #[serde(skip_deserializing, default)]
    pub id: usize,
    /// Canonical display name; also the stock key
    pub name: String,
    /// Icon reference used by the confirmation surface
    #[serde(rename = "img", default)]
    pub image_ref: Option<String>,
    /// Alternative spellings recognized by the matcher
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    ingredients: Vec<Ingredient>,
}

/// Immutable ingredient catalog with name and alias lookup
#[derive(Debug, Clone)]
pub struct Catalog {
    ingredients: Vec<Ingredient>,
    by_key: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog, assigning positional ids.
    ///
    /// Names must be non-empty and unique. A name always takes precedence over
    /// another ingredient's alias; among aliases the first ingredient wins.
    pub fn from_ingredients(ingredients: Vec<Ingredient>) -> AppResult<Self> {
        let mut ingredients = ingredients;
        let mut by_key = HashMap::new();

        for (id, ingredient) in ingredients.iter_mut().enumerate() {
            ingredient.id = id;
            let name = ingredient.name.trim();
            if name.is_empty() {
                return Err(AppError::Catalog(format!(
                    "ingredient #{} has an empty name",
                    id
                )));
            }
            if by_key.insert(name.to_string(), id).is_some() {
                return Err(AppError::Catalog(format!(
                    "duplicate ingredient name '{}'",
                    name
                )));
            }
        }

        for ingredient in &ingredients {
            for alias in &ingredient.aliases {
                let alias = alias.trim();
                if !alias.is_empty() {
                    by_key.entry(alias.to_string()).or_insert(ingredient.id);
                }
            }
        }

        Ok(Self {
            ingredients,
            by_key,
        })
    }

    /// Parse a `{"ingredients": [{"name", "img", "aliases"}]}` document
    pub fn from_json(content: &str) -> AppResult<Self> {
        let file: CatalogFile = serde_json::from_str(content)
            .map_err(|e| AppError::Catalog(format!("invalid catalog JSON: {}", e)))?;
        Self::from_ingredients(file.ingredients)
    }

    /// Catalog compiled into the binary
    pub fn embedded() -> AppResult<Self> {
        Self::from_json(EMBEDDED_CATALOG)
    }

    /// Load from `path`, falling back to the embedded catalog when the file
    /// is missing or invalid
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        if let Some(path) = path {
            match fs::read_to_string(path)
                .map_err(AppError::from)
                .and_then(|content| Self::from_json(&content))
            {
                Ok(catalog) => {
                    info!(path = %path, ingredients = catalog.len(), "Loaded ingredient catalog");
                    return Ok(catalog);
                }
                Err(e) => {
                    warn!(
                        "Failed to load ingredient catalog from '{}': {}. Falling back to the embedded catalog.",
                        path, e
                    );
                }
            }
        }

        let catalog = Self::embedded()?;
        info!(ingredients = catalog.len(), "Using embedded ingredient catalog");
        Ok(catalog)
    }

    /// Ingredient by positional id
    pub fn get(&self, id: usize) -> Option<&Ingredient> {
        self.ingredients.get(id)
    }

    /// Ingredient by canonical name or alias
    pub fn find(&self, name_or_alias: &str) -> Option<&Ingredient> {
        self.by_key
            .get(name_or_alias.trim())
            .and_then(|id| self.ingredients.get(*id))
    }

    pub fn ingredients(&self) -> &[Ingredient] {
        &self.ingredients
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ingredients.iter().map(|i| i.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.ingredients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ingredients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_embedded_catalog() {
        let catalog = Catalog::embedded().expect("embedded catalog parses");
        assert!(!catalog.is_empty());
        let apple = catalog.find("とくせんリンゴ").expect("apple present");
        assert_eq!(apple.id, 0);
        assert_eq!(catalog.find("リンゴ").map(|i| i.id), Some(0));
        assert_eq!(catalog.get(0).map(|i| i.name.as_str()), Some("とくせんリンゴ"));
    }

    #[test]
    fn test_ids_are_positional() {
        let catalog = Catalog::from_json(
            r#"{"ingredients":[{"name":"A","aliases":["a1"]},{"name":"B","img":"b.png"}]}"#,
        )
        .expect("valid catalog");
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.find("B").map(|i| i.id), Some(1));
        assert_eq!(
            catalog.get(1).and_then(|i| i.image_ref.clone()),
            Some("b.png".to_string())
        );
        assert_eq!(catalog.find("a1").map(|i| i.id), Some(0));
    }

    #[test]
    fn test_name_beats_alias() {
        let catalog = Catalog::from_json(
            r#"{"ingredients":[{"name":"A","aliases":["B"]},{"name":"B"}]}"#,
        )
        .expect("valid catalog");
        assert_eq!(catalog.find("B").map(|i| i.id), Some(1));
    }

    #[test]
    fn test_rejects_duplicates_and_empty_names() {
        assert!(Catalog::from_json(r#"{"ingredients":[{"name":"A"},{"name":"A"}]}"#).is_err());
        assert!(Catalog::from_json(r#"{"ingredients":[{"name":"  "}]}"#).is_err());
        assert!(Catalog::from_json("not json").is_err());
    }

    #[test]
    fn test_load_from_file_and_fallback() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"ingredients":[{{"name":"X"}}]}}"#).expect("write");
        let path = file.path().to_string_lossy().to_string();
        let catalog = Catalog::load(Some(&path)).expect("load");
        assert_eq!(catalog.len(), 1);

        let fallback = Catalog::load(Some("/definitely/missing/catalog.json")).expect("fallback");
        assert_eq!(fallback.len(), Catalog::embedded().expect("embedded").len());
    }
}
