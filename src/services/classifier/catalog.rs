use crate::error::AppError;
use crate::models::diagnosis_types::SupportedPlant;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Single place where labels are attributed to plants: case-insensitive
/// substring containment. Replace this to move to an exact taxonomy.
pub fn plant_matches(label: &str, plant: &str) -> bool {
    label.to_lowercase().contains(&plant.to_lowercase())
}

/// Index-aligned class labels; position `i` names model output `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassCatalog {
    labels: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelFile {
    List(Vec<String>),
    Config { id2label: BTreeMap<String, String> },
}

impl ClassCatalog {
    pub fn new(labels: Vec<String>) -> Result<Self, AppError> {
        if labels.is_empty() {
            return Err(AppError::ModelLoad("Class catalog is empty".to_string()));
        }
        Ok(Self { labels })
    }

    /// Reads either a JSON array of labels or a config with an `id2label` map.
    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::ModelLoad(format!("Failed to read class names {}: {}", path.display(), e))
        })?;
        let parsed: LabelFile = serde_json::from_str(&content).map_err(|e| {
            AppError::ModelLoad(format!("Failed to parse class names {}: {}", path.display(), e))
        })?;

        match parsed {
            LabelFile::List(labels) => Self::new(labels),
            LabelFile::Config { id2label } => Self::new(ordered_id2label(id2label)?),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

fn ordered_id2label(id2label: BTreeMap<String, String>) -> Result<Vec<String>, AppError> {
    let mut indexed = id2label
        .into_iter()
        .map(|(k, v)| {
            k.trim()
                .parse::<usize>()
                .map(|idx| (idx, v))
                .map_err(|_| AppError::ModelLoad(format!("id2label key '{}' is not an index", k)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    indexed.sort_by_key(|(idx, _)| *idx);

    // Gaps would shift every later label onto the wrong output.
    for (position, (idx, _)) in indexed.iter().enumerate() {
        if *idx != position {
            return Err(AppError::ModelLoad(format!(
                "id2label is not contiguous: expected index {}, found {}",
                position, idx
            )));
        }
    }
    Ok(indexed.into_iter().map(|(_, label)| label).collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetPlants {
    plants: Vec<String>,
}

impl TargetPlants {
    pub fn new<I, S>(plants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            plants: plants.into_iter().map(Into::into).collect(),
        }
    }

    /// First target plant, in configured order, that the label mentions.
    pub fn attribute(&self, label: &str) -> Option<&str> {
        self.plants
            .iter()
            .find(|plant| plant_matches(label, plant))
            .map(String::as_str)
    }

    pub fn supports(&self, label: &str) -> bool {
        self.attribute(label).is_some()
    }

    pub fn names(&self) -> &[String] {
        &self.plants
    }
}

/// Catalog labels grouped per target plant. Built once at load time.
#[derive(Debug, Clone)]
pub struct PlantCategoryIndex {
    categories: Vec<(String, Vec<String>)>,
}

impl PlantCategoryIndex {
    pub fn build(catalog: &ClassCatalog, plants: &TargetPlants) -> Self {
        let categories = plants
            .names()
            .iter()
            .map(|plant| {
                let labels = catalog
                    .labels()
                    .iter()
                    .filter(|label| plant_matches(label, plant))
                    .cloned()
                    .collect();
                (plant.clone(), labels)
            })
            .collect();
        Self { categories }
    }

    pub fn labels_for(&self, plant: &str) -> Option<&[String]> {
        self.categories
            .iter()
            .find(|(name, _)| name == plant)
            .map(|(_, labels)| labels.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.categories
            .iter()
            .map(|(plant, labels)| (plant.as_str(), labels.as_slice()))
    }

    /// Per-plant disease list for client menus. Healthy classes are counted
    /// separately and the plant prefix is stripped from disease names.
    pub fn supported_plants(&self) -> Vec<SupportedPlant> {
        self.iter()
            .map(|(plant, labels)| {
                let is_healthy = |label: &str| plant_matches(label, "healthy");
                let diseases: Vec<String> = labels
                    .iter()
                    .filter(|label| !is_healthy(label.as_str()))
                    .map(|label| strip_plant_prefix(label, plant))
                    .collect();
                SupportedPlant {
                    plant_name: plant.to_string(),
                    diseases_count: diseases.len(),
                    diseases,
                    has_healthy_class: labels.iter().any(|label| is_healthy(label)),
                }
            })
            .collect()
    }
}

fn strip_plant_prefix(label: &str, plant: &str) -> String {
    match label.strip_prefix(plant) {
        Some(rest) => rest.trim_start_matches('_').to_string(),
        None => label.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn catalog(labels: &[&str]) -> ClassCatalog {
        ClassCatalog::new(labels.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    fn plants() -> TargetPlants {
        TargetPlants::new(["Potato", "Tomato", "Pepper"])
    }

    #[test]
    fn matching_ignores_case() {
        assert!(plant_matches("Tomato_healthy", "tomato"));
        assert!(plant_matches("pepper__bell___Bacterial_spot", "Pepper"));
        assert!(!plant_matches("Apple_scab", "Tomato"));
    }

    #[test]
    fn attribution_follows_configured_order() {
        let plants = TargetPlants::new(["Tomato", "Potato"]);
        assert_eq!(plants.attribute("Potato_vs_Tomato_mix"), Some("Tomato"));
        assert_eq!(plants.attribute("Corn_rust"), None);
        assert!(!plants.supports("Corn_rust"));
    }

    #[test]
    fn index_groups_labels_by_plant() {
        let catalog = catalog(&["Tomato_healthy", "Potato_Early_blight", "Tomato_Leaf_Mold", "Apple_scab"]);
        let index = PlantCategoryIndex::build(&catalog, &plants());
        assert_eq!(
            index.labels_for("Tomato").unwrap(),
            &["Tomato_healthy".to_string(), "Tomato_Leaf_Mold".to_string()]
        );
        assert_eq!(index.labels_for("Pepper").unwrap().len(), 0);
        assert!(index.labels_for("Apple").is_none());
    }

    #[test]
    fn supported_plants_summary() {
        let catalog = catalog(&[
            "Pepper_bell_Bacterial_spot",
            "Pepper_bell_healthy",
            "Potato_Early_blight",
            "Potato_Late_blight",
            "Tomato_healthy",
        ]);
        let summary = PlantCategoryIndex::build(&catalog, &plants()).supported_plants();
        assert_eq!(summary.len(), 3);

        let potato = &summary[0];
        assert_eq!(potato.plant_name, "Potato");
        assert_eq!(potato.diseases, vec!["Early_blight", "Late_blight"]);
        assert!(!potato.has_healthy_class);

        let tomato = &summary[1];
        assert_eq!(tomato.diseases_count, 0);
        assert!(tomato.has_healthy_class);

        assert_eq!(summary[2].diseases, vec!["bell_Bacterial_spot"]);
    }

    #[test]
    fn empty_catalog_rejected() {
        assert_eq!(ClassCatalog::new(Vec::new()).unwrap_err().kind(), "model_load");
    }

    #[test]
    fn reads_json_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["Tomato_healthy", "Potato_Early_blight"]"#).unwrap();
        let catalog = ClassCatalog::from_json_file(file.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(1), Some("Potato_Early_blight"));
        assert_eq!(catalog.get(2), None);
    }

    #[test]
    fn reads_id2label_in_index_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "id2label": {{ "10": "k", "2": "c", "0": "a", "1": "b", "3": "d", "4": "e",
                 "5": "f", "6": "g", "7": "h", "8": "i", "9": "j" }} }}"#
        )
        .unwrap();
        let catalog = ClassCatalog::from_json_file(file.path()).unwrap();
        assert_eq!(catalog.labels().join(""), "abcdefghijk");
    }

    #[test]
    fn id2label_gaps_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "id2label": {{ "0": "a", "2": "c" }} }}"#).unwrap();
        let err = ClassCatalog::from_json_file(file.path()).unwrap_err();
        assert_eq!(err.kind(), "model_load");
    }
}
