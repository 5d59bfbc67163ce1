use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One ailment a plant is traditionally used for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantAilment {
    pub ailment: Option<String>,
    pub reference: Option<String>,
    #[serde(rename = "herbalBenefit")]
    pub herbal_benefit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plant {
    pub id: String,
    pub plant_name: Option<String>,
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub common_names: Option<Vec<String>>,
    pub origin: Option<String>,
    pub habitat: Option<String>,
    pub plant_type: Option<String>,
    pub family: Option<String>,
    pub genus: Option<String>,
    /// First image, if any.
    pub image: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    /// Ailments grouped by disease type.
    #[serde(default)]
    pub ailments: BTreeMap<String, Vec<PlantAilment>>,
}

impl Plant {
    /// Name to show in lists: common name, then scientific name, then id.
    pub fn display_name(&self) -> &str {
        self.plant_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.scientific_name.as_deref())
            .unwrap_or(&self.id)
    }

    pub fn ailment_count(&self) -> usize {
        self.ailments.values().map(Vec::len).sum()
    }
}
