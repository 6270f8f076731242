// src/templates.rs
//
// Reference images for template matching, keyed by file base name.
// Obstacle classes come from the config; two extra names are reserved
// for control screens (game over, start screen).

use crate::error::PerceptionError;
use crate::types::{ClassId, ColorMode, Config, Frame};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlMarker {
    GameOver,
    StartScreen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateClass {
    Obstacle(ClassId),
    Control(ControlMarker),
}

#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub class: TemplateClass,
    /// Always single-channel
    pub image: Frame,
}

// ============================================================================
// OBSTACLE CATALOG
// ============================================================================

/// Name ↔ id lookup plus per-class flags.
#[derive(Debug, Clone)]
pub struct ObstacleCatalog {
    by_name: HashMap<String, ClassId>,
    lethal: HashSet<ClassId>,
    collectible: HashSet<ClassId>,
    game_over: String,
    start_screen: String,
}

impl ObstacleCatalog {
    pub fn from_config(config: &Config) -> Self {
        let classes = &config.obstacles.classes;
        Self {
            by_name: classes
                .iter()
                .map(|c| (c.name.clone(), ClassId(c.id)))
                .collect(),
            lethal: classes
                .iter()
                .filter(|c| c.lethal)
                .map(|c| ClassId(c.id))
                .collect(),
            collectible: classes
                .iter()
                .filter(|c| c.collectible)
                .map(|c| ClassId(c.id))
                .collect(),
            game_over: config.control.game_over.clone(),
            start_screen: config.control.start_screen.clone(),
        }
    }

    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn is_lethal(&self, id: ClassId) -> bool {
        self.lethal.contains(&id)
    }

    pub fn is_collectible(&self, id: ClassId) -> bool {
        self.collectible.contains(&id)
    }

    /// Classify a template file base name. `None` means the file is not ours.
    pub fn classify(&self, name: &str) -> Option<TemplateClass> {
        if name == self.game_over {
            Some(TemplateClass::Control(ControlMarker::GameOver))
        } else if name == self.start_screen {
            Some(TemplateClass::Control(ControlMarker::StartScreen))
        } else {
            self.class_id(name).map(TemplateClass::Obstacle)
        }
    }
}

// ============================================================================
// TEMPLATE STORE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: BTreeMap<String, Template>,
}

impl TemplateStore {
    /// Scan `dir` for `.png` templates whose base name is a known class or
    /// control marker.
    pub fn load<P: AsRef<Path>>(dir: P, catalog: &ObstacleCatalog) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(PerceptionError::TemplateDirNotFound(dir.to_path_buf()).into());
        }

        info!("Loading templates from: {}", dir.display());
        let mut templates = BTreeMap::new();

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry =
                entry.with_context(|| format!("Failed to read template dir {}", dir.display()))?;
            let path = entry.path();

            let is_png = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("png"))
                .unwrap_or(false);
            if !entry.file_type().is_file() || !is_png {
                debug!("Skipping non-template entry {}", path.display());
                continue;
            }

            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!("Skipping template with non UTF-8 name: {}", path.display());
                continue;
            };

            let Some(class) = catalog.classify(name) else {
                warn!(
                    "Template file '{}' matches no obstacle class or control screen, ignoring",
                    path.display()
                );
                continue;
            };

            let image = match image::open(path) {
                Ok(img) => Frame::from_image(&img, ColorMode::Gray),
                Err(e) => {
                    warn!("Could not load template image {}: {}", path.display(), e);
                    continue;
                }
            };

            templates.insert(
                name.to_string(),
                Template {
                    name: name.to_string(),
                    class,
                    image,
                },
            );
        }

        if templates.is_empty() {
            return Err(PerceptionError::EmptyTemplateStore(dir.to_path_buf()).into());
        }

        let store = Self { templates };
        info!(
            "✓ Loaded {} templates: {:?}",
            store.len(),
            store.templates.keys().collect::<Vec<_>>()
        );
        if store.obstacle_templates().next().is_none() {
            warn!("No obstacle templates loaded; every observation will be clear");
        }
        Ok(store)
    }

    pub fn from_templates(templates: Vec<Template>) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn control(&self, marker: ControlMarker) -> Option<&Template> {
        self.templates
            .values()
            .find(|t| t.class == TemplateClass::Control(marker))
    }

    /// Obstacle templates in ascending class-id order.
    pub fn obstacle_templates(&self) -> impl Iterator<Item = (ClassId, &Template)> {
        let mut obstacles: Vec<(ClassId, &Template)> = self
            .templates
            .values()
            .filter_map(|t| match t.class {
                TemplateClass::Obstacle(id) => Some((id, t)),
                TemplateClass::Control(_) => None,
            })
            .collect();
        obstacles.sort_by_key(|(id, _)| *id);
        obstacles.into_iter()
    }

    pub fn name_to_class(&self) -> BTreeMap<String, TemplateClass> {
        self.templates
            .iter()
            .map(|(name, t)| (name.clone(), t.class))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
