//! # Persistence Boundary
//!
//! The core only requires a key-value `get`/`put` contract. This module
//! provides that contract ([`KvStore`]), two implementations (in-memory and
//! JSON-file backed), and the two consumers layered on top of it:
//!
//! - [`TemplateLibrary`]: the template collection, including the invariant
//!   that the built-in system template always exists and cannot be deleted
//! - per-device [`PrinterConfig`] entries keyed by the stable device identity
//!   (`printer_config_{vendor_id}_{product_id}`)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::printer::PrinterConfig;
use crate::template::{Template, DEFAULT_TEMPLATE_ID};

/// Key under which the template collection is stored.
const TEMPLATES_KEY: &str = "templates";

/// Key prefix for per-device printer configuration.
const PRINTER_CONFIG_PREFIX: &str = "printer_config_";

/// Markup of the built-in "no template" label: one centered multi-line text
/// field on a 3×2 cm canvas.
const DEFAULT_TEMPLATE_SVG: &str = r#"<svg width="3cm" height="2cm" version="1.1" viewBox="0 0 113.39 75.591" xmlns="http://www.w3.org/2000/svg">
 <text id="Text" x="50%" y="50%" dominant-baseline="middle" font-family="Arial, sans-serif" font-size="32px" text-anchor="middle" style="line-height:1"><tspan x="56.695" y="37.7955"/></text>
</svg>"#;

// ============================================================================
// KV CONTRACT
// ============================================================================

/// Minimal key-value persistence contract required by the core.
pub trait KvStore {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str);
}

/// Volatile store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn put(&mut self, key: &str, value: String) {
        self.map.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.map.remove(key);
    }
}

/// Write-through store backed by a single JSON file.
///
/// Write failures are logged rather than propagated — persistence is best
/// effort, matching the contract's infallible `put`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    map: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Open or create a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, crate::error::EtiquetaError> {
        let path = path.as_ref().to_path_buf();
        let map = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).map_err(|e| {
                crate::error::EtiquetaError::Store(format!(
                    "corrupt store {}: {e}",
                    path.display()
                ))
            })?
        } else {
            BTreeMap::new()
        };
        Ok(JsonFileStore { path, map })
    }

    fn flush(&self) {
        let serialized =
            serde_json::to_string_pretty(&self.map).expect("string map always serializes");
        if let Err(e) = std::fs::write(&self.path, serialized) {
            log::error!("failed to persist store {}: {e}", self.path.display());
        }
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn put(&mut self, key: &str, value: String) {
        self.map.insert(key.to_string(), value);
        self.flush();
    }

    fn remove(&mut self, key: &str) {
        self.map.remove(key);
        self.flush();
    }
}

// ============================================================================
// TEMPLATE LIBRARY
// ============================================================================

/// The built-in system template. Always present, never deletable.
pub fn default_template() -> Template {
    let mut template = Template::from_svg(DEFAULT_TEMPLATE_ID, "No template", DEFAULT_TEMPLATE_SVG)
        .expect("built-in template is valid");
    template
        .values
        .insert("Text".into(), "Line 1\nLine 2\nLine 3".into());
    // Epoch 0 marks the system template
    template.created_at = 0;
    template.last_used_at = 0;
    template
}

/// Generate a unique template id.
pub fn generate_template_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!(
        "template_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Template collection stored as one JSON array under [`TEMPLATES_KEY`].
pub struct TemplateLibrary<S: KvStore> {
    store: S,
}

impl<S: KvStore> TemplateLibrary<S> {
    pub fn new(store: S) -> Self {
        TemplateLibrary { store }
    }

    /// Access the underlying store (e.g. for printer-config entries).
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Load all templates, seeding the system template when missing.
    ///
    /// A corrupt collection is logged and replaced by the system template
    /// alone rather than failing the caller.
    pub fn load(&self) -> Vec<Template> {
        let mut templates: Vec<Template> = match self.store.get(TEMPLATES_KEY) {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(parsed) => parsed,
                Err(e) => {
                    log::error!("failed to load templates: {e}");
                    return vec![default_template()];
                }
            },
            None => Vec::new(),
        };
        if !templates.iter().any(|t| t.id == DEFAULT_TEMPLATE_ID) {
            templates.insert(0, default_template());
        }
        templates
    }

    pub fn get(&self, template_id: &str) -> Option<Template> {
        self.load().into_iter().find(|t| t.id == template_id)
    }

    /// Insert or replace a template.
    pub fn save(&mut self, template: &Template) {
        let mut templates = self.load();
        match templates.iter_mut().find(|t| t.id == template.id) {
            Some(existing) => *existing = template.clone(),
            None => templates.push(template.clone()),
        }
        self.persist(&templates);
    }

    /// Delete a template. The system template is protected; deleting it is a
    /// no-op returning `false`.
    pub fn delete(&mut self, template_id: &str) -> bool {
        if template_id == DEFAULT_TEMPLATE_ID {
            return false;
        }
        let mut templates = self.load();
        let before = templates.len();
        templates.retain(|t| t.id != template_id);
        let removed = templates.len() != before;
        if removed {
            self.persist(&templates);
        }
        removed
    }

    /// Most recently used templates first.
    pub fn recently_used(&self, limit: usize) -> Vec<Template> {
        let mut templates = self.load();
        templates.sort_by_key(|t| std::cmp::Reverse(t.last_used_at));
        templates.truncate(limit);
        templates
    }

    /// Record that a template was just used.
    pub fn touch(&mut self, template_id: &str) {
        let mut templates = self.load();
        if let Some(template) = templates.iter_mut().find(|t| t.id == template_id) {
            template.last_used_at = chrono::Utc::now().timestamp_millis();
            self.persist(&templates);
        }
    }

    fn persist(&mut self, templates: &[Template]) {
        let serialized =
            serde_json::to_string(templates).expect("templates always serialize");
        self.store.put(TEMPLATES_KEY, serialized);
    }
}

// ============================================================================
// PRINTER CONFIG
// ============================================================================

/// Persist a device's configuration under its stable identity.
pub fn save_printer_config(store: &mut dyn KvStore, device_id: &str, config: &PrinterConfig) {
    let serialized = serde_json::to_string(config).expect("config always serializes");
    store.put(&format!("{PRINTER_CONFIG_PREFIX}{device_id}"), serialized);
}

/// Load a device's configuration, if one was saved.
pub fn load_printer_config(store: &dyn KvStore, device_id: &str) -> Option<PrinterConfig> {
    let raw = store.get(&format!("{PRINTER_CONFIG_PREFIX}{device_id}"))?;
    match serde_json::from_str(&raw) {
        Ok(config) => Some(config),
        Err(e) => {
            log::error!("failed to load printer config for {device_id}: {e}");
            None
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_always_seeded() {
        let library = TemplateLibrary::new(MemoryStore::new());
        let templates = library.load();
        assert_eq!(templates[0].id, DEFAULT_TEMPLATE_ID);
        assert_eq!(templates[0].created_at, 0);
        assert_eq!(templates[0].values["Text"], "Line 1\nLine 2\nLine 3");
    }

    #[test]
    fn test_default_template_not_deletable() {
        let mut library = TemplateLibrary::new(MemoryStore::new());
        assert!(!library.delete(DEFAULT_TEMPLATE_ID));
        assert!(library.get(DEFAULT_TEMPLATE_ID).is_some());
    }

    #[test]
    fn test_save_and_reload() {
        let mut library = TemplateLibrary::new(MemoryStore::new());
        let template = Template::from_svg(
            generate_template_id(),
            "Shelf tag",
            r#"<svg xmlns="http://www.w3.org/2000/svg"><text id="T">x</text></svg>"#,
        )
        .unwrap();
        library.save(&template);

        let loaded = library.get(&template.id).unwrap();
        assert_eq!(loaded.name, "Shelf tag");
        assert_eq!(loaded.fields.len(), 1);

        assert!(library.delete(&template.id));
        assert!(library.get(&template.id).is_none());
    }

    #[test]
    fn test_save_replaces_by_id() {
        let mut library = TemplateLibrary::new(MemoryStore::new());
        let mut template = Template::from_svg(
            "t1",
            "First",
            r#"<svg xmlns="http://www.w3.org/2000/svg"><text id="T">x</text></svg>"#,
        )
        .unwrap();
        library.save(&template);
        template.name = "Renamed".into();
        library.save(&template);

        let templates = library.load();
        // default + one saved
        assert_eq!(templates.len(), 2);
        assert_eq!(library.get("t1").unwrap().name, "Renamed");
    }

    #[test]
    fn test_recently_used_ordering() {
        let mut library = TemplateLibrary::new(MemoryStore::new());
        for id in ["a", "b"] {
            let template = Template::from_svg(
                id,
                id,
                r#"<svg xmlns="http://www.w3.org/2000/svg"><text id="T">x</text></svg>"#,
            )
            .unwrap();
            library.save(&template);
        }
        library.touch("a");
        let recent = library.recently_used(10);
        assert_eq!(recent[0].id, "a");
    }

    #[test]
    fn test_corrupt_collection_recovers() {
        let mut store = MemoryStore::new();
        store.put(TEMPLATES_KEY, "not json".into());
        let library = TemplateLibrary::new(store);
        let templates = library.load();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].id, DEFAULT_TEMPLATE_ID);
    }

    #[test]
    fn test_printer_config_roundtrip() {
        let mut store = MemoryStore::new();
        let mut config = PrinterConfig::default();
        config.darkness = 12;
        save_printer_config(&mut store, "1155_22336", &config);

        let loaded = load_printer_config(&store, "1155_22336").unwrap();
        assert_eq!(loaded.darkness, 12);
        assert!(load_printer_config(&store, "9_9").is_none());
    }

    #[test]
    fn test_json_file_store_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "etiqueta_store_test_{}_{}.json",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
        ));
        {
            let mut store = JsonFileStore::open(&path).unwrap();
            store.put("k", "v".into());
        }
        {
            let store = JsonFileStore::open(&path).unwrap();
            assert_eq!(store.get("k"), Some("v".into()));
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(generate_template_id(), generate_template_id());
    }
}
