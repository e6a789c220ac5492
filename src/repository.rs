//! # SimObject Repository
//!
//! A small local store for AI SimObject metadata, keyed by a UUID the
//! repository assigns, with secondary lookup by an optional unique tag and
//! by title. Grounded on `simobject_repository.hpp`'s `SimObjectRepository`:
//! same three indices, same "last write wins, clean up the old indices
//! first" update rule, and the same simplified record-per-entry disk
//! format (`- id:`/`  tag:`/`  type:`/`  title:`/`  livery:` lines, blank
//! lines and `#` comments ignored).
//!
//! `SimObjectInfo` still derives `Serialize`/`Deserialize` for callers that
//! want to hand one to another part of an application's own serde-based
//! API; the repository's own `load`/`save` do not go through `serde_json`,
//! since the on-disk shape here is the line format above, not JSON. File
//! I/O failures are composed with [`anyhow::Error`] rather than added as
//! variants to [`crate::error::SimConnectError`], which is reserved for
//! protocol-level failures a caller would want to match on.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::ObjectType;

/// One repository entry (§6.3's catalog entry, extended with a livery).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimObjectInfo {
    /// Unique identifier. Left empty when constructing a new entry;
    /// [`SimObjectRepository::set_sim_object`] assigns a UUID if so.
    #[serde(default)]
    pub id: String,
    /// An optional, but unique, tag for quick lookup.
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub object_type: ObjectType,
    pub title: String,
    /// An optional livery name (2024-generation titles only).
    #[serde(default)]
    pub livery: Option<String>,
}

/// Local store of [`SimObjectInfo`] entries, persisted as a simplified
/// record-per-entry text file under a repository directory.
///
/// Not `Sync`-shared between threads; callers needing that wrap it in a
/// mutex the same way the rest of the core leaves thread-sharing to its
/// caller rather than baking in its own.
pub struct SimObjectRepository {
    repository_path: PathBuf,
    objects: HashMap<String, SimObjectInfo>,
    tag_index: HashMap<String, String>,
    title_index: HashMap<String, HashSet<String>>,
}

impl SimObjectRepository {
    /// Creates an empty repository rooted at `repository_path`. Does not
    /// touch the filesystem; call [`SimObjectRepository::load`] to populate
    /// it from a prior session.
    pub fn new(repository_path: impl Into<PathBuf>) -> Self {
        Self {
            repository_path: repository_path.into(),
            objects: HashMap::new(),
            tag_index: HashMap::new(),
            title_index: HashMap::new(),
        }
    }

    pub fn repository_path(&self) -> &Path {
        &self.repository_path
    }

    /// Adds or updates an entry. A blank `id` is replaced with a freshly
    /// generated UUID. Returns the id the entry was stored under.
    pub fn set_sim_object(&mut self, mut info: SimObjectInfo) -> String {
        if info.id.is_empty() {
            info.id = Uuid::new_v4().to_string();
        }
        let id = info.id.clone();

        if let Some(old) = self.objects.get(&id) {
            if let Some(old_tag) = &old.tag {
                self.tag_index.remove(old_tag);
            }
            if let Some(ids) = self.title_index.get_mut(&old.title) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.title_index.remove(&old.title);
                }
            }
        }

        if let Some(tag) = &info.tag {
            self.tag_index.insert(tag.clone(), id.clone());
        }
        self.title_index.entry(info.title.clone()).or_default().insert(id.clone());
        self.objects.insert(id.clone(), info);

        id
    }

    pub fn get_by_id(&self, id: &str) -> Option<&SimObjectInfo> {
        self.objects.get(id)
    }

    pub fn get_by_tag(&self, tag: &str) -> Option<&SimObjectInfo> {
        self.tag_index.get(tag).and_then(|id| self.objects.get(id))
    }

    pub fn get_ids_by_title(&self, title: &str) -> HashSet<String> {
        self.title_index.get(title).cloned().unwrap_or_default()
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag_index.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn all(&self) -> &HashMap<String, SimObjectInfo> {
        &self.objects
    }

    fn default_file(&self) -> PathBuf {
        self.repository_path.join("simobjects.yaml")
    }

    /// Loads entries from `file_path`, or `repository_path/simobjects.yaml`
    /// when `None`. Replaces the repository's current contents; a missing
    /// file is treated as an empty repository rather than an error, since a
    /// first run has nothing to load yet.
    ///
    /// The format is a simplified, hand-parsed record stream rather than a
    /// general YAML document: each record starts with a `- id: <id>` line,
    /// followed by zero or more `  tag:`/`  type:`/`  title:`/`  livery:`
    /// lines; blank lines and lines starting with `#` are ignored.
    pub fn load(&mut self, file_path: Option<&Path>) -> Result<()> {
        let path = file_path.map(Path::to_path_buf).unwrap_or_else(|| self.default_file());
        self.objects.clear();
        self.tag_index.clear();
        self.title_index.clear();
        if !path.exists() {
            return Ok(());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading SimObject repository from {}", path.display()))?;

        let mut current: Option<SimObjectInfo> = None;
        for line in text.lines() {
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            if let Some(id) = line.strip_prefix("- id:") {
                if let Some(info) = current.take() {
                    self.set_sim_object(info);
                }
                current = Some(SimObjectInfo {
                    id: id.trim().to_string(),
                    tag: None,
                    object_type: ObjectType::Aircraft,
                    title: String::new(),
                    livery: None,
                });
            } else if let Some(info) = current.as_mut() {
                if let Some(value) = line.strip_prefix("  tag:") {
                    let value = value.trim();
                    info.tag = (!value.is_empty()).then(|| value.to_string());
                } else if let Some(value) = line.strip_prefix("  type:") {
                    info.object_type = value.trim().parse().unwrap_or(ObjectType::Aircraft);
                } else if let Some(value) = line.strip_prefix("  title:") {
                    info.title = value.trim().to_string();
                } else if let Some(value) = line.strip_prefix("  livery:") {
                    let value = value.trim();
                    info.livery = (!value.is_empty()).then(|| value.to_string());
                }
            }
        }
        if let Some(info) = current.take() {
            self.set_sim_object(info);
        }
        Ok(())
    }

    /// Saves all entries to `file_path`, or `repository_path/simobjects.yaml`
    /// when `None`. Creates the parent directory if it does not exist.
    pub fn save(&self, file_path: Option<&Path>) -> Result<()> {
        let path = file_path.map(Path::to_path_buf).unwrap_or_else(|| self.default_file());
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating repository directory {}", parent.display()))?;
            }
        }

        let mut text = String::from("# SimObject Repository\n\n");
        for info in self.objects.values() {
            text.push_str(&format!("- id: {}\n", info.id));
            if let Some(tag) = &info.tag {
                text.push_str(&format!("  tag: {tag}\n"));
            }
            text.push_str(&format!("  type: {}\n", info.object_type));
            text.push_str(&format!("  title: {}\n", info.title));
            if let Some(livery) = &info.livery {
                text.push_str(&format!("  livery: {livery}\n"));
            }
            text.push('\n');
        }

        std::fs::write(&path, text)
            .with_context(|| format!("writing SimObject repository to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, tag: Option<&str>, title: &str) -> SimObjectInfo {
        SimObjectInfo {
            id: id.to_string(),
            tag: tag.map(String::from),
            object_type: ObjectType::Aircraft,
            title: title.to_string(),
            livery: None,
        }
    }

    #[test]
    fn set_sim_object_assigns_a_uuid_when_id_is_blank() {
        let mut repo = SimObjectRepository::new("/tmp/unused");
        let id = repo.set_sim_object(entry("", Some("user"), "Cessna 172"));
        assert!(!id.is_empty());
        assert!(repo.has_id(&id));
        assert_eq!(repo.get_by_tag("user").unwrap().title, "Cessna 172");
    }

    #[test]
    fn updating_an_entry_moves_its_tag_and_title_indices() {
        let mut repo = SimObjectRepository::new("/tmp/unused");
        repo.set_sim_object(entry("a1", Some("user"), "Cessna 172"));
        repo.set_sim_object(entry("a1", Some("copilot"), "King Air 350"));

        assert!(!repo.has_tag("user"));
        assert!(repo.has_tag("copilot"));
        assert!(repo.get_ids_by_title("Cessna 172").is_empty());
        assert_eq!(repo.get_ids_by_title("King Air 350").len(), 1);
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn two_entries_can_share_a_title() {
        let mut repo = SimObjectRepository::new("/tmp/unused");
        repo.set_sim_object(entry("a1", None, "Cessna 172"));
        repo.set_sim_object(entry("a2", None, "Cessna 172"));
        assert_eq!(repo.get_ids_by_title("Cessna 172").len(), 2);
    }

    #[test]
    fn load_of_a_missing_file_yields_an_empty_repository() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = SimObjectRepository::new(dir.path());
        repo.load(None).unwrap();
        assert!(repo.is_empty());
    }

    #[test]
    fn save_then_load_round_trips_all_entries_and_indices() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = SimObjectRepository::new(dir.path());
        repo.set_sim_object(entry("a1", Some("user"), "Cessna 172"));
        repo.set_sim_object(entry("a2", None, "King Air 350"));
        repo.save(None).unwrap();

        let mut reloaded = SimObjectRepository::new(dir.path());
        reloaded.load(None).unwrap();

        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get_by_tag("user").unwrap().title, "Cessna 172");
        assert_eq!(reloaded.get_by_id("a2").unwrap().title, "King Air 350");
    }
}
