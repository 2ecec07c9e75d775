use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use taglens_core::{Result, TagLensError};

pub const FUNCTION_NAME_SLOT: &str = "{function_name}";
pub const FUNCTION_CONTENT_SLOT: &str = "{function_content}";

/// An on-disk prompt pair. The system text may reference
/// `{function_name}`; the user text may additionally reference
/// `{function_content}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub system: String,
    pub init_user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptInfo {
    pub name: String,
    pub system: String,
    pub init_user: String,
}

/// Directory of `<name>.json` templates. The directory is created lazily on
/// the first write; listing a missing directory yields empty results.
pub struct PromptStore {
    dir: PathBuf,
}

impl PromptStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() {
            return Err(TagLensError::Validation("prompt name is empty".into()));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }

    pub fn template_names(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let file_name = entry.file_name().to_string_lossy().into_owned();
                file_name.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }

    pub fn list(&self) -> Vec<PromptInfo> {
        self.template_names()
            .into_iter()
            .filter_map(|name| {
                self.load(&name).ok().map(|template| PromptInfo {
                    name,
                    system: template.system,
                    init_user: template.init_user,
                })
            })
            .collect()
    }

    pub fn load(&self, name: &str) -> Result<PromptTemplate> {
        let path = self.path_for(name)?;
        let bytes = fs::read(&path)
            .map_err(|_| TagLensError::NotFound(format!("prompt template {name}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn create(&self, info: &PromptInfo) -> Result<()> {
        let path = self.path_for(&info.name)?;
        if path.exists() {
            return Err(TagLensError::Conflict(format!(
                "prompt {} already exists",
                info.name
            )));
        }
        self.write(&path, info)
    }

    pub fn update(&self, info: &PromptInfo) -> Result<()> {
        let path = self.path_for(&info.name)?;
        if !path.exists() {
            return Err(TagLensError::NotFound(format!("prompt template {}", info.name)));
        }
        self.write(&path, info)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(TagLensError::NotFound(format!("prompt template {name}")));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    fn write(&self, path: &Path, info: &PromptInfo) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let template = PromptTemplate {
            system: info.system.clone(),
            init_user: info.init_user.clone(),
        };
        fs::write(path, serde_json::to_string_pretty(&template)?)?;
        Ok(())
    }
}

/// Literal placeholder substitution, no escaping.
pub fn render(
    template: &PromptTemplate,
    function_name: &str,
    function_content: &str,
) -> PromptTemplate {
    let system = template.system.replace(FUNCTION_NAME_SLOT, function_name);
    let init_user = template
        .init_user
        .replace(FUNCTION_NAME_SLOT, function_name)
        .replace(FUNCTION_CONTENT_SLOT, function_content);
    PromptTemplate { system, init_user }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, PromptStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PromptStore::new(dir.path().join("prompts"));
        (dir, store)
    }

    fn info(name: &str) -> PromptInfo {
        PromptInfo {
            name: name.into(),
            system: "audit {function_name}".into(),
            init_user: "check {function_name}:\n{function_content}".into(),
        }
    }

    #[test]
    fn missing_directory_lists_empty() {
        let (_dir, store) = store();
        assert!(store.template_names().is_empty());
        assert!(store.list().is_empty());
    }

    #[test]
    fn create_then_load_round_trips() {
        let (_dir, store) = store();
        store.create(&info("leak")).unwrap();
        let loaded = store.load("leak").unwrap();
        assert_eq!(loaded.system, "audit {function_name}");
        assert_eq!(store.template_names(), vec!["leak".to_string()]);

        let err = store.create(&info("leak")).unwrap_err();
        assert!(matches!(err, TagLensError::Conflict(_)));
    }

    #[test]
    fn update_requires_existing_template() {
        let (_dir, store) = store();
        let err = store.update(&info("ghost")).unwrap_err();
        assert!(matches!(err, TagLensError::NotFound(_)));

        store.create(&info("p")).unwrap();
        let mut updated = info("p");
        updated.system = "new system".into();
        store.update(&updated).unwrap();
        assert_eq!(store.load("p").unwrap().system, "new system");
    }

    #[test]
    fn delete_requires_existing_template() {
        let (_dir, store) = store();
        assert!(matches!(
            store.delete("ghost").unwrap_err(),
            TagLensError::NotFound(_)
        ));
        store.create(&info("p")).unwrap();
        store.delete("p").unwrap();
        assert!(store.load("p").is_err());
    }

    #[test]
    fn render_substitutes_both_placeholders() {
        let template = PromptTemplate {
            system: "look at {function_name}".into(),
            init_user: "{function_name} is:\n{function_content}".into(),
        };
        let rendered = render(&template, "foo", "int foo(){}");
        assert_eq!(rendered.system, "look at foo");
        assert_eq!(rendered.init_user, "foo is:\nint foo(){}");
    }

    #[test]
    fn empty_name_is_rejected() {
        let (_dir, store) = store();
        assert!(matches!(
            store.load("").unwrap_err(),
            TagLensError::Validation(_)
        ));
    }
}
