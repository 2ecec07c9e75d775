use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use taglens_core::{Result, TagLensError};
use tracing::info;

/// One OpenAI-compatible chat endpoint, keyed by `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmProfile {
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub model: String,
}

/// One code-intelligence server, keyed by `name`. `url` is a bare
/// `host:port`; the client side prepends a scheme when missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeServerEndpoint {
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub llm_configs: Vec<LlmProfile>,
    #[serde(default)]
    pub code_servers: Vec<CodeServerEndpoint>,
}

impl ConfigDocument {
    /// First-run skeleton, written to disk so operators have something to edit.
    fn skeleton() -> Self {
        Self {
            llm_configs: vec![LlmProfile {
                name: "changeme".to_string(),
                api_key: String::new(),
                base_url: String::new(),
                model: String::new(),
            }],
            code_servers: vec![CodeServerEndpoint {
                name: "changeme".to_string(),
                url: String::new(),
            }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    Llm,
    CodeServer,
}

impl ConfigKind {
    pub fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "llm" => Some(Self::Llm),
            "code_server" => Some(Self::CodeServer),
            _ => None,
        }
    }
}

/// The process-wide configuration document. All reads and writes go through
/// one mutex; mutations persist the whole pretty-printed file before
/// releasing it, which is fine at this size and write rate.
pub struct ConfigStore {
    path: PathBuf,
    doc: Mutex<ConfigDocument>,
}

impl ConfigStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let doc = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let skeleton = ConfigDocument::skeleton();
                write_pretty(&path, &skeleton)?;
                info!(path = %path.display(), "wrote initial config skeleton");
                skeleton
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    pub fn document(&self) -> ConfigDocument {
        self.doc.lock().clone()
    }

    pub fn llm_profile(&self, name: &str) -> Option<LlmProfile> {
        self.doc
            .lock()
            .llm_configs
            .iter()
            .find(|profile| profile.name == name)
            .cloned()
    }

    pub fn code_server_url(&self, name: &str) -> Option<String> {
        self.doc
            .lock()
            .code_servers
            .iter()
            .find(|server| server.name == name)
            .map(|server| server.url.clone())
    }

    pub fn upsert_llm(&self, profile: LlmProfile) -> Result<()> {
        let mut doc = self.doc.lock();
        match doc
            .llm_configs
            .iter_mut()
            .find(|existing| existing.name == profile.name)
        {
            Some(existing) => *existing = profile,
            None => doc.llm_configs.push(profile),
        }
        write_pretty(&self.path, &*doc)
    }

    pub fn upsert_code_server(&self, endpoint: CodeServerEndpoint) -> Result<()> {
        let mut doc = self.doc.lock();
        match doc
            .code_servers
            .iter_mut()
            .find(|existing| existing.name == endpoint.name)
        {
            Some(existing) => *existing = endpoint,
            None => doc.code_servers.push(endpoint),
        }
        write_pretty(&self.path, &*doc)
    }

    pub fn delete(&self, kind: ConfigKind, name: &str) -> Result<()> {
        let mut doc = self.doc.lock();
        let removed = match kind {
            ConfigKind::Llm => remove_by_name(&mut doc.llm_configs, |p| &p.name, name),
            ConfigKind::CodeServer => remove_by_name(&mut doc.code_servers, |s| &s.name, name),
        };
        if !removed {
            return Err(TagLensError::NotFound(format!("no config named {name}")));
        }
        write_pretty(&self.path, &*doc)
    }
}

fn remove_by_name<T>(list: &mut Vec<T>, name_of: impl Fn(&T) -> &String, name: &str) -> bool {
    match list.iter().position(|item| name_of(item) == name) {
        Some(index) => {
            list.remove(index);
            true
        }
        None => false,
    }
}

fn write_pretty(path: &Path, doc: &ConfigDocument) -> Result<()> {
    let data = serde_json::to_string_pretty(doc)?;
    fs::write(path, data)?;
    Ok(())
}
