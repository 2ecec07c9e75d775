use std::path::{Path, PathBuf};
use std::sync::Arc;

use taglens_core::Result;

use crate::{ConfigStore, DialogueEngine, PromptStore, ResultStore, TaskRegistry};

/// Filesystem layout of one executor instance. Everything except the config
/// file lives beside the executable by default; tests point the whole set
/// at a temp directory.
#[derive(Debug, Clone)]
pub struct ExecutorPaths {
    pub config_file: PathBuf,
    pub prompt_dir: PathBuf,
    pub result_dir: PathBuf,
    pub config_page: PathBuf,
    pub static_dir: PathBuf,
}

impl ExecutorPaths {
    pub fn beside(exe_dir: &Path, config_file: Option<PathBuf>) -> Self {
        Self {
            config_file: config_file.unwrap_or_else(|| exe_dir.join("config.json")),
            prompt_dir: exe_dir.join("prompts"),
            result_dir: exe_dir.join("results"),
            config_page: exe_dir.join("config.html"),
            static_dir: exe_dir.join("static"),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub prompts: Arc<PromptStore>,
    pub results: Arc<ResultStore>,
    pub registry: Arc<TaskRegistry>,
    pub config_page: PathBuf,
    pub static_dir: PathBuf,
}

impl AppState {
    /// Loads the config, wires up the stores, and starts the worker.
    pub fn new(paths: ExecutorPaths) -> Result<Self> {
        let config = Arc::new(ConfigStore::load(&paths.config_file)?);
        let prompts = Arc::new(PromptStore::new(&paths.prompt_dir));
        let results = Arc::new(ResultStore::new(&paths.result_dir));
        let engine = DialogueEngine::new(Arc::clone(&config), Arc::clone(&results));
        let registry = TaskRegistry::start(engine);

        Ok(Self {
            config,
            prompts,
            results,
            registry,
            config_page: paths.config_page,
            static_dir: paths.static_dir,
        })
    }
}
