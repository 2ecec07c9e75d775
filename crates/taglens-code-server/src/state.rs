use crate::CodeAnalyzer;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<CodeAnalyzer>,
}

impl AppState {
    pub fn new(analyzer: CodeAnalyzer) -> Self {
        Self {
            analyzer: Arc::new(analyzer),
        }
    }
}
