use std::fs;
use std::path::{Path, PathBuf};

use taglens_core::{Result, TagLensError, TaskResult};

/// Append-style result files: `results/<task_id>.json` holds the array of
/// every result ever produced under that id. Only the single worker writes
/// here, so read-modify-write needs no further coordination.
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn file_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    pub fn append(&self, task_id: &str, result: &TaskResult) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.file_path(&format!("{task_id}.json"));

        let mut results: Vec<TaskResult> = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        results.push(result.clone());

        fs::write(&path, serde_json::to_string_pretty(&results)?)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<String>> {
        fs::create_dir_all(&self.dir)?;
        let mut files: Vec<String> = fs::read_dir(&self.dir)?
            .flatten()
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".json"))
            .collect();
        files.sort();
        Ok(files)
    }

    pub fn read(&self, file_name: &str) -> Result<Vec<u8>> {
        let path = self.file_path(file_name);
        fs::read(&path).map_err(|_| TagLensError::NotFound(format!("result file {file_name}")))
    }

    pub fn delete(&self, file_name: &str) -> Result<()> {
        let path = self.file_path(file_name);
        if !path.is_file() {
            return Err(TagLensError::NotFound(format!("result file {file_name}")));
        }
        fs::remove_file(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taglens_core::ChatMessage;

    fn sample(has_problem: bool) -> TaskResult {
        TaskResult {
            has_problem_info: has_problem,
            problem_info: json!(null),
            response: Some("ok".into()),
            conversation: vec![ChatMessage::user("hi")],
        }
    }

    #[test]
    fn append_accumulates_per_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path().join("results"));

        store.append("X", &sample(false)).unwrap();
        store.append("X", &sample(true)).unwrap();

        let bytes = store.read("X.json").unwrap();
        let parsed: Vec<TaskResult> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(!parsed[0].has_problem_info);
        assert!(parsed[1].has_problem_info);

        assert_eq!(store.list().unwrap(), vec!["X.json".to_string()]);
    }

    #[test]
    fn read_and_delete_missing_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path().join("results"));
        assert!(matches!(
            store.read("nope.json").unwrap_err(),
            TagLensError::NotFound(_)
        ));
        assert!(matches!(
            store.delete("nope.json").unwrap_err(),
            TagLensError::NotFound(_)
        ));
    }
}
