use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test context with temporary directory management.
/// Automatically cleans up when dropped.
pub struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    /// Create a new test context with a fresh temporary directory
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Get the root path of the temporary directory
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a file with content at the given relative path
    pub fn create_file(&self, relative_path: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Create an empty file (touch)
    pub fn touch(&self, relative_path: &str) -> PathBuf {
        self.create_file(relative_path, "")
    }

    /// Remove a file at the given relative path
    pub fn remove(&self, relative_path: &str) {
        fs::remove_file(self.path(relative_path)).expect("Failed to remove file");
    }

    /// Create a directory at the given relative path
    pub fn create_dir(&self, relative_path: &str) -> PathBuf {
        let path = self.root().join(relative_path);
        fs::create_dir_all(&path).expect("Failed to create dir");
        path
    }

    /// Create a `modules/` device directory holding one entry per node
    pub fn create_modules_dir(&self, nodes: &[&str]) -> PathBuf {
        let dir = self.create_dir("modules");
        for node in nodes {
            self.touch(&format!("modules/{}", node));
        }
        dir
    }

    /// Create a small Intel HEX firmware image
    pub fn create_firmware(&self, name: &str) -> PathBuf {
        self.create_file(
            &format!("firmware/{}", name),
            ":100000000C9434000C9451000C9451000C94510049\n:00000001FF\n",
        )
    }

    /// Get full path for a relative path
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
