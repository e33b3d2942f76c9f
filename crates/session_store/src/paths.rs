use std::path::{Path, PathBuf};

pub const STORE_DIR: &str = ".chat";
pub const STORE_FILE_NAME: &str = "store.json";

#[must_use]
pub fn store_root(base: &Path) -> PathBuf {
    base.join(STORE_DIR)
}

#[must_use]
pub fn store_file_path(base: &Path) -> PathBuf {
    store_root(base).join(STORE_FILE_NAME)
}
