use std::path::{Path, PathBuf};

pub const CATALOG_DIR: &str = ".agent-chat";
pub const CATALOG_FILE_NAME: &str = "catalog.json";

#[must_use]
pub fn catalog_root(root: &Path) -> PathBuf {
    root.join(CATALOG_DIR)
}

#[must_use]
pub fn catalog_path(root: &Path) -> PathBuf {
    catalog_root(root).join(CATALOG_FILE_NAME)
}

/// Sibling path used while atomically replacing `path`.
#[must_use]
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| CATALOG_FILE_NAME.into());
    name.push(".tmp");
    path.with_file_name(name)
}
