//! Filesystem staging for the output directory.
use crate::error::WorkflowError;
use std::fs;
use std::io;
use std::path::Path;

/// Create the directory if absent; an existing directory is left alone.
pub fn ensure_output_dir(path: &Path) -> Result<(), WorkflowError> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|err| WorkflowError::filesystem("create", path, err))
}

/// Recursively remove the tree. A missing path counts as success.
pub fn clean_dir(path: &Path) -> Result<(), WorkflowError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(WorkflowError::filesystem("remove", path, err)),
    }
}

/// Recursively copy `source` into `dest`, replacing existing files
/// unconditionally. A missing or unreadable source tree is an error.
pub fn copy_tree(source: &Path, dest: &Path) -> Result<(), WorkflowError> {
    if !source.is_dir() {
        return Err(WorkflowError::filesystem(
            "copy",
            source,
            io::Error::new(io::ErrorKind::NotFound, "source tree missing"),
        ));
    }
    fs::create_dir_all(dest).map_err(|err| WorkflowError::filesystem("create", dest, err))?;
    for entry in
        fs::read_dir(source).map_err(|err| WorkflowError::filesystem("read", source, err))?
    {
        let entry = entry.map_err(|err| WorkflowError::filesystem("read", source, err))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|err| WorkflowError::filesystem("read", &from, err))?;
        if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|err| WorkflowError::filesystem("copy", &from, err))?;
        }
    }
    Ok(())
}
