//! Array maintenance: size and fragment reports, consolidation, and vacuuming.
//!
//! Optimizing an array takes the writer lock, so it fails with [`Error::ArrayLocked`] while an ingestion run or
//! another maintenance run holds the array.
//! Readers are not affected.

use crate::store::{ArrayHandle, ArrayWriter, SparseArray};
use crate::workspace::Workspace;
use crate::{utils, Error, Result};

use std::path::{Path, PathBuf};

use serde::Serialize;

//-----------------------------------------------------------------------------

/// Size and structure of an array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArrayInfo {
    /// Array name, relative to the workspace when known.
    pub name: String,
    /// Full path.
    pub path: PathBuf,
    /// Size on disk in bytes.
    pub size_bytes: u64,
    /// Human-readable size on disk.
    pub size: String,
    /// Number of write fragments.
    pub fragment_count: usize,
    /// Number of dimensions.
    pub dimensions: usize,
    /// Number of attributes.
    pub attributes: usize,
    /// Number of stored cells.
    pub cells: usize,
}

/// Returns information about the array.
///
/// # Errors
///
/// Returns [`Error::NotAnArray`] if the directory is not an array.
/// Passes through database errors.
pub fn array_info<P: AsRef<Path>>(path: P) -> Result<ArrayInfo> {
    let path = path.as_ref();
    let name = path.file_name().map(|x| x.to_string_lossy().to_string()).unwrap_or_default();
    array_info_named(path, name)
}

fn array_info_named(path: &Path, name: String) -> Result<ArrayInfo> {
    let handle = ArrayHandle::open(path)?;
    let (fragment_count, cells) = {
        let reader = handle.reader()?;
        (reader.fragment_count()?, reader.cell_count()?)
    };
    handle.close();
    let size_bytes = handle.size_bytes();
    Ok(ArrayInfo {
        name,
        path: path.to_path_buf(),
        size_bytes,
        size: utils::human_readable_size(size_bytes),
        fragment_count,
        dimensions: handle.schema().dimensions.len(),
        attributes: handle.schema().attributes.len(),
        cells,
    })
}

/// Consolidates the array and then vacuums it.
///
/// Returns the number of fragments before consolidation.
pub fn optimize_array<P: AsRef<Path>>(path: P) -> Result<usize> {
    let path = path.as_ref();
    if !SparseArray::exists(path) {
        return Err(Error::NotAnArray(path.to_path_buf()));
    }
    let mut writer = ArrayWriter::open(path)?;
    let fragments = writer.consolidate()?;
    writer.vacuum()?;
    log::info!("Optimized {} ({} fragments merged)", path.display(), fragments);
    Ok(fragments)
}

//-----------------------------------------------------------------------------

/// Result of optimizing one array in a workspace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OptimizeResult {
    /// Array name relative to the workspace.
    pub name: String,
    /// Did the optimization succeed?
    pub success: bool,
    /// Error message on failure.
    pub error: Option<String>,
    /// Information before optimization.
    pub before: Option<ArrayInfo>,
    /// Information after optimization.
    pub after: Option<ArrayInfo>,
}

/// Summary of the arrays in a workspace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WorkspaceSummary {
    /// Arrays that could be read.
    pub arrays: Vec<ArrayInfo>,
    /// Arrays that could not be read, with error messages.
    pub errors: Vec<(String, String)>,
    /// Total size on disk of the readable arrays.
    pub total_bytes: u64,
}

fn relative_name(workspace: &Workspace, path: &Path) -> String {
    match path.strip_prefix(workspace.root()) {
        Ok(relative) if !relative.as_os_str().is_empty() => relative.display().to_string(),
        _ => path.file_name().map(|x| x.to_string_lossy().to_string()).unwrap_or_default(),
    }
}

/// Returns information about every array in the workspace.
///
/// # Errors
///
/// Returns an error if the workspace cannot be read.
pub fn workspace_summary(workspace: &Workspace) -> Result<WorkspaceSummary> {
    let mut summary = WorkspaceSummary::default();
    for path in workspace.discover()? {
        let name = relative_name(workspace, &path);
        match array_info_named(&path, name.clone()) {
            Ok(info) => {
                summary.total_bytes += info.size_bytes;
                summary.arrays.push(info);
            },
            Err(err) => summary.errors.push((name, err.to_string())),
        }
    }
    Ok(summary)
}

/// Optimizes every array in the workspace.
///
/// A failure with one array does not stop the others.
///
/// # Errors
///
/// Returns an error if the workspace cannot be read.
pub fn optimize_workspace(workspace: &Workspace) -> Result<Vec<OptimizeResult>> {
    let mut result = Vec::new();
    for path in workspace.discover()? {
        let name = relative_name(workspace, &path);
        log::info!("Found array {}", name);
        let before = array_info_named(&path, name.clone()).ok();
        let outcome = optimize_array(&path);
        if let Err(err) = outcome.as_ref() {
            log::error!("Failed to optimize {}: {}", name, err);
        }
        let after = array_info_named(&path, name.clone()).ok();
        result.push(OptimizeResult {
            name,
            success: outcome.is_ok(),
            error: outcome.err().map(|x| x.to_string()),
            before,
            after,
        });
    }
    Ok(result)
}

//-----------------------------------------------------------------------------


//-----------------------------------------------------------------------------
