//! Workspace layout and array discovery.
//!
//! A workspace is a directory containing arrays, possibly in subdirectories.
//! The standard locations of the arrays used by the ingestion tools and the query daemon are given by an
//! [`ArrayLayout`].
//! Any directory containing a schema marker is an array; see [`SparseArray::exists`].

use crate::store::SparseArray;
use crate::Result;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

//-----------------------------------------------------------------------------

/// Kinds of arrays in a workspace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArrayKind {
    /// Variants with per-sample genotypes.
    Variants,
    /// Population allele frequencies.
    Population,
    /// Clinical significance.
    Clinical,
    /// Gene regions.
    GeneRegions,
    /// Gene features.
    GeneFeatures,
}

impl ArrayKind {
    /// All kinds.
    pub const ALL: [ArrayKind; 5] = [
        ArrayKind::Variants,
        ArrayKind::Population,
        ArrayKind::Clinical,
        ArrayKind::GeneRegions,
        ArrayKind::GeneFeatures,
    ];

    /// Returns a human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            ArrayKind::Variants => "Variants",
            ArrayKind::Population => "Population frequency",
            ArrayKind::Clinical => "Clinical significance",
            ArrayKind::GeneRegions => "Gene regions",
            ArrayKind::GeneFeatures => "Gene features",
        }
    }
}

impl fmt::Display for ArrayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Relative paths of the arrays in a workspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrayLayout {
    /// Variants with per-sample genotypes.
    pub variants: PathBuf,
    /// Population allele frequencies.
    pub population: PathBuf,
    /// Clinical significance.
    pub clinical: PathBuf,
    /// Gene regions.
    pub gene_regions: PathBuf,
    /// Gene features.
    pub gene_features: PathBuf,
}

impl Default for ArrayLayout {
    fn default() -> Self {
        ArrayLayout {
            variants: PathBuf::from("variants"),
            population: PathBuf::from("population_arrays/population_frequencies"),
            clinical: PathBuf::from("clinvar_arrays/clinvar_variants"),
            gene_regions: PathBuf::from("gene_arrays/gene_regions"),
            gene_features: PathBuf::from("gene_arrays/gene_features"),
        }
    }
}

impl ArrayLayout {
    /// Returns the relative path of the array.
    pub fn path(&self, kind: ArrayKind) -> &Path {
        match kind {
            ArrayKind::Variants => &self.variants,
            ArrayKind::Population => &self.population,
            ArrayKind::Clinical => &self.clinical,
            ArrayKind::GeneRegions => &self.gene_regions,
            ArrayKind::GeneFeatures => &self.gene_features,
        }
    }
}

//-----------------------------------------------------------------------------

/// A workspace directory with an array layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    layout: ArrayLayout,
}

impl Workspace {
    /// Creates a workspace with the default layout.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self::with_layout(root, ArrayLayout::default())
    }

    /// Creates a workspace with the given layout.
    pub fn with_layout<P: AsRef<Path>>(root: P, layout: ArrayLayout) -> Self {
        Workspace { root: root.as_ref().to_path_buf(), layout }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the array layout.
    pub fn layout(&self) -> &ArrayLayout {
        &self.layout
    }

    /// Returns the full path of the array.
    pub fn array_path(&self, kind: ArrayKind) -> PathBuf {
        self.root.join(self.layout.path(kind))
    }

    /// Returns all arrays under the root, sorted by path.
    ///
    /// Directories inside an array are not searched.
    /// Unreadable directories are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be read.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();
        if SparseArray::exists(&self.root) {
            result.push(self.root.clone());
            return Ok(result);
        }
        fs::read_dir(&self.root)?;
        discover_arrays(&self.root, &mut result);
        result.sort();
        Ok(result)
    }
}

fn discover_arrays(path: &Path, result: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!("Cannot read {}: {}", path.display(), err);
            return;
        },
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if SparseArray::exists(&path) {
            result.push(path);
        } else {
            discover_arrays(&path, result);
        }
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::{ArraySchema, Dimension};

    use tempfile::TempDir;

    fn create(path: &Path) {
        let schema = ArraySchema::new(Dimension::new("idx", 0, 10, 1), Vec::new());
        let result = SparseArray::create(path, &schema);
        assert!(result.is_ok(), "Failed to create array {}: {}", path.display(), result.unwrap_err());
    }

    #[test]
    fn default_layout() {
        let workspace = Workspace::new("/data/genomics");
        assert_eq!(workspace.array_path(ArrayKind::Variants), PathBuf::from("/data/genomics/variants"));
        assert_eq!(
            workspace.array_path(ArrayKind::Population),
            PathBuf::from("/data/genomics/population_arrays/population_frequencies")
        );
        assert_eq!(
            workspace.array_path(ArrayKind::GeneFeatures),
            PathBuf::from("/data/genomics/gene_arrays/gene_features")
        );
    }

    #[test]
    fn finds_arrays() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path());
        assert!(workspace.discover().unwrap().is_empty());

        create(&workspace.array_path(ArrayKind::Clinical));
        create(&workspace.array_path(ArrayKind::GeneRegions));
        create(&workspace.array_path(ArrayKind::GeneFeatures));
        fs::create_dir_all(dir.path().join("downloads/clinvar")).unwrap();
        fs::write(dir.path().join("downloads/clinvar/clinvar.vcf.gz"), b"").unwrap();

        let arrays = workspace.discover();
        assert!(arrays.is_ok(), "Discovery failed: {}", arrays.unwrap_err());
        let expected = vec![
            workspace.array_path(ArrayKind::Clinical),
            workspace.array_path(ArrayKind::GeneFeatures),
            workspace.array_path(ArrayKind::GeneRegions),
        ];
        assert_eq!(arrays.unwrap(), expected);

        let single = Workspace::new(workspace.array_path(ArrayKind::Clinical));
        assert_eq!(single.discover().unwrap().len(), 1, "A workspace root can itself be an array");
    }

    #[test]
    fn missing_workspace() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path().join("missing"));
        assert!(workspace.discover().is_err());
    }
}

//-----------------------------------------------------------------------------
