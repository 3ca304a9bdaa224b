//! Problem catalog: folders of OCP-QP problems following the
//! `<folder>/<folder_name>[.json|_meta.json|_ref_sol.json]` convention.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{BenchError, Result};
use crate::filter::{MetaFilter, MetaFlag};

/// Metadata stored next to every problem in `<name>_meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemMetadata {
    pub name: String,
    #[serde(rename = "N")]
    pub horizon: u32,
    #[serde(default)]
    pub has_slacks: bool,
    #[serde(default)]
    pub has_masks: bool,
    #[serde(default)]
    pub has_idxs_rev_not_idxs: bool,
}

impl ProblemMetadata {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| BenchError::Metadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| BenchError::Metadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Name used as the `problem` column of the results table: the metadata
    /// name up to its first `.`, so `set_a_chain.json` becomes `set_a_chain`.
    pub fn problem_name(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }
}

/// The three files derived from one problem folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemPaths {
    pub folder: PathBuf,
    pub data: PathBuf,
    pub meta: PathBuf,
    pub ref_sol: PathBuf,
}

impl ProblemPaths {
    pub fn for_folder(folder: &Path) -> Self {
        let name = folder
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            folder: folder.to_path_buf(),
            data: folder.join(format!("{}.json", name)),
            meta: folder.join(format!("{}_meta.json", name)),
            ref_sol: folder.join(format!("{}_ref_sol.json", name)),
        }
    }

    pub fn load_metadata(&self) -> Result<ProblemMetadata> {
        ProblemMetadata::load(&self.meta)
    }

    pub fn has_reference_solution(&self) -> bool {
        self.ref_sol.is_file()
    }
}

/// An ordered list of problem folders. Nothing is read from disk until the
/// catalog is iterated or filtered.
#[derive(Debug, Clone, Default)]
pub struct ProblemCatalog {
    folders: Vec<PathBuf>,
    description: String,
}

impl ProblemCatalog {
    pub fn new(folders: Vec<PathBuf>) -> Self {
        Self {
            folders,
            description: String::new(),
        }
    }

    /// Lists `<root>/<subset>/<entry>` for every subset directory of a
    /// dataset collection.
    pub fn discover(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(BenchError::DatasetNotFound(root.to_path_buf()));
        }
        let mut folders = Vec::new();
        for entry in WalkDir::new(root)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| BenchError::Io(e.into()))?;
            folders.push(entry.into_path());
        }
        debug!(root = %root.display(), count = folders.len(), "discovered problem folders");
        Ok(Self::new(folders))
    }

    pub fn folders(&self) -> &[PathBuf] {
        &self.folders
    }

    /// Number of folder paths held, including ones that later turn out not
    /// to be directories.
    pub fn count_problems(&self) -> usize {
        self.folders.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ProblemPaths> + '_ {
        self.folders
            .iter()
            .filter(|f| f.is_dir())
            .map(|f| ProblemPaths::for_folder(f))
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.set_description(description);
        self
    }

    pub fn title(&self) -> &str {
        &self.description
    }

    /// Keeps the folders whose metadata satisfies `filter`. Folders that are
    /// not directories are dropped.
    pub fn filter_by_meta(&self, filter: &MetaFilter) -> Result<Self> {
        let mut kept = Vec::new();
        for folder in &self.folders {
            if !folder.is_dir() {
                continue;
            }
            let meta = ProblemPaths::for_folder(folder).load_metadata()?;
            if filter.matches(&meta) {
                kept.push(folder.clone());
            }
        }
        Ok(Self::new(kept))
    }

    pub fn filter_has_slacks(&self, expected: bool) -> Result<Self> {
        self.filter_by_meta(&MetaFilter::flag(MetaFlag::HasSlacks, expected))
    }

    pub fn filter_has_masks(&self, expected: bool) -> Result<Self> {
        self.filter_by_meta(&MetaFilter::flag(MetaFlag::HasMasks, expected))
    }

    pub fn filter_has_idxs_rev_not_idxs(&self, expected: bool) -> Result<Self> {
        self.filter_by_meta(&MetaFilter::flag(MetaFlag::HasIdxsRevNotIdxs, expected))
    }

    /// Problem names (as written to the results table) of every problem in
    /// the catalog.
    pub fn problem_names(&self) -> Result<Vec<String>> {
        self.iter()
            .map(|p| p.load_metadata().map(|m| m.problem_name().to_string()))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fsutil::scratch_dir;
    use serde_json::json;

    pub(crate) fn write_problem(
        subset_dir: &Path,
        name: &str,
        horizon: u32,
        flags: (bool, bool, bool),
    ) -> PathBuf {
        let folder = subset_dir.join(name);
        fs::create_dir_all(&folder).expect("problem folder");
        fs::write(folder.join(format!("{}.json", name)), b"{\"N\": 1}").expect("data");
        let meta = json!({
            "name": format!("{}.json", name),
            "N": horizon,
            "has_slacks": flags.0,
            "has_masks": flags.1,
            "has_idxs_rev_not_idxs": flags.2,
        });
        fs::write(
            folder.join(format!("{}_meta.json", name)),
            serde_json::to_vec_pretty(&meta).expect("meta json"),
        )
        .expect("meta");
        folder
    }

    fn sample_collection(tag: &str) -> PathBuf {
        let root = scratch_dir(tag);
        let subset = root.join("set_a");
        write_problem(&subset, "p_plain", 10, (false, false, false));
        write_problem(&subset, "p_masks", 12, (false, true, false));
        write_problem(&subset, "p_rev", 14, (true, false, true));
        write_problem(&subset, "p_both", 16, (true, true, true));
        root
    }

    fn names(catalog: &ProblemCatalog) -> Vec<String> {
        let mut out = catalog.problem_names().expect("names");
        out.sort();
        out
    }

    #[test]
    fn paths_follow_folder_convention() {
        let paths = ProblemPaths::for_folder(Path::new("/data/set/chain"));
        assert_eq!(paths.data, PathBuf::from("/data/set/chain/chain.json"));
        assert_eq!(paths.meta, PathBuf::from("/data/set/chain/chain_meta.json"));
        assert_eq!(paths.ref_sol, PathBuf::from("/data/set/chain/chain_ref_sol.json"));
    }

    #[test]
    fn discover_fails_on_missing_root() {
        let missing = std::env::temp_dir().join("qpbench_definitely_missing_root");
        let err = ProblemCatalog::discover(&missing).expect_err("must fail");
        assert!(matches!(err, BenchError::DatasetNotFound(_)));
    }

    #[test]
    fn count_includes_entries_that_are_not_directories() {
        let root = sample_collection("catalog_count");
        fs::write(root.join("set_a").join("README.txt"), b"notes").expect("stray file");
        let catalog = ProblemCatalog::discover(&root).expect("discover");
        assert_eq!(catalog.count_problems(), 5);
        assert_eq!(catalog.iter().count(), 4);

        let explicit = ProblemCatalog::new(vec![
            root.join("set_a").join("p_plain"),
            root.join("does_not_exist"),
        ]);
        assert_eq!(explicit.count_problems(), 2);
        assert_eq!(explicit.iter().count(), 1);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn filters_compose_in_either_order() {
        let root = sample_collection("catalog_filter");
        let catalog = ProblemCatalog::discover(&root).expect("discover");

        let ab = catalog
            .filter_has_masks(false)
            .and_then(|c| c.filter_has_idxs_rev_not_idxs(false))
            .expect("a then b");
        let ba = catalog
            .filter_has_idxs_rev_not_idxs(false)
            .and_then(|c| c.filter_has_masks(false))
            .expect("b then a");
        assert_eq!(names(&ab), names(&ba));
        assert_eq!(names(&ab), vec!["p_plain".to_string()]);

        let slacks = catalog.filter_has_slacks(true).expect("slacks");
        assert_eq!(names(&slacks), vec!["p_both".to_string(), "p_rev".to_string()]);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn missing_flags_read_as_false() {
        let root = scratch_dir("catalog_defaults");
        let folder = root.join("set").join("bare");
        fs::create_dir_all(&folder).expect("folder");
        fs::write(folder.join("bare_meta.json"), br#"{"name": "bare.json", "N": 3}"#)
            .expect("meta");
        let meta = ProblemPaths::for_folder(&folder).load_metadata().expect("meta");
        assert!(!meta.has_slacks && !meta.has_masks && !meta.has_idxs_rev_not_idxs);
        assert_eq!(meta.problem_name(), "bare");
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn description_is_not_carried_by_filters() {
        let root = sample_collection("catalog_description");
        let catalog = ProblemCatalog::discover(&root)
            .expect("discover")
            .with_description("all problems");
        assert_eq!(catalog.title(), "all problems");
        let filtered = catalog.filter_has_masks(true).expect("filter");
        assert_eq!(filtered.description(), "");
        let _ = fs::remove_dir_all(root);
    }
}
