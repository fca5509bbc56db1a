use std::path::Path;

use walkdir::WalkDir;

use crate::error::CoreError;
use crate::span::Src;

pub const SOURCE_EXTENSION: &str = "gdml";

fn is_source(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION)
}

/// Load `root` itself if it is a file, or every `.gdml` file below it in
/// sorted path order.
pub fn load_sources(root: impl AsRef<Path>) -> Result<Vec<Src>, CoreError> {
    let root = root.as_ref();
    if !root.exists() {
        return Err(CoreError::MissingSource(root.to_path_buf()));
    }
    if root.is_file() {
        return Ok(vec![Src::from_path(root)?]);
    }
    let mut sources = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| CoreError::SourceIo(err.into()))?;
        let path = entry.path();
        if entry.file_type().is_file() && is_source(path) {
            sources.push(Src::from_path(path)?);
        }
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn loads_sources_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.gdml"), "let b = 2").unwrap();
        fs::write(dir.path().join("a.gdml"), "let a = 1").unwrap();
        fs::write(dir.path().join("nested").join("c.gdml"), "let c = 3").unwrap();
        fs::write(dir.path().join("readme.md"), "# not a source").unwrap();

        let sources = load_sources(dir.path()).unwrap();
        let texts: Vec<&str> = sources.iter().map(Src::text).collect();
        assert_eq!(texts, vec!["let a = 1", "let b = 2", "let c = 3"]);
        assert!(sources.iter().all(|src| src.path().is_some()));
    }

    #[test]
    fn accepts_a_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.gdml");
        fs::write(&file, "node Root {}").unwrap();
        let sources = load_sources(&file).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].path(), Some(file.as_path()));
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_sources(dir.path().join("nowhere")).unwrap_err();
        assert!(matches!(err, CoreError::MissingSource(_)));
    }
}
