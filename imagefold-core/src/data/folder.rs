// ImageFolder: one split of a class-per-directory image dataset
//
//   <split>/
//     cat/
//       1.jpg
//       2.jpg
//     dog/
//       1.jpg
//
// Scanning only lists files; pixels are decoded on demand by `decode`, so a
// split of any size costs one path per image until it is iterated.
//
// Labels come from a class list supplied by the caller (the train split's
// sorted directory names). A directory missing from that list still has its
// images listed, with no label.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::{debug, warn};

use crate::error::{ImageFoldError, Result};

/// Recognized image extensions (case-insensitive).
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "ppm", "bmp", "pgm", "tif", "tiff", "webp",
];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// One listed image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderItem {
    pub path: PathBuf,
    /// Directory the image was found in
    pub class_name: String,
    /// Index into the class list; `None` when the directory is not in it
    pub label: Option<usize>,
}

/// A scanned split directory.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    class_names: Vec<String>,
    items: Vec<FolderItem>,
    unknown_classes: Vec<String>,
}

impl ImageFolder {
    /// Sorted names of the subdirectories of `dir`
    pub fn class_names_in(dir: &Path) -> Result<Vec<String>> {
        let mut names: Vec<String> = class_dirs(dir)?.into_iter().map(|(n, _)| n).collect();
        names.sort();
        Ok(names)
    }

    /// Scan `root`, labelling images by their directory's position in
    /// `class_names`.
    pub fn scan(root: impl AsRef<Path>, class_names: &[String]) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        let mut dirs = class_dirs(&root)?;
        dirs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut items = Vec::new();
        let mut unknown_classes = Vec::new();

        for (name, dir) in dirs {
            let label = class_names.iter().position(|c| *c == name);
            if label.is_none() {
                unknown_classes.push(name.clone());
            }

            let mut paths = Vec::new();
            collect_images(&dir, &mut paths)?;
            paths.sort();
            debug!("{}: {} images in class '{}'", root.display(), paths.len(), name);

            items.extend(paths.into_iter().map(|path| FolderItem {
                path,
                class_name: name.clone(),
                label,
            }));
        }

        if !unknown_classes.is_empty() {
            warn!(
                "{}: classes {:?} are not in the class list; their images have no label",
                root.display(),
                unknown_classes
            );
        }

        Ok(Self {
            root,
            class_names: class_names.to_vec(),
            items,
            unknown_classes,
        })
    }

    /// Scan `root` using its own sorted subdirectory names as the class list
    pub fn scan_own_classes(root: impl AsRef<Path>) -> Result<Self> {
        let class_names = Self::class_names_in(root.as_ref())?;
        Self::scan(root, &class_names)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Class list labels index into
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Directories found here that are not in the class list
    pub fn unknown_classes(&self) -> &[String] {
        &self.unknown_classes
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[FolderItem] {
        &self.items
    }

    pub fn item(&self, index: usize) -> &FolderItem {
        &self.items[index]
    }

    /// Image count per class directory
    pub fn class_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for item in &self.items {
            *counts.entry(item.class_name.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Read and decode the i-th image. The format is sniffed from content.
    pub fn decode(&self, index: usize) -> Result<DynamicImage> {
        let path = &self.items[index].path;
        let corrupt = |reason: String| ImageFoldError::CorruptImage {
            path: path.clone(),
            reason,
        };

        image::io::Reader::open(path)
            .map_err(|e| corrupt(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| corrupt(e.to_string()))?
            .decode()
            .map_err(|e| corrupt(e.to_string()))
    }
}

/// Immediate subdirectories of `dir` as `(name, path)`
fn class_dirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| ImageFoldError::io(dir, e))? {
        let entry = entry.map_err(|e| ImageFoldError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            let name = entry.file_name().to_string_lossy().into_owned();
            out.push((name, path));
        }
    }
    Ok(out)
}

/// Recursively collect image files
fn collect_images(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| ImageFoldError::io(dir, e))? {
        let entry = entry.map_err(|e| ImageFoldError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_images(&path, out)?;
        } else if is_image(&path) {
            out.push(path);
        } else {
            debug!("Skipping non-image file {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_is_image() {
        assert!(is_image(Path::new("a/b.JPG")));
        assert!(is_image(Path::new("x.webp")));
        assert!(!is_image(Path::new("notes.txt")));
        assert!(!is_image(Path::new("jpg")));
    }

    #[test]
    fn test_scan_orders_and_labels() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("turkeys/b.png"));
        touch(&root.join("turkeys/a.png"));
        touch(&root.join("chickens/nested/c.jpg"));
        touch(&root.join("chickens/readme.md"));

        let folder = ImageFolder::scan_own_classes(root).unwrap();
        assert_eq!(folder.class_names(), &["chickens", "turkeys"]);
        assert_eq!(folder.len(), 3);
        assert_eq!(folder.item(0).label, Some(0));
        assert_eq!(folder.item(1).path, root.join("turkeys/a.png"));
        assert_eq!(folder.item(2).label, Some(1));
        assert!(folder.unknown_classes().is_empty());
    }

    #[test]
    fn test_unknown_class_has_no_label() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("bird/1.jpg"));
        touch(&tmp.path().join("cat/1.jpg"));

        let classes = vec!["cat".to_string(), "dog".to_string()];
        let folder = ImageFolder::scan(tmp.path(), &classes).unwrap();
        assert_eq!(folder.len(), 2);
        assert_eq!(folder.item(0).class_name, "bird");
        assert_eq!(folder.item(0).label, None);
        assert_eq!(folder.item(1).label, Some(0));
        assert_eq!(folder.unknown_classes(), &["bird"]);
    }

    #[test]
    fn test_empty_split_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let folder = ImageFolder::scan_own_classes(tmp.path()).unwrap();
        assert!(folder.is_empty());
        assert!(folder.class_names().is_empty());
    }

    #[test]
    fn test_decode_failure_is_corrupt_image() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("cat")).unwrap();
        std::fs::write(tmp.path().join("cat/1.jpg"), b"definitely not a jpeg").unwrap();

        let folder = ImageFolder::scan_own_classes(tmp.path()).unwrap();
        match folder.decode(0) {
            Err(ImageFoldError::CorruptImage { path, .. }) => {
                assert_eq!(path, tmp.path().join("cat/1.jpg"))
            }
            other => panic!("expected CorruptImage, got {other:?}"),
        }
    }
}
