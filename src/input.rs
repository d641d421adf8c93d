//! Descoberta dos screenshots a processar.

use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Extensões aceitas, comparadas sem diferenciar maiúsculas.
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Lista as imagens diretamente dentro de `folder`, ordenadas pelo caminho.
///
/// Não desce em subpastas. Uma pasta inexistente (ou um arquivo no lugar dela)
/// é erro; uma pasta sem imagens retorna lista vazia.
pub fn enumerate(folder: &Path) -> Result<Vec<PathBuf>, AppError> {
    if !folder.is_dir() {
        return Err(AppError::FolderNotFound(folder.to_path_buf()));
    }

    let mut images = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_image(&path) {
            images.push(path);
        }
    }
    images.sort();

    tracing::debug!(folder = %folder.display(), count = images.len(), "enumerated screenshots");
    Ok(images)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"img").unwrap();
    }

    #[test]
    fn lists_images_sorted_and_filters_other_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.png");
        touch(dir.path(), "a.JPG");
        touch(dir.path(), "c.jpeg");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "noext");

        let names: Vec<String> = enumerate(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png", "c.jpeg"]);
    }

    #[test]
    fn does_not_recurse() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested.png");
        std::fs::create_dir(&nested).unwrap();
        touch(&nested, "inner.png");
        touch(dir.path(), "top.png");

        let found = enumerate(dir.path()).unwrap();
        assert_eq!(found, vec![dir.path().join("top.png")]);
    }

    #[test]
    fn empty_folder_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        assert!(enumerate(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        assert!(matches!(
            enumerate(&missing),
            Err(AppError::FolderNotFound(p)) if p == missing
        ));
    }

    #[test]
    fn file_instead_of_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "shot.png");
        assert!(enumerate(&dir.path().join("shot.png")).is_err());
    }
}
