//! Dataset enumeration: `<root>/<person>/<image>.{jpg,jpeg,png}`.

use anyhow::{bail, Context, Result};
use eigenface_core::{TrainingCorpus, Vectorizer};
use serde::Serialize;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// One person directory and its image files, both sorted by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub label: String,
    pub images: Vec<PathBuf>,
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// List every person directory under `root` that holds at least one image.
pub fn scan(root: &Path) -> Result<Vec<Person>> {
    if !root.is_dir() {
        bail!("dataset not found: {}", root.display());
    }

    let mut people = Vec::new();
    for entry in std::fs::read_dir(root).with_context(|| format!("reading {}", root.display()))? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let Some(label) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            tracing::warn!(path = %path.display(), "skipping directory with non-UTF-8 name");
            continue;
        };

        let mut images: Vec<PathBuf> = std::fs::read_dir(&path)
            .with_context(|| format!("reading {}", path.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        if images.is_empty() {
            tracing::debug!(person = %label, "no images, skipping");
            continue;
        }
        images.sort();
        people.push(Person { label, images });
    }
    people.sort_by(|a, b| a.label.cmp(&b.label));
    Ok(people)
}

/// Image count of one person.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonCount {
    pub label: String,
    pub images: usize,
}

/// Per-person image counts of a dataset, without decoding anything.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub root: PathBuf,
    pub people: Vec<PersonCount>,
    pub total_images: usize,
}

impl DatasetSummary {
    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }
}

pub fn summarize(root: &Path) -> Result<DatasetSummary> {
    let people: Vec<PersonCount> = scan(root)?
        .into_iter()
        .map(|p| PersonCount {
            label: p.label,
            images: p.images.len(),
        })
        .collect();
    let total_images = people.iter().map(|p| p.images).sum();
    Ok(DatasetSummary {
        root: root.to_path_buf(),
        people,
        total_images,
    })
}

/// Vectorize every image of every person. Undecodable files are skipped.
pub fn load_corpus(root: &Path, vectorizer: &Vectorizer) -> Result<TrainingCorpus> {
    let people = scan(root)?;
    let mut corpus = TrainingCorpus::new();
    let mut skipped = 0usize;

    for person in &people {
        for path in &person.images {
            match vectorizer.from_path(path) {
                Ok(face) => corpus.push(face, person.label.clone())?,
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable image");
                }
            }
        }
    }

    tracing::info!(
        people = people.len(),
        images = corpus.len(),
        skipped,
        root = %root.display(),
        "dataset loaded"
    );
    Ok(corpus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn scratch_dataset() -> PathBuf {
        let root = std::env::temp_dir().join(format!("eigenface-dataset-{}", uuid::Uuid::new_v4()));
        for (person, shade) in [("budi", 40u8), ("ana", 200u8)] {
            let dir = root.join(person);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..2u8 {
                GrayImage::from_pixel(8, 8, Luma([shade + i * 5]))
                    .save(dir.join(format!("{i}.png")))
                    .unwrap();
            }
            std::fs::write(dir.join("notes.txt"), "not an image").unwrap();
        }
        std::fs::create_dir_all(root.join("empty")).unwrap();
        root
    }

    #[test]
    fn test_is_image() {
        assert!(is_image(Path::new("a/b.JPG")));
        assert!(is_image(Path::new("face.png")));
        assert!(!is_image(Path::new("face.gif")));
        assert!(!is_image(Path::new("README")));
    }

    #[test]
    fn test_scan_sorts_and_skips_empty() {
        let root = scratch_dataset();
        let people = scan(&root).unwrap();
        let labels: Vec<&str> = people.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["ana", "budi"]);
        assert_eq!(people[0].images.len(), 2);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_load_corpus() {
        let root = scratch_dataset();
        let vectorizer = Vectorizer::new(4, 4).unwrap();
        let corpus = load_corpus(&root, &vectorizer).unwrap();
        assert_eq!(corpus.len(), 4);
        assert_eq!(corpus.dimension(), 16);
        assert_eq!(corpus.labels()[0], "ana");
        assert_eq!(corpus.labels()[3], "budi");
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_summarize_counts_per_person() {
        let root = scratch_dataset();
        std::fs::write(root.join("budi").join("2.jpg"), "truncated").unwrap();

        let summary = summarize(&root).unwrap();
        assert_eq!(
            summary.people,
            vec![
                PersonCount { label: "ana".into(), images: 2 },
                PersonCount { label: "budi".into(), images: 3 },
            ]
        );
        assert_eq!(summary.total_images, 5);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_summarize_empty_dataset() {
        let root = std::env::temp_dir().join(format!("eigenface-empty-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("nobody")).unwrap();
        let summary = summarize(&root).unwrap();
        assert!(summary.is_empty());
        assert_eq!(summary.total_images, 0);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_missing_root() {
        assert!(scan(Path::new("/nonexistent/eigenface/dataset")).is_err());
    }
}
