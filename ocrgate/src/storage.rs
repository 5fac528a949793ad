//! On-disk persistence for uploads and their result sidecars.
//!
//! Upload names are `<local timestamp>__<random suffix><.ext>`. The
//! timestamp keeps directory listings chronological; the suffix plus
//! create-new writes guarantee one request can never overwrite another's
//! upload, even within the same second.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{OcrGateError, Result};
use crate::ocr::OcrResult;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d__%H-%M-%S";
const SUFFIX_LEN: usize = 8;
const SUFFIX_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];
const MAX_NAME_ATTEMPTS: usize = 3;

/// Persist `content` under `destination_dir` and return the written path.
pub async fn store(
    original_filename: &str,
    content: &[u8],
    destination_dir: &Path,
) -> Result<PathBuf> {
    let extension = sanitized_extension(original_filename);
    let next_name = || {
        let suffix = nanoid::nanoid!(SUFFIX_LEN, &SUFFIX_ALPHABET);
        upload_file_name(Local::now(), &suffix, extension.as_deref())
    };
    store_as(content, destination_dir, next_name).await
}

/// Write `content` to the first name from `next_name` that does not exist
/// yet, giving up after `MAX_NAME_ATTEMPTS` names.
async fn store_as(
    content: &[u8],
    destination_dir: &Path,
    mut next_name: impl FnMut() -> String,
) -> Result<PathBuf> {
    for _ in 0..MAX_NAME_ATTEMPTS {
        let path = destination_dir.join(next_name());

        let mut file = match create_new(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                warn!(path = %path.display(), "Upload name already taken, regenerating");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        file.write_all(content).await?;
        file.flush().await?;

        debug!(path = %path.display(), bytes = content.len(), "Stored upload");
        return Ok(path);
    }

    Err(OcrGateError::Storage(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("Could not find a free upload name after {MAX_NAME_ATTEMPTS} attempts"),
    )))
}

async fn create_new(path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
}

pub fn upload_file_name(now: DateTime<Local>, suffix: &str, extension: Option<&str>) -> String {
    let stem = format!("{}__{suffix}", now.format(TIMESTAMP_FORMAT));
    match extension {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}

/// Lowercased extension of the client's filename, if it is plain ASCII
/// alphanumeric. Anything else (path tricks, spaces, unicode) is dropped.
pub fn sanitized_extension(original_filename: &str) -> Option<String> {
    Path::new(original_filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
}

/// `<upload file name>.json`. The upload's own extension is kept, so a
/// sidecar can never share a name with the upload it describes.
pub fn sidecar_path(image_path: &Path) -> PathBuf {
    let mut name = image_path.as_os_str().to_os_string();
    name.push(".json");
    PathBuf::from(name)
}

/// Write the structured result next to its upload. Never replaces an
/// existing file.
pub async fn write_sidecar(image_path: &Path, result: &OcrResult) -> Result<PathBuf> {
    let path = sidecar_path(image_path);
    let json = serde_json::to_vec_pretty(result)?;
    let mut file = create_new(&path).await?;
    file.write_all(&json).await?;
    file.flush().await?;
    debug!(path = %path.display(), "Wrote result sidecar");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{BackendName, ModelKey, Recognition};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn test_upload_file_name_format() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            upload_file_name(now, "abc12345", Some("png")),
            "2024-03-09__14-05-07__abc12345.png"
        );
        assert_eq!(
            upload_file_name(now, "abc12345", None),
            "2024-03-09__14-05-07__abc12345"
        );
    }

    #[test]
    fn test_sanitized_extension() {
        assert_eq!(sanitized_extension("scan.PNG"), Some("png".to_string()));
        assert_eq!(sanitized_extension("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(sanitized_extension("noext"), None);
        assert_eq!(sanitized_extension("weird.p n g"), None);
        assert_eq!(sanitized_extension("../../etc/passwd"), None);
        assert_eq!(sanitized_extension(""), None);
    }

    #[tokio::test]
    async fn test_store_writes_full_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = store("page.jpg", b"jpeg bytes", dir.path()).await.unwrap();

        assert_eq!(path.parent().unwrap(), dir.path());
        assert_eq!(path.extension().unwrap(), "jpg");
        assert_eq!(std::fs::read(&path).unwrap(), b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_rapid_stores_never_collide() {
        let dir = tempfile::tempdir().unwrap();

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let dir = dir.path().to_path_buf();
                tokio::spawn(async move {
                    store("same.png", format!("upload {i}").as_bytes(), &dir).await
                })
            })
            .collect();

        let mut paths = HashSet::new();
        for handle in handles {
            paths.insert(handle.await.unwrap().unwrap());
        }

        assert_eq!(paths.len(), 32);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 32);
    }

    #[tokio::test]
    async fn test_store_into_missing_directory_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");

        let err = store("page.png", b"x", &missing).await.unwrap_err();
        assert!(matches!(err, OcrGateError::Storage(_)));
    }

    #[tokio::test]
    async fn test_write_sidecar_next_to_upload() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("2024-03-09__14-05-07__abc12345.png");
        let key = ModelKey::new(BackendName::EasyOcr, &["hi"]);
        let result = OcrResult::new(&key, "page.png", (10, 10), Recognition::default());

        let path = write_sidecar(&image, &result).await.unwrap();

        assert_eq!(
            path,
            dir.path().join("2024-03-09__14-05-07__abc12345.png.json")
        );
        let parsed: OcrResult =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(parsed, result);
    }

    #[test]
    fn test_sidecar_path_never_matches_upload() {
        let upload = Path::new("out/2024-03-09__14-05-07__abc12345.json");
        assert_eq!(
            sidecar_path(upload),
            PathBuf::from("out/2024-03-09__14-05-07__abc12345.json.json")
        );
        assert_eq!(
            sidecar_path(Path::new("out/2024-03-09__14-05-07__abc12345")),
            PathBuf::from("out/2024-03-09__14-05-07__abc12345.json")
        );
    }

    #[tokio::test]
    async fn test_write_sidecar_does_not_replace_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("2024-03-09__14-05-07__abc12345");
        std::fs::write(dir.path().join("2024-03-09__14-05-07__abc12345.json"), b"upload").unwrap();
        let key = ModelKey::new(BackendName::EasyOcr, &["hi"]);
        let result = OcrResult::new(&key, "page", (10, 10), Recognition::default());

        let err = write_sidecar(&image, &result).await.unwrap_err();
        assert!(matches!(err, OcrGateError::Storage(_)));
        assert_eq!(
            std::fs::read(dir.path().join("2024-03-09__14-05-07__abc12345.json")).unwrap(),
            b"upload"
        );
    }

    #[tokio::test]
    async fn test_taken_name_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("taken.png"), b"first").unwrap();

        let mut names = ["taken.png", "fresh.png"].into_iter().map(str::to_string);
        let path = store_as(b"second", dir.path(), || names.next().unwrap())
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("fresh.png"));
        assert_eq!(std::fs::read(dir.path().join("taken.png")).unwrap(), b"first");
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_gives_up_after_repeated_collisions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("taken.png"), b"first").unwrap();

        let mut attempts = 0;
        let err = store_as(b"second", dir.path(), || {
            attempts += 1;
            "taken.png".to_string()
        })
        .await
        .unwrap_err();

        assert!(matches!(err, OcrGateError::Storage(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists));
        assert_eq!(attempts, MAX_NAME_ATTEMPTS);
        assert_eq!(std::fs::read(dir.path().join("taken.png")).unwrap(), b"first");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
