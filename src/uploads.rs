use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("Couldn't write upload {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lowercased extension of `original_name` if it names an image type.
pub fn image_extension(original_name: &str) -> Option<String> {
    let ext = Path::new(original_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    let mime = mime_guess::from_ext(&ext).first()?;
    (mime.type_() == mime_guess::mime::IMAGE).then_some(ext)
}

/// A fresh name of the form `{unix_millis}-{16 hex chars}.{ext}`.
pub fn generate_filename(ext: &str) -> String {
    let stamp = Utc::now().timestamp_millis();
    let random: [u8; 8] = rand::thread_rng().gen();
    let random: String = random.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{stamp}-{random}.{ext}")
}

/// Store an uploaded image under `dir` and return its generated file name.
pub fn save_upload(dir: &Path, original_name: &str, data: &[u8]) -> Result<String, UploadError> {
    let ext = image_extension(original_name)
        .ok_or_else(|| UploadError::UnsupportedType(original_name.to_string()))?;

    std::fs::create_dir_all(dir).map_err(io_err(dir))?;
    store_new_file(dir, &ext, data, write_upload)
}

/// Write `data` to a freshly named file in `dir`. A file that fails part way
/// through is removed before the error is returned.
fn store_new_file<F>(dir: &Path, ext: &str, data: &[u8], write: F) -> Result<String, UploadError>
where
    F: Fn(std::fs::File, &[u8]) -> std::io::Result<()>,
{
    // Loop until we generate a filename that isn't already taken.
    loop {
        let name = generate_filename(ext);
        let path = dir.join(&name);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => {
                return match write(file, data) {
                    Ok(()) => {
                        tracing::info!("Saved upload {} ({} bytes)", name, data.len());
                        Ok(name)
                    }
                    Err(e) => {
                        if let Err(remove_err) = std::fs::remove_file(&path) {
                            tracing::warn!("Couldn't remove partial upload {}: {}", name, remove_err);
                        }
                        Err(io_err(&path)(e))
                    }
                };
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(io_err(&path)(e)),
        }
    }
}

fn write_upload(mut file: std::fs::File, data: &[u8]) -> std::io::Result<()> {
    file.write_all(data)?;
    file.sync_all()
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> UploadError {
    let path = path.to_path_buf();
    move |source| UploadError::Io { path, source }
}

/// Remove stored uploads, logging rather than failing on errors.
pub fn remove_uploads(dir: &Path, filenames: &[String]) {
    for name in filenames {
        if !is_safe_filename(name) {
            continue;
        }
        if let Err(e) = std::fs::remove_file(dir.join(name)) {
            tracing::warn!("Couldn't remove upload {}: {}", name, e);
        }
    }
}

/// Upload names are single path components without traversal.
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}
