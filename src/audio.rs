// # Audio file analysis
//
// Pure helpers shared by the import pipeline, the watcher, and the worker
// pool: container allow-list, music/sfx classification, MIME lookup, content
// hashing, and duration probing via external tools.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::OnceLock;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::warn;

/// Supported audio container extensions (lowercase, without the dot)
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "aiff", "aif", "flac", "ogg", "m4a", "wma"];

/// Filename vocabulary that marks a file as a sound effect
const SFX_VOCABULARY: &[&str] = &[
    r"(?i)sfx",
    r"(?i)sound.?effect",
    r"(?i)foley",
    r"(?i)whoosh",
    r"(?i)impact",
    r"(?i)hit",
    r"(?i)swoosh",
    r"(?i)click",
    r"(?i)beep",
    r"(?i)transition",
];

static SFX_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
static AFINFO_DURATION: OnceLock<Regex> = OnceLock::new();

/// Derived per-file metadata produced by the worker pool
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadata {
    pub content_hash: String,
    pub duration_seconds: f64,
    pub size_bytes: u64,
}

/// Check the extension allow-list
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Classify by filename keyword; anything not matching the SFX vocabulary
/// defaults to music
pub fn detect_asset_class(filename: &str) -> crate::db::AssetClass {
    let patterns = SFX_PATTERNS.get_or_init(|| {
        SFX_VOCABULARY
            .iter()
            .map(|p| Regex::new(p).expect("SFX vocabulary patterns are static"))
            .collect()
    });

    if patterns.iter().any(|p| p.is_match(filename)) {
        crate::db::AssetClass::Sfx
    } else {
        crate::db::AssetClass::Music
    }
}

/// Fixed extension -> content-type map used for remote uploads
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .as_deref()
    {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("aiff") | Some("aif") => "audio/aiff",
        Some("flac") => "audio/flac",
        Some("ogg") => "audio/ogg",
        Some("m4a") => "audio/mp4",
        Some("wma") => "audio/x-ms-wma",
        _ => "application/octet-stream",
    }
}

/// Stream the file through SHA-256, never holding more than one buffer
pub async fn hash_file(path: &Path) -> Result<String, std::io::Error> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash bytes already in memory (downloads)
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Probe the audio duration, trying ffprobe first and afinfo second.
/// Returns 0.0 when neither tool is available or produces a value.
pub async fn probe_duration(path: &Path) -> f64 {
    if let Some(duration) = probe_with_ffprobe(path).await {
        return duration;
    }
    if let Some(duration) = probe_with_afinfo(path).await {
        return duration;
    }

    warn!("Could not determine duration for {}", path.display());
    0.0
}

async fn probe_with_ffprobe(path: &Path) -> Option<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}

async fn probe_with_afinfo(path: &Path) -> Option<f64> {
    let output = Command::new("afinfo").arg(path).output().await.ok()?;

    if !output.status.success() {
        return None;
    }

    let pattern = AFINFO_DURATION.get_or_init(|| {
        Regex::new(r"duration:\s*([\d.]+)").expect("afinfo duration pattern is static")
    });

    let stdout = String::from_utf8_lossy(&output.stdout);
    pattern
        .captures(&stdout)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Hash and probe in one pass over the file; used by both the worker pool
/// and its synchronous fallback so the two paths cannot drift
pub async fn compute_file_metadata(path: &Path) -> Result<FileMetadata, std::io::Error> {
    let (content_hash, duration_seconds) = tokio::join!(hash_file(path), probe_duration(path));
    let content_hash = content_hash?;
    let size_bytes = fs::metadata(path).await?.len();

    Ok(FileMetadata {
        content_hash,
        duration_seconds,
        size_bytes,
    })
}

/// Probe-only variant (duration + size, no hashing)
pub async fn probe_metadata(path: &Path) -> Result<(f64, u64), std::io::Error> {
    let duration = probe_duration(path).await;
    let size = fs::metadata(path).await?.len();
    Ok((duration, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::AssetClass;
    use std::path::PathBuf;

    #[test]
    fn test_extension_allow_list() {
        assert!(is_audio_file(&PathBuf::from("/tmp/track.WAV")));
        assert!(is_audio_file(&PathBuf::from("kick.mp3")));
        assert!(!is_audio_file(&PathBuf::from("notes.txt")));
        assert!(!is_audio_file(&PathBuf::from("noextension")));
    }

    #[test]
    fn test_sfx_vocabulary() {
        assert_eq!(detect_asset_class("big_Impact_01.wav"), AssetClass::Sfx);
        assert_eq!(detect_asset_class("ui-click.mp3"), AssetClass::Sfx);
        assert_eq!(detect_asset_class("Sound Effect 3.flac"), AssetClass::Sfx);
        assert_eq!(detect_asset_class("sunset_theme.mp3"), AssetClass::Music);
    }

    #[test]
    fn test_content_type_map() {
        assert_eq!(content_type_for(&PathBuf::from("a.mp3")), "audio/mpeg");
        assert_eq!(content_type_for(&PathBuf::from("a.AIF")), "audio/aiff");
        assert_eq!(
            content_type_for(&PathBuf::from("a.bin")),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn test_hash_is_deterministic_and_name_independent() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.wav");
        let second = dir.path().join("second.wav");
        tokio::fs::write(&first, b"identical bytes").await.unwrap();
        tokio::fs::write(&second, b"identical bytes").await.unwrap();

        let a = hash_file(&first).await.unwrap();
        let b = hash_file(&first).await.unwrap();
        let c = hash_file(&second).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, hash_bytes(b"identical bytes"));
    }

    #[tokio::test]
    async fn test_hash_unreadable_file_is_an_error() {
        let missing = PathBuf::from("/nonexistent/path/track.wav");
        assert!(hash_file(&missing).await.is_err());
    }
}
