//! Reading raw bytes out of a local media reference.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::debug;

use crate::MediaError;
use crate::path::is_absolute_url;

/// Bytes behind `reference`.
///
/// `data:` URIs are decoded. Everything else is read directly first:
/// `http(s)://` references are fetched, `file://` URIs and plain paths are
/// read as given. If that fails, the reference is read from the filesystem
/// as a decoded local path before giving up.
pub async fn read_local_bytes(client: &reqwest::Client, reference: &str) -> Result<Vec<u8>, MediaError> {
    let bytes = if let Some(data) = reference.strip_prefix("data:") {
        decode_data_uri(data)?
    } else {
        match read_direct(client, reference).await {
            Ok(bytes) => bytes,
            Err(first) => {
                debug!("Direct read of {} failed ({}), trying filesystem", reference, first);
                read_fallback(reference)
                    .await
                    .map_err(|second| MediaError::Read(format!("{first}; fallback: {second}")))?
            }
        }
    };

    if bytes.is_empty() {
        return Err(MediaError::Empty);
    }
    Ok(bytes)
}

async fn read_direct(client: &reqwest::Client, reference: &str) -> Result<Vec<u8>, MediaError> {
    if is_absolute_url(reference) {
        fetch(client, reference).await
    } else {
        read_file(Path::new(reference.strip_prefix("file://").unwrap_or(reference))).await
    }
}

/// Filesystem read of the reference's local path. `file://` URIs are
/// percent-decoded, so `file:///tmp/my%20clip.mov` reads `/tmp/my clip.mov`.
async fn read_fallback(reference: &str) -> Result<Vec<u8>, MediaError> {
    let path = reqwest::Url::parse(reference)
        .ok()
        .filter(|url| url.scheme() == "file")
        .and_then(|url| url.to_file_path().ok())
        .unwrap_or_else(|| PathBuf::from(reference));
    read_file(&path).await
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, MediaError> {
    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| MediaError::Read(format!("fetch {url}: {e}")))?;
    let body = response
        .bytes()
        .await
        .map_err(|e| MediaError::Read(format!("fetch body {url}: {e}")))?;
    debug!("Fetched {} bytes from {}", body.len(), url);
    Ok(body.to_vec())
}

async fn read_file(path: &Path) -> Result<Vec<u8>, MediaError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| MediaError::Read(format!("{}: {e}", path.display())))
}

fn decode_data_uri(data: &str) -> Result<Vec<u8>, MediaError> {
    let (header, payload) = data
        .split_once(',')
        .ok_or_else(|| MediaError::Read("malformed data uri".into()))?;
    if !header.ends_with(";base64") {
        return Err(MediaError::Read("only base64 data uris are supported".into()));
    }
    B64.decode(payload.trim())
        .map_err(|e| MediaError::Read(format!("bad base64 payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_plain_and_file_uri() {
        let path = std::env::temp_dir().join(format!("duet_source_{}.png", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"png bytes").await.unwrap();
        let client = reqwest::Client::new();

        let plain = path.to_str().unwrap().to_string();
        assert_eq!(read_local_bytes(&client, &plain).await.unwrap(), b"png bytes");
        let uri = format!("file://{plain}");
        assert_eq!(read_local_bytes(&client, &uri).await.unwrap(), b"png bytes");
    }

    #[tokio::test]
    async fn test_encoded_file_uri_falls_back_to_decoded_path() {
        let dir = std::env::temp_dir().join(format!("duet_source_{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("my clip.mov");
        tokio::fs::write(&path, b"frames").await.unwrap();
        let client = reqwest::Client::new();

        // The direct read looks for a literal "my%20clip.mov" and fails
        let uri = format!("file://{}/my%20clip.mov", dir.to_str().unwrap());
        assert_eq!(read_local_bytes(&client, &uri).await.unwrap(), b"frames");
    }

    #[tokio::test]
    async fn test_failed_fetch_reports_both_attempts() {
        let client = reqwest::Client::new();
        let message = match read_local_bytes(&client, "http://127.0.0.1:1/photo.jpg").await {
            Err(MediaError::Read(message)) => message,
            other => panic!("expected a read error, got {other:?}"),
        };
        assert!(message.contains("fetch http://127.0.0.1:1/photo.jpg"));
        assert!(message.contains("fallback"));
    }

    #[tokio::test]
    async fn test_reads_data_uri() {
        let client = reqwest::Client::new();
        let uri = format!("data:image/png;base64,{}", B64.encode(b"hello"));
        assert_eq!(read_local_bytes(&client, &uri).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_empty_and_missing() {
        let client = reqwest::Client::new();
        let path = std::env::temp_dir().join(format!("duet_source_empty_{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"").await.unwrap();
        assert!(matches!(
            read_local_bytes(&client, path.to_str().unwrap()).await,
            Err(MediaError::Empty)
        ));
        assert!(matches!(
            read_local_bytes(&client, "/definitely/not/here.jpg").await,
            Err(MediaError::Read(_))
        ));
    }
}
