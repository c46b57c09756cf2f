//! Object paths: `{conversationId}/{uploaderId}/{kind}s/{timestamp}-{random}.{ext}`.

use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;

use duet_types::identity::split_conversation_id;
use duet_types::models::MediaKind;

use crate::MediaError;

/// Route prefix under which signed objects are served.
pub const MEDIA_ROUTE_PREFIX: &str = "media/";

/// Extension used when the reference carries none.
const DEFAULT_EXTENSION: &str = "jpg";

/// The parts of a validated object path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPath<'a> {
    pub conversation_id: &'a str,
    pub uploader_id: &'a str,
    pub kind: MediaKind,
    pub file_name: &'a str,
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
}

/// Validate a bare object path and split it into its parts.
pub fn parse_object_path(path: &str) -> Result<ObjectPath<'_>, MediaError> {
    let invalid = || MediaError::InvalidPath(path.to_string());

    let segments: Vec<&str> = path.split('/').collect();
    let [conversation_id, uploader_id, kind_dir, file_name] = segments[..] else {
        return Err(invalid());
    };
    if !segments.iter().all(|s| is_safe_segment(s)) {
        return Err(invalid());
    }

    let (a, b) = split_conversation_id(conversation_id).ok_or_else(invalid)?;
    if uploader_id != a && uploader_id != b {
        return Err(invalid());
    }

    let kind = kind_dir
        .strip_suffix('s')
        .and_then(MediaKind::parse)
        .ok_or_else(invalid)?;

    Ok(ObjectPath {
        conversation_id,
        uploader_id,
        kind,
        file_name,
    })
}

/// Build a fresh object path for an upload.
pub fn object_path(
    conversation_id: &str,
    uploader_id: &str,
    kind: MediaKind,
    ext: &str,
) -> Result<String, MediaError> {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    let file_name = format!("{}-{}.{}", Utc::now().timestamp_millis(), suffix, ext);
    let path = format!("{}/{}/{}s/{}", conversation_id, uploader_id, kind.as_str(), file_name);

    parse_object_path(&path)?;
    Ok(path)
}

pub fn is_absolute_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Strip scheme, host, the media route prefix, query and fragment from a
/// previously resolved URL, leaving the bare object path. The media route
/// may sit below a path prefix of the public URL. Bare paths come back
/// unchanged, so this is safe to apply repeatedly.
pub fn normalize_object_path(stored: &str) -> String {
    let without_origin = match stored.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("", |i| &rest[i..]),
        None => stored,
    };
    let without_query = without_origin
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let trimmed = without_query.trim_start_matches('/');
    if parse_object_path(trimmed).is_ok() {
        return trimmed.to_string();
    }

    // First `media/` segment whose remainder is a valid object path
    let route = MEDIA_ROUTE_PREFIX.trim_end_matches('/');
    let segments: Vec<&str> = trimmed.split('/').collect();
    segments
        .iter()
        .enumerate()
        .filter(|(_, s)| **s == route)
        .map(|(i, _)| segments[i + 1..].join("/"))
        .find(|candidate| parse_object_path(candidate).is_ok())
        .unwrap_or_else(|| {
            trimmed
                .strip_prefix(MEDIA_ROUTE_PREFIX)
                .unwrap_or(trimmed)
                .to_string()
        })
}

/// Extension of a local reference, lowercased, ignoring any query string.
pub fn extension_of(reference: &str) -> String {
    if let Some(data) = reference.strip_prefix("data:") {
        let mime = data.split([';', ',']).next().unwrap_or_default();
        return extension_for_mime(mime).to_string();
    }

    let without_query = reference.split('?').next().unwrap_or_default();
    let file_name = without_query.rsplit('/').next().unwrap_or_default();
    match file_name.rfind('.') {
        Some(dot) if dot + 1 < file_name.len() => file_name[dot + 1..].to_ascii_lowercase(),
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

/// File extension for a MIME type, `bin` when unknown.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "image/jpeg" | "image/jpg" => "jpg",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "application/pdf" => "pdf",
        "text/plain" => "txt",
        _ => "bin",
    }
}

/// Content type inferred from extension and media kind.
pub fn content_type_for(ext: &str, kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => match ext {
            "png" => "image/png",
            "webp" => "image/webp",
            "heic" => "image/heic",
            _ => "image/jpeg",
        },
        MediaKind::Video => match ext {
            "mp4" => "video/mp4",
            "mov" => "video/quicktime",
            _ => "application/octet-stream",
        },
        MediaKind::File => match ext {
            "pdf" => "application/pdf",
            "txt" => "text/plain",
            _ => "application/octet-stream",
        },
    }
}
