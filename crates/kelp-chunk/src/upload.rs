//! Parsing of data-node upload responses.

use base64::Engine;
use kelp_proto::{FileChunk, FileId};
use serde::{Deserialize, Serialize};

use crate::error::{ChunkError, Result};

const COOKIE_SIZE: usize = 4;
const NEEDLE_ID_SIZE: usize = 8;

/// Result payload returned by a data node for a chunk upload.
///
/// The body is JSON; a server-echoed `ETag` header supersedes the body field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadResult {
    /// Base64-encoded cipher key, when the node encrypted the chunk at rest.
    pub cipher_key: String,
    pub content_md5: String,
    pub error: String,
    pub e_tag: String,
    pub gzip: u32,
    pub mime: String,
    pub name: String,
    pub size: u32,
}

impl UploadResult {
    /// Builds the wire chunk descriptor for this upload.
    pub fn file_chunk(&self, file_id: &str, offset: i64, ts_ns: i64) -> Result<FileChunk> {
        let fid = parse_file_id(file_id)?;
        let cipher_key = if self.cipher_key.is_empty() {
            Vec::new()
        } else {
            base64::engine::general_purpose::STANDARD
                .decode(&self.cipher_key)
                .map_err(|e| ChunkError::InvalidState(format!("cipher key: {e}")))?
        };
        Ok(FileChunk {
            file_id: file_id.to_string(),
            offset,
            size: u64::from(self.size),
            modified_ts_ns: ts_ns,
            e_tag: self.content_md5.clone(),
            fid: Some(fid),
            cipher_key,
            is_compressed: self.gzip > 0,
        })
    }
}

/// Parses a `volume,needle-cookie` file id into its structured form.
pub(crate) fn parse_file_id(file_id: &str) -> Result<FileId> {
    let (volume, needle_cookie) = split_volume_id(file_id)?;
    let volume_id = volume
        .parse::<u32>()
        .map_err(|_| ChunkError::InvalidFileId(file_id.to_string()))?;
    let (file_key, cookie) = parse_needle_id_cookie(needle_cookie)
        .map_err(|_| ChunkError::InvalidFileId(file_id.to_string()))?;
    Ok(FileId {
        volume_id,
        file_key,
        cookie,
    })
}

fn split_volume_id(file_id: &str) -> Result<(&str, &str)> {
    match file_id.split_once(',') {
        Some((volume, rest)) if !volume.is_empty() => Ok((volume, rest)),
        _ => Err(ChunkError::InvalidFileId(file_id.to_string())),
    }
}

fn parse_needle_id_cookie(hash: &str) -> std::result::Result<(u64, u32), ()> {
    if hash.len() <= COOKIE_SIZE * 2 {
        return Err(());
    }
    if hash.len() > (NEEDLE_ID_SIZE + COOKIE_SIZE) * 2 {
        return Err(());
    }
    let split = hash.len() - COOKIE_SIZE * 2;
    let needle_id = u64::from_str_radix(&hash[..split], 16).map_err(|_| ())?;
    let cookie = u32::from_str_radix(&hash[split..], 16).map_err(|_| ())?;
    Ok((needle_id, cookie))
}

/// Decodes a 2xx upload response into an [`UploadResult`].
///
/// A `204 No Content` carries only headers. Otherwise the JSON body is
/// decoded and the `ETag` / `Content-MD5` headers override their body
/// counterparts, with the etag's outer double quotes stripped.
pub(crate) async fn decode_upload_response(resp: reqwest::Response) -> Result<UploadResult> {
    let e_tag = resp
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(strip_etag_quotes)
        .map(str::to_string);
    let content_md5 = resp
        .headers()
        .get("Content-MD5")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if resp.status() == reqwest::StatusCode::NO_CONTENT {
        return Ok(UploadResult {
            e_tag: e_tag.unwrap_or_default(),
            ..Default::default()
        });
    }

    let mut result: UploadResult = resp.json().await?;
    if let Some(e_tag) = e_tag {
        result.e_tag = e_tag;
    }
    if let Some(content_md5) = content_md5 {
        result.content_md5 = content_md5;
    }
    Ok(result)
}

fn strip_etag_quotes(e_tag: &str) -> &str {
    e_tag
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(e_tag)
}
