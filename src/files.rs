//! 文件查看、下载与列表处理器。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path, Query};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use httpdate::fmt_http_date;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::error::ApiError;
use crate::etag::{etag_from_metadata, not_modified};
use crate::http::{encode_segment, file_download_url, file_view_url};
use crate::storage::Storage;

#[derive(Deserialize)]
pub(crate) struct ViewQuery {
    pub download: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListedFile {
    name: String,
    category: String,
    subcategory: String,
    size: u64,
    modified: Option<String>,
    view_url: String,
    download_url: String,
}

/// 按 (category, subcategory, stored_name) 取回文件,
/// `?download=true` 时以附件方式下发,否则内联展示。
pub async fn view_file(
    Path((category, subcategory, stored_name)): Path<(String, String, String)>,
    Query(query): Query<ViewQuery>,
    request_headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    let target = storage.resolve_stored(&category, &subcategory, &stored_name)?;
    storage.ensure_no_symlinks(&target).await?;

    let metadata = fs::metadata(&target)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    if !metadata.is_file() {
        return Err(ApiError::NotFound("file not found".into()));
    }

    let etag = etag_from_metadata(&metadata);
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::ETAG,
        HeaderValue::from_str(&etag).map_err(|_| ApiError::Internal("响应头构建失败".into()))?,
    );
    if not_modified(&request_headers, &etag) {
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    let mime = mime_guess::from_path(&stored_name).first_or_octet_stream();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|_| ApiError::Internal("无效的 MIME 类型".into()))?,
    );
    response_headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&metadata.len().to_string())
            .map_err(|_| ApiError::Internal("响应头构建失败".into()))?,
    );
    if let Ok(modified) = metadata.modified() {
        response_headers.insert(
            header::LAST_MODIFIED,
            HeaderValue::from_str(&fmt_http_date(modified))
                .map_err(|_| ApiError::Internal("响应头构建失败".into()))?,
        );
    }

    let wants_download = query.download.unwrap_or(false);
    if wants_download {
        response_headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_str(&attachment_disposition(&stored_name))
                .map_err(|_| ApiError::Internal("响应头构建失败".into()))?,
        );
    }

    let file = File::open(&target)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    info!(
        category,
        subcategory,
        stored_name,
        size = metadata.len(),
        download = wants_download,
        "serve file"
    );
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// 列出所有已存储文件及其查看/下载 URL。
pub async fn list_files(
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<JsonResponse<Vec<ListedFile>>, ApiError> {
    let entries = storage.list_stored().await?;
    info!(count = entries.len(), "list files");

    let listed = entries
        .into_iter()
        .map(|entry| {
            let view_url = file_view_url(&entry.category, &entry.subcategory, &entry.name);
            let download_url = file_download_url(&entry.category, &entry.subcategory, &entry.name);
            ListedFile {
                name: entry.name,
                category: entry.category,
                subcategory: entry.subcategory,
                size: entry.size,
                modified: entry.modified,
                view_url,
                download_url,
            }
        })
        .collect();
    Ok(JsonResponse(listed))
}

// ASCII 可打印且无引号反斜杠时用普通 filename,否则退到 RFC 5987 filename*。
fn attachment_disposition(stored_name: &str) -> String {
    let plain = stored_name
        .chars()
        .all(|ch| ch.is_ascii_graphic() && ch != '"' && ch != '\\' || ch == ' ');
    if plain {
        format!("attachment; filename=\"{stored_name}\"")
    } else {
        format!(
            "attachment; filename*=UTF-8''{}",
            encode_segment(stored_name)
        )
    }
}
