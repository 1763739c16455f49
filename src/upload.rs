//! 多部分表单上传处理器。

use axum::extract::{Extension, Multipart};
use axum::response::Json as JsonResponse;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::auth::UploadGate;
use crate::error::ApiError;
use crate::http::{file_download_url, file_view_url};
use crate::spool::SpoolFile;
use crate::storage::Storage;

#[derive(Debug)]
pub struct UploadConfig {
    pub max_size: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadResponse {
    pub(crate) message: String,
    pub(crate) view_url: String,
    pub(crate) download_url: String,
}

struct ReceivedFile {
    original_name: String,
    spool: SpoolFile,
    size: u64,
}

#[derive(Default)]
struct ReceivedForm {
    secret: Option<String>,
    category: Option<String>,
    subcategory: Option<String>,
    file: Option<ReceivedFile>,
}

/// 接收上传表单：文件内容先进暂存文件,口令校验通过后才改名进存储树,
/// 被拒绝的上传不会在分类目录下留下任何文件。
pub async fn upload_file(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(gate): Extension<Arc<UploadGate>>,
    Extension(config): Extension<Arc<UploadConfig>>,
    multipart: Multipart,
) -> Result<JsonResponse<UploadResponse>, ApiError> {
    let form = receive_form(&storage, &config, multipart).await?;
    let Some(file) = form.file else {
        return Err(ApiError::BadRequest("file field is required".into()));
    };

    if !gate.authorize(form.secret.as_deref()) {
        file.spool.discard().await;
        warn!("upload rejected: wrong secret");
        return Err(ApiError::Unauthorized("wrong password".into()));
    }

    let resolved = storage.resolve_upload(
        form.category.as_deref(),
        form.subcategory.as_deref(),
        &file.original_name,
        Utc::now(),
    );
    let target = match resolved {
        Ok(target) => target,
        Err(err) => {
            file.spool.discard().await;
            return Err(err.into());
        }
    };

    if let Err(err) = storage.materialize(&target).await {
        file.spool.discard().await;
        return Err(err.into());
    }
    file.spool.commit(&storage.file_path(&target)).await?;

    info!(
        category = target.category,
        subcategory = target.subcategory,
        stored_name = target.stored_name,
        size = file.size,
        "file uploaded"
    );

    Ok(JsonResponse(UploadResponse {
        message: "File uploaded successfully".into(),
        view_url: file_view_url(&target.category, &target.subcategory, &target.stored_name),
        download_url: file_download_url(&target.category, &target.subcategory, &target.stored_name),
    }))
}

/// 逐字段读取表单。文件字段边读边写暂存文件并累计大小上限；
/// 解析中途失败时清理已写入的暂存文件。
async fn receive_form(
    storage: &Storage,
    config: &UploadConfig,
    mut multipart: Multipart,
) -> Result<ReceivedForm, ApiError> {
    let mut form = ReceivedForm::default();

    let result: Result<(), ApiError> = async {
        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|err| ApiError::BadRequest(format!("malformed multipart body: {err}")))?
        {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "password" => form.secret = Some(read_text_field(field).await?),
                "className" => form.category = Some(read_text_field(field).await?),
                "subjectName" => form.subcategory = Some(read_text_field(field).await?),
                // 只收第一个文件字段,多余的文件字段被读完即丢弃
                "file" if form.file.is_none() => {
                    let original_name = field.file_name().unwrap_or("").to_string();
                    let mut spool = SpoolFile::create(&storage.spool_root()).await?;
                    let mut size: u64 = 0;

                    let stream_result: Result<(), ApiError> = async {
                        while let Some(chunk) = field.chunk().await.map_err(|err| {
                            ApiError::BadRequest(format!("malformed multipart body: {err}"))
                        })? {
                            size += chunk.len() as u64;
                            if config.max_size > 0 && size > config.max_size {
                                return Err(ApiError::PayloadTooLarge(
                                    "file exceeds upload size limit".into(),
                                ));
                            }
                            spool
                                .file_mut()
                                .write_all(&chunk)
                                .await
                                .map_err(|err| ApiError::Internal(err.to_string()))?;
                        }
                        Ok(())
                    }
                    .await;

                    if let Err(err) = stream_result {
                        spool.discard().await;
                        return Err(err);
                    }
                    form.file = Some(ReceivedFile {
                        original_name,
                        spool,
                        size,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
    .await;

    if let Err(err) = result {
        if let Some(file) = form.file.take() {
            file.spool.discard().await;
        }
        return Err(err);
    }
    Ok(form)
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|err| ApiError::BadRequest(format!("malformed multipart body: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::{Extension, FromRequest, Multipart};
    use axum::http::Request;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    use crate::config::{DEFAULT_CATEGORY, DEFAULT_SUBCATEGORY, DEFAULT_UPLOAD_MAX_SIZE};

    const BOUNDARY: &str = "classdrop-test-boundary";

    fn make_storage() -> (tempfile::TempDir, Arc<Storage>) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("uploads");
        std::fs::create_dir_all(&root).expect("create root");
        let storage = Storage::new(
            root,
            DEFAULT_CATEGORY.to_string(),
            DEFAULT_SUBCATEGORY.to_string(),
        );
        (temp, Arc::new(storage))
    }

    fn text_part(name: &str, value: &str) -> String {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        )
    }

    fn file_part(filename: &str, contents: &str) -> String {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n{contents}\r\n"
        )
    }

    async fn make_multipart(parts: &[String]) -> Multipart {
        let body = format!("{}--{BOUNDARY}--\r\n", parts.concat());
        let request = Request::builder()
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request");
        Multipart::from_request(request, &()).await.expect("multipart")
    }

    fn count_regular_files(dir: &Path) -> usize {
        let mut count = 0;
        for entry in std::fs::read_dir(dir).expect("read dir") {
            let entry = entry.expect("entry");
            let file_type = entry.file_type().expect("file type");
            if file_type.is_dir() {
                count += count_regular_files(&entry.path());
            } else {
                count += 1;
            }
        }
        count
    }

    fn make_config() -> Arc<UploadConfig> {
        Arc::new(UploadConfig {
            max_size: DEFAULT_UPLOAD_MAX_SIZE,
        })
    }

    #[tokio::test]
    async fn upload_persists_file_and_returns_urls() {
        let (_temp, storage) = make_storage();
        let gate = Arc::new(UploadGate::new("hunter2".to_string()));
        let multipart = make_multipart(&[
            text_part("password", "hunter2"),
            text_part("className", "Class9"),
            text_part("subjectName", "Science"),
            file_part("report.pdf", "report bytes"),
        ])
        .await;

        let JsonResponse(response) = upload_file(
            Extension(storage.clone()),
            Extension(gate),
            Extension(make_config()),
            multipart,
        )
        .await
        .unwrap_or_else(|_| panic!("upload failed"));

        assert!(response.view_url.starts_with("/file/Class9/Science/"));
        assert!(response.view_url.ends_with("_report.pdf"));
        assert_eq!(
            response.download_url,
            format!("{}?download=true", response.view_url)
        );

        let stored_name = response.view_url.rsplit('/').next().expect("name");
        let path = storage
            .root_path()
            .join("Class9")
            .join("Science")
            .join(stored_name);
        let contents = std::fs::read(path).expect("read stored file");
        assert_eq!(contents, b"report bytes");
    }

    #[tokio::test]
    async fn wrong_secret_leaves_nothing_behind() {
        let (_temp, storage) = make_storage();
        let gate = Arc::new(UploadGate::new("hunter2".to_string()));
        let multipart = make_multipart(&[
            text_part("password", "wrong"),
            file_part("report.pdf", "report bytes"),
        ])
        .await;

        let result = upload_file(
            Extension(storage.clone()),
            Extension(gate),
            Extension(make_config()),
            multipart,
        )
        .await;

        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
        assert_eq!(count_regular_files(storage.root_path()), 0);
    }

    #[tokio::test]
    async fn missing_file_field_is_rejected() {
        let (_temp, storage) = make_storage();
        let gate = Arc::new(UploadGate::new("hunter2".to_string()));
        let multipart = make_multipart(&[text_part("password", "hunter2")]).await;

        let result = upload_file(
            Extension(storage),
            Extension(gate),
            Extension(make_config()),
            multipart,
        )
        .await;

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn traversal_category_is_rejected_without_residue() {
        let (_temp, storage) = make_storage();
        let gate = Arc::new(UploadGate::new("hunter2".to_string()));
        let multipart = make_multipart(&[
            text_part("password", "hunter2"),
            text_part("className", "../../etc"),
            file_part("report.pdf", "report bytes"),
        ])
        .await;

        let result = upload_file(
            Extension(storage.clone()),
            Extension(gate),
            Extension(make_config()),
            multipart,
        )
        .await;

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert_eq!(count_regular_files(storage.root_path()), 0);

        // 失败的上传不应在根目录下留下任何分类目录
        let entries: Vec<String> = std::fs::read_dir(storage.root_path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec![".spool".to_string()]);
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_and_spool_cleaned() {
        let (_temp, storage) = make_storage();
        let gate = Arc::new(UploadGate::new("hunter2".to_string()));
        let config = Arc::new(UploadConfig { max_size: 4 });
        let multipart = make_multipart(&[
            text_part("password", "hunter2"),
            file_part("report.pdf", "more than four bytes"),
        ])
        .await;

        let result = upload_file(
            Extension(storage.clone()),
            Extension(gate),
            Extension(config),
            multipart,
        )
        .await;

        assert!(matches!(result, Err(ApiError::PayloadTooLarge(_))));
        assert_eq!(count_regular_files(storage.root_path()), 0);
    }

    #[tokio::test]
    async fn default_category_applies_when_fields_missing() {
        let (_temp, storage) = make_storage();
        let gate = Arc::new(UploadGate::new("hunter2".to_string()));
        let multipart = make_multipart(&[
            text_part("password", "hunter2"),
            file_part("notes.txt", "notes"),
        ])
        .await;

        let JsonResponse(response) = upload_file(
            Extension(storage),
            Extension(gate),
            Extension(make_config()),
            multipart,
        )
        .await
        .unwrap_or_else(|_| panic!("upload failed"));

        assert!(response.view_url.starts_with("/file/General/Misc/"));
    }
}
