//! API 版本信息处理器。

use axum::response::Json as JsonResponse;
use serde::Serialize;

use crate::error::ApiError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    version: &'static str,
    commit_hash: &'static str,
    build_time: &'static str,
}

/// 返回当前版本信息。
pub async fn get_version_info() -> Result<JsonResponse<VersionInfo>, ApiError> {
    Ok(JsonResponse(VersionInfo {
        version: crate::build::PKG_VERSION,
        commit_hash: crate::build::SHORT_COMMIT,
        build_time: crate::build::BUILD_TIME,
    }))
}
