use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tokio::fs;

use crate::config::SPOOL_DIR_NAME;

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
    default_category: String,
    default_subcategory: String,
}

/// 一次上传解析出的相对存储位置（仅路径段，不含根目录）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadTarget {
    pub category: String,
    pub subcategory: String,
    pub stored_name: String,
}

impl Storage {
    pub fn new(root: PathBuf, default_category: String, default_subcategory: String) -> Self {
        Self {
            root,
            default_category,
            default_subcategory,
        }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await?;
        fs::create_dir_all(self.spool_root()).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn spool_root(&self) -> PathBuf {
        self.root.join(SPOOL_DIR_NAME)
    }

    /// 将三个不可信字符串解析为相对存储位置。
    ///
    /// category/subcategory 为空时回退到配置默认值；文件名被剥掉目录部分后
    /// 加上毫秒时间戳前缀。同一毫秒内同名上传会相互覆盖，这是已接受的
    /// 碰撞策略，不在此处加锁。
    pub fn resolve_upload(
        &self,
        category: Option<&str>,
        subcategory: Option<&str>,
        original_filename: &str,
        at: DateTime<Utc>,
    ) -> Result<UploadTarget, StorageError> {
        let category = sanitize_segment(category, &self.default_category)?;
        let subcategory = sanitize_segment(subcategory, &self.default_subcategory)?;

        let base = client_basename(original_filename);
        if base.is_empty() {
            return Err(StorageError::InvalidSegment);
        }
        validate_segment(base)?;
        let stored_name = format!("{}_{}", at.timestamp_millis(), base);

        Ok(UploadTarget {
            category,
            subcategory,
            stored_name,
        })
    }

    /// 重新校验路由参数并拼出根目录下的绝对路径。
    pub fn resolve_stored(
        &self,
        category: &str,
        subcategory: &str,
        stored_name: &str,
    ) -> Result<PathBuf, StorageError> {
        for segment in [category, subcategory, stored_name] {
            let trimmed = segment.trim();
            if trimmed.is_empty() {
                return Err(StorageError::InvalidSegment);
            }
            validate_segment(trimmed)?;
        }
        Ok(self
            .root
            .join(category.trim())
            .join(subcategory.trim())
            .join(stored_name.trim()))
    }

    pub fn file_path(&self, target: &UploadTarget) -> PathBuf {
        self.root
            .join(&target.category)
            .join(&target.subcategory)
            .join(&target.stored_name)
    }

    /// 幂等创建 category/subcategory 目录，并发重复创建不视为错误。
    pub async fn materialize(&self, target: &UploadTarget) -> Result<(), StorageError> {
        let dir = self.root.join(&target.category).join(&target.subcategory);
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    /// 逐级检查路径组件，拒绝任何符号链接。
    pub async fn ensure_no_symlinks(&self, target: &Path) -> Result<(), StorageError> {
        let relative = target
            .strip_prefix(&self.root)
            .map_err(|_| StorageError::InvalidSegment)?;
        let mut current = PathBuf::from(&self.root);

        for component in relative.components() {
            current.push(component.as_os_str());
            match fs::symlink_metadata(&current).await {
                Ok(metadata) if metadata.file_type().is_symlink() => {
                    return Err(StorageError::InvalidSegment);
                }
                Ok(_) => {}
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        Ok(())
    }

    /// 两级遍历上传根目录，收集所有已存储文件。
    pub async fn list_stored(&self) -> Result<Vec<StoredFile>, StorageError> {
        let mut entries = Vec::new();
        let mut categories = fs::read_dir(&self.root).await?;

        while let Some(category_entry) = categories.next_entry().await? {
            let category = category_entry.file_name().to_string_lossy().to_string();
            if category.starts_with('.') || !category_entry.metadata().await?.is_dir() {
                continue;
            }
            let mut subcategories = fs::read_dir(category_entry.path()).await?;
            while let Some(subcategory_entry) = subcategories.next_entry().await? {
                let subcategory = subcategory_entry.file_name().to_string_lossy().to_string();
                if subcategory.starts_with('.') || !subcategory_entry.metadata().await?.is_dir() {
                    continue;
                }
                let mut files = fs::read_dir(subcategory_entry.path()).await?;
                while let Some(file_entry) = files.next_entry().await? {
                    let name = file_entry.file_name().to_string_lossy().to_string();
                    let metadata = file_entry.metadata().await?;
                    if name.starts_with('.') || !metadata.is_file() {
                        continue;
                    }
                    let modified = metadata
                        .modified()
                        .ok()
                        .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
                        .map(format_timestamp);
                    entries.push(StoredFile {
                        name,
                        category: category.clone(),
                        subcategory: subcategory.clone(),
                        size: metadata.len(),
                        modified,
                    });
                }
            }
        }

        entries.sort_by(|a, b| {
            (&a.category, &a.subcategory, &a.name).cmp(&(&b.category, &b.subcategory, &b.name))
        });
        Ok(entries)
    }
}

/// 清洗单个目录段：trim 后为空则回退默认值，否则必须通过段校验。
fn sanitize_segment(raw: Option<&str>, fallback: &str) -> Result<String, StorageError> {
    let value = raw.map(str::trim).unwrap_or("");
    if value.is_empty() {
        return Ok(fallback.to_string());
    }
    validate_segment(value)?;
    Ok(value.to_string())
}

// 拒绝而非剥离：静默剥离会让 "a/b" 与 "ab" 落进同一目录。
// 前导点规则同时覆盖 "." / ".." 并保留隐藏名（如 .spool）给内部使用。
fn validate_segment(value: &str) -> Result<(), StorageError> {
    if value.contains(['/', '\\']) || value.contains('\0') || value.starts_with('.') {
        return Err(StorageError::InvalidSegment);
    }
    Ok(())
}

/// 剥掉客户端文件名中的目录部分，客户端文件名永远不可信为路径。
fn client_basename(original: &str) -> &str {
    original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original)
        .trim()
}

fn format_timestamp(duration: Duration) -> String {
    let timestamp = UNIX_EPOCH + duration;
    let datetime: DateTime<Utc> = timestamp.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug)]
pub enum StorageError {
    InvalidSegment,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

#[derive(Serialize)]
pub struct StoredFile {
    pub name: String,
    pub category: String,
    pub subcategory: String,
    pub size: u64,
    pub modified: Option<String>,
}
