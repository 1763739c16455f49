//! 上传暂存文件：先写入隐藏临时文件，校验通过后再改名进存储树。

use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use uuid::Uuid;

use crate::error::ApiError;

/// 一次上传请求的暂存文件。提交前对存储树不可见，提交即同文件系统改名。
pub struct SpoolFile {
    path: PathBuf,
    file: File,
}

impl SpoolFile {
    /// 在暂存目录下创建随机命名的临时文件。
    pub async fn create(spool_root: &Path) -> Result<Self, ApiError> {
        fs::create_dir_all(spool_root)
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        let path = spool_root.join(Uuid::new_v4().to_string());
        let file = File::create(&path)
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        Ok(Self { path, file })
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// 放弃并删除暂存文件。
    pub async fn discard(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.path).await;
    }

    /// 落盘并改名到目标路径。目标名含毫秒时间戳，不做覆盖回退。
    pub async fn commit(self, target: &Path) -> Result<(), ApiError> {
        self.file
            .sync_all()
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        drop(self.file);

        if let Err(err) = fs::rename(&self.path, target).await {
            let _ = fs::remove_file(&self.path).await;
            return Err(ApiError::Internal(err.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SpoolFile;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn commit_moves_bytes_to_target() {
        let temp = tempdir().expect("tempdir");
        let spool_root = temp.path().join(".spool");

        let mut spool = SpoolFile::create(&spool_root).await.expect("create");
        spool
            .file_mut()
            .write_all(b"hello")
            .await
            .expect("write");

        let target = temp.path().join("hello.txt");
        spool.commit(&target).await.expect("commit");

        let contents = tokio::fs::read(&target).await.expect("read");
        assert_eq!(contents, b"hello");

        let mut leftovers = tokio::fs::read_dir(&spool_root).await.expect("read dir");
        assert!(leftovers.next_entry().await.expect("entry").is_none());
    }

    #[tokio::test]
    async fn discard_removes_spool_file() {
        let temp = tempdir().expect("tempdir");
        let spool_root = temp.path().join(".spool");

        let mut spool = SpoolFile::create(&spool_root).await.expect("create");
        spool.file_mut().write_all(b"junk").await.expect("write");
        spool.discard().await;

        let mut leftovers = tokio::fs::read_dir(&spool_root).await.expect("read dir");
        assert!(leftovers.next_entry().await.expect("entry").is_none());
    }
}
