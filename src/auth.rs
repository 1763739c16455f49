//! 上传口令校验。

use tracing::warn;

/// 共享上传口令。等值比较的便利闸门，不是加密边界。
#[derive(Debug)]
pub struct UploadGate {
    secret: String,
}

impl UploadGate {
    pub fn new(secret: String) -> Self {
        if secret.is_empty() {
            warn!("upload secret is empty, all uploads will be rejected");
        }
        Self { secret }
    }

    /// 口令等值校验。未配置口令时拒绝所有请求（fail closed）。
    pub fn authorize(&self, supplied: Option<&str>) -> bool {
        if self.secret.is_empty() {
            return false;
        }
        supplied == Some(self.secret.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::UploadGate;

    #[test]
    fn matching_secret_is_authorized() {
        let gate = UploadGate::new("hunter2".to_string());
        assert!(gate.authorize(Some("hunter2")));
    }

    #[test]
    fn mismatched_or_missing_secret_is_rejected() {
        let gate = UploadGate::new("hunter2".to_string());
        assert!(!gate.authorize(Some("hunter3")));
        assert!(!gate.authorize(None));
    }

    #[test]
    fn empty_configured_secret_fails_closed() {
        let gate = UploadGate::new(String::new());
        assert!(!gate.authorize(Some("")));
        assert!(!gate.authorize(None));
        assert!(!gate.authorize(Some("anything")));
    }
}
