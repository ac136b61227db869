use domain::DeviceId;
use dsr_notify::NotifyError;
use dsr_storage::StorageError;

/// 注册表错误。
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("device not found: {0}")]
    NotFound(DeviceId),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("invalid device id: {0}")]
    InvalidDeviceId(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("registry is shut down")]
    ShutDown,
    #[error("no tokio runtime available")]
    NoRuntime,
}

impl From<StorageError> for RegistryError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<NotifyError> for RegistryError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::Closed => Self::ShutDown,
            NotifyError::NoRuntime => Self::NoRuntime,
        }
    }
}
