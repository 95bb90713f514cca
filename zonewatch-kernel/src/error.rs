/// Errors at the fallible edges of the kernel: configuration and transport.
/// The monitoring engine itself does not fail.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Payload rejected: {0}")]
    Payload(String),
    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),
}

pub type Result<T> = std::result::Result<T, KernelError>;
