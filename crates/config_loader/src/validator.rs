//! 配置校验模块
//!
//! 校验规则：
//! - 字段范围 (derive 规则, 见 contracts::IngestConfig)
//! - file transport 必须提供 log_path
//! - session_id 若提供则非空

use ::validator::{Validate, ValidationErrors};

use contracts::{ContractError, IngestConfig, TransportKind};

/// 校验 IngestConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &IngestConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_transport(config)?;
    validate_session(config)?;
    Ok(())
}

/// 字段级规则
fn validate_fields(config: &IngestConfig) -> Result<(), ContractError> {
    config.validate().map_err(|errors| {
        let (field, message) = first_field_error(&errors);
        ContractError::config_validation(field, message)
    })
}

/// 取出第一个字段错误的路径与描述
fn first_field_error(errors: &ValidationErrors) -> (String, String) {
    for (section, kind) in errors.errors() {
        match kind {
            ::validator::ValidationErrorsKind::Struct(inner) => {
                let (field, message) = first_field_error(inner);
                return (format!("{section}.{field}"), message);
            }
            ::validator::ValidationErrorsKind::Field(list) => {
                let message = list
                    .first()
                    .map(|e| format!("failed '{}' rule", e.code))
                    .unwrap_or_else(|| "invalid value".to_string());
                return (section.to_string(), message);
            }
            ::validator::ValidationErrorsKind::List(_) => {
                return (section.to_string(), "invalid list entry".to_string());
            }
        }
    }
    ("<root>".to_string(), errors.to_string())
}

/// 校验 transport 相关字段
fn validate_transport(config: &IngestConfig) -> Result<(), ContractError> {
    if config.broker.transport == TransportKind::File && config.broker.log_path.is_none() {
        return Err(ContractError::config_validation(
            "broker.log_path",
            "file transport requires log_path",
        ));
    }
    Ok(())
}

/// 校验 session_id
fn validate_session(config: &IngestConfig) -> Result<(), ContractError> {
    if let Some(session) = &config.source.session_id {
        if session.trim().is_empty() {
            return Err(ContractError::config_validation(
                "source.session_id",
                "session_id cannot be blank (omit it to auto-generate)",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&IngestConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = IngestConfig::default();
        config.pipeline.worker_count = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("pipeline.worker_count"), "{err}");
    }

    #[test]
    fn test_empty_topic_rejected() {
        let mut config = IngestConfig::default();
        config.broker.topic = String::new();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("broker.topic"), "{err}");
    }

    #[test]
    fn test_file_transport_requires_path() {
        let mut config = IngestConfig::default();
        config.broker.transport = TransportKind::File;
        assert!(validate(&config).is_err());

        config.broker.log_path = Some(PathBuf::from("/tmp/detections.log"));
        assert!(validate(&config).is_ok());
    }

    /// Retry backoff finishes before the flush starts, so the two settings
    /// are independent
    #[test]
    fn test_long_retry_backoff_with_short_flush_is_valid() {
        let mut config = IngestConfig::default();
        config.pipeline.max_retries = 10;
        config.pipeline.base_backoff_ms = 100;
        assert!(validate(&config).is_ok());

        config.pipeline.base_backoff_ms = 1000;
        config.pipeline.flush_timeout_secs = 1;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_blank_session_rejected() {
        let mut config = IngestConfig::default();
        config.source.session_id = Some("  ".to_string());
        assert!(validate(&config).is_err());
    }
}
