//! 错误信息结构
//!
//! 提供结构化的错误信息传递给异常通知

use std::error::Error;

/// 结构化的错误信息
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// 错误消息
    pub message: String,

    /// 错误类型名称（`anyhow::Error` 抹掉了具体类型时为 `None`）
    pub error_type: Option<String>,

    /// 错误源链（cause chain）
    pub source_chain: Vec<String>,
}

impl ErrorInfo {
    /// 从标准错误创建 ErrorInfo
    pub fn from_error<E: Error>(error: &E) -> Self {
        let mut source_chain = Vec::new();
        let mut current_source = error.source();
        while let Some(source) = current_source {
            source_chain.push(source.to_string());
            current_source = source.source();
        }

        Self {
            message: error.to_string(),
            error_type: Some(std::any::type_name::<E>().to_string()),
            source_chain,
        }
    }

    /// 从调用链上传播的 `anyhow::Error` 创建
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        Self {
            message: error.to_string(),
            error_type: None,
            source_chain: error.chain().skip(1).map(ToString::to_string).collect(),
        }
    }

    /// 获取完整的错误描述（包含源链）
    pub fn full_description(&self) -> String {
        if self.source_chain.is_empty() {
            self.message.clone()
        } else {
            format!(
                "{}\nCaused by:\n  {}",
                self.message,
                self.source_chain.join("\n  ")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_anyhow_cause_chain() {
        let error = Err::<(), _>(anyhow::anyhow!("connection refused"))
            .context("loading user")
            .unwrap_err();
        let info = ErrorInfo::from_anyhow(&error);
        assert_eq!(info.message, "loading user");
        assert_eq!(info.source_chain, vec!["connection refused"]);
        assert_eq!(info.full_description(), "loading user\nCaused by:\n  connection refused");
        assert!(info.error_type.is_none());
    }

    #[test]
    fn test_std_error_records_type() {
        let error = "x".parse::<i32>().unwrap_err();
        let info = ErrorInfo::from_error(&error);
        assert!(info.error_type.as_ref().unwrap().ends_with("ParseIntError"));
        assert_eq!(info.full_description(), info.message);
    }
}
