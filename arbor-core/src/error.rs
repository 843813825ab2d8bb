//! 统一的错误处理类型
//!
//! 容器配置期间的错误使用 [`ContainerError`]，它们都是静态装配缺陷，
//! 不会被自动重试。应用引导阶段（日志、配置解析）的错误使用 [`ApplicationError`]。
//!
//! # 示例
//!
//! ```rust,ignore
//! use arbor_core::{ContainerError, ContainerResult};
//!
//! fn find(&self, name: &str) -> ContainerResult<Instance> {
//!     self.beans
//!         .get(name)
//!         .cloned()
//!         .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))
//! }
//! ```

/// 容器错误
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// 重复的 Bean 名称
    #[error("conflicting bean definition: '{0}' is already registered")]
    ConflictingDescriptor(String),

    /// 没有任何候选 Bean 满足依赖
    #[error("unsatisfied dependency of '{requester}': no bean of type '{dependency}'{}", qualifier_suffix(.qualifier))]
    UnsatisfiedDependency {
        requester: String,
        dependency: String,
        qualifier: Option<String>,
    },

    /// 多个候选 Bean 且没有 primary / order 可用于裁决
    #[error("ambiguous dependency of '{requester}' on '{dependency}': candidates {candidates:?}")]
    AmbiguousDependency {
        requester: String,
        dependency: String,
        candidates: Vec<String>,
    },

    /// 只能通过构造注入满足的循环依赖
    #[error("unresolvable circular dependency: {0}")]
    UnresolvableCircularDependency(String),

    /// 无法识别的通知类型
    #[error("unsupported advice kind: '{0}'")]
    UnsupportedAdviceKind(String),

    /// Bean 未找到
    #[error("no bean named '{0}' is defined")]
    BeanNotFound(String),

    /// 类型不匹配
    #[error("bean type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch { expected: String, found: String },

    /// Bean 创建或初始化回调失败
    #[error("failed to create bean '{name}': {message}")]
    BeanCreationFailed { name: String, message: String },

    /// 容器状态不允许该操作
    #[error("illegal container state: {0}")]
    IllegalState(String),

    /// 配置错误（切点表达式、配置文件等）
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn qualifier_suffix(qualifier: &Option<String>) -> String {
    match qualifier {
        Some(q) => format!(" qualified by '{}'", q),
        None => String::new(),
    }
}

impl ContainerError {
    /// 是否属于致命的装配错误
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ContainerError::ConflictingDescriptor(_)
                | ContainerError::UnsatisfiedDependency { .. }
                | ContainerError::AmbiguousDependency { .. }
                | ContainerError::UnresolvableCircularDependency(_)
                | ContainerError::UnsupportedAdviceKind(_)
        )
    }

    /// 将普通错误包装为指定 Bean 的创建失败，装配错误保持原样向上传播
    pub(crate) fn during_creation_of(self, name: &str) -> Self {
        match self {
            e if e.is_configuration_error() => e,
            e @ ContainerError::BeanCreationFailed { .. } => e,
            e @ ContainerError::BeanNotFound(_) => e,
            other => ContainerError::BeanCreationFailed {
                name: name.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// 容器操作的结果类型
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// 应用引导错误
#[derive(Debug, thiserror::Error)]
pub enum ApplicationError {
    #[error("failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParseFailed(String),

    #[error(transparent)]
    Container(#[from] ContainerError),
}

/// 应用引导操作的结果类型
pub type ApplicationResult<T> = std::result::Result<T, ApplicationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_classified() {
        assert!(ContainerError::ConflictingDescriptor("a".into()).is_configuration_error());
        assert!(ContainerError::UnsupportedAdviceKind("x".into()).is_configuration_error());
        assert!(!ContainerError::BeanNotFound("a".into()).is_configuration_error());
    }

    #[test]
    fn test_during_creation_keeps_taxonomy() {
        let err = ContainerError::UnresolvableCircularDependency("a -> b -> a".into())
            .during_creation_of("a");
        assert!(matches!(err, ContainerError::UnresolvableCircularDependency(_)));

        let err = ContainerError::Other(anyhow::anyhow!("boom")).during_creation_of("svc");
        match err {
            ContainerError::BeanCreationFailed { name, message } => {
                assert_eq!(name, "svc");
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unsatisfied_message_mentions_qualifier() {
        let err = ContainerError::UnsatisfiedDependency {
            requester: "service".into(),
            dependency: "Logger".into(),
            qualifier: Some("fileLogger".into()),
        };
        assert!(err.to_string().contains("qualified by 'fileLogger'"));
    }
}
