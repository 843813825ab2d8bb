//! 通知（Advice）定义
//!
//! 一个通知就是五种类型之一的闭包，拦截链根据类型决定它与 `proceed` 的组合方式

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arbor_core::ContainerError;

use crate::joinpoint::{InvocationResult, JoinPoint, ProceedingJoinPoint, Value};

/// 通知类型
///
/// 声明顺序即拦截链中的优先级：Around 最外层，AfterThrowing 最内层
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AdviceKind {
    /// 环绕通知（可以控制方法执行）
    Around,
    /// 前置通知
    Before,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（失败时执行）
    AfterThrowing,
}

impl AdviceKind {
    /// 在拦截链中的优先级，数字越小越靠外
    pub fn precedence(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AdviceKind::Around => "around",
            AdviceKind::Before => "before",
            AdviceKind::After => "after",
            AdviceKind::AfterReturning => "after-returning",
            AdviceKind::AfterThrowing => "after-throwing",
        }
    }
}

impl fmt::Display for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdviceKind {
    type Err = ContainerError;

    /// 接受 `afterReturning`、`after-returning`、`AFTER_RETURNING` 等写法
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "around" => Ok(AdviceKind::Around),
            "before" => Ok(AdviceKind::Before),
            "after" => Ok(AdviceKind::After),
            "afterreturning" => Ok(AdviceKind::AfterReturning),
            "afterthrowing" => Ok(AdviceKind::AfterThrowing),
            _ => Err(ContainerError::UnsupportedAdviceKind(s.to_string())),
        }
    }
}

pub type AroundFn = Arc<dyn Fn(&ProceedingJoinPoint<'_>) -> InvocationResult + Send + Sync>;
pub type BeforeFn = Arc<dyn Fn(&JoinPoint) -> anyhow::Result<()> + Send + Sync>;
pub type AfterFn = Arc<dyn Fn(&JoinPoint) -> anyhow::Result<()> + Send + Sync>;
pub type AfterReturningFn = Arc<dyn Fn(&JoinPoint, &Value) -> anyhow::Result<()> + Send + Sync>;
pub type AfterThrowingFn = Arc<dyn Fn(&JoinPoint, anyhow::Error) -> InvocationResult + Send + Sync>;

/// 通知行为
///
/// - `Around` 自己决定是否、何时、调用几次 `proceed`，返回值就是调用结果
/// - `Before` 失败时直接中止调用
/// - `After` 无论成败都会执行
/// - `AfterReturning` 只在成功时执行，拿到返回值
/// - `AfterThrowing` 只在失败时执行，可以重新抛出、替换结果或吞掉错误
#[derive(Clone)]
pub enum Advice {
    Around(AroundFn),
    Before(BeforeFn),
    After(AfterFn),
    AfterReturning(AfterReturningFn),
    AfterThrowing(AfterThrowingFn),
}

impl Advice {
    pub fn around<F>(f: F) -> Self
    where
        F: Fn(&ProceedingJoinPoint<'_>) -> InvocationResult + Send + Sync + 'static,
    {
        Advice::Around(Arc::new(f))
    }

    pub fn before<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Advice::Before(Arc::new(f))
    }

    pub fn after<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Advice::After(Arc::new(f))
    }

    pub fn after_returning<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Advice::AfterReturning(Arc::new(f))
    }

    pub fn after_throwing<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint, anyhow::Error) -> InvocationResult + Send + Sync + 'static,
    {
        Advice::AfterThrowing(Arc::new(f))
    }

    pub fn kind(&self) -> AdviceKind {
        match self {
            Advice::Around(_) => AdviceKind::Around,
            Advice::Before(_) => AdviceKind::Before,
            Advice::After(_) => AdviceKind::After,
            Advice::AfterReturning(_) => AdviceKind::AfterReturning,
            Advice::AfterThrowing(_) => AdviceKind::AfterThrowing,
        }
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Advice::{:?}(..)", self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_order() {
        let mut kinds = vec![
            AdviceKind::AfterThrowing,
            AdviceKind::Before,
            AdviceKind::AfterReturning,
            AdviceKind::Around,
            AdviceKind::After,
        ];
        kinds.sort_by_key(|k| k.precedence());
        assert_eq!(
            kinds,
            vec![
                AdviceKind::Around,
                AdviceKind::Before,
                AdviceKind::After,
                AdviceKind::AfterReturning,
                AdviceKind::AfterThrowing,
            ]
        );
    }

    #[test]
    fn test_parse_kind_spellings() {
        assert_eq!("Around".parse::<AdviceKind>().unwrap(), AdviceKind::Around);
        assert_eq!("after-returning".parse::<AdviceKind>().unwrap(), AdviceKind::AfterReturning);
        assert_eq!("AFTER_THROWING".parse::<AdviceKind>().unwrap(), AdviceKind::AfterThrowing);
        assert_eq!("afterThrowing".parse::<AdviceKind>().unwrap(), AdviceKind::AfterThrowing);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = "finally".parse::<AdviceKind>().unwrap_err();
        assert!(matches!(err, ContainerError::UnsupportedAdviceKind(ref k) if k == "finally"));
        assert!(err.is_configuration_error());
    }
}
