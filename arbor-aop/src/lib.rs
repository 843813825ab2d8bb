//! Arbor AOP - 面向切面编程支持
//!
//! 提供类似 Spring 的 AOP 功能，支持：
//! - 声明式切面定义与编程式通知器
//! - 多种通知类型（Around、Before、After、AfterReturning、AfterThrowing）
//! - 可替换的切点表达式求值器
//! - 每个调用点至多构建一次、并发安全的拦截链缓存
//! - 通过 BeanPostProcessor 自动为匹配的 Bean 包装代理

pub mod advice;
pub mod aspect;
pub mod bean_post_processor;
pub mod chain;
pub mod error_info;
pub mod joinpoint;
pub mod plugin;
pub mod pointcut;
pub mod proxy;
pub mod registry;

// 重新导出核心类型
pub use advice::{Advice, AdviceKind};
pub use aspect::{
    error_logging_advisor, logging_advisor, registered_aspects, timing_advisor, AdviceHandler, AdviceInvocation,
    AdviceRule, AspectDefinition, AspectRegistration,
};
pub use bean_post_processor::{AopBeanPostProcessor, AOP_PROXY_ORDER};
pub use chain::{AdviceChain, ChainPoint, InterceptorChainBuilder, MethodInvocation, Proceed};
pub use error_info::ErrorInfo;
pub use joinpoint::{
    arg, current_join_point, value, InvocationResult, JoinPoint, MethodDispatch, MethodSignature,
    ProceedingJoinPoint, Value,
};
pub use plugin::{
    AopPlugin, ADVISOR_REGISTRY_BEAN_NAME, AOP_BEAN_POST_PROCESSOR_BEAN_NAME, INTERCEPTOR_CHAIN_BUILDER_BEAN_NAME,
};
pub use pointcut::{ExpressionEvaluator, MethodMatcher, NamePattern, ParamPattern, PointcutExpression, PointcutParser};
pub use proxy::AopProxy;
pub use registry::{Advisor, AdvisorRegistry};

// 导出 inventory 供宏使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::{Advice, AdviceKind};
    pub use crate::aspect::{error_logging_advisor, logging_advisor, timing_advisor, AdviceInvocation, AdviceRule, AspectDefinition};
    pub use crate::joinpoint::{
        arg, current_join_point, value, InvocationResult, JoinPoint, MethodDispatch, MethodSignature,
        ProceedingJoinPoint, Value,
    };
    pub use crate::plugin::AopPlugin;
    pub use crate::pointcut::{MethodMatcher, PointcutExpression};
    pub use crate::proxy::AopProxy;
    pub use crate::registry::{Advisor, AdvisorRegistry};
    pub use crate::submit_aspect;
}
