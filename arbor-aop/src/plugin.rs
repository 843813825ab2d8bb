//! AOP Plugin - 通过插件机制集成 AOP 到容器
//!
//! 在 Preparing 阶段注册三个 Bean：
//!
//! | 名称                       | 类型                         |
//! |----------------------------|------------------------------|
//! | `advisorRegistry`          | [`AdvisorRegistry`]          |
//! | `interceptorChainBuilder`  | [`InterceptorChainBuilder`]  |
//! | `aopBeanPostProcessor`     | [`AopBeanPostProcessor`]     |
//!
//! 容器中类型为 [`Advisor`] 的 Bean 会在创建拦截链构建器时加入注册表。
//!
//! ```ignore
//! let context = ApplicationContext::builder()
//!     .plugin(AopPlugin::new().advisor(logging_advisor(PointcutExpression::within("*Service")?)))
//!     .register(service_definition())
//!     .run()?;
//! ```

use std::sync::Arc;

use arbor_core::prelude::*;

use crate::aspect::AspectDefinition;
use crate::bean_post_processor::AopBeanPostProcessor;
use crate::chain::InterceptorChainBuilder;
use crate::pointcut::ExpressionEvaluator;
use crate::registry::{Advisor, AdvisorRegistry};

pub const ADVISOR_REGISTRY_BEAN_NAME: &str = "advisorRegistry";
pub const INTERCEPTOR_CHAIN_BUILDER_BEAN_NAME: &str = "interceptorChainBuilder";
pub const AOP_BEAN_POST_PROCESSOR_BEAN_NAME: &str = "aopBeanPostProcessor";

/// AOP 应用插件
pub struct AopPlugin {
    name: String,
    enabled: bool,
    load_registered_aspects: bool,
    advisors: Vec<Advisor>,
    aspects: Vec<AspectDefinition>,
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
}

impl AopPlugin {
    /// 创建新的 AOP 插件，默认加载 `submit_aspect!` 登记的切面
    pub fn new() -> Self {
        Self {
            name: "AopPlugin".to_string(),
            enabled: true,
            load_registered_aspects: true,
            advisors: Vec::new(),
            aspects: Vec::new(),
            evaluator: None,
        }
    }

    /// 创建禁用的 AOP 插件
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    /// 设置插件名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 编程式注册通知器
    pub fn advisor(mut self, advisor: Advisor) -> Self {
        self.advisors.push(advisor);
        self
    }

    pub fn aspect(mut self, aspect: AspectDefinition) -> Self {
        self.aspects.push(aspect);
        self
    }

    /// 替换默认的切点表达式解析器
    pub fn evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn without_registered_aspects(mut self) -> Self {
        self.load_registered_aspects = false;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build_registry(&self) -> ContainerResult<AdvisorRegistry> {
        let registry = match &self.evaluator {
            Some(evaluator) => AdvisorRegistry::with_evaluator(Arc::clone(evaluator)),
            None => AdvisorRegistry::new(),
        };
        for advisor in &self.advisors {
            registry.register(advisor.clone());
        }
        for aspect in &self.aspects {
            registry.register_aspect(aspect)?;
        }
        if self.load_registered_aspects {
            registry.load_registered_aspects()?;
        }
        Ok(registry)
    }
}

impl Default for AopPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationPlugin for AopPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&self, context: &ApplicationContext) -> ContainerResult<()> {
        if !self.enabled {
            tracing::info!("AOP Plugin is disabled, skipping initialization");
            return Ok(());
        }

        tracing::info!("[AopPlugin] Initializing AOP support...");
        let registry = self.build_registry()?;
        tracing::info!("[AopPlugin] {} advisor(s) registered", registry.len());

        context.register(BeanDefinition::instance(ADVISOR_REGISTRY_BEAN_NAME, Arc::new(registry)).build())?;

        context.register(
            BeanDefinition::builder(INTERCEPTOR_CHAIN_BUILDER_BEAN_NAME, |r| {
                let registry = r.get::<AdvisorRegistry>()?;
                for advisor in r.get_all::<Advisor>()? {
                    registry.register_shared(advisor);
                }
                Ok(InterceptorChainBuilder::new(registry))
            })
            .build(),
        )?;

        context.register(
            BeanDefinition::builder(AOP_BEAN_POST_PROCESSOR_BEAN_NAME, |r| {
                Ok(AopBeanPostProcessor::new(r.get::<InterceptorChainBuilder>()?))
            })
            .bean_post_processor()
            .build(),
        )?;

        tracing::info!("[AopPlugin] AOP BeanPostProcessor registered successfully");
        Ok(())
    }

    fn on_ready(&self, context: &ApplicationContext) -> ContainerResult<()> {
        if self.enabled {
            let chains = context.get_bean_by_type::<InterceptorChainBuilder>()?;
            tracing::info!(
                "[AopPlugin] AOP is active with {} advisor(s)",
                chains.registry().len()
            );
        }
        Ok(())
    }

    fn on_shutdown(&self, _context: &ApplicationContext) -> ContainerResult<()> {
        if self.enabled {
            tracing::info!("[AopPlugin] Shutting down AOP support");
        }
        Ok(())
    }
}

// 自动注册 AOP 插件到 inventory
arbor_core::submit_plugin!(AopPlugin);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspect::AdviceRule;
    use crate::joinpoint::value;

    #[test]
    fn test_plugin_creation() {
        let plugin = AopPlugin::new();
        assert_eq!(plugin.name(), "AopPlugin");
        assert!(plugin.is_enabled());
        assert!(!AopPlugin::disabled().is_enabled());
        assert_eq!(AopPlugin::new().with_name("CustomAopPlugin").name(), "CustomAopPlugin");
    }

    #[test]
    fn test_unsupported_kind_fails_registry_build() {
        let plugin = AopPlugin::new()
            .without_registered_aspects()
            .aspect(AspectDefinition::new("odd").rule(AdviceRule::new("during", "*", |_| Ok(value(())))));
        let err = plugin.build_registry().unwrap_err();
        assert!(matches!(err, ContainerError::UnsupportedAdviceKind(_)));
    }
}
