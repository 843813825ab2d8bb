//! AOP BeanPostProcessor - 自动为 Bean 应用 AOP 代理
//!
//! 在 Bean 初始化后检查它的方法是否匹配任何通知器，匹配时用 [`AopProxy`] 替换实例

use std::sync::Arc;

use arbor_core::prelude::*;

use crate::chain::InterceptorChainBuilder;
use crate::joinpoint::MethodDispatch;
use crate::proxy::AopProxy;

/// AOP 处理器在其他处理器之后执行，包装的是已经完成初始化的 Bean
pub const AOP_PROXY_ORDER: i32 = 2000;

/// AOP BeanPostProcessor
///
/// ## 工作原理
///
/// 1. 只处理定义声明了 `expose::<dyn MethodDispatch>` 的 Bean
/// 2. 至少一个方法匹配通知器时，创建 [`AopProxy`]
/// 3. 替换实例保存的是 `Arc<dyn MethodDispatch>`，因此按 `dyn MethodDispatch`
///    解析这个 Bean 得到的是代理；按具体类型解析仍然得到未被拦截的目标
pub struct AopBeanPostProcessor {
    chains: Arc<InterceptorChainBuilder>,
    enabled: bool,
}

impl AopBeanPostProcessor {
    pub fn new(chains: Arc<InterceptorChainBuilder>) -> Self {
        Self { chains, enabled: true }
    }

    /// 创建禁用的 AOP BeanPostProcessor
    pub fn disabled(chains: Arc<InterceptorChainBuilder>) -> Self {
        Self { chains, enabled: false }
    }

    pub fn chain_builder(&self) -> &Arc<InterceptorChainBuilder> {
        &self.chains
    }

    fn advised_method_count(&self, target: &dyn MethodDispatch) -> usize {
        let registry = self.chains.registry();
        target
            .methods()
            .iter()
            .filter(|method| registry.has_match(method))
            .count()
    }
}

impl BeanPostProcessor for AopBeanPostProcessor {
    fn name(&self) -> &str {
        "AopBeanPostProcessor"
    }

    fn order(&self) -> i32 {
        AOP_PROXY_ORDER
    }

    fn post_process_after_initialization(
        &self,
        bean: Instance,
        definition: &BeanDefinition,
    ) -> ContainerResult<Instance> {
        if !self.enabled || !definition.provides::<dyn MethodDispatch>() {
            return Ok(bean);
        }

        let Some(target) = definition.cast::<dyn MethodDispatch>(&bean) else {
            tracing::trace!(
                "Bean '{}' was replaced by an earlier post-processor, skipping AOP wrapping",
                definition.name()
            );
            return Ok(bean);
        };

        let advised = self.advised_method_count(target.as_ref());
        if advised == 0 {
            tracing::trace!("Bean '{}' does not match any advisor, skipping AOP wrapping", definition.name());
            return Ok(bean);
        }

        let proxy: Arc<dyn MethodDispatch> =
            Arc::new(AopProxy::new(definition.name(), target, Arc::clone(&self.chains)));
        tracing::info!(
            "[AOP-BeanPostProcessor] Wrapped bean '{}' with AOP proxy ({} advised method(s))",
            definition.name(),
            advised
        );
        let replacement: Instance = Arc::new(proxy);
        Ok(replacement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use crate::joinpoint::{value, InvocationResult, MethodSignature, Value};
    use crate::pointcut::PointcutExpression;
    use crate::registry::{Advisor, AdvisorRegistry};

    struct Clock;

    impl MethodDispatch for Clock {
        fn methods(&self) -> Vec<MethodSignature> {
            vec![MethodSignature::new("Clock", "now")]
        }

        fn dispatch(&self, _method: &MethodSignature, _args: &[Value]) -> InvocationResult {
            Ok(value(1_u64))
        }
    }

    fn processor(expression: &str) -> AopBeanPostProcessor {
        let registry = Arc::new(AdvisorRegistry::new());
        registry.register(Advisor::new(
            "plusOne",
            PointcutExpression::parse(expression).unwrap(),
            Advice::around(|pjp| {
                let n = *pjp.proceed()?.downcast_ref::<u64>().unwrap_or(&0);
                Ok(value(n + 1))
            }),
        ));
        AopBeanPostProcessor::new(Arc::new(InterceptorChainBuilder::new(registry)))
    }

    fn clock_definition() -> BeanDefinition {
        BeanDefinition::builder("clock", |_| Ok(Clock))
            .expose::<dyn MethodDispatch>(|clock| clock)
            .build()
    }

    #[test]
    fn test_matching_bean_is_wrapped() {
        let bean: Instance = Arc::new(Clock);
        let wrapped = processor("within(Clock)")
            .post_process_after_initialization(Arc::clone(&bean), &clock_definition())
            .unwrap();

        assert!(!Arc::ptr_eq(&bean, &wrapped));
        let view = wrapped.downcast_ref::<Arc<dyn MethodDispatch>>().unwrap();
        let now = view.invoke("now", vec![]).unwrap();
        assert_eq!(*now.downcast_ref::<u64>().unwrap(), 2);
    }

    #[test]
    fn test_unmatched_or_unexposed_beans_are_untouched() {
        let bean: Instance = Arc::new(Clock);
        let kept = processor("within(Calendar)")
            .post_process_after_initialization(Arc::clone(&bean), &clock_definition())
            .unwrap();
        assert!(Arc::ptr_eq(&bean, &kept));

        let plain = BeanDefinition::builder("clock", |_| Ok(Clock)).build();
        let kept = processor("*")
            .post_process_after_initialization(Arc::clone(&bean), &plain)
            .unwrap();
        assert!(Arc::ptr_eq(&bean, &kept));
    }

    #[test]
    fn test_disabled_processor() {
        let registry = Arc::new(AdvisorRegistry::new());
        let processor = AopBeanPostProcessor::disabled(Arc::new(InterceptorChainBuilder::new(registry)));
        let bean: Instance = Arc::new(Clock);
        let kept = processor
            .post_process_after_initialization(Arc::clone(&bean), &clock_definition())
            .unwrap();
        assert!(Arc::ptr_eq(&bean, &kept));
        assert_eq!(processor.order(), AOP_PROXY_ORDER);
    }
}
