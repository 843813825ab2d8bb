//! 通知器注册表
//!
//! 通知器来自两处：声明式切面（每条规则展开为一个通知器）和编程式注册。
//! 注册表归容器所有，由 `AopPlugin` 以 `advisorRegistry` 注册。

use std::fmt;
use std::sync::Arc;

use arbor_core::{ContainerResult, DEFAULT_ORDER};
use parking_lot::RwLock;

use crate::advice::{Advice, AdviceKind};
use crate::aspect::{registered_aspects, AspectDefinition};
use crate::joinpoint::MethodSignature;
use crate::pointcut::{ExpressionEvaluator, MethodMatcher, PointcutParser};

/// 通知器：匹配器 + 通知
#[derive(Clone)]
pub struct Advisor {
    name: String,
    matcher: Arc<dyn MethodMatcher>,
    advice: Advice,
    order: i32,
}

impl Advisor {
    pub fn new(name: impl Into<String>, matcher: impl MethodMatcher + 'static, advice: Advice) -> Self {
        Self::with_matcher(name, Arc::new(matcher), advice)
    }

    pub fn with_matcher(name: impl Into<String>, matcher: Arc<dyn MethodMatcher>, advice: Advice) -> Self {
        Self {
            name: name.into(),
            matcher,
            advice,
            order: DEFAULT_ORDER,
        }
    }

    /// 设置排序值（同类型通知中数字越小越靠外）
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AdviceKind {
        self.advice.kind()
    }

    pub fn advice(&self) -> &Advice {
        &self.advice
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn matches(&self, method: &MethodSignature) -> bool {
        self.matcher.matches(method)
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("order", &self.order)
            .finish()
    }
}

/// 通知器注册表
pub struct AdvisorRegistry {
    /// 按发现顺序保存
    advisors: RwLock<Vec<Arc<Advisor>>>,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl AdvisorRegistry {
    pub fn new() -> Self {
        Self::with_evaluator(Arc::new(PointcutParser::new()))
    }

    /// 使用自定义的表达式求值器
    pub fn with_evaluator(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            advisors: RwLock::new(Vec::new()),
            evaluator,
        }
    }

    pub fn evaluator(&self) -> &Arc<dyn ExpressionEvaluator> {
        &self.evaluator
    }

    /// 注册通知器
    pub fn register(&self, advisor: Advisor) {
        self.register_shared(Arc::new(advisor));
    }

    pub fn register_shared(&self, advisor: Arc<Advisor>) {
        tracing::debug!(
            "Registering advisor: {} ({}, order {})",
            advisor.name(),
            advisor.kind(),
            advisor.order()
        );
        self.advisors.write().push(advisor);
    }

    /// 把切面的每条规则展开为通知器
    ///
    /// 任意一条规则的类型或表达式无效时整个切面都不会注册
    pub fn register_aspect(&self, aspect: &AspectDefinition) -> ContainerResult<usize> {
        let advisors = aspect.to_advisors(self.evaluator.as_ref())?;
        let count = advisors.len();
        tracing::debug!("Aspect '{}' expanded into {} advisor(s)", aspect.name, count);
        for advisor in advisors {
            self.register(advisor);
        }
        Ok(count)
    }

    /// 加载所有通过 `submit_aspect!` 登记的切面
    pub fn load_registered_aspects(&self) -> ContainerResult<usize> {
        let registrations: Vec<_> = registered_aspects().collect();
        tracing::info!("Auto-loading {} aspect(s) from registry", registrations.len());

        let mut loaded = 0;
        for registration in registrations {
            let aspect = (registration.create)();
            tracing::debug!("  ├─ Loading aspect: {}", registration.name);
            loaded += self.register_aspect(&aspect)?;
        }

        tracing::info!("Auto-loaded {} advisor(s)", loaded);
        Ok(loaded)
    }

    /// 匹配指定方法的全部通知器，按发现顺序
    pub fn matching(&self, method: &MethodSignature) -> Vec<Arc<Advisor>> {
        self.advisors
            .read()
            .iter()
            .filter(|advisor| advisor.matches(method))
            .cloned()
            .collect()
    }

    pub fn has_match(&self, method: &MethodSignature) -> bool {
        self.advisors.read().iter().any(|advisor| advisor.matches(method))
    }

    pub fn advisors(&self) -> Vec<Arc<Advisor>> {
        self.advisors.read().clone()
    }

    pub fn len(&self) -> usize {
        self.advisors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.advisors.read().is_empty()
    }
}

impl Default for AdvisorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AdvisorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisorRegistry")
            .field("advisors", &*self.advisors.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspect::{AdviceRule, AspectDefinition};
    use crate::joinpoint::value;
    use crate::pointcut::PointcutExpression;
    use arbor_core::ContainerError;

    fn noop_before(name: &str, expression: &str) -> Advisor {
        Advisor::new(
            name,
            PointcutExpression::parse(expression).unwrap(),
            Advice::before(|_| Ok(())),
        )
    }

    #[test]
    fn test_matching_keeps_discovery_order() {
        let registry = AdvisorRegistry::new();
        registry.register(noop_before("a", "within(*Service)"));
        registry.register(noop_before("b", "method(save)"));
        registry.register(noop_before("c", "within(UserService)"));

        let method = MethodSignature::new("app::UserService", "find");
        let names: Vec<_> = registry.matching(&method).iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert!(registry.has_match(&method));
        assert!(!registry.has_match(&MethodSignature::new("Repo", "find")));
    }

    #[test]
    fn test_aspect_expands_one_advisor_per_rule() {
        let registry = AdvisorRegistry::new();
        let aspect = AspectDefinition::new("auditing")
            .with_order(5)
            .rule(AdviceRule::new("before", "within(*Service)", |_| Ok(value(()))))
            .rule(AdviceRule::new("around", "within(*Service)", |inv| inv.proceed()));

        assert_eq!(registry.register_aspect(&aspect).unwrap(), 2);
        let kinds: Vec<_> = registry.advisors().iter().map(|a| (a.kind(), a.order())).collect();
        assert_eq!(kinds, vec![(AdviceKind::Before, 5), (AdviceKind::Around, 5)]);
    }

    #[test]
    fn test_invalid_aspect_registers_nothing() {
        let registry = AdvisorRegistry::new();
        let aspect = AspectDefinition::new("broken")
            .rule(AdviceRule::new("before", "*", |_| Ok(value(()))))
            .rule(AdviceRule::new("finally", "*", |_| Ok(value(()))));

        let err = registry.register_aspect(&aspect).unwrap_err();
        assert!(matches!(err, ContainerError::UnsupportedAdviceKind(ref k) if k == "finally"));
        assert!(registry.is_empty());
    }
}
