//! 切面（Aspect）定义
//!
//! 切面是横切关注点的模块化。声明式标记由外部翻译成 `(类型, 表达式, 参数名)` 三元组，
//! 也就是这里的 [`AdviceRule`]；容器不关心标记本身，只负责把每条规则展开为一个通知器。
//!
//! ```ignore
//! fn auditing() -> AspectDefinition {
//!     AspectDefinition::new("auditing")
//!         .rule(AdviceRule::new("before", "within(*Service)", |inv| {
//!             tracing::info!("calling {}", inv.join_point());
//!             Ok(value(()))
//!         }))
//! }
//!
//! arbor_aop::submit_aspect!("auditing", auditing);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use arbor_core::{ContainerResult, DEFAULT_ORDER};

use crate::advice::{Advice, AdviceKind};
use crate::error_info::ErrorInfo;
use crate::joinpoint::{InvocationResult, JoinPoint, ProceedingJoinPoint, Value};
use crate::pointcut::{ExpressionEvaluator, MethodMatcher};
use crate::registry::Advisor;

/// 声明式通知的处理函数
pub type AdviceHandler = Arc<dyn Fn(&mut AdviceInvocation<'_>) -> InvocationResult + Send + Sync>;

/// 一条通知规则
#[derive(Clone)]
pub struct AdviceRule {
    /// 通知类型的原始文本，展开时才校验
    pub kind: String,
    pub expression: String,
    /// 需要绑定的方法参数名
    pub arg_names: Vec<String>,
    pub handler: AdviceHandler,
}

impl AdviceRule {
    pub fn new<F>(kind: impl Into<String>, expression: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut AdviceInvocation<'_>) -> InvocationResult + Send + Sync + 'static,
    {
        Self {
            kind: kind.into(),
            expression: expression.into(),
            arg_names: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn with_arg_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arg_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// 除 around 与 after-throwing 外，处理函数的返回值被忽略，只有失败会传播
    fn to_advice(&self, kind: AdviceKind) -> Advice {
        let handler = Arc::clone(&self.handler);
        let names: Arc<[String]> = self.arg_names.clone().into();
        match kind {
            AdviceKind::Around => Advice::around(move |pjp| {
                handler(&mut AdviceInvocation::new(pjp.join_point(), &names).with_proceeding(pjp))
            }),
            AdviceKind::Before => {
                Advice::before(move |jp| handler(&mut AdviceInvocation::new(jp, &names)).map(|_| ()))
            }
            AdviceKind::After => {
                Advice::after(move |jp| handler(&mut AdviceInvocation::new(jp, &names)).map(|_| ()))
            }
            AdviceKind::AfterReturning => Advice::after_returning(move |jp, returned| {
                let mut invocation = AdviceInvocation::new(jp, &names);
                invocation.returned = Some(returned);
                handler(&mut invocation).map(|_| ())
            }),
            AdviceKind::AfterThrowing => Advice::after_throwing(move |jp, error| {
                let mut invocation = AdviceInvocation::new(jp, &names);
                invocation.error = Some(error);
                handler(&mut invocation)
            }),
        }
    }
}

impl fmt::Debug for AdviceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdviceRule")
            .field("kind", &self.kind)
            .field("expression", &self.expression)
            .field("arg_names", &self.arg_names)
            .finish()
    }
}

/// 切面定义
#[derive(Clone, Debug)]
pub struct AspectDefinition {
    pub name: String,
    pub order: i32,
    pub rules: Vec<AdviceRule>,
}

impl AspectDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: DEFAULT_ORDER,
            rules: Vec::new(),
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn rule(mut self, rule: AdviceRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// 每条规则展开为一个通知器，共享切面的 order
    pub fn to_advisors(&self, evaluator: &dyn ExpressionEvaluator) -> ContainerResult<Vec<Advisor>> {
        self.rules
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                let kind: AdviceKind = rule.kind.parse()?;
                let matcher = evaluator.evaluate(&rule.expression)?;
                let name = format!("{}#{}.{}", self.name, index, kind);
                Ok(Advisor::with_matcher(name, matcher, rule.to_advice(kind)).with_order(self.order))
            })
            .collect()
    }
}

/// 声明式通知执行时的上下文
pub struct AdviceInvocation<'a> {
    join_point: &'a JoinPoint,
    arg_names: &'a [String],
    proceeding: Option<&'a ProceedingJoinPoint<'a>>,
    returned: Option<&'a Value>,
    error: Option<anyhow::Error>,
}

impl<'a> AdviceInvocation<'a> {
    fn new(join_point: &'a JoinPoint, arg_names: &'a [String]) -> Self {
        Self {
            join_point,
            arg_names,
            proceeding: None,
            returned: None,
            error: None,
        }
    }

    fn with_proceeding(mut self, proceeding: &'a ProceedingJoinPoint<'a>) -> Self {
        self.proceeding = Some(proceeding);
        self
    }

    pub fn join_point(&self) -> &JoinPoint {
        self.join_point
    }

    /// 按名称取出规则声明过的参数
    pub fn bound<T: Any>(&self, name: &str) -> Option<&T> {
        if !self.arg_names.iter().any(|n| n == name) {
            return None;
        }
        self.join_point.arg_named(name)
    }

    /// 继续执行拦截链，只有 around 通知可用
    pub fn proceed(&self) -> InvocationResult {
        match self.proceeding {
            Some(proceeding) => proceeding.proceed(),
            None => Err(anyhow!(
                "proceed() is only available to around advice ({})",
                self.join_point
            )),
        }
    }

    /// after-returning 通知看到的返回值
    pub fn returned_value(&self) -> Option<&Value> {
        self.returned
    }

    /// after-throwing 通知看到的失败
    pub fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }

    /// 重新抛出原始失败
    pub fn rethrow(&mut self) -> InvocationResult {
        Err(self
            .take_error()
            .unwrap_or_else(|| anyhow!("no failure to rethrow on {}", self.join_point)))
    }
}

/// 切面注册器
///
/// 用于 inventory 自动收集和注册切面
pub struct AspectRegistration {
    pub name: &'static str,
    pub create: fn() -> AspectDefinition,
}

inventory::collect!(AspectRegistration);

/// 登记一个切面，`create` 返回它的定义
#[macro_export]
macro_rules! submit_aspect {
    ($name:expr, $create:expr) => {
        $crate::inventory::submit! {
            $crate::aspect::AspectRegistration {
                name: $name,
                create: $create,
            }
        }
    };
}

/// 获取所有注册的切面注册器
pub fn registered_aspects() -> impl Iterator<Item = &'static AspectRegistration> {
    inventory::iter::<AspectRegistration>.into_iter()
}

// ============================================================================
// 预定义的常用通知器
// ============================================================================

/// 日志通知器 - 记录方法进入与退出
pub fn logging_advisor(matcher: impl MethodMatcher + 'static) -> Advisor {
    Advisor::new(
        "loggingAdvisor",
        matcher,
        Advice::around(|pjp| {
            tracing::info!("→ Entering: {}", pjp.join_point());
            let result = pjp.proceed();
            tracing::info!("← Exiting: {} (took {:?})", pjp.join_point(), pjp.elapsed());
            result
        }),
    )
}

/// 性能监控通知器
pub fn timing_advisor(threshold: Duration, matcher: impl MethodMatcher + 'static) -> Advisor {
    Advisor::new(
        "timingAdvisor",
        matcher,
        Advice::after(move |jp| {
            let elapsed = jp.elapsed();
            if elapsed > threshold {
                tracing::warn!(
                    "Slow method detected: {} took {}ms (threshold: {}ms)",
                    jp,
                    elapsed.as_millis(),
                    threshold.as_millis()
                );
            }
            Ok(())
        }),
    )
}

/// 异常日志通知器，记录后原样抛出
pub fn error_logging_advisor(matcher: impl MethodMatcher + 'static) -> Advisor {
    Advisor::new(
        "errorLoggingAdvisor",
        matcher,
        Advice::after_throwing(|jp, error| {
            let info = ErrorInfo::from_anyhow(&error);
            tracing::error!("Exception in {}: {}", jp, info.full_description());
            Err(error)
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{InterceptorChainBuilder, MethodInvocation};
    use crate::joinpoint::{value, MethodDispatch, MethodSignature};
    use crate::pointcut::{PointcutExpression, PointcutParser};
    use crate::registry::AdvisorRegistry;
    use parking_lot::Mutex;

    struct Greeter;

    impl MethodDispatch for Greeter {
        fn methods(&self) -> Vec<MethodSignature> {
            vec![MethodSignature::new("Greeter", "greet").with_params(["name", "times"])]
        }

        fn dispatch(&self, _method: &MethodSignature, args: &[Value]) -> InvocationResult {
            let name = crate::joinpoint::arg::<String>(args, 0)?;
            if name.is_empty() {
                return Err(anyhow!("empty name"));
            }
            Ok(value(format!("hello {}", name)))
        }
    }

    fn call(registry: Arc<AdvisorRegistry>, name: &str) -> InvocationResult {
        let builder = InterceptorChainBuilder::new(registry);
        let target: Arc<dyn MethodDispatch> = Arc::new(Greeter);
        let signature = target.methods().remove(0);
        let chain = builder.chain_for(&signature).expect("advised");
        let jp = JoinPoint::new(
            Arc::clone(chain.signature()),
            Arc::from(vec![value(name.to_string()), value(2_u32)]),
            target,
        );
        MethodInvocation::new(chain, jp).proceed()
    }

    #[test]
    fn test_bound_arguments_require_declaration() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let aspect = AspectDefinition::new("binding").rule(
            AdviceRule::new("before", "method(greet)", move |inv| {
                s.lock().push((
                    inv.bound::<String>("name").cloned(),
                    inv.bound::<u32>("times").copied(),
                ));
                Ok(value(()))
            })
            .with_arg_names(["name"]),
        );
        let registry = Arc::new(AdvisorRegistry::new());
        registry.register_aspect(&aspect).unwrap();

        call(registry, "ann").unwrap();
        assert_eq!(*seen.lock(), vec![(Some("ann".to_string()), None)]);
    }

    #[test]
    fn test_declarative_after_throwing_substitutes() {
        let aspect = AspectDefinition::new("fallback")
            .rule(AdviceRule::new("after-throwing", "within(Greeter)", |inv| {
                let error = inv.take_error().expect("failure");
                Ok(value(format!("fallback: {}", error)))
            }))
            .rule(AdviceRule::new("afterReturning", "within(Greeter)", |inv| {
                assert!(inv.returned_value().is_some());
                assert!(inv.proceed().is_err());
                Ok(value(()))
            }));
        let registry = Arc::new(AdvisorRegistry::new());
        registry.register_aspect(&aspect).unwrap();

        let ok = call(Arc::clone(&registry), "bob").unwrap();
        assert_eq!(ok.downcast_ref::<String>().unwrap(), "hello bob");
        let recovered = call(registry, "").unwrap();
        assert_eq!(recovered.downcast_ref::<String>().unwrap(), "fallback: empty name");
    }

    #[test]
    fn test_declarative_rethrow() {
        let aspect = AspectDefinition::new("strict")
            .rule(AdviceRule::new("AFTER_THROWING", "*", |inv| inv.rethrow()));
        let registry = Arc::new(AdvisorRegistry::new());
        registry.register_aspect(&aspect).unwrap();
        assert_eq!(call(registry, "").unwrap_err().to_string(), "empty name");
    }

    #[test]
    fn test_advisor_names_and_bad_expression() {
        let aspect = AspectDefinition::new("audit")
            .rule(AdviceRule::new("around", "within(Greeter)", |inv| inv.proceed()));
        let advisors = aspect.to_advisors(&PointcutParser::new()).unwrap();
        assert_eq!(advisors[0].name(), "audit#0.around");

        let broken = AspectDefinition::new("broken").rule(AdviceRule::new("before", "within(", |_| Ok(value(()))));
        assert!(broken.to_advisors(&PointcutParser::new()).is_err());
    }

    #[test]
    fn test_ready_made_advisors_keep_results() {
        let registry = Arc::new(AdvisorRegistry::new());
        registry.register(logging_advisor(PointcutExpression::Any));
        registry.register(timing_advisor(Duration::from_secs(10), PointcutExpression::Any));
        registry.register(error_logging_advisor(PointcutExpression::Any));

        let ok = call(Arc::clone(&registry), "eve").unwrap();
        assert_eq!(ok.downcast_ref::<String>().unwrap(), "hello eve");
        assert_eq!(call(registry, "").unwrap_err().to_string(), "empty name");
    }
}
