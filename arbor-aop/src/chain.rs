//! 拦截链
//!
//! 每个调用点（类型 + 方法）对应一条缓存的 [`AdviceChain`]：匹配的通知按
//! `(通知类型优先级, order, 发现顺序)` 排序，最内层固定放一个暴露连接点的链节点。
//! 没有任何通知匹配的方法不构建链，代理直接调用目标。

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::advice::Advice;
use crate::joinpoint::{ExposedJoinPoint, InvocationResult, JoinPoint, MethodSignature, ProceedingJoinPoint};
use crate::registry::{Advisor, AdvisorRegistry};

/// 拦截链上的一个节点
///
/// 节点拿到连接点和剩余链的续延 `next`，自行决定是否、何时、调用几次 `next.invoke()`
pub trait ChainPoint: Send + Sync {
    fn invoke(&self, join_point: &JoinPoint, next: Proceed<'_>) -> InvocationResult;

    fn describe(&self) -> String;
}

/// 剩余拦截链的续延（链 + 索引游标）
#[derive(Clone, Copy)]
pub struct Proceed<'a> {
    chain: &'a AdviceChain,
    join_point: &'a JoinPoint,
    index: usize,
}

impl<'a> Proceed<'a> {
    /// 执行下一个节点；链走完后调用真实目标
    pub fn invoke(&self) -> InvocationResult {
        match self.chain.points.get(self.index) {
            Some(point) => point.invoke(
                self.join_point,
                Proceed {
                    index: self.index + 1,
                    ..*self
                },
            ),
            None => self
                .join_point
                .target()
                .dispatch(self.join_point.signature(), self.join_point.args()),
        }
    }

    /// 尚未执行的节点数
    pub fn remaining(&self) -> usize {
        self.chain.points.len().saturating_sub(self.index)
    }
}

/// 把通知适配为链节点
struct AdvicePoint {
    advisor: Arc<Advisor>,
}

impl ChainPoint for AdvicePoint {
    fn invoke(&self, join_point: &JoinPoint, next: Proceed<'_>) -> InvocationResult {
        match self.advisor.advice() {
            Advice::Around(around) => around(&ProceedingJoinPoint::new(join_point, next)),
            Advice::Before(before) => {
                before(join_point)?;
                next.invoke()
            }
            Advice::After(after) => {
                let outcome = next.invoke();
                match (outcome, after(join_point)) {
                    (Ok(value), Ok(())) => Ok(value),
                    (Ok(_), Err(e)) => Err(e),
                    (Err(e), Ok(())) => Err(e),
                    (Err(e), Err(after_error)) => {
                        tracing::warn!(
                            "After advice '{}' failed on {} while the call had already failed: {}",
                            self.advisor.name(),
                            join_point,
                            after_error
                        );
                        Err(e)
                    }
                }
            }
            Advice::AfterReturning(after_returning) => {
                let value = next.invoke()?;
                after_returning(join_point, &value)?;
                Ok(value)
            }
            Advice::AfterThrowing(after_throwing) => match next.invoke() {
                Ok(value) => Ok(value),
                Err(e) => after_throwing(join_point, e),
            },
        }
    }

    fn describe(&self) -> String {
        format!("{}({})", self.advisor.kind(), self.advisor.name())
    }
}

/// 最内层节点：在目标方法执行期间通过线程局部变量暴露连接点
struct ExposeJoinPoint;

impl ChainPoint for ExposeJoinPoint {
    fn invoke(&self, join_point: &JoinPoint, next: Proceed<'_>) -> InvocationResult {
        let _exposed = ExposedJoinPoint::expose(join_point);
        next.invoke()
    }

    fn describe(&self) -> String {
        "expose-join-point".to_string()
    }
}

/// 某个调用点的完整拦截链
pub struct AdviceChain {
    signature: Arc<MethodSignature>,
    points: Vec<Box<dyn ChainPoint>>,
    advisors: Vec<String>,
}

impl AdviceChain {
    pub fn signature(&self) -> &Arc<MethodSignature> {
        &self.signature
    }

    /// 按执行顺序排列的通知器名称
    pub fn advisor_names(&self) -> &[String] {
        &self.advisors
    }

    /// 包括边界节点在内的节点描述
    pub fn describe(&self) -> Vec<String> {
        self.points.iter().map(|p| p.describe()).collect()
    }
}

impl fmt::Debug for AdviceChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdviceChain")
            .field("signature", &self.signature.qualified_name())
            .field("points", &self.describe())
            .finish()
    }
}

/// 一次经过拦截链的调用
pub struct MethodInvocation {
    chain: Arc<AdviceChain>,
    join_point: JoinPoint,
}

impl MethodInvocation {
    pub fn new(chain: Arc<AdviceChain>, join_point: JoinPoint) -> Self {
        Self { chain, join_point }
    }

    pub fn join_point(&self) -> &JoinPoint {
        &self.join_point
    }

    pub fn proceed(&self) -> InvocationResult {
        Proceed {
            chain: &self.chain,
            join_point: &self.join_point,
            index: 0,
        }
        .invoke()
    }
}

/// 拦截链构建器
///
/// 每个调用点至多构建一次；并发的首次调用在同一个 `OnceCell` 上等待
pub struct InterceptorChainBuilder {
    registry: Arc<AdvisorRegistry>,
    cache: DashMap<MethodSignature, Arc<OnceCell<Option<Arc<AdviceChain>>>>>,
    builds: AtomicUsize,
}

impl InterceptorChainBuilder {
    pub fn new(registry: Arc<AdvisorRegistry>) -> Self {
        Self {
            registry,
            cache: DashMap::new(),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<AdvisorRegistry> {
        &self.registry
    }

    /// 获取调用点的拦截链，没有匹配的通知时返回 `None`
    pub fn chain_for(&self, method: &MethodSignature) -> Option<Arc<AdviceChain>> {
        let cell = match self.cache.get(method) {
            Some(cell) => Arc::clone(cell.value()),
            None => Arc::clone(
                self.cache
                    .entry(method.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new()))
                    .value(),
            ),
        };
        if let Some(chain) = cell.get() {
            tracing::trace!("Advice chain cache hit for {}", method.qualified_name());
            return chain.clone();
        }
        cell.get_or_init(|| self.build(method)).clone()
    }

    /// 实际构建过的拦截链数量
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// 已缓存的调用点数量（包括无需拦截的方法）
    pub fn cached_call_sites(&self) -> usize {
        self.cache.len()
    }

    fn build(&self, method: &MethodSignature) -> Option<Arc<AdviceChain>> {
        let mut advisors = self.registry.matching(method);
        if advisors.is_empty() {
            tracing::trace!("No advisor matches {}, calls go straight to the target", method);
            return None;
        }
        // 稳定排序，相同优先级与 order 时保持发现顺序
        advisors.sort_by_key(|a| (a.kind().precedence(), a.order()));
        self.builds.fetch_add(1, Ordering::SeqCst);

        let names: Vec<String> = advisors.iter().map(|a| a.name().to_string()).collect();
        let mut points: Vec<Box<dyn ChainPoint>> = advisors
            .into_iter()
            .map(|advisor| Box::new(AdvicePoint { advisor }) as Box<dyn ChainPoint>)
            .collect();
        points.push(Box::new(ExposeJoinPoint));

        tracing::debug!("Built advice chain for {}: {:?}", method.qualified_name(), names);
        Some(Arc::new(AdviceChain {
            signature: Arc::new(method.clone()),
            points,
            advisors: names,
        }))
    }
}

impl fmt::Debug for InterceptorChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChainBuilder")
            .field("call_sites", &self.cache.len())
            .field("builds", &self.build_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joinpoint::{arg, current_join_point, value, MethodDispatch, Value};
    use crate::pointcut::PointcutExpression;
    use anyhow::anyhow;
    use parking_lot::Mutex;
    use std::sync::Barrier;
    use std::thread;

    struct Calculator {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl MethodDispatch for Calculator {
        fn methods(&self) -> Vec<MethodSignature> {
            vec![
                MethodSignature::new("Calculator", "double").with_params(["n"]),
                MethodSignature::new("Calculator", "fail"),
            ]
        }

        fn dispatch(&self, method: &MethodSignature, args: &[Value]) -> InvocationResult {
            self.log.lock().push("target".to_string());
            match method.name.as_str() {
                "double" => {
                    let exposed = current_join_point().map(|jp| jp.method_name().to_string());
                    assert_eq!(exposed.as_deref(), Some("double"));
                    Ok(value(arg::<i32>(args, 0)? * 2))
                }
                _ => Err(anyhow!("calculator failure")),
            }
        }
    }

    fn record(log: &Arc<Mutex<Vec<String>>>, entry: &str) {
        log.lock().push(entry.to_string());
    }

    fn invoke(builder: &InterceptorChainBuilder, target: Arc<dyn MethodDispatch>, name: &str, args: Vec<Value>) -> InvocationResult {
        let signature = target
            .methods()
            .into_iter()
            .find(|m| m.name == name)
            .unwrap();
        match builder.chain_for(&signature) {
            Some(chain) => {
                let jp = JoinPoint::new(Arc::clone(chain.signature()), Arc::from(args), target);
                MethodInvocation::new(chain, jp).proceed()
            }
            None => target.dispatch(&signature, &args),
        }
    }

    fn setup() -> (Arc<AdvisorRegistry>, Arc<Mutex<Vec<String>>>, Arc<dyn MethodDispatch>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let target: Arc<dyn MethodDispatch> = Arc::new(Calculator { log: Arc::clone(&log) });
        (Arc::new(AdvisorRegistry::new()), log, target)
    }

    #[test]
    fn test_after_returning_completes_inside_around_post() {
        let (registry, log, target) = setup();
        let all = || PointcutExpression::Any;

        let l = Arc::clone(&log);
        registry.register(
            Advisor::new("afterReturning", all(), Advice::after_returning(move |_, _| {
                record(&l, "after-returning");
                Ok(())
            }))
            .with_order(2),
        );
        let l = Arc::clone(&log);
        registry.register(
            Advisor::new("before", all(), Advice::before(move |_| {
                record(&l, "before");
                Ok(())
            }))
            .with_order(1),
        );
        let l = Arc::clone(&log);
        registry.register(
            Advisor::new("around", all(), Advice::around(move |pjp| {
                record(&l, "around-pre");
                let result = pjp.proceed();
                record(&l, "around-post");
                result
            }))
            .with_order(0),
        );

        let builder = InterceptorChainBuilder::new(registry);
        let result = invoke(&builder, target, "double", vec![value(21)]).unwrap();
        assert_eq!(*result.downcast_ref::<i32>().unwrap(), 42);
        assert_eq!(
            *log.lock(),
            vec!["around-pre", "before", "target", "after-returning", "around-post"]
        );
    }

    #[test]
    fn test_discovery_order_breaks_ties() {
        let (registry, log, target) = setup();
        for name in ["first", "second", "third"] {
            let l = Arc::clone(&log);
            registry.register(Advisor::new(name, PointcutExpression::Any, Advice::before(move |_| {
                record(&l, name);
                Ok(())
            })));
        }
        let builder = InterceptorChainBuilder::new(registry);
        invoke(&builder, target, "double", vec![value(1)]).unwrap();
        assert_eq!(*log.lock(), vec!["first", "second", "third", "target"]);
    }

    #[test]
    fn test_around_can_short_circuit_and_retry() {
        let (registry, log, target) = setup();
        registry.register(Advisor::new(
            "cache",
            PointcutExpression::method("double").unwrap(),
            Advice::around(|pjp| match pjp.arg::<i32>(0) {
                Some(0) => Ok(value(0)),
                _ => pjp.proceed(),
            }),
        ));
        registry.register(Advisor::new(
            "retry",
            PointcutExpression::method("fail").unwrap(),
            Advice::around(|pjp| pjp.proceed().or_else(|_| pjp.proceed())),
        ));
        let builder = InterceptorChainBuilder::new(registry);

        let zero = invoke(&builder, Arc::clone(&target), "double", vec![value(0)]).unwrap();
        assert_eq!(*zero.downcast_ref::<i32>().unwrap(), 0);
        assert!(log.lock().is_empty());

        assert!(invoke(&builder, target, "fail", vec![]).is_err());
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn test_after_throwing_substitutes_result() {
        let (registry, _log, target) = setup();
        registry.register(Advisor::new(
            "recover",
            PointcutExpression::Any,
            Advice::after_throwing(|_, e| {
                assert_eq!(e.to_string(), "calculator failure");
                Ok(value(-1))
            }),
        ));
        let builder = InterceptorChainBuilder::new(registry);
        let result = invoke(&builder, target, "fail", vec![]).unwrap();
        assert_eq!(*result.downcast_ref::<i32>().unwrap(), -1);
    }

    #[test]
    fn test_after_runs_on_failure_and_keeps_original_error() {
        let (registry, log, target) = setup();
        let l = Arc::clone(&log);
        registry.register(Advisor::new("finally", PointcutExpression::Any, Advice::after(move |_| {
            record(&l, "after");
            Err(anyhow!("after failed"))
        })));
        let builder = InterceptorChainBuilder::new(registry);

        let err = invoke(&builder, Arc::clone(&target), "fail", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "calculator failure");

        let err = invoke(&builder, target, "double", vec![value(2)]).unwrap_err();
        assert_eq!(err.to_string(), "after failed");
        assert_eq!(*log.lock(), vec!["target", "after", "target", "after"]);
    }

    #[test]
    fn test_unadvised_method_takes_fast_path() {
        let (registry, _log, target) = setup();
        registry.register(Advisor::new(
            "onlyFail",
            PointcutExpression::method("fail").unwrap(),
            Advice::before(|_| Ok(())),
        ));
        let builder = InterceptorChainBuilder::new(registry);
        assert!(builder.chain_for(&MethodSignature::new("Calculator", "double").with_params(["n"])).is_none());
        assert_eq!(builder.build_count(), 0);
        let chain = builder.chain_for(&MethodSignature::new("Calculator", "fail")).unwrap();
        assert_eq!(chain.describe(), vec!["before(onlyFail)", "expose-join-point"]);
    }

    #[test]
    fn test_concurrent_first_calls_build_once() {
        let (registry, _log, target) = setup();
        registry.register(Advisor::new("around", PointcutExpression::Any, Advice::around(|pjp| pjp.proceed())));
        let builder = InterceptorChainBuilder::new(registry);
        let barrier = Barrier::new(8);

        thread::scope(|s| {
            for i in 0..8 {
                let builder = &builder;
                let barrier = &barrier;
                let target = Arc::clone(&target);
                s.spawn(move || {
                    barrier.wait();
                    let result = invoke(builder, target, "double", vec![value(i)]).unwrap();
                    assert_eq!(*result.downcast_ref::<i32>().unwrap(), i * 2);
                });
            }
        });

        assert_eq!(builder.build_count(), 1);
        assert_eq!(builder.cached_call_sites(), 1);
    }
}
