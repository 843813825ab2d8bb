//! AOP 代理
//!
//! 代理与目标实现同一个 [`MethodDispatch`]，调用时先取调用点的拦截链；
//! 没有匹配的通知时直接调用目标。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;

use crate::chain::{InterceptorChainBuilder, MethodInvocation};
use crate::joinpoint::{InvocationResult, JoinPoint, MethodDispatch, MethodSignature, Value};

pub struct AopProxy {
    bean_name: String,
    target: Arc<dyn MethodDispatch>,
    methods: Vec<MethodSignature>,
    by_name: HashMap<String, usize>,
    chains: Arc<InterceptorChainBuilder>,
}

impl AopProxy {
    pub fn new(
        bean_name: impl Into<String>,
        target: Arc<dyn MethodDispatch>,
        chains: Arc<InterceptorChainBuilder>,
    ) -> Self {
        let methods = target.methods();
        let mut by_name = HashMap::new();
        for (index, method) in methods.iter().enumerate() {
            by_name.entry(method.name.clone()).or_insert(index);
        }
        Self {
            bean_name: bean_name.into(),
            target,
            methods,
            by_name,
            chains,
        }
    }

    pub fn bean_name(&self) -> &str {
        &self.bean_name
    }

    /// 被代理的真实目标
    pub fn target(&self) -> &Arc<dyn MethodDispatch> {
        &self.target
    }

    /// 同名重载中第一个声明的签名
    pub fn signature(&self, method: &str) -> Option<&MethodSignature> {
        self.by_name.get(method).map(|&index| &self.methods[index])
    }

    /// 至少有一个通知匹配的方法
    pub fn advised_methods(&self) -> Vec<&MethodSignature> {
        self.methods
            .iter()
            .filter(|m| self.chains.registry().has_match(m))
            .collect()
    }

    fn call(&self, method: &MethodSignature, args: Arc<[Value]>) -> InvocationResult {
        match self.chains.chain_for(method) {
            Some(chain) => {
                let join_point = JoinPoint::new(Arc::clone(chain.signature()), args, Arc::clone(&self.target));
                MethodInvocation::new(chain, join_point).proceed()
            }
            None => self.target.dispatch(method, &args),
        }
    }
}

impl MethodDispatch for AopProxy {
    fn methods(&self) -> Vec<MethodSignature> {
        self.methods.clone()
    }

    fn dispatch(&self, method: &MethodSignature, args: &[Value]) -> InvocationResult {
        self.call(method, Arc::from(args))
    }

    fn invoke(&self, method: &str, args: Vec<Value>) -> InvocationResult {
        let signature = self.signature(method).ok_or_else(|| {
            anyhow!("no method named '{}' on bean '{}'", method, self.bean_name)
        })?;
        self.call(signature, Arc::from(args))
    }
}

impl fmt::Debug for AopProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AopProxy")
            .field("bean_name", &self.bean_name)
            .field("methods", &self.methods.iter().map(|m| m.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use crate::joinpoint::{arg, current_join_point, value};
    use crate::pointcut::PointcutExpression;
    use crate::registry::{Advisor, AdvisorRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Inventory {
        calls: AtomicUsize,
    }

    impl MethodDispatch for Inventory {
        fn methods(&self) -> Vec<MethodSignature> {
            vec![
                MethodSignature::new("Inventory", "stock").with_params(["sku"]),
                MethodSignature::new("Inventory", "reserve").with_params(["sku", "qty"]),
            ]
        }

        fn dispatch(&self, method: &MethodSignature, args: &[Value]) -> InvocationResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let exposed = current_join_point().is_some();
            match method.name.as_str() {
                "stock" => Ok(value((arg::<String>(args, 0)?.len(), exposed))),
                "reserve" => Ok(value(*arg::<u32>(args, 1)?)),
                other => Err(anyhow!("unknown method {}", other)),
            }
        }
    }

    fn proxy() -> (AopProxy, Arc<InterceptorChainBuilder>) {
        let registry = Arc::new(AdvisorRegistry::new());
        registry.register(Advisor::new(
            "double",
            PointcutExpression::method("reserve").unwrap(),
            Advice::around(|pjp| {
                let first = pjp.proceed()?;
                let n = *first.downcast_ref::<u32>().ok_or_else(|| anyhow!("not a u32"))?;
                Ok(value(n * 2))
            }),
        ));
        let chains = Arc::new(InterceptorChainBuilder::new(registry));
        let target = Arc::new(Inventory {
            calls: AtomicUsize::new(0),
        });
        (AopProxy::new("inventory", target, Arc::clone(&chains)), chains)
    }

    #[test]
    fn test_advised_and_unadvised_methods() {
        let (proxy, chains) = proxy();
        assert_eq!(proxy.advised_methods().len(), 1);

        let reserved = proxy.invoke("reserve", vec![value("a".to_string()), value(3_u32)]).unwrap();
        assert_eq!(*reserved.downcast_ref::<u32>().unwrap(), 6);

        // 未被拦截的方法直接调用目标，也不暴露连接点
        let stock = proxy.invoke("stock", vec![value("abc".to_string())]).unwrap();
        assert_eq!(*stock.downcast_ref::<(usize, bool)>().unwrap(), (3, false));
        assert_eq!(chains.build_count(), 1);
    }

    struct Store;

    impl MethodDispatch for Store {
        fn methods(&self) -> Vec<MethodSignature> {
            vec![
                MethodSignature::new("Store", "put").with_params(["key"]),
                MethodSignature::new("Store", "put").with_params(["key", "value"]),
            ]
        }

        fn dispatch(&self, method: &MethodSignature, _args: &[Value]) -> InvocationResult {
            Ok(value(method.params.len()))
        }
    }

    #[test]
    fn test_overloads_resolve_to_first_by_name() {
        let registry = Arc::new(AdvisorRegistry::new());
        let chains = Arc::new(InterceptorChainBuilder::new(registry));
        let proxy = AopProxy::new("store", Arc::new(Store), chains);

        let by_name = proxy.invoke("put", vec![value("k".to_string())]).unwrap();
        assert_eq!(*by_name.downcast_ref::<usize>().unwrap(), 1);
        assert_eq!(proxy.signature("put").unwrap().params, vec!["key"]);

        let second = proxy.methods()[1].clone();
        let exact = proxy.dispatch(&second, &[value("k".to_string()), value(1)]).unwrap();
        assert_eq!(*exact.downcast_ref::<usize>().unwrap(), 2);
    }

    #[test]
    fn test_unknown_method() {
        let (proxy, _) = proxy();
        let err = proxy.invoke("restock", vec![]).unwrap_err();
        assert!(err.to_string().contains("restock"));
        assert!(proxy.signature("stock").is_some());
        assert_eq!(proxy.methods().len(), 2);
    }
}
