//! 连接点（JoinPoint）定义
//!
//! 连接点表示一次正在进行的方法调用：目标、方法签名、参数，以及（对环绕通知而言）
//! 继续执行拦截链的能力。它的生命周期就是这一次调用。

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;

use crate::chain::Proceed;

/// 被拦截方法的参数与返回值
pub type Value = Arc<dyn Any + Send + Sync>;

/// 一次方法调用的结果，调用期的失败是普通的 `anyhow::Error`
pub type InvocationResult = anyhow::Result<Value>;

/// 把任意值包装成 [`Value`]
pub fn value<T: Any + Send + Sync>(v: T) -> Value {
    Arc::new(v)
}

/// 按位置取出参数并转换为 `T`
pub fn arg<T: Any>(args: &[Value], index: usize) -> anyhow::Result<&T> {
    let raw = args
        .get(index)
        .ok_or_else(|| anyhow!("missing argument #{}", index))?;
    raw.downcast_ref::<T>().ok_or_else(|| {
        anyhow!(
            "argument #{} is not a '{}'",
            index,
            std::any::type_name::<T>()
        )
    })
}

/// 方法签名
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// 声明方法的类型名称
    pub declaring_type: String,
    pub name: String,
    /// 参数名称，用于通知的参数绑定
    pub params: Vec<String>,
}

impl MethodSignature {
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    /// `Type.method`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declaring_type, self.name)
    }

    /// 声明类型的最后一段路径（`app::svc::UserService` → `UserService`）
    pub fn simple_type_name(&self) -> &str {
        self.declaring_type
            .rsplit("::")
            .next()
            .unwrap_or(&self.declaring_type)
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p == name)
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.declaring_type, self.name, self.params.join(", "))
    }
}

/// 可被拦截的目标
///
/// Rust 没有运行时动态代理，目标自己列出方法并把 `(方法, 参数)` 分派到真实代码；
/// `AopProxy` 实现同一个 trait，因此可以无缝替换目标。
///
/// ```ignore
/// impl MethodDispatch for ServiceImpl {
///     fn methods(&self) -> Vec<MethodSignature> {
///         vec![MethodSignature::new("ServiceImpl", "do_work").with_params(["n"])]
///     }
///
///     fn dispatch(&self, method: &MethodSignature, args: &[Value]) -> InvocationResult {
///         match method.name.as_str() {
///             "do_work" => Ok(value(self.do_work(*arg::<i32>(args, 0)?))),
///             other => Err(anyhow!("unknown method '{}'", other)),
///         }
///     }
/// }
/// ```
pub trait MethodDispatch: Send + Sync {
    fn methods(&self) -> Vec<MethodSignature>;

    fn dispatch(&self, method: &MethodSignature, args: &[Value]) -> InvocationResult;

    /// 按方法名调用
    ///
    /// 只按名称查找，同名重载取 `methods()` 中第一个；其余重载通过 `dispatch` 传入完整签名调用
    fn invoke(&self, method: &str, args: Vec<Value>) -> InvocationResult {
        let signature = self
            .methods()
            .into_iter()
            .find(|m| m.name == method)
            .ok_or_else(|| anyhow!("no method named '{}'", method))?;
        self.dispatch(&signature, &args)
    }
}

/// 连接点信息
#[derive(Clone)]
pub struct JoinPoint {
    signature: Arc<MethodSignature>,
    args: Arc<[Value]>,
    target: Arc<dyn MethodDispatch>,
    started_at: Instant,
}

impl JoinPoint {
    pub fn new(signature: Arc<MethodSignature>, args: Arc<[Value]>, target: Arc<dyn MethodDispatch>) -> Self {
        Self {
            signature,
            args,
            target,
            started_at: Instant::now(),
        }
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    pub fn method_name(&self) -> &str {
        &self.signature.name
    }

    pub fn declaring_type(&self) -> &str {
        &self.signature.declaring_type
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// 尝试按位置获取参数
    pub fn arg<T: Any>(&self, index: usize) -> Option<&T> {
        self.args.get(index)?.downcast_ref::<T>()
    }

    /// 按参数名称获取参数
    pub fn arg_named<T: Any>(&self, name: &str) -> Option<&T> {
        self.arg(self.signature.param_index(name)?)
    }

    /// 被代理的真实目标
    pub fn target(&self) -> &Arc<dyn MethodDispatch> {
        &self.target
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl fmt::Debug for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("signature", &self.signature.qualified_name())
            .field("args", &self.args.len())
            .field("started_at", &self.started_at)
            .finish()
    }
}

impl fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature.qualified_name())
    }
}

/// 环绕通知看到的连接点
///
/// `proceed()` 继续执行剩余的拦截链，可以不调用（短路）或调用多次（重试）
pub struct ProceedingJoinPoint<'a> {
    join_point: &'a JoinPoint,
    next: Proceed<'a>,
}

impl<'a> ProceedingJoinPoint<'a> {
    pub(crate) fn new(join_point: &'a JoinPoint, next: Proceed<'a>) -> Self {
        Self { join_point, next }
    }

    pub fn proceed(&self) -> InvocationResult {
        self.next.invoke()
    }

    pub fn join_point(&self) -> &JoinPoint {
        self.join_point
    }
}

impl Deref for ProceedingJoinPoint<'_> {
    type Target = JoinPoint;

    fn deref(&self) -> &JoinPoint {
        self.join_point
    }
}

impl fmt::Debug for ProceedingJoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProceedingJoinPoint")
            .field("join_point", self.join_point)
            .field("remaining", &self.next.remaining())
            .finish()
    }
}

thread_local! {
    static CURRENT: RefCell<Option<JoinPoint>> = const { RefCell::new(None) };
}

/// 当前线程上正在执行的被拦截调用
///
/// 只在拦截链最内层到目标方法返回之间可见；嵌套调用结束后恢复外层的值
pub fn current_join_point() -> Option<JoinPoint> {
    CURRENT.with(|current| current.borrow().clone())
}

/// 暴露当前连接点，drop 时恢复之前的值（包括展开 panic 时）
pub(crate) struct ExposedJoinPoint {
    previous: Option<JoinPoint>,
}

impl ExposedJoinPoint {
    pub(crate) fn expose(join_point: &JoinPoint) -> Self {
        let previous = CURRENT.with(|current| current.replace(Some(join_point.clone())));
        Self { previous }
    }
}

impl Drop for ExposedJoinPoint {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let _ = CURRENT.try_with(|current| *current.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl MethodDispatch for Echo {
        fn methods(&self) -> Vec<MethodSignature> {
            vec![MethodSignature::new("app::Echo", "echo").with_params(["text"])]
        }

        fn dispatch(&self, _method: &MethodSignature, args: &[Value]) -> InvocationResult {
            Ok(value(arg::<String>(args, 0)?.clone()))
        }
    }

    fn join_point(name: &str) -> JoinPoint {
        JoinPoint::new(
            Arc::new(MethodSignature::new("app::Echo", name).with_params(["text"])),
            Arc::from(vec![value(String::from("hi"))]),
            Arc::new(Echo),
        )
    }

    #[test]
    fn test_signature_names() {
        let sig = MethodSignature::new("app::svc::UserService", "find").with_params(["id"]);
        assert_eq!(sig.simple_type_name(), "UserService");
        assert_eq!(sig.qualified_name(), "app::svc::UserService.find");
        assert_eq!(sig.to_string(), "app::svc::UserService.find(id)");
        assert_eq!(sig.param_index("id"), Some(0));
    }

    #[test]
    fn test_invoke_by_name() {
        let result = Echo.invoke("echo", vec![value(String::from("x"))]).unwrap();
        assert_eq!(result.downcast_ref::<String>().unwrap(), "x");
        assert!(Echo.invoke("missing", vec![]).is_err());
        assert!(Echo.invoke("echo", vec![value(1_u8)]).is_err());
    }

    #[test]
    fn test_args_by_position_and_name() {
        let jp = join_point("echo");
        assert_eq!(jp.arg::<String>(0).map(String::as_str), Some("hi"));
        assert_eq!(jp.arg_named::<String>("text").map(String::as_str), Some("hi"));
        assert!(jp.arg::<i32>(0).is_none());
        assert!(jp.arg_named::<String>("other").is_none());
    }

    #[test]
    fn test_exposure_restores_previous() {
        assert!(current_join_point().is_none());
        let outer = join_point("outer");
        let inner = join_point("inner");
        {
            let _outer = ExposedJoinPoint::expose(&outer);
            {
                let _inner = ExposedJoinPoint::expose(&inner);
                assert_eq!(current_join_point().unwrap().method_name(), "inner");
            }
            assert_eq!(current_join_point().unwrap().method_name(), "outer");
        }
        assert!(current_join_point().is_none());
    }

    #[test]
    fn test_exposure_restored_after_panic() {
        let jp = join_point("boom");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _exposed = ExposedJoinPoint::expose(&jp);
            panic!("target failed");
        }));
        assert!(result.is_err());
        assert!(current_join_point().is_none());
    }
}
