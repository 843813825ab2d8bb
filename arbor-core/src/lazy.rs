//! 间接引用句柄
//!
//! `Lazy<T>` 把目标的解析推迟到第一次 `get()`，用来打破构造注入的循环依赖；
//! `Scoped<T>` 每次 `get()` 都经由容器重新物化目标。

use std::fmt;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;

use crate::bean_factory::{BeanFactoryExt, DefaultListableBeanFactory};
use crate::error::{ContainerError, ContainerResult};

enum Target {
    Named(String),
    ByType,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Named(name) => write!(f, "'{}'", name),
            Target::ByType => f.write_str("<by type>"),
        }
    }
}

fn upgrade(factory: &Weak<DefaultListableBeanFactory>) -> ContainerResult<Arc<DefaultListableBeanFactory>> {
    factory
        .upgrade()
        .ok_or_else(|| ContainerError::IllegalState("bean factory has been dropped".to_string()))
}

fn resolve<T: ?Sized + 'static>(
    factory: &Weak<DefaultListableBeanFactory>,
    target: &Target,
) -> ContainerResult<Arc<T>> {
    let factory = upgrade(factory)?;
    match target {
        Target::Named(name) => factory.get_bean_named::<T>(name),
        Target::ByType => factory.get_bean_by_type::<T>(),
    }
}

/// 延迟解析的依赖
///
/// 第一次 `get()` 时按完整的解析算法获取目标并缓存，之后总是返回同一个实例
pub struct Lazy<T: ?Sized> {
    target: Target,
    factory: Weak<DefaultListableBeanFactory>,
    resolved: OnceCell<Arc<T>>,
}

impl<T: ?Sized + 'static> Lazy<T> {
    pub(crate) fn named(name: impl Into<String>, factory: Weak<DefaultListableBeanFactory>) -> Self {
        Self {
            target: Target::Named(name.into()),
            factory,
            resolved: OnceCell::new(),
        }
    }

    pub(crate) fn by_type(factory: Weak<DefaultListableBeanFactory>) -> Self {
        Self {
            target: Target::ByType,
            factory,
            resolved: OnceCell::new(),
        }
    }

    /// 获取目标，首次调用时解析
    pub fn get(&self) -> ContainerResult<Arc<T>> {
        self.resolved
            .get_or_try_init(|| {
                tracing::debug!("Resolving lazy reference to {}", self.target);
                resolve::<T>(&self.factory, &self.target)
            })
            .map(Arc::clone)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// 目标 Bean 名称，按类型解析时为 `None`
    pub fn target_name(&self) -> Option<&str> {
        match &self.target {
            Target::Named(name) => Some(name),
            Target::ByType => None,
        }
    }
}

impl<T: ?Sized> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("target", &self.target.to_string())
            .field("resolved", &self.resolved.get().is_some())
            .finish()
    }
}

/// 作用域代理句柄
///
/// 目标定义为原型作用域，每次 `get()` 都会得到容器新物化的实例
pub struct Scoped<T: ?Sized> {
    target: String,
    factory: Weak<DefaultListableBeanFactory>,
    _type: std::marker::PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + 'static> Scoped<T> {
    pub(crate) fn named(name: impl Into<String>, factory: Weak<DefaultListableBeanFactory>) -> Self {
        Self {
            target: name.into(),
            factory,
            _type: std::marker::PhantomData,
        }
    }

    pub fn get(&self) -> ContainerResult<Arc<T>> {
        upgrade(&self.factory)?.get_bean_named::<T>(&self.target)
    }

    pub fn target_name(&self) -> &str {
        &self.target
    }
}

impl<T: ?Sized> fmt::Debug for Scoped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scoped").field("target", &self.target).finish()
    }
}
