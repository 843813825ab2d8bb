//! 生命周期钩子
//!
//! 容器在固定的阶段边界调用这些单方法契约：
//!
//! | 契约                        | 调用时机                                       |
//! |-----------------------------|------------------------------------------------|
//! | [`BeanFactoryPostProcessor`]| PostProcessed 阶段，按 `order()` 升序          |
//! | [`BeanPostProcessor`]       | 每个 Bean 初始化前后；销毁前                   |
//! | [`InitializingBean`]        | 依赖注入完成之后，init-method 之前             |
//! | [`DisposableBean`]          | 关闭时，按实例化的逆序                         |
//! | [`LifecycleListener`]       | Ready 阶段，就绪事件前后                       |
//!
//! Bean 通过 `BeanDefinitionBuilder` 上的能力声明（例如 `bean_post_processor()`）
//! 让容器知道自己实现了哪个契约。

use crate::bean::{BeanDefinition, Instance};
use crate::bean_factory::DefaultListableBeanFactory;
use crate::constants::DEFAULT_ORDER;
use crate::context::ApplicationContext;
use crate::error::ContainerResult;

/// BeanPostProcessor trait
///
/// 在 Bean 初始化的不同阶段提供钩子，允许修改或替换 Bean 实例。
/// 返回的实例会以原名称写回实例表，AOP 代理就是这样替换目标的。
///
/// # 示例
///
/// ```ignore
/// struct TracingPostProcessor;
///
/// impl BeanPostProcessor for TracingPostProcessor {
///     fn post_process_after_initialization(
///         &self,
///         bean: Instance,
///         definition: &BeanDefinition,
///     ) -> ContainerResult<Instance> {
///         tracing::info!("Initialized: {}", definition.name());
///         Ok(bean)
///     }
/// }
/// ```
pub trait BeanPostProcessor: Send + Sync {
    /// 在 `after_properties_set` 与 init-method 之前调用
    fn post_process_before_initialization(
        &self,
        bean: Instance,
        _definition: &BeanDefinition,
    ) -> ContainerResult<Instance> {
        Ok(bean)
    }

    /// 在 init-method 之后调用
    fn post_process_after_initialization(
        &self,
        bean: Instance,
        _definition: &BeanDefinition,
    ) -> ContainerResult<Instance> {
        Ok(bean)
    }

    /// 在销毁回调之前调用，失败只记录日志
    fn post_process_before_destroy(
        &self,
        _bean: &Instance,
        _definition: &BeanDefinition,
    ) -> ContainerResult<()> {
        Ok(())
    }

    /// 获取处理器的名称（用于日志和调试）
    fn name(&self) -> &str {
        "BeanPostProcessor"
    }

    /// 获取处理器的优先级（数字越小优先级越高）
    fn order(&self) -> i32 {
        DEFAULT_ORDER
    }
}

/// 注册表级后置处理器
///
/// 在任何普通 Bean 实例化之前运行，可以新增、修改或删除 Bean 定义
pub trait BeanFactoryPostProcessor: Send + Sync {
    fn post_process_bean_factory(&self, bean_factory: &DefaultListableBeanFactory) -> ContainerResult<()>;

    fn name(&self) -> &str {
        "BeanFactoryPostProcessor"
    }

    fn order(&self) -> i32 {
        DEFAULT_ORDER
    }
}

/// 依赖注入完成后的初始化回调
pub trait InitializingBean: Send + Sync {
    fn after_properties_set(&self) -> ContainerResult<()>;
}

/// 销毁回调
pub trait DisposableBean: Send + Sync {
    fn on_destroy(&self) -> ContainerResult<()>;
}

/// 容器就绪回调
pub trait LifecycleListener: Send + Sync {
    /// 就绪事件发布之前调用
    fn on_ready(&self, _context: &ApplicationContext) -> ContainerResult<()> {
        Ok(())
    }

    /// 就绪事件发布之后调用
    fn on_completed(&self, _context: &ApplicationContext) -> ContainerResult<()> {
        Ok(())
    }
}
