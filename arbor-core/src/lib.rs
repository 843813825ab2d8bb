// arbor-core: 类似 Spring 的 Bean 容器
//
// 提供类型安全的依赖注入功能，支持：
// - 单例、原型与作用域代理
// - 构造注入与字段注入（含循环引用的提前暴露）
// - 条件注册、FactoryBean、工厂方法、延迟代理
// - 生命周期管理（后置处理器、init/destroy 回调、就绪与关闭事件）

pub mod bean;
pub mod bean_factory;
pub mod component;
pub mod condition;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod event;
pub mod lazy;
pub mod lifecycle;
pub mod logging;
pub mod plugin;
pub mod scope;
pub mod utils;

// 重新导出常用类型
pub use bean::{Autowired, BeanDefinition, BeanDefinitionBuilder, BeanOrigin, Caster, FactoryBean, InjectionPoint, Instance};
pub use bean_factory::{
    BeanFactory, BeanFactoryExt, BeanResolver, ConfigurableBeanFactory, DefaultListableBeanFactory, InstanceState,
    ListableBeanFactory,
};
pub use component::{Candidate, CandidateSource, ComponentFilter, ComponentRegistration, InventoryCandidateSource, StaticCandidateSource};
pub use condition::{
    Condition, ConditionContext, ConditionalResolver, OnBean, OnBeanType, OnMissingBean, OnMissingBeanType,
    OnProfile, OnProperty,
};
pub use config::{
    ConfigValue, ContainerSettings, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use constants::*;
pub use context::{ApplicationContext, ApplicationContextBuilder, Container, ContainerState};
pub use error::{ApplicationError, ApplicationResult, ContainerError, ContainerResult};
pub use event::{
    ApplicationEventMulticaster, ApplicationEventPublisher, ContainerClosedEvent, ContainerReadyEvent, ErrorHandler,
    Event, EventListener, SimpleApplicationEventMulticaster, TypedEventListener,
};
pub use lazy::{Lazy, Scoped};
pub use lifecycle::{
    BeanFactoryPostProcessor, BeanPostProcessor, DisposableBean, InitializingBean, LifecycleListener,
};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use scope::Scope;

// 导出 inventory，供宏使用
pub use inventory;

// 导出插件相关
pub use plugin::{load_plugins, ApplicationPlugin, PluginRegistry, PluginSubmission};

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::bean::{Autowired, BeanDefinition, FactoryBean, Instance};
    pub use crate::bean_factory::{
        BeanFactory, BeanFactoryExt, BeanResolver, ConfigurableBeanFactory, DefaultListableBeanFactory,
        ListableBeanFactory,
    };
    pub use crate::condition::{Condition, OnBean, OnBeanType, OnMissingBean, OnMissingBeanType, OnProfile, OnProperty};
    pub use crate::config::{ConfigValue, Environment, MapPropertySource, PropertySource, TomlPropertySource};
    pub use crate::context::{ApplicationContext, Container, ContainerState};
    pub use crate::error::{ContainerError, ContainerResult};
    pub use crate::event::{Event, EventListener, TypedEventListener};
    pub use crate::lazy::{Lazy, Scoped};
    pub use crate::lifecycle::{
        BeanFactoryPostProcessor, BeanPostProcessor, DisposableBean, InitializingBean, LifecycleListener,
    };
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::plugin::ApplicationPlugin;
    pub use crate::scope::Scope;
    pub use crate::utils;
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, Context};
}
