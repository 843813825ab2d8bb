/// 核心组件常量定义
///
/// 内置 Bean 的名称与衍生 Bean 的名称前缀，容器和插件共用同一份定义

/// BeanFactory 内置 Bean 名称
pub const BEAN_FACTORY_BEAN_NAME: &str = "beanFactory";

/// Environment 内置 Bean 名称
pub const ENVIRONMENT_BEAN_NAME: &str = "environment";

/// EventPublisher 内置 Bean 名称
pub const EVENT_PUBLISHER_BEAN_NAME: &str = "eventPublisher";

/// 所有内置 Bean 名称
pub const BUILT_IN_BEAN_NAMES: &[&str] = &[
    BEAN_FACTORY_BEAN_NAME,
    ENVIRONMENT_BEAN_NAME,
    EVENT_PUBLISHER_BEAN_NAME,
];

/// FactoryBean 本身的 Bean 名称前缀
pub const FACTORY_BEAN_PREFIX: &str = "&";

/// 延迟代理的真实目标 Bean 名称前缀
pub const LAZY_PROXY_SOURCE_PREFIX: &str = "lazyProxySource.";

/// 作用域代理的真实目标 Bean 名称前缀
pub const SCOPED_TARGET_PREFIX: &str = "scopedTarget.";

/// 默认排序值（数字越小优先级越高）
pub const DEFAULT_ORDER: i32 = 1000;

/// 最高优先级
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// 最低优先级
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// 检查给定的名称是否为内置 Bean
pub fn is_built_in_bean_name(name: &str) -> bool {
    BUILT_IN_BEAN_NAMES.contains(&name)
}

/// 去掉 FactoryBean 名称前缀
pub fn strip_factory_bean_prefix(name: &str) -> &str {
    name.trim_start_matches(FACTORY_BEAN_PREFIX)
}
