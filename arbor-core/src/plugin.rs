//! 插件机制
//!
//! 插件在 Preparing 阶段注册额外的定义，在 Ready 之后与关闭时收到回调

use std::sync::Arc;

use crate::context::ApplicationContext;
use crate::error::ContainerResult;

/// 应用插件 trait
///
/// 实现此 trait 以创建可插拔的容器模块
pub trait ApplicationPlugin: Send + Sync {
    /// 插件名称
    fn name(&self) -> &str;

    /// 插件优先级（数字越小优先级越高）
    fn priority(&self) -> i32 {
        100
    }

    /// 配置阶段 - 在候选组件加载之前执行
    ///
    /// 用于注册额外的 Bean 定义、后置处理器等
    fn configure(&self, _context: &ApplicationContext) -> ContainerResult<()> {
        Ok(())
    }

    /// 容器就绪之后执行
    fn on_ready(&self, _context: &ApplicationContext) -> ContainerResult<()> {
        Ok(())
    }

    /// 关闭阶段，在单例销毁之前按优先级逆序执行，失败只记录日志
    fn on_shutdown(&self, _context: &ApplicationContext) -> ContainerResult<()> {
        Ok(())
    }
}

/// 插件注册表
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn ApplicationPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册插件，保持按优先级排序（同优先级按注册顺序）
    pub fn register(&mut self, plugin: Arc<dyn ApplicationPlugin>) {
        tracing::debug!("Registering plugin: {} (priority {})", plugin.name(), plugin.priority());
        self.plugins.push(plugin);
        self.plugins.sort_by_key(|p| p.priority());
    }

    pub fn plugins(&self) -> &[Arc<dyn ApplicationPlugin>] {
        &self.plugins
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub(crate) fn configure_all(&self, context: &ApplicationContext) -> ContainerResult<()> {
        for plugin in &self.plugins {
            tracing::info!("Configuring plugin: {}", plugin.name());
            plugin.configure(context)?;
        }
        Ok(())
    }

    pub(crate) fn ready_all(&self, context: &ApplicationContext) -> ContainerResult<()> {
        for plugin in &self.plugins {
            tracing::debug!("Notifying plugin '{}' of container readiness", plugin.name());
            plugin.on_ready(context)?;
        }
        Ok(())
    }

    pub(crate) fn shutdown_all(&self, context: &ApplicationContext) {
        // 逆序关闭
        for plugin in self.plugins.iter().rev() {
            tracing::info!("Shutting down plugin: {}", plugin.name());
            if let Err(e) = plugin.on_shutdown(context) {
                tracing::error!("Failed to shutdown plugin {}: {}", plugin.name(), e);
            }
        }
    }
}

/// 用于全局收集插件的宏
#[macro_export]
macro_rules! submit_plugin {
    ($plugin_type:ty) => {
        $crate::inventory::submit! {
            $crate::plugin::PluginSubmission {
                create: || ::std::sync::Arc::new(<$plugin_type>::default())
            }
        }
    };
}

/// 插件提交结构
pub struct PluginSubmission {
    pub create: fn() -> Arc<dyn ApplicationPlugin>,
}

inventory::collect!(PluginSubmission);

/// 从全局注册表加载所有插件
pub fn load_plugins() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    for submission in inventory::iter::<PluginSubmission> {
        registry.register((submission.create)());
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, i32);

    impl ApplicationPlugin for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn priority(&self) -> i32 {
            self.1
        }
    }

    #[test]
    fn test_registry_orders_by_priority() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Named("web", 200)));
        registry.register(Arc::new(Named("aop", 50)));
        registry.register(Arc::new(Named("metrics", 200)));

        let names: Vec<_> = registry.plugins().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["aop", "web", "metrics"]);
    }
}
