//! 应用上下文
//!
//! [`ApplicationContext`] 驱动容器的生命周期状态机：
//!
//! ```text
//! Unstarted → Preparing → DefinitionsLoaded → PostProcessed → Instantiating → Wired → Ready → Closed
//! ```
//!
//! `refresh()` 与 `close()` 在同一把互斥锁下串行执行。Ready 之前任何阶段失败，
//! 都会先销毁已经装配完成的单例，再把原始错误返回给调用方。

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::bean::{BeanDefinition, Instance};
use crate::bean_factory::{
    BeanFactory, BeanFactoryExt, ConfigurableBeanFactory, DefaultListableBeanFactory, ListableBeanFactory,
};
use crate::component::{is_accepted, CandidateSource, ComponentFilter, InventoryCandidateSource};
use crate::condition::ConditionalResolver;
use crate::config::{ContainerSettings, Environment, PropertySource};
use crate::constants::{
    BEAN_FACTORY_BEAN_NAME, ENVIRONMENT_BEAN_NAME, EVENT_PUBLISHER_BEAN_NAME, HIGHEST_PRECEDENCE,
};
use crate::error::{ContainerError, ContainerResult};
use crate::event::{
    panic_message, ApplicationEventPublisher, ContainerClosedEvent, ContainerReadyEvent, Event, EventListener,
    SimpleApplicationEventMulticaster,
};
use crate::lifecycle::{BeanFactoryPostProcessor, BeanPostProcessor, LifecycleListener};
use crate::logging::LoggingConfig;
use crate::plugin::{ApplicationPlugin, PluginRegistry};

/// 容器 trait - 定义依赖注入容器的核心接口
pub trait Container: Send + Sync {
    /// 注册 Bean 定义
    fn register(&self, definition: BeanDefinition) -> ContainerResult<()>;

    /// 通过名称获取 Bean
    fn get_bean(&self, name: &str) -> ContainerResult<Instance>;

    /// 通过类型获取 Bean
    fn get_bean_by_type<T: ?Sized + 'static>(&self) -> ContainerResult<Arc<T>>;

    /// 检查是否包含指定名称的 Bean
    fn contains_bean(&self, name: &str) -> bool;

    /// 检查是否包含指定类型的 Bean
    fn contains_bean_by_type<T: ?Sized + 'static>(&self) -> bool;

    /// 获取所有 Bean 的名称
    fn bean_names(&self) -> Vec<String>;
}

/// 容器生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Unstarted,
    Preparing,
    DefinitionsLoaded,
    PostProcessed,
    Instantiating,
    Wired,
    Ready,
    Closed,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 内置的注册表后置处理器：展开 FactoryBean、延迟代理与作用域代理定义
struct DefinitionExpansionPostProcessor;

impl BeanFactoryPostProcessor for DefinitionExpansionPostProcessor {
    fn post_process_bean_factory(&self, bean_factory: &DefaultListableBeanFactory) -> ContainerResult<()> {
        let expanded = bean_factory.expand_definitions()?;
        if expanded > 0 {
            tracing::debug!("Expanded {} bean definition(s)", expanded);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "DefinitionExpansionPostProcessor"
    }

    fn order(&self) -> i32 {
        HIGHEST_PRECEDENCE
    }
}

/// 应用上下文 - Container 的默认实现
///
/// ApplicationContext 是框架的核心，持有 BeanFactory、Environment 和 EventPublisher。
///
/// 内置的 `beanFactory` 单例持有工厂自身的强引用，这个环要靠销毁单例来断开；
/// 最后一个引用被释放时若尚未关闭，会自动执行一次 [`close`](Self::close)。
pub struct ApplicationContext {
    app_name: String,

    /// Bean 工厂 - 负责 Bean 的创建和管理
    bean_factory: Arc<DefaultListableBeanFactory>,

    /// 配置环境
    environment: Arc<Environment>,

    /// 事件发布器
    event_publisher: Arc<ApplicationEventPublisher>,

    state: RwLock<ContainerState>,

    /// refresh / close 的互斥边界
    lifecycle_lock: Mutex<()>,

    candidate_sources: Vec<Box<dyn CandidateSource>>,
    include_filters: Vec<ComponentFilter>,
    exclude_filters: Vec<ComponentFilter>,

    /// 以实例形式注册的 Bean 工厂后置处理器
    bean_factory_post_processors: RwLock<Vec<Arc<dyn BeanFactoryPostProcessor>>>,

    plugins: PluginRegistry,
}

impl ApplicationContext {
    /// 构建器模式创建上下文
    pub fn builder() -> ApplicationContextBuilder {
        ApplicationContextBuilder::new()
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn state(&self) -> ContainerState {
        *self.state.read()
    }

    fn set_state(&self, state: ContainerState) {
        let mut current = self.state.write();
        tracing::debug!("Container state: {} -> {}", *current, state);
        *current = state;
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ContainerState::Ready
    }

    /// 获取内部的 BeanFactory
    pub fn bean_factory(&self) -> &Arc<DefaultListableBeanFactory> {
        &self.bean_factory
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn event_publisher(&self) -> &Arc<ApplicationEventPublisher> {
        &self.event_publisher
    }

    /// 发布事件
    pub fn publish_event(&self, event: Arc<dyn Event>) {
        self.event_publisher.publish_event(event);
    }

    /// 注册事件监听器
    pub fn register_listener(&self, listener: Arc<dyn EventListener>) {
        self.event_publisher.add_listener(listener);
    }

    /// 注册 BeanPostProcessor 实例
    pub fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        self.bean_factory.add_bean_post_processor(processor);
    }

    /// 注册 BeanFactoryPostProcessor 实例，在 PostProcessed 阶段与定义形式的处理器一起按 order 执行
    pub fn add_bean_factory_post_processor(&self, processor: Arc<dyn BeanFactoryPostProcessor>) {
        tracing::debug!(
            "Registered BeanFactoryPostProcessor '{}' with order {}",
            processor.name(),
            processor.order()
        );
        self.bean_factory_post_processors.write().push(processor);
    }

    /// 按名称获取 Bean 并转换为 `T`
    pub fn get_bean_named<T: ?Sized + 'static>(&self, name: &str) -> ContainerResult<Arc<T>> {
        self.bean_factory.get_bean_named::<T>(name)
    }

    pub fn get_beans_of_type<T: ?Sized + 'static>(&self) -> ContainerResult<Vec<Arc<T>>> {
        self.bean_factory.get_beans_of_type::<T>()
    }

    // ========== 生命周期 ==========

    /// 启动容器
    ///
    /// 已就绪的容器再次调用是无操作；已关闭的容器返回 `IllegalState`
    pub fn refresh(&self) -> ContainerResult<()> {
        let _lifecycle = self.lifecycle_lock.lock();
        match self.state() {
            ContainerState::Unstarted => {}
            ContainerState::Ready => {
                tracing::info!("Application context '{}' is already refreshed", self.app_name);
                return Ok(());
            }
            ContainerState::Closed => {
                return Err(ContainerError::IllegalState(format!(
                    "application context '{}' is closed and cannot be refreshed",
                    self.app_name
                )));
            }
            other => {
                return Err(ContainerError::IllegalState(format!(
                    "application context '{}' is in state {}",
                    self.app_name, other
                )));
            }
        }

        let started = Instant::now();
        tracing::info!("Refreshing application context '{}'", self.app_name);

        if let Err(e) = self.do_refresh(started) {
            tracing::error!(
                "Application context '{}' failed during {}: {}",
                self.app_name,
                self.state(),
                e
            );
            self.bean_factory.destroy_singletons();
            self.set_state(ContainerState::Closed);
            return Err(e);
        }
        Ok(())
    }

    fn do_refresh(&self, started: Instant) -> ContainerResult<()> {
        self.set_state(ContainerState::Preparing);
        self.prepare()?;

        self.set_state(ContainerState::DefinitionsLoaded);
        self.load_definitions()?;

        self.set_state(ContainerState::PostProcessed);
        self.post_process_definitions()?;

        self.set_state(ContainerState::Instantiating);
        self.instantiate_singletons()?;

        self.set_state(ContainerState::Wired);
        self.wire()?;

        self.set_state(ContainerState::Ready);
        self.finish_refresh(started)
    }

    /// Preparing：内置定义与插件配置
    fn prepare(&self) -> ContainerResult<()> {
        let publisher = Arc::clone(&self.event_publisher);
        let environment = Arc::clone(&self.environment);
        self.bean_factory.register_bean_definition(
            BeanDefinition::supplier(BEAN_FACTORY_BEAN_NAME, |resolver| {
                resolver
                    .bean_factory()
                    .handle()
                    .ok_or_else(|| ContainerError::IllegalState("bean factory has been dropped".to_string()))
            })
            .build(),
        )?;
        self.bean_factory
            .register_bean_definition(BeanDefinition::instance(ENVIRONMENT_BEAN_NAME, environment).build())?;
        self.bean_factory
            .register_bean_definition(BeanDefinition::instance(EVENT_PUBLISHER_BEAN_NAME, publisher).build())?;
        tracing::debug!("Built-in bean definitions registered");

        self.plugins.configure_all(self)
    }

    /// DefinitionsLoaded：候选组件筛选与注册，然后评估条件定义
    fn load_definitions(&self) -> ContainerResult<()> {
        let mut registered = 0;
        for source in &self.candidate_sources {
            let candidates = source.candidates();
            tracing::debug!("Candidate source '{}' supplied {} candidate(s)", source.name(), candidates.len());
            for candidate in candidates {
                if !is_accepted(&candidate, &self.include_filters, &self.exclude_filters) {
                    tracing::debug!("Candidate '{}' filtered out", candidate.type_name);
                    continue;
                }
                self.bean_factory.register_bean_definition(candidate.definition)?;
                registered += 1;
            }
        }
        if !self.candidate_sources.is_empty() {
            tracing::info!("Registered {} candidate component(s)", registered);
        }

        let admitted = ConditionalResolver::new(&self.bean_factory, &self.environment).resolve()?;
        tracing::info!(
            "Bean definitions loaded: {} registered, {} conditional admitted",
            self.bean_factory.bean_definition_count(),
            admitted
        );
        Ok(())
    }

    /// PostProcessed：展开 → 用户后置处理器 → 条件重评 → 再次展开
    fn post_process_definitions(&self) -> ContainerResult<()> {
        let expansion = DefinitionExpansionPostProcessor;
        expansion.post_process_bean_factory(&self.bean_factory)?;

        let mut processors = self.bean_factory_post_processors.read().clone();
        processors.extend(self.bean_factory.bean_factory_post_processors()?);
        processors.sort_by_key(|p| p.order());

        if !processors.is_empty() {
            tracing::info!("Invoking {} BeanFactoryPostProcessor(s)", processors.len());
        }
        for processor in &processors {
            tracing::debug!("  ├─ {} (order: {})", processor.name(), processor.order());
            processor.post_process_bean_factory(&self.bean_factory)?;
        }

        let admitted = ConditionalResolver::new(&self.bean_factory, &self.environment).resolve()?;
        if admitted > 0 {
            tracing::debug!("{} conditional definition(s) admitted after post-processing", admitted);
        }
        expansion.post_process_bean_factory(&self.bean_factory)?;

        let discarded = self.bean_factory.discard_pending_conditionals();
        if !discarded.is_empty() {
            tracing::info!("{} conditional bean definition(s) not admitted", discarded.len());
        }
        Ok(())
    }

    /// Instantiating：冻结注册表，先创建后置处理器，再创建所有非延迟单例
    fn instantiate_singletons(&self) -> ContainerResult<()> {
        self.bean_factory.freeze_configuration();

        let processors = self.bean_factory.register_bean_post_processors()?;
        if processors > 0 {
            tracing::info!("Registered {} BeanPostProcessor(s)", processors);
        }

        self.bean_factory.begin_deferring_lazy_injection();
        let instantiated = self.bean_factory.preinstantiate_singletons()?;
        tracing::info!("Instantiated {} singleton bean(s)", instantiated);
        Ok(())
    }

    /// Wired：解析推迟的注入点
    fn wire(&self) -> ContainerResult<()> {
        let resolved = self.bean_factory.resolve_deferred_injections()?;
        if resolved > 0 {
            tracing::debug!("Resolved {} deferred injection point(s)", resolved);
        }
        Ok(())
    }

    /// Ready：注册监听器，回调生命周期监听器，广播就绪事件
    fn finish_refresh(&self, started: Instant) -> ContainerResult<()> {
        for listener in self.bean_factory.get_beans_of_type::<dyn EventListener>()? {
            tracing::debug!("Registering event listener: {}", listener.listener_name());
            self.event_publisher.add_listener(listener);
        }

        let lifecycle_listeners = self.bean_factory.get_beans_of_type::<dyn LifecycleListener>()?;
        for listener in &lifecycle_listeners {
            listener.on_ready(self)?;
        }

        self.event_publisher.publish(ContainerReadyEvent::new(
            self.app_name.clone(),
            self.bean_factory.singleton_count(),
            started.elapsed(),
        ));

        for listener in &lifecycle_listeners {
            listener.on_completed(self)?;
        }
        self.plugins.ready_all(self)?;

        tracing::info!(
            "Application context '{}' started in {:.3}s with {} singleton bean(s)",
            self.app_name,
            started.elapsed().as_secs_f64(),
            self.bean_factory.singleton_count()
        );
        Ok(())
    }

    /// 关闭容器
    ///
    /// 发布关闭事件，通知插件，再按实例化逆序销毁单例。可重复调用。
    pub fn close(&self) {
        let _lifecycle = self.lifecycle_lock.lock();
        match self.state() {
            ContainerState::Closed => {
                tracing::debug!("Application context '{}' is already closed", self.app_name);
                return;
            }
            ContainerState::Unstarted => {
                self.set_state(ContainerState::Closed);
                return;
            }
            _ => {}
        }

        tracing::info!("Closing application context '{}'", self.app_name);

        let event = ContainerClosedEvent::new(self.app_name.clone());
        let published = catch_unwind(AssertUnwindSafe(|| self.event_publisher.publish(event)));
        if let Err(payload) = published {
            tracing::error!("Listener panicked during shutdown: {}", panic_message(&*payload));
        }

        self.plugins.shutdown_all(self);
        self.bean_factory.destroy_singletons();
        self.set_state(ContainerState::Closed);
        tracing::info!("Application context '{}' closed", self.app_name);
    }
}

impl Container for ApplicationContext {
    fn register(&self, definition: BeanDefinition) -> ContainerResult<()> {
        self.bean_factory.register_bean_definition(definition)
    }

    fn get_bean(&self, name: &str) -> ContainerResult<Instance> {
        self.bean_factory.get_bean(name)
    }

    fn get_bean_by_type<T: ?Sized + 'static>(&self) -> ContainerResult<Arc<T>> {
        self.bean_factory.get_bean_by_type::<T>()
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.bean_factory.contains_bean(name)
    }

    fn contains_bean_by_type<T: ?Sized + 'static>(&self) -> bool {
        self.bean_factory.contains_bean_by_type::<T>()
    }

    fn bean_names(&self) -> Vec<String> {
        self.bean_factory.bean_names()
    }
}

impl Drop for ApplicationContext {
    fn drop(&mut self) {
        if self.state() != ContainerState::Closed {
            tracing::debug!("Application context '{}' dropped without close, closing", self.app_name);
            self.close();
        }
    }
}

impl fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("app_name", &self.app_name)
            .field("state", &self.state())
            .field("definitions", &self.bean_factory.bean_definition_count())
            .finish()
    }
}

/// 应用上下文构建器
pub struct ApplicationContextBuilder {
    app_name: String,
    environment: Environment,
    settings: Option<ContainerSettings>,
    logging: Option<LoggingConfig>,
    multicaster: SimpleApplicationEventMulticaster,
    candidate_sources: Vec<Box<dyn CandidateSource>>,
    include_filters: Vec<ComponentFilter>,
    exclude_filters: Vec<ComponentFilter>,
    definitions: Vec<BeanDefinition>,
    bean_factory_post_processors: Vec<Arc<dyn BeanFactoryPostProcessor>>,
    plugins: PluginRegistry,
}

impl ApplicationContextBuilder {
    pub fn new() -> Self {
        Self {
            app_name: "application".to_string(),
            environment: Environment::new(),
            settings: None,
            logging: None,
            multicaster: SimpleApplicationEventMulticaster::new(),
            candidate_sources: Vec::new(),
            include_filters: Vec::new(),
            exclude_filters: Vec::new(),
            definitions: Vec::new(),
            bean_factory_post_processors: Vec::new(),
            plugins: PluginRegistry::new(),
        }
    }

    /// 应用名称（用于事件与日志）
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// 添加配置源到 Environment
    pub fn add_property_source(self, source: Box<dyn PropertySource>) -> Self {
        self.environment.add_property_source(source);
        self
    }

    /// 设置激活的 profiles
    pub fn active_profiles(self, profiles: Vec<String>) -> Self {
        self.environment.set_active_profiles(profiles);
        self
    }

    /// 容器设置；未设置时从 Environment 的 `container.*` 属性读取
    pub fn settings(mut self, settings: ContainerSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// 构建时初始化日志，Environment 中的 `logging.*` 属性会覆盖配置
    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// 设置事件监听器的错误处理器
    pub fn event_error_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&dyn EventListener, &Arc<dyn Event>, &anyhow::Error) + Send + Sync + 'static,
    {
        self.multicaster.set_error_handler(handler);
        self
    }

    pub fn candidate_source(mut self, source: impl CandidateSource + 'static) -> Self {
        self.candidate_sources.push(Box::new(source));
        self
    }

    /// 加载所有通过 `submit_component!` 登记的组件
    pub fn with_registered_components(self) -> Self {
        self.candidate_source(InventoryCandidateSource)
    }

    pub fn include_filter(mut self, filter: ComponentFilter) -> Self {
        self.include_filters.push(filter);
        self
    }

    pub fn exclude_filter(mut self, filter: ComponentFilter) -> Self {
        self.exclude_filters.push(filter);
        self
    }

    /// 注册 Bean
    pub fn register(mut self, definition: impl Into<BeanDefinition>) -> Self {
        self.definitions.push(definition.into());
        self
    }

    pub fn bean_factory_post_processor(mut self, processor: Arc<dyn BeanFactoryPostProcessor>) -> Self {
        self.bean_factory_post_processors.push(processor);
        self
    }

    pub fn plugin(mut self, plugin: impl ApplicationPlugin + 'static) -> Self {
        self.plugins.register(Arc::new(plugin));
        self
    }

    /// 加载所有通过 `submit_plugin!` 登记的插件
    pub fn with_registered_plugins(mut self) -> Self {
        for plugin in crate::plugin::load_plugins().plugins() {
            self.plugins.register(Arc::clone(plugin));
        }
        self
    }

    /// 构建上下文（尚未启动，需要调用 `refresh()`）
    pub fn build(self) -> ContainerResult<Arc<ApplicationContext>> {
        if let Some(config) = self.logging {
            if let Err(e) = config.merge_environment(&self.environment).init() {
                tracing::warn!("Logging was not initialized: {}", e);
            }
        }

        let environment = Arc::new(self.environment);
        let settings = self
            .settings
            .unwrap_or_else(|| ContainerSettings::from_environment(&environment));

        let bean_factory = DefaultListableBeanFactory::new(Arc::clone(&environment));
        bean_factory.set_settings(settings);
        for definition in self.definitions {
            bean_factory.register_bean_definition(definition)?;
        }

        let context = ApplicationContext {
            app_name: self.app_name,
            bean_factory,
            environment,
            event_publisher: Arc::new(ApplicationEventPublisher::new(Arc::new(self.multicaster))),
            state: RwLock::new(ContainerState::Unstarted),
            lifecycle_lock: Mutex::new(()),
            candidate_sources: self.candidate_sources,
            include_filters: self.include_filters,
            exclude_filters: self.exclude_filters,
            bean_factory_post_processors: RwLock::new(self.bean_factory_post_processors),
            plugins: self.plugins,
        };
        tracing::debug!("Built {:?}", context);
        Ok(Arc::new(context))
    }

    /// 构建并启动
    pub fn run(self) -> ContainerResult<Arc<ApplicationContext>> {
        let context = self.build()?;
        context.refresh()?;
        Ok(context)
    }
}

impl Default for ApplicationContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
