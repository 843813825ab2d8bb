//! Bean Factory - 核心容器接口
//!
//! [`DefaultListableBeanFactory`] 同时承担三件事：
//!
//! - 定义注册表：名称到 [`BeanDefinition`] 的有序映射，实例化开始后冻结；
//! - 条件待定区：带条件的定义在被 `ConditionalResolver` 接纳前存放在这里；
//! - 实例表：单例在 `未创建 → 构造中 → 已装配 → 已销毁` 之间迁移。
//!
//! 所有创建都在同一把可重入锁下进行，保证“构造中”只对创建它的调用链可见，
//! 不会被其他线程误判为循环依赖。已装配实例的读取走读锁快路径，不经过创建锁。

use std::any::{type_name, TypeId};
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::bean::{BeanDefinition, Instance, Instantiation};
use crate::config::{ConfigValue, ContainerSettings, Environment};
use crate::error::{ContainerError, ContainerResult};
use crate::event::panic_message;
use crate::lazy::{Lazy, Scoped};
use crate::lifecycle::{BeanFactoryPostProcessor, BeanPostProcessor, DisposableBean, InitializingBean};

/// BeanFactory - 最基础的容器接口
///
/// 不包含泛型方法，因此可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    /// 通过名称获取 Bean（后置处理器替换后的实例）
    fn get_bean(&self, name: &str) -> ContainerResult<Instance>;

    /// 检查是否包含指定名称的 Bean
    fn contains_bean(&self, name: &str) -> bool;
}

/// BeanFactoryExt - 泛型查找
pub trait BeanFactoryExt: BeanFactory {
    /// 按类型获取唯一的 Bean，`T` 可以是具体类型或已声明的 trait 对象
    fn get_bean_by_type<T: ?Sized + 'static>(&self) -> ContainerResult<Arc<T>>;

    /// 按名称获取 Bean 并转换为 `T`
    fn get_bean_named<T: ?Sized + 'static>(&self, name: &str) -> ContainerResult<Arc<T>>;

    /// 获取所有能按 `T` 解析的 Bean，按 order 与注册顺序排列
    fn get_beans_of_type<T: ?Sized + 'static>(&self) -> ContainerResult<Vec<Arc<T>>>;

    fn contains_bean_by_type<T: ?Sized + 'static>(&self) -> bool;
}

/// ListableBeanFactory - 可列举的 Bean 工厂
pub trait ListableBeanFactory: BeanFactory {
    /// 按注册顺序返回所有定义名称
    fn bean_names(&self) -> Vec<String>;

    fn bean_names_for_type_id(&self, type_id: TypeId) -> Vec<String>;

    fn bean_definition_count(&self) -> usize;

    fn contains_bean_definition(&self, name: &str) -> bool;
}

/// ConfigurableBeanFactory - 可配置的 Bean 工厂
///
/// 这是 `BeanFactoryPostProcessor` 操作注册表所用的接口
pub trait ConfigurableBeanFactory: BeanFactory {
    /// 注册 Bean 定义，名称重复时返回 `ConflictingDescriptor`
    fn register_bean_definition(&self, definition: BeanDefinition) -> ContainerResult<()>;

    fn remove_bean_definition(&self, name: &str) -> ContainerResult<Arc<BeanDefinition>>;

    fn get_bean_definition(&self, name: &str) -> ContainerResult<Arc<BeanDefinition>>;

    fn modify_bean_definition<F>(&self, name: &str, modifier: F) -> ContainerResult<()>
    where
        F: FnOnce(&mut BeanDefinition);

    fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>);

    fn bean_post_processors(&self) -> Vec<Arc<dyn BeanPostProcessor>>;

    /// 冻结配置（不再允许修改 Bean 定义）
    fn freeze_configuration(&self);

    fn is_configuration_frozen(&self) -> bool;
}

/// 单例在实例表中的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    NotCreated,
    /// 构造中，可能已经提前暴露给字段注入
    UnderConstruction,
    FullyWired,
    Destroyed,
}

/// 依赖解析模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolveMode {
    /// 构造注入：目标必须已完整装配
    Strict,
    /// 字段注入：可以接受提前暴露的引用
    AllowEarly,
}

#[derive(Clone)]
struct RegisteredDefinition {
    definition: Arc<BeanDefinition>,
    seq: usize,
}

/// 已物化的实例
#[derive(Clone)]
struct LiveInstance {
    definition: Arc<BeanDefinition>,
    raw: Instance,
    exposed: Instance,
}

#[derive(Clone)]
enum SingletonEntry {
    UnderConstruction,
    EarlyExposed(Instance),
    FullyWired(LiveInstance),
}

struct DeferredInjection {
    definition: Arc<BeanDefinition>,
    instance: Instance,
    index: usize,
}

/// DefaultListableBeanFactory - 容器的默认实现
pub struct DefaultListableBeanFactory {
    self_ref: Weak<DefaultListableBeanFactory>,

    environment: Arc<Environment>,

    settings: RwLock<ContainerSettings>,

    /// Bean 定义存储（保持注册顺序）
    definitions: RwLock<IndexMap<String, RegisteredDefinition>>,

    /// 待定的条件定义
    conditionals: RwLock<IndexMap<String, RegisteredDefinition>>,

    next_seq: AtomicUsize,

    singletons: RwLock<HashMap<String, SingletonEntry>>,

    /// 单例进入已装配状态的顺序，销毁时逆序
    creation_order: Mutex<Vec<String>>,

    destroyed: Mutex<HashSet<String>>,

    creation_lock: ReentrantMutex<()>,

    /// 当前创建调用链，用于循环依赖报错
    creation_path: Mutex<Vec<String>>,

    prototypes_in_creation: Mutex<HashSet<String>>,

    /// Bean 后置处理器列表（按优先级排序）
    bean_post_processors: RwLock<Vec<Arc<dyn BeanPostProcessor>>>,

    defer_lazy_injection: AtomicBool,

    deferred_injections: Mutex<Vec<DeferredInjection>>,

    configuration_frozen: AtomicBool,
}

impl DefaultListableBeanFactory {
    /// 创建新的 Bean 工厂
    pub fn new(environment: Arc<Environment>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            environment,
            settings: RwLock::new(ContainerSettings::default()),
            definitions: RwLock::new(IndexMap::new()),
            conditionals: RwLock::new(IndexMap::new()),
            next_seq: AtomicUsize::new(0),
            singletons: RwLock::new(HashMap::new()),
            creation_order: Mutex::new(Vec::new()),
            destroyed: Mutex::new(HashSet::new()),
            creation_lock: ReentrantMutex::new(()),
            creation_path: Mutex::new(Vec::new()),
            prototypes_in_creation: Mutex::new(HashSet::new()),
            bean_post_processors: RwLock::new(Vec::new()),
            defer_lazy_injection: AtomicBool::new(false),
            deferred_injections: Mutex::new(Vec::new()),
            configuration_frozen: AtomicBool::new(false),
        })
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn settings(&self) -> ContainerSettings {
        self.settings.read().clone()
    }

    pub fn set_settings(&self, settings: ContainerSettings) {
        tracing::debug!("Container settings: {:?}", settings);
        *self.settings.write() = settings;
    }

    /// 指向自身的句柄；工厂被释放后返回 `None`
    pub fn handle(&self) -> Option<Arc<DefaultListableBeanFactory>> {
        self.self_ref.upgrade()
    }

    /// 单例在实例表中的状态
    pub fn instance_state(&self, name: &str) -> InstanceState {
        match self.singletons.read().get(name) {
            Some(SingletonEntry::FullyWired(_)) => InstanceState::FullyWired,
            Some(_) => InstanceState::UnderConstruction,
            None if self.destroyed.lock().contains(name) => InstanceState::Destroyed,
            None => InstanceState::NotCreated,
        }
    }

    /// 已装配的单例数量
    pub fn singleton_count(&self) -> usize {
        self.singletons
            .read()
            .values()
            .filter(|e| matches!(e, SingletonEntry::FullyWired(_)))
            .count()
    }

    /// 已装配单例的名称，按实例化顺序
    pub fn singleton_names(&self) -> Vec<String> {
        self.creation_order.lock().clone()
    }

    fn ensure_not_frozen(&self, action: &str) -> ContainerResult<()> {
        if self.configuration_frozen.load(Ordering::Acquire) {
            return Err(ContainerError::IllegalState(format!(
                "cannot {} bean definition: configuration is frozen",
                action
            )));
        }
        Ok(())
    }

    fn insert_definition(&self, name: String, registered: RegisteredDefinition) -> ContainerResult<()> {
        let mut definitions = self.definitions.write();
        if definitions.contains_key(&name) {
            tracing::warn!("Bean '{}' already exists, registration failed", name);
            return Err(ContainerError::ConflictingDescriptor(name));
        }
        tracing::debug!(
            "Bean definition registered: '{}' ({})",
            name,
            registered.definition.type_name()
        );
        definitions.insert(name, registered);
        Ok(())
    }

    fn definition(&self, name: &str) -> Option<Arc<BeanDefinition>> {
        self.definitions
            .read()
            .get(name)
            .map(|r| Arc::clone(&r.definition))
    }

    // ========== 条件定义 ==========

    pub fn is_pending_conditional(&self, name: &str) -> bool {
        self.conditionals.read().contains_key(name)
    }

    pub(crate) fn pending_conditional(&self, name: &str) -> Option<Arc<BeanDefinition>> {
        self.conditionals
            .read()
            .get(name)
            .map(|r| Arc::clone(&r.definition))
    }

    /// 待定条件定义的评估顺序：注册顺序，受 order 调整
    pub(crate) fn pending_conditional_names(&self) -> Vec<String> {
        let conditionals = self.conditionals.read();
        let mut entries: Vec<_> = conditionals
            .iter()
            .map(|(name, r)| (r.definition.order(), r.seq, name.clone()))
            .collect();
        entries.sort();
        entries.into_iter().map(|(_, _, name)| name).collect()
    }

    pub(crate) fn admit_conditional(&self, name: &str) -> ContainerResult<()> {
        let registered = self.conditionals.write().shift_remove(name);
        match registered {
            Some(registered) => self.insert_definition(name.to_string(), registered),
            None => Ok(()),
        }
    }

    /// 丢弃所有仍未被接纳的条件定义
    pub(crate) fn discard_pending_conditionals(&self) -> Vec<String> {
        let discarded: Vec<String> = self.conditionals.write().drain(..).map(|(name, _)| name).collect();
        for name in &discarded {
            tracing::debug!("Conditional bean '{}' was never admitted, discarding", name);
        }
        discarded
    }

    // ========== 定义展开 ==========

    /// 展开作用域代理、延迟代理与 FactoryBean 定义，返回被展开的定义数量
    ///
    /// 已展开的定义不再带有对应标记，因此重复调用没有副作用
    pub(crate) fn expand_definitions(&self) -> ContainerResult<usize> {
        self.ensure_not_frozen("expand")?;
        let mut definitions = self.definitions.write();
        let candidates: Vec<String> = definitions
            .iter()
            .filter(|(_, r)| needs_expansion(&r.definition))
            .map(|(name, _)| name.clone())
            .collect();

        for name in &candidates {
            let Some(registered) = definitions.shift_remove(name) else {
                continue;
            };
            let seq = registered.seq;
            let mut work = vec![(*registered.definition).clone()];
            let mut expanded = Vec::new();
            while let Some(definition) = work.pop() {
                let definition = match definition.split_scoped_proxy() {
                    Ok((target, proxy)) => {
                        tracing::debug!("Scoped proxy registered for '{}'", proxy.name());
                        work.extend([target, proxy]);
                        continue;
                    }
                    Err(definition) => definition,
                };
                let definition = match definition.split_lazy_proxy() {
                    Ok((source, proxy)) => {
                        tracing::debug!("Lazy proxy registered for '{}'", proxy.name());
                        work.extend([source, proxy]);
                        continue;
                    }
                    Err(definition) => definition,
                };
                let definition = match definition.split_factory_bean() {
                    Ok((factory, product)) => {
                        tracing::debug!(
                            "Factory bean '{}' produces '{}'",
                            factory.name(),
                            product.name()
                        );
                        work.extend([factory, product]);
                        continue;
                    }
                    Err(definition) => definition,
                };
                expanded.push(definition);
            }

            for definition in expanded {
                let derived = definition.name().to_string();
                if definitions.contains_key(&derived) {
                    return Err(ContainerError::ConflictingDescriptor(derived));
                }
                definitions.insert(
                    derived,
                    RegisteredDefinition {
                        definition: Arc::new(definition),
                        seq,
                    },
                );
            }
        }
        Ok(candidates.len())
    }

    // ========== 实例化阶段 ==========

    /// 实例化顺序：后置处理器优先，其次按 order，再按注册顺序
    pub fn sorted_definitions(&self) -> Vec<Arc<BeanDefinition>> {
        let definitions = self.definitions.read();
        let mut entries: Vec<_> = definitions
            .values()
            .map(|r| (r.seq, Arc::clone(&r.definition)))
            .collect();
        entries.sort_by_key(|(seq, d)| (!d.provides::<dyn BeanPostProcessor>(), d.order(), *seq));
        entries.into_iter().map(|(_, d)| d).collect()
    }

    /// 创建并注册所有 BeanPostProcessor 定义
    pub fn register_bean_post_processors(&self) -> ContainerResult<usize> {
        let mut registered = 0;
        for definition in self.sorted_definitions() {
            if !definition.provides::<dyn BeanPostProcessor>() {
                continue;
            }
            if !definition.is_singleton() {
                tracing::warn!(
                    "BeanPostProcessor '{}' is not a singleton, skipping",
                    definition.name()
                );
                continue;
            }
            let live = self.do_get_bean(&definition, ResolveMode::Strict)?;
            let processor = definition
                .cast::<dyn BeanPostProcessor>(&live.raw)
                .ok_or_else(|| type_mismatch::<dyn BeanPostProcessor>(&definition))?;
            tracing::info!(
                "  ├─ Registered BeanPostProcessor: {} (order: {})",
                processor.name(),
                processor.order()
            );
            self.add_bean_post_processor(processor);
            registered += 1;
        }
        Ok(registered)
    }

    /// 按注册表顺序获取所有 BeanFactoryPostProcessor
    pub fn bean_factory_post_processors(&self) -> ContainerResult<Vec<Arc<dyn BeanFactoryPostProcessor>>> {
        let mut processors = Vec::new();
        for definition in self.sorted_definitions() {
            if definition.provides::<dyn BeanFactoryPostProcessor>() {
                let live = self.do_get_bean(&definition, ResolveMode::Strict)?;
                let processor = definition
                    .cast::<dyn BeanFactoryPostProcessor>(&live.raw)
                    .ok_or_else(|| type_mismatch::<dyn BeanFactoryPostProcessor>(&definition))?;
                processors.push(processor);
            }
        }
        Ok(processors)
    }

    /// 预实例化所有非延迟单例
    pub fn preinstantiate_singletons(&self) -> ContainerResult<usize> {
        let lazy_by_default = self.settings.read().lazy_init;
        let mut instantiated = 0;
        for definition in self.sorted_definitions() {
            if !definition.is_singleton() || definition.is_lazy_init() {
                continue;
            }
            let infrastructure = definition.provides::<dyn BeanPostProcessor>()
                || definition.provides::<dyn BeanFactoryPostProcessor>();
            if lazy_by_default && !infrastructure {
                continue;
            }
            self.do_get_bean(&definition, ResolveMode::Strict)?;
            instantiated += 1;
        }
        tracing::debug!("Pre-instantiated {} singleton bean(s)", instantiated);
        Ok(instantiated)
    }

    /// 实例化阶段内推迟 `autowire_lazy` 注入点
    pub(crate) fn begin_deferring_lazy_injection(&self) {
        self.defer_lazy_injection.store(true, Ordering::Release);
    }

    /// 解析所有推迟的注入点，之后的注入点直接解析
    pub fn resolve_deferred_injections(&self) -> ContainerResult<usize> {
        self.defer_lazy_injection.store(false, Ordering::Release);
        let pending = std::mem::take(&mut *self.deferred_injections.lock());
        for deferred in &pending {
            let Some(point) = deferred.definition.injection_points().get(deferred.index) else {
                continue;
            };
            let name = deferred.definition.name();
            tracing::trace!("Resolving deferred injection of '{}' into '{}'", point.dependency(), name);
            let resolver = BeanResolver::new(self, name);
            point
                .inject(&deferred.instance, &resolver)
                .map_err(|e| e.during_creation_of(name))?;
        }
        Ok(pending.len())
    }

    // ========== 解析 ==========

    fn wired_singleton(&self, name: &str) -> Option<LiveInstance> {
        match self.singletons.read().get(name) {
            Some(SingletonEntry::FullyWired(live)) => Some(live.clone()),
            _ => None,
        }
    }

    fn do_get_bean(&self, definition: &Arc<BeanDefinition>, mode: ResolveMode) -> ContainerResult<LiveInstance> {
        if definition.is_prototype() {
            self.create_prototype(definition)
        } else {
            self.get_singleton(definition, mode)
        }
    }

    fn get_singleton(&self, definition: &Arc<BeanDefinition>, mode: ResolveMode) -> ContainerResult<LiveInstance> {
        let name = definition.name();
        if let Some(live) = self.wired_singleton(name) {
            tracing::trace!("Returning cached instance of singleton bean '{}'", name);
            return Ok(live);
        }

        let _creation = self.creation_lock.lock();
        let entry = self.singletons.read().get(name).cloned();
        match entry {
            Some(SingletonEntry::FullyWired(live)) => Ok(live),
            Some(SingletonEntry::EarlyExposed(instance)) if mode == ResolveMode::AllowEarly => {
                tracing::debug!(
                    "Returning eagerly cached instance of bean '{}' that is not fully initialized yet (circular reference)",
                    name
                );
                Ok(LiveInstance {
                    definition: Arc::clone(definition),
                    raw: Arc::clone(&instance),
                    exposed: instance,
                })
            }
            Some(_) => Err(self.circular_error(name)),
            None => self.create_singleton(definition),
        }
    }

    fn create_singleton(&self, definition: &Arc<BeanDefinition>) -> ContainerResult<LiveInstance> {
        let name = definition.name().to_string();
        tracing::debug!("Creating shared instance of singleton bean '{}'", name);

        self.singletons
            .write()
            .insert(name.clone(), SingletonEntry::UnderConstruction);
        self.creation_path.lock().push(name.clone());
        let result = self.do_create_bean(definition, true);
        self.creation_path.lock().pop();

        if result.is_err() {
            let mut singletons = self.singletons.write();
            if !matches!(singletons.get(&name), Some(SingletonEntry::FullyWired(_))) {
                singletons.remove(&name);
            }
        }
        result
    }

    fn create_prototype(&self, definition: &Arc<BeanDefinition>) -> ContainerResult<LiveInstance> {
        let name = definition.name().to_string();
        let _creation = self.creation_lock.lock();
        if !self.prototypes_in_creation.lock().insert(name.clone()) {
            return Err(self.circular_error(&name));
        }
        tracing::trace!("Creating new instance of prototype bean '{}'", name);

        self.creation_path.lock().push(name.clone());
        let result = self.do_create_bean(definition, false);
        self.creation_path.lock().pop();
        self.prototypes_in_creation.lock().remove(&name);
        result
    }

    /// 实例化 → 提前暴露 → 字段注入 → 初始化 → 标记已装配
    ///
    /// 单例在初始化完成前一直停留在提前暴露状态，读锁快路径只能看到最终实例
    fn do_create_bean(&self, definition: &Arc<BeanDefinition>, singleton: bool) -> ContainerResult<LiveInstance> {
        let name = definition.name();
        let resolver = BeanResolver::new(self, name);

        let raw = self
            .instantiate(definition, &resolver)
            .map_err(|e| e.during_creation_of(name))?;

        if singleton {
            self.singletons
                .write()
                .insert(name.to_string(), SingletonEntry::EarlyExposed(Arc::clone(&raw)));
        }

        self.populate_bean(definition, &raw, &resolver)
            .map_err(|e| e.during_creation_of(name))?;

        let mut live = LiveInstance {
            definition: Arc::clone(definition),
            raw: Arc::clone(&raw),
            exposed: raw,
        };

        match self.initialize_bean(&live) {
            Ok(exposed) => {
                live.exposed = exposed;
                if singleton {
                    self.singletons
                        .write()
                        .insert(name.to_string(), SingletonEntry::FullyWired(live.clone()));
                    self.creation_order.lock().push(name.to_string());
                }
                Ok(live)
            }
            Err(e) => {
                if singleton {
                    self.discard_failed_singleton(&live);
                }
                Err(e.during_creation_of(name))
            }
        }
    }

    fn instantiate(&self, definition: &Arc<BeanDefinition>, resolver: &BeanResolver<'_>) -> ContainerResult<Instance> {
        match definition.instantiation() {
            Instantiation::Constructor(constructor) => constructor(resolver),
            Instantiation::FactoryMethod { producer, method } => {
                let producer = self.resolve_by_name(producer, definition.name())?;
                method(&producer.raw, resolver)
            }
            Instantiation::FactoryObject { producer, produce } => {
                if let Some(existing) = self.wired_singleton(definition.name()) {
                    return Ok(existing.raw);
                }
                let factory = self.resolve_by_name(producer, definition.name())?;
                if let Some(existing) = self.wired_singleton(definition.name()) {
                    return Ok(existing.raw);
                }
                tracing::debug!("Obtaining object '{}' from factory bean '{}'", definition.name(), producer);
                produce(&factory.raw)
            }
        }
    }

    fn populate_bean(
        &self,
        definition: &Arc<BeanDefinition>,
        instance: &Instance,
        resolver: &BeanResolver<'_>,
    ) -> ContainerResult<()> {
        for (index, point) in definition.injection_points().iter().enumerate() {
            if point.is_lazy() && self.defer_lazy_injection.load(Ordering::Acquire) {
                tracing::trace!(
                    "Deferring injection of '{}' into '{}'",
                    point.dependency(),
                    definition.name()
                );
                self.deferred_injections.lock().push(DeferredInjection {
                    definition: Arc::clone(definition),
                    instance: Arc::clone(instance),
                    index,
                });
                continue;
            }
            point.inject(instance, resolver)?;
        }
        Ok(())
    }

    /// BeanPostProcessor 前置 → InitializingBean → init-method → BeanPostProcessor 后置
    fn initialize_bean(&self, live: &LiveInstance) -> ContainerResult<Instance> {
        let definition = &live.definition;
        let processors = self.bean_post_processors();

        let mut bean = Arc::clone(&live.raw);
        for processor in &processors {
            bean = processor.post_process_before_initialization(bean, definition)?;
        }

        if let Some(initializing) = definition.cast::<dyn InitializingBean>(&live.raw) {
            tracing::trace!("Invoking after_properties_set() on bean '{}'", definition.name());
            initializing.after_properties_set()?;
        }
        for init in definition.init_methods() {
            init(&live.raw)?;
        }

        for processor in &processors {
            bean = processor.post_process_after_initialization(bean, definition)?;
        }

        if !Arc::ptr_eq(&bean, &live.raw) {
            tracing::debug!("Bean '{}' was replaced by a post-processor", definition.name());
        }
        Ok(bean)
    }

    fn resolve_by_name(&self, name: &str, requester: &str) -> ContainerResult<LiveInstance> {
        let definition = self
            .definition(name)
            .ok_or_else(|| ContainerError::UnsatisfiedDependency {
                requester: requester.to_string(),
                dependency: name.to_string(),
                qualifier: None,
            })?;
        self.do_get_bean(&definition, ResolveMode::Strict)
    }

    fn circular_error(&self, name: &str) -> ContainerError {
        let path = self.creation_path.lock();
        let start = path.iter().position(|n| n == name).unwrap_or(0);
        let mut chain: Vec<&str> = path[start..].iter().map(String::as_str).collect();
        chain.push(name);
        ContainerError::UnresolvableCircularDependency(chain.join(" -> "))
    }

    /// 按类型（可选限定名）确定唯一候选
    fn determine_candidate(
        &self,
        type_id: TypeId,
        dependency: &str,
        qualifier: Option<&str>,
        requester: &str,
    ) -> ContainerResult<Option<Arc<BeanDefinition>>> {
        let mut candidates: Vec<Arc<BeanDefinition>> = self
            .definitions
            .read()
            .values()
            .filter(|r| r.definition.provides_type(type_id))
            .map(|r| Arc::clone(&r.definition))
            .collect();

        if let Some(qualifier) = qualifier {
            candidates.retain(|d| d.name() == qualifier || d.qualifier() == Some(qualifier));
        }

        match candidates.len() {
            0 => return Ok(None),
            1 => return Ok(candidates.pop()),
            _ => {}
        }

        let primaries: Vec<_> = candidates.iter().filter(|d| d.is_primary()).collect();
        if primaries.len() == 1 {
            return Ok(Some(Arc::clone(primaries[0])));
        }

        let highest = candidates.iter().filter_map(|d| d.explicit_order()).min();
        if let Some(highest) = highest {
            let winners: Vec<_> = candidates
                .iter()
                .filter(|d| d.explicit_order() == Some(highest))
                .collect();
            if winners.len() == 1 {
                return Ok(Some(Arc::clone(winners[0])));
            }
        }

        Err(ContainerError::AmbiguousDependency {
            requester: requester.to_string(),
            dependency: dependency.to_string(),
            candidates: candidates.iter().map(|d| d.name().to_string()).collect(),
        })
    }

    pub(crate) fn resolve_dependency<T: ?Sized + 'static>(
        &self,
        qualifier: Option<&str>,
        mode: ResolveMode,
        requester: &str,
    ) -> ContainerResult<Option<Arc<T>>> {
        let Some(definition) =
            self.determine_candidate(TypeId::of::<T>(), type_name::<T>(), qualifier, requester)?
        else {
            return Ok(None);
        };
        let live = self.do_get_bean(&definition, mode)?;
        cast_live::<T>(&live).map(Some)
    }

    // ========== 销毁 ==========

    /// 按实例化的逆序销毁所有已装配的单例
    ///
    /// 每个销毁步骤的失败（包括 panic）只记录日志，不影响其余实例
    pub fn destroy_singletons(&self) {
        let _creation = self.creation_lock.lock();
        let order = std::mem::take(&mut *self.creation_order.lock());
        tracing::info!("Destroying {} singleton bean(s)", order.len());

        let processors = self.bean_post_processors();
        for name in order.iter().rev() {
            let entry = self.singletons.write().remove(name);
            if let Some(SingletonEntry::FullyWired(live)) = entry {
                self.destroy_bean(&live, &processors);
            }
        }

        let abandoned: Vec<String> = self.singletons.write().drain().map(|(name, _)| name).collect();
        for name in abandoned {
            tracing::debug!("Dropping bean '{}' that never finished construction", name);
        }
        self.deferred_injections.lock().clear();
        tracing::info!("Singleton beans destruction completed");
    }

    fn discard_failed_singleton(&self, live: &LiveInstance) {
        let name = live.definition.name();
        self.singletons.write().remove(name);
        self.creation_order.lock().retain(|n| n != name);
        tracing::warn!("Initialization of bean '{}' failed, running its destruction hooks", name);
        self.destroy_bean(live, &self.bean_post_processors());
    }

    fn destroy_bean(&self, live: &LiveInstance, processors: &[Arc<dyn BeanPostProcessor>]) {
        let definition = &live.definition;
        let name = definition.name();

        for processor in processors {
            run_destruction_step(name, processor.name(), || {
                processor.post_process_before_destroy(&live.exposed, definition)
            });
        }
        if let Some(disposable) = definition.cast::<dyn DisposableBean>(&live.raw) {
            run_destruction_step(name, "on_destroy", || disposable.on_destroy());
        }
        for destroy in definition.destroy_methods() {
            run_destruction_step(name, "destroy-method", || destroy(&live.raw));
        }

        self.destroyed.lock().insert(name.to_string());
        tracing::debug!("Bean '{}' destroyed", name);
    }
}

fn needs_expansion(definition: &BeanDefinition) -> bool {
    definition.is_factory_bean()
        || definition.is_lazy_proxy()
        || definition.scope() == crate::Scope::ScopedProxy
}

fn type_mismatch<T: ?Sized>(definition: &BeanDefinition) -> ContainerError {
    ContainerError::TypeMismatch {
        expected: type_name::<T>().to_string(),
        found: definition.type_name().to_string(),
    }
}

/// 优先使用后置处理器替换后的实例；替换物可以把 `Arc<dyn Trait>` 包在实例里提供 trait 视图
fn cast_live<T: ?Sized + 'static>(live: &LiveInstance) -> ContainerResult<Arc<T>> {
    if let Some(view) = live.exposed.downcast_ref::<Arc<T>>() {
        return Ok(Arc::clone(view));
    }
    live.definition
        .cast::<T>(&live.exposed)
        .or_else(|| live.definition.cast::<T>(&live.raw))
        .ok_or_else(|| type_mismatch::<T>(&live.definition))
}

fn run_destruction_step<F>(bean: &str, step: &str, f: F)
where
    F: FnOnce() -> ContainerResult<()>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!("Destruction step '{}' failed for bean '{}': {}", step, bean, e);
        }
        Err(payload) => {
            tracing::error!(
                "Destruction step '{}' panicked for bean '{}': {}",
                step,
                bean,
                panic_message(&*payload)
            );
        }
    }
}

impl BeanFactory for DefaultListableBeanFactory {
    fn get_bean(&self, name: &str) -> ContainerResult<Instance> {
        tracing::trace!("Requesting bean: '{}'", name);
        let definition = self
            .definition(name)
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))?;
        self.do_get_bean(&definition, ResolveMode::Strict)
            .map(|live| live.exposed)
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name)
    }
}

impl BeanFactoryExt for DefaultListableBeanFactory {
    fn get_bean_by_type<T: ?Sized + 'static>(&self) -> ContainerResult<Arc<T>> {
        self.resolve_dependency::<T>(None, ResolveMode::Strict, "<container>")?
            .ok_or_else(|| ContainerError::BeanNotFound(format!("<type {}>", type_name::<T>())))
    }

    fn get_bean_named<T: ?Sized + 'static>(&self, name: &str) -> ContainerResult<Arc<T>> {
        let definition = self
            .definition(name)
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))?;
        let live = self.do_get_bean(&definition, ResolveMode::Strict)?;
        cast_live::<T>(&live)
    }

    fn get_beans_of_type<T: ?Sized + 'static>(&self) -> ContainerResult<Vec<Arc<T>>> {
        let type_id = TypeId::of::<T>();
        let mut definitions: Vec<_> = self
            .definitions
            .read()
            .values()
            .filter(|r| r.definition.provides_type(type_id))
            .map(|r| (r.definition.order(), r.seq, Arc::clone(&r.definition)))
            .collect();
        definitions.sort_by_key(|(order, seq, _)| (*order, *seq));

        definitions
            .into_iter()
            .map(|(_, _, definition)| {
                let live = self.do_get_bean(&definition, ResolveMode::Strict)?;
                cast_live::<T>(&live)
            })
            .collect()
    }

    fn contains_bean_by_type<T: ?Sized + 'static>(&self) -> bool {
        !self.bean_names_for_type_id(TypeId::of::<T>()).is_empty()
    }
}

impl ListableBeanFactory for DefaultListableBeanFactory {
    fn bean_names(&self) -> Vec<String> {
        self.definitions.read().keys().cloned().collect()
    }

    fn bean_names_for_type_id(&self, type_id: TypeId) -> Vec<String> {
        self.definitions
            .read()
            .iter()
            .filter(|(_, r)| r.definition.provides_type(type_id))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn bean_definition_count(&self) -> usize {
        self.definitions.read().len()
    }

    fn contains_bean_definition(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name)
    }
}

impl ConfigurableBeanFactory for DefaultListableBeanFactory {
    fn register_bean_definition(&self, definition: BeanDefinition) -> ContainerResult<()> {
        self.ensure_not_frozen("register")?;

        let name = definition.name().to_string();
        tracing::trace!(
            "Attempting to register bean: name='{}', type='{}', scope={:?}",
            name,
            definition.type_name(),
            definition.scope()
        );

        // 父定义尚未进入注册表时，子定义等父定义的结论出来再决定去留
        let conditional = definition.has_conditions()
            || definition
                .parent()
                .is_some_and(|parent| !self.contains_bean_definition(parent));
        let registered = RegisteredDefinition {
            definition: Arc::new(definition),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };

        if conditional {
            let mut conditionals = self.conditionals.write();
            if conditionals.contains_key(&name) {
                return Err(ContainerError::ConflictingDescriptor(name));
            }
            tracing::debug!("Conditional bean definition deferred: '{}'", name);
            conditionals.insert(name, registered);
            return Ok(());
        }

        self.insert_definition(name, registered)
    }

    fn remove_bean_definition(&self, name: &str) -> ContainerResult<Arc<BeanDefinition>> {
        self.ensure_not_frozen("remove")?;
        let removed = self
            .definitions
            .write()
            .shift_remove(name)
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))?;
        tracing::debug!("Bean definition removed: '{}'", name);
        Ok(removed.definition)
    }

    fn get_bean_definition(&self, name: &str) -> ContainerResult<Arc<BeanDefinition>> {
        self.definition(name)
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))
    }

    fn modify_bean_definition<F>(&self, name: &str, modifier: F) -> ContainerResult<()>
    where
        F: FnOnce(&mut BeanDefinition),
    {
        self.ensure_not_frozen("modify")?;
        let mut definitions = self.definitions.write();
        let registered = definitions
            .get_mut(name)
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))?;
        modifier(Arc::make_mut(&mut registered.definition));
        tracing::debug!("Bean definition '{}' modified", name);
        Ok(())
    }

    fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        let mut processors = self.bean_post_processors.write();
        processors.push(processor);
        // 稳定排序，相同 order 保持注册顺序
        processors.sort_by_key(|p| p.order());
    }

    fn bean_post_processors(&self) -> Vec<Arc<dyn BeanPostProcessor>> {
        self.bean_post_processors.read().clone()
    }

    fn freeze_configuration(&self) {
        self.configuration_frozen.store(true, Ordering::Release);
        tracing::debug!("Bean factory configuration frozen");
    }

    fn is_configuration_frozen(&self) -> bool {
        self.configuration_frozen.load(Ordering::Acquire)
    }
}

/// 依赖解析入口
///
/// 构造器与工厂方法通过它请求依赖。这里请求到的依赖都是构造注入：
/// 目标若仍在构造中即视为无法打破的循环依赖，需要时改用 [`BeanResolver::lazy`]。
pub struct BeanResolver<'a> {
    bean_factory: &'a DefaultListableBeanFactory,
    requester: &'a str,
}

impl<'a> BeanResolver<'a> {
    pub(crate) fn new(bean_factory: &'a DefaultListableBeanFactory, requester: &'a str) -> Self {
        Self {
            bean_factory,
            requester,
        }
    }

    /// 正在创建的 Bean 名称
    pub fn requester(&self) -> &str {
        self.requester
    }

    pub fn bean_factory(&self) -> &DefaultListableBeanFactory {
        self.bean_factory
    }

    pub fn environment(&self) -> &Environment {
        &self.bean_factory.environment
    }

    pub fn property(&self, key: &str) -> Option<ConfigValue> {
        self.bean_factory.environment.get(key)
    }

    /// 按类型获取唯一依赖
    pub fn get<T: ?Sized + 'static>(&self) -> ContainerResult<Arc<T>> {
        self.require::<T>(None)
    }

    /// 按限定名（Bean 名称或 qualifier）获取依赖
    pub fn get_named<T: ?Sized + 'static>(&self, qualifier: &str) -> ContainerResult<Arc<T>> {
        self.require::<T>(Some(qualifier))
    }

    pub fn get_optional<T: ?Sized + 'static>(&self) -> ContainerResult<Option<Arc<T>>> {
        self.bean_factory
            .resolve_dependency::<T>(None, ResolveMode::Strict, self.requester)
    }

    pub fn get_all<T: ?Sized + 'static>(&self) -> ContainerResult<Vec<Arc<T>>> {
        self.bean_factory.get_beans_of_type::<T>()
    }

    /// 按类型延迟解析的句柄
    pub fn lazy<T: ?Sized + 'static>(&self) -> Lazy<T> {
        Lazy::by_type(self.bean_factory.self_ref.clone())
    }

    /// 按名称延迟解析的句柄
    pub fn lazy_named<T: ?Sized + 'static>(&self, name: &str) -> Lazy<T> {
        Lazy::named(name, self.bean_factory.self_ref.clone())
    }

    pub(crate) fn scoped_named<T: ?Sized + 'static>(&self, name: &str) -> Scoped<T> {
        Scoped::named(name, self.bean_factory.self_ref.clone())
    }

    fn require<T: ?Sized + 'static>(&self, qualifier: Option<&str>) -> ContainerResult<Arc<T>> {
        self.bean_factory
            .resolve_dependency::<T>(qualifier, ResolveMode::Strict, self.requester)?
            .ok_or_else(|| self.unsatisfied::<T>(qualifier))
    }

    /// 字段注入：允许接受提前暴露的引用
    pub(crate) fn resolve_field<T: ?Sized + 'static>(
        &self,
        qualifier: Option<&str>,
        required: bool,
    ) -> ContainerResult<Option<Arc<T>>> {
        let mode = if self.bean_factory.settings.read().allow_circular_references {
            ResolveMode::AllowEarly
        } else {
            ResolveMode::Strict
        };
        match self
            .bean_factory
            .resolve_dependency::<T>(qualifier, mode, self.requester)?
        {
            Some(dependency) => Ok(Some(dependency)),
            None if required => Err(self.unsatisfied::<T>(qualifier)),
            None => Ok(None),
        }
    }

    fn unsatisfied<T: ?Sized>(&self, qualifier: Option<&str>) -> ContainerError {
        ContainerError::UnsatisfiedDependency {
            requester: self.requester.to_string(),
            dependency: type_name::<T>().to_string(),
            qualifier: qualifier.map(str::to_string),
        }
    }
}
