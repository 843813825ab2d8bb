//! Bean 定义模型
//!
//! [`BeanDefinition`] 描述一个可创建单元：名称、声明类型、作用域、来源（构造器 /
//! 工厂方法 / FactoryBean）、条件与排序。定义在实例化开始之前都可以被
//! `BeanFactoryPostProcessor` 修改，之后只读。
//!
//! Rust 没有运行时反射，因此定义在构建时就记录了所有需要的类型擦除信息：
//! 按类型解析所用的转换器、字段注入点、初始化与销毁回调。

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::bean_factory::BeanResolver;
use crate::condition::Condition;
use crate::constants::{DEFAULT_ORDER, FACTORY_BEAN_PREFIX, LAZY_PROXY_SOURCE_PREFIX, SCOPED_TARGET_PREFIX};
use crate::error::{ContainerError, ContainerResult};
use crate::event::EventListener;
use crate::lazy::{Lazy, Scoped};
use crate::lifecycle::{
    BeanFactoryPostProcessor, BeanPostProcessor, DisposableBean, InitializingBean, LifecycleListener,
};
use crate::Scope;

/// 容器管理的实例
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 把类型擦除的实例转换为某个具体类型或 trait 对象
pub type Caster<U> = Arc<dyn Fn(Instance) -> Option<Arc<U>> + Send + Sync>;

pub(crate) type Constructor =
    Arc<dyn Fn(&BeanResolver<'_>) -> ContainerResult<Instance> + Send + Sync>;
pub(crate) type FactoryMethodFn =
    Arc<dyn Fn(&Instance, &BeanResolver<'_>) -> ContainerResult<Instance> + Send + Sync>;
pub(crate) type Producer = Arc<dyn Fn(&Instance) -> ContainerResult<Instance> + Send + Sync>;
pub(crate) type Callback = Arc<dyn Fn(&Instance) -> ContainerResult<()> + Send + Sync>;
pub(crate) type Injector =
    Arc<dyn Fn(&Instance, &BeanResolver<'_>) -> ContainerResult<()> + Send + Sync>;
pub(crate) type HandleFactory = Arc<dyn Fn(&BeanResolver<'_>, &str) -> Instance + Send + Sync>;

/// 实例的创建方式
#[derive(Clone)]
pub(crate) enum Instantiation {
    Constructor(Constructor),
    FactoryMethod {
        producer: String,
        method: FactoryMethodFn,
    },
    FactoryObject {
        producer: String,
        produce: Producer,
    },
}

/// Bean 的来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeanOrigin {
    /// 由自身构造器创建
    Direct,
    /// 调用另一个 Bean 上的方法产生
    FactoryMethod { producer: String },
    /// 由 FactoryBean 的 `get_object()` 产生
    FactoryObject { producer: String },
}

#[derive(Clone)]
struct CastEntry {
    type_name: &'static str,
    caster: Arc<dyn Any + Send + Sync>,
}

/// 按 TypeId 存放的转换器表
#[derive(Clone, Default)]
pub(crate) struct Capabilities {
    entries: HashMap<TypeId, CastEntry>,
}

impl Capabilities {
    fn of<T: Any + Send + Sync>() -> Self {
        let mut capabilities = Self::default();
        let caster: Caster<T> = Arc::new(|instance: Instance| instance.downcast::<T>().ok());
        capabilities.insert(caster);
        capabilities
    }

    fn insert<U: ?Sized + 'static>(&mut self, caster: Caster<U>) {
        self.entries.insert(
            TypeId::of::<U>(),
            CastEntry {
                type_name: type_name::<U>(),
                caster: Arc::new(caster),
            },
        );
    }

    fn cast<U: ?Sized + 'static>(&self, instance: &Instance) -> Option<Arc<U>> {
        let entry = self.entries.get(&TypeId::of::<U>())?;
        let caster = entry.caster.downcast_ref::<Caster<U>>()?;
        caster(Arc::clone(instance))
    }

    fn provides(&self, type_id: TypeId) -> bool {
        self.entries.contains_key(&type_id)
    }

    fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.values().map(|e| e.type_name).collect();
        names.sort_unstable();
        names
    }
}

/// 字段 / setter 注入点
#[derive(Clone)]
pub struct InjectionPoint {
    dependency: &'static str,
    qualifier: Option<String>,
    required: bool,
    lazy: bool,
    inject: Injector,
}

impl InjectionPoint {
    /// 依赖的类型名称
    pub fn dependency(&self) -> &'static str {
        self.dependency
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// 是否推迟到 Wired 阶段再解析
    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub(crate) fn inject(&self, instance: &Instance, resolver: &BeanResolver<'_>) -> ContainerResult<()> {
        (self.inject)(instance, resolver)
    }
}

impl fmt::Debug for InjectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionPoint")
            .field("dependency", &self.dependency)
            .field("qualifier", &self.qualifier)
            .field("required", &self.required)
            .field("lazy", &self.lazy)
            .finish()
    }
}

/// FactoryBean 契约
///
/// 注册为 `name` 的 FactoryBean 会被展开成两个定义：`&name` 是工厂本身，
/// `name` 是它生产的对象。
pub trait FactoryBean: Send + Sync + 'static {
    type Object: Any + Send + Sync;

    fn get_object(&self) -> ContainerResult<Arc<Self::Object>>;

    /// 产品是否为单例
    fn is_singleton() -> bool
    where
        Self: Sized,
    {
        true
    }
}

#[derive(Clone)]
pub(crate) struct FactoryBeanMeta {
    object_type: TypeId,
    object_type_name: &'static str,
    singleton: bool,
    produce: Producer,
    capabilities: Capabilities,
}

/// 延迟代理与作用域代理的句柄构造器
#[derive(Clone)]
pub(crate) struct ProxyHandles {
    lazy_type: (TypeId, &'static str),
    lazy: HandleFactory,
    lazy_capabilities: Capabilities,
    scoped_type: (TypeId, &'static str),
    scoped: HandleFactory,
    scoped_capabilities: Capabilities,
}

impl ProxyHandles {
    fn of<T: Any + Send + Sync>() -> Self {
        Self {
            lazy_type: (TypeId::of::<Lazy<T>>(), type_name::<Lazy<T>>()),
            lazy: Arc::new(|resolver, target| Arc::new(resolver.lazy_named::<T>(target)) as Instance),
            lazy_capabilities: Capabilities::of::<Lazy<T>>(),
            scoped_type: (TypeId::of::<Scoped<T>>(), type_name::<Scoped<T>>()),
            scoped: Arc::new(|resolver, target| Arc::new(resolver.scoped_named::<T>(target)) as Instance),
            scoped_capabilities: Capabilities::of::<Scoped<T>>(),
        }
    }
}

/// Bean 定义 - 描述如何创建和管理 Bean
#[derive(Clone)]
pub struct BeanDefinition {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    qualifier: Option<String>,
    scope: Scope,
    lazy_init: bool,
    lazy_proxy: bool,
    primary: bool,
    order: Option<i32>,
    conditions: Vec<Arc<dyn Condition>>,
    parent: Option<String>,
    instantiation: Instantiation,
    injection_points: Vec<InjectionPoint>,
    capabilities: Capabilities,
    init_methods: Vec<Callback>,
    destroy_methods: Vec<Callback>,
    factory_bean: Option<FactoryBeanMeta>,
    handles: Option<ProxyHandles>,
}

impl BeanDefinition {
    /// 由构造器创建的 Bean
    ///
    /// 构造器内通过 [`BeanResolver`] 请求的依赖都是构造注入，
    /// 它们必须在本 Bean 分配之前完全可用。
    pub fn builder<T, F>(name: impl Into<String>, constructor: F) -> BeanDefinitionBuilder<T>
    where
        T: Any + Send + Sync,
        F: Fn(&BeanResolver<'_>) -> ContainerResult<T> + Send + Sync + 'static,
    {
        let constructor: Constructor =
            Arc::new(move |resolver| constructor(resolver).map(|bean| Arc::new(bean) as Instance));
        BeanDefinitionBuilder::new(name.into(), Instantiation::Constructor(constructor))
    }

    /// 注册一个已经构建好的对象
    pub fn instance<T>(name: impl Into<String>, instance: Arc<T>) -> BeanDefinitionBuilder<T>
    where
        T: Any + Send + Sync,
    {
        let constructor: Constructor = Arc::new(move |_| Ok(Arc::clone(&instance) as Instance));
        BeanDefinitionBuilder::new(name.into(), Instantiation::Constructor(constructor))
    }

    /// 由返回共享指针的构造器创建的 Bean
    pub fn supplier<T, F>(name: impl Into<String>, supplier: F) -> BeanDefinitionBuilder<T>
    where
        T: Any + Send + Sync,
        F: Fn(&BeanResolver<'_>) -> ContainerResult<Arc<T>> + Send + Sync + 'static,
    {
        let constructor: Constructor =
            Arc::new(move |resolver| supplier(resolver).map(|bean| bean as Instance));
        BeanDefinitionBuilder::new(name.into(), Instantiation::Constructor(constructor))
    }

    /// 由另一个 Bean 上的工厂方法产生的 Bean
    ///
    /// 生产者默认作为条件父定义：若生产者是条件定义，本定义只在生产者被接纳后才参与评估。
    pub fn factory_method<P, T, F>(
        name: impl Into<String>,
        producer: impl Into<String>,
        method: F,
    ) -> BeanDefinitionBuilder<T>
    where
        P: Any + Send + Sync,
        T: Any + Send + Sync,
        F: Fn(&P, &BeanResolver<'_>) -> ContainerResult<T> + Send + Sync + 'static,
    {
        let producer = producer.into();
        let method: FactoryMethodFn = Arc::new(move |instance: &Instance, resolver| {
            let producer = instance.downcast_ref::<P>().ok_or_else(|| ContainerError::TypeMismatch {
                expected: type_name::<P>().to_string(),
                found: "factory-method producer".to_string(),
            })?;
            method(producer, resolver).map(|bean| Arc::new(bean) as Instance)
        });
        let mut builder = BeanDefinitionBuilder::new(
            name.into(),
            Instantiation::FactoryMethod {
                producer: producer.clone(),
                method,
            },
        );
        builder.definition.parent = Some(producer);
        builder
    }

    /// 注册一个 FactoryBean
    ///
    /// 展开后 `&name` 为工厂本身，`name` 为 `get_object()` 的产品
    pub fn factory_bean<F, C>(name: impl Into<String>, constructor: C) -> BeanDefinitionBuilder<F>
    where
        F: FactoryBean,
        C: Fn(&BeanResolver<'_>) -> ContainerResult<F> + Send + Sync + 'static,
    {
        let mut builder = Self::builder(name, constructor);
        let produce: Producer = Arc::new(|instance: &Instance| {
            let factory = instance.downcast_ref::<F>().ok_or_else(|| ContainerError::TypeMismatch {
                expected: type_name::<F>().to_string(),
                found: "factory bean".to_string(),
            })?;
            factory.get_object().map(|object| object as Instance)
        });
        builder.definition.factory_bean = Some(FactoryBeanMeta {
            object_type: TypeId::of::<F::Object>(),
            object_type_name: type_name::<F::Object>(),
            singleton: F::is_singleton(),
            produce,
            capabilities: Capabilities::of::<F::Object>(),
        });
        builder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 声明类型
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn is_singleton(&self) -> bool {
        self.scope.is_singleton()
    }

    pub fn is_prototype(&self) -> bool {
        self.scope.is_prototype()
    }

    pub fn is_lazy_init(&self) -> bool {
        self.lazy_init
    }

    pub fn is_lazy_proxy(&self) -> bool {
        self.lazy_proxy
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// 排序值，未显式设置时为 [`DEFAULT_ORDER`]
    pub fn order(&self) -> i32 {
        self.order.unwrap_or(DEFAULT_ORDER)
    }

    pub fn explicit_order(&self) -> Option<i32> {
        self.order
    }

    pub fn conditions(&self) -> &[Arc<dyn Condition>] {
        &self.conditions
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    /// 条件父定义
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn origin(&self) -> BeanOrigin {
        match &self.instantiation {
            Instantiation::Constructor(_) => BeanOrigin::Direct,
            Instantiation::FactoryMethod { producer, .. } => BeanOrigin::FactoryMethod {
                producer: producer.clone(),
            },
            Instantiation::FactoryObject { producer, .. } => BeanOrigin::FactoryObject {
                producer: producer.clone(),
            },
        }
    }

    pub fn injection_points(&self) -> &[InjectionPoint] {
        &self.injection_points
    }

    /// 是否可以按类型 `U` 解析
    pub fn provides<U: ?Sized + 'static>(&self) -> bool {
        self.capabilities.provides(TypeId::of::<U>())
    }

    pub fn provides_type(&self, type_id: TypeId) -> bool {
        self.capabilities.provides(type_id)
    }

    /// 可按其解析的全部类型名称
    pub fn exposed_types(&self) -> Vec<&'static str> {
        self.capabilities.type_names()
    }

    /// 把实例转换为 `U`，定义未声明该能力时返回 `None`
    pub fn cast<U: ?Sized + 'static>(&self, instance: &Instance) -> Option<Arc<U>> {
        self.capabilities.cast::<U>(instance)
    }

    /// 是否为尚未展开的 FactoryBean
    pub fn is_factory_bean(&self) -> bool {
        self.factory_bean.is_some()
    }

    pub fn set_scope(&mut self, scope: Scope) {
        self.scope = scope;
    }

    pub fn set_lazy_init(&mut self, lazy_init: bool) {
        self.lazy_init = lazy_init;
    }

    pub fn set_lazy_proxy(&mut self, lazy_proxy: bool) {
        self.lazy_proxy = lazy_proxy;
    }

    pub fn set_primary(&mut self, primary: bool) {
        self.primary = primary;
    }

    pub fn set_order(&mut self, order: i32) {
        self.order = Some(order);
    }

    pub fn set_qualifier(&mut self, qualifier: impl Into<String>) {
        self.qualifier = Some(qualifier.into());
    }

    pub(crate) fn instantiation(&self) -> &Instantiation {
        &self.instantiation
    }

    pub(crate) fn init_methods(&self) -> &[Callback] {
        &self.init_methods
    }

    pub(crate) fn destroy_methods(&self) -> &[Callback] {
        &self.destroy_methods
    }

    /// FactoryBean 展开：返回 (`&name` 工厂定义, `name` 产品定义)
    pub(crate) fn split_factory_bean(mut self) -> Result<(BeanDefinition, BeanDefinition), BeanDefinition> {
        let Some(meta) = self.factory_bean.take() else {
            return Err(self);
        };
        let product_name = std::mem::take(&mut self.name);
        let factory_name = format!("{}{}", FACTORY_BEAN_PREFIX, product_name);
        self.name = factory_name.clone();

        let product = BeanDefinition {
            name: product_name,
            type_id: meta.object_type,
            type_name: meta.object_type_name,
            qualifier: self.qualifier.take(),
            scope: if meta.singleton { Scope::Singleton } else { Scope::Prototype },
            lazy_init: self.lazy_init,
            lazy_proxy: false,
            primary: std::mem::take(&mut self.primary),
            order: self.order,
            conditions: Vec::new(),
            parent: Some(factory_name.clone()),
            instantiation: Instantiation::FactoryObject {
                producer: factory_name,
                produce: meta.produce,
            },
            injection_points: Vec::new(),
            capabilities: meta.capabilities,
            init_methods: Vec::new(),
            destroy_methods: Vec::new(),
            factory_bean: None,
            handles: None,
        };
        Ok((self, product))
    }

    /// 延迟代理展开：返回 (`lazyProxySource.name` 真实定义, `name` 代理定义)
    pub(crate) fn split_lazy_proxy(self) -> Result<(BeanDefinition, BeanDefinition), BeanDefinition> {
        if !self.lazy_proxy {
            return Err(self);
        }
        let Some(handles) = self.handles.clone() else {
            return Err(self);
        };
        let target = format!("{}{}", LAZY_PROXY_SOURCE_PREFIX, self.name);
        let proxy = self.indirection(
            target.clone(),
            handles.lazy_type,
            handles.lazy,
            handles.lazy_capabilities,
            Scope::Singleton,
        );
        let mut source = self;
        source.name = target;
        source.lazy_proxy = false;
        source.lazy_init = true;
        source.primary = false;
        Ok((source, proxy))
    }

    /// 作用域代理展开：返回 (`scopedTarget.name` 原型定义, `name` 代理定义)
    pub(crate) fn split_scoped_proxy(self) -> Result<(BeanDefinition, BeanDefinition), BeanDefinition> {
        if self.scope != Scope::ScopedProxy {
            return Err(self);
        }
        let Some(handles) = self.handles.clone() else {
            return Err(self);
        };
        let target = format!("{}{}", SCOPED_TARGET_PREFIX, self.name);
        let proxy = self.indirection(
            target.clone(),
            handles.scoped_type,
            handles.scoped,
            handles.scoped_capabilities,
            Scope::Singleton,
        );
        let mut source = self;
        source.name = target;
        source.scope = Scope::Prototype;
        source.primary = false;
        Ok((source, proxy))
    }

    fn indirection(
        &self,
        target: String,
        handle_type: (TypeId, &'static str),
        handle: HandleFactory,
        capabilities: Capabilities,
        scope: Scope,
    ) -> BeanDefinition {
        let constructor: Constructor = Arc::new(move |resolver| Ok(handle(resolver, &target)));
        BeanDefinition {
            name: self.name.clone(),
            type_id: handle_type.0,
            type_name: handle_type.1,
            qualifier: self.qualifier.clone(),
            scope,
            lazy_init: self.lazy_init,
            lazy_proxy: false,
            primary: self.primary,
            order: self.order,
            conditions: Vec::new(),
            parent: None,
            instantiation: Instantiation::Constructor(constructor),
            injection_points: Vec::new(),
            capabilities,
            init_methods: Vec::new(),
            destroy_methods: Vec::new(),
            factory_bean: None,
            handles: None,
        }
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("scope", &self.scope)
            .field("origin", &self.origin())
            .field("lazy_init", &self.lazy_init)
            .field("lazy_proxy", &self.lazy_proxy)
            .field("primary", &self.primary)
            .field("order", &self.order)
            .field("conditions", &self.conditions.len())
            .field("injection_points", &self.injection_points)
            .finish()
    }
}

/// BeanDefinition 构建器
pub struct BeanDefinitionBuilder<T> {
    definition: BeanDefinition,
    _type: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> BeanDefinitionBuilder<T> {
    fn new(name: String, instantiation: Instantiation) -> Self {
        Self {
            definition: BeanDefinition {
                name,
                type_id: TypeId::of::<T>(),
                type_name: type_name::<T>(),
                qualifier: None,
                scope: Scope::default(),
                lazy_init: false,
                lazy_proxy: false,
                primary: false,
                order: None,
                conditions: Vec::new(),
                parent: None,
                instantiation,
                injection_points: Vec::new(),
                capabilities: Capabilities::of::<T>(),
                init_methods: Vec::new(),
                destroy_methods: Vec::new(),
                factory_bean: None,
                handles: Some(ProxyHandles::of::<T>()),
            },
            _type: PhantomData,
        }
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.definition.scope = scope;
        self
    }

    pub fn prototype(self) -> Self {
        self.scope(Scope::Prototype)
    }

    /// 首次使用时才创建
    pub fn lazy_init(mut self, lazy_init: bool) -> Self {
        self.definition.lazy_init = lazy_init;
        self
    }

    /// 以 `Lazy<T>` 间接层注册，真实实例在首次 `get()` 时创建
    pub fn lazy_proxy(mut self) -> Self {
        self.definition.lazy_proxy = true;
        self
    }

    /// 以 `Scoped<T>` 间接层注册，每次 `get()` 都由容器物化目标
    pub fn scoped_proxy(self) -> Self {
        self.scope(Scope::ScopedProxy)
    }

    pub fn primary(mut self) -> Self {
        self.definition.primary = true;
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.definition.order = Some(order);
        self
    }

    pub fn qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.definition.qualifier = Some(qualifier.into());
        self
    }

    /// 添加注册条件，多个条件需全部满足
    pub fn condition(mut self, condition: impl Condition + 'static) -> Self {
        self.definition.conditions.push(Arc::new(condition));
        self
    }

    /// 指定条件父定义
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.definition.parent = Some(parent.into());
        self
    }

    /// 允许按类型 `U`（通常是 trait 对象）解析本 Bean
    pub fn expose<U: ?Sized + 'static>(mut self, upcast: fn(Arc<T>) -> Arc<U>) -> Self {
        let caster: Caster<U> =
            Arc::new(move |instance: Instance| instance.downcast::<T>().ok().map(upcast));
        self.definition.capabilities.insert(caster);
        self
    }

    pub fn bean_post_processor(self) -> Self
    where
        T: BeanPostProcessor,
    {
        self.expose::<dyn BeanPostProcessor>(|bean| bean)
    }

    pub fn bean_factory_post_processor(self) -> Self
    where
        T: BeanFactoryPostProcessor,
    {
        self.expose::<dyn BeanFactoryPostProcessor>(|bean| bean)
    }

    pub fn initializing_bean(self) -> Self
    where
        T: InitializingBean,
    {
        self.expose::<dyn InitializingBean>(|bean| bean)
    }

    pub fn disposable_bean(self) -> Self
    where
        T: DisposableBean,
    {
        self.expose::<dyn DisposableBean>(|bean| bean)
    }

    pub fn event_listener(self) -> Self
    where
        T: EventListener,
    {
        self.expose::<dyn EventListener>(|bean| bean)
    }

    pub fn lifecycle_listener(self) -> Self
    where
        T: LifecycleListener,
    {
        self.expose::<dyn LifecycleListener>(|bean| bean)
    }

    /// 按类型注入到 `Autowired` 字段
    pub fn autowire<U: ?Sized + 'static>(self, field: fn(&T) -> &Autowired<U>) -> Self {
        self.injection(field, None, true, false)
    }

    /// 按名称注入
    pub fn autowire_named<U: ?Sized + 'static>(
        self,
        qualifier: impl Into<String>,
        field: fn(&T) -> &Autowired<U>,
    ) -> Self {
        self.injection(field, Some(qualifier.into()), true, false)
    }

    /// 没有候选时保持未注入
    pub fn autowire_optional<U: ?Sized + 'static>(self, field: fn(&T) -> &Autowired<U>) -> Self {
        self.injection(field, None, false, false)
    }

    /// 推迟到 Wired 阶段注入
    pub fn autowire_lazy<U: ?Sized + 'static>(self, field: fn(&T) -> &Autowired<U>) -> Self {
        self.injection(field, None, true, true)
    }

    fn injection<U: ?Sized + 'static>(
        mut self,
        field: fn(&T) -> &Autowired<U>,
        qualifier: Option<String>,
        required: bool,
        lazy: bool,
    ) -> Self {
        let wanted = qualifier.clone();
        let inject: Injector = Arc::new(move |instance: &Instance, resolver| {
            let owner = instance.downcast_ref::<T>().ok_or_else(|| ContainerError::TypeMismatch {
                expected: type_name::<T>().to_string(),
                found: "injection target".to_string(),
            })?;
            if let Some(dependency) = resolver.resolve_field::<U>(wanted.as_deref(), required)? {
                field(owner).wire(dependency);
            }
            Ok(())
        });
        self.definition.injection_points.push(InjectionPoint {
            dependency: type_name::<U>(),
            qualifier,
            required,
            lazy,
            inject,
        });
        self
    }

    /// 初始化方法，在 `after_properties_set` 之后调用
    pub fn init_method<F>(mut self, init: F) -> Self
    where
        F: Fn(&T) -> ContainerResult<()> + Send + Sync + 'static,
    {
        self.definition.init_methods.push(typed_callback(init));
        self
    }

    /// 销毁方法，在 `on_destroy` 之后调用
    pub fn destroy_method<F>(mut self, destroy: F) -> Self
    where
        F: Fn(&T) -> ContainerResult<()> + Send + Sync + 'static,
    {
        self.definition.destroy_methods.push(typed_callback(destroy));
        self
    }

    pub fn build(self) -> BeanDefinition {
        self.definition
    }
}

fn typed_callback<T, F>(callback: F) -> Callback
where
    T: Any + Send + Sync,
    F: Fn(&T) -> ContainerResult<()> + Send + Sync + 'static,
{
    Arc::new(move |instance: &Instance| match instance.downcast_ref::<T>() {
        Some(bean) => callback(bean),
        None => Err(ContainerError::TypeMismatch {
            expected: type_name::<T>().to_string(),
            found: "lifecycle callback target".to_string(),
        }),
    })
}

impl<T: Any + Send + Sync> From<BeanDefinitionBuilder<T>> for BeanDefinition {
    fn from(builder: BeanDefinitionBuilder<T>) -> Self {
        builder.build()
    }
}

/// 字段注入单元
///
/// 注入只发生一次。在注入完成之前解引用会 panic，
/// 对可能缺失的依赖请使用 [`Autowired::get`]。
pub struct Autowired<T: ?Sized> {
    cell: OnceCell<Arc<T>>,
}

impl<T: ?Sized> Autowired<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub fn get(&self) -> Option<&Arc<T>> {
        self.cell.get()
    }

    pub fn is_wired(&self) -> bool {
        self.cell.get().is_some()
    }

    pub(crate) fn wire(&self, value: Arc<T>) -> bool {
        self.cell.set(value).is_ok()
    }
}

impl<T: ?Sized> Default for Autowired<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Deref for Autowired<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.cell.get() {
            Some(value) => value,
            None => panic!("Autowired<{}> used before injection", type_name::<T>()),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Autowired<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Autowired")
            .field("type", &type_name::<T>())
            .field("wired", &self.is_wired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    #[test]
    fn test_builder_records_flags() {
        let definition = BeanDefinition::builder("english", |_| Ok(English))
            .prototype()
            .primary()
            .order(5)
            .qualifier("en")
            .build();

        assert_eq!(definition.name(), "english");
        assert!(definition.is_prototype());
        assert!(definition.is_primary());
        assert_eq!(definition.order(), 5);
        assert_eq!(definition.qualifier(), Some("en"));
        assert_eq!(definition.origin(), BeanOrigin::Direct);
        assert!(definition.type_name().ends_with("English"));
    }

    #[test]
    fn test_expose_allows_trait_object_cast() {
        let definition = BeanDefinition::builder("english", |_| Ok(English))
            .expose::<dyn Greeter>(|bean| bean)
            .build();

        let instance: Instance = Arc::new(English);
        assert!(definition.provides::<English>());
        assert!(definition.provides::<dyn Greeter>());
        let greeter = definition.cast::<dyn Greeter>(&instance).unwrap();
        assert_eq!(greeter.greet(), "hello");
        assert!(definition.cast::<String>(&instance).is_none());
    }

    #[test]
    fn test_default_order() {
        let definition = BeanDefinition::builder("english", |_| Ok(English)).build();
        assert_eq!(definition.order(), DEFAULT_ORDER);
        assert_eq!(definition.explicit_order(), None);
    }

    #[test]
    fn test_factory_method_uses_producer_as_parent() {
        struct Config;
        let definition = BeanDefinition::factory_method("english", "config", |_: &Config, _| Ok(English)).build();
        assert_eq!(definition.parent(), Some("config"));
        assert_eq!(
            definition.origin(),
            BeanOrigin::FactoryMethod {
                producer: "config".into()
            }
        );
    }

    #[test]
    fn test_factory_bean_split() {
        struct EnglishFactory;
        impl FactoryBean for EnglishFactory {
            type Object = English;
            fn get_object(&self) -> ContainerResult<Arc<English>> {
                Ok(Arc::new(English))
            }
        }

        let definition = BeanDefinition::factory_bean("english", |_| Ok(EnglishFactory)).build();
        assert!(definition.is_factory_bean());

        let (factory, product) = definition.split_factory_bean().ok().unwrap();
        assert_eq!(factory.name(), "&english");
        assert!(!factory.is_factory_bean());
        assert_eq!(product.name(), "english");
        assert!(product.provides::<English>());
        assert_eq!(
            product.origin(),
            BeanOrigin::FactoryObject {
                producer: "&english".into()
            }
        );
    }

    #[test]
    fn test_lazy_proxy_split() {
        let definition = BeanDefinition::builder("english", |_| Ok(English)).lazy_proxy().build();
        let (source, proxy) = definition.split_lazy_proxy().ok().unwrap();
        assert_eq!(source.name(), "lazyProxySource.english");
        assert!(source.is_lazy_init());
        assert!(!source.is_lazy_proxy());
        assert_eq!(proxy.name(), "english");
        assert!(proxy.provides::<Lazy<English>>());
    }

    #[test]
    fn test_split_is_noop_without_flag() {
        let definition = BeanDefinition::builder("english", |_| Ok(English)).build();
        let definition = definition.split_lazy_proxy().err().unwrap();
        let definition = definition.split_scoped_proxy().err().unwrap();
        assert!(definition.split_factory_bean().is_err());
    }

    #[test]
    fn test_autowired_cell() {
        let cell: Autowired<dyn Greeter> = Autowired::new();
        assert!(!cell.is_wired());
        assert!(cell.wire(Arc::new(English)));
        assert!(!cell.wire(Arc::new(English)));
        assert_eq!(cell.greet(), "hello");
    }

    #[test]
    #[should_panic(expected = "used before injection")]
    fn test_autowired_deref_before_injection_panics() {
        let cell: Autowired<English> = Autowired::new();
        let _ = cell.greet();
    }
}
