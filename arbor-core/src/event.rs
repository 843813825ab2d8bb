use std::any::Any;
use std::marker::PhantomData;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;

/// 事件 trait - 所有事件都必须实现此 trait
pub trait Event: Any + Send + Sync {
    /// 获取事件名称
    fn event_name(&self) -> &str;

    /// 获取事件时间戳
    fn timestamp(&self) -> SystemTime;

    /// 转换为 Any 引用，用于类型转换
    fn as_any(&self) -> &dyn Any;
}

/// 容器就绪事件
///
/// 所有非延迟单例完成装配与初始化之后发布
#[derive(Debug, Clone)]
pub struct ContainerReadyEvent {
    /// 应用名称
    pub app_name: String,
    /// 已创建的单例数量
    pub singleton_count: usize,
    /// refresh 耗时
    pub startup_time: Duration,
    pub timestamp: SystemTime,
}

impl ContainerReadyEvent {
    pub fn new(app_name: impl Into<String>, singleton_count: usize, startup_time: Duration) -> Self {
        Self {
            app_name: app_name.into(),
            singleton_count,
            startup_time,
            timestamp: SystemTime::now(),
        }
    }
}

impl Event for ContainerReadyEvent {
    fn event_name(&self) -> &str {
        "ContainerReadyEvent"
    }

    fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 容器关闭事件
///
/// 在销毁任何单例之前发布
#[derive(Debug, Clone)]
pub struct ContainerClosedEvent {
    pub app_name: String,
    pub timestamp: SystemTime,
}

impl ContainerClosedEvent {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            timestamp: SystemTime::now(),
        }
    }
}

impl Event for ContainerClosedEvent {
    fn event_name(&self) -> &str {
        "ContainerClosedEvent"
    }

    fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 事件监听器 trait
///
/// Bean 可以通过 `event_listener()` 能力声明自己是监听器，
/// 容器在 Ready 阶段发布就绪事件之前把它们注册到多播器上
pub trait EventListener: Send + Sync {
    /// 处理事件
    fn on_event(&self, event: Arc<dyn Event>);

    /// 获取监听器名称（用于日志与移除）
    fn listener_name(&self) -> &str {
        "AnonymousListener"
    }

    /// 是否支持该事件类型，默认支持所有事件
    fn supports_event(&self, event_name: &str) -> bool {
        let _ = event_name;
        true
    }
}

/// 只接收某一种事件的闭包监听器
pub struct TypedEventListener<E, F> {
    name: String,
    handler: F,
    _event: PhantomData<fn(&E)>,
}

impl<E, F> TypedEventListener<E, F>
where
    E: Event,
    F: Fn(&E) + Send + Sync,
{
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
            _event: PhantomData,
        }
    }
}

impl<E, F> EventListener for TypedEventListener<E, F>
where
    E: Event,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: Arc<dyn Event>) {
        if let Some(typed) = event.as_any().downcast_ref::<E>() {
            (self.handler)(typed);
        }
    }

    fn listener_name(&self) -> &str {
        &self.name
    }
}

/// 错误处理器类型
///
/// 设置后，监听器的 panic 被捕获并交给处理器，不再中断后续监听器
pub type ErrorHandler = Arc<dyn Fn(&dyn EventListener, &Arc<dyn Event>, &anyhow::Error) + Send + Sync>;

/// 事件多播器 trait
///
/// 负责将事件传播到所有注册的监听器
pub trait ApplicationEventMulticaster: Send + Sync {
    fn add_listener(&self, listener: Arc<dyn EventListener>);

    fn remove_listener(&self, listener_name: &str);

    fn remove_all_listeners(&self);

    /// 同步广播事件，按注册顺序调用监听器
    fn multicast_event(&self, event: Arc<dyn Event>);

    fn listener_count(&self) -> usize;
}

/// 简单事件多播器实现，在发布线程上同步执行
#[derive(Default)]
pub struct SimpleApplicationEventMulticaster {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
    error_handler: RwLock<Option<ErrorHandler>>,
}

impl SimpleApplicationEventMulticaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置错误处理器
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&dyn EventListener, &Arc<dyn Event>, &anyhow::Error) + Send + Sync + 'static,
    {
        *self.error_handler.write() = Some(Arc::new(handler));
    }

    /// 移除错误处理器
    pub fn remove_error_handler(&self) {
        *self.error_handler.write() = None;
    }

    fn invoke_listener(
        &self,
        listener: &Arc<dyn EventListener>,
        event: &Arc<dyn Event>,
        error_handler: Option<&ErrorHandler>,
    ) {
        let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_event(Arc::clone(event))));
        let Err(payload) = outcome else {
            return;
        };

        match error_handler {
            Some(handler) => {
                let err = anyhow::anyhow!("Listener panicked: {}", panic_message(&*payload));
                handler(listener.as_ref(), event, &err);
            }
            None => {
                tracing::error!(
                    "Listener '{}' panicked while handling event '{}'",
                    listener.listener_name(),
                    event.event_name()
                );
                resume_unwind(payload);
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl ApplicationEventMulticaster for SimpleApplicationEventMulticaster {
    fn add_listener(&self, listener: Arc<dyn EventListener>) {
        tracing::debug!("Added event listener: {}", listener.listener_name());
        self.listeners.write().push(listener);
    }

    fn remove_listener(&self, listener_name: &str) {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.listener_name() != listener_name);
        if listeners.len() != before {
            tracing::debug!("Removed event listener: {}", listener_name);
        }
    }

    fn remove_all_listeners(&self) {
        self.listeners.write().clear();
        tracing::debug!("Removed all event listeners");
    }

    fn multicast_event(&self, event: Arc<dyn Event>) {
        let event_name = event.event_name().to_string();
        // 先复制一份，监听器内部可以继续注册或发布
        let targets: Vec<_> = self
            .listeners
            .read()
            .iter()
            .filter(|l| l.supports_event(&event_name))
            .cloned()
            .collect();

        tracing::debug!(
            "Multicasting event: {} to {} listener(s)",
            event_name,
            targets.len()
        );

        let error_handler = self.error_handler.read().clone();
        for listener in &targets {
            self.invoke_listener(listener, &event, error_handler.as_ref());
        }
    }

    fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

/// 事件发布器
///
/// 内置 Bean `eventPublisher`，由容器创建，用户通过依赖注入获取
pub struct ApplicationEventPublisher {
    multicaster: Arc<dyn ApplicationEventMulticaster>,
}

impl ApplicationEventPublisher {
    pub(crate) fn new(multicaster: Arc<dyn ApplicationEventMulticaster>) -> Self {
        Self { multicaster }
    }

    /// 发布事件
    pub fn publish_event(&self, event: Arc<dyn Event>) {
        self.multicaster.multicast_event(event);
    }

    /// 发布具体类型的事件
    pub fn publish<E: Event>(&self, event: E) {
        self.publish_event(Arc::new(event));
    }

    pub fn multicaster(&self) -> &Arc<dyn ApplicationEventMulticaster> {
        &self.multicaster
    }

    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.multicaster.add_listener(listener);
    }

    pub fn remove_listener(&self, listener_name: &str) {
        self.multicaster.remove_listener(listener_name);
    }

    pub fn listener_count(&self) -> usize {
        self.multicaster.listener_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_typed_listener_only_sees_its_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let publisher = ApplicationEventPublisher::new(Arc::new(SimpleApplicationEventMulticaster::new()));
        publisher.add_listener(Arc::new(TypedEventListener::new(
            "readyListener",
            move |event: &ContainerReadyEvent| sink.lock().push(event.singleton_count),
        )));

        publisher.publish(ContainerClosedEvent::new("app"));
        publisher.publish(ContainerReadyEvent::new("app", 3, Duration::from_millis(5)));

        assert_eq!(*seen.lock(), vec![3]);
    }

    #[test]
    fn test_error_handler_isolates_panicking_listener() {
        struct Panicking;
        impl EventListener for Panicking {
            fn on_event(&self, _event: Arc<dyn Event>) {
                panic!("listener failure");
            }
            fn listener_name(&self) -> &str {
                "panicking"
            }
        }

        let multicaster = Arc::new(SimpleApplicationEventMulticaster::new());
        let handled = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&handled);
        multicaster.set_error_handler(move |listener, _event, err| {
            sink.lock().push(format!("{}: {}", listener.listener_name(), err));
        });

        let delivered = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&delivered);
        multicaster.add_listener(Arc::new(Panicking));
        multicaster.add_listener(Arc::new(TypedEventListener::new(
            "counter",
            move |_: &ContainerClosedEvent| *counter.lock() += 1,
        )));

        multicaster.multicast_event(Arc::new(ContainerClosedEvent::new("app")));

        assert_eq!(*delivered.lock(), 1);
        let handled = handled.lock();
        assert_eq!(handled.len(), 1);
        assert!(handled[0].contains("listener failure"));
    }

    #[test]
    fn test_remove_listener_by_name() {
        let multicaster = SimpleApplicationEventMulticaster::new();
        multicaster.add_listener(Arc::new(TypedEventListener::new("a", |_: &ContainerClosedEvent| {})));
        multicaster.add_listener(Arc::new(TypedEventListener::new("b", |_: &ContainerClosedEvent| {})));
        multicaster.remove_listener("a");
        assert_eq!(multicaster.listener_count(), 1);
        multicaster.remove_all_listeners();
        assert_eq!(multicaster.listener_count(), 0);
    }
}
