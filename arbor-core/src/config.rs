use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::{ApplicationError, ApplicationResult};

/// 配置值类型
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
    Object(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    /// 转换为字符串
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// 转换为整数
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// 转换为浮点数
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Int(i) => Some(*i as f64),
            ConfigValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// 转换为布尔值
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// 以字符串形式渲染标量值，用于属性条件的比较
    pub fn to_plain_string(&self) -> Option<String> {
        match self {
            ConfigValue::String(s) => Some(s.clone()),
            ConfigValue::Int(i) => Some(i.to_string()),
            ConfigValue::Float(f) => Some(f.to_string()),
            ConfigValue::Bool(b) => Some(b.to_string()),
            ConfigValue::Array(_) | ConfigValue::Object(_) => None,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

/// 配置源 trait
pub trait PropertySource: Send + Sync {
    /// 获取配置源名称
    fn name(&self) -> &str;

    /// 获取配置值
    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// 获取所有配置键
    fn keys(&self) -> Vec<String>;

    /// 配置源优先级（数字越大优先级越高）
    fn priority(&self) -> i32 {
        0
    }
}

/// Environment - 配置管理器
///
/// 提供统一的配置访问接口，容器的属性条件和 `ContainerSettings` 都从这里读取
pub struct Environment {
    /// 配置源列表（按优先级排序）
    sources: RwLock<Vec<Box<dyn PropertySource>>>,

    /// 当前激活的 profile
    active_profiles: RwLock<Vec<String>>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("active_profiles", &*self.active_profiles.read())
            .field("sources_count", &self.sources.read().len())
            .finish()
    }
}

impl Environment {
    /// 创建新的环境
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            active_profiles: RwLock::new(Vec::new()),
        }
    }

    /// 添加配置源
    pub fn add_property_source(&self, source: Box<dyn PropertySource>) {
        let mut sources = self.sources.write();
        tracing::debug!(
            "Adding property source '{}' (priority {})",
            source.name(),
            source.priority()
        );
        sources.push(source);
        // 稳定排序：同优先级保持添加顺序
        sources.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// 获取配置值
    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let sources = self.sources.read();
        for source in sources.iter() {
            if let Some(value) = source.get(key) {
                tracing::trace!("Config '{}' found in source '{}'", key, source.name());
                return Some(value);
            }
        }
        tracing::trace!("Config '{}' not found in any source", key);
        None
    }

    /// 是否存在指定配置
    pub fn contains_property(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// 获取字符串配置
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.to_plain_string())
    }

    /// 获取字符串配置（带默认值）
    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    /// 获取整数配置
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    /// 获取整数配置（带默认值）
    pub fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get_i64(key).unwrap_or(default)
    }

    /// 获取浮点数配置
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    /// 获取布尔值配置
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// 获取布尔值配置（带默认值）
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// 获取字符串数组配置
    /// 支持两种格式:
    /// 1. TOML数组: key = ["a", "b", "c"]
    /// 2. 逗号分隔字符串: key = "a, b, c"
    pub fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key)? {
            ConfigValue::Array(arr) => Some(arr.iter().filter_map(|v| v.to_plain_string()).collect()),
            ConfigValue::String(s) => Some(
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            _ => None,
        }
    }

    /// 设置激活的 profile
    pub fn set_active_profiles(&self, profiles: Vec<String>) {
        *self.active_profiles.write() = profiles;
    }

    /// 获取激活的 profile
    pub fn get_active_profiles(&self) -> Vec<String> {
        self.active_profiles.read().clone()
    }

    /// 检查是否包含指定的 profile
    pub fn accepts_profiles(&self, profile: &str) -> bool {
        self.active_profiles.read().iter().any(|p| p == profile)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

// ========== Property Sources ==========

/// 环境变量配置源
pub struct EnvironmentPropertySource {
    prefix: String,
    priority: i32,
}

impl EnvironmentPropertySource {
    /// 创建环境变量配置源
    ///
    /// # 参数
    /// * `prefix` - 环境变量前缀，例如 "APP_"
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            priority: 100,
        }
    }

    /// 将环境变量名转换为配置键
    /// 例如: APP_DATABASE_URL -> database.url
    fn env_to_key(&self, env_key: &str) -> String {
        env_key
            .strip_prefix(&self.prefix)
            .unwrap_or(env_key)
            .to_lowercase()
            .replace('_', ".")
    }

    /// 将配置键转换为环境变量名
    /// 例如: database.url -> APP_DATABASE_URL
    fn key_to_env(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.replace(['.', '-'], "_").to_uppercase())
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "systemEnvironment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.key_to_env(key)).ok().map(ConfigValue::String)
    }

    fn keys(&self) -> Vec<String> {
        std::env::vars()
            .filter(|(k, _)| k.starts_with(&self.prefix))
            .map(|(k, _)| self.env_to_key(&k))
            .collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// TOML 配置源
///
/// 只负责解析已读入内存的文本，文件的定位与读取由调用方完成
pub struct TomlPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl TomlPropertySource {
    /// 从字符串解析 TOML 配置
    pub fn from_str(content: &str, name: impl Into<String>) -> ApplicationResult<Self> {
        let value: toml::Value = toml::from_str(content)
            .map_err(|e| ApplicationError::ConfigParseFailed(e.to_string()))?;

        let mut properties = HashMap::new();
        flatten_toml(&value, String::new(), &mut properties);

        Ok(Self {
            name: name.into(),
            properties,
            priority: 0,
        })
    }

    /// 设置优先级
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// 展平 TOML 结构
/// 例如: { database: { url: "xxx" } } -> { "database.url": "xxx" }
fn flatten_toml(value: &toml::Value, prefix: String, result: &mut HashMap<String, ConfigValue>) {
    match value {
        toml::Value::Table(table) => {
            for (key, val) in table {
                let new_prefix = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_toml(val, new_prefix, result);
            }
        }
        other => {
            result.insert(prefix, toml_value_to_config(other));
        }
    }
}

fn toml_value_to_config(value: &toml::Value) -> ConfigValue {
    match value {
        toml::Value::String(s) => ConfigValue::String(s.clone()),
        toml::Value::Integer(i) => ConfigValue::Int(*i),
        toml::Value::Float(f) => ConfigValue::Float(*f),
        toml::Value::Boolean(b) => ConfigValue::Bool(*b),
        toml::Value::Array(arr) => ConfigValue::Array(arr.iter().map(toml_value_to_config).collect()),
        toml::Value::Table(table) => ConfigValue::Object(
            table
                .iter()
                .map(|(k, v)| (k.clone(), toml_value_to_config(v)))
                .collect(),
        ),
        toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// 内存配置源（用于测试或运行时配置）
pub struct MapPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            priority: 50,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

// ========== Container Settings ==========

/// 容器行为开关
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// 是否允许通过字段注入提前暴露的引用打破循环依赖
    pub allow_circular_references: bool,

    /// 为 true 时所有单例都按 lazy_init 处理
    pub lazy_init: bool,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            allow_circular_references: true,
            lazy_init: false,
        }
    }
}

#[derive(Deserialize)]
struct SettingsDocument {
    #[serde(default)]
    container: ContainerSettings,
}

impl ContainerSettings {
    /// 从 TOML 文本的 `[container]` 表读取
    pub fn from_toml(content: &str) -> ApplicationResult<Self> {
        let document: SettingsDocument = toml::from_str(content)
            .map_err(|e| ApplicationError::ConfigParseFailed(e.to_string()))?;
        Ok(document.container)
    }

    /// 从 `container.*` 属性读取，缺失的键使用默认值
    pub fn from_environment(environment: &Environment) -> Self {
        let defaults = Self::default();
        Self {
            allow_circular_references: environment.get_bool_or(
                "container.allow-circular-references",
                environment.get_bool_or(
                    "container.allow_circular_references",
                    defaults.allow_circular_references,
                ),
            ),
            lazy_init: environment.get_bool_or(
                "container.lazy-init",
                environment.get_bool_or("container.lazy_init", defaults.lazy_init),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_higher_priority_source_wins() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("low").with_property("app.name", "low").with_priority(1),
        ));
        env.add_property_source(Box::new(
            MapPropertySource::new("high").with_property("app.name", "high").with_priority(10),
        ));
        assert_eq!(env.get_string("app.name").as_deref(), Some("high"));
    }

    #[test]
    fn test_toml_source_is_flattened() {
        let source = TomlPropertySource::from_str(
            r#"
            [database]
            url = "postgres://localhost"
            pool = 8
            tags = ["a", "b"]
            "#,
            "application.toml",
        )
        .unwrap();

        assert_eq!(
            source.get("database.url"),
            Some(ConfigValue::String("postgres://localhost".into()))
        );
        assert_eq!(source.get("database.pool").and_then(|v| v.as_i64()), Some(8));

        let env = Environment::new();
        env.add_property_source(Box::new(source));
        assert_eq!(
            env.get_string_array("database.tags"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let err = TomlPropertySource::from_str("[[broken", "bad").err().unwrap();
        assert!(matches!(err, ApplicationError::ConfigParseFailed(_)));
    }

    #[test]
    fn test_profiles() {
        let env = Environment::new();
        env.set_active_profiles(vec!["dev".into()]);
        assert!(env.accepts_profiles("dev"));
        assert!(!env.accepts_profiles("prod"));
    }

    #[test]
    fn test_container_settings_from_toml() {
        let settings = ContainerSettings::from_toml(
            r#"
            [container]
            allow_circular_references = false
            "#,
        )
        .unwrap();
        assert!(!settings.allow_circular_references);
        assert!(!settings.lazy_init);

        assert_eq!(ContainerSettings::from_toml("").unwrap(), ContainerSettings::default());
    }

    #[test]
    fn test_container_settings_from_environment() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("test").with_property("container.lazy-init", true),
        ));
        let settings = ContainerSettings::from_environment(&env);
        assert!(settings.lazy_init);
        assert!(settings.allow_circular_references);
    }
}
