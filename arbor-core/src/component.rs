//! 候选组件来源
//!
//! 类型发现不属于容器本身：外部枚举器通过 [`CandidateSource`] 交出候选定义和它们的
//! 描述性标记，容器在 DefinitionsLoaded 阶段用包含 / 排除过滤器筛选后注册。
//!
//! 通过 `inventory` 在编译期登记的组件由 [`InventoryCandidateSource`] 读取：
//!
//! ```ignore
//! fn user_service() -> BeanDefinition {
//!     BeanDefinition::builder("userService", |r| Ok(UserService::new(r.get()?))).build()
//! }
//!
//! arbor_core::submit_component!(UserService, ["service"], user_service);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::bean::BeanDefinition;

/// 候选组件
#[derive(Clone)]
pub struct Candidate {
    pub type_name: String,
    pub markers: Vec<String>,
    pub definition: BeanDefinition,
}

impl Candidate {
    pub fn new(definition: BeanDefinition) -> Self {
        Self {
            type_name: definition.type_name().to_string(),
            markers: Vec::new(),
            definition,
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.markers.push(marker.into());
        self
    }

    pub fn has_marker(&self, marker: &str) -> bool {
        self.markers.iter().any(|m| m == marker)
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("type_name", &self.type_name)
            .field("markers", &self.markers)
            .field("bean", &self.definition.name())
            .finish()
    }
}

/// 候选组件来源
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &str;

    fn candidates(&self) -> Vec<Candidate>;
}

/// 固定的候选列表
pub struct StaticCandidateSource {
    name: String,
    candidates: Vec<Candidate>,
}

impl StaticCandidateSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            candidates: Vec::new(),
        }
    }

    pub fn with(mut self, candidate: Candidate) -> Self {
        self.candidates.push(candidate);
        self
    }
}

impl CandidateSource for StaticCandidateSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn candidates(&self) -> Vec<Candidate> {
        self.candidates.clone()
    }
}

/// 编译期组件登记
pub struct ComponentRegistration {
    pub type_name: &'static str,
    pub markers: &'static [&'static str],
    pub create: fn() -> BeanDefinition,
}

inventory::collect!(ComponentRegistration);

/// 登记一个组件，`create` 返回它的 Bean 定义
#[macro_export]
macro_rules! submit_component {
    ($component:ty, $create:expr) => {
        $crate::submit_component!($component, [], $create);
    };
    ($component:ty, [$($marker:expr),* $(,)?], $create:expr) => {
        $crate::inventory::submit! {
            $crate::component::ComponentRegistration {
                type_name: concat!(module_path!(), "::", stringify!($component)),
                markers: &[$($marker),*],
                create: $create,
            }
        }
    };
}

/// 读取所有通过 `submit_component!` 登记的组件
#[derive(Debug, Default)]
pub struct InventoryCandidateSource;

impl CandidateSource for InventoryCandidateSource {
    fn name(&self) -> &str {
        "inventory"
    }

    fn candidates(&self) -> Vec<Candidate> {
        inventory::iter::<ComponentRegistration>
            .into_iter()
            .map(|registration| Candidate {
                type_name: registration.type_name.to_string(),
                markers: registration.markers.iter().map(|m| m.to_string()).collect(),
                definition: (registration.create)(),
            })
            .collect()
    }
}

/// 候选过滤器
#[derive(Clone)]
pub enum ComponentFilter {
    /// 类型全名前缀
    TypePrefix(String),
    /// 带有指定标记
    Marker(String),
    Custom(Arc<dyn Fn(&Candidate) -> bool + Send + Sync>),
}

impl ComponentFilter {
    pub fn type_prefix(prefix: impl Into<String>) -> Self {
        ComponentFilter::TypePrefix(prefix.into())
    }

    pub fn marker(marker: impl Into<String>) -> Self {
        ComponentFilter::Marker(marker.into())
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&Candidate) -> bool + Send + Sync + 'static,
    {
        ComponentFilter::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, candidate: &Candidate) -> bool {
        match self {
            ComponentFilter::TypePrefix(prefix) => candidate.type_name.starts_with(prefix.as_str()),
            ComponentFilter::Marker(marker) => candidate.has_marker(marker),
            ComponentFilter::Custom(predicate) => predicate(candidate),
        }
    }
}

impl fmt::Debug for ComponentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentFilter::TypePrefix(prefix) => f.debug_tuple("TypePrefix").field(prefix).finish(),
            ComponentFilter::Marker(marker) => f.debug_tuple("Marker").field(marker).finish(),
            ComponentFilter::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// 排除优先；存在包含过滤器时必须至少命中一个
pub(crate) fn is_accepted(
    candidate: &Candidate,
    include_filters: &[ComponentFilter],
    exclude_filters: &[ComponentFilter],
) -> bool {
    if exclude_filters.iter().any(|f| f.matches(candidate)) {
        return false;
    }
    include_filters.is_empty() || include_filters.iter().any(|f| f.matches(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Repository;

    fn repository() -> BeanDefinition {
        BeanDefinition::builder("repository", |_| Ok(Repository)).build()
    }

    crate::submit_component!(Repository, ["data"], repository);

    fn candidate(type_name: &str, markers: &[&str]) -> Candidate {
        let mut candidate = Candidate::new(repository());
        candidate.type_name = type_name.to_string();
        for marker in markers {
            candidate = candidate.with_marker(*marker);
        }
        candidate
    }

    #[test]
    fn test_exclusion_wins_over_inclusion() {
        let c = candidate("app::data::Repository", &["data"]);
        let includes = [ComponentFilter::type_prefix("app::")];
        let excludes = [ComponentFilter::marker("data")];
        assert!(!is_accepted(&c, &includes, &excludes));
        assert!(is_accepted(&c, &includes, &[]));
    }

    #[test]
    fn test_includes_must_match_when_present() {
        let c = candidate("app::web::Controller", &[]);
        assert!(is_accepted(&c, &[], &[]));
        assert!(!is_accepted(&c, &[ComponentFilter::marker("service")], &[]));
        assert!(is_accepted(
            &c,
            &[ComponentFilter::custom(|c| c.type_name.ends_with("Controller"))],
            &[]
        ));
    }

    #[test]
    fn test_inventory_source_reads_registrations() {
        let candidates = InventoryCandidateSource.candidates();
        let found = candidates
            .iter()
            .find(|c| c.type_name.ends_with("::Repository"))
            .expect("registered component");
        assert!(found.has_marker("data"));
        assert_eq!(found.definition.name(), "repository");
    }
}
