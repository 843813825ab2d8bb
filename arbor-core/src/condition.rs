//! 条件注册
//!
//! 带条件的 Bean 定义先进入待定区，由 [`ConditionalResolver`] 按注册顺序（受 order 调整）
//! 在当前注册表状态上评估。接纳是一次性的：一旦注册就不再重新评估。
//! 被拒绝的定义继续待定，后续的解析轮次还会再看它一次；PostProcessed 阶段结束时
//! 仍未被接纳的定义被丢弃，只记录日志，不算错误。

use std::any::{type_name, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

use crate::bean_factory::{DefaultListableBeanFactory, ListableBeanFactory};
use crate::config::Environment;
use crate::error::ContainerResult;

/// 条件评估上下文
///
/// 每次评估时读取注册表的当前状态，已接纳的条件定义对后续评估可见
pub struct ConditionContext<'a> {
    bean_factory: &'a DefaultListableBeanFactory,
    environment: &'a Environment,
}

impl<'a> ConditionContext<'a> {
    pub(crate) fn new(bean_factory: &'a DefaultListableBeanFactory, environment: &'a Environment) -> Self {
        Self {
            bean_factory,
            environment,
        }
    }

    /// 注册表中是否已有该名称的定义
    pub fn contains_bean(&self, name: &str) -> bool {
        self.bean_factory.contains_bean_definition(name)
    }

    /// 注册表中是否已有能按该类型解析的定义
    pub fn contains_bean_of_type(&self, type_id: TypeId) -> bool {
        !self.bean_factory.bean_names_for_type_id(type_id).is_empty()
    }

    pub fn bean_names_for_type(&self, type_id: TypeId) -> Vec<String> {
        self.bean_factory.bean_names_for_type_id(type_id)
    }

    pub fn environment(&self) -> &Environment {
        self.environment
    }
}

/// 注册条件
pub trait Condition: Send + Sync {
    fn matches(&self, context: &ConditionContext<'_>) -> bool;

    /// 用于日志的描述
    fn describe(&self) -> String {
        "custom condition".to_string()
    }
}

/// 闭包条件
pub struct FnCondition<F> {
    description: String,
    predicate: F,
}

impl<F> Condition for FnCondition<F>
where
    F: Fn(&ConditionContext<'_>) -> bool + Send + Sync,
{
    fn matches(&self, context: &ConditionContext<'_>) -> bool {
        (self.predicate)(context)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// 从闭包构造条件
pub fn from_fn<F>(description: impl Into<String>, predicate: F) -> FnCondition<F>
where
    F: Fn(&ConditionContext<'_>) -> bool + Send + Sync,
{
    FnCondition {
        description: description.into(),
        predicate,
    }
}

/// 存在指定名称的 Bean
#[derive(Debug, Clone)]
pub struct OnBean(pub String);

impl OnBean {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl Condition for OnBean {
    fn matches(&self, context: &ConditionContext<'_>) -> bool {
        context.contains_bean(&self.0)
    }

    fn describe(&self) -> String {
        format!("OnBean({})", self.0)
    }
}

/// 不存在指定名称的 Bean
#[derive(Debug, Clone)]
pub struct OnMissingBean(pub String);

impl OnMissingBean {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl Condition for OnMissingBean {
    fn matches(&self, context: &ConditionContext<'_>) -> bool {
        !context.contains_bean(&self.0)
    }

    fn describe(&self) -> String {
        format!("OnMissingBean({})", self.0)
    }
}

/// 存在能按类型 `T` 解析的 Bean
pub struct OnBeanType<T: ?Sized>(PhantomData<fn() -> Box<T>>);

impl<T: ?Sized + 'static> OnBeanType<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: ?Sized + 'static> Default for OnBeanType<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + 'static> Condition for OnBeanType<T> {
    fn matches(&self, context: &ConditionContext<'_>) -> bool {
        context.contains_bean_of_type(TypeId::of::<T>())
    }

    fn describe(&self) -> String {
        format!("OnBeanType({})", type_name::<T>())
    }
}

/// 不存在能按类型 `T` 解析的 Bean
pub struct OnMissingBeanType<T: ?Sized>(PhantomData<fn() -> Box<T>>);

impl<T: ?Sized + 'static> OnMissingBeanType<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: ?Sized + 'static> Default for OnMissingBeanType<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + 'static> Condition for OnMissingBeanType<T> {
    fn matches(&self, context: &ConditionContext<'_>) -> bool {
        !context.contains_bean_of_type(TypeId::of::<T>())
    }

    fn describe(&self) -> String {
        format!("OnMissingBeanType({})", type_name::<T>())
    }
}

/// 属性条件
#[derive(Debug, Clone)]
pub struct OnProperty {
    key: String,
    having_value: Option<String>,
    match_if_missing: bool,
}

impl OnProperty {
    /// 属性存在且不为 "false"
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            having_value: None,
            match_if_missing: false,
        }
    }

    /// 属性值必须等于 `value`（忽略大小写）
    pub fn having_value(mut self, value: impl Into<String>) -> Self {
        self.having_value = Some(value.into());
        self
    }

    pub fn match_if_missing(mut self, match_if_missing: bool) -> Self {
        self.match_if_missing = match_if_missing;
        self
    }
}

impl Condition for OnProperty {
    fn matches(&self, context: &ConditionContext<'_>) -> bool {
        let Some(value) = context.environment().get_string(&self.key) else {
            return self.match_if_missing;
        };
        match &self.having_value {
            Some(expected) => value.eq_ignore_ascii_case(expected),
            None => !value.eq_ignore_ascii_case("false"),
        }
    }

    fn describe(&self) -> String {
        match &self.having_value {
            Some(v) => format!("OnProperty({}={})", self.key, v),
            None => format!("OnProperty({})", self.key),
        }
    }
}

/// 任一 profile 激活时匹配
#[derive(Debug, Clone)]
pub struct OnProfile(pub Vec<String>);

impl OnProfile {
    pub fn new(profile: impl Into<String>) -> Self {
        Self(vec![profile.into()])
    }

    pub fn any<I, S>(profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(profiles.into_iter().map(Into::into).collect())
    }
}

impl Condition for OnProfile {
    fn matches(&self, context: &ConditionContext<'_>) -> bool {
        self.0.iter().any(|p| context.environment().accepts_profiles(p))
    }

    fn describe(&self) -> String {
        format!("OnProfile({})", self.0.join(","))
    }
}

/// 条件定义的评估结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Admitted,
    Rejected,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Admitted => f.write_str("admitted"),
            Verdict::Rejected => f.write_str("rejected"),
        }
    }
}

/// 条件解析器
pub struct ConditionalResolver<'a> {
    bean_factory: &'a DefaultListableBeanFactory,
    environment: &'a Environment,
}

impl<'a> ConditionalResolver<'a> {
    pub fn new(bean_factory: &'a DefaultListableBeanFactory, environment: &'a Environment) -> Self {
        Self {
            bean_factory,
            environment,
        }
    }

    /// 评估所有待定的条件定义，返回本轮接纳的数量
    pub fn resolve(&self) -> ContainerResult<usize> {
        let pending = self.bean_factory.pending_conditional_names();
        if pending.is_empty() {
            return Ok(0);
        }
        tracing::debug!("Evaluating {} conditional bean definition(s)", pending.len());

        let mut verdicts = std::collections::HashMap::new();
        let mut admitted = 0;
        for name in pending {
            let mut visiting = HashSet::new();
            if self.evaluate(&name, &mut verdicts, &mut visiting)? == Verdict::Admitted {
                admitted += 1;
            }
        }
        Ok(admitted)
    }

    fn evaluate(
        &self,
        name: &str,
        verdicts: &mut std::collections::HashMap<String, Verdict>,
        visiting: &mut HashSet<String>,
    ) -> ContainerResult<Verdict> {
        if let Some(verdict) = verdicts.get(name) {
            return Ok(*verdict);
        }
        let Some(definition) = self.bean_factory.pending_conditional(name) else {
            // 已经被接纳（例如作为其他定义的父定义先行评估）
            return Ok(Verdict::Admitted);
        };
        if !visiting.insert(name.to_string()) {
            tracing::warn!("Conditional parent cycle detected at '{}'", name);
            return Ok(Verdict::Rejected);
        }

        let verdict = match definition.parent() {
            Some(parent) if self.bean_factory.is_pending_conditional(parent) => {
                match self.evaluate(parent, verdicts, visiting)? {
                    Verdict::Admitted => self.check(&definition),
                    Verdict::Rejected => {
                        tracing::debug!(
                            "Conditional bean '{}' skipped: parent '{}' was not admitted",
                            name,
                            parent
                        );
                        Verdict::Rejected
                    }
                }
            }
            // 父定义已接纳，或从未登记（创建时报 UnsatisfiedDependency）
            _ => self.check(&definition),
        };

        if verdict == Verdict::Admitted {
            self.bean_factory.admit_conditional(name)?;
        }
        tracing::debug!("Conditional bean '{}' {}", name, verdict);
        verdicts.insert(name.to_string(), verdict);
        Ok(verdict)
    }

    fn check(&self, definition: &crate::bean::BeanDefinition) -> Verdict {
        let context = ConditionContext::new(self.bean_factory, self.environment);
        let failed = definition
            .conditions()
            .iter()
            .find(|condition| !condition.matches(&context));
        match failed {
            Some(condition) => {
                tracing::debug!(
                    "Condition {} did not match for '{}'",
                    condition.describe(),
                    definition.name()
                );
                Verdict::Rejected
            }
            None => Verdict::Admitted,
        }
    }
}
