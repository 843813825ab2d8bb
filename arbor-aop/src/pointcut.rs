//! 切点（Pointcut）表达式系统
//!
//! 定义了如何匹配方法签名。表达式语言通过 [`ExpressionEvaluator`] 注入，
//! 默认实现 [`PointcutParser`] 支持：
//!
//! - `execution(* UserService.get_user(..))`：类型与方法，`(..)` 任意参数，`()` 无参数
//! - `within(*Service)`：类型
//! - `method(find*)`：方法名
//! - `*`：全部方法
//! - `&&`、`||`、`!` 与括号

use std::fmt;
use std::sync::Arc;

use arbor_core::{ContainerError, ContainerResult};
use regex::Regex;

use crate::joinpoint::MethodSignature;

/// 方法匹配器
pub trait MethodMatcher: Send + Sync {
    fn matches(&self, method: &MethodSignature) -> bool;
}

impl<F> MethodMatcher for F
where
    F: Fn(&MethodSignature) -> bool + Send + Sync,
{
    fn matches(&self, method: &MethodSignature) -> bool {
        self(method)
    }
}

/// 名称模式（支持 `*` 通配符）
///
/// - `*` - 匹配任意字符串
/// - `User*` - 以 User 开头
/// - `*Service` - 以 Service 结尾
/// - `*Service*` - 包含 Service
#[derive(Clone)]
pub struct NamePattern {
    raw: String,
    regex: Option<Regex>,
}

impl NamePattern {
    pub fn new(pattern: &str) -> ContainerResult<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(ContainerError::Configuration("empty name pattern".to_string()));
        }
        let regex = if pattern.contains('*') && pattern != "*" {
            let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
            let compiled = Regex::new(&format!("^{}$", escaped.join(".*"))).map_err(|e| {
                ContainerError::Configuration(format!("invalid name pattern '{}': {}", pattern, e))
            })?;
            Some(compiled)
        } else {
            None
        };
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, target: &str) -> bool {
        match &self.regex {
            _ if self.raw == "*" => true,
            Some(regex) => regex.is_match(target),
            None => self.raw == target,
        }
    }

    /// 类型既可以按全路径也可以按最后一段名称匹配
    fn matches_type(&self, method: &MethodSignature) -> bool {
        self.matches(&method.declaring_type) || self.matches(method.simple_type_name())
    }
}

impl fmt::Debug for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// 参数模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamPattern {
    /// `(..)`
    Any,
    /// 固定个数
    Exactly(usize),
}

impl ParamPattern {
    fn matches(self, method: &MethodSignature) -> bool {
        match self {
            ParamPattern::Any => true,
            ParamPattern::Exactly(n) => method.params.len() == n,
        }
    }
}

/// 切点表达式
#[derive(Clone)]
pub enum PointcutExpression {
    /// 匹配所有方法
    Any,

    /// 匹配特定类型的特定方法
    /// 例如：execution(* UserService.get_user(..))
    Execution {
        type_pattern: NamePattern,
        method_pattern: NamePattern,
        params: ParamPattern,
    },

    /// 匹配特定类型的所有方法
    Within(NamePattern),

    /// 匹配特定方法名
    Method(NamePattern),

    /// 自定义匹配器
    Custom(Arc<dyn MethodMatcher>),

    And(Box<PointcutExpression>, Box<PointcutExpression>),

    Or(Box<PointcutExpression>, Box<PointcutExpression>),

    Not(Box<PointcutExpression>),
}

impl PointcutExpression {
    /// 解析表达式文本
    pub fn parse(expression: &str) -> ContainerResult<Self> {
        PointcutParser::new().parse(expression)
    }

    pub fn execution(type_pattern: &str, method_pattern: &str) -> ContainerResult<Self> {
        Ok(PointcutExpression::Execution {
            type_pattern: NamePattern::new(type_pattern)?,
            method_pattern: NamePattern::new(method_pattern)?,
            params: ParamPattern::Any,
        })
    }

    pub fn within(type_pattern: &str) -> ContainerResult<Self> {
        Ok(PointcutExpression::Within(NamePattern::new(type_pattern)?))
    }

    pub fn method(method_pattern: &str) -> ContainerResult<Self> {
        Ok(PointcutExpression::Method(NamePattern::new(method_pattern)?))
    }

    pub fn custom(matcher: impl MethodMatcher + 'static) -> Self {
        PointcutExpression::Custom(Arc::new(matcher))
    }

    /// 与运算
    pub fn and(self, other: PointcutExpression) -> Self {
        PointcutExpression::And(Box::new(self), Box::new(other))
    }

    /// 或运算
    pub fn or(self, other: PointcutExpression) -> Self {
        PointcutExpression::Or(Box::new(self), Box::new(other))
    }

    /// 非运算
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        PointcutExpression::Not(Box::new(self))
    }
}

impl MethodMatcher for PointcutExpression {
    fn matches(&self, method: &MethodSignature) -> bool {
        match self {
            PointcutExpression::Any => true,
            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
                params,
            } => {
                type_pattern.matches_type(method)
                    && method_pattern.matches(&method.name)
                    && params.matches(method)
            }
            PointcutExpression::Within(pattern) => pattern.matches_type(method),
            PointcutExpression::Method(pattern) => pattern.matches(&method.name),
            PointcutExpression::Custom(matcher) => matcher.matches(method),
            PointcutExpression::And(left, right) => left.matches(method) && right.matches(method),
            PointcutExpression::Or(left, right) => left.matches(method) || right.matches(method),
            PointcutExpression::Not(expr) => !expr.matches(method),
        }
    }
}

impl fmt::Debug for PointcutExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointcutExpression::Any => write!(f, "Any"),
            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
                params,
            } => write!(f, "Execution({:?}.{:?} {:?})", type_pattern, method_pattern, params),
            PointcutExpression::Within(p) => write!(f, "Within({:?})", p),
            PointcutExpression::Method(p) => write!(f, "Method({:?})", p),
            PointcutExpression::Custom(_) => write!(f, "Custom(...)"),
            PointcutExpression::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            PointcutExpression::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            PointcutExpression::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

/// 表达式求值器
///
/// 把声明式切面中的表达式文本翻译成匹配器；容器只依赖这个接口
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str) -> ContainerResult<Arc<dyn MethodMatcher>>;
}

/// 默认的切点表达式解析器
#[derive(Debug, Default, Clone, Copy)]
pub struct PointcutParser;

impl PointcutParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, expression: &str) -> ContainerResult<PointcutExpression> {
        let mut cursor = Cursor {
            src: expression,
            pos: 0,
        };
        let parsed = cursor.parse_or()?;
        cursor.skip_whitespace();
        if cursor.pos < expression.len() {
            return Err(cursor.error("unexpected trailing input"));
        }
        tracing::trace!("Parsed pointcut '{}' as {:?}", expression, parsed);
        Ok(parsed)
    }
}

impl ExpressionEvaluator for PointcutParser {
    fn evaluate(&self, expression: &str) -> ContainerResult<Arc<dyn MethodMatcher>> {
        Ok(Arc::new(self.parse(expression)?))
    }
}

/// 递归下降：or := and ('||' and)* ; and := unary ('&&' unary)* ; unary := '!' unary | primary
struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_whitespace();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn error(&self, reason: &str) -> ContainerError {
        ContainerError::Configuration(format!(
            "invalid pointcut expression '{}' at offset {}: {}",
            self.src, self.pos, reason
        ))
    }

    fn parse_or(&mut self) -> ContainerResult<PointcutExpression> {
        let mut left = self.parse_and()?;
        while self.eat("||") {
            left = left.or(self.parse_and()?);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ContainerResult<PointcutExpression> {
        let mut left = self.parse_unary()?;
        while self.eat("&&") {
            left = left.and(self.parse_unary()?);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ContainerResult<PointcutExpression> {
        if self.eat("!") {
            return Ok(self.parse_unary()?.not());
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ContainerResult<PointcutExpression> {
        if self.eat("(") {
            let inner = self.parse_or()?;
            if !self.eat(")") {
                return Err(self.error("expected ')'"));
            }
            return Ok(inner);
        }
        if self.eat("*") {
            return Ok(PointcutExpression::Any);
        }

        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected a designator"));
        }
        let designator = &rest[..len];
        self.pos += len;

        if !self.eat("(") {
            return Err(self.error(&format!("expected '(' after '{}'", designator)));
        }
        let body = self.take_balanced()?;
        let parsed = match designator {
            "execution" => parse_execution(body),
            "within" => PointcutExpression::within(body),
            "method" => PointcutExpression::method(body),
            other => return Err(self.error(&format!("unknown designator '{}'", other))),
        };
        parsed.map_err(|e| self.error(&e.to_string()))
    }

    /// 读取到与已消费的 `(` 配对的 `)` 为止
    fn take_balanced(&mut self) -> ContainerResult<&'a str> {
        let rest = self.rest();
        let mut depth = 1usize;
        for (i, c) in rest.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += i + 1;
                        return Ok(&rest[..i]);
                    }
                }
                _ => {}
            }
        }
        Err(self.error("unbalanced parentheses"))
    }
}

/// `[<ret>] [<Type>.]<method>[(<params>)]`
fn parse_execution(body: &str) -> ContainerResult<PointcutExpression> {
    let body = body.trim();
    let (head, params) = match body.find('(') {
        Some(open) if body.ends_with(')') => (&body[..open], body[open + 1..body.len() - 1].trim()),
        Some(_) => {
            return Err(ContainerError::Configuration(format!(
                "malformed parameter list in '{}'",
                body
            )))
        }
        None => (body, ".."),
    };
    let declaration = head
        .split_whitespace()
        .last()
        .ok_or_else(|| ContainerError::Configuration("empty execution pattern".to_string()))?;
    let (type_pattern, method_pattern) = declaration.rsplit_once('.').unwrap_or(("*", declaration));
    let params = match params {
        ".." => ParamPattern::Any,
        "" => ParamPattern::Exactly(0),
        list => ParamPattern::Exactly(list.split(',').count()),
    };
    Ok(PointcutExpression::Execution {
        type_pattern: NamePattern::new(type_pattern)?,
        method_pattern: NamePattern::new(method_pattern)?,
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(declaring_type: &str, name: &str, params: &[&str]) -> MethodSignature {
        MethodSignature::new(declaring_type, name).with_params(params.iter().copied())
    }

    fn parse(expression: &str) -> PointcutExpression {
        PointcutParser::new().parse(expression).unwrap()
    }

    #[test]
    fn test_name_pattern() {
        let pattern = NamePattern::new("*Service").unwrap();
        assert!(pattern.matches("UserService"));
        assert!(!pattern.matches("UserController"));
        assert!(NamePattern::new("get_*").unwrap().matches("get_user"));
        assert!(NamePattern::new("*").unwrap().matches("anything"));
        assert!(NamePattern::new("a.b").unwrap().matches("a.b"));
        assert!(!NamePattern::new("a.b").unwrap().matches("axb"));
    }

    #[test]
    fn test_execution() {
        let expr = parse("execution(* UserService.get_user(..))");
        assert!(expr.matches(&sig("app::UserService", "get_user", &["id"])));
        assert!(!expr.matches(&sig("app::UserService", "delete_user", &["id"])));
        assert!(!expr.matches(&sig("app::OrderService", "get_user", &[])));

        let no_args = parse("execution(* *.ping())");
        assert!(no_args.matches(&sig("Health", "ping", &[])));
        assert!(!no_args.matches(&sig("Health", "ping", &["verbose"])));

        let two_args = parse("execution(* *.transfer(from, to))");
        assert!(two_args.matches(&sig("Bank", "transfer", &["a", "b"])));
    }

    #[test]
    fn test_within_and_method() {
        assert!(parse("within(*Service)").matches(&sig("app::svc::UserService", "x", &[])));
        assert!(parse("within(app::svc::UserService)").matches(&sig("app::svc::UserService", "x", &[])));
        assert!(parse("method(find*)").matches(&sig("Repo", "find_all", &[])));
        assert!(parse("*").matches(&sig("Any", "thing", &[])));
    }

    #[test]
    fn test_operator_precedence() {
        // && 比 || 结合得更紧
        let expr = parse("method(a) || method(b) && within(X)");
        assert!(expr.matches(&sig("Y", "a", &[])));
        assert!(!expr.matches(&sig("Y", "b", &[])));
        assert!(expr.matches(&sig("X", "b", &[])));

        let grouped = parse("(method(a) || method(b)) && within(X)");
        assert!(!grouped.matches(&sig("Y", "a", &[])));

        let negated = parse("within(*Service) && !method(health*)");
        assert!(negated.matches(&sig("UserService", "find", &[])));
        assert!(!negated.matches(&sig("UserService", "health_check", &[])));
    }

    #[test]
    fn test_invalid_expressions() {
        let parser = PointcutParser::new();
        for bad in ["", "bean(x)", "within(X", "method(a) &&", "within(X) extra", "(method(a)"] {
            let err = parser.parse(bad).unwrap_err();
            assert!(matches!(err, ContainerError::Configuration(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn test_closure_matcher() {
        let matcher = |m: &MethodSignature| m.params.len() > 1;
        let expr = PointcutExpression::custom(matcher).and(PointcutExpression::within("Bank").unwrap());
        assert!(expr.matches(&sig("Bank", "transfer", &["a", "b"])));
        assert!(!expr.matches(&sig("Bank", "balance", &["a"])));
    }
}
