//! Utility functions for the container

/// Naming convention utilities for bean names
pub mod naming {
    /// Converts a PascalCase type name to camelCase for bean naming.
    ///
    /// # Examples
    ///
    /// ```
    /// use arbor_core::utils::naming::to_camel_case;
    ///
    /// assert_eq!(to_camel_case("UserService"), "userService");
    /// assert_eq!(to_camel_case("A"), "a");
    /// assert_eq!(to_camel_case(""), "");
    /// ```
    pub fn to_camel_case(s: &str) -> String {
        let mut chars = s.chars();
        match chars.next() {
            None => String::new(),
            Some(first) => {
                let mut result = String::with_capacity(s.len());
                result.extend(first.to_lowercase());
                result.push_str(chars.as_str());
                result
            }
        }
    }

    /// Returns the last path segment of a type name, with generic arguments removed.
    ///
    /// ```
    /// use arbor_core::utils::naming::short_type_name;
    ///
    /// assert_eq!(short_type_name("my_app::service::UserService"), "UserService");
    /// assert_eq!(short_type_name("arbor_core::lazy::Lazy<my_app::Repo>"), "Lazy");
    /// ```
    pub fn short_type_name(type_name: &str) -> &str {
        let without_generics = match type_name.find('<') {
            Some(idx) => &type_name[..idx],
            None => type_name,
        };
        without_generics
            .rsplit("::")
            .next()
            .unwrap_or(without_generics)
    }

    /// Default bean name for a type: its short name in camelCase.
    ///
    /// ```
    /// use arbor_core::utils::naming::default_bean_name;
    ///
    /// struct OrderRepository;
    /// assert_eq!(default_bean_name::<OrderRepository>(), "orderRepository");
    /// ```
    pub fn default_bean_name<T: ?Sized>() -> String {
        to_camel_case(short_type_name(std::any::type_name::<T>()))
    }
}

#[cfg(test)]
mod tests {
    use super::naming::*;

    #[test]
    fn test_to_camel_case() {
        assert_eq!(to_camel_case("UserService"), "userService");
        assert_eq!(to_camel_case("AB"), "aB");
        assert_eq!(to_camel_case("lowerCase"), "lowerCase");
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("Plain"), "Plain");
        assert_eq!(short_type_name("a::b::C"), "C");
        assert_eq!(short_type_name("a::Wrapper<b::Inner>"), "Wrapper");
    }

    #[test]
    fn test_default_bean_name() {
        struct PaymentGateway;
        assert_eq!(default_bean_name::<PaymentGateway>(), "paymentGateway");
    }
}
