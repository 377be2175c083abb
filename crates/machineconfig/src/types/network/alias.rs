//! Link aliases and blackhole routes.

use crate::document::{DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport};
use crate::net::Prefix;
use crate::selector;
use crate::types::{api_version, kinds, require_name};
use serde::{Deserialize, Serialize};

/// Link matching criteria.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkSelector {
    /// Boolean expression over `link`
    #[serde(default)]
    pub r#match: String,
}

/// Alias assigned to the link matched by a selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkAliasConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Alias, or a `prefix%d` pattern numbering every matched link
    #[serde(default)]
    pub name: String,

    /// Selector
    #[serde(default)]
    pub selector: LinkSelector,
}

/// Checks that an alias is a literal or ends in a bare `%d`.
pub fn validate_alias_name(name: &str) -> Result<(), String> {
    let literal = name.strip_suffix("%d").unwrap_or(name);
    if literal.contains('%') {
        return Err(format!(
            "alias {:?} may only use the %d pattern as a suffix",
            name
        ));
    }
    if literal.is_empty() {
        return Err(format!("alias {:?} must have a prefix", name));
    }
    Ok(())
}

impl LinkAliasConfig {
    /// Whether the alias numbers matched links.
    pub fn is_pattern(&self) -> bool {
        self.name.ends_with("%d")
    }
}

impl DocumentSpec for LinkAliasConfig {
    const KIND: &'static str = kinds::LINK_ALIAS;
    const DESCRIPTION: &'static str = "Alias for links matched by a selector expression.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        LinkAliasConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "net%d".to_string(),
            selector: LinkSelector {
                r#match: r#"glob("00:1a:2b:*", mac(link.permanent_addr))"#.to_string(),
            },
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        if report.check(require_name(&self.name)).is_some() {
            report.check(validate_alias_name(&self.name));
        }
        if self.selector.r#match.is_empty() {
            report.error("selector.match must be specified");
        } else if let Err(e) = selector::check_bool(&self.selector.r#match) {
            report.error(format!("selector.match: {}", e));
        }
        report
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("selector", FieldValue::Str(Some(&self.selector.r#match)));
    }
}

/// Route dropping all traffic to a prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlackholeRouteConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Destination prefix
    #[serde(default)]
    pub name: String,

    /// Route metric
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<u32>,
}

impl DocumentSpec for BlackholeRouteConfig {
    const KIND: &'static str = kinds::BLACKHOLE_ROUTE;
    const DESCRIPTION: &'static str = "Blackhole route for a destination prefix.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        BlackholeRouteConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "10.0.0.0/12".to_string(),
            metric: Some(100),
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        if let Err(e) = self.name.parse::<Prefix>() {
            report.error(format!("name {:?} must be a valid prefix: {}", self.name, e));
        }
        report
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("metric", FieldValue::UInt(self.metric.map(u64::from)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_names() {
        assert!(validate_alias_name("net0").is_ok());
        assert!(validate_alias_name("net%d").is_ok());
        assert!(validate_alias_name("net%s").is_err());
        assert!(validate_alias_name("net%d%d").is_err());
        assert!(validate_alias_name("%d").is_err());
    }

    #[test]
    fn test_alias_selector_type() {
        let mut alias = LinkAliasConfig::example();
        assert!(DocumentSpec::validate(&alias, &ValidationMode::disk()).is_ok());
        assert!(alias.is_pattern());

        alias.selector.r#match = "link.driver".to_string();
        let report = DocumentSpec::validate(&alias, &ValidationMode::disk());
        assert!(report.errors()[0].contains("must be boolean"), "{:?}", report.errors());
    }

    #[test]
    fn test_blackhole_prefix() {
        let mut route = BlackholeRouteConfig::example();
        assert!(DocumentSpec::validate(&route, &ValidationMode::disk()).is_ok());
        route.name = "10.0.0.1".to_string();
        assert!(!DocumentSpec::validate(&route, &ValidationMode::disk()).is_ok());
    }
}
