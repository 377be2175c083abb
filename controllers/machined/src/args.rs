//! Command-line argument builder for control-plane components.
//!
//! Baseline arguments are merged with user-supplied extra arguments under a
//! per-key policy, and rendered as sorted `--key=value` flags.

use crate::error::ControllerError;
use std::collections::BTreeMap;

/// How a user-supplied argument combines with the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// User value replaces the baseline
    #[default]
    Overwrite,
    /// User value is appended to the baseline, comma-separated
    Additive,
    /// Setting the argument is an error
    Denied,
}

/// Argument set under construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgsBuilder {
    args: BTreeMap<String, String>,
    policies: BTreeMap<String, MergePolicy>,
}

impl ArgsBuilder {
    /// Builder starting from `baseline`.
    pub fn new<K, V>(baseline: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            args: baseline.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            policies: BTreeMap::new(),
        }
    }

    /// Set the merge policy of `key`.
    pub fn policy(mut self, key: impl Into<String>, policy: MergePolicy) -> Self {
        self.policies.insert(key.into(), policy);
        self
    }

    /// Merge user-supplied arguments.
    pub fn merge(mut self, extra: &BTreeMap<String, String>) -> Result<Self, ControllerError> {
        for (key, value) in extra {
            match self.policies.get(key).copied().unwrap_or_default() {
                MergePolicy::Denied => {
                    return Err(ControllerError::InvalidConfig(format!(
                        "extra arg {:?} is not allowed",
                        key
                    )));
                }
                MergePolicy::Additive => {
                    let merged = match self.args.get(key) {
                        Some(current) if !current.is_empty() => format!("{},{}", current, value),
                        _ => value.clone(),
                    };
                    self.args.insert(key.clone(), merged);
                }
                MergePolicy::Overwrite => {
                    self.args.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(self)
    }

    /// Arguments as sorted `--key=value` flags.
    pub fn build(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|(key, value)| format!("--{}={}", key, value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extra(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_build_is_sorted() {
        let args = ArgsBuilder::new([("proxy-mode", "iptables"), ("cluster-cidr", "10.244.0.0/16")]).build();
        assert_eq!(args, vec!["--cluster-cidr=10.244.0.0/16", "--proxy-mode=iptables"]);
    }

    #[test]
    fn test_merge_policies() {
        let args = ArgsBuilder::new([("feature-gates", "A=true"), ("v", "2")])
            .policy("feature-gates", MergePolicy::Additive)
            .merge(&extra(&[("feature-gates", "B=false"), ("v", "4"), ("new", "x")]))
            .unwrap()
            .build();

        assert_eq!(args, vec!["--feature-gates=A=true,B=false", "--new=x", "--v=4"]);
    }

    #[test]
    fn test_denied_merge() {
        let err = ArgsBuilder::new([("kubeconfig", "/etc/kubeconfig")])
            .policy("kubeconfig", MergePolicy::Denied)
            .merge(&extra(&[("kubeconfig", "/tmp/other")]))
            .unwrap_err();

        assert_eq!(err.to_string(), "invalid configuration: extra arg \"kubeconfig\" is not allowed");
    }
}
