//! Document registry
//!
//! Maps a kind name to a factory that, given an `apiVersion`, returns the
//! decoder of the concrete type (or `None` for unsupported versions). The
//! registry is built explicitly and is immutable afterwards.

use crate::document::{Document, DocumentSpec};
use crate::error::DecodeError;
use crate::types::cri::{RegistryAuthConfig, RegistryMirrorConfig, RegistryTlsConfig};
use crate::types::hardware::PciDriverRebindConfig;
use crate::types::network::{
    BlackholeRouteConfig, BondConfig, BridgeConfig, Dhcpv4Config, Dhcpv6Config, DummyLinkConfig,
    EthernetConfig, HcloudVipConfig, HostnameConfig, KubeSpanConfig, KubespanEndpointsConfig,
    Layer2VipConfig, LinkAliasConfig, LinkConfig, NetworkRuleConfig, ResolverConfig,
    StaticHostConfig, TcpProbeConfig, TimeSyncConfig, VlanConfig, VrfConfig, WireguardConfig,
};
use crate::types::patch::DeletePatch;
use crate::types::security::{ImageVerificationConfig, TrustedRootsConfig};
use crate::types::siderolink::SideroLinkConfig;
use crate::types::unknown::Unknown;
use crate::types::{API_VERSION, kinds, v1alpha1};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// Decodes a raw document into a concrete type.
pub type DecodeFn = fn(Value) -> Result<Box<dyn Document>, DecodeError>;

/// Returns the decoder for an `apiVersion`, or `None` if unsupported.
pub type Factory = fn(&str) -> Option<DecodeFn>;

/// Immutable map of registered kinds.
#[derive(Clone, Default)]
pub struct Registry {
    kinds: BTreeMap<&'static str, Factory>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.kinds.keys()).finish()
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

fn v1alpha1_only<T: DocumentSpec>(api_version: &str) -> Option<DecodeFn> {
    (api_version == API_VERSION).then_some(decode::<T> as DecodeFn)
}

fn legacy(api_version: &str) -> Option<DecodeFn> {
    api_version
        .is_empty()
        .then_some(decode::<v1alpha1::Config> as DecodeFn)
}

impl Registry {
    /// Registry without any kinds.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in kind.
    pub fn build() -> Self {
        let mut registry = Self::empty();
        registry.register(kinds::V1ALPHA1, legacy);
        registry.register(kinds::LINK, v1alpha1_only::<LinkConfig>);
        registry.register(kinds::BOND, v1alpha1_only::<BondConfig>);
        registry.register(kinds::BRIDGE, v1alpha1_only::<BridgeConfig>);
        registry.register(kinds::DUMMY_LINK, v1alpha1_only::<DummyLinkConfig>);
        registry.register(kinds::VLAN, v1alpha1_only::<VlanConfig>);
        registry.register(kinds::VRF, v1alpha1_only::<VrfConfig>);
        registry.register(kinds::WIREGUARD, v1alpha1_only::<WireguardConfig>);
        registry.register(kinds::DHCPV4, v1alpha1_only::<Dhcpv4Config>);
        registry.register(kinds::DHCPV6, v1alpha1_only::<Dhcpv6Config>);
        registry.register(kinds::HOSTNAME, v1alpha1_only::<HostnameConfig>);
        registry.register(kinds::RESOLVER, v1alpha1_only::<ResolverConfig>);
        registry.register(kinds::TIME_SYNC, v1alpha1_only::<TimeSyncConfig>);
        registry.register(kinds::KUBESPAN, v1alpha1_only::<KubeSpanConfig>);
        registry.register(kinds::KUBESPAN_ENDPOINTS, v1alpha1_only::<KubespanEndpointsConfig>);
        registry.register(kinds::RULE, v1alpha1_only::<NetworkRuleConfig>);
        registry.register(kinds::STATIC_HOST, v1alpha1_only::<StaticHostConfig>);
        registry.register(kinds::TCP_PROBE, v1alpha1_only::<TcpProbeConfig>);
        registry.register(kinds::LAYER2_VIP, v1alpha1_only::<Layer2VipConfig>);
        registry.register(kinds::HCLOUD_VIP, v1alpha1_only::<HcloudVipConfig>);
        registry.register(kinds::BLACKHOLE_ROUTE, v1alpha1_only::<BlackholeRouteConfig>);
        registry.register(kinds::LINK_ALIAS, v1alpha1_only::<LinkAliasConfig>);
        registry.register(kinds::ETHERNET, v1alpha1_only::<EthernetConfig>);
        registry.register(kinds::REGISTRY_MIRROR, v1alpha1_only::<RegistryMirrorConfig>);
        registry.register(kinds::REGISTRY_AUTH, v1alpha1_only::<RegistryAuthConfig>);
        registry.register(kinds::REGISTRY_TLS, v1alpha1_only::<RegistryTlsConfig>);
        registry.register(kinds::TRUSTED_ROOTS, v1alpha1_only::<TrustedRootsConfig>);
        registry.register(kinds::IMAGE_VERIFICATION, v1alpha1_only::<ImageVerificationConfig>);
        registry.register(kinds::PCI_DRIVER_REBIND, v1alpha1_only::<PciDriverRebindConfig>);
        registry.register(kinds::SIDEROLINK, v1alpha1_only::<SideroLinkConfig>);
        registry
    }

    /// Shared registry with every built-in kind.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Registry::build)
    }

    /// Registers a kind, replacing any previous factory.
    pub fn register(&mut self, kind: &'static str, factory: Factory) {
        self.kinds.insert(kind, factory);
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kinds.keys().copied()
    }

    /// Decoder for `(kind, apiVersion)`.
    pub fn instantiate(&self, kind: &str, api_version: &str) -> Option<DecodeFn> {
        self.kinds.get(kind).and_then(|factory| factory(api_version))
    }

    /// Decodes one raw document.
    ///
    /// Documents without `kind` are legacy `v1alpha1` documents. Unregistered
    /// kinds and versions decode into [`Unknown`] placeholders.
    pub fn decode(&self, value: Value, allow_patch_delete: bool) -> Result<Box<dyn Document>, DecodeError> {
        if !value.is_mapping() {
            return Err(DecodeError::NotAMapping(render(&value)));
        }

        let kind = header(&value, "kind")?;
        let api_version = header(&value, "apiVersion")?;
        let (kind, api_version) = match kind {
            Some(kind) => (kind, api_version.unwrap_or_default()),
            None => (kinds::V1ALPHA1.to_string(), String::new()),
        };

        if DeletePatch::is_tombstone(&value) {
            if !allow_patch_delete {
                return Err(DecodeError::PatchDeleteNotAllowed { kind });
            }
            let name = value.get("name").and_then(Value::as_str).map(str::to_string);
            return Ok(Box::new(DeletePatch::new(kind, api_version, name)));
        }

        match self.instantiate(&kind, &api_version) {
            Some(decode) => decode(value),
            None => {
                debug!("Unknown document kind {} (apiVersion {:?})", kind, api_version);
                Ok(Box::new(Unknown::new(kind, api_version, value)))
            }
        }
    }
}

fn header(value: &Value, key: &str) -> Result<Option<String>, DecodeError> {
    match value.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(DecodeError::InvalidHeader(format!(
            "{} must be a string, got {}",
            key,
            render(other).trim_end()
        ))),
    }
}

fn render(value: &Value) -> String {
    serde_yaml::to_string(value).unwrap_or_else(|_| format!("{:?}", value))
}

/// Decodes `value` into `T`, rejecting keys `T` does not know about.
pub fn decode<T: DocumentSpec>(value: Value) -> Result<Box<dyn Document>, DecodeError> {
    let doc: T = serde_yaml::from_value(value.clone())?;
    let encoded = serde_yaml::to_value(&doc)?;
    let declared = |path: &[PathSegment]| declares::<T>(&value, path);
    if let Some(unknown) = unknown_keys(&value, &encoded, &declared) {
        return Err(DecodeError::UnknownKeys(render(&unknown)));
    }
    Ok(Box::new(doc))
}

/// One step into a YAML tree.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    /// Mapping key
    Key(Value),
    /// Sequence index
    Index(usize),
}

fn lookup<'a>(value: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    path.iter().try_fold(value, |value, segment| match segment {
        PathSegment::Key(key) => value.as_mapping()?.get(key),
        PathSegment::Index(index) => value.as_sequence()?.get(*index),
    })
}

fn lookup_mut<'a>(value: &'a mut Value, path: &[PathSegment]) -> Option<&'a mut Value> {
    path.iter().try_fold(value, |value, segment| match segment {
        PathSegment::Key(key) => value.as_mapping_mut()?.get_mut(key),
        PathSegment::Index(index) => value.as_sequence_mut()?.get_mut(*index),
    })
}

/// A non-empty value shaped like `value`.
///
/// Every field omitted from the canonical encoding is omitted because it is
/// empty, so a declared field holding this either fails to decode or is
/// encoded.
fn witness(value: &Value) -> Value {
    match value {
        Value::Bool(b) => Value::Bool(!b),
        Value::Number(_) => Value::Number(1.into()),
        Value::String(_) => Value::String("witness".to_string()),
        Value::Sequence(_) => Value::Sequence(vec![Value::Null]),
        Value::Null | Value::Mapping(_) | Value::Tagged(_) => {
            Value::Mapping(Mapping::from_iter([(Value::String("witness".to_string()), Value::Null)]))
        }
    }
}

/// Whether `T` declares the key at `path` of `original`.
///
/// Serde skips undeclared keys whatever they hold, so the key is declared
/// exactly when a non-empty value in its place changes the outcome.
fn declares<T: DocumentSpec>(original: &Value, path: &[PathSegment]) -> bool {
    let mut altered = original.clone();
    let Some(slot) = lookup_mut(&mut altered, path) else {
        return false;
    };
    *slot = witness(slot);

    let Ok(doc) = serde_yaml::from_value::<T>(altered) else {
        return true;
    };
    serde_yaml::to_value(&doc).map_or(true, |encoded| lookup(&encoded, path).is_some())
}

/// Fragment of `original` that did not survive decoding into a typed
/// document and re-encoding it as `encoded`.
///
/// A key missing from `encoded` is unknown unless `declared` reports that
/// the type has a field of that name the canonical encoding left out.
pub fn unknown_keys(
    original: &Value,
    encoded: &Value,
    declared: &dyn Fn(&[PathSegment]) -> bool,
) -> Option<Value> {
    walk(original, encoded, &mut Vec::new(), declared)
}

fn walk(
    original: &Value,
    encoded: &Value,
    path: &mut Vec<PathSegment>,
    declared: &dyn Fn(&[PathSegment]) -> bool,
) -> Option<Value> {
    match (original, encoded) {
        (Value::Mapping(original), Value::Mapping(encoded)) => {
            let mut fragment = Mapping::new();
            for (key, value) in original {
                path.push(PathSegment::Key(key.clone()));
                match encoded.get(key) {
                    Some(encoded_value) => {
                        if let Some(nested) = walk(value, encoded_value, path, declared) {
                            fragment.insert(key.clone(), nested);
                        }
                    }
                    None if !declared(path) => {
                        fragment.insert(key.clone(), value.clone());
                    }
                    None => {}
                }
                path.pop();
            }
            (!fragment.is_empty()).then_some(Value::Mapping(fragment))
        }
        (Value::Sequence(original), Value::Sequence(encoded)) => {
            let mut fragments = Vec::new();
            for (index, (o, e)) in original.iter().zip(encoded.iter()).enumerate() {
                path.push(PathSegment::Index(index));
                fragments.extend(walk(o, e, path, declared));
                path.pop();
            }
            (!fragments.is_empty()).then_some(Value::Sequence(fragments))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_build_registers_every_kind() {
        let registry = Registry::build();
        assert_eq!(registry.kinds().count(), 30);
        assert!(registry.instantiate(kinds::LINK, "v1alpha1").is_some());
        assert!(registry.instantiate(kinds::LINK, "v1alpha2").is_none());
        assert!(registry.instantiate("FooConfig", "v1alpha1").is_none());
        assert!(registry.instantiate(kinds::V1ALPHA1, "").is_some());
    }

    #[test]
    fn test_decode_unknown_kind() {
        let doc = Registry::build()
            .decode(yaml("apiVersion: v1alpha1\nkind: FooConfig\nname: foo\nbar: 1\n"), false)
            .unwrap();
        assert!(doc.is_unknown());
        assert_eq!(doc.kind(), "FooConfig");
        assert_eq!(doc.name(), Some("foo"));
    }

    #[test]
    fn test_decode_unknown_keys() {
        let err = Registry::build()
            .decode(
                yaml("apiVersion: v1alpha1\nkind: HostnameConfig\nhostname: a\nfoo: bar\n"),
                false,
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown keys found during decoding:\nfoo: bar\n");
    }

    #[test]
    fn test_decode_nested_unknown_keys() {
        let err = Registry::build()
            .decode(
                yaml("apiVersion: v1alpha1\nkind: ResolverConfig\nnameservers:\n  - address: 1.1.1.1\n    port: 53\n"),
                false,
            )
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnknownKeys(ref s) if s.contains("port: 53")), "{}", err);
    }

    #[test]
    fn test_zero_values_are_not_unknown() {
        let doc = Registry::build()
            .decode(
                yaml("apiVersion: v1alpha1\nkind: KubeSpanConfig\nenabled: false\nmtu: 1420\n"),
                false,
            )
            .unwrap();
        assert_eq!(doc.kind(), kinds::KUBESPAN);
    }

    #[test]
    fn test_zero_valued_unknown_keys() {
        for value in ["0", "false", "\"\"", "[]", "{}", "null"] {
            let raw = format!("apiVersion: v1alpha1\nkind: HostnameConfig\nhostname: a\nfoo: {}\n", value);
            let err = Registry::build().decode(yaml(&raw), false).unwrap_err();
            assert!(
                matches!(err, DecodeError::UnknownKeys(ref s) if s.starts_with("unknown keys found during decoding:\nfoo:")),
                "foo: {} => {}",
                value,
                err
            );
        }
    }

    #[test]
    fn test_zero_valued_unknown_keys_in_flattened_link() {
        let err = Registry::build()
            .decode(
                yaml("apiVersion: v1alpha1\nkind: LinkConfig\nname: eth0\nmtu: 1500\nmtuu: 0\n"),
                false,
            )
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnknownKeys(ref s) if s.contains("mtuu: 0")), "{}", err);
    }

    #[test]
    fn test_zero_valued_unknown_keys_in_legacy() {
        let err = Registry::build()
            .decode(yaml("version: v1alpha1\nmachine:\n  type: worker\n  tpye: \"\"\n"), false)
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnknownKeys(ref s) if s.contains("tpye")), "{}", err);
    }

    #[test]
    fn test_zero_valued_declared_keys() {
        Registry::build()
            .decode(
                yaml("apiVersion: v1alpha1\nkind: LinkConfig\nname: eth0\nup: false\naddresses: []\n"),
                false,
            )
            .unwrap();
        Registry::build()
            .decode(yaml("version: v1alpha1\nmachine:\n  type: worker\n  token: \"\"\n"), false)
            .unwrap();
    }

    #[test]
    fn test_legacy_without_kind() {
        let doc = Registry::build()
            .decode(yaml("version: v1alpha1\ncluster:\n  clusterName: x\n"), false)
            .unwrap();
        assert_eq!(doc.kind(), kinds::V1ALPHA1);
    }

    #[test]
    fn test_patch_delete() {
        let raw = yaml("apiVersion: v1alpha1\nkind: LinkConfig\nname: eth0\n$patch: delete\n");
        let err = Registry::build().decode(raw.clone(), false).unwrap_err();
        assert!(matches!(err, DecodeError::PatchDeleteNotAllowed { .. }));

        let doc = Registry::build().decode(raw, true).unwrap();
        assert!(doc.as_any().downcast_ref::<DeletePatch>().is_some());
        assert_eq!(doc.name(), Some("eth0"));
    }

    #[test]
    fn test_invalid_header() {
        let err = Registry::build()
            .decode(yaml("apiVersion: v1alpha1\nkind: [a]\n"), false)
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidHeader(_)));

        let err = Registry::build().decode(yaml("- a\n- b\n"), false).unwrap_err();
        assert!(matches!(err, DecodeError::NotAMapping(_)));
    }
}
