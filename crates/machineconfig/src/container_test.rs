//! Unit tests for container module

use super::*;
use crate::types::network::{
    BondConfig, HcloudVipConfig, HostnameConfig, Layer2VipConfig, LinkConfig,
};
use crate::types::unknown::Unknown;
use crate::types::v1alpha1::{FeaturesConfig, MachineType};

fn legacy() -> v1alpha1::Config {
    v1alpha1::Config::example()
}

fn link(name: &str) -> Box<dyn Document> {
    let mut doc = LinkConfig::example();
    doc.name = name.to_string();
    Box::new(doc)
}

fn bond(name: &str) -> Box<dyn Document> {
    let mut doc = BondConfig::example();
    doc.name = name.to_string();
    Box::new(doc)
}

#[test]
fn test_new_rejects_duplicates() {
    let err = Container::new(vec![link("eth0"), link("eth0")]).unwrap_err();
    assert_eq!(
        err,
        ContainerError::Duplicate {
            kind: "LinkConfig".to_string(),
            name: "eth0".to_string(),
        }
    );

    let err = Container::new(vec![Box::new(legacy()), Box::new(legacy())]).unwrap_err();
    assert_eq!(err, ContainerError::DuplicateLegacy);

    assert!(Container::new(vec![link("eth0"), link("eth1")]).is_ok());
}

#[test]
fn test_append_and_lookup() {
    let mut container = Container::new(vec![Box::new(legacy())]).unwrap();
    container.append(link("eth0")).unwrap();
    assert!(container.append(link("eth0")).is_err());

    assert_eq!(container.len(), 2);
    assert!(container.lookup("LinkConfig", Some("eth0")).is_some());
    assert!(container.lookup("LinkConfig", Some("eth1")).is_none());
    assert!(container.lookup("v1alpha1", None).is_some());
    assert_eq!(container.named::<LinkConfig>("eth0").map(|l| l.name.as_str()), Some("eth0"));
    assert_eq!(container.all::<LinkConfig>().count(), 1);
    assert_eq!(container.machine_type(), MachineType::ControlPlane);
    assert_eq!(container.cluster_name(), Some("cluster-X"));
}

#[test]
fn test_remove_where() {
    let mut container = Container::new(vec![link("eth0"), link("eth1"), Box::new(legacy())]).unwrap();
    let removed = container.remove_where(|d| d.kind() == "LinkConfig");
    assert_eq!(removed.len(), 2);
    assert_eq!(container.len(), 1);
    assert!(container.remove_where(|d| d.kind() == "LinkConfig").is_empty());
}

#[test]
fn test_readonly_keeps_bytes_until_mutated() {
    let original = b"# hand written\nversion: v1alpha1\n".to_vec();
    let mut container = Container::new_readonly(vec![Box::new(legacy())], original.clone()).unwrap();
    assert!(container.is_readonly());
    assert_eq!(container.bytes().unwrap(), original);

    let snapshot = container.readonly_snapshot();
    container.append(link("eth0")).unwrap();

    assert!(!container.is_readonly());
    assert_ne!(container.bytes().unwrap(), original);
    assert!(snapshot.is_readonly());
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.bytes().unwrap(), original);
}

#[test]
fn test_clone_is_deep() {
    let container = Container::new(vec![link("eth0")]).unwrap();
    let mut copy = container.clone();
    copy.append(link("eth1")).unwrap();
    assert_eq!(container.len(), 1);
    assert_ne!(container, copy);
    assert_eq!(container, container.clone());
}

#[test]
fn test_validate_ok() {
    let container = Container::new(vec![Box::new(legacy()), link("eth0"), bond("bond0")]).unwrap();
    let warnings = container.validate(&ValidationMode::metal()).unwrap();
    assert!(warnings.is_empty(), "{:?}", warnings);
}

#[test]
fn test_link_conflicts_in_both_orders() {
    for docs in [vec![link("eth0"), bond("eth0")], vec![bond("eth0"), link("eth0")]] {
        let container = Container::new(docs).unwrap();
        let err = container.validate(&ValidationMode::disk()).unwrap_err();
        assert_eq!(err.errors().len(), 1, "{}", err);
        assert!(err.to_string().contains("conflicts with"), "{}", err);
    }
}

#[test]
fn test_conflicts_for_every_link_kind_pair() {
    let registry = crate::Registry::global();
    let examples: Vec<Box<dyn Document>> = crate::types::network::link::LINK_KINDS
        .iter()
        .map(|kind| {
            let decode = registry.instantiate(kind, "v1alpha1").unwrap();
            let mut value = example_of(kind);
            value["name"] = "shared0".into();
            decode(value).unwrap()
        })
        .collect();

    for (i, a) in examples.iter().enumerate() {
        for b in examples.iter().skip(i + 1) {
            for docs in [vec![a.clone(), b.clone()], vec![b.clone(), a.clone()]] {
                let container = Container::new(docs).unwrap();
                let err = container.validate(&ValidationMode::disk()).unwrap_err();
                assert!(
                    err.to_string().contains("conflicts with"),
                    "{} vs {}: {}",
                    a.kind(),
                    b.kind(),
                    err
                );
            }
        }
    }
}

fn example_of(kind: &str) -> serde_yaml::Value {
    crate::types::examples()
        .into_iter()
        .find(|d| d.kind() == kind)
        .and_then(|d| d.to_value().ok())
        .unwrap()
}

#[test]
fn test_vip_conflicts() {
    let mut hcloud = HcloudVipConfig::example();
    hcloud.name = Layer2VipConfig::example().name;
    let container = Container::new(vec![Box::new(Layer2VipConfig::example()), Box::new(hcloud)]).unwrap();
    assert!(container.validate(&ValidationMode::disk()).is_err());
}

#[test]
fn test_legacy_hostname_conflict() {
    let mut config = legacy();
    if let Some(machine) = config.machine.as_mut() {
        machine.features = Some(FeaturesConfig {
            stable_hostname: Some(true),
            ..FeaturesConfig::default()
        });
    }
    let container = Container::new(vec![Box::new(config), Box::new(HostnameConfig::example())]).unwrap();
    let err = container.validate(&ValidationMode::disk()).unwrap_err();
    assert!(err.to_string().contains("stable hostname"), "{}", err);

    let container = Container::new(vec![Box::new(legacy()), Box::new(HostnameConfig::example())]).unwrap();
    assert!(container.validate(&ValidationMode::disk()).is_ok());
}

#[test]
fn test_unknown_documents() {
    let raw: serde_yaml::Value = serde_yaml::from_str("apiVersion: v9\nkind: FutureConfig\n").unwrap();
    let container = Container::new(vec![Box::new(Unknown::new("FutureConfig", "v9", raw))]).unwrap();

    let err = container.validate(&ValidationMode::disk()).unwrap_err();
    assert!(err.to_string().contains("unknown document kind"), "{}", err);

    let warnings = container
        .validate(&ValidationMode::disk().allow_unknown())
        .unwrap();
    assert_eq!(warnings.len(), 1);
}

#[test]
fn test_strict_mode_promotes_warnings() {
    let mut siderolink = SideroLinkConfig::example();
    siderolink.api_url = "http://siderolink.api/?jointoken=secret".to_string();
    let container = Container::new(vec![Box::new(siderolink)]).unwrap();

    let warnings = container.validate(&ValidationMode::disk()).unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(container.validate(&ValidationMode::disk().strict()).is_err());
}

#[test]
fn test_complete_for_boot() {
    let fragment = Container::new(vec![Box::new(SideroLinkConfig::example())]).unwrap();
    assert!(!fragment.is_complete_for_boot());

    let full = Container::new(vec![Box::new(legacy()), Box::new(SideroLinkConfig::example())]).unwrap();
    assert!(full.is_complete_for_boot());

    let mut partial = legacy();
    partial.cluster = None;
    assert!(!Container::from_legacy(partial).is_complete_for_boot());
}

#[test]
fn test_redact_secrets_idempotent() {
    let container = Container::new(vec![
        Box::new(legacy()),
        Box::new(SideroLinkConfig::example()),
        Box::new(HcloudVipConfig::example()),
    ])
    .unwrap();

    let once = container.redact_secrets("X");
    let twice = once.redact_secrets("X");
    assert_eq!(once, twice);
    assert_ne!(once, container);

    assert_eq!(once.cluster_name(), container.cluster_name());
    assert_eq!(once.machine_type(), container.machine_type());
    assert_eq!(
        once.siderolink().and_then(SideroLinkConfig::host),
        Some("siderolink.api".to_string())
    );
    assert_eq!(
        once.siderolink().and_then(SideroLinkConfig::join_token),
        Some("X".to_string())
    );
    assert_eq!(
        once.named::<HcloudVipConfig>("10.3.0.2").map(|v| v.api_token.as_str()),
        Some("X")
    );
}

#[test]
fn test_validate_runtime() {
    struct NoIommu;
    impl RuntimeContext for NoIommu {
        fn iommu_enabled(&self) -> bool {
            false
        }
    }

    let container = Container::new(vec![Box::new(
        crate::types::hardware::PciDriverRebindConfig::example(),
    )])
    .unwrap();
    assert!(container.validate_runtime(&NoIommu).is_err());
}
