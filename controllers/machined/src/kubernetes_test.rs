//! Unit tests for kubernetes module

use super::*;
use crate::test_utils::MemoryLock;
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequestCondition, CertificateSigningRequestSpec, CertificateSigningRequestStatus,
};
use k8s_openapi::ByteString;
use std::sync::atomic::{AtomicBool, Ordering};

fn csr(signer: &str, username: &str, condition: Option<&str>) -> CertificateSigningRequest {
    CertificateSigningRequest {
        metadata: ObjectMeta {
            name: Some("csr-1".to_string()),
            ..ObjectMeta::default()
        },
        spec: CertificateSigningRequestSpec {
            request: ByteString(Vec::new()),
            signer_name: signer.to_string(),
            username: Some(username.to_string()),
            ..CertificateSigningRequestSpec::default()
        },
        status: condition.map(|c| CertificateSigningRequestStatus {
            conditions: Some(vec![CertificateSigningRequestCondition {
                type_: c.to_string(),
                status: "True".to_string(),
                ..CertificateSigningRequestCondition::default()
            }]),
            ..CertificateSigningRequestStatus::default()
        }),
    }
}

#[test]
fn test_pending_serving_csr() {
    let node = "system:node:worker-1";
    assert!(is_pending_serving_csr(&csr(KUBELET_SERVING_SIGNER, node, None), "worker-1"));
    assert!(!is_pending_serving_csr(&csr(KUBELET_SERVING_SIGNER, node, Some("Approved")), "worker-1"));
    assert!(!is_pending_serving_csr(&csr(KUBELET_SERVING_SIGNER, node, Some("Denied")), "worker-1"));
    assert!(!is_pending_serving_csr(&csr(KUBELET_SERVING_SIGNER, node, None), "worker-2"));
    assert!(!is_pending_serving_csr(
        &csr("kubernetes.io/kube-apiserver-client-kubelet", node, None),
        "worker-1"
    ));
}

#[test]
fn test_lease_held_by_other() {
    let now = Utc::now();
    let fresh = json!({
        "holderIdentity": "node-a",
        "leaseDurationSeconds": 30,
        "renewTime": now.to_rfc3339_opts(SecondsFormat::Micros, true),
    });
    assert!(lease_held_by_other(&fresh, "node-b", now));
    assert!(!lease_held_by_other(&fresh, "node-a", now));

    let stale = json!({
        "holderIdentity": "node-a",
        "leaseDurationSeconds": 30,
        "renewTime": (now - chrono::Duration::seconds(60)).to_rfc3339_opts(SecondsFormat::Micros, true),
    });
    assert!(!lease_held_by_other(&stale, "node-b", now));

    assert!(!lease_held_by_other(&json!({}), "node-b", now));
}

#[test]
fn test_endpoint_slice_object() {
    let slice = endpoint_slice(&EndpointSliceSpec {
        name: "talos".to_string(),
        address_type: AddressType::IPv4,
        addresses: vec!["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()],
    });

    assert_eq!(slice.address_type, "IPv4");
    assert_eq!(slice.endpoints.len(), 2);
    assert_eq!(slice.endpoints[0].addresses, vec!["10.0.0.1"]);
    let conditions = slice.endpoints[0].conditions.clone().unwrap();
    assert_eq!(conditions.ready, Some(true));
    assert_eq!(conditions.serving, Some(true));
    assert_eq!(conditions.terminating, Some(false));

    let ports = slice.ports.unwrap();
    assert_eq!(ports[0].name.as_deref(), Some("apid"));
    assert_eq!(ports[0].port, Some(50000));
    assert_eq!(
        slice.metadata.labels.unwrap()["kubernetes.io/service-name"],
        SERVICE_NAME
    );
}

#[tokio::test]
async fn test_with_lock_runs_and_releases() {
    let lock = MemoryLock::default();
    let cancel = CancellationToken::new();

    let result = with_lock(&lock, "crd", "node-a", &cancel, || async {
        assert_eq!(lock.holder("crd").as_deref(), Some("node-a"));
        Ok(42)
    })
    .await
    .unwrap();

    assert_eq!(result, Some(42));
    assert_eq!(lock.holder("crd"), None);
}

#[tokio::test]
async fn test_with_lock_cancelled_while_busy() {
    let lock = MemoryLock::default();
    lock.hold("crd", "node-b");
    let cancel = CancellationToken::new();
    let ran = Arc::new(AtomicBool::new(false));

    let waiter = {
        let lock = lock.clone();
        let cancel = cancel.clone();
        let ran = Arc::clone(&ran);
        tokio::spawn(async move {
            with_lock(&lock, "crd", "node-a", &cancel, || async move {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    assert_eq!(waiter.await.unwrap().unwrap(), None);
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(lock.holder("crd").as_deref(), Some("node-b"));
}

#[tokio::test(start_paused = true)]
async fn test_with_lock_aborts_when_lost() {
    let lock = MemoryLock::default();
    let cancel = CancellationToken::new();

    let result = with_lock(&lock, "crd", "node-a", &cancel, || async {
        lock.hold("crd", "node-b");
        futures::future::pending::<Result<(), ControllerError>>().await
    })
    .await;

    assert!(matches!(result, Err(ControllerError::Reconciliation(_))));
    assert_eq!(lock.holder("crd").as_deref(), Some("node-b"));
}
