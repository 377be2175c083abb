//! PCI driver rebinding.

use crate::document::{
    DocumentSpec, DocumentVisitor, FieldValue, RuntimeContext, ValidationMode, ValidationReport,
};
use crate::types::{api_version, kinds, require_name};
use serde::{Deserialize, Serialize};

/// Driver that requires an IOMMU.
const VFIO_PCI: &str = "vfio-pci";

/// Rebinds a PCI device to another driver; the name is the PCI address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PciDriverRebindConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// PCI address (`0000:04:00.0`)
    #[serde(default)]
    pub name: String,

    /// Driver to bind to
    #[serde(default)]
    pub target_driver: String,
}

impl DocumentSpec for PciDriverRebindConfig {
    const KIND: &'static str = kinds::PCI_DRIVER_REBIND;
    const DESCRIPTION: &'static str = "Rebinds a PCI device to a different kernel driver.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        PciDriverRebindConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "0000:04:00.00".to_string(),
            target_driver: "vfio-pci".to_string(),
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));
        if self.target_driver.is_empty() {
            report.error("targetDriver must be specified");
        }
        report
    }

    fn validate_runtime(&self, ctx: &dyn RuntimeContext) -> ValidationReport {
        let mut report = ValidationReport::new();
        if self.target_driver == VFIO_PCI && !ctx.iommu_enabled() {
            report.error(format!(
                "{}: IOMMU must be enabled to bind {}",
                self.name, VFIO_PCI
            ));
        }
        report
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("targetDriver", FieldValue::Str(Some(&self.target_driver)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Iommu(bool);

    impl RuntimeContext for Iommu {
        fn iommu_enabled(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn test_vfio_requires_iommu() {
        let mut config = PciDriverRebindConfig::example();
        assert!(DocumentSpec::validate_runtime(&config, &Iommu(true)).is_ok());
        assert!(!DocumentSpec::validate_runtime(&config, &Iommu(false)).is_ok());

        config.target_driver = "ixgbe".to_string();
        assert!(DocumentSpec::validate_runtime(&config, &Iommu(false)).is_ok());
    }
}
