//! GPU adapter identity
//!
//! The only hardware knowledge this crate needs: the vendor and architecture
//! strings reported by the WebGPU adapter, consulted by the variant selector.

/// Vendor/architecture identity of the GPU adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterProfile {
    /// Vendor string, e.g. `"intel"`, `"nvidia"`, `"amd"`
    pub vendor: String,
    /// Architecture string, e.g. `"gen-12lp"`; may be empty when the
    /// platform does not report one
    pub architecture: String,
}

impl AdapterProfile {
    pub fn new(vendor: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            architecture: architecture.into(),
        }
    }

    /// Profile with an unknown architecture
    pub fn vendor_only(vendor: impl Into<String>) -> Self {
        Self::new(vendor, "")
    }

    /// Override the architecture string (native APIs often omit it).
    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = architecture.into();
        self
    }

    /// The integrated Intel profile the block32/prefill kernels are tuned for.
    pub fn is_intel_gen12lp(&self) -> bool {
        self.vendor == "intel" && self.architecture == "gen-12lp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gen12lp_match() {
        assert!(AdapterProfile::new("intel", "gen-12lp").is_intel_gen12lp());
        assert!(!AdapterProfile::new("intel", "xe-2lpg").is_intel_gen12lp());
        assert!(!AdapterProfile::new("nvidia", "gen-12lp").is_intel_gen12lp());
        assert!(!AdapterProfile::vendor_only("intel").is_intel_gen12lp());
    }

    #[test]
    fn test_with_architecture() {
        let p = AdapterProfile::vendor_only("intel").with_architecture("gen-12lp");
        assert!(p.is_intel_gen12lp());
    }
}
