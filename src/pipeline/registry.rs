//! Declarative registry of obfuscation passes.
//!
//! The order of [`PASS_REGISTRY`] is the order passes are applied in,
//! whatever order the caller listed its options in. Passes do not commute
//! in general, so this order is part of the public contract: two requests
//! enabling the same set of passes always run them identically.

use serde::Serialize;

/// One obfuscation pass the pipeline can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassSpec {
    /// Request option key, also used as the stage name.
    pub name: &'static str,
    /// Human-readable label.
    pub label: &'static str,
    /// Pass name handed to the optimizer as `{pass}`.
    pub pass: &'static str,
}

/// All passes, in application order.
pub const PASS_REGISTRY: &[PassSpec] = &[
    PassSpec {
        name: "pluto_bogus_control_flow",
        label: "Bogus Control Flow",
        pass: "bcf",
    },
    PassSpec {
        name: "pluto_flattening",
        label: "Flattening",
        pass: "fla",
    },
    PassSpec {
        name: "pluto_global_encryption",
        label: "Global Encryption",
        pass: "gle",
    },
    PassSpec {
        name: "pluto_indirect_call",
        label: "Indirect Call",
        pass: "idc",
    },
    PassSpec {
        name: "pluto_mba_obfuscation",
        label: "MBA Obfuscation",
        pass: "mba",
    },
    PassSpec {
        name: "pluto_substitution",
        label: "Substitution",
        pass: "sub",
    },
];

/// Looks up a pass by its option key.
pub fn lookup(name: &str) -> Option<&'static PassSpec> {
    PASS_REGISTRY.iter().find(|spec| spec.name == name)
}
