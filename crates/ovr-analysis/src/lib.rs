//! Classification of override files against upstream, and the checks that
//! keep a manifest honest as upstream moves on.

mod error;
mod generate;
mod validate;

pub use error::AnalysisError;
pub use generate::{
    GeneratorOptions, ManifestGenerator, derivation_candidates, strip_platform_suffix,
};
pub use validate::{
    DriftKind, DriftReport, NewEntry, ValidationKind, ValidationReport, add_entry, detect_drift,
    refresh_entry, remove_entry, validate_manifest,
};
