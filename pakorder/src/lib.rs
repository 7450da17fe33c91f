//! Pakorder - deterministic mod settings synthesis for Baldur's Gate 3.
//!
//! Pakorder aggregates metadata from the `.pak` package files contributed
//! by installed mods, decides which packages override built-in game
//! content versus merely extend it, and synthesizes the `modsettings.lsx`
//! document that tells the game which content modules to load and in what
//! order.
//!
//! The flow, driven by [`generator::SettingsGenerator`]:
//!
//! 1. prune the durable metadata cache against the current install state
//! 2. concurrently inspect every uncached package file with the external
//!    Divine tool ([`inspector`], [`pipeline`])
//! 3. classify each package against the built-in content paths
//!    ([`classify`])
//! 4. persist every result ([`cache`]) and deterministically merge the
//!    surviving records into the ordered output document ([`settings`])
//!
//! The host application supplies the mod list, activation state, and
//! profile paths through the [`host`] types; pakorder never owns them.

pub mod cache;
pub mod classify;
pub mod generator;
pub mod host;
pub mod inspector;
pub mod meta;
pub mod pipeline;
pub mod settings;

pub use cache::CacheStore;
pub use classify::{classify, Classification};
pub use generator::{GeneratedSettings, GeneratorError, SettingsGenerator};
pub use host::{ModEntry, ModState, Profile};
pub use inspector::{DivineInspector, InspectorError, PakInspector};
pub use meta::{Attribute, PakRecord};
pub use pipeline::{ExtractionPipeline, PipelineRun, TaskFailure, TaskOutcome};
