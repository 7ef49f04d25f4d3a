//! Repository Map
//!
//! Service contract, concrete manager, default generator, generation
//! profile, mention extraction and path-set helpers.

pub mod controller;
pub mod generator;
pub mod manager;
pub mod mentions;
pub mod paths;
pub mod profile;
pub mod service;

pub use controller::{RefreshFn, RefreshFuture, RepoMapController};
pub use generator::{MapGenerator, MapRequest, RankedFileListGenerator, RenderedMap};
pub use manager::RepoMapManager;
pub use profile::{ReadFileTracker, RepoMapProfile};
pub use service::{GenerateOpts, RepoMapService};
