//! Model asset management.

pub mod catalog;
#[cfg(feature = "model-download")]
pub mod download;

pub use catalog::{AssetKind, AssetStatus, ModelAsset, assets, check_installed, missing_assets};
