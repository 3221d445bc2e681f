//! Embedding core for hosting a web-content engine inside native applications.
//!
//! See [`webhost_core`] for the runtime, bridge and presentation pieces and
//! [`webhost_config`] for `webhost.toml` loading.

pub use webhost_config as config;
pub use webhost_core::*;
