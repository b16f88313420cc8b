//! # perfscope report library
//!
//! Figures and tables built from collected benchmark data.
//!
//! - [`figure`]: serializable figure descriptions
//! - [`candlestick`], [`violin`], [`load_signal`]: figure builders
//! - [`combine`]: side-by-side composition
//! - [`render`]: SVG output
//! - [`html`]: styled comparison tables
//! - [`artifacts`]: saving and reloading everything above

pub mod artifacts;
pub mod candlestick;
pub mod combine;
pub mod figure;
pub mod html;
pub mod load_signal;
pub mod render;
pub mod violin;

pub use artifacts::{Artifact, ArtifactStore, ArtifactTable};
pub use figure::{Axis, AxisKind, Figure, Panel, Trace};
pub use html::StylePolicy;
