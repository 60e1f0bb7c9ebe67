//! Value types shared by every filesystem adapter.
//!
//! These are what callers see: [`Metadata`] describing an object, the
//! derived [`Visibility`], [`File`] and [`StreamFile`] wrappers around
//! content, and the per-call [`WriteOptions`] / [`ReadOptions`].

pub mod file;
pub mod metadata;
pub mod options;

pub use file::{ContentStream, Contents, File, StreamFile};
pub use metadata::{Metadata, Visibility};
pub use options::{ReadOptions, WriteOptions};
