//! pubsync Core - documents and the values that flow between engines
//!
//! This crate provides the shared vocabulary of pubsync:
//! - Documents with an id and a last-modified marker
//! - Typed query filters, find options and update operations
//! - Watermark maps and diff results for publications
//! - Tagged method results and caller identities

pub mod diff;
pub mod document;
pub mod error;
pub mod filter;
pub mod identity;
pub mod result;
pub mod update;

pub use diff::{CollectionDiff, DiffResult, WatermarkMap};
pub use document::{Document, DocumentId, Marker, ID_FIELD, UPDATED_AT_FIELD};
pub use error::{Error, Result};
pub use filter::{Filter, FindOptions, Predicate, Projection, Sort, SortOrder};
pub use identity::{Identity, UserId};
pub use result::MethodResult;
pub use update::{Update, UpdateOp};
