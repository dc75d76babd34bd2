//! Durable, atomically-persisted state.
//!
//! Every record here supports `initialize()` (load-or-empty), mutating
//! `add*`/`mark*` operations, async `save()`, and synchronous `save_sync()`
//! for the signal-handler flush path. All writes go through
//! [`atomic::AtomicJsonStore`], following the same
//! `content_saver::compression::save_compressed_file` atomic-write discipline
//! (write to a temp path, fsync, rename over the target), generalized from
//! compressed content blobs to plain JSON state documents.

mod atomic;
mod collect;
mod filename_mapping;
mod free;
mod meta;
mod mismatch;
mod progress;

pub use atomic::{load_or_default, save_atomic, save_atomic_sync, AtomicJsonStore};
pub use collect::{CollectResult, CollectionLink};
pub use filename_mapping::FilenameMapping;
pub use free::FreeRecord;
pub use meta::{CountedSet, SiteMeta};
pub use mismatch::{MismatchLog, MismatchRecord};
pub use progress::Progress;
