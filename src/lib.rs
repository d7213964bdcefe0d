//! midi-vcs: delta-based version control for MIDI track documents
//!
//! Don't diff files, diff the deltas.
//!
//! Every tracked item of a sequencer project (a piano track, an automation
//! lane, the project info) describes itself as an ordered list of deltas:
//! scalar properties such as mute or colour, and event collections such as
//! notes or clips keyed by stable event ids. This crate compares and
//! merges those states and keeps the history as a tree of revisions:
//! - Field-wise event diff (added / removed / changed by id)
//! - Family-coalescing merge with a documented "target wins" policy
//! - Revision tree with order-independent hashing and node serialization
//! - Pack storage for flushed payloads with mark-sweep GC
//! - Checkout, cherry-pick, reset and stashes against a live project
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`node`] | Serialized node tree (tag, typed properties, children) |
//! | [`codec`] | Varint binary encoding of nodes (pack record format) |
//! | [`delta`] | Delta values and the delta kind vocabulary |
//! | [`tracked`] | Tracked item interface and owned item state |
//! | [`events`] | Event parsing, event diff and collection merge rules |
//! | [`diff`] | Diff engine (`create_diff`) |
//! | [`merge`] | Merge engine (`create_merged_item`) |
//! | [`pack`] | Payload store keyed by (item, delta) |
//! | [`revision`] | Revisions, revision items and the revision tree |
//! | [`snapshot`] | Head state replay, working changes, checkout into a project |
//! | [`stash`] | User stashes and the quick stash |
//! | [`repository`] | History with a movable head: commit, checkout, cherry-pick, stash |
//! | [`gc`] | Garbage collection for unreferenced pack records |
//! | [`ids`] | Injected id generator and clock |
//! | [`error`] | Error types |
//!
//! # Feature flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `json` | serde derives and JSON encoding of nodes (default) |
//!
//! # Quick Start
//!
//! ```
//! use midi_vcs::{create_diff, scalar_data, Delta, DeltaDescription, DeltaKind, ScalarKind, TrackedItemState};
//!
//! let kind = DeltaKind::Scalar(ScalarKind::TrackMute);
//! let recorded = TrackedItemState::new().with(
//!     Delta::new(DeltaDescription::new("mute"), kind.clone()),
//!     scalar_data(&kind, false),
//! );
//! let current = TrackedItemState::new().with(
//!     Delta::new(DeltaDescription::new("mute"), kind.clone()),
//!     scalar_data(&kind, true),
//! );
//!
//! // One replacement delta, described from the new value
//! let diff = create_diff(&current, &recorded);
//! assert_eq!(diff.len(), 1);
//! assert_eq!(diff.entries()[0].delta.description().render(), "muted");
//! ```
//!
//! Author: Moroya Sakamoto

pub mod codec;
pub mod delta;
pub mod diff;
pub mod error;
pub mod events;
pub mod gc;
pub mod ids;
pub mod merge;
pub mod node;
pub mod pack;
pub mod repository;
pub mod revision;
pub mod snapshot;
pub mod stash;
pub mod tracked;

pub use codec::{decode_node, encode_node, encoded_node_size};
pub use delta::{
    collection_data, scalar_data, Category, Delta, DeltaDescription, DeltaEntry, DeltaKind, Family,
    ScalarKind, SubKind, HEAD_STATE, VALUE_KEY,
};
pub use diff::{create_diff, describe_scalar, Diff};
pub use error::{CodecError, Result, VcsError};
pub use events::{diff_events, merge_added, merge_changed, merge_removed, parse_events, Event};
pub use gc::{collect_garbage, dry_run, GcResult};
pub use ids::{Clock, FixedClock, IdGenerator, RandomIds, SequentialIds, SystemClock};
pub use merge::create_merged_item;
pub use node::{SerializedNode, Value};
pub use pack::{Pack, PackKey};
pub use repository::Repository;
pub use revision::{ItemType, Payload, Revision, RevisionItem, RevisionTree, StoredDelta};
pub use snapshot::{ItemsSource, ProjectItem, Snapshot, SnapshotItem};
pub use stash::StashCollection;
pub use tracked::{TrackedItem, TrackedItemState};
