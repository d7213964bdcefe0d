//! Event collections: parse, diff and merge by stable id
//!
//! A collection payload is a node whose children are events of one family
//! (notes, automation points, clips, ...). Every event carries an `id`
//! that survives edits, plus a handful of comparable fields; two events
//! with the same id are "changed" when any comparable field differs.
//!
//! Payloads are parsed leniently: children with a foreign tag or without
//! an id are skipped, so a malformed payload reads as a smaller (possibly
//! empty) collection rather than an error.
//!
//! Author: Moroya Sakamoto

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::delta::{collection_data, Delta, DeltaDescription, DeltaEntry, Family, SubKind, VALUE_KEY};
use crate::node::{SerializedNode, Value};

// ── Property keys ──────────────────────────────────────────────────────

pub const KEY_ID: &str = "id";
pub const KEY_BEAT: &str = "beat";
pub const KEY_KEY: &str = "key";
pub const KEY_LENGTH: &str = "len";
pub const KEY_VOLUME: &str = "vol";
pub const KEY_VALUE: &str = "val";
pub const KEY_CURVE: &str = "curve";
pub const KEY_TUPLET: &str = "tuplet";
pub const KEY_TEXT: &str = "text";
pub const KEY_COLOUR: &str = "colour";
pub const KEY_NUMERATOR: &str = "numerator";
pub const KEY_DENOMINATOR: &str = "denominator";
pub const KEY_SCALE: &str = "scale";

impl Family {
    /// Fields whose difference marks an event as changed
    pub fn compared_fields(self) -> &'static [&'static str] {
        match self {
            Family::Notes => &[KEY_KEY, KEY_BEAT, KEY_LENGTH, KEY_VOLUME, KEY_TUPLET],
            Family::AutomationEvents => &[KEY_BEAT, KEY_VALUE, KEY_CURVE],
            Family::Annotations => &[KEY_BEAT, KEY_TEXT, KEY_COLOUR, KEY_LENGTH],
            Family::KeySignatures => &[KEY_BEAT, KEY_KEY, KEY_SCALE],
            Family::TimeSignatures => &[KEY_BEAT, KEY_NUMERATOR, KEY_DENOMINATOR],
            Family::Clips => &[KEY_KEY, KEY_BEAT, KEY_VOLUME],
        }
    }
}

// ── Event ──────────────────────────────────────────────────────────────

/// One parsed event; keeps its source node for re-serialization
#[derive(Debug, Clone)]
pub struct Event {
    id: String,
    beat: f64,
    node: SerializedNode,
}

impl Event {
    /// Parse a child node; `None` without an id
    pub fn from_node(node: &SerializedNode) -> Option<Self> {
        let id = match node.property(KEY_ID)? {
            Value::Str(s) if s.is_empty() => return None,
            v => v.to_display_string(),
        };
        Some(Self {
            id,
            beat: node.get_f64(KEY_BEAT, 0.0),
            node: node.clone(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn beat(&self) -> f64 {
        self.beat
    }

    pub fn node(&self) -> &SerializedNode {
        &self.node
    }

    pub fn into_node(self) -> SerializedNode {
        self.node
    }

    /// Field-wise difference over the family's comparable fields
    pub fn differs_from(&self, other: &Event, family: Family) -> bool {
        family
            .compared_fields()
            .iter()
            .any(|f| !values_match(self.node.property(f), other.node.property(f)))
    }

    fn sort_order(&self, other: &Event) -> Ordering {
        self.beat
            .total_cmp(&other.beat)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Numbers compare by value regardless of width
fn values_match(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(Value::Str(x)), Some(Value::Str(y))) => x == y,
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x == y,
        (Some(x), Some(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) => fx == fy,
            _ => x == y,
        },
        _ => false,
    }
}

/// Events of a payload sorted by (beat, id)
pub fn parse_events(family: Family, payload: &SerializedNode) -> Vec<Event> {
    let mut events: Vec<Event> = payload
        .children_with_type(family.event_tag())
        .filter_map(Event::from_node)
        .collect();
    events.sort_by(Event::sort_order);
    events
}

/// A collection payload must not look like a scalar one
pub fn is_collection_payload(payload: &SerializedNode) -> bool {
    !(payload.has_property(VALUE_KEY) && payload.num_children() == 0)
}

fn index_by_id(events: &[Event]) -> HashMap<&str, &Event> {
    events.iter().map(|e| (e.id(), e)).collect()
}

fn sorted(mut events: Vec<Event>) -> Vec<Event> {
    events.sort_by(Event::sort_order);
    events
}

fn serialize(family: Family, sub: SubKind, events: Vec<Event>) -> SerializedNode {
    collection_data(&family.kind(sub), events.into_iter().map(Event::into_node))
}

// ── Diff ───────────────────────────────────────────────────────────────

/// Added / removed / changed deltas between two payloads of one family.
///
/// Empty buckets produce nothing; identical payloads produce an empty vec.
pub fn diff_events(family: Family, state: &SerializedNode, changes: &SerializedNode) -> Vec<DeltaEntry> {
    let state_events = parse_events(family, state);
    let changes_events = parse_events(family, changes);

    let changes_index = index_by_id(&changes_events);
    let state_ids: HashSet<&str> = state_events.iter().map(Event::id).collect();

    let mut removed = Vec::new();
    let mut changed = Vec::new();
    for old in &state_events {
        match changes_index.get(old.id()) {
            None => removed.push(old.clone()),
            Some(new) if old.differs_from(new, family) => changed.push((*new).clone()),
            Some(_) => {}
        }
    }

    let added: Vec<Event> = changes_events
        .iter()
        .filter(|e| !state_ids.contains(e.id()))
        .cloned()
        .collect();

    let mut out = Vec::new();
    for (sub, bucket) in [
        (SubKind::Added, added),
        (SubKind::Removed, removed),
        (SubKind::Changed, changed),
    ] {
        if bucket.is_empty() {
            continue;
        }
        let text = format!("{} {{x}} {}", sub.verb(), family.noun());
        let delta = Delta::new(
            DeltaDescription::with_count(&text, bucket.len() as i64),
            family.kind(sub),
        );
        out.push(DeltaEntry::new(delta, serialize(family, sub, bucket)));
    }
    out
}

// ── Merge ──────────────────────────────────────────────────────────────

/// Union; events whose id is already accumulated are not re-added
pub fn merge_added(family: Family, acc: &SerializedNode, changes: &SerializedNode) -> SerializedNode {
    let mut result = parse_events(family, acc);
    let mut seen: HashSet<String> = result.iter().map(|e| e.id.clone()).collect();
    for event in parse_events(family, changes) {
        if seen.insert(event.id.clone()) {
            result.push(event);
        }
    }
    serialize(family, SubKind::Added, sorted(result))
}

/// Accumulated events whose id is not in the removal set
pub fn merge_removed(family: Family, acc: &SerializedNode, changes: &SerializedNode) -> SerializedNode {
    let removal = parse_events(family, changes);
    let doomed: HashSet<&str> = removal.iter().map(Event::id).collect();
    let result: Vec<Event> = parse_events(family, acc)
        .into_iter()
        .filter(|e| !doomed.contains(e.id()))
        .collect();
    serialize(family, SubKind::Added, result)
}

/// Replace accumulated events by id; unknown ids are ignored
pub fn merge_changed(family: Family, acc: &SerializedNode, changes: &SerializedNode) -> SerializedNode {
    let edits = parse_events(family, changes);
    let edits_index = index_by_id(&edits);
    let result: Vec<Event> = parse_events(family, acc)
        .into_iter()
        .map(|e| match edits_index.get(e.id()) {
            Some(edit) => (*edit).clone(),
            None => e,
        })
        .collect();
    serialize(family, SubKind::Added, sorted(result))
}

/// Dispatch on sub-kind
pub fn merge_by_sub_kind(
    family: Family,
    sub: SubKind,
    acc: &SerializedNode,
    changes: &SerializedNode,
) -> SerializedNode {
    match sub {
        SubKind::Added => merge_added(family, acc, changes),
        SubKind::Removed => merge_removed(family, acc, changes),
        SubKind::Changed => merge_changed(family, acc, changes),
    }
}

/// Empty full-set payload of a family
pub fn empty_collection(family: Family) -> SerializedNode {
    collection_data(&family.kind(SubKind::Added), std::iter::empty())
}
