//! Delta values and the delta kind vocabulary
//!
//! A delta is a named unit of change attached to a tracked item: a
//! description for humans and a kind for the engine. Kinds fall into two
//! categories: scalar kinds are replaced wholesale, collection kinds carry
//! ordered event lists and come in added/removed/changed families.
//!
//! Kind identifiers are a shared vocabulary between producers and
//! consumers; anything not in the table is kept as [`DeltaKind::Unknown`]
//! and survives a round trip untouched.
//!
//! Author: Moroya Sakamoto

use crate::node::{SerializedNode, Value};

/// Property holding the value of a scalar payload
pub const VALUE_KEY: &str = "value";

/// Description used for deltas produced by merging
pub const HEAD_STATE: &str = "head state";

// ── Kinds ──────────────────────────────────────────────────────────────

/// Scalar (replace-on-change) delta kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarKind {
    TrackPath,
    TrackMute,
    TrackColour,
    TrackInstrument,
    TrackController,
    TrackTimeSignature,
    ProjectTitle,
    ProjectAuthor,
    ProjectDescription,
    ProjectLicense,
    ProjectTemperament,
}

const SCALAR_IDS: &[(ScalarKind, &str)] = &[
    (ScalarKind::TrackPath, "trackPath"),
    (ScalarKind::TrackMute, "trackMute"),
    (ScalarKind::TrackColour, "trackColour"),
    (ScalarKind::TrackInstrument, "trackInstrument"),
    (ScalarKind::TrackController, "trackController"),
    (ScalarKind::TrackTimeSignature, "trackTimeSignature"),
    (ScalarKind::ProjectTitle, "projectTitle"),
    (ScalarKind::ProjectAuthor, "projectAuthor"),
    (ScalarKind::ProjectDescription, "projectDescription"),
    (ScalarKind::ProjectLicense, "projectLicense"),
    (ScalarKind::ProjectTemperament, "projectTemperament"),
];

impl ScalarKind {
    pub const ALL: [ScalarKind; 11] = [
        ScalarKind::TrackPath,
        ScalarKind::TrackMute,
        ScalarKind::TrackColour,
        ScalarKind::TrackInstrument,
        ScalarKind::TrackController,
        ScalarKind::TrackTimeSignature,
        ScalarKind::ProjectTitle,
        ScalarKind::ProjectAuthor,
        ScalarKind::ProjectDescription,
        ScalarKind::ProjectLicense,
        ScalarKind::ProjectTemperament,
    ];

    pub fn id(self) -> &'static str {
        SCALAR_IDS
            .iter()
            .find(|(k, _)| *k == self)
            .map(|(_, id)| *id)
            .unwrap_or("")
    }
}

/// Event collection families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    AutomationEvents,
    Notes,
    Annotations,
    KeySignatures,
    TimeSignatures,
    Clips,
}

impl Family {
    pub const ALL: [Family; 6] = [
        Family::AutomationEvents,
        Family::Notes,
        Family::Annotations,
        Family::KeySignatures,
        Family::TimeSignatures,
        Family::Clips,
    ];

    /// Identifier prefix shared by the three sub-kinds
    pub fn prefix(self) -> &'static str {
        match self {
            Family::AutomationEvents => "automationEvents",
            Family::Notes => "notes",
            Family::Annotations => "annotations",
            Family::KeySignatures => "keySignatures",
            Family::TimeSignatures => "timeSignatures",
            Family::Clips => "clips",
        }
    }

    /// Tag of the event nodes inside a payload of this family
    pub fn event_tag(self) -> &'static str {
        match self {
            Family::AutomationEvents => "auto",
            Family::Notes => "note",
            Family::Annotations => "annotation",
            Family::KeySignatures => "keySignature",
            Family::TimeSignatures => "timeSignature",
            Family::Clips => "clip",
        }
    }

    /// Plural noun used in descriptions ("added {x} notes")
    pub fn noun(self) -> &'static str {
        match self {
            Family::AutomationEvents => "events",
            Family::Notes => "notes",
            Family::Annotations => "annotations",
            Family::KeySignatures => "key signatures",
            Family::TimeSignatures => "time signatures",
            Family::Clips => "clips",
        }
    }

    pub fn kind(self, sub: SubKind) -> DeltaKind {
        DeltaKind::Collection(self, sub)
    }

    fn id(self, sub: SubKind) -> &'static str {
        use Family::*;
        use SubKind::*;
        match (self, sub) {
            (AutomationEvents, Added) => "automationEventsAdded",
            (AutomationEvents, Removed) => "automationEventsRemoved",
            (AutomationEvents, Changed) => "automationEventsChanged",
            (Notes, Added) => "notesAdded",
            (Notes, Removed) => "notesRemoved",
            (Notes, Changed) => "notesChanged",
            (Annotations, Added) => "annotationsAdded",
            (Annotations, Removed) => "annotationsRemoved",
            (Annotations, Changed) => "annotationsChanged",
            (KeySignatures, Added) => "keySignaturesAdded",
            (KeySignatures, Removed) => "keySignaturesRemoved",
            (KeySignatures, Changed) => "keySignaturesChanged",
            (TimeSignatures, Added) => "timeSignaturesAdded",
            (TimeSignatures, Removed) => "timeSignaturesRemoved",
            (TimeSignatures, Changed) => "timeSignaturesChanged",
            (Clips, Added) => "clipsAdded",
            (Clips, Removed) => "clipsRemoved",
            (Clips, Changed) => "clipsChanged",
        }
    }
}

/// Position of a collection kind inside its family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubKind {
    Added,
    Removed,
    Changed,
}

impl SubKind {
    pub const ALL: [SubKind; 3] = [SubKind::Added, SubKind::Removed, SubKind::Changed];

    pub fn verb(self) -> &'static str {
        match self {
            SubKind::Added => "added",
            SubKind::Removed => "removed",
            SubKind::Changed => "changed",
        }
    }
}

/// Dispatch category of a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Scalar(ScalarKind),
    Collection(Family),
    Unknown,
}

/// Delta kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeltaKind {
    Scalar(ScalarKind),
    Collection(Family, SubKind),
    /// Identifier this build does not know; passed through verbatim
    Unknown(String),
}

impl DeltaKind {
    /// Parse an identifier; never fails
    pub fn from_id(id: &str) -> Self {
        if let Some((kind, _)) = SCALAR_IDS.iter().find(|(_, s)| *s == id) {
            return DeltaKind::Scalar(*kind);
        }
        for family in Family::ALL {
            for sub in SubKind::ALL {
                if family.id(sub) == id {
                    return DeltaKind::Collection(family, sub);
                }
            }
        }
        DeltaKind::Unknown(String::from(id))
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeltaKind::Scalar(k) => k.id(),
            DeltaKind::Collection(f, s) => f.id(*s),
            DeltaKind::Unknown(id) => id,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            DeltaKind::Scalar(k) => Category::Scalar(*k),
            DeltaKind::Collection(f, _) => Category::Collection(*f),
            DeltaKind::Unknown(_) => Category::Unknown,
        }
    }

    pub fn family(&self) -> Option<Family> {
        match self {
            DeltaKind::Collection(f, _) => Some(*f),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, DeltaKind::Unknown(_))
    }
}

impl From<ScalarKind> for DeltaKind {
    fn from(k: ScalarKind) -> Self {
        DeltaKind::Scalar(k)
    }
}

impl std::fmt::Display for DeltaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Description ────────────────────────────────────────────────────────

/// Human-readable description: a template with an optional `{x}` slot
/// filled by either a count or a string parameter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeltaDescription {
    pub text: String,
    pub count: Option<i64>,
    pub param: Option<String>,
}

impl DeltaDescription {
    pub fn new(text: &str) -> Self {
        Self {
            text: String::from(text),
            count: None,
            param: None,
        }
    }

    pub fn with_count(text: &str, count: i64) -> Self {
        Self {
            count: Some(count),
            ..Self::new(text)
        }
    }

    pub fn with_param(text: &str, param: &str) -> Self {
        Self {
            param: Some(String::from(param)),
            ..Self::new(text)
        }
    }

    /// Text with `{x}` substituted
    pub fn render(&self) -> String {
        let slot = match (&self.param, self.count) {
            (Some(p), _) => p.clone(),
            (None, Some(n)) => n.to_string(),
            (None, None) => return self.text.clone(),
        };
        self.text.replace("{x}", &slot)
    }
}

// ── Delta ──────────────────────────────────────────────────────────────

const DELTA_TAG: &str = "delta";
const KEY_KIND: &str = "kind";
const KEY_TEXT: &str = "description";
const KEY_COUNT: &str = "count";
const KEY_PARAM: &str = "param";

/// Immutable unit of change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    description: DeltaDescription,
    kind: DeltaKind,
}

impl Delta {
    pub fn new(description: DeltaDescription, kind: DeltaKind) -> Self {
        Self { description, kind }
    }

    pub fn kind(&self) -> &DeltaKind {
        &self.kind
    }

    pub fn description(&self) -> &DeltaDescription {
        &self.description
    }

    pub fn has_type(&self, kind: &DeltaKind) -> bool {
        &self.kind == kind
    }

    /// Metadata node (no payload)
    pub fn to_node(&self) -> SerializedNode {
        let mut node = SerializedNode::new(DELTA_TAG)
            .with_property(KEY_KIND, self.kind.as_str())
            .with_property(KEY_TEXT, self.description.text.as_str());
        if let Some(n) = self.description.count {
            node.set_property(KEY_COUNT, n);
        }
        if let Some(p) = &self.description.param {
            node.set_property(KEY_PARAM, p.as_str());
        }
        node
    }

    /// Read metadata back; `None` if the node is not a delta
    pub fn from_node(node: &SerializedNode) -> Option<Self> {
        if !node.has_type(DELTA_TAG) {
            return None;
        }
        let kind = DeltaKind::from_id(node.property(KEY_KIND)?.as_str()?);
        let description = DeltaDescription {
            text: String::from(node.get_str(KEY_TEXT, "")),
            count: node.property(KEY_COUNT).and_then(Value::as_i64),
            param: node
                .property(KEY_PARAM)
                .and_then(Value::as_str)
                .map(String::from),
        };
        Some(Self { description, kind })
    }

    pub(crate) fn is_delta_node(node: &SerializedNode) -> bool {
        node.has_type(DELTA_TAG)
    }
}

/// A delta together with its payload
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaEntry {
    pub delta: Delta,
    pub data: SerializedNode,
}

impl DeltaEntry {
    pub fn new(delta: Delta, data: SerializedNode) -> Self {
        Self { delta, data }
    }

    pub fn kind(&self) -> &DeltaKind {
        self.delta.kind()
    }
}

/// Scalar payload: a node tagged with the kind holding `value`
pub fn scalar_data(kind: &DeltaKind, value: impl Into<Value>) -> SerializedNode {
    SerializedNode::new(kind.as_str()).with_property(VALUE_KEY, value)
}

/// Collection payload: a node tagged with the kind holding event nodes
pub fn collection_data(
    kind: &DeltaKind,
    events: impl IntoIterator<Item = SerializedNode>,
) -> SerializedNode {
    SerializedNode::new(kind.as_str()).with_children(events)
}
