//! ActivityStreams document types
//!
//! Serialization targets for every protocol document this service emits
//! (Note, Create, Accept, actor documents, collections) and the typed
//! classification of inbound inbox payloads. Field names follow the
//! federation convention (camelCase, `@context`, `type`), so wire shape is
//! fixed here and nowhere else.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LaurelError, Result};

/// JSON-LD context used on all outbound documents
pub const ACTIVITYSTREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

/// Public addressing collection
pub const PUBLIC_AUDIENCE: &str = "https://www.w3.org/ns/activitystreams#Public";

/// Content type for activity documents
pub const ACTIVITY_CONTENT_TYPE: &str = "application/activity+json";

// ===== Outbound documents =====

/// A grant announcement or notification note
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub url: String,
    pub attributed_to: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub published: String,
    pub tags: Vec<Tag>,
    pub replies: RepliesCollection,
    /// Present when the note represents a credential
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<BadgeMetadata>,
}

/// Mention or hashtag attached to a note
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    pub name: String,
}

impl Tag {
    pub fn mention(href: &str, name: &str) -> Self {
        Self {
            kind: "Mention".to_string(),
            href: Some(href.to_string()),
            name: name.to_string(),
        }
    }
}

/// Reply collection pointer embedded in a note
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepliesCollection {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub first: RepliesPage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepliesPage {
    #[serde(rename = "type")]
    pub kind: String,
    pub next: String,
    pub part_of: String,
    pub items: Vec<Value>,
}

impl RepliesCollection {
    /// Empty reply collection rooted at a note URI
    pub fn for_note(note_uri: &str) -> Self {
        let collection_uri = format!("{}/replies", note_uri);
        Self {
            id: collection_uri.clone(),
            kind: "Collection".to_string(),
            first: RepliesPage {
                kind: "CollectionPage".to_string(),
                next: format!("{}?page=true", collection_uri),
                part_of: collection_uri,
                items: vec![],
            },
        }
    }
}

/// Credential metadata embedded in a badge note
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeMetadata {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criteria: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub issuer: String,
    pub recipient: String,
    pub issued_on: String,
}

/// Create activity wrapping a note for delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateActivity {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub actor: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub published: String,
    pub object: Note,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<DocumentSignature>,
}

impl CreateActivity {
    /// Wrap a note in an unsigned Create carrying the note's addressing
    pub fn wrap(actor_uri: &str, note: Note) -> Self {
        Self {
            context: ACTIVITYSTREAMS_CONTEXT.to_string(),
            id: format!("{}/activity", note.id),
            kind: "Create".to_string(),
            actor: actor_uri.to_string(),
            to: note.to.clone(),
            cc: note.cc.clone(),
            published: note.published.clone(),
            object: note,
            signature: None,
        }
    }
}

/// Detached signature attached to a Create activity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSignature {
    #[serde(rename = "type")]
    pub kind: String,
    pub creator: String,
    pub created: String,
    pub signature_value: String,
}

/// Accept activity acknowledging a Follow or an Undo
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptActivity {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub actor: String,
    pub object: AcceptedObject,
}

/// Echo of the activity being accepted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub actor: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub object: String,
}

impl AcceptActivity {
    pub fn new(actor_uri: &str, accepted: AcceptedObject) -> Self {
        Self {
            context: ACTIVITYSTREAMS_CONTEXT.to_string(),
            id: format!("{}#accepts/{}", actor_uri, uuid::Uuid::new_v4()),
            kind: "Accept".to_string(),
            actor: actor_uri.to_string(),
            object: accepted,
        }
    }
}

/// Published profile document for a local actor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorDocument {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub preferred_username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub inbox: String,
    pub followers: String,
    pub public_key: PublicKeyDocument,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyDocument {
    pub id: String,
    pub owner: String,
    pub public_key_pem: String,
}

/// Followers listing served at the actor's followers URI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedCollection {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub total_items: u64,
    pub ordered_items: Vec<String>,
}

impl OrderedCollection {
    pub fn new(id: String, items: Vec<String>) -> Self {
        Self {
            context: ACTIVITYSTREAMS_CONTEXT.to_string(),
            id,
            kind: "OrderedCollection".to_string(),
            total_items: items.len() as u64,
            ordered_items: items,
        }
    }
}

/// Remote actor profile, as fetched from its URI
///
/// Only the fields the pipeline needs; remote servers attach many more.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteActor {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    pub inbox: String,
    #[serde(default)]
    pub public_key: Option<PublicKeyDocument>,
}

impl RemoteActor {
    /// Best display name the profile offers
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.preferred_username.as_deref())
            .unwrap_or(&self.id)
    }
}

// ===== Inbound classification =====

/// Raw inbox payload before classification
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityEnvelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub object: Value,
}

/// A classified inbound activity with a typed payload per variant
#[derive(Debug, Clone)]
pub enum InboundActivity {
    Follow {
        id: Option<String>,
        actor: String,
        object: String,
    },
    Undo {
        actor: String,
        object: UndoTarget,
    },
    Create {
        actor: String,
        note: InboundNote,
    },
    Delete {
        actor: String,
    },
    Other {
        actor: String,
        kind: String,
    },
}

impl InboundActivity {
    /// URI of the actor the activity claims as its sender
    pub fn actor(&self) -> &str {
        match self {
            InboundActivity::Follow { actor, .. }
            | InboundActivity::Undo { actor, .. }
            | InboundActivity::Create { actor, .. }
            | InboundActivity::Delete { actor }
            | InboundActivity::Other { actor, .. } => actor,
        }
    }
}

/// Echo of the original activity inside an Undo
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoTarget {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
}

/// Inbound note carried by a Create activity
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundNote {
    pub id: String,
    #[serde(default)]
    pub in_reply_to: Option<String>,
    #[serde(default)]
    pub attributed_to: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub badge: Option<Value>,
}

/// Classify a raw envelope into a typed activity
///
/// Malformed envelopes (missing actor or type, payload shape not matching
/// the declared type) are rejected; unsupported types classify as `Other`
/// so the router can accept and ignore them.
pub fn classify(envelope: ActivityEnvelope) -> Result<InboundActivity> {
    let actor = envelope
        .actor
        .filter(|a| !a.is_empty())
        .ok_or_else(|| LaurelError::InvalidActivity("missing actor".to_string()))?;

    let kind = envelope
        .kind
        .filter(|k| !k.is_empty())
        .ok_or_else(|| LaurelError::InvalidActivity("missing type".to_string()))?;

    match kind.as_str() {
        "Follow" => {
            let object = envelope
                .object
                .as_str()
                .filter(|o| !o.is_empty())
                .ok_or_else(|| {
                    LaurelError::InvalidActivity("Follow object must be an actor URI".to_string())
                })?
                .to_string();
            Ok(InboundActivity::Follow {
                id: envelope.id,
                actor,
                object,
            })
        }
        "Undo" => {
            let object: UndoTarget = serde_json::from_value(envelope.object).map_err(|_| {
                LaurelError::InvalidActivity("Undo object must echo the original activity".to_string())
            })?;
            Ok(InboundActivity::Undo { actor, object })
        }
        "Create" => {
            let note: InboundNote = serde_json::from_value(envelope.object).map_err(|_| {
                LaurelError::InvalidActivity("Create object must be a note".to_string())
            })?;
            Ok(InboundActivity::Create { actor, note })
        }
        "Delete" => Ok(InboundActivity::Delete { actor }),
        _ => Ok(InboundActivity::Other { actor, kind }),
    }
}
