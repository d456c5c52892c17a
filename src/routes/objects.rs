//! Public protocol document retrieval
//!
//! Actor documents and follower collections are built from rows on every
//! request; note and grant documents are served verbatim from the archive,
//! exactly as they were signed.

use hyper::StatusCode;
use serde_json::Value;

use crate::activitypub::{
    ActorDocument, Note, OrderedCollection, PublicKeyDocument, RepliesCollection,
    ACTIVITYSTREAMS_CONTEXT,
};
use crate::db::{self, ActorRow};
use crate::error::LaurelError;
use crate::http::AppState;
use crate::routes::response::{activity_bytes, activity_json, HandlerResult};

/// GET /actors/{username}
pub async fn handle_get_actor(state: &AppState, username: &str) -> HandlerResult {
    let actor = load_actor(state, username)?;

    let document = ActorDocument {
        context: ACTIVITYSTREAMS_CONTEXT.to_string(),
        id: actor.uri(),
        kind: "Service".to_string(),
        preferred_username: actor.username.clone(),
        name: actor.display_name.clone(),
        summary: actor.summary.clone(),
        inbox: actor.inbox_uri(),
        followers: actor.followers_uri(),
        public_key: PublicKeyDocument {
            id: actor.key_id(),
            owner: actor.uri(),
            public_key_pem: actor.public_key_pem.clone(),
        },
    };

    Ok(activity_json(StatusCode::OK, &document))
}

/// GET /actors/{username}/followers
pub async fn handle_get_followers(state: &AppState, username: &str) -> HandlerResult {
    let actor = load_actor(state, username)?;

    let followers = state
        .db
        .with_conn(|conn| db::followers::list_followers(conn, &actor.id))?;
    let items = followers.into_iter().map(|f| f.follower_uri).collect();

    let collection = OrderedCollection::new(actor.followers_uri(), items);
    Ok(activity_json(StatusCode::OK, &collection))
}

/// GET /notes/{key}
pub async fn handle_get_note(state: &AppState, key: &str) -> HandlerResult {
    let document = state.notes.get_note(key).await?;
    Ok(activity_bytes(StatusCode::OK, document))
}

/// GET /notes/{key}/replies
///
/// The collection the archived note's `replies` field points at, populated
/// from recorded comment associations. The owning grant is read out of the
/// archived note itself.
pub async fn handle_get_replies(state: &AppState, key: &str) -> HandlerResult {
    let document = state.notes.get_note(key).await?;
    let note: Note = serde_json::from_slice(&document)?;

    let comments = match grant_id_of(&note) {
        Some(grant_id) => state
            .db
            .with_conn(|conn| db::comments::list_comments_for_grant(conn, grant_id))?,
        None => vec![],
    };

    let mut collection = RepliesCollection::for_note(&note.id);
    collection.first.items = comments
        .into_iter()
        .map(|c| {
            serde_json::json!({
                "id": c.note_uri,
                "type": "Note",
                "attributedTo": c.author_uri,
                "content": c.content,
            })
        })
        .collect();

    let mut document = serde_json::to_value(&collection)?;
    document["@context"] = Value::String(ACTIVITYSTREAMS_CONTEXT.to_string());
    Ok(activity_json(StatusCode::OK, &document))
}

/// GET /grants/{id}
pub async fn handle_get_grant(state: &AppState, segment: &str) -> HandlerResult {
    let grant_id: i64 = segment
        .parse()
        .map_err(|_| LaurelError::NotFound(format!("grant {}", segment)))?;

    let document = state.notes.get_grant_document(grant_id).await?;
    Ok(activity_bytes(StatusCode::OK, document))
}

fn load_actor(state: &AppState, username: &str) -> Result<ActorRow, LaurelError> {
    state
        .db
        .with_conn(|conn| db::actors::get_actor_by_username(conn, username))?
        .ok_or_else(|| LaurelError::NotFound(format!("actor {}", username)))
}

fn grant_id_of(note: &Note) -> Option<i64> {
    note.url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
}
