use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::{
    match_store::couchdb::error::CouchDaoError,
    models::{AttemptEntity, MatchEntity, SongEntity},
    scoring::Difficulty,
};

pub const MATCH_PREFIX: &str = "match::";
pub const ATTEMPT_PREFIX: &str = "attempt::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Minimal view of a document used to learn its current revision.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchMatchDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: MatchBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchBody {
    pub players: Vec<Uuid>,
    pub selected_song: Option<SongEntity>,
    pub selected_characteristic: Option<String>,
    pub selected_difficulty: Option<Difficulty>,
    pub version: u64,
    pub updated_at: SystemTime,
}

impl From<(MatchEntity, Option<String>)> for CouchMatchDocument {
    fn from((entity, rev): (MatchEntity, Option<String>)) -> Self {
        Self {
            id: match_doc_id(entity.id),
            rev,
            body: MatchBody {
                players: entity.players,
                selected_song: entity.selected_song,
                selected_characteristic: entity.selected_characteristic,
                selected_difficulty: entity.selected_difficulty,
                version: entity.version,
                updated_at: entity.updated_at,
            },
        }
    }
}

impl TryFrom<CouchMatchDocument> for MatchEntity {
    type Error = CouchDaoError;

    fn try_from(doc: CouchMatchDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: extract_uuid(&doc.id)?,
            players: doc.body.players,
            selected_song: doc.body.selected_song,
            selected_characteristic: doc.body.selected_characteristic,
            selected_difficulty: doc.body.selected_difficulty,
            version: doc.body.version,
            updated_at: doc.body.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchAttemptDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub attempt: AttemptEntity,
}

impl From<(AttemptEntity, Option<String>)> for CouchAttemptDocument {
    fn from((attempt, rev): (AttemptEntity, Option<String>)) -> Self {
        Self {
            id: attempt_doc_id(attempt.score_id),
            rev,
            attempt,
        }
    }
}

pub fn match_doc_id(id: Uuid) -> String {
    format!("{}{}", MATCH_PREFIX, id)
}

pub fn attempt_doc_id(score_id: i64) -> String {
    format!("{}{}", ATTEMPT_PREFIX, score_id)
}

pub fn extract_uuid(doc_id: &str) -> Result<Uuid, CouchDaoError> {
    let (_, id) = doc_id
        .split_once("::")
        .ok_or_else(|| CouchDaoError::InvalidDocId {
            doc_id: doc_id.to_string(),
            kind: "missing separator",
        })?;

    Uuid::parse_str(id).map_err(|_| CouchDaoError::InvalidDocId {
        doc_id: doc_id.to_string(),
        kind: "invalid UUID",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::AttemptStatus;

    #[test]
    fn match_document_round_trips_through_couch_layout() {
        let entity = MatchEntity {
            id: Uuid::new_v4(),
            players: vec![Uuid::new_v4()],
            selected_song: None,
            selected_characteristic: None,
            selected_difficulty: Some(Difficulty::Hard),
            version: 3,
            updated_at: SystemTime::UNIX_EPOCH,
        };

        let doc = CouchMatchDocument::from((entity.clone(), Some("1-abc".into())));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["_id"], format!("match::{}", entity.id));
        assert_eq!(json["_rev"], "1-abc");
        assert_eq!(json["selected_difficulty"], "HARD");

        let parsed: CouchMatchDocument = serde_json::from_value(json).unwrap();
        assert_eq!(MatchEntity::try_from(parsed).unwrap(), entity);
    }

    #[test]
    fn attempt_documents_are_keyed_by_score_row() {
        let attempt = AttemptEntity {
            subject: "p1".into(),
            song_hash: "ab12cd34".into(),
            difficulty: Difficulty::Expert,
            level_key: 42,
            score_id: 100,
            score: Some(950_000),
            status: AttemptStatus::Submitted,
            opened_at: SystemTime::UNIX_EPOCH,
            closed_at: Some(SystemTime::UNIX_EPOCH),
        };

        let doc = CouchAttemptDocument::from((attempt, None));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["_id"], "attempt::100");
        assert!(json.get("_rev").is_none());
        assert_eq!(json["status"], "submitted");
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(matches!(
            extract_uuid("match-123"),
            Err(CouchDaoError::InvalidDocId {
                kind: "missing separator",
                ..
            })
        ));
        assert!(matches!(
            extract_uuid("match::nope"),
            Err(CouchDaoError::InvalidDocId {
                kind: "invalid UUID",
                ..
            })
        ));
    }
}
