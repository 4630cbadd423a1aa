//! Synced notes with last-writer-wins conflict resolution.
//!
//! Saves and deletes broadcast to the notes namespace; replicas keep the
//! newest timestamp per note id. A delete is recorded as a tombstone so
//! a stale save arriving later cannot resurrect the note.
//!
//! Store layout:
//!   note/{id}      → Note
//!   tombstone/{id} → deletion timestamp

use std::sync::Arc;

use tracing::warn;

use weft_core::schema::{namespace, random_id, Note, Packet};
use weft_mesh::{KvStore, KvStoreExt, MeshController, StoreError};

pub struct NotesService {
    controller: Arc<MeshController>,
    store: Arc<dyn KvStore>,
}

impl NotesService {
    pub fn new(controller: Arc<MeshController>, store: Arc<dyn KvStore>) -> Self {
        Self { controller, store }
    }

    /// Save a note (new id when none is given) and broadcast it.
    pub async fn save(
        &self,
        id: Option<&str>,
        title: &str,
        content: &str,
    ) -> Result<Note, StoreError> {
        let note = Note {
            id: id.map(str::to_string).unwrap_or_else(random_id),
            title: title.to_string(),
            content: content.to_string(),
            timestamp: now_millis(),
        };
        self.apply_save(note.clone()).await?;
        if let Err(e) = self
            .controller
            .broadcast(namespace::NOTES, Packet::NoteSaved { note: note.clone() })
            .await
        {
            warn!(note = note.id.as_str(), error = %e, "note broadcast failed");
        }
        Ok(note)
    }

    /// Delete a note and broadcast the tombstone.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.apply_delete(id, now_millis()).await?;
        if let Err(e) = self
            .controller
            .broadcast(
                namespace::NOTES,
                Packet::NoteDeleted { note_id: id.to_string() },
            )
            .await
        {
            warn!(note = id, error = %e, "delete broadcast failed");
        }
        Ok(())
    }

    /// Merge a remote save: newest timestamp wins, tombstones win ties.
    pub async fn on_saved(&self, note: Note) -> Result<(), StoreError> {
        self.apply_save(note).await
    }

    pub async fn on_deleted(&self, id: &str) -> Result<(), StoreError> {
        self.apply_delete(id, now_millis()).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Note>, StoreError> {
        self.store.get_as(&note_key(id)).await
    }

    pub async fn list(&self) -> Result<Vec<Note>, StoreError> {
        let mut notes = Vec::new();
        for key in self.store.keys_with_prefix("note/").await? {
            if let Some(note) = self.store.get_as::<Note>(&key).await? {
                notes.push(note);
            }
        }
        Ok(notes)
    }

    async fn apply_save(&self, note: Note) -> Result<(), StoreError> {
        if let Some(deleted_at) = self
            .store
            .get_as::<u64>(&tombstone_key(&note.id))
            .await?
        {
            if deleted_at >= note.timestamp {
                return Ok(());
            }
            self.store.delete(&tombstone_key(&note.id)).await?;
        }
        if let Some(existing) = self.store.get_as::<Note>(&note_key(&note.id)).await? {
            if existing.timestamp > note.timestamp {
                return Ok(());
            }
        }
        self.store.put_as(&note_key(&note.id), &note).await
    }

    async fn apply_delete(&self, id: &str, at: u64) -> Result<(), StoreError> {
        self.store.delete(&note_key(id)).await?;
        self.store.put_as(&tombstone_key(id), &at).await
    }
}

fn note_key(id: &str) -> String {
    format!("note/{id}")
}

fn tombstone_key(id: &str) -> String {
    format!("tombstone/{id}")
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use weft_core::crypto::IdentityKeypair;
    use weft_mesh::{MemoryHub, MemoryStore};

    fn notes() -> NotesService {
        let (transport, _rx) = MemoryHub::new().attach("me");
        let controller = Arc::new(MeshController::new(
            Arc::new(transport),
            Arc::new(IdentityKeypair::generate()),
            None,
            Vec::new(),
            Duration::from_millis(50),
        ));
        NotesService::new(controller, Arc::new(MemoryStore::new()))
    }

    fn note(id: &str, content: &str, timestamp: u64) -> Note {
        Note {
            id: id.into(),
            title: "t".into(),
            content: content.into(),
            timestamp,
        }
    }

    #[tokio::test]
    async fn save_get_list_roundtrip() {
        let notes = notes();
        let saved = notes.save(None, "groceries", "eggs").await.unwrap();
        assert_eq!(notes.get(&saved.id).await.unwrap().unwrap().content, "eggs");
        assert_eq!(notes.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn newer_remote_save_wins() {
        let notes = notes();
        notes.on_saved(note("n1", "old", 10)).await.unwrap();
        notes.on_saved(note("n1", "new", 20)).await.unwrap();
        assert_eq!(notes.get("n1").await.unwrap().unwrap().content, "new");
        // Stale save arriving late changes nothing.
        notes.on_saved(note("n1", "older", 5)).await.unwrap();
        assert_eq!(notes.get("n1").await.unwrap().unwrap().content, "new");
    }

    #[tokio::test]
    async fn tombstone_blocks_stale_resurrection() {
        let notes = notes();
        notes.on_saved(note("n1", "content", 10)).await.unwrap();
        notes.delete("n1").await.unwrap();
        assert!(notes.get("n1").await.unwrap().is_none());
        // A save stamped before the delete stays dead.
        notes.on_saved(note("n1", "zombie", 10)).await.unwrap();
        assert!(notes.get("n1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let notes = notes();
        notes.on_saved(note("n1", "content", 10)).await.unwrap();
        notes.on_deleted("n1").await.unwrap();
        notes.on_deleted("n1").await.unwrap();
        assert!(notes.get("n1").await.unwrap().is_none());
    }
}
