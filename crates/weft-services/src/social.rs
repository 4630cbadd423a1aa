//! Social feed: broadcast posts, keep a timestamp-ordered local timeline.
//!
//! Store layout:
//!   post/{id} → SocialPost

use std::sync::Arc;

use tracing::{debug, warn};

use weft_core::schema::{namespace, random_id, Packet, SocialPost};
use weft_mesh::{KvStore, KvStoreExt, MeshController, StoreError};

pub struct SocialFeed {
    controller: Arc<MeshController>,
    store: Arc<dyn KvStore>,
    display_name: String,
}

impl SocialFeed {
    pub fn new(
        controller: Arc<MeshController>,
        store: Arc<dyn KvStore>,
        display_name: String,
    ) -> Self {
        Self {
            controller,
            store,
            display_name,
        }
    }

    /// Publish a post to everyone on the social namespace.
    pub async fn publish(&self, content: &str) -> Result<SocialPost, StoreError> {
        let post = SocialPost {
            id: random_id(),
            author_id: self.controller.local_id().to_string(),
            author_name: self.display_name.clone(),
            content: content.to_string(),
            timestamp: now_millis(),
        };
        self.store.put_as(&post_key(&post.id), &post).await?;
        if let Err(e) = self
            .controller
            .broadcast(namespace::SOCIAL, Packet::SocialPost { post: post.clone() })
            .await
        {
            warn!(post = post.id.as_str(), error = %e, "post broadcast failed");
        }
        Ok(post)
    }

    /// Store a post received from the mesh. Idempotent by post id.
    pub async fn on_post(&self, post: SocialPost) -> Result<(), StoreError> {
        let key = post_key(&post.id);
        if self.store.get(&key).await?.is_some() {
            return Ok(());
        }
        debug!(post = post.id.as_str(), author = post.author_id.as_str(), "post received");
        self.store.put_as(&key, &post).await
    }

    /// The timeline, newest first.
    pub async fn timeline(&self) -> Result<Vec<SocialPost>, StoreError> {
        let mut posts = Vec::new();
        for key in self.store.keys_with_prefix("post/").await? {
            if let Some(post) = self.store.get_as::<SocialPost>(&key).await? {
                posts.push(post);
            }
        }
        posts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(posts)
    }
}

fn post_key(id: &str) -> String {
    format!("post/{id}")
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
