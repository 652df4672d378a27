//! Saved items store: bookmarked messages, notes and collections.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Collection, CollectionPatch, DEFAULT_COLLECTION_ID, Message, SavedItem, new_id,
};
use crate::storage::{Persisted, StateStorage, StoreState, SubscriptionId};

/// Persisted state of the saved items store.
///
/// `collections` always contains the default collection, and every
/// `collection_id` on a saved item names an existing collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedItemsState {
    #[serde(default)]
    pub saved_items: Vec<SavedItem>,
    #[serde(default)]
    pub collections: Vec<Collection>,
}

impl Default for SavedItemsState {
    fn default() -> Self {
        Self {
            saved_items: Vec::new(),
            collections: vec![Collection::default_collection()],
        }
    }
}

impl SavedItemsState {
    pub fn collection(&self, id: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.id == id)
    }

    fn has_collection(&self, id: &str) -> bool {
        self.collection(id).is_some()
    }

    fn item_mut(&mut self, id: &str) -> Option<&mut SavedItem> {
        self.saved_items.iter_mut().find(|item| item.id == id)
    }
}

impl StoreState for SavedItemsState {
    const KEY: &'static str = "gemini-saved-items-store";

    fn normalize(&mut self, _version: u32) -> bool {
        let mut changed = false;
        if !self.has_collection(DEFAULT_COLLECTION_ID) {
            self.collections.insert(0, Collection::default_collection());
            changed = true;
        }
        let known: Vec<String> = self.collections.iter().map(|c| c.id.clone()).collect();
        for item in &mut self.saved_items {
            if let Some(id) = &item.collection_id {
                if !known.contains(id) {
                    item.collection_id = None;
                    changed = true;
                }
            }
        }
        changed
    }
}

/// Which saved items to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionFilter {
    All,
    Collection(String),
}

/// Placement requested when saving a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaveTarget<'a> {
    /// New items are uncategorized; an already saved item keeps its collection.
    #[default]
    Unspecified,
    /// Uncategorized, even when the item was already filed somewhere.
    Uncategorized,
    Collection(&'a str),
}

impl<'a> SaveTarget<'a> {
    /// `Some(id)` files into `id`; `None` leaves the placement unspecified.
    pub fn from_option(collection_id: Option<&'a str>) -> Self {
        collection_id.map_or(SaveTarget::Unspecified, SaveTarget::Collection)
    }
}

/// Owns saved items and collections. Every mutator writes through to storage
/// before returning; addressing an unknown id is a silent no-op.
pub struct SavedItemsStore {
    inner: Persisted<SavedItemsState>,
}

impl SavedItemsStore {
    /// Rehydrate the store from `storage`.
    pub fn open(storage: Arc<dyn StateStorage>) -> Self {
        Self {
            inner: Persisted::open(storage),
        }
    }

    pub fn state(&self) -> &SavedItemsState {
        self.inner.state()
    }

    pub fn saved_items(&self) -> &[SavedItem] {
        &self.state().saved_items
    }

    pub fn collections(&self) -> &[Collection] {
        &self.state().collections
    }

    pub fn collection(&self, id: &str) -> Option<&Collection> {
        self.state().collection(id)
    }

    /// Lookup by saved item id.
    pub fn saved_item(&self, id: &str) -> Option<&SavedItem> {
        self.saved_items().iter().find(|item| item.id == id)
    }

    /// Lookup by the id of the bookmarked message.
    pub fn get_saved_item(&self, message_id: &str) -> Option<&SavedItem> {
        self.saved_items()
            .iter()
            .find(|item| item.message.id == message_id)
    }

    pub fn is_saved(&self, message_id: &str) -> bool {
        self.get_saved_item(message_id).is_some()
    }

    /// Bookmark `message`, returning the saved item id.
    ///
    /// A message is saved at most once. Saving it again only reassigns the
    /// existing item when `target` names a placement. A collection id that
    /// does not exist leaves a new item uncategorized and an existing item
    /// where it is.
    pub fn save_item(&mut self, message: &Message, target: SaveTarget<'_>) -> Result<String> {
        let assignment = match target {
            SaveTarget::Unspecified => None,
            SaveTarget::Uncategorized => Some(None),
            SaveTarget::Collection(id) if self.state().has_collection(id) => {
                Some(Some(id.to_string()))
            }
            SaveTarget::Collection(id) => {
                tracing::debug!(collection_id = %id, "Unknown collection ignored on save");
                None
            }
        };

        if let Some(existing) = self.get_saved_item(&message.id) {
            let id = existing.id.clone();
            if let Some(collection_id) = assignment {
                if existing.collection_id != collection_id {
                    self.inner.update(|state| {
                        state.item_mut(&id)?.collection_id = collection_id;
                        Some(())
                    })?;
                }
            }
            return Ok(id);
        }

        let item = SavedItem {
            id: new_id(),
            message: message.clone(),
            collection_id: assignment.flatten(),
            saved_at: Utc::now(),
            notes: String::new(),
        };
        let id = item.id.clone();
        self.inner.update(|state| {
            state.saved_items.insert(0, item);
            Some(())
        })?;
        Ok(id)
    }

    pub fn unsave_item(&mut self, id: &str) -> Result<()> {
        let applied = self.inner.update(|state| {
            let index = state.saved_items.iter().position(|item| item.id == id)?;
            state.saved_items.remove(index);
            Some(())
        })?;
        if applied.is_none() {
            tracing::debug!(%id, "Unsave of unknown item ignored");
        }
        Ok(())
    }

    /// Unsave `message` if it is saved, otherwise save it uncategorized.
    /// Returns whether the message is saved afterwards.
    pub fn toggle_save(&mut self, message: &Message) -> Result<bool> {
        if let Some(existing) = self.get_saved_item(&message.id) {
            let id = existing.id.clone();
            self.unsave_item(&id)?;
            Ok(false)
        } else {
            self.save_item(message, SaveTarget::Unspecified)?;
            Ok(true)
        }
    }

    pub fn update_notes(&mut self, id: &str, notes: impl Into<String>) -> Result<()> {
        let notes = notes.into();
        let applied = self.inner.update(|state| {
            state.item_mut(id)?.notes = notes;
            Some(())
        })?;
        if applied.is_none() {
            tracing::debug!(%id, "Notes for unknown item ignored");
        }
        Ok(())
    }

    /// Move an item into a collection, or to uncategorized with `None`.
    /// Unknown items and unknown target collections are ignored.
    pub fn move_to_collection(&mut self, id: &str, collection_id: Option<&str>) -> Result<()> {
        let applied = self.inner.update(|state| {
            if let Some(target) = collection_id {
                if !state.has_collection(target) {
                    return None;
                }
            }
            state.item_mut(id)?.collection_id = collection_id.map(str::to_string);
            Some(())
        })?;
        if applied.is_none() {
            tracing::debug!(%id, ?collection_id, "Move ignored");
        }
        Ok(())
    }

    /// Create a collection and return its id. A missing color gets a random
    /// one.
    pub fn create_collection(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
        color: Option<String>,
    ) -> Result<String> {
        let collection = Collection {
            id: new_id(),
            name: name.into(),
            description: description.unwrap_or_default(),
            created_at: Utc::now(),
            color: color.unwrap_or_else(random_color),
        };
        let id = collection.id.clone();
        self.inner.update(|state| {
            state.collections.push(collection);
            Some(())
        })?;
        Ok(id)
    }

    /// Merge the supplied fields into a collection. `id` and `created_at`
    /// are never touched.
    pub fn update_collection(&mut self, id: &str, patch: CollectionPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let applied = self.inner.update(|state| {
            let collection = state.collections.iter_mut().find(|c| c.id == id)?;
            if let Some(name) = patch.name {
                collection.name = name;
            }
            if let Some(description) = patch.description {
                collection.description = description;
            }
            if let Some(color) = patch.color {
                collection.color = color;
            }
            Some(())
        })?;
        if applied.is_none() {
            tracing::debug!(%id, "Update of unknown collection ignored");
        }
        Ok(())
    }

    /// Delete a collection and uncategorize its items in the same commit.
    /// The default collection is never deleted.
    pub fn delete_collection(&mut self, id: &str) -> Result<()> {
        if id == DEFAULT_COLLECTION_ID {
            tracing::debug!("Refusing to delete the default collection");
            return Ok(());
        }
        let applied = self.inner.update(|state| {
            let index = state.collections.iter().position(|c| c.id == id)?;
            state.collections.remove(index);
            for item in &mut state.saved_items {
                if item.collection_id.as_deref() == Some(id) {
                    item.collection_id = None;
                }
            }
            Some(())
        })?;
        if applied.is_none() {
            tracing::debug!(%id, "Delete of unknown collection ignored");
        }
        Ok(())
    }

    pub fn items_in(&self, filter: &CollectionFilter) -> Vec<&SavedItem> {
        self.saved_items()
            .iter()
            .filter(|item| match filter {
                CollectionFilter::All => true,
                CollectionFilter::Collection(id) => item.collection_id.as_deref() == Some(id),
            })
            .collect()
    }

    pub fn count_in(&self, collection_id: &str) -> usize {
        self.saved_items()
            .iter()
            .filter(|item| item.collection_id.as_deref() == Some(collection_id))
            .count()
    }

    pub fn subscribe(&mut self, listener: impl Fn(&SavedItemsState) + 'static) -> SubscriptionId {
        self.inner.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(id)
    }
}

/// `#RRGGBB` from random bytes.
pub fn random_color() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    format!("#{:02X}{:02X}{:02X}", bytes[0], bytes[1], bytes[2])
}

#[cfg(test)]
#[path = "saved_tests.rs"]
mod tests;
