//! Unit tests for the conversation store.

use super::*;
use crate::storage::MemoryStorage;

fn store() -> ConversationStore {
    ConversationStore::open(Arc::new(MemoryStorage::new()))
}

fn assert_active_valid(store: &ConversationStore) {
    if let Some(id) = store.active_id() {
        assert!(store.conversation(id).is_some(), "active id {id} dangles");
    }
}

#[cfg(test)]
mod title_tests {
    use super::*;

    #[test]
    fn derive_title_truncates_with_ellipsis() {
        let title = derive_title("Explain quantum computing in simple terms and more", 30);
        assert_eq!(title, "Explain quantum computing in s...");
    }

    #[test]
    fn derive_title_keeps_short_content() {
        assert_eq!(derive_title("Hello", 30), "Hello");
    }

    #[test]
    fn derive_title_exact_length_has_no_ellipsis() {
        let content = "a".repeat(30);
        assert_eq!(derive_title(&content, 30), content);
    }

    #[test]
    fn derive_title_counts_characters_not_bytes() {
        let content = "é".repeat(31);
        let title = derive_title(&content, 30);
        assert_eq!(title, format!("{}...", "é".repeat(30)));
    }

    #[test]
    fn validate_title_trims() {
        assert_eq!(validate_title("  Trip plan  ", 20).expect("valid"), "Trip plan");
    }

    #[test]
    fn validate_title_rejects_empty() {
        assert!(validate_title("   ", 20).is_err());
    }

    #[test]
    fn validate_title_rejects_too_long() {
        assert!(validate_title(&"x".repeat(21), 20).is_err());
        assert!(validate_title(&"x".repeat(20), 20).is_ok());
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[test]
    fn create_makes_active_and_prepends() {
        let mut store = store();
        let first = store.create_conversation().expect("create");
        let second = store.create_conversation().expect("create");

        assert_eq!(store.active_id(), Some(second.as_str()));
        let ids: Vec<_> = store.conversations().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![second.as_str(), first.as_str()]);
        assert_eq!(store.conversation(&first).expect("exists").title, DEFAULT_TITLE);
    }

    #[test]
    fn ensure_active_creates_once() {
        let mut store = store();
        let id = store.ensure_active().expect("ensure");
        let again = store.ensure_active().expect("ensure");
        assert_eq!(id, again);
        assert_eq!(store.conversations().len(), 1);
    }

    #[test]
    fn set_active_switches_between_existing() {
        let mut store = store();
        let first = store.create_conversation().expect("create");
        store.create_conversation().expect("create");

        store.set_active(&first).expect("set active");
        assert_eq!(store.active_id(), Some(first.as_str()));
    }

    #[test]
    fn set_active_ignores_unknown_id() {
        let mut store = store();
        let id = store.create_conversation().expect("create");
        store.set_active("missing").expect("set active");
        assert_eq!(store.active_id(), Some(id.as_str()));
    }

    #[test]
    fn delete_active_repoints_to_first_remaining() {
        let mut store = store();
        let a = store.create_conversation().expect("create");
        let b = store.create_conversation().expect("create");
        let c = store.create_conversation().expect("create");

        store.delete_conversation(&c).expect("delete");
        assert_eq!(store.active_id(), Some(b.as_str()));

        store.set_active(&a).expect("set active");
        store.delete_conversation(&b).expect("delete");
        assert_eq!(store.active_id(), Some(a.as_str()));
    }

    #[test]
    fn delete_last_clears_pointer() {
        let mut store = store();
        let id = store.create_conversation().expect("create");
        store.delete_conversation(&id).expect("delete");
        assert_eq!(store.active_id(), None);
        assert!(store.conversations().is_empty());
    }

    #[test]
    fn delete_unknown_is_noop() {
        let mut store = store();
        let id = store.create_conversation().expect("create");
        store.delete_conversation("missing").expect("delete");
        assert_eq!(store.conversations().len(), 1);
        assert_eq!(store.active_id(), Some(id.as_str()));
    }

    #[test]
    fn active_pointer_never_dangles() {
        let mut store = store();
        let mut ids: Vec<String> = Vec::new();
        for step in 0..24 {
            if step % 3 == 2 {
                let victim = ids.remove(step % ids.len());
                store.delete_conversation(&victim).expect("delete");
            } else {
                ids.push(store.create_conversation().expect("create"));
            }
            assert_active_valid(&store);
        }
        for id in ids {
            store.delete_conversation(&id).expect("delete");
            assert_active_valid(&store);
        }
        assert_eq!(store.active_id(), None);
    }
}

#[cfg(test)]
mod message_tests {
    use super::*;

    #[test]
    fn append_derives_title_once() {
        let mut store = store();
        let id = store.create_conversation().expect("create");

        store.append_message(&id, Message::user("First question")).expect("append");
        store.append_message(&id, Message::user("Second question")).expect("append");

        let conv = store.conversation(&id).expect("exists");
        assert_eq!(conv.title, "First question");
        assert_eq!(conv.messages.len(), 2);
    }

    #[test]
    fn assistant_message_does_not_title() {
        let mut store = store();
        let id = store.create_conversation().expect("create");

        store.append_message(&id, Message::assistant("Welcome!")).expect("append");
        assert_eq!(store.conversation(&id).expect("exists").title, DEFAULT_TITLE);

        store.append_message(&id, Message::user("Hi")).expect("append");
        assert_eq!(store.conversation(&id).expect("exists").title, "Hi");
    }

    #[test]
    fn append_to_active_starts_conversation_when_none_active() {
        let mut store = store();
        assert_eq!(store.active_id(), None);

        let id = store
            .append_to_active(Message::assistant("Saved answer"))
            .expect("append");

        assert_eq!(store.active_id(), Some(id.as_str()));
        assert_eq!(store.conversations().len(), 1);
        assert_eq!(store.messages(&id)[0].content, "Saved answer");
    }

    #[test]
    fn append_to_active_uses_current_conversation() {
        let mut store = store();
        let first = store.create_conversation().expect("create");
        let second = store.create_conversation().expect("create");
        store.set_active(&first).expect("activate");

        let target = store
            .append_to_active(Message::user("Pick up here"))
            .expect("append");

        assert_eq!(target, first);
        assert_eq!(store.messages(&first).len(), 1);
        assert!(store.messages(&second).is_empty());
        assert_eq!(store.conversation(&first).expect("exists").title, "Pick up here");
    }

    #[test]
    fn renamed_conversation_keeps_title() {
        let mut store = store();
        let id = store.create_conversation().expect("create");
        store.rename_conversation(&id, "Pinned").expect("rename");
        store.append_message(&id, Message::user("Hello")).expect("append");
        assert_eq!(store.conversation(&id).expect("exists").title, "Pinned");
    }

    #[test]
    fn append_refreshes_updated_at() {
        let mut store = store();
        let id = store.create_conversation().expect("create");
        let before = store.conversation(&id).expect("exists").updated_at;
        store.append_message(&id, Message::user("Hello")).expect("append");
        assert!(store.conversation(&id).expect("exists").updated_at >= before);
    }

    #[test]
    fn append_preserves_order() {
        let mut store = store();
        let id = store.create_conversation().expect("create");
        for content in ["one", "two", "three"] {
            store.append_message(&id, Message::user(content)).expect("append");
        }
        let contents: Vec<_> = store.messages(&id).iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn append_to_unknown_is_noop() {
        let mut store = store();
        store.append_message("missing", Message::user("lost")).expect("append");
        assert!(store.conversations().is_empty());
        assert!(store.messages("missing").is_empty());
    }

    #[test]
    fn custom_title_length() {
        let mut store = store().with_title_max_chars(5);
        let id = store.create_conversation().expect("create");
        store.append_message(&id, Message::user("Hello world")).expect("append");
        assert_eq!(store.conversation(&id).expect("exists").title, "Hello...");
    }

    #[test]
    fn clear_resets_title_and_messages() {
        let mut store = store();
        let id = store.create_conversation().expect("create");
        store
            .append_message(&id, Message::user("Explain quantum computing in simple terms and more"))
            .expect("append");
        assert_eq!(
            store.conversation(&id).expect("exists").title,
            "Explain quantum computing in s..."
        );

        store.clear_messages(&id).expect("clear");
        let conv = store.conversation(&id).expect("exists");
        assert_eq!(conv.title, DEFAULT_TITLE);
        assert!(conv.messages.is_empty());
    }

    #[test]
    fn title_derives_again_after_clear() {
        let mut store = store();
        let id = store.create_conversation().expect("create");
        store.append_message(&id, Message::user("Old topic")).expect("append");
        store.clear_messages(&id).expect("clear");
        store.append_message(&id, Message::user("New topic")).expect("append");
        assert_eq!(store.conversation(&id).expect("exists").title, "New topic");
    }

    #[test]
    fn search_spans_conversations() {
        let mut store = store();
        let a = store.create_conversation().expect("create");
        store.append_message(&a, Message::user("Tell me about Rust")).expect("append");
        let b = store.create_conversation().expect("create");
        store.append_message(&b, Message::assistant("rust never sleeps")).expect("append");
        store.append_message(&b, Message::user("unrelated")).expect("append");

        let hits = store.search("RUST");
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().any(|hit| hit.conversation.id == a));
        assert!(hits.iter().any(|hit| hit.conversation.id == b));
    }
}

#[cfg(test)]
mod subscription_tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn subscribers_see_committed_state() {
        let mut store = store();
        let titles = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&titles);
        store.subscribe(move |state: &ConversationState| {
            if let Some(first) = state.conversations.first() {
                sink.borrow_mut().push(first.title.clone());
            }
        });

        let id = store.create_conversation().expect("create");
        store.append_message(&id, Message::user("Ping")).expect("append");

        assert_eq!(*titles.borrow(), vec![DEFAULT_TITLE.to_string(), "Ping".to_string()]);
    }

    #[test]
    fn noop_mutations_do_not_notify() {
        let mut store = store();
        let calls = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&calls);
        store.subscribe(move |_: &ConversationState| *sink.borrow_mut() += 1);

        store.delete_conversation("missing").expect("delete");
        store.clear_messages("missing").expect("clear");
        store.rename_conversation("missing", "x").expect("rename");
        assert_eq!(*calls.borrow(), 0);
    }
}

#[cfg(test)]
mod rehydrate_tests {
    use super::*;
    use crate::storage::StateStorage;

    #[test]
    fn dangling_active_id_is_cleared_on_load() {
        let storage = MemoryStorage::new();
        storage
            .write(
                ConversationState::KEY,
                r#"{"state":{"conversations":[],"activeConversationId":"ghost"},"version":1}"#,
            )
            .expect("write");
        let store = ConversationStore::open(Arc::new(storage));
        assert_eq!(store.active_id(), None);
    }

    #[test]
    fn legacy_field_names_load() {
        let storage = MemoryStorage::new();
        storage
            .write(
                ConversationState::KEY,
                r#"{"state":{"chats":[{"id":"1700000000000","title":"Old chat","messages":[{"id":"1","role":"user","content":"hi","timestamp":"2024-01-01T00:00:00.000Z"}],"createdAt":"2024-01-01T00:00:00.000Z","updatedAt":"2024-01-01T00:00:00.000Z"}],"activeChat":"1700000000000"},"version":0}"#,
            )
            .expect("write");
        let store = ConversationStore::open(Arc::new(storage));
        assert_eq!(store.active_id(), Some("1700000000000"));
        assert_eq!(store.messages("1700000000000").len(), 1);
        assert_eq!(store.conversations()[0].title, "Old chat");
    }

    #[test]
    fn malformed_record_starts_empty() {
        let storage = MemoryStorage::new();
        storage
            .write(ConversationState::KEY, r#"{"state":{"conversations":"nope"}}"#)
            .expect("write");
        let store = ConversationStore::open(Arc::new(storage));
        assert!(store.conversations().is_empty());
        assert_eq!(store.active_id(), None);
    }
}
