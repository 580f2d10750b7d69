//! ============================================================================
//! Assistant - Executes conversation transitions
//! ============================================================================
//! Owns the keyed session store. Each event is classified, run through
//! `transition`, and the resulting action is executed against the
//! retrieval engine. The session lock is held for the whole interaction, so
//! interactions are processed one at a time.
//! ============================================================================

use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::access::{Access, AccessGate, UserId};
use crate::memory::{
    normalize_tag, Memory, MemoryDraft, RetrievalEngine, Stats, StoreError, StoreResult,
};

use super::input::{classify, Command, InboundEvent, Input};
use super::machine::{transition, Action, Transition};
use super::render::{self, RECENT_LIMIT, SEARCH_LIMIT, TAG_HINT_COUNT, TAG_RESULTS_LIMIT};
use super::reply::Reply;
use super::state::{Draft, Mode, Session};

/// The conversational front-end over a `RetrievalEngine`
pub struct Assistant {
    engine: RetrievalEngine,
    gate: AccessGate,
    sessions: Mutex<HashMap<UserId, Session>>,
}

impl Assistant {
    pub fn new(engine: RetrievalEngine, gate: AccessGate) -> Self {
        Self {
            engine,
            gate,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &RetrievalEngine {
        &self.engine
    }

    /// Snapshot of a user's session (idle if none is held)
    pub async fn session(&self, identity: UserId) -> Session {
        self.sessions
            .lock()
            .await
            .get(&identity)
            .cloned()
            .unwrap_or_default()
    }

    /// Handle one inbound event and return the replies to send, in order
    pub async fn handle(&self, event: InboundEvent) -> Vec<Reply> {
        let input = classify(event.kind, &event.payload);

        if self.gate.check(event.identity) == Access::Denied {
            return match input {
                Input::Command(Command::Start) => vec![render::private_bot()],
                _ => Vec::new(),
            };
        }

        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(event.identity).or_default();

        let Transition { action, next } = transition(session.mode, &input);
        debug!(
            "User {}: {} -> {} ({:?})",
            event.identity, session.mode, next, action
        );

        let replies = self.execute(session, action, next).await;

        if sessions.get(&event.identity).is_some_and(Session::is_idle) {
            sessions.remove(&event.identity);
        }
        replies
    }

    async fn execute(&self, session: &mut Session, action: Action, next: Mode) -> Vec<Reply> {
        let mut next = next;

        let replies = match action {
            Action::Welcome => {
                session.reset();
                vec![render::welcome()]
            }
            Action::Help => vec![render::help()],
            Action::Cancel => {
                session.reset();
                vec![render::cancelled()]
            }

            // ---- save flow ----
            Action::BeginSave => {
                session.reset();
                session.draft = Some(Draft::Memory(MemoryDraft::default()));
                vec![render::ask_solution()]
            }
            Action::SetSolution(text) => {
                session.update_memory_draft(|draft| draft.solution = Some(text));
                vec![render::ask_title()]
            }
            Action::SetTitle(text) => {
                session.update_memory_draft(|draft| draft.title = Some(text));
                vec![render::ask_tags()]
            }
            Action::SetTags(tags) => {
                let preview = session.update_memory_draft(|draft| {
                    draft.tags = tags;
                    render::draft_preview(draft)
                });
                vec![preview]
            }
            Action::Persist => {
                let pending = session
                    .memory_draft()
                    .cloned()
                    .and_then(MemoryDraft::into_new_memory);

                match pending {
                    None => {
                        session.reset();
                        vec![render::no_draft()]
                    }
                    Some(memory) => match self.engine.save(memory).await {
                        Ok(saved) => {
                            info!("Memory {} saved from conversation", saved.id);
                            session.reset();
                            vec![render::saved(&saved)]
                        }
                        Err(e) => {
                            // Keep the draft so the preview's Save button still works
                            warn!("Failed to save draft: {}", e);
                            next = Mode::SaveConfirm;
                            vec![render::storage_unavailable()]
                        }
                    },
                }
            }
            Action::EditTitle => vec![render::edit_title()],
            Action::EditTags => vec![render::edit_tags()],
            Action::DiscardDraft => {
                session.reset();
                vec![render::save_cancelled()]
            }

            // ---- retrieval ----
            Action::BeginQuery => {
                session.reset();
                vec![render::ask_query()]
            }
            Action::RunQuery(query) => {
                session.reset();
                match self.engine.search(&query, SEARCH_LIMIT).await {
                    Ok(hits) => {
                        let results = render::search_results(&hits);
                        session.last_results = hits;
                        vec![render::searching(), results]
                    }
                    Err(e) => storage_failure(session, e),
                }
            }
            Action::BeginTagSearch => {
                session.reset();
                let stats = match self.engine.stats(TAG_HINT_COUNT).await {
                    Ok(stats) => stats,
                    Err(e) => {
                        warn!("Tag hint unavailable: {}", e);
                        Stats {
                            total: 0,
                            top_tags: Vec::new(),
                        }
                    }
                };
                vec![render::tag_hint(&stats)]
            }
            Action::RunTagSearch(raw) => {
                session.reset();
                let tag = normalize_tag(&raw);
                match self.engine.by_tag(&tag, TAG_RESULTS_LIMIT).await {
                    Ok(memories) => vec![render::tag_results(&tag, &memories)],
                    Err(e) => storage_failure(session, e),
                }
            }
            Action::ListRecent => {
                session.reset();
                match self.engine.recent(RECENT_LIMIT).await {
                    Ok(memories) => vec![render::recent_list(&memories)],
                    Err(e) => storage_failure(session, e),
                }
            }
            Action::ShowStats => {
                session.reset();
                match self.engine.stats(TAG_HINT_COUNT).await {
                    Ok(stats) => vec![render::stats(&stats)],
                    Err(e) => storage_failure(session, e),
                }
            }

            // ---- follow-up buttons ----
            Action::View(id) => match self.resolve(session, &id).await {
                Ok(Some(memory)) => vec![render::memory_view(&memory)],
                Ok(None) => {
                    debug!("View of unknown memory {}", id);
                    vec![render::not_found()]
                }
                Err(e) => {
                    warn!("Failed to load memory {}: {}", id, e);
                    vec![render::storage_unavailable()]
                }
            },
            Action::StageDelete(id) => match self.resolve(session, &id).await {
                Ok(Some(memory)) => {
                    session.draft = Some(Draft::Delete {
                        id: memory.id.clone(),
                    });
                    vec![render::delete_confirmation(&memory)]
                }
                Ok(None) => {
                    debug!("Delete of unknown memory {}", id);
                    next = session.mode;
                    vec![render::not_found()]
                }
                Err(e) => {
                    warn!("Failed to load memory {}: {}", id, e);
                    next = session.mode;
                    vec![render::storage_unavailable()]
                }
            },
            Action::ConfirmDelete(id) => {
                session.draft = None;
                match self.engine.delete(&id).await {
                    Ok(true) => {
                        info!("Memory {} deleted from conversation", id);
                        session.last_results.retain(|hit| hit.memory.id != id);
                        vec![render::deleted()]
                    }
                    Ok(false) => vec![render::delete_failed()],
                    Err(e) => storage_failure(session, e),
                }
            }
            Action::CancelDelete => {
                session.draft = None;
                vec![render::delete_cancelled()]
            }

            Action::Reprompt => vec![render::reprompt(session.mode)],
            Action::Stale => vec![render::nothing_pending()],
            Action::Unrecognized => vec![render::menu_prompt()],
        };

        session.mode = next;
        replies
    }

    /// Look a memory up in the last results first, then in the store
    async fn resolve(&self, session: &Session, id: &str) -> StoreResult<Option<Memory>> {
        if let Some(hit) = session.last_results.iter().find(|hit| hit.memory.id == id) {
            return Ok(Some(hit.memory.clone()));
        }
        self.engine.get(id).await
    }
}

fn storage_failure(session: &mut Session, error: StoreError) -> Vec<Reply> {
    warn!("Storage failure: {}", error);
    session.reset();
    vec![render::storage_unavailable()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::input::{LABEL_CANCEL, LABEL_QUERY, LABEL_SAVE, LABEL_TAG_SEARCH};
    use crate::conversation::reply::Markup;
    use crate::db::MemoryDb;
    use crate::memory::{EmbeddingOutcome, MemoryStore};
    use crate::test_support::{engine_with, new_memory, FlakyIndex, StubEmbedder};
    use std::sync::Arc;

    const ADMIN: UserId = 1001;
    const MISSING_ID: &str = "0b8f7f0e-8f3c-4d43-9a53-5b0d5f1f6c2e";

    fn assistant_over(embedder: StubEmbedder, index: Option<Arc<FlakyIndex>>) -> (Assistant, Arc<MemoryDb>) {
        let (engine, db) = engine_with(Arc::new(embedder), index);
        (Assistant::new(engine, AccessGate::new(ADMIN)), db)
    }

    fn assistant() -> (Assistant, Arc<MemoryDb>) {
        assistant_over(StubEmbedder::always(EmbeddingOutcome::Empty), None)
    }

    async fn say(assistant: &Assistant, text: &str) -> Vec<Reply> {
        assistant.handle(InboundEvent::text(ADMIN, text)).await
    }

    async fn press(assistant: &Assistant, payload: &str) -> Vec<Reply> {
        assistant.handle(InboundEvent::button(ADMIN, payload)).await
    }

    async fn mode(assistant: &Assistant) -> Mode {
        assistant.session(ADMIN).await.mode
    }

    #[tokio::test]
    async fn test_save_flow_persists_draft() {
        let (assistant, db) = assistant();

        say(&assistant, LABEL_SAVE).await;
        assert_eq!(mode(&assistant).await, Mode::SaveWaitText);
        say(&assistant, "use batched lookups").await;
        say(&assistant, "N+1 fix").await;
        let preview = say(&assistant, "mongo, Redis, Cache").await;
        assert_eq!(mode(&assistant).await, Mode::SaveConfirm);
        assert!(preview[0].text.contains("mongo, redis, cache"));

        let replies = press(&assistant, "confirm_save").await;
        assert!(replies[0].text.contains("Saved"));
        assert!(replies[0].edit);

        let stored = db.find_recent(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "N+1 fix");
        assert_eq!(stored[0].solution, "use batched lookups");
        assert_eq!(stored[0].tags, vec!["mongo", "redis", "cache"]);
        assert!(assistant.session(ADMIN).await.is_idle());
    }

    #[tokio::test]
    async fn test_edit_title_returns_to_tags() {
        let (assistant, db) = assistant();
        for text in [LABEL_SAVE, "body", "first title", "-"] {
            say(&assistant, text).await;
        }

        press(&assistant, "edit_title").await;
        assert_eq!(mode(&assistant).await, Mode::SaveWaitTitle);
        say(&assistant, "better title").await;
        assert_eq!(mode(&assistant).await, Mode::SaveWaitTags);
        say(&assistant, "-").await;
        press(&assistant, "confirm_save").await;

        let stored = db.find_recent(1).await.unwrap();
        assert_eq!(stored[0].title, "better title");
        assert!(stored[0].tags.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_from_every_state() {
        let (assistant, db) = assistant();
        let saved = db.insert(new_memory("t", "s", &[], vec![])).await.unwrap();
        let delete = format!("delete:{}", saved.id);

        let paths: Vec<Vec<(bool, &str)>> = vec![
            vec![(false, LABEL_SAVE)],
            vec![(false, LABEL_SAVE), (false, "body")],
            vec![(false, LABEL_SAVE), (false, "body"), (false, "title")],
            vec![(false, LABEL_SAVE), (false, "body"), (false, "title"), (false, "a")],
            vec![(false, LABEL_QUERY)],
            vec![(false, LABEL_TAG_SEARCH)],
            vec![(true, delete.as_str())],
        ];

        for path in paths {
            for (button, payload) in &path {
                if *button {
                    press(&assistant, payload).await;
                } else {
                    say(&assistant, payload).await;
                }
            }
            assert_ne!(mode(&assistant).await, Mode::None);

            let replies = say(&assistant, LABEL_CANCEL).await;
            assert_eq!(replies[0].markup, Markup::MainMenu);
            assert!(assistant.session(ADMIN).await.is_idle());
        }
        assert_eq!(db.count_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancel_drops_last_results() {
        let (assistant, db) = assistant();
        let saved = db
            .insert(new_memory("caching issue", "add redis", &["cache"], vec![]))
            .await
            .unwrap();

        say(&assistant, LABEL_QUERY).await;
        say(&assistant, "caching").await;
        press(&assistant, &format!("delete:{}", saved.id)).await;

        let session = assistant.session(ADMIN).await;
        assert_eq!(session.mode, Mode::DeleteConfirm);
        assert_eq!(session.last_results.len(), 1);

        say(&assistant, LABEL_CANCEL).await;
        let session = assistant.session(ADMIN).await;
        assert!(session.last_results.is_empty());
        assert!(session.draft.is_none());
        assert_eq!(session.mode, Mode::None);
        assert_eq!(db.count_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_view_missing_id_keeps_mode() {
        let (assistant, _db) = assistant();
        say(&assistant, LABEL_SAVE).await;
        say(&assistant, "body").await;

        let replies = press(&assistant, &format!("view_full:{}", MISSING_ID)).await;
        assert!(replies[0].text.contains("not found"));
        assert_eq!(mode(&assistant).await, Mode::SaveWaitTitle);

        let replies = press(&assistant, "view_full:not-a-uuid").await;
        assert!(replies[0].text.contains("not found"));
    }

    #[tokio::test]
    async fn test_delete_missing_id_keeps_mode() {
        let (assistant, _db) = assistant();
        say(&assistant, LABEL_QUERY).await;

        press(&assistant, &format!("delete:{}", MISSING_ID)).await;
        assert_eq!(mode(&assistant).await, Mode::QueryWaitText);
    }

    #[tokio::test]
    async fn test_delete_flow_from_search_results() {
        let (assistant, db) = assistant();
        let saved = db
            .insert(new_memory("caching issue", "add redis", &["cache"], vec![]))
            .await
            .unwrap();

        say(&assistant, LABEL_QUERY).await;
        let replies = say(&assistant, "caching").await;
        assert_eq!(replies.len(), 2);
        assert_eq!(assistant.session(ADMIN).await.last_results.len(), 1);

        let replies = press(&assistant, &format!("delete:{}", saved.id)).await;
        assert!(replies[0].text.contains("Delete this memory?"));
        let session = assistant.session(ADMIN).await;
        assert_eq!(session.mode, Mode::DeleteConfirm);
        assert_eq!(session.staged_delete(), Some(saved.id.as_str()));

        let replies = press(&assistant, &format!("confirm_delete:{}", saved.id)).await;
        assert!(replies[0].text.contains("deleted"));
        assert_eq!(db.count_all().await.unwrap(), 0);
        assert!(assistant.session(ADMIN).await.is_idle());
    }

    #[tokio::test]
    async fn test_confirm_delete_of_vanished_memory() {
        let (assistant, db) = assistant();
        let saved = db.insert(new_memory("t", "s", &[], vec![])).await.unwrap();
        db.insert(new_memory("keep", "s", &[], vec![])).await.unwrap();

        press(&assistant, &format!("delete:{}", saved.id)).await;
        db.delete_by_id(&saved.id).await.unwrap();

        let replies = press(&assistant, &format!("confirm_delete:{}", saved.id)).await;
        assert!(replies[0].text.contains("Could not delete"));
        assert_eq!(mode(&assistant).await, Mode::None);
        assert_eq!(db.count_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancel_delete() {
        let (assistant, db) = assistant();
        let saved = db.insert(new_memory("t", "s", &[], vec![])).await.unwrap();

        press(&assistant, &format!("delete:{}", saved.id)).await;
        let replies = press(&assistant, "cancel_delete").await;
        assert!(replies[0].text.contains("Delete cancelled"));
        assert_eq!(db.count_all().await.unwrap(), 1);
        assert_eq!(mode(&assistant).await, Mode::None);
    }

    #[tokio::test]
    async fn test_unauthorized_users_are_ignored() {
        let (assistant, db) = assistant();

        let replies = assistant.handle(InboundEvent::text(7, "/start")).await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].text.contains("private"));

        assert!(assistant.handle(InboundEvent::text(7, LABEL_SAVE)).await.is_empty());
        assert!(assistant
            .handle(InboundEvent::button(7, "confirm_save"))
            .await
            .is_empty());
        assert!(assistant.session(7).await.is_idle());
        assert_eq!(db.count_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_falls_back_when_index_is_down() {
        let index = Arc::new(FlakyIndex::default());
        let (assistant, db) = assistant_over(
            StubEmbedder::always(EmbeddingOutcome::Vector(vec![1.0, 0.0])),
            Some(index.clone()),
        );
        for i in 0..7 {
            db.insert(new_memory(&format!("caching issue {}", i), "x", &[], vec![1.0, 0.0]))
                .await
                .unwrap();
        }
        index.set_down(true);

        say(&assistant, LABEL_QUERY).await;
        let replies = say(&assistant, "caching issue").await;
        assert!(replies[0].text.contains("Searching"));
        assert!(!replies[1].text.contains("% match"));

        let results = assistant.session(ADMIN).await.last_results;
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].memory.title, "caching issue 6");
        assert!(results.iter().all(|hit| hit.score.is_none()));
    }

    #[tokio::test]
    async fn test_tag_search_normalizes_input() {
        let (assistant, db) = assistant();
        db.insert(new_memory("a", "x", &["redis"], vec![])).await.unwrap();
        db.insert(new_memory("b", "x", &["mongo"], vec![])).await.unwrap();

        let hint = say(&assistant, LABEL_TAG_SEARCH).await;
        assert!(hint[0].text.contains("<code>redis</code>"));

        let replies = say(&assistant, " #Redis ").await;
        assert!(replies[0].text.contains("1. a"));
        assert!(!replies[0].text.contains("2. "));
        assert_eq!(mode(&assistant).await, Mode::None);
    }

    #[tokio::test]
    async fn test_stale_and_blank_input() {
        let (assistant, db) = assistant();

        let replies = press(&assistant, "confirm_save").await;
        assert!(replies[0].text.contains("no longer pending"));
        assert_eq!(db.count_all().await.unwrap(), 0);

        say(&assistant, LABEL_SAVE).await;
        say(&assistant, "   ").await;
        assert_eq!(mode(&assistant).await, Mode::SaveWaitText);

        let replies = say(&assistant, "/frobnicate").await;
        assert!(replies[0].text.contains("pick an option"));
        assert_eq!(mode(&assistant).await, Mode::SaveWaitText);
    }
}
