//! Debounced, session-scoped place autocomplete at the collaborator
//! boundary.
//!
//! The session token groups the keystrokes of one logical search for the
//! provider's billing semantics: reused while the user keeps typing, rotated
//! when the field is cleared or a prediction is selected. Debounce is a
//! timer plus a generation counter, independent of any UI framework: a newer
//! keystroke bumps the generation and the stale lookup drops itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;
use uuid::Uuid;

use crate::geo::Coordinate;
use crate::providers::{PlaceSearchProvider, Prediction, ProviderResult};

pub struct SearchSession {
    provider: Arc<dyn PlaceSearchProvider>,
    debounce: Duration,
    token: Mutex<String>,
    generation: AtomicU64,
}

impl SearchSession {
    pub fn new(provider: Arc<dyn PlaceSearchProvider>, debounce: Duration) -> Self {
        Self {
            provider,
            debounce,
            token: Mutex::new(fresh_token()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn token(&self) -> String {
        self.token.lock().unwrap().clone()
    }

    /// The search field was cleared: the next lookup starts a new logical
    /// search under a fresh token.
    pub fn clear(&self) {
        self.rotate();
    }

    /// A prediction was selected, closing the session.
    pub fn select(&self) {
        self.rotate();
    }

    /// Returns `None` when a newer keystroke superseded this lookup during
    /// the debounce window.
    pub async fn lookup(
        &self,
        query: &str,
        location_bias: Option<Coordinate>,
    ) -> ProviderResult<Option<Vec<Prediction>>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        sleep(self.debounce).await;
        if self.generation.load(Ordering::SeqCst) != generation {
            return Ok(None);
        }

        let token = self.token();
        let predictions = self.provider.search(query, &token, location_bias).await?;
        Ok(Some(predictions))
    }

    fn rotate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.token.lock().unwrap() = fresh_token();
    }
}

fn fresh_token() -> String {
    format!("st-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct RecordingSearch {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl PlaceSearchProvider for RecordingSearch {
        async fn search(
            &self,
            query: &str,
            session_token: &str,
            _location_bias: Option<Coordinate>,
        ) -> ProviderResult<Vec<Prediction>> {
            self.calls
                .lock()
                .unwrap()
                .push((query.to_string(), session_token.to_string()));
            Ok(vec![Prediction {
                place_ref: format!("ref-{query}"),
                description: query.to_string(),
                coordinates: None,
            }])
        }
    }

    fn session(provider: Arc<RecordingSearch>) -> SearchSession {
        SearchSession::new(provider, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn token_reused_across_keystrokes_within_one_search() {
        let provider = Arc::new(RecordingSearch::default());
        let session = session(provider.clone());

        session.lookup("dr", None).await.unwrap();
        session.lookup("dragon bridge", None).await.unwrap();

        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, calls[1].1);
    }

    #[tokio::test]
    async fn token_rotates_on_select_and_clear() {
        let provider = Arc::new(RecordingSearch::default());
        let session = session(provider);

        let before = session.token();
        session.select();
        let after_select = session.token();
        session.clear();
        let after_clear = session.token();

        assert_ne!(before, after_select);
        assert_ne!(after_select, after_clear);
        assert!(after_clear.starts_with("st-"));
    }

    #[tokio::test]
    async fn newer_keystroke_supersedes_pending_lookup() {
        let provider = Arc::new(RecordingSearch::default());
        let session = Arc::new(SearchSession::new(provider.clone(), Duration::from_millis(50)));

        let slow = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.lookup("dr", None).await })
        };
        // Let the first lookup enter its debounce window, then supersede it.
        sleep(Duration::from_millis(5)).await;
        let fast = session.lookup("dragon", None).await.unwrap();

        assert!(slow.await.unwrap().unwrap().is_none());
        let fast = fast.expect("latest lookup should run");
        assert_eq!(fast[0].place_ref, "ref-dragon");
        assert_eq!(provider.calls.lock().unwrap().len(), 1);
    }
}
