//! `local` backend — in-process memory service for development and tests.
//!
//! Every appended turn-set is kept verbatim for history replay, and its user
//! text is also indexed as a record under each strategy's namespace for the
//! actor. Retrieval ranks records by shared lowercase terms with the query.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::subsystems::memory::service::{MemoryError, MemoryFuture, MemoryService};
use crate::subsystems::memory::types::{
    render_namespace, MemoryRecord, Strategy, Turn, TurnGroup, TurnRole,
};

struct Indexed {
    namespace: String,
    record: MemoryRecord,
}

#[derive(Default)]
struct State {
    records: Vec<Indexed>,
    /// (actor, session) -> turn-groups in append order
    events: HashMap<(String, String), Vec<TurnGroup>>,
}

pub struct LocalMemoryService {
    memory_id: String,
    strategies: Vec<Strategy>,
    state: Mutex<State>,
}

impl LocalMemoryService {
    pub fn new(memory_id: &str, strategies: Vec<Strategy>) -> Self {
        Self {
            memory_id: memory_id.to_string(),
            strategies,
            state: Mutex::new(State::default()),
        }
    }

    /// Insert a record directly into a resolved namespace.
    pub fn seed(&self, namespace: &str, strategy_type: &str, text: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.records.push(Indexed {
                namespace: namespace.to_string(),
                record: MemoryRecord {
                    strategy_type: strategy_type.to_string(),
                    text: text.to_string(),
                    score: None,
                },
            });
        }
    }

    fn check_memory(&self, memory_id: &str) -> Result<(), MemoryError> {
        if memory_id == self.memory_id {
            Ok(())
        } else {
            Err(MemoryError::ResourceNotFound(memory_id.to_string()))
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, MemoryError> {
        self.state
            .lock()
            .map_err(|_| MemoryError::Service("local memory lock poisoned".into()))
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl MemoryService for LocalMemoryService {
    fn strategies<'a>(&'a self, memory_id: &'a str) -> MemoryFuture<'a, Vec<Strategy>> {
        Box::pin(async move {
            self.check_memory(memory_id)?;
            Ok(self.strategies.clone())
        })
    }

    fn retrieve<'a>(
        &'a self,
        memory_id: &'a str,
        namespace: &'a str,
        query: &'a str,
        top_k: usize,
    ) -> MemoryFuture<'a, Vec<MemoryRecord>> {
        Box::pin(async move {
            self.check_memory(memory_id)?;
            let wanted = terms(query);
            let state = self.lock()?;
            let mut scored: Vec<(usize, &MemoryRecord)> = state
                .records
                .iter()
                .filter(|r| r.namespace == namespace)
                .map(|r| (terms(&r.record.text).intersection(&wanted).count(), &r.record))
                .filter(|(score, _)| *score > 0)
                .collect();
            // Stable sort keeps insertion order among ties.
            scored.sort_by(|a, b| b.0.cmp(&a.0));
            Ok(scored
                .into_iter()
                .take(top_k)
                .map(|(score, r)| MemoryRecord { score: Some(score as f32), ..r.clone() })
                .collect())
        })
    }

    fn create_event<'a>(
        &'a self,
        memory_id: &'a str,
        actor_id: &'a str,
        session_id: &'a str,
        turns: &'a [Turn],
    ) -> MemoryFuture<'a, ()> {
        Box::pin(async move {
            self.check_memory(memory_id)?;
            let mut state = self.lock()?;
            for turn in turns.iter().filter(|t| t.role == TurnRole::User) {
                for strategy in &self.strategies {
                    let namespace = render_namespace(&strategy.namespace, actor_id, Some(session_id));
                    state.records.push(Indexed {
                        namespace,
                        record: MemoryRecord {
                            strategy_type: strategy.strategy_type.clone(),
                            text: turn.text.clone(),
                            score: None,
                        },
                    });
                }
            }
            state
                .events
                .entry((actor_id.to_string(), session_id.to_string()))
                .or_default()
                .push(turns.to_vec());
            Ok(())
        })
    }

    fn last_turns<'a>(
        &'a self,
        memory_id: &'a str,
        actor_id: &'a str,
        session_id: &'a str,
        k: usize,
    ) -> MemoryFuture<'a, Vec<TurnGroup>> {
        Box::pin(async move {
            self.check_memory(memory_id)?;
            let state = self.lock()?;
            let groups = state
                .events
                .get(&(actor_id.to_string(), session_id.to_string()))
                .map(|g| {
                    let skip = g.len().saturating_sub(k);
                    g[skip..].to_vec()
                })
                .unwrap_or_default();
            Ok(groups)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> LocalMemoryService {
        LocalMemoryService::new(
            "mem-1",
            vec![Strategy { strategy_type: "SemanticMemory".into(), namespace: "/sem/{actorId}".into() }],
        )
    }

    #[tokio::test]
    async fn ranks_by_term_overlap() {
        let svc = service();
        svc.seed("/sem/u1", "SemanticMemory", "disk usage on db-1 is high");
        svc.seed("/sem/u1", "SemanticMemory", "cpu usage on web-2 is high and cpu throttled");
        svc.seed("/sem/u1", "SemanticMemory", "nothing relevant");
        let hits = svc.retrieve("mem-1", "/sem/u1", "cpu usage", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].text.contains("web-2"));
    }

    #[tokio::test]
    async fn appended_user_text_becomes_retrievable() {
        let svc = service();
        svc.create_event("mem-1", "u1", "s1", &[Turn::user("watch the billing alarms"), Turn::assistant("ok")])
            .await
            .unwrap();
        let hits = svc.retrieve("mem-1", "/sem/u1", "billing", 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].strategy_type, "SemanticMemory");
        assert!(svc.retrieve("mem-1", "/sem/u2", "billing", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_appends_are_kept() {
        let svc = service();
        let turns = [Turn::user("q"), Turn::assistant("a")];
        svc.create_event("mem-1", "u1", "s1", &turns).await.unwrap();
        svc.create_event("mem-1", "u1", "s1", &turns).await.unwrap();
        assert_eq!(svc.last_turns("mem-1", "u1", "s1", 5).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn wrong_memory_id_is_resource_not_found() {
        let svc = service();
        assert!(matches!(
            svc.strategies("other").await,
            Err(MemoryError::ResourceNotFound(_))
        ));
    }
}
