//! Background refresher: two independent chains that walk a stale-project
//! list one project at a time, capping remote concurrency at 2 by
//! construction.
//!
//! Each chain is a plain `tokio::spawn`ed task rather than a shared
//! executor pool, so the concurrency bound is explicit (2 chains) instead
//! of implied by a connection-pool limit.

use crate::events::Event;
use crate::repository::Coordinator;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

pub struct BackgroundRefresher {
    coordinator: Arc<Coordinator>,
    events: UnboundedSender<Event>,
}

impl BackgroundRefresher {
    pub fn new(coordinator: Arc<Coordinator>, events: UnboundedSender<Event>) -> Self {
        Self { coordinator, events }
    }

    /// Split `project_ids` into two round-robin chains and spawn one task
    /// per chain; each chain refreshes its projects sequentially, one at a
    /// time, via `Coordinator::load_tasks`/`load_sections`.
    pub fn start(&self, project_ids: Vec<String>) {
        let mut even = Vec::new();
        let mut odd = Vec::new();
        for (i, id) in project_ids.into_iter().enumerate() {
            if i % 2 == 0 {
                even.push(id);
            } else {
                odd.push(id);
            }
        }

        if !even.is_empty() {
            self.spawn_chain(0, even);
        }
        if !odd.is_empty() {
            self.spawn_chain(1, odd);
        }
    }

    fn spawn_chain(&self, chain: usize, queue: Vec<String>) {
        let coordinator = self.coordinator.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            Self::run_chain(chain, queue, coordinator, events).await;
        });
    }

    /// Sequentially refresh one project's tasks and sections at a time,
    /// emitting `BackgroundRefreshDone{chain, remaining}` after each step so
    /// a driver can observe progress.
    async fn run_chain(
        chain: usize,
        mut queue: Vec<String>,
        coordinator: Arc<Coordinator>,
        events: UnboundedSender<Event>,
    ) {
        while !queue.is_empty() {
            let project_id = queue.remove(0);

            if let Err(e) = coordinator.load_tasks(&project_id, true).await {
                log::error!("background refresh: tasks for {project_id} failed: {e}");
            }
            if let Err(e) = coordinator.load_sections(&project_id, true).await {
                log::error!("background refresh: sections for {project_id} failed: {e}");
            }

            let _ = events.send(Event::BackgroundRefreshDone {
                chain,
                remaining: queue.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_project_ids_into_two_chains_round_robin() {
        let mut even = Vec::new();
        let mut odd = Vec::new();
        let ids: Vec<String> = (0..5).map(|i| i.to_string()).collect();
        for (i, id) in ids.into_iter().enumerate() {
            if i % 2 == 0 {
                even.push(id);
            } else {
                odd.push(id);
            }
        }
        assert_eq!(even, vec!["0", "2", "4"]);
        assert_eq!(odd, vec!["1", "3"]);
    }
}
