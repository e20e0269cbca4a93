//! Structured execution events and the observers that consume them.
//!
//! The executor reports every lane and task transition through a
//! [`LaneObserver`]. The default [`TracingObserver`] turns them into
//! `tracing` events; tests and reporters can plug in their own.

use std::sync::Arc;

use parking_lot::Mutex;

use super::record::Outcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaneEvent {
    LaneEnter {
        lane: String,
        /// Rendered subtree, indented by nesting depth.
        tree: String,
    },
    TaskEnter {
        task: String,
    },
    TaskExit {
        task: String,
        duration_ms: u64,
        outcome: Outcome,
    },
    LaneExit {
        lane: String,
        duration_ms: u64,
        outcome: Outcome,
    },
}

pub trait LaneObserver: Send + Sync {
    fn on_event(&self, event: &LaneEvent);
}

/// Emits events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LaneObserver for TracingObserver {
    fn on_event(&self, event: &LaneEvent) {
        match event {
            LaneEvent::LaneEnter { lane, tree } => {
                tracing::info!(lane = %lane, "Entering lane\n{}", tree.trim_end());
            }
            LaneEvent::TaskEnter { task } => {
                tracing::info!(task = %task, "Executing task");
            }
            LaneEvent::TaskExit {
                task,
                duration_ms,
                outcome: Outcome::Succeeded,
            } => {
                tracing::info!(task = %task, duration_ms = *duration_ms, "Finished task");
            }
            LaneEvent::TaskExit {
                task,
                duration_ms,
                outcome: Outcome::Failed { error },
            } => {
                tracing::error!(
                    task = %task,
                    duration_ms = *duration_ms,
                    error = %error,
                    "Task failed"
                );
            }
            LaneEvent::LaneExit {
                lane,
                duration_ms,
                outcome,
            } => match outcome {
                Outcome::Succeeded => {
                    tracing::info!(lane = %lane, duration_ms = *duration_ms, "Finished lane");
                }
                Outcome::Failed { error } => {
                    tracing::warn!(
                        lane = %lane,
                        duration_ms = *duration_ms,
                        error = %error,
                        "Lane failed"
                    );
                }
            },
        }
    }
}

/// Delivers every event to each inner observer, in order.
#[derive(Clone, Default)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn LaneObserver>>,
}

impl FanoutObserver {
    pub fn new(observers: Vec<Arc<dyn LaneObserver>>) -> Self {
        Self { observers }
    }

    pub fn push(&mut self, observer: Arc<dyn LaneObserver>) {
        self.observers.push(observer);
    }
}

impl LaneObserver for FanoutObserver {
    fn on_event(&self, event: &LaneEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<LaneEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LaneEvent> {
        self.events.lock().clone()
    }

    /// Tasks in the order they were entered.
    pub fn entered_tasks(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                LaneEvent::TaskEnter { task } => Some(task.clone()),
                _ => None,
            })
            .collect()
    }
}

impl LaneObserver for RecordingObserver {
    fn on_event(&self, event: &LaneEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fanout_delivers_to_all() {
        let first = Arc::new(RecordingObserver::new());
        let second = Arc::new(RecordingObserver::new());
        let mut fanout = FanoutObserver::new(vec![first.clone()]);
        fanout.push(second.clone());
        fanout.push(Arc::new(TracingObserver));

        fanout.on_event(&LaneEvent::TaskEnter {
            task: "Extract.run".into(),
        });

        assert_eq!(first.entered_tasks(), vec!["Extract.run"]);
        assert_eq!(second.events().len(), 1);
    }
}
