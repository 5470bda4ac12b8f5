//! Typed progress events.
//!
//! The pipeline emits events into an unbounded channel; consumers
//! (terminal renderer, JSONL writer) subscribe on the receiving side. A
//! closed receiver silently drops further events — progress reporting is
//! never allowed to fail an analysis. `*Update` events are advisory;
//! terminal events (`SkillComplete`/`SkillSkipped`/`SkillError`) are the
//! contract consumers may rely on.

use tokio::sync::mpsc;

/// Everything the pipeline reports while running.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    SkillStart {
        skill: String,
    },
    SkillUpdate {
        skill: String,
        message: String,
    },
    FileUpdate {
        skill: String,
        filename: String,
        completed_hunks: usize,
        total_hunks: usize,
    },
    HunkStart {
        skill: String,
        filename: String,
        hunk_index: usize,
        total_hunks: usize,
    },
    HunkComplete {
        skill: String,
        filename: String,
        hunk_index: usize,
        findings: usize,
    },
    LargePrompt {
        skill: String,
        filename: String,
        estimated_tokens: usize,
    },
    Retry {
        skill: String,
        filename: String,
        attempt: usize,
        delay_ms: u64,
        error: String,
    },
    SkillComplete {
        skill: String,
        findings: usize,
        duration_ms: u64,
    },
    SkillSkipped {
        skill: String,
        reason: String,
    },
    SkillError {
        skill: String,
        error: String,
    },
}

impl ProgressEvent {
    /// Terminal events end a skill's lifecycle; everything else is
    /// advisory and may be dropped by slow consumers.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::SkillComplete { .. }
                | ProgressEvent::SkillSkipped { .. }
                | ProgressEvent::SkillError { .. }
        )
    }
}

/// Cheap-to-clone sender half; `disabled()` swallows everything.
#[derive(Clone)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    /// A sink that drops every event (headless runs, most tests).
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// A connected sink plus its receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(ProgressEvent::SkillComplete {
            skill: "s".into(),
            findings: 0,
            duration_ms: 1
        }
        .is_terminal());
        assert!(!ProgressEvent::SkillUpdate {
            skill: "s".into(),
            message: "m".into()
        }
        .is_terminal());
    }

    #[tokio::test]
    async fn disabled_sink_swallows_and_channel_delivers() {
        ProgressSink::disabled().emit(ProgressEvent::SkillStart { skill: "a".into() });

        let (sink, mut rx) = ProgressSink::channel();
        sink.emit(ProgressEvent::SkillStart { skill: "b".into() });
        match rx.recv().await.unwrap() {
            ProgressEvent::SkillStart { skill } => assert_eq!(skill, "b"),
            other => panic!("unexpected event {other:?}"),
        }

        drop(rx);
        // Closed receiver: emit must not panic.
        sink.emit(ProgressEvent::SkillStart { skill: "c".into() });
    }
}
