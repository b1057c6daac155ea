use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, FramingError};
use crate::event::current_line;
use crate::frontend::{Frontend, PickRequest, pick_bounded};

pub const BACK_COMMAND: &str = "back";
pub const NO_CHECKPOINTS: &str = "No checkpoints";

const ORDINAL_PREFIX: &str = "Checkpoint ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Token the interpreter expects back to resume from this checkpoint.
    pub ordinal: String,
    pub display: String,
    /// Zero-based source line.
    pub line: Option<usize>,
}

impl Checkpoint {
    fn parse(descriptor: &str, location: &str) -> Option<Self> {
        let display = format!("{} {}", descriptor.trim(), location.trim());
        let ordinal = display
            .strip_prefix(ORDINAL_PREFIX)?
            .split_once(':')?
            .0
            .trim()
            .to_string();

        if ordinal.is_empty() {
            return None;
        }

        Some(Self {
            line: current_line(&display),
            ordinal,
            display,
        })
    }
}

/// Answer to one `back` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointList {
    pub title: String,
    pub checkpoints: Vec<Checkpoint>,
}

impl CheckpointList {
    /// `Ok(None)` when the interpreter has nothing to go back to. A listing
    /// whose entries are all unreadable is an error, not an empty history.
    pub fn parse(lines: &[String]) -> Result<Option<Self>, FramingError> {
        let Some((title, rest)) = lines.split_first() else {
            return Ok(None);
        };
        if title.contains(NO_CHECKPOINTS) || rest.is_empty() {
            return Ok(None);
        }

        let checkpoints: Vec<Checkpoint> = rest
            .chunks_exact(2)
            .filter_map(|pair| {
                let checkpoint = Checkpoint::parse(&pair[0], &pair[1]);
                if checkpoint.is_none() {
                    warn!(descriptor = %pair[0], "Skipping unreadable checkpoint");
                }
                checkpoint
            })
            .collect();

        if checkpoints.is_empty() {
            warn!(title = %title, lines = rest.len(), "Checkpoint listing has no readable entries");
            return Err(FramingError::Unreadable {
                block: BACK_COMMAND.to_string(),
            });
        }

        Ok(Some(Self {
            title: title.trim().to_string(),
            checkpoints,
        }))
    }

    pub fn lines(&self) -> Vec<usize> {
        self.checkpoints.iter().filter_map(|c| c.line).collect()
    }

    /// The most recently visited checkpoint is the last one listed.
    pub fn emphasized(&self) -> Option<usize> {
        self.checkpoints.iter().rev().find_map(|c| c.line)
    }

    pub fn request(&self) -> PickRequest {
        PickRequest {
            title: self.title.clone(),
            options: self.checkpoints.iter().map(|c| c.display.clone()).collect(),
            focus: Some(self.checkpoints.len() - 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    NoCheckpoints,
    Resumed(Checkpoint),
}

/// Runs one reverse step: list, choose, resume.
pub struct CheckpointNavigator<'a> {
    dispatcher: &'a Dispatcher,
    frontend: &'a dyn Frontend,
    max_attempts: usize,
}

impl<'a> CheckpointNavigator<'a> {
    pub fn new(dispatcher: &'a Dispatcher, frontend: &'a dyn Frontend, max_attempts: usize) -> Self {
        Self {
            dispatcher,
            frontend,
            max_attempts,
        }
    }

    /// Callers hold the session's dispatch lock so nothing runs between `back` and the resume.
    pub async fn step_back(&self) -> Result<Navigation, DispatchError> {
        let block = self.dispatcher.issue(BACK_COMMAND).await?;

        let Some(list) = CheckpointList::parse(&block.lines)? else {
            info!("No checkpoints to go back to");
            self.frontend.notify(NO_CHECKPOINTS);
            return Ok(Navigation::NoCheckpoints);
        };

        if let Some(focus) = list.emphasized() {
            self.frontend.highlight(&list.lines(), focus);
        }

        let picked = pick_bounded(self.frontend, &list.request(), self.max_attempts).await;
        self.frontend.clear_highlights();

        let Some(index) = picked else {
            warn!("Checkpoint selection abandoned");
            self.dispatcher.terminate();
            return Err(DispatchError::PromptAbandoned);
        };

        let checkpoint = list.checkpoints[index].clone();
        debug!(ordinal = %checkpoint.ordinal, "Resuming from checkpoint");
        self.dispatcher.write_raw(&checkpoint.ordinal).await?;

        Ok(Navigation::Resumed(checkpoint))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dispatcher::testing::{connect, drain};
    use crate::event::DebugEvent;
    use crate::frontend::Pick;
    use crate::frontend::testing::ScriptedFrontend;

    fn owned(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    const LISTING: [&str; 5] = [
        "Choose a checkpoint:",
        "Checkpoint 0: x = 1",
        "  Current line -> 2.",
        "Checkpoint 1: x = 2",
        "  Current line -> 5.",
    ];

    #[test]
    fn test_parse_listing() {
        let list = CheckpointList::parse(&owned(&LISTING)).unwrap().unwrap();

        assert_eq!(list.title, "Choose a checkpoint:");
        assert_eq!(
            list.checkpoints[1],
            Checkpoint {
                ordinal: "1".to_string(),
                display: "Checkpoint 1: x = 2 Current line -> 5.".to_string(),
                line: Some(4),
            }
        );
        assert_eq!(list.lines(), vec![1, 4]);
        assert_eq!(list.emphasized(), Some(4));
        assert_eq!(list.request().focus, Some(1));
    }

    #[test]
    fn test_parse_ignores_odd_trailer_and_bad_pairs() {
        let list = CheckpointList::parse(&owned(&[
            "Checkpoints:",
            "garbage",
            "more garbage",
            "Checkpoint 3: y",
            "Current line -> 9.",
            "dangling",
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(list.checkpoints.len(), 1);
        assert_eq!(list.checkpoints[0].ordinal, "3");
    }

    #[test]
    fn test_parse_no_checkpoints() {
        assert_eq!(CheckpointList::parse(&owned(&["No checkpoints yet."])), Ok(None));
        assert_eq!(CheckpointList::parse(&[]), Ok(None));
        assert_eq!(CheckpointList::parse(&owned(&["Title only"])), Ok(None));
    }

    #[test]
    fn test_parse_unreadable_listing_is_an_error() {
        assert_eq!(
            CheckpointList::parse(&owned(&["Choose a checkpoint:", "garbage", "more garbage"])),
            Err(FramingError::Unreadable {
                block: BACK_COMMAND.to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_step_back_unreadable_listing_is_not_empty_history() {
        let frontend = Arc::new(ScriptedFrontend::new([]));
        let (dispatcher, _handle, _events, mut backend) = connect(frontend.clone());

        let navigation = {
            let dispatcher = dispatcher.clone();
            let frontend = frontend.clone();
            tokio::spawn(async move {
                CheckpointNavigator::new(&dispatcher, frontend.as_ref(), 5)
                    .step_back()
                    .await
            })
        };
        backend.read_line().await;
        backend
            .respond("back", &["Choose a checkpoint:", "???", "???"])
            .await;

        assert!(matches!(
            navigation.await.unwrap(),
            Err(DispatchError::Framing(FramingError::Unreadable { .. }))
        ));
        assert!(frontend.notes().is_empty());
        assert!(frontend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_step_back_resumes_selected_checkpoint() {
        let frontend = Arc::new(ScriptedFrontend::new([Pick::Dismissed, Pick::Selected(0)]));
        let (dispatcher, _handle, mut events, mut backend) = connect(frontend.clone());

        let navigation = {
            let dispatcher = dispatcher.clone();
            let frontend = frontend.clone();
            tokio::spawn(async move {
                CheckpointNavigator::new(&dispatcher, frontend.as_ref(), 5)
                    .step_back()
                    .await
            })
        };

        assert_eq!(backend.read_line().await, "back");
        backend.respond("back", &LISTING).await;
        assert_eq!(backend.read_line().await, "0");

        let navigation = navigation.await.unwrap().unwrap();
        assert!(matches!(navigation, Navigation::Resumed(ref c) if c.ordinal == "0"));
        assert_eq!(
            *frontend.highlights.lock().unwrap(),
            vec![(vec![1, 4], 4)]
        );
        assert_eq!(frontend.cleared(), 1);
        assert_eq!(frontend.requests().len(), 2);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_step_back_without_checkpoints_writes_nothing_more() {
        let frontend = Arc::new(ScriptedFrontend::new([]));
        let (dispatcher, _handle, _events, mut backend) = connect(frontend.clone());

        let navigation = {
            let dispatcher = dispatcher.clone();
            let frontend = frontend.clone();
            tokio::spawn(async move {
                CheckpointNavigator::new(&dispatcher, frontend.as_ref(), 5)
                    .step_back()
                    .await
            })
        };
        backend.read_line().await;
        backend.respond("back", &["No checkpoints"]).await;

        assert_eq!(navigation.await.unwrap(), Ok(Navigation::NoCheckpoints));
        assert_eq!(frontend.notes(), vec![NO_CHECKPOINTS.to_string()]);
        assert!(frontend.requests().is_empty());
        backend.expect_silence().await;
    }

    #[tokio::test]
    async fn test_step_back_cancelled_terminates() {
        let frontend = Arc::new(ScriptedFrontend::new([Pick::Cancelled]));
        let (dispatcher, handle, mut events, mut backend) = connect(frontend.clone());

        let navigation = {
            let dispatcher = dispatcher.clone();
            let frontend = frontend.clone();
            tokio::spawn(async move {
                CheckpointNavigator::new(&dispatcher, frontend.as_ref(), 5)
                    .step_back()
                    .await
            })
        };
        backend.read_line().await;
        backend.respond("back", &LISTING).await;

        assert_eq!(
            navigation.await.unwrap(),
            Err(DispatchError::PromptAbandoned)
        );
        handle.await.unwrap();
        assert_eq!(drain(&mut events), vec![DebugEvent::Terminated]);
    }
}
