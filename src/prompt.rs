/*!
 * User prompts suspending background work
 *
 * A background step that needs a user decision blocks on a [`UserPrompt`].
 * The owner context answers; an unanswered prompt counts as cancelled.
 */

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::NavError;

/// Outcome of a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Granted,
    Denied,
    Cancelled,
}

impl Decision {
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }
}

/// Decisions a background step can ask the user for
pub trait UserPrompt: Send + Sync {
    /// Ask whether to relaunch the failed step with elevated privileges
    fn request_relaunch(&self, cause: &NavError) -> Decision;

    /// Ask whether the listed destination paths may be overwritten
    fn confirm_overwrite(&self, paths: &[String]) -> Decision;
}

/// Answers every prompt with a fixed decision
#[derive(Debug, Clone, Copy)]
pub struct AutoPrompt {
    relaunch: Decision,
    overwrite: Decision,
}

impl AutoPrompt {
    pub fn new(relaunch: Decision, overwrite: Decision) -> Self {
        Self {
            relaunch,
            overwrite,
        }
    }

    /// Grants everything
    pub fn yes() -> Self {
        Self::new(Decision::Granted, Decision::Granted)
    }

    /// Denies everything
    pub fn no() -> Self {
        Self::new(Decision::Denied, Decision::Denied)
    }
}

impl Default for AutoPrompt {
    fn default() -> Self {
        Self::no()
    }
}

impl UserPrompt for AutoPrompt {
    fn request_relaunch(&self, cause: &NavError) -> Decision {
        debug!("Auto-answering relaunch request ({}): {:?}", cause, self.relaunch);
        self.relaunch
    }

    fn confirm_overwrite(&self, paths: &[String]) -> Decision {
        debug!("Auto-answering overwrite of {} paths: {:?}", paths.len(), self.overwrite);
        self.overwrite
    }
}

/// What a prompt asks about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptKind {
    /// Relaunch with privileges; carries the failure message
    Relaunch(String),
    /// Overwrite of the listed paths
    Overwrite(Vec<String>),
}

/// A pending prompt delivered to the owner context
#[derive(Debug)]
pub struct PromptRequest {
    pub kind: PromptKind,
    reply: Sender<Decision>,
}

impl PromptRequest {
    /// Answer the prompt; a worker that gave up waiting is ignored
    pub fn answer(self, decision: Decision) {
        let _ = self.reply.send(decision);
    }
}

/// Forwards prompts to the owner context over a channel
///
/// The worker waits at most `timeout` for an answer.
#[derive(Debug)]
pub struct ChannelPrompt {
    sender: Mutex<Sender<PromptRequest>>,
    timeout: Duration,
}

impl ChannelPrompt {
    /// Create the prompt and the receiver the owner context reads requests from
    pub fn new(timeout: Duration) -> (Self, Receiver<PromptRequest>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                sender: Mutex::new(sender),
                timeout,
            },
            receiver,
        )
    }

    fn ask(&self, kind: PromptKind) -> Decision {
        let (reply, answer) = mpsc::channel();
        let sent = match self.sender.lock() {
            Ok(sender) => sender.send(PromptRequest { kind, reply }).is_ok(),
            Err(_) => false,
        };
        if !sent {
            warn!("Prompt receiver is gone, treating prompt as cancelled");
            return Decision::Cancelled;
        }
        answer.recv_timeout(self.timeout).unwrap_or_else(|_| {
            warn!("Prompt unanswered after {:?}", self.timeout);
            Decision::Cancelled
        })
    }
}

impl UserPrompt for ChannelPrompt {
    fn request_relaunch(&self, cause: &NavError) -> Decision {
        self.ask(PromptKind::Relaunch(cause.to_string()))
    }

    fn confirm_overwrite(&self, paths: &[String]) -> Decision {
        self.ask(PromptKind::Overwrite(paths.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_channel_prompt_round_trip() {
        let (prompt, requests) = ChannelPrompt::new(Duration::from_secs(5));
        let owner = thread::spawn(move || {
            let request = requests.recv().unwrap();
            assert_eq!(request.kind, PromptKind::Overwrite(vec!["/sdcard/a.txt".into()]));
            request.answer(Decision::Granted);
        });
        assert_eq!(
            prompt.confirm_overwrite(&["/sdcard/a.txt".to_string()]),
            Decision::Granted
        );
        owner.join().unwrap();
    }

    #[test]
    fn test_unanswered_prompt_is_cancelled() {
        let (prompt, _requests) = ChannelPrompt::new(Duration::from_millis(20));
        let cause = NavError::InsufficientPermissions("/data".into());
        assert_eq!(prompt.request_relaunch(&cause), Decision::Cancelled);
    }

    #[test]
    fn test_dropped_receiver_is_cancelled() {
        let (prompt, requests) = ChannelPrompt::new(Duration::from_secs(5));
        drop(requests);
        assert_eq!(prompt.confirm_overwrite(&[]), Decision::Cancelled);
    }
}
