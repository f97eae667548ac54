use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Number of most-recent messages rendered into the prompt context block.
const CONTEXT_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Session {
    id: String,
    messages: Vec<SessionMessage>,
}

/// Conversation history across sessions, with a global message budget.
///
/// Pruning removes the oldest messages of *closed* sessions first and
/// never touches the current session: if the current session alone
/// exceeds the budget it is kept whole and a warning is logged.
pub struct SessionStore {
    sessions: Vec<Session>,
    max_messages: usize,
}

impl SessionStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            sessions: vec![Session {
                id: Uuid::new_v4().to_string(),
                messages: Vec::new(),
            }],
            max_messages,
        }
    }

    pub fn current_session_id(&self) -> &str {
        &self.sessions.last().expect("at least one session").id
    }

    /// Start a fresh session; prior sessions become prunable.
    pub fn start_session(&mut self) -> &str {
        self.sessions.push(Session {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
        });
        self.current_session_id()
    }

    pub fn add_message(&mut self, role: Role, content: impl Into<String>) {
        let session = self.sessions.last_mut().expect("at least one session");
        session.messages.push(SessionMessage {
            role,
            content: content.into(),
            at: Utc::now(),
        });
        self.prune();
    }

    fn total_messages(&self) -> usize {
        self.sessions.iter().map(|s| s.messages.len()).sum()
    }

    fn prune(&mut self) {
        while self.total_messages() > self.max_messages {
            let closed = self.sessions.len() - 1;
            let Some(victim) = self.sessions[..closed]
                .iter_mut()
                .find(|s| !s.messages.is_empty())
            else {
                log::warn!(
                    "Current session alone exceeds the message budget ({} > {}); keeping it whole",
                    self.total_messages(),
                    self.max_messages
                );
                return;
            };
            victim.messages.remove(0);
        }

        let current_id = self.sessions.last().expect("at least one session").id.clone();
        self.sessions
            .retain(|s| !s.messages.is_empty() || s.id == current_id);
    }

    /// Render the tail of the current session for the system prompt.
    pub fn context_block(&self) -> String {
        let session = self.sessions.last().expect("at least one session");
        if session.messages.is_empty() {
            return String::new();
        }

        let mut block = String::from("RECENT CONVERSATION:\n");
        let start = session.messages.len().saturating_sub(CONTEXT_WINDOW);
        for message in &session.messages[start..] {
            let preview: String = message.content.chars().take(200).collect();
            block.push_str(&format!("{}: {preview}\n", message.role.as_str()));
        }
        block
    }

    pub fn messages(&self) -> Vec<&SessionMessage> {
        let session = self.sessions.last().expect("at least one session");
        session.messages.iter().collect()
    }
}
