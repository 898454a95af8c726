use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DialogError;

/// Speaker of a single dialog turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Capitalized label used when printing a transcript
    pub fn label(&self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One piece of a multimodal message, rendered in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentItem {
    Text(String),

    /// Raw, undecoded media bytes (e.g. the contents of a jpeg file)
    Media(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Items(Vec<ContentItem>),
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<Vec<ContentItem>> for Content {
    fn from(items: Vec<ContentItem>) -> Self {
        Content::Items(items)
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Text(text) => f.write_str(text),
            Content::Items(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    match item {
                        ContentItem::Text(text) => f.write_str(text)?,
                        ContentItem::Media(data) => write!(f, "<media: {} bytes>", data.len())?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Message
/// A single immutable dialog turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    role: Role,
    content: Content,
}

impl Message {
    pub fn new(role: Role, content: impl Into<Content>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<Content>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<Content>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &Content {
        &self.content
    }
}

/// Dialog
/// One conversation, in conversation order.
/// A system message is only allowed before every other message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    messages: Vec<Message>,
}

impl Dialog {
    pub fn new(messages: Vec<Message>) -> Result<Self, DialogError> {
        if messages.is_empty() {
            return Err(DialogError::Empty);
        }
        let mut seen_other = false;
        for (position, message) in messages.iter().enumerate() {
            match message.role() {
                Role::System if seen_other => {
                    return Err(DialogError::SystemMessageNotFirst(position))
                }
                Role::System => {}
                _ => seen_other = true,
            }
        }
        Ok(Self { messages })
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}

/// Dialogs submitted together to one chat completion, results follow this order
pub type Batch = Vec<Dialog>;
