use garde::Validate;
use serde::{Deserialize, Serialize};

/// Longest accepted message body, in bytes.
pub const MAX_CONTENT_LENGTH: usize = 10000;
/// Longest accepted reaction emoji, in bytes.
pub const MAX_EMOJI_LENGTH: usize = 32;

fn validate_message_kind(value: &str, _ctx: &()) -> garde::Result {
    match value {
        "text" | "image" | "file" | "emoji" => Ok(()),
        _ => Err(garde::Error::new("Invalid message kind")),
    }
}

/// Client-authored body of a `private_message` frame. Validated before
/// anything is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[garde(context(()))]
pub struct MessageDraft {
    #[garde(length(min = 1, max = MAX_CONTENT_LENGTH))]
    pub content: String,
    #[garde(custom(validate_message_kind))]
    pub kind: String,
    /// Id of the message this one replies to, if any.
    #[garde(skip)]
    pub reply_to: Option<String>,
}

/// Validation helper that flattens garde reports into a single string.
pub trait ValidateExt {
    fn validate_input(&self) -> Result<(), String>;
}

impl<T: Validate<Context = ()>> ValidateExt for T {
    fn validate_input(&self) -> Result<(), String> {
        self.validate().map_err(|e| e.to_string())
    }
}
