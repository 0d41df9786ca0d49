pub mod command;
pub mod render;

use std::path::Path;

use tracing::debug;

use crate::errors::{AppError, Result};
use crate::models::{AttachmentRef, Sender};
use crate::service::conversation_store::{ConversationStore, SendOutcome};
use crate::service::review_board::ReviewBoard;

pub use command::{Command, HELP};

/// Output of one console command.
#[derive(Debug, Default, PartialEq)]
pub struct Reply {
    pub lines: Vec<String>,
    pub quit: bool,
}

impl Reply {
    fn lines(lines: Vec<String>) -> Self {
        Self { lines, quit: false }
    }

    fn line(line: impl Into<String>) -> Self {
        Self::lines(vec![line.into()])
    }
}

/// Presentation layer: turns commands into store operations and renders
/// the resulting state as text.
#[derive(Clone)]
pub struct Console {
    store: ConversationStore,
    reviews: ReviewBoard,
}

impl Console {
    pub fn new(store: ConversationStore, reviews: ReviewBoard) -> Self {
        Self { store, reviews }
    }

    /// Parses and runs one input line. Errors are rendered, never returned.
    pub async fn handle_line(&self, line: &str) -> Reply {
        let result = match Command::parse(line) {
            Ok(command) => self.execute(command).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| Reply::line(format!("error: {e}")))
    }

    pub async fn execute(&self, command: Command) -> Result<Reply> {
        debug!(?command, "Executing console command");
        match command {
            Command::Send(text) => self.send(&text).await,
            Command::New => {
                self.store.reset_to_start();
                Ok(Reply::line("Started a new chat"))
            }
            Command::Chats => Ok(self.chats()),
            Command::Open(id) => {
                self.store.select_conversation(&id).await?;
                let mut lines = Vec::new();
                if let Some(conversation) = self.store.active_conversation() {
                    lines.push(format!("== {}", render::display_title(&conversation.title)));
                }
                lines.extend(self.store.active_messages().iter().flat_map(render::message_lines));
                Ok(Reply::lines(lines))
            }
            Command::Attach(path) => {
                let attachment = describe_file(&path).await?;
                let line = if self.store.attach([attachment.clone()]) == 0 {
                    format!("{} is already attached", attachment.name)
                } else {
                    format!("Attached {} ({})", attachment.name, render::format_bytes(attachment.size))
                };
                Ok(Reply::line(line))
            }
            Command::Detach(index) => match self.store.detach(index) {
                Some(removed) => Ok(Reply::line(format!("Removed {}", removed.name))),
                None => Err(AppError::invalid(format!("no attachment number {}", index + 1))),
            },
            Command::Files => {
                let pending = self.store.pending_attachments();
                if pending.is_empty() {
                    return Ok(Reply::line("No files attached"));
                }
                Ok(Reply::lines(
                    pending.iter().enumerate().map(|(i, a)| render::attachment_line(i, a)).collect(),
                ))
            }
            Command::Rate(rating) => {
                self.reviews.select_rating(rating)?;
                Ok(Reply::line(format!("Rating set to {rating}")))
            }
            Command::Review(text) => {
                let review = self.reviews.submit(&text).await?;
                Ok(Reply::line(format!("Review #{} posted", review.id)))
            }
            Command::Reviews => {
                self.reviews.refresh().await?;
                let reviews = self.reviews.reviews();
                if reviews.is_empty() {
                    return Ok(Reply::line("No reviews yet"));
                }
                Ok(Reply::lines(
                    reviews
                        .iter()
                        .flat_map(|r| render::review_lines(r, self.reviews.is_mine(r)))
                        .collect(),
                ))
            }
            Command::Stats => Ok(Reply::lines(render::stats_lines(&self.reviews.stats().await?))),
            Command::Unreview(id) => {
                self.reviews.delete(id).await?;
                Ok(Reply::line(format!("Review #{id} deleted")))
            }
            Command::Help => Ok(Reply::line(HELP)),
            Command::Quit => Ok(Reply { lines: Vec::new(), quit: true }),
        }
    }

    async fn send(&self, text: &str) -> Result<Reply> {
        match self.store.submit(text).await? {
            SendOutcome::Ignored => Ok(Reply::default()),
            SendOutcome::Rejected => Ok(Reply::line("Still waiting for the previous reply")),
            SendOutcome::Delivered | SendOutcome::Failed => {
                let messages = self.store.active_messages();
                let start = messages
                    .iter()
                    .rposition(|m| m.sender == Sender::User)
                    .map_or(0, |i| i + 1);
                Ok(Reply::lines(messages[start..].iter().flat_map(render::message_lines).collect()))
            }
        }
    }

    fn chats(&self) -> Reply {
        let conversations = self.store.conversations();
        if conversations.is_empty() {
            return Reply::line("No conversations yet");
        }
        let active = self.store.active_id();
        Reply::lines(
            conversations
                .iter()
                .map(|c| render::conversation_line(c, active.as_ref()))
                .collect(),
        )
    }
}

/// Reads a file's metadata into an attachment reference.
async fn describe_file(path: &Path) -> Result<AttachmentRef> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| AppError::invalid(format!("cannot attach {}: {e}", path.display())))?;
    if !metadata.is_file() {
        return Err(AppError::invalid(format!("{} is not a file", path.display())));
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(AttachmentRef::new(name, metadata.len(), media_type_for(path)))
}

fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "zip" => "application/zip",
        _ => "unknown",
    }
}
