//! Scripted in-memory chat service for store and review board tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::errors::{AppError, Result};
use crate::models::{
    AttachmentRef, BotReply, ChatId, Conversation, Message, MessageId, Review, ReviewStats, Sender,
    Transcript,
};
use crate::remote::{ChatRemote, ReviewRemote};

#[derive(Default)]
struct Server {
    next_chat: i64,
    next_message: i64,
    next_review: i64,
    chats: Vec<Conversation>,
    transcripts: Vec<(ChatId, Vec<Message>)>,
    reviews: Vec<Review>,
}

impl Server {
    /// Renames a chat from its first message, the way the service does.
    fn title_from_first_message(&mut self, chat_id: &ChatId, text: &str) {
        if text.is_empty() || !self.transcript(chat_id).is_empty() {
            return;
        }
        let title = match text.char_indices().nth(50) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.to_string(),
        };
        if let Some(chat) = self.chats.iter_mut().find(|c| &c.id == chat_id) {
            chat.title = title;
        }
    }

    fn transcript(&mut self, chat_id: &ChatId) -> &mut Vec<Message> {
        if let Some(pos) = self.transcripts.iter().position(|(id, _)| id == chat_id) {
            return &mut self.transcripts[pos].1;
        }
        self.transcripts.push((chat_id.clone(), Vec::new()));
        let last = self.transcripts.len() - 1;
        &mut self.transcripts[last].1
    }
}

pub struct ScriptedRemote {
    server: Mutex<Server>,
    pub user_id: String,
    pub fail_create: AtomicBool,
    pub fail_send: AtomicBool,
    pub fail_list_chats: AtomicBool,
    pub fail_list_messages: AtomicBool,
    pub fail_reviews: AtomicBool,
    /// `list_messages` answers with no messages at all.
    pub empty_list_messages: AtomicBool,
    hold_sends: AtomicBool,
    gate: Semaphore,
    hold_creates: AtomicBool,
    create_gate: Semaphore,
    pub send_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

impl Default for ScriptedRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self {
            server: Mutex::new(Server { next_chat: 42, next_message: 1, next_review: 1, ..Server::default() }),
            user_id: "user_test".to_string(),
            fail_create: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            fail_list_chats: AtomicBool::new(false),
            fail_list_messages: AtomicBool::new(false),
            fail_reviews: AtomicBool::new(false),
            empty_list_messages: AtomicBool::new(false),
            hold_sends: AtomicBool::new(false),
            gate: Semaphore::new(0),
            hold_creates: AtomicBool::new(false),
            create_gate: Semaphore::new(0),
            send_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
        }
    }

    pub fn offline() -> Self {
        let remote = Self::new();
        for flag in [
            &remote.fail_create,
            &remote.fail_send,
            &remote.fail_list_chats,
            &remote.fail_list_messages,
            &remote.fail_reviews,
        ] {
            flag.store(true, Ordering::SeqCst);
        }
        remote
    }

    /// Makes every `send_message` wait until [`release_sends`](Self::release_sends).
    pub fn hold_sends(&self) {
        self.hold_sends.store(true, Ordering::SeqCst);
    }

    pub fn release_sends(&self, count: usize) {
        self.gate.add_permits(count);
    }

    /// Makes every `create_chat` wait until [`release_creates`](Self::release_creates).
    pub fn hold_creates(&self) {
        self.hold_creates.store(true, Ordering::SeqCst);
    }

    pub fn release_creates(&self, count: usize) {
        self.create_gate.add_permits(count);
    }

    /// Renames a chat server-side only, so clients see it on their next fetch.
    pub fn rename_chat(&self, id: &ChatId, title: &str) {
        let mut server = self.server.lock().unwrap();
        if let Some(chat) = server.chats.iter_mut().find(|c| &c.id == id) {
            chat.title = title.to_string();
        }
    }

    /// Seeds a conversation that exists only on the server.
    pub fn seed_chat(&self, id: impl Into<ChatId>, title: &str, texts: &[&str]) {
        let mut server = self.server.lock().unwrap();
        let id = id.into();
        server.chats.insert(0, Conversation::new(id.clone(), title));
        let mut messages = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let message_id = MessageId::Number(server.next_message);
            server.next_message += 1;
            let mut msg = Message::assistant(message_id, *text);
            if i % 2 == 0 {
                msg.sender = Sender::User;
            }
            messages.push(msg);
        }
        server.transcript(&id).extend(messages);
    }

    pub fn seed_review(&self, user_id: &str, rating: u8, text: &str) -> i64 {
        let mut server = self.server.lock().unwrap();
        let id = server.next_review;
        server.next_review += 1;
        server.reviews.insert(0, Review { id, user_id: user_id.to_string(), rating, text: text.to_string(), created_at: None });
        id
    }

    fn check(flag: &AtomicBool, operation: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(AppError::remote(operation, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatRemote for ScriptedRemote {
    async fn create_chat(&self, title: &str) -> Result<Conversation> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_creates.load(Ordering::SeqCst) {
            self.create_gate.acquire().await.map_err(|e| AppError::remote("create chat", e))?.forget();
        }
        Self::check(&self.fail_create, "create chat")?;
        let mut server = self.server.lock().unwrap();
        let conv = Conversation::new(server.next_chat, title);
        server.next_chat += 1;
        server.chats.insert(0, conv.clone());
        Ok(conv)
    }

    async fn send_message(
        &self,
        chat_id: &ChatId,
        text: &str,
        attachments: &[AttachmentRef],
    ) -> Result<BotReply> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_sends.load(Ordering::SeqCst) {
            self.gate.acquire().await.map_err(|e| AppError::remote("send message", e))?.forget();
        }
        Self::check(&self.fail_send, "send message")?;

        let mut server = self.server.lock().unwrap();
        server.title_from_first_message(chat_id, text);
        let user_id = MessageId::Number(server.next_message);
        let bot_id = MessageId::Number(server.next_message + 1);
        server.next_message += 2;

        let mut user = Message::pending_user(text, attachments.to_vec());
        user.id = user_id;
        let content = format!("echo: {text}");
        let bot = Message::assistant(bot_id.clone(), content.clone());
        server.transcript(chat_id).extend([user, bot]);
        Ok(BotReply { id: bot_id, content })
    }

    async fn list_chats(&self) -> Result<Vec<Conversation>> {
        Self::check(&self.fail_list_chats, "list chats")?;
        Ok(self.server.lock().unwrap().chats.clone())
    }

    async fn list_messages(&self, chat_id: &ChatId) -> Result<Transcript> {
        Self::check(&self.fail_list_messages, "list messages")?;
        let mut server = self.server.lock().unwrap();
        let title = server.chats.iter().find(|c| &c.id == chat_id).map(|c| c.title.clone());
        let messages = if self.empty_list_messages.load(Ordering::SeqCst) {
            Vec::new()
        } else {
            server.transcript(chat_id).clone()
        };
        Ok(Transcript { title, messages })
    }
}

#[async_trait]
impl ReviewRemote for ScriptedRemote {
    async fn submit_review(&self, rating: u8, text: &str) -> Result<Review> {
        Self::check(&self.fail_reviews, "submit review")?;
        let id = self.seed_review(&self.user_id, rating, text);
        let server = self.server.lock().unwrap();
        Ok(server.reviews.iter().find(|r| r.id == id).cloned().unwrap())
    }

    async fn list_reviews(&self) -> Result<Vec<Review>> {
        Self::check(&self.fail_reviews, "list reviews")?;
        Ok(self.server.lock().unwrap().reviews.clone())
    }

    async fn review_stats(&self) -> Result<ReviewStats> {
        Self::check(&self.fail_reviews, "review stats")?;
        let server = self.server.lock().unwrap();
        let total = server.reviews.len() as u64;
        let mut distribution = (1..=5).map(|r| (r, 0)).collect::<std::collections::BTreeMap<u8, u64>>();
        for review in &server.reviews {
            *distribution.entry(review.rating).or_default() += 1;
        }
        let sum: u64 = server.reviews.iter().map(|r| r.rating as u64).sum();
        let average_rating = if total == 0 { 0.0 } else { sum as f64 / total as f64 };
        Ok(ReviewStats { average_rating, total_reviews: total, distribution })
    }

    async fn delete_review(&self, review_id: i64) -> Result<()> {
        Self::check(&self.fail_reviews, "delete review")?;
        let mut server = self.server.lock().unwrap();
        let before = server.reviews.len();
        server.reviews.retain(|r| r.id != review_id);
        if server.reviews.len() == before {
            return Err(AppError::remote("delete review", "Review not found"));
        }
        Ok(())
    }
}
