use std::path::PathBuf;

use crate::errors::{AppError, Result};
use crate::models::{ChatId, RemoteId};

pub const HELP: &str = "\
Commands:
  <text>            send a message in the current conversation
  /new              start a new conversation
  /chats            list conversations
  /open <id>        switch to a conversation
  /attach <path>    attach a file to the next message
  /detach <n>       remove the n-th pending attachment
  /files            list pending attachments
  /rate <1-5>       pick a star rating
  /review <text>    submit a review with the picked rating
  /reviews          list reviews
  /stats            show review statistics
  /unreview <id>    delete one of your reviews
  /help             show this help
  /quit             exit";

/// One line of console input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(String),
    New,
    Chats,
    Open(ChatId),
    Attach(PathBuf),
    Detach(usize),
    Files,
    Rate(u8),
    Review(String),
    Reviews,
    Stats,
    Unreview(i64),
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Command> {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Ok(Command::Send(line.to_string()));
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let command = match name {
            "new" => Command::New,
            "chats" => Command::Chats,
            "open" => Command::Open(RemoteId::parse(required(name, arg)?)),
            "attach" => Command::Attach(PathBuf::from(required(name, arg)?)),
            "detach" => {
                let n: usize = number(name, arg)?;
                if n == 0 {
                    return Err(AppError::invalid("attachments are numbered from 1"));
                }
                Command::Detach(n - 1)
            }
            "files" => Command::Files,
            "rate" => Command::Rate(number(name, arg)?),
            "review" => Command::Review(required(name, arg)?.to_string()),
            "reviews" => Command::Reviews,
            "stats" => Command::Stats,
            "unreview" => Command::Unreview(number(name, arg)?),
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(AppError::invalid(format!("unknown command /{other}, try /help"))),
        };
        Ok(command)
    }
}

fn required<'a>(name: &str, arg: &'a str) -> Result<&'a str> {
    if arg.is_empty() {
        return Err(AppError::invalid(format!("/{name} needs an argument")));
    }
    Ok(arg)
}

fn number<T: std::str::FromStr>(name: &str, arg: &str) -> Result<T> {
    required(name, arg)?
        .parse()
        .map_err(|_| AppError::invalid(format!("/{name} expects a number, got '{arg}'")))
}
