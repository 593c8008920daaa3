//! Command router: parses prefixed input lines and dispatches them to
//! registered handlers.
//!
//! Registration is an explicit table built at startup: one handler per
//! literal command name plus two reserved wildcard slots. The catch-all
//! handler runs for every dispatched command; the catch-remaining handler
//! runs only when no specific handler claimed the command. A handler can
//! return `RouterError::Interrupt` to stop the rest of the dispatch -- that
//! is control flow, not a failure. Any other handler error propagates to
//! the caller so a supervising layer can log or restart.

use crate::config::RouterConfig;
use crate::listener::LogEvent;
use log::{debug, error, warn};
use shared::Event;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum RouterError {
    /// Stops the current dispatch. Not a failure.
    #[error("command interrupted")]
    Interrupt,

    /// A handler failed; propagated to the dispatch caller.
    #[error("handler failed: {0}")]
    Handler(Box<dyn std::error::Error + Send + Sync>),
}

/// Everything a handler gets to see about one command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub command: String,
    /// Raw parameter string, everything after the command token.
    pub params: String,
    /// Shell-split parameters (quote-aware).
    pub args: Vec<String>,
    /// Stable identity of whoever issued the command, when known.
    pub caller: Option<String>,
    /// True when the line used the silent prefix; handlers should suppress
    /// their visible output.
    pub silent: bool,
}

pub type HandlerResult = Result<(), RouterError>;
pub type Handler = Box<dyn Fn(&CommandContext) -> HandlerResult + Send + Sync>;

pub struct CommandRouter {
    handlers: HashMap<String, Handler>,
    catch_all: Option<Handler>,
    catch_remaining: Option<Handler>,
    config: RouterConfig,
}

impl CommandRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            handlers: HashMap::new(),
            catch_all: None,
            catch_remaining: None,
            config,
        }
    }

    /// Registers a handler for a literal command name. A later registration
    /// for the same name replaces the earlier one.
    pub fn register(&mut self, command: &str, handler: Handler) {
        if self.handlers.insert(command.to_string(), handler).is_some() {
            debug!("Handler for {:?} replaced", command);
        }
    }

    /// Registers the handler invoked for every dispatched command.
    pub fn register_catch_all(&mut self, handler: Handler) {
        self.catch_all = Some(handler);
    }

    /// Registers the handler invoked only when no specific handler claimed
    /// the command.
    pub fn register_catch_remaining(&mut self, handler: Handler) {
        self.catch_remaining = Some(handler);
    }

    /// Parses a raw input line. Returns `Ok(false)` when the line carries
    /// no command prefix and was ignored.
    pub fn dispatch_line(&self, line: &str, caller: Option<&str>) -> Result<bool, RouterError> {
        let (rest, silent) = if let Some(rest) = line.strip_prefix(&self.config.silent_prefix) {
            (rest, true)
        } else if let Some(rest) = line.strip_prefix(&self.config.verbose_prefix) {
            (rest, false)
        } else {
            return Ok(false);
        };

        let mut split = rest.splitn(2, ' ');
        let command = split.next().unwrap_or_default();
        let params = split.next().unwrap_or_default();
        if command.is_empty() {
            return Ok(false);
        }

        self.dispatch(command, params, caller, silent)?;
        Ok(true)
    }

    /// Dispatches one command: specific handler (or catch-remaining), then
    /// always the catch-all.
    pub fn dispatch(
        &self,
        command: &str,
        params: &str,
        caller: Option<&str>,
        silent: bool,
    ) -> Result<(), RouterError> {
        let context = CommandContext {
            command: command.to_string(),
            params: params.to_string(),
            args: shell_split(params),
            caller: caller.map(str::to_string),
            silent,
        };

        let primary = self
            .handlers
            .get(command)
            .or(self.catch_remaining.as_ref());
        if let Some(handler) = primary {
            match handler(&context) {
                Ok(()) => {}
                Err(RouterError::Interrupt) => return Ok(()),
                Err(e) => return Err(e),
            }
        }

        if let Some(handler) = &self.catch_all {
            match handler(&context) {
                Ok(()) | Err(RouterError::Interrupt) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Routes a classified `user_say` event, using the speaker's uniqueid
    /// as the caller identity.
    pub fn on_user_say(&self, event: &Event) -> Result<bool, RouterError> {
        let Some(message) = event.field("message") else {
            return Ok(false);
        };
        self.dispatch_line(message, event.field("uniqueid"))
    }

    /// Consumes the event stream, routing chat commands until the channel
    /// closes. Handler errors are logged here; this loop is the supervising
    /// layer for chat-driven dispatch.
    pub async fn run(self, mut events: broadcast::Receiver<LogEvent>) {
        loop {
            match events.recv().await {
                Ok(LogEvent::Classified(event)) if event.name == "user_say" => {
                    if let Err(e) = self.on_user_say(&event) {
                        error!("Command handler failed: {}", e);
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Command router lagged, {} log events dropped", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Splits a parameter string the way a shell would: whitespace-separated
/// tokens, with single or double quotes grouping. An unterminated quote
/// falls back to a plain whitespace split.
pub fn shell_split(params: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_token = false;

    for c in params.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return params.split_whitespace().map(str::to_string).collect();
    }
    if in_token {
        args.push(current);
    }
    args
}
