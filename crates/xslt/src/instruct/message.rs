//! `xsl:message` and the listeners that receive messages.
use crate::context::XPathContext;
use crate::error::{Location, Result, XsltError};
use crate::expr::Expr;
use std::cell::RefCell;
use trellis_xdm::{Item, Sequence, serialize};

/// Receives the output of `xsl:message`.
pub trait MessageListener {
    fn message(&self, content: &str, terminate: bool, location: Option<&Location>);
}

/// Writes messages to the `log` facade at warning level.
#[derive(Debug, Default)]
pub struct LoggingMessageListener;

impl MessageListener for LoggingMessageListener {
    fn message(&self, content: &str, terminate: bool, location: Option<&Location>) {
        match location {
            Some(location) => log::warn!("xsl:message at {}: {}", location, content),
            None => log::warn!("xsl:message: {}", content),
        }
        if terminate {
            log::warn!("Processing terminated by xsl:message");
        }
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct CollectingMessageListener {
    messages: RefCell<Vec<String>>,
}

impl CollectingMessageListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

impl MessageListener for CollectingMessageListener {
    fn message(&self, content: &str, _terminate: bool, _location: Option<&Location>) {
        self.messages.borrow_mut().push(content.to_string());
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub select: Box<Expr>,
    pub terminate: bool,
    pub location: Option<Location>,
}

impl Message {
    pub fn new(select: Expr) -> Self {
        Self {
            select: Box::new(select),
            terminate: false,
            location: None,
        }
    }

    pub fn terminating(mut self) -> Self {
        self.terminate = true;
        self
    }

    pub fn process<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        let content = render(&ctx.capture(|c| self.select.process(c))?)?;
        let controller = ctx.controller();
        let terminate = self.terminate || controller.config().terminate_on_message;
        controller
            .message_listener()
            .message(&content, terminate, self.location.as_ref());
        if terminate {
            return Err(XsltError::terminate(content));
        }
        Ok(())
    }
}

/// Nodes are written as XML, atomic values as their string value.
fn render(content: &Sequence) -> Result<String> {
    let mut out = String::new();
    for item in content.iter() {
        match item {
            Item::Node(node) => out.push_str(&serialize(node)?),
            Item::Atomic(value) => out.push_str(&value.to_string_value()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::with_context;

    #[test]
    fn test_collecting_listener() {
        let listener = CollectingMessageListener::new();
        listener.message("one", false, None);
        listener.message("two", true, None);
        assert_eq!(listener.messages(), ["one", "two"]);
    }

    #[test]
    fn test_terminate_raises_termination() {
        let m = Message::new(Expr::string("stop")).terminating();
        with_context(|ctx| {
            let err = m.process(&ctx).unwrap_err();
            assert!(err.is_termination());
            assert_eq!(err.code(), "XTMM9000");
        });
    }

    #[test]
    fn test_message_writes_nothing_to_output() {
        let m = Message::new(Expr::xpath("1 to 3").unwrap());
        with_context(|ctx| {
            assert!(ctx.capture(|c| m.process(c)).unwrap().is_empty());
        });
    }
}
