//! Common test utilities: scripted mail sessions that record every call.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mailbox_otp::{
    Disposition, Error, MailConnector, MailSession, MailboxCredential, MessagePart, Result,
};

/// One message in a scripted inbox.
#[derive(Clone)]
pub struct ScriptedMessage {
    pub uid: u32,
    pub header: Vec<u8>,
    pub parts: Vec<(MessagePart, Vec<u8>)>,
}

impl ScriptedMessage {
    pub fn new(uid: u32, from: &str, subject: &str) -> Self {
        Self {
            uid,
            header: format!("From: {from}\r\nSubject: {subject}\r\n\r\n").into_bytes(),
            parts: Vec::new(),
        }
    }

    /// Single-part `text/plain` message.
    pub fn plain(uid: u32, from: &str, subject: &str, body: &str) -> Self {
        Self::new(uid, from, subject).part(MessagePart::plain("1"), body)
    }

    pub fn part(mut self, part: MessagePart, content: &str) -> Self {
        self.parts.push((part, content.as_bytes().to_vec()));
        self
    }
}

pub fn text_part(section: &str, mime_type: &str) -> MessagePart {
    MessagePart {
        section: section.to_string(),
        mime_type: mime_type.to_string(),
        charset: Some("utf-8".to_string()),
        transfer_encoding: "7bit".to_string(),
        disposition: Disposition::Absent,
    }
}

pub fn attachment_part(section: &str, mime_type: &str) -> MessagePart {
    MessagePart {
        disposition: Disposition::Attachment,
        ..text_part(section, mime_type)
    }
}

#[derive(Default)]
struct Shared {
    inboxes: HashMap<String, Vec<ScriptedMessage>>,
    failing: HashSet<String>,
    failing_ops: HashSet<(String, &'static str)>,
    seen: HashSet<(String, u32)>,
    calls: Vec<String>,
}

/// Connector serving scripted inboxes.
#[derive(Clone, Default)]
pub struct MockConnector {
    shared: Arc<Mutex<Shared>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inbox(self, address: &str, messages: Vec<ScriptedMessage>) -> Self {
        self.shared
            .lock()
            .unwrap()
            .inboxes
            .insert(address.to_string(), messages);
        self
    }

    /// Makes `open` fail for `address` with a connection error.
    pub fn failing(self, address: &str) -> Self {
        self.shared
            .lock()
            .unwrap()
            .failing
            .insert(address.to_string());
        self
    }

    /// Makes one session operation fail for `address` with a timeout.
    ///
    /// `op` is the call prefix: `unseen`, `parts`, `header`, `fetch` or `seen`.
    pub fn failing_op(self, address: &str, op: &'static str) -> Self {
        self.shared
            .lock()
            .unwrap()
            .failing_ops
            .insert((address.to_string(), op));
        self
    }

    /// Every call made so far, e.g. `open:a@x.test`, `fetch:1:1.2`, `logout`.
    pub fn calls(&self) -> Vec<String> {
        self.shared.lock().unwrap().calls.clone()
    }

    pub fn is_seen(&self, address: &str, uid: u32) -> bool {
        self.shared
            .lock()
            .unwrap()
            .seen
            .contains(&(address.to_string(), uid))
    }
}

#[async_trait]
impl MailConnector for MockConnector {
    async fn open(&self, credential: &MailboxCredential) -> Result<Box<dyn MailSession>> {
        let address = credential.address().to_string();
        let mut shared = self.shared.lock().unwrap();
        shared.calls.push(format!("open:{address}"));

        if shared.failing.contains(&address) {
            return Err(Error::TcpConnect {
                target: "mail.example.test:993".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }

        Ok(Box::new(MockSession {
            address,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MockSession {
    address: String,
    shared: Arc<Mutex<Shared>>,
}

impl MockSession {
    fn record(&self, call: String) {
        self.shared.lock().unwrap().calls.push(call);
    }

    fn check(&self, op: &'static str, uid: u32) -> Result<()> {
        let fails = self
            .shared
            .lock()
            .unwrap()
            .failing_ops
            .contains(&(self.address.clone(), op));
        if !fails {
            return Ok(());
        }

        let timeout = Duration::from_secs(30);
        Err(match op {
            "unseen" => Error::SearchTimeout { timeout },
            "seen" => Error::StoreTimeout { uid, timeout },
            _ => Error::FetchTimeout { uid, timeout },
        })
    }

    fn message(&self, uid: u32) -> ScriptedMessage {
        self.shared.lock().unwrap().inboxes[&self.address]
            .iter()
            .find(|m| m.uid == uid)
            .cloned()
            .expect("scripted message")
    }
}

#[async_trait]
impl MailSession for MockSession {
    async fn unseen_uids(&mut self) -> Result<Vec<u32>> {
        self.record("unseen".to_string());
        self.check("unseen", 0)?;
        let shared = self.shared.lock().unwrap();
        Ok(shared
            .inboxes
            .get(&self.address)
            .map(|messages| {
                messages
                    .iter()
                    .map(|m| m.uid)
                    .filter(|uid| !shared.seen.contains(&(self.address.clone(), *uid)))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn message_parts(&mut self, uid: u32) -> Result<Vec<MessagePart>> {
        self.record(format!("parts:{uid}"));
        self.check("parts", uid)?;
        Ok(self
            .message(uid)
            .parts
            .into_iter()
            .map(|(part, _)| part)
            .collect())
    }

    async fn message_header(&mut self, uid: u32) -> Result<Vec<u8>> {
        self.record(format!("header:{uid}"));
        self.check("header", uid)?;
        Ok(self.message(uid).header)
    }

    async fn part_content(&mut self, uid: u32, section: &str) -> Result<Vec<u8>> {
        self.record(format!("fetch:{uid}:{section}"));
        self.check("fetch", uid)?;
        Ok(self
            .message(uid)
            .parts
            .into_iter()
            .find(|(part, _)| part.section == section)
            .map(|(_, content)| content)
            .expect("scripted part"))
    }

    async fn mark_seen(&mut self, uid: u32) -> Result<()> {
        self.record(format!("seen:{uid}"));
        self.check("seen", uid)?;
        self.shared
            .lock()
            .unwrap()
            .seen
            .insert((self.address.clone(), uid));
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        self.record("logout".to_string());
        Ok(())
    }
}
