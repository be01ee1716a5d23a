//! Delivery engine — fans one document out to every configured recipient.
//!
//! One mail-relay session is opened per call and shared by all recipients.
//! The attachment is read and MIME-encoded once; each recipient gets a
//! lightweight [`OutboundMessage`] that borrows it.
//!
//! Failure model:
//! - session open / TLS / auth failure → [`DeliveryError::Connection`], nobody
//!   receives anything
//! - one recipient rejected → recorded in its [`DeliveryOutcome`], the loop
//!   continues
//! - every recipient rejected → [`DeliveryError::AllFailed`] with all outcomes

use std::path::Path;
use std::sync::{Arc, LazyLock};

use lettre::Message;
use lettre::address::Envelope;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::Error as SmtpError;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{SmtpConnection, TlsParameters};
use lettre::transport::smtp::commands::{Data, Mail, Rcpt, Rset};
use lettre::transport::smtp::extension::ClientId;
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::config::{SmtpConfig, TlsMode};
use crate::error::DeliveryError;
use crate::pipeline::types::{DeliveryOutcome, Recipient};

/// MIME type of every delivered attachment.
pub const ATTACHMENT_MIME: &str = "application/epub+zip";

static ATTACHMENT_CONTENT_TYPE: LazyLock<ContentType> = LazyLock::new(|| {
    ContentType::parse(ATTACHMENT_MIME).expect("static MIME type parses")
});

// ── Message shape ───────────────────────────────────────────────────

/// The document, encoded once and shared by every outbound message.
#[derive(Debug, Clone)]
pub struct Attachment {
    file_name: String,
    part: SinglePart,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let part =
            MimeAttachment::new(file_name.clone()).body(bytes, ATTACHMENT_CONTENT_TYPE.clone());
        Self { file_name, part }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

/// One recipient's message. Immutable, borrows the shared attachment.
#[derive(Debug, Clone, Copy)]
pub struct OutboundMessage<'a> {
    pub from: &'a Mailbox,
    pub to: &'a Recipient,
    pub subject: &'a str,
    pub attachment: &'a Attachment,
}

impl<'a> OutboundMessage<'a> {
    pub fn new(
        from: &'a Mailbox,
        to: &'a Recipient,
        subject: &'a str,
        attachment: &'a Attachment,
    ) -> Self {
        Self {
            from,
            to,
            subject,
            attachment,
        }
    }

    /// Build the wire message. Fails if the recipient address does not parse.
    pub fn to_message(&self) -> Result<Message, String> {
        let to: Mailbox = self
            .to
            .address
            .parse()
            .map_err(|e| format!("Invalid recipient address: {e}"))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(self.subject)
            .multipart(MultiPart::mixed().singlepart(self.attachment.part.clone()))
            .map_err(|e| format!("Failed to build email: {e}"))
    }
}

// ── Transport seam ──────────────────────────────────────────────────

/// Opens authenticated sessions to the mail relay.
///
/// Implementations block; the engine calls them from a blocking task.
pub trait MailRelay: Send + Sync {
    fn open(&self) -> Result<Box<dyn MailSession>, DeliveryError>;
}

/// An open, authenticated relay session.
pub trait MailSession: Send {
    /// Hand one message to the relay. The error string ends up in the report.
    fn send(&mut self, message: &OutboundMessage<'_>) -> Result<(), String>;

    /// Close the session. Called exactly once, on every path.
    fn close(&mut self);
}

/// Closes the wrapped session when dropped.
struct SessionGuard {
    session: Box<dyn MailSession>,
}

impl SessionGuard {
    fn send(&mut self, message: &OutboundMessage<'_>) -> Result<(), String> {
        self.session.send(message)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.close();
    }
}

// ── SMTP ────────────────────────────────────────────────────────────

/// SMTP relay backed by a single lettre connection per session.
#[derive(Debug, Clone)]
pub struct SmtpRelay {
    config: SmtpConfig,
}

impl SmtpRelay {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn hello_name() -> ClientId {
        ClientId::Domain("localhost".to_string())
    }

    /// Connect, secure and authenticate one connection.
    fn connect(&self) -> Result<SmtpConnection, DeliveryError> {
        let cfg = &self.config;
        let hello = Self::hello_name();
        let connection_err = |stage: &str, e: &dyn std::fmt::Display| {
            DeliveryError::Connection(format!("{stage} {}:{}: {e}", cfg.host, cfg.port))
        };

        let tls = match cfg.tls {
            TlsMode::Plain => None,
            TlsMode::StartTls | TlsMode::Implicit => Some(
                TlsParameters::new(cfg.host.clone())
                    .map_err(|e| connection_err("TLS setup for", &e))?,
            ),
        };
        let implicit_tls = match cfg.tls {
            TlsMode::Implicit => tls.as_ref(),
            _ => None,
        };

        let mut conn = SmtpConnection::connect(
            (cfg.host.as_str(), cfg.port),
            Some(cfg.timeout),
            &hello,
            implicit_tls,
            None,
        )
        .map_err(|e| connection_err("connect to", &e))?;

        if cfg.tls == TlsMode::StartTls
            && let Some(params) = tls.as_ref()
        {
            if !conn.can_starttls() {
                conn.abort();
                return Err(DeliveryError::Connection(format!(
                    "{}:{} does not offer STARTTLS",
                    cfg.host, cfg.port
                )));
            }
            if let Err(e) = conn.starttls(params, &hello) {
                conn.abort();
                return Err(connection_err("STARTTLS with", &e));
            }
        }

        let creds = Credentials::new(
            cfg.username.clone(),
            cfg.password.expose_secret().to_string(),
        );
        if let Err(e) = conn.auth(&[Mechanism::Plain, Mechanism::Login], &creds) {
            conn.abort();
            return Err(connection_err("authentication with", &e));
        }

        info!(host = %cfg.host, port = cfg.port, "SMTP session opened");
        Ok(conn)
    }
}

impl MailRelay for SmtpRelay {
    fn open(&self) -> Result<Box<dyn MailSession>, DeliveryError> {
        let conn = self.connect()?;
        Ok(Box::new(SmtpSession {
            relay: self.clone(),
            conn,
        }))
    }
}

/// One relay connection shared by every recipient of a job.
///
/// Each message is its own MAIL/RCPT/DATA transaction driven command by
/// command. A negative reply is followed by RSET so the connection stays
/// usable for the next recipient; any other failure drops the connection
/// and the next send reconnects.
struct SmtpSession {
    relay: SmtpRelay,
    conn: SmtpConnection,
}

impl SmtpSession {
    fn transaction(&mut self, envelope: &Envelope, body: &[u8]) -> Result<(), SmtpError> {
        self.conn.command(Mail::new(envelope.from().cloned(), Vec::new()))?;
        for to in envelope.to() {
            self.conn.command(Rcpt::new(to.clone(), Vec::new()))?;
        }
        self.conn.command(Data)?;
        self.conn.message(body)?;
        Ok(())
    }

    fn recover(&mut self, err: &SmtpError) {
        if (err.is_permanent() || err.is_transient()) && self.conn.command(Rset).is_ok() {
            return;
        }
        debug!("SMTP connection unusable, dropping it: {err}");
        self.conn.abort();
    }
}

impl MailSession for SmtpSession {
    fn send(&mut self, message: &OutboundMessage<'_>) -> Result<(), String> {
        let email = message.to_message()?;
        if self.conn.has_broken() {
            debug!("Reconnecting to SMTP relay");
            self.conn = self.relay.connect().map_err(|e| e.to_string())?;
        }

        match self.transaction(email.envelope(), &email.formatted()) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.recover(&e);
                Err(format!("SMTP send failed: {e}"))
            }
        }
    }

    fn close(&mut self) {
        if self.conn.has_broken() {
            return;
        }
        if let Err(e) = self.conn.quit() {
            debug!("SMTP QUIT failed, dropping connection: {e}");
            self.conn.abort();
        }
    }
}

// ── Engine ──────────────────────────────────────────────────────────

/// Delivers one artifact to a list of recipients over one relay session.
#[derive(Clone)]
pub struct DeliveryEngine {
    relay: Arc<dyn MailRelay>,
    sender: Mailbox,
    subject: String,
}

impl DeliveryEngine {
    pub fn new(relay: Arc<dyn MailRelay>, sender: Mailbox, subject: impl Into<String>) -> Self {
        Self {
            relay,
            sender,
            subject: subject.into(),
        }
    }

    /// Send `artifact` to every recipient, in order.
    ///
    /// Returns one outcome per recipient when at least one send succeeded.
    pub async fn deliver(
        &self,
        artifact: &Path,
        recipients: &[Recipient],
    ) -> Result<Vec<DeliveryOutcome>, DeliveryError> {
        let bytes = tokio::fs::read(artifact)
            .await
            .map_err(|source| DeliveryError::Attachment {
                path: artifact.to_path_buf(),
                source,
            })?;
        let file_name = artifact
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("book.epub");
        let attachment = Attachment::new(file_name, bytes);

        let relay = Arc::clone(&self.relay);
        let sender = self.sender.clone();
        let subject = self.subject.clone();
        let recipients = recipients.to_vec();

        let outcomes = tokio::task::spawn_blocking(move || {
            send_all(relay.as_ref(), &sender, &subject, &attachment, &recipients)
        })
        .await
        .map_err(|e| DeliveryError::Connection(format!("Delivery task failed: {e}")))??;

        if outcomes.iter().any(|o| o.succeeded) {
            Ok(outcomes)
        } else {
            Err(DeliveryError::AllFailed { outcomes })
        }
    }
}

/// The fan-out loop. Blocking; one session for all recipients.
fn send_all(
    relay: &dyn MailRelay,
    sender: &Mailbox,
    subject: &str,
    attachment: &Attachment,
    recipients: &[Recipient],
) -> Result<Vec<DeliveryOutcome>, DeliveryError> {
    let mut session = SessionGuard {
        session: relay.open()?,
    };

    let mut outcomes = Vec::with_capacity(recipients.len());
    for recipient in recipients {
        let message = OutboundMessage::new(sender, recipient, subject, attachment);
        match session.send(&message) {
            Ok(()) => {
                info!(recipient = %recipient, file = attachment.file_name(), "Email sent");
                outcomes.push(DeliveryOutcome::success(recipient.clone()));
            }
            Err(detail) => {
                warn!(recipient = %recipient, error = %detail, "Email send failed");
                outcomes.push(DeliveryOutcome::failure(recipient.clone(), detail));
            }
        }
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use mail_parser::{MessageParser, MimeHeaders};

    use super::*;

    /// Shared log of what the fake relay saw.
    #[derive(Default)]
    struct Log {
        opened: usize,
        closed: usize,
        sent_to: Vec<String>,
        attachment_ptrs: HashSet<usize>,
    }

    struct FakeRelay {
        refuse: bool,
        reject: HashSet<String>,
        log: Arc<Mutex<Log>>,
    }

    impl FakeRelay {
        fn new(reject: &[&str]) -> Self {
            Self {
                refuse: false,
                reject: reject.iter().map(|s| s.to_string()).collect(),
                log: Arc::default(),
            }
        }

        fn refusing() -> Self {
            Self {
                refuse: true,
                ..Self::new(&[])
            }
        }
    }

    impl MailRelay for FakeRelay {
        fn open(&self) -> Result<Box<dyn MailSession>, DeliveryError> {
            if self.refuse {
                return Err(DeliveryError::Connection("535 authentication failed".into()));
            }
            self.log.lock().unwrap().opened += 1;
            Ok(Box::new(FakeSession {
                reject: self.reject.clone(),
                log: Arc::clone(&self.log),
            }))
        }
    }

    struct FakeSession {
        reject: HashSet<String>,
        log: Arc<Mutex<Log>>,
    }

    impl MailSession for FakeSession {
        fn send(&mut self, message: &OutboundMessage<'_>) -> Result<(), String> {
            let mut log = self.log.lock().unwrap();
            log.sent_to.push(message.to.address.clone());
            log.attachment_ptrs
                .insert(message.attachment as *const Attachment as usize);
            if self.reject.contains(&message.to.address) {
                return Err("550 mailbox unavailable".into());
            }
            Ok(())
        }

        fn close(&mut self) {
            self.log.lock().unwrap().closed += 1;
        }
    }

    fn recipients(addrs: &[&str]) -> Vec<Recipient> {
        addrs.iter().map(|a| Recipient::new(*a)).collect()
    }

    fn engine(relay: FakeRelay) -> (DeliveryEngine, Arc<Mutex<Log>>) {
        let log = Arc::clone(&relay.log);
        let sender: Mailbox = "me@example.com".parse().unwrap();
        (
            DeliveryEngine::new(Arc::new(relay), sender, "New book for your Kindle"),
            log,
        )
    }

    fn artifact(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("book.epub");
        std::fs::write(&path, b"PK\x03\x04epub").unwrap();
        path
    }

    #[tokio::test]
    async fn middle_failure_does_not_abort_fan_out() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, log) = engine(FakeRelay::new(&["b@example.com"]));

        let outcomes = engine
            .deliver(
                &artifact(dir.path()),
                &recipients(&["a@example.com", "b@example.com", "c@example.com"]),
            )
            .await
            .unwrap();

        assert_eq!(
            outcomes,
            vec![
                DeliveryOutcome::success(Recipient::new("a@example.com")),
                DeliveryOutcome::failure(Recipient::new("b@example.com"), "550 mailbox unavailable"),
                DeliveryOutcome::success(Recipient::new("c@example.com")),
            ]
        );
        let log = log.lock().unwrap();
        assert_eq!(log.sent_to, ["a@example.com", "b@example.com", "c@example.com"]);
    }

    #[tokio::test]
    async fn one_session_shared_and_closed() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, log) = engine(FakeRelay::new(&[]));

        engine
            .deliver(&artifact(dir.path()), &recipients(&["a@example.com", "b@example.com"]))
            .await
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.opened, 1);
        assert_eq!(log.closed, 1);
        assert_eq!(log.attachment_ptrs.len(), 1, "attachment must be built once");
    }

    #[tokio::test]
    async fn all_rejected_is_all_failed_with_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, log) = engine(FakeRelay::new(&["a@example.com", "b@example.com"]));

        let err = engine
            .deliver(&artifact(dir.path()), &recipients(&["a@example.com", "b@example.com"]))
            .await
            .unwrap_err();

        match err {
            DeliveryError::AllFailed { outcomes } => {
                assert_eq!(outcomes.len(), 2);
                assert!(outcomes.iter().all(|o| !o.succeeded));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[tokio::test]
    async fn refused_session_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, log) = engine(FakeRelay::refusing());

        let err = engine
            .deliver(&artifact(dir.path()), &recipients(&["a@example.com"]))
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Connection(_)));
        assert!(log.lock().unwrap().sent_to.is_empty());
    }

    #[tokio::test]
    async fn missing_artifact_is_attachment_error() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, log) = engine(FakeRelay::new(&[]));

        let err = engine
            .deliver(&dir.path().join("gone.epub"), &recipients(&["a@example.com"]))
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Attachment { .. }));
        assert_eq!(log.lock().unwrap().opened, 0);
    }

    #[tokio::test]
    async fn same_outcome_set_gives_same_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact(dir.path());
        let list = recipients(&["a@example.com", "b@example.com"]);
        let (engine, _) = engine(FakeRelay::new(&["a@example.com"]));

        let first = engine.deliver(&path, &list).await.unwrap();
        let second = engine.deliver(&path, &list).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn outbound_message_has_single_recipient_and_epub_attachment() {
        let sender: Mailbox = "me@example.com".parse().unwrap();
        let to = Recipient::new("kindle@example.com");
        let attachment = Attachment::new("book.epub", b"PK\x03\x04epub".to_vec());

        let email = OutboundMessage::new(&sender, &to, "New book for your Kindle", &attachment)
            .to_message()
            .unwrap();
        let raw = email.formatted();
        let parsed = MessageParser::default().parse(raw.as_slice()).unwrap();

        assert_eq!(parsed.subject(), Some("New book for your Kindle"));
        let to_addr = parsed
            .to()
            .and_then(|addr| addr.first())
            .and_then(|a| a.address());
        assert_eq!(to_addr, Some("kindle@example.com"));

        let part = parsed.attachment(0).unwrap();
        assert_eq!(part.attachment_name(), Some("book.epub"));
        let ct = part.content_type().unwrap();
        assert_eq!(ct.ctype(), "application");
        assert_eq!(ct.subtype(), Some("epub+zip"));
        assert_eq!(part.contents(), b"PK\x03\x04epub");
    }

    #[test]
    fn invalid_recipient_address_fails_message_build() {
        let sender: Mailbox = "me@example.com".parse().unwrap();
        let to = Recipient::new("not an address");
        let attachment = Attachment::new("book.epub", vec![1, 2, 3]);

        let err = OutboundMessage::new(&sender, &to, "s", &attachment)
            .to_message()
            .unwrap_err();
        assert!(err.starts_with("Invalid recipient address"));
    }

    // ── Loopback SMTP server ────────────────────────────────────────

    mod loopback {
        use std::collections::HashSet;
        use std::io::{BufRead, BufReader, Write};
        use std::net::{TcpListener, TcpStream};
        use std::sync::{Arc, Mutex};

        /// How the server treats the client.
        #[derive(Default)]
        pub struct Behavior {
            pub reject: HashSet<String>,
            pub deny_auth: bool,
            /// Close the connection right after rejecting a recipient.
            pub hang_up_on_reject: bool,
        }

        #[derive(Default)]
        pub struct Seen {
            pub connections: usize,
            pub delivered: Vec<String>,
        }

        pub struct Server {
            pub port: u16,
            pub seen: Arc<Mutex<Seen>>,
        }

        pub fn start(behavior: Behavior) -> Server {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();
            let seen = Arc::new(Mutex::new(Seen::default()));
            let behavior = Arc::new(behavior);

            let shared = Arc::clone(&seen);
            std::thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { break };
                    shared.lock().unwrap().connections += 1;
                    let (behavior, seen) = (Arc::clone(&behavior), Arc::clone(&shared));
                    std::thread::spawn(move || serve(stream, &behavior, &seen));
                }
            });

            Server { port, seen }
        }

        fn serve(stream: TcpStream, behavior: &Behavior, seen: &Mutex<Seen>) {
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut out = stream;
            let mut rcpts: Vec<String> = Vec::new();
            let mut line = String::new();

            if out.write_all(b"220 localhost ESMTP\r\n").is_err() {
                return;
            }
            loop {
                line.clear();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    return;
                }
                let cmd = line.trim_end().to_string();
                let verb = cmd.to_ascii_uppercase();

                let reply = if verb.starts_with("EHLO") {
                    "250-localhost\r\n250 AUTH PLAIN LOGIN\r\n"
                } else if verb.starts_with("AUTH") {
                    if behavior.deny_auth {
                        "535 5.7.8 authentication failed\r\n"
                    } else {
                        "235 2.7.0 accepted\r\n"
                    }
                } else if verb.starts_with("MAIL FROM") {
                    rcpts.clear();
                    "250 OK\r\n"
                } else if verb.starts_with("RCPT TO") {
                    let addr = cmd.split(['<', '>']).nth(1).unwrap_or_default().to_string();
                    if behavior.reject.contains(&addr) {
                        if behavior.hang_up_on_reject {
                            let _ = out.write_all(b"550 5.1.1 no such mailbox\r\n");
                            return;
                        }
                        "550 5.1.1 no such mailbox\r\n"
                    } else {
                        rcpts.push(addr);
                        "250 OK\r\n"
                    }
                } else if verb == "DATA" {
                    if out.write_all(b"354 go ahead\r\n").is_err() {
                        return;
                    }
                    let mut data = String::new();
                    loop {
                        data.clear();
                        if reader.read_line(&mut data).unwrap_or(0) == 0 {
                            return;
                        }
                        if data == ".\r\n" {
                            break;
                        }
                    }
                    seen.lock().unwrap().delivered.append(&mut rcpts);
                    "250 queued\r\n"
                } else if verb == "RSET" {
                    rcpts.clear();
                    "250 OK\r\n"
                } else if verb == "QUIT" {
                    let _ = out.write_all(b"221 bye\r\n");
                    return;
                } else {
                    "250 OK\r\n"
                };

                if out.write_all(reply.as_bytes()).is_err() {
                    return;
                }
            }
        }
    }

    fn smtp_engine(port: u16) -> DeliveryEngine {
        let relay = SmtpRelay::new(SmtpConfig {
            host: "127.0.0.1".into(),
            port,
            tls: TlsMode::Plain,
            timeout: std::time::Duration::from_secs(5),
            username: "me@example.com".into(),
            password: secrecy::SecretString::from("app-password".to_string()),
        });
        let sender: Mailbox = "me@example.com".parse().unwrap();
        DeliveryEngine::new(Arc::new(relay), sender, "New book for your Kindle")
    }

    fn rejecting(addrs: &[&str]) -> HashSet<String> {
        addrs.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn smtp_rejected_recipient_does_not_break_later_sends() {
        let dir = tempfile::tempdir().unwrap();
        let server = loopback::start(loopback::Behavior {
            reject: rejecting(&["b@example.com"]),
            ..Default::default()
        });

        let outcomes = smtp_engine(server.port)
            .deliver(
                &artifact(dir.path()),
                &recipients(&["a@example.com", "b@example.com", "c@example.com"]),
            )
            .await
            .unwrap();

        let flags: Vec<_> = outcomes.iter().map(|o| o.succeeded).collect();
        assert_eq!(flags, [true, false, true]);
        let detail = outcomes[1].error_detail.as_deref().unwrap();
        assert!(detail.contains("550"), "detail: {detail}");

        let seen = server.seen.lock().unwrap();
        assert_eq!(seen.delivered, ["a@example.com", "c@example.com"]);
        assert_eq!(seen.connections, 1);
    }

    #[tokio::test]
    async fn smtp_dropped_connection_is_reopened_for_next_recipient() {
        let dir = tempfile::tempdir().unwrap();
        let server = loopback::start(loopback::Behavior {
            reject: rejecting(&["b@example.com"]),
            hang_up_on_reject: true,
            ..Default::default()
        });

        let outcomes = smtp_engine(server.port)
            .deliver(
                &artifact(dir.path()),
                &recipients(&["a@example.com", "b@example.com", "c@example.com"]),
            )
            .await
            .unwrap();

        let flags: Vec<_> = outcomes.iter().map(|o| o.succeeded).collect();
        assert_eq!(flags, [true, false, true]);

        let seen = server.seen.lock().unwrap();
        assert_eq!(seen.delivered, ["a@example.com", "c@example.com"]);
        assert_eq!(seen.connections, 2);
    }

    #[tokio::test]
    async fn smtp_every_recipient_rejected_is_all_failed() {
        let dir = tempfile::tempdir().unwrap();
        let server = loopback::start(loopback::Behavior {
            reject: rejecting(&["a@example.com", "b@example.com"]),
            ..Default::default()
        });

        let err = smtp_engine(server.port)
            .deliver(&artifact(dir.path()), &recipients(&["a@example.com", "b@example.com"]))
            .await
            .unwrap_err();

        match err {
            DeliveryError::AllFailed { outcomes } => {
                assert_eq!(outcomes.len(), 2);
                assert!(outcomes.iter().all(|o| !o.succeeded));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(server.seen.lock().unwrap().delivered.is_empty());
    }

    #[tokio::test]
    async fn smtp_auth_rejection_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let server = loopback::start(loopback::Behavior {
            deny_auth: true,
            ..Default::default()
        });

        let err = smtp_engine(server.port)
            .deliver(&artifact(dir.path()), &recipients(&["a@example.com"]))
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Connection(_)), "got {err:?}");
        assert!(server.seen.lock().unwrap().delivered.is_empty());
    }
}
