//! IMAP mailbox over TLS.
//!
//! A small synchronous IMAP4rev1 client on rustls: enough to authenticate,
//! search one folder and fetch message bodies without touching `\Seen`.
//! The session runs on tokio's blocking pool.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::error::MailboxError;
use crate::mailbox::token::TokenCache;
use crate::mailbox::{FetchedMessage, MailQuery, Mailbox};

/// Socket read timeout for every server response.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// IMAP account settings.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub folder: String,
    pub username: String,
    pub password: SecretString,
    pub token_cache: TokenCache,
}

/// How the session authenticates.
#[derive(Debug, Clone)]
pub enum ImapAuth {
    Login { user: String, password: SecretString },
    XOAuth2 { user: String, token: SecretString },
}

impl ImapAuth {
    /// The IMAP command that performs this authentication.
    fn command(&self) -> String {
        match self {
            Self::Login { user, password } => format!(
                "LOGIN {} {}",
                quote(user),
                quote(password.expose_secret())
            ),
            Self::XOAuth2 { user, token } => format!(
                "AUTHENTICATE XOAUTH2 {}",
                xoauth2_payload(user, token.expose_secret())
            ),
        }
    }
}

/// SASL XOAUTH2 initial response, base64-encoded.
pub fn xoauth2_payload(user: &str, access_token: &str) -> String {
    STANDARD.encode(format!("user={user}\x01auth=Bearer {access_token}\x01\x01"))
}

/// IMAP quoted string.
pub fn quote(raw: &str) -> String {
    let escaped = raw.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// `UID SEARCH` criteria for a query. IMAP `SINCE` is date-granular.
pub fn search_command(query: &MailQuery) -> String {
    format!(
        "UID SEARCH SINCE {} SUBJECT {}",
        query.since.format("%d-%b-%Y"),
        quote(&query.subject)
    )
}

/// UIDs listed in `* SEARCH` responses.
pub fn parse_search(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().map(str::to_string))
        .collect()
}

/// Completion of a tagged command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Ok,
    No(String),
    Bad(String),
}

/// Everything the server sent for one command.
#[derive(Debug, Default)]
pub struct Response {
    /// Untagged and continuation lines, CRLF stripped.
    pub lines: Vec<String>,
    /// Literal payloads (`{n}` blocks) in arrival order.
    pub literals: Vec<Vec<u8>>,
}

/// Parse a tagged status line such as `A3 NO [AUTHENTICATIONFAILED] Invalid`.
pub fn parse_completion(tag: &str, line: &str) -> Option<Completion> {
    let rest = line.strip_prefix(tag)?.strip_prefix(' ')?;
    let (status, text) = rest.split_once(' ').unwrap_or((rest, ""));
    match status.to_ascii_uppercase().as_str() {
        "OK" => Some(Completion::Ok),
        "NO" => Some(Completion::No(text.to_string())),
        "BAD" => Some(Completion::Bad(text.to_string())),
        _ => None,
    }
}

/// Literal length announced at the end of a line (`... {1234}`).
pub fn literal_len(line: &str) -> Option<usize> {
    let open = line.strip_suffix('}')?.rfind('{')?;
    line[open + 1..line.len() - 1].parse().ok()
}

type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// Buffered TLS stream that can still be written to.
struct TlsLink(BufReader<TlsStream>);

impl Read for TlsLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl BufRead for TlsLink {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.0.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.0.consume(amt)
    }
}

impl Write for TlsLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.get_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.get_mut().flush()
    }
}

/// One authenticated-or-not IMAP connection.
struct Session<S> {
    stream: S,
    next_tag: u32,
}

impl Session<TlsLink> {
    fn connect(host: &str, port: u16) -> Result<Self, MailboxError> {
        let tcp = TcpStream::connect((host, port))?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| MailboxError::Connection(format!("invalid host {host}: {e}")))?;
        let conn = ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailboxError::Connection(e.to_string()))?;

        Session::open(TlsLink(BufReader::new(StreamOwned::new(conn, tcp))))
    }
}

impl<S: BufRead + Write> Session<S> {
    /// Wrap a connected stream and check the server greeting.
    fn open(stream: S) -> Result<Self, MailboxError> {
        let mut session = Self {
            stream,
            next_tag: 1,
        };
        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") {
            return Err(MailboxError::Connection(format!(
                "unexpected greeting: {greeting}"
            )));
        }
        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(MailboxError::Connection("IMAP connection closed".into()));
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn write_line(&mut self, line: &str) -> Result<(), MailboxError> {
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\r\n")?;
        self.stream.flush()?;
        Ok(())
    }

    /// Send a command and collect the response up to its tagged completion.
    fn command(&mut self, cmd: &str) -> Result<(Completion, Response), MailboxError> {
        let tag = format!("A{:03}", self.next_tag);
        self.next_tag += 1;
        self.write_line(&format!("{tag} {cmd}"))?;

        let mut response = Response::default();
        loop {
            let line = self.read_line()?;
            if let Some(done) = parse_completion(&tag, &line) {
                return Ok((done, response));
            }
            if line.starts_with('+') {
                // Continuation during AUTHENTICATE carries an error payload;
                // an empty reply lets the server finish with a tagged NO.
                self.write_line("")?;
            }
            if let Some(len) = literal_len(&line) {
                let mut literal = vec![0u8; len];
                self.stream.read_exact(&mut literal)?;
                response.literals.push(literal);
            }
            response.lines.push(line);
        }
    }

    fn expect_ok(&mut self, cmd: &str, what: &str) -> Result<Response, MailboxError> {
        match self.command(cmd)? {
            (Completion::Ok, resp) => Ok(resp),
            (Completion::No(text) | Completion::Bad(text), _) => {
                Err(MailboxError::Protocol(format!("{what} failed: {text}")))
            }
        }
    }

    fn authenticate(&mut self, auth: &ImapAuth) -> Result<(), MailboxError> {
        match self.command(&auth.command())? {
            (Completion::Ok, _) => Ok(()),
            (Completion::No(text) | Completion::Bad(text), _) => Err(MailboxError::Auth(text)),
        }
    }

    fn logout(&mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!("IMAP logout failed: {e}");
        }
    }
}

/// Run one complete session: connect, authenticate, search, fetch, log out.
fn fetch_matching(
    config: &ImapConfig,
    auth: &ImapAuth,
    query: &MailQuery,
) -> Result<Vec<FetchedMessage>, MailboxError> {
    let mut session = Session::connect(&config.host, config.port)?;
    session.authenticate(auth)?;
    session.expect_ok(&format!("EXAMINE {}", quote(&config.folder)), "EXAMINE")?;

    let search = session.expect_ok(&search_command(query), "SEARCH")?;
    let uids = parse_search(&search.lines);
    debug!(count = uids.len(), "IMAP search complete");

    let mut messages = Vec::with_capacity(uids.len());
    for uid in uids {
        match session.command(&format!("UID FETCH {uid} (BODY.PEEK[])"))? {
            (Completion::Ok, mut resp) if !resp.literals.is_empty() => {
                messages.push(FetchedMessage {
                    uid,
                    raw: resp.literals.swap_remove(0),
                });
            }
            (Completion::Ok, _) => warn!(uid = %uid, "IMAP fetch returned no body"),
            (Completion::No(text) | Completion::Bad(text), _) => {
                warn!(uid = %uid, "IMAP fetch failed: {text}");
            }
        }
    }

    session.logout();
    Ok(messages)
}

/// `Mailbox` backed by an IMAP server.
pub struct ImapMailbox {
    config: ImapConfig,
    http: reqwest::Client,
}

impl ImapMailbox {
    pub fn new(config: ImapConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// XOAUTH2 when a token is available, else password login.
    async fn resolve_auth(&self) -> Result<ImapAuth, MailboxError> {
        let user = self.config.username.clone();
        match self
            .config
            .token_cache
            .access_token(&self.http, Utc::now())
            .await?
        {
            Some(token) => {
                debug!("Using OAuth token for mailbox");
                Ok(ImapAuth::XOAuth2 { user, token })
            }
            None => Ok(ImapAuth::Login {
                user,
                password: self.config.password.clone(),
            }),
        }
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn fetch_recent(&self, query: &MailQuery) -> Result<Vec<FetchedMessage>, MailboxError> {
        let auth = self.resolve_auth().await?;
        let config = self.config.clone();
        let query_owned = query.clone();

        info!(
            host = %config.host,
            folder = %config.folder,
            subject = %query.subject,
            "Searching mailbox"
        );

        tokio::task::spawn_blocking(move || fetch_matching(&config, &auth, &query_owned))
            .await
            .map_err(|e| MailboxError::Connection(format!("mailbox task failed: {e}")))?
    }
}
