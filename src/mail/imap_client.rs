use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, SecondsFormat, Utc};
use mailparse::{MailAddr, MailHeaderMap, ParsedMail};
use native_tls::{TlsConnector, TlsStream};

use crate::auth::token_manager::{CredentialProvider, ImapCredential};
use crate::domain::message::RawMessage;
use crate::error::{Result, TriageError};
use crate::mail::decoders::{html_to_text, normalize_snippet};
use crate::mail::reader::MailboxReader;

/// Longest preview kept from a message body.
pub const PREVIEW_CHARS: usize = 500;

const STAGE: &str = "imap";

type ImapSession = imap::Session<TlsStream<TcpStream>>;

/// Build canonical auth string as bytes.
fn build_xoauth2_bytes(user: &str, access_token: &str) -> Vec<u8> {
    let user_field = format!("user={}", user);
    let auth_field = format!("auth=Bearer {}", access_token);
    let auth_string = format!("{}{}{}{}{}", user_field, "\x01", auth_field, "\x01", "\x01");
    auth_string.into_bytes()
}

struct OAuth2Authenticator {
    response: Vec<u8>,
}

impl imap::Authenticator for OAuth2Authenticator {
    type Response = Vec<u8>;
    fn process(&self, _challenge: &[u8]) -> Self::Response {
        self.response.clone()
    }
}

fn transport(e: impl ToString) -> TriageError {
    TriageError::transport(STAGE, e)
}

pub struct ImapReader {
    pub server: String,
    pub port: u16,
    pub user: String,
    credential: Box<dyn CredentialProvider>,
    timeout: Duration,
}

impl ImapReader {
    pub fn new(
        server: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        credential: Box<dyn CredentialProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            server: server.into(),
            port,
            user: user.into(),
            credential,
            timeout,
        }
    }

    fn connect(&self) -> Result<imap::Client<TlsStream<TcpStream>>> {
        let addr = (self.server.as_str(), self.port)
            .to_socket_addrs()
            .map_err(transport)?
            .next()
            .ok_or_else(|| transport(format!("{} did not resolve", self.server)))?;

        // Every socket operation is bounded so a hung server fails the folder.
        let tcp = TcpStream::connect_timeout(&addr, self.timeout).map_err(transport)?;
        tcp.set_read_timeout(Some(self.timeout)).map_err(transport)?;
        tcp.set_write_timeout(Some(self.timeout)).map_err(transport)?;

        let tls = TlsConnector::builder().build().map_err(transport)?;
        let stream = tls.connect(&self.server, tcp).map_err(transport)?;

        let mut client = imap::Client::new(stream);
        client.read_greeting().map_err(transport)?;
        Ok(client)
    }

    fn connect_and_auth(&self) -> Result<ImapSession> {
        // Resolved first: a credential failure costs no connection.
        let credential = self.credential.credential()?;
        let client = self.connect()?;

        match &credential {
            ImapCredential::Password(password) => client
                .login(&self.user, password)
                .map_err(|(e, _)| transport(format!("LOGIN failed: {e}"))),
            ImapCredential::AccessToken(token) => {
                let raw_payload = build_xoauth2_bytes(&self.user, token);

                // Try RAW first
                let auth_raw = OAuth2Authenticator {
                    response: raw_payload.clone(),
                };
                let client = match client.authenticate("XOAUTH2", &auth_raw) {
                    Ok(session) => return Ok(session),
                    Err((_e, returned_client)) => returned_client,
                };

                // Fallback BASE64
                let b64_bytes = general_purpose::STANDARD.encode(&raw_payload).into_bytes();
                let auth_b64 = OAuth2Authenticator {
                    response: b64_bytes,
                };
                client
                    .authenticate("XOAUTH2", &auth_b64)
                    .map_err(|(e, _)| transport(format!("XOAUTH2 failed (raw+base64): {e}")))
            }
        }
    }
}

impl MailboxReader for ImapReader {
    /// Fetches the newest `max_items` messages of `folder` with `BODY.PEEK`,
    /// so nothing is marked as read.
    fn read(&self, folder: &str, max_items: u32, _mailbox: &str) -> Result<Vec<RawMessage>> {
        let mut session = self.connect_and_auth()?;
        let selected = session.examine(folder).map_err(transport)?;

        let exists = selected.exists;
        if exists == 0 || max_items == 0 {
            let _ = session.logout();
            return Ok(vec![]);
        }

        let start = exists.saturating_sub(max_items - 1).max(1);
        let fetches = session
            .fetch(
                format!("{start}:{exists}"),
                "(UID INTERNALDATE BODY.PEEK[])",
            )
            .map_err(transport)?;

        let mut out = Vec::with_capacity(fetches.len());
        for f in fetches.iter() {
            let key = f.uid.unwrap_or(f.message);
            let id = format!("{folder}:{key}");
            let Some(bytes) = f.body() else {
                log::warn!("{id}: server returned no body; skipping");
                continue;
            };
            let fallback = f.internal_date().map(|d| d.with_timezone(&Utc));
            out.push(raw_from_rfc822(id, bytes, fallback));
        }

        // newest first, like the server's own listing
        out.reverse();
        let _ = session.logout();
        Ok(out)
    }
}

/// Builds a [`RawMessage`] from an RFC 822 blob. The `Date` header wins; the
/// server's INTERNALDATE is used when it is missing or unparseable.
pub fn raw_from_rfc822(
    id: String,
    bytes: &[u8],
    internal_date: Option<DateTime<Utc>>,
) -> RawMessage {
    let parsed = match mailparse::parse_mail(bytes) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("{id}: unparseable message ({e}); keeping raw text");
            return RawMessage {
                preview: normalize_snippet(&String::from_utf8_lossy(bytes), PREVIEW_CHARS),
                date: internal_date.map(rfc3339).unwrap_or_default(),
                id,
                ..RawMessage::default()
            };
        }
    };

    let header = |name: &str| {
        parsed
            .headers
            .get_first_value(name)
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    let date = parsed
        .headers
        .get_first_value("Date")
        .and_then(|d| mailparse::dateparse(&d).ok())
        .and_then(|epoch| DateTime::<Utc>::from_timestamp(epoch, 0))
        .or(internal_date)
        .map(rfc3339)
        .unwrap_or_default();

    let body = extract_text_part(&parsed)
        .or_else(|| parsed.get_body().ok())
        .unwrap_or_default();

    let subject = header("Subject");
    RawMessage {
        id,
        from: header("From"),
        subject: if subject.is_empty() {
            "(no subject)".to_string()
        } else {
            subject
        },
        preview: normalize_snippet(&body, PREVIEW_CHARS),
        date,
        to: addresses(&header("To")),
        cc: addresses(&header("Cc")),
    }
}

fn rfc3339(d: DateTime<Utc>) -> String {
    d.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn addresses(value: &str) -> Vec<String> {
    if value.is_empty() {
        return vec![];
    }
    match mailparse::addrparse(value) {
        Ok(list) => list
            .iter()
            .flat_map(|a| match a {
                MailAddr::Single(s) => vec![s.addr.clone()],
                MailAddr::Group(g) => g.addrs.iter().map(|s| s.addr.clone()).collect(),
            })
            .collect(),
        Err(_) => value.split(',').map(|s| s.trim().to_string()).collect(),
    }
}

fn extract_text_part(p: &ParsedMail) -> Option<String> {
    let mime = p.ctype.mimetype.to_ascii_lowercase();
    if mime == "text/plain" {
        return p.get_body().ok();
    }

    // Walk subparts
    for sp in &p.subparts {
        if let Some(t) = extract_text_part(sp) {
            return Some(t);
        }
    }

    // fallback to text/html if no plain found
    if mime == "text/html"
        && let Ok(html) = p.get_body()
    {
        return Some(html_to_text(&html));
    }

    None
}
