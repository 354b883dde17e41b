//! Blocking IMAP session over TLS.
//!
//! Speaks just enough IMAP4rev1 for the poll cycle: LOGIN, SELECT, SEARCH,
//! FETCH, STORE, EXPUNGE, CLOSE and LOGOUT. Literal responses (`{N}`) are read
//! byte-exact so header and body fetches come back whole.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::channels::session::MailSession;
use crate::error::SessionError;

/// Connect, read and write timeout.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// One tagged command's response.
#[derive(Debug, Default)]
struct Response {
    /// Untagged (`* ...`) and continuation lines.
    untagged: Vec<String>,
    /// Literal payloads in arrival order.
    literals: Vec<String>,
    /// The tagged completion line, tag removed.
    status: String,
}

impl Response {
    fn is_ok(&self) -> bool {
        self.status.starts_with("OK")
    }

    fn is_no(&self) -> bool {
        self.status.starts_with("NO")
    }
}

/// An IMAP session over TLS.
pub struct ImapSession {
    stream: BufReader<TlsStream>,
    tag: u32,
}

impl ImapSession {
    /// Open a TLS connection and read the server greeting.
    ///
    /// Host resolution failures are `Connect` (fatal); a resolvable host that
    /// does not answer is a transient `Timeout`/`Io` error.
    pub fn connect(host: &str, port: u16) -> Result<Self, SessionError> {
        let connect_err = |reason: String| SessionError::Connect {
            host: host.to_string(),
            reason,
        };

        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| connect_err(e.to_string()))?
            .next()
            .ok_or_else(|| connect_err("host resolved to no addresses".into()))?;

        let tcp = TcpStream::connect_timeout(&addr, IO_TIMEOUT)?;
        tcp.set_read_timeout(Some(IO_TIMEOUT))?;
        tcp.set_write_timeout(Some(IO_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| connect_err(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| SessionError::Tls(e.to_string()))?;

        let mut session = Self {
            stream: BufReader::new(rustls::StreamOwned::new(conn, tcp)),
            tag: 0,
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(SessionError::Rejected {
                command: "greeting".into(),
                response: greeting.trim_end().to_string(),
            });
        }
        debug!(host, "IMAP connected");
        Ok(session)
    }

    /// Authenticate with LOGIN.
    pub fn login(&mut self, username: &str, password: &SecretString) -> Result<(), SessionError> {
        let command = format!(
            "LOGIN {} {}",
            quote(username),
            quote(password.expose_secret())
        );
        let response = self.command(&command)?;
        if response.is_ok() {
            Ok(())
        } else {
            Err(SessionError::AuthFailed {
                username: username.to_string(),
            })
        }
    }

    fn read_line(&mut self) -> Result<String, SessionError> {
        read_crlf_line(&mut self.stream)
    }

    fn read_literal(&mut self, len: usize) -> Result<String, SessionError> {
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Send one tagged command and collect everything up to its completion.
    fn command(&mut self, command: &str) -> Result<Response, SessionError> {
        self.tag += 1;
        let tag = format!("A{}", self.tag);
        let writer = self.stream.get_mut();
        writer.write_all(format!("{tag} {command}\r\n").as_bytes())?;
        writer.flush()?;

        let prefix = format!("{tag} ");
        let mut response = Response::default();
        loop {
            let line = self.read_line()?;
            if let Some(status) = line.strip_prefix(&prefix) {
                response.status = status.trim_end().to_string();
                return Ok(response);
            }
            if let Some(len) = literal_len(&line) {
                let literal = self.read_literal(len)?;
                response.literals.push(literal);
            }
            response.untagged.push(line);
        }
    }

    /// Run `command`, turning anything but OK into `Rejected`.
    fn command_ok(&mut self, command: &str) -> Result<Response, SessionError> {
        let response = self.command(command)?;
        if response.is_ok() {
            Ok(response)
        } else {
            Err(SessionError::Rejected {
                command: command.split_whitespace().next().unwrap_or(command).to_string(),
                response: response.status,
            })
        }
    }
}

impl MailSession for ImapSession {
    fn select(&mut self, folder: &str) -> Result<(), SessionError> {
        let response = self.command(&format!("SELECT {}", quote(folder)))?;
        if response.is_ok() {
            Ok(())
        } else if response.is_no() {
            Err(SessionError::FolderNotFound(folder.to_string()))
        } else {
            Err(SessionError::Rejected {
                command: "SELECT".into(),
                response: response.status,
            })
        }
    }

    fn search(&mut self, query: &str) -> Result<Vec<String>, SessionError> {
        let response = self.command_ok(&format!("SEARCH {query}"))?;
        Ok(parse_search(&response.untagged))
    }

    fn fetch_header(&mut self, id: &str, field: &str) -> Result<String, SessionError> {
        let command = format!("FETCH {id} (BODY.PEEK[HEADER.FIELDS ({})])", field.to_uppercase());
        let mut response = self.command_ok(&command)?;
        Ok(response.literals.drain(..).next().unwrap_or_default())
    }

    fn fetch_body(&mut self, id: &str) -> Result<String, SessionError> {
        let mut response = self.command_ok(&format!("FETCH {id} (BODY[1])"))?;
        Ok(response.literals.drain(..).next().unwrap_or_default())
    }

    fn mark_deleted(&mut self, id: &str) -> Result<(), SessionError> {
        self.command_ok(&format!("STORE {id} +FLAGS (\\Deleted)"))?;
        Ok(())
    }

    fn expunge(&mut self) -> Result<(), SessionError> {
        self.command_ok("EXPUNGE")?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.command_ok("CLOSE")?;
        Ok(())
    }

    fn logout(&mut self) -> Result<(), SessionError> {
        match self.command("LOGOUT") {
            Ok(_) | Err(SessionError::Disconnected(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Quote a string argument.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Length of a `{N}` literal announced at the end of `line`.
fn literal_len(line: &str) -> Option<usize> {
    let line = line.trim_end();
    let open = line.rfind('{')?;
    line[open + 1..].strip_suffix('}')?.parse().ok()
}

/// Read up to and including the next CRLF. A bare LF does not end the line.
fn read_crlf_line<R: BufRead>(reader: &mut R) -> Result<String, SessionError> {
    let mut buf = Vec::new();
    loop {
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Err(SessionError::Disconnected("IMAP connection closed".into()));
        }
        if buf.ends_with(b"\r\n") {
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }
    }
}

/// Ids from `* SEARCH 1 2 3` lines.
fn parse_search(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().map(str::to_string))
        .collect()
}
