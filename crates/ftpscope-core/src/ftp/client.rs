//! FTP sessions backed by `suppaftp`
//!
//! Plain FTP or explicit FTPS (AUTH TLS via rustls), passive or active data
//! connections, binary transfers.

use super::session::{Connector, FtpSession, SessionError};
use crate::config::Settings;
use chrono::NaiveDateTime;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode, RustlsConnector, RustlsFtpStream};
use tracing::debug;

impl From<FtpError> for SessionError {
    fn from(err: FtpError) -> Self {
        match err {
            FtpError::UnexpectedResponse(response) => {
                let code = response.status.code();
                let text = format!(
                    "{} {}",
                    code,
                    String::from_utf8_lossy(&response.body).trim()
                );
                match code {
                    400..=499 => SessionError::Temporary(text),
                    500..=599 => SessionError::Permanent(text),
                    _ => SessionError::Reply(text),
                }
            }
            FtpError::BadResponse => SessionError::Protocol("malformed server response".into()),
            FtpError::ConnectionError(e) => SessionError::Io(e),
            other => SessionError::Permanent(other.to_string()),
        }
    }
}

/// Control connection, plain or TLS-protected
pub enum FtpControl {
    Plain(FtpStream),
    Secure(Box<RustlsFtpStream>),
}

/// Run the same expression against whichever stream type is inside
macro_rules! with_stream {
    ($control:expr, $stream:ident => $body:expr) => {
        match $control {
            FtpControl::Plain($stream) => $body,
            FtpControl::Secure($stream) => $body,
        }
    };
}

/// Login, timeouts and transfer mode shared by both stream types
macro_rules! configure_stream {
    ($stream:expr, $settings:expr) => {{
        $stream.get_ref().set_read_timeout($settings.data_timeout())?;
        $stream.login($settings.user.as_str(), $settings.password.as_str())?;
        $stream.set_mode(if $settings.passive {
            Mode::Passive
        } else {
            Mode::Active
        });
        $stream.transfer_type(FileType::Binary)?;
    }};
}

/// Copy a data stream into `sink` in bounded chunks
fn copy_chunks(
    source: &mut dyn Read,
    sink: &mut dyn Write,
    chunk_size: usize,
    on_chunk: &mut dyn FnMut(u64),
) -> Result<u64, SessionError> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let read = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(SessionError::Io(e)),
        };
        sink.write_all(&buf[..read])?;
        total += read as u64;
        on_chunk(total);
    }
    sink.flush()?;
    Ok(total)
}

impl FtpSession for FtpControl {
    fn noop(&mut self) -> Result<(), SessionError> {
        with_stream!(self, s => s.noop().map_err(SessionError::from))
    }

    fn mlsd(&mut self, path: &str) -> Result<Vec<String>, SessionError> {
        with_stream!(self, s => s.mlsd(Some(path)).map_err(SessionError::from))
    }

    fn nlst(&mut self, path: &str) -> Result<Vec<String>, SessionError> {
        with_stream!(self, s => s.nlst(Some(path)).map_err(SessionError::from))
    }

    fn mdtm(&mut self, path: &str) -> Result<NaiveDateTime, SessionError> {
        with_stream!(self, s => s.mdtm(path).map_err(SessionError::from))
    }

    fn size(&mut self, path: &str) -> Result<u64, SessionError> {
        with_stream!(self, s => s.size(path).map(|n| n as u64).map_err(SessionError::from))
    }

    fn retrieve(
        &mut self,
        path: &str,
        sink: &mut dyn Write,
        chunk_size: usize,
        on_chunk: &mut dyn FnMut(u64),
    ) -> Result<u64, SessionError> {
        with_stream!(self, s => {
            let mut data = s.retr_as_stream(path)?;
            let total = copy_chunks(&mut data, sink, chunk_size, on_chunk)?;
            s.finalize_retr_stream(data)?;
            Ok(total)
        })
    }

    fn quit(&mut self) {
        with_stream!(self, s => {
            let _ = s.quit();
        })
    }
}

/// Opens authenticated sessions using the connection settings
pub struct FtpConnector {
    settings: Arc<Settings>,
    tls: Option<Arc<rustls::ClientConfig>>,
}

impl FtpConnector {
    pub fn new(settings: Arc<Settings>) -> Self {
        let tls = settings.use_tls.then(|| {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            Arc::new(
                rustls::ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth(),
            )
        });
        Self { settings, tls }
    }

    fn resolve(&self) -> Result<SocketAddr, SessionError> {
        (self.settings.host.as_str(), self.settings.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                SessionError::Permanent(format!("no address for {}", self.settings.host))
            })
    }
}

impl Connector for FtpConnector {
    type Session = FtpControl;

    fn connect(&self) -> Result<FtpControl, SessionError> {
        let addr = self.resolve()?;
        let timeout = self.settings.connect_timeout();

        let control = match &self.tls {
            None => {
                let mut stream = FtpStream::connect_timeout(addr, timeout)?;
                configure_stream!(stream, self.settings);
                FtpControl::Plain(stream)
            }
            Some(config) => {
                let stream = RustlsFtpStream::connect_timeout(addr, timeout)?;
                let mut stream = stream.into_secure(
                    RustlsConnector::from(Arc::clone(config)),
                    &self.settings.host,
                )?;
                configure_stream!(stream, self.settings);
                FtpControl::Secure(Box::new(stream))
            }
        };

        debug!(host = %self.settings.host, port = self.settings.port, "FTP session opened");
        Ok(control)
    }

    fn endpoint(&self) -> (String, u16) {
        (self.settings.host.clone(), self.settings.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_chunks_reports_running_total() {
        let data = vec![7u8; 10];
        let mut sink = Vec::new();
        let mut seen = Vec::new();

        let total = copy_chunks(&mut data.as_slice(), &mut sink, 4, &mut |n| seen.push(n)).unwrap();

        assert_eq!(total, 10);
        assert_eq!(sink, data);
        assert_eq!(seen, vec![4, 8, 10]);
    }

    #[test]
    fn test_connector_without_tls_has_no_client_config() {
        let connector = FtpConnector::new(Arc::new(Settings::default()));
        assert!(connector.tls.is_none());
        assert_eq!(connector.endpoint(), ("192.168.105.244".to_string(), 21));
    }
}
