use anyhow::Result;
use async_imap::Session;
use tokio::net::TcpStream;
use tokio_native_tls::native_tls::TlsConnector;

pub type TlsImapSession = Session<tokio_native_tls::TlsStream<TcpStream>>;
pub type PlainImapSession = Session<TcpStream>;

/// An authenticated IMAP session. Port 143 connects in the clear; any
/// other port goes through TLS.
pub enum ImapSession {
    Tls(TlsImapSession),
    Plain(PlainImapSession),
}

pub async fn connect(host: &str, port: u16, user: &str, pass: &str) -> Result<ImapSession> {
    if port == 143 {
        let tcp = TcpStream::connect((host, port)).await?;
        let client = async_imap::Client::new(tcp);
        let session = client
            .login(user, pass)
            .await
            .map_err(|e| anyhow::anyhow!("login failed: {}", e.0))?;
        Ok(ImapSession::Plain(session))
    } else {
        let tcp = TcpStream::connect((host, port)).await?;
        let tls = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        let tls = tokio_native_tls::TlsConnector::from(tls);
        let tls_stream = tls.connect(host, tcp).await?;
        let client = async_imap::Client::new(tls_stream);
        let session = client
            .login(user, pass)
            .await
            .map_err(|e| anyhow::anyhow!("login failed: {}", e.0))?;
        Ok(ImapSession::Tls(session))
    }
}
