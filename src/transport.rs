//! Transport abstraction (spec.md §4.13 `[FULL]`, §9 "Transport rewiring").
//!
//! The engine owns a single boxed `(AsyncRead + AsyncWrite)` object.
//! STARTTLS and COMPRESS rewiring (spec.md §4.7 steps 3 and 6) replace that
//! object in place rather than threading generic type parameters through
//! the connection engine.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::BytesMut;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};
use rustls::pki_types::ServerName;
use tokio::io::{self, AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::error::{Error, Result};

/// A transport: a duplex byte stream the engine reads frames from and
/// writes compiled commands to.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send + ?Sized> Transport for T {}

/// The engine's transport handle.
pub type BoxedTransport = Box<dyn Transport>;

/// Opens a plain TCP connection. STARTTLS/implicit TLS upgrade is applied
/// afterward by [`upgrade_tls`].
pub async fn connect_tcp(host: &str, port: u16) -> Result<TcpStream> {
    TcpStream::connect((host, port)).await.map_err(Error::Io)
}

fn tls_connector(danger_accept_invalid_certs: bool) -> TlsConnector {
    let config = if danger_accept_invalid_certs {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DangerousVerifier))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        let loaded = rustls_native_certs::load_native_certs();
        for cert in loaded.certs {
            let _ = roots.add(cert);
        }
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    };
    TlsConnector::from(Arc::new(config))
}

/// Wraps `stream` in a TLS session (used both for the implicit-TLS initial
/// connect and for the post-STARTTLS upgrade).
///
/// # Errors
///
/// Returns [`Error::Tls`] if `servername` is not a valid DNS name or the
/// handshake fails.
pub async fn upgrade_tls(stream: BoxedTransport, servername: &str, danger_accept_invalid_certs: bool) -> Result<BoxedTransport> {
    let connector = tls_connector(danger_accept_invalid_certs);
    let name = ServerName::try_from(servername.to_string())
        .map_err(|e| Error::Tls(format!("invalid server name {servername:?}: {e}")))?
        .to_owned();
    let tls = connector.connect(name, stream).await.map_err(|e| Error::Tls(e.to_string()))?;
    Ok(Box::new(tls))
}

/// Splices a raw DEFLATE encoder onto the write path and a decoder onto the
/// read path, enabling `COMPRESS=DEFLATE` transparently to callers above
/// the transport layer (spec.md §4.7 step 6).
pub fn enable_compression(stream: BoxedTransport) -> BoxedTransport {
    Box::new(DeflateTransport::new(stream))
}

/// Certificate verifier that accepts any certificate, matching the
/// teacher's approach for Proton Bridge's self-signed cert — opt-in here
/// via `danger_accept_invalid_certs`, used against local test servers.
#[derive(Debug)]
struct DangerousVerifier;

impl rustls::client::danger::ServerCertVerifier for DangerousVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

const SCRATCH_SIZE: usize = 8192;

/// Wraps an inner transport with raw DEFLATE compression on write and
/// decompression on read, using flate2's streaming `Compress`/`Decompress`
/// rather than its blocking `Read`/`Write` adapters, since those assume a
/// synchronous inner stream.
struct DeflateTransport<T> {
    inner: T,
    compress: Compress,
    decompress: Decompress,
    /// Compressed bytes not yet consumed by the decompressor.
    pending_in: BytesMut,
    /// Compressed bytes produced by the encoder but not yet written to
    /// `inner`.
    pending_out: BytesMut,
}

impl<T> DeflateTransport<T> {
    fn new(inner: T) -> Self {
        Self {
            inner,
            compress: Compress::new(Compression::default(), false),
            decompress: Decompress::new(false),
            pending_in: BytesMut::new(),
            pending_out: BytesMut::new(),
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for DeflateTransport<T> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.pending_in.is_empty() {
            let mut scratch = [0u8; SCRATCH_SIZE];
            let mut scratch_buf = ReadBuf::new(&mut scratch);
            match Pin::new(&mut this.inner).poll_read(cx, &mut scratch_buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(())) => {
                    let n = scratch_buf.filled().len();
                    if n == 0 {
                        return Poll::Ready(Ok(()));
                    }
                    this.pending_in.extend_from_slice(scratch_buf.filled());
                }
            }
        }

        let before_in = this.decompress.total_in();
        let before_out = this.decompress.total_out();
        let outcome = this
            .decompress
            .decompress(&this.pending_in, buf.initialize_unfilled(), FlushDecompress::None);
        let consumed = (this.decompress.total_in() - before_in) as usize;
        let produced = (this.decompress.total_out() - before_out) as usize;
        let _ = this.pending_in.split_to(consumed);
        buf.advance(produced);

        match outcome {
            Ok(_) => Poll::Ready(Ok(())),
            Err(e) => Poll::Ready(Err(io::Error::new(io::ErrorKind::InvalidData, e))),
        }
    }
}

impl<T: AsyncWrite + Unpin> DeflateTransport<T> {
    fn poll_flush_pending(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.pending_out.is_empty() {
            match Pin::new(&mut self.inner).poll_write(cx, &self.pending_out) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(0)) => return Poll::Ready(Err(io::ErrorKind::WriteZero.into())),
                Poll::Ready(Ok(n)) => {
                    let _ = self.pending_out.split_to(n);
                }
            }
        }
        Poll::Ready(Ok(()))
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for DeflateTransport<T> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match this.poll_flush_pending(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Ready(Ok(())) => {}
        }

        let mut out = [0u8; SCRATCH_SIZE];
        let before_in = this.compress.total_in();
        let before_out = this.compress.total_out();
        let result = this.compress.compress(buf, &mut out, FlushCompress::None);
        let consumed = (this.compress.total_in() - before_in) as usize;
        let produced = (this.compress.total_out() - before_out) as usize;
        this.pending_out.extend_from_slice(&out[..produced]);

        match result {
            Ok(_) => Poll::Ready(Ok(consumed)),
            Err(e) => Poll::Ready(Err(io::Error::new(io::ErrorKind::InvalidData, e))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let mut out = [0u8; SCRATCH_SIZE];
        let before_out = this.compress.total_out();
        if let Err(e) = this.compress.compress(&[], &mut out, FlushCompress::Sync) {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::InvalidData, e)));
        }
        let produced = (this.compress.total_out() - before_out) as usize;
        this.pending_out.extend_from_slice(&out[..produced]);

        match this.poll_flush_pending(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Ready(Ok(())) => {}
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.poll_flush_pending(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Ready(Ok(())) => {}
        }
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}
