//! Local proxy gateway (4.F): a TCP server the browser client points
//! `--proxy-server` at. Terminates `CONNECT` (HTTPS tunneling) and plain
//! absolute-URI HTTP requests from the browser, dials the upstream proxy
//! selected from the [`ProxyPool`] using the matching handshake, then
//! pumps bytes bidirectionally until either side closes or the connection
//! idles out.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::constants::{GATEWAY_IDLE_TIMEOUT, GATEWAY_READ_BUF, GATEWAY_TUNNEL_BUF};
use crate::proxy::dial::{self, DialError};
use crate::proxy::{Proxy, ProxyPool, ProxyScheme};

/// Bind the gateway listener synchronously, with no tokio reactor involved
/// yet. The listener is handed off to [`accept_loop`] to adopt onto
/// whichever runtime actually polls it — binding it here, rather than with
/// `TcpListener::bind(..).await`, lets the caller read back the bound
/// (possibly ephemeral) port before the gateway's own executor exists.
pub fn bind(bind_addr: SocketAddr) -> Result<std::net::TcpListener, std::io::Error> {
    let listener = std::net::TcpListener::bind(bind_addr)?;
    listener.set_nonblocking(true)?;
    info!(addr = %listener.local_addr()?, "proxy gateway listening");
    Ok(listener)
}

/// Accept and serve connections on an already-bound `listener` until the
/// process shuts down. Each accepted connection is handled on its own task.
/// Adopts `listener` onto whichever runtime this future is polled on.
pub async fn accept_loop(listener: std::net::TcpListener, pool: Arc<ProxyPool>) {
    let listener = match TcpListener::from_std(listener) {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, "failed to adopt gateway listener onto its runtime");
            return;
        }
    };
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "gateway accept failed");
                continue;
            }
        };
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            if let Err(e) = serve_one(socket, &pool).await {
                debug!(peer = %peer, error = %e, "gateway connection ended with error");
            }
        });
    }
}

/// Handle a single already-accepted client connection end to end: parse
/// the opening request, dial the upstream via a pool-selected proxy, then
/// tunnel. Exposed for callers (like [`accept_loop`]) that manage their own
/// accept loop.
pub async fn serve_one(socket: TcpStream, pool: &ProxyPool) -> Result<(), GatewayError> {
    handle_connection(socket, pool).await
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed client request")]
    MalformedRequest,
    #[error("no proxy available")]
    NoProxyAvailable,
    #[error(transparent)]
    Dial(#[from] DialError),
}

struct ParsedRequest {
    method: String,
    /// For CONNECT: `host:port` authority. For absolute-URI requests: the
    /// request's own host/port, with the raw request bytes forwarded as-is
    /// once tunneled.
    target_host: String,
    target_port: u16,
    /// Raw bytes already read off the client socket for this request
    /// (header block, possibly with trailing body bytes from a pipelined
    /// request). Replayed to the upstream for non-CONNECT requests.
    raw: Vec<u8>,
}

async fn read_request(socket: &mut TcpStream) -> Result<ParsedRequest, GatewayError> {
    let mut buf = vec![0u8; GATEWAY_READ_BUF];
    let mut filled = 0;
    loop {
        if filled == buf.len() {
            buf.resize(buf.len() * 2, 0);
        }
        let n = socket.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(GatewayError::MalformedRequest);
        }
        filled += n;

        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(&buf[..filled]) {
            Ok(httparse::Status::Complete(_header_len)) => {
                let method = req.method.unwrap_or_default().to_string();
                let path = req.path.unwrap_or_default().to_string();

                let (target_host, target_port) = if method.eq_ignore_ascii_case("CONNECT") {
                    parse_authority(&path).ok_or(GatewayError::MalformedRequest)?
                } else {
                    let host_header = req
                        .headers
                        .iter()
                        .find(|h| h.name.eq_ignore_ascii_case("host"))
                        .map(|h| String::from_utf8_lossy(h.value).to_string());
                    authority_from_request(&path, host_header.as_deref())
                        .ok_or(GatewayError::MalformedRequest)?
                };

                return Ok(ParsedRequest {
                    method,
                    target_host,
                    target_port,
                    raw: buf[..filled].to_vec(),
                });
            }
            Ok(httparse::Status::Partial) => continue,
            Err(_) => return Err(GatewayError::MalformedRequest),
        }
    }
}

fn parse_authority(authority: &str) -> Option<(String, u16)> {
    let (host, port) = authority.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}

fn authority_from_request(path: &str, host_header: Option<&str>) -> Option<(String, u16)> {
    if let Ok(url) = url::Url::parse(path) {
        let host = url.host_str()?.to_string();
        let port = url.port_or_known_default().unwrap_or(80);
        return Some((host, port));
    }
    let header = host_header?;
    if let Some((host, port)) = header.rsplit_once(':') {
        Some((host.to_string(), port.parse().ok()?))
    } else {
        Some((header.to_string(), 80))
    }
}

struct ProxyAuthority {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
}

fn proxy_authority(proxy: &Proxy) -> Result<ProxyAuthority, GatewayError> {
    let url = url::Url::parse(&proxy.url).map_err(|_| GatewayError::MalformedRequest)?;
    let host = url.host_str().ok_or(GatewayError::MalformedRequest)?.to_string();
    let port = url
        .port_or_known_default()
        .ok_or(GatewayError::MalformedRequest)?;
    let username = (!url.username().is_empty()).then(|| url.username().to_string());
    let password = url.password().map(str::to_string);
    Ok(ProxyAuthority { host, port, username, password })
}

fn basic_auth_header(username: Option<&str>, password: Option<&str>) -> Option<String> {
    let user = username?;
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD
        .encode(format!("{user}:{}", password.unwrap_or("")));
    Some(format!("Proxy-Authorization: Basic {encoded}\r\n"))
}

/// Dial the target through an upstream proxy, performing whichever
/// handshake its scheme requires. Used for `CONNECT` requests (any upstream
/// scheme) and for plain requests through a SOCKS upstream, where the
/// handshake itself establishes the tunnel to `target_host:target_port`.
async fn dial_via_proxy(proxy: &Proxy, target_host: &str, target_port: u16) -> Result<TcpStream, GatewayError> {
    let authority = proxy_authority(proxy)?;
    let mut socket = dial::connect_upstream(&authority.host, authority.port).await?;

    match proxy.scheme {
        ProxyScheme::Socks5 => {
            let credentials = authority
                .username
                .as_deref()
                .zip(authority.password.as_deref());
            dial::socks5_connect(&mut socket, target_host, target_port, credentials).await?
        }
        ProxyScheme::Socks4 => dial::socks4_connect(&mut socket, target_host, target_port).await?,
        ProxyScheme::Http => {
            let proxy_auth = authority.username.as_deref().map(|user| {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD
                    .encode(format!("{user}:{}", authority.password.as_deref().unwrap_or("")))
            });
            dial::http_connect(&mut socket, target_host, target_port, proxy_auth.as_deref()).await?
        }
    }
    Ok(socket)
}

/// Connect directly to an HTTP-scheme upstream proxy itself (no CONNECT
/// handshake) so a plain request can be forwarded to it verbatim; the proxy
/// performs the actual fetch.
async fn dial_to_proxy(proxy: &Proxy) -> Result<(TcpStream, ProxyAuthority), GatewayError> {
    let authority = proxy_authority(proxy)?;
    let socket = dial::connect_upstream(&authority.host, authority.port).await?;
    Ok((socket, authority))
}

/// Insert a `Proxy-Authorization` header right after the request line (the
/// first CRLF) when the upstream proxy carries userinfo. Leaves `raw`
/// untouched when there is nothing to inject.
fn inject_proxy_authorization(raw: &[u8], authority: &ProxyAuthority) -> Vec<u8> {
    let Some(header) = basic_auth_header(authority.username.as_deref(), authority.password.as_deref()) else {
        return raw.to_vec();
    };
    match raw.windows(2).position(|w| w == b"\r\n") {
        Some(idx) => {
            let mut out = Vec::with_capacity(raw.len() + header.len());
            out.extend_from_slice(&raw[..idx + 2]);
            out.extend_from_slice(header.as_bytes());
            out.extend_from_slice(&raw[idx + 2..]);
            out
        }
        None => raw.to_vec(),
    }
}

async fn handle_connection(mut client: TcpStream, pool: &ProxyPool) -> Result<(), GatewayError> {
    let request = read_request(&mut client).await?;
    let is_connect = request.method.eq_ignore_ascii_case("CONNECT");

    let proxy = pool.get_proxy().ok_or(GatewayError::NoProxyAvailable)?;
    // Plain requests through an HTTP-scheme upstream are forwarded to the
    // proxy verbatim (no CONNECT); everything else dials through to the
    // target via the scheme's own handshake.
    let forward_to_proxy = !is_connect && proxy.scheme == ProxyScheme::Http;

    let dial_result = if forward_to_proxy {
        dial_to_proxy(&proxy).await.map(|(socket, authority)| (socket, Some(authority)))
    } else {
        dial_via_proxy(&proxy, &request.target_host, request.target_port)
            .await
            .map(|socket| (socket, None))
    };

    let (mut upstream, forward_authority) = match dial_result {
        Ok(pair) => {
            pool.report(&proxy, true);
            pair
        }
        Err(e) => {
            pool.report(&proxy, false);
            warn!(
                proxy = proxy.url,
                target = request.target_host,
                error = %e,
                "upstream dial failed"
            );
            let _ = client
                .write_all(b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n")
                .await;
            return Err(e);
        }
    };

    if is_connect {
        client
            .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
            .await?;
    } else if let Some(authority) = forward_authority {
        // Forward-to-proxy path: send the client's request straight to the
        // proxy's own listening socket, injecting Proxy-Authorization when
        // the proxy URL carries credentials. The proxy performs the fetch
        // and its response is tunneled straight back to the client.
        let framed = inject_proxy_authorization(&request.raw, &authority);
        upstream.write_all(&framed).await?;
    } else {
        // SOCKS upstream: the handshake already tunneled us to the target,
        // so the original request bytes are replayed verbatim.
        upstream.write_all(&request.raw).await?;
    }

    tunnel(client, upstream).await
}

async fn tunnel(mut client: TcpStream, mut upstream: TcpStream) -> Result<(), GatewayError> {
    let (mut cr, mut cw) = client.split();
    let (mut ur, mut uw) = upstream.split();

    let client_to_upstream = async {
        let mut buf = vec![0u8; GATEWAY_TUNNEL_BUF];
        loop {
            let n = match timeout(GATEWAY_IDLE_TIMEOUT, cr.read(&mut buf)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(e),
                Err(_) => return Ok(()),
            };
            if n == 0 {
                break;
            }
            uw.write_all(&buf[..n]).await?;
        }
        uw.shutdown().await
    };

    let upstream_to_client = async {
        let mut buf = vec![0u8; GATEWAY_TUNNEL_BUF];
        loop {
            let n = match timeout(GATEWAY_IDLE_TIMEOUT, ur.read(&mut buf)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(e),
                Err(_) => return Ok(()),
            };
            if n == 0 {
                break;
            }
            cw.write_all(&buf[..n]).await?;
        }
        cw.shutdown().await
    };

    let (a, b) = tokio::join!(client_to_upstream, upstream_to_client);
    if let Err(e) = a {
        error!(error = %e, "gateway tunnel client->upstream pump failed");
    }
    if let Err(e) = b {
        error!(error = %e, "gateway tunnel upstream->client pump failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connect_authority() {
        assert_eq!(
            parse_authority("example.com:443"),
            Some(("example.com".to_string(), 443))
        );
        assert_eq!(parse_authority("no-port"), None);
    }

    #[test]
    fn absolute_uri_authority() {
        assert_eq!(
            authority_from_request("http://example.com/path", None),
            Some(("example.com".to_string(), 80))
        );
    }

    #[test]
    fn relative_path_falls_back_to_host_header() {
        assert_eq!(
            authority_from_request("/path", Some("example.com:8080")),
            Some(("example.com".to_string(), 8080))
        );
    }
}
