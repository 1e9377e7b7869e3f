//! Raw upstream dial primitives: connect to an upstream proxy and perform
//! its handshake, leaving the socket ready to carry the tunneled bytes.
//! Used exclusively by the local gateway (4.F) — the direct fetch client
//! delegates proxy dialing to `reqwest` instead (see `fetch::direct`).

use std::net::IpAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SOCKS4 requires an IP-literal target host")]
    Socks4RequiresIp,
    #[error("SOCKS4 handshake rejected (reply code {0:#x})")]
    Socks4Rejected(u8),
    #[error("SOCKS5 handshake rejected (no acceptable auth method)")]
    Socks5NoAcceptableAuth,
    #[error("SOCKS5 connect rejected (reply code {0:#x})")]
    Socks5ConnectRejected(u8),
    #[error("target host/port too long for the wire format")]
    TargetTooLong,
}

/// Connect to `upstream` (host:port of the proxy itself) and return the
/// open socket, unauthenticated and with no handshake performed yet.
pub async fn connect_upstream(upstream_host: &str, upstream_port: u16) -> Result<TcpStream, DialError> {
    Ok(TcpStream::connect((upstream_host, upstream_port)).await?)
}

/// Perform a SOCKS4 CONNECT handshake for `target_host:target_port` over
/// an already-connected `socket`. SOCKS4a (hostname resolution by the
/// proxy) is not supported upstream, matching the wire format's lack of a
/// domain field; `target_host` must already be an IPv4 literal.
pub async fn socks4_connect(
    socket: &mut TcpStream,
    target_host: &str,
    target_port: u16,
) -> Result<(), DialError> {
    let ip: IpAddr = target_host.parse().map_err(|_| DialError::Socks4RequiresIp)?;
    let IpAddr::V4(ipv4) = ip else {
        return Err(DialError::Socks4RequiresIp);
    };

    let mut req = Vec::with_capacity(9);
    req.push(0x04);
    req.push(0x01);
    req.extend_from_slice(&target_port.to_be_bytes());
    req.extend_from_slice(&ipv4.octets());
    req.push(0x00);

    socket.write_all(&req).await?;

    let mut resp = [0u8; 8];
    socket.read_exact(&mut resp).await?;
    if resp[1] != 0x5A {
        return Err(DialError::Socks4Rejected(resp[1]));
    }
    Ok(())
}

/// Perform a SOCKS5 CONNECT handshake for `target_host:target_port` over an
/// already-connected `socket`, using the domain-name address type so the
/// upstream proxy resolves the hostname itself. When `credentials` is
/// `Some`, the greeting offers method 0x02 (user/pass, RFC 1929) alongside
/// 0x00 (no auth) and performs the subnegotiation if the server picks it.
pub async fn socks5_connect(
    socket: &mut TcpStream,
    target_host: &str,
    target_port: u16,
    credentials: Option<(&str, &str)>,
) -> Result<(), DialError> {
    if credentials.is_some() {
        socket.write_all(&[0x05, 0x02, 0x00, 0x02]).await?;
    } else {
        socket.write_all(&[0x05, 0x01, 0x00]).await?;
    }

    let mut choice = [0u8; 2];
    socket.read_exact(&mut choice).await?;
    if choice[0] != 0x05 || choice[1] == 0xFF {
        return Err(DialError::Socks5NoAcceptableAuth);
    }

    if choice[1] == 0x02 {
        let (user, pass) = credentials.ok_or(DialError::Socks5NoAcceptableAuth)?;
        let mut auth = Vec::with_capacity(3 + user.len() + pass.len());
        auth.push(0x01);
        auth.push(user.len() as u8);
        auth.extend_from_slice(user.as_bytes());
        auth.push(pass.len() as u8);
        auth.extend_from_slice(pass.as_bytes());
        socket.write_all(&auth).await?;

        let mut auth_reply = [0u8; 2];
        socket.read_exact(&mut auth_reply).await?;
        if auth_reply[1] != 0x00 {
            return Err(DialError::Socks5NoAcceptableAuth);
        }
    }

    if target_host.len() > u8::MAX as usize {
        return Err(DialError::TargetTooLong);
    }
    let mut req = Vec::with_capacity(7 + target_host.len());
    req.push(0x05);
    req.push(0x01);
    req.push(0x00);
    req.push(0x03);
    req.push(target_host.len() as u8);
    req.extend_from_slice(target_host.as_bytes());
    req.extend_from_slice(&target_port.to_be_bytes());

    socket.write_all(&req).await?;

    let mut header = [0u8; 4];
    socket.read_exact(&mut header).await?;
    if header[1] != 0x00 {
        return Err(DialError::Socks5ConnectRejected(header[1]));
    }
    let atyp = header[3];

    let addr_len = match atyp {
        0x01 => 4,
        0x03 => {
            let mut len_byte = [0u8; 1];
            socket.read_exact(&mut len_byte).await?;
            len_byte[0] as usize
        }
        0x04 => 16,
        _ => 0,
    };
    if addr_len > 0 {
        let mut addr_port = vec![0u8; addr_len + 2];
        socket.read_exact(&mut addr_port).await?;
    }
    Ok(())
}

/// Perform an HTTP CONNECT handshake for `target_host:target_port` over an
/// already-connected `socket`, optionally carrying `Proxy-Authorization`
/// (basic auth, pre-base64-encoded by the caller).
pub async fn http_connect(
    socket: &mut TcpStream,
    target_host: &str,
    target_port: u16,
    proxy_authorization: Option<&str>,
) -> Result<(), DialError> {
    let mut req = format!(
        "CONNECT {target_host}:{target_port} HTTP/1.1\r\nHost: {target_host}:{target_port}\r\n"
    );
    if let Some(auth) = proxy_authorization {
        req.push_str(&format!("Proxy-Authorization: Basic {auth}\r\n"));
    }
    req.push_str("\r\n");
    socket.write_all(req.as_bytes()).await?;

    let mut buf = Vec::with_capacity(512);
    let mut byte = [0u8; 1];
    // Read until the end of the header block (blank line), byte at a time;
    // CONNECT responses have no declared length to read a fixed buffer for.
    let mut seen = 0u8;
    loop {
        socket.read_exact(&mut byte).await?;
        buf.push(byte[0]);
        seen = match byte[0] {
            b'\r' if seen == 0 || seen == 2 => seen + 1,
            b'\n' if seen == 1 || seen == 3 => seen + 1,
            _ => 0,
        };
        if seen == 4 || buf.len() > 8192 {
            break;
        }
    }

    let status_line = buf
        .split(|&b| b == b'\n')
        .next()
        .map(|l| String::from_utf8_lossy(l).to_string())
        .unwrap_or_default();
    let ok = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .is_some_and(|code| (200..300).contains(&code));

    if !ok {
        return Err(DialError::Socks5ConnectRejected(0));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn socks4_accepts_0x5a_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut req = [0u8; 9];
            sock.read_exact(&mut req).await.unwrap();
            sock.write_all(&[0x00, 0x5A, 0, 0, 0, 0, 0, 0]).await.unwrap();
        });
        let mut client = TcpStream::connect(addr).await.unwrap();
        socks4_connect(&mut client, "127.0.0.1", 80).await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn socks4_rejects_nonzero_ip_non_0x5a() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut req = [0u8; 9];
            sock.read_exact(&mut req).await.unwrap();
            sock.write_all(&[0x00, 0x5B, 0, 0, 0, 0, 0, 0]).await.unwrap();
        });
        let mut client = TcpStream::connect(addr).await.unwrap();
        let err = socks4_connect(&mut client, "127.0.0.1", 80).await.unwrap_err();
        assert!(matches!(err, DialError::Socks4Rejected(0x5B)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn socks5_full_handshake_with_domain_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; 3];
            sock.read_exact(&mut greeting).await.unwrap();
            sock.write_all(&[0x05, 0x00]).await.unwrap();

            let mut head = [0u8; 5];
            sock.read_exact(&mut head).await.unwrap();
            let domain_len = head[4] as usize;
            let mut rest = vec![0u8; domain_len + 2];
            sock.read_exact(&mut rest).await.unwrap();

            // reply: success, ATYP=domain, 3-byte domain + port
            sock.write_all(&[0x05, 0x00, 0x00, 0x03]).await.unwrap();
            sock.write_all(&[0x03, b'a', b'b', b'c', 0x00, 0x50]).await.unwrap();
        });
        let mut client = TcpStream::connect(addr).await.unwrap();
        socks5_connect(&mut client, "example.com", 443, None).await.unwrap();
        server.await.unwrap();
    }
}
