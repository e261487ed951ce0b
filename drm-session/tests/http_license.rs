use drm_session::{
    DrmConfig, DrmContext, DrmError, DrmSessionManager,
    license::{HttpLicenseClient, LicenseClient, LicenseRequest},
    token::{HttpTokenSource, TokenSource},
};
use reqwest::blocking::Client;
use std::{
    error::Error,
    io::{BufRead, BufReader, Read, Write},
    net::TcpListener,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

/// Serve a single canned response and hand back the raw request.
fn serve_once(status: &str, body: &str) -> Result<(String, JoinHandle<String>), Box<dyn Error>> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let url = format!("http://{}/license", listener.local_addr()?);
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);
        let mut request = String::new();
        let mut content_length = 0;

        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();

            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap();
                }
            }

            request.push_str(&line);

            if line == "\r\n" || line.is_empty() {
                break;
            }
        }

        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).unwrap();
        request.push_str(&String::from_utf8_lossy(&body));

        reader.get_mut().write_all(response.as_bytes()).unwrap();
        request
    });

    Ok((url, handle))
}

fn client() -> Result<HttpLicenseClient, Box<dyn Error>> {
    Ok(HttpLicenseClient::with_client(
        Client::builder().no_proxy().build()?,
    ))
}

fn request(url: String) -> LicenseRequest {
    LicenseRequest {
        url,
        body: b"<challenge/>".to_vec(),
        content_type: "text/xml; charset=utf-8".to_owned(),
        headers: vec![("X-Device".to_owned(), "stb".to_owned())],
        token: Some(Arc::from("secret")),
        timeout: Duration::from_secs(5),
    }
}

#[test]
fn license_post_carries_token_and_headers() -> Result<(), Box<dyn Error>> {
    let (url, server) = serve_once("200 OK", "license")?;
    let response = client()?.fetch(&request(url))?;
    let raw = server.join().map_err(|_| "server panicked")?.to_ascii_lowercase();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"license");
    assert!(raw.starts_with("post /license http/1.1"));
    assert!(raw.contains("authorization: bearer secret"));
    assert!(raw.contains("x-device: stb"));
    assert!(raw.contains("content-type: text/xml; charset=utf-8"));
    assert!(raw.ends_with("<challenge/>"));
    Ok(())
}

#[test]
fn http_error_status_is_a_transport_failure() -> Result<(), Box<dyn Error>> {
    let (url, server) = serve_once("403 Forbidden", "device revoked")?;
    let error = client()?.fetch(&request(url)).unwrap_err();
    server.join().map_err(|_| "server panicked")?;

    match error {
        DrmError::LicenseTransport { status, message } => {
            assert_eq!(status, Some(403));
            assert_eq!(message, "device revoked");
        }
        x => panic!("unexpected error: {x}"),
    }

    Ok(())
}

#[test]
fn token_service() -> Result<(), Box<dyn Error>> {
    let (url, server) = serve_once("200 OK", r#"{"status":0,"token":"abc"}"#)?;
    assert_eq!(HttpTokenSource::new(url, Duration::from_secs(5))?.fetch()?, "abc");
    server.join().map_err(|_| "server panicked")?;

    let (url, server) = serve_once("200 OK", r#"{"status":3}"#)?;
    assert!(matches!(
        HttpTokenSource::new(url, Duration::from_secs(5))?.fetch(),
        Err(DrmError::AccessToken(_))
    ));
    server.join().map_err(|_| "server panicked")?;
    Ok(())
}

#[test]
fn configured_token_url_is_fetched_once() -> Result<(), Box<dyn Error>> {
    let (url, server) = serve_once("200 OK", r#"{"status":0,"token":"abc"}"#)?;
    let config = DrmConfig {
        token_url: Some(url),
        ..Default::default()
    };
    let manager = DrmSessionManager::new(DrmContext::builder(config).build()?);

    assert_eq!(manager.access_token()?.as_deref(), Some("abc"));
    server.join().map_err(|_| "server panicked")?;

    // Served from memory, the listener is gone.
    assert_eq!(manager.access_token()?.as_deref(), Some("abc"));

    manager.clear_access_token();
    assert!(manager.set_access_token("fresh"));
    assert_eq!(manager.access_token()?.as_deref(), Some("fresh"));
    Ok(())
}
