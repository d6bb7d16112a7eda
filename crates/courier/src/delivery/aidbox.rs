//! Aidbox REST transport: `POST {base}/Hl7v2Message` with basic auth.

use super::{HttpReply, MessageSender, SendError};
use courier_protocol::{CourierConfig, Hl7v2MessagePayload};
use reqwest::blocking::Client;
use tracing::{debug, info};

pub struct AidboxSender {
    client: Client,
    url: String,
    username: String,
    password: String,
}

impl AidboxSender {
    pub fn new(config: &CourierConfig) -> Result<Self, SendError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SendError::InvalidRequest(format!("Failed to build HTTP client: {e}")))?;

        info!(
            "Using Basic authentication for user: {}",
            config.aidbox_username
        );

        Ok(Self {
            client,
            url: config.message_endpoint_url(),
            username: config.aidbox_username.clone(),
            password: config.aidbox_password.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl MessageSender for AidboxSender {
    fn send(&self, content: &str, filename: &str) -> Result<HttpReply, SendError> {
        let payload = Hl7v2MessagePayload::new(content);

        debug!(file = %filename, url = %self.url, bytes = payload.src.len(), "Posting HL7v2 message");

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&payload)
            .send()
            .map_err(classify)?;

        let status = response.status().as_u16();
        // A body that cannot be read is a torn exchange, not a delivery.
        let body = response.text().map_err(classify)?;

        debug!(file = %filename, status = status, response_len = body.len(), "HL7v2 message request completed");

        Ok(HttpReply { status, body })
    }
}

fn classify(e: reqwest::Error) -> SendError {
    if e.is_builder() {
        SendError::InvalidRequest(e.to_string())
    } else if e.is_timeout() {
        SendError::Timeout(e.to_string())
    } else if e.is_connect() {
        SendError::Connect(e.to_string())
    } else {
        SendError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn config(base_url: String) -> CourierConfig {
        CourierConfig {
            aidbox_base_url: base_url,
            aidbox_username: "courier".to_string(),
            aidbox_password: "secret".to_string(),
            request_timeout_secs: 5,
            ..CourierConfig::default()
        }
    }

    /// Accepts one connection, captures the request, and answers with `status` and `body`.
    fn one_shot_server(status: u16, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                head.push_str(&line);
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
            .unwrap();
            stream.flush().unwrap();

            format!("{}\r\n{}", head, String::from_utf8(request_body).unwrap())
        });

        (format!("http://{}", addr), handle)
    }

    #[test]
    fn test_posts_payload_with_basic_auth() {
        let (base_url, server) = one_shot_server(201, r#"{"id":"m-1","status":"processed"}"#);
        let sender = AidboxSender::new(&config(base_url)).unwrap();

        let reply = sender.send("MSH|^~\\&|TEST\n", "a.hl7").unwrap();
        assert_eq!(reply.status, 201);
        assert_eq!(reply.body, r#"{"id":"m-1","status":"processed"}"#);

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /Hl7v2Message HTTP/1.1"));
        // base64("courier:secret")
        assert!(request.contains("Y291cmllcjpzZWNyZXQ="));
        assert!(request.contains(r#""resourceType":"Hl7v2Message""#));
        assert!(request.contains(r#""src":"MSH|^~\\&|TEST""#));
    }

    #[test]
    fn test_client_error_status_is_a_reply() {
        let (base_url, server) = one_shot_server(401, r#"{"message":"unauthorized"}"#);
        let sender = AidboxSender::new(&config(base_url)).unwrap();

        let reply = sender.send("MSH|", "a.hl7").unwrap();
        assert_eq!(reply.status, 401);
        server.join().unwrap();
    }

    #[test]
    fn test_refused_connection_is_transient() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let sender = AidboxSender::new(&config(format!("http://127.0.0.1:{}", port))).unwrap();

        let err = sender.send("MSH|", "a.hl7").unwrap_err();
        assert!(err.is_transient(), "unexpected classification: {err:?}");
    }
}
