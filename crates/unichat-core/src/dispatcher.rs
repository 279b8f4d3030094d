use tracing::{debug, warn};

use crate::ai::OllamaClient;
use crate::error::Result;
use crate::session::{Session, Turn};

/// Whether a request is currently outstanding for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    AwaitingResponse,
}

/// Turns user text into a generation request and folds the reply back into
/// the session.
#[derive(Clone)]
pub struct Dispatcher {
    client: OllamaClient,
}

impl Dispatcher {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }

    /// Send one turn and wait for the reply.
    ///
    /// `user_text` must already be trimmed and non-empty. The transcript is
    /// only touched when the call succeeds.
    pub async fn send(&self, session: &mut Session, user_text: &str) -> Result<String> {
        let turn = session.start_turn(user_text);
        let reply = self.generate(&turn).await?;
        session.commit(&turn, &reply);
        Ok(reply)
    }

    /// Network half of [`Dispatcher::send`]: returns the trimmed reply
    /// without touching any session.
    pub async fn generate(&self, turn: &Turn) -> Result<String> {
        debug!(
            model = %turn.model,
            prompt_len = turn.prompt.len(),
            "sending generation request"
        );

        match self.client.generate(&turn.model, &turn.prompt).await {
            Ok(response) => Ok(response.trim().to_string()),
            Err(e) => {
                warn!(model = %turn.model, error = %e, "generation failed");
                Err(e)
            }
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        self.client.list_models().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::session::{Preambles, DEFAULT_PREAMBLE};
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dispatcher(uri: &str, timeout: Duration) -> Dispatcher {
        Dispatcher::new(OllamaClient::new(uri, timeout).unwrap())
    }

    fn session() -> Session {
        Session::new("llama3", Preambles::default())
    }

    async fn reply_with(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_send_trims_reply_and_appends_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3",
                "prompt": format!("{}User: What is 2+2?\nAI:", DEFAULT_PREAMBLE),
                "stream": false
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": " 4 "})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut session = session();
        let reply = dispatcher(&server.uri(), Duration::from_secs(5))
            .send(&mut session, "What is 2+2?")
            .await
            .unwrap();

        assert_eq!(reply, "4");
        assert_eq!(
            session.transcript(),
            format!("{}User: What is 2+2?\nAI: 4\n", DEFAULT_PREAMBLE)
        );
    }

    #[tokio::test]
    async fn test_second_send_carries_first_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "prompt": format!("{}User: hi\nAI: hello\nUser: again\nAI:", DEFAULT_PREAMBLE)
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "second"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "hello"})),
            )
            .mount(&server)
            .await;

        let dispatcher = dispatcher(&server.uri(), Duration::from_secs(5));
        let mut session = session();
        dispatcher.send(&mut session, "hi").await.unwrap();
        let reply = dispatcher.send(&mut session, "again").await.unwrap();

        assert_eq!(reply, "second");
        assert_eq!(session.turns(), 2);
    }

    #[tokio::test]
    async fn test_connection_refused_is_backend_unavailable() {
        // Bind and release a port so nothing is listening on it.
        let uri = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            format!("http://{}", listener.local_addr().unwrap())
        };

        let mut session = session();
        session.append_turn("earlier", "reply");
        let before = session.transcript().to_string();

        let err = dispatcher(&uri, Duration::from_secs(5))
            .send(&mut session, "hello")
            .await
            .unwrap_err();

        assert!(err.is_backend_unavailable(), "got {:?}", err);
        assert_eq!(session.transcript(), before);
    }

    #[tokio::test]
    async fn test_error_status_leaves_transcript_untouched() {
        let server = MockServer::start().await;
        reply_with(&server, ResponseTemplate::new(500).set_body_string("boom")).await;

        let mut session = session();
        let before = session.transcript().to_string();
        let err = dispatcher(&server.uri(), Duration::from_secs(5))
            .send(&mut session, "hello")
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::RequestFailed(_)));
        assert_eq!(session.transcript(), before);
        assert_eq!(session.turns(), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_request_failed() {
        let server = MockServer::start().await;
        reply_with(&server, ResponseTemplate::new(200).set_body_string("not json")).await;

        let mut session = session();
        let before = session.transcript().to_string();
        let err = dispatcher(&server.uri(), Duration::from_secs(5))
            .send(&mut session, "hello")
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::RequestFailed(_)));
        assert_eq!(session.transcript(), before);
    }

    #[tokio::test]
    async fn test_timeout_is_request_failed() {
        let server = MockServer::start().await;
        reply_with(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"response": "late"}))
                .set_delay(Duration::from_secs(2)),
        )
        .await;

        let mut session = session();
        let before = session.transcript().to_string();
        let err = dispatcher(&server.uri(), Duration::from_millis(200))
            .send(&mut session, "hello")
            .await
            .unwrap_err();

        match err {
            ChatError::RequestFailed(cause) => assert!(cause.contains("timed out")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(session.transcript(), before);
    }

    #[tokio::test]
    async fn test_generate_does_not_touch_session() {
        let server = MockServer::start().await;
        reply_with(
            &server,
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "\n ok \n"})),
        )
        .await;

        let session = session();
        let turn = session.start_turn("ping");
        let reply = dispatcher(&server.uri(), Duration::from_secs(5))
            .generate(&turn)
            .await
            .unwrap();

        assert_eq!(reply, "ok");
        assert_eq!(session.transcript(), DEFAULT_PREAMBLE);
    }
}
