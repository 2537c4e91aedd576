//! End-to-end delivery flow: signed WeChat callback in, passive reply out,
//! with the chat-completion upstream mocked at the HTTP layer.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::json;
use sha1::{Digest, Sha1};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wxbridge::codec;
use wxbridge::gateway::{AppState, router};
use wxbridge::providers::OpenAIProvider;
use wxbridge::reply::UPSTREAM_FAILURE_FALLBACK;
use wxbridge::session::ConversationStore;

const TOKEN: &str = "integration-token";

fn sign(timestamp: &str, nonce: &str) -> String {
    let mut parts = [TOKEN, timestamp, nonce];
    parts.sort_unstable();
    let mut sha = Sha1::new();
    sha.update(parts.concat());
    hex::encode(sha.finalize())
}

fn delivery_uri() -> String {
    let sig = sign("1700000000", "n1");
    format!("/wechat?signature={sig}&timestamp=1700000000&nonce=n1")
}

fn inbound_xml(content: &str) -> String {
    format!(
        "<xml>\
         <ToUserName><![CDATA[acct1]]></ToUserName>\
         <FromUserName><![CDATA[user1]]></FromUserName>\
         <CreateTime>1700000000</CreateTime>\
         <MsgType><![CDATA[text]]></MsgType>\
         <Content><![CDATA[{content}]]></Content>\
         </xml>"
    )
}

fn app_against(upstream: &MockServer) -> axum::Router {
    let provider = OpenAIProvider::with_config(
        "test-key".to_string(),
        "gpt-4o".to_string(),
        upstream.uri(),
    );
    let state = AppState::new(
        TOKEN.to_string(),
        Arc::new(provider),
        Some(Arc::new(ConversationStore::new())),
    );
    router(state)
}

async fn body_string(resp: axum::http::Response<Body>) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn text_delivery_roundtrips_through_the_model() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "你好呀，有什么想聊的？"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 30, "completion_tokens": 12, "total_tokens": 42}
        })))
        .mount(&upstream)
        .await;

    let app = app_against(&upstream);
    let req = Request::builder()
        .method("POST")
        .uri(delivery_uri())
        .header(header::CONTENT_TYPE, "text/xml")
        .body(Body::from(inbound_xml("你好")))
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("application/xml")
    );

    let xml = body_string(resp).await;
    assert_eq!(codec::field(&xml, "FromUserName"), "acct1");
    assert_eq!(codec::field(&xml, "ToUserName"), "user1");
    assert_eq!(codec::field(&xml, "MsgType"), "text");
    assert!(!codec::field(&xml, "Content").is_empty());
}

#[tokio::test]
async fn upstream_outage_degrades_to_the_fixed_fallback() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&upstream)
        .await;

    let app = app_against(&upstream);
    let req = Request::builder()
        .method("POST")
        .uri(delivery_uri())
        .body(Body::from(inbound_xml("你好")))
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    // The webhook caller still sees success; the failure lives in the text.
    assert_eq!(resp.status(), StatusCode::OK);

    let xml = body_string(resp).await;
    assert_eq!(codec::field(&xml, "Content"), UPSTREAM_FAILURE_FALLBACK);
}

#[tokio::test]
async fn challenge_handshake_echoes_verbatim() {
    let upstream = MockServer::start().await;
    let app = app_against(&upstream);

    let sig = sign("1700000001", "n2");
    let req = Request::builder()
        .method("GET")
        .uri(format!(
            "/wechat?signature={sig}&timestamp=1700000001&nonce=n2&echostr=4607340432192267277"
        ))
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "4607340432192267277");
}
