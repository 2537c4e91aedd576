/// Minimal codec for the WeChat message-exchange documents.
///
/// Inbound callbacks are flat, non-nested XML with a fixed set of top-level
/// fields; this module projects those scalar fields out and builds the
/// passive text reply. It is deliberately not a general XML parser: one
/// occurrence per tag, no nesting, no namespaces.
use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;

/// The only tags the bridge ever reads. Anything else in the document is
/// ignored.
const FIELDS: [&str; 4] = ["MsgType", "FromUserName", "ToUserName", "Content"];

static FIELD_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    FIELDS
        .iter()
        .map(|tag| {
            // CDATA-wrapped payload first so it wins when both forms could match.
            let pattern =
                format!(r"(?s)<{tag}><!\[CDATA\[(.*?)\]\]></{tag}>|<{tag}>(.*?)</{tag}>");
            let re = Regex::new(&pattern).expect("field pattern must compile");
            (*tag, re)
        })
        .collect()
});

/// Message type of an inbound callback. Only plain text is fully handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsgType {
    Text,
    Other(String),
}

/// Fields extracted once per request from the callback document.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub msg_type: MsgType,
    /// OpenID of the end user who sent the message.
    pub from_user: String,
    /// Account the message was delivered to. Swapped with `from_user` when
    /// building the reply.
    pub to_account: String,
    pub content: String,
}

impl InboundMessage {
    pub fn parse(xml: &str) -> Self {
        let msg_type = match field(xml, "MsgType").as_str() {
            "text" => MsgType::Text,
            other => MsgType::Other(other.to_string()),
        };
        Self {
            msg_type,
            from_user: field(xml, "FromUserName"),
            to_account: field(xml, "ToUserName"),
            content: field(xml, "Content"),
        }
    }
}

/// Project a single scalar field out of the flat callback document.
///
/// Returns an empty string when the tag is absent or unknown; callers treat
/// empty content as "no payload", not as an error.
pub fn field(xml: &str, tag: &str) -> String {
    let Some(re) = FIELD_PATTERNS
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, re)| re)
    else {
        return String::new();
    };

    re.captures(xml)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Replace the CDATA terminator sequence so model output cannot break the
/// reply document.
fn escape_cdata(text: &str) -> String {
    text.replace("]]>", "]]&gt;")
}

/// Build the passive text-reply document. The caller has already swapped
/// roles: the inbound sender is `to_user` here.
pub fn encode_text_reply(to_user: &str, from_user: &str, text: &str) -> String {
    let created = Utc::now().timestamp();
    let safe = escape_cdata(text);
    format!(
        "<xml>\n  \
         <ToUserName><![CDATA[{to_user}]]></ToUserName>\n  \
         <FromUserName><![CDATA[{from_user}]]></FromUserName>\n  \
         <CreateTime>{created}</CreateTime>\n  \
         <MsgType><![CDATA[text]]></MsgType>\n  \
         <Content><![CDATA[{safe}]]></Content>\n\
         </xml>"
    )
}
