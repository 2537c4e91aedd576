/// Reply orchestration: one inbound message in, one reply text out.
///
/// A delivery walks a five-step machine: classify the message type, prepare
/// the context, invoke the completion capability once, then land in exactly
/// one terminal outcome. There are no retries; the platform's own redelivery
/// (if any) is the only retry mechanism.
use crate::codec::{InboundMessage, MsgType};
use crate::errors::BridgeError;
use crate::providers::base::{ChatRequest, LLMProvider, Message};
use crate::session::{ConversationStore, TurnRole};
use tracing::{debug, error};

/// Fixed persona instruction sent as the system message of every completion.
/// Not user-configurable.
const PERSONA: &str = "你是一个微信公众号的智能助理。回复要简短、自然、口语化，\
像朋友之间发消息一样，不要分段长篇大论。允许带一点个人判断和语气词。\
每次回复不超过120个汉字。";

/// Canned reply for message types the bridge does not handle.
pub const NON_TEXT_FALLBACK: &str = "我目前只自动回复文字消息。你可以直接把问题用文字发我。";

/// Substituted when the model returns an empty or whitespace-only completion.
pub const EMPTY_COMPLETION_FALLBACK: &str = "没太 get 到你的意思，再说清楚点？";

/// Shown when the upstream call fails. The webhook response still reports
/// success so the platform does not redeliver the message.
pub const UPSTREAM_FAILURE_FALLBACK: &str = "系统卡了一下，你刚才那句再发一遍试试。";

const MAX_COMPLETION_TOKENS: u32 = 400;
/// Tuned for informal chat replies. Fixed, not user-configurable.
const TEMPERATURE: f32 = 0.85;

/// Terminal state of one orchestrated exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The inbound message type is not plain text.
    Unsupported,
    /// The model answered (or the empty-completion fallback stood in).
    Answered(String),
    /// The upstream call failed; the fixed transient-error text goes out.
    Failed,
}

impl ReplyOutcome {
    /// The user-visible reply text for this outcome.
    pub fn text(&self) -> &str {
        match self {
            Self::Unsupported => NON_TEXT_FALLBACK,
            Self::Answered(text) => text,
            Self::Failed => UPSTREAM_FAILURE_FALLBACK,
        }
    }
}

/// Run one inbound message through the reply machine.
///
/// History is consulted before the upstream call and appended only after a
/// successful completion, so a failed call never pollutes it.
pub async fn orchestrate(
    provider: &dyn LLMProvider,
    store: Option<&ConversationStore>,
    inbound: &InboundMessage,
) -> ReplyOutcome {
    // Classify
    if inbound.msg_type != MsgType::Text {
        debug!(
            "unsupported message type {:?} from {}",
            inbound.msg_type, inbound.from_user
        );
        return ReplyOutcome::Unsupported;
    }

    // Prepare context
    let user_text = inbound.content.trim();
    let mut messages = vec![Message::system(PERSONA)];
    if let Some(store) = store {
        for turn in store.recent(&inbound.from_user).await {
            messages.push(match turn.role {
                TurnRole::User => Message::user(turn.content),
                TurnRole::Assistant => Message::assistant(turn.content),
            });
        }
    }
    messages.push(Message::user(user_text));
    debug!(
        "completion request for {}: {} message(s)",
        inbound.from_user,
        messages.len()
    );

    // Invoke capability, exactly one attempt
    let request = ChatRequest {
        messages,
        max_tokens: MAX_COMPLETION_TOKENS,
        temperature: TEMPERATURE,
    };
    match provider.chat(request).await {
        Ok(response) => {
            let text = response
                .content
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .unwrap_or(EMPTY_COMPLETION_FALLBACK)
                .to_string();
            if let Some(store) = store {
                store
                    .record_exchange(&inbound.from_user, user_text, &text)
                    .await;
            }
            ReplyOutcome::Answered(text)
        }
        Err(err) => {
            let transient = err
                .downcast_ref::<BridgeError>()
                .is_none_or(BridgeError::is_retryable);
            error!("chat completion failed (transient={}): {:#}", transient, err);
            ReplyOutcome::Failed
        }
    }
}
