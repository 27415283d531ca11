use std::sync::Arc;

use crate::address::{parse_address, AddressResolver};
use crate::assemble::assemble_message;
use crate::auth::CallerInfo;
use crate::errors::GatewayError;
use crate::metadata::MetadataSealer;
use crate::mute::MuteStore;
use crate::platform::PlatformClient;
use crate::tokens::TokenStore;
use crate::types::{DispatchMode, DispatchOutcome, SendMessageRequest};

/// Per-request processing for the send endpoints.
///
/// Stages run strictly in order and the first failure ends the request:
/// authenticate, seal caller metadata, parse the address, mute check on the
/// raw address, resolve the chat, mute check on the chat id, assemble,
/// dispatch.
#[derive(Clone)]
pub struct GatewayPipeline {
    tokens: Arc<TokenStore>,
    mutes: Arc<MuteStore>,
    sealer: MetadataSealer,
    resolver: AddressResolver,
    platform: Arc<dyn PlatformClient>,
}

impl GatewayPipeline {
    pub fn new(
        tokens: Arc<TokenStore>,
        mutes: Arc<MuteStore>,
        sealer: MetadataSealer,
        resolver: AddressResolver,
        platform: Arc<dyn PlatformClient>,
    ) -> Self {
        Self {
            tokens,
            mutes,
            sealer,
            resolver,
            platform,
        }
    }

    pub fn authenticate(&self, caller: &CallerInfo) -> Result<(), GatewayError> {
        if caller.token.is_empty() {
            return Err(GatewayError::MissingToken);
        }
        if !self.tokens.has_token(&caller.token) {
            return Err(GatewayError::UnknownToken);
        }
        Ok(())
    }

    fn mute_gate(&self, ident: &str) -> Result<(), GatewayError> {
        if self.mutes.is_muted(ident) {
            tracing::info!(ident, "recipient is muted");
            return Err(GatewayError::Muted);
        }
        Ok(())
    }

    pub async fn handle(
        &self,
        caller: &CallerInfo,
        body: &[u8],
        mode: DispatchMode,
    ) -> Result<DispatchOutcome, GatewayError> {
        self.authenticate(caller)?;

        let sealed = self
            .sealer
            .seal(caller)
            .map_err(|e| GatewayError::Internal(format!("unable to seal metadata: {e}")))?;

        let request: SendMessageRequest = serde_json::from_slice(body)
            .map_err(|_| GatewayError::Validation("unable to parse json"))?;
        let addr = parse_address(&request.to)?;

        // Either the raw address or the resolved chat id may be muted.
        self.mute_gate(&addr)?;
        let chat_id = self.resolver.resolve(&addr, self.platform.as_ref()).await?;
        self.mute_gate(&chat_id.to_string())?;

        let message = assemble_message(chat_id, &request.body, &request.buttons, sealed)?;

        let outcome = match mode {
            DispatchMode::Async => DispatchOutcome::Accepted {
                sync_id: self.platform.send_message_async(&message).await?,
            },
            DispatchMode::Sync => DispatchOutcome::Created {
                sync_id: self.platform.send_message_sync(&message).await?,
            },
        };
        tracing::info!(to = %addr, %chat_id, ?outcome, caller = %caller.primary_addr, "message dispatched");
        Ok(outcome)
    }
}
