use crate::errors::GatewayError;
use crate::platform::PlatformError;
use crate::types::{
    Button, ButtonAlign, ButtonOptions, ButtonRow, ButtonSpec, ChatId, OutboundMessage,
    SealedMetadata,
};

pub const MAX_BODY_CHARS: usize = 4096;

fn present(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

fn invalid(reason: impl Into<String>) -> GatewayError {
    GatewayError::Dependency(PlatformError::InvalidMessage(reason.into()))
}

fn assemble_button(spec: &ButtonSpec) -> Result<Button, GatewayError> {
    if spec.label.is_empty() {
        return Err(invalid("button label is empty"));
    }
    if spec.link.is_empty() {
        return Err(invalid(format!("button '{}' has no link", spec.label)));
    }
    let align = match present(&spec.text_align) {
        Some(raw) => Some(
            ButtonAlign::parse(&raw)
                .ok_or_else(|| invalid(format!("unknown button alignment '{raw}'")))?,
        ),
        None => None,
    };

    Ok(Button {
        label: spec.label.clone(),
        link: spec.link.clone(),
        options: ButtonOptions {
            font_color: present(&spec.text_color),
            background_color: present(&spec.background_color),
            align,
            alert_text: present(&spec.alert_text),
            h_size: spec.h_size.filter(|s| *s != 0),
        },
    })
}

/// Builds the platform message. Empty rows are dropped and absent or empty
/// attributes leave the platform defaults in place.
pub fn assemble_message(
    chat_id: ChatId,
    body: &str,
    rows: &[Vec<ButtonSpec>],
    metadata: SealedMetadata,
) -> Result<OutboundMessage, GatewayError> {
    if chat_id.is_nil() {
        return Err(invalid("chat id is nil"));
    }
    if body.trim().is_empty() {
        return Err(invalid("body is empty"));
    }
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(invalid(format!("body exceeds {MAX_BODY_CHARS} characters")));
    }

    let bubbles = rows
        .iter()
        .filter(|row| !row.is_empty())
        .map(|row| row.iter().map(assemble_button).collect::<Result<ButtonRow, _>>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(OutboundMessage {
        chat_id,
        body: body.to_string(),
        bubbles,
        metadata: Some(metadata),
    })
}
