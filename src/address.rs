use uuid::Uuid;

use crate::errors::GatewayError;
use crate::platform::PlatformClient;
use crate::types::{ChatId, CONVERSATIONAL_USER_KIND};

const ATEXT_SPECIALS: &str = "!#$%&'*+-/=?^_`{|}~";

/// Parses `local@domain` or `Display Name <local@domain>` and returns the
/// lowercased address.
///
/// Follows the RFC 5322 address grammar with UTF-8 atext: dot-atom or quoted
/// local parts, dot-atom or bracketed literal domains. A quoted local part is
/// returned unquoted.
pub fn parse_address(raw: &str) -> Result<String, GatewayError> {
    const INVALID: GatewayError = GatewayError::Validation("unable to parse mail address");

    let raw = raw.trim();
    let addr = match (raw.rfind('<'), raw.ends_with('>')) {
        (Some(open), true) => &raw[open + 1..raw.len() - 1],
        (None, false) => raw,
        _ => return Err(INVALID),
    };

    let (local, domain) = addr.rsplit_once('@').ok_or(INVALID)?;
    let local = parse_local(local).ok_or(INVALID)?;
    if !valid_domain(domain) {
        return Err(INVALID);
    }
    Ok(format!("{local}@{domain}").to_lowercase())
}

fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || ATEXT_SPECIALS.contains(c)
        || (!c.is_ascii() && !c.is_control() && !c.is_whitespace())
}

fn is_dot_atom(s: &str) -> bool {
    !s.is_empty()
        && s.split('.')
            .all(|atom| !atom.is_empty() && atom.chars().all(is_atext))
}

fn parse_local(local: &str) -> Option<String> {
    if is_dot_atom(local) {
        return Some(local.to_string());
    }
    let inner = local.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next()?;
                if escaped.is_control() && escaped != '\t' {
                    return None;
                }
                out.push(escaped);
            }
            '"' => return None,
            c if c.is_control() && c != '\t' => return None,
            c => out.push(c),
        }
    }
    (!out.is_empty()).then_some(out)
}

fn valid_domain(domain: &str) -> bool {
    if let Some(literal) = domain.strip_prefix('[').and_then(|d| d.strip_suffix(']')) {
        return !literal.is_empty()
            && literal
                .chars()
                .all(|c| !matches!(c, '[' | ']' | '\\') && !c.is_control() && !c.is_whitespace());
    }
    is_dot_atom(domain)
}

/// Maps a gateway address onto a chat.
///
/// Addresses ending with the group suffix carry the chat id in their local
/// part; everything else is looked up as a user's mail address.
#[derive(Debug, Clone)]
pub struct AddressResolver {
    group_suffix: String,
}

impl AddressResolver {
    pub fn new(group_suffix: impl Into<String>) -> Self {
        Self {
            group_suffix: group_suffix.into().to_lowercase(),
        }
    }

    /// The address a chat can be reached at through the gateway.
    pub fn chat_address(&self, chat_id: ChatId) -> String {
        format!("{chat_id}{}", self.group_suffix)
    }

    /// Decodes a group address without contacting the platform. `None` means
    /// the address is not a group address.
    pub fn direct(&self, addr: &str) -> Option<Result<ChatId, GatewayError>> {
        let prefix = addr.strip_suffix(self.group_suffix.as_str())?;
        let parsed = Uuid::parse_str(prefix)
            .ok()
            .filter(|id| id.hyphenated().to_string() == prefix);
        Some(parsed.ok_or_else(|| GatewayError::InvalidAddress {
            prefix: prefix.to_string(),
            address: addr.to_string(),
        }))
    }

    pub async fn resolve(
        &self,
        addr: &str,
        platform: &dyn PlatformClient,
    ) -> Result<ChatId, GatewayError> {
        if let Some(direct) = self.direct(addr) {
            return direct;
        }

        let mut users = platform.find_users_by_emails(&[addr.to_string()]).await?;
        let user = match users.len() {
            0 => return Err(GatewayError::NotFound),
            1 => users.remove(0),
            _ => return Err(GatewayError::Ambiguous),
        };
        if user.user_kind != CONVERSATIONAL_USER_KIND {
            return Err(GatewayError::WrongKind {
                expected: CONVERSATIONAL_USER_KIND,
            });
        }
        Ok(platform.create_chat_with_user(&user).await?)
    }
}
