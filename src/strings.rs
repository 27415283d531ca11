const DEFAULT_LOCALE: &str = "ru";

const MESSAGES: &[(&str, &str)] = &[
    ("ru-not_admin", "Только админы чата могут управлять мной."),
    ("ru-muted", "Я не буду доставлять сообщения в этот чат."),
    ("ru-unmuted", "Я буду доставлять сообщения в этот чат."),
    ("ru-not_changed_muted", "Я уже отключен."),
    (
        "ru-not_changed_unmuted",
        "Я доставлю сообщения в этот чат как только их кто-то отправит.",
    ),
    (
        "ru-show_chat_addr",
        "Адрес данного чата для отправки сообщений через бота: `{addr}`",
    ),
    ("ru-error", "Что-то пошло не так..."),
    ("en-not_admin", "Only chat admins can control me."),
    ("en-muted", "I stopped delivering messages to this chat."),
    ("en-unmuted", "I started delivering messages to this chat."),
    (
        "en-not_changed_muted",
        "I already stopped delivering messages to this chat.",
    ),
    (
        "en-not_changed_unmuted",
        "I will deliver messages to this chat as soon as someone sends them.",
    ),
    (
        "en-show_chat_addr",
        "The address of this chat for sending messages via the bot: `{addr}`",
    ),
    ("en-error", "Something is wrong..."),
];

fn lookup(key: &str) -> Option<&'static str> {
    MESSAGES.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Reply text for `message_id` in `locale`, falling back to Russian and then
/// to a `{{locale-id}}` placeholder.
pub fn localized(locale: &str, message_id: &str) -> String {
    let locale = locale.to_lowercase();
    let message_id = message_id.to_lowercase();
    lookup(&format!("{locale}-{message_id}"))
        .or_else(|| lookup(&format!("{DEFAULT_LOCALE}-{message_id}")))
        .map(str::to_string)
        .unwrap_or_else(|| format!("{{{{{locale}-{message_id}}}}}"))
}
