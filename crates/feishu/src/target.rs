//! Recipient-ID classification for the Feishu send API.
//!
//! Feishu addresses messages by one of four ID spaces, selected with the
//! `receive_id_type` request parameter. The ID space is recoverable from the
//! ID's own prefix convention, so callers hand us an opaque target string
//! and we pick the mode.

/// Addressing mode for an outbound send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    OpenId,
    UnionId,
    Email,
    ChatId,
}

impl AddressMode {
    /// Wire value for the `receive_id_type` request parameter.
    #[must_use]
    pub fn as_receive_id_type(self) -> &'static str {
        match self {
            Self::OpenId => "open_id",
            Self::UnionId => "union_id",
            Self::Email => "email",
            Self::ChatId => "chat_id",
        }
    }
}

/// Classify a recipient ID by prefix, first match wins. Anything without a
/// recognized prefix — including the empty string — addresses a chat.
///
/// No validation beyond the prefix: malformed trailing content passes
/// through to the platform unchanged.
#[must_use]
pub fn classify(id: &str) -> AddressMode {
    if id.starts_with("ou_") {
        AddressMode::OpenId
    } else if id.starts_with("on_") {
        AddressMode::UnionId
    } else if id.starts_with("email_") {
        AddressMode::Email
    } else {
        AddressMode::ChatId
    }
}

/// Whether an ID carries one of the platform's own prefixes. Used by hosts
/// to sanity-check configured delivery targets before sending.
#[must_use]
pub fn looks_like_target(id: &str) -> bool {
    id.starts_with("oc_") || id.starts_with("ou_") || id.starts_with("on_")
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("ou_x", AddressMode::OpenId)]
    #[case("on_x", AddressMode::UnionId)]
    #[case("email_x", AddressMode::Email)]
    #[case("oc_x", AddressMode::ChatId)]
    #[case("", AddressMode::ChatId)]
    #[case("random", AddressMode::ChatId)]
    #[case("ou", AddressMode::ChatId)]
    fn classify_by_prefix(#[case] id: &str, #[case] expected: AddressMode) {
        assert_eq!(classify(id), expected);
    }

    #[rstest]
    #[case(AddressMode::OpenId, "open_id")]
    #[case(AddressMode::UnionId, "union_id")]
    #[case(AddressMode::Email, "email")]
    #[case(AddressMode::ChatId, "chat_id")]
    fn receive_id_type_wire_values(#[case] mode: AddressMode, #[case] wire: &str) {
        assert_eq!(mode.as_receive_id_type(), wire);
    }

    #[test]
    fn malformed_trailing_content_passes_through() {
        // Classification never rejects; "ou_" followed by garbage is still
        // an open ID as far as this layer is concerned.
        assert_eq!(classify("ou_!!not-an-id"), AddressMode::OpenId);
    }

    #[rstest]
    #[case("oc_chat", true)]
    #[case("ou_user", true)]
    #[case("on_union", true)]
    #[case("email_a@b.c", false)]
    #[case("12345", false)]
    fn looks_like_target_checks_platform_prefixes(#[case] id: &str, #[case] expected: bool) {
        assert_eq!(looks_like_target(id), expected);
    }
}
